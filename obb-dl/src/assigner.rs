//! Anchor to ground truth assignment.

use crate::{
    common::*,
    overlap::{OverlapEngine, OverlapMode},
    ratio::Ratio,
};

/// The error returned when assignment requires anchors but none are given.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("no anchors are given to the assigner")]
pub struct NoAnchors;

/// The negative overlap condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NegIouThr {
    /// Overlaps in `[0, thr)` are negative.
    Below(Ratio),
    /// Overlaps in `[lo, hi)` are negative.
    Range(Ratio, Ratio),
}

impl NegIouThr {
    pub fn upper(&self) -> Ratio {
        match *self {
            Self::Below(upper) => upper,
            Self::Range(_, upper) => upper,
        }
    }

    pub fn contains(&self, overlap: f32) -> bool {
        match *self {
            Self::Below(upper) => overlap >= 0.0 && overlap < upper.to_f32(),
            Self::Range(lower, upper) => overlap >= lower.to_f32() && overlap < upper.to_f32(),
        }
    }
}

/// The choice of assigner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum AssignerConfig {
    MaxIoU(MaxIoUAssignerInit),
}

impl AssignerConfig {
    pub fn build(&self) -> Result<Assigner> {
        let assigner = match self {
            Self::MaxIoU(init) => Assigner::MaxIoU(init.clone().build()?),
        };
        Ok(assigner)
    }
}

#[derive(Debug, Clone)]
pub enum Assigner {
    MaxIoU(MaxIoUAssigner),
}

impl Assigner {
    pub fn assign<C>(
        &self,
        engine: &dyn OverlapEngine,
        anchors: &[OBox<f32>],
        gts: &GroundTruth<OBox<f32>, C>,
    ) -> Result<AssignResult<C>>
    where
        C: Copy,
    {
        match self {
            Self::MaxIoU(assigner) => assigner.assign(engine, anchors, gts),
        }
    }
}

/// The max-IoU assigner initializer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaxIoUAssignerInit {
    /// Anchors with the max overlap at least this value are positive.
    pub pos_iou_thr: Ratio,
    /// The negative overlap condition.
    pub neg_iou_thr: NegIouThr,
    /// The minimum overlap of low quality matches.
    #[serde(default)]
    pub min_pos_iou: Ratio,
    /// Anchors whose IoF over any ignored box exceeds this value are ignored.
    #[serde(default)]
    pub ignore_iof_thr: Option<Ratio>,
    /// Force every ground truth to match its best anchor.
    #[serde(default = "default_true")]
    pub match_low_quality: bool,
    /// Force all anchors tied for the best overlap, instead of the first one.
    #[serde(default)]
    pub gt_max_assign_all: bool,
    /// Fail with [NoAnchors] on empty anchor sets.
    #[serde(default)]
    pub require_anchors: bool,
}

impl MaxIoUAssignerInit {
    pub fn new(pos_iou_thr: Ratio, neg_iou_thr: NegIouThr) -> Self {
        Self {
            pos_iou_thr,
            neg_iou_thr,
            min_pos_iou: Ratio::zero(),
            ignore_iof_thr: None,
            match_low_quality: true,
            gt_max_assign_all: false,
            require_anchors: false,
        }
    }

    pub fn build(self) -> Result<MaxIoUAssigner> {
        let Self {
            pos_iou_thr,
            neg_iou_thr,
            min_pos_iou,
            ignore_iof_thr,
            match_low_quality,
            gt_max_assign_all,
            require_anchors,
        } = self;

        ensure!(
            neg_iou_thr.upper() <= pos_iou_thr,
            "neg_iou_thr ({}) must not exceed pos_iou_thr ({})",
            neg_iou_thr.upper(),
            pos_iou_thr
        );
        if let NegIouThr::Range(lower, upper) = neg_iou_thr {
            ensure!(
                lower <= upper,
                "the negative overlap range [{}, {}) is empty",
                lower,
                upper
            );
        }

        Ok(MaxIoUAssigner {
            pos_iou_thr,
            neg_iou_thr,
            min_pos_iou,
            ignore_iof_thr,
            match_low_quality,
            gt_max_assign_all,
            require_anchors,
        })
    }
}

/// Assigns each anchor to the ground truth with the max overlap.
#[derive(Debug, Clone, CopyGetters)]
#[getset(get_copy = "pub")]
pub struct MaxIoUAssigner {
    pos_iou_thr: Ratio,
    neg_iou_thr: NegIouThr,
    min_pos_iou: Ratio,
    ignore_iof_thr: Option<Ratio>,
    match_low_quality: bool,
    gt_max_assign_all: bool,
    require_anchors: bool,
}

impl MaxIoUAssigner {
    /// Assign anchors to ground truth boxes.
    ///
    /// Ignored ground truth never becomes a target. Anchors covering them
    /// are ignored when `ignore_iof_thr` is set.
    pub fn assign<C>(
        &self,
        engine: &dyn OverlapEngine,
        anchors: &[OBox<f32>],
        gts: &GroundTruth<OBox<f32>, C>,
    ) -> Result<AssignResult<C>>
    where
        C: Copy,
    {
        if anchors.is_empty() {
            return self.assign_with_overlaps(Array2::zeros((0, gts.num_active())).view(), None, gts);
        }

        let active_boxes: Vec<_> = gts.active().map(|(_, label)| label.rect).collect();
        let ignored_boxes: Vec<_> = gts.ignored().map(|(_, label)| label.rect).collect();

        let overlaps = engine.overlaps(anchors, &active_boxes, OverlapMode::IoU)?;
        let ignore_iofs = match self.ignore_iof_thr {
            Some(_) if !ignored_boxes.is_empty() && !active_boxes.is_empty() => {
                Some(engine.overlaps(anchors, &ignored_boxes, OverlapMode::IoF)?)
            }
            _ => None,
        };

        self.assign_with_overlaps(
            overlaps.view(),
            ignore_iofs.as_ref().map(|iofs| iofs.view()),
            gts,
        )
    }

    /// Assign anchors from precomputed overlaps.
    ///
    /// `overlaps` has one row per anchor and one column per active ground
    /// truth in order. `ignore_iofs` has one column per ignored ground truth.
    pub fn assign_with_overlaps<C>(
        &self,
        overlaps: ArrayView2<'_, f32>,
        ignore_iofs: Option<ArrayView2<'_, f32>>,
        gts: &GroundTruth<OBox<f32>, C>,
    ) -> Result<AssignResult<C>>
    where
        C: Copy,
    {
        let (num_anchors, num_cols) = overlaps.dim();
        let active_indices: Vec<usize> = gts.active().map(|(index, _)| index).collect();

        ensure!(
            num_cols == active_indices.len(),
            "expect {} overlap columns, one per active ground truth, but get {}",
            active_indices.len(),
            num_cols
        );
        if let Some(iofs) = &ignore_iofs {
            ensure!(
                iofs.dim() == (num_anchors, gts.len() - active_indices.len()),
                "expect ignore IoFs of shape {:?}, but get {:?}",
                (num_anchors, gts.len() - active_indices.len()),
                iofs.dim()
            );
        }

        if num_anchors == 0 {
            if self.require_anchors {
                return Err(NoAnchors.into());
            }
            return Ok(AssignResult {
                num_gts: gts.len(),
                states: vec![],
                max_overlaps: vec![],
                labels: vec![],
            });
        }

        if active_indices.is_empty() {
            return Ok(AssignResult {
                num_gts: gts.len(),
                states: vec![AnchorState::Background; num_anchors],
                max_overlaps: vec![0.0; num_anchors],
                labels: vec![None; num_anchors],
            });
        }

        gts.active()
            .filter(|(_, label)| label.rect.area() <= 0.0)
            .for_each(|(index, _)| {
                warn!("ground truth {} has zero area and matches no anchor", index);
            });

        let is_ignored: Vec<bool> = match (ignore_iofs, self.ignore_iof_thr) {
            (Some(iofs), Some(thr)) => iofs
                .outer_iter()
                .map(|row| row.iter().any(|&iof| iof > thr.to_f32()))
                .collect(),
            _ => vec![false; num_anchors],
        };

        let pos_iou_thr = self.pos_iou_thr.to_f32();
        let mut max_overlaps = Vec::with_capacity(num_anchors);
        let mut states: Vec<AnchorState> = overlaps
            .outer_iter()
            .zip(&is_ignored)
            .map(|(row, &ignored)| {
                let (argmax, max) = argmax_first(row.iter().copied());
                max_overlaps.push(max);

                if ignored {
                    AnchorState::Ignored
                } else if self.neg_iou_thr.contains(max) {
                    AnchorState::Background
                } else if max >= pos_iou_thr {
                    AnchorState::Foreground {
                        gt_index: active_indices[argmax],
                    }
                } else {
                    AnchorState::Ignored
                }
            })
            .collect();

        if self.match_low_quality {
            self.match_low_quality_into(overlaps, &is_ignored, &active_indices, &mut states);
        }

        let labels = states
            .iter()
            .map(|state| {
                state
                    .gt_index()
                    .map(|gt_index| gts.labels()[gt_index].class)
            })
            .collect();

        let result = AssignResult {
            num_gts: gts.len(),
            states,
            max_overlaps,
            labels,
        };
        debug!(
            "assigned {} anchors: {} positive, {} negative",
            num_anchors,
            result.num_pos(),
            result.num_neg()
        );

        Ok(result)
    }

    /// Force each active ground truth onto its best available anchor.
    ///
    /// Ground truth with higher best overlaps claim first, ties going to
    /// the lower index. A claimed anchor is never taken over, so a ground
    /// truth whose best anchor is claimed falls back to its next best one.
    fn match_low_quality_into(
        &self,
        overlaps: ArrayView2<'_, f32>,
        is_ignored: &[bool],
        active_indices: &[usize],
        states: &mut [AnchorState],
    ) {
        let min_pos_iou = self.min_pos_iou.to_f32();
        let num_anchors = is_ignored.len();

        let best_overlaps: Vec<f32> = overlaps
            .axis_iter(Axis(1))
            .map(|column| {
                let candidates = column
                    .iter()
                    .zip(is_ignored)
                    .map(|(&overlap, &ignored)| if ignored { f32::NEG_INFINITY } else { overlap });
                argmax_first(candidates).1
            })
            .collect();
        let mut order: Vec<usize> = (0..active_indices.len()).collect();
        order.sort_by(|&lhs, &rhs| best_overlaps[rhs].total_cmp(&best_overlaps[lhs]));

        let mut claimed = vec![false; num_anchors];

        for col in order {
            let column = overlaps.column(col);
            let gt_index = active_indices[col];

            let candidates = column.iter().enumerate().map(|(anchor, &overlap)| {
                if is_ignored[anchor] || claimed[anchor] {
                    f32::NEG_INFINITY
                } else {
                    overlap
                }
            });
            let (best_anchor, gt_max) = argmax_first(candidates);
            if !(gt_max >= min_pos_iou) {
                continue;
            }

            claimed[best_anchor] = true;
            states[best_anchor] = AnchorState::Foreground { gt_index };

            if self.gt_max_assign_all {
                column
                    .iter()
                    .enumerate()
                    .filter(|&(anchor, &overlap)| {
                        overlap == gt_max && !is_ignored[anchor] && !claimed[anchor]
                    })
                    .for_each(|(anchor, _)| {
                        states[anchor] = AnchorState::Foreground { gt_index };
                    });
            }
        }
    }
}

/// The state of an anchor after assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AnchorState {
    Background,
    Ignored,
    /// Matched to the ground truth at the index of the full label list.
    Foreground { gt_index: usize },
}

impl AnchorState {
    pub fn gt_index(&self) -> Option<usize> {
        match *self {
            Self::Foreground { gt_index } => Some(gt_index),
            _ => None,
        }
    }

    pub fn is_foreground(&self) -> bool {
        matches!(self, Self::Foreground { .. })
    }

    pub fn is_background(&self) -> bool {
        matches!(self, Self::Background)
    }
}

/// The per-anchor assignment.
#[derive(Debug, Clone, PartialEq, Getters, CopyGetters)]
pub struct AssignResult<C> {
    /// The number of ground truth boxes, ignored ones included.
    #[getset(get_copy = "pub")]
    num_gts: usize,
    #[getset(get = "pub")]
    states: Vec<AnchorState>,
    /// The max overlap over active ground truth per anchor.
    #[getset(get = "pub")]
    max_overlaps: Vec<f32>,
    #[getset(get = "pub")]
    labels: Vec<Option<C>>,
}

impl<C> AssignResult<C> {
    pub fn num_anchors(&self) -> usize {
        self.states.len()
    }

    pub fn pos_indices(&self) -> Vec<usize> {
        self.indices_where(AnchorState::is_foreground)
    }

    pub fn neg_indices(&self) -> Vec<usize> {
        self.indices_where(AnchorState::is_background)
    }

    pub fn num_pos(&self) -> usize {
        self.states.iter().filter(|state| state.is_foreground()).count()
    }

    pub fn num_neg(&self) -> usize {
        self.states.iter().filter(|state| state.is_background()).count()
    }

    fn indices_where(&self, predicate: impl Fn(&AnchorState) -> bool) -> Vec<usize> {
        self.states
            .iter()
            .enumerate()
            .filter(|(_, state)| predicate(state))
            .map(|(index, _)| index)
            .collect()
    }
}

/// The first index of the max value. NaN never wins.
fn argmax_first(values: impl IntoIterator<Item = f32>) -> (usize, f32) {
    values
        .into_iter()
        .enumerate()
        .fold((0, f32::NEG_INFINITY), |(best_index, best), (index, value)| {
            if value > best {
                (index, value)
            } else {
                (best_index, best)
            }
        })
}

fn default_true() -> bool {
    true
}
