//! Non-maximum suppression of oriented boxes.

use crate::{
    common::*,
    overlap::{OverlapEngine, OverlapMode},
    ratio::Ratio,
};

/// The non-maximum suppression initializer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NmsInit {
    /// Boxes overlapping a kept box by more than this value are discarded.
    pub iou_thr: Ratio,
    /// Stop after keeping this many boxes.
    #[serde(default)]
    pub max_num: Option<usize>,
}

impl NmsInit {
    pub fn new(iou_thr: Ratio) -> Self {
        Self {
            iou_thr,
            max_num: None,
        }
    }

    pub fn build(self) -> Result<NonMaxSuppression> {
        let Self { iou_thr, max_num } = self;
        if let Some(max_num) = max_num {
            ensure!(max_num > 0, "max_num must be positive");
        }
        Ok(NonMaxSuppression {
            iou_thr: iou_thr.to_f32(),
            max_num,
        })
    }
}

/// Greedy non-maximum suppression.
#[derive(Debug, Clone, CopyGetters)]
pub struct NonMaxSuppression {
    #[getset(get_copy = "pub")]
    iou_thr: f32,
    #[getset(get_copy = "pub")]
    max_num: Option<usize>,
}

impl NonMaxSuppression {
    /// Run suppression on boxes and return the kept indices by descending
    /// score.
    pub fn run(
        &self,
        engine: &dyn OverlapEngine,
        boxes: &[OBox<f32>],
        scores: &[f32],
    ) -> Result<Vec<usize>> {
        ensure!(
            boxes.len() == scores.len(),
            "the number of boxes ({}) and scores ({}) mismatch",
            boxes.len(),
            scores.len()
        );
        if boxes.is_empty() {
            return Ok(vec![]);
        }
        let overlaps = engine.overlaps(boxes, boxes, OverlapMode::IoU)?;
        self.run_with_overlaps(overlaps.view(), scores)
    }

    /// Run suppression on a precomputed square overlap matrix.
    pub fn run_with_overlaps(
        &self,
        overlaps: ArrayView2<'_, f32>,
        scores: &[f32],
    ) -> Result<Vec<usize>> {
        let num_boxes = scores.len();
        ensure!(
            overlaps.dim() == (num_boxes, num_boxes),
            "expect overlaps of shape {:?}, but get {:?}",
            (num_boxes, num_boxes),
            overlaps.dim()
        );

        let order = score_order(scores);
        let max_num = self.max_num.unwrap_or(num_boxes);
        let mut suppressed = vec![false; num_boxes];
        let mut keep = vec![];

        for (nth, &index) in order.iter().enumerate() {
            if keep.len() >= max_num {
                break;
            }
            if suppressed[index] {
                continue;
            }
            keep.push(index);

            order[(nth + 1)..].iter().for_each(|&other| {
                if overlaps[[index, other]] > self.iou_thr {
                    suppressed[other] = true;
                }
            });
        }

        Ok(keep)
    }
}

/// Indices ordered by descending score, ties by ascending index, NaN last.
pub fn score_order(scores: &[f32]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&lhs, &rhs| {
        let lhs_score = scores[lhs];
        let rhs_score = scores[rhs];
        let by_score = match (lhs_score.is_nan(), rhs_score.is_nan()) {
            (false, false) => rhs_score.total_cmp(&lhs_score),
            (true, false) => Ordering::Greater,
            (false, true) => Ordering::Less,
            (true, true) => Ordering::Equal,
        };
        by_score.then(lhs.cmp(&rhs))
    });
    order
}

/// A detected box.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub obox: OBox<f32>,
    pub score: f32,
    pub class: usize,
}

/// The multi-class suppression initializer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultiClassNmsInit {
    /// Scores at or below this value are dropped.
    pub score_thr: Ratio,
    /// Boxes with a side shorter than this value are dropped.
    #[serde(default = "default_min_bbox_size")]
    pub min_bbox_size: R64,
    pub nms: NmsInit,
    #[serde(default)]
    pub max_per_img: Option<usize>,
}

impl MultiClassNmsInit {
    pub fn build(self) -> Result<MultiClassNms> {
        let Self {
            score_thr,
            min_bbox_size,
            nms,
            max_per_img,
        } = self;
        ensure!(
            min_bbox_size >= 0.0,
            "min_bbox_size must be non-negative, but get {}",
            min_bbox_size
        );

        Ok(MultiClassNms {
            score_thr: score_thr.to_f32(),
            min_bbox_size: min_bbox_size.raw() as f32,
            nms: nms.build()?,
            max_per_img,
        })
    }
}

fn default_min_bbox_size() -> R64 {
    r64(0.0)
}

/// Per-class suppression over a shared set of boxes.
#[derive(Debug, Clone, Getters, CopyGetters)]
pub struct MultiClassNms {
    #[getset(get_copy = "pub")]
    score_thr: f32,
    #[getset(get_copy = "pub")]
    min_bbox_size: f32,
    #[getset(get = "pub")]
    nms: NonMaxSuppression,
    #[getset(get_copy = "pub")]
    max_per_img: Option<usize>,
}

impl MultiClassNms {
    /// Suppress boxes class by class.
    ///
    /// `scores` has one row per box and one column per class. The result
    /// is ordered by descending score.
    pub fn run(
        &self,
        engine: &dyn OverlapEngine,
        boxes: &[OBox<f32>],
        scores: ArrayView2<'_, f32>,
    ) -> Result<Vec<Detection>> {
        ensure!(
            scores.nrows() == boxes.len(),
            "the number of boxes ({}) and score rows ({}) mismatch",
            boxes.len(),
            scores.nrows()
        );

        let valid: Vec<usize> = boxes
            .iter()
            .enumerate()
            .filter(|(_, obox)| obox.w() >= self.min_bbox_size && obox.h() >= self.min_bbox_size)
            .map(|(index, _)| index)
            .collect();

        let per_class: Vec<Vec<Detection>> = (0..scores.ncols())
            .into_par_iter()
            .map(|class| -> Result<Vec<Detection>> {
                let column = scores.column(class);
                let candidates: Vec<usize> = valid
                    .iter()
                    .copied()
                    .filter(|&index| column[index] > self.score_thr)
                    .collect();
                let class_boxes: Vec<OBox<f32>> =
                    candidates.iter().map(|&index| boxes[index]).collect();
                let class_scores: Vec<f32> =
                    candidates.iter().map(|&index| column[index]).collect();

                let keep = self.nms.run(engine, &class_boxes, &class_scores)?;
                let detections: Vec<Detection> = keep
                    .into_iter()
                    .map(|nth| Detection {
                        obox: class_boxes[nth],
                        score: class_scores[nth],
                        class,
                    })
                    .collect();
                Ok(detections)
            })
            .collect::<Result<_>>()?;

        let mut detections: Vec<Detection> = per_class.into_iter().flatten().collect();
        detections.sort_by(|lhs, rhs| rhs.score.total_cmp(&lhs.score));
        if let Some(max_per_img) = self.max_per_img {
            detections.truncate(max_per_img);
        }

        debug!("kept {} detections", detections.len());
        Ok(detections)
    }
}
