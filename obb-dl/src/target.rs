//! Classification and regression targets of anchors.

use crate::{
    assigner::{Assigner, AssignerConfig},
    coder::{DeltaXYWHTCoder, DeltaXYWHTCoderInit},
    common::*,
    overlap::OverlapEngine,
    sampler::{Sampler, SamplerConfig},
};

/// The anchor target initializer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnchorTargetInit {
    pub assigner: AssignerConfig,
    #[serde(default)]
    pub sampler: SamplerConfig,
    #[serde(default)]
    pub coder: DeltaXYWHTCoderInit,
    /// Anchors beyond the image border by more than this value are
    /// excluded. All anchors are kept when unset.
    #[serde(default)]
    pub allowed_border: Option<R64>,
    /// The classification weight of positive anchors, 1 when unset.
    #[serde(default)]
    pub pos_weight: Option<R64>,
}

impl AnchorTargetInit {
    pub fn new(assigner: AssignerConfig) -> Self {
        Self {
            assigner,
            sampler: SamplerConfig::default(),
            coder: DeltaXYWHTCoderInit::default(),
            allowed_border: None,
            pos_weight: None,
        }
    }

    pub fn build(self) -> Result<AnchorTarget> {
        let Self {
            assigner,
            sampler,
            coder,
            allowed_border,
            pos_weight,
        } = self;

        if let Some(weight) = pos_weight {
            ensure!(weight > 0.0, "pos_weight must be positive, but get {}", weight);
        }

        Ok(AnchorTarget {
            assigner: assigner.build().context("invalid assigner")?,
            sampler: sampler.build().context("invalid sampler")?,
            coder: coder.build().context("invalid coder")?,
            allowed_border: allowed_border.map(|border| border.raw() as f32),
            pos_weight: pos_weight.map(|weight| weight.raw() as f32).unwrap_or(1.0),
        })
    }
}

/// Computes training targets of anchors against ground truth.
#[derive(Debug, Clone, Getters, CopyGetters)]
pub struct AnchorTarget {
    #[getset(get = "pub")]
    assigner: Assigner,
    #[getset(get = "pub")]
    sampler: Sampler,
    #[getset(get = "pub")]
    coder: DeltaXYWHTCoder,
    #[getset(get_copy = "pub")]
    allowed_border: Option<f32>,
    #[getset(get_copy = "pub")]
    pos_weight: f32,
}

impl AnchorTarget {
    /// Whether each anchor takes part in training on an image of the size.
    pub fn inside_flags(&self, anchors: &[OBox<f32>], image_size: &HW<usize>) -> Vec<bool> {
        let border = match self.allowed_border {
            Some(border) => border,
            None => return vec![true; anchors.len()],
        };
        let window = HW::from_hw([image_size.h() as f32, image_size.w() as f32]).to_tlbr();

        anchors
            .iter()
            .map(|anchor| anchor.to_tlbr().is_inside(&window, border))
            .collect()
    }

    /// Compute the targets of all anchors on one image.
    pub fn compute<C, R>(
        &self,
        engine: &dyn OverlapEngine,
        anchors: &[OBox<f32>],
        image_size: &HW<usize>,
        gts: &GroundTruth<OBox<f32>, C>,
        rng: &mut R,
    ) -> Result<AnchorTargets<C>>
    where
        C: Copy,
        R: Rng + ?Sized,
    {
        let num_anchors = anchors.len();
        let inside_indices: Vec<usize> = self
            .inside_flags(anchors, image_size)
            .into_iter()
            .enumerate()
            .filter(|(_, inside)| *inside)
            .map(|(index, _)| index)
            .collect();
        let inside_anchors: Vec<OBox<f32>> =
            inside_indices.iter().map(|&index| anchors[index]).collect();

        let assign = self.assigner.assign(engine, &inside_anchors, gts)?;
        let sampling = self.sampler.sample(&assign, rng);

        let pos_indices: Vec<usize> = sampling
            .pos_indices()
            .iter()
            .map(|&local| inside_indices[local])
            .collect();
        let neg_indices: Vec<usize> = sampling
            .neg_indices()
            .iter()
            .map(|&local| inside_indices[local])
            .collect();

        let mut labels: Vec<Option<C>> = vec![None; num_anchors];
        let mut label_weights = Array1::<f32>::zeros(num_anchors);
        let mut bbox_targets = Array2::<f32>::zeros((num_anchors, 5));
        let mut bbox_weights = Array2::<f32>::zeros((num_anchors, 5));

        let gt_labels = gts.labels();
        let pos_anchors: Vec<OBox<f32>> = pos_indices.iter().map(|&index| anchors[index]).collect();
        let pos_gts: Vec<OBox<f32>> = sampling
            .pos_gt_indices()
            .iter()
            .map(|&gt_index| gt_labels[gt_index].rect)
            .collect();
        let pos_targets = self.coder.encode_batch(&pos_anchors, &pos_gts)?;

        izip!(&pos_indices, sampling.pos_gt_indices(), pos_targets.outer_iter()).for_each(
            |(&index, &gt_index, deltas)| {
                labels[index] = Some(gt_labels[gt_index].class);
                label_weights[index] = self.pos_weight;
                bbox_targets.row_mut(index).assign(&deltas);
                bbox_weights.row_mut(index).fill(1.0);
            },
        );
        neg_indices.iter().for_each(|&index| {
            label_weights[index] = 1.0;
        });

        Ok(AnchorTargets {
            labels,
            label_weights,
            bbox_targets,
            bbox_weights,
            pos_indices,
            neg_indices,
        })
    }

    /// Compute the targets of a batch of images in parallel.
    ///
    /// Image `i` samples with a generator seeded by `seed + i`, so the
    /// result does not depend on the scheduling.
    pub fn compute_batch<C>(
        &self,
        engine: &dyn OverlapEngine,
        anchors: &[OBox<f32>],
        images: &[(HW<usize>, GroundTruth<OBox<f32>, C>)],
        seed: u64,
    ) -> Result<BatchTargets<C>>
    where
        C: Copy + Send + Sync,
    {
        let targets: Vec<AnchorTargets<C>> = images
            .par_iter()
            .enumerate()
            .map(|(index, (image_size, gts))| {
                let mut rng = StdRng::seed_from_u64(seed.wrapping_add(index as u64));
                self.compute(engine, anchors, image_size, gts, &mut rng)
                    .with_context(|| format!("failed to compute targets of image {}", index))
            })
            .collect::<Result<_>>()?;

        let num_total_pos = targets.iter().map(AnchorTargets::num_pos).sum();
        let num_total_neg = targets.iter().map(AnchorTargets::num_neg).sum();
        debug!(
            "computed targets of {} images, {} positive and {} negative anchors in total",
            targets.len(),
            num_total_pos,
            num_total_neg
        );

        Ok(BatchTargets {
            targets,
            num_total_pos,
            num_total_neg,
        })
    }
}

/// The targets of every anchor on one image.
///
/// Anchors that are neither sampled positive nor negative have zero
/// weights.
#[derive(Debug, Clone, PartialEq, Getters)]
#[getset(get = "pub")]
pub struct AnchorTargets<C> {
    labels: Vec<Option<C>>,
    label_weights: Array1<f32>,
    /// Encoded deltas in `[N, 5]`.
    bbox_targets: Array2<f32>,
    bbox_weights: Array2<f32>,
    pos_indices: Vec<usize>,
    neg_indices: Vec<usize>,
}

impl<C> AnchorTargets<C> {
    pub fn num_anchors(&self) -> usize {
        self.labels.len()
    }

    pub fn num_pos(&self) -> usize {
        self.pos_indices.len()
    }

    pub fn num_neg(&self) -> usize {
        self.neg_indices.len()
    }
}

/// The targets of a batch of images.
#[derive(Debug, Clone, PartialEq, Getters, CopyGetters)]
pub struct BatchTargets<C> {
    #[getset(get = "pub")]
    targets: Vec<AnchorTargets<C>>,
    #[getset(get_copy = "pub")]
    num_total_pos: usize,
    #[getset(get_copy = "pub")]
    num_total_neg: usize,
}

impl<C> BatchTargets<C> {
    pub fn into_targets(self) -> Vec<AnchorTargets<C>> {
        self.targets
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        assigner::{MaxIoUAssignerInit, NegIouThr},
        overlap::ScalarEngine,
        ratio::ratio,
    };
    use approx::assert_abs_diff_eq;

    fn anchor_target(allowed_border: Option<f64>) -> AnchorTarget {
        AnchorTargetInit {
            allowed_border: allowed_border.map(r64),
            pos_weight: Some(r64(2.0)),
            ..AnchorTargetInit::new(AssignerConfig::MaxIoU(MaxIoUAssignerInit::new(
                ratio(0.5),
                NegIouThr::Below(ratio(0.4)),
            )))
        }
        .build()
        .unwrap()
    }

    fn anchors() -> Vec<OBox<f32>> {
        vec![
            OBox::from_cxcywha([-20.0, -20.0, 20.0, 10.0, 0.0]),
            OBox::from_cxcywha([50.0, 50.0, 20.0, 10.0, 0.0]),
            OBox::from_cxcywha([90.0, 90.0, 10.0, 10.0, 0.0]),
            OBox::from_cxcywha([52.0, 50.0, 20.0, 10.0, 0.0]),
        ]
    }

    #[test]
    fn target_unmap_to_all_anchors() {
        let target = anchor_target(Some(0.0));
        let image_size = HW::from_hw([100, 100]);
        let gts = GroundTruth::new(vec![Label::new(
            OBox::from_cxcywha([50.0, 50.0, 20.0, 10.0, 0.0]),
            7usize,
        )]);

        let flags = target.inside_flags(&anchors(), &image_size);
        assert_eq!(flags, [false, true, true, true]);

        let mut rng = StdRng::seed_from_u64(0);
        let targets = target
            .compute(&ScalarEngine, &anchors(), &image_size, &gts, &mut rng)
            .unwrap();

        assert_eq!(targets.num_anchors(), 4);
        assert_eq!(targets.pos_indices(), &[1, 3]);
        assert_eq!(targets.neg_indices(), &[2]);
        assert_eq!(targets.labels(), &[None, Some(7), None, Some(7)]);
        assert_eq!(targets.label_weights().to_vec(), [0.0, 2.0, 1.0, 2.0]);

        // the exact match encodes to zero deltas
        targets
            .bbox_targets()
            .row(1)
            .iter()
            .for_each(|&delta| assert_abs_diff_eq!(delta, 0.0, epsilon = 1e-6));
        assert_abs_diff_eq!(targets.bbox_targets()[[3, 0]], -0.1, epsilon = 1e-6);
        assert_eq!(targets.bbox_weights().row(3).to_vec(), [1.0; 5]);
        assert_eq!(targets.bbox_weights().row(2).to_vec(), [0.0; 5]);
    }

    #[test]
    fn target_without_border_keeps_all_anchors() {
        let target = anchor_target(None);
        let image_size = HW::from_hw([100, 100]);
        assert!(target
            .inside_flags(&anchors(), &image_size)
            .into_iter()
            .all(|inside| inside));

        let gts: GroundTruth<OBox<f32>, usize> = GroundTruth::default();
        let mut rng = StdRng::seed_from_u64(0);
        let targets = target
            .compute(&ScalarEngine, &anchors(), &image_size, &gts, &mut rng)
            .unwrap();
        assert_eq!(targets.num_pos(), 0);
        assert_eq!(targets.neg_indices(), &[0, 1, 2, 3]);
        assert_eq!(targets.label_weights().to_vec(), [1.0; 4]);
    }

    #[test]
    fn target_batch_totals() {
        let target = anchor_target(Some(0.0));
        let gt = Label::new(OBox::from_cxcywha([50.0, 50.0, 20.0, 10.0, 0.0]), 0usize);
        let images = vec![
            (HW::from_hw([100, 100]), GroundTruth::new(vec![gt])),
            (HW::from_hw([100, 100]), GroundTruth::default()),
        ];

        let batch = target
            .compute_batch(&ScalarEngine, &anchors(), &images, 42)
            .unwrap();
        assert_eq!(batch.targets().len(), 2);
        assert_eq!(batch.num_total_pos(), 2);
        assert_eq!(batch.num_total_neg(), 1 + 3);
    }

    #[test]
    fn target_reject_invalid_pos_weight() {
        let init = AnchorTargetInit {
            pos_weight: Some(r64(0.0)),
            ..AnchorTargetInit::new(AssignerConfig::MaxIoU(MaxIoUAssignerInit::new(
                ratio(0.5),
                NegIouThr::Below(ratio(0.4)),
            )))
        };
        assert!(init.build().is_err());
    }
}
