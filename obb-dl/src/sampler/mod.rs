//! Positive and negative anchor sampling.

mod negative;
mod positive;

pub use negative::*;
pub use positive::*;

use crate::{assigner::AssignResult, common::*, ratio::Ratio};
use std::collections::BTreeSet;

/// The choice of sampler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SamplerConfig {
    /// Keep all positive and negative anchors.
    Pseudo,
    /// Draw a fixed budget of anchors with a positive fraction.
    Balanced(SamplerInit),
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self::Pseudo
    }
}

impl SamplerConfig {
    pub fn build(&self) -> Result<Sampler> {
        let sampler = match self {
            Self::Pseudo => Sampler::Pseudo,
            Self::Balanced(init) => Sampler::Balanced(init.clone().build()?),
        };
        Ok(sampler)
    }
}

/// The balanced sampler initializer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SamplerInit {
    /// The total number of sampled anchors.
    pub num: usize,
    pub pos_fraction: Ratio,
    /// Caps negatives at this multiple of the sampled positives.
    #[serde(default)]
    pub neg_pos_ub: Option<R64>,
    #[serde(default)]
    pub pos: PosStrategy,
    #[serde(default)]
    pub neg: NegStrategy,
}

impl SamplerInit {
    pub fn new(num: usize, pos_fraction: Ratio) -> Self {
        Self {
            num,
            pos_fraction,
            neg_pos_ub: None,
            pos: PosStrategy::default(),
            neg: NegStrategy::default(),
        }
    }

    pub fn build(self) -> Result<BalancedSampler> {
        let Self {
            num,
            pos_fraction,
            neg_pos_ub,
            pos,
            neg,
        } = self;

        if let Some(ub) = neg_pos_ub {
            ensure!(ub >= 0.0, "neg_pos_ub must be non-negative, but get {}", ub);
        }
        if let NegStrategy::IoUBalanced { num_bins, .. } = neg {
            ensure!(num_bins >= 1, "num_bins must be positive");
        }

        Ok(BalancedSampler {
            num,
            pos_fraction,
            neg_pos_ub: neg_pos_ub.map(|ub| ub.raw()),
            pos,
            neg,
        })
    }
}

#[derive(Debug, Clone)]
pub enum Sampler {
    Pseudo,
    Balanced(BalancedSampler),
}

impl Sampler {
    pub fn sample<C, R>(&self, assign: &AssignResult<C>, rng: &mut R) -> SamplingResult
    where
        R: Rng + ?Sized,
    {
        let (pos_indices, neg_indices) = match self {
            Self::Pseudo => (assign.pos_indices(), assign.neg_indices()),
            Self::Balanced(sampler) => sampler.sample_indices(assign, rng),
        };
        SamplingResult::new(assign, pos_indices, neg_indices)
    }
}

/// Samples a fixed budget of anchors.
#[derive(Debug, Clone, CopyGetters)]
pub struct BalancedSampler {
    #[getset(get_copy = "pub")]
    num: usize,
    #[getset(get_copy = "pub")]
    pos_fraction: Ratio,
    #[getset(get_copy = "pub")]
    neg_pos_ub: Option<f64>,
    pos: PosStrategy,
    neg: NegStrategy,
}

impl BalancedSampler {
    fn sample_indices<C, R>(&self, assign: &AssignResult<C>, rng: &mut R) -> (Vec<usize>, Vec<usize>)
    where
        R: Rng + ?Sized,
    {
        let num_expected_pos = self.pos_fraction.floor_of(self.num);
        let pos_indices = self.pos.sample(assign, num_expected_pos, rng);
        let num_sampled_pos = pos_indices.len();

        let num_expected_neg = {
            let remaining = self.num - num_sampled_pos;
            match self.neg_pos_ub {
                Some(ub) => {
                    let upper_bound = (ub * num_sampled_pos.max(1) as f64) as usize;
                    remaining.min(upper_bound)
                }
                None => remaining,
            }
        };
        let neg_indices = self.neg.sample(assign, num_expected_neg, rng);

        debug!(
            "sampled {} positive and {} negative anchors",
            pos_indices.len(),
            neg_indices.len()
        );
        (pos_indices, neg_indices)
    }
}

/// The sampled anchor indices.
#[derive(Debug, Clone, PartialEq, Eq, Getters, CopyGetters)]
pub struct SamplingResult {
    /// Sorted positive anchor indices.
    #[getset(get = "pub")]
    pos_indices: Vec<usize>,
    /// Sorted negative anchor indices.
    #[getset(get = "pub")]
    neg_indices: Vec<usize>,
    /// The matched ground truth of each positive anchor.
    #[getset(get = "pub")]
    pos_gt_indices: Vec<usize>,
    #[getset(get_copy = "pub")]
    num_gts: usize,
}

impl SamplingResult {
    fn new<C>(assign: &AssignResult<C>, mut pos_indices: Vec<usize>, mut neg_indices: Vec<usize>) -> Self {
        pos_indices.sort_unstable();
        neg_indices.sort_unstable();

        let states = assign.states();
        let pos_gt_indices = pos_indices
            .iter()
            .filter_map(|&index| states[index].gt_index())
            .collect();

        Self {
            pos_indices,
            neg_indices,
            pos_gt_indices,
            num_gts: assign.num_gts(),
        }
    }

    pub fn num_pos(&self) -> usize {
        self.pos_indices.len()
    }

    pub fn num_neg(&self) -> usize {
        self.neg_indices.len()
    }
}

/// Draw `amount` distinct items, or all of them when there are not enough.
pub(crate) fn random_choice<R>(items: &[usize], amount: usize, rng: &mut R) -> Vec<usize>
where
    R: Rng + ?Sized,
{
    if items.len() <= amount {
        return items.to_vec();
    }
    rand::seq::index::sample(rng, items.len(), amount)
        .into_iter()
        .map(|index| items[index])
        .collect()
}

/// Items of `items` absent from `excluded`, in order.
pub(crate) fn set_difference(items: &[usize], excluded: &[usize]) -> Vec<usize> {
    let excluded: BTreeSet<_> = excluded.iter().copied().collect();
    items
        .iter()
        .copied()
        .filter(|index| !excluded.contains(index))
        .collect()
}

/// Top up `sampled` to `num_expected` with random picks from the rest of
/// `candidates`.
pub(crate) fn fill_up<R>(
    mut sampled: Vec<usize>,
    candidates: &[usize],
    num_expected: usize,
    rng: &mut R,
) -> Vec<usize>
where
    R: Rng + ?Sized,
{
    if sampled.len() < num_expected {
        let extra = set_difference(candidates, &sampled);
        let num_extra = num_expected - sampled.len();
        sampled.extend(random_choice(&extra, num_extra, rng));
    }
    sampled
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        assigner::{MaxIoUAssignerInit, NegIouThr},
        ratio::ratio,
    };
    use ndarray::Array2;

    /// The first `num_pos` anchors match gt 0 and the rest are negative.
    pub(super) fn assign_result(num_anchors: usize, num_pos: usize) -> AssignResult<usize> {
        let gts: GroundTruth<_, usize> =
            vec![Label::new(OBox::from_cxcywha([0.0, 0.0, 4.0, 4.0, 0.0]), 7)].into();
        let overlaps = Array2::from_shape_fn((num_anchors, 1), |(row, _)| {
            if row < num_pos {
                0.9
            } else {
                (row % 40) as f32 / 100.0
            }
        });
        let mut init = MaxIoUAssignerInit::new(ratio(0.5), NegIouThr::Below(ratio(0.4)));
        init.match_low_quality = false;
        init.build()
            .unwrap()
            .assign_with_overlaps(overlaps.view(), None, &gts)
            .unwrap()
    }

    #[test]
    fn sampler_random_caps() {
        let assign = assign_result(300, 300);
        let sampler = SamplerConfig::Balanced(SamplerInit::new(256, ratio(0.5)))
            .build()
            .unwrap();
        let mut rng = StdRng::seed_from_u64(1);
        let result = sampler.sample(&assign, &mut rng);
        assert_eq!(result.num_pos(), 128);
        assert_eq!(result.num_neg(), 0);
        assert!(result.pos_gt_indices().iter().all(|&gt| gt == 0));

        let assign = assign_result(300, 10);
        let result = sampler.sample(&assign, &mut rng);
        assert_eq!(result.num_pos(), 10);
        assert_eq!(result.num_neg(), 246);
        assert!(result.pos_indices().windows(2).all(|pair| pair[0] < pair[1]));
        assert!(result.neg_indices().windows(2).all(|pair| pair[0] < pair[1]));
        assert!(result.neg_indices().iter().all(|&index| index >= 10));
    }

    #[test]
    fn sampler_neg_pos_upper_bound() {
        let assign = assign_result(300, 10);
        let mut init = SamplerInit::new(256, ratio(0.5));
        init.neg_pos_ub = Some(r64(3.0));
        let sampler = SamplerConfig::Balanced(init).build().unwrap();
        let result = sampler.sample(&assign, &mut StdRng::seed_from_u64(2));
        assert_eq!(result.num_pos(), 10);
        assert_eq!(result.num_neg(), 30);

        let assign = assign_result(300, 0);
        let result = sampler.sample(&assign, &mut StdRng::seed_from_u64(2));
        assert_eq!(result.num_pos(), 0);
        assert_eq!(result.num_neg(), 3);
    }

    #[test]
    fn sampler_pseudo_keeps_all() {
        let assign = assign_result(300, 10);
        let result = SamplerConfig::Pseudo
            .build()
            .unwrap()
            .sample(&assign, &mut StdRng::seed_from_u64(0));
        assert_eq!(result.pos_indices(), &assign.pos_indices());
        assert_eq!(result.neg_indices(), &assign.neg_indices());
        assert_eq!(result.num_gts(), 1);
    }

    #[test]
    fn sampler_is_deterministic() {
        let assign = assign_result(300, 150);
        let sampler = SamplerConfig::Balanced(SamplerInit::new(64, ratio(0.25)))
            .build()
            .unwrap();
        let lhs = sampler.sample(&assign, &mut StdRng::seed_from_u64(9));
        let rhs = sampler.sample(&assign, &mut StdRng::seed_from_u64(9));
        assert_eq!(lhs, rhs);
    }

    #[test]
    fn sampler_config_deserialize() {
        let config: SamplerConfig = json5::from_str(
            r#"{
                type: "Balanced",
                num: 512,
                pos_fraction: 0.25,
                neg: { type: "IoUBalanced", floor_thr: -1, floor_fraction: 0, num_bins: 3 },
            }"#,
        )
        .unwrap();
        match &config {
            SamplerConfig::Balanced(init) => {
                assert_eq!(init.num, 512);
                assert_eq!(init.pos, PosStrategy::Random);
                assert!(matches!(init.neg, NegStrategy::IoUBalanced { num_bins: 3, .. }));
            }
            _ => panic!("expect a balanced sampler"),
        }
        assert!(config.build().is_ok());
    }
}
