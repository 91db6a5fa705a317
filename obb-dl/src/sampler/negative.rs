use super::{fill_up, random_choice};
use crate::{assigner::AssignResult, common::*, ratio::Ratio};

/// The negative sampling strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum NegStrategy {
    /// Uniform random draw.
    Random,
    /// Draw hard negatives evenly over overlap intervals.
    IoUBalanced {
        /// Negatives below this overlap form the floor set. Negative
        /// values disable the floor set.
        floor_thr: R64,
        /// The budget fraction drawn from the floor set.
        floor_fraction: Ratio,
        /// The number of overlap intervals above the floor.
        num_bins: usize,
    },
}

impl Default for NegStrategy {
    fn default() -> Self {
        Self::Random
    }
}

impl NegStrategy {
    pub(crate) fn sample<C, R>(
        &self,
        assign: &AssignResult<C>,
        num_expected: usize,
        rng: &mut R,
    ) -> Vec<usize>
    where
        R: Rng + ?Sized,
    {
        let neg_indices = assign.neg_indices();
        if neg_indices.len() <= num_expected {
            return neg_indices;
        }

        match *self {
            Self::Random => random_choice(&neg_indices, num_expected, rng),
            Self::IoUBalanced {
                floor_thr,
                floor_fraction,
                num_bins,
            } => IoUBalanced {
                max_overlaps: assign.max_overlaps(),
                floor_thr: floor_thr.raw() as f32,
                floor_fraction,
                num_bins,
            }
            .sample(&neg_indices, num_expected, rng),
        }
    }
}

struct IoUBalanced<'a> {
    max_overlaps: &'a [f32],
    floor_thr: f32,
    floor_fraction: Ratio,
    num_bins: usize,
}

impl IoUBalanced<'_> {
    fn sample<R>(&self, neg_indices: &[usize], num_expected: usize, rng: &mut R) -> Vec<usize>
    where
        R: Rng + ?Sized,
    {
        let overlap_of = |index: usize| self.max_overlaps[index];

        let (floor_set, iou_set, floor_thr): (Vec<usize>, Vec<usize>, f32) = if self.floor_thr > 0.0 {
            let (floor, iou) = neg_indices
                .iter()
                .copied()
                .filter(|&index| overlap_of(index) >= 0.0)
                .partition(|&index| overlap_of(index) < self.floor_thr);
            (floor, iou, self.floor_thr)
        } else if self.floor_thr == 0.0 {
            let floor = neg_indices
                .iter()
                .copied()
                .filter(|&index| overlap_of(index) == 0.0)
                .collect();
            let iou = neg_indices
                .iter()
                .copied()
                .filter(|&index| overlap_of(index) > 0.0)
                .collect();
            (floor, iou, 0.0)
        } else {
            let iou = neg_indices
                .iter()
                .copied()
                .filter(|&index| overlap_of(index) > self.floor_thr)
                .collect();
            (vec![], iou, 0.0)
        };

        let num_expected_iou = (num_expected as f64 * (1.0 - self.floor_fraction.to_f64())) as usize;
        let iou_sampled = if iou_set.len() > num_expected_iou {
            if self.num_bins >= 2 {
                self.sample_via_interval(&iou_set, floor_thr, num_expected_iou, rng)
            } else {
                random_choice(&iou_set, num_expected_iou, rng)
            }
        } else {
            iou_set
        };

        let num_expected_floor = num_expected.saturating_sub(iou_sampled.len());
        let floor_sampled = random_choice(&floor_set, num_expected_floor, rng);

        let sampled: Vec<usize> = floor_sampled.into_iter().chain(iou_sampled).collect();
        fill_up(sampled, neg_indices, num_expected, rng)
    }

    fn sample_via_interval<R>(
        &self,
        candidates: &[usize],
        floor_thr: f32,
        num_expected: usize,
        rng: &mut R,
    ) -> Vec<usize>
    where
        R: Rng + ?Sized,
    {
        let max_iou = self
            .max_overlaps
            .iter()
            .copied()
            .filter(|overlap| overlap.is_finite())
            .fold(f32::NEG_INFINITY, f32::max);
        let interval = (max_iou - floor_thr) / self.num_bins as f32;
        let per_bin = num_expected / self.num_bins;

        let sampled: Vec<usize> = (0..self.num_bins)
            .flat_map(|bin| {
                let start = floor_thr + bin as f32 * interval;
                let end = floor_thr + (bin + 1) as f32 * interval;
                let in_bin: Vec<usize> = candidates
                    .iter()
                    .copied()
                    .filter(|&index| {
                        let overlap = self.max_overlaps[index];
                        overlap >= start && overlap < end
                    })
                    .collect();
                random_choice(&in_bin, per_bin, rng)
            })
            .collect();

        fill_up(sampled, candidates, num_expected, rng)
    }
}
