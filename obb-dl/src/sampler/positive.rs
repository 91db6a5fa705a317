use super::{random_choice, set_difference};
use crate::{assigner::AssignResult, common::*};

/// The positive sampling strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PosStrategy {
    /// Uniform random draw.
    Random,
    /// Spread the budget evenly over the matched ground truth boxes.
    InstanceBalanced,
}

impl Default for PosStrategy {
    fn default() -> Self {
        Self::Random
    }
}

impl PosStrategy {
    pub(crate) fn sample<C, R>(
        &self,
        assign: &AssignResult<C>,
        num_expected: usize,
        rng: &mut R,
    ) -> Vec<usize>
    where
        R: Rng + ?Sized,
    {
        let pos_indices = assign.pos_indices();
        if pos_indices.len() <= num_expected {
            return pos_indices;
        }

        match self {
            Self::Random => random_choice(&pos_indices, num_expected, rng),
            Self::InstanceBalanced => instance_balanced(assign, &pos_indices, num_expected, rng),
        }
    }
}

fn instance_balanced<C, R>(
    assign: &AssignResult<C>,
    pos_indices: &[usize],
    num_expected: usize,
    rng: &mut R,
) -> Vec<usize>
where
    R: Rng + ?Sized,
{
    let states = assign.states();
    let mut per_gt: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    pos_indices.iter().for_each(|&index| {
        if let Some(gt_index) = states[index].gt_index() {
            per_gt.entry(gt_index).or_default().push(index);
        }
    });

    let quota = (num_expected as f64 / per_gt.len() as f64).round_ties_even() as usize + 1;
    let sampled: Vec<usize> = per_gt
        .values()
        .flat_map(|indices| random_choice(indices, quota, rng))
        .collect();

    match sampled.len().cmp(&num_expected) {
        Ordering::Less => {
            let num_extra = num_expected - sampled.len();
            let extra = set_difference(pos_indices, &sampled);
            sampled
                .into_iter()
                .chain(random_choice(&extra, num_extra, rng))
                .collect()
        }
        Ordering::Greater => random_choice(&sampled, num_expected, rng),
        Ordering::Equal => sampled,
    }
}
