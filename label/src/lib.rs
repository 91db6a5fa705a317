//! Labeled boxes and per-image ground truth.

use bbox::{AngleRange, Element, OBox, Poly, Transform, TLBR};
use num_traits::Num;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use std::ops::Mul;

/// A box with a class and an ignore mark.
///
/// Ignored labels take no part in matching as targets. They only mark
/// regions whose anchors are excluded from training.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Label<R, C> {
    pub rect: R,
    pub class: C,
    #[cfg_attr(feature = "serde", serde(default))]
    pub ignore: bool,
}

impl<R, C> Label<R, C> {
    pub fn new(rect: R, class: C) -> Self {
        Self {
            rect,
            class,
            ignore: false,
        }
    }

    pub fn ignored(rect: R, class: C) -> Self {
        Self {
            rect,
            class,
            ignore: true,
        }
    }

    pub fn map_rect<S, F>(self, f: F) -> Label<S, C>
    where
        F: FnOnce(R) -> S,
    {
        Label {
            rect: f(self.rect),
            class: self.class,
            ignore: self.ignore,
        }
    }
}

impl<T, C> Label<OBox<T>, C>
where
    T: Element,
    C: Copy,
{
    pub fn transform(&self, transform: &Transform<T>, range: AngleRange) -> Self {
        Label {
            rect: self.rect.transform(transform, range),
            class: self.class,
            ignore: self.ignore,
        }
    }
}

impl<'a, T, C> Mul<&'a Label<TLBR<T>, C>> for &'a Transform<T>
where
    T: Copy + Num + PartialOrd,
    C: Copy,
{
    type Output = Label<TLBR<T>, C>;

    fn mul(self, rhs: &'a Label<TLBR<T>, C>) -> Self::Output {
        Label {
            rect: self * &rhs.rect,
            class: rhs.class,
            ignore: rhs.ignore,
        }
    }
}

impl<'a, T, C> Mul<&'a Label<Poly<T>, C>> for &'a Transform<T>
where
    T: Element,
    C: Copy,
{
    type Output = Label<Poly<T>, C>;

    fn mul(self, rhs: &'a Label<Poly<T>, C>) -> Self::Output {
        Label {
            rect: self * &rhs.rect,
            class: rhs.class,
            ignore: rhs.ignore,
        }
    }
}

/// The labels of one image.
///
/// Indices into the ground truth always refer to the full label list,
/// ignored labels included.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct GroundTruth<R, C> {
    labels: Vec<Label<R, C>>,
}

impl<R, C> Default for GroundTruth<R, C> {
    fn default() -> Self {
        Self { labels: vec![] }
    }
}

impl<R, C> GroundTruth<R, C> {
    pub fn new(labels: Vec<Label<R, C>>) -> Self {
        Self { labels }
    }

    pub fn labels(&self) -> &[Label<R, C>] {
        &self.labels
    }

    pub fn into_labels(self) -> Vec<Label<R, C>> {
        self.labels
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn push(&mut self, label: Label<R, C>) {
        self.labels.push(label);
    }

    /// Labels taking part in matching, paired with their indices.
    pub fn active(&self) -> impl Iterator<Item = (usize, &Label<R, C>)> {
        self.labels
            .iter()
            .enumerate()
            .filter(|(_, label)| !label.ignore)
    }

    /// Ignored labels, paired with their indices.
    pub fn ignored(&self) -> impl Iterator<Item = (usize, &Label<R, C>)> {
        self.labels
            .iter()
            .enumerate()
            .filter(|(_, label)| label.ignore)
    }

    pub fn num_active(&self) -> usize {
        self.active().count()
    }

    pub fn map_rect<S, F>(self, mut f: F) -> GroundTruth<S, C>
    where
        F: FnMut(R) -> S,
    {
        GroundTruth {
            labels: self
                .labels
                .into_iter()
                .map(|label| label.map_rect(&mut f))
                .collect(),
        }
    }
}

impl<R, C> FromIterator<Label<R, C>> for GroundTruth<R, C> {
    fn from_iter<I>(iter: I) -> Self
    where
        I: IntoIterator<Item = Label<R, C>>,
    {
        Self {
            labels: iter.into_iter().collect(),
        }
    }
}

impl<R, C> From<Vec<Label<R, C>>> for GroundTruth<R, C> {
    fn from(labels: Vec<Label<R, C>>) -> Self {
        Self { labels }
    }
}
