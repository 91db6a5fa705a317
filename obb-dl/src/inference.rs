//! Turning raw head outputs into detections.

use crate::{
    anchor::AnchorSet,
    coder::{DeltaXYWHTCoder, DeltaXYWHTCoderInit},
    common::*,
    nms::{score_order, Detection, MultiClassNms, MultiClassNmsInit},
    overlap::OverlapEngine,
};

/// The post-processor initializer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostProcessorInit {
    #[serde(default)]
    pub coder: DeltaXYWHTCoderInit,
    /// Keep at most this many top scoring anchors per level before
    /// suppression.
    #[serde(default)]
    pub nms_pre: Option<usize>,
    pub nms: MultiClassNmsInit,
}

impl PostProcessorInit {
    pub fn build(self) -> Result<PostProcessor> {
        let Self {
            coder,
            nms_pre,
            nms,
        } = self;
        if let Some(nms_pre) = nms_pre {
            ensure!(nms_pre > 0, "nms_pre must be positive");
        }
        Ok(PostProcessor {
            coder: coder.build()?,
            nms_pre,
            nms: nms.build()?,
        })
    }
}

#[derive(Debug, Clone, Getters, CopyGetters)]
pub struct PostProcessor {
    #[getset(get = "pub")]
    coder: DeltaXYWHTCoder,
    #[getset(get_copy = "pub")]
    nms_pre: Option<usize>,
    #[getset(get = "pub")]
    nms: MultiClassNms,
}

impl PostProcessor {
    /// Decode and suppress the outputs of one image.
    ///
    /// `scores` holds activated class scores in `[N, num_classes]` and
    /// `deltas` holds regression outputs in `[N, 5]`, one row per anchor.
    /// When `transform` is the mapping from the original image to the
    /// network input, detections are mapped back to the original image.
    pub fn process(
        &self,
        engine: &dyn OverlapEngine,
        anchors: &AnchorSet,
        scores: ArrayView2<'_, f32>,
        deltas: ArrayView2<'_, f32>,
        transform: Option<&Transform<f32>>,
    ) -> Result<Vec<Detection>> {
        ensure!(
            scores.nrows() == anchors.len() && deltas.nrows() == anchors.len(),
            "expect {} rows of scores and deltas, but get {} and {}",
            anchors.len(),
            scores.nrows(),
            deltas.nrows()
        );

        let selected: Vec<usize> = anchors
            .level_ranges()
            .iter()
            .flat_map(|range| self.select_level(scores, range.clone()))
            .collect();

        let selected_anchors: Vec<OBox<f32>> = selected
            .iter()
            .map(|&index| anchors.anchors()[index])
            .collect();
        let selected_scores = scores.select(Axis(0), &selected);
        let selected_deltas = deltas.select(Axis(0), &selected);

        let mut boxes = self
            .coder
            .decode_batch(&selected_anchors, selected_deltas.view())?;
        if let Some(transform) = transform {
            let inverse = transform.inverse();
            let range = self.coder.angle_range();
            boxes
                .iter_mut()
                .for_each(|obox| *obox = obox.transform(&inverse, range));
        }

        self.nms.run(engine, &boxes, selected_scores.view())
    }

    fn select_level(&self, scores: ArrayView2<'_, f32>, range: Range<usize>) -> Vec<usize> {
        match self.nms_pre {
            Some(nms_pre) if range.len() > nms_pre => {
                let max_scores: Vec<f32> = scores
                    .slice(s![range.clone(), ..])
                    .outer_iter()
                    .map(|row| row.iter().copied().fold(f32::NEG_INFINITY, f32::max))
                    .collect();
                score_order(&max_scores)
                    .into_iter()
                    .take(nms_pre)
                    .map(|nth| range.start + nth)
                    .collect()
            }
            _ => range.collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{nms::NmsInit, overlap::ScalarEngine, ratio::ratio};
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    fn post_processor(nms_pre: Option<usize>) -> PostProcessor {
        PostProcessorInit {
            coder: DeltaXYWHTCoderInit::default(),
            nms_pre,
            nms: MultiClassNmsInit {
                score_thr: ratio(0.05),
                min_bbox_size: r64(0.0),
                nms: NmsInit::new(ratio(0.1)),
                max_per_img: Some(100),
            },
        }
        .build()
        .unwrap()
    }

    fn anchors() -> AnchorSet {
        AnchorSet::from(vec![
            OBox::from_cxcywha([10.0, 10.0, 8.0, 4.0, 0.0]),
            OBox::from_cxcywha([40.0, 10.0, 8.0, 4.0, 0.0]),
            OBox::from_cxcywha([70.0, 10.0, 8.0, 4.0, 0.0]),
        ])
    }

    #[test]
    fn post_process_decodes_and_filters() {
        let processor = post_processor(None);
        let scores = array![[0.9], [0.02], [0.5]];
        let deltas = array![
            [0.5, 0.0, 0.0, 0.0, 0.0],
            [0.0, 0.0, 0.0, 0.0, 0.0],
            [0.0, 0.0, 2f32.ln(), 0.0, 0.0]
        ];

        let detections = processor
            .process(&ScalarEngine, &anchors(), scores.view(), deltas.view(), None)
            .unwrap();
        assert_eq!(detections.len(), 2);
        assert_abs_diff_eq!(detections[0].obox.cx(), 14.0, epsilon = 1e-5);
        assert_abs_diff_eq!(detections[1].obox.w(), 16.0, epsilon = 1e-4);
        assert_abs_diff_eq!(detections[1].score, 0.5);
    }

    #[test]
    fn post_process_nms_pre_and_transform() {
        let processor = post_processor(Some(1));
        let scores = array![[0.3], [0.8], [0.6]];
        let deltas = Array2::zeros((3, 5));
        let transform = Transform::scale(2.0, 2.0);

        let detections = processor
            .process(
                &ScalarEngine,
                &anchors(),
                scores.view(),
                deltas.view(),
                Some(&transform),
            )
            .unwrap();
        assert_eq!(detections.len(), 1);
        let [cx, cy, w, h, _] = detections[0].obox.cxcywha();
        assert_abs_diff_eq!(cx, 20.0, epsilon = 1e-5);
        assert_abs_diff_eq!(cy, 5.0, epsilon = 1e-5);
        assert_abs_diff_eq!(w, 4.0, epsilon = 1e-5);
        assert_abs_diff_eq!(h, 2.0, epsilon = 1e-5);
    }

    #[test]
    fn post_process_rejects_mismatched_rows() {
        let processor = post_processor(None);
        let scores = array![[0.3], [0.8]];
        let deltas = Array2::zeros((3, 5));
        assert!(processor
            .process(&ScalarEngine, &anchors(), scores.view(), deltas.view(), None)
            .is_err());
    }
}
