use bbox::{AngleRange, OBox, Point, Poly};
use obb_dl::overlap::{OverlapEngine, OverlapMode, ParallelEngine, ScalarEngine};
use proptest::prelude::*;

fn obox_strategy() -> impl Strategy<Value = OBox<f32>> {
    (
        -50f32..50.0,
        -50f32..50.0,
        0.5f32..40.0,
        0.5f32..40.0,
        -3.2f32..3.2,
    )
        .prop_map(|(cx, cy, w, h, angle)| OBox::from_cxcywha([cx, cy, w, h, angle]))
}

proptest! {
    #[test]
    fn overlap_is_symmetric(lhs in obox_strategy(), rhs in obox_strategy()) {
        let forward = ScalarEngine.overlaps(&[lhs], &[rhs], OverlapMode::IoU).unwrap();
        let backward = ScalarEngine.overlaps(&[rhs], &[lhs], OverlapMode::IoU).unwrap();
        prop_assert_eq!(forward[[0, 0]].to_bits(), backward[[0, 0]].to_bits());
    }

    #[test]
    fn overlap_is_bounded(lhs in obox_strategy(), rhs in obox_strategy()) {
        for mode in [OverlapMode::IoU, OverlapMode::IoF] {
            let value = ScalarEngine.overlaps(&[lhs], &[rhs], mode).unwrap()[[0, 0]];
            prop_assert!((0.0..=1.0).contains(&value), "overlap {} out of range", value);
        }
    }

    #[test]
    fn iof_dominates_iou(lhs in obox_strategy(), rhs in obox_strategy()) {
        let iou = ScalarEngine.overlaps(&[lhs], &[rhs], OverlapMode::IoU).unwrap()[[0, 0]];
        let iof = ScalarEngine.overlaps(&[lhs], &[rhs], OverlapMode::IoF).unwrap()[[0, 0]];
        prop_assert!(iof + 1e-6 >= iou);
    }

    #[test]
    fn self_overlap_is_one(obox in obox_strategy()) {
        let value = ScalarEngine.overlaps(&[obox], &[obox], OverlapMode::IoU).unwrap()[[0, 0]];
        prop_assert_eq!(value, 1.0);
    }

    #[test]
    fn regularization_keeps_overlap(obox in obox_strategy()) {
        for range in [AngleRange::Le90, AngleRange::Le135, AngleRange::Oc] {
            let regular = obox.regularize(range);
            let value = ScalarEngine.overlaps(&[obox], &[regular], OverlapMode::IoU).unwrap()[[0, 0]];
            prop_assert!(value > 0.999, "IoU {} after regularizing to {:?}", value, range);
        }
    }

    #[test]
    fn engines_agree(
        lhs in prop::collection::vec(obox_strategy(), 0..12),
        rhs in prop::collection::vec(obox_strategy(), 0..12),
    ) {
        let scalar = ScalarEngine.overlaps(&lhs, &rhs, OverlapMode::IoU).unwrap();
        let parallel = ParallelEngine.overlaps(&lhs, &rhs, OverlapMode::IoU).unwrap();
        prop_assert_eq!(scalar, parallel);

        let len = lhs.len().min(rhs.len());
        let scalar = ScalarEngine
            .aligned_overlaps(&lhs[..len], &rhs[..len], OverlapMode::IoF)
            .unwrap();
        let parallel = ParallelEngine
            .aligned_overlaps(&lhs[..len], &rhs[..len], OverlapMode::IoF)
            .unwrap();
        prop_assert_eq!(scalar, parallel);
    }
}

#[test]
fn non_finite_vertex_overlaps_nothing() {
    let square = vec![
        Point::new(0f32, 0.0),
        Point::new(4.0, 0.0),
        Point::new(4.0, 4.0),
        Point::new(0.0, 4.0),
    ];
    let mut corrupted = square.clone();
    corrupted[0] = Point::new(f32::NAN, 0.0);
    let polys = [Poly::from_points(square), Poly::from_points(corrupted)];

    let engines: [&dyn OverlapEngine; 2] = [&ScalarEngine, &ParallelEngine];
    for engine in engines {
        for mode in [OverlapMode::IoU, OverlapMode::IoF] {
            let matrix = engine.poly_overlaps(&polys, &polys, mode).unwrap();
            assert_eq!(matrix[[0, 0]], 1.0);
            assert_eq!(matrix[[0, 1]], 0.0, "{:?} {:?}", engine, mode);
            assert_eq!(matrix[[1, 0]], 0.0, "{:?} {:?}", engine, mode);
            assert_eq!(matrix[[1, 1]], 0.0, "{:?} {:?}", engine, mode);

            let aligned = engine
                .aligned_poly_overlaps(&polys, &[polys[1].clone(), polys[0].clone()], mode)
                .unwrap();
            assert_eq!(aligned.to_vec(), vec![0.0, 0.0]);
        }
    }
}
