use anyhow::Result;
use bbox::{OBox, HW};
use label::{GroundTruth, Label};
use ndarray::Array2;
use obb_dl::{
    config::Config,
    nms::NmsInit,
    overlap::{EngineKind, OverlapEngine, OverlapMode},
    ratio::ratio,
    sampler::SamplerConfig,
};
use rand::{rngs::StdRng, SeedableRng};
use std::path::{Path, PathBuf};

fn config_path() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("configs")
        .join("retinanet_obb_ucas_aod.json5")
}

#[test]
fn load_sample_config() -> Result<()> {
    let config = Config::open(config_path())?;
    assert_eq!(config.anchor.strides, [8, 16, 32, 64, 128]);
    assert_eq!(config.engine, EngineKind::Parallel);
    assert_eq!(config.train.sampler, SamplerConfig::Pseudo);
    assert_eq!(config.test.nms_pre, Some(2000));
    assert_eq!(config.test.max_per_img, Some(2000));
    assert!(Config::open("no-such-config.json5").is_err());
    Ok(())
}

#[test]
fn targets_and_detections() -> Result<()> {
    let config = Config::open(config_path())?;
    let engine = EngineKind::Scalar.build()?;
    let generator = config.anchor.clone().build()?;
    let target = config.anchor_target_init().build()?;
    let post_processor = config.post_processor_init().build()?;

    let image_size = HW::from_hw([128, 128]);
    let anchors = generator.anchors_for_image(&image_size);
    assert_eq!(anchors.len(), (256 + 64 + 16 + 4 + 1) * 9);

    let gt = OBox::from_cxcywha([64.0, 64.0, 45.0, 22.0, 0.0]);
    let gts = GroundTruth::new(vec![Label::new(gt, 1usize)]);
    let mut rng = StdRng::seed_from_u64(0);
    let targets = target.compute(&*engine, anchors.anchors(), &image_size, &gts, &mut rng)?;

    assert!(targets.num_pos() >= 1);
    assert!(targets
        .pos_indices()
        .iter()
        .all(|&index| targets.labels()[index] == Some(1)));
    assert_eq!(targets.num_anchors(), anchors.len());
    assert!(targets.num_neg() > targets.num_pos());

    // a perfect head: encoded targets as deltas and one-hot scores
    let num_classes = 2;
    let mut scores = Array2::<f32>::zeros((anchors.len(), num_classes));
    targets.pos_indices().iter().for_each(|&index| {
        scores[[index, 1]] = 0.9;
    });
    let detections = post_processor.process(
        &*engine,
        &anchors,
        scores.view(),
        targets.bbox_targets().view(),
        None,
    )?;

    assert_eq!(detections.len(), 1);
    let detection = &detections[0];
    assert_eq!(detection.class, 1);
    detection
        .obox
        .cxcywha()
        .iter()
        .zip(gt.cxcywha())
        .for_each(|(&lhs, rhs)| assert!((lhs - rhs).abs() < 1e-3));
    Ok(())
}

#[test]
fn nms_drops_lower_score_of_overlapping_pair() -> Result<()> {
    // the overlap is 18 * 10 / (20 * 10) = 0.9
    let boxes = vec![
        OBox::from_cxcywha([30.0, 20.0, 19.0, 10.0, 0.0]),
        OBox::from_cxcywha([31.0, 20.0, 19.0, 10.0, 0.0]),
    ];
    let nms = NmsInit::new(ratio(0.5)).build()?;

    for engine in [EngineKind::Scalar.build()?, EngineKind::Parallel.build()?] {
        let overlaps = engine.overlaps(&boxes, &boxes, OverlapMode::IoU)?;
        assert!((overlaps[[0, 1]] - 0.9).abs() < 1e-5);

        assert_eq!(nms.run(&*engine, &boxes, &[0.6, 0.8])?, [1]);
        assert_eq!(nms.run(&*engine, &boxes, &[0.8, 0.6])?, [0]);
    }
    Ok(())
}
