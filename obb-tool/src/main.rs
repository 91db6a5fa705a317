use anyhow::{ensure, Context, Result};
use bbox::{OBox, Poly, HW};
use clap::Parser;
use label::{GroundTruth, Label};
use log::info;
use obb_dl::{
    config::Config,
    overlap::{EngineKind, OverlapEngine, OverlapMode},
};
use prettytable::{cell, row, Table};
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::Deserialize;
use std::{
    path::{Path, PathBuf},
    time::Instant,
};

#[derive(Debug, Clone, Parser)]
/// Inspect oriented box detector configurations.
enum Opts {
    /// Print the parsed configuration.
    Info {
        /// configuration file
        config_file: PathBuf,
    },
    /// Assign anchors to the objects of a sample.
    Assign {
        /// configuration file
        config_file: PathBuf,
        /// sample file with the image size and object polygons
        sample_file: PathBuf,
        #[clap(long, default_value = "0")]
        seed: u64,
    },
    /// Time the overlap engines on random boxes.
    Bench {
        /// configuration file
        config_file: PathBuf,
        #[clap(long, default_value = "10000")]
        num_anchors: usize,
        #[clap(long, default_value = "16")]
        num_gts: usize,
        #[clap(long, default_value = "5")]
        rounds: usize,
    },
}

#[derive(Debug, Clone, Deserialize)]
struct Sample {
    image_size: [usize; 2],
    objects: Vec<Object>,
}

#[derive(Debug, Clone, Deserialize)]
struct Object {
    class: usize,
    poly: Vec<f32>,
    #[serde(default)]
    ignore: bool,
}

impl Sample {
    fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("unable to read sample file '{}'", path.display()))?;
        let sample = json5::from_str(&text)
            .with_context(|| format!("unable to parse sample file '{}'", path.display()))?;
        Ok(sample)
    }
}

fn main() -> Result<()> {
    pretty_env_logger::init();

    match Opts::parse() {
        Opts::Info { config_file } => info(config_file)?,
        Opts::Assign {
            config_file,
            sample_file,
            seed,
        } => assign(config_file, sample_file, seed)?,
        Opts::Bench {
            config_file,
            num_anchors,
            num_gts,
            rounds,
        } => bench(config_file, num_anchors, num_gts, rounds)?,
    }

    Ok(())
}

fn info(config_file: impl AsRef<Path>) -> Result<()> {
    let config = Config::open(config_file)?;
    let generator = config.anchor.clone().build()?;
    let train = &config.train;
    let test = &config.test;

    let mut table = Table::new();
    table.add_row(row!["key", "value"]);
    table.add_row(row!["strides", format!("{:?}", generator.strides())]);
    table.add_row(row![
        "anchors per cell",
        generator.num_base_anchors()
    ]);
    table.add_row(row!["ratios", format!("{:?}", config.anchor.ratios)]);
    table.add_row(row![
        "scales",
        format!(
            "{} x 2^(i/{})",
            config.anchor.octave_base_scale, config.anchor.scales_per_octave
        )
    ]);
    table.add_row(row!["angles", format!("{:?}", config.anchor.angles)]);
    table.add_row(row!["coder", format!("{:?}", config.coder)]);
    table.add_row(row!["engine", format!("{:?}", config.engine)]);
    table.add_row(row!["assigner", format!("{:?}", train.assigner)]);
    table.add_row(row!["sampler", format!("{:?}", train.sampler)]);
    table.add_row(row![
        "allowed border",
        format!("{:?}", train.allowed_border)
    ]);
    table.add_row(row!["pos weight", format!("{:?}", train.pos_weight)]);
    table.add_row(row!["nms pre", format!("{:?}", test.nms_pre)]);
    table.add_row(row!["score thr", test.score_thr]);
    table.add_row(row!["nms", format!("{:?}", test.nms)]);
    table.add_row(row!["max per img", format!("{:?}", test.max_per_img)]);
    table.printstd();

    Ok(())
}

fn assign(config_file: impl AsRef<Path>, sample_file: impl AsRef<Path>, seed: u64) -> Result<()> {
    let config = Config::open(config_file)?;
    let sample = Sample::open(sample_file)?;
    let engine = config.engine.build()?;
    let generator = config.anchor.clone().build()?;
    let target = config.anchor_target_init().build()?;
    let angle_range = config.coder.angle_range;

    let [h, w] = sample.image_size;
    let image_size = HW::try_from_hw([h, w])?;
    let anchors = generator.anchors_for_image(&image_size);
    info!(
        "generated {} anchors for a {}x{} image",
        anchors.len(),
        h,
        w
    );

    let gts: GroundTruth<OBox<f32>, usize> = sample
        .objects
        .iter()
        .enumerate()
        .map(|(index, object)| -> Result<_> {
            let poly = Poly::try_from_flat(&object.poly)
                .with_context(|| format!("invalid polygon of object {}", index))?;
            let obox = poly.to_obox(angle_range);
            let label = if object.ignore {
                Label::ignored(obox, object.class)
            } else {
                Label::new(obox, object.class)
            };
            Ok(label)
        })
        .collect::<Result<Vec<_>>>()?
        .into();

    let inside_flags = target.inside_flags(anchors.anchors(), &image_size);
    let inside_anchors: Vec<OBox<f32>> = anchors
        .anchors()
        .iter()
        .zip(&inside_flags)
        .filter(|(_, &inside)| inside)
        .map(|(anchor, _)| *anchor)
        .collect();

    let assign = target
        .assigner()
        .assign(&*engine, &inside_anchors, &gts)?;
    let mut rng = StdRng::seed_from_u64(seed);
    let sampling = target.sampler().sample(&assign, &mut rng);

    let gt_boxes: Vec<OBox<f32>> = gts.labels().iter().map(|label| label.rect).collect();
    let overlaps = engine.overlaps(&inside_anchors, &gt_boxes, OverlapMode::IoU)?;

    let mut table = Table::new();
    table.add_row(row![
        "gt", "class", "ignore", "box", "best IoU", "assigned", "sampled"
    ]);
    gts.labels().iter().enumerate().for_each(|(index, label)| {
        let best_iou = overlaps
            .column(index)
            .iter()
            .copied()
            .fold(0f32, f32::max);
        let num_assigned = assign
            .states()
            .iter()
            .filter(|state| state.gt_index() == Some(index))
            .count();
        let num_sampled = sampling
            .pos_gt_indices()
            .iter()
            .filter(|&&gt_index| gt_index == index)
            .count();
        let [cx, cy, bw, bh, angle] = label.rect.cxcywha();

        table.add_row(row![
            index,
            label.class,
            label.ignore,
            format!(
                "({:.1}, {:.1}, {:.1}, {:.1}, {:.3})",
                cx, cy, bw, bh, angle
            ),
            format!("{:.4}", best_iou),
            num_assigned,
            num_sampled
        ]);
    });
    table.printstd();

    println!(
        "{} inside anchors, {} positive, {} negative, {} sampled positive, {} sampled negative",
        inside_anchors.len(),
        assign.num_pos(),
        assign.num_neg(),
        sampling.num_pos(),
        sampling.num_neg()
    );

    Ok(())
}

fn bench(
    config_file: impl AsRef<Path>,
    num_anchors: usize,
    num_gts: usize,
    rounds: usize,
) -> Result<()> {
    ensure!(rounds > 0, "rounds must be positive");
    let config = Config::open(config_file)?;

    let mut rng = StdRng::seed_from_u64(0);
    let mut random_boxes = |count: usize| -> Vec<OBox<f32>> {
        (0..count)
            .map(|_| {
                OBox::from_cxcywha([
                    rng.gen_range(0.0..800.0),
                    rng.gen_range(0.0..800.0),
                    rng.gen_range(8.0..128.0),
                    rng.gen_range(8.0..128.0),
                    rng.gen_range(-1.5..1.5),
                ])
            })
            .collect()
    };
    let anchors = random_boxes(num_anchors);
    let gts = random_boxes(num_gts);

    let mut kinds = vec![EngineKind::Scalar, EngineKind::Parallel];
    if !kinds.contains(&config.engine) {
        kinds.push(config.engine.clone());
    }

    let mut table = Table::new();
    table.add_row(row!["engine", "anchors", "gts", "mean time (ms)"]);
    for kind in kinds {
        let engine = kind.build()?;
        let since = Instant::now();
        for _ in 0..rounds {
            engine.overlaps(&anchors, &gts, OverlapMode::IoU)?;
        }
        let elapsed = since.elapsed().as_secs_f64() * 1000.0 / rounds as f64;
        info!("{:?} took {:.3} ms per round", kind, elapsed);
        table.add_row(row![
            format!("{:?}", kind),
            num_anchors,
            num_gts,
            format!("{:.3}", elapsed)
        ]);
    }
    table.printstd();

    Ok(())
}
