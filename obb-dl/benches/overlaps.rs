use bbox::OBox;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use obb_dl::{
    nms::NmsInit,
    overlap::{OverlapEngine, OverlapMode, ParallelEngine, ScalarEngine},
    ratio::ratio,
};
use rand::{rngs::StdRng, Rng, SeedableRng};

fn random_boxes(count: usize, seed: u64) -> Vec<OBox<f32>> {
    let mut rng = StdRng::seed_from_u64(seed);
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
}

fn bench_overlaps(c: &mut Criterion) {
    let mut group = c.benchmark_group("overlaps");
    let gts = random_boxes(16, 1);

    for num_anchors in [1_000, 10_000, 50_000] {
        let anchors = random_boxes(num_anchors, 0);

        group.bench_with_input(
            BenchmarkId::new("scalar", num_anchors),
            &anchors,
            |b, anchors| {
                b.iter(|| {
                    ScalarEngine
                        .overlaps(black_box(anchors), black_box(&gts), OverlapMode::IoU)
                        .unwrap()
                })
            },
        );
        group.bench_with_input(
            BenchmarkId::new("parallel", num_anchors),
            &anchors,
            |b, anchors| {
                b.iter(|| {
                    ParallelEngine
                        .overlaps(black_box(anchors), black_box(&gts), OverlapMode::IoU)
                        .unwrap()
                })
            },
        );
    }
    group.finish();
}

fn bench_nms(c: &mut Criterion) {
    let mut group = c.benchmark_group("nms");
    let nms = NmsInit::new(ratio(0.1)).build().unwrap();

    for num_boxes in [100, 1_000, 2_000] {
        let boxes = random_boxes(num_boxes, 2);
        let mut rng = StdRng::seed_from_u64(3);
        let scores: Vec<f32> = (0..num_boxes).map(|_| rng.gen()).collect();

        group.bench_with_input(BenchmarkId::from_parameter(num_boxes), &boxes, |b, boxes| {
            b.iter(|| nms.run(&ParallelEngine, black_box(boxes), &scores).unwrap())
        });
    }
    group.finish();
}

criterion_group!(benches, bench_overlaps, bench_nms);
criterion_main!(benches);
