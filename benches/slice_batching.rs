//! Criterion benchmarks for slice extraction, resampling and batching.
//!
//! Run with: cargo bench --bench slice_batching

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use slicebatch::{
    extract_slice, resize_with, DatasetPipeline, IdxFile, Interpolation, PipelineConfig, Volume,
};

/// Create a single-frame volume with a repeating intensity ramp
fn create_test_volume(name: &str, shape: [usize; 3]) -> Volume {
    let numel: usize = shape.iter().product();
    let data: Vec<f32> = (0..numel).map(|i| (i % 256) as f32 / 255.0).collect();
    Volume::from_vec(name, [shape[0], shape[1], shape[2], 1], data).unwrap()
}

fn bench_resize(c: &mut Criterion) {
    let mut group = c.benchmark_group("resize_to_224");

    for &shape in &[[64, 64, 1], [197, 233, 1], [256, 256, 1]] {
        let volume = create_test_volume("bench", shape);
        let raster = extract_slice(&volume, 0).unwrap();
        let label = format!("{}x{}", shape[0], shape[1]);

        group.throughput(Throughput::Elements((224 * 224) as u64));
        for method in [Interpolation::Nearest, Interpolation::Bilinear] {
            group.bench_with_input(
                BenchmarkId::new(format!("{method:?}"), &label),
                &raster,
                |b, raster| b.iter(|| black_box(resize_with(raster, 224, 224, method).unwrap())),
            );
        }
    }

    group.finish();
}

fn bench_pipeline(c: &mut Criterion) {
    let mut group = c.benchmark_group("pipeline_batches");
    group.sample_size(20);

    for &batch_size in &[1usize, 8, 32] {
        let volumes = vec![
            create_test_volume("sub01_no-lesion", [128, 128, 32]),
            create_test_volume("sub02_yes-lesion", [128, 128, 32]),
        ];
        let config = PipelineConfig::with_batch_size(batch_size).max_samples(64, 1);
        let pipeline = DatasetPipeline::training(volumes, config).unwrap();

        group.throughput(Throughput::Elements(64));
        group.bench_with_input(
            BenchmarkId::from_parameter(batch_size),
            &pipeline,
            |b, pipeline| {
                b.iter(|| {
                    for batch in pipeline.batches() {
                        black_box(batch.unwrap());
                    }
                })
            },
        );
    }

    group.finish();
}

fn bench_idx_batches(c: &mut Criterion) {
    let items = 10_000u32;
    let mut bytes = 2051u32.to_be_bytes().to_vec();
    for d in [items, 28, 28] {
        bytes.extend_from_slice(&d.to_be_bytes());
    }
    bytes.extend((0..items as usize * 28 * 28).map(|i| (i % 256) as u8));
    let file = IdxFile::from_bytes(bytes, 2051).unwrap();
    let normalizer = slicebatch::IntensityNormalizer::mnist();

    c.bench_function("idx_image_batches_64", |b| {
        b.iter(|| {
            for batch in file.image_batches(64, items as usize, Some(&normalizer)).unwrap() {
                black_box(batch.unwrap());
            }
        })
    });
}

criterion_group!(benches, bench_resize, bench_pipeline, bench_idx_batches);
criterion_main!(benches);
