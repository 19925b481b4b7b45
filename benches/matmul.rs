use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use tiled_matmul::backends::gpu::DeviceOptions;
use tiled_matmul::bench::generate_inputs;
use tiled_matmul::{BenchConfig, GpuDevice, TiledMatmul};

fn bench_serial(c: &mut Criterion) {
    let mut group = c.benchmark_group("matmul_serial");
    group.sample_size(10);

    for dim in [64, 128, 256] {
        let config = BenchConfig {
            dim,
            ..BenchConfig::default()
        };
        let (a, b) = generate_inputs(&config).unwrap();

        group.bench_with_input(BenchmarkId::from_parameter(dim), &(&a, &b), |bench, (a, b)| {
            bench.iter(|| {
                let result = black_box(a).matmul_serial(black_box(b)).unwrap();
                black_box(result);
            });
        });
    }

    group.finish();
}

fn bench_gpu_tiled(c: &mut Criterion) {
    if !GpuDevice::is_available() {
        eprintln!("GPU not available, skipping GPU benchmarks");
        return;
    }
    let gpu = match GpuDevice::new(&DeviceOptions::default()) {
        Ok(gpu) => gpu,
        Err(e) => {
            eprintln!("GPU device could not be opened: {e}");
            return;
        }
    };

    let mut group = c.benchmark_group("matmul_gpu_tiled");
    group.sample_size(10);

    for dim in [64, 128, 256, 512, 1000] {
        let config = BenchConfig {
            dim,
            ..BenchConfig::default()
        };
        let (a, b) = generate_inputs(&config).unwrap();
        let kernel = match TiledMatmul::new(&gpu, dim) {
            Ok(kernel) => kernel,
            Err(e) => {
                eprintln!("skipping {dim}: {e}");
                continue;
            }
        };

        group.bench_with_input(BenchmarkId::from_parameter(dim), &(&a, &b), |bench, (a, b)| {
            bench.iter(|| {
                let run = kernel.run(black_box(a), black_box(b)).unwrap();
                black_box(run.product);
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_serial, bench_gpu_tiled);
criterion_main!(benches);
