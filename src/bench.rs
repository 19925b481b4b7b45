//! Serial vs. GPU benchmark driver and its report

use std::fmt;

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use tracing::instrument;

use crate::backends::gpu::{GpuDevice, StagingMode, TiledMatmul};
use crate::config::BenchConfig;
use crate::error::Result;
use crate::matrix::{Matrix, Mismatch};
use crate::timing::{Stopwatch, Timing, TimingSource};

/// Result of one benchmark, serializable for `--json`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BenchReport {
    /// Adapter the kernel ran on
    pub adapter: String,
    /// Graphics API of the adapter
    pub backend: String,
    /// N for the N×N operands
    pub dim: usize,
    /// Invocations per work-group
    pub local_size: u32,
    /// Work-groups dispatched
    pub work_groups: u32,
    /// Workgroup memory layout
    pub staging: StagingMode,
    /// Serial product wall-clock time, `None` when skipped
    pub serial_ms: Option<f64>,
    /// Kernel execution time
    pub gpu_kernel_ms: f64,
    /// Upload + dispatch + readback time
    pub gpu_total_ms: f64,
    /// Clock behind `gpu_kernel_ms`
    pub kernel_timing: TimingSource,
    /// Bitwise comparison outcome, `None` when the serial product was skipped
    pub matrices_equal: Option<bool>,
    /// Where the products first differ
    pub first_mismatch: Option<Mismatch>,
}

impl BenchReport {
    /// Serial time over kernel time
    pub fn speedup(&self) -> Option<f64> {
        let serial = self.serial_ms?;
        (self.gpu_kernel_ms > 0.0).then(|| serial / self.gpu_kernel_ms)
    }
}

impl fmt::Display for BenchReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(serial) = self.serial_ms {
            writeln!(f, "Serial Time Taken in Milliseconds: {serial:.0}")?;
            writeln!(f)?;
        }
        let clock = match self.kernel_timing {
            TimingSource::GpuTimestamp => "gpu timestamps",
            TimingSource::HostClock => "host clock",
        };
        writeln!(f, "GPU time = {:.1} ms ({clock})", self.gpu_kernel_ms)?;
        writeln!(
            f,
            "GPU total = {:.1} ms (upload + dispatch + readback)",
            self.gpu_total_ms
        )?;
        writeln!(
            f,
            "Device: {} ({}), {} work-groups x {} ({:?})",
            self.adapter, self.backend, self.work_groups, self.local_size, self.staging
        )?;
        if let Some(speedup) = self.speedup() {
            writeln!(f, "Speedup: {speedup:.1}x")?;
        }
        match self.matrices_equal {
            Some(true) => write!(f, "Matrices are equal"),
            Some(false) => {
                write!(f, "Matrices are not equal")?;
                if let Some(m) = &self.first_mismatch {
                    write!(
                        f,
                        " (first difference at [{}][{}]: gpu {} vs serial {})",
                        m.row, m.col, m.left, m.right
                    )?;
                }
                Ok(())
            }
            None => write!(f, "Matrices were not compared"),
        }
    }
}

/// Report plus the matrices it was computed from
#[derive(Debug, Clone)]
pub struct BenchRun {
    /// Timings and verdict
    pub report: BenchReport,
    /// Left operand
    pub a: Matrix,
    /// Right operand
    pub b: Matrix,
    /// Product read back from the GPU
    pub product: Matrix,
}

/// Builds the seeded A and B operands
pub fn generate_inputs(config: &BenchConfig) -> Result<(Matrix, Matrix)> {
    let mut rng = StdRng::seed_from_u64(config.seed);
    let a = Matrix::random_integers(config.dim, config.dim, config.max_value, &mut rng)?;
    let b = Matrix::random_integers(config.dim, config.dim, config.max_value, &mut rng)?;
    Ok((a, b))
}

/// Runs and times the serial reference product
#[instrument(skip_all, fields(dim = a.rows()))]
pub fn time_serial(a: &Matrix, b: &Matrix) -> Result<(Matrix, Timing)> {
    let watch = Stopwatch::start();
    let product = a.matmul_serial(b)?;
    let timing = watch.stop();
    tracing::info!(ms = timing.elapsed_ms(), "serial product done");
    Ok((product, timing))
}

/// Opens the configured device and runs the benchmark on it
pub fn run_benchmark(config: &BenchConfig) -> Result<BenchRun> {
    config.validate()?;
    let gpu = GpuDevice::new(&config.device_options())?;
    run_validated(&gpu, config)
}

/// Runs the benchmark on an already opened device
///
/// The kernel is planned and compiled first so an unsupported size fails
/// before any host work. The serial product runs next, then the GPU
/// product; the two are compared bitwise.
pub fn run_benchmark_on(gpu: &GpuDevice, config: &BenchConfig) -> Result<BenchRun> {
    config.validate()?;
    run_validated(gpu, config)
}

#[instrument(skip_all, fields(dim = config.dim, seed = config.seed))]
fn run_validated(gpu: &GpuDevice, config: &BenchConfig) -> Result<BenchRun> {
    let kernel = TiledMatmul::new(gpu, config.dim)?;
    let (a, b) = generate_inputs(config)?;

    let serial = if config.skip_serial {
        None
    } else {
        Some(time_serial(&a, &b)?)
    };

    let run = kernel.run(&a, &b)?;
    tracing::info!(
        kernel_ms = run.kernel.elapsed_ms(),
        total_ms = run.total.elapsed_ms(),
        source = ?run.kernel_source,
        "GPU product done"
    );

    let first_mismatch = serial
        .as_ref()
        .and_then(|(expected, _)| run.product.first_mismatch(expected));
    let matrices_equal = serial.as_ref().map(|_| first_mismatch.is_none());

    let plan = kernel.plan();
    let summary = gpu.summary();
    let report = BenchReport {
        adapter: summary.name.clone(),
        backend: summary.backend.clone(),
        dim: config.dim,
        local_size: plan.local(),
        work_groups: plan.groups(),
        staging: plan.staging(),
        serial_ms: serial.as_ref().map(|(_, t)| t.elapsed_ms()),
        gpu_kernel_ms: run.kernel.elapsed_ms(),
        gpu_total_ms: run.total.elapsed_ms(),
        kernel_timing: run.kernel_source,
        matrices_equal,
        first_mismatch,
    };

    Ok(BenchRun {
        report,
        a,
        b,
        product: run.product,
    })
}
