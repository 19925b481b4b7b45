//! tiled-matmul: serial vs. GPU tiled dense matrix multiplication
//!
//! Multiplies two N×N matrices of small random integers twice, once with a
//! triple-nested serial loop and once with a tiled WGSL compute kernel,
//! times both, and checks that the products are bitwise identical.
//!
//! # Kernel
//!
//! - one invocation per output column `j`
//! - local size = gcd(N, compute units), so the range splits evenly
//! - row `i` of A is staged in workgroup memory for every output row, and
//!   the group's columns of B are staged once when they fit
//!
//! # Quick Start
//!
//! ```no_run
//! use tiled_matmul::{run_benchmark, BenchConfig};
//!
//! let config = BenchConfig { dim: 256, ..BenchConfig::default() };
//! let run = run_benchmark(&config).unwrap();
//! println!("{}", run.report);
//! ```

pub mod backends;
pub mod bench;
pub mod config;
pub mod error;
pub mod matrix;
pub mod timing;

pub use backends::gpu::{GpuDevice, TiledMatmul, WorkgroupPlan};
pub use bench::{run_benchmark, run_benchmark_on, BenchReport, BenchRun};
pub use config::BenchConfig;
pub use error::{MatmulError, Result};
pub use matrix::Matrix;
pub use timing::{Timing, TimingSource};
