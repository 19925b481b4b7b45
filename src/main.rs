//! tiled-matmul CLI
//!
//! Times a serial triple loop against the tiled GPU kernel on the same
//! seeded inputs and checks the products match bit for bit.

use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use tiled_matmul::backends::gpu::device::DEFAULT_VENDOR;
use tiled_matmul::config::{DEFAULT_DIM, DEFAULT_MAX_VALUE};
use tiled_matmul::{run_benchmark, BenchConfig, GpuDevice};
use tracing_subscriber::EnvFilter;

/// Exit status when the products differ
const EXIT_MISMATCH: u8 = 2;

#[derive(Parser)]
#[command(name = "tiled-matmul")]
#[command(author, version, about = "Serial vs. GPU tiled matrix multiplication benchmark")]
#[command(args_conflicts_with_subcommands = true)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    #[command(flatten)]
    run: RunArgs,

    /// Log progress (same as TILED_MATMUL_LOG=info)
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// List the GPU adapters wgpu can see
    Devices {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Args)]
struct RunArgs {
    /// Matrix dimension N (operands are N×N)
    #[arg(short = 'n', long, env = "TILED_MATMUL_DIM", default_value_t = DEFAULT_DIM)]
    dim: usize,

    /// Seed for the random inputs
    #[arg(long, env = "TILED_MATMUL_SEED", default_value_t = 1)]
    seed: u64,

    /// Inputs are integers in 0..MAX_VALUE
    #[arg(long, default_value_t = DEFAULT_MAX_VALUE)]
    max_value: u32,

    /// Prefer the first adapter whose name contains this
    #[arg(long, env = "TILED_MATMUL_VENDOR", default_value = DEFAULT_VENDOR)]
    vendor: String,

    /// Compute-unit count for the work-group gcd (default: device maximum)
    #[arg(long, env = "TILED_MATMUL_COMPUTE_UNITS")]
    compute_units: Option<u32>,

    /// Skip the serial product and the comparison
    #[arg(long)]
    skip_serial: bool,

    /// Print A, B and C (N <= 16 only)
    #[arg(long)]
    print: bool,

    /// Output the report as JSON
    #[arg(long)]
    json: bool,
}

impl RunArgs {
    fn to_config(&self) -> BenchConfig {
        BenchConfig {
            dim: self.dim,
            seed: self.seed,
            max_value: self.max_value,
            vendor: self.vendor.clone(),
            compute_units: self.compute_units,
            skip_serial: self.skip_serial,
            print: self.print,
        }
    }
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("info")
    } else {
        EnvFilter::try_from_env("TILED_MATMUL_LOG")
            .or_else(|_| EnvFilter::try_from_default_env())
            .unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode, Box<dyn std::error::Error>> {
    match cli.command {
        Some(Commands::Devices { json }) => {
            let adapters = GpuDevice::enumerate();
            if json {
                println!("{}", serde_json::to_string_pretty(&adapters)?);
            } else if adapters.is_empty() {
                println!("No GPU adapters found");
            } else {
                for a in &adapters {
                    println!(
                        "[{}] {} ({}, {}) max work-group {}, {} B workgroup memory, timestamps: {}, compute: {}",
                        a.index,
                        a.name,
                        a.backend,
                        a.device_type,
                        a.limits.max_workgroup_size,
                        a.limits.max_workgroup_storage_bytes,
                        a.timestamps,
                        a.compute_shaders
                    );
                }
            }
            Ok(ExitCode::SUCCESS)
        }
        None => {
            let config = cli.run.to_config();
            let run = run_benchmark(&config)?;

            if config.should_print() {
                println!("{}", run.a.to_tagged_string("A"));
                println!("{}", run.b.to_tagged_string("B"));
                println!("{}", run.product.to_tagged_string("C"));
            }

            if cli.run.json {
                println!("{}", serde_json::to_string_pretty(&run.report)?);
            } else {
                println!("{}", run.report);
            }

            Ok(match run.report.matrices_equal {
                Some(false) => ExitCode::from(EXIT_MISMATCH),
                _ => ExitCode::SUCCESS,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_defaults_match_lab_setup() {
        let cli = Cli::try_parse_from(["tiled-matmul"]).unwrap();
        assert!(cli.command.is_none());
        let config = cli.run.to_config();
        assert_eq!(config.dim, 1000);
        assert_eq!(config.max_value, 10);
        assert_eq!(config.vendor, "NVIDIA");
    }

    #[test]
    fn test_run_flags() {
        let cli = Cli::try_parse_from([
            "tiled-matmul",
            "-n",
            "64",
            "--compute-units",
            "16",
            "--vendor",
            "AMD",
            "--json",
        ])
        .unwrap();
        let config = cli.run.to_config();
        assert_eq!(config.dim, 64);
        assert_eq!(config.compute_units, Some(16));
        assert_eq!(config.vendor, "AMD");
        assert!(cli.run.json);
    }

    #[test]
    fn test_devices_subcommand() {
        let cli = Cli::try_parse_from(["tiled-matmul", "devices", "--json"]).unwrap();
        assert!(matches!(cli.command, Some(Commands::Devices { json: true })));
    }

    #[test]
    fn test_run_args_conflict_with_subcommand() {
        assert!(Cli::try_parse_from(["tiled-matmul", "-n", "8", "devices"]).is_err());
    }
}
