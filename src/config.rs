//! Benchmark configuration

use crate::backends::gpu::device::{DeviceOptions, DEFAULT_VENDOR};
use crate::error::{MatmulError, Result};

/// Default matrix dimension
pub const DEFAULT_DIM: usize = 1000;

/// Inputs are drawn from `0..DEFAULT_MAX_VALUE`
pub const DEFAULT_MAX_VALUE: u32 = 10;

/// Matrices above this dimension are not printed
pub const PRINT_LIMIT: usize = 16;

/// Everything a benchmark run needs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BenchConfig {
    /// N for the N×N operands
    pub dim: usize,
    /// Seed for the input generator
    pub seed: u64,
    /// Exclusive upper bound of the integer inputs
    pub max_value: u32,
    /// Vendor-name substring used to pick the adapter
    pub vendor: String,
    /// Replaces the device-derived compute-unit count
    pub compute_units: Option<u32>,
    /// Skip the serial product (and therefore the comparison)
    pub skip_serial: bool,
    /// Dump A, B and C after the run
    pub print: bool,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            dim: DEFAULT_DIM,
            seed: 1,
            max_value: DEFAULT_MAX_VALUE,
            vendor: DEFAULT_VENDOR.to_string(),
            compute_units: None,
            skip_serial: false,
            print: false,
        }
    }
}

impl BenchConfig {
    /// Checks the configuration before any device work
    ///
    /// # Errors
    ///
    /// `InvalidInput` for a zero dimension, a zero value bound, or a zero
    /// compute-unit override
    pub fn validate(&self) -> Result<()> {
        if self.dim == 0 {
            return Err(MatmulError::InvalidInput(
                "matrix dimension must be at least 1".to_string(),
            ));
        }
        if self.max_value == 0 {
            return Err(MatmulError::InvalidInput(
                "max value must be at least 1".to_string(),
            ));
        }
        if self.compute_units == Some(0) {
            return Err(MatmulError::InvalidInput(
                "compute-unit override must be at least 1".to_string(),
            ));
        }
        if self.exceeds_exact_range() {
            tracing::warn!(
                dim = self.dim,
                max_value = self.max_value,
                "sums may exceed 2^24; bitwise comparison can fail on rounding"
            );
        }
        if self.print && self.dim > PRINT_LIMIT {
            tracing::warn!(
                dim = self.dim,
                limit = PRINT_LIMIT,
                "matrices too large to print, ignoring --print"
            );
        }
        Ok(())
    }

    /// Whether an output element can leave the range where every f32
    /// partial sum is an exact integer
    pub fn exceeds_exact_range(&self) -> bool {
        let max = u64::from(self.max_value.saturating_sub(1));
        (self.dim as u64)
            .saturating_mul(max)
            .saturating_mul(max)
            > 1 << 24
    }

    /// Whether the matrices should be printed
    pub fn should_print(&self) -> bool {
        self.print && self.dim <= PRINT_LIMIT
    }

    /// Device options derived from this configuration
    pub fn device_options(&self) -> DeviceOptions {
        DeviceOptions {
            vendor: self.vendor.clone(),
            compute_units: self.compute_units,
        }
    }
}
