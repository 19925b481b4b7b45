//! Work-group sizing for the tiled kernel
//!
//! The 1-D range has one invocation per output column. Its local size is
//! the greatest common divisor of the problem dimension and the device's
//! compute-unit count, so the range splits into whole work-groups and the
//! kernel needs no bounds checks.

use serde::Serialize;

use crate::error::{MatmulError, Result};

const F32_BYTES: u64 = std::mem::size_of::<f32>() as u64;

/// Greatest common divisor (Euclid); `gcd(x, 0) == x`
pub fn gcd(mut x: u32, mut y: u32) -> u32 {
    while y != 0 {
        let z = x % y;
        x = y;
        y = z;
    }
    x
}

/// The subset of device limits that constrain the plan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DeviceLimits {
    /// Largest local size along x (already capped by invocations per group)
    pub max_workgroup_size: u32,
    /// Bytes of `var<workgroup>` memory per work-group
    pub max_workgroup_storage_bytes: u32,
    /// Largest `dispatch_workgroups` count along one dimension
    pub max_workgroups_per_dimension: u32,
    /// Largest storage buffer binding in bytes
    pub max_storage_binding_bytes: u32,
}

impl DeviceLimits {
    /// Extracts the relevant fields from wgpu's limits
    pub fn from_wgpu(limits: &wgpu::Limits) -> Self {
        Self {
            max_workgroup_size: limits
                .max_compute_workgroup_size_x
                .min(limits.max_compute_invocations_per_workgroup),
            max_workgroup_storage_bytes: limits.max_compute_workgroup_storage_size,
            max_workgroups_per_dimension: limits.max_compute_workgroups_per_dimension,
            max_storage_binding_bytes: limits.max_storage_buffer_binding_size,
        }
    }
}

impl Default for DeviceLimits {
    fn default() -> Self {
        Self::from_wgpu(&wgpu::Limits::default())
    }
}

/// What the kernel keeps in workgroup memory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StagingMode {
    /// Row `i` of A plus the group's column slice of B
    RowAndColumns,
    /// Row `i` of A only; B columns are read from storage memory
    RowOnly,
}

/// Launch geometry for an `N x N` product
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WorkgroupPlan {
    global: u32,
    local: u32,
    groups: u32,
    staging: StagingMode,
}

impl WorkgroupPlan {
    /// Plans a launch of `global` invocations
    ///
    /// `local = gcd(global, compute_units)`, lowered to a divisor of itself
    /// that the device accepts when the compute-unit count exceeds the
    /// device's maximum work-group size.
    ///
    /// # Errors
    ///
    /// `WorkgroupPlan` when `global` is zero, the matrices exceed a storage
    /// binding, the group count exceeds the dispatch limit, or not even one
    /// row of A fits in workgroup memory.
    pub fn new(global: u32, compute_units: u32, limits: &DeviceLimits) -> Result<Self> {
        if global == 0 {
            return Err(MatmulError::WorkgroupPlan(
                "global range must be non-empty".to_string(),
            ));
        }

        let matrix_bytes = u64::from(global) * u64::from(global) * F32_BYTES;
        if matrix_bytes > u64::from(limits.max_storage_binding_bytes) {
            return Err(MatmulError::WorkgroupPlan(format!(
                "{global}x{global} matrix needs {matrix_bytes} bytes, device binds at most {}",
                limits.max_storage_binding_bytes
            )));
        }

        let mut local = gcd(global, compute_units.max(1));
        let cap = limits.max_workgroup_size.max(1);
        if local > cap {
            local = largest_divisor_at_most(local, cap);
        }

        let groups = global / local;
        if groups > limits.max_workgroups_per_dimension {
            return Err(MatmulError::WorkgroupPlan(format!(
                "{groups} work-groups of {local} exceed the dispatch limit of {}",
                limits.max_workgroups_per_dimension
            )));
        }

        let row_bytes = u64::from(global) * F32_BYTES;
        let columns_bytes = row_bytes * u64::from(local);
        let budget = u64::from(limits.max_workgroup_storage_bytes);
        let staging = if row_bytes + columns_bytes <= budget {
            StagingMode::RowAndColumns
        } else if row_bytes <= budget {
            StagingMode::RowOnly
        } else {
            return Err(MatmulError::WorkgroupPlan(format!(
                "a {row_bytes}-byte row does not fit in {budget} bytes of workgroup memory"
            )));
        };

        tracing::debug!(global, local, groups, ?staging, "planned work-groups");
        Ok(Self {
            global,
            local,
            groups,
            staging,
        })
    }

    /// Total invocations (the matrix dimension)
    pub fn global(&self) -> u32 {
        self.global
    }

    /// Invocations per work-group
    pub fn local(&self) -> u32 {
        self.local
    }

    /// Work-groups dispatched
    pub fn groups(&self) -> u32 {
        self.groups
    }

    /// Workgroup memory layout
    pub fn staging(&self) -> StagingMode {
        self.staging
    }

    /// Bytes of workgroup memory the kernel declares
    pub fn workgroup_storage_bytes(&self) -> u64 {
        let row = u64::from(self.global) * F32_BYTES;
        match self.staging {
            StagingMode::RowAndColumns => row + row * u64::from(self.local),
            StagingMode::RowOnly => row,
        }
    }
}

fn largest_divisor_at_most(value: u32, cap: u32) -> u32 {
    (1..=cap.min(value))
        .rev()
        .find(|d| value % d == 0)
        .unwrap_or(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limits() -> DeviceLimits {
        DeviceLimits {
            max_workgroup_size: 256,
            max_workgroup_storage_bytes: 16384,
            max_workgroups_per_dimension: 65535,
            max_storage_binding_bytes: 128 << 20,
        }
    }

    #[test]
    fn test_gcd_basic() {
        assert_eq!(gcd(1000, 256), 8);
        assert_eq!(gcd(1000, 40), 40);
        assert_eq!(gcd(17, 5), 1);
        assert_eq!(gcd(0, 9), 9);
        assert_eq!(gcd(9, 0), 9);
    }

    #[test]
    fn test_plan_default_problem() {
        let plan = WorkgroupPlan::new(1000, 256, &limits()).unwrap();
        assert_eq!(plan.local(), 8);
        assert_eq!(plan.groups(), 125);
        // 4000 + 32000 bytes does not fit 16 KiB
        assert_eq!(plan.staging(), StagingMode::RowOnly);
    }

    #[test]
    fn test_plan_small_problem_stages_columns() {
        let plan = WorkgroupPlan::new(64, 16, &limits()).unwrap();
        assert_eq!(plan.local(), 16);
        assert_eq!(plan.groups(), 4);
        assert_eq!(plan.staging(), StagingMode::RowAndColumns);
        assert_eq!(plan.workgroup_storage_bytes(), 256 + 256 * 16);
    }

    #[test]
    fn test_plan_prime_dimension_falls_back_to_one() {
        let plan = WorkgroupPlan::new(997, 256, &limits()).unwrap();
        assert_eq!(plan.local(), 1);
        assert_eq!(plan.groups(), 997);
    }

    #[test]
    fn test_plan_caps_local_to_device_limit() {
        let plan = WorkgroupPlan::new(1024, 1024, &limits()).unwrap();
        assert_eq!(plan.local(), 256);
        assert_eq!(plan.groups(), 4);
    }

    #[test]
    fn test_plan_zero_compute_units_is_treated_as_one() {
        let plan = WorkgroupPlan::new(12, 0, &limits()).unwrap();
        assert_eq!(plan.local(), 1);
    }

    #[test]
    fn test_plan_rejects_empty_range() {
        assert!(WorkgroupPlan::new(0, 8, &limits()).is_err());
    }

    #[test]
    fn test_plan_rejects_row_larger_than_workgroup_memory() {
        // 8192 floats = 32 KiB row
        let wide = DeviceLimits {
            max_storage_binding_bytes: u32::MAX,
            ..limits()
        };
        assert!(matches!(
            WorkgroupPlan::new(8192, 8, &wide),
            Err(MatmulError::WorkgroupPlan(_))
        ));
    }

    #[test]
    fn test_plan_rejects_oversized_binding() {
        let small = DeviceLimits {
            max_storage_binding_bytes: 1024,
            ..limits()
        };
        assert!(WorkgroupPlan::new(32, 8, &small).is_err());
    }

    #[test]
    fn test_plan_rejects_too_many_groups() {
        let narrow = DeviceLimits {
            max_workgroups_per_dimension: 4,
            ..limits()
        };
        assert!(WorkgroupPlan::new(15, 1, &narrow).is_err());
    }

    #[test]
    fn test_default_limits_match_wgpu_defaults() {
        let l = DeviceLimits::default();
        assert_eq!(l.max_workgroup_size, 256);
        assert_eq!(l.max_workgroup_storage_bytes, 16384);
    }
}
