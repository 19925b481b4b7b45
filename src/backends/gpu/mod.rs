//! GPU backend using wgpu (Vulkan/Metal/DX12)
//!
//! Runs the tiled product as a single WGSL compute dispatch: one invocation
//! per output column, work-groups sized by the gcd heuristic in
//! [`workgroup`], rows of A (and, when they fit, columns of B) staged in
//! workgroup memory.
//!
//! # Architecture
//!
//! - [`device`]: adapter enumeration, vendor-substring selection, device
//!   creation with timestamp queries when available
//! - [`workgroup`]: launch geometry and workgroup-memory budget
//! - [`shaders`]: WGSL generation with the plan baked in
//! - [`tiled`]: buffer staging, dispatch, readback and profiling

pub mod device;
pub mod runtime;
pub mod shaders;
pub mod tiled;
pub mod workgroup;

pub use device::{AdapterSummary, DeviceOptions, GpuDevice};
pub use tiled::{GpuRun, TiledMatmul};
pub use workgroup::{gcd, DeviceLimits, StagingMode, WorkgroupPlan};
