//! GPU adapter enumeration, selection and device initialization

use serde::Serialize;

use super::runtime;
use super::workgroup::DeviceLimits;
use crate::error::{MatmulError, Result};

/// Vendor substring preferred when no other is configured
pub const DEFAULT_VENDOR: &str = "NVIDIA";

/// Human-readable vendor for a PCI vendor id
pub fn vendor_name(vendor_id: u32) -> &'static str {
    match vendor_id {
        0x10DE => "NVIDIA",
        0x1002 | 0x1022 => "AMD",
        0x8086 => "Intel",
        0x106B => "Apple",
        0x13B5 => "ARM",
        0x5143 => "Qualcomm",
        _ => "Unknown",
    }
}

/// What the benchmark needs to know about one adapter
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AdapterSummary {
    /// Position in wgpu's enumeration order
    pub index: usize,
    /// Adapter name as reported by the driver
    pub name: String,
    /// PCI vendor id
    pub vendor_id: u32,
    /// Graphics API backing the adapter
    pub backend: String,
    /// Discrete, integrated, CPU, ...
    pub device_type: String,
    /// Limits relevant to the tiled kernel
    pub limits: DeviceLimits,
    /// Whether pass-level timestamp queries are supported
    pub timestamps: bool,
    /// Whether the adapter can run compute shaders at all
    pub compute_shaders: bool,
}

impl AdapterSummary {
    fn from_adapter(index: usize, adapter: &wgpu::Adapter) -> Self {
        let info = adapter.get_info();
        Self {
            index,
            name: info.name,
            vendor_id: info.vendor,
            backend: format!("{:?}", info.backend),
            device_type: format!("{:?}", info.device_type),
            limits: DeviceLimits::from_wgpu(&adapter.limits()),
            timestamps: adapter.features().contains(wgpu::Features::TIMESTAMP_QUERY),
            compute_shaders: adapter
                .get_downlevel_capabilities()
                .flags
                .contains(wgpu::DownlevelFlags::COMPUTE_SHADERS),
        }
    }

    /// Case-insensitive match against the adapter and vendor names
    pub fn matches_vendor(&self, needle: &str) -> bool {
        let needle = needle.to_ascii_lowercase();
        self.name.to_ascii_lowercase().contains(&needle)
            || vendor_name(self.vendor_id)
                .to_ascii_lowercase()
                .contains(&needle)
    }

    /// Software rasterizers such as llvmpipe or WARP
    pub fn is_cpu(&self) -> bool {
        self.device_type == format!("{:?}", wgpu::DeviceType::Cpu)
    }
}

/// Picks the first compute-capable adapter whose name contains `vendor`,
/// else the first compute-capable GPU, else any compute-capable adapter
///
/// Returns the adapter's `index`.
///
/// # Errors
///
/// `NoAdapter` when no adapter can run compute shaders
pub fn select_adapter(adapters: &[AdapterSummary], vendor: &str) -> Result<usize> {
    let mut usable = adapters.iter().filter(|a| a.compute_shaders);
    let first = usable
        .clone()
        .find(|a| !a.is_cpu())
        .or_else(|| usable.clone().next())
        .ok_or(MatmulError::NoAdapter)?;
    match usable.find(|a| a.matches_vendor(vendor)) {
        Some(adapter) => Ok(adapter.index),
        None => {
            tracing::warn!(
                vendor,
                fallback = %first.name,
                "no adapter matches vendor, using the first one"
            );
            Ok(first.index)
        }
    }
}

/// Options for opening a device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceOptions {
    /// Vendor-name substring used to choose an adapter
    pub vendor: String,
    /// Replaces the device-derived compute-unit count
    pub compute_units: Option<u32>,
}

impl Default for DeviceOptions {
    fn default() -> Self {
        Self {
            vendor: DEFAULT_VENDOR.to_string(),
            compute_units: None,
        }
    }
}

/// GPU device manager
pub struct GpuDevice {
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    summary: AdapterSummary,
    compute_units: u32,
    timestamps: bool,
}

impl GpuDevice {
    /// Initialize GPU device
    pub fn new(options: &DeviceOptions) -> Result<Self> {
        runtime::block_on(Self::new_async(options))
    }

    async fn new_async(options: &DeviceOptions) -> Result<Self> {
        let instance = wgpu::Instance::default();
        let adapters = instance.enumerate_adapters(wgpu::Backends::all());
        let summaries: Vec<AdapterSummary> = adapters
            .iter()
            .enumerate()
            .map(|(idx, adapter)| AdapterSummary::from_adapter(idx, adapter))
            .collect();

        let index = select_adapter(&summaries, &options.vendor)?;
        let adapter = adapters
            .into_iter()
            .nth(index)
            .ok_or(MatmulError::NoAdapter)?;
        let summary = summaries
            .get(index)
            .cloned()
            .ok_or(MatmulError::NoAdapter)?;

        // Timestamp queries stand in for a profiling-enabled command queue.
        let timestamps = summary.timestamps;
        let required_features = if timestamps {
            wgpu::Features::TIMESTAMP_QUERY
        } else {
            wgpu::Features::empty()
        };

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("tiled-matmul device"),
                    required_features,
                    required_limits: adapter.limits(),
                    memory_hints: wgpu::MemoryHints::Performance,
                },
                None,
            )
            .await?;

        device.on_uncaptured_error(Box::new(|e| {
            tracing::error!(error = %e, "uncaptured GPU error");
        }));

        let compute_units = options
            .compute_units
            .unwrap_or(summary.limits.max_workgroup_size);

        tracing::info!(
            adapter = %summary.name,
            backend = %summary.backend,
            compute_units,
            timestamps,
            "opened GPU device"
        );

        Ok(Self {
            device,
            queue,
            summary,
            compute_units,
            timestamps,
        })
    }

    /// Lists every adapter wgpu can see
    pub fn enumerate() -> Vec<AdapterSummary> {
        let instance = wgpu::Instance::default();
        instance
            .enumerate_adapters(wgpu::Backends::all())
            .iter()
            .enumerate()
            .map(|(idx, adapter)| AdapterSummary::from_adapter(idx, adapter))
            .collect()
    }

    /// Check if a compute-capable GPU is available
    pub fn is_available() -> bool {
        Self::enumerate().iter().any(|a| a.compute_shaders)
    }

    /// The adapter this device was opened on
    pub fn summary(&self) -> &AdapterSummary {
        &self.summary
    }

    /// Limits the device was created with
    pub fn limits(&self) -> DeviceLimits {
        DeviceLimits::from_wgpu(&self.device.limits())
    }

    /// Compute-unit count fed to the work-group heuristic
    ///
    /// wgpu exposes no compute-unit count, so unless overridden this is the
    /// largest local size the device accepts.
    pub fn compute_units(&self) -> u32 {
        self.compute_units
    }

    /// Whether kernel time comes from GPU timestamps
    pub fn supports_timestamps(&self) -> bool {
        self.timestamps
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(index: usize, name: &str, vendor_id: u32) -> AdapterSummary {
        AdapterSummary {
            index,
            name: name.to_string(),
            vendor_id,
            backend: "Vulkan".to_string(),
            device_type: "DiscreteGpu".to_string(),
            limits: DeviceLimits::default(),
            timestamps: false,
            compute_shaders: true,
        }
    }

    #[test]
    fn test_vendor_name_lookup() {
        assert_eq!(vendor_name(0x10DE), "NVIDIA");
        assert_eq!(vendor_name(0x8086), "Intel");
        assert_eq!(vendor_name(0xFFFF), "Unknown");
    }

    #[test]
    fn test_select_prefers_vendor_match() {
        let adapters = vec![
            summary(0, "Intel(R) UHD Graphics 630", 0x8086),
            summary(1, "NVIDIA GeForce RTX 3070", 0x10DE),
        ];
        assert_eq!(select_adapter(&adapters, "NVIDIA").unwrap(), 1);
    }

    #[test]
    fn test_select_is_case_insensitive() {
        let adapters = vec![
            summary(0, "llvmpipe (LLVM 15.0.7, 256 bits)", 0x10005),
            summary(1, "AMD Radeon RX 6800", 0x1002),
        ];
        assert_eq!(select_adapter(&adapters, "radeon").unwrap(), 1);
    }

    #[test]
    fn test_select_matches_vendor_id() {
        let adapters = vec![
            summary(0, "llvmpipe", 0x10005),
            summary(1, "GA104", 0x10DE),
        ];
        assert_eq!(select_adapter(&adapters, "nvidia").unwrap(), 1);
    }

    #[test]
    fn test_select_falls_back_to_first() {
        let adapters = vec![summary(0, "Apple M2", 0x106B)];
        assert_eq!(select_adapter(&adapters, "NVIDIA").unwrap(), 0);
    }

    #[test]
    fn test_select_skips_adapters_without_compute() {
        let mut gl = summary(0, "NVIDIA GeForce (GL)", 0x10DE);
        gl.compute_shaders = false;
        let adapters = vec![gl, summary(1, "Intel Arc A770", 0x8086)];
        assert_eq!(select_adapter(&adapters, "NVIDIA").unwrap(), 1);
    }

    #[test]
    fn test_select_without_compute_is_error() {
        let mut gl = summary(0, "Mesa Intel", 0x8086);
        gl.compute_shaders = false;
        assert!(matches!(
            select_adapter(&[gl], "Intel"),
            Err(MatmulError::NoAdapter)
        ));
    }

    #[test]
    fn test_select_empty_is_error() {
        assert!(matches!(
            select_adapter(&[], "NVIDIA"),
            Err(MatmulError::NoAdapter)
        ));
    }

    #[test]
    fn test_default_options() {
        let opts = DeviceOptions::default();
        assert_eq!(opts.vendor, "NVIDIA");
        assert_eq!(opts.compute_units, None);
    }

    #[test]
    fn test_select_fallback_prefers_gpu_over_cpu_adapter() {
        let mut cpu = summary(0, "llvmpipe (LLVM 15.0.7, 256 bits)", 0x10005);
        cpu.device_type = "Cpu".to_string();
        let adapters = vec![cpu, summary(1, "Apple M2", 0x106B)];
        assert!(adapters[0].is_cpu());
        assert_eq!(select_adapter(&adapters, "NVIDIA").unwrap(), 1);
    }

    #[test]
    fn test_select_uses_cpu_adapter_when_it_is_the_only_one() {
        let mut cpu = summary(0, "llvmpipe", 0x10005);
        cpu.device_type = "Cpu".to_string();
        assert_eq!(select_adapter(&[cpu], "NVIDIA").unwrap(), 0);
    }

    #[test]
    fn test_availability_agrees_with_enumeration() {
        let adapters = GpuDevice::enumerate();
        for (position, adapter) in adapters.iter().enumerate() {
            assert_eq!(adapter.index, position);
        }
        let usable = adapters.iter().any(|a| a.compute_shaders);
        if usable {
            assert!(select_adapter(&adapters, DEFAULT_VENDOR).is_ok());
        } else {
            assert!(select_adapter(&adapters, DEFAULT_VENDOR).is_err());
        }
    }
}
