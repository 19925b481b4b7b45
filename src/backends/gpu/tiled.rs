//! Host-side orchestration of the tiled product: staging, dispatch, readback

use tracing::instrument;

use super::device::GpuDevice;
use super::runtime;
use super::shaders::{self, ENTRY_POINT};
use super::workgroup::WorkgroupPlan;
use crate::error::{MatmulError, Result};
use crate::matrix::Matrix;
use crate::timing::{Stopwatch, Timing, TimingSource};

/// Product and measurements of one GPU run
#[derive(Debug, Clone)]
pub struct GpuRun {
    /// C = A × B as read back from the device
    pub product: Matrix,
    /// Kernel execution span
    pub kernel: Timing,
    /// Clock the kernel span was taken with
    pub kernel_source: TimingSource,
    /// Host span covering upload, dispatch and readback
    pub total: Timing,
}

/// A compiled tiled-matmul pipeline for one dimension on one device
pub struct TiledMatmul<'d> {
    gpu: &'d GpuDevice,
    plan: WorkgroupPlan,
    bind_group_layout: wgpu::BindGroupLayout,
    pipeline: wgpu::ComputePipeline,
}

impl<'d> TiledMatmul<'d> {
    /// Plans the launch for `dim x dim` matrices and builds the pipeline
    ///
    /// # Errors
    ///
    /// `InvalidInput` if `dim` does not fit in `u32`, `WorkgroupPlan` if no
    /// launch fits the device, `ShaderBuild` if the generated kernel fails
    /// validation.
    #[instrument(skip(gpu))]
    pub fn new(gpu: &'d GpuDevice, dim: usize) -> Result<Self> {
        let global = u32::try_from(dim).map_err(|_| {
            MatmulError::InvalidInput(format!("dimension {dim} exceeds the u32 dispatch range"))
        })?;
        let plan = WorkgroupPlan::new(global, gpu.compute_units(), &gpu.limits())?;
        let source = shaders::tiled_matmul_shader(&plan);

        let device = &gpu.device;
        device.push_error_scope(wgpu::ErrorFilter::Validation);

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Tiled Matmul Shader"),
            source: wgpu::ShaderSource::Wgsl(source.into()),
        });

        let storage_entry = |binding: u32, read_only: bool| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::COMPUTE,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Storage { read_only },
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        };

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Tiled Matmul Bind Group Layout"),
            entries: &[
                storage_entry(0, true),
                storage_entry(1, true),
                storage_entry(2, false),
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Tiled Matmul Pipeline Layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("Tiled Matmul Pipeline"),
            layout: Some(&pipeline_layout),
            module: &shader,
            entry_point: ENTRY_POINT,
            compilation_options: Default::default(),
            cache: None,
        });

        if let Some(err) = runtime::block_on(device.pop_error_scope()) {
            return Err(MatmulError::ShaderBuild(err.to_string()));
        }

        tracing::debug!(
            local = plan.local(),
            groups = plan.groups(),
            staging = ?plan.staging(),
            "built tiled matmul pipeline"
        );

        Ok(Self {
            gpu,
            plan,
            bind_group_layout,
            pipeline,
        })
    }

    /// Launch geometry chosen for this pipeline
    pub fn plan(&self) -> &WorkgroupPlan {
        &self.plan
    }

    /// Computes `a × b` on the GPU
    ///
    /// # Errors
    ///
    /// `SizeMismatch` if an operand is not `dim x dim`; `Dispatch` or
    /// `BufferMap` on device failures.
    pub fn run(&self, a: &Matrix, b: &Matrix) -> Result<GpuRun> {
        runtime::block_on(self.run_async(a, b))
    }

    #[instrument(skip_all, fields(dim = self.plan.global()))]
    async fn run_async(&self, a: &Matrix, b: &Matrix) -> Result<GpuRun> {
        let dim = self.plan.global() as usize;
        for operand in [a, b] {
            if operand.shape() != (dim, dim) {
                return Err(MatmulError::SizeMismatch {
                    expected: dim * dim,
                    actual: operand.rows() * operand.cols(),
                });
            }
        }

        let device = &self.gpu.device;
        let queue = &self.gpu.queue;
        let bytes = std::mem::size_of_val(a.as_slice()) as u64;
        let total = Stopwatch::start();

        device.push_error_scope(wgpu::ErrorFilter::Validation);

        let a_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Matrix A"),
            size: bytes,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let b_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Matrix B"),
            size: bytes,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let c_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Matrix C"),
            size: bytes,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });

        let staging_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Staging Buffer"),
            size: bytes,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        queue.write_buffer(&a_buffer, 0, bytemuck::cast_slice(a.as_slice()));
        queue.write_buffer(&b_buffer, 0, bytemuck::cast_slice(b.as_slice()));

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Tiled Matmul Bind Group"),
            layout: &self.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: a_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: b_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: c_buffer.as_entire_binding(),
                },
            ],
        });

        let profiler = self
            .gpu
            .supports_timestamps()
            .then(|| TimestampProfiler::new(device));

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Tiled Matmul Encoder"),
        });
        {
            let mut compute_pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("Tiled Matmul Pass"),
                timestamp_writes: profiler.as_ref().map(TimestampProfiler::pass_writes),
            });
            compute_pass.set_pipeline(&self.pipeline);
            compute_pass.set_bind_group(0, &bind_group, &[]);
            // local * groups == dim, so every column gets exactly one invocation
            compute_pass.dispatch_workgroups(self.plan.groups(), 1, 1);
        }
        if let Some(profiler) = &profiler {
            profiler.resolve(&mut encoder);
        }

        let kernel_watch = Stopwatch::start();
        queue.submit(Some(encoder.finish()));
        device.poll(wgpu::Maintain::Wait);
        let host_kernel = kernel_watch.stop();

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Tiled Matmul Readback"),
        });
        encoder.copy_buffer_to_buffer(&c_buffer, 0, &staging_buffer, 0, bytes);
        queue.submit(Some(encoder.finish()));

        if let Some(err) = device.pop_error_scope().await {
            return Err(MatmulError::Dispatch(err.to_string()));
        }

        let buffer_slice = staging_buffer.slice(..);
        runtime::map_read(device, &buffer_slice).await?;
        let data: Vec<f32> = {
            let mapped = buffer_slice.get_mapped_range();
            bytemuck::cast_slice(&mapped).to_vec()
        };
        staging_buffer.unmap();

        let (kernel, kernel_source) = match &profiler {
            Some(profiler) => match profiler.read(device, queue.get_timestamp_period()).await {
                Ok(span) if span.elapsed_ns() > 0 => (span, TimingSource::GpuTimestamp),
                Ok(_) => {
                    tracing::warn!("GPU timestamps reported an empty span, using host clock");
                    (host_kernel, TimingSource::HostClock)
                }
                Err(e) => {
                    tracing::warn!(error = %e, "GPU timestamps unusable, using host clock");
                    (host_kernel, TimingSource::HostClock)
                }
            },
            None => (host_kernel, TimingSource::HostClock),
        };

        Ok(GpuRun {
            product: Matrix::from_vec(dim, dim, data)?,
            kernel,
            kernel_source,
            total: total.stop(),
        })
    }
}

/// Start/end timestamps written around the compute pass
struct TimestampProfiler {
    query_set: wgpu::QuerySet,
    resolve_buffer: wgpu::Buffer,
    readback_buffer: wgpu::Buffer,
}

impl TimestampProfiler {
    const SIZE: u64 = 2 * wgpu::QUERY_SIZE as u64;

    fn new(device: &wgpu::Device) -> Self {
        let query_set = device.create_query_set(&wgpu::QuerySetDescriptor {
            label: Some("Tiled Matmul Timestamps"),
            ty: wgpu::QueryType::Timestamp,
            count: 2,
        });
        let resolve_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Timestamp Resolve"),
            size: Self::SIZE,
            usage: wgpu::BufferUsages::QUERY_RESOLVE | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });
        let readback_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Timestamp Readback"),
            size: Self::SIZE,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        Self {
            query_set,
            resolve_buffer,
            readback_buffer,
        }
    }

    fn pass_writes(&self) -> wgpu::ComputePassTimestampWrites<'_> {
        wgpu::ComputePassTimestampWrites {
            query_set: &self.query_set,
            beginning_of_pass_write_index: Some(0),
            end_of_pass_write_index: Some(1),
        }
    }

    fn resolve(&self, encoder: &mut wgpu::CommandEncoder) {
        encoder.resolve_query_set(&self.query_set, 0..2, &self.resolve_buffer, 0);
        encoder.copy_buffer_to_buffer(&self.resolve_buffer, 0, &self.readback_buffer, 0, Self::SIZE);
    }

    async fn read(&self, device: &wgpu::Device, period_ns: f32) -> Result<Timing> {
        let slice = self.readback_buffer.slice(..);
        runtime::map_read(device, &slice).await?;
        let ticks: Vec<u64> = {
            let mapped = slice.get_mapped_range();
            bytemuck::cast_slice(&mapped).to_vec()
        };
        self.readback_buffer.unmap();
        match ticks.as_slice() {
            [start, end] => Timing::from_ticks(*start, *end, period_ns),
            other => Err(MatmulError::BufferMap(format!(
                "expected 2 timestamps, read {}",
                other.len()
            ))),
        }
    }
}
