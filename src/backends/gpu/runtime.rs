//! Blocking helpers for wgpu's async API

use crate::error::{MatmulError, Result};

/// Block on async code
pub fn block_on<F: std::future::Future>(f: F) -> F::Output {
    pollster::block_on(f)
}

/// Maps a staging buffer for reading and waits for the device
///
/// The slice stays mapped on success; the caller reads it and unmaps.
pub async fn map_read(device: &wgpu::Device, slice: &wgpu::BufferSlice<'_>) -> Result<()> {
    let (sender, receiver) = futures_intrusive::channel::shared::oneshot_channel();
    slice.map_async(wgpu::MapMode::Read, move |result| {
        sender.send(result).ok();
    });

    device.poll(wgpu::Maintain::Wait);

    receiver
        .receive()
        .await
        .ok_or_else(|| MatmulError::BufferMap("mapping callback dropped".to_string()))?
        .map_err(|e| MatmulError::BufferMap(format!("{e:?}")))
}
