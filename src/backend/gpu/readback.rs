//! Copy a destination back to the CPU.

use half::f16;

use super::{GpuBackend, GpuTarget};
use crate::util::{Error, Result};

impl GpuBackend {
    /// Read the destination as linear RGBA f32, row-major.
    ///
    /// Supports `Rgba16Float` and `Rgba32Float` destinations.
    pub fn read_target(&self, target: &GpuTarget) -> Result<Vec<[f32; 4]>> {
        let format = target.format();
        let bytes_per_pixel = match format {
            wgpu::TextureFormat::Rgba16Float => 8u32,
            wgpu::TextureFormat::Rgba32Float => 16u32,
            other => return Err(Error::config(format!("readback of {other:?} is not supported"))),
        };

        let (width, height) = (target.width, target.height);
        let unpadded = width * bytes_per_pixel;
        // bytes_per_row must be aligned to 256 (COPY_BYTES_PER_ROW_ALIGNMENT)
        let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
        let padded = unpadded.div_ceil(align) * align;

        let staging = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("tracer_readback"),
            size: padded as u64 * height as u64,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("tracer_readback"),
        });
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture: target.texture(),
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &staging,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(padded),
                    rows_per_image: Some(height),
                },
            },
            wgpu::Extent3d { width, height, depth_or_array_layers: 1 },
        );
        self.queue.submit(Some(encoder.finish()));

        let slice = staging.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        self.device
            .poll(wgpu::PollType::wait_indefinitely())
            .map_err(|e| Error::Backend(format!("readback poll failed: {e}")))?;
        rx.recv()
            .map_err(|_| Error::Backend("readback channel closed".into()))?
            .map_err(|e| Error::Backend(format!("readback map failed: {e}")))?;

        let mut pixels = Vec::with_capacity(width as usize * height as usize);
        {
            let data = slice.get_mapped_range();
            for row in data.chunks_exact(padded as usize) {
                let row = &row[..unpadded as usize];
                match format {
                    wgpu::TextureFormat::Rgba16Float => pixels.extend(row.chunks_exact(8).map(|px| {
                        let texel: [f16; 4] = bytemuck::pod_read_unaligned(px);
                        texel.map(f16::to_f32)
                    })),
                    _ => pixels.extend(row.chunks_exact(16).map(bytemuck::pod_read_unaligned::<[f32; 4]>)),
                }
            }
        }
        staging.unmap();
        Ok(pixels)
    }
}
