//! HDR/EXR skybox loading and GPU resources.
//!
//! The core binds the skybox but never reads it; only the kernel samples it.

use std::path::Path;

use half::f16;
use wgpu::util::DeviceExt;

use super::GpuBackend;
use crate::util::{Error, Result};

/// Skybox texture token (rgba16float, filterable).
pub struct GpuTexture {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    sampler: wgpu::Sampler,
}

impl GpuTexture {
    pub fn view(&self) -> &wgpu::TextureView {
        &self.view
    }

    pub fn sampler(&self) -> &wgpu::Sampler {
        &self.sampler
    }

    pub fn size(&self) -> (u32, u32) {
        (self.texture.width(), self.texture.height())
    }
}

/// Load HDR/EXR file using image crate as linear RGBA f32.
fn load_image_file(path: &Path) -> Result<(u32, u32, Vec<f32>)> {
    use image::{GenericImageView, ImageReader};

    let img = ImageReader::open(path)?
        .decode()
        .map_err(|e| Error::config(format!("cannot decode skybox {}: {e}", path.display())))?;
    let (width, height) = img.dimensions();
    Ok((width, height, img.to_rgba32f().into_raw()))
}

impl GpuBackend {
    /// Upload an equirectangular skybox from linear RGBA f32 texels.
    pub fn create_skybox(&self, width: u32, height: u32, rgba: &[f32]) -> Result<GpuTexture> {
        if width == 0 || height == 0 || rgba.len() != width as usize * height as usize * 4 {
            return Err(Error::config(format!(
                "skybox data has {} floats, expected {}x{}x4",
                rgba.len(),
                width,
                height
            )));
        }

        // f16 keeps the texture filterable without FLOAT32_FILTERABLE
        let data: Vec<f16> = rgba.iter().map(|&v| f16::from_f32(v)).collect();
        let bytes: &[u8] = bytemuck::cast_slice(&data);

        let texture = self
            .scoped(wgpu::ErrorFilter::OutOfMemory, |device| {
                device.create_texture_with_data(
                    &self.queue,
                    &wgpu::TextureDescriptor {
                        label: Some("tracer_skybox"),
                        size: wgpu::Extent3d { width, height, depth_or_array_layers: 1 },
                        mip_level_count: 1,
                        sample_count: 1,
                        dimension: wgpu::TextureDimension::D2,
                        format: wgpu::TextureFormat::Rgba16Float,
                        usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
                        view_formats: &[],
                    },
                    wgpu::util::TextureDataOrder::LayerMajor,
                    bytes,
                )
            })
            .map_err(|e| super::classify("skybox", e))?;

        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        let sampler = self.device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("tracer_skybox_sampler"),
            address_mode_u: wgpu::AddressMode::Repeat,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        Ok(GpuTexture { texture, view, sampler })
    }

    /// Load an HDR/EXR (or any format the image crate decodes) as the skybox.
    pub fn load_skybox(&self, path: impl AsRef<Path>) -> Result<GpuTexture> {
        let path = path.as_ref();
        let (width, height, rgba) = load_image_file(path)?;
        tracing::debug!("skybox {} ({width}x{height})", path.display());
        self.create_skybox(width, height, &rgba)
    }

    /// Uniform-color 1x1 skybox, for scenes without an environment map.
    pub fn solid_skybox(&self, color: [f32; 4]) -> Result<GpuTexture> {
        self.create_skybox(1, 1, &color)
    }
}
