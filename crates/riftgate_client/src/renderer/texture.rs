use std::fmt;
use std::path::{Path, PathBuf};

use image::{GrayImage, Rgba, RgbaImage};

#[derive(Debug)]
pub enum AssetLoadError {
    ReadFile {
        path: PathBuf,
        source: std::io::Error,
    },
    DecodeImage {
        path: PathBuf,
        source: image::ImageError,
    },
}

impl fmt::Display for AssetLoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReadFile { path, source } => {
                write!(f, "failed to read asset {}: {source}", path.display())
            }
            Self::DecodeImage { path, source } => {
                write!(f, "failed to decode image {}: {source}", path.display())
            }
        }
    }
}

impl std::error::Error for AssetLoadError {}

pub fn load_rgba(path: &Path) -> Result<RgbaImage, AssetLoadError> {
    let bytes = std::fs::read(path).map_err(|source| AssetLoadError::ReadFile {
        path: path.to_path_buf(),
        source,
    })?;
    let decoded = image::load_from_memory(&bytes).map_err(|source| AssetLoadError::DecodeImage {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(decoded.to_rgba8())
}

pub fn load_luma(path: &Path) -> Result<GrayImage, AssetLoadError> {
    let bytes = std::fs::read(path).map_err(|source| AssetLoadError::ReadFile {
        path: path.to_path_buf(),
        source,
    })?;
    let decoded = image::load_from_memory(&bytes).map_err(|source| AssetLoadError::DecodeImage {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(decoded.to_luma8())
}

/// Stand-in texture for assets that failed to load or were never shipped.
pub fn checkerboard(size: u32, tile: u32, light: [u8; 4], dark: [u8; 4]) -> RgbaImage {
    let tile = tile.max(1);
    RgbaImage::from_fn(size, size, |x, y| {
        if ((x / tile) + (y / tile)) % 2 == 0 {
            Rgba(light)
        } else {
            Rgba(dark)
        }
    })
}

pub fn create_texture(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    image: &RgbaImage,
    label: &str,
) -> (wgpu::Texture, wgpu::TextureView) {
    let size = wgpu::Extent3d {
        width: image.width(),
        height: image.height(),
        depth_or_array_layers: 1,
    };
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some(label),
        size,
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: wgpu::TextureFormat::Rgba8UnormSrgb,
        usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        view_formats: &[],
    });

    queue.write_texture(
        wgpu::TexelCopyTextureInfo {
            texture: &texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        image.as_raw(),
        wgpu::TexelCopyBufferLayout {
            offset: 0,
            bytes_per_row: Some(4 * image.width()),
            rows_per_image: Some(image.height()),
        },
        size,
    );

    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    (texture, view)
}

pub fn create_texture_bind_group(
    device: &wgpu::Device,
    layout: &wgpu::BindGroupLayout,
    view: &wgpu::TextureView,
    sampler: &wgpu::Sampler,
    label: &str,
) -> wgpu::BindGroup {
    device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some(label),
        layout,
        entries: &[
            wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::TextureView(view),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: wgpu::BindingResource::Sampler(sampler),
            },
        ],
    })
}

#[cfg(test)]
mod tests {
    use super::checkerboard;

    #[test]
    fn checkerboard_alternates_tiles() {
        let light = [255, 255, 255, 255];
        let dark = [0, 0, 0, 255];
        let image = checkerboard(8, 2, light, dark);

        assert_eq!(image.get_pixel(0, 0).0, light);
        assert_eq!(image.get_pixel(2, 0).0, dark);
        assert_eq!(image.get_pixel(0, 2).0, dark);
        assert_eq!(image.get_pixel(2, 2).0, light);
    }

    #[test]
    fn missing_file_reports_read_error() {
        let err = super::load_rgba(std::path::Path::new("definitely/not/here.png")).unwrap_err();
        assert!(matches!(err, super::AssetLoadError::ReadFile { .. }));
    }
}
