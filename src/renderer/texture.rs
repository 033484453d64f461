//! Texture loading, cubemaps and image readback
//!
//! Provides texture loading from files, GPU upload for 2D and cube textures,
//! and the row-padding helpers used when copying a render target back to the
//! CPU for snapshots.

use std::path::Path;

use image::GenericImageView;
use wgpu::util::DeviceExt;

/// Errors that can occur while loading or writing images
#[derive(Debug, thiserror::Error)]
pub enum TextureError {
    /// IO error reading or writing a file
    #[error("texture io error: {0}")]
    Io(#[from] std::io::Error),
    /// Error decoding or encoding image data
    #[error("image codec error: {0}")]
    Decode(#[from] image::ImageError),
    /// Pixel data does not match the requested size
    #[error("expected {expected} bytes of pixel data, got {actual}")]
    Dimensions { expected: usize, actual: usize },
}

fn default_sampler(device: &wgpu::Device, address_mode: wgpu::AddressMode) -> wgpu::Sampler {
    device.create_sampler(&wgpu::SamplerDescriptor {
        label: Some("texture_sampler"),
        address_mode_u: address_mode,
        address_mode_v: address_mode,
        address_mode_w: address_mode,
        mag_filter: wgpu::FilterMode::Linear,
        min_filter: wgpu::FilterMode::Linear,
        mipmap_filter: wgpu::FilterMode::Linear,
        ..Default::default()
    })
}

fn check_len(data: &[u8], expected: usize) -> Result<(), TextureError> {
    if data.len() == expected {
        Ok(())
    } else {
        Err(TextureError::Dimensions {
            expected,
            actual: data.len(),
        })
    }
}

// ============================================================================
// 2D Textures
// ============================================================================

/// A GPU 2D texture with its view and sampler
#[derive(Debug)]
pub struct Texture2D {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    pub sampler: wgpu::Sampler,
    pub size: wgpu::Extent3d,
    pub format: wgpu::TextureFormat,
}

impl Texture2D {
    /// Load a texture from a file path, downscaled to fit `max_dimension`
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or decoded
    pub fn from_path(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        path: impl AsRef<Path>,
        max_dimension: Option<u32>,
        label: Option<&str>,
    ) -> Result<Self, TextureError> {
        let bytes = std::fs::read(path)?;
        Self::from_bytes(device, queue, &bytes, max_dimension, label)
    }

    /// Load a texture from encoded bytes (PNG, JPEG)
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes cannot be decoded as an image
    pub fn from_bytes(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        bytes: &[u8],
        max_dimension: Option<u32>,
        label: Option<&str>,
    ) -> Result<Self, TextureError> {
        let img = fit_to_max_dimension(image::load_from_memory(bytes)?, max_dimension);
        let rgba = img.to_rgba8();
        Self::from_rgba(device, queue, &rgba, img.dimensions(), label)
    }

    /// Create an sRGB texture from raw RGBA8 data
    ///
    /// # Errors
    ///
    /// `Dimensions` if `rgba` does not hold `width * height` pixels
    pub fn from_rgba(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        rgba: &[u8],
        dimensions: (u32, u32),
        label: Option<&str>,
    ) -> Result<Self, TextureError> {
        check_len(rgba, dimensions.0 as usize * dimensions.1 as usize * 4)?;
        let size = wgpu::Extent3d {
            width: dimensions.0,
            height: dimensions.1,
            depth_or_array_layers: 1,
        };
        let format = wgpu::TextureFormat::Rgba8UnormSrgb;

        let texture = device.create_texture_with_data(
            queue,
            &wgpu::TextureDescriptor {
                label,
                size,
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format,
                usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
                view_formats: &[],
            },
            wgpu::util::TextureDataOrder::LayerMajor,
            rgba,
        );
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        Ok(Self {
            texture,
            view,
            sampler: default_sampler(device, wgpu::AddressMode::Repeat),
            size,
            format,
        })
    }

    /// 1x1 texture of a single color, used as a material default
    #[must_use]
    pub fn solid_color(device: &wgpu::Device, queue: &wgpu::Queue, color: [u8; 4]) -> Self {
        let size = wgpu::Extent3d {
            width: 1,
            height: 1,
            depth_or_array_layers: 1,
        };
        let format = wgpu::TextureFormat::Rgba8Unorm;
        let texture = device.create_texture_with_data(
            queue,
            &wgpu::TextureDescriptor {
                label: Some("solid_color_texture"),
                size,
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format,
                usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
                view_formats: &[],
            },
            wgpu::util::TextureDataOrder::LayerMajor,
            &color,
        );
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self {
            texture,
            view,
            sampler: default_sampler(device, wgpu::AddressMode::Repeat),
            size,
            format,
        }
    }

    /// Empty texture that can be rendered or written into by compute
    #[must_use]
    pub fn render_target(
        device: &wgpu::Device,
        (width, height): (u32, u32),
        format: wgpu::TextureFormat,
        usage: wgpu::TextureUsages,
        label: &str,
    ) -> Self {
        let size = wgpu::Extent3d {
            width: width.max(1),
            height: height.max(1),
            depth_or_array_layers: 1,
        };
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage: usage | wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self {
            texture,
            view,
            sampler: default_sampler(device, wgpu::AddressMode::ClampToEdge),
            size,
            format,
        }
    }

    #[must_use]
    pub const fn width(&self) -> u32 {
        self.size.width
    }

    #[must_use]
    pub const fn height(&self) -> u32 {
        self.size.height
    }
}

// ============================================================================
// Cube Textures
// ============================================================================

/// Six-faced texture for skies and environment probes
#[derive(Debug)]
pub struct TextureCube {
    pub texture: wgpu::Texture,
    /// Cube view for sampling
    pub view: wgpu::TextureView,
    pub sampler: wgpu::Sampler,
    /// Edge length of one face
    pub size: u32,
    pub format: wgpu::TextureFormat,
}

impl TextureCube {
    /// Upload six RGBA8 faces in +X, -X, +Y, -Y, +Z, -Z order.
    ///
    /// # Errors
    ///
    /// `Dimensions` if any face does not hold `size * size` pixels.
    pub fn from_faces(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        faces: [&[u8]; 6],
        size: u32,
        label: Option<&str>,
    ) -> Result<Self, TextureError> {
        let face_len = size as usize * size as usize * 4;
        let mut data = Vec::with_capacity(face_len * 6);
        for face in faces {
            check_len(face, face_len)?;
            data.extend_from_slice(face);
        }

        let format = wgpu::TextureFormat::Rgba8UnormSrgb;
        let texture = device.create_texture_with_data(
            queue,
            &wgpu::TextureDescriptor {
                label,
                size: wgpu::Extent3d {
                    width: size,
                    height: size,
                    depth_or_array_layers: 6,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format,
                usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
                view_formats: &[],
            },
            wgpu::util::TextureDataOrder::LayerMajor,
            &data,
        );
        Ok(Self::wrap(device, texture, size, format))
    }

    /// Cube that passes render or compute into, one layer per face.
    #[must_use]
    pub fn render_target(
        device: &wgpu::Device,
        size: u32,
        format: wgpu::TextureFormat,
        usage: wgpu::TextureUsages,
        label: &str,
    ) -> Self {
        let size = size.max(1);
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width: size,
                height: size,
                depth_or_array_layers: 6,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage: usage | wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        });
        Self::wrap(device, texture, size, format)
    }

    fn wrap(
        device: &wgpu::Device,
        texture: wgpu::Texture,
        size: u32,
        format: wgpu::TextureFormat,
    ) -> Self {
        let view = texture.create_view(&wgpu::TextureViewDescriptor {
            label: Some("cube_view"),
            dimension: Some(wgpu::TextureViewDimension::Cube),
            ..Default::default()
        });
        Self {
            texture,
            view,
            sampler: default_sampler(device, wgpu::AddressMode::ClampToEdge),
            size,
            format,
        }
    }

    /// 2D view of one face, for rendering into it.
    #[must_use]
    pub fn face_view(&self, face: u32) -> wgpu::TextureView {
        self.texture.create_view(&wgpu::TextureViewDescriptor {
            label: Some("cube_face_view"),
            dimension: Some(wgpu::TextureViewDimension::D2),
            base_array_layer: face,
            array_layer_count: Some(1),
            ..Default::default()
        })
    }
}

// ============================================================================
// Readback
// ============================================================================

/// Row pitch a texture-to-buffer copy requires for `width` pixels.
#[must_use]
pub const fn padded_bytes_per_row(width: u32, bytes_per_pixel: u32) -> u32 {
    let unpadded = width * bytes_per_pixel;
    let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
    unpadded.div_ceil(align) * align
}

/// Strip copy padding from mapped rows.
#[must_use]
pub fn unpad_rows(data: &[u8], width: u32, height: u32, bytes_per_pixel: u32) -> Vec<u8> {
    let row = (width * bytes_per_pixel) as usize;
    let padded = padded_bytes_per_row(width, bytes_per_pixel) as usize;
    let mut out = Vec::with_capacity(row * height as usize);
    for chunk in data.chunks(padded).take(height as usize) {
        out.extend_from_slice(&chunk[..row.min(chunk.len())]);
    }
    out
}

/// Encode tightly packed RGBA8 pixels as a PNG.
///
/// # Errors
///
/// `Dimensions` on a size mismatch, `Decode` or `Io` when writing fails.
pub fn write_png(
    path: impl AsRef<Path>,
    width: u32,
    height: u32,
    rgba: Vec<u8>,
) -> Result<(), TextureError> {
    let expected = width as usize * height as usize * 4;
    let actual = rgba.len();
    let image = image::RgbaImage::from_raw(width, height, rgba)
        .ok_or(TextureError::Dimensions { expected, actual })?;
    if let Some(parent) = path.as_ref().parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    image.save(path)?;
    Ok(())
}

/// Shrink `img` so neither side exceeds `max`, keeping its aspect ratio.
#[must_use]
pub fn fit_to_max_dimension(img: image::DynamicImage, max: Option<u32>) -> image::DynamicImage {
    match max {
        Some(max) if img.width() > max || img.height() > max => {
            img.resize(max, max, image::imageops::FilterType::Triangle)
        }
        _ => img,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_padding() {
        assert_eq!(padded_bytes_per_row(64, 4), 256);
        assert_eq!(padded_bytes_per_row(65, 4), 512);
        assert_eq!(padded_bytes_per_row(1, 4), 256);
    }

    #[test]
    fn test_unpad_rows() {
        let padded = padded_bytes_per_row(2, 4) as usize;
        let mut data = vec![0u8; padded * 2];
        data[..8].copy_from_slice(&[1, 2, 3, 4, 5, 6, 7, 8]);
        data[padded..padded + 8].copy_from_slice(&[9, 10, 11, 12, 13, 14, 15, 16]);

        let pixels = unpad_rows(&data, 2, 2, 4);
        assert_eq!(pixels, (1..=16).collect::<Vec<u8>>());
    }

    #[test]
    fn test_fit_to_max_dimension_keeps_aspect() {
        let wide = image::DynamicImage::new_rgba8(1024, 256);
        let fitted = fit_to_max_dimension(wide.clone(), Some(512));
        assert_eq!(fitted.dimensions(), (512, 128));

        assert_eq!(fit_to_max_dimension(wide.clone(), None).dimensions(), (1024, 256));
        assert_eq!(fit_to_max_dimension(wide, Some(2048)).dimensions(), (1024, 256));
    }

    #[test]
    fn test_write_png_rejects_short_buffer() {
        let path = std::env::temp_dir().join("recluse_short.png");
        let result = write_png(&path, 4, 4, vec![0; 10]);
        assert!(matches!(
            result,
            Err(TextureError::Dimensions {
                expected: 64,
                actual: 10
            })
        ));
    }

    #[test]
    fn test_write_png_roundtrips_pixels() {
        let path = std::env::temp_dir().join("recluse_snapshot_test.png");
        let pixels: Vec<u8> = (0..16).flat_map(|i| [i * 10, 0, 255 - i, 255]).collect();
        write_png(&path, 4, 4, pixels.clone()).unwrap();

        let decoded = image::open(&path).unwrap().to_rgba8();
        assert_eq!(decoded.dimensions(), (4, 4));
        assert_eq!(decoded.into_raw(), pixels);
        let _ = std::fs::remove_file(path);
    }
}
