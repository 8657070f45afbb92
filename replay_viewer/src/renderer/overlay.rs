use std::borrow::Cow;

use anyhow::{Result, ensure};
use bytemuck::cast_slice;
use font8x8::legacy::BASIC_LEGACY;
use wgpu::util::DeviceExt;
use winit::dpi::PhysicalSize;

use super::shaders::QuadVertex;

const GLYPH_WIDTH: u32 = 8;
const GLYPH_HEIGHT: u32 = 8;
const FG_COLOR: [u8; 4] = [255, 255, 255, 240];
const BG_COLOR: [u8; 4] = [0, 0, 0, 96];

/// Size and placement of the HUD panel, in texture pixels.
#[derive(Debug, Clone, Copy)]
pub struct OverlayConfig {
    pub width: u32,
    pub height: u32,
    pub padding_x: u32,
    pub padding_y: u32,
    /// Integer upscale applied when the panel is drawn.
    pub scale: u32,
    pub margin: u32,
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            width: 640,
            height: 64,
            padding_x: 6,
            padding_y: 6,
            scale: 2,
            margin: 12,
        }
    }
}

pub struct TextureUpload<'a> {
    data: Cow<'a, [u8]>,
    bytes_per_row: u32,
}

impl TextureUpload<'_> {
    pub fn pixels(&self) -> &[u8] {
        &self.data
    }

    pub fn bytes_per_row(&self) -> u32 {
        self.bytes_per_row
    }
}

/// Pad RGBA rows out to the copy alignment wgpu requires.
pub fn prepare_rgba_upload(width: u32, height: u32, data: &[u8]) -> Result<TextureUpload<'_>> {
    ensure!(width > 0 && height > 0, "texture has no dimensions");
    let row_bytes = 4usize * width as usize;
    let alignment = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT as usize;
    ensure!(
        data.len() >= row_bytes * height as usize,
        "texture buffer ({}) smaller than {}x{} RGBA ({})",
        data.len(),
        width,
        height,
        row_bytes * height as usize
    );

    if row_bytes % alignment == 0 && data.len() == row_bytes * height as usize {
        return Ok(TextureUpload {
            data: Cow::Borrowed(data),
            bytes_per_row: row_bytes as u32,
        });
    }

    let padded_row_bytes = row_bytes.div_ceil(alignment) * alignment;
    let mut buffer = vec![0u8; padded_row_bytes * height as usize];
    for (row, source) in data.chunks(row_bytes).take(height as usize).enumerate() {
        let offset = row * padded_row_bytes;
        buffer[offset..offset + source.len()].copy_from_slice(source);
    }
    Ok(TextureUpload {
        data: Cow::Owned(buffer),
        bytes_per_row: padded_row_bytes as u32,
    })
}

fn glyph_for_char(ch: char) -> [u8; 8] {
    let index = ch as usize;
    if index < BASIC_LEGACY.len() {
        BASIC_LEGACY[index]
    } else {
        BASIC_LEGACY[b'?' as usize]
    }
}

fn fill_background(pixels: &mut [u8]) {
    for chunk in pixels.chunks_exact_mut(4) {
        chunk.copy_from_slice(&BG_COLOR);
    }
}

/// Clear `pixels` and blit `lines` into it, clipping at the padded edges.
fn rasterize_lines(pixels: &mut [u8], config: &OverlayConfig, lines: &[String]) {
    fill_background(pixels);

    let usable_width = config.width.saturating_sub(config.padding_x * 2);
    let usable_height = config.height.saturating_sub(config.padding_y * 2);
    let max_cols = (usable_width / GLYPH_WIDTH) as usize;
    let max_rows = (usable_height / GLYPH_HEIGHT) as usize;

    for (row_idx, line) in lines.iter().take(max_rows).enumerate() {
        let glyph_row = config.padding_y + row_idx as u32 * GLYPH_HEIGHT;
        for (col_idx, ch) in line.chars().take(max_cols).enumerate() {
            let glyph_col = config.padding_x + col_idx as u32 * GLYPH_WIDTH;
            for (y_offset, bits) in glyph_for_char(ch).iter().enumerate() {
                let y = glyph_row + y_offset as u32;
                for x_bit in 0..GLYPH_WIDTH {
                    if (bits >> x_bit) & 0x01 == 0 {
                        continue;
                    }
                    let x = glyph_col + x_bit;
                    let idx = ((y * config.width + x) * 4) as usize;
                    if let Some(pixel) = pixels.get_mut(idx..idx + 4) {
                        pixel.copy_from_slice(&FG_COLOR);
                    }
                }
            }
        }
    }
}

fn vertex_positions(config: &OverlayConfig, window_size: PhysicalSize<u32>) -> [QuadVertex; 4] {
    let win_width = window_size.width.max(1) as f32;
    let win_height = window_size.height.max(1) as f32;
    let x = config.margin as f32;
    let y = config.margin as f32;
    let width = (config.width * config.scale) as f32;
    let height = (config.height * config.scale) as f32;

    let left = (x / win_width) * 2.0 - 1.0;
    let right = ((x + width) / win_width) * 2.0 - 1.0;
    let top = 1.0 - (y / win_height) * 2.0;
    let bottom = 1.0 - ((y + height) / win_height) * 2.0;

    [
        QuadVertex {
            position: [left, top],
            uv: [0.0, 0.0],
        },
        QuadVertex {
            position: [right, top],
            uv: [1.0, 0.0],
        },
        QuadVertex {
            position: [left, bottom],
            uv: [0.0, 1.0],
        },
        QuadVertex {
            position: [right, bottom],
            uv: [1.0, 1.0],
        },
    ]
}

/// Status panel drawn over the scene with the 8x8 bitmap font.
pub struct TextOverlay {
    texture: wgpu::Texture,
    _view: wgpu::TextureView,
    _sampler: wgpu::Sampler,
    bind_group: wgpu::BindGroup,
    vertex_buffer: wgpu::Buffer,
    config: OverlayConfig,
    pixels: Vec<u8>,
    lines: Vec<String>,
    dirty: bool,
}

impl TextOverlay {
    pub fn new(
        device: &wgpu::Device,
        bind_group_layout: &wgpu::BindGroupLayout,
        window_size: PhysicalSize<u32>,
        config: OverlayConfig,
    ) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("hud-texture"),
            size: wgpu::Extent3d {
                width: config.width,
                height: config.height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8UnormSrgb,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("hud-sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Nearest,
            min_filter: wgpu::FilterMode::Nearest,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("hud-bind-group"),
            layout: bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&sampler),
                },
            ],
        });
        let vertex_buffer = Self::create_vertex_buffer(device, &config, window_size);

        let mut pixels = vec![0u8; (config.width * config.height * 4) as usize];
        fill_background(&mut pixels);

        Self {
            texture,
            _view: view,
            _sampler: sampler,
            bind_group,
            vertex_buffer,
            config,
            pixels,
            lines: Vec::new(),
            dirty: true,
        }
    }

    fn create_vertex_buffer(
        device: &wgpu::Device,
        config: &OverlayConfig,
        window_size: PhysicalSize<u32>,
    ) -> wgpu::Buffer {
        let vertices = vertex_positions(config, window_size);
        device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("hud-vertices"),
            contents: cast_slice(&vertices),
            usage: wgpu::BufferUsages::VERTEX,
        })
    }

    pub fn resize(&mut self, device: &wgpu::Device, window_size: PhysicalSize<u32>) {
        self.vertex_buffer = Self::create_vertex_buffer(device, &self.config, window_size);
    }

    /// Re-rasterize only when the text actually changed.
    pub fn set_lines(&mut self, lines: &[String]) {
        if self.lines == lines {
            return;
        }
        self.lines = lines.to_vec();
        rasterize_lines(&mut self.pixels, &self.config, lines);
        self.dirty = true;
    }

    pub fn upload(&mut self, queue: &wgpu::Queue) {
        if !self.dirty {
            return;
        }
        let upload = match prepare_rgba_upload(self.config.width, self.config.height, &self.pixels)
        {
            Ok(upload) => upload,
            Err(err) => {
                log::warn!(
                    "hud upload failed ({}x{}): {err:#}",
                    self.config.width,
                    self.config.height
                );
                return;
            }
        };
        queue.write_texture(
            wgpu::ImageCopyTexture {
                texture: &self.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            upload.pixels(),
            wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(upload.bytes_per_row()),
                rows_per_image: Some(self.config.height),
            },
            wgpu::Extent3d {
                width: self.config.width,
                height: self.config.height,
                depth_or_array_layers: 1,
            },
        );
        self.dirty = false;
    }

    pub fn bind_group(&self) -> &wgpu::BindGroup {
        &self.bind_group
    }

    pub fn vertex_buffer(&self) -> &wgpu::Buffer {
        &self.vertex_buffer
    }

    pub fn is_visible(&self) -> bool {
        !self.lines.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_config() -> OverlayConfig {
        OverlayConfig {
            width: 40,
            height: 20,
            padding_x: 2,
            padding_y: 2,
            scale: 1,
            margin: 0,
        }
    }

    fn lit_pixels(pixels: &[u8]) -> usize {
        pixels
            .chunks_exact(4)
            .filter(|pixel| *pixel == FG_COLOR)
            .count()
    }

    #[test]
    fn rows_are_padded_to_copy_alignment() {
        let pixels = vec![7u8; 10 * 3 * 4];
        let upload = prepare_rgba_upload(10, 3, &pixels).expect("upload");
        assert_eq!(upload.bytes_per_row(), wgpu::COPY_BYTES_PER_ROW_ALIGNMENT);
        assert_eq!(upload.pixels().len(), 256 * 3);
        assert_eq!(upload.pixels()[256], 7);
        assert_eq!(upload.pixels()[40], 0);
    }

    #[test]
    fn aligned_rows_are_borrowed() {
        let pixels = vec![1u8; 64 * 2 * 4];
        let upload = prepare_rgba_upload(64, 2, &pixels).expect("upload");
        assert!(matches!(upload.data, Cow::Borrowed(_)));
    }

    #[test]
    fn short_buffers_are_rejected() {
        assert!(prepare_rgba_upload(4, 4, &[0u8; 10]).is_err());
        assert!(prepare_rgba_upload(0, 4, &[]).is_err());
    }

    #[test]
    fn text_is_clipped_to_the_panel() {
        let config = small_config();
        let mut pixels = vec![0u8; (config.width * config.height * 4) as usize];

        rasterize_lines(&mut pixels, &config, &[]);
        assert_eq!(lit_pixels(&pixels), 0);
        assert!(pixels.chunks_exact(4).all(|pixel| pixel == BG_COLOR));

        rasterize_lines(&mut pixels, &config, &["H".to_string()]);
        let one_glyph = lit_pixels(&pixels);
        assert!(one_glyph > 0);

        // four columns and two rows fit; everything else is dropped
        rasterize_lines(
            &mut pixels,
            &config,
            &["HHHHHHHH".to_string(), "".to_string(), "HHHH".to_string()],
        );
        assert_eq!(lit_pixels(&pixels), one_glyph * 4);
    }

    #[test]
    fn panel_is_anchored_top_left() {
        let config = OverlayConfig {
            width: 100,
            height: 50,
            scale: 2,
            margin: 0,
            ..OverlayConfig::default()
        };
        let quad = vertex_positions(&config, PhysicalSize::new(400, 200));
        assert_eq!(quad[0].position, [-1.0, 1.0]);
        assert_eq!(quad[3].position, [0.0, 0.0]);
    }
}
