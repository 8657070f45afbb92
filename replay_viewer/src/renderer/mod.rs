//! wgpu renderer for the replay window: instanced vehicle boxes, the road
//! surface, lane lines and a bitmap-font HUD.

mod init;
pub mod mesh;
mod overlay;
mod render;
mod shaders;

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use glam::Mat4;
use replay_core::RenderableHandle;
use wgpu::SurfaceError;
use winit::dpi::PhysicalSize;
use winit::window::Window;

use crate::scene_table::SceneTable;
use overlay::TextOverlay;

struct PrimitiveBuffers {
    vertex_buffer: wgpu::Buffer,
    index_buffer: wgpu::Buffer,
    index_count: u32,
}

struct SurfaceBuffer {
    vertices: wgpu::Buffer,
    vertex_count: u32,
}

/// Pipelines and buffers for the 3D part of the frame.
struct SceneResources {
    uniform_buffer: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
    mesh_pipeline: wgpu::RenderPipeline,
    line_pipeline: wgpu::RenderPipeline,
    cube: PrimitiveBuffers,
    instance_buffer: wgpu::Buffer,
    instance_capacity: usize,
    line_buffer: wgpu::Buffer,
    line_capacity: usize,
    surfaces: HashMap<RenderableHandle, SurfaceBuffer>,
    synced_revision: Option<u64>,
    _depth_texture: wgpu::Texture,
    depth_view: wgpu::TextureView,
}

pub struct Renderer {
    window: Arc<Window>,
    surface: wgpu::Surface<'static>,
    device: wgpu::Device,
    queue: wgpu::Queue,
    config: wgpu::SurfaceConfiguration,
    size: PhysicalSize<u32>,
    scene: SceneResources,
    overlay_pipeline: wgpu::RenderPipeline,
    quad_index_buffer: wgpu::Buffer,
    hud: TextOverlay,
}

impl Renderer {
    pub async fn new(window: Arc<Window>) -> Result<Self> {
        init::new(window).await
    }

    pub fn window(&self) -> &Window {
        &self.window
    }

    pub fn size(&self) -> PhysicalSize<u32> {
        self.size
    }

    pub fn aspect(&self) -> f32 {
        self.size.width.max(1) as f32 / self.size.height.max(1) as f32
    }

    pub fn resize(&mut self, new_size: PhysicalSize<u32>) {
        if new_size.width == 0 || new_size.height == 0 {
            return;
        }
        self.size = new_size;
        self.config.width = new_size.width;
        self.config.height = new_size.height;
        self.surface.configure(&self.device, &self.config);
        let (texture, view) = init::create_depth_texture(&self.device, new_size);
        self.scene._depth_texture = texture;
        self.scene.depth_view = view;
        self.hud.resize(&self.device, new_size);
    }

    pub fn render(
        &mut self,
        table: &SceneTable,
        view_projection: Mat4,
        hud_lines: &[String],
    ) -> Result<(), SurfaceError> {
        render::render(self, table, view_projection, hud_lines)
    }
}
