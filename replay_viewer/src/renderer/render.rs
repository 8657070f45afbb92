use bytemuck::cast_slice;
use glam::Mat4;
use wgpu::SurfaceError;
use wgpu::util::DeviceExt;

use super::init::create_vertex_buffer;
use super::mesh::{LineVertex, MeshInstance, view_projection_uniform};
use super::{Renderer, SurfaceBuffer};
use crate::scene_table::{SceneTable, SurfaceDraw};

const CLEAR_COLOR: wgpu::Color = wgpu::Color {
    r: 0.055,
    g: 0.06,
    b: 0.075,
    a: 1.0,
};

pub(super) fn render(
    state: &mut Renderer,
    table: &SceneTable,
    view_projection: Mat4,
    hud_lines: &[String],
) -> Result<(), SurfaceError> {
    let frame = state.surface.get_current_texture()?;
    let view = frame
        .texture
        .create_view(&wgpu::TextureViewDescriptor::default());
    let mut encoder = state
        .device
        .create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("replay-viewer-encoder"),
        });

    sync_surface_buffers(state, table);
    draw_scene(state, table, view_projection, &view, &mut encoder);

    state.hud.set_lines(hud_lines);
    state.hud.upload(&state.queue);
    draw_hud(state, &view, &mut encoder);

    state.queue.submit(std::iter::once(encoder.finish()));
    frame.present();
    Ok(())
}

/// Drop GPU buffers of destroyed surfaces and upload any new visible ones.
fn sync_surface_buffers(state: &mut Renderer, table: &SceneTable) {
    let revision = table.geometry_revision();
    if state.scene.synced_revision != Some(revision) {
        let live: Vec<_> = table.surface_handles().collect();
        state
            .scene
            .surfaces
            .retain(|handle, _| live.contains(handle));
        state.scene.synced_revision = Some(revision);
    }

    for draw in table.visible_surfaces() {
        if draw.vertices.is_empty() || state.scene.surfaces.contains_key(&draw.handle) {
            continue;
        }
        let label = format!("surface-{}-vertices", draw.handle.0);
        let vertices = state
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(label.as_str()),
                contents: cast_slice(draw.vertices),
                usage: wgpu::BufferUsages::VERTEX,
            });
        log::debug!(
            "uploaded surface {:?} ({} vertices)",
            draw.handle,
            draw.vertices.len()
        );
        state.scene.surfaces.insert(
            draw.handle,
            SurfaceBuffer {
                vertices,
                vertex_count: draw.vertices.len() as u32,
            },
        );
    }
}

fn draw_scene(
    state: &mut Renderer,
    table: &SceneTable,
    view_projection: Mat4,
    view: &wgpu::TextureView,
    encoder: &mut wgpu::CommandEncoder,
) {
    let surfaces: Vec<SurfaceDraw<'_>> = table.visible_surfaces().collect();
    let mut instances = table.box_instances();
    let box_count = instances.len() as u32;
    instances.extend(surfaces.iter().map(|draw| draw.instance));
    let lines = table.line_vertices();

    state.queue.write_buffer(
        &state.scene.uniform_buffer,
        0,
        cast_slice(&[view_projection_uniform(view_projection)]),
    );
    ensure_instance_capacity(state, instances.len());
    if !instances.is_empty() {
        state
            .queue
            .write_buffer(&state.scene.instance_buffer, 0, cast_slice(&instances));
    }
    ensure_line_capacity(state, lines.len());
    if !lines.is_empty() {
        state
            .queue
            .write_buffer(&state.scene.line_buffer, 0, cast_slice(&lines));
    }

    let scene = &state.scene;
    let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
        label: Some("scene-pass"),
        color_attachments: &[Some(wgpu::RenderPassColorAttachment {
            view,
            resolve_target: None,
            ops: wgpu::Operations {
                load: wgpu::LoadOp::Clear(CLEAR_COLOR),
                store: wgpu::StoreOp::Store,
            },
        })],
        depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
            view: &scene.depth_view,
            depth_ops: Some(wgpu::Operations {
                load: wgpu::LoadOp::Clear(1.0),
                store: wgpu::StoreOp::Store,
            }),
            stencil_ops: None,
        }),
        timestamp_writes: None,
        occlusion_query_set: None,
    });
    pass.set_bind_group(0, &scene.bind_group, &[]);

    pass.set_pipeline(&scene.mesh_pipeline);
    pass.set_vertex_buffer(1, scene.instance_buffer.slice(..));
    if box_count > 0 {
        pass.set_vertex_buffer(0, scene.cube.vertex_buffer.slice(..));
        pass.set_index_buffer(scene.cube.index_buffer.slice(..), wgpu::IndexFormat::Uint16);
        pass.draw_indexed(0..scene.cube.index_count, 0, 0..box_count);
    }
    for (offset, draw) in surfaces.iter().enumerate() {
        let Some(buffer) = scene.surfaces.get(&draw.handle) else {
            continue;
        };
        let instance = box_count + offset as u32;
        pass.set_vertex_buffer(0, buffer.vertices.slice(..));
        pass.draw(0..buffer.vertex_count, instance..instance + 1);
    }

    if !lines.is_empty() {
        pass.set_pipeline(&scene.line_pipeline);
        pass.set_vertex_buffer(0, scene.line_buffer.slice(..));
        pass.draw(0..lines.len() as u32, 0..1);
    }
}

fn draw_hud(state: &Renderer, view: &wgpu::TextureView, encoder: &mut wgpu::CommandEncoder) {
    if !state.hud.is_visible() {
        return;
    }
    let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
        label: Some("hud-pass"),
        color_attachments: &[Some(wgpu::RenderPassColorAttachment {
            view,
            resolve_target: None,
            ops: wgpu::Operations {
                load: wgpu::LoadOp::Load,
                store: wgpu::StoreOp::Store,
            },
        })],
        depth_stencil_attachment: None,
        timestamp_writes: None,
        occlusion_query_set: None,
    });
    pass.set_pipeline(&state.overlay_pipeline);
    pass.set_bind_group(0, state.hud.bind_group(), &[]);
    pass.set_vertex_buffer(0, state.hud.vertex_buffer().slice(..));
    pass.set_index_buffer(state.quad_index_buffer.slice(..), wgpu::IndexFormat::Uint16);
    pass.draw_indexed(0..6, 0, 0..1);
}

fn grown_capacity(current: usize, required: usize) -> Option<usize> {
    if required <= current {
        return None;
    }
    let mut capacity = current.max(1);
    while capacity < required {
        capacity *= 2;
    }
    Some(capacity)
}

fn ensure_instance_capacity(state: &mut Renderer, required: usize) {
    let Some(capacity) = grown_capacity(state.scene.instance_capacity, required) else {
        return;
    };
    let label = format!("mesh-instance-buffer({capacity})");
    state.scene.instance_buffer =
        create_vertex_buffer::<MeshInstance>(&state.device, &label, capacity);
    state.scene.instance_capacity = capacity;
}

fn ensure_line_capacity(state: &mut Renderer, required: usize) {
    let Some(capacity) = grown_capacity(state.scene.line_capacity, required) else {
        return;
    };
    let label = format!("line-vertex-buffer({capacity})");
    state.scene.line_buffer = create_vertex_buffer::<LineVertex>(&state.device, &label, capacity);
    state.scene.line_capacity = capacity;
}

#[cfg(test)]
mod tests {
    use super::grown_capacity;

    #[test]
    fn capacity_doubles_until_it_fits() {
        assert_eq!(grown_capacity(16, 10), None);
        assert_eq!(grown_capacity(16, 16), None);
        assert_eq!(grown_capacity(16, 17), Some(32));
        assert_eq!(grown_capacity(16, 100), Some(128));
        assert_eq!(grown_capacity(0, 3), Some(4));
    }
}
