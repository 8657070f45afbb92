//! CPU-side renderable table the viewer hands to the replay engine.
//!
//! The engine mutates this through `SceneHost`; the renderer reads it once per
//! frame and uploads whatever changed.

use std::collections::BTreeMap;

use glam::{Mat4, Vec3};
use replay_core::scene_host::{Rgb, check_finite};
use replay_core::{RenderableHandle, SceneError, SceneHost, SurfaceMesh, Transform};

use crate::renderer::mesh::{LineVertex, MeshInstance, MeshVertex, polyline_segments, surface_vertices};

enum Shape {
    Box,
    Surface { vertices: Vec<MeshVertex> },
    Polyline { points: Vec<[f32; 3]> },
}

struct Entry {
    shape: Shape,
    visible: bool,
    color: Rgb,
    transform: Transform,
}

/// Visible surface ready for drawing.
pub struct SurfaceDraw<'a> {
    pub handle: RenderableHandle,
    pub vertices: &'a [MeshVertex],
    pub instance: MeshInstance,
}

#[derive(Default)]
pub struct SceneTable {
    next_handle: u64,
    entries: BTreeMap<RenderableHandle, Entry>,
    geometry_revision: u64,
}

impl SceneTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bumped whenever a surface is created or destroyed.
    pub fn geometry_revision(&self) -> u64 {
        self.geometry_revision
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn contains(&self, handle: RenderableHandle) -> bool {
        self.entries.contains_key(&handle)
    }

    pub fn box_instances(&self) -> Vec<MeshInstance> {
        self.entries
            .values()
            .filter(|entry| entry.visible && matches!(entry.shape, Shape::Box))
            .map(|entry| MeshInstance::from_transform(&entry.transform, entry.color))
            .collect()
    }

    pub fn visible_surfaces(&self) -> impl Iterator<Item = SurfaceDraw<'_>> {
        self.entries
            .iter()
            .filter(|(_, entry)| entry.visible)
            .filter_map(|(handle, entry)| match &entry.shape {
                Shape::Surface { vertices } => Some(SurfaceDraw {
                    handle: *handle,
                    vertices,
                    instance: MeshInstance::new(Mat4::IDENTITY, entry.color),
                }),
                _ => None,
            })
    }

    pub fn surface_handles(&self) -> impl Iterator<Item = RenderableHandle> + '_ {
        self.entries
            .iter()
            .filter(|(_, entry)| matches!(entry.shape, Shape::Surface { .. }))
            .map(|(handle, _)| *handle)
    }

    pub fn line_vertices(&self) -> Vec<LineVertex> {
        let mut out = Vec::new();
        for entry in self.entries.values().filter(|entry| entry.visible) {
            if let Shape::Polyline { points } = &entry.shape {
                polyline_segments(points, entry.color, &mut out);
            }
        }
        out
    }

    fn insert(&mut self, shape: Shape, color: Rgb) -> RenderableHandle {
        self.next_handle += 1;
        let handle = RenderableHandle(self.next_handle);
        if matches!(shape, Shape::Surface { .. }) {
            self.geometry_revision += 1;
        }
        self.entries.insert(
            handle,
            Entry {
                shape,
                visible: true,
                color,
                transform: Transform::default(),
            },
        );
        handle
    }
}

impl SceneHost for SceneTable {
    fn create_box(&mut self, color: Rgb) -> RenderableHandle {
        self.insert(Shape::Box, color)
    }

    fn create_surface(&mut self, mesh: SurfaceMesh) -> Result<RenderableHandle, SceneError> {
        mesh.check()?;
        let vertices = surface_vertices(&mesh.vertices, &mesh.indices);
        Ok(self.insert(Shape::Surface { vertices }, mesh.color))
    }

    fn create_polyline(
        &mut self,
        points: &[Vec3],
        color: Rgb,
    ) -> Result<RenderableHandle, SceneError> {
        if points.len() < 2 {
            return Err(SceneError::EmptyGeometry);
        }
        check_finite(points)?;
        let points = points.iter().map(|point| point.to_array()).collect();
        Ok(self.insert(Shape::Polyline { points }, color))
    }

    fn set_transform(&mut self, handle: RenderableHandle, transform: Transform) {
        if let Some(entry) = self.entries.get_mut(&handle) {
            entry.transform = transform;
        }
    }

    fn set_visible(&mut self, handle: RenderableHandle, visible: bool) {
        if let Some(entry) = self.entries.get_mut(&handle) {
            entry.visible = visible;
        }
    }

    fn set_color(&mut self, handle: RenderableHandle, color: Rgb) {
        if let Some(entry) = self.entries.get_mut(&handle) {
            entry.color = color;
        }
    }

    fn destroy(&mut self, handle: RenderableHandle) {
        match self.entries.remove(&handle) {
            Some(Entry {
                shape: Shape::Surface { .. },
                ..
            }) => self.geometry_revision += 1,
            Some(_) => {}
            None => log::warn!("destroy on unknown renderable {handle:?}"),
        }
    }
}
