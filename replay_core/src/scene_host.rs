//! The capability the replay engine draws through.
//!
//! The engine never touches a scene graph directly. It asks a `SceneHost` to
//! create renderables, then updates them by handle. The viewer implements this
//! on top of wgpu; `RecordingSceneHost` implements it in memory for tests and
//! headless runs.

use std::collections::BTreeMap;

use glam::Vec3;
use serde::Serialize;
use thiserror::Error;

/// Opaque reference to a renderable owned by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct RenderableHandle(pub u64);

pub type Rgb = [f32; 3];

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Transform {
    pub translation: [f32; 3],
    pub scale: [f32; 3],
}

impl Transform {
    pub fn new(translation: Vec3, scale: Vec3) -> Self {
        Self {
            translation: translation.to_array(),
            scale: scale.to_array(),
        }
    }

    pub fn translation(&self) -> Vec3 {
        Vec3::from_array(self.translation)
    }

    pub fn scale(&self) -> Vec3 {
        Vec3::from_array(self.scale)
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::new(Vec3::ZERO, Vec3::ONE)
    }
}

/// Flat triangle mesh lying on the ground plane, already in world space.
#[derive(Debug, Clone, PartialEq)]
pub struct SurfaceMesh {
    pub vertices: Vec<Vec3>,
    pub indices: Vec<u32>,
    pub color: Rgb,
    pub double_sided: bool,
}

impl SurfaceMesh {
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// Structural checks every host applies before accepting a mesh.
    pub fn check(&self) -> Result<(), SceneError> {
        if self.vertices.is_empty() || self.indices.len() < 3 {
            return Err(SceneError::EmptyGeometry);
        }
        if self.indices.len() % 3 != 0 {
            return Err(SceneError::Rejected(format!(
                "index count {} is not a multiple of 3",
                self.indices.len()
            )));
        }
        if let Some(bad) = self.indices.iter().find(|&&i| i as usize >= self.vertices.len()) {
            return Err(SceneError::Rejected(format!(
                "index {bad} out of range for {} vertices",
                self.vertices.len()
            )));
        }
        check_finite(&self.vertices)
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum SceneError {
    #[error("renderable has no geometry")]
    EmptyGeometry,
    #[error("vertex {index} is not finite")]
    NonFiniteVertex { index: usize },
    #[error("host rejected renderable: {0}")]
    Rejected(String),
}

pub fn check_finite(points: &[Vec3]) -> Result<(), SceneError> {
    match points.iter().position(|point| !point.is_finite()) {
        Some(index) => Err(SceneError::NonFiniteVertex { index }),
        None => Ok(()),
    }
}

pub trait SceneHost {
    /// Unit box, positioned and sized later through `set_transform`.
    fn create_box(&mut self, color: Rgb) -> RenderableHandle;
    fn create_surface(&mut self, mesh: SurfaceMesh) -> Result<RenderableHandle, SceneError>;
    /// Connected line through `points` in world space.
    fn create_polyline(
        &mut self,
        points: &[Vec3],
        color: Rgb,
    ) -> Result<RenderableHandle, SceneError>;
    fn set_transform(&mut self, handle: RenderableHandle, transform: Transform);
    fn set_visible(&mut self, handle: RenderableHandle, visible: bool);
    fn set_color(&mut self, handle: RenderableHandle, color: Rgb);
    /// Hand the renderable back to the host for teardown. The handle is dead
    /// afterwards.
    fn destroy(&mut self, handle: RenderableHandle);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RenderableKind {
    Box,
    Surface,
    Polyline,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum SceneCommand {
    CreateBox {
        handle: RenderableHandle,
    },
    CreateSurface {
        handle: RenderableHandle,
        triangles: usize,
    },
    CreatePolyline {
        handle: RenderableHandle,
        points: usize,
    },
    SetTransform {
        handle: RenderableHandle,
        transform: Transform,
    },
    SetVisible {
        handle: RenderableHandle,
        visible: bool,
    },
    SetColor {
        handle: RenderableHandle,
        color: Rgb,
    },
    Destroy {
        handle: RenderableHandle,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecordedRenderable {
    pub kind: RenderableKind,
    pub visible: bool,
    pub color: Rgb,
    pub transform: Transform,
    pub vertex_count: usize,
}

/// In-memory host that keeps the command log and the live renderable table.
#[derive(Debug, Default)]
pub struct RecordingSceneHost {
    next_handle: u64,
    commands: Vec<SceneCommand>,
    live: BTreeMap<RenderableHandle, RecordedRenderable>,
    reject_surfaces: usize,
    reject_polylines: usize,
}

impl RecordingSceneHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn commands(&self) -> &[SceneCommand] {
        &self.commands
    }

    pub fn clear_commands(&mut self) {
        self.commands.clear();
    }

    pub fn get(&self, handle: RenderableHandle) -> Option<&RecordedRenderable> {
        self.live.get(&handle)
    }

    pub fn is_live(&self, handle: RenderableHandle) -> bool {
        self.live.contains_key(&handle)
    }

    pub fn live_count(&self, kind: RenderableKind) -> usize {
        self.live.values().filter(|r| r.kind == kind).count()
    }

    pub fn visible_count(&self, kind: RenderableKind) -> usize {
        self.live
            .values()
            .filter(|r| r.kind == kind && r.visible)
            .count()
    }

    /// Count of create commands for `kind` over the whole session.
    pub fn created_count(&self, kind: RenderableKind) -> usize {
        self.commands
            .iter()
            .filter(|command| {
                matches!(
                    (command, kind),
                    (SceneCommand::CreateBox { .. }, RenderableKind::Box)
                        | (SceneCommand::CreateSurface { .. }, RenderableKind::Surface)
                        | (SceneCommand::CreatePolyline { .. }, RenderableKind::Polyline)
                )
            })
            .count()
    }

    /// Make the next `count` surface creations fail.
    pub fn reject_next_surfaces(&mut self, count: usize) {
        self.reject_surfaces = count;
    }

    /// Make the next `count` polyline creations fail.
    pub fn reject_next_polylines(&mut self, count: usize) {
        self.reject_polylines = count;
    }

    fn allocate(
        &mut self,
        kind: RenderableKind,
        color: Rgb,
        vertex_count: usize,
    ) -> RenderableHandle {
        self.next_handle += 1;
        let handle = RenderableHandle(self.next_handle);
        self.live.insert(
            handle,
            RecordedRenderable {
                kind,
                visible: true,
                color,
                transform: Transform::default(),
                vertex_count,
            },
        );
        handle
    }
}

impl SceneHost for RecordingSceneHost {
    fn create_box(&mut self, color: Rgb) -> RenderableHandle {
        let handle = self.allocate(RenderableKind::Box, color, 8);
        self.commands.push(SceneCommand::CreateBox { handle });
        handle
    }

    fn create_surface(&mut self, mesh: SurfaceMesh) -> Result<RenderableHandle, SceneError> {
        mesh.check()?;
        if self.reject_surfaces > 0 {
            self.reject_surfaces -= 1;
            return Err(SceneError::Rejected("surface upload refused".to_string()));
        }
        let handle = self.allocate(RenderableKind::Surface, mesh.color, mesh.vertices.len());
        self.commands.push(SceneCommand::CreateSurface {
            handle,
            triangles: mesh.triangle_count(),
        });
        Ok(handle)
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
        if self.reject_polylines > 0 {
            self.reject_polylines -= 1;
            return Err(SceneError::Rejected("line upload refused".to_string()));
        }
        let handle = self.allocate(RenderableKind::Polyline, color, points.len());
        self.commands.push(SceneCommand::CreatePolyline {
            handle,
            points: points.len(),
        });
        Ok(handle)
    }

    fn set_transform(&mut self, handle: RenderableHandle, transform: Transform) {
        if let Some(entry) = self.live.get_mut(&handle) {
            entry.transform = transform;
        }
        self.commands
            .push(SceneCommand::SetTransform { handle, transform });
    }

    fn set_visible(&mut self, handle: RenderableHandle, visible: bool) {
        if let Some(entry) = self.live.get_mut(&handle) {
            entry.visible = visible;
        }
        self.commands.push(SceneCommand::SetVisible { handle, visible });
    }

    fn set_color(&mut self, handle: RenderableHandle, color: Rgb) {
        if let Some(entry) = self.live.get_mut(&handle) {
            entry.color = color;
        }
        self.commands.push(SceneCommand::SetColor { handle, color });
    }

    fn destroy(&mut self, handle: RenderableHandle) {
        self.live.remove(&handle);
        self.commands.push(SceneCommand::Destroy { handle });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn triangle() -> SurfaceMesh {
        SurfaceMesh {
            vertices: vec![Vec3::ZERO, Vec3::X, Vec3::Z],
            indices: vec![0, 1, 2],
            color: [0.3, 0.3, 0.3],
            double_sided: true,
        }
    }

    #[test]
    fn recording_host_tracks_commands_and_state() {
        let mut host = RecordingSceneHost::new();
        let boxed = host.create_box([1.0, 0.0, 0.0]);
        host.set_visible(boxed, false);
        host.set_color(boxed, [0.0, 1.0, 0.0]);
        let surface = host.create_surface(triangle()).expect("surface accepted");
        host.destroy(surface);

        assert_eq!(
            host.commands(),
            &[
                SceneCommand::CreateBox { handle: boxed },
                SceneCommand::SetVisible {
                    handle: boxed,
                    visible: false
                },
                SceneCommand::SetColor {
                    handle: boxed,
                    color: [0.0, 1.0, 0.0]
                },
                SceneCommand::CreateSurface {
                    handle: surface,
                    triangles: 1
                },
                SceneCommand::Destroy { handle: surface },
            ]
        );
        let recorded = host.get(boxed).expect("box is live");
        assert!(!recorded.visible);
        assert_eq!(recorded.color, [0.0, 1.0, 0.0]);
        assert!(!host.is_live(surface));
        assert_eq!(host.created_count(RenderableKind::Surface), 1);
    }

    #[test]
    fn meshes_are_checked_before_acceptance() {
        let mut host = RecordingSceneHost::new();
        let mut mesh = triangle();
        mesh.vertices[1] = Vec3::new(f32::NAN, 0.0, 0.0);
        assert_eq!(
            host.create_surface(mesh),
            Err(SceneError::NonFiniteVertex { index: 1 })
        );

        let mut mesh = triangle();
        mesh.indices = vec![0, 1, 5];
        assert!(matches!(
            host.create_surface(mesh),
            Err(SceneError::Rejected(_))
        ));

        assert_eq!(
            host.create_polyline(&[Vec3::ZERO], [1.0; 3]),
            Err(SceneError::EmptyGeometry)
        );
        assert!(host.commands().is_empty());
    }

    #[test]
    fn rejection_budget_is_consumed() {
        let mut host = RecordingSceneHost::new();
        host.reject_next_polylines(1);
        let line = [Vec3::ZERO, Vec3::X];
        assert!(host.create_polyline(&line, [1.0; 3]).is_err());
        assert!(host.create_polyline(&line, [1.0; 3]).is_ok());
        assert_eq!(host.live_count(RenderableKind::Polyline), 1);
    }
}
