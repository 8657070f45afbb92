//! Vertex layouts shared by the scene pipelines plus the unit cube used for
//! every vehicle box.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3};
use replay_core::Transform;
use replay_core::scene_host::Rgb;

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct MeshVertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
}

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct MeshInstance {
    pub model: [[f32; 4]; 4],
    pub color: [f32; 4],
}

impl MeshInstance {
    pub fn new(model: Mat4, color: Rgb) -> Self {
        Self {
            model: model.to_cols_array_2d(),
            color: [color[0], color[1], color[2], 1.0],
        }
    }

    pub fn from_transform(transform: &Transform, color: Rgb) -> Self {
        let model = Mat4::from_translation(transform.translation())
            * Mat4::from_scale(transform.scale());
        Self::new(model, color)
    }
}

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct LineVertex {
    pub position: [f32; 3],
    pub color: [f32; 3],
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
pub struct MeshUniforms {
    pub view_projection: [[f32; 4]; 4],
}

pub fn view_projection_uniform(matrix: Mat4) -> MeshUniforms {
    MeshUniforms {
        view_projection: matrix.to_cols_array_2d(),
    }
}

pub struct MeshPrimitive {
    pub vertices: Vec<MeshVertex>,
    pub indices: Vec<u16>,
}

/// Unit cube centred on the origin; boxes are sized through their instance
/// transform.
pub fn unit_cube() -> MeshPrimitive {
    #[rustfmt::skip]
    let faces: [([f32; 3], [[f32; 3]; 4]); 6] = [
        ([1.0, 0.0, 0.0], [[0.5, -0.5, -0.5], [0.5, 0.5, -0.5], [0.5, 0.5, 0.5], [0.5, -0.5, 0.5]]),
        ([-1.0, 0.0, 0.0], [[-0.5, -0.5, 0.5], [-0.5, 0.5, 0.5], [-0.5, 0.5, -0.5], [-0.5, -0.5, -0.5]]),
        ([0.0, 1.0, 0.0], [[-0.5, 0.5, -0.5], [-0.5, 0.5, 0.5], [0.5, 0.5, 0.5], [0.5, 0.5, -0.5]]),
        ([0.0, -1.0, 0.0], [[-0.5, -0.5, 0.5], [-0.5, -0.5, -0.5], [0.5, -0.5, -0.5], [0.5, -0.5, 0.5]]),
        ([0.0, 0.0, 1.0], [[-0.5, -0.5, 0.5], [0.5, -0.5, 0.5], [0.5, 0.5, 0.5], [-0.5, 0.5, 0.5]]),
        ([0.0, 0.0, -1.0], [[0.5, -0.5, -0.5], [-0.5, -0.5, -0.5], [-0.5, 0.5, -0.5], [0.5, 0.5, -0.5]]),
    ];

    let mut vertices = Vec::with_capacity(24);
    let mut indices = Vec::with_capacity(36);
    for (face_index, (normal, corners)) in faces.iter().enumerate() {
        let base = (face_index * 4) as u16;
        for corner in corners {
            vertices.push(MeshVertex {
                position: *corner,
                normal: *normal,
            });
        }
        indices.extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
    }
    MeshPrimitive { vertices, indices }
}

/// Expand an indexed ground mesh into a flat triangle list facing up.
pub fn surface_vertices(vertices: &[Vec3], indices: &[u32]) -> Vec<MeshVertex> {
    indices
        .iter()
        .filter_map(|&index| vertices.get(index as usize))
        .map(|vertex| MeshVertex {
            position: vertex.to_array(),
            normal: [0.0, 1.0, 0.0],
        })
        .collect()
}

/// Split a polyline into line-list segment pairs.
pub fn polyline_segments(points: &[[f32; 3]], color: Rgb, out: &mut Vec<LineVertex>) {
    for pair in points.windows(2) {
        out.push(LineVertex {
            position: pair[0],
            color,
        });
        out.push(LineVertex {
            position: pair[1],
            color,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cube_has_six_quads() {
        let cube = unit_cube();
        assert_eq!(cube.vertices.len(), 24);
        assert_eq!(cube.indices.len(), 36);
        assert!(
            cube.vertices
                .iter()
                .all(|v| v.position.iter().all(|c| c.abs() == 0.5))
        );
    }

    #[test]
    fn instance_places_and_scales_the_cube() {
        let transform = Transform::new(Vec3::new(2.0, 0.75, -3.0), Vec3::new(4.0, 1.5, 2.0));
        let instance = MeshInstance::from_transform(&transform, [1.0, 0.5, 0.0]);
        let model = Mat4::from_cols_array_2d(&instance.model);
        let top_corner = model.transform_point3(Vec3::new(0.5, 0.5, 0.5));
        assert_eq!(top_corner, Vec3::new(4.0, 1.5, -2.0));
        assert_eq!(instance.color, [1.0, 0.5, 0.0, 1.0]);
    }

    #[test]
    fn polyline_becomes_segment_pairs() {
        let mut out = Vec::new();
        polyline_segments(
            &[[0.0, 0.1, 0.0], [1.0, 0.1, 0.0], [2.0, 0.1, 1.0]],
            [1.0; 3],
            &mut out,
        );
        assert_eq!(out.len(), 4);
        assert_eq!(out[1].position, out[2].position);
    }

    #[test]
    fn surface_expansion_skips_bad_indices() {
        let vertices = [Vec3::ZERO, Vec3::X, Vec3::Z];
        let expanded = surface_vertices(&vertices, &[0, 1, 2, 0, 7, 1]);
        assert_eq!(expanded.len(), 5);
        assert!(expanded.iter().all(|v| v.normal == [0.0, 1.0, 0.0]));
    }
}
