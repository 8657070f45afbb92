//! Ear-clipping triangulation of the drivable-area outline.

use geo::{Area, Coord, LineString, Polygon, TriangulateEarcut};
use glam::Vec3;
use thiserror::Error;

use crate::coords::WorldPoint;
use crate::scene_host::{Rgb, SurfaceMesh};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum GeometryError {
    #[error("polygon needs at least 3 points (got {0})")]
    TooFewPoints(usize),
    #[error("point {index} is not finite")]
    NonFinite { index: usize },
    #[error("polygon encloses no area")]
    Degenerate,
    #[error("triangulation produced no triangles")]
    NoTriangles,
}

/// Triangulate a ground outline into a flat, double-sided mesh at `elevation`.
/// Vertices are emitted three per triangle; the outline may wind either way.
pub fn triangulate_outline(
    outline: &[WorldPoint],
    elevation: f32,
    color: Rgb,
) -> Result<SurfaceMesh, GeometryError> {
    if outline.len() < 3 {
        return Err(GeometryError::TooFewPoints(outline.len()));
    }
    if let Some(index) = outline
        .iter()
        .position(|point| !point.x.is_finite() || !point.z.is_finite())
    {
        return Err(GeometryError::NonFinite { index });
    }

    let ring: Vec<Coord<f64>> = outline
        .iter()
        .map(|point| Coord {
            x: f64::from(point.x),
            y: f64::from(point.z),
        })
        .collect();
    let polygon = Polygon::new(LineString::from(ring), Vec::new());
    if polygon.unsigned_area() <= f64::EPSILON {
        return Err(GeometryError::Degenerate);
    }

    let triangles = polygon.earcut_triangles();
    if triangles.is_empty() {
        return Err(GeometryError::NoTriangles);
    }

    let mut vertices = Vec::with_capacity(triangles.len() * 3);
    for triangle in &triangles {
        for corner in triangle.to_array() {
            vertices.push(Vec3::new(corner.x as f32, elevation, corner.y as f32));
        }
    }
    let indices = (0..vertices.len() as u32).collect();

    Ok(SurfaceMesh {
        vertices,
        indices,
        color,
        double_sided: true,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outline(points: &[(f32, f32)]) -> Vec<WorldPoint> {
        points.iter().map(|&(x, z)| WorldPoint { x, z }).collect()
    }

    #[test]
    fn square_becomes_two_triangles() {
        let square = outline(&[(0.0, 0.0), (10.0, 0.0), (10.0, 10.0), (0.0, 10.0)]);
        let mesh = triangulate_outline(&square, 0.0, [0.3; 3]).expect("square triangulates");
        assert_eq!(mesh.triangle_count(), 2);
        assert!(mesh.double_sided);
        assert!(mesh.vertices.iter().all(|v| v.y == 0.0));
        assert_eq!(mesh.check(), Ok(()));
    }

    #[test]
    fn concave_outline_triangulates() {
        let notch = outline(&[
            (0.0, 0.0),
            (10.0, 0.0),
            (10.0, 10.0),
            (5.0, 4.0),
            (0.0, 10.0),
        ]);
        let mesh = triangulate_outline(&notch, 0.01, [0.3; 3]).expect("notch triangulates");
        assert_eq!(mesh.triangle_count(), 3);
    }

    #[test]
    fn rejects_unusable_outlines() {
        assert_eq!(
            triangulate_outline(&outline(&[(0.0, 0.0), (1.0, 1.0)]), 0.0, [0.0; 3]),
            Err(GeometryError::TooFewPoints(2))
        );
        assert_eq!(
            triangulate_outline(
                &outline(&[(0.0, 0.0), (1.0, 1.0), (2.0, 2.0)]),
                0.0,
                [0.0; 3]
            ),
            Err(GeometryError::Degenerate)
        );
        assert_eq!(
            triangulate_outline(
                &outline(&[(0.0, 0.0), (f32::NAN, 1.0), (2.0, 0.0)]),
                0.0,
                [0.0; 3]
            ),
            Err(GeometryError::NonFinite { index: 1 })
        );
    }
}
