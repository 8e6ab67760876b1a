//! Classifies a world-space ray against a resolved tile set and an
//! `ImplicitSilhouette` (C11 support).

use crate::geometry::Raytracer;
use crate::support::frame::Frame;
use crate::support::silhouette::ImplicitSilhouette;
use nalgebra::{Point3, Vector3};

/// The outcome of projecting a ray through a tile set.
#[derive(Debug, Clone, Copy)]
pub enum Classification {
    /// The ray hit `frame_index`'s quad at `world_point`, with local
    /// parametric coordinates `uv`, and the silhouette at that direction
    /// says the geometry there is solid.
    Solid {
        frame_index: usize,
        uv: (f64, f64),
        world_point: Point3<f64>,
    },
    /// The ray missed every tile, or hit one the silhouette calls empty.
    Empty,
}

/// Builds a combined `Raytracer` over every `Frame`'s quad so a ray can be
/// projected onto whichever tile it actually crosses, then consults an
/// `ImplicitSilhouette` to decide whether that crossing is solid.
pub struct ProjectingRayClassifier<'a> {
    frames: &'a [Frame],
    raytracer: Raytracer,
    silhouette: &'a ImplicitSilhouette,
}

impl<'a> ProjectingRayClassifier<'a> {
    pub fn build(frames: &'a [Frame], silhouette: &'a ImplicitSilhouette) -> Self {
        let mut vertices = Vec::with_capacity(frames.len() * 4);
        let mut indices = Vec::with_capacity(frames.len() * 2);
        for frame in frames {
            let base = vertices.len() as u32;
            vertices.extend_from_slice(&frame.quad);
            indices.push([base, base + 1, base + 2]);
            indices.push([base, base + 2, base + 3]);
        }
        let raytracer = Raytracer::new(vertices, indices);
        ProjectingRayClassifier {
            frames,
            raytracer,
            silhouette,
        }
    }

    pub fn classify(&self, origin: Point3<f64>, direction: Vector3<f64>) -> Classification {
        let Some((t, triangle_index)) = self.raytracer.find_first_hit(origin, direction, f64::INFINITY) else {
            return Classification::Empty;
        };
        let frame_index = triangle_index / 2;
        let world_point = origin + direction * t;

        if !self.silhouette.is_solid_at_point(direction.normalize()) {
            return Classification::Empty;
        }

        match self.frames[frame_index].world_to_frame(world_point) {
            Some(uv) => Classification::Solid {
                frame_index,
                uv,
                world_point,
            },
            None => Classification::Empty,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tiler::tile::Tile;

    fn frame_facing_viewer(z: f64) -> Frame {
        Frame::from_tile(&Tile::new(
            0,
            [
                Point3::new(-1.0, -1.0, z),
                Point3::new(1.0, -1.0, z),
                Point3::new(1.0, 1.0, z),
                Point3::new(-1.0, 1.0, z),
            ],
        ))
    }

    #[test]
    fn hit_with_solid_silhouette_resolves() {
        let frames = vec![frame_facing_viewer(2.0)];
        let silhouette = ImplicitSilhouette::new(vec![Vector3::z()], vec![true]);
        let classifier = ProjectingRayClassifier::build(&frames, &silhouette);
        let result = classifier.classify(Point3::origin(), Vector3::z());
        assert!(matches!(result, Classification::Solid { .. }));
    }

    #[test]
    fn hit_with_empty_silhouette_is_empty() {
        let frames = vec![frame_facing_viewer(2.0)];
        let silhouette = ImplicitSilhouette::new(vec![Vector3::z()], vec![false]);
        let classifier = ProjectingRayClassifier::build(&frames, &silhouette);
        let result = classifier.classify(Point3::origin(), Vector3::z());
        assert!(matches!(result, Classification::Empty));
    }

    #[test]
    fn miss_is_empty() {
        let frames = vec![frame_facing_viewer(2.0)];
        let silhouette = ImplicitSilhouette::new(vec![Vector3::z()], vec![true]);
        let classifier = ProjectingRayClassifier::build(&frames, &silhouette);
        let result = classifier.classify(Point3::origin(), Vector3::x());
        assert!(matches!(result, Classification::Empty));
    }
}
