//! Normal interpolation for curved faces.
//!
//! Faces flagged as curved carry one normal per boundary vertex. For a
//! sample point the face is walked as a triangle fan; the wedge closest to
//! the point wins and its vertex normals are barycentrically blended. No
//! separate tessellation format is needed.

use crate::geom::{self, Plane};
use crate::math::Vec3f;
use crate::scene::Face;

/// Triangle fan wedges smaller than this are slivers and never selected
const MIN_WEDGE_AREA: f32 = 1.0;

/// Interpolated surface normal under `point`, which hovers one unit above
/// the face plane. Falls back to the flat plane normal whenever the face
/// carries no vertex normals or no usable wedge exists.
pub fn point_normal(face: &Face, plane: &Plane, point: Vec3f) -> Vec3f {
    if face.normals.len() != face.points.len() || face.points.len() < 3 {
        return plane.normal;
    }

    let on_plane = plane.project_point(point);

    // Walk the fan and keep the wedge whose clipped projection lands
    // closest to the sample
    let v1 = face.points[0];
    let mut v2 = face.points[1];

    let mut best = 0usize;
    let mut best_cost = f32::INFINITY;

    for j in 2..face.points.len() {
        let v3 = face.points[j];

        let area = geom::triangle_area(v1, v2, v3);

        if let Some(clipped) = geom::clip_point_to_triangle(on_plane, v1, v2, v3) {
            let cost = (clipped - on_plane).length();

            if cost < best_cost && area >= MIN_WEDGE_AREA {
                best = j;
                best_cost = cost;

                if cost == 0.0 {
                    // Already inside this wedge
                    break;
                }
            }
        }

        v2 = v3;
    }

    if best < 2 {
        return plane.normal;
    }

    let (a, b, c) = (face.points[0], face.points[best - 1], face.points[best]);

    if geom::triangle_area(a, b, c) < MIN_WEDGE_AREA {
        return plane.normal;
    }

    let weights = geom::barycentric(on_plane, a, b, c);

    let blended = face.normals[0] * weights[0]
        + face.normals[best - 1] * weights[1]
        + face.normals[best] * weights[2];

    blended
        .checked_normalized()
        .unwrap_or(plane.normal)
}
