//! Face transform solver.
//!
//! Converting a texture coordinate back to a world position requires solving
//! three simultaneous equations: two texture-projection axes plus the face
//! plane. The solver keeps the LU-decomposed form of that 3x3 system around
//! so every sample point of a face reuses one decomposition.

use crate::geom::Plane;
use crate::math::{Vec2f, Vec3f};
use crate::scene::{TexAxis, TexProjection};

use super::BakeError;

/// Pivots below this magnitude mean the texture axes are (nearly) parallel
/// to each other or to the face plane
const ZERO_EPSILON: f32 = 0.001;

/// Row/column-permuted LU factorization of the texture-to-world system
pub struct FaceTransform {
    /// Permuted 3x3 matrix, rows = {s axis, t axis, signed plane normal}
    data: [[f32; 3]; 3],

    /// Row permutations
    row: [usize; 3],

    /// Column permutations
    col: [usize; 3],

    /// Texture-space offsets of the projection axes
    s_offset: f32,
    t_offset: f32,

    /// Signed plane distance, the third right-hand side component
    plane_distance: f32,
}

impl FaceTransform {
    /// Build and decompose the transform for one face.
    ///
    /// `plane` must already be oriented (flipped faces negate their plane
    /// before calling). Degenerate texture axes are a fatal input defect and
    /// are reported against `face_index`.
    pub fn new(
        plane: &Plane,
        projection: &TexProjection,
        face_index: usize,
    ) -> Result<Self, BakeError> {
        let mut transform = Self {
            data: [
                [projection.s.vec.x, projection.s.vec.y, projection.s.vec.z],
                [projection.t.vec.x, projection.t.vec.y, projection.t.vec.z],
                [plane.normal.x, plane.normal.y, plane.normal.z],
            ],
            row: [0, 1, 2],
            col: [0, 1, 2],
            s_offset: projection.s.offset,
            t_offset: projection.t.offset,
            plane_distance: plane.distance,
        };

        if transform.decompose() {
            Ok(transform)
        } else {
            Err(BakeError::DegenerateTransform { face: face_index })
        }
    }

    /// Gauss elimination with full (row + column) pivoting, permutations
    /// tracked separately from the numeric factors
    fn decompose(&mut self) -> bool {
        for i in 0..3 {
            // Select the largest remaining pivot
            let mut max = 0.0f32;
            let mut max_r = i;
            let mut max_c = i;

            for j in i..3 {
                for k in i..3 {
                    if self.data[j][k].abs() > max {
                        max = self.data[j][k].abs();
                        max_r = j;
                        max_c = k;
                    }
                }
            }

            // Parallel axes/plane
            if max < ZERO_EPSILON {
                return false;
            }

            if max_r != i {
                self.data.swap(i, max_r);
                self.row.swap(i, max_r);
            }
            if max_c != i {
                for j in 0..3 {
                    let tmp = self.data[j][i];
                    self.data[j][i] = self.data[j][max_c];
                    self.data[j][max_c] = tmp;
                }
                self.col.swap(i, max_c);
            }

            for j in i + 1..3 {
                self.data[j][i] /= self.data[i][i];
                for k in i + 1..3 {
                    self.data[j][k] -= self.data[j][i] * self.data[i][k];
                }
            }
        }

        true
    }

    /// Solve `A * out = rhs` by forward/back substitution honoring the
    /// stored permutations
    pub fn solve(&self, rhs: Vec3f) -> Vec3f {
        let data = &self.data;
        let r = &self.row;
        let c = &self.col;

        let rhs = [rhs.x, rhs.y, rhs.z];

        // forward-substitution
        let tmp0 = rhs[r[0]];
        let tmp1 = rhs[r[1]] - data[1][0] * tmp0;
        let tmp2 = rhs[r[2]] - data[2][0] * tmp0 - data[2][1] * tmp1;

        // back-substitution
        let mut out = [0.0f32; 3];
        out[c[2]] = tmp2 / data[2][2];
        out[c[1]] = (tmp1 - data[1][2] * out[c[2]]) / data[1][1];
        out[c[0]] = (tmp0 - data[0][1] * out[c[1]] - data[0][2] * out[c[2]]) / data[0][0];

        Vec3f::new(out[0], out[1], out[2])
    }

    /// World position of a texture coordinate, one unit in front of the
    /// face plane
    pub fn tex_to_world(&self, s: f32, t: f32) -> Vec3f {
        self.solve(Vec3f::new(
            s - self.s_offset,
            t - self.t_offset,
            self.plane_distance + 1.0,
        ))
    }
}

/// Project a world position into texture space.
///
/// The three-term dot products accumulate in f64 and narrow to f32 exactly
/// once, at the end. Downstream consumers recompute this projection
/// independently when sizing lightmaps; accumulating at storage precision
/// can round the two computations onto different texels.
pub fn world_to_tex(world: Vec3f, projection: &TexProjection) -> Vec2f {
    fn project(world: Vec3f, axis: &TexAxis) -> f32 {
        (world.x as f64 * axis.vec.x as f64
            + world.y as f64 * axis.vec.y as f64
            + world.z as f64 * axis.vec.z as f64
            + axis.offset as f64) as f32
    }

    Vec2f::new(project(world, &projection.s), project(world, &projection.t))
}
