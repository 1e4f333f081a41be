//! Per-face working set: texel extents, bounding sphere, and the
//! world-space sample grid.
//!
//! The sample grid covers more area than the face itself, so naively
//! projected points can land inside walls or just behind them, producing
//! false shadows and light bleeds. Every point is therefore probed with a
//! ray from the face midpoint and pushed back out of any obstructing
//! geometry before lighting starts.

use std::sync::Once;

use itertools::Itertools;

use crate::geom::{self, Plane};
use crate::math::{Ext2i32, Vec2f, Vec2i32, Vec3f};
use crate::scene::{Face, FaceId, ModelId, Scene};
use crate::trace::{Contents, TraceFlags, TraceHit, Tracer};

use super::transform::{self, FaceTransform};
use super::{BakeError, Settings};

/// Largest allowed texel span along either axis. Anything bigger means the
/// texture projection does not match the face geometry.
pub const MAX_EXTENT: i32 = 256;

/// How many times a sample may be pushed past obstructing geometry before
/// it is accepted where it stands
const BIAS_RETRIES: usize = 6;

static BAD_MIDPOINT_WARNING: Once = Once::new();
static STUCK_SAMPLE_WARNING: Once = Once::new();

/// Mutable per-face state, owned by a worker context and reused between
/// faces. `reset` keeps the buffers; only a face larger than every previous
/// one reallocates.
pub struct LightSurface {
    /// Working plane, oriented and model-offset corrected
    pub plane: Plane,

    /// World units per texel
    pub scale: f32,

    /// Copied from the face; relaxes backface culling and enables normal
    /// interpolation
    pub is_curved: bool,

    /// Model owning the current face
    pub model_id: ModelId,

    /// Integer texel bounds, mins
    pub tex_mins: Vec2i32,

    /// Integer texel bounds, span per axis
    pub tex_size: Ext2i32,

    /// Exact polygon centroid in texture space
    pub exact_mid: Vec2f,

    /// Bounding sphere center
    pub origin: Vec3f,

    /// Bounding sphere radius
    pub radius: f32,

    /// Oversampled grid width
    pub width: usize,

    /// Oversampled grid height
    pub height: usize,

    /// `width * height`
    pub num_points: usize,

    /// World-space sample positions, hovering one unit above the plane
    pub points: Vec<Vec3f>,

    /// Per-sample surface normals
    pub normals: Vec<Vec3f>,

    /// Per-sample ambient occlusion in [0, 1]
    pub occlusion: Vec<f32>,

    /// Normalized texture S axis, the packed direction basis
    pub s_normal: Vec3f,

    /// Normalized negated texture T axis
    pub t_normal: Vec3f,
}

impl LightSurface {
    pub fn new() -> Self {
        Self {
            plane: Plane {
                normal: Vec3f::zero(),
                distance: 0.0,
            },
            scale: 0.0,
            is_curved: false,
            model_id: ModelId::from_index(0),
            tex_mins: Vec2i32::new(0, 0),
            tex_size: Ext2i32::new(0, 0),
            exact_mid: Vec2f::zero(),
            origin: Vec3f::zero(),
            radius: 0.0,
            width: 0,
            height: 0,
            num_points: 0,
            points: Vec::new(),
            normals: Vec::new(),
            occlusion: Vec::new(),
            s_normal: Vec3f::zero(),
            t_normal: Vec3f::zero(),
        }
    }

    /// Prepare the surface for one face: transform, extents, sample grid,
    /// occlusion storage.
    pub fn setup(
        &mut self,
        scene: &Scene,
        tracer: &dyn Tracer,
        settings: &Settings,
        face_id: FaceId,
    ) -> Result<(), BakeError> {
        let face = scene.face(face_id);
        let model = scene.model(face.model_id);

        self.model_id = face.model_id;
        self.is_curved = face.is_curved;
        self.scale = face.lightmap_scale.unwrap_or(settings.lightmap_scale);

        // Oriented plane, model-local. Extent and sample placement all run
        // in model space; the offset is applied to the finished points and
        // to the plane afterwards.
        let local_plane = if face.is_flipped {
            face.plane.negate_direction()
        } else {
            face.plane
        };

        let transform = FaceTransform::new(&local_plane, &face.projection, face_id.into_index())?;

        self.s_normal = face.projection.s.vec.normalized();
        self.t_normal = (-face.projection.t.vec).normalized();

        self.calc_extents(face, face_id)?;
        self.calc_points(face, model.offset, &local_plane, &transform, tracer, settings);

        // Shift the plane and bounding sphere into world space
        let plane_point = local_plane.normal * local_plane.distance + model.offset;
        self.plane = Plane {
            normal: local_plane.normal,
            distance: local_plane.normal ^ plane_point,
        };
        self.origin += model.offset;

        self.occlusion.clear();
        self.occlusion.resize(self.num_points, 0.0);

        Ok(())
    }

    /// Texel bounding box, exact centroid and bounding sphere from the
    /// boundary vertices
    fn calc_extents(&mut self, face: &Face, face_id: FaceId) -> Result<(), BakeError> {
        let mut mins = [f32::MAX; 2];
        let mut maxs = [f32::MIN; 2];
        let mut world_mins = Vec3f::new(f32::MAX, f32::MAX, f32::MAX);
        let mut world_maxs = Vec3f::new(f32::MIN, f32::MIN, f32::MIN);

        for point in face.points.iter().copied() {
            let tex = transform::world_to_tex(point, &face.projection);

            mins[0] = mins[0].min(tex.x);
            mins[1] = mins[1].min(tex.y);
            maxs[0] = maxs[0].max(tex.x);
            maxs[1] = maxs[1].max(tex.y);

            world_mins.x = world_mins.x.min(point.x);
            world_mins.y = world_mins.y.min(point.y);
            world_mins.z = world_mins.z.min(point.z);
            world_maxs.x = world_maxs.x.max(point.x);
            world_maxs.y = world_maxs.y.max(point.y);
            world_maxs.z = world_maxs.z.max(point.z);
        }

        self.exact_mid = transform::world_to_tex(face_centroid(face), &face.projection);

        let half = (world_maxs - world_mins) * 0.5;
        self.origin = world_mins + half;
        self.radius = half.length();

        for axis in 0..2 {
            let min = (mins[axis] / self.scale).floor() as i32;
            let max = (maxs[axis] / self.scale).ceil() as i32;
            let size = max - min;

            if size >= MAX_EXTENT {
                return Err(BakeError::ExtentOverflow {
                    face: face_id.into_index(),
                    axis: if axis == 0 { 's' } else { 't' },
                    extent: size,
                });
            }

            if axis == 0 {
                self.tex_mins.x = min;
                self.tex_size.w = size;
            } else {
                self.tex_mins.y = min;
                self.tex_size.h = size;
            }
        }

        Ok(())
    }

    /// Build the oversampled world-space sample grid, biasing each point
    /// out of obstructing geometry
    fn calc_points(
        &mut self,
        face: &Face,
        offset: Vec3f,
        local_plane: &Plane,
        transform: &FaceTransform,
        tracer: &dyn Tracer,
        settings: &Settings,
    ) {
        let oversample = settings.oversample.max(1) as usize;

        // The probes are anchored at the face midpoint, which itself must
        // sit in open space first
        let mut midpoint = transform.tex_to_world(self.exact_mid.x, self.exact_mid.y) + offset;
        let mut mid_clear = false;
        for _ in 0..BIAS_RETRIES {
            if tracer.point_contents(midpoint) != Contents::Solid {
                mid_clear = true;
                break;
            }
            midpoint += local_plane.normal;
        }
        if !mid_clear {
            BAD_MIDPOINT_WARNING.call_once(|| {
                log::warn!(
                    "unable to lightmap surface near ({:.1} {:.1} {:.1}): \
                     face midpoint is buried in solid geometry. This usually \
                     means a sub-unit gap between two solid brushes. Further \
                     instances of this warning are suppressed.",
                    midpoint.x,
                    midpoint.y,
                    midpoint.z
                );
            });
        }

        self.width = (self.tex_size.w as usize + 1) * oversample;
        self.height = (self.tex_size.h as usize + 1) * oversample;
        self.num_points = self.width * self.height;

        let start_s = (self.tex_mins.x as f32 - 0.5 + 0.5 / oversample as f32) * self.scale;
        let start_t = (self.tex_mins.y as f32 - 0.5 + 0.5 / oversample as f32) * self.scale;
        let step = self.scale / oversample as f32;

        self.points.clear();
        self.normals.clear();
        self.points.reserve(self.num_points);
        self.normals.reserve(self.num_points);

        for t in 0..self.height {
            for s in 0..self.width {
                let us = start_s + s as f32 * step;
                let ut = start_t + t as f32 * step;

                let mut point = transform.tex_to_world(us, ut) + offset;

                let normal = if self.is_curved {
                    super::phong::point_normal(face, local_plane, point)
                } else {
                    local_plane.normal
                };

                let mut escaped = false;
                for _ in 0..BIAS_RETRIES {
                    match tracer.trace_line(self.model_id, TraceFlags::HIT_SOLID, midpoint, point)
                    {
                        TraceHit::None => {
                            escaped = true;
                            break;
                        }
                        TraceHit::Solid { plane, side, .. } => {
                            // Move the point one unit above the obstructing
                            // surface and probe again
                            let dist = plane.signed_distance(point);
                            let dist = if side { -dist - 1.0 } else { -dist + 1.0 };
                            point += plane.normal * dist;
                        }
                        _ => {
                            // Sky or start-in-solid: nothing useful to push
                            // against, keep the raw point
                            escaped = true;
                            break;
                        }
                    }
                }
                if !escaped {
                    STUCK_SAMPLE_WARNING.call_once(|| {
                        log::warn!(
                            "sample point near ({:.1} {:.1} {:.1}) still \
                             obstructed after {} bias probes, accepting as-is. \
                             Further instances of this warning are suppressed.",
                            point.x,
                            point.y,
                            point.z,
                            BIAS_RETRIES
                        );
                    });
                }

                self.points.push(point);
                self.normals.push(normal);
            }
        }
    }
}

/// Area-weighted centroid of the face's triangle fan
pub fn face_centroid(face: &Face) -> Vec3f {
    let v0 = face.points[0];

    let mut centroid = Vec3f::zero();
    let mut poly_area = 0.0f32;

    for (v1, v2) in face.points[1..].iter().copied().tuple_windows() {
        let area = geom::triangle_area(v0, v1, v2);

        poly_area += area;
        centroid += geom::triangle_centroid(v0, v1, v2) * area;
    }

    centroid / poly_area
}
