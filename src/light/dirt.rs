//! Hemispherical ambient-occlusion ("dirt") estimator.
//!
//! A fixed fan of rays samples the hemisphere above each grid point; every
//! obstruction within the probe depth darkens the sample proportionally to
//! how close it is. The raw occlusion is stored per sample and converted to
//! a per-light scale factor during accumulation.

use crate::math::Vec3f;
use crate::rand::Xorshift32;
use crate::scene::{DirtOption, LightEntity, ModelId, ModelInfo, Scene};
use crate::trace::{TraceFlags, TraceHit, Tracer};

use super::{DirtMode, Settings};

/// Azimuthal probe count
pub const ANGLE_STEPS: usize = 16;

/// Probes per azimuth between the normal and the cone boundary
pub const ELEVATION_STEPS: usize = 3;

/// Total probe count, not counting the straight-up ray
pub const NUM_VECTORS: usize = ANGLE_STEPS * ELEVATION_STEPS;

/// Precomputed tangent-space probe directions, built once per bake and
/// shared read-only by every worker
pub struct DirtTable {
    /// Unit directions in (right, up, normal) tangent space
    vectors: Vec<Vec3f>,

    /// Clamped cone half-angle in degrees, reused by the randomized mode
    angle: f32,
}

impl DirtTable {
    pub fn new(settings: &Settings) -> Self {
        let angle = settings.dirt.angle.clamp(1.0, 90.0);

        let angle_step = (360.0f32 / ANGLE_STEPS as f32).to_radians();
        let elevation_step = (angle / ELEVATION_STEPS as f32).to_radians();

        let mut vectors = Vec::with_capacity(NUM_VECTORS);

        for i in 0..ANGLE_STEPS {
            let azimuth = i as f32 * angle_step;

            for j in 0..ELEVATION_STEPS {
                let elevation = elevation_step * (j as f32 + 0.5);

                vectors.push(Vec3f::new(
                    elevation.sin() * azimuth.cos(),
                    elevation.sin() * azimuth.sin(),
                    elevation.cos(),
                ));
            }
        }

        Self { vectors, angle }
    }
}

/// Trace one dirt probe against the face's own model, then every registered
/// shadow caster. Returns the hit position; a ray that starts inside solid
/// hits at its own origin.
fn dirt_trace(
    scene: &Scene,
    tracer: &dyn Tracer,
    self_model: ModelId,
    start: Vec3f,
    stop: Vec3f,
) -> Option<Vec3f> {
    let flags = TraceFlags::HIT_SOLID | TraceFlags::HIT_SKY;

    match tracer.trace_line(self_model, flags, start, stop) {
        TraceHit::StartSolid => return Some(start),
        TraceHit::Solid { point, .. } => return Some(point),
        _ => {}
    }

    for model in scene.shadow_casters.iter().copied() {
        if model == self_model {
            continue;
        }

        match tracer.trace_line(model, flags, start, stop) {
            TraceHit::StartSolid => return Some(start),
            TraceHit::Solid { point, .. } => return Some(point),
            _ => {}
        }
    }

    None
}

/// Raw occlusion of one sample point in [0, 1]
pub fn dirt_for_sample(
    scene: &Scene,
    tracer: &dyn Tracer,
    table: &DirtTable,
    settings: &Settings,
    self_model: ModelId,
    rng: &mut Xorshift32,
    origin: Vec3f,
    normal: Vec3f,
) -> f32 {
    let depth = settings.dirt.depth;
    let oo_depth = 1.0 / depth;
    let mut gather = 0.0f32;

    // Tangent frame; axis-aligned normals would make the cross product
    // degenerate, so world up/down get fixed frames
    let (right, up) = if normal.x == 0.0 && normal.y == 0.0 {
        if normal.z >= 0.0 {
            (Vec3f::new(1.0, 0.0, 0.0), Vec3f::new(0.0, 1.0, 0.0))
        } else {
            (Vec3f::new(-1.0, 0.0, 0.0), Vec3f::new(0.0, 1.0, 0.0))
        }
    } else {
        let world_up = Vec3f::new(0.0, 0.0, 1.0);
        let right = (normal % world_up).normalized();
        let up = (right % normal).normalized();

        (right, up)
    };

    let probe = |direction: Vec3f, gather: &mut f32| {
        let end = origin + direction * depth;

        if let Some(hit) = dirt_trace(scene, tracer, self_model, origin, end) {
            *gather += 1.0 - oo_depth * (hit - origin).length();
        }
    };

    match settings.dirt.mode {
        DirtMode::Ordered => {
            for v in table.vectors.iter().copied() {
                let direction = right * v.x + up * v.y + normal * v.z;

                probe(direction, &mut gather);
            }
        }
        DirtMode::Random => {
            for _ in 0..table.vectors.len() {
                let azimuth = rng.next_unit_f32() * 360.0f32.to_radians();
                let elevation = rng.next_unit_f32() * table.angle.to_radians();

                let v = Vec3f::new(
                    azimuth.cos() * elevation.sin(),
                    azimuth.sin() * elevation.sin(),
                    elevation.cos(),
                );

                let direction = right * v.x + up * v.y + normal * v.z;

                probe(direction, &mut gather);
            }
        }
    }

    // One probe straight along the normal
    probe(normal, &mut gather);

    (gather / (table.vectors.len() + 1) as f32).clamp(0.0, 1.0)
}

/// Scale factor a light contribution gets multiplied by.
///
/// Raw occlusion passes through a gain exponent and a linear scale, each
/// clamped to one, and flips into a multiplier: 1 = unoccluded, 0 = fully
/// dirty. Per-light and per-model switches can opt out entirely.
pub fn scale_factor(
    occlusion: f32,
    entity: Option<&LightEntity>,
    model: Option<&ModelInfo>,
    settings: &Settings,
) -> f32 {
    if !settings.dirt.enable {
        return 1.0;
    }
    if model.is_some_and(|m| m.no_dirt) {
        return 1.0;
    }

    // Lights inherit the global default; callers without an entity (sun,
    // minlight) always want dirt
    let use_dirt = match entity {
        Some(entity) => match entity.dirt {
            DirtOption::On => true,
            DirtOption::Off => false,
            DirtOption::Inherit => settings.dirt.default_on,
        },
        None => true,
    };

    if !use_dirt {
        return 1.0;
    }

    let gain = entity
        .and_then(|e| e.dirt_gain)
        .unwrap_or(settings.dirt.gain);
    let scale = entity
        .and_then(|e| e.dirt_scale)
        .unwrap_or(settings.dirt.scale);

    if occlusion <= 0.0 {
        return 1.0;
    }

    let mut dirt = occlusion.powf(gain).min(1.0);
    dirt = (dirt * scale).min(1.0);

    1.0 - dirt
}
