//! Per-face static light baking.
//!
//! One face runs the full pipeline start to finish: transform solve, sample
//! grid, optional dirt, light accumulation, softening, packing. Faces are
//! independent of each other; `bake_all` spreads them across rayon workers,
//! each worker reusing one [`WorkerContext`] so per-face heap churn stays
//! bounded no matter how many faces a map has.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::math::Vec3f;
use crate::rand::Xorshift32;
use crate::scene::{FaceId, Falloff, LightLevel, Scene};
use crate::trace::Tracer;

/// Face transform solver
pub mod transform;

/// Extents and sample-grid builder
pub mod surface;

/// Curved-face normal interpolation
pub mod phong;

/// Ambient-occlusion estimator
pub mod dirt;

/// Per-light accumulation passes
pub mod entity;

/// Style slots and softening
pub mod lightmap;

/// Packing and output sink
pub mod output;

pub use dirt::DirtTable;
pub use lightmap::{LightSample, Lightmaps, MAX_STYLES, STYLE_UNUSED};
pub use output::{FaceLighting, LightmapData, LightmapSink, Reservation};
pub use surface::LightSurface;

/// Fatal baking errors. Both indicate malformed input geometry or texture
/// data; continuing past either would bake garbage, so the whole
/// compilation aborts.
#[derive(Debug, Error)]
pub enum BakeError {
    /// The texture axes and face plane do not span 3-space
    #[error("bad texture axes on face {face}: projection matrix is degenerate")]
    DegenerateTransform {
        /// Offending face index
        face: usize,
    },

    /// A face's lightmap would exceed the hard texel limit
    #[error(
        "bad surface extents on face {face}: {axis} extent {extent} (max {max})",
        max = surface::MAX_EXTENT
    )]
    ExtentOverflow {
        /// Offending face index
        face: usize,

        /// Which texture axis overflowed
        axis: char,

        /// Texel span that was computed
        extent: i32,
    },
}

/// Dirt probe distribution
#[derive(Debug, Copy, Clone, Eq, PartialEq, Default, Serialize, Deserialize)]
pub enum DirtMode {
    /// Fixed precomputed probe fan
    #[default]
    Ordered,

    /// Per-probe randomized directions from a seeded generator
    Random,
}

/// Debug visualizations that replace the normal lighting output
#[derive(Debug, Copy, Clone, Eq, PartialEq, Default, Serialize, Deserialize)]
pub enum DebugMode {
    /// Normal lighting
    #[default]
    None,

    /// Write occlusion as grayscale
    Dirt,

    /// Write sample normals as colors
    Normals,
}

/// Ambient-occlusion knobs
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DirtSettings {
    /// Master switch
    pub enable: bool,

    /// Whether lights without an explicit dirt setting participate
    pub default_on: bool,

    /// Probe distribution
    pub mode: DirtMode,

    /// Probe depth in world units
    pub depth: f32,

    /// Occlusion exponent
    pub gain: f32,

    /// Occlusion multiplier
    pub scale: f32,

    /// Hemisphere cone half-angle in degrees
    pub angle: f32,

    /// Seed for the randomized mode, mixed with the face index so bakes
    /// stay reproducible
    pub seed: u32,
}

impl Default for DirtSettings {
    fn default() -> Self {
        Self {
            enable: false,
            default_on: true,
            mode: DirtMode::Ordered,
            depth: 128.0,
            gain: 1.0,
            scale: 1.0,
            angle: 88.0,
            seed: 1,
        }
    }
}

/// Baker configuration, immutable for the whole bake
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// World units per lightmap texel, unless a face overrides it
    pub lightmap_scale: f32,

    /// Supersampling factor of the sample grid
    pub oversample: u32,

    /// Exposure scale applied while packing
    pub range_scale: f32,

    /// Output gamma
    pub gamma: f32,

    /// Global multiplier on falloff distances
    pub dist_scale: f32,

    /// Lights whose best-case contribution stays at or below this are
    /// culled per face
    pub fade_gate: f32,

    /// Softening filter radius, 0 disables
    pub soft_samples: u32,

    /// Global minimum-light floor intensity
    pub min_light: f32,

    /// Minimum-light floor color
    pub min_light_color: [f32; 3],

    /// Add the floor on top instead of clamping up to it
    pub add_min_light: bool,

    /// Whether the floor participates in dirt
    pub min_light_dirt: bool,

    /// Ambient occlusion
    pub dirt: DirtSettings,

    /// Debug visualization
    pub debug: DebugMode,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            lightmap_scale: 16.0,
            oversample: 1,
            range_scale: 0.5,
            gamma: 1.0,
            dist_scale: 1.0,
            fade_gate: 0.001,
            soft_samples: 0,
            min_light: 0.0,
            min_light_color: [255.0, 255.0, 255.0],
            add_min_light: false,
            min_light_dirt: false,
            dirt: DirtSettings::default(),
            debug: DebugMode::None,
        }
    }
}

/// Reusable per-worker state. Created once per worker thread, reset (not
/// reallocated) between faces; buffers only grow when a face needs more
/// samples than any previous one.
pub struct WorkerContext {
    /// Per-face working set
    surf: LightSurface,

    /// Style slot array
    maps: Lightmaps,

    /// Randomized-dirt generator, reseeded per face
    rng: Xorshift32,
}

impl WorkerContext {
    pub fn new() -> Self {
        Self {
            surf: LightSurface::new(),
            maps: Lightmaps::new(),
            rng: Xorshift32::new(),
        }
    }
}

impl Default for WorkerContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Bake one face start to finish and hand the packed result to the sink.
///
/// The lighting procedure: cast all positive lights, fix minlight levels,
/// then cast all negative lights, then clamp anything that went negative.
/// Subtractive lights must see the already-raised floor, so the order is a
/// requirement, not a convenience.
pub fn light_face(
    scene: &Scene,
    tracer: &dyn Tracer,
    table: &DirtTable,
    settings: &Settings,
    sink: &dyn LightmapSink,
    ctx: &mut WorkerContext,
    face_id: FaceId,
) -> Result<FaceLighting, BakeError> {
    let WorkerContext { surf, maps, rng } = ctx;

    surf.setup(scene, tracer, settings, face_id)?;
    maps.reset();

    // Ambient occlusion first; the accumulation passes only read it
    if settings.dirt.enable {
        *rng = Xorshift32::with_seed(settings.dirt.seed ^ face_id.into_index() as u32);

        for i in 0..surf.num_points {
            let point = surf.points[i];
            let normal = surf.plane.normal;

            surf.occlusion[i] = dirt::dirt_for_sample(
                scene,
                tracer,
                table,
                settings,
                surf.model_id,
                rng,
                point,
                normal,
            );
        }
    }

    // Positive lights
    for light in &scene.lights {
        if light.formula == Falloff::LocalMin {
            continue;
        }
        if light.level.light > 0.0 {
            entity::light_entity(scene, tracer, settings, light, surf, maps);
        }
    }
    for sun in &scene.suns {
        if sun.level.light > 0.0 {
            entity::light_sky(scene, tracer, settings, sun, surf, maps);
        }
    }

    // Minlight: the greater of the global and the per-model floor
    let global = LightLevel {
        light: settings.min_light,
        color: Vec3f::new(
            settings.min_light_color[0],
            settings.min_light_color[1],
            settings.min_light_color[2],
        ),
    };
    let floor = match scene.model(surf.model_id).min_light {
        Some(model_floor) if model_floor.light > global.light => model_floor,
        _ => global,
    };
    entity::light_min(scene, tracer, settings, &floor, surf, maps);

    // Negative lights
    for light in &scene.lights {
        if light.formula == Falloff::LocalMin {
            continue;
        }
        if light.level.light < 0.0 {
            entity::light_entity(scene, tracer, settings, light, surf, maps);
        }
    }
    for sun in &scene.suns {
        if sun.level.light < 0.0 {
            entity::light_sky(scene, tracer, settings, sun, surf, maps);
        }
    }

    match settings.debug {
        DebugMode::Dirt => entity::dirt_debug(scene, settings, surf, maps),
        DebugMode::Normals => entity::phong_debug(surf, maps),
        DebugMode::None => {}
    }

    // Negative values are an expected transient of mixing positive and
    // negative lights, not an error
    maps.clamp_negative(surf.num_points);

    if settings.soft_samples > 0 {
        let filled: Vec<usize> = maps.filled().collect();
        for slot in filled {
            maps.soften(slot, surf.width, surf.height, settings.soft_samples as usize);
        }
    }

    Ok(output::write_lightmaps(surf, maps, settings, sink))
}

/// Bake every face of the scene in parallel. The result vector is indexed
/// by face; a fatal error on any face aborts the whole bake.
pub fn bake_all(
    scene: &Scene,
    tracer: &dyn Tracer,
    settings: &Settings,
    sink: &dyn LightmapSink,
) -> Result<Vec<FaceLighting>, BakeError> {
    let table = DirtTable::new(settings);

    log::debug!("baking {} faces", scene.faces.len());

    (0..scene.faces.len())
        .into_par_iter()
        .map_init(WorkerContext::new, |ctx, index| {
            light_face(
                scene,
                tracer,
                &table,
                settings,
                sink,
                ctx,
                FaceId::from_index(index),
            )
        })
        .collect()
}

#[cfg(test)]
mod tests;
