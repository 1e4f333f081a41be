//! Static lightmap baking for compiled W* maps.
//!
//! This crate is the lighting stage of the map pipeline: it takes a
//! compiled level (WBSP faces, models, light entities), a ray-cast oracle
//! supplied by the compiler, and produces the packed per-face lightmaps the
//! runtime blends at display time.

#![forbid(unsafe_code)]

// Resources:
// WMAP -> WBSP -> [lighting] -> WDAT
//
// WMAP - In-development map format, used during map editing
// WBSP - Intermediate format, used to exchange data between map compilation
//        stages (visible/physical BSP building, optimization, lightmapping)
// WDAT - Data format, contains 'final' project with location BSPs
//
// Lighting consumes WBSP-level data and fills the lightmap lumps; it never
// parses map files itself and never renders anything.

/// Basic math utility
pub mod math;

/// Random number generator
pub mod rand;

/// Basic geometry
pub mod geom;

/// Read-only scene data model
pub mod scene;

/// Visibility-oracle contract
pub mod trace;

/// The per-face baking engine
pub mod light;

pub use light::{
    BakeError, DebugMode, DirtMode, DirtSettings, FaceLighting, LightmapData, LightmapSink,
    Settings, WorkerContext, bake_all, light_face,
};
pub use scene::{Face, FaceId, LightEntity, ModelId, ModelInfo, Scene, Sun};
pub use trace::{Contents, TraceFlags, TraceHit, Tracer};
