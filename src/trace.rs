//! Visibility-oracle contract.
//!
//! The baker never walks scene geometry itself: every shadow test, sky test
//! and sample-placement probe goes through a [`Tracer`] supplied by the
//! surrounding compiler, which owns the spatial acceleration structures.
//! Queries are synchronous, deterministic and free of side effects, so the
//! same tracer is shared by every worker thread.

use bitflags::bitflags;

use crate::geom::Plane;
use crate::math::Vec3f;
use crate::scene::ModelId;

bitflags! {
    /// Which hit kinds a trace should report instead of passing through
    #[derive(Copy, Clone, Eq, PartialEq, Debug)]
    pub struct TraceFlags: u32 {
        /// Stop on solid geometry
        const HIT_SOLID = 1 << 0;

        /// Stop on sky surfaces
        const HIT_SKY = 1 << 1;
    }
}

/// What a point of space contains
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum Contents {
    /// Open space
    Empty,

    /// Inside solid geometry
    Solid,

    /// Inside a sky volume
    Sky,
}

/// Result of a line trace
#[derive(Copy, Clone, Debug)]
pub enum TraceHit {
    /// Reached the end point unobstructed
    None,

    /// Stopped on solid geometry
    Solid {
        /// Plane of the surface that was struck
        plane: Plane,

        /// True if the back side of the plane was struck
        side: bool,

        /// World-space hit position
        point: Vec3f,
    },

    /// Stopped on a sky surface
    Sky,

    /// The start point was already inside solid geometry
    StartSolid,
}

/// Ray-cast interface the compiler provides to the baker
pub trait Tracer: Sync {
    /// Trace a line against one model's geometry
    fn trace_line(&self, model: ModelId, flags: TraceFlags, from: Vec3f, to: Vec3f) -> TraceHit;

    /// Classify a point of space
    fn point_contents(&self, point: Vec3f) -> Contents;

    /// True if an unobstructed line exists between a light origin and a
    /// sample point. `self_shadow` names a model whose geometry must also be
    /// tested against (a self-shadowing submodel).
    fn test_light(&self, origin: Vec3f, point: Vec3f, self_shadow: Option<ModelId>) -> bool;

    /// True if following `direction` from `point` reaches sky
    fn test_sky(&self, point: Vec3f, direction: Vec3f, self_shadow: Option<ModelId>) -> bool;
}
