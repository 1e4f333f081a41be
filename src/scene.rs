//! Read-only scene description consumed by the baker.
//!
//! Everything here is produced by earlier pipeline stages (map parsing,
//! entity processing, BSP compilation) and shared between worker threads
//! without locking. The baker never mutates a scene.

use std::num::NonZeroU32;

use crate::geom;
use crate::math::Vec3f;

/// Generic id implementation
macro_rules! impl_id {
    ($name: ident) => {
        /// Unique identifier
        #[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Ord, PartialOrd)]
        pub struct $name(NonZeroU32);

        impl $name {
            /// Build id from index
            pub fn from_index(index: usize) -> Self {
                $name(NonZeroU32::try_from(index as u32 + 1).unwrap())
            }

            /// Get index by id
            pub fn into_index(self) -> usize {
                self.0.get() as usize - 1
            }
        }
    };
}

impl_id!(FaceId);
impl_id!(ModelId);

/// 8-bit color triple, the final lightmap texel format
#[repr(C)]
#[derive(Copy, Clone, PartialEq, Eq, Debug, Default, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Rgb8 {
    /// Red color component
    pub r: u8,

    /// Green color component
    pub g: u8,

    /// Blue color component
    pub b: u8,
}

/// One texture-projection axis: world direction plus scroll offset
#[derive(Debug, Copy, Clone)]
pub struct TexAxis {
    /// Axis direction (not necessarily unit length, encodes texel density)
    pub vec: Vec3f,

    /// Texture-space offset along the axis
    pub offset: f32,
}

/// Mapping between face world coordinates and texture (s, t) coordinates
#[derive(Debug, Copy, Clone)]
pub struct TexProjection {
    /// S (horizontal) axis
    pub s: TexAxis,

    /// T (vertical) axis
    pub t: TexAxis,
}

/// Planar polygon of the level geometry that receives a lightmap
pub struct Face {
    /// Ordered boundary vertices (world space, model local)
    pub points: Vec<Vec3f>,

    /// Per-vertex normals, filled for faces carved out of curved geometry
    pub normals: Vec<Vec3f>,

    /// Supporting plane
    pub plane: geom::Plane,

    /// Texture projection basis
    pub projection: TexProjection,

    /// True if the face uses the back side of its plane
    pub is_flipped: bool,

    /// True if the face approximates a curved surface (normals interpolated,
    /// relaxed backface culling)
    pub is_curved: bool,

    /// Per-face lightmap scale override (world units per texel)
    pub lightmap_scale: Option<f32>,

    /// Model this face belongs to
    pub model_id: ModelId,
}

/// Intensity + color pair shared by lights, suns and minlight floors
#[derive(Debug, Copy, Clone)]
pub struct LightLevel {
    /// Scalar intensity, negative for subtractive lights
    pub light: f32,

    /// Color in 0..255 per channel
    pub color: Vec3f,
}

/// Per-light distance falloff formula
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Falloff {
    /// No distance falloff at all
    Infinite,

    /// Proportional to 1/distance
    Inverse,

    /// Proportional to 1/distance^2
    Inverse2,

    /// 1/distance^2 with a constant added to the distance first, softening
    /// the near-field peak
    Inverse2A,

    /// Intensity minus a distance-proportional term, clamped at zero
    Linear,

    /// Not a real falloff: a per-entity minimum-light floor, handled by the
    /// minlight pass
    LocalMin,
}

/// Spotlight cone thresholds.
///
/// Both thresholds compare against dot(cone direction, sample-to-light ray);
/// a sample dead ahead of the spot yields -1, so *smaller* is deeper inside
/// the cone.
#[derive(Debug, Copy, Clone)]
pub struct SpotCone {
    /// Direction the spot is pointing (away from the light), unit length
    pub direction: Vec3f,

    /// Hard cutoff: samples with dot above this get nothing
    pub outer: f32,

    /// Full-intensity boundary: between `inner` and `outer` the intensity is
    /// blended linearly
    pub inner: f32,
}

/// Image projected by a spotlight, sampled instead of the light's base color
pub struct ProjectedTexture {
    /// Image width in pixels
    pub width: u32,

    /// Image height in pixels
    pub height: u32,

    /// Palette indices, `width * height` entries, row-major
    pub indices: Vec<u8>,

    /// 256-entry color palette the indices point into
    pub palette: [Rgb8; 256],

    /// Column-major 4x4 modelview-projection matrix mapping world points
    /// into the projector's clip space
    pub matrix: [f32; 16],
}

/// Tri-state dirt participation of a single light
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum DirtOption {
    /// Follow the global setting
    #[default]
    Inherit,

    /// Always apply dirt to this light
    On,

    /// Never apply dirt to this light
    Off,
}

/// Point or spot light entity
pub struct LightEntity {
    /// World-space position
    pub origin: Vec3f,

    /// Base intensity and color
    pub level: LightLevel,

    /// Distance falloff formula
    pub formula: Falloff,

    /// Attenuation coefficient (scales distance inside the falloff formula)
    pub atten: f32,

    /// Lightmap style this light contributes to (0..=254)
    pub style: u8,

    /// Spotlight cone, if this entity is a spot
    pub cone: Option<SpotCone>,

    /// Blend factor between flat and cosine-weighted intensity, 0 = flat
    pub angle_scale: f32,

    /// Dirt participation
    pub dirt: DirtOption,

    /// Per-light dirt gain override
    pub dirt_gain: Option<f32>,

    /// Per-light dirt scale override
    pub dirt_scale: Option<f32>,

    /// Procedurally generated fill light: keep its style slot even when the
    /// individual contribution stays below the keep threshold
    pub generated: bool,

    /// Projected spotlight image
    pub projected: Option<ProjectedTexture>,
}

impl LightEntity {
    /// Point light with the legacy defaults for everything but position,
    /// intensity and color
    pub fn point(origin: Vec3f, light: f32, color: Vec3f) -> Self {
        Self {
            origin,
            level: LightLevel { light, color },
            formula: Falloff::Inverse2,
            atten: 1.0,
            style: 0,
            cone: None,
            angle_scale: 0.5,
            dirt: DirtOption::Inherit,
            dirt_gain: None,
            dirt_scale: None,
            generated: false,
            projected: None,
        }
    }
}

/// Directional sky light
pub struct Sun {
    /// Unit vector pointing from surfaces toward the sun
    pub direction: Vec3f,

    /// Intensity and color
    pub level: LightLevel,

    /// Blend factor between flat and cosine-weighted intensity
    pub angle_scale: f32,

    /// Whether sky light participates in dirt
    pub dirt: bool,
}

/// Per-model data the baker needs
pub struct ModelInfo {
    /// World-space translation applied to the model's faces
    pub offset: Vec3f,

    /// Whether the model's own geometry occludes its own faces
    pub self_shadow: bool,

    /// Per-model minimum-light floor; the greater of this and the global
    /// floor wins
    pub min_light: Option<LightLevel>,

    /// Disable dirt for every face of this model
    pub no_dirt: bool,
}

impl Default for ModelInfo {
    fn default() -> Self {
        Self {
            offset: Vec3f::zero(),
            self_shadow: false,
            min_light: None,
            no_dirt: false,
        }
    }
}

/// Complete read-only input of a bake
pub struct Scene {
    /// All faces that receive lightmaps
    pub faces: Vec<Face>,

    /// Models the faces belong to
    pub models: Vec<ModelInfo>,

    /// Point/spot light entities, in entity order
    pub lights: Vec<LightEntity>,

    /// Directional sky lights
    pub suns: Vec<Sun>,

    /// Models whose geometry casts shadows for the dirt estimator
    pub shadow_casters: Vec<ModelId>,
}

impl Scene {
    /// Get face by id
    pub fn face(&self, id: FaceId) -> &Face {
        &self.faces[id.into_index()]
    }

    /// Get model info by id
    pub fn model(&self, id: ModelId) -> &ModelInfo {
        &self.models[id.into_index()]
    }

    /// Iterate over ids of all faces
    pub fn all_face_ids(&self) -> impl Iterator<Item = FaceId> {
        (0..self.faces.len()).map(FaceId::from_index)
    }
}
