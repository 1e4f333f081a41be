use super::*;
use crate::geom::Plane;
use crate::scene::{Face, LightEntity, ModelId, ModelInfo, Sun, TexAxis, TexProjection};
use crate::trace::{Contents, TraceFlags, TraceHit};
use crate::vec3f;

fn init_logs() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Axis-aligned rectangular occluder
struct Occluder {
    plane: Plane,
    mins: Vec3f,
    maxs: Vec3f,
}

/// Hand-rolled visibility oracle: a handful of rectangle occluders floating
/// in an otherwise empty world, with optional sky everywhere above
struct TestWorld {
    occluders: Vec<Occluder>,
    open_sky: bool,
}

impl TestWorld {
    fn open() -> Self {
        Self {
            occluders: Vec::new(),
            open_sky: true,
        }
    }

    /// Horizontal rectangle at height z spanning the given x/y ranges
    fn with_ceiling_patch(x: (f32, f32), y: (f32, f32), z: f32) -> Self {
        Self {
            occluders: vec![Occluder {
                plane: Plane {
                    normal: vec3f!(0.0, 0.0, 1.0),
                    distance: z,
                },
                mins: vec3f!(x.0, y.0, z),
                maxs: vec3f!(x.1, y.1, z),
            }],
            open_sky: true,
        }
    }

    fn segment_hit(&self, from: Vec3f, to: Vec3f) -> Option<(f32, usize, Vec3f)> {
        let mut nearest: Option<(f32, usize, Vec3f)> = None;

        for (index, occluder) in self.occluders.iter().enumerate() {
            let d0 = occluder.plane.signed_distance(from);
            let d1 = occluder.plane.signed_distance(to);

            if (d0 >= 0.0) == (d1 >= 0.0) {
                continue;
            }

            let frac = d0 / (d0 - d1);
            let point = from + (to - from) * frac;

            let eps = 0.01;
            if point.x < occluder.mins.x - eps
                || point.x > occluder.maxs.x + eps
                || point.y < occluder.mins.y - eps
                || point.y > occluder.maxs.y + eps
                || point.z < occluder.mins.z - eps
                || point.z > occluder.maxs.z + eps
            {
                continue;
            }

            if nearest.is_none_or(|(best, _, _)| frac < best) {
                nearest = Some((frac, index, point));
            }
        }

        nearest
    }
}

impl Tracer for TestWorld {
    fn trace_line(&self, _: ModelId, flags: TraceFlags, from: Vec3f, to: Vec3f) -> TraceHit {
        if !flags.contains(TraceFlags::HIT_SOLID) {
            return TraceHit::None;
        }

        match self.segment_hit(from, to) {
            Some((_, index, point)) => {
                let occluder = &self.occluders[index];

                TraceHit::Solid {
                    plane: occluder.plane,
                    side: occluder.plane.signed_distance(from) < 0.0,
                    point,
                }
            }
            None => TraceHit::None,
        }
    }

    fn point_contents(&self, _: Vec3f) -> Contents {
        Contents::Empty
    }

    fn test_light(&self, origin: Vec3f, point: Vec3f, _: Option<ModelId>) -> bool {
        self.segment_hit(origin, point).is_none()
    }

    fn test_sky(&self, point: Vec3f, direction: Vec3f, _: Option<ModelId>) -> bool {
        self.open_sky && self.segment_hit(point, point + direction * 8192.0).is_none()
    }
}

/// 64x64 quad in the z=0 plane, 16 units per texel => a 5x5 lightmap
fn quad_face() -> Face {
    Face {
        points: vec![
            vec3f!(0.0, 0.0, 0.0),
            vec3f!(64.0, 0.0, 0.0),
            vec3f!(64.0, 64.0, 0.0),
            vec3f!(0.0, 64.0, 0.0),
        ],
        normals: Vec::new(),
        plane: Plane {
            normal: vec3f!(0.0, 0.0, 1.0),
            distance: 0.0,
        },
        projection: TexProjection {
            s: TexAxis {
                vec: vec3f!(1.0, 0.0, 0.0),
                offset: 0.0,
            },
            t: TexAxis {
                vec: vec3f!(0.0, 1.0, 0.0),
                offset: 0.0,
            },
        },
        is_flipped: false,
        is_curved: false,
        lightmap_scale: None,
        model_id: ModelId::from_index(0),
    }
}

fn scene_with(faces: Vec<Face>, lights: Vec<LightEntity>, suns: Vec<Sun>) -> Scene {
    Scene {
        faces,
        models: vec![ModelInfo::default()],
        lights,
        suns,
        shadow_casters: vec![ModelId::from_index(0)],
    }
}

/// Bake face 0 and return its metadata plus the packed channels
fn bake_one(
    scene: &Scene,
    world: &TestWorld,
    settings: &Settings,
) -> (FaceLighting, Vec<u8>, Vec<u8>) {
    let table = DirtTable::new(settings);
    let sink = LightmapData::new(true);
    let mut ctx = WorkerContext::new();

    let lighting = light_face(
        scene,
        world,
        &table,
        settings,
        &sink,
        &mut ctx,
        FaceId::from_index(0),
    )
    .unwrap();

    let (color, legacy, _) = sink.into_channels();

    (lighting, legacy, color)
}

/// Analytic expectation for the quad scene: white light at `origin`,
/// `Inverse2` falloff, default settings, sample on the plane at `point`
fn expected_texel(origin: Vec3f, intensity: f32, point: Vec3f) -> f32 {
    let ray = origin - point;
    let dist = ray.length();

    let angle = (ray / dist) ^ vec3f!(0.0, 0.0, 1.0);
    let angle = 0.5 + 0.5 * angle;

    let add = intensity / ((dist / 128.0) * (dist / 128.0)).max(1.0) * angle;

    (add * 0.5).clamp(0.0, 255.0)
}

#[test]
fn point_light_above_quad_centre_peaks_at_the_centre() {
    init_logs();

    let light = LightEntity::point(vec3f!(32.0, 32.0, 128.0), 300.0, vec3f!(255.0, 255.0, 255.0));
    let scene = scene_with(vec![quad_face()], vec![light], Vec::new());
    let world = TestWorld::open();

    let (lighting, legacy, color) = bake_one(&scene, &world, &Settings::default());

    assert_eq!(lighting.styles, [0, 255, 255, 255]);
    assert_eq!(lighting.extent, crate::math::Ext2i32::new(5, 5));
    assert_eq!(lighting.offset, Some(0));
    assert_eq!(legacy.len(), 25);
    assert_eq!(color.len(), 75);

    let centre = legacy[12];
    for corner in [legacy[0], legacy[4], legacy[20], legacy[24]] {
        assert!(centre > corner, "centre {centre} <= corner {corner}");
    }

    // The packed value follows the inverse-square law within quantization
    for (index, s, t) in [(12usize, 2.0f32, 2.0f32), (0, 0.0, 0.0), (14, 4.0, 2.0)] {
        let expected = expected_texel(
            vec3f!(32.0, 32.0, 128.0),
            300.0,
            vec3f!(s * 16.0, t * 16.0, 0.0),
        );

        assert!(
            (legacy[index] as f32 - expected).abs() <= 2.0,
            "texel {index}: got {} expected {expected}",
            legacy[index]
        );
    }
}

#[test]
fn occluder_shadows_half_the_quad_and_leaves_the_rest_alone() {
    init_logs();

    let light = LightEntity::point(vec3f!(32.0, 32.0, 128.0), 300.0, vec3f!(255.0, 255.0, 255.0));

    let open = TestWorld::open();
    let shadowed = TestWorld::with_ceiling_patch((-300.0, 31.0), (-300.0, 300.0), 64.0);

    let scene = scene_with(vec![quad_face()], vec![light], Vec::new());
    let settings = Settings::default();

    let (_, reference, _) = bake_one(&scene, &open, &settings);
    let (lighting, legacy, _) = bake_one(&scene, &shadowed, &settings);

    assert_eq!(lighting.styles[0], 0);

    for t in 0..5usize {
        for s in 0..5usize {
            let index = t * 5 + s;

            if s <= 1 {
                // Light rays toward x <= 16 cross the patch
                assert_eq!(legacy[index], 0, "texel {index} should be shadowed");
            }
            if s >= 3 {
                assert_eq!(
                    legacy[index], reference[index],
                    "unoccluded texel {index} changed"
                );
            }
        }
    }
}

#[test]
fn negative_light_alone_clamps_to_exact_zero() {
    init_logs();

    let mut anti = LightEntity::point(vec3f!(32.0, 32.0, 128.0), -200.0, vec3f!(255.0, 255.0, 255.0));
    anti.generated = true; // keep the style slot despite never reaching +1

    let scene = scene_with(vec![quad_face()], vec![anti], Vec::new());
    let world = TestWorld::open();

    let (lighting, legacy, color) = bake_one(&scene, &world, &Settings::default());

    assert_eq!(lighting.styles[0], 0);
    assert!(legacy.iter().all(|&v| v == 0));
    assert!(color.iter().all(|&v| v == 0));
}

#[test]
fn weak_negative_light_without_keep_flag_produces_no_styles() {
    let anti = LightEntity::point(vec3f!(32.0, 32.0, 128.0), -200.0, vec3f!(255.0, 255.0, 255.0));

    let scene = scene_with(vec![quad_face()], vec![anti], Vec::new());
    let world = TestWorld::open();

    let (lighting, legacy, _) = bake_one(&scene, &world, &Settings::default());

    assert_eq!(lighting.styles, [255; 4]);
    assert_eq!(lighting.offset, None);
    assert!(legacy.is_empty());
}

#[test]
fn distant_light_falls_below_the_fade_gate_and_is_culled() {
    // At 262144 units the inverse-square value is ~7e-5, under the default
    // 1e-3 gate
    let light = LightEntity::point(
        vec3f!(32.0, 32.0, 262144.0),
        300.0,
        vec3f!(255.0, 255.0, 255.0),
    );

    let scene = scene_with(vec![quad_face()], vec![light], Vec::new());
    let world = TestWorld::open();

    let (lighting, legacy, _) = bake_one(&scene, &world, &Settings::default());

    assert_eq!(lighting.styles, [255; 4]);
    assert_eq!(lighting.offset, None);
    assert!(legacy.is_empty());
}

#[test]
fn overhead_sun_lights_the_quad_uniformly() {
    let sun = Sun {
        direction: vec3f!(0.0, 0.0, 1.0),
        level: LightLevel {
            light: 100.0,
            color: vec3f!(255.0, 255.0, 255.0),
        },
        angle_scale: 0.5,
        dirt: false,
    };

    let scene = scene_with(vec![quad_face()], Vec::new(), vec![sun]);
    let world = TestWorld::open();

    let (lighting, legacy, _) = bake_one(&scene, &world, &Settings::default());

    assert_eq!(lighting.styles[0], 0);
    // Straight-down incidence, angle term 1: 100 * range_scale
    assert!(legacy.iter().all(|&v| v == 50), "{legacy:?}");
}

#[test]
fn styled_lights_fill_slots_contiguously() {
    let mut red = LightEntity::point(vec3f!(32.0, 32.0, 96.0), 300.0, vec3f!(255.0, 0.0, 0.0));
    red.style = 3;
    let mut blue = LightEntity::point(vec3f!(32.0, 32.0, 64.0), 300.0, vec3f!(0.0, 0.0, 255.0));
    blue.style = 7;

    let scene = scene_with(vec![quad_face()], vec![red, blue], Vec::new());
    let world = TestWorld::open();

    let (lighting, legacy, _) = bake_one(&scene, &world, &Settings::default());

    assert_eq!(lighting.styles, [3, 7, 255, 255]);
    assert_eq!(legacy.len(), 50); // two styles, 25 texels each
}

#[test]
fn oversize_face_is_a_fatal_extent_error() {
    let mut face = quad_face();
    for point in &mut face.points {
        *point *= 200.0; // 12800 units => 800 texels
    }

    let scene = scene_with(vec![face], Vec::new(), Vec::new());
    let world = TestWorld::open();
    let settings = Settings::default();
    let table = DirtTable::new(&settings);
    let sink = LightmapData::new(false);
    let mut ctx = WorkerContext::new();

    let result = light_face(
        &scene,
        &world,
        &table,
        &settings,
        &sink,
        &mut ctx,
        FaceId::from_index(0),
    );

    assert!(matches!(result, Err(BakeError::ExtentOverflow { face: 0, .. })));
}

#[test]
fn collapsed_projection_is_a_fatal_transform_error() {
    let mut face = quad_face();
    face.projection.t = face.projection.s;

    let scene = scene_with(vec![face], Vec::new(), Vec::new());
    let world = TestWorld::open();
    let settings = Settings::default();
    let table = DirtTable::new(&settings);
    let sink = LightmapData::new(false);
    let mut ctx = WorkerContext::new();

    let result = light_face(
        &scene,
        &world,
        &table,
        &settings,
        &sink,
        &mut ctx,
        FaceId::from_index(0),
    );

    assert!(matches!(
        result,
        Err(BakeError::DegenerateTransform { face: 0 })
    ));
}

#[test]
fn bake_all_runs_faces_in_parallel_with_disjoint_output() {
    init_logs();

    let light = LightEntity::point(vec3f!(32.0, 32.0, 128.0), 300.0, vec3f!(255.0, 255.0, 255.0));
    let scene = scene_with(vec![quad_face(), quad_face()], vec![light], Vec::new());
    let world = TestWorld::open();

    let sink = LightmapData::new(false);
    let results = bake_all(&scene, &world, &Settings::default(), &sink).unwrap();

    assert_eq!(results.len(), 2);

    let mut offsets: Vec<usize> = results.iter().map(|r| r.offset.unwrap()).collect();
    offsets.sort_unstable();
    assert_eq!(offsets, vec![0, 25]);

    let (_, legacy, _) = sink.into_channels();
    assert_eq!(legacy.len(), 50);

    // Identical faces bake identically regardless of which worker got them
    assert_eq!(
        legacy[results[0].offset.unwrap()..results[0].offset.unwrap() + 25],
        legacy[results[1].offset.unwrap()..results[1].offset.unwrap() + 25]
    );
}

#[test]
fn softening_preserves_a_uniform_sun_bake() {
    let sun = Sun {
        direction: vec3f!(0.0, 0.0, 1.0),
        level: LightLevel {
            light: 100.0,
            color: vec3f!(255.0, 255.0, 255.0),
        },
        angle_scale: 0.5,
        dirt: false,
    };

    let scene = scene_with(vec![quad_face()], Vec::new(), vec![sun]);
    let world = TestWorld::open();

    let mut settings = Settings::default();
    settings.soft_samples = 1;

    let (_, legacy, _) = bake_one(&scene, &world, &settings);

    assert!(legacy.iter().all(|&v| v == 50), "{legacy:?}");
}

#[test]
fn dirt_debug_mode_writes_occlusion_instead_of_light() {
    let scene = scene_with(vec![quad_face()], Vec::new(), Vec::new());
    let world = TestWorld::open();

    let mut settings = Settings::default();
    settings.dirt.enable = true;
    settings.debug = DebugMode::Dirt;

    let (lighting, legacy, _) = bake_one(&scene, &world, &settings);

    assert_eq!(lighting.styles[0], 0);
    // Open world: zero occlusion, scale factor 1, value 255 * range_scale
    assert!(legacy.iter().all(|&v| v == 127), "{legacy:?}");
}
