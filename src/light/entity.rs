//! Per-light accumulation over a face's sample grid.
//!
//! One pass per light source; each pass culls as early as it can (plane
//! side, bounding sphere, fade gate, incidence, spot cone) before paying
//! for a shadow trace. Contributions land in the style slot belonging to
//! the light and the slot is only claimed when something actually hit.

use crate::math::Vec3f;
use crate::scene::{Falloff, LightEntity, LightLevel, ProjectedTexture, Scene, Sun};
use crate::trace::Tracer;

use super::dirt;
use super::lightmap::Lightmaps;
use super::surface::LightSurface;
use super::Settings;

/// Distance unit of the falloff formulas: a light of intensity L under
/// `Inverse2` falloff carries its raw intensity out to this many world units
const LF_SCALE: f32 = 128.0;

/// Facing cull tolerance for directional sky light
const ANGLE_EPSILON: f32 = 0.001;

/// Falloff formula evaluation.
///
/// The divisor clamp keeps the inverse formulas finite: inside one falloff
/// unit of the light they return the raw intensity instead of diverging.
pub fn light_value(level: &LightLevel, entity: &LightEntity, dist: f32, settings: &Settings) -> f32 {
    if matches!(entity.formula, Falloff::Infinite | Falloff::LocalMin) {
        return level.light;
    }

    let value = settings.dist_scale * entity.atten * dist;

    match entity.formula {
        Falloff::Inverse => level.light / (value / LF_SCALE).max(1.0),
        Falloff::Inverse2 => level.light / ((value * value) / (LF_SCALE * LF_SCALE)).max(1.0),
        Falloff::Inverse2A => {
            let value = value + LF_SCALE;
            level.light / ((value * value) / (LF_SCALE * LF_SCALE)).max(1.0)
        }
        Falloff::Linear => {
            if level.light > 0.0 {
                (level.light - value).max(0.0)
            } else {
                (level.light + value).min(0.0)
            }
        }
        Falloff::Infinite | Falloff::LocalMin => unreachable!(),
    }
}

/// True if the light cannot reach the surface's bounding sphere with a
/// value above the fade gate. abs() handles antilights.
fn cull_light(entity: &LightEntity, surf: &LightSurface, settings: &Settings) -> bool {
    let dist = (entity.origin - surf.origin).length() - surf.radius;

    // Light inside the bounding sphere can never be culled
    if dist < 0.0 {
        return false;
    }

    light_value(&entity.level, entity, dist, settings).abs() <= settings.fade_gate
}

/// Accumulate one point/spot entity onto the face
pub fn light_entity(
    scene: &Scene,
    tracer: &dyn Tracer,
    settings: &Settings,
    entity: &LightEntity,
    surf: &LightSurface,
    maps: &mut Lightmaps,
) {
    let model = scene.model(surf.model_id);

    let plane_dist = surf.plane.signed_distance(entity.origin);

    // Don't bother with lights behind the surface. Curved faces keep them:
    // their interpolated normals may still face the light.
    if plane_dist < 0.0 && !surf.is_curved {
        return;
    }

    if cull_light(entity, surf, settings) {
        return;
    }

    let slot = maps.for_style(entity.style, surf.num_points);
    let self_shadow = model.self_shadow.then_some(surf.model_id);

    let mut hit = false;

    for i in 0..surf.num_points {
        let surf_point = surf.points[i];
        let surf_normal = surf.normals[i];

        // The grid hovers one unit above the face; the incidence ray wants
        // the point exactly on the plane, otherwise lights within one unit
        // of a surface misbehave
        let on_plane = surf.plane.project_point(surf_point);

        let ray = entity.origin - on_plane;
        let dist = ray.length();

        // Quick distance check first
        if light_value(&entity.level, entity, dist, settings).abs() <= settings.fade_gate {
            continue;
        }

        let ray = ray / dist;

        let mut angle = ray ^ surf_normal;
        if angle <= 0.0 {
            // Samples facing away never receive light, curved or not
            continue;
        }

        let mut spot_scale = 1.0;
        if let Some(cone) = &entity.cone {
            let falloff = cone.direction ^ ray;
            if falloff > cone.outer {
                continue;
            }
            if falloff > cone.inner {
                // Between the two cone thresholds
                spot_scale = 1.0 - (falloff - cone.inner) / (cone.outer - cone.inner);
            }
        }

        if !tracer.test_light(entity.origin, surf_point, self_shadow) {
            continue;
        }

        // The angle blend brightens the surface beyond the pure cosine
        // term; a light behind the plane of a curved face gets the raw
        // cosine only
        if plane_dist >= 0.0 {
            angle = (1.0 - entity.angle_scale) + entity.angle_scale * angle;
        }

        let mut add = light_value(&entity.level, entity, dist, settings) * angle * spot_scale;
        add *= dirt::scale_factor(surf.occlusion[i], Some(entity), Some(model), settings);

        let sample = &mut maps.slot_mut(slot).samples[i];

        if let Some(projected) = &entity.projected {
            sample.add(add, sample_projected(projected, on_plane), ray);
        } else {
            sample.add(add, entity.level.color, ray);
        }

        // Ignore tiny lights, except generated fill lights which are
        // individually weak but numerous
        if !hit && (sample.light >= 1.0 || entity.generated) {
            hit = true;
        }
    }

    if hit {
        maps.save(slot, entity.style, surf.points[0]);
    }
}

/// Accumulate one directional sky light onto the face, style 0
pub fn light_sky(
    scene: &Scene,
    tracer: &dyn Tracer,
    settings: &Settings,
    sun: &Sun,
    surf: &LightSurface,
    maps: &mut Lightmaps,
) {
    // Surface facing away from the sun
    if (sun.direction ^ surf.plane.normal) < -ANGLE_EPSILON && !surf.is_curved {
        return;
    }

    let model = scene.model(surf.model_id);
    let slot = maps.for_style(0, surf.num_points);
    let self_shadow = model.self_shadow.then_some(surf.model_id);

    let incoming = sun.direction.normalized();

    let mut hit = false;

    for i in 0..surf.num_points {
        if !tracer.test_sky(surf.points[i], sun.direction, self_shadow) {
            continue;
        }

        let mut angle = (incoming ^ surf.normals[i]).max(0.0);
        angle = (1.0 - sun.angle_scale) + sun.angle_scale * angle;

        let mut value = angle * sun.level.light;
        if sun.dirt {
            value *= dirt::scale_factor(surf.occlusion[i], None, Some(model), settings);
        }

        maps.slot_mut(slot).samples[i].add(value, sun.level.color, sun.direction);
        hit = true;
    }

    if hit {
        maps.save(slot, 0, surf.points[0]);
    }
}

/// Apply the minimum-light floor: once with the given global/model level,
/// then once per local-minimum entity (each of those shadow-tested).
pub fn light_min(
    scene: &Scene,
    tracer: &dyn Tracer,
    settings: &Settings,
    level: &LightLevel,
    surf: &LightSurface,
    maps: &mut Lightmaps,
) {
    let model = scene.model(surf.model_id);

    let slot = maps.for_style(0, surf.num_points);

    let mut hit = false;

    for i in 0..surf.num_points {
        let mut value = level.light;
        if settings.min_light_dirt {
            value *= dirt::scale_factor(surf.occlusion[i], None, Some(model), settings);
        }

        let sample = &mut maps.slot_mut(slot).samples[i];
        if settings.add_min_light {
            sample.add(value, level.color, Vec3f::zero());
        } else {
            sample.clamp_min(value, level.color);
        }

        if !hit && sample.light >= 1.0 {
            hit = true;
        }
    }

    if hit {
        maps.save(slot, 0, surf.points[0]);
    }

    // Per-entity local floors
    let self_shadow = model.self_shadow.then_some(surf.model_id);

    for entity in &scene.lights {
        if entity.formula != Falloff::LocalMin {
            continue;
        }

        let slot = maps.for_style(entity.style, surf.num_points);

        let mut hit = false;

        for i in 0..surf.num_points {
            let wanted = settings.add_min_light
                || maps.slot(slot).samples[i].light < entity.level.light;

            if wanted {
                if !tracer.test_light(entity.origin, surf.points[i], self_shadow) {
                    continue;
                }

                let value = entity.level.light
                    * dirt::scale_factor(surf.occlusion[i], Some(entity), Some(model), settings);

                let sample = &mut maps.slot_mut(slot).samples[i];
                if settings.add_min_light {
                    sample.add(value, entity.level.color, Vec3f::zero());
                } else {
                    sample.clamp_min(value, entity.level.color);
                }
            }

            if !hit && maps.slot(slot).samples[i].light >= 1.0 {
                hit = true;
            }
        }

        if hit {
            maps.save(slot, entity.style, surf.points[0]);
        }
    }
}

/// Replace style 0 with the dirt value of every sample (visualization)
pub fn dirt_debug(
    scene: &Scene,
    settings: &Settings,
    surf: &LightSurface,
    maps: &mut Lightmaps,
) {
    let model = scene.model(surf.model_id);
    let slot = maps.for_style(0, surf.num_points);

    for i in 0..surf.num_points {
        let value = 255.0 * dirt::scale_factor(surf.occlusion[i], None, Some(model), settings);

        let sample = &mut maps.slot_mut(slot).samples[i];
        sample.light = value;
        sample.color = Vec3f::new(value, value, value);
    }

    maps.save(slot, 0, surf.points[0]);
}

/// Replace style 0 with the sample normals as colors (visualization)
pub fn phong_debug(surf: &LightSurface, maps: &mut Lightmaps) {
    let slot = maps.for_style(0, surf.num_points);

    for i in 0..surf.num_points {
        // [-1, 1] to [0, 255]
        let as_color = (surf.normals[i] + Vec3f::new(1.0, 1.0, 1.0)) * 0.5 * 255.0;

        let sample = &mut maps.slot_mut(slot).samples[i];
        sample.light = 255.0;
        sample.color = as_color;
    }

    maps.save(slot, 0, surf.points[0]);
}

/// Fetch the color a projected spotlight throws onto a world point.
/// Black outside the projection frustum.
fn sample_projected(tex: &ProjectedTexture, point: Vec3f) -> Vec3f {
    let Some(coord) = project_point(&tex.matrix, point) else {
        return Vec3f::zero();
    };

    if coord.x <= 0.0 || coord.x >= 1.0 || coord.y <= 0.0 || coord.y >= 1.0 {
        return Vec3f::zero();
    }

    let width = tex.width as usize;
    let height = tex.height as usize;

    let s = coord.x * tex.width as f32;
    let s_base = s as usize;
    let s_frac = s - s_base as f32;

    let t = (1.0 - coord.y) * tex.height as f32;
    let t_base = t as usize;
    let t_frac = t - t_base as f32;

    let taps = [
        (0, 0, (1.0 - s_frac) * (1.0 - t_frac)),
        (1, 0, s_frac * (1.0 - t_frac)),
        (0, 1, (1.0 - s_frac) * t_frac),
        (1, 1, s_frac * t_frac),
    ];

    let mut result = Vec3f::zero();

    for (ds, dt, weight) in taps {
        let index = tex.indices[(s_base + ds) % width + width * ((t_base + dt) % height)];
        let rgb = tex.palette[index as usize];

        result += Vec3f::new(rgb.r as f32, rgb.g as f32, rgb.b as f32) * weight;
    }

    result * 2.0
}

/// Project a world point through the spotlight's 4x4 matrix into [0, 1]^3.
/// `None` for points behind the projector or beyond its far plane.
fn project_point(matrix: &[f32; 16], point: Vec3f) -> Option<Vec3f> {
    let v = [point.x, point.y, point.z, 1.0];

    let mut product = [0.0f32; 4];
    for (i, out) in product.iter_mut().enumerate() {
        *out = matrix[i] * v[0] + matrix[4 + i] * v[1] + matrix[8 + i] * v[2] + matrix[12 + i] * v[3];
    }

    let mut usable = true;

    let x = product[0] / product[3];
    let y = product[1] / product[3];
    if product[2] < 0.0 {
        // Too close to the view
        usable = false;
    }
    let z = product[2] / product[3];

    let coord = Vec3f::new((1.0 + x) / 2.0, (1.0 + y) / 2.0, (1.0 + z) / 2.0);
    if coord.z > 1.0 {
        // Beyond the far clip plane
        usable = false;
    }

    usable.then_some(coord)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vec3f;

    fn white_light(formula: Falloff) -> LightEntity {
        let mut entity =
            LightEntity::point(Vec3f::zero(), 300.0, vec3f!(255.0, 255.0, 255.0));
        entity.formula = formula;
        entity
    }

    #[test]
    fn inverse_formulas_return_raw_intensity_at_distance_zero() {
        let settings = Settings::default();

        for formula in [Falloff::Inverse, Falloff::Inverse2, Falloff::Inverse2A] {
            let entity = white_light(formula);
            let value = light_value(&entity.level, &entity, 0.0, &settings);

            assert_eq!(value, 300.0, "{formula:?}");
            assert!(value.is_finite());
        }
    }

    #[test]
    fn falloff_decreases_monotonically_with_distance() {
        let settings = Settings::default();

        for formula in [Falloff::Inverse, Falloff::Inverse2, Falloff::Inverse2A, Falloff::Linear] {
            let entity = white_light(formula);

            let mut previous = f32::INFINITY;
            for step in 0..64 {
                let dist = step as f32 * 64.0;
                let value = light_value(&entity.level, &entity, dist, &settings);

                assert!(value <= previous, "{formula:?} rose at {dist}");
                assert!(value >= 0.0);
                previous = value;
            }
        }
    }

    #[test]
    fn inverse2_matches_inverse_square_law_in_the_far_field() {
        let settings = Settings::default();
        let entity = white_light(Falloff::Inverse2);

        for dist in [256.0f32, 512.0, 1024.0] {
            let expected = 300.0 / (dist / 128.0).powi(2);
            let value = light_value(&entity.level, &entity, dist, &settings);

            assert!((value - expected).abs() < 1e-3);
        }
    }

    #[test]
    fn linear_negative_light_never_crosses_zero() {
        let settings = Settings::default();
        let mut entity = white_light(Falloff::Linear);
        entity.level.light = -200.0;

        for dist in [0.0f32, 100.0, 199.0, 200.0, 5000.0] {
            let value = light_value(&entity.level, &entity, dist, &settings);

            assert!(value <= 0.0);
            assert!(value >= -200.0);
        }
    }

    #[test]
    fn infinite_formula_ignores_distance() {
        let settings = Settings::default();
        let entity = white_light(Falloff::Infinite);

        assert_eq!(
            light_value(&entity.level, &entity, 1.0e6, &settings),
            300.0
        );
    }
}
