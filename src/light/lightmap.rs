//! Multi-style lightmap bookkeeping and the softening filter.
//!
//! Each face owns a small fixed set of style slots plus one overflow slot
//! whose only job is making "too many styles" detectable without branching
//! in the accumulation loops. Slot buffers live in the worker context and
//! are zeroed, never reallocated, between faces.

use crate::math::Vec3f;

/// Style slots a single face can hold
pub const MAX_STYLES: usize = 4;

/// Style id marking a free slot
pub const STYLE_UNUSED: u8 = 255;

/// Accumulator triple of one grid sample
#[derive(Debug, Default, Copy, Clone)]
pub struct LightSample {
    /// Scalar intensity
    pub light: f32,

    /// Additive color, unscaled
    pub color: Vec3f,

    /// Intensity-weighted incident direction
    pub direction: Vec3f,
}

impl LightSample {
    /// Additively blend one light contribution in
    pub fn add(&mut self, light: f32, color: Vec3f, direction: Vec3f) {
        self.light += light;
        self.color += color * (light / 255.0);
        self.direction += direction * light;
    }

    /// Raise the sample to at least the given floor
    pub fn clamp_min(&mut self, light: f32, color: Vec3f) {
        if self.light < light {
            self.light = light;

            let floor = color * (light / 255.0);
            self.color.x = self.color.x.max(floor.x);
            self.color.y = self.color.y.max(floor.y);
            self.color.z = self.color.z.max(floor.z);
        }
    }
}

/// One style slot: a style id and its sample buffer
pub struct Lightmap {
    /// Style id, `STYLE_UNUSED` while the slot is free
    pub style: u8,

    /// One sample per grid point; kept allocated across faces
    pub samples: Vec<LightSample>,
}

/// Per-face style slot array (+1 overflow sentinel)
pub struct Lightmaps {
    slots: [Lightmap; MAX_STYLES + 1],

    /// Softening scratch buffer, reused across styles and faces
    scratch: Vec<LightSample>,
}

impl Lightmaps {
    pub fn new() -> Self {
        Self {
            slots: std::array::from_fn(|_| Lightmap {
                style: STYLE_UNUSED,
                samples: Vec::new(),
            }),
            scratch: Vec::new(),
        }
    }

    /// Free every slot, keeping the allocations
    pub fn reset(&mut self) {
        for slot in &mut self.slots {
            slot.style = STYLE_UNUSED;
        }
    }

    /// Slot accumulating the given style: an existing match, or the first
    /// free slot with its buffer zeroed over `num_points`. The returned
    /// index may be the overflow slot; `save` sorts that out.
    pub fn for_style(&mut self, style: u8, num_points: usize) -> usize {
        let mut index = MAX_STYLES;

        for i in 0..MAX_STYLES {
            if self.slots[i].style == style {
                return i;
            }
            if self.slots[i].style == STYLE_UNUSED {
                index = i;
                break;
            }
        }

        // First use of this slot for the current face: provide zeroed
        // storage but leave it unclaimed until a light actually hits
        let slot = &mut self.slots[index];
        if slot.samples.len() < num_points {
            slot.samples.resize(num_points, LightSample::default());
        }
        slot.samples[..num_points].fill(LightSample::default());
        slot.style = STYLE_UNUSED;

        index
    }

    /// Claim the slot for a style after a light hit it. Contributions that
    /// landed in the overflow slot are dropped with a warning.
    pub fn save(&mut self, index: usize, style: u8, anchor: Vec3f) {
        if index < MAX_STYLES {
            if self.slots[index].style == STYLE_UNUSED {
                self.slots[index].style = style;
            }
            return;
        }

        log::warn!(
            "too many light styles on a face, lightmap point near ({:.1} {:.1} {:.1})",
            anchor.x,
            anchor.y,
            anchor.z
        );
    }

    pub fn slot(&self, index: usize) -> &Lightmap {
        &self.slots[index]
    }

    pub fn slot_mut(&mut self, index: usize) -> &mut Lightmap {
        &mut self.slots[index]
    }

    /// Indices of claimed slots; stops at the first free one, slots are
    /// filled contiguously
    pub fn filled(&self) -> impl Iterator<Item = usize> + '_ {
        self.slots[..MAX_STYLES]
            .iter()
            .take_while(|slot| slot.style != STYLE_UNUSED)
            .enumerate()
            .map(|(i, _)| i)
    }

    /// Zero out anything the positive/negative pass combination left
    /// negative. Expected after subtractive lights, not an error.
    pub fn clamp_negative(&mut self, num_points: usize) {
        for i in 0..MAX_STYLES {
            if self.slots[i].style == STYLE_UNUSED {
                break;
            }

            for sample in &mut self.slots[i].samples[..num_points] {
                sample.light = sample.light.max(0.0);
                sample.color.x = sample.color.x.max(0.0);
                sample.color.y = sample.color.y.max(0.0);
                sample.color.z = sample.color.z.max(0.0);
            }
        }
    }

    /// Box blur over the oversampled grid to soften shadow edges.
    ///
    /// Windows clipped by the grid edge take extra copies of the centre
    /// sample, twice the shortfall, reproducing the legacy edge behaviour
    /// instead of plain truncation.
    pub fn soften(&mut self, index: usize, width: usize, height: usize, radius: usize) {
        let num_points = width * height;
        let full_samples = (2 * radius + 1) * (2 * radius + 1);

        self.scratch.clear();
        self.scratch.resize(num_points, LightSample::default());

        let src = &self.slots[index].samples;
        let dst = &mut self.scratch;

        for i in 0..num_points {
            let start_t = (i / width).saturating_sub(radius);
            let end_t = (i / width + radius + 1).min(height);
            let start_s = (i % width).saturating_sub(radius);
            let end_s = (i % width + radius + 1).min(width);

            let mut acc = LightSample::default();

            for t in start_t..end_t {
                for s in start_s..end_s {
                    let sample = &src[t * width + s];

                    acc.light += sample.light;
                    acc.color += sample.color;
                    acc.direction += sample.direction;
                }
            }

            let mut samples = (end_t - start_t) * (end_s - start_s);
            if samples < full_samples {
                let extra_weight = 2 * (full_samples - samples);
                let centre = &src[i];

                acc.light += centre.light * extra_weight as f32;
                acc.color += centre.color * extra_weight as f32;
                acc.direction += centre.direction * extra_weight as f32;
                samples += extra_weight;
            }

            acc.light /= samples as f32;
            acc.color /= samples as f32;
            acc.direction /= samples as f32;

            dst[i] = acc;
        }

        self.slots[index].samples[..num_points].copy_from_slice(&self.scratch[..num_points]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vec3f;

    #[test]
    fn styles_within_cap_are_preserved() {
        let mut maps = Lightmaps::new();

        for style in 0..MAX_STYLES as u8 {
            let slot = maps.for_style(style, 4);
            maps.slot_mut(slot).samples[0].light = 10.0 + style as f32;
            maps.save(slot, style, Vec3f::zero());
        }

        let styles: Vec<u8> = maps.filled().map(|i| maps.slot(i).style).collect();
        assert_eq!(styles, vec![0, 1, 2, 3]);

        for (i, slot) in maps.filled().enumerate() {
            assert_eq!(maps.slot(slot).samples[0].light, 10.0 + i as f32);
        }
    }

    #[test]
    fn overflow_styles_are_dropped() {
        let mut maps = Lightmaps::new();

        for style in 0..MAX_STYLES as u8 {
            let slot = maps.for_style(style, 4);
            maps.save(slot, style, Vec3f::zero());
        }

        // Fifth distinct style lands in the overflow slot and never sticks
        let slot = maps.for_style(77, 4);
        assert_eq!(slot, MAX_STYLES);
        maps.save(slot, 77, Vec3f::zero());

        assert_eq!(maps.filled().count(), MAX_STYLES);
        assert!(maps.filled().all(|i| maps.slot(i).style != 77));
    }

    #[test]
    fn matching_style_reuses_its_slot_without_zeroing() {
        let mut maps = Lightmaps::new();

        let slot = maps.for_style(3, 4);
        maps.slot_mut(slot).samples[2].light = 5.0;
        maps.save(slot, 3, Vec3f::zero());

        let again = maps.for_style(3, 4);
        assert_eq!(again, slot);
        assert_eq!(maps.slot(again).samples[2].light, 5.0);
    }

    #[test]
    fn unclaimed_slot_is_zeroed_on_reuse() {
        let mut maps = Lightmaps::new();

        let slot = maps.for_style(1, 4);
        maps.slot_mut(slot).samples[1].light = 123.0;
        // No save: the light missed the face entirely

        let again = maps.for_style(2, 4);
        assert_eq!(again, slot);
        assert_eq!(maps.slot(again).samples[1].light, 0.0);
    }

    #[test]
    fn soften_is_idempotent_on_uniform_input() {
        let mut maps = Lightmaps::new();
        let (width, height) = (6, 4);

        let slot = maps.for_style(0, width * height);
        for sample in &mut maps.slot_mut(slot).samples[..width * height] {
            sample.light = 80.0;
            sample.color = vec3f!(80.0, 60.0, 40.0);
            sample.direction = vec3f!(0.0, 0.0, 1.0);
        }
        maps.save(slot, 0, Vec3f::zero());

        maps.soften(slot, width, height, 1);

        for sample in &maps.slot(slot).samples[..width * height] {
            assert!((sample.light - 80.0).abs() < 1e-3);
            assert!((sample.color - vec3f!(80.0, 60.0, 40.0)).length() < 1e-3);
            assert!((sample.direction - vec3f!(0.0, 0.0, 1.0)).length() < 1e-3);
        }
    }

    #[test]
    fn negative_samples_clamp_to_zero() {
        let mut maps = Lightmaps::new();

        let slot = maps.for_style(0, 2);
        maps.slot_mut(slot).samples[0].light = -40.0;
        maps.slot_mut(slot).samples[0].color = vec3f!(-10.0, 5.0, -0.5);
        maps.save(slot, 0, Vec3f::zero());

        maps.clamp_negative(2);

        let sample = &maps.slot(slot).samples[0];
        assert_eq!(sample.light, 0.0);
        assert_eq!(sample.color, vec3f!(0.0, 5.0, 0.0));
    }
}
