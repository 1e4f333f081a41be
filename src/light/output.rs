//! Final packing: downsample, expose, gamma-correct, quantize and hand the
//! bytes to the output sink.
//!
//! The sink hands out typed, bounds-checked buffers plus the byte offset
//! that goes into the face's metadata record; the packer itself never does
//! pointer arithmetic into shared storage.

use std::sync::Mutex;

use crate::math::{Ext2i32, Vec3f};
use crate::scene::Rgb8;

use super::lightmap::{Lightmaps, MAX_STYLES, STYLE_UNUSED};
use super::surface::LightSurface;
use super::Settings;

/// Scratch buffers for one face's packed output.
///
/// `offset` counts texels (equivalently: bytes in the legacy channel); the
/// color and direction channels sit at three bytes per texel.
pub struct Reservation {
    /// Texel offset of this face inside the shared output
    pub offset: usize,

    /// RGB color channel, 3 bytes per texel per style
    pub color: Vec<u8>,

    /// Grayscale legacy channel, 1 byte per texel per style
    pub legacy: Vec<u8>,

    /// Packed dominant-direction channel, if the sink keeps one
    pub direction: Option<Vec<u8>>,
}

/// Externally-synchronized arena the packed lightmaps end up in. One
/// `reserve`/`commit` pair per face; the baker performs no other
/// synchronization of output storage.
pub trait LightmapSink: Sync {
    /// Reserve `size` texels worth of zeroed scratch storage
    fn reserve(&self, size: usize) -> Reservation;

    /// Store a filled reservation
    fn commit(&self, reservation: Reservation);
}

/// Everything the face's metadata record needs after baking
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct FaceLighting {
    /// Style ids in slot order, `STYLE_UNUSED`-filled
    pub styles: [u8; MAX_STYLES],

    /// Final lightmap size in texels per axis
    pub extent: Ext2i32,

    /// Texel offset into the output buffers, `None` when no light survived
    pub offset: Option<usize>,
}

impl Default for FaceLighting {
    fn default() -> Self {
        Self {
            styles: [STYLE_UNUSED; MAX_STYLES],
            extent: Ext2i32::new(0, 0),
            offset: None,
        }
    }
}

/// Downsample, scale, gamma-correct, quantize and write every claimed
/// style of the face
pub fn write_lightmaps(
    surf: &LightSurface,
    maps: &Lightmaps,
    settings: &Settings,
    sink: &dyn LightmapSink,
) -> FaceLighting {
    let mut out = FaceLighting {
        extent: Ext2i32::new(surf.tex_size.w + 1, surf.tex_size.h + 1),
        ..FaceLighting::default()
    };

    let mut num_styles = 0;
    for slot in maps.filled() {
        out.styles[num_styles] = maps.slot(slot).style;
        num_styles += 1;
    }

    if num_styles == 0 {
        return out;
    }

    let texels = (out.extent.w * out.extent.h) as usize;

    let mut reservation = sink.reserve(texels * num_styles);
    out.offset = Some(reservation.offset);

    let oversample = settings.oversample.max(1) as usize;
    let inv_gamma = 1.0 / settings.gamma;

    let mut cursor = 0usize;

    for slot in maps.filled() {
        let map = maps.slot(slot);

        for t in 0..=surf.tex_size.h as usize {
            for s in 0..=surf.tex_size.w as usize {
                // Average of the oversample block
                let mut color = Vec3f::zero();
                let mut direction = Vec3f::zero();

                for i in 0..oversample {
                    for j in 0..oversample {
                        let col = s * oversample + j;
                        let row = t * oversample + i;

                        let sample = &map.samples[row * surf.width + col];

                        color += sample.color;
                        direction += sample.direction;
                    }
                }
                color /= (oversample * oversample) as f32;

                // Exposure, gamma, then a uniform rescale for anything
                // still out of range
                color *= settings.range_scale;
                color.x = (color.x / 255.0).powf(inv_gamma) * 255.0;
                color.y = (color.y / 255.0).powf(inv_gamma) * 255.0;
                color.z = (color.z / 255.0).powf(inv_gamma) * 255.0;

                let max_color = color.x.max(color.y).max(color.z);
                if max_color > 255.0 {
                    color *= 255.0 / max_color;
                }

                let rgb = Rgb8 {
                    r: color.x as u8,
                    g: color.y as u8,
                    b: color.z as u8,
                };
                reservation.color[cursor * 3..cursor * 3 + 3]
                    .copy_from_slice(bytemuck::bytes_of(&rgb));

                // The legacy channel stays the mean of the color channels
                // by construction; consumers reading only it must agree
                // with consumers reading both
                let light = ((color.x + color.y + color.z) / 3.0).clamp(0.0, 255.0);
                reservation.legacy[cursor] = light as u8;

                if let Some(lux) = reservation.direction.as_mut() {
                    // Accumulated direction in the face's own basis
                    let mut local = Vec3f::new(
                        direction ^ surf.s_normal,
                        direction ^ surf.t_normal,
                        direction ^ surf.plane.normal,
                    );

                    if local == Vec3f::zero() {
                        local = Vec3f::new(0.0, 0.0, 1.0);
                    } else {
                        local.normalize();
                    }

                    let packed = Rgb8 {
                        r: (((local.x + 1.0) * 128.0) as i32).min(255) as u8,
                        g: (((local.y + 1.0) * 128.0) as i32).min(255) as u8,
                        b: (((local.z + 1.0) * 128.0) as i32).min(255) as u8,
                    };
                    lux[cursor * 3..cursor * 3 + 3]
                        .copy_from_slice(bytemuck::bytes_of(&packed));
                }

                cursor += 1;
            }
        }
    }

    sink.commit(reservation);

    out
}

struct SinkStorage {
    next_offset: usize,
    color: Vec<u8>,
    legacy: Vec<u8>,
    direction: Vec<u8>,
}

/// In-memory output sink: three growable byte arenas behind one lock.
/// Reservation is a bump of the shared texel cursor; faces commit in
/// whatever order the workers finish.
pub struct LightmapData {
    storage: Mutex<SinkStorage>,
    with_direction: bool,
}

impl LightmapData {
    pub fn new(with_direction: bool) -> Self {
        Self {
            storage: Mutex::new(SinkStorage {
                next_offset: 0,
                color: Vec::new(),
                legacy: Vec::new(),
                direction: Vec::new(),
            }),
            with_direction,
        }
    }

    /// Take the packed channels out: (color, legacy, direction)
    pub fn into_channels(self) -> (Vec<u8>, Vec<u8>, Option<Vec<u8>>) {
        let storage = self.storage.into_inner().unwrap();

        (
            storage.color,
            storage.legacy,
            self.with_direction.then_some(storage.direction),
        )
    }
}

impl LightmapSink for LightmapData {
    fn reserve(&self, size: usize) -> Reservation {
        let mut storage = self.storage.lock().unwrap();

        let offset = storage.next_offset;
        storage.next_offset += size;

        Reservation {
            offset,
            color: vec![0; size * 3],
            legacy: vec![0; size],
            direction: self.with_direction.then(|| vec![0; size * 3]),
        }
    }

    fn commit(&self, reservation: Reservation) {
        let mut storage = self.storage.lock().unwrap();

        let offset = reservation.offset;
        let end = offset + reservation.legacy.len();

        if storage.legacy.len() < end {
            storage.legacy.resize(end, 0);
            storage.color.resize(end * 3, 0);
            if self.with_direction {
                storage.direction.resize(end * 3, 0);
            }
        }

        storage.legacy[offset..end].copy_from_slice(&reservation.legacy);
        storage.color[offset * 3..end * 3].copy_from_slice(&reservation.color);
        if let Some(direction) = reservation.direction {
            storage.direction[offset * 3..end * 3].copy_from_slice(&direction);
        }
    }
}
