//! Vertex colour packing through per-material channel maps.
//!
//! A vertex carries any number of RGBA source sets. The channel map picks,
//! for each of 8 destination slots, one float from the flattened sources
//! (`4 * set + channel`). Destination slots 0-3 and 4-7 are then encoded as
//! two packed RGBA8 values with R in the low byte.

use usfconv_math::Vec4;

use crate::usf::ColorChannelMap;

/// Flattened source index that switches slots 0-3 to the mask set (12..16).
pub const MASK_CHANNEL: i32 = 12;

/// Channel defaults: black with opaque alpha.
const DEFAULT_RGBA: [f32; 4] = [0.0, 0.0, 0.0, 1.0];

/// Source index per destination slot, with the mask redirect applied.
fn effective_slots(map: &ColorChannelMap) -> [i32; 8] {
    let mut slots = *map.slots();
    if slots[0] == MASK_CHANNEL {
        for (i, slot) in slots.iter_mut().take(4).enumerate() {
            *slot = MASK_CHANNEL + i as i32;
        }
    }
    slots
}

/// Encode an RGBA float colour as RGBA8, R in the low byte.
pub fn encode_rgba8(rgba: [f32; 4]) -> u32 {
    rgba.iter().enumerate().fold(0u32, |packed, (i, v)| {
        let byte = (v.clamp(0.0, 1.0) * 255.0).round() as u32;
        packed | (byte << (8 * i))
    })
}

pub fn decode_rgba8(packed: u32) -> [f32; 4] {
    std::array::from_fn(|i| ((packed >> (8 * i)) & 0xFF) as f32 / 255.0)
}

/// Pack one vertex's source colour sets into two RGBA8 values.
pub fn pack_colors(sources: &[Vec4], map: &ColorChannelMap) -> [u32; 2] {
    let flat: Vec<f32> = sources.iter().flat_map(|c| c.to_array()).collect();

    let mut dst = [0.0f32; 8];
    for (i, value) in dst.iter_mut().enumerate() {
        *value = DEFAULT_RGBA[i % 4];
    }
    for (i, &slot) in effective_slots(map).iter().enumerate() {
        if let Some(&v) = usize::try_from(slot).ok().and_then(|s| flat.get(s)) {
            dst[i] = v;
        }
    }

    [
        encode_rgba8([dst[0], dst[1], dst[2], dst[3]]),
        encode_rgba8([dst[4], dst[5], dst[6], dst[7]]),
    ]
}

/// Inverse of [`pack_colors`]: scatter the packed slots back to the source
/// indices named by the map. Returns as many sets as the map addresses;
/// unmapped channels keep their defaults.
pub fn unpack_colors(packed: &[u32], map: &ColorChannelMap) -> Vec<Vec4> {
    let slots = effective_slots(map);
    let Some(max_slot) = slots.iter().copied().max().filter(|&m| m >= 0) else {
        return Vec::new();
    };
    let set_count = max_slot as usize / 4 + 1;

    let mut dst = [0.0f32; 8];
    for (half, chunk) in dst.chunks_exact_mut(4).enumerate() {
        let rgba = packed.get(half).map(|&p| decode_rgba8(p)).unwrap_or(DEFAULT_RGBA);
        chunk.copy_from_slice(&rgba);
    }

    let mut flat: Vec<f32> = (0..set_count * 4).map(|i| DEFAULT_RGBA[i % 4]).collect();
    for (i, &slot) in slots.iter().enumerate() {
        if let Ok(s) = usize::try_from(slot) {
            flat[s] = dst[i];
        }
    }

    flat.chunks_exact(4)
        .map(|c| Vec4::new(c[0], c[1], c[2], c[3]))
        .collect()
}
