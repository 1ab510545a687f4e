//! Vertex transcoding between indexed glTF primitives and flat USF triangle
//! soup.

use std::collections::HashMap;

use usfconv_math::{Vec2, Vec3, Vec4};

use super::color::{pack_colors, unpack_colors, MASK_CHANNEL};
use super::skin::{binding_from_gltf, binding_to_gltf};
use super::{ConvertError, ConvertResult};
use crate::gltf::PrimitiveData;
use crate::usf::{ColorChannelMap, UsfMesh, UvSet};

/// A flattened mesh plus the glTF material behind each local material slot.
#[derive(Clone, Debug, Default)]
pub struct FlatMesh {
    pub mesh: UsfMesh,
    /// `faces` index into this list
    pub material_slots: Vec<Option<usize>>,
    /// The blank-primary colour swap fired on at least one primitive
    pub swapped_colors: bool,
}

/// Default name of UV set `i` when the source carries none.
pub fn default_uv_name(i: usize) -> String {
    format!("map{}", i + 1)
}

/// Source colour sets a channel map reads from.
fn sets_needed(map: &ColorChannelMap) -> usize {
    let mask = if map.slots()[0] == MASK_CHANNEL { 4 } else { 0 };
    let mapped = map
        .slots()
        .iter()
        .copied()
        .max()
        .filter(|&m| m >= 0)
        .map(|m| m as usize / 4 + 1)
        .unwrap_or(0);
    mask.max(mapped)
}

/// Expand indexed primitives into flat per-triangle arrays.
///
/// Absent colour sets read as opaque white. With `swap_blank_primary` set, a
/// primitive that authors two colour sets and whose first is entirely opaque
/// white has sets 0 and 1 swapped. Every referenced material must have a channel map.
pub fn flatten_primitives(
    node: &str,
    primitives: &[PrimitiveData],
    channel_map: impl Fn(usize) -> ConvertResult<ColorChannelMap>,
    swap_blank_primary: bool,
) -> ConvertResult<FlatMesh> {
    let has_normals = primitives.iter().any(|p| !p.normals.is_empty());
    let has_tangents = primitives.iter().any(|p| !p.tangents.is_empty());
    let is_skinned = primitives.iter().any(|p| !p.joints.is_empty());
    let uv_count = primitives.iter().map(|p| p.uv_sets.len()).max().unwrap_or(0);
    let color_count = primitives.iter().map(|p| p.color_sets.len()).max().unwrap_or(0);

    let mut flat = FlatMesh::default();
    let mesh = &mut flat.mesh;
    mesh.uv_sets = (0..uv_count)
        .map(|i| UvSet {
            name: default_uv_name(i),
            uvs: Vec::new(),
        })
        .collect();
    mesh.color_sets = vec![Vec::new(), Vec::new()];

    for prim in primitives {
        let slot = match flat.material_slots.iter().position(|m| *m == prim.material) {
            Some(slot) => slot,
            None => {
                flat.material_slots.push(prim.material);
                flat.material_slots.len() - 1
            }
        };
        let map = match prim.material {
            Some(material) => channel_map(material)?,
            None => ColorChannelMap::default(),
        };

        let n = prim.vertex_count();
        let set_count = color_count.max(sets_needed(&map));
        let mut sets: Vec<Vec<Vec4>> = (0..set_count)
            .map(|k| {
                prim.color_sets
                    .get(k)
                    .cloned()
                    .unwrap_or_else(|| vec![Vec4::ONE; n])
            })
            .collect();
        let authored = prim.color_sets.len() >= 2;
        if swap_blank_primary && authored && sets[0].iter().all(|c| *c == Vec4::ONE) {
            sets.swap(0, 1);
            flat.swapped_colors = true;
        }

        let indices = prim.triangle_indices();
        if indices.len() % 3 != 0 {
            return Err(ConvertError::InvalidMesh {
                node: node.to_string(),
                reason: format!("{} indices is not a triangle list", indices.len()),
            });
        }

        let mut sources = Vec::with_capacity(set_count);
        for corner in indices.chunks_exact(3) {
            mesh.faces.push(slot as u32);
            for &index in corner {
                let v = index as usize;
                let position = prim.positions.get(v).copied().ok_or_else(|| {
                    ConvertError::InvalidMesh {
                        node: node.to_string(),
                        reason: format!("index {} out of range for {} vertices", v, n),
                    }
                })?;
                mesh.positions.push(position);
                if has_normals {
                    mesh.normals.push(prim.normals.get(v).copied().unwrap_or(Vec3::ZERO));
                }
                if has_tangents {
                    mesh.tangents.push(prim.tangents.get(v).copied().unwrap_or(Vec4::ZERO));
                }
                for (i, set) in mesh.uv_sets.iter_mut().enumerate() {
                    let uv = prim.uv_sets.get(i).and_then(|s| s.get(v)).copied();
                    set.uvs.push(uv.unwrap_or(Vec2::ZERO));
                }

                sources.clear();
                sources.extend(sets.iter().map(|s| s.get(v).copied().unwrap_or(Vec4::ONE)));
                let packed = pack_colors(&sources, &map);
                mesh.color_sets[0].push(packed[0]);
                mesh.color_sets[1].push(packed[1]);

                if is_skinned {
                    let joints = prim.joints.get(v).copied().unwrap_or([0; 4]);
                    let weights = prim.weights.get(v).copied().unwrap_or(Vec4::ZERO);
                    mesh.skins.push(binding_from_gltf(joints, weights));
                }
            }
        }
    }

    Ok(flat)
}

/// Split a flat mesh into one indexed primitive per used material, merging
/// identical corners. Primitive `material` is `material_base + slot`.
pub fn index_mesh(
    node: &str,
    mesh: &UsfMesh,
    material_base: usize,
) -> ConvertResult<Vec<PrimitiveData>> {
    mesh.validate().map_err(|reason| ConvertError::InvalidMesh {
        node: node.to_string(),
        reason,
    })?;

    let mut primitives = Vec::new();
    for (slot, material) in mesh.materials.iter().enumerate() {
        let triangles: Vec<usize> = mesh
            .faces
            .iter()
            .enumerate()
            .filter(|(_, m)| **m as usize == slot)
            .map(|(t, _)| t)
            .collect();
        if triangles.is_empty() {
            continue;
        }

        let mut prim = PrimitiveData {
            material: Some(material_base + slot),
            uv_sets: vec![Vec::new(); mesh.uv_sets.len()],
            ..Default::default()
        };
        let mut indices = Vec::with_capacity(triangles.len() * 3);
        let mut seen: HashMap<Vec<u32>, u32> = HashMap::new();

        for t in triangles {
            for v in 3 * t..3 * t + 3 {
                let colors = if mesh.color_sets.is_empty() {
                    Vec::new()
                } else {
                    let packed: Vec<u32> = mesh.color_sets.iter().map(|s| s[v]).collect();
                    unpack_colors(&packed, &material.channel_map)
                };
                let skin = mesh.skins.get(v).map(binding_to_gltf);

                let mut key: Vec<u32> = mesh.positions[v].to_array().map(f32::to_bits).to_vec();
                if let Some(n) = mesh.normals.get(v) {
                    key.extend(n.to_array().map(f32::to_bits));
                }
                if let Some(t) = mesh.tangents.get(v) {
                    key.extend(t.to_array().map(f32::to_bits));
                }
                for set in &mesh.uv_sets {
                    key.extend(set.uvs[v].to_array().map(f32::to_bits));
                }
                for c in &colors {
                    key.extend(c.to_array().map(f32::to_bits));
                }
                if let Some((joints, weights)) = skin {
                    key.extend(joints.map(u32::from));
                    key.extend(weights.to_array().map(f32::to_bits));
                }

                let next = prim.positions.len() as u32;
                let index = *seen.entry(key).or_insert(next);
                if index == next {
                    prim.positions.push(mesh.positions[v]);
                    if let Some(n) = mesh.normals.get(v) {
                        prim.normals.push(*n);
                    }
                    if let Some(t) = mesh.tangents.get(v) {
                        prim.tangents.push(*t);
                    }
                    for (i, set) in mesh.uv_sets.iter().enumerate() {
                        prim.uv_sets[i].push(set.uvs[v]);
                    }
                    if prim.color_sets.len() < colors.len() {
                        prim.color_sets.resize(colors.len(), Vec::new());
                    }
                    for (i, c) in colors.iter().enumerate() {
                        prim.color_sets[i].push(*c);
                    }
                    if let Some((joints, weights)) = skin {
                        prim.joints.push(joints);
                        prim.weights.push(weights);
                    }
                }
                indices.push(index);
            }
        }

        prim.indices = Some(indices);
        primitives.push(prim);
    }

    Ok(primitives)
}
