//! USF binary writer.
//!
//! Writes the current node/mesh/material versions; every optional section
//! the converter does not model is written absent.

use std::io::Write;
use std::path::Path;

use byteorder::{LittleEndian, WriteBytesExt};
use usfconv_math::{Mat4, Vec3};

use super::reader::{UsfResult, FACE_MATERIAL_MASK};
use super::types::*;

/// Section record version for animation and actor payloads.
const SECTION_VERSION: i32 = 1;

/// Property section version written ahead of the `pses` text.
const PSES_VERSION: i32 = 1;

/// Write a USF scene to disk.
pub fn write_usf<P: AsRef<Path>>(scene: &UsfScene, path: P) -> UsfResult<()> {
    let bytes = write_usf_to_bytes(scene)?;
    std::fs::write(path.as_ref(), bytes)?;
    Ok(())
}

/// Serialize a USF scene into memory.
pub fn write_usf_to_bytes(scene: &UsfScene) -> UsfResult<Vec<u8>> {
    let mut out = Vec::new();
    let mut writer = UsfWriter { out: &mut out };
    writer.write_scene(scene)?;
    log::debug!("Wrote USF scene: {} nodes, {} bytes", scene.node_count(), out.len());
    Ok(out)
}

struct UsfWriter<W: Write> {
    out: W,
}

impl<W: Write> UsfWriter<W> {
    fn write_scene(&mut self, scene: &UsfScene) -> UsfResult<()> {
        self.i32(scene.version)?;
        self.string(&scene.source_path)?;
        self.string(&scene.file_type)?;
        self.string(&scene.options)?;
        self.out.write_u32::<LittleEndian>(scene.scene_version)?;
        match &scene.root {
            Some(root) => {
                self.flag(true)?;
                self.write_node(root)
            }
            None => self.flag(false),
        }
    }

    fn write_node(&mut self, node: &UsfNode) -> UsfResult<()> {
        self.i32(NODE_VERSION)?;
        self.i32(node.uid)?;
        self.string(&node.name)?;
        self.string(&node.model_name)?;
        self.string(&node.affixes)?;
        self.i32(PSES_VERSION)?;
        self.string(&node.properties.to_string())?;
        self.matrix(&node.local)?;
        self.matrix(&node.world)?;
        self.matrix(&node.local_original)?;
        self.string(&node.source_id)?;

        // lwi info
        self.flag(false)?;

        self.flag(node.mesh.is_some())?;
        if let Some(mesh) = &node.mesh {
            self.write_mesh(mesh)?;
        }
        self.flag(node.animation.is_some())?;
        if let Some(animation) = &node.animation {
            self.write_animation(animation)?;
        }
        self.flag(node.actor.is_some())?;
        if let Some(actor) = &node.actor {
            self.write_actor(actor)?;
        }

        // refloc, light, camera, nav waypoint, nav spline, ref desc, decal,
        // anim extra, ecs
        for _ in 0..9 {
            self.flag(false)?;
        }

        self.string(&node.maya_node_id)?;

        self.i32(node.children.len() as i32)?;
        for child in &node.children {
            self.write_node(child)?;
        }
        Ok(())
    }

    fn write_mesh(&mut self, mesh: &UsfMesh) -> UsfResult<()> {
        self.i32(MESH_VERSION)?;

        self.vec3s(&mesh.positions)?;
        self.vec3s(&mesh.normals)?;

        self.i32(mesh.color_sets.len() as i32)?;
        for set in &mesh.color_sets {
            self.i32(set.len() as i32)?;
            for &color in set {
                self.out.write_u32::<LittleEndian>(color)?;
            }
        }

        self.i32(mesh.uv_sets.len() as i32)?;
        for set in &mesh.uv_sets {
            self.i32(set.uvs.len() as i32)?;
            for uv in &set.uvs {
                self.f32(uv.x)?;
                self.f32(uv.y)?;
            }
            self.string(&set.name)?;
        }

        if mesh.tangents.is_empty() {
            self.i32(0)?;
        } else {
            self.i32(1)?;
            self.i32(mesh.tangents.len() as i32)?;
            for t in &mesh.tangents {
                for c in t.to_array() {
                    self.f32(c)?;
                }
            }
        }

        self.i32(mesh.faces.len() as i32)?;
        for &face in &mesh.faces {
            self.out.write_u32::<LittleEndian>(face & FACE_MATERIAL_MASK)?;
        }

        self.i32(mesh.materials.len() as i32)?;
        for material in &mesh.materials {
            self.write_material(material)?;
        }

        let bones_per_vertex = if mesh.skins.is_empty() { 0 } else { 4 };
        self.i32(bones_per_vertex)?;
        self.i32(mesh.skins.len() as i32)?;
        for skin in &mesh.skins {
            for &index in &skin.indices {
                self.i32(index)?;
            }
            for &weight in &skin.weights {
                self.f32(weight)?;
            }
        }

        self.out.write_u8(mesh.skinning_method)?;

        self.i32(mesh.bones.len() as i32)?;
        for bone in &mesh.bones {
            self.i32(bone.node_uid)?;
            self.matrix(&bone.inverse_bind)?;
        }

        // bone pairs, blend shapes
        self.i32(0)?;
        self.i32(0)?;
        Ok(())
    }

    fn write_material(&mut self, material: &UsfMaterial) -> UsfResult<()> {
        self.string(&material.name)?;
        self.i32(MATERIAL_VERSION)?;
        self.out.write_u32::<LittleEndian>(material.vertex_color_usage)?;

        let mut data = PropertySection::default();
        data.set("textureName", material.texture_name.as_str());
        data.set("preset", material.preset.as_str());
        data.set("colorChannelMap", material.channel_map.to_string());
        for (key, value) in material.properties.iter() {
            data.set(key, value);
        }
        self.string(&data.to_string())
    }

    fn write_animation(&mut self, animation: &UsfAnimation) -> UsfResult<()> {
        self.i32(SECTION_VERSION)?;
        self.vec3s(&animation.translation)?;
        self.i32(animation.rotation.len() as i32)?;
        for q in &animation.rotation {
            for c in q.to_array() {
                self.f32(c)?;
            }
        }
        self.vec3s(&animation.scale)
    }

    fn write_actor(&mut self, actor: &ActorDescriptor) -> UsfResult<()> {
        self.i32(SECTION_VERSION)?;
        self.string(&actor.name)?;
        self.string(&actor.properties.to_string())?;
        self.i32(actor.animations.len() as i32)?;
        for anim in &actor.animations {
            self.string(&anim.name)?;
            self.i32(anim.begin)?;
            self.i32(anim.end)?;
            self.f32(anim.duration)?;
        }
        Ok(())
    }

    fn flag(&mut self, value: bool) -> UsfResult<()> {
        Ok(self.out.write_u8(value as u8)?)
    }

    fn i32(&mut self, value: i32) -> UsfResult<()> {
        Ok(self.out.write_i32::<LittleEndian>(value)?)
    }

    fn f32(&mut self, value: f32) -> UsfResult<()> {
        Ok(self.out.write_f32::<LittleEndian>(value)?)
    }

    fn vec3s(&mut self, values: &[Vec3]) -> UsfResult<()> {
        self.i32(values.len() as i32)?;
        for v in values {
            self.f32(v.x)?;
            self.f32(v.y)?;
            self.f32(v.z)?;
        }
        Ok(())
    }

    fn matrix(&mut self, m: &Mat4) -> UsfResult<()> {
        for c in m.to_cols_array() {
            self.f32(c)?;
        }
        Ok(())
    }

    fn string(&mut self, s: &str) -> UsfResult<()> {
        self.i32(s.len() as i32)?;
        self.out.write_all(s.as_bytes())?;
        Ok(())
    }
}
