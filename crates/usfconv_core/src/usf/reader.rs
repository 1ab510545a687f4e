//! USF binary reader.
//!
//! Little-endian, length-prefixed strings, optional sections guarded by a
//! one-byte presence flag whose availability depends on the record version.

use std::io::{Cursor, Read};
use std::path::Path;

use byteorder::{LittleEndian, ReadBytesExt};
use thiserror::Error;
use usfconv_math::{Mat4, Quat, Vec2, Vec3, Vec4};

use super::types::*;

/// Longest string the reader accepts before treating the length as corrupt.
const MAX_STRING_LEN: i32 = 1 << 20;

/// Low bits of a face record holding the material index.
pub(crate) const FACE_MATERIAL_MASK: u32 = 0x1FFF_FFFF;

/// Errors that can occur while reading or writing USF data.
#[derive(Error, Debug)]
pub enum UsfError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unsupported {section} section in node '{node}'")]
    UnsupportedSection { section: &'static str, node: String },

    #[error("Invalid count {count} for {what}")]
    InvalidCount { what: &'static str, count: i32 },

    #[error("String length {0} out of range")]
    InvalidString(i32),

    #[error("Trailing data: {0} bytes after the scene")]
    TrailingData(usize),
}

/// Result type for USF operations.
pub type UsfResult<T> = Result<T, UsfError>;

/// Read a USF file from disk.
pub fn read_usf<P: AsRef<Path>>(path: P) -> UsfResult<UsfScene> {
    let bytes = std::fs::read(path.as_ref())?;
    read_usf_from_bytes(&bytes)
}

/// Read a USF scene from memory.
pub fn read_usf_from_bytes(bytes: &[u8]) -> UsfResult<UsfScene> {
    let mut reader = UsfReader::new(bytes);
    let scene = reader.read_scene()?;
    let remaining = reader.remaining();
    if remaining > 0 {
        return Err(UsfError::TrailingData(remaining));
    }
    log::debug!("Read USF scene with {} nodes", scene.node_count());
    Ok(scene)
}

/// Streaming reader over an in-memory USF buffer.
pub struct UsfReader<'a> {
    cursor: Cursor<&'a [u8]>,
}

impl<'a> UsfReader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self {
            cursor: Cursor::new(bytes),
        }
    }

    fn remaining(&self) -> usize {
        let len = self.cursor.get_ref().len() as u64;
        len.saturating_sub(self.cursor.position()) as usize
    }

    pub fn read_scene(&mut self) -> UsfResult<UsfScene> {
        let version = self.i32()?;
        let source_path = self.string()?;
        let file_type = self.string()?;
        let options = self.string()?;
        let scene_version = self.cursor.read_u32::<LittleEndian>()?;
        let root = if self.flag()? {
            Some(self.read_node()?)
        } else {
            None
        };

        Ok(UsfScene {
            version,
            source_path,
            file_type,
            options,
            scene_version,
            root,
        })
    }

    fn read_node(&mut self) -> UsfResult<UsfNode> {
        let version = self.i32()?;
        let mut node = UsfNode {
            uid: self.i32()?,
            name: self.string()?,
            model_name: self.string()?,
            affixes: self.string()?,
            ..Default::default()
        };

        let _pses_version = self.i32()?;
        node.properties = PropertySection::parse(&self.string()?);
        node.local = self.matrix()?;
        node.world = self.matrix()?;
        node.local_original = self.matrix()?;
        node.source_id = self.string()?;

        self.reject_section("lwi info", &node.name)?;
        if self.flag()? {
            node.mesh = Some(self.read_mesh()?);
        }
        if self.flag()? {
            node.animation = Some(self.read_animation()?);
        }
        if self.flag()? {
            node.actor = Some(self.read_actor()?);
        }

        let gated: [(i32, &'static str); 9] = [
            (0x102, "reference locator"),
            (0x103, "light"),
            (0x104, "camera"),
            (0x106, "nav waypoint"),
            (0x107, "nav spline"),
            (0x10A, "reference descriptor"),
            (0x10C, "decal"),
            (0x10D, "animation extra"),
            (0x10E, "ecs"),
        ];
        for (min_version, section) in gated {
            if version >= min_version {
                self.reject_section(section, &node.name)?;
            }
        }

        if version >= 0x10B {
            node.maya_node_id = self.string()?;
        }

        let child_count = self.count("children")?;
        node.children.reserve(child_count);
        for _ in 0..child_count {
            node.children.push(self.read_node()?);
        }

        Ok(node)
    }

    fn read_mesh(&mut self) -> UsfResult<UsfMesh> {
        let version = self.i32()?;
        let mut mesh = UsfMesh::default();

        let count = self.count("vertices")?;
        mesh.positions = (0..count).map(|_| self.vec3()).collect::<UsfResult<_>>()?;

        let count = self.count("normals")?;
        mesh.normals = (0..count).map(|_| self.vec3()).collect::<UsfResult<_>>()?;

        let set_count = if version < 0x102 { 1 } else { self.count("color sets")? };
        for _ in 0..set_count {
            let count = self.count("colors")?;
            let colors = (0..count)
                .map(|_| Ok(self.cursor.read_u32::<LittleEndian>()?))
                .collect::<UsfResult<Vec<_>>>()?;
            // Pre-0x102 meshes always carry the count, an empty set means none.
            if version >= 0x102 || !colors.is_empty() {
                mesh.color_sets.push(colors);
            }
        }

        let set_count = self.count("uv sets")?;
        for i in 0..set_count {
            let count = self.count("uvs")?;
            let uvs = (0..count)
                .map(|_| Ok(Vec2::new(self.f32()?, self.f32()?)))
                .collect::<UsfResult<Vec<_>>>()?;
            let name = if version >= 0x107 {
                self.string()?
            } else {
                format!("uv{}", i)
            };
            mesh.uv_sets.push(UvSet { name, uvs });
        }

        if version >= 0x103 {
            let set_count = self.count("tangent sets")?;
            for set in 0..set_count {
                let count = self.count("tangents")?;
                let tangents = (0..count)
                    .map(|_| Ok(Vec4::new(self.f32()?, self.f32()?, self.f32()?, self.f32()?)))
                    .collect::<UsfResult<Vec<_>>>()?;
                if set == 0 {
                    mesh.tangents = tangents;
                }
            }
        }

        let count = self.count("faces")?;
        mesh.faces = (0..count)
            .map(|_| Ok(self.cursor.read_u32::<LittleEndian>()? & FACE_MATERIAL_MASK))
            .collect::<UsfResult<_>>()?;

        let count = self.count("materials")?;
        for _ in 0..count {
            mesh.materials.push(self.read_material()?);
        }

        let bones_per_vertex = self.count("bones per vertex")?;
        let count = self.count("skins")?;
        for _ in 0..count {
            let indices = (0..bones_per_vertex)
                .map(|_| self.i32())
                .collect::<UsfResult<Vec<_>>>()?;
            let weights = (0..bones_per_vertex)
                .map(|_| self.f32())
                .collect::<UsfResult<Vec<_>>>()?;
            let mut binding = SkinBinding::default();
            for k in 0..4.min(bones_per_vertex) {
                binding.indices[k] = indices[k];
                binding.weights[k] = weights[k];
            }
            mesh.skins.push(binding);
        }

        if version >= 0x104 {
            mesh.skinning_method = self.cursor.read_u8()?;
        }

        let count = self.count("bones")?;
        for _ in 0..count {
            let node_uid = self.i32()?;
            let inverse_bind = self.matrix()?;
            mesh.bones.push(Bone {
                node_uid,
                inverse_bind,
            });
        }

        if version >= 0x105 {
            let pairs = self.count("bone pairs")?;
            let mut skipped = vec![0u8; pairs * 8];
            self.cursor.read_exact(&mut skipped)?;
        }

        if version >= 0x106 && self.count("blend shapes")? > 0 {
            return Err(UsfError::UnsupportedSection {
                section: "blend shape",
                node: String::new(),
            });
        }

        Ok(mesh)
    }

    fn read_material(&mut self) -> UsfResult<UsfMaterial> {
        let mut material = UsfMaterial {
            name: self.string()?,
            ..Default::default()
        };

        let version = self.i32()?;
        if version >= 0x10A {
            material.vertex_color_usage = self.cursor.read_u32::<LittleEndian>()?;
            let mut props = PropertySection::parse(&self.string()?);
            if let Some(texture) = props.remove("textureName") {
                material.texture_name = texture;
            }
            if let Some(preset) = props.remove("preset") {
                material.preset = MaterialPreset::parse(&preset).unwrap_or_default();
            }
            if let Some(map) = props.remove("colorChannelMap") {
                match ColorChannelMap::parse(&map) {
                    Some(map) => material.channel_map = map,
                    None => log::warn!(
                        "Material '{}' has unreadable colorChannelMap '{}'",
                        material.name,
                        map
                    ),
                }
            }
            material.properties = props;
        }

        Ok(material)
    }

    fn read_animation(&mut self) -> UsfResult<UsfAnimation> {
        let _version = self.i32()?;
        let count = self.count("translation keys")?;
        let translation = (0..count).map(|_| self.vec3()).collect::<UsfResult<_>>()?;
        let count = self.count("rotation keys")?;
        let rotation = (0..count)
            .map(|_| Ok(Quat::from_xyzw(self.f32()?, self.f32()?, self.f32()?, self.f32()?)))
            .collect::<UsfResult<_>>()?;
        let count = self.count("scale keys")?;
        let scale = (0..count).map(|_| self.vec3()).collect::<UsfResult<_>>()?;

        Ok(UsfAnimation {
            translation,
            rotation,
            scale,
        })
    }

    fn read_actor(&mut self) -> UsfResult<ActorDescriptor> {
        let _version = self.i32()?;
        let name = self.string()?;
        let properties = PropertySection::parse(&self.string()?);
        let count = self.count("animations")?;
        let mut animations = Vec::with_capacity(count);
        for _ in 0..count {
            animations.push(AnimationDescriptor {
                name: self.string()?,
                begin: self.i32()?,
                end: self.i32()?,
                duration: self.f32()?,
            });
        }

        Ok(ActorDescriptor {
            name,
            properties,
            animations,
        })
    }

    fn reject_section(&mut self, section: &'static str, node: &str) -> UsfResult<()> {
        if self.flag()? {
            return Err(UsfError::UnsupportedSection {
                section,
                node: node.to_string(),
            });
        }
        Ok(())
    }

    fn flag(&mut self) -> UsfResult<bool> {
        Ok(self.cursor.read_u8()? != 0)
    }

    fn i32(&mut self) -> UsfResult<i32> {
        Ok(self.cursor.read_i32::<LittleEndian>()?)
    }

    fn f32(&mut self) -> UsfResult<f32> {
        Ok(self.cursor.read_f32::<LittleEndian>()?)
    }

    fn vec3(&mut self) -> UsfResult<Vec3> {
        Ok(Vec3::new(self.f32()?, self.f32()?, self.f32()?))
    }

    fn matrix(&mut self) -> UsfResult<Mat4> {
        let mut raw = [0.0f32; 16];
        self.cursor.read_f32_into::<LittleEndian>(&mut raw)?;
        Ok(Mat4::from_cols_array(&raw))
    }

    /// A non-negative element count that fits in the remaining data.
    fn count(&mut self, what: &'static str) -> UsfResult<usize> {
        let count = self.i32()?;
        if count < 0 || count as usize > self.remaining() {
            return Err(UsfError::InvalidCount { what, count });
        }
        Ok(count as usize)
    }

    fn string(&mut self) -> UsfResult<String> {
        let len = self.i32()?;
        if len <= 0 {
            return Ok(String::new());
        }
        if len > MAX_STRING_LEN || len as usize > self.remaining() {
            return Err(UsfError::InvalidString(len));
        }
        let mut buf = vec![0u8; len as usize];
        self.cursor.read_exact(&mut buf)?;
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }
}
