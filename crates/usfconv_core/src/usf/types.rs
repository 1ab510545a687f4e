//! USF record types.
//!
//! These are the already-parsed engine records: a tree of nodes, each with
//! optional mesh, animation and actor payloads. The binary codec lives in
//! `reader`/`writer`; the transcoder treats these as plain data.

use std::fmt;

use usfconv_math::{Mat4, Quat, Vec2, Vec3, Vec4};

/// Node record version written by this crate.
pub const NODE_VERSION: i32 = 0x10E;

/// Mesh record version written by this crate.
pub const MESH_VERSION: i32 = 0x107;

/// Material record version written by this crate.
pub const MATERIAL_VERSION: i32 = 0x10A;

/// A complete USF file.
#[derive(Clone, Debug, Default)]
pub struct UsfScene {
    /// File format version
    pub version: i32,

    /// Path of the asset this file was exported from
    pub source_path: String,

    /// Free-form file type tag
    pub file_type: String,

    /// Exporter options string
    pub options: String,

    /// Scene record version
    pub scene_version: u32,

    /// Root of the node tree
    pub root: Option<UsfNode>,
}

impl UsfScene {
    /// Create an empty scene with the current record versions.
    pub fn new(source_path: impl Into<String>) -> Self {
        Self {
            version: 1,
            source_path: source_path.into(),
            file_type: "tpl".to_string(),
            options: String::new(),
            scene_version: 1,
            root: None,
        }
    }

    /// Total node count (0 without a root).
    pub fn node_count(&self) -> usize {
        self.root.as_ref().map_or(0, UsfNode::node_count)
    }
}

/// Ordered key/value bag stored as `key=value;` text by the engine.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PropertySection {
    entries: Vec<(String, String)>,
}

impl PropertySection {
    /// Parse `key=value` pairs separated by `;` or newlines.
    ///
    /// Surrounding quotes on values are stripped; lines without `=` are ignored.
    pub fn parse(data: &str) -> Self {
        let mut section = Self::default();
        for line in data.split(|c| c == ';' || c == '\n') {
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let key = key.trim();
            if key.is_empty() {
                continue;
            }
            let value = value.trim();
            let value = value
                .strip_prefix('"')
                .and_then(|v| v.strip_suffix('"'))
                .unwrap_or(value);
            section.set(key, value);
        }
        section
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Insert or replace a value, keeping the original position of the key.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        let pos = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(pos).1)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl fmt::Display for PropertySection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (key, value)) in self.entries.iter().enumerate() {
            if i > 0 {
                f.write_str(";")?;
            }
            write!(f, "{}={}", key, value)?;
        }
        Ok(())
    }
}

/// A node of the USF tree. Children are owned; a node has at most one parent.
#[derive(Clone, Debug)]
pub struct UsfNode {
    /// Unique id within the scene
    pub uid: i32,

    pub name: String,

    /// Engine model name (usually empty)
    pub model_name: String,

    /// Free-form affix annotations, opaque to the converter
    pub affixes: String,

    /// Key/value property bag
    pub properties: PropertySection,

    /// Transform relative to the parent
    pub local: Mat4,

    /// Transform relative to the scene root
    pub world: Mat4,

    /// Local transform as authored, before engine-side fixups
    pub local_original: Mat4,

    /// `|`-delimited hierarchical path
    pub source_id: String,

    pub mesh: Option<UsfMesh>,

    pub animation: Option<UsfAnimation>,

    pub actor: Option<ActorDescriptor>,

    /// DCC node id carried through untouched
    pub maya_node_id: String,

    pub children: Vec<UsfNode>,
}

impl Default for UsfNode {
    fn default() -> Self {
        Self {
            uid: 0,
            name: String::new(),
            model_name: String::new(),
            affixes: String::new(),
            properties: PropertySection::default(),
            local: Mat4::IDENTITY,
            world: Mat4::IDENTITY,
            local_original: Mat4::IDENTITY,
            source_id: String::new(),
            mesh: None,
            animation: None,
            actor: None,
            maya_node_id: String::new(),
            children: Vec::new(),
        }
    }
}

impl UsfNode {
    pub fn new(uid: i32, name: impl Into<String>) -> Self {
        Self {
            uid,
            name: name.into(),
            ..Default::default()
        }
    }

    /// Number of nodes in this subtree, including `self`.
    pub fn node_count(&self) -> usize {
        1 + self.children.iter().map(UsfNode::node_count).sum::<usize>()
    }

    /// Visit this subtree in pre-order.
    pub fn walk<'a>(&'a self, visit: &mut impl FnMut(&'a UsfNode)) {
        visit(self);
        for child in &self.children {
            child.walk(visit);
        }
    }

    pub fn find_by_uid(&self, uid: i32) -> Option<&UsfNode> {
        if self.uid == uid {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.find_by_uid(uid))
    }

    /// First node in pre-order with the given name.
    pub fn find_by_name(&self, name: &str) -> Option<&UsfNode> {
        if self.name == name {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.find_by_name(name))
    }

    /// Direct child with the given name.
    pub fn child(&self, name: &str) -> Option<&UsfNode> {
        self.children.iter().find(|c| c.name == name)
    }

    /// Largest uid in this subtree.
    pub fn max_uid(&self) -> i32 {
        self.children
            .iter()
            .map(UsfNode::max_uid)
            .fold(self.uid, i32::max)
    }
}

/// A named UV set, one coordinate per flat vertex.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct UvSet {
    pub name: String,
    pub uvs: Vec<Vec2>,
}

/// Four (bone index, weight) pairs for one vertex.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct SkinBinding {
    /// Indices into the mesh's bone array
    pub indices: [i32; 4],
    pub weights: [f32; 4],
}

/// A skinning bone: the target node and its inverse bind matrix.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Bone {
    pub node_uid: i32,
    pub inverse_bind: Mat4,
}

/// Default material preset chosen from the node's classification.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum MaterialPreset {
    #[default]
    Default,
    Cloth,
    Decal,
    Cdt,
}

impl MaterialPreset {
    pub fn as_str(self) -> &'static str {
        match self {
            MaterialPreset::Default => "default",
            MaterialPreset::Cloth => "cloth",
            MaterialPreset::Decal => "decal",
            MaterialPreset::Cdt => "cdt",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "default" => Some(MaterialPreset::Default),
            "cloth" => Some(MaterialPreset::Cloth),
            "decal" => Some(MaterialPreset::Decal),
            "cdt" => Some(MaterialPreset::Cdt),
            _ => None,
        }
    }
}

/// Eight destination slots, each selecting a flattened source colour float
/// (`4 * set + channel`) or `-1` for the channel default.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ColorChannelMap(pub [i32; 8]);

impl Default for ColorChannelMap {
    fn default() -> Self {
        ColorChannelMap([0, 1, 2, 3, 4, 5, 6, 7])
    }
}

impl ColorChannelMap {
    /// Build a map from any number of slots, padding with `-1` and dropping
    /// anything past slot 8.
    pub fn from_slots(slots: &[i32]) -> Self {
        let mut map = [-1; 8];
        for (dst, src) in map.iter_mut().zip(slots) {
            *dst = (*src).max(-1);
        }
        ColorChannelMap(map)
    }

    /// Parse a comma-separated list such as `0,1,2,3,-1,-1,-1,-1`.
    pub fn parse(s: &str) -> Option<Self> {
        let slots = s
            .split(',')
            .map(|part| part.trim().parse::<i32>().ok())
            .collect::<Option<Vec<_>>>()?;
        Some(Self::from_slots(&slots))
    }

    pub fn slots(&self) -> &[i32; 8] {
        &self.0
    }
}

impl fmt::Display for ColorChannelMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(|s| s.to_string()).collect();
        f.write_str(&parts.join(","))
    }
}

/// A mesh material. Everything the engine needs beyond the fields below stays
/// in `properties`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct UsfMaterial {
    pub name: String,
    pub texture_name: String,
    pub preset: MaterialPreset,
    pub channel_map: ColorChannelMap,
    /// Engine vertex colour usage flags, carried through
    pub vertex_color_usage: u32,
    pub properties: PropertySection,
}

/// Flat triangle-soup mesh: every per-vertex array has `3 * triangle_count`
/// entries and vertex `3 * t + k` is corner `k` of triangle `t`.
#[derive(Clone, Debug, Default)]
pub struct UsfMesh {
    pub positions: Vec<Vec3>,
    pub normals: Vec<Vec3>,
    /// One tangent set (xyz + handedness)
    pub tangents: Vec<Vec4>,
    pub uv_sets: Vec<UvSet>,
    /// Packed RGBA8 colours, R in the low byte
    pub color_sets: Vec<Vec<u32>>,
    /// Material index per triangle
    pub faces: Vec<u32>,
    pub materials: Vec<UsfMaterial>,
    /// One binding per vertex, empty for rigid meshes
    pub skins: Vec<SkinBinding>,
    pub skinning_method: u8,
    pub bones: Vec<Bone>,
}

impl UsfMesh {
    pub fn triangle_count(&self) -> usize {
        self.faces.len()
    }

    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    pub fn is_skinned(&self) -> bool {
        !self.bones.is_empty()
    }

    /// Check the flat-array and material invariants.
    pub fn validate(&self) -> Result<(), String> {
        let expected = self.faces.len() * 3;
        if self.positions.len() != expected {
            return Err(format!(
                "{} positions for {} triangles",
                self.positions.len(),
                self.faces.len()
            ));
        }
        if !self.normals.is_empty() && self.normals.len() != expected {
            return Err(format!("{} normals, expected {}", self.normals.len(), expected));
        }
        if !self.tangents.is_empty() && self.tangents.len() != expected {
            return Err(format!("{} tangents, expected {}", self.tangents.len(), expected));
        }
        for set in &self.uv_sets {
            if set.uvs.len() != expected {
                return Err(format!("uv set '{}' has {} entries", set.name, set.uvs.len()));
            }
        }
        for (i, set) in self.color_sets.iter().enumerate() {
            if set.len() != expected {
                return Err(format!("color set {} has {} entries", i, set.len()));
            }
        }
        if !self.skins.is_empty() && self.skins.len() != expected {
            return Err(format!("{} skin bindings, expected {}", self.skins.len(), expected));
        }
        if let Some(face) = self
            .faces
            .iter()
            .find(|&&m| m as usize >= self.materials.len())
        {
            return Err(format!(
                "face references material {} of {}",
                face,
                self.materials.len()
            ));
        }
        Ok(())
    }
}

/// Baked per-frame samples of one node, all animations concatenated.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct UsfAnimation {
    pub translation: Vec<Vec3>,
    pub rotation: Vec<Quat>,
    pub scale: Vec<Vec3>,
}

impl UsfAnimation {
    pub fn frame_count(&self) -> usize {
        self.translation
            .len()
            .max(self.rotation.len())
            .max(self.scale.len())
    }
}

/// One named animation inside the concatenated splines.
#[derive(Clone, Debug, PartialEq)]
pub struct AnimationDescriptor {
    pub name: String,
    /// First frame (inclusive)
    pub begin: i32,
    /// Last frame (inclusive)
    pub end: i32,
    /// Length in seconds
    pub duration: f32,
}

impl AnimationDescriptor {
    pub fn frame_count(&self) -> usize {
        if self.end < self.begin {
            0
        } else {
            (self.end - self.begin + 1) as usize
        }
    }
}

/// Actor root payload: animation table and actor-level properties.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ActorDescriptor {
    pub name: String,
    pub properties: PropertySection,
    pub animations: Vec<AnimationDescriptor>,
}
