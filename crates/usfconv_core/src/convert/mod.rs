//! Scene-graph transcoder between glTF documents and USF scenes.
//!
//! Each pipeline call owns a fresh [`ConversionContext`]: an arena of
//! conversion nodes, lookup tables, the variant-group side table, animation
//! lengths and collected warnings. Nothing survives between runs.
//!
//! glTF → USF ([`gltf_to_usf`]):
//! 1. walk the imported scene, classifying every node ([`classify`])
//! 2. index variant families by group name ([`group_name`])
//! 3. extract node metadata and material channel maps
//! 4. flatten meshes and bake animation splines
//! 5. rebuild the canonical hierarchy and assign source identifiers
//!
//! USF → glTF ([`usf_to_gltf`]) mirrors this: create the node tree, then fill
//! meshes, skins and animation tracks. [`ExportOptions::encode`] picks the
//! container format.

mod animation;
mod classify;
mod color;
mod context;
mod group;
mod hierarchy;
mod metadata;
mod skin;
mod to_gltf;
mod to_usf;
mod vertex;

pub use animation::{
    bake_animations, default_descriptors, measure_animation_lengths, unbake_animation, DEFAULT_FPS,
};
pub use classify::{classify, NodeFacts, NodeType};
pub use color::{decode_rgba8, encode_rgba8, pack_colors, unpack_colors, MASK_CHANNEL};
pub use context::{ConvNode, ConversionContext, NodeId};
pub use group::{base_group_name, collect_groups, group_name, VariantGroup};
pub use hierarchy::{
    assign_source_ids, build_character_tree, build_prop_tree, merge_nodes, Scaffold,
};
pub use skin::normalize_weights;
pub use to_gltf::{usf_to_gltf, GENERATOR};
pub use to_usf::gltf_to_usf;
pub use vertex::{flatten_primitives, index_mesh};

use thiserror::Error;

use crate::config::ConfigError;
use crate::gltf::{GltfDocument, GltfError, GltfResult};
use crate::usf::{UsfError, UsfScene};

/// Fatal conversion errors. The run aborts and no output is produced.
#[derive(Error, Debug)]
pub enum ConvertError {
    #[error("Missing configuration: {0}")]
    MissingConfiguration(String),

    #[error("Invalid configuration: {0}")]
    Config(ConfigError),

    #[error("Material {material} used by '{node}' has no colour channel map")]
    MalformedMaterialReference { node: String, material: usize },

    #[error("Lookup miss: {0}")]
    LookupMiss(String),

    #[error("Invalid mesh on '{node}': {reason}")]
    InvalidMesh { node: String, reason: String },

    #[error("USF error: {0}")]
    Usf(#[from] UsfError),

    #[error("glTF error: {0}")]
    Gltf(#[from] GltfError),
}

impl From<ConfigError> for ConvertError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Missing(path) => {
                ConvertError::MissingConfiguration(path.display().to_string())
            }
            other => ConvertError::Config(other),
        }
    }
}

/// Result type for conversion operations.
pub type ConvertResult<T> = Result<T, ConvertError>;

/// Recoverable conditions. They are logged and returned with the output.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConversionWarning {
    #[error("Required node '{0}' was missing and has been synthesized")]
    MissingRequiredNode(String),

    #[error("Skin group '{0}' has no children")]
    EmptySkinGroup(String),

    #[error("Group '{group}' already has a {kind}; ignoring '{node}'")]
    DuplicateVariant {
        group: String,
        kind: &'static str,
        node: String,
    },

    #[error("Swapped colour sets 0 and 1 on '{0}' (primary set is blank white)")]
    ColorSetSwapped(String),
}

/// Pipeline output plus the warnings raised while producing it.
#[derive(Debug)]
pub struct Conversion<T> {
    pub output: T,
    pub warnings: Vec<ConversionWarning>,
}

/// Which hierarchy to rebuild for an imported glTF scene.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum AssetKind {
    /// Scaffolded tree with a skinned-geometry subtree.
    Character,
    /// Everything under a single actor node.
    Prop,
    /// Character if any node classifies as SKIN, CLOTH_SKIN, CHAR or CHAR_ROOT.
    #[default]
    Auto,
}

impl AssetKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "character" | "char" => Some(AssetKind::Character),
            "prop" | "weapon" => Some(AssetKind::Prop),
            "auto" => Some(AssetKind::Auto),
            _ => None,
        }
    }
}

/// Options for glTF → USF.
#[derive(Clone, Debug, Default)]
pub struct ImportOptions {
    pub kind: AssetKind,
    /// Sidecar hierarchy merged into the rebuilt character root.
    pub hierarchy: Option<UsfScene>,
}

/// Options for USF → glTF.
#[derive(Clone, Debug, Default)]
pub struct ExportOptions {
    /// Encode as GLB instead of JSON with an embedded buffer.
    pub binary: bool,
}

impl ExportOptions {
    pub fn encode(&self, doc: &GltfDocument) -> GltfResult<Vec<u8>> {
        if self.binary {
            doc.to_glb()
        } else {
            doc.to_gltf_json()
        }
    }
}
