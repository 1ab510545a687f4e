//! Per-run conversion state.

use std::collections::HashMap;

use indexmap::IndexMap;
use usfconv_math::Mat4;

use super::classify::NodeType;
use super::group::VariantGroup;
use super::{ConversionWarning, ConvertError, ConvertResult};
use crate::usf::{
    ActorDescriptor, ColorChannelMap, PropertySection, UsfAnimation, UsfMesh, UsfNode,
};

/// Index of a node in the context arena.
pub type NodeId = usize;

/// A node under conversion.
///
/// `source_parent`/`source_children` mirror the imported scene;
/// `parent`/`children` describe the rebuilt output tree.
#[derive(Clone, Debug)]
pub struct ConvNode {
    pub id: NodeId,
    pub uid: i32,
    pub name: String,
    pub node_type: NodeType,
    pub group: String,
    pub gltf_index: Option<usize>,
    pub source_parent: Option<NodeId>,
    pub source_children: Vec<NodeId>,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    pub world: Mat4,
    pub affixes: String,
    pub properties: PropertySection,
    pub model_name: String,
    pub maya_node_id: String,
    pub source_id: String,
    /// glTF skin used by this node's mesh
    pub skin: Option<usize>,
    pub mesh: Option<UsfMesh>,
    pub animation: Option<UsfAnimation>,
    pub actor: Option<ActorDescriptor>,
}

impl ConvNode {
    fn new(id: NodeId, uid: i32, name: &str, node_type: NodeType) -> Self {
        Self {
            id,
            uid,
            name: name.to_string(),
            node_type,
            group: String::new(),
            gltf_index: None,
            source_parent: None,
            source_children: Vec::new(),
            parent: None,
            children: Vec::new(),
            world: Mat4::IDENTITY,
            affixes: String::new(),
            properties: PropertySection::default(),
            model_name: String::new(),
            maya_node_id: String::new(),
            source_id: String::new(),
            skin: None,
            mesh: None,
            animation: None,
            actor: None,
        }
    }
}

/// Everything one conversion run knows. Created fresh per pipeline call.
#[derive(Debug, Default)]
pub struct ConversionContext {
    pub nodes: Vec<ConvNode>,
    by_gltf: HashMap<usize, NodeId>,
    by_uid: HashMap<i32, NodeId>,
    /// Variant families keyed by group name, in discovery order
    pub groups: IndexMap<String, VariantGroup>,
    /// Baked length per animation, in declaration order
    pub animation_lengths: IndexMap<String, usize>,
    channel_maps: HashMap<usize, ColorChannelMap>,
    pub warnings: Vec<ConversionWarning>,
}

impl ConversionContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a node whose uid is derived from its arena slot.
    pub fn add_node(&mut self, name: &str, node_type: NodeType) -> NodeId {
        let id = self.nodes.len();
        self.insert(id, id as i32 + 1, name, node_type)
    }

    /// Create a node with an existing uid.
    pub fn add_node_with_uid(&mut self, uid: i32, name: &str, node_type: NodeType) -> NodeId {
        let id = self.nodes.len();
        self.insert(id, uid, name, node_type)
    }

    fn insert(&mut self, id: NodeId, uid: i32, name: &str, node_type: NodeType) -> NodeId {
        self.nodes.push(ConvNode::new(id, uid, name, node_type));
        self.by_uid.insert(uid, id);
        id
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: NodeId) -> ConvertResult<&ConvNode> {
        self.nodes
            .get(id)
            .ok_or_else(|| ConvertError::LookupMiss(format!("node id {}", id)))
    }

    pub fn node_mut(&mut self, id: NodeId) -> ConvertResult<&mut ConvNode> {
        self.nodes
            .get_mut(id)
            .ok_or_else(|| ConvertError::LookupMiss(format!("node id {}", id)))
    }

    pub fn bind_gltf(&mut self, gltf_index: usize, id: NodeId) {
        self.by_gltf.insert(gltf_index, id);
        if let Some(node) = self.nodes.get_mut(id) {
            node.gltf_index = Some(gltf_index);
        }
    }

    pub fn by_gltf(&self, gltf_index: usize) -> ConvertResult<NodeId> {
        self.by_gltf
            .get(&gltf_index)
            .copied()
            .ok_or_else(|| ConvertError::LookupMiss(format!("glTF node {}", gltf_index)))
    }

    pub fn by_uid(&self, uid: i32) -> ConvertResult<NodeId> {
        self.by_uid
            .get(&uid)
            .copied()
            .ok_or_else(|| ConvertError::LookupMiss(format!("uid {}", uid)))
    }

    /// First node of the given type in arena order.
    pub fn find_type(&self, node_type: NodeType) -> Option<NodeId> {
        self.nodes
            .iter()
            .find(|n| n.node_type == node_type)
            .map(|n| n.id)
    }

    /// Append `child` to `parent` in the output tree.
    pub fn attach(&mut self, parent: NodeId, child: NodeId) -> ConvertResult<()> {
        self.node(child)?;
        self.node_mut(parent)?.children.push(child);
        self.node_mut(child)?.parent = Some(parent);
        Ok(())
    }

    pub fn register_channel_map(&mut self, material: usize, map: ColorChannelMap) {
        self.channel_maps.insert(material, map);
    }

    /// Channel map of a glTF material; a missing map is fatal.
    pub fn channel_map(&self, node: &str, material: usize) -> ConvertResult<ColorChannelMap> {
        self.channel_maps.get(&material).copied().ok_or_else(|| {
            ConvertError::MalformedMaterialReference {
                node: node.to_string(),
                material,
            }
        })
    }

    /// Record a recoverable condition.
    pub fn warn(&mut self, warning: ConversionWarning) {
        log::warn!("{}", warning);
        self.warnings.push(warning);
    }

    /// Move the output subtree at `id` into USF records.
    ///
    /// World transforms are kept; local transforms are re-derived from the
    /// output parent so reparented nodes keep their placement. Baked samples
    /// are moved from the source parent's rest frame into the output parent's.
    pub fn build_usf_tree(&mut self, id: NodeId, parent_world: Mat4) -> ConvertResult<UsfNode> {
        let source_parent_world = match self.node(id)?.source_parent {
            Some(parent) => self.node(parent)?.world,
            None => Mat4::IDENTITY,
        };
        let node = self.node_mut(id)?;
        let world = node.world;
        let local = parent_world.inverse() * world;
        let children = node.children.clone();

        let mut out = UsfNode::new(node.uid, node.name.clone());
        out.model_name = std::mem::take(&mut node.model_name);
        out.affixes = std::mem::take(&mut node.affixes);
        out.properties = std::mem::take(&mut node.properties);
        out.source_id = std::mem::take(&mut node.source_id);
        out.maya_node_id = std::mem::take(&mut node.maya_node_id);
        out.mesh = node.mesh.take();
        out.animation = node.animation.take();
        if let Some(animation) = out.animation.as_mut() {
            if !source_parent_world.abs_diff_eq(parent_world, 1e-5) {
                reframe_animation(animation, parent_world.inverse() * source_parent_world);
            }
        }
        out.actor = node.actor.take();
        out.local = local;
        out.world = world;
        out.local_original = local;

        for child in children {
            out.children.push(self.build_usf_tree(child, world)?);
        }
        Ok(out)
    }
}

/// Premultiply every baked sample by `frame`.
fn reframe_animation(animation: &mut UsfAnimation, frame: Mat4) {
    let samples = animation
        .translation
        .iter_mut()
        .zip(animation.rotation.iter_mut())
        .zip(animation.scale.iter_mut());
    for ((translation, rotation), scale) in samples {
        let local = Mat4::from_scale_rotation_translation(*scale, *rotation, *translation);
        let (s, r, t) = (frame * local).to_scale_rotation_translation();
        *translation = t;
        *rotation = r.normalize();
        *scale = s;
    }
}
