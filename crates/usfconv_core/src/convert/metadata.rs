//! USF metadata carried through glTF `extras`, plus the node metadata rules
//! applied on import: affix templates, mesh target hints, region speculation
//! and material presets.
//!
//! Everything lives under an `"usf"` key so foreign extras are left alone.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::classify::NodeType;
use super::context::ConversionContext;
use super::ConvertResult;
use crate::config::ConverterConfig;
use crate::gltf::GltfDocument;
use crate::usf::{
    ActorDescriptor, AnimationDescriptor, ColorChannelMap, MaterialPreset, PropertySection,
    UsfMaterial, UsfMesh, UsfNode,
};

pub const EXTRAS_KEY: &str = "usf";

/// Deserialize `extras.usf`, treating absent or malformed data as empty.
fn from_extras<T: for<'de> Deserialize<'de> + Default>(extras: Option<&Value>) -> T {
    let Some(value) = extras.and_then(|v| v.get(EXTRAS_KEY)) else {
        return T::default();
    };
    serde_json::from_value(value.clone()).unwrap_or_else(|err| {
        log::warn!("Ignoring malformed usf extras: {}", err);
        T::default()
    })
}

fn to_extras<T: Serialize>(data: &T) -> Value {
    json!({ EXTRAS_KEY: data })
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NodeExtras {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uid: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_type: Option<String>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub affixes: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub properties: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub model_name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub maya_node_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actor: Option<ActorExtras>,
}

impl NodeExtras {
    pub fn read(extras: Option<&Value>) -> Self {
        from_extras(extras)
    }

    pub fn to_value(&self) -> Value {
        to_extras(self)
    }

    pub fn type_hint(&self) -> Option<NodeType> {
        self.node_type.as_deref().and_then(NodeType::parse)
    }

    /// Extras describing a USF node.
    pub fn from_node(node: &UsfNode, node_type: Option<NodeType>) -> Self {
        Self {
            uid: Some(node.uid),
            node_type: node_type.map(|t| t.as_str().to_string()),
            affixes: node.affixes.clone(),
            properties: node.properties.to_string(),
            model_name: node.model_name.clone(),
            maya_node_id: node.maya_node_id.clone(),
            actor: node.actor.as_ref().map(ActorExtras::from_descriptor),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActorExtras {
    pub name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub properties: String,
    pub animations: Vec<AnimationExtras>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnimationExtras {
    pub name: String,
    pub begin: i32,
    pub end: i32,
    pub duration: f32,
}

impl ActorExtras {
    pub fn from_descriptor(actor: &ActorDescriptor) -> Self {
        Self {
            name: actor.name.clone(),
            properties: actor.properties.to_string(),
            animations: actor
                .animations
                .iter()
                .map(|a| AnimationExtras {
                    name: a.name.clone(),
                    begin: a.begin,
                    end: a.end,
                    duration: a.duration,
                })
                .collect(),
        }
    }

    pub fn to_descriptor(&self) -> ActorDescriptor {
        ActorDescriptor {
            name: self.name.clone(),
            properties: PropertySection::parse(&self.properties),
            animations: self
                .animations
                .iter()
                .map(|a| AnimationDescriptor {
                    name: a.name.clone(),
                    begin: a.begin,
                    end: a.end,
                    duration: a.duration,
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MaterialExtras {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub texture_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preset: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color_channel_map: Option<Vec<i32>>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub properties: String,
    pub vertex_color_usage: u32,
}

impl MaterialExtras {
    pub fn read(extras: Option<&Value>) -> Self {
        from_extras(extras)
    }

    pub fn from_material(material: &UsfMaterial) -> Self {
        Self {
            texture_name: material.texture_name.clone(),
            preset: Some(material.preset.as_str().to_string()),
            color_channel_map: Some(material.channel_map.slots().to_vec()),
            properties: material.properties.to_string(),
            vertex_color_usage: material.vertex_color_usage,
        }
    }

    pub fn to_value(&self) -> Value {
        to_extras(self)
    }

    pub fn channel_map(&self) -> ColorChannelMap {
        self.color_channel_map
            .as_deref()
            .map(ColorChannelMap::from_slots)
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MeshExtras {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub uv_sets: Vec<String>,
    pub skinning_method: u8,
}

impl MeshExtras {
    pub fn read(extras: Option<&Value>) -> Self {
        from_extras(extras)
    }

    pub fn from_mesh(mesh: &UsfMesh) -> Self {
        Self {
            uv_sets: mesh.uv_sets.iter().map(|s| s.name.clone()).collect(),
            skinning_method: mesh.skinning_method,
        }
    }

    pub fn to_value(&self) -> Value {
        to_extras(self)
    }
}

/// Material preset implied by a node's type.
pub fn preset_for(node_type: NodeType) -> MaterialPreset {
    match node_type {
        NodeType::ClothSkin | NodeType::ClothSim => MaterialPreset::Cloth,
        NodeType::Decal => MaterialPreset::Decal,
        NodeType::Cdt => MaterialPreset::Cdt,
        _ => MaterialPreset::Default,
    }
}

/// Register the channel map of every glTF material.
pub fn register_materials(ctx: &mut ConversionContext, doc: &GltfDocument) {
    for i in 0..doc.material_count() {
        let map = MaterialExtras::read(doc.material_extras(i).as_ref()).channel_map();
        ctx.register_channel_map(i, map);
    }
}

/// USF material for a glTF material used by a node of `node_type`.
pub fn build_material(
    doc: &GltfDocument,
    material: Option<usize>,
    node_type: NodeType,
) -> ConvertResult<UsfMaterial> {
    let Some(index) = material else {
        return Ok(UsfMaterial {
            name: "default".to_string(),
            preset: preset_for(node_type),
            ..Default::default()
        });
    };

    let name = doc
        .material_name(index)?
        .unwrap_or_else(|| format!("material_{}", index));
    let extras = MaterialExtras::read(doc.material_extras(index).as_ref());
    Ok(UsfMaterial {
        name,
        texture_name: extras.texture_name.clone(),
        preset: extras
            .preset
            .as_deref()
            .and_then(MaterialPreset::parse)
            .unwrap_or_else(|| preset_for(node_type)),
        channel_map: extras.channel_map(),
        vertex_color_usage: extras.vertex_color_usage,
        properties: PropertySection::parse(&extras.properties),
    })
}

/// Fill affixes from templates and set the mesh target and region hints.
pub fn apply_node_metadata(ctx: &mut ConversionContext, config: &ConverterConfig) {
    for node in &mut ctx.nodes {
        if node.affixes.is_empty() {
            if let Some(affixes) =
                config.render_affixes(node.node_type.as_str(), &node.name, &node.group)
            {
                node.affixes = affixes;
            }
        }
        if node.node_type.is_mesh() {
            node.properties.set("target", "mesh");
        }
        if node.properties.get("region").is_none() {
            if let Some(region) = config.speculate_region(&node.name) {
                node.properties.set("region", region.as_str());
            }
        }
    }
}
