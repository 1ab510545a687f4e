//! USF → glTF pipeline.

use std::collections::HashMap;

use usfconv_math::Transform;

use super::animation::{default_descriptors, unbake_animation};
use super::classify::{reserved_type, NodeType};
use super::context::ConversionContext;
use super::metadata::{MaterialExtras, MeshExtras, NodeExtras};
use super::skin::skin_joints;
use super::vertex::index_mesh;
use super::{Conversion, ConvertError, ConvertResult};
use crate::gltf::{GltfBuilder, GltfDocument};
use crate::usf::{AnimationDescriptor, UsfNode, UsfScene};

/// Generator string written into exported assets.
pub const GENERATOR: &str = concat!("usfconv ", env!("CARGO_PKG_VERSION"));

/// Convert a USF scene into a glTF document.
pub fn usf_to_gltf(scene: &UsfScene) -> ConvertResult<Conversion<GltfDocument>> {
    let root = scene
        .root
        .as_ref()
        .ok_or_else(|| ConvertError::LookupMiss("scene has no root node".to_string()))?;

    let mut ctx = ConversionContext::new();
    let mut doc = GltfBuilder::new(GENERATOR);

    // Pass 1: node tree and extras, so skins can reference any joint.
    let mut order = Vec::new();
    create_nodes(&mut ctx, &mut doc, root, None, None, &mut order)?;
    let uid_to_gltf: HashMap<i32, usize> = ctx
        .nodes
        .iter()
        .filter_map(|n| n.gltf_index.map(|g| (n.uid, g)))
        .collect();

    let mut nodes = Vec::with_capacity(order.len());
    root.walk(&mut |n| nodes.push(n));

    // Pass 2: payloads.
    let descriptors = animation_table(root);
    let mut mesh_count = 0;
    let mut animated = 0;
    for (node, &index) in nodes.iter().zip(&order) {
        if add_node_mesh(&mut doc, node, index, &uid_to_gltf)? {
            mesh_count += 1;
        }
        if let Some(anim) = &node.animation {
            let rest = Transform::from_matrix(node.local);
            unbake_animation(&mut doc, index, anim, rest, &descriptors)?;
            animated += 1;
        }
    }

    log::info!(
        "Built glTF document: {} nodes, {} meshes, {} animations on {} nodes",
        doc.node_count(),
        mesh_count,
        descriptors.len(),
        animated
    );
    Ok(Conversion {
        output: doc.finish()?,
        warnings: ctx.warnings,
    })
}

/// Scaffold type worth recording in extras so re-import can find it again.
fn scaffold_hint(node: &UsfNode, parent: Option<NodeType>, is_root: bool) -> Option<NodeType> {
    if node.actor.is_some() {
        return Some(NodeType::Actor);
    }
    if let Some(reserved) = reserved_type(&node.name.to_lowercase()) {
        return Some(reserved);
    }
    if is_root {
        return Some(NodeType::Root);
    }
    if parent == Some(NodeType::SkinnedGeom) && node.mesh.is_none() {
        return Some(NodeType::Group);
    }
    None
}

/// Create glTF nodes depth-first, recording their indices in pre-order.
fn create_nodes(
    ctx: &mut ConversionContext,
    doc: &mut GltfBuilder,
    node: &UsfNode,
    parent: Option<usize>,
    parent_type: Option<NodeType>,
    order: &mut Vec<usize>,
) -> ConvertResult<()> {
    let hint = scaffold_hint(node, parent_type, parent.is_none());
    let index = doc.add_node(&node.name, node.local, parent)?;
    doc.set_node_extras(index, NodeExtras::from_node(node, hint).to_value())?;

    let id = ctx.add_node_with_uid(node.uid, &node.name, hint.unwrap_or(NodeType::Locator));
    ctx.bind_gltf(index, id);
    order.push(index);

    for child in &node.children {
        create_nodes(ctx, doc, child, Some(index), hint, order)?;
    }
    Ok(())
}

/// Animation table of the first actor, or one span over the whole spline.
fn animation_table(root: &UsfNode) -> Vec<AnimationDescriptor> {
    let mut actor = None;
    let mut frames = 0;
    root.walk(&mut |n| {
        if actor.is_none() {
            actor = n.actor.as_ref();
        }
        if let Some(anim) = &n.animation {
            frames = frames.max(anim.frame_count());
        }
    });
    match actor {
        Some(actor) if !actor.animations.is_empty() => actor.animations.clone(),
        _ => default_descriptors(frames),
    }
}

/// Materials, mesh and skin for one node. Returns false when the node has
/// no mesh or a mesh without triangles, which glTF cannot represent.
fn add_node_mesh(
    doc: &mut GltfBuilder,
    node: &UsfNode,
    index: usize,
    uid_to_gltf: &HashMap<i32, usize>,
) -> ConvertResult<bool> {
    let Some(mesh) = &node.mesh else {
        return Ok(false);
    };

    let material_base = doc.material_count();
    let primitives = index_mesh(&node.name, mesh, material_base)?;
    if primitives.is_empty() {
        log::warn!("Mesh on '{}' has no triangles; skipped", node.name);
        return Ok(false);
    }
    for material in &mesh.materials {
        let extras = MaterialExtras::from_material(material).to_value();
        doc.add_material(&material.name, Some(extras))?;
    }

    let extras = MeshExtras::from_mesh(mesh).to_value();
    let mesh_index = doc.add_mesh(&node.name, &primitives, Some(extras))?;
    doc.attach_mesh(index, mesh_index)?;

    if mesh.is_skinned() {
        let (joints, inverse_binds) = skin_joints(&mesh.bones, uid_to_gltf)?;
        let skin = doc.add_skin(&node.name, joints, &inverse_binds);
        doc.attach_skin(index, skin)?;
    }
    log::debug!("Exported mesh '{}' ({} triangles)", node.name, mesh.triangle_count());
    Ok(true)
}
