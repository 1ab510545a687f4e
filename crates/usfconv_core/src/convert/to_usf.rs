//! glTF → USF pipeline.

use std::collections::HashSet;

use usfconv_math::Mat4;

use super::animation::{bake_animations, measure_animation_lengths};
use super::classify::{classify, NodeFacts, NodeType};
use super::context::{ConversionContext, NodeId};
use super::group::{collect_groups, group_name};
use super::hierarchy::{assign_source_ids, build_character_tree, build_prop_tree};
use super::metadata::{
    apply_node_metadata, build_material, register_materials, MeshExtras, NodeExtras,
};
use super::vertex::flatten_primitives;
use super::{AssetKind, Conversion, ConversionWarning, ConvertResult, ImportOptions};
use crate::config::ConverterConfig;
use crate::gltf::GltfDocument;
use crate::usf::{PropertySection, UsfScene};

/// Convert an imported glTF document into a USF scene.
pub fn gltf_to_usf(
    doc: &GltfDocument,
    config: &ConverterConfig,
    options: &ImportOptions,
) -> ConvertResult<Conversion<UsfScene>> {
    let mut ctx = ConversionContext::new();

    let roots = create_nodes(&mut ctx, doc, config)?;
    log::info!("Classified {} nodes", ctx.len());

    collect_groups(&mut ctx);
    let kind = resolve_kind(&ctx, options.kind);
    log::info!("Rebuilding as {:?}", kind);

    register_materials(&mut ctx, doc);
    apply_node_metadata(&mut ctx, config);
    build_meshes(&mut ctx, doc)?;

    measure_animation_lengths(&mut ctx, doc)?;
    let descriptors = bake_animations(&mut ctx, doc)?;

    let scaffold = match kind {
        AssetKind::Prop => build_prop_tree(&mut ctx, doc, &roots)?,
        _ => build_character_tree(&mut ctx, doc, &roots, options.hierarchy.as_ref())?,
    };
    if !descriptors.is_empty() {
        if let Some(actor) = ctx.node_mut(scaffold.actor)?.actor.as_mut() {
            actor.animations = descriptors;
        }
    }

    assign_source_ids(&mut ctx, scaffold.root)?;
    let root = ctx.build_usf_tree(scaffold.root, Mat4::IDENTITY)?;

    let mut scene = UsfScene::new("");
    scene.root = Some(root);
    log::info!(
        "Built USF scene: {} nodes, {} warnings",
        scene.node_count(),
        ctx.warnings.len()
    );

    Ok(Conversion {
        output: scene,
        warnings: ctx.warnings,
    })
}

/// Create and classify a conversion node for every glTF node reachable from
/// the scene roots. Returns the root node ids.
fn create_nodes(
    ctx: &mut ConversionContext,
    doc: &GltfDocument,
    config: &ConverterConfig,
) -> ConvertResult<Vec<NodeId>> {
    let joints = doc.joint_nodes();
    let mut roots = Vec::new();
    for index in doc.scene_roots() {
        if let Some(id) = create_node(ctx, doc, config, &joints, index, None, Mat4::IDENTITY)? {
            roots.push(id);
        }
    }
    Ok(roots)
}

fn create_node(
    ctx: &mut ConversionContext,
    doc: &GltfDocument,
    config: &ConverterConfig,
    joints: &HashSet<usize>,
    index: usize,
    parent: Option<NodeId>,
    parent_world: Mat4,
) -> ConvertResult<Option<NodeId>> {
    if ctx.by_gltf(index).is_ok() {
        log::warn!("glTF node {} is reachable twice; keeping the first", index);
        return Ok(None);
    }

    let extras = NodeExtras::read(doc.node_extras(index).as_ref());
    let name = doc.node_name(index);
    let skin = doc.node_skin(index)?;
    let facts = NodeFacts {
        has_mesh: doc.node_mesh(index)?.is_some(),
        has_skin: skin.is_some(),
        is_joint: joints.contains(&index),
        has_actor: extras.actor.is_some(),
        type_hint: extras.type_hint(),
    };
    let node_type = classify(&name, &facts);
    let world = parent_world * doc.local_matrix(index)?;

    let id = ctx.add_node(&name, node_type);
    ctx.bind_gltf(index, id);
    {
        let node = ctx.node_mut(id)?;
        node.group = group_name(&name, config);
        node.source_parent = parent;
        node.world = world;
        node.skin = skin;
        node.affixes = extras.affixes.clone();
        node.properties = PropertySection::parse(&extras.properties);
        node.model_name = extras.model_name.clone();
        node.maya_node_id = extras.maya_node_id.clone();
        node.actor = extras.actor.as_ref().map(|a| a.to_descriptor());
    }
    if let Some(parent) = parent {
        ctx.node_mut(parent)?.source_children.push(id);
    }
    log::debug!("{} -> {}", name, node_type);

    for child in doc.children(index)? {
        create_node(ctx, doc, config, joints, child, Some(id), world)?;
    }
    Ok(Some(id))
}

fn resolve_kind(ctx: &ConversionContext, kind: AssetKind) -> AssetKind {
    match kind {
        AssetKind::Auto => {
            let character = ctx.nodes.iter().any(|n| {
                matches!(
                    n.node_type,
                    NodeType::Skin | NodeType::ClothSkin | NodeType::Char | NodeType::CharRoot
                )
            });
            if character {
                AssetKind::Character
            } else {
                AssetKind::Prop
            }
        }
        explicit => explicit,
    }
}

/// Sims, decals and LODs of decal families may have a blank primary set.
fn swap_allowed(ctx: &ConversionContext, id: NodeId) -> bool {
    let node = &ctx.nodes[id];
    match node.node_type {
        NodeType::ClothSim | NodeType::Decal => true,
        NodeType::Lod => ctx
            .groups
            .get(&node.group)
            .is_some_and(|g| g.decal.is_some()),
        _ => false,
    }
}

/// Flatten the mesh of every node that has one.
fn build_meshes(ctx: &mut ConversionContext, doc: &GltfDocument) -> ConvertResult<()> {
    let mut count = 0;
    for id in 0..ctx.len() {
        let Some(gltf_index) = ctx.nodes[id].gltf_index else {
            continue;
        };
        let Some(mesh_index) = doc.node_mesh(gltf_index)? else {
            continue;
        };
        let name = ctx.nodes[id].name.clone();
        let node_type = ctx.nodes[id].node_type;

        let primitive_count = doc.primitive_count(mesh_index)?;
        let primitives = (0..primitive_count)
            .map(|p| doc.read_primitive(mesh_index, p))
            .collect::<Result<Vec<_>, _>>()?;

        let flat = flatten_primitives(
            &name,
            &primitives,
            |material| ctx.channel_map(&name, material),
            swap_allowed(ctx, id),
        )?;
        if flat.swapped_colors {
            ctx.warn(ConversionWarning::ColorSetSwapped(name.clone()));
        }

        let mut mesh = flat.mesh;
        let extras = MeshExtras::read(doc.mesh_extras(mesh_index).as_ref());
        for (set, uv_name) in mesh.uv_sets.iter_mut().zip(&extras.uv_sets) {
            set.name = uv_name.clone();
        }
        mesh.skinning_method = extras.skinning_method;
        mesh.materials = flat
            .material_slots
            .iter()
            .map(|&m| build_material(doc, m, node_type))
            .collect::<ConvertResult<Vec<_>>>()?;

        log::debug!(
            "Mesh '{}': {} triangles, {} materials",
            name,
            mesh.triangle_count(),
            mesh.materials.len()
        );
        ctx.node_mut(id)?.mesh = Some(mesh);
        count += 1;
    }
    log::info!("Built {} meshes", count);
    Ok(())
}
