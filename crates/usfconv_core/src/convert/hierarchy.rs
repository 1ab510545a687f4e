//! Hierarchy reconstruction for imported scenes.
//!
//! Characters get a fixed scaffold:
//!
//! ```text
//! root
//! ├── skinned_geometry   one group container per skin family
//! ├── dx
//! ├── actor
//! └── char_root          the free node graph, plus merged sidecar nodes
//! ```
//!
//! Props hang the free node graph under a single actor node.

use std::collections::HashMap;

use usfconv_math::Mat4;

use super::classify::{classify, NodeFacts, NodeType};
use super::context::{ConversionContext, NodeId};
use super::skin::bind_bones;
use super::{ConversionWarning, ConvertResult};
use crate::gltf::GltfDocument;
use crate::usf::{ActorDescriptor, UsfNode, UsfScene};

/// Key nodes of a rebuilt tree.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Scaffold {
    pub root: NodeId,
    pub actor: NodeId,
}

/// Existing node of a scaffold type, or a synthesized one.
fn require(ctx: &mut ConversionContext, node_type: NodeType, name: &str) -> NodeId {
    if let Some(id) = ctx.find_type(node_type) {
        return id;
    }
    ctx.warn(ConversionWarning::MissingRequiredNode(name.to_string()));
    ctx.add_node(name, node_type)
}

fn require_actor(ctx: &mut ConversionContext) -> NodeId {
    let actor = require(ctx, NodeType::Actor, "actor");
    let node = &mut ctx.nodes[actor];
    if node.actor.is_none() {
        node.actor = Some(ActorDescriptor {
            name: node.name.clone(),
            ..Default::default()
        });
    }
    actor
}

/// Attach `child` under `parent` and bind its mesh to its skeleton.
fn attach_bound(
    ctx: &mut ConversionContext,
    doc: &GltfDocument,
    parent: NodeId,
    child: NodeId,
) -> ConvertResult<()> {
    ctx.attach(parent, child)?;
    let node = ctx.node(child)?;
    if let (Some(skin), true) = (node.skin, node.mesh.is_some()) {
        let bones = bind_bones(ctx, doc, skin)?;
        if let Some(mesh) = ctx.node_mut(child)?.mesh.as_mut() {
            mesh.bones = bones;
        }
    }
    Ok(())
}

/// Nodes placed by skin-group reassembly rather than by the free walk.
/// Duplicates that lost their group slot stay in the free walk.
fn is_excluded(ctx: &ConversionContext, id: NodeId) -> bool {
    let node = &ctx.nodes[id];
    let Some(group) = ctx.groups.get(&node.group) else {
        return node.node_type == NodeType::ClothSim;
    };
    match node.node_type {
        NodeType::Skin => group.skin == Some(id),
        NodeType::ClothSkin => group.cloth == Some(id),
        NodeType::Decal => group.decal == Some(id),
        NodeType::Lod => group.has_render_variant() && group.lods.contains(&id),
        NodeType::ClothSim => group.sim == Some(id) && group.owns_sim(),
        _ => false,
    }
}

/// Depth-first walk of imported nodes, attaching each under `parent`.
/// Scaffold and excluded nodes are skipped but their children are walked
/// into the same parent.
fn attach_nodes(
    ctx: &mut ConversionContext,
    doc: &GltfDocument,
    parent: NodeId,
    sources: &[NodeId],
    exclude: bool,
) -> ConvertResult<()> {
    for &id in sources {
        let node = ctx.node(id)?;
        let children = node.source_children.clone();
        let skipped = node.node_type.is_scaffold() || (exclude && is_excluded(ctx, id));
        if skipped {
            attach_nodes(ctx, doc, parent, &children, exclude)?;
        } else {
            attach_bound(ctx, doc, parent, id)?;
            attach_nodes(ctx, doc, id, &children, exclude)?;
        }
    }
    Ok(())
}

/// One group container per skin family under `skinned`.
fn build_skin_groups(
    ctx: &mut ConversionContext,
    doc: &GltfDocument,
    skinned: NodeId,
) -> ConvertResult<()> {
    let families: Vec<_> = ctx
        .groups
        .iter()
        .filter(|(_, g)| g.is_skin_family())
        .map(|(name, g)| (name.clone(), g.clone()))
        .collect();

    for (name, group) in families {
        let container = ctx.add_node(&name, NodeType::Group);
        ctx.nodes[container].group = name.clone();
        ctx.attach(skinned, container)?;

        let mut lod_root = None;
        for id in [group.cloth, group.skin, group.decal].into_iter().flatten() {
            attach_bound(ctx, doc, container, id)?;
            lod_root.get_or_insert(id);
        }
        if let Some(lod_root) = lod_root {
            for &lod in &group.lods {
                attach_bound(ctx, doc, lod_root, lod)?;
            }
        }
        if let (Some(sim), true) = (group.sim, group.owns_sim()) {
            attach_bound(ctx, doc, container, sim)?;
        }

        if ctx.nodes[container].children.is_empty() {
            ctx.warn(ConversionWarning::EmptySkinGroup(name));
        }
    }
    Ok(())
}

/// Rebuild a character: scaffold, skin groups, free node graph under the
/// character root, then the optional sidecar hierarchy.
pub fn build_character_tree(
    ctx: &mut ConversionContext,
    doc: &GltfDocument,
    roots: &[NodeId],
    hierarchy: Option<&UsfScene>,
) -> ConvertResult<Scaffold> {
    let root = require(ctx, NodeType::Root, "root");
    let skinned = match ctx.find_type(NodeType::SkinnedGeom) {
        Some(id) => id,
        None => ctx.add_node("skinned_geometry", NodeType::SkinnedGeom),
    };
    let dx = require(ctx, NodeType::Dx, "dx");
    let actor = require_actor(ctx);
    let char_root = require(ctx, NodeType::CharRoot, "char_root");
    for id in [skinned, dx, actor, char_root] {
        ctx.attach(root, id)?;
    }

    build_skin_groups(ctx, doc, skinned)?;
    attach_nodes(ctx, doc, char_root, roots, true)?;

    if let Some(source) = hierarchy.and_then(|scene| scene.root.as_ref()) {
        let source = source.find_by_name("char_root").unwrap_or(source);
        log::info!("Merging sidecar hierarchy from '{}'", source.name);
        merge_nodes(ctx, char_root, source)?;
    }

    Ok(Scaffold { root, actor })
}

/// Rebuild a prop: every imported node under a single actor.
pub fn build_prop_tree(
    ctx: &mut ConversionContext,
    doc: &GltfDocument,
    roots: &[NodeId],
) -> ConvertResult<Scaffold> {
    let actor = require_actor(ctx);
    attach_nodes(ctx, doc, actor, roots, false)?;
    Ok(Scaffold { root: actor, actor })
}

/// Union `source`'s children into `target` by name: matching children are
/// merged recursively, missing ones are copied with fresh uids.
pub fn merge_nodes(
    ctx: &mut ConversionContext,
    target: NodeId,
    source: &UsfNode,
) -> ConvertResult<()> {
    for child in &source.children {
        let existing = ctx
            .node(target)?
            .children
            .iter()
            .copied()
            .find(|&c| ctx.nodes[c].name == child.name);
        match existing {
            Some(id) => merge_nodes(ctx, id, child)?,
            None => {
                let parent_world = ctx.node(target)?.world;
                let mut uids = HashMap::new();
                let mut copied = Vec::new();
                let id = copy_subtree(ctx, child, parent_world, &mut uids, &mut copied)?;
                ctx.attach(target, id)?;
                remap_bones(ctx, &copied, &uids);
                log::debug!("Merged '{}' ({} nodes) from sidecar", child.name, copied.len());
            }
        }
    }
    Ok(())
}

fn copy_subtree(
    ctx: &mut ConversionContext,
    source: &UsfNode,
    parent_world: Mat4,
    uids: &mut HashMap<i32, i32>,
    copied: &mut Vec<NodeId>,
) -> ConvertResult<NodeId> {
    let facts = NodeFacts {
        has_mesh: source.mesh.is_some(),
        has_skin: source.mesh.as_ref().is_some_and(|m| m.is_skinned()),
        has_actor: source.actor.is_some(),
        ..Default::default()
    };
    let id = ctx.add_node(&source.name, classify(&source.name, &facts));
    let world = parent_world * source.local;
    {
        let node = ctx.node_mut(id)?;
        node.world = world;
        node.affixes = source.affixes.clone();
        node.properties = source.properties.clone();
        node.model_name = source.model_name.clone();
        node.maya_node_id = source.maya_node_id.clone();
        node.mesh = source.mesh.clone();
        node.animation = source.animation.clone();
        node.actor = source.actor.clone();
        uids.insert(source.uid, node.uid);
    }
    copied.push(id);

    for child in &source.children {
        let child_id = copy_subtree(ctx, child, world, uids, copied)?;
        ctx.attach(id, child_id)?;
    }
    Ok(id)
}

/// Point copied bones at the copied joints where the joint came along.
fn remap_bones(ctx: &mut ConversionContext, copied: &[NodeId], uids: &HashMap<i32, i32>) {
    for &id in copied {
        let Some(mesh) = ctx.nodes[id].mesh.as_mut() else {
            continue;
        };
        for bone in &mut mesh.bones {
            if let Some(&uid) = uids.get(&bone.node_uid) {
                bone.node_uid = uid;
            }
        }
    }
}

/// Assign `|`-joined path identifiers top-down from `root`.
///
/// Inside a group container every segment is namespaced by the container's
/// first child: `parent|first:name`.
pub fn assign_source_ids(ctx: &mut ConversionContext, root: NodeId) -> ConvertResult<()> {
    let name = ctx.node(root)?.name.clone();
    ctx.node_mut(root)?.source_id = format!("|{}", name);
    assign_children(ctx, root, None)
}

fn assign_children(
    ctx: &mut ConversionContext,
    parent: NodeId,
    namespace: Option<&str>,
) -> ConvertResult<()> {
    let parent_id = ctx.node(parent)?.source_id.clone();
    let children = ctx.node(parent)?.children.clone();
    for child in children {
        let node = ctx.node(child)?;
        let namespace = if node.node_type == NodeType::Group {
            node.children.first().map(|&f| ctx.nodes[f].name.clone())
        } else {
            namespace.map(str::to_string)
        };
        let source_id = match &namespace {
            Some(ns) => format!("{}|{}:{}", parent_id, ns, node.name),
            None => format!("{}|{}", parent_id, node.name),
        };
        ctx.node_mut(child)?.source_id = source_id;
        assign_children(ctx, child, namespace.as_deref())?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert::group::{base_group_name, collect_groups};
    use crate::gltf::GltfBuilder;

    fn add(ctx: &mut ConversionContext, name: &str, t: NodeType, parent: Option<NodeId>) -> NodeId {
        let id = ctx.add_node(name, t);
        ctx.nodes[id].group = base_group_name(name);
        if let Some(p) = parent {
            ctx.nodes[p].source_children.push(id);
            ctx.nodes[id].source_parent = Some(p);
        }
        id
    }

    fn names(ctx: &ConversionContext, id: NodeId) -> Vec<&str> {
        ctx.nodes[id]
            .children
            .iter()
            .map(|&c| ctx.nodes[c].name.as_str())
            .collect()
    }

    /// Armature
    /// ├── hips
    /// │   └── spine
    /// ├── Body (skin)
    /// │   └── Body_lod1
    /// ├── Cape (skin), Cape_sim
    /// ├── Helmet (rigid)
    /// └── Helmet_decal
    fn character() -> (ConversionContext, NodeId) {
        let mut ctx = ConversionContext::new();
        let armature = add(&mut ctx, "Armature", NodeType::Locator, None);
        let hips = add(&mut ctx, "hips", NodeType::Bone, Some(armature));
        add(&mut ctx, "spine", NodeType::Bone, Some(hips));
        let body = add(&mut ctx, "Body", NodeType::Skin, Some(armature));
        add(&mut ctx, "Body_lod1", NodeType::Lod, Some(body));
        add(&mut ctx, "Cape", NodeType::Skin, Some(armature));
        add(&mut ctx, "Cape_sim", NodeType::ClothSim, Some(armature));
        add(&mut ctx, "Helmet", NodeType::RigidMesh, Some(armature));
        add(&mut ctx, "Helmet_decal", NodeType::Decal, Some(armature));
        collect_groups(&mut ctx);
        (ctx, armature)
    }

    #[test]
    fn test_character_scaffold() {
        let (mut ctx, armature) = character();
        let doc = GltfBuilder::new("test").finish().unwrap();
        let tree = build_character_tree(&mut ctx, &doc, &[armature], None).unwrap();

        assert_eq!(
            names(&ctx, tree.root),
            ["skinned_geometry", "dx", "actor", "char_root"]
        );
        let missing: Vec<_> = ctx
            .warnings
            .iter()
            .filter(|w| matches!(w, ConversionWarning::MissingRequiredNode(_)))
            .collect();
        assert_eq!(missing.len(), 4);
        assert!(ctx.nodes[tree.actor].actor.is_some());
    }

    #[test]
    fn test_skin_groups_and_exclusions() {
        let (mut ctx, armature) = character();
        let doc = GltfBuilder::new("test").finish().unwrap();
        let tree = build_character_tree(&mut ctx, &doc, &[armature], None).unwrap();

        let skinned = ctx.nodes[tree.root].children[0];
        assert_eq!(names(&ctx, skinned), ["body", "cape", "helmet_decal"]);

        let body_group = ctx.nodes[skinned].children[0];
        assert_eq!(names(&ctx, body_group), ["Body"]);
        let body = ctx.nodes[body_group].children[0];
        assert_eq!(names(&ctx, body), ["Body_lod1"]);

        // Cape was promoted to cloth; its sim is a sibling
        let cape_group = ctx.nodes[skinned].children[1];
        assert_eq!(names(&ctx, cape_group), ["Cape", "Cape_sim"]);

        let char_root = ctx.nodes[tree.root].children[3];
        assert_eq!(names(&ctx, char_root), ["Armature"]);
        assert_eq!(names(&ctx, armature), ["hips", "Helmet"]);
    }

    #[test]
    fn test_duplicate_variants_stay_in_free_walk() {
        let mut ctx = ConversionContext::new();
        let armature = add(&mut ctx, "Armature", NodeType::Locator, None);
        add(&mut ctx, "Cape", NodeType::Skin, Some(armature));
        add(&mut ctx, "cape", NodeType::Skin, Some(armature));
        add(&mut ctx, "Belt_decal", NodeType::Decal, Some(armature));
        add(&mut ctx, "belt_decal", NodeType::Decal, Some(armature));
        collect_groups(&mut ctx);
        let duplicates = ctx
            .warnings
            .iter()
            .filter(|w| matches!(w, ConversionWarning::DuplicateVariant { .. }))
            .count();
        assert_eq!(duplicates, 2);

        let doc = GltfBuilder::new("test").finish().unwrap();
        let tree = build_character_tree(&mut ctx, &doc, &[armature], None).unwrap();

        let skinned = ctx.nodes[tree.root].children[0];
        let cape_group = ctx.nodes[skinned].children[0];
        assert_eq!(names(&ctx, cape_group), ["Cape"]);
        assert_eq!(names(&ctx, armature), ["cape", "belt_decal"]);
    }

    #[test]
    fn test_source_ids_use_group_namespace() {
        let (mut ctx, armature) = character();
        let doc = GltfBuilder::new("test").finish().unwrap();
        let tree = build_character_tree(&mut ctx, &doc, &[armature], None).unwrap();
        assign_source_ids(&mut ctx, tree.root).unwrap();

        let by_name = |name: &str| {
            ctx.nodes
                .iter()
                .filter(|n| n.parent.is_some() || n.id == tree.root)
                .find(|n| n.name == name)
                .map(|n| n.source_id.as_str())
                .unwrap()
        };
        assert_eq!(by_name("root"), "|root");
        assert_eq!(by_name("spine"), "|root|char_root|Armature|hips|spine");
        assert_eq!(by_name("body"), "|root|skinned_geometry|Body:body");
        assert_eq!(by_name("Body"), "|root|skinned_geometry|Body:body|Body:Body");
        assert_eq!(
            by_name("Body_lod1"),
            "|root|skinned_geometry|Body:body|Body:Body|Body:Body_lod1"
        );
        assert_eq!(by_name("Cape_sim"), "|root|skinned_geometry|Cape:cape|Cape:Cape_sim");
    }

    #[test]
    fn test_existing_scaffold_reused() {
        let mut ctx = ConversionContext::new();
        let root = add(&mut ctx, "root", NodeType::Root, None);
        let dx = add(&mut ctx, "dx", NodeType::Dx, Some(root));
        let actor = add(&mut ctx, "hero", NodeType::Actor, Some(root));
        let char_root = add(&mut ctx, "char_root", NodeType::CharRoot, Some(root));
        add(&mut ctx, "hips", NodeType::Bone, Some(char_root));
        collect_groups(&mut ctx);

        let doc = GltfBuilder::new("test").finish().unwrap();
        let tree = build_character_tree(&mut ctx, &doc, &[root], None).unwrap();
        assert_eq!(tree.root, root);
        assert_eq!(tree.actor, actor);
        assert!(ctx.warnings.is_empty());
        assert_eq!(names(&ctx, root), ["skinned_geometry", "dx", "hero", "char_root"]);
        assert_eq!(names(&ctx, char_root), ["hips"]);
        assert!(ctx.nodes[dx].children.is_empty());
    }

    #[test]
    fn test_prop_tree_keeps_everything() {
        let mut ctx = ConversionContext::new();
        let gun = add(&mut ctx, "Gun", NodeType::RigidMesh, None);
        add(&mut ctx, "Gun_lod1", NodeType::Lod, Some(gun));
        add(&mut ctx, "Strap", NodeType::Skin, Some(gun));
        add(&mut ctx, "muzzle", NodeType::Locator, Some(gun));
        collect_groups(&mut ctx);

        let doc = GltfBuilder::new("test").finish().unwrap();
        let tree = build_prop_tree(&mut ctx, &doc, &[gun]).unwrap();
        assert_eq!(tree.root, tree.actor);
        assert_eq!(names(&ctx, tree.actor), ["Gun"]);
        assert_eq!(names(&ctx, gun), ["Gun_lod1", "Strap", "muzzle"]);
    }

    #[test]
    fn test_merge_appends_missing_children() {
        let mut ctx = ConversionContext::new();
        let char_root = ctx.add_node("char_root", NodeType::CharRoot);
        let spine = ctx.add_node("spine", NodeType::Bone);
        ctx.attach(char_root, spine).unwrap();

        let mut sidecar_spine = UsfNode::new(50, "spine");
        sidecar_spine.children.push(UsfNode::new(51, "extra_bone"));
        let mut sidecar = UsfNode::new(49, "char_root");
        sidecar.children.push(sidecar_spine);

        merge_nodes(&mut ctx, char_root, &sidecar).unwrap();

        assert_eq!(names(&ctx, char_root), ["spine"]);
        assert_eq!(names(&ctx, spine), ["extra_bone"]);
        let extra = ctx.nodes[spine].children[0];
        assert_ne!(ctx.nodes[extra].uid, 51);
        assert_eq!(ctx.by_uid(ctx.nodes[extra].uid).unwrap(), extra);

        // Merging again adds nothing
        merge_nodes(&mut ctx, char_root, &sidecar).unwrap();
        assert_eq!(names(&ctx, spine), ["extra_bone"]);
    }

    #[test]
    fn test_merge_remaps_copied_bones() {
        use crate::usf::{Bone, UsfMesh};

        let mut ctx = ConversionContext::new();
        let char_root = ctx.add_node("char_root", NodeType::CharRoot);

        let mut prop = UsfNode::new(80, "prop");
        let mut mesh_node = UsfNode::new(81, "prop_mesh");
        mesh_node.mesh = Some(UsfMesh {
            bones: vec![
                Bone { node_uid: 80, inverse_bind: Mat4::IDENTITY },
                Bone { node_uid: 3, inverse_bind: Mat4::IDENTITY },
            ],
            ..Default::default()
        });
        prop.children.push(mesh_node);
        let mut sidecar = UsfNode::new(1, "char_root");
        sidecar.children.push(prop);

        merge_nodes(&mut ctx, char_root, &sidecar).unwrap();
        let prop_id = ctx.nodes[char_root].children[0];
        let mesh_id = ctx.nodes[prop_id].children[0];
        let bones = &ctx.nodes[mesh_id].mesh.as_ref().unwrap().bones;
        assert_eq!(bones[0].node_uid, ctx.nodes[prop_id].uid);
        assert_eq!(bones[1].node_uid, 3);
    }
}
