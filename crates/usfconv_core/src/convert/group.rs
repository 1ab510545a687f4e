//! Group collector: variant families keyed by normalized group name.

use super::classify::NodeType;
use super::context::{ConversionContext, NodeId};
use super::ConversionWarning;
use crate::config::ConverterConfig;

/// Suffix tokens that separate a mesh's logical name from its variant tag.
const VARIANT_TOKENS: [&str; 4] = ["_rend", "_sim", "_lod", "_cdt"];

/// Upper-case `_l`/`_r` side markers, mid-name or trailing.
fn restore_sides(name: &str) -> String {
    let mut out = name.replace("_l_", "_L_").replace("_r_", "_R_");
    if out.ends_with("_l") || out.ends_with("_r") {
        let side = out.pop().map(|c| c.to_ascii_uppercase());
        out.extend(side);
    }
    out
}

/// Group name without configured merge rules.
///
/// Lower-cases, cuts at the first variant token and restores `_L`/`_R` side
/// markers. A `_rend` cut keeps a following digit 1-4.
pub fn base_group_name(name: &str) -> String {
    let lower = name.to_lowercase();

    let cut = VARIANT_TOKENS
        .iter()
        .filter_map(|token| lower.find(token).map(|pos| (pos, *token)))
        .min_by_key(|(pos, _)| *pos);

    match cut {
        Some((pos, token)) => {
            let mut group = restore_sides(&lower[..pos]);
            if token == "_rend" {
                if let Some(digit) = lower[pos + token.len()..]
                    .chars()
                    .next()
                    .filter(|c| ('1'..='4').contains(c))
                {
                    group.push(digit);
                }
            }
            group
        }
        None => restore_sides(&lower),
    }
}

/// Group name with the configured merge rules applied.
pub fn group_name(name: &str, config: &ConverterConfig) -> String {
    config.apply_grouping(&base_group_name(name))
}

/// One variant family. Holds node ids only; nodes never point back.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct VariantGroup {
    pub skin: Option<NodeId>,
    pub cloth: Option<NodeId>,
    pub sim: Option<NodeId>,
    pub decal: Option<NodeId>,
    pub rigid: Option<NodeId>,
    pub lods: Vec<NodeId>,
}

impl VariantGroup {
    /// Has a skin, cloth skin or decal to hang LODs under.
    pub fn has_render_variant(&self) -> bool {
        self.skin.is_some() || self.cloth.is_some() || self.decal.is_some()
    }

    /// The sim is attached inside the group instead of the free hierarchy.
    pub fn owns_sim(&self) -> bool {
        self.sim.is_some() && (self.rigid.is_none() || self.cloth.is_some())
    }

    /// Rebuilt as a group container under skinned geometry.
    pub fn is_skin_family(&self) -> bool {
        self.has_render_variant() || (self.sim.is_some() && self.rigid.is_none())
    }
}

fn slot_kind(node_type: NodeType) -> Option<&'static str> {
    match node_type {
        NodeType::Skin => Some("skin"),
        NodeType::ClothSkin => Some("cloth skin"),
        NodeType::ClothSim => Some("cloth sim"),
        NodeType::Decal => Some("decal"),
        NodeType::RigidMesh => Some("rigid mesh"),
        NodeType::Lod => Some("lod"),
        _ => None,
    }
}

/// Index every variant node by group name, then promote skins that share a
/// group with a cloth sim to cloth skins.
pub fn collect_groups(ctx: &mut ConversionContext) {
    ctx.groups.clear();

    for i in 0..ctx.nodes.len() {
        let node_type = ctx.nodes[i].node_type;
        let Some(kind) = slot_kind(node_type) else {
            continue;
        };
        let group = ctx.nodes[i].group.clone();
        let entry = ctx.groups.entry(group.clone()).or_default();
        let slot = match node_type {
            NodeType::Skin => &mut entry.skin,
            NodeType::ClothSkin => &mut entry.cloth,
            NodeType::ClothSim => &mut entry.sim,
            NodeType::Decal => &mut entry.decal,
            NodeType::RigidMesh => &mut entry.rigid,
            _ => {
                entry.lods.push(i);
                continue;
            }
        };
        if slot.is_none() {
            *slot = Some(i);
        } else {
            let node = ctx.nodes[i].name.clone();
            ctx.warn(ConversionWarning::DuplicateVariant { group, kind, node });
        }
    }

    // Skins next to a sim are cloth skins
    for i in 0..ctx.nodes.len() {
        if ctx.nodes[i].node_type != NodeType::Skin {
            continue;
        }
        let Some(entry) = ctx.groups.get_mut(&ctx.nodes[i].group) else {
            continue;
        };
        if entry.sim.is_none() {
            continue;
        }
        if entry.skin == Some(i) {
            entry.skin = None;
        }
        if entry.cloth.is_none() {
            entry.cloth = Some(i);
        }
        ctx.nodes[i].node_type = NodeType::ClothSkin;
        log::debug!("Reclassified '{}' as CLOTH_SKIN", ctx.nodes[i].name);
    }

    // Rigid-only entries are bookkeeping, not families
    let families = ctx.groups.values().filter(|g| g.is_skin_family()).count();
    log::info!("Collected {} variant groups ({} skin families)", ctx.groups.len(), families);
}
