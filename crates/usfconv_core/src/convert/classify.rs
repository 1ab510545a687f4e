//! Node classification: semantic type from name heuristics and structure.

use std::fmt;

/// Semantic type of a scene node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NodeType {
    Locator,
    Bone,
    /// Collision/destruction mesh
    Cdt,
    RigidMesh,
    Skin,
    ClothSkin,
    ClothSim,
    Lod,
    Decal,
    Actor,
    Char,
    Dx,
    Root,
    CharRoot,
    SkinnedGeom,
    Group,
}

impl NodeType {
    pub const ALL: [NodeType; 16] = [
        NodeType::Locator,
        NodeType::Bone,
        NodeType::Cdt,
        NodeType::RigidMesh,
        NodeType::Skin,
        NodeType::ClothSkin,
        NodeType::ClothSim,
        NodeType::Lod,
        NodeType::Decal,
        NodeType::Actor,
        NodeType::Char,
        NodeType::Dx,
        NodeType::Root,
        NodeType::CharRoot,
        NodeType::SkinnedGeom,
        NodeType::Group,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            NodeType::Locator => "LOCATOR",
            NodeType::Bone => "BONE",
            NodeType::Cdt => "CDT",
            NodeType::RigidMesh => "RIGID_MESH",
            NodeType::Skin => "SKIN",
            NodeType::ClothSkin => "CLOTH_SKIN",
            NodeType::ClothSim => "CLOTH_SIM",
            NodeType::Lod => "LOD",
            NodeType::Decal => "DECAL",
            NodeType::Actor => "ACTOR",
            NodeType::Char => "CHAR",
            NodeType::Dx => "DX",
            NodeType::Root => "ROOT",
            NodeType::CharRoot => "CHAR_ROOT",
            NodeType::SkinnedGeom => "SKINNED_GEOM",
            NodeType::Group => "GROUP",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s.trim()))
    }

    /// Types that carry geometry.
    pub fn is_mesh(self) -> bool {
        matches!(
            self,
            NodeType::Cdt
                | NodeType::RigidMesh
                | NodeType::Skin
                | NodeType::ClothSkin
                | NodeType::ClothSim
                | NodeType::Lod
                | NodeType::Decal
        )
    }

    pub fn is_skin(self) -> bool {
        matches!(self, NodeType::Skin | NodeType::ClothSkin)
    }

    /// Structural nodes that are rebuilt rather than attached as-is.
    pub fn is_scaffold(self) -> bool {
        matches!(
            self,
            NodeType::Root
                | NodeType::Dx
                | NodeType::Char
                | NodeType::CharRoot
                | NodeType::SkinnedGeom
                | NodeType::Group
                | NodeType::Actor
        )
    }

    /// Types a `nodeType` metadata hint may assign.
    fn is_hintable(self) -> bool {
        matches!(
            self,
            NodeType::Root
                | NodeType::Dx
                | NodeType::Char
                | NodeType::CharRoot
                | NodeType::SkinnedGeom
                | NodeType::Group
        )
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structural facts about an imported node.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct NodeFacts {
    pub has_mesh: bool,
    pub has_skin: bool,
    pub is_joint: bool,
    /// Node metadata carries an actor descriptor
    pub has_actor: bool,
    /// `nodeType` from node metadata
    pub type_hint: Option<NodeType>,
}

/// Reserved names of technical nodes, compared case-insensitively.
pub(crate) fn reserved_type(lower: &str) -> Option<NodeType> {
    match lower {
        "root" => Some(NodeType::Root),
        "dx" => Some(NodeType::Dx),
        "char" => Some(NodeType::Char),
        "char_root" => Some(NodeType::CharRoot),
        "skinned_geometry" => Some(NodeType::SkinnedGeom),
        _ => None,
    }
}

/// Classify a node. First matching rule wins; LOCATOR is the fallback.
pub fn classify(name: &str, facts: &NodeFacts) -> NodeType {
    let lower = name.to_lowercase();

    if facts.has_actor {
        return NodeType::Actor;
    }
    if (lower.contains("_cdt") || lower.starts_with("rb_")) && !lower.contains("constraint") {
        return NodeType::Cdt;
    }
    if lower.contains("_sim") {
        return NodeType::ClothSim;
    }
    if lower.contains("_lod") {
        return NodeType::Lod;
    }
    if lower.contains("_decal") {
        return NodeType::Decal;
    }
    if lower.contains("_rend") {
        return NodeType::ClothSkin;
    }
    if facts.is_joint {
        return NodeType::Bone;
    }
    if facts.has_mesh && !facts.has_skin {
        return NodeType::RigidMesh;
    }
    if facts.has_skin {
        return NodeType::Skin;
    }
    if let Some(t) = reserved_type(&lower) {
        return t;
    }
    if let Some(hint) = facts.type_hint.filter(|t| t.is_hintable()) {
        return hint;
    }
    NodeType::Locator
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mesh() -> NodeFacts {
        NodeFacts {
            has_mesh: true,
            ..Default::default()
        }
    }

    fn skinned() -> NodeFacts {
        NodeFacts {
            has_mesh: true,
            has_skin: true,
            ..Default::default()
        }
    }

    #[test]
    fn test_name_rules() {
        let none = NodeFacts::default();
        assert_eq!(classify("Shoulder_L_sim", &mesh()), NodeType::ClothSim);
        assert_eq!(classify("Helmet_LOD1", &mesh()), NodeType::Lod);
        assert_eq!(classify("chest_decal", &mesh()), NodeType::Decal);
        assert_eq!(classify("Helmet_rend2", &skinned()), NodeType::ClothSkin);
        assert_eq!(classify("arm_cdt", &mesh()), NodeType::Cdt);
        assert_eq!(classify("RB_Barrel", &none), NodeType::Cdt);
        assert_eq!(classify("rb_hinge_constraint", &none), NodeType::Locator);
    }

    #[test]
    fn test_precedence() {
        // Actor metadata beats every name rule
        let actor = NodeFacts {
            has_actor: true,
            ..Default::default()
        };
        assert_eq!(classify("body_sim", &actor), NodeType::Actor);

        // _cdt beats _sim, _sim beats _lod
        assert_eq!(classify("a_cdt_sim", &mesh()), NodeType::Cdt);
        assert_eq!(classify("a_sim_lod1", &mesh()), NodeType::ClothSim);

        // Name rules beat joint membership
        let joint = NodeFacts {
            is_joint: true,
            ..Default::default()
        };
        assert_eq!(classify("spine_lod", &joint), NodeType::Lod);
        assert_eq!(classify("spine", &joint), NodeType::Bone);
    }

    #[test]
    fn test_structural_rules() {
        assert_eq!(classify("Helmet", &mesh()), NodeType::RigidMesh);
        assert_eq!(classify("Body", &skinned()), NodeType::Skin);
        assert_eq!(classify("muzzle", &NodeFacts::default()), NodeType::Locator);
    }

    #[test]
    fn test_reserved_names() {
        let none = NodeFacts::default();
        assert_eq!(classify("ROOT", &none), NodeType::Root);
        assert_eq!(classify("dx", &none), NodeType::Dx);
        assert_eq!(classify("Char", &none), NodeType::Char);
        assert_eq!(classify("char_root", &none), NodeType::CharRoot);
        assert_eq!(classify("skinned_geometry", &none), NodeType::SkinnedGeom);
        // Exact match only
        assert_eq!(classify("root_1", &none), NodeType::Locator);
    }

    #[test]
    fn test_type_hint() {
        let group = NodeFacts {
            type_hint: Some(NodeType::Group),
            ..Default::default()
        };
        assert_eq!(classify("helmet", &group), NodeType::Group);

        // Hints cannot override earlier rules or assign mesh types
        let hinted_mesh = NodeFacts {
            has_mesh: true,
            type_hint: Some(NodeType::Group),
            ..Default::default()
        };
        assert_eq!(classify("helmet", &hinted_mesh), NodeType::RigidMesh);
        let bad_hint = NodeFacts {
            type_hint: Some(NodeType::Skin),
            ..Default::default()
        };
        assert_eq!(classify("helmet", &bad_hint), NodeType::Locator);
    }

    #[test]
    fn test_classification_is_idempotent() {
        let cases = [
            ("Shoulder_L_sim", mesh()),
            ("Body", skinned()),
            ("root", NodeFacts::default()),
            ("Helmet_rend2", skinned()),
        ];
        for (name, facts) in cases {
            assert_eq!(classify(name, &facts), classify(name, &facts));
        }
    }

    #[test]
    fn test_type_names() {
        for t in NodeType::ALL {
            assert_eq!(NodeType::parse(t.as_str()), Some(t));
        }
        assert_eq!(NodeType::parse("cloth_skin"), Some(NodeType::ClothSkin));
        assert_eq!(NodeType::parse("nope"), None);
    }
}
