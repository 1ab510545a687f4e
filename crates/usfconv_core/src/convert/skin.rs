//! Skeleton binding and skin weight handling.

use std::collections::HashMap;

use usfconv_math::{Mat4, Vec4};

use super::context::ConversionContext;
use super::{ConvertError, ConvertResult};
use crate::gltf::GltfDocument;
use crate::usf::{Bone, SkinBinding};

/// Normalize a vertex's weights for USF.
///
/// The last slot is a marker: it is forced to 1 and excluded from the sum,
/// then all four entries are divided by the sum of the first three. An
/// all-zero vertex is left unscaled.
pub fn normalize_weights(weights: [f32; 4]) -> [f32; 4] {
    let mut w = weights;
    w[3] = 1.0;
    let sum = w[0] + w[1] + w[2];
    if sum > 0.0 {
        for v in w.iter_mut() {
            *v /= sum;
        }
    }
    w
}

/// Per-vertex binding from glTF joint indices and weights.
pub fn binding_from_gltf(joints: [u16; 4], weights: Vec4) -> SkinBinding {
    SkinBinding {
        indices: joints.map(i32::from),
        weights: normalize_weights(weights.to_array()),
    }
}

/// Per-vertex glTF joints and weights from a USF binding.
///
/// Slot 3 holds the normalization marker rather than a bone weight and is
/// written as joint 0 with zero weight, as are negative (unused) bone
/// indices. The remaining weights are rescaled to sum to 1.
pub fn binding_to_gltf(binding: &SkinBinding) -> ([u16; 4], Vec4) {
    let mut joints = [0u16; 4];
    let mut weights = [0.0f32; 4];
    for i in 0..3 {
        if let Ok(index) = u16::try_from(binding.indices[i]) {
            joints[i] = index;
            weights[i] = binding.weights[i].max(0.0);
        }
    }
    let sum: f32 = weights.iter().sum();
    if sum > 0.0 {
        for w in weights.iter_mut() {
            *w /= sum;
        }
    }
    (joints, Vec4::from_array(weights))
}

/// Bones of a glTF skin in joint order, each resolved to its converted node.
pub fn bind_bones(
    ctx: &ConversionContext,
    doc: &GltfDocument,
    skin: usize,
) -> ConvertResult<Vec<Bone>> {
    doc.skin_joints(skin)?
        .into_iter()
        .map(|(joint, inverse_bind)| {
            let id = ctx.by_gltf(joint)?;
            Ok(Bone {
                node_uid: ctx.node(id)?.uid,
                inverse_bind,
            })
        })
        .collect()
}

/// glTF joints and inverse bind matrices for USF bones, in bone order.
pub fn skin_joints(
    bones: &[Bone],
    uid_to_gltf: &HashMap<i32, usize>,
) -> ConvertResult<(Vec<usize>, Vec<Mat4>)> {
    let mut joints = Vec::with_capacity(bones.len());
    let mut matrices = Vec::with_capacity(bones.len());
    for bone in bones {
        let joint = uid_to_gltf
            .get(&bone.node_uid)
            .copied()
            .ok_or_else(|| ConvertError::LookupMiss(format!("bone uid {}", bone.node_uid)))?;
        joints.push(joint);
        matrices.push(bone.inverse_bind);
    }
    Ok((joints, matrices))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert::NodeType;
    use crate::gltf::GltfBuilder;
    use usfconv_math::Vec3;

    #[test]
    fn test_weights_normalize_over_first_three() {
        let w = normalize_weights([0.5, 0.3, 0.2, 0.4]);
        assert!((w[0] + w[1] + w[2] - 1.0).abs() < 1e-6);
        assert!((w[3] - 1.0).abs() < 1e-6);

        let w = normalize_weights([2.0, 1.0, 1.0, 0.0]);
        assert!((w[0] - 0.5).abs() < 1e-6);
        assert!((w[0] + w[1] + w[2] - 1.0).abs() < 1e-6);
        assert!((w[3] - 0.25).abs() < 1e-6);
    }

    #[test]
    fn test_zero_weights_untouched() {
        assert_eq!(normalize_weights([0.0; 4]), [0.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn test_binding_to_gltf_drops_unused_slots() {
        let binding = SkinBinding {
            indices: [3, -1, 1, -1],
            weights: [0.6, 0.9, 0.4, 0.0],
        };
        let (joints, weights) = binding_to_gltf(&binding);
        assert_eq!(joints, [3, 0, 1, 0]);
        assert_eq!(weights, Vec4::new(0.6, 0.0, 0.4, 0.0));
    }

    #[test]
    fn test_binding_to_gltf_drops_marker_slot() {
        let imported = binding_from_gltf([2, 5, 0, 7], Vec4::new(0.5, 0.5, 0.0, 0.0));
        assert_eq!(imported.weights, [0.5, 0.5, 0.0, 1.0]);

        let (joints, weights) = binding_to_gltf(&imported);
        assert_eq!(joints, [2, 5, 0, 0]);
        assert_eq!(weights, Vec4::new(0.5, 0.5, 0.0, 0.0));

        // Unnormalized USF weights are rescaled
        let binding = SkinBinding {
            indices: [0, 1, -1, -1],
            weights: [2.0, 6.0, 0.0, 0.125],
        };
        let (_, weights) = binding_to_gltf(&binding);
        assert_eq!(weights, Vec4::new(0.25, 0.75, 0.0, 0.0));
    }

    #[test]
    fn test_bind_bones_keeps_joint_order() {
        let mut doc = GltfBuilder::new("test");
        let a = doc.add_node("a", Mat4::IDENTITY, None).unwrap();
        let b = doc.add_node("b", Mat4::IDENTITY, Some(a)).unwrap();
        let offset = Mat4::from_translation(Vec3::new(0.0, -2.0, 0.0));
        let skin = doc.add_skin("s", vec![b, a], &[offset, Mat4::IDENTITY]);
        let doc = doc.finish().unwrap();

        let mut ctx = ConversionContext::new();
        let na = ctx.add_node("a", NodeType::Bone);
        let nb = ctx.add_node("b", NodeType::Bone);
        ctx.bind_gltf(a, na);
        ctx.bind_gltf(b, nb);

        let bones = bind_bones(&ctx, &doc, skin).unwrap();
        assert_eq!(bones.len(), 2);
        assert_eq!(bones[0].node_uid, ctx.nodes[nb].uid);
        assert_eq!(bones[0].inverse_bind, offset);
        assert_eq!(bones[1].node_uid, ctx.nodes[na].uid);
    }

    #[test]
    fn test_unknown_joint_is_fatal() {
        let mut doc = GltfBuilder::new("test");
        let a = doc.add_node("a", Mat4::IDENTITY, None).unwrap();
        let skin = doc.add_skin("s", vec![a], &[Mat4::IDENTITY]);
        let doc = doc.finish().unwrap();
        let ctx = ConversionContext::new();
        assert!(matches!(
            bind_bones(&ctx, &doc, skin),
            Err(ConvertError::LookupMiss(_))
        ));

        let bones = [Bone {
            node_uid: 7,
            inverse_bind: Mat4::IDENTITY,
        }];
        assert!(skin_joints(&bones, &HashMap::new()).is_err());
    }
}
