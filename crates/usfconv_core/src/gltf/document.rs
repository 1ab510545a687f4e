//! Read-side glTF document over the `gltf` crate.
//!
//! `GltfDocument` owns a validated `gltf::Document` and its buffer data. It
//! answers the questions the transcoder asks of an imported scene (children,
//! transforms, attribute arrays, skins, animation channels, extras) and
//! serializes itself as `.gltf` with an embedded buffer or as `.glb`.

use std::borrow::Cow;
use std::collections::HashSet;
use std::path::Path;

use ::gltf::animation::util::ReadOutputs;
use ::gltf::animation::{Interpolation, Property};
use ::gltf::buffer::Data;
use ::gltf::json;
use ::gltf::mesh::Mode;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use json::validation::USize64;
use serde_json::value::RawValue;
use serde_json::Value;
use thiserror::Error;
use usfconv_math::{Mat4, Quat, Transform, Vec2, Vec3, Vec4};

const DATA_URI_PREFIX: &str = "data:application/octet-stream;base64,";

/// Errors that can occur while reading or writing glTF documents.
#[derive(Error, Debug)]
pub enum GltfError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("glTF error: {0}")]
    Gltf(#[from] ::gltf::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("No {kind} with index {index}")]
    MissingIndex { kind: &'static str, index: usize },

    #[error("Missing data: {0}")]
    MissingData(String),

    #[error("Invalid primitive: {0}")]
    InvalidPrimitive(String),
}

/// Result type for glTF operations.
pub type GltfResult<T> = Result<T, GltfError>;

/// Animated node property.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ChannelPath {
    Translation,
    Rotation,
    Scale,
}

impl ChannelPath {
    pub fn as_str(self) -> &'static str {
        match self {
            ChannelPath::Translation => "translation",
            ChannelPath::Rotation => "rotation",
            ChannelPath::Scale => "scale",
        }
    }

    /// Components per key.
    pub fn width(self) -> usize {
        match self {
            ChannelPath::Rotation => 4,
            _ => 3,
        }
    }

    pub(super) fn property(self) -> Property {
        match self {
            ChannelPath::Translation => Property::Translation,
            ChannelPath::Rotation => Property::Rotation,
            ChannelPath::Scale => Property::Scale,
        }
    }
}

/// Keyframes of one animation channel, values flattened by `path.width()`.
#[derive(Clone, Debug, PartialEq)]
pub struct ChannelData {
    pub node: usize,
    pub path: ChannelPath,
    pub times: Vec<f32>,
    pub values: Vec<f32>,
}

impl ChannelData {
    pub fn key_count(&self) -> usize {
        self.times.len()
    }
}

/// Attribute arrays of one indexed triangle primitive. Empty vectors mean the
/// attribute is absent.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PrimitiveData {
    pub positions: Vec<Vec3>,
    pub normals: Vec<Vec3>,
    pub tangents: Vec<Vec4>,
    /// TEXCOORD_0, TEXCOORD_1, ...
    pub uv_sets: Vec<Vec<Vec2>>,
    /// COLOR_0, COLOR_1, ... as RGBA floats
    pub color_sets: Vec<Vec<Vec4>>,
    pub joints: Vec<[u16; 4]>,
    pub weights: Vec<Vec4>,
    /// `None` for non-indexed primitives
    pub indices: Option<Vec<u32>>,
    pub material: Option<usize>,
}

impl PrimitiveData {
    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    /// Triangle corner list, generating `0..n` for non-indexed primitives.
    pub fn triangle_indices(&self) -> Vec<u32> {
        match &self.indices {
            Some(indices) => indices.clone(),
            None => (0..self.positions.len() as u32).collect(),
        }
    }

    pub(super) fn validate(&self) -> GltfResult<()> {
        let n = self.positions.len();
        let check = |what: &str, len: usize| {
            if len != 0 && len != n {
                Err(GltfError::InvalidPrimitive(format!(
                    "{} has {} entries for {} vertices",
                    what, len, n
                )))
            } else {
                Ok(())
            }
        };
        check("NORMAL", self.normals.len())?;
        check("TANGENT", self.tangents.len())?;
        check("JOINTS_0", self.joints.len())?;
        check("WEIGHTS_0", self.weights.len())?;
        for set in &self.uv_sets {
            check("TEXCOORD", set.len())?;
        }
        for set in &self.color_sets {
            check("COLOR", set.len())?;
        }
        if let Some(indices) = &self.indices {
            if indices.len() % 3 != 0 {
                return Err(GltfError::InvalidPrimitive(format!(
                    "{} indices is not a triangle list",
                    indices.len()
                )));
            }
            if let Some(&bad) = indices.iter().find(|&&i| i as usize >= n) {
                return Err(GltfError::InvalidPrimitive(format!(
                    "index {} out of range for {} vertices",
                    bad, n
                )));
            }
        }
        Ok(())
    }
}

/// Extras as a JSON value. Malformed extras read as absent.
fn parse_extras(raw: Option<&RawValue>) -> Option<Value> {
    raw.and_then(|r| serde_json::from_str(r.get()).ok())
}

/// A validated glTF document plus its buffer data.
#[derive(Clone, Debug)]
pub struct GltfDocument {
    document: ::gltf::Document,
    buffers: Vec<Data>,
}

// ============================================================================
// Loading and saving
// ============================================================================

impl GltfDocument {
    /// Load a `.gltf` or `.glb` file, resolving external buffers next to it.
    pub fn open<P: AsRef<Path>>(path: P) -> GltfResult<Self> {
        let path = path.as_ref();
        let data = std::fs::read(path)?;
        Self::from_slice_with_base(&data, path.parent())
    }

    /// Parse a document whose buffers are embedded (GLB or data URIs).
    pub fn from_slice(data: &[u8]) -> GltfResult<Self> {
        Self::from_slice_with_base(data, None)
    }

    pub fn from_slice_with_base(data: &[u8], base_dir: Option<&Path>) -> GltfResult<Self> {
        let ::gltf::Gltf { document, blob } = ::gltf::Gltf::from_slice(data)?;
        let buffers = ::gltf::import_buffers(&document, base_dir, blob)?;

        log::debug!(
            "Loaded glTF: {} nodes, {} meshes, {} skins, {} animations",
            document.nodes().len(),
            document.meshes().len(),
            document.skins().len(),
            document.animations().len()
        );

        Ok(Self { document, buffers })
    }

    /// Validate a JSON root whose single buffer holds `bin`.
    pub(super) fn from_json(root: json::Root, bin: Vec<u8>) -> GltfResult<Self> {
        let document = ::gltf::Document::from_json(root)?;
        let buffers = if bin.is_empty() {
            Vec::new()
        } else {
            vec![Data(bin)]
        };
        Ok(Self { document, buffers })
    }

    /// The underlying `gltf` document.
    pub fn document(&self) -> &::gltf::Document {
        &self.document
    }

    /// Write to disk, choosing GLB for a `.glb` extension.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> GltfResult<()> {
        let path = path.as_ref();
        let is_glb = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("glb"));
        let bytes = if is_glb {
            self.to_glb()?
        } else {
            self.to_gltf_json()?
        };
        std::fs::write(path, bytes)?;
        Ok(())
    }

    /// Serialize as JSON with the buffer embedded as a data URI.
    pub fn to_gltf_json(&self) -> GltfResult<Vec<u8>> {
        let (mut root, bin) = self.packed_root();
        if let Some(buffer) = root.buffers.first_mut() {
            buffer.uri = Some(format!("{}{}", DATA_URI_PREFIX, BASE64.encode(&bin)));
        }
        Ok(json::serialize::to_vec_pretty(&root)?)
    }

    /// Serialize as a binary GLB container with one BIN chunk.
    pub fn to_glb(&self) -> GltfResult<Vec<u8>> {
        let (root, bin) = self.packed_root();
        let json = json::serialize::to_vec(&root)?;
        let glb = ::gltf::binary::Glb {
            header: ::gltf::binary::Header {
                magic: *b"glTF",
                version: 2,
                // to_vec fills in the real length
                length: 0,
            },
            json: Cow::Owned(json),
            bin: (!bin.is_empty()).then_some(Cow::Owned(bin)),
        };
        Ok(glb.to_vec()?)
    }

    /// JSON root with every buffer packed into buffer 0, and that buffer's bytes.
    fn packed_root(&self) -> (json::Root, Vec<u8>) {
        let mut root = self.document.clone().into_json();

        let mut bin = Vec::new();
        let mut offsets = Vec::with_capacity(self.buffers.len());
        for data in &self.buffers {
            while bin.len() % 4 != 0 {
                bin.push(0);
            }
            offsets.push(bin.len() as u64);
            bin.extend_from_slice(&data.0);
        }

        for view in &mut root.buffer_views {
            let base = offsets.get(view.buffer.value()).copied().unwrap_or(0);
            let offset = view.byte_offset.map_or(0, |o| o.0);
            view.byte_offset = Some(USize64(base + offset));
            view.buffer = json::Index::new(0);
        }

        root.buffers = if bin.is_empty() {
            Vec::new()
        } else {
            vec![json::Buffer {
                byte_length: USize64::from(bin.len()),
                uri: None,
                name: None,
                extensions: Default::default(),
                extras: Default::default(),
            }]
        };
        (root, bin)
    }
}

// ============================================================================
// Reading
// ============================================================================

impl GltfDocument {
    pub fn node_count(&self) -> usize {
        self.document.nodes().len()
    }

    pub fn mesh_count(&self) -> usize {
        self.document.meshes().len()
    }

    pub fn material_count(&self) -> usize {
        self.document.materials().len()
    }

    pub fn skin_count(&self) -> usize {
        self.document.skins().len()
    }

    pub fn animation_count(&self) -> usize {
        self.document.animations().len()
    }

    pub fn node(&self, index: usize) -> GltfResult<::gltf::Node<'_>> {
        self.document.nodes().nth(index).ok_or(GltfError::MissingIndex {
            kind: "node",
            index,
        })
    }

    /// Node name, or `node_<index>` for unnamed nodes.
    pub fn node_name(&self, index: usize) -> String {
        self.node(index)
            .ok()
            .and_then(|n| n.name().map(str::to_string))
            .unwrap_or_else(|| format!("node_{}", index))
    }

    pub fn node_mesh(&self, index: usize) -> GltfResult<Option<usize>> {
        Ok(self.node(index)?.mesh().map(|m| m.index()))
    }

    pub fn node_skin(&self, index: usize) -> GltfResult<Option<usize>> {
        Ok(self.node(index)?.skin().map(|s| s.index()))
    }

    pub fn children(&self, index: usize) -> GltfResult<Vec<usize>> {
        Ok(self.node(index)?.children().map(|c| c.index()).collect())
    }

    /// Root nodes of the default scene. Documents without scenes use every
    /// node that is nobody's child.
    pub fn scene_roots(&self) -> Vec<usize> {
        let scene = self
            .document
            .default_scene()
            .or_else(|| self.document.scenes().next());
        if let Some(scene) = scene {
            return scene.nodes().map(|n| n.index()).collect();
        }
        let children: HashSet<usize> = self
            .document
            .nodes()
            .flat_map(|n| n.children().map(|c| c.index()).collect::<Vec<_>>())
            .collect();
        (0..self.node_count())
            .filter(|i| !children.contains(i))
            .collect()
    }

    /// Local transform as a matrix.
    pub fn local_matrix(&self, index: usize) -> GltfResult<Mat4> {
        match self.node(index)?.transform() {
            ::gltf::scene::Transform::Matrix { matrix } => Ok(Mat4::from_cols_array_2d(&matrix)),
            _ => Ok(self.node_trs(index)?.to_matrix()),
        }
    }

    /// Local transform as translation/rotation/scale.
    pub fn node_trs(&self, index: usize) -> GltfResult<Transform> {
        Ok(match self.node(index)?.transform() {
            ::gltf::scene::Transform::Matrix { matrix } => {
                Transform::from_matrix(Mat4::from_cols_array_2d(&matrix))
            }
            ::gltf::scene::Transform::Decomposed {
                translation,
                rotation,
                scale,
            } => Transform {
                translation: Vec3::from_array(translation),
                rotation: Quat::from_array(rotation).normalize(),
                scale: Vec3::from_array(scale),
            },
        })
    }

    pub fn node_extras(&self, index: usize) -> Option<Value> {
        parse_extras(self.node(index).ok()?.extras().as_deref())
    }

    pub fn mesh(&self, index: usize) -> GltfResult<::gltf::Mesh<'_>> {
        self.document.meshes().nth(index).ok_or(GltfError::MissingIndex {
            kind: "mesh",
            index,
        })
    }

    pub fn primitive_count(&self, mesh: usize) -> GltfResult<usize> {
        Ok(self.mesh(mesh)?.primitives().len())
    }

    pub fn mesh_extras(&self, index: usize) -> Option<Value> {
        parse_extras(self.mesh(index).ok()?.extras().as_deref())
    }

    pub fn material(&self, index: usize) -> GltfResult<::gltf::Material<'_>> {
        self.document
            .materials()
            .nth(index)
            .ok_or(GltfError::MissingIndex {
                kind: "material",
                index,
            })
    }

    pub fn material_name(&self, index: usize) -> GltfResult<Option<String>> {
        Ok(self.material(index)?.name().map(str::to_string))
    }

    pub fn material_extras(&self, index: usize) -> Option<Value> {
        parse_extras(self.material(index).ok()?.extras().as_deref())
    }

    pub fn skin(&self, index: usize) -> GltfResult<::gltf::Skin<'_>> {
        self.document.skins().nth(index).ok_or(GltfError::MissingIndex {
            kind: "skin",
            index,
        })
    }

    /// Every node used as a joint by any skin.
    pub fn joint_nodes(&self) -> HashSet<usize> {
        self.document
            .skins()
            .flat_map(|s| s.joints().map(|j| j.index()).collect::<Vec<_>>())
            .collect()
    }

    /// Joints of a skin in skin order, paired with their inverse bind
    /// matrices (identity when the skin has none).
    pub fn skin_joints(&self, index: usize) -> GltfResult<Vec<(usize, Mat4)>> {
        let skin = self.skin(index)?;
        let reader = skin.reader(|b| self.buffers.get(b.index()).map(|d| d.0.as_slice()));
        let matrices: Vec<Mat4> = reader
            .read_inverse_bind_matrices()
            .map(|iter| iter.map(|m| Mat4::from_cols_array_2d(&m)).collect())
            .unwrap_or_default();
        Ok(skin
            .joints()
            .enumerate()
            .map(|(i, joint)| {
                (
                    joint.index(),
                    matrices.get(i).copied().unwrap_or(Mat4::IDENTITY),
                )
            })
            .collect())
    }

    /// Read every attribute of one primitive.
    ///
    /// Integer and normalized encodings, strided views and sparse accessors
    /// are all decoded by the `gltf` readers.
    pub fn read_primitive(&self, mesh: usize, primitive: usize) -> GltfResult<PrimitiveData> {
        let prim = self
            .mesh(mesh)?
            .primitives()
            .nth(primitive)
            .ok_or(GltfError::MissingIndex {
                kind: "primitive",
                index: primitive,
            })?;

        if prim.mode() != Mode::Triangles {
            return Err(GltfError::InvalidPrimitive(format!(
                "mesh {} primitive {} uses mode {:?}, only triangles are supported",
                mesh,
                primitive,
                prim.mode()
            )));
        }

        let reader = prim.reader(|b| self.buffers.get(b.index()).map(|d| d.0.as_slice()));
        let mut data = PrimitiveData {
            material: prim.material().index(),
            ..Default::default()
        };

        if let Some(iter) = reader.read_positions() {
            data.positions = iter.map(Vec3::from_array).collect();
        }
        if let Some(iter) = reader.read_normals() {
            data.normals = iter.map(Vec3::from_array).collect();
        }
        if let Some(iter) = reader.read_tangents() {
            data.tangents = iter.map(Vec4::from_array).collect();
        }
        while let Some(set) = reader.read_tex_coords(data.uv_sets.len() as u32) {
            data.uv_sets.push(set.into_f32().map(Vec2::from_array).collect());
        }
        // RGB colours read with alpha 1
        while let Some(set) = reader.read_colors(data.color_sets.len() as u32) {
            data.color_sets.push(set.into_rgba_f32().map(Vec4::from_array).collect());
        }
        if let Some(joints) = reader.read_joints(0) {
            data.joints = joints.into_u16().collect();
        }
        if let Some(weights) = reader.read_weights(0) {
            data.weights = weights.into_f32().map(Vec4::from_array).collect();
        }
        if let Some(indices) = reader.read_indices() {
            data.indices = Some(indices.into_u32().collect());
        }

        data.validate()?;
        Ok(data)
    }

    /// Animation names in declaration order; unnamed ones become
    /// `animation_<index>`.
    pub fn animation_names(&self) -> Vec<String> {
        self.document
            .animations()
            .enumerate()
            .map(|(i, a)| {
                a.name()
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("animation_{}", i))
            })
            .collect()
    }

    /// Node channels of one animation with their decoded keyframes.
    ///
    /// Morph weight channels are skipped. Cubic-spline samplers keep only the
    /// key values, not the tangents.
    pub fn animation_channels(&self, animation: usize) -> GltfResult<Vec<ChannelData>> {
        let anim = self
            .document
            .animations()
            .nth(animation)
            .ok_or(GltfError::MissingIndex {
                kind: "animation",
                index: animation,
            })?;

        let mut channels = Vec::new();
        for (c, channel) in anim.channels().enumerate() {
            let target = channel.target();
            let path = match target.property() {
                Property::Translation => ChannelPath::Translation,
                Property::Rotation => ChannelPath::Rotation,
                Property::Scale => ChannelPath::Scale,
                Property::MorphTargetWeights => continue,
            };

            let reader = channel.reader(|b| self.buffers.get(b.index()).map(|d| d.0.as_slice()));
            let missing = |what: &str| {
                GltfError::MissingData(format!(
                    "animation {} channel {} has no {}",
                    animation, c, what
                ))
            };
            let times: Vec<f32> = reader.read_inputs().ok_or_else(|| missing("input"))?.collect();
            let mut values: Vec<f32> = match reader.read_outputs().ok_or_else(|| missing("output"))? {
                ReadOutputs::Translations(iter) => iter.flatten().collect(),
                ReadOutputs::Rotations(iter) => iter.into_f32().flatten().collect(),
                ReadOutputs::Scales(iter) => iter.flatten().collect(),
                ReadOutputs::MorphTargetWeights(_) => continue,
            };

            let width = path.width();
            if matches!(channel.sampler().interpolation(), Interpolation::CubicSpline) {
                values = values
                    .chunks_exact(3 * width)
                    .flat_map(|key| key[width..2 * width].to_vec())
                    .collect();
            }

            channels.push(ChannelData {
                node: target.node().index(),
                path,
                times,
                values,
            });
        }
        Ok(channels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gltf::GltfBuilder;
    use serde_json::json;

    fn triangle() -> PrimitiveData {
        PrimitiveData {
            positions: vec![Vec3::ZERO, Vec3::X, Vec3::Y],
            normals: vec![Vec3::Z; 3],
            uv_sets: vec![vec![Vec2::ZERO, Vec2::X, Vec2::Y]],
            color_sets: vec![vec![Vec4::new(1.0, 0.5, 0.25, 1.0); 3]],
            joints: vec![[0, 1, 0, 0]; 3],
            weights: vec![Vec4::new(0.75, 0.25, 0.0, 0.0); 3],
            indices: Some(vec![0, 1, 2]),
            material: Some(0),
            ..Default::default()
        }
    }

    fn sample_document() -> GltfDocument {
        let mut doc = GltfBuilder::new("test");
        let root = doc.add_node("root", Mat4::IDENTITY, None).unwrap();
        let hips = doc
            .add_node("hips", Mat4::from_translation(Vec3::new(0.0, 1.0, 0.0)), Some(root))
            .unwrap();
        let body = doc.add_node("body", Mat4::IDENTITY, Some(root)).unwrap();
        doc.set_node_extras(body, json!({"usf": {"affixes": "a=1"}})).unwrap();

        doc.add_material("skin_mtl", Some(json!({"preset": "cloth"}))).unwrap();
        let mesh = doc.add_mesh("body", &[triangle()], None).unwrap();
        doc.attach_mesh(body, mesh).unwrap();
        let skin = doc.add_skin(
            "body_skin",
            vec![root, hips],
            &[Mat4::IDENTITY, Mat4::from_translation(Vec3::new(0.0, -1.0, 0.0))],
        );
        doc.attach_skin(body, skin).unwrap();
        doc.add_animation_channel(
            "walk",
            hips,
            ChannelPath::Translation,
            &[0.0, 0.5],
            &[0.0, 1.0, 0.0, 0.0, 2.0, 0.0],
        )
        .unwrap();
        doc.finish().unwrap()
    }

    fn check_document(doc: &GltfDocument) {
        assert_eq!(doc.scene_roots(), vec![0]);
        assert_eq!(doc.children(0).unwrap(), vec![1, 2]);
        assert_eq!(doc.node_name(1), "hips");
        let hips = doc.local_matrix(1).unwrap();
        assert!((hips.transform_point3(Vec3::ZERO) - Vec3::Y).length() < 1e-6);
        assert_eq!(doc.node_extras(2).unwrap()["usf"]["affixes"], "a=1");
        assert_eq!(doc.material_extras(0).unwrap()["preset"], "cloth");

        let mesh = doc.node_mesh(2).unwrap().unwrap();
        let prim = doc.read_primitive(mesh, 0).unwrap();
        assert_eq!(prim, triangle());

        let joints = doc.skin_joints(0).unwrap();
        assert_eq!(joints.len(), 2);
        assert_eq!(joints[1].0, 1);
        assert_eq!(joints[1].1, Mat4::from_translation(Vec3::new(0.0, -1.0, 0.0)));
        assert!(doc.joint_nodes().contains(&1));

        assert_eq!(doc.animation_names(), vec!["walk".to_string()]);
        let channels = doc.animation_channels(0).unwrap();
        assert_eq!(channels.len(), 1);
        assert_eq!(channels[0].node, 1);
        assert_eq!(channels[0].path, ChannelPath::Translation);
        assert_eq!(channels[0].times, vec![0.0, 0.5]);
        assert_eq!(channels[0].values[4], 2.0);
    }

    fn data_uri(bytes: &[u8]) -> String {
        format!("{}{}", DATA_URI_PREFIX, BASE64.encode(bytes))
    }

    fn f32_bytes(values: &[f32]) -> Vec<u8> {
        values.iter().flat_map(|v| v.to_le_bytes()).collect()
    }

    #[test]
    fn test_document_survives_gltf_json() {
        let doc = sample_document();
        let bytes = doc.to_gltf_json().unwrap();
        let read = GltfDocument::from_slice(&bytes).unwrap();
        check_document(&read);
    }

    #[test]
    fn test_document_survives_glb() {
        let doc = sample_document();
        let bytes = doc.to_glb().unwrap();
        assert_eq!(&bytes[..4], b"glTF");
        assert_eq!(bytes.len() % 4, 0);
        let read = GltfDocument::from_slice(&bytes).unwrap();
        check_document(&read);
    }

    #[test]
    fn test_normalized_byte_colors_and_implicit_scene() {
        // Three RGBA8 normalized colours on a non-indexed triangle, no scenes array.
        let mut buffer = f32_bytes(&[0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0]);
        buffer.extend_from_slice(&[255u8, 0, 0, 255, 0, 255, 0, 128, 0, 0, 255, 0]);
        let gltf = json!({
            "asset": {"version": "2.0"},
            "nodes": [{"name": "a", "children": [1], "mesh": 0}, {"name": "b"}],
            "meshes": [{"primitives": [{"attributes": {"POSITION": 0, "COLOR_0": 1}}]}],
            "buffers": [{"byteLength": 48, "uri": data_uri(&buffer)}],
            "bufferViews": [
                {"buffer": 0, "byteLength": 36},
                {"buffer": 0, "byteOffset": 36, "byteLength": 12}
            ],
            "accessors": [
                {"bufferView": 0, "componentType": 5126, "count": 3, "type": "VEC3",
                 "min": [0.0, 0.0, 0.0], "max": [1.0, 1.0, 0.0]},
                {"bufferView": 1, "componentType": 5121, "normalized": true, "count": 3, "type": "VEC4"}
            ]
        });
        let doc = GltfDocument::from_slice(&serde_json::to_vec(&gltf).unwrap()).unwrap();

        assert_eq!(doc.scene_roots(), vec![0]);
        let prim = doc.read_primitive(0, 0).unwrap();
        assert_eq!(prim.triangle_indices(), vec![0, 1, 2]);
        let colors = &prim.color_sets[0];
        assert_eq!(colors[0], Vec4::new(1.0, 0.0, 0.0, 1.0));
        assert!((colors[1].w - 128.0 / 255.0).abs() < 1e-6);
        assert_eq!(colors[2].w, 0.0);
    }

    #[test]
    fn test_interleaved_attributes_follow_byte_stride() {
        // Position (12 bytes) and RGBA8 colour (4 bytes) interleaved at a 16 byte stride.
        let mut buffer = Vec::new();
        let corners = [[0.0f32, 0.0, 0.0], [2.0, 0.0, 0.0], [0.0, 3.0, 0.0]];
        let colors = [[255u8, 0, 0, 255], [0, 255, 0, 255], [0, 0, 255, 51]];
        for (p, c) in corners.iter().zip(&colors) {
            buffer.extend(f32_bytes(p));
            buffer.extend_from_slice(c);
        }
        buffer.extend_from_slice(&[0u8, 0, 1, 0, 2, 0, 0, 0]);

        let gltf = json!({
            "asset": {"version": "2.0"},
            "scene": 0,
            "scenes": [{"nodes": [0]}],
            "nodes": [{"name": "strided", "mesh": 0}],
            "meshes": [{"primitives": [{"attributes": {"POSITION": 0, "COLOR_0": 1}, "indices": 2}]}],
            "buffers": [{"byteLength": 56, "uri": data_uri(&buffer)}],
            "bufferViews": [
                {"buffer": 0, "byteLength": 48, "byteStride": 16, "target": 34962},
                {"buffer": 0, "byteOffset": 48, "byteLength": 6, "target": 34963}
            ],
            "accessors": [
                {"bufferView": 0, "componentType": 5126, "count": 3, "type": "VEC3",
                 "min": [0.0, 0.0, 0.0], "max": [2.0, 3.0, 0.0]},
                {"bufferView": 0, "byteOffset": 12, "componentType": 5121, "normalized": true,
                 "count": 3, "type": "VEC4"},
                {"bufferView": 1, "componentType": 5123, "count": 3, "type": "SCALAR"}
            ]
        });
        let doc = GltfDocument::from_slice(&serde_json::to_vec(&gltf).unwrap()).unwrap();

        let prim = doc.read_primitive(0, 0).unwrap();
        assert_eq!(
            prim.positions,
            vec![Vec3::ZERO, Vec3::new(2.0, 0.0, 0.0), Vec3::new(0.0, 3.0, 0.0)]
        );
        assert_eq!(prim.color_sets[0][1], Vec4::new(0.0, 1.0, 0.0, 1.0));
        assert!((prim.color_sets[0][2].w - 0.2).abs() < 1e-6);
        assert_eq!(prim.indices, Some(vec![0, 1, 2]));

        // Repacking keeps the stride intact
        let read = GltfDocument::from_slice(&doc.to_glb().unwrap()).unwrap();
        assert_eq!(read.read_primitive(0, 0).unwrap(), prim);
    }

    #[test]
    fn test_cubic_spline_keeps_key_values() {
        // Two keys; each output element is (in-tangent, value, out-tangent).
        let times = [0.0f32, 1.0];
        let outputs = [
            9.0f32, 9.0, 9.0, 1.0, 2.0, 3.0, 8.0, 8.0, 8.0, //
            7.0, 7.0, 7.0, 4.0, 5.0, 6.0, 6.0, 6.0, 6.0,
        ];
        let mut buffer = f32_bytes(&times);
        buffer.extend(f32_bytes(&outputs));

        let gltf = json!({
            "asset": {"version": "2.0"},
            "scene": 0,
            "scenes": [{"nodes": [0]}],
            "nodes": [{"name": "bone"}],
            "buffers": [{"byteLength": 80, "uri": data_uri(&buffer)}],
            "bufferViews": [
                {"buffer": 0, "byteLength": 8},
                {"buffer": 0, "byteOffset": 8, "byteLength": 72}
            ],
            "accessors": [
                {"bufferView": 0, "componentType": 5126, "count": 2, "type": "SCALAR",
                 "min": [0.0], "max": [1.0]},
                {"bufferView": 1, "componentType": 5126, "count": 6, "type": "VEC3"}
            ],
            "animations": [{
                "name": "swing",
                "samplers": [{"input": 0, "output": 1, "interpolation": "CUBICSPLINE"}],
                "channels": [{"sampler": 0, "target": {"node": 0, "path": "translation"}}]
            }]
        });
        let doc = GltfDocument::from_slice(&serde_json::to_vec(&gltf).unwrap()).unwrap();

        let channels = doc.animation_channels(0).unwrap();
        assert_eq!(channels.len(), 1);
        assert_eq!(channels[0].key_count(), 2);
        assert_eq!(channels[0].values, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
    }

    #[test]
    fn test_invalid_primitive_rejected() {
        let mut doc = GltfBuilder::new("test");
        let mut bad = triangle();
        bad.normals.pop();
        assert!(matches!(
            doc.add_mesh("bad", &[bad], None),
            Err(GltfError::InvalidPrimitive(_))
        ));
    }
}
