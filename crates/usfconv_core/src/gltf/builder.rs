//! Write-side glTF construction over `gltf::json`.
//!
//! `GltfBuilder` grows a JSON root and one binary buffer node by node;
//! `finish` validates the result into a `GltfDocument`.

use std::collections::BTreeMap;

use ::gltf::json;
use json::accessor::{ComponentType, GenericComponentType, Type};
use json::buffer::Target;
use json::mesh::{Mode, Semantic};
use json::validation::Checked::Valid;
use json::validation::USize64;
use serde_json::Value;
use usfconv_math::{Mat4, Quat, Transform, Vec3};

use super::document::{ChannelPath, GltfDocument, GltfError, GltfResult, PrimitiveData};

/// Incrementally built glTF document with a single default scene.
#[derive(Debug)]
pub struct GltfBuilder {
    root: json::Root,
    bin: Vec<u8>,
}

impl GltfBuilder {
    pub fn new(generator: &str) -> Self {
        let mut root = json::Root::default();
        root.asset = json::Asset {
            version: "2.0".to_string(),
            generator: Some(generator.to_string()),
            ..Default::default()
        };
        root.scenes.push(json::Scene {
            nodes: Vec::new(),
            name: None,
            extensions: Default::default(),
            extras: Default::default(),
        });
        root.scene = Some(json::Index::new(0));
        Self {
            root,
            bin: Vec::new(),
        }
    }

    pub fn node_count(&self) -> usize {
        self.root.nodes.len()
    }

    pub fn material_count(&self) -> usize {
        self.root.materials.len()
    }

    /// Attach the binary buffer and validate.
    pub fn finish(mut self) -> GltfResult<GltfDocument> {
        if !self.bin.is_empty() {
            self.root.buffers.push(json::Buffer {
                byte_length: USize64::from(self.bin.len()),
                uri: None,
                name: None,
                extensions: Default::default(),
                extras: Default::default(),
            });
        }
        log::debug!(
            "Built glTF: {} nodes, {} meshes, {} bytes of buffer data",
            self.root.nodes.len(),
            self.root.meshes.len(),
            self.bin.len()
        );
        GltfDocument::from_json(self.root, self.bin)
    }

    fn node_mut(&mut self, index: usize) -> GltfResult<&mut json::Node> {
        self.root
            .nodes
            .get_mut(index)
            .ok_or(GltfError::MissingIndex { kind: "node", index })
    }

    /// Create a node. Without a parent it becomes a root of the default scene.
    pub fn add_node(&mut self, name: &str, local: Mat4, parent: Option<usize>) -> GltfResult<usize> {
        let index = self.root.nodes.len();
        let node_ref = json::Index::new(index as u32);
        match parent {
            Some(p) => self
                .node_mut(p)?
                .children
                .get_or_insert_with(Vec::new)
                .push(node_ref),
            None => {
                if let Some(scene) = self.root.scenes.first_mut() {
                    scene.nodes.push(node_ref);
                }
            }
        }

        let t = Transform::from_matrix(local);
        self.root.nodes.push(json::Node {
            name: Some(name.to_string()),
            translation: (t.translation != Vec3::ZERO).then(|| t.translation.to_array()),
            rotation: (t.rotation != Quat::IDENTITY)
                .then(|| json::scene::UnitQuaternion(t.rotation.to_array())),
            scale: (t.scale != Vec3::ONE).then(|| t.scale.to_array()),
            ..Default::default()
        });
        Ok(index)
    }

    pub fn set_node_extras(&mut self, node: usize, extras: Value) -> GltfResult<()> {
        let raw = serde_json::value::to_raw_value(&extras)?;
        self.node_mut(node)?.extras = Some(raw);
        Ok(())
    }

    pub fn add_material(&mut self, name: &str, extras: Option<Value>) -> GltfResult<usize> {
        let extras = extras
            .map(|e| serde_json::value::to_raw_value(&e))
            .transpose()?;
        self.root.materials.push(json::Material {
            name: Some(name.to_string()),
            extras,
            ..Default::default()
        });
        Ok(self.root.materials.len() - 1)
    }

    /// Write the primitives' attribute arrays and register a mesh.
    pub fn add_mesh(
        &mut self,
        name: &str,
        primitives: &[PrimitiveData],
        extras: Option<Value>,
    ) -> GltfResult<usize> {
        let extras = extras
            .map(|e| serde_json::value::to_raw_value(&e))
            .transpose()?;
        let mut mesh = json::Mesh {
            name: Some(name.to_string()),
            primitives: Vec::with_capacity(primitives.len()),
            weights: None,
            extensions: Default::default(),
            extras,
        };

        for data in primitives {
            data.validate()?;
            let mut attributes = BTreeMap::new();

            let flat: Vec<f32> = data.positions.iter().flat_map(|v| v.to_array()).collect();
            attributes.insert(
                Valid(Semantic::Positions),
                self.add_float_accessor(&flat, Type::Vec3, Some(Target::ArrayBuffer), true),
            );
            if !data.normals.is_empty() {
                let flat: Vec<f32> = data.normals.iter().flat_map(|v| v.to_array()).collect();
                attributes.insert(
                    Valid(Semantic::Normals),
                    self.add_float_accessor(&flat, Type::Vec3, Some(Target::ArrayBuffer), false),
                );
            }
            if !data.tangents.is_empty() {
                let flat: Vec<f32> = data.tangents.iter().flat_map(|v| v.to_array()).collect();
                attributes.insert(
                    Valid(Semantic::Tangents),
                    self.add_float_accessor(&flat, Type::Vec4, Some(Target::ArrayBuffer), false),
                );
            }
            for (i, set) in data.uv_sets.iter().enumerate() {
                let flat: Vec<f32> = set.iter().flat_map(|v| v.to_array()).collect();
                attributes.insert(
                    Valid(Semantic::TexCoords(i as u32)),
                    self.add_float_accessor(&flat, Type::Vec2, Some(Target::ArrayBuffer), false),
                );
            }
            for (i, set) in data.color_sets.iter().enumerate() {
                let flat: Vec<f32> = set.iter().flat_map(|v| v.to_array()).collect();
                attributes.insert(
                    Valid(Semantic::Colors(i as u32)),
                    self.add_float_accessor(&flat, Type::Vec4, Some(Target::ArrayBuffer), false),
                );
            }
            if !data.joints.is_empty() {
                let bytes: Vec<u8> = data
                    .joints
                    .iter()
                    .flat_map(|j| j.iter().flat_map(|c| c.to_le_bytes()))
                    .collect();
                let view = self.push_view(&bytes, Some(Target::ArrayBuffer));
                attributes.insert(
                    Valid(Semantic::Joints(0)),
                    self.push_accessor(view, ComponentType::U16, data.joints.len(), Type::Vec4, None),
                );
            }
            if !data.weights.is_empty() {
                let flat: Vec<f32> = data.weights.iter().flat_map(|v| v.to_array()).collect();
                attributes.insert(
                    Valid(Semantic::Weights(0)),
                    self.add_float_accessor(&flat, Type::Vec4, Some(Target::ArrayBuffer), false),
                );
            }
            let indices = data
                .indices
                .as_ref()
                .map(|indices| self.add_index_accessor(indices));

            mesh.primitives.push(json::mesh::Primitive {
                attributes,
                indices,
                material: data.material.map(|m| json::Index::new(m as u32)),
                mode: Valid(Mode::Triangles),
                targets: None,
                extensions: Default::default(),
                extras: Default::default(),
            });
        }

        self.root.meshes.push(mesh);
        Ok(self.root.meshes.len() - 1)
    }

    pub fn attach_mesh(&mut self, node: usize, mesh: usize) -> GltfResult<()> {
        self.node_mut(node)?.mesh = Some(json::Index::new(mesh as u32));
        Ok(())
    }

    /// Register a skin over `joints` with one inverse bind matrix per joint.
    pub fn add_skin(&mut self, name: &str, joints: Vec<usize>, inverse_binds: &[Mat4]) -> usize {
        let flat: Vec<f32> = inverse_binds.iter().flat_map(|m| m.to_cols_array()).collect();
        let accessor =
            (!flat.is_empty()).then(|| self.add_float_accessor(&flat, Type::Mat4, None, false));
        self.root.skins.push(json::Skin {
            name: Some(name.to_string()),
            inverse_bind_matrices: accessor,
            joints: joints
                .into_iter()
                .map(|j| json::Index::new(j as u32))
                .collect(),
            skeleton: None,
            extensions: Default::default(),
            extras: Default::default(),
        });
        self.root.skins.len() - 1
    }

    pub fn attach_skin(&mut self, node: usize, skin: usize) -> GltfResult<()> {
        self.node_mut(node)?.skin = Some(json::Index::new(skin as u32));
        Ok(())
    }

    /// Add a LINEAR sampler/channel pair to the named animation, creating the
    /// animation on first use. `values` holds `path.width()` floats per key.
    pub fn add_animation_channel(
        &mut self,
        animation: &str,
        node: usize,
        path: ChannelPath,
        times: &[f32],
        values: &[f32],
    ) -> GltfResult<()> {
        if node >= self.root.nodes.len() {
            return Err(GltfError::MissingIndex { kind: "node", index: node });
        }
        let width = path.width();
        if values.len() != times.len() * width {
            return Err(GltfError::InvalidPrimitive(format!(
                "{} {} values for {} keys",
                values.len(),
                path.as_str(),
                times.len()
            )));
        }

        let input = self.add_float_accessor(times, Type::Scalar, None, true);
        let output_type = if width == 4 { Type::Vec4 } else { Type::Vec3 };
        let output = self.add_float_accessor(values, output_type, None, false);

        let anim_index = match self
            .root
            .animations
            .iter()
            .position(|a| a.name.as_deref() == Some(animation))
        {
            Some(i) => i,
            None => {
                self.root.animations.push(json::Animation {
                    name: Some(animation.to_string()),
                    channels: Vec::new(),
                    samplers: Vec::new(),
                    extensions: Default::default(),
                    extras: Default::default(),
                });
                self.root.animations.len() - 1
            }
        };

        let anim = &mut self.root.animations[anim_index];
        anim.samplers.push(json::animation::Sampler {
            input,
            output,
            interpolation: Valid(json::animation::Interpolation::Linear),
            extensions: Default::default(),
            extras: Default::default(),
        });
        anim.channels.push(json::animation::Channel {
            sampler: json::Index::new((anim.samplers.len() - 1) as u32),
            target: json::animation::Target {
                node: json::Index::new(node as u32),
                path: Valid(path.property()),
                extensions: Default::default(),
                extras: Default::default(),
            },
            extensions: Default::default(),
            extras: Default::default(),
        });
        Ok(())
    }

    /// Append bytes to the buffer (4-byte aligned) and create a view over them.
    fn push_view(&mut self, bytes: &[u8], target: Option<Target>) -> json::Index<json::buffer::View> {
        while self.bin.len() % 4 != 0 {
            self.bin.push(0);
        }
        let byte_offset = self.bin.len();
        self.bin.extend_from_slice(bytes);

        self.root.buffer_views.push(json::buffer::View {
            buffer: json::Index::new(0),
            byte_length: USize64::from(bytes.len()),
            byte_offset: Some(USize64::from(byte_offset)),
            byte_stride: None,
            target: target.map(Valid),
            name: None,
            extensions: Default::default(),
            extras: Default::default(),
        });
        json::Index::new((self.root.buffer_views.len() - 1) as u32)
    }

    fn push_accessor(
        &mut self,
        view: json::Index<json::buffer::View>,
        component_type: ComponentType,
        count: usize,
        type_: Type,
        bounds: Option<(Value, Value)>,
    ) -> json::Index<json::Accessor> {
        let (min, max) = match bounds {
            Some((min, max)) => (Some(min), Some(max)),
            None => (None, None),
        };
        self.root.accessors.push(json::Accessor {
            buffer_view: Some(view),
            byte_offset: Some(USize64(0)),
            count: USize64::from(count),
            component_type: Valid(GenericComponentType(component_type)),
            type_: Valid(type_),
            min,
            max,
            name: None,
            normalized: false,
            sparse: None,
            extensions: Default::default(),
            extras: Default::default(),
        });
        json::Index::new((self.root.accessors.len() - 1) as u32)
    }

    fn add_float_accessor(
        &mut self,
        values: &[f32],
        type_: Type,
        target: Option<Target>,
        with_bounds: bool,
    ) -> json::Index<json::Accessor> {
        let width = match type_ {
            Type::Scalar => 1,
            Type::Vec2 => 2,
            Type::Vec3 => 3,
            Type::Vec4 => 4,
            _ => 16,
        };
        let count = values.len() / width;

        // Empty position arrays still carry bounds
        let bounds = with_bounds.then(|| {
            let mut min = vec![f32::MAX; width];
            let mut max = vec![f32::MIN; width];
            for element in values.chunks_exact(width) {
                for (c, &v) in element.iter().enumerate() {
                    min[c] = min[c].min(v);
                    max[c] = max[c].max(v);
                }
            }
            if count == 0 {
                min = vec![0.0; width];
                max = vec![0.0; width];
            }
            (Value::from(min), Value::from(max))
        });

        let bytes: Vec<u8> = values.iter().flat_map(|v| v.to_le_bytes()).collect();
        let view = self.push_view(&bytes, target);
        self.push_accessor(view, ComponentType::F32, count, type_, bounds)
    }

    fn add_index_accessor(&mut self, indices: &[u32]) -> json::Index<json::Accessor> {
        let max_index = indices.iter().copied().max().unwrap_or(0);
        let (bytes, component_type): (Vec<u8>, ComponentType) = if max_index <= u16::MAX as u32 {
            (
                indices.iter().flat_map(|&i| (i as u16).to_le_bytes()).collect(),
                ComponentType::U16,
            )
        } else {
            (
                indices.iter().flat_map(|&i| i.to_le_bytes()).collect(),
                ComponentType::U32,
            )
        };
        let view = self.push_view(&bytes, Some(Target::ElementArrayBuffer));
        self.push_accessor(view, component_type, indices.len(), Type::Scalar, None)
    }
}
