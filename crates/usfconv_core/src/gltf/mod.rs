//! glTF 2.0 documents: reading and building through the `gltf` crate.

mod builder;
mod document;

pub use builder::GltfBuilder;
pub use document::*;
