//! USF (engine scene format) support.
//!
//! Typed records for nodes, meshes, materials, animation splines and actor
//! descriptors, plus a binary reader and writer.
//!
//! ## Supported sections
//!
//! - Node header, transforms, property section, children
//! - Mesh: positions, normals, colour sets, named UV sets, one tangent set,
//!   faces, materials, 4-bone skinning, bones
//! - Animation splines and actor descriptors
//!
//! ## Not Yet Supported
//!
//! - LWI info, lights, cameras, navigation, decal projectors, ECS payloads
//! - Blend shapes
//!
//! # Example
//!
//! ```ignore
//! use usfconv_core::usf::read_usf;
//!
//! let scene = read_usf("marine.usf")?;
//! println!("Loaded {} nodes", scene.node_count());
//! ```

mod reader;
mod types;
mod writer;

pub use reader::*;
pub use types::*;
pub use writer::*;
