//! usfconv core - USF scene files and glTF interchange.
//!
//! This crate provides:
//!
//! - **USF records**: `UsfScene`, `UsfNode`, `UsfMesh` plus a binary reader/writer
//! - **glTF documents**: reading and building `.gltf`/`.glb` through the `gltf` crate
//! - **Conversion**: both directions, with variant grouping, colour packing,
//!   skin binding, animation baking and hierarchy reconstruction
//!
//! # Example
//!
//! ```ignore
//! use usfconv_core::config::ConverterConfig;
//! use usfconv_core::convert::{gltf_to_usf, ImportOptions};
//! use usfconv_core::gltf::GltfDocument;
//! use usfconv_core::usf::write_usf;
//!
//! let doc = GltfDocument::open("marine.glb")?;
//! let result = gltf_to_usf(&doc, &ConverterConfig::default(), &ImportOptions::default())?;
//! for warning in &result.warnings {
//!     println!("warning: {}", warning);
//! }
//! write_usf(&result.output, "marine.usf")?;
//! ```

pub mod config;
pub mod convert;
pub mod gltf;
pub mod usf;

// Re-export commonly used types
pub use config::ConverterConfig;
pub use convert::{
    gltf_to_usf, usf_to_gltf, AssetKind, Conversion, ConversionWarning, ConvertError,
    ExportOptions, ImportOptions,
};
pub use self::gltf::{GltfBuilder, GltfDocument};
pub use usf::{read_usf, write_usf, UsfNode, UsfScene};
