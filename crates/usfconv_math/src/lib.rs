// Re-export glam for convenience
pub use glam::*;

// usfconv math types
mod frames;
mod transform;
pub use frames::{frame_times, quantize_length, FRAME_QUANTUM};
pub use transform::{Mat4Ext, Transform};
