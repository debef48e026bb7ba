//! Plain-old-data uniform records
//!
//! Layouts match the std140 rules of the shaders they feed; every field
//! group is padded to 16 bytes. `Pod` lets the records be copied into
//! mapped memory without an intermediate encoding step.

use bytemuck::{Pod, Zeroable};
use nalgebra::Matrix4;

/// Per-frame camera data, binding 0 of the shared set
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct CameraUniformData {
    /// World-to-view transform
    pub view: [[f32; 4]; 4],
    /// View-to-clip transform
    pub projection: [[f32; 4]; 4],
    /// Camera world position, w unused
    pub position: [f32; 4],
}

impl CameraUniformData {
    /// Build from nalgebra matrices and a world position
    pub fn new(view: &Matrix4<f32>, projection: &Matrix4<f32>, position: [f32; 3]) -> Self {
        Self {
            view: (*view).into(),
            projection: (*projection).into(),
            position: [position[0], position[1], position[2], 0.0],
        }
    }
}

impl Default for CameraUniformData {
    fn default() -> Self {
        Self::new(
            &Matrix4::identity(),
            &Matrix4::identity(),
            [0.0, 0.0, 0.0],
        )
    }
}

/// Everything the renderer needs from the application for one frame
#[derive(Debug, Clone)]
pub struct FrameUniforms {
    /// Camera state for this frame
    pub camera: CameraUniformData,
    /// Seconds since the previous frame
    pub delta_time: f32,
    /// Seconds since startup
    pub elapsed: f32,
}

impl Default for FrameUniforms {
    fn default() -> Self {
        Self {
            camera: CameraUniformData::default(),
            delta_time: 0.0,
            elapsed: 0.0,
        }
    }
}
