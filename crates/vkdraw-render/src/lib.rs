// SPDX-License-Identifier: CEPL-1.0
#![deny(unsafe_op_in_unsafe_fn)]
pub mod api;
pub mod buffer;
pub mod device;
pub mod error;
pub mod orchestrator;
pub mod pipeline;
pub mod renderer;
pub mod swapchain;

#[cfg(test)]
mod testing;

pub use api::{ApiError, ApiResult, AppInfo, GraphicsApi, VkResultExt};
pub use buffer::{BufferInfo, Geometry, Vertex};
pub use device::DeviceContext;
pub use error::{RenderError, RenderResult};
pub use orchestrator::{FrameOrchestrator, FrameSettings, FrameState, FrameStats};
pub use pipeline::{GfxPipelineInfo, ShaderCode};
pub use renderer::RenderInfo;
pub use swapchain::{FramebufferOptions, PresentPreference, SwapchainInfo};

use ash::vk;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RenderSize {
    pub width: u32,
    pub height: u32,
}

impl RenderSize {
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

impl From<RenderSize> for vk::Extent2D {
    fn from(s: RenderSize) -> Self {
        vk::Extent2D {
            width: s.width,
            height: s.height,
        }
    }
}

impl From<vk::Extent2D> for RenderSize {
    fn from(e: vk::Extent2D) -> Self {
        RenderSize {
            width: e.width,
            height: e.height,
        }
    }
}

/// The windowing subsystem as seen by the frame loop. Window creation is the
/// implementor's constructor; surface creation is the factory closure handed
/// to [`DeviceContext::create`].
pub trait WindowSystem {
    fn required_instance_extensions(&self) -> RenderResult<Vec<String>>;
    /// Current drawable size in pixels; may be 0x0 while minimised.
    fn framebuffer_size(&self) -> RenderSize;
    fn poll_events(&mut self);
    fn should_close(&self) -> bool;
    fn destroy(&mut self);
    fn terminate(&mut self);
}
