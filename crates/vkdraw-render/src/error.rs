// SPDX-License-Identifier: CEPL-1.0
use crate::api::ApiError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("initialization failed: {reason}")]
    Initialization { reason: String },

    #[error("required instance extension {name} is not available")]
    ExtensionMissing { name: String },

    #[error("surface incompatible: {reason}")]
    SurfaceIncompatible { reason: String },

    #[error("out of device memory: {reason}")]
    OutOfDeviceMemory { reason: String },

    #[error("framebuffer {index} could not be created: {source}")]
    FramebufferCreation {
        index: usize,
        #[source]
        source: ApiError,
    },

    #[error("pipeline creation failed: {reason}")]
    PipelineCreation { reason: String },

    #[error("swapchain is out of date ({call})")]
    SwapchainStale { call: &'static str },

    #[error("window system: {reason}")]
    Window { reason: String },

    #[error(transparent)]
    Api(#[from] ApiError),
}

impl RenderError {
    pub fn init(reason: impl Into<String>) -> Self {
        Self::Initialization {
            reason: reason.into(),
        }
    }

    /// Only a stale swapchain is handled by recreation; everything else is
    /// fatal for the frame loop.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::SwapchainStale { .. })
    }
}

pub type RenderResult<T> = Result<T, RenderError>;
