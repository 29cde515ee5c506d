// SPDX-License-Identifier: CEPL-1.0
use crate::api::{DrawCommands, GraphicsApi};
use crate::buffer::BufferInfo;
use crate::device::DeviceContext;
use crate::error::{RenderError, RenderResult};
use crate::pipeline::GfxPipelineInfo;
use crate::swapchain::SwapchainInfo;
use ash::vk;
use tracing::debug;

/// One frame in flight: acquire signals `image_available`, the submit waits on
/// it and signals `render_finished` for present, `in_flight` guards reuse.
#[derive(Clone, Copy, Debug)]
pub struct FrameSync {
    pub image_available: vk::Semaphore,
    pub render_finished: vk::Semaphore,
    pub in_flight: vk::Fence,
}

impl FrameSync {
    fn null() -> Self {
        Self {
            image_available: vk::Semaphore::null(),
            render_finished: vk::Semaphore::null(),
            in_flight: vk::Fence::null(),
        }
    }
}

pub struct RenderInfo {
    render_pass: vk::RenderPass,
    command_pool: vk::CommandPool,
    command_buffers: Vec<vk::CommandBuffer>,
    sync: FrameSync,
}

/// Render pass for `display_format` plus the frame sync objects.
/// Command buffers come later, once framebuffers and the pipeline exist.
pub fn create_renderer<G: GraphicsApi>(
    ctx: &mut DeviceContext<G>,
    display_format: vk::Format,
) -> RenderResult<RenderInfo> {
    let mut info = RenderInfo {
        render_pass: vk::RenderPass::null(),
        command_pool: vk::CommandPool::null(),
        command_buffers: Vec::new(),
        sync: FrameSync::null(),
    };
    let api = ctx.api_mut();

    let built = (|| {
        info.render_pass = api.create_render_pass(display_format)?;
        info.sync.image_available = api.create_semaphore()?;
        info.sync.render_finished = api.create_semaphore()?;
        // Signalled so the first frame does not wait forever.
        info.sync.in_flight = api.create_fence(true)?;
        Ok::<_, RenderError>(())
    })();

    match built {
        Ok(()) => {
            debug!("render pass for {:?}", display_format);
            Ok(info)
        }
        Err(e) => {
            info.destroy(ctx);
            Err(e)
        }
    }
}

impl RenderInfo {
    /// Records one primary command buffer per framebuffer. Any previous pool
    /// and buffers are released first, so this doubles as the rebuild path
    /// after a swapchain recreation.
    pub fn create_command_buffers<G: GraphicsApi>(
        &mut self,
        ctx: &mut DeviceContext<G>,
        count: usize,
        swapchain: &SwapchainInfo,
        pipeline: &GfxPipelineInfo,
        buffers: &BufferInfo,
        clear_color: [f32; 4],
    ) -> RenderResult<()> {
        let framebuffers = swapchain.framebuffers();
        if count != framebuffers.len() {
            return Err(RenderError::init(format!(
                "{count} command buffers requested for {} framebuffers",
                framebuffers.len()
            )));
        }
        self.release_commands(ctx);

        let family = ctx.queue_family();
        let api = ctx.api_mut();
        let pool = api.create_command_pool(family)?;
        let recorded = api
            .allocate_command_buffers(pool, count as u32)
            .map_err(RenderError::from)
            .and_then(|cmds| {
                for (&cmd, &framebuffer) in cmds.iter().zip(framebuffers) {
                    let draw = DrawCommands {
                        render_pass: self.render_pass,
                        framebuffer,
                        extent: swapchain.display_size(),
                        pipeline: pipeline.pipeline(),
                        vertex_buffer: buffers.vertex_buffer(),
                        vertex_count: buffers.vertex_count(),
                        index_buffer: buffers.index_buffer(),
                        clear_color,
                    };
                    if let Err(e) = api.record_draw(cmd, &draw) {
                        api.free_command_buffers(pool, &cmds);
                        return Err(e.into());
                    }
                }
                Ok(cmds)
            });

        match recorded {
            Ok(cmds) => {
                debug!("{} command buffers recorded", cmds.len());
                self.command_pool = pool;
                self.command_buffers = cmds;
                Ok(())
            }
            Err(e) => {
                api.destroy_command_pool(pool);
                Err(e)
            }
        }
    }

    pub fn render_pass(&self) -> vk::RenderPass {
        self.render_pass
    }

    pub fn command_pool(&self) -> vk::CommandPool {
        self.command_pool
    }

    pub fn command_buffers(&self) -> &[vk::CommandBuffer] {
        &self.command_buffers
    }

    pub fn command_buffer(&self, image_index: u32) -> Option<vk::CommandBuffer> {
        self.command_buffers.get(image_index as usize).copied()
    }

    pub fn sync(&self) -> FrameSync {
        self.sync
    }

    fn release_commands<G: GraphicsApi>(&mut self, ctx: &mut DeviceContext<G>) {
        let api = ctx.api_mut();
        if !self.command_buffers.is_empty() {
            api.free_command_buffers(self.command_pool, &self.command_buffers);
            self.command_buffers.clear();
        }
        if self.command_pool != vk::CommandPool::null() {
            api.destroy_command_pool(self.command_pool);
            self.command_pool = vk::CommandPool::null();
        }
    }

    /// Command buffers, pool, sync objects, render pass. Null handles (from a
    /// partially built renderer) are skipped.
    pub fn destroy<G: GraphicsApi>(mut self, ctx: &mut DeviceContext<G>) {
        self.release_commands(ctx);
        let api = ctx.api_mut();
        if self.sync.in_flight != vk::Fence::null() {
            api.destroy_fence(self.sync.in_flight);
        }
        if self.sync.render_finished != vk::Semaphore::null() {
            api.destroy_semaphore(self.sync.render_finished);
        }
        if self.sync.image_available != vk::Semaphore::null() {
            api.destroy_semaphore(self.sync.image_available);
        }
        if self.render_pass != vk::RenderPass::null() {
            api.destroy_render_pass(self.render_pass);
        }
    }
}
