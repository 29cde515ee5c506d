// SPDX-License-Identifier: CEPL-1.0
//! Startup chain, bounded-rate frame loop and reverse-order teardown.

use crate::api::{AppInfo, GraphicsApi, SubmitDesc};
use crate::buffer::{BufferInfo, Geometry};
use crate::device::DeviceContext;
use crate::error::{RenderError, RenderResult};
use crate::pipeline::{create_graphics_pipeline, GfxPipelineInfo, ShaderCode};
use crate::renderer::{create_renderer, RenderInfo};
use crate::swapchain::{PresentPreference, SwapchainInfo};
use crate::WindowSystem;
use ash::vk;
use crossbeam::channel::{select, tick};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, trace, warn};
use vkdraw_core::shutdown::ShutdownListener;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FrameState {
    #[default]
    Uninitialized,
    Initialized,
    Running,
    Closing,
    Terminated,
}

#[derive(Clone, Debug)]
pub struct FrameSettings {
    /// Loop granularity. Much shorter than a display refresh so a close
    /// request is seen almost immediately.
    pub tick_interval: Duration,
    pub present: PresentPreference,
    pub clear_color: [f32; 4],
    pub log_fps: bool,
}

impl Default for FrameSettings {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(1) / 60_000,
            present: PresentPreference::Mailbox,
            clear_color: [0.02, 0.02, 0.04, 1.0],
            log_fps: true,
        }
    }
}

impl FrameSettings {
    pub fn with_tick_hz(mut self, hz: u32) -> Self {
        self.tick_interval = Duration::from_secs(1) / hz.max(1);
        self
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FrameStats {
    pub frames: u64,
    pub recreations: u32,
    pub state: FrameState,
}

/// Per-iteration rate is diagnostic only; presented frames are summarised
/// once a second.
struct FpsCounter {
    enabled: bool,
    last_iteration: Instant,
    window_start: Instant,
    frames: u32,
}

impl FpsCounter {
    fn new(enabled: bool) -> Self {
        let now = Instant::now();
        Self {
            enabled,
            last_iteration: now,
            window_start: now,
            frames: 0,
        }
    }

    fn iteration(&mut self) {
        let now = Instant::now();
        let dt = now.duration_since(self.last_iteration).as_secs_f64();
        self.last_iteration = now;
        if dt > 0.0 {
            trace!(rate = 1.0 / dt, "loop iteration");
        }
    }

    fn frame(&mut self) {
        self.frames = self.frames.saturating_add(1);
        let now = Instant::now();
        if now.duration_since(self.window_start) >= Duration::from_secs(1) {
            if self.enabled {
                info!("fps ~ {}", self.frames);
            }
            self.frames = 0;
            self.window_start = now;
        }
    }
}

enum Wake {
    Exit,
    Tick,
}

/// Sole owner of every GPU object and of the window. Creation order:
/// device context, swapchain, renderer, framebuffers, buffers, pipeline,
/// command buffers. Teardown runs the reverse.
pub struct FrameOrchestrator<G: GraphicsApi, W: WindowSystem> {
    state: FrameState,
    settings: FrameSettings,
    window: W,
    window_released: bool,
    geometry: Geometry,
    shaders: ShaderCode,
    ctx: Option<DeviceContext<G>>,
    swapchain: Option<SwapchainInfo>,
    render: Option<RenderInfo>,
    buffers: Option<BufferInfo>,
    pipeline: Option<GfxPipelineInfo>,
    needs_recreate: bool,
    stats: FrameStats,
}

impl<G: GraphicsApi, W: WindowSystem> FrameOrchestrator<G, W> {
    pub fn new(window: W, settings: FrameSettings, geometry: Geometry, shaders: ShaderCode) -> Self {
        Self {
            state: FrameState::Uninitialized,
            settings,
            window,
            window_released: false,
            geometry,
            shaders,
            ctx: None,
            swapchain: None,
            render: None,
            buffers: None,
            pipeline: None,
            needs_recreate: false,
            stats: FrameStats::default(),
        }
    }

    /// Runs the whole creation chain. On failure everything created so far
    /// is destroyed again and the error is returned.
    pub fn initialize<F>(&mut self, api: G, app: &AppInfo, surface_factory: F) -> RenderResult<()>
    where
        F: FnOnce(&mut G, vk::Instance) -> RenderResult<vk::SurfaceKHR>,
    {
        if self.state != FrameState::Uninitialized {
            return Err(RenderError::init(format!(
                "initialize called in state {:?}",
                self.state
            )));
        }
        let required = self.window.required_instance_extensions()?;
        self.ctx = Some(DeviceContext::create(api, app, &required, surface_factory)?);

        if let Err(e) = self.build_chain() {
            error!("initialization failed, releasing partial resources: {e}");
            self.destroy_in_order();
            return Err(e);
        }
        self.state = FrameState::Initialized;
        info!("initialized");
        Ok(())
    }

    // Swapchain → renderer → framebuffers → buffers → pipeline → command
    // buffers. Buffers survive a swapchain recreation and are only made once.
    fn build_chain(&mut self) -> RenderResult<()> {
        let ctx = self
            .ctx
            .as_mut()
            .ok_or_else(|| RenderError::init("no device context"))?;
        let size = self.window.framebuffer_size();

        let sc = self
            .swapchain
            .insert(ctx.create_swapchain(size, self.settings.present)?);
        let render = self
            .render
            .insert(create_renderer(ctx, sc.display_format())?);
        sc.create_framebuffers(ctx, render.render_pass(), None)?;
        if self.buffers.is_none() {
            self.buffers = Some(ctx.create_buffers(&self.geometry)?);
        }
        let pipe = self.pipeline.insert(create_graphics_pipeline(
            ctx,
            &self.shaders,
            sc.display_size(),
            render.render_pass(),
        )?);
        let buffers = self
            .buffers
            .as_ref()
            .ok_or_else(|| RenderError::init("no geometry buffers"))?;
        render.create_command_buffers(
            ctx,
            sc.default_swapchain_len(),
            sc,
            pipe,
            buffers,
            self.settings.clear_color,
        )
    }

    /// Drives frames until the exit signal, then tears down and
    /// acknowledges. A fatal draw error ends the loop the same way and is
    /// returned afterwards.
    pub fn run(&mut self, shutdown: ShutdownListener) -> RenderResult<FrameStats> {
        if self.state != FrameState::Initialized {
            shutdown.acknowledge();
            return Err(RenderError::init(format!("run called in state {:?}", self.state)));
        }
        self.state = FrameState::Running;
        info!(
            "frame loop running at {:?} per tick",
            self.settings.tick_interval
        );

        let exit = shutdown.exit_signal().clone();
        let ticker = tick(self.settings.tick_interval);
        let mut fps = FpsCounter::new(self.settings.log_fps);
        let mut outcome = Ok(());

        loop {
            fps.iteration();
            let wake = select! {
                recv(exit) -> _ => Wake::Exit,
                recv(ticker) -> _ => Wake::Tick,
            };
            if let Wake::Exit = wake {
                break;
            }
            if shutdown.is_exit_requested() {
                continue;
            }
            if self.window.should_close() {
                info!("window asked to close");
                shutdown.request_exit();
                continue;
            }
            self.window.poll_events();

            let before = self.stats.frames;
            match self.draw_frame() {
                Ok(()) => {}
                Err(e) if e.is_recoverable() => {
                    debug!("{e}; recreating swapchain");
                    self.needs_recreate = true;
                }
                Err(e) => {
                    error!("frame failed: {e}");
                    outcome = Err(e);
                    shutdown.request_exit();
                }
            }
            if self.stats.frames > before {
                fps.frame();
            }
        }

        self.close();
        self.state = FrameState::Terminated;
        self.stats.state = self.state;
        shutdown.acknowledge();
        info!(
            "terminated after {} frames, {} swapchain recreations",
            self.stats.frames, self.stats.recreations
        );
        outcome.map(|()| self.stats)
    }

    // wait fence → acquire → reset fence → submit → present. The fence is
    // reset only once an image is in hand, so a stale acquire leaves it
    // signalled.
    fn draw_frame(&mut self) -> RenderResult<()> {
        if self.window.framebuffer_size().is_empty() {
            return Ok(());
        }
        if self.needs_recreate && !self.recreate_swapchain()? {
            return Ok(());
        }

        let (Some(ctx), Some(sc), Some(render)) =
            (self.ctx.as_mut(), self.swapchain.as_ref(), self.render.as_ref())
        else {
            return Err(RenderError::init("draw without a swapchain"));
        };
        let queue = ctx.queue();
        let sync = render.sync();
        let api = ctx.api_mut();

        api.wait_for_fence(sync.in_flight)?;
        let (index, acquire_suboptimal) =
            match api.acquire_next_image(sc.handle(), sync.image_available) {
                Ok(v) => v,
                Err(e) if e.is_out_of_date() => {
                    return Err(RenderError::SwapchainStale { call: e.call })
                }
                Err(e) => return Err(e.into()),
            };
        let command_buffer = render.command_buffer(index).ok_or_else(|| {
            RenderError::init(format!("no command buffer for swapchain image {index}"))
        })?;

        api.reset_fence(sync.in_flight)?;
        api.queue_submit(
            queue,
            &SubmitDesc {
                command_buffer,
                wait: sync.image_available,
                signal: sync.render_finished,
                fence: sync.in_flight,
            },
        )?;
        let present_suboptimal =
            match api.queue_present(queue, sc.handle(), index, sync.render_finished) {
                Ok(s) => s,
                Err(e) if e.is_out_of_date() => {
                    return Err(RenderError::SwapchainStale { call: e.call })
                }
                Err(e) => return Err(e.into()),
            };

        self.stats.frames += 1;
        if acquire_suboptimal || present_suboptimal {
            return Err(RenderError::SwapchainStale {
                call: "vkQueuePresentKHR",
            });
        }
        Ok(())
    }

    /// Swapchain, renderer and pipeline are rebuilt at the current window
    /// size; the device context and buffers stay. Returns `false` while the
    /// surface is 0x0: nothing is touched and the rebuild stays pending.
    fn recreate_swapchain(&mut self) -> RenderResult<bool> {
        let size = self.window.framebuffer_size();
        let ctx = self
            .ctx
            .as_mut()
            .ok_or_else(|| RenderError::init("no device context"))?;
        let extent = ctx.surface_extent(size)?;
        if extent.width == 0 || extent.height == 0 {
            trace!("surface is 0x0, swapchain recreation deferred");
            return Ok(false);
        }
        ctx.wait_idle()?;
        self.destroy_presentation();
        self.build_chain()?;
        self.needs_recreate = false;
        self.stats.recreations += 1;
        info!("swapchain recreated at {}x{}", extent.width, extent.height);
        Ok(true)
    }

    fn destroy_presentation(&mut self) {
        let Some(ctx) = self.ctx.as_mut() else {
            return;
        };
        if let Some(pipe) = self.pipeline.take() {
            pipe.destroy(ctx);
        }
        if let Some(render) = self.render.take() {
            render.destroy(ctx);
        }
        if let Some(sc) = self.swapchain.take() {
            sc.destroy(ctx);
        }
    }

    // STRICT TEARDOWN ORDER:
    // 1) wait for the GPU to go idle
    // 2) pipeline (+ layout)
    // 3) geometry buffers and their memory
    // 4) command buffers, pool, sync objects, render pass
    // 5) framebuffers, image views, swapchain
    // 6) device, surface, instance
    fn destroy_in_order(&mut self) {
        if let Some(ctx) = self.ctx.as_mut() {
            if let Err(e) = ctx.wait_idle() {
                warn!("device did not go idle before teardown: {e}");
            }
            if let Some(pipe) = self.pipeline.take() {
                pipe.destroy(ctx);
            }
            if let Some(buffers) = self.buffers.take() {
                buffers.destroy(ctx);
            }
            if let Some(render) = self.render.take() {
                render.destroy(ctx);
            }
            if let Some(sc) = self.swapchain.take() {
                sc.destroy(ctx);
            }
        }
        if let Some(ctx) = self.ctx.take() {
            ctx.destroy();
            debug!("GPU resources released");
        }
    }

    fn release_window(&mut self) {
        if !self.window_released {
            self.window.destroy();
            self.window.terminate();
            self.window_released = true;
        }
    }

    fn close(&mut self) {
        self.state = FrameState::Closing;
        info!("closing");
        self.destroy_in_order();
        self.release_window();
    }

    pub fn state(&self) -> FrameState {
        self.state
    }

    pub fn stats(&self) -> FrameStats {
        FrameStats {
            state: self.state,
            ..self.stats
        }
    }

    pub fn settings(&self) -> &FrameSettings {
        &self.settings
    }

    pub fn window(&self) -> &W {
        &self.window
    }

    pub fn context(&self) -> Option<&DeviceContext<G>> {
        self.ctx.as_ref()
    }

    pub fn swapchain(&self) -> Option<&SwapchainInfo> {
        self.swapchain.as_ref()
    }

    pub fn render_info(&self) -> Option<&RenderInfo> {
        self.render.as_ref()
    }

    pub fn pipeline(&self) -> Option<&GfxPipelineInfo> {
        self.pipeline.as_ref()
    }

    pub fn buffers(&self) -> Option<&BufferInfo> {
        self.buffers.as_ref()
    }
}

impl<G: GraphicsApi, W: WindowSystem> Drop for FrameOrchestrator<G, W> {
    fn drop(&mut self) {
        if self.ctx.is_some() {
            warn!("orchestrator dropped in state {:?}; tearing down", self.state);
            self.close();
            self.state = FrameState::Terminated;
        }
    }
}
