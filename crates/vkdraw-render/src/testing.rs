// SPDX-License-Identifier: CEPL-1.0
//! Resource-tracking [`GraphicsApi`] and window used by the unit tests.
//!
//! Every created handle is recorded with the handles it depends on.
//! Destroying a handle that still has live dependants, destroying twice, or
//! destroying an unknown handle is logged as a violation instead of
//! panicking, so a test can inspect the whole run afterwards.

use crate::api::{
    ApiError, ApiResult, AppInfo, DrawCommands, GraphicsApi, PhysicalDeviceInfo, PipelineDesc,
    SubmitDesc, SwapchainDesc,
};
use crate::pipeline::{ShaderCode, SPIRV_MAGIC};
use crate::{RenderResult, RenderSize, WindowSystem};
use ash::vk::{self, Handle};
use std::cell::{Cell, RefCell};
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Kind {
    Instance,
    Surface,
    Device,
    Swapchain,
    Image,
    ImageView,
    Framebuffer,
    RenderPass,
    CommandPool,
    CommandBuffer,
    Semaphore,
    Fence,
    Buffer,
    Memory,
    ShaderModule,
    PipelineLayout,
    Pipeline,
}

struct Tracked {
    kind: Kind,
    deps: Vec<u64>,
    alive: bool,
}

#[derive(Default)]
pub struct Ledger {
    objects: HashMap<u64, Tracked>,
    created: Vec<Kind>,
    destroyed: Vec<Kind>,
    next: u64,
    pub violations: Vec<String>,
}

impl Ledger {
    fn create(&mut self, kind: Kind, deps: &[u64]) -> u64 {
        self.next += 1;
        let raw = 0x1000 + self.next;
        for d in deps {
            if !self.objects.get(d).is_some_and(|t| t.alive) {
                self.violations
                    .push(format!("{kind:?} created from dead or unknown handle {d:#x}"));
            }
        }
        self.objects.insert(
            raw,
            Tracked {
                kind,
                deps: deps.to_vec(),
                alive: true,
            },
        );
        self.created.push(kind);
        raw
    }

    fn add_dep(&mut self, raw: u64, dep: u64) {
        if let Some(t) = self.objects.get_mut(&raw) {
            t.deps.push(dep);
        }
    }

    fn destroy(&mut self, kind: Kind, raw: u64) {
        let Some(t) = self.objects.get(&raw) else {
            self.violations.push(format!("destroy of unknown {kind:?} {raw:#x}"));
            return;
        };
        if t.kind != kind {
            self.violations
                .push(format!("destroy of {:?} {raw:#x} as {kind:?}", t.kind));
            return;
        }
        if !t.alive {
            self.violations.push(format!("double destroy of {kind:?} {raw:#x}"));
            return;
        }
        // Swapchain images go away with their swapchain.
        let owned = |t: &Tracked| kind == Kind::Swapchain && t.kind == Kind::Image;
        let dependants: Vec<Kind> = self
            .objects
            .values()
            .filter(|t| t.alive && t.deps.contains(&raw) && !owned(t))
            .map(|t| t.kind)
            .collect();
        if !dependants.is_empty() {
            self.violations
                .push(format!("{kind:?} {raw:#x} destroyed while {dependants:?} still alive"));
        }
        for t in self.objects.values_mut() {
            if t.alive && t.deps.contains(&raw) && owned(t) {
                t.alive = false;
            }
        }
        if let Some(t) = self.objects.get_mut(&raw) {
            t.alive = false;
        }
        self.destroyed.push(kind);
    }

    fn is_alive(&self, raw: u64) -> bool {
        self.objects.get(&raw).is_some_and(|t| t.alive)
    }

    fn deps_of(&self, raw: u64) -> Vec<u64> {
        self.objects.get(&raw).map(|t| t.deps.clone()).unwrap_or_default()
    }

    pub fn live_of(&self, kind: Kind) -> usize {
        self.objects
            .values()
            .filter(|t| t.alive && t.kind == kind)
            .count()
    }

    pub fn live_count(&self) -> usize {
        self.objects.values().filter(|t| t.alive).count()
    }

    pub fn created_of(&self, kind: Kind) -> usize {
        self.created.iter().filter(|k| **k == kind).count()
    }

    pub fn created_count(&self) -> usize {
        self.created.len()
    }

    /// Explicit destroy calls, in order.
    pub fn destroy_order(&self) -> Vec<Kind> {
        self.destroyed.clone()
    }
}

#[derive(Clone, Debug)]
pub struct StubDevice {
    pub name: String,
    pub device_type: vk::PhysicalDeviceType,
    pub queue_families: Vec<vk::QueueFlags>,
    pub swapchain: bool,
}

impl StubDevice {
    pub fn new(name: &str, device_type: vk::PhysicalDeviceType) -> Self {
        Self {
            name: name.to_owned(),
            device_type,
            queue_families: vec![vk::QueueFlags::GRAPHICS | vk::QueueFlags::TRANSFER],
            swapchain: true,
        }
    }
}

pub struct StubConfig {
    pub instance_extensions: Vec<String>,
    pub present_support: bool,
    pub devices: Vec<StubDevice>,
    pub surface_caps: vk::SurfaceCapabilitiesKHR,
    pub surface_formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
    pub memory_properties: vk::PhysicalDeviceMemoryProperties,
    /// Images handed out beyond the requested minimum.
    pub extra_images: u32,
}

impl Default for StubConfig {
    fn default() -> Self {
        let mut memory_properties = vk::PhysicalDeviceMemoryProperties {
            memory_type_count: 2,
            ..Default::default()
        };
        memory_properties.memory_types[0].property_flags = vk::MemoryPropertyFlags::DEVICE_LOCAL;
        memory_properties.memory_types[1].property_flags =
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT;

        Self {
            instance_extensions: vec!["VK_KHR_surface".to_owned(), "VK_EXT_debug_utils".to_owned()],
            present_support: true,
            devices: vec![StubDevice::new("stub gpu", vk::PhysicalDeviceType::INTEGRATED_GPU)],
            surface_caps: vk::SurfaceCapabilitiesKHR {
                min_image_count: 2,
                max_image_count: 8,
                current_extent: vk::Extent2D {
                    width: u32::MAX,
                    height: u32::MAX,
                },
                min_image_extent: vk::Extent2D { width: 1, height: 1 },
                max_image_extent: vk::Extent2D {
                    width: 4096,
                    height: 4096,
                },
                supported_transforms: vk::SurfaceTransformFlagsKHR::IDENTITY,
                current_transform: vk::SurfaceTransformFlagsKHR::IDENTITY,
                ..Default::default()
            },
            surface_formats: vec![vk::SurfaceFormatKHR {
                format: vk::Format::B8G8R8A8_UNORM,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            }],
            present_modes: vec![vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX],
            memory_properties,
            extra_images: 0,
        }
    }
}

pub struct TrackingApi {
    pub config: StubConfig,
    ledger: Rc<RefCell<Ledger>>,
    failures: RefCell<HashMap<&'static str, (u32, vk::Result)>>,
    calls: RefCell<HashMap<&'static str, u32>>,
    device: u64,
    swapchain_images: HashMap<u64, u32>,
    next_image: u32,
    draws: Vec<DrawCommands>,
    bytes_written: usize,
    presents: usize,
    /// Signalled state per fence; submits complete immediately.
    fences: HashMap<u64, bool>,
    suboptimal: RefCell<HashMap<&'static str, u32>>,
}

fn raw<H: Handle>(h: H) -> u64 {
    h.as_raw()
}

fn handle<H: Handle>(raw: u64) -> H {
    H::from_raw(raw)
}

impl TrackingApi {
    pub fn new() -> Self {
        Self {
            config: StubConfig::default(),
            ledger: Rc::default(),
            failures: RefCell::default(),
            calls: RefCell::default(),
            device: 0,
            swapchain_images: HashMap::new(),
            next_image: 0,
            draws: Vec::new(),
            bytes_written: 0,
            presents: 0,
            fences: HashMap::new(),
            suboptimal: RefCell::default(),
        }
    }

    pub fn ledger(&self) -> Rc<RefCell<Ledger>> {
        Rc::clone(&self.ledger)
    }

    /// The `nth` call (1-based) to `call` fails with `code`.
    pub fn fail_on(&self, call: &'static str, nth: u32, code: vk::Result) {
        self.failures.borrow_mut().insert(call, (nth, code));
    }

    /// The `nth` successful call (1-based) to `vkAcquireNextImageKHR` or
    /// `vkQueuePresentKHR` reports a suboptimal swapchain.
    pub fn suboptimal_on(&self, call: &'static str, nth: u32) {
        self.suboptimal.borrow_mut().insert(call, nth);
    }

    fn is_suboptimal(&self, call: &'static str) -> bool {
        let n = self.calls_to(call);
        self.suboptimal.borrow().get(call).is_some_and(|&nth| nth == n)
    }

    fn violation(&self, what: String) {
        self.ledger.borrow_mut().violations.push(what);
    }

    pub fn create_test_surface(&mut self, instance: vk::Instance) -> vk::SurfaceKHR {
        handle(self.ledger.borrow_mut().create(Kind::Surface, &[raw(instance)]))
    }

    pub fn recorded_draws(&self) -> &[DrawCommands] {
        &self.draws
    }

    pub fn bytes_written(&self) -> usize {
        self.bytes_written
    }

    pub fn presents(&self) -> usize {
        self.presents
    }

    pub fn calls_to(&self, call: &'static str) -> u32 {
        self.calls.borrow().get(call).copied().unwrap_or(0)
    }

    fn check(&self, call: &'static str) -> ApiResult<()> {
        let mut calls = self.calls.borrow_mut();
        let n = calls.entry(call).or_default();
        *n += 1;
        match self.failures.borrow().get(call) {
            Some(&(nth, code)) if nth == *n => Err(ApiError::new(call, code)),
            _ => Ok(()),
        }
    }

    fn create(&mut self, call: &'static str, kind: Kind, deps: &[u64]) -> ApiResult<u64> {
        self.check(call)?;
        Ok(self.ledger.borrow_mut().create(kind, deps))
    }

    fn destroy<H: Handle>(&mut self, kind: Kind, h: H) {
        self.ledger.borrow_mut().destroy(kind, raw(h));
    }

    fn expect_alive(&self, what: &str, raw: u64) {
        let mut ledger = self.ledger.borrow_mut();
        if !ledger.is_alive(raw) {
            ledger.violations.push(format!("{what} uses dead handle {raw:#x}"));
        }
    }

    fn stub_device(&self, phys: vk::PhysicalDevice) -> Option<&StubDevice> {
        (raw(phys) as usize)
            .checked_sub(1)
            .and_then(|i| self.config.devices.get(i))
    }
}

impl GraphicsApi for TrackingApi {
    fn instance_extensions(&self) -> ApiResult<Vec<String>> {
        self.check("vkEnumerateInstanceExtensionProperties")?;
        Ok(self.config.instance_extensions.clone())
    }

    fn create_instance(&mut self, _app: &AppInfo, _extensions: &[String]) -> ApiResult<vk::Instance> {
        self.create("vkCreateInstance", Kind::Instance, &[]).map(handle)
    }

    fn destroy_instance(&mut self, instance: vk::Instance) {
        self.destroy(Kind::Instance, instance);
    }

    fn physical_devices(&self) -> ApiResult<Vec<vk::PhysicalDevice>> {
        self.check("vkEnumeratePhysicalDevices")?;
        Ok((1..=self.config.devices.len() as u64).map(handle).collect())
    }

    fn describe_physical_device(&self, phys: vk::PhysicalDevice) -> ApiResult<PhysicalDeviceInfo> {
        let dev = self
            .stub_device(phys)
            .ok_or(ApiError::new("vkGetPhysicalDeviceProperties", vk::Result::ERROR_UNKNOWN))?;
        let mut extensions = Vec::new();
        if dev.swapchain {
            extensions.push(crate::device::SWAPCHAIN_EXTENSION.to_owned());
        }
        Ok(PhysicalDeviceInfo {
            name: dev.name.clone(),
            device_type: dev.device_type,
            queue_families: dev.queue_families.clone(),
            extensions,
        })
    }

    fn memory_properties(&self, _phys: vk::PhysicalDevice) -> vk::PhysicalDeviceMemoryProperties {
        self.config.memory_properties
    }

    fn surface_support(
        &self,
        _phys: vk::PhysicalDevice,
        _queue_family: u32,
        _surface: vk::SurfaceKHR,
    ) -> ApiResult<bool> {
        self.check("vkGetPhysicalDeviceSurfaceSupportKHR")?;
        Ok(self.config.present_support)
    }

    fn surface_capabilities(
        &self,
        _phys: vk::PhysicalDevice,
        _surface: vk::SurfaceKHR,
    ) -> ApiResult<vk::SurfaceCapabilitiesKHR> {
        self.check("vkGetPhysicalDeviceSurfaceCapabilitiesKHR")?;
        Ok(self.config.surface_caps)
    }

    fn surface_formats(
        &self,
        _phys: vk::PhysicalDevice,
        _surface: vk::SurfaceKHR,
    ) -> ApiResult<Vec<vk::SurfaceFormatKHR>> {
        self.check("vkGetPhysicalDeviceSurfaceFormatsKHR")?;
        Ok(self.config.surface_formats.clone())
    }

    fn surface_present_modes(
        &self,
        _phys: vk::PhysicalDevice,
        _surface: vk::SurfaceKHR,
    ) -> ApiResult<Vec<vk::PresentModeKHR>> {
        self.check("vkGetPhysicalDeviceSurfacePresentModesKHR")?;
        Ok(self.config.present_modes.clone())
    }

    fn destroy_surface(&mut self, surface: vk::SurfaceKHR) {
        self.destroy(Kind::Surface, surface);
    }

    fn create_device(
        &mut self,
        _phys: vk::PhysicalDevice,
        _queue_family: u32,
        _extensions: &[String],
    ) -> ApiResult<vk::Device> {
        let instance = self
            .ledger
            .borrow()
            .objects
            .iter()
            .find(|(_, t)| t.alive && t.kind == Kind::Instance)
            .map(|(r, _)| *r)
            .unwrap_or(0);
        self.device = self.create("vkCreateDevice", Kind::Device, &[instance])?;
        Ok(handle(self.device))
    }

    fn device_queue(&self, queue_family: u32, index: u32) -> vk::Queue {
        handle(0x9000 + u64::from(queue_family) * 16 + u64::from(index))
    }

    fn device_wait_idle(&self) -> ApiResult<()> {
        self.check("vkDeviceWaitIdle")
    }

    fn destroy_device(&mut self, device: vk::Device) {
        self.destroy(Kind::Device, device);
    }

    fn create_swapchain(&mut self, desc: &SwapchainDesc) -> ApiResult<vk::SwapchainKHR> {
        let deps = [self.device, raw(desc.surface)];
        let sc = self.create("vkCreateSwapchainKHR", Kind::Swapchain, &deps)?;
        self.swapchain_images
            .insert(sc, desc.min_image_count + self.config.extra_images);
        Ok(handle(sc))
    }

    fn swapchain_images(&self, swapchain: vk::SwapchainKHR) -> ApiResult<Vec<vk::Image>> {
        self.check("vkGetSwapchainImagesKHR")?;
        let sc = raw(swapchain);
        let count = self.swapchain_images.get(&sc).copied().unwrap_or(0);
        let mut ledger = self.ledger.borrow_mut();
        Ok((0..count)
            .map(|_| handle(ledger.create(Kind::Image, &[sc])))
            .collect())
    }

    fn destroy_swapchain(&mut self, swapchain: vk::SwapchainKHR) {
        self.destroy(Kind::Swapchain, swapchain);
    }

    fn create_image_view(&mut self, image: vk::Image, _format: vk::Format) -> ApiResult<vk::ImageView> {
        let image = raw(image);
        let mut deps = vec![self.device, image];
        deps.extend(self.ledger.borrow().deps_of(image));
        self.create("vkCreateImageView", Kind::ImageView, &deps).map(handle)
    }

    fn destroy_image_view(&mut self, view: vk::ImageView) {
        self.destroy(Kind::ImageView, view);
    }

    fn create_framebuffer(
        &mut self,
        render_pass: vk::RenderPass,
        attachments: &[vk::ImageView],
        _extent: vk::Extent2D,
        _layers: u32,
    ) -> ApiResult<vk::Framebuffer> {
        self.expect_alive("vkCreateFramebuffer render pass", raw(render_pass));
        let mut deps = vec![self.device];
        deps.extend(attachments.iter().map(|v| raw(*v)));
        self.create("vkCreateFramebuffer", Kind::Framebuffer, &deps)
            .map(handle)
    }

    fn destroy_framebuffer(&mut self, framebuffer: vk::Framebuffer) {
        self.destroy(Kind::Framebuffer, framebuffer);
    }

    fn create_render_pass(&mut self, _color_format: vk::Format) -> ApiResult<vk::RenderPass> {
        let deps = [self.device];
        self.create("vkCreateRenderPass", Kind::RenderPass, &deps).map(handle)
    }

    fn destroy_render_pass(&mut self, render_pass: vk::RenderPass) {
        self.destroy(Kind::RenderPass, render_pass);
    }

    fn create_command_pool(&mut self, _queue_family: u32) -> ApiResult<vk::CommandPool> {
        let deps = [self.device];
        self.create("vkCreateCommandPool", Kind::CommandPool, &deps).map(handle)
    }

    fn destroy_command_pool(&mut self, pool: vk::CommandPool) {
        self.destroy(Kind::CommandPool, pool);
    }

    fn allocate_command_buffers(
        &mut self,
        pool: vk::CommandPool,
        count: u32,
    ) -> ApiResult<Vec<vk::CommandBuffer>> {
        self.check("vkAllocateCommandBuffers")?;
        let mut ledger = self.ledger.borrow_mut();
        Ok((0..count)
            .map(|_| handle(ledger.create(Kind::CommandBuffer, &[raw(pool)])))
            .collect())
    }

    fn free_command_buffers(&mut self, _pool: vk::CommandPool, buffers: &[vk::CommandBuffer]) {
        for &cmd in buffers {
            self.destroy(Kind::CommandBuffer, cmd);
        }
    }

    fn record_draw(&mut self, cmd: vk::CommandBuffer, draw: &DrawCommands) -> ApiResult<()> {
        self.check("vkBeginCommandBuffer")?;
        self.expect_alive("vkCmdBeginRenderPass framebuffer", raw(draw.framebuffer));
        self.expect_alive("vkCmdBindPipeline", raw(draw.pipeline));
        self.expect_alive("vkCmdBindVertexBuffers", raw(draw.vertex_buffer));
        self.check("vkEndCommandBuffer")?;
        self.expect_alive("vkEndCommandBuffer", raw(cmd));
        self.draws.push(*draw);
        Ok(())
    }

    fn create_semaphore(&mut self) -> ApiResult<vk::Semaphore> {
        let deps = [self.device];
        self.create("vkCreateSemaphore", Kind::Semaphore, &deps).map(handle)
    }

    fn destroy_semaphore(&mut self, semaphore: vk::Semaphore) {
        self.destroy(Kind::Semaphore, semaphore);
    }

    fn create_fence(&mut self, signaled: bool) -> ApiResult<vk::Fence> {
        let deps = [self.device];
        let fence = self.create("vkCreateFence", Kind::Fence, &deps)?;
        self.fences.insert(fence, signaled);
        Ok(handle(fence))
    }

    fn destroy_fence(&mut self, fence: vk::Fence) {
        self.destroy(Kind::Fence, fence);
    }

    fn wait_for_fence(&mut self, fence: vk::Fence) -> ApiResult<()> {
        self.expect_alive("vkWaitForFences", raw(fence));
        self.check("vkWaitForFences")?;
        // Nothing pending could ever signal it: a real device blocks forever.
        if self.fences.get(&raw(fence)) == Some(&false) {
            self.violation(format!("wait on unsignalled fence {:#x} with no pending submit", raw(fence)));
        }
        Ok(())
    }

    fn reset_fence(&mut self, fence: vk::Fence) -> ApiResult<()> {
        self.expect_alive("vkResetFences", raw(fence));
        self.check("vkResetFences")?;
        self.fences.insert(raw(fence), false);
        Ok(())
    }

    fn create_buffer(
        &mut self,
        _size: vk::DeviceSize,
        _usage: vk::BufferUsageFlags,
    ) -> ApiResult<vk::Buffer> {
        let deps = [self.device];
        self.create("vkCreateBuffer", Kind::Buffer, &deps).map(handle)
    }

    fn buffer_memory_requirements(&self, _buffer: vk::Buffer) -> vk::MemoryRequirements {
        vk::MemoryRequirements {
            size: 256,
            alignment: 16,
            memory_type_bits: u32::MAX,
        }
    }

    fn allocate_memory(
        &mut self,
        _size: vk::DeviceSize,
        _memory_type_index: u32,
    ) -> ApiResult<vk::DeviceMemory> {
        let deps = [self.device];
        self.create("vkAllocateMemory", Kind::Memory, &deps).map(handle)
    }

    fn bind_buffer_memory(&mut self, buffer: vk::Buffer, memory: vk::DeviceMemory) -> ApiResult<()> {
        self.check("vkBindBufferMemory")?;
        self.ledger.borrow_mut().add_dep(raw(buffer), raw(memory));
        Ok(())
    }

    fn write_memory(&mut self, memory: vk::DeviceMemory, bytes: &[u8]) -> ApiResult<()> {
        self.check("vkMapMemory")?;
        self.expect_alive("vkMapMemory", raw(memory));
        self.bytes_written += bytes.len();
        Ok(())
    }

    fn destroy_buffer(&mut self, buffer: vk::Buffer) {
        self.destroy(Kind::Buffer, buffer);
    }

    fn free_memory(&mut self, memory: vk::DeviceMemory) {
        self.destroy(Kind::Memory, memory);
    }

    fn create_shader_module(&mut self, _code: &[u32]) -> ApiResult<vk::ShaderModule> {
        let deps = [self.device];
        self.create("vkCreateShaderModule", Kind::ShaderModule, &deps)
            .map(handle)
    }

    fn destroy_shader_module(&mut self, module: vk::ShaderModule) {
        self.destroy(Kind::ShaderModule, module);
    }

    fn create_pipeline_layout(&mut self) -> ApiResult<vk::PipelineLayout> {
        let deps = [self.device];
        self.create("vkCreatePipelineLayout", Kind::PipelineLayout, &deps)
            .map(handle)
    }

    fn destroy_pipeline_layout(&mut self, layout: vk::PipelineLayout) {
        self.destroy(Kind::PipelineLayout, layout);
    }

    fn create_graphics_pipeline(&mut self, desc: &PipelineDesc) -> ApiResult<vk::Pipeline> {
        self.expect_alive("vkCreateGraphicsPipelines vertex module", raw(desc.vertex_module));
        self.expect_alive("vkCreateGraphicsPipelines fragment module", raw(desc.fragment_module));
        let deps = [self.device, raw(desc.layout), raw(desc.render_pass)];
        self.create("vkCreateGraphicsPipelines", Kind::Pipeline, &deps)
            .map(handle)
    }

    fn destroy_pipeline(&mut self, pipeline: vk::Pipeline) {
        self.destroy(Kind::Pipeline, pipeline);
    }

    fn acquire_next_image(
        &mut self,
        swapchain: vk::SwapchainKHR,
        signal: vk::Semaphore,
    ) -> ApiResult<(u32, bool)> {
        self.expect_alive("vkAcquireNextImageKHR swapchain", raw(swapchain));
        self.expect_alive("vkAcquireNextImageKHR semaphore", raw(signal));
        self.check("vkAcquireNextImageKHR")?;
        let count = self
            .swapchain_images
            .get(&raw(swapchain))
            .copied()
            .unwrap_or(1)
            .max(1);
        let index = self.next_image % count;
        self.next_image = self.next_image.wrapping_add(1);
        Ok((index, self.is_suboptimal("vkAcquireNextImageKHR")))
    }

    fn queue_submit(&mut self, _queue: vk::Queue, submit: &SubmitDesc) -> ApiResult<()> {
        self.expect_alive("vkQueueSubmit command buffer", raw(submit.command_buffer));
        self.expect_alive("vkQueueSubmit fence", raw(submit.fence));
        self.check("vkQueueSubmit")?;
        let fence = raw(submit.fence);
        if self.fences.get(&fence) != Some(&false) {
            self.violation(format!("submit with fence {fence:#x} not reset"));
        }
        self.fences.insert(fence, true);
        Ok(())
    }

    fn queue_present(
        &mut self,
        _queue: vk::Queue,
        swapchain: vk::SwapchainKHR,
        image_index: u32,
        wait: vk::Semaphore,
    ) -> ApiResult<bool> {
        self.expect_alive("vkQueuePresentKHR swapchain", raw(swapchain));
        self.expect_alive("vkQueuePresentKHR semaphore", raw(wait));
        let count = self.swapchain_images.get(&raw(swapchain)).copied().unwrap_or(0);
        if image_index >= count {
            self.ledger
                .borrow_mut()
                .violations
                .push(format!("present of image {image_index} of {count}"));
        }
        self.check("vkQueuePresentKHR")?;
        self.presents += 1;
        Ok(self.is_suboptimal("vkQueuePresentKHR"))
    }
}

/// Minimal valid-looking SPIR-V for both stages.
pub fn stub_shaders() -> ShaderCode {
    let words = vec![SPIRV_MAGIC, 0x0001_0000, 0, 8, 0];
    ShaderCode::new(words.clone(), words)
}

/// Window that asks to close on the `close_on`-th `should_close` check.
pub struct StubWindow {
    pub size: RenderSize,
    pub close_on: Option<u32>,
    /// Sizes applied one per `poll_events`, front first.
    pub resizes: VecDeque<RenderSize>,
    pub extensions: Vec<String>,
    pub polls: u32,
    pub destroyed: bool,
    /// Shared so another thread can observe the end of teardown.
    pub terminated: Arc<AtomicBool>,
    checks: Cell<u32>,
}

impl StubWindow {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            size: RenderSize { width, height },
            close_on: None,
            resizes: VecDeque::new(),
            extensions: vec!["VK_KHR_surface".to_owned()],
            polls: 0,
            destroyed: false,
            terminated: Arc::default(),
            checks: Cell::new(0),
        }
    }

    pub fn closing_on(mut self, nth: u32) -> Self {
        self.close_on = Some(nth);
        self
    }

    pub fn close_checks(&self) -> u32 {
        self.checks.get()
    }
}

impl WindowSystem for StubWindow {
    fn required_instance_extensions(&self) -> RenderResult<Vec<String>> {
        Ok(self.extensions.clone())
    }

    fn framebuffer_size(&self) -> RenderSize {
        self.size
    }

    fn poll_events(&mut self) {
        self.polls += 1;
        if let Some(size) = self.resizes.pop_front() {
            self.size = size;
        }
    }

    fn should_close(&self) -> bool {
        let n = self.checks.get() + 1;
        self.checks.set(n);
        self.close_on.is_some_and(|nth| n >= nth)
    }

    fn destroy(&mut self) {
        self.destroyed = true;
    }

    fn terminate(&mut self) {
        self.terminated.store(true, Ordering::SeqCst);
    }
}
