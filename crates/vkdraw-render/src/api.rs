// SPDX-License-Identifier: CEPL-1.0
//! The graphics-API binding seam.
//!
//! Everything the lifecycle code needs from Vulkan goes through
//! [`GraphicsApi`]: one method per primitive create/destroy/query, with the
//! fixed-function detail (create-info structs, pNext chains) left to the
//! implementation. Handles are plain `ash::vk` handles so the same types flow
//! through the real binding and the test stub.

use ash::vk;
use thiserror::Error;

/// A failed primitive call: the Vulkan entry point and its status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("{call} failed: {code:?} ({})", .code.as_raw())]
pub struct ApiError {
    pub call: &'static str,
    pub code: vk::Result,
}

impl ApiError {
    pub fn new(call: &'static str, code: vk::Result) -> Self {
        Self { call, code }
    }

    pub fn is_out_of_date(&self) -> bool {
        self.code == vk::Result::ERROR_OUT_OF_DATE_KHR
    }

    pub fn is_out_of_memory(&self) -> bool {
        matches!(
            self.code,
            vk::Result::ERROR_OUT_OF_DEVICE_MEMORY | vk::Result::ERROR_OUT_OF_HOST_MEMORY
        )
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

/// Tags a raw `VkResult` with the call that produced it.
pub trait VkResultExt<T> {
    fn call(self, name: &'static str) -> ApiResult<T>;
}

impl<T> VkResultExt<T> for Result<T, vk::Result> {
    fn call(self, name: &'static str) -> ApiResult<T> {
        self.map_err(|code| ApiError::new(name, code))
    }
}

/// Application identity handed to instance creation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AppInfo {
    pub application_name: String,
    pub application_version: u32,
    pub engine_name: String,
    pub engine_version: u32,
    pub api_version: u32,
}

impl Default for AppInfo {
    fn default() -> Self {
        Self {
            application_name: "vkdraw".to_owned(),
            application_version: vk::make_api_version(0, 1, 0, 0),
            engine_name: "vkdraw".to_owned(),
            engine_version: vk::make_api_version(0, 1, 0, 0),
            api_version: vk::API_VERSION_1_0,
        }
    }
}

/// What device selection needs to know about one physical device.
#[derive(Clone, Debug)]
pub struct PhysicalDeviceInfo {
    pub name: String,
    pub device_type: vk::PhysicalDeviceType,
    /// Indexed by queue family.
    pub queue_families: Vec<vk::QueueFlags>,
    pub extensions: Vec<String>,
}

#[derive(Clone, Copy, Debug)]
pub struct SwapchainDesc {
    pub surface: vk::SurfaceKHR,
    pub min_image_count: u32,
    pub format: vk::SurfaceFormatKHR,
    pub extent: vk::Extent2D,
    pub present_mode: vk::PresentModeKHR,
    pub pre_transform: vk::SurfaceTransformFlagsKHR,
}

/// Vertex input layout for the single vertex binding.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VertexLayout {
    pub stride: u32,
    /// `(location, format, offset)` per attribute.
    pub attributes: Vec<(u32, vk::Format, u32)>,
}

#[derive(Clone, Debug)]
pub struct PipelineDesc {
    pub render_pass: vk::RenderPass,
    pub layout: vk::PipelineLayout,
    pub vertex_module: vk::ShaderModule,
    pub fragment_module: vk::ShaderModule,
    pub extent: vk::Extent2D,
    pub vertex_layout: VertexLayout,
}

/// Everything one prerecorded command buffer draws.
#[derive(Clone, Copy, Debug)]
pub struct DrawCommands {
    pub render_pass: vk::RenderPass,
    pub framebuffer: vk::Framebuffer,
    pub extent: vk::Extent2D,
    pub pipeline: vk::Pipeline,
    pub vertex_buffer: vk::Buffer,
    pub vertex_count: u32,
    /// `(buffer, index count)`; `u32` indices.
    pub index_buffer: Option<(vk::Buffer, u32)>,
    pub clear_color: [f32; 4],
}

#[derive(Clone, Copy, Debug)]
pub struct SubmitDesc {
    pub command_buffer: vk::CommandBuffer,
    pub wait: vk::Semaphore,
    pub signal: vk::Semaphore,
    pub fence: vk::Fence,
}

/// Primitive creation/destruction calls of the graphics API.
///
/// Device-level calls act on the device created by the last successful
/// [`GraphicsApi::create_device`]; instance-level calls on the last instance.
/// Destroy calls never fail.
pub trait GraphicsApi {
    // Instance
    fn instance_extensions(&self) -> ApiResult<Vec<String>>;
    fn create_instance(&mut self, app: &AppInfo, extensions: &[String]) -> ApiResult<vk::Instance>;
    fn destroy_instance(&mut self, instance: vk::Instance);
    fn physical_devices(&self) -> ApiResult<Vec<vk::PhysicalDevice>>;
    fn describe_physical_device(&self, phys: vk::PhysicalDevice) -> ApiResult<PhysicalDeviceInfo>;
    fn memory_properties(&self, phys: vk::PhysicalDevice) -> vk::PhysicalDeviceMemoryProperties;

    // Surface
    fn surface_support(
        &self,
        phys: vk::PhysicalDevice,
        queue_family: u32,
        surface: vk::SurfaceKHR,
    ) -> ApiResult<bool>;
    fn surface_capabilities(
        &self,
        phys: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
    ) -> ApiResult<vk::SurfaceCapabilitiesKHR>;
    fn surface_formats(
        &self,
        phys: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
    ) -> ApiResult<Vec<vk::SurfaceFormatKHR>>;
    fn surface_present_modes(
        &self,
        phys: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
    ) -> ApiResult<Vec<vk::PresentModeKHR>>;
    fn destroy_surface(&mut self, surface: vk::SurfaceKHR);

    // Device
    fn create_device(
        &mut self,
        phys: vk::PhysicalDevice,
        queue_family: u32,
        extensions: &[String],
    ) -> ApiResult<vk::Device>;
    fn device_queue(&self, queue_family: u32, index: u32) -> vk::Queue;
    fn device_wait_idle(&self) -> ApiResult<()>;
    fn destroy_device(&mut self, device: vk::Device);

    // Swapchain, views, framebuffers
    fn create_swapchain(&mut self, desc: &SwapchainDesc) -> ApiResult<vk::SwapchainKHR>;
    fn swapchain_images(&self, swapchain: vk::SwapchainKHR) -> ApiResult<Vec<vk::Image>>;
    fn destroy_swapchain(&mut self, swapchain: vk::SwapchainKHR);
    fn create_image_view(&mut self, image: vk::Image, format: vk::Format) -> ApiResult<vk::ImageView>;
    fn destroy_image_view(&mut self, view: vk::ImageView);
    fn create_framebuffer(
        &mut self,
        render_pass: vk::RenderPass,
        attachments: &[vk::ImageView],
        extent: vk::Extent2D,
        layers: u32,
    ) -> ApiResult<vk::Framebuffer>;
    fn destroy_framebuffer(&mut self, framebuffer: vk::Framebuffer);

    // Render pass, commands, sync
    fn create_render_pass(&mut self, color_format: vk::Format) -> ApiResult<vk::RenderPass>;
    fn destroy_render_pass(&mut self, render_pass: vk::RenderPass);
    fn create_command_pool(&mut self, queue_family: u32) -> ApiResult<vk::CommandPool>;
    fn destroy_command_pool(&mut self, pool: vk::CommandPool);
    fn allocate_command_buffers(
        &mut self,
        pool: vk::CommandPool,
        count: u32,
    ) -> ApiResult<Vec<vk::CommandBuffer>>;
    fn free_command_buffers(&mut self, pool: vk::CommandPool, buffers: &[vk::CommandBuffer]);
    fn record_draw(&mut self, cmd: vk::CommandBuffer, draw: &DrawCommands) -> ApiResult<()>;
    fn create_semaphore(&mut self) -> ApiResult<vk::Semaphore>;
    fn destroy_semaphore(&mut self, semaphore: vk::Semaphore);
    fn create_fence(&mut self, signaled: bool) -> ApiResult<vk::Fence>;
    fn destroy_fence(&mut self, fence: vk::Fence);
    fn wait_for_fence(&mut self, fence: vk::Fence) -> ApiResult<()>;
    fn reset_fence(&mut self, fence: vk::Fence) -> ApiResult<()>;

    // Buffers and memory
    fn create_buffer(
        &mut self,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
    ) -> ApiResult<vk::Buffer>;
    fn buffer_memory_requirements(&self, buffer: vk::Buffer) -> vk::MemoryRequirements;
    fn allocate_memory(
        &mut self,
        size: vk::DeviceSize,
        memory_type_index: u32,
    ) -> ApiResult<vk::DeviceMemory>;
    fn bind_buffer_memory(&mut self, buffer: vk::Buffer, memory: vk::DeviceMemory) -> ApiResult<()>;
    /// Map, copy `bytes` at offset 0, unmap.
    fn write_memory(&mut self, memory: vk::DeviceMemory, bytes: &[u8]) -> ApiResult<()>;
    fn destroy_buffer(&mut self, buffer: vk::Buffer);
    fn free_memory(&mut self, memory: vk::DeviceMemory);

    // Pipeline
    fn create_shader_module(&mut self, code: &[u32]) -> ApiResult<vk::ShaderModule>;
    fn destroy_shader_module(&mut self, module: vk::ShaderModule);
    fn create_pipeline_layout(&mut self) -> ApiResult<vk::PipelineLayout>;
    fn destroy_pipeline_layout(&mut self, layout: vk::PipelineLayout);
    fn create_graphics_pipeline(&mut self, desc: &PipelineDesc) -> ApiResult<vk::Pipeline>;
    fn destroy_pipeline(&mut self, pipeline: vk::Pipeline);

    // Frame
    /// `(image index, suboptimal)`.
    fn acquire_next_image(
        &mut self,
        swapchain: vk::SwapchainKHR,
        signal: vk::Semaphore,
    ) -> ApiResult<(u32, bool)>;
    fn queue_submit(&mut self, queue: vk::Queue, submit: &SubmitDesc) -> ApiResult<()>;
    /// Returns `true` when the swapchain is suboptimal.
    fn queue_present(
        &mut self,
        queue: vk::Queue,
        swapchain: vk::SwapchainKHR,
        image_index: u32,
        wait: vk::Semaphore,
    ) -> ApiResult<bool>;
}
