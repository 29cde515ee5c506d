// SPDX-License-Identifier: CEPL-1.0
#![deny(unsafe_op_in_unsafe_fn)]
//! `GraphicsApi` over `ash`: the loader is resolved once in [`AshApi::load`],
//! every primitive maps onto one Vulkan entry point.

mod messenger;
mod shaders;

pub use shaders::{load_shader_code, load_spirv};

use ash::ext::debug_utils;
use ash::khr::{surface, swapchain};
use ash::{vk, Entry};
use raw_window_handle::{RawDisplayHandle, RawWindowHandle};
use std::ffi::{c_char, CStr, CString};
use tracing::{debug, info, warn};
use vkdraw_render::api::{
    ApiError, ApiResult, AppInfo, DrawCommands, GraphicsApi, PhysicalDeviceInfo, PipelineDesc,
    SubmitDesc, SwapchainDesc, VkResultExt,
};
use vkdraw_render::{RenderError, RenderResult};

const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";

/// Instance- and device-level function tables for one instance/device pair.
pub struct AshApi {
    entry: Entry,
    validation: bool,
    instance: Option<ash::Instance>,
    surface_fn: Option<surface::Instance>,
    debug: Option<(debug_utils::Instance, vk::DebugUtilsMessengerEXT)>,
    device: Option<ash::Device>,
    swapchain_fn: Option<swapchain::Device>,
}

fn missing(call: &'static str) -> ApiError {
    ApiError::new(call, vk::Result::ERROR_INITIALIZATION_FAILED)
}

fn to_cstrings(names: &[String]) -> RenderResult<Vec<CString>> {
    names
        .iter()
        .map(|n| {
            CString::new(n.as_str()).map_err(|_| RenderError::init(format!("bad extension name {n:?}")))
        })
        .collect()
}

/// Interior NULs cannot cross into Vulkan; rejected rather than truncated.
fn c_string(call: &'static str, s: &str) -> ApiResult<CString> {
    CString::new(s).map_err(|_| {
        warn!("{call}: {s:?} contains a NUL byte");
        ApiError::new(call, vk::Result::ERROR_INITIALIZATION_FAILED)
    })
}

fn c_name(raw: Result<&CStr, std::ffi::FromBytesUntilNulError>) -> String {
    raw.map(|c| c.to_string_lossy().into_owned())
        .unwrap_or_default()
}

impl AshApi {
    /// Loads the Vulkan loader library and its global entry points.
    pub fn load(validation: bool) -> RenderResult<Self> {
        // SAFETY: the loaded library stays alive as long as `entry`.
        let entry = unsafe { Entry::load() }
            .map_err(|e| RenderError::init(format!("loading the Vulkan library: {e}")))?;
        Ok(Self {
            entry,
            validation,
            instance: None,
            surface_fn: None,
            debug: None,
            device: None,
            swapchain_fn: None,
        })
    }

    /// Surface for a native window; handed to the device context as its
    /// surface factory.
    pub fn create_window_surface(
        &mut self,
        instance: vk::Instance,
        display: RawDisplayHandle,
        window: RawWindowHandle,
    ) -> RenderResult<vk::SurfaceKHR> {
        let inst = self.instance_for(instance, "vkCreateSurfaceKHR")?;
        // SAFETY: the raw handles come from a live window that outlives the surface.
        let surface =
            unsafe { ash_window::create_surface(&self.entry, inst, display, window, None) }
                .call("vkCreateSurfaceKHR")?;
        Ok(surface)
    }

    fn instance_for(&self, handle: vk::Instance, call: &'static str) -> ApiResult<&ash::Instance> {
        self.instance
            .as_ref()
            .filter(|i| i.handle() == handle)
            .ok_or(missing(call))
    }

    fn inst(&self, call: &'static str) -> ApiResult<&ash::Instance> {
        self.instance.as_ref().ok_or(missing(call))
    }

    fn surface_fn(&self, call: &'static str) -> ApiResult<&surface::Instance> {
        self.surface_fn.as_ref().ok_or(missing(call))
    }

    fn dev(&self, call: &'static str) -> ApiResult<&ash::Device> {
        self.device.as_ref().ok_or(missing(call))
    }

    fn swapchain_fn(&self, call: &'static str) -> ApiResult<&swapchain::Device> {
        self.swapchain_fn.as_ref().ok_or(missing(call))
    }

    fn layer_available(&self, layer: &CStr) -> bool {
        // SAFETY: plain global query.
        unsafe { self.entry.enumerate_instance_layer_properties() }
            .unwrap_or_default()
            .iter()
            .any(|l| l.layer_name_as_c_str() == Ok(layer))
    }

    // Destroy helpers for calls that cannot fail; a missing device is only
    // possible after a bug upstream, so it is logged and skipped.
    fn with_device(&self, what: &str, f: impl FnOnce(&ash::Device)) {
        match &self.device {
            Some(d) => f(d),
            None => warn!("{what}: no device, skipped"),
        }
    }
}

impl GraphicsApi for AshApi {
    fn instance_extensions(&self) -> ApiResult<Vec<String>> {
        // SAFETY: plain global query.
        let props = unsafe { self.entry.enumerate_instance_extension_properties(None) }
            .call("vkEnumerateInstanceExtensionProperties")?;
        Ok(props
            .iter()
            .map(|p| c_name(p.extension_name_as_c_str()))
            .collect())
    }

    fn create_instance(&mut self, app: &AppInfo, extensions: &[String]) -> ApiResult<vk::Instance> {
        let app_name = c_string("vkCreateInstance", &app.application_name)?;
        let engine_name = c_string("vkCreateInstance", &app.engine_name)?;
        let app_info = vk::ApplicationInfo {
            s_type: vk::StructureType::APPLICATION_INFO,
            p_application_name: app_name.as_ptr(),
            application_version: app.application_version,
            p_engine_name: engine_name.as_ptr(),
            engine_version: app.engine_version,
            api_version: app.api_version,
            ..Default::default()
        };

        let mut names = to_cstrings(extensions)
            .map_err(|_| ApiError::new("vkCreateInstance", vk::Result::ERROR_EXTENSION_NOT_PRESENT))?;
        let mut layers: Vec<*const c_char> = Vec::new();
        let validation = self.validation && self.layer_available(VALIDATION_LAYER);
        if self.validation && !validation {
            warn!("validation requested but {:?} is not installed", VALIDATION_LAYER);
        }
        if validation {
            layers.push(VALIDATION_LAYER.as_ptr());
            if !names.iter().any(|n| n.as_c_str() == debug_utils::NAME) {
                names.push(debug_utils::NAME.to_owned());
            }
        }
        let ext_ptrs: Vec<*const c_char> = names.iter().map(|n| n.as_ptr()).collect();

        let create_info = vk::InstanceCreateInfo {
            s_type: vk::StructureType::INSTANCE_CREATE_INFO,
            p_application_info: &app_info,
            enabled_extension_count: ext_ptrs.len() as u32,
            pp_enabled_extension_names: ext_ptrs.as_ptr(),
            enabled_layer_count: layers.len() as u32,
            pp_enabled_layer_names: layers.as_ptr(),
            ..Default::default()
        };
        // SAFETY: every pointer in `create_info` outlives this call.
        let instance =
            unsafe { self.entry.create_instance(&create_info, None) }.call("vkCreateInstance")?;

        self.surface_fn = Some(surface::Instance::new(&self.entry, &instance));
        if validation {
            match messenger::create_messenger(&self.entry, &instance) {
                Ok(d) => self.debug = Some(d),
                Err(e) => warn!("debug messenger unavailable: {e}"),
            }
        }
        let handle = instance.handle();
        info!(
            "Vulkan instance: {} (validation {})",
            app.application_name,
            if validation { "on" } else { "off" }
        );
        self.instance = Some(instance);
        Ok(handle)
    }

    fn destroy_instance(&mut self, instance: vk::Instance) {
        let Some(inst) = self.instance.take_if(|i| i.handle() == instance) else {
            warn!("destroy_instance: unknown instance");
            return;
        };
        if let Some((loader, messenger)) = self.debug.take() {
            // SAFETY: the messenger belongs to this instance.
            unsafe { loader.destroy_debug_utils_messenger(messenger, None) };
        }
        self.surface_fn = None;
        // SAFETY: every child object was destroyed by the caller.
        unsafe { inst.destroy_instance(None) };
    }

    fn physical_devices(&self) -> ApiResult<Vec<vk::PhysicalDevice>> {
        let inst = self.inst("vkEnumeratePhysicalDevices")?;
        // SAFETY: `inst` is live.
        unsafe { inst.enumerate_physical_devices() }.call("vkEnumeratePhysicalDevices")
    }

    fn describe_physical_device(&self, phys: vk::PhysicalDevice) -> ApiResult<PhysicalDeviceInfo> {
        let inst = self.inst("vkGetPhysicalDeviceProperties")?;
        // SAFETY: `phys` was enumerated from `inst`.
        let (props, families, exts) = unsafe {
            (
                inst.get_physical_device_properties(phys),
                inst.get_physical_device_queue_family_properties(phys),
                inst.enumerate_device_extension_properties(phys)
                    .call("vkEnumerateDeviceExtensionProperties")?,
            )
        };
        Ok(PhysicalDeviceInfo {
            name: c_name(props.device_name_as_c_str()),
            device_type: props.device_type,
            queue_families: families.iter().map(|f| f.queue_flags).collect(),
            extensions: exts
                .iter()
                .map(|e| c_name(e.extension_name_as_c_str()))
                .collect(),
        })
    }

    fn memory_properties(&self, phys: vk::PhysicalDevice) -> vk::PhysicalDeviceMemoryProperties {
        match &self.instance {
            // SAFETY: `phys` was enumerated from this instance.
            Some(inst) => unsafe { inst.get_physical_device_memory_properties(phys) },
            None => vk::PhysicalDeviceMemoryProperties::default(),
        }
    }

    fn surface_support(
        &self,
        phys: vk::PhysicalDevice,
        queue_family: u32,
        surface: vk::SurfaceKHR,
    ) -> ApiResult<bool> {
        let call = "vkGetPhysicalDeviceSurfaceSupportKHR";
        let s = self.surface_fn(call)?;
        // SAFETY: all handles belong to the current instance.
        unsafe { s.get_physical_device_surface_support(phys, queue_family, surface) }.call(call)
    }

    fn surface_capabilities(
        &self,
        phys: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
    ) -> ApiResult<vk::SurfaceCapabilitiesKHR> {
        let call = "vkGetPhysicalDeviceSurfaceCapabilitiesKHR";
        let s = self.surface_fn(call)?;
        unsafe { s.get_physical_device_surface_capabilities(phys, surface) }.call(call)
    }

    fn surface_formats(
        &self,
        phys: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
    ) -> ApiResult<Vec<vk::SurfaceFormatKHR>> {
        let call = "vkGetPhysicalDeviceSurfaceFormatsKHR";
        let s = self.surface_fn(call)?;
        unsafe { s.get_physical_device_surface_formats(phys, surface) }.call(call)
    }

    fn surface_present_modes(
        &self,
        phys: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
    ) -> ApiResult<Vec<vk::PresentModeKHR>> {
        let call = "vkGetPhysicalDeviceSurfacePresentModesKHR";
        let s = self.surface_fn(call)?;
        unsafe { s.get_physical_device_surface_present_modes(phys, surface) }.call(call)
    }

    fn destroy_surface(&mut self, surface: vk::SurfaceKHR) {
        match &self.surface_fn {
            // SAFETY: the swapchain built on it is already gone.
            Some(s) => unsafe { s.destroy_surface(surface, None) },
            None => warn!("destroy_surface: no instance, skipped"),
        }
    }

    fn create_device(
        &mut self,
        phys: vk::PhysicalDevice,
        queue_family: u32,
        extensions: &[String],
    ) -> ApiResult<vk::Device> {
        let call = "vkCreateDevice";
        let inst = self.inst(call)?;
        let names = to_cstrings(extensions)
            .map_err(|_| ApiError::new(call, vk::Result::ERROR_EXTENSION_NOT_PRESENT))?;
        let ext_ptrs: Vec<*const c_char> = names.iter().map(|n| n.as_ptr()).collect();

        let priorities = [1.0f32];
        let queue_info = vk::DeviceQueueCreateInfo {
            s_type: vk::StructureType::DEVICE_QUEUE_CREATE_INFO,
            queue_family_index: queue_family,
            queue_count: 1,
            p_queue_priorities: priorities.as_ptr(),
            ..Default::default()
        };
        let create_info = vk::DeviceCreateInfo {
            s_type: vk::StructureType::DEVICE_CREATE_INFO,
            queue_create_info_count: 1,
            p_queue_create_infos: &queue_info,
            enabled_extension_count: ext_ptrs.len() as u32,
            pp_enabled_extension_names: ext_ptrs.as_ptr(),
            ..Default::default()
        };
        // SAFETY: `phys` belongs to `inst`; pointers outlive the call.
        let device = unsafe { inst.create_device(phys, &create_info, None) }.call(call)?;
        self.swapchain_fn = Some(swapchain::Device::new(inst, &device));
        let handle = device.handle();
        self.device = Some(device);
        Ok(handle)
    }

    fn device_queue(&self, queue_family: u32, index: u32) -> vk::Queue {
        match &self.device {
            // SAFETY: the family/index were part of device creation.
            Some(d) => unsafe { d.get_device_queue(queue_family, index) },
            None => vk::Queue::null(),
        }
    }

    fn device_wait_idle(&self) -> ApiResult<()> {
        let d = self.dev("vkDeviceWaitIdle")?;
        unsafe { d.device_wait_idle() }.call("vkDeviceWaitIdle")
    }

    fn destroy_device(&mut self, device: vk::Device) {
        let Some(d) = self.device.take_if(|d| d.handle() == device) else {
            warn!("destroy_device: unknown device");
            return;
        };
        self.swapchain_fn = None;
        // SAFETY: every device child was destroyed by the caller.
        unsafe { d.destroy_device(None) };
        debug!("device destroyed");
    }

    fn create_swapchain(&mut self, desc: &SwapchainDesc) -> ApiResult<vk::SwapchainKHR> {
        let call = "vkCreateSwapchainKHR";
        let sc = self.swapchain_fn(call)?;
        let create_info = vk::SwapchainCreateInfoKHR {
            s_type: vk::StructureType::SWAPCHAIN_CREATE_INFO_KHR,
            surface: desc.surface,
            min_image_count: desc.min_image_count,
            image_format: desc.format.format,
            image_color_space: desc.format.color_space,
            image_extent: desc.extent,
            image_array_layers: 1,
            image_usage: vk::ImageUsageFlags::COLOR_ATTACHMENT,
            image_sharing_mode: vk::SharingMode::EXCLUSIVE,
            pre_transform: desc.pre_transform,
            composite_alpha: vk::CompositeAlphaFlagsKHR::OPAQUE,
            present_mode: desc.present_mode,
            clipped: vk::TRUE,
            ..Default::default()
        };
        unsafe { sc.create_swapchain(&create_info, None) }.call(call)
    }

    fn swapchain_images(&self, swapchain: vk::SwapchainKHR) -> ApiResult<Vec<vk::Image>> {
        let call = "vkGetSwapchainImagesKHR";
        let sc = self.swapchain_fn(call)?;
        unsafe { sc.get_swapchain_images(swapchain) }.call(call)
    }

    fn destroy_swapchain(&mut self, swapchain: vk::SwapchainKHR) {
        match &self.swapchain_fn {
            Some(sc) => unsafe { sc.destroy_swapchain(swapchain, None) },
            None => warn!("destroy_swapchain: no device, skipped"),
        }
    }

    fn create_image_view(&mut self, image: vk::Image, format: vk::Format) -> ApiResult<vk::ImageView> {
        let call = "vkCreateImageView";
        let d = self.dev(call)?;
        let create_info = vk::ImageViewCreateInfo {
            s_type: vk::StructureType::IMAGE_VIEW_CREATE_INFO,
            image,
            view_type: vk::ImageViewType::TYPE_2D,
            format,
            subresource_range: vk::ImageSubresourceRange {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                base_mip_level: 0,
                level_count: 1,
                base_array_layer: 0,
                layer_count: 1,
            },
            ..Default::default()
        };
        unsafe { d.create_image_view(&create_info, None) }.call(call)
    }

    fn destroy_image_view(&mut self, view: vk::ImageView) {
        self.with_device("destroy_image_view", |d| unsafe {
            d.destroy_image_view(view, None)
        });
    }

    fn create_framebuffer(
        &mut self,
        render_pass: vk::RenderPass,
        attachments: &[vk::ImageView],
        extent: vk::Extent2D,
        layers: u32,
    ) -> ApiResult<vk::Framebuffer> {
        let call = "vkCreateFramebuffer";
        let d = self.dev(call)?;
        let create_info = vk::FramebufferCreateInfo {
            s_type: vk::StructureType::FRAMEBUFFER_CREATE_INFO,
            render_pass,
            attachment_count: attachments.len() as u32,
            p_attachments: attachments.as_ptr(),
            width: extent.width,
            height: extent.height,
            layers,
            ..Default::default()
        };
        unsafe { d.create_framebuffer(&create_info, None) }.call(call)
    }

    fn destroy_framebuffer(&mut self, framebuffer: vk::Framebuffer) {
        self.with_device("destroy_framebuffer", |d| unsafe {
            d.destroy_framebuffer(framebuffer, None)
        });
    }

    fn create_render_pass(&mut self, color_format: vk::Format) -> ApiResult<vk::RenderPass> {
        let call = "vkCreateRenderPass";
        let d = self.dev(call)?;

        // Render pass: single color attachment → present
        let color_att = vk::AttachmentDescription {
            format: color_format,
            samples: vk::SampleCountFlags::TYPE_1,
            load_op: vk::AttachmentLoadOp::CLEAR,
            store_op: vk::AttachmentStoreOp::STORE,
            stencil_load_op: vk::AttachmentLoadOp::DONT_CARE,
            stencil_store_op: vk::AttachmentStoreOp::DONT_CARE,
            initial_layout: vk::ImageLayout::UNDEFINED,
            final_layout: vk::ImageLayout::PRESENT_SRC_KHR,
            ..Default::default()
        };
        let att_ref = vk::AttachmentReference {
            attachment: 0,
            layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        };
        let subpass = vk::SubpassDescription {
            pipeline_bind_point: vk::PipelineBindPoint::GRAPHICS,
            color_attachment_count: 1,
            p_color_attachments: &att_ref,
            ..Default::default()
        };
        // The acquire semaphore is waited at colour output; the layout
        // transition must not start before that.
        let dependency = vk::SubpassDependency {
            src_subpass: vk::SUBPASS_EXTERNAL,
            dst_subpass: 0,
            src_stage_mask: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
            dst_stage_mask: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
            src_access_mask: vk::AccessFlags::empty(),
            dst_access_mask: vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
            ..Default::default()
        };
        let create_info = vk::RenderPassCreateInfo {
            s_type: vk::StructureType::RENDER_PASS_CREATE_INFO,
            attachment_count: 1,
            p_attachments: &color_att,
            subpass_count: 1,
            p_subpasses: &subpass,
            dependency_count: 1,
            p_dependencies: &dependency,
            ..Default::default()
        };
        unsafe { d.create_render_pass(&create_info, None) }.call(call)
    }

    fn destroy_render_pass(&mut self, render_pass: vk::RenderPass) {
        self.with_device("destroy_render_pass", |d| unsafe {
            d.destroy_render_pass(render_pass, None)
        });
    }

    fn create_command_pool(&mut self, queue_family: u32) -> ApiResult<vk::CommandPool> {
        let call = "vkCreateCommandPool";
        let d = self.dev(call)?;
        let create_info = vk::CommandPoolCreateInfo {
            s_type: vk::StructureType::COMMAND_POOL_CREATE_INFO,
            queue_family_index: queue_family,
            ..Default::default()
        };
        unsafe { d.create_command_pool(&create_info, None) }.call(call)
    }

    fn destroy_command_pool(&mut self, pool: vk::CommandPool) {
        self.with_device("destroy_command_pool", |d| unsafe {
            d.destroy_command_pool(pool, None)
        });
    }

    fn allocate_command_buffers(
        &mut self,
        pool: vk::CommandPool,
        count: u32,
    ) -> ApiResult<Vec<vk::CommandBuffer>> {
        let call = "vkAllocateCommandBuffers";
        let d = self.dev(call)?;
        let alloc_info = vk::CommandBufferAllocateInfo {
            s_type: vk::StructureType::COMMAND_BUFFER_ALLOCATE_INFO,
            command_pool: pool,
            level: vk::CommandBufferLevel::PRIMARY,
            command_buffer_count: count,
            ..Default::default()
        };
        unsafe { d.allocate_command_buffers(&alloc_info) }.call(call)
    }

    fn free_command_buffers(&mut self, pool: vk::CommandPool, buffers: &[vk::CommandBuffer]) {
        self.with_device("free_command_buffers", |d| unsafe {
            d.free_command_buffers(pool, buffers)
        });
    }

    fn record_draw(&mut self, cmd: vk::CommandBuffer, draw: &DrawCommands) -> ApiResult<()> {
        let d = self.dev("vkBeginCommandBuffer")?;
        let begin = vk::CommandBufferBeginInfo {
            s_type: vk::StructureType::COMMAND_BUFFER_BEGIN_INFO,
            ..Default::default()
        };
        let clears = [vk::ClearValue {
            color: vk::ClearColorValue {
                float32: draw.clear_color,
            },
        }];
        let rp_begin = vk::RenderPassBeginInfo {
            s_type: vk::StructureType::RENDER_PASS_BEGIN_INFO,
            render_pass: draw.render_pass,
            framebuffer: draw.framebuffer,
            render_area: vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent: draw.extent,
            },
            clear_value_count: clears.len() as u32,
            p_clear_values: clears.as_ptr(),
            ..Default::default()
        };

        // SAFETY: `cmd` is a fresh primary buffer from a pool of this device
        // and every bound object outlives the recording.
        unsafe {
            d.begin_command_buffer(cmd, &begin)
                .call("vkBeginCommandBuffer")?;
            d.cmd_begin_render_pass(cmd, &rp_begin, vk::SubpassContents::INLINE);
            d.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, draw.pipeline);
            d.cmd_bind_vertex_buffers(cmd, 0, &[draw.vertex_buffer], &[0]);
            match draw.index_buffer {
                Some((ibuf, count)) => {
                    d.cmd_bind_index_buffer(cmd, ibuf, 0, vk::IndexType::UINT32);
                    d.cmd_draw_indexed(cmd, count, 1, 0, 0, 0);
                }
                None => d.cmd_draw(cmd, draw.vertex_count, 1, 0, 0),
            }
            d.cmd_end_render_pass(cmd);
            d.end_command_buffer(cmd).call("vkEndCommandBuffer")
        }
    }

    fn create_semaphore(&mut self) -> ApiResult<vk::Semaphore> {
        let d = self.dev("vkCreateSemaphore")?;
        let create_info = vk::SemaphoreCreateInfo::default();
        unsafe { d.create_semaphore(&create_info, None) }.call("vkCreateSemaphore")
    }

    fn destroy_semaphore(&mut self, semaphore: vk::Semaphore) {
        self.with_device("destroy_semaphore", |d| unsafe {
            d.destroy_semaphore(semaphore, None)
        });
    }

    fn create_fence(&mut self, signaled: bool) -> ApiResult<vk::Fence> {
        let d = self.dev("vkCreateFence")?;
        let create_info = vk::FenceCreateInfo {
            s_type: vk::StructureType::FENCE_CREATE_INFO,
            flags: if signaled {
                vk::FenceCreateFlags::SIGNALED
            } else {
                vk::FenceCreateFlags::empty()
            },
            ..Default::default()
        };
        unsafe { d.create_fence(&create_info, None) }.call("vkCreateFence")
    }

    fn destroy_fence(&mut self, fence: vk::Fence) {
        self.with_device("destroy_fence", |d| unsafe { d.destroy_fence(fence, None) });
    }

    fn wait_for_fence(&mut self, fence: vk::Fence) -> ApiResult<()> {
        let d = self.dev("vkWaitForFences")?;
        unsafe { d.wait_for_fences(&[fence], true, u64::MAX) }.call("vkWaitForFences")
    }

    fn reset_fence(&mut self, fence: vk::Fence) -> ApiResult<()> {
        let d = self.dev("vkResetFences")?;
        unsafe { d.reset_fences(&[fence]) }.call("vkResetFences")
    }

    fn create_buffer(
        &mut self,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
    ) -> ApiResult<vk::Buffer> {
        let d = self.dev("vkCreateBuffer")?;
        let create_info = vk::BufferCreateInfo {
            s_type: vk::StructureType::BUFFER_CREATE_INFO,
            size,
            usage,
            sharing_mode: vk::SharingMode::EXCLUSIVE,
            ..Default::default()
        };
        unsafe { d.create_buffer(&create_info, None) }.call("vkCreateBuffer")
    }

    fn buffer_memory_requirements(&self, buffer: vk::Buffer) -> vk::MemoryRequirements {
        match &self.device {
            Some(d) => unsafe { d.get_buffer_memory_requirements(buffer) },
            None => vk::MemoryRequirements::default(),
        }
    }

    fn allocate_memory(
        &mut self,
        size: vk::DeviceSize,
        memory_type_index: u32,
    ) -> ApiResult<vk::DeviceMemory> {
        let d = self.dev("vkAllocateMemory")?;
        let alloc_info = vk::MemoryAllocateInfo {
            s_type: vk::StructureType::MEMORY_ALLOCATE_INFO,
            allocation_size: size,
            memory_type_index,
            ..Default::default()
        };
        unsafe { d.allocate_memory(&alloc_info, None) }.call("vkAllocateMemory")
    }

    fn bind_buffer_memory(&mut self, buffer: vk::Buffer, memory: vk::DeviceMemory) -> ApiResult<()> {
        let d = self.dev("vkBindBufferMemory")?;
        unsafe { d.bind_buffer_memory(buffer, memory, 0) }.call("vkBindBufferMemory")
    }

    fn write_memory(&mut self, memory: vk::DeviceMemory, bytes: &[u8]) -> ApiResult<()> {
        let d = self.dev("vkMapMemory")?;
        // SAFETY: host-visible + coherent memory of at least `bytes.len()`;
        // the mapping is released before returning.
        unsafe {
            let ptr = d
                .map_memory(
                    memory,
                    0,
                    bytes.len() as vk::DeviceSize,
                    vk::MemoryMapFlags::empty(),
                )
                .call("vkMapMemory")?;
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), ptr.cast::<u8>(), bytes.len());
            d.unmap_memory(memory);
        }
        Ok(())
    }

    fn destroy_buffer(&mut self, buffer: vk::Buffer) {
        self.with_device("destroy_buffer", |d| unsafe { d.destroy_buffer(buffer, None) });
    }

    fn free_memory(&mut self, memory: vk::DeviceMemory) {
        self.with_device("free_memory", |d| unsafe { d.free_memory(memory, None) });
    }

    fn create_shader_module(&mut self, code: &[u32]) -> ApiResult<vk::ShaderModule> {
        let d = self.dev("vkCreateShaderModule")?;
        let create_info = vk::ShaderModuleCreateInfo {
            s_type: vk::StructureType::SHADER_MODULE_CREATE_INFO,
            p_code: code.as_ptr(),
            code_size: std::mem::size_of_val(code),
            ..Default::default()
        };
        unsafe { d.create_shader_module(&create_info, None) }.call("vkCreateShaderModule")
    }

    fn destroy_shader_module(&mut self, module: vk::ShaderModule) {
        self.with_device("destroy_shader_module", |d| unsafe {
            d.destroy_shader_module(module, None)
        });
    }

    fn create_pipeline_layout(&mut self) -> ApiResult<vk::PipelineLayout> {
        let d = self.dev("vkCreatePipelineLayout")?;
        // No descriptors or push constants.
        let create_info = vk::PipelineLayoutCreateInfo {
            s_type: vk::StructureType::PIPELINE_LAYOUT_CREATE_INFO,
            ..Default::default()
        };
        unsafe { d.create_pipeline_layout(&create_info, None) }.call("vkCreatePipelineLayout")
    }

    fn destroy_pipeline_layout(&mut self, layout: vk::PipelineLayout) {
        self.with_device("destroy_pipeline_layout", |d| unsafe {
            d.destroy_pipeline_layout(layout, None)
        });
    }

    fn create_graphics_pipeline(&mut self, desc: &PipelineDesc) -> ApiResult<vk::Pipeline> {
        let call = "vkCreateGraphicsPipelines";
        let d = self.dev(call)?;
        let entry = c"main";

        let stages = [
            vk::PipelineShaderStageCreateInfo {
                s_type: vk::StructureType::PIPELINE_SHADER_STAGE_CREATE_INFO,
                stage: vk::ShaderStageFlags::VERTEX,
                module: desc.vertex_module,
                p_name: entry.as_ptr(),
                ..Default::default()
            },
            vk::PipelineShaderStageCreateInfo {
                s_type: vk::StructureType::PIPELINE_SHADER_STAGE_CREATE_INFO,
                stage: vk::ShaderStageFlags::FRAGMENT,
                module: desc.fragment_module,
                p_name: entry.as_ptr(),
                ..Default::default()
            },
        ];

        let vb = vk::VertexInputBindingDescription {
            binding: 0,
            stride: desc.vertex_layout.stride,
            input_rate: vk::VertexInputRate::VERTEX,
        };
        let va: Vec<vk::VertexInputAttributeDescription> = desc
            .vertex_layout
            .attributes
            .iter()
            .map(|&(location, format, offset)| vk::VertexInputAttributeDescription {
                location,
                binding: 0,
                format,
                offset,
            })
            .collect();
        let vertex_input = vk::PipelineVertexInputStateCreateInfo {
            s_type: vk::StructureType::PIPELINE_VERTEX_INPUT_STATE_CREATE_INFO,
            vertex_binding_description_count: 1,
            p_vertex_binding_descriptions: &vb,
            vertex_attribute_description_count: va.len() as u32,
            p_vertex_attribute_descriptions: va.as_ptr(),
            ..Default::default()
        };
        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo {
            s_type: vk::StructureType::PIPELINE_INPUT_ASSEMBLY_STATE_CREATE_INFO,
            topology: vk::PrimitiveTopology::TRIANGLE_LIST,
            ..Default::default()
        };
        // Fixed viewport: the pipeline is rebuilt with the swapchain.
        let viewport = vk::Viewport {
            x: 0.0,
            y: 0.0,
            width: desc.extent.width as f32,
            height: desc.extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        };
        let scissor = vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent: desc.extent,
        };
        let viewport_state = vk::PipelineViewportStateCreateInfo {
            s_type: vk::StructureType::PIPELINE_VIEWPORT_STATE_CREATE_INFO,
            viewport_count: 1,
            p_viewports: &viewport,
            scissor_count: 1,
            p_scissors: &scissor,
            ..Default::default()
        };
        let raster = vk::PipelineRasterizationStateCreateInfo {
            s_type: vk::StructureType::PIPELINE_RASTERIZATION_STATE_CREATE_INFO,
            polygon_mode: vk::PolygonMode::FILL,
            cull_mode: vk::CullModeFlags::NONE,
            front_face: vk::FrontFace::CLOCKWISE,
            line_width: 1.0,
            ..Default::default()
        };
        let multisample = vk::PipelineMultisampleStateCreateInfo {
            s_type: vk::StructureType::PIPELINE_MULTISAMPLE_STATE_CREATE_INFO,
            rasterization_samples: vk::SampleCountFlags::TYPE_1,
            ..Default::default()
        };
        // No blending; write all RGBA.
        let color_blend_att = vk::PipelineColorBlendAttachmentState {
            color_write_mask: vk::ColorComponentFlags::RGBA,
            blend_enable: vk::FALSE,
            ..Default::default()
        };
        let color_blend = vk::PipelineColorBlendStateCreateInfo {
            s_type: vk::StructureType::PIPELINE_COLOR_BLEND_STATE_CREATE_INFO,
            attachment_count: 1,
            p_attachments: &color_blend_att,
            ..Default::default()
        };

        let pipeline_info = vk::GraphicsPipelineCreateInfo {
            s_type: vk::StructureType::GRAPHICS_PIPELINE_CREATE_INFO,
            stage_count: stages.len() as u32,
            p_stages: stages.as_ptr(),
            p_vertex_input_state: &vertex_input,
            p_input_assembly_state: &input_assembly,
            p_viewport_state: &viewport_state,
            p_rasterization_state: &raster,
            p_multisample_state: &multisample,
            p_color_blend_state: &color_blend,
            layout: desc.layout,
            render_pass: desc.render_pass,
            subpass: 0,
            ..Default::default()
        };

        // SAFETY: all referenced state lives on this stack frame.
        let pipelines = unsafe {
            d.create_graphics_pipelines(
                vk::PipelineCache::null(),
                std::slice::from_ref(&pipeline_info),
                None,
            )
        }
        .map_err(|(_, code)| ApiError::new(call, code))?;
        pipelines
            .into_iter()
            .next()
            .ok_or(ApiError::new(call, vk::Result::ERROR_UNKNOWN))
    }

    fn destroy_pipeline(&mut self, pipeline: vk::Pipeline) {
        self.with_device("destroy_pipeline", |d| unsafe {
            d.destroy_pipeline(pipeline, None)
        });
    }

    fn acquire_next_image(
        &mut self,
        swapchain: vk::SwapchainKHR,
        signal: vk::Semaphore,
    ) -> ApiResult<(u32, bool)> {
        let call = "vkAcquireNextImageKHR";
        let sc = self.swapchain_fn(call)?;
        unsafe { sc.acquire_next_image(swapchain, u64::MAX, signal, vk::Fence::null()) }.call(call)
    }

    fn queue_submit(&mut self, queue: vk::Queue, submit: &SubmitDesc) -> ApiResult<()> {
        let d = self.dev("vkQueueSubmit")?;
        let wait_stage = vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT;
        let submit_info = vk::SubmitInfo {
            s_type: vk::StructureType::SUBMIT_INFO,
            wait_semaphore_count: 1,
            p_wait_semaphores: &submit.wait,
            p_wait_dst_stage_mask: &wait_stage,
            command_buffer_count: 1,
            p_command_buffers: &submit.command_buffer,
            signal_semaphore_count: 1,
            p_signal_semaphores: &submit.signal,
            ..Default::default()
        };
        unsafe { d.queue_submit(queue, std::slice::from_ref(&submit_info), submit.fence) }
            .call("vkQueueSubmit")
    }

    fn queue_present(
        &mut self,
        queue: vk::Queue,
        swapchain: vk::SwapchainKHR,
        image_index: u32,
        wait: vk::Semaphore,
    ) -> ApiResult<bool> {
        let call = "vkQueuePresentKHR";
        let sc = self.swapchain_fn(call)?;
        let present = vk::PresentInfoKHR {
            s_type: vk::StructureType::PRESENT_INFO_KHR,
            wait_semaphore_count: 1,
            p_wait_semaphores: &wait,
            swapchain_count: 1,
            p_swapchains: &swapchain,
            p_image_indices: &image_index,
            ..Default::default()
        };
        unsafe { sc.queue_present(queue, &present) }.call(call)
    }
}

impl Drop for AshApi {
    fn drop(&mut self) {
        if self.device.is_some() || self.instance.is_some() {
            warn!("Vulkan binding dropped with a live device or instance");
        }
    }
}
