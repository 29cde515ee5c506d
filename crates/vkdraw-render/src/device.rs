// SPDX-License-Identifier: CEPL-1.0
use crate::api::{AppInfo, GraphicsApi, PhysicalDeviceInfo};
use crate::error::{RenderError, RenderResult};
use ash::vk;
use tracing::{debug, info};

pub const SWAPCHAIN_EXTENSION: &str = "VK_KHR_swapchain";

/// Root owner of the GPU objects: API binding, instance, surface, device and
/// queue. Every other component borrows it for creation and destruction.
pub struct DeviceContext<G: GraphicsApi> {
    api: G,
    instance: vk::Instance,
    surface: vk::SurfaceKHR,
    phys: vk::PhysicalDevice,
    device_name: String,
    device: vk::Device,
    queue_family: u32,
    queue: vk::Queue,
}

impl<G: GraphicsApi> DeviceContext<G> {
    // STRICT ORDER:
    // 1) instance (with the window system's WSI extensions)
    // 2) surface FROM THIS INSTANCE
    // 3) physical device/queue family checked AGAINST THIS SURFACE
    // 4) logical device + queue
    // A failure at any step releases what the earlier steps created.
    pub fn create<F>(
        mut api: G,
        app: &AppInfo,
        required_extensions: &[String],
        surface_factory: F,
    ) -> RenderResult<Self>
    where
        F: FnOnce(&mut G, vk::Instance) -> RenderResult<vk::SurfaceKHR>,
    {
        let available = api.instance_extensions()?;
        if let Some(name) = required_extensions
            .iter()
            .find(|want| !available.iter().any(|have| have == *want))
        {
            return Err(RenderError::ExtensionMissing { name: name.clone() });
        }

        let instance = api.create_instance(app, required_extensions)?;
        debug!("instance created with {:?}", required_extensions);

        let surface = match surface_factory(&mut api, instance) {
            Ok(s) => s,
            Err(e) => {
                api.destroy_instance(instance);
                return Err(e);
            }
        };

        let picked = select_physical_device(&api, surface).and_then(|(phys, family, props)| {
            let device = api.create_device(phys, family, &[SWAPCHAIN_EXTENSION.to_owned()])?;
            Ok((phys, family, props, device))
        });
        let (phys, queue_family, props, device) = match picked {
            Ok(p) => p,
            Err(e) => {
                api.destroy_surface(surface);
                api.destroy_instance(instance);
                return Err(e);
            }
        };
        let queue = api.device_queue(queue_family, 0);

        info!(
            "device: {} ({:?}), queue family {}",
            props.name, props.device_type, queue_family
        );

        Ok(Self {
            api,
            instance,
            surface,
            phys,
            device_name: props.name,
            device,
            queue_family,
            queue,
        })
    }

    pub fn api(&self) -> &G {
        &self.api
    }

    pub fn api_mut(&mut self) -> &mut G {
        &mut self.api
    }

    pub fn instance(&self) -> vk::Instance {
        self.instance
    }

    pub fn surface(&self) -> vk::SurfaceKHR {
        self.surface
    }

    pub fn physical_device(&self) -> vk::PhysicalDevice {
        self.phys
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    pub fn device(&self) -> vk::Device {
        self.device
    }

    pub fn queue_family(&self) -> u32 {
        self.queue_family
    }

    pub fn queue(&self) -> vk::Queue {
        self.queue
    }

    pub fn wait_idle(&self) -> RenderResult<()> {
        Ok(self.api.device_wait_idle()?)
    }

    /// Device, then surface, then instance. Everything created from this
    /// context must already be gone. Hands the binding back.
    pub fn destroy(mut self) -> G {
        self.api.destroy_device(self.device);
        self.api.destroy_surface(self.surface);
        self.api.destroy_instance(self.instance);
        debug!("device context destroyed");
        self.api
    }
}

fn device_type_rank(t: vk::PhysicalDeviceType) -> u8 {
    match t {
        vk::PhysicalDeviceType::DISCRETE_GPU => 0,
        vk::PhysicalDeviceType::INTEGRATED_GPU => 1,
        vk::PhysicalDeviceType::VIRTUAL_GPU => 2,
        vk::PhysicalDeviceType::CPU => 3,
        _ => 4,
    }
}

/// First queue family with graphics that can also present to `surface`.
fn present_queue_family<G: GraphicsApi>(
    api: &G,
    phys: vk::PhysicalDevice,
    props: &PhysicalDeviceInfo,
    surface: vk::SurfaceKHR,
) -> Option<u32> {
    props
        .queue_families
        .iter()
        .enumerate()
        .filter(|(_, flags)| flags.contains(vk::QueueFlags::GRAPHICS))
        .map(|(i, _)| i as u32)
        .find(|&i| match api.surface_support(phys, i, surface) {
            Ok(supported) => supported,
            Err(e) => {
                debug!("{}: queue family {i} treated as unable to present: {e}", props.name);
                false
            }
        })
}

fn select_physical_device<G: GraphicsApi>(
    api: &G,
    surface: vk::SurfaceKHR,
) -> RenderResult<(vk::PhysicalDevice, u32, PhysicalDeviceInfo)> {
    let mut best: Option<(u8, vk::PhysicalDevice, u32, PhysicalDeviceInfo)> = None;

    for phys in api.physical_devices()? {
        let props = api.describe_physical_device(phys)?;
        if !props.extensions.iter().any(|e| e == SWAPCHAIN_EXTENSION) {
            debug!("skipping {}: no {}", props.name, SWAPCHAIN_EXTENSION);
            continue;
        }
        let Some(family) = present_queue_family(api, phys, &props, surface) else {
            debug!("skipping {}: no graphics queue can present", props.name);
            continue;
        };
        let rank = device_type_rank(props.device_type);
        if best.as_ref().map_or(true, |(r, ..)| rank < *r) {
            best = Some((rank, phys, family, props));
        }
    }

    best.map(|(_, phys, family, props)| (phys, family, props))
        .ok_or_else(|| RenderError::init("no physical device supports presentation to the surface"))
}
