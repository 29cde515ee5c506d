// SPDX-License-Identifier: CEPL-1.0
use crate::api::{ApiError, GraphicsApi, SwapchainDesc};
use crate::device::DeviceContext;
use crate::error::{RenderError, RenderResult};
use crate::RenderSize;
use ash::vk;
use tracing::{debug, info};

/// Preferred present mode; FIFO is the fallback since it always exists.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PresentPreference {
    Fifo,
    #[default]
    Mailbox,
    Immediate,
}

impl PresentPreference {
    fn mode(self) -> vk::PresentModeKHR {
        match self {
            PresentPreference::Fifo => vk::PresentModeKHR::FIFO,
            PresentPreference::Mailbox => vk::PresentModeKHR::MAILBOX,
            PresentPreference::Immediate => vk::PresentModeKHR::IMMEDIATE,
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct FramebufferOptions {
    pub layers: u32,
}

impl Default for FramebufferOptions {
    fn default() -> Self {
        Self { layers: 1 }
    }
}

const PREFERRED_FORMATS: [vk::Format; 4] = [
    vk::Format::B8G8R8A8_UNORM,
    vk::Format::B8G8R8A8_SRGB,
    vk::Format::R8G8B8A8_UNORM,
    vk::Format::R8G8B8A8_SRGB,
];

/// Swapchain plus the per-image views and framebuffers.
///
/// Views and framebuffers only exist after [`SwapchainInfo::create_framebuffers`];
/// from then on `framebuffers == image_views == images`.
pub struct SwapchainInfo {
    swapchain: vk::SwapchainKHR,
    display_format: vk::Format,
    color_space: vk::ColorSpaceKHR,
    display_size: vk::Extent2D,
    present_mode: vk::PresentModeKHR,
    images: Vec<vk::Image>,
    image_views: Vec<vk::ImageView>,
    framebuffers: Vec<vk::Framebuffer>,
}

/// One more than the minimum, capped by the maximum (0 == "no max").
pub fn swapchain_len(caps: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let want = caps.min_image_count + 1;
    if caps.max_image_count == 0 {
        want
    } else {
        want.min(caps.max_image_count)
    }
}

pub fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> Option<vk::SurfaceFormatKHR> {
    // A lone UNDEFINED entry means the surface takes anything.
    if let [only] = formats {
        if only.format == vk::Format::UNDEFINED {
            return Some(vk::SurfaceFormatKHR {
                format: PREFERRED_FORMATS[0],
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            });
        }
    }
    PREFERRED_FORMATS.iter().find_map(|&want| {
        formats
            .iter()
            .copied()
            .find(|f| f.format == want && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR)
    })
}

pub fn choose_present_mode(
    modes: &[vk::PresentModeKHR],
    pref: PresentPreference,
) -> Option<vk::PresentModeKHR> {
    if modes.is_empty() {
        return None;
    }
    [pref.mode(), vk::PresentModeKHR::FIFO]
        .into_iter()
        .find(|m| modes.contains(m))
        .or(Some(modes[0]))
}

pub fn extent_from_caps(caps: &vk::SurfaceCapabilitiesKHR, want: RenderSize) -> vk::Extent2D {
    if caps.current_extent.width != u32::MAX {
        caps.current_extent
    } else {
        vk::Extent2D {
            width: want
                .width
                .clamp(caps.min_image_extent.width, caps.max_image_extent.width),
            height: want
                .height
                .clamp(caps.min_image_extent.height, caps.max_image_extent.height),
        }
    }
}

impl<G: GraphicsApi> DeviceContext<G> {
    /// Extent a swapchain made now would get; 0x0 while the window is
    /// minimised.
    pub fn surface_extent(&self, extent_hint: RenderSize) -> RenderResult<vk::Extent2D> {
        let caps = self
            .api()
            .surface_capabilities(self.physical_device(), self.surface())?;
        Ok(extent_from_caps(&caps, extent_hint))
    }

    pub fn create_swapchain(
        &mut self,
        extent_hint: RenderSize,
        present: PresentPreference,
    ) -> RenderResult<SwapchainInfo> {
        let (phys, surface) = (self.physical_device(), self.surface());
        let api = self.api_mut();

        let caps = api.surface_capabilities(phys, surface)?;
        let formats = api.surface_formats(phys, surface)?;
        let modes = api.surface_present_modes(phys, surface)?;

        let format = choose_surface_format(&formats).ok_or_else(|| RenderError::SurfaceIncompatible {
            reason: format!("none of {} offered formats is usable", formats.len()),
        })?;
        let present_mode =
            choose_present_mode(&modes, present).ok_or_else(|| RenderError::SurfaceIncompatible {
                reason: "surface reports no present modes".into(),
            })?;
        let extent = extent_from_caps(&caps, extent_hint);
        if extent.width == 0 || extent.height == 0 {
            return Err(RenderError::SurfaceIncompatible {
                reason: "surface extent is 0x0".into(),
            });
        }

        let pre_transform = if caps
            .supported_transforms
            .contains(vk::SurfaceTransformFlagsKHR::IDENTITY)
        {
            vk::SurfaceTransformFlagsKHR::IDENTITY
        } else {
            caps.current_transform
        };

        let desc = SwapchainDesc {
            surface,
            min_image_count: swapchain_len(&caps),
            format,
            extent,
            present_mode,
            pre_transform,
        };
        let swapchain = api.create_swapchain(&desc)?;
        let images = match api.swapchain_images(swapchain) {
            Ok(images) => images,
            Err(e) => {
                api.destroy_swapchain(swapchain);
                return Err(e.into());
            }
        };

        info!(
            "swapchain: {:?} / {:?}, {:?}, {}x{}, images(min={} → asked={} → got={})",
            format.format,
            format.color_space,
            present_mode,
            extent.width,
            extent.height,
            caps.min_image_count,
            desc.min_image_count,
            images.len()
        );

        Ok(SwapchainInfo {
            swapchain,
            display_format: format.format,
            color_space: format.color_space,
            display_size: extent,
            present_mode,
            images,
            image_views: Vec::new(),
            framebuffers: Vec::new(),
        })
    }
}

impl SwapchainInfo {
    /// One view and one framebuffer per image, bound to `render_pass`.
    /// All-or-nothing: on failure everything created here is released.
    pub fn create_framebuffers<G: GraphicsApi>(
        &mut self,
        ctx: &mut DeviceContext<G>,
        render_pass: vk::RenderPass,
        options: Option<&FramebufferOptions>,
    ) -> RenderResult<()> {
        if !self.framebuffers.is_empty() || !self.image_views.is_empty() {
            return Err(RenderError::init("framebuffers already exist for this swapchain"));
        }
        let layers = options.copied().unwrap_or_default().layers.max(1);
        let api = ctx.api_mut();

        let mut views = Vec::with_capacity(self.images.len());
        let mut framebuffers = Vec::with_capacity(self.images.len());
        let fail = |api: &mut G,
                    views: &[vk::ImageView],
                    fbs: &[vk::Framebuffer],
                    index: usize,
                    source: ApiError| {
            release(api, fbs, views);
            RenderError::FramebufferCreation { index, source }
        };

        for (i, &image) in self.images.iter().enumerate() {
            let view = match api.create_image_view(image, self.display_format) {
                Ok(v) => v,
                Err(e) => return Err(fail(api, &views, &framebuffers, i, e)),
            };
            views.push(view);

            match api.create_framebuffer(render_pass, &[view], self.display_size, layers) {
                Ok(fb) => framebuffers.push(fb),
                Err(e) => return Err(fail(api, &views, &framebuffers, i, e)),
            }
        }

        debug!("{} framebuffers created", framebuffers.len());
        self.image_views = views;
        self.framebuffers = framebuffers;
        Ok(())
    }

    /// Swapchain length N; sizes the command-buffer pool.
    pub fn default_swapchain_len(&self) -> usize {
        self.images.len()
    }

    pub fn handle(&self) -> vk::SwapchainKHR {
        self.swapchain
    }

    pub fn display_format(&self) -> vk::Format {
        self.display_format
    }

    pub fn color_space(&self) -> vk::ColorSpaceKHR {
        self.color_space
    }

    pub fn display_size(&self) -> vk::Extent2D {
        self.display_size
    }

    pub fn present_mode(&self) -> vk::PresentModeKHR {
        self.present_mode
    }

    pub fn images(&self) -> &[vk::Image] {
        &self.images
    }

    pub fn image_views(&self) -> &[vk::ImageView] {
        &self.image_views
    }

    pub fn framebuffers(&self) -> &[vk::Framebuffer] {
        &self.framebuffers
    }

    /// Framebuffers, then image views, then the swapchain itself.
    pub fn destroy<G: GraphicsApi>(self, ctx: &mut DeviceContext<G>) {
        let api = ctx.api_mut();
        release(api, &self.framebuffers, &self.image_views);
        api.destroy_swapchain(self.swapchain);
    }
}

fn release<G: GraphicsApi>(api: &mut G, framebuffers: &[vk::Framebuffer], views: &[vk::ImageView]) {
    for &fb in framebuffers.iter().rev() {
        api.destroy_framebuffer(fb);
    }
    for &iv in views.iter().rev() {
        api.destroy_image_view(iv);
    }
}
