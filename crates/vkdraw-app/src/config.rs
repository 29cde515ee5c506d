// SPDX-License-Identifier: CEPL-1.0
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use vkdraw_render::{AppInfo, FrameSettings, PresentPreference};

pub const DEFAULT_PATH: &str = "vkdraw.toml";

#[derive(Debug, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct AppCfg {
    pub app: IdentityCfg,
    pub window: WindowCfg,
    pub render: RenderCfg,
    pub frame: FrameCfg,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct IdentityCfg {
    pub name: String,
    pub version: [u32; 3],
    pub engine: String,
    pub engine_version: [u32; 3],
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct WindowCfg {
    pub width: u32,
    pub height: u32,
    pub title: String,
}

#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PresentModeCfg {
    Fifo,
    #[default]
    Mailbox,
    Immediate,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct RenderCfg {
    pub clear_color: [f32; 4],
    pub present_mode: PresentModeCfg,
    pub validation: bool,
    pub vertex_shader: PathBuf,
    pub fragment_shader: PathBuf,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct FrameCfg {
    pub tick_hz: u32,
    pub log_fps: bool,
}

impl Default for IdentityCfg {
    fn default() -> Self {
        IdentityCfg {
            name: "VulkanDraw".into(),
            version: [1, 0, 0],
            engine: "vulkango.com".into(),
            engine_version: [1, 0, 0],
        }
    }
}

impl Default for WindowCfg {
    fn default() -> Self {
        WindowCfg {
            width: 1024,
            height: 768,
            title: "Vulkan Info".into(),
        }
    }
}

impl Default for RenderCfg {
    fn default() -> Self {
        RenderCfg {
            clear_color: default_clear(),
            present_mode: PresentModeCfg::Mailbox,
            validation: cfg!(debug_assertions),
            vertex_shader: "shaders/tri.vert.spv".into(),
            fragment_shader: "shaders/tri.frag.spv".into(),
        }
    }
}

impl Default for FrameCfg {
    fn default() -> Self {
        FrameCfg {
            tick_hz: 60_000,
            log_fps: true,
        }
    }
}

fn default_clear() -> [f32; 4] {
    [0.02, 0.02, 0.04, 1.0]
}

fn make_version([major, minor, patch]: [u32; 3]) -> u32 {
    ash::vk::make_api_version(0, major, minor, patch)
}

impl AppCfg {
    pub fn app_info(&self) -> AppInfo {
        AppInfo {
            application_name: self.app.name.clone(),
            application_version: make_version(self.app.version),
            engine_name: self.app.engine.clone(),
            engine_version: make_version(self.app.engine_version),
            ..AppInfo::default()
        }
    }

    pub fn frame_settings(&self) -> FrameSettings {
        let present = match self.render.present_mode {
            PresentModeCfg::Fifo => PresentPreference::Fifo,
            PresentModeCfg::Mailbox => PresentPreference::Mailbox,
            PresentModeCfg::Immediate => PresentPreference::Immediate,
        };
        FrameSettings {
            present,
            clear_color: self.render.clear_color,
            log_fps: self.frame.log_fps,
            ..FrameSettings::default()
        }
        .with_tick_hz(self.frame.tick_hz)
    }
}

pub fn parse(text: &str) -> Result<AppCfg, toml::de::Error> {
    toml::from_str(text)
}

/// Missing file gives defaults; a malformed one is reported and ignored.
pub fn load(path: &Path) -> AppCfg {
    match fs::read_to_string(path) {
        Ok(s) => match parse(&s) {
            Ok(cfg) => {
                info!("config: {}", path.display());
                cfg
            }
            Err(e) => {
                warn!("ignoring {}: {e}", path.display());
                AppCfg::default()
            }
        },
        Err(_) => AppCfg::default(),
    }
}
