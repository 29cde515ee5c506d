// SPDX-License-Identifier: CEPL-1.0
#![deny(unsafe_op_in_unsafe_fn)]
mod config;

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::info;
use vkdraw_core::init_tracing;
use vkdraw_core::shutdown::{self, ShutdownHandle};
use vkdraw_platform::WinitWindow;
use vkdraw_render::{FrameOrchestrator, Geometry};
use vkdraw_render_vk::{load_shader_code, AshApi};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// TOML config; missing file means defaults
    #[arg(long, default_value = config::DEFAULT_PATH)]
    config: PathBuf,
    #[arg(long)]
    width: Option<u32>,
    #[arg(long)]
    height: Option<u32>,
    /// Enable VK_LAYER_KHRONOS_validation
    #[arg(long)]
    validation: bool,
}

impl Args {
    fn apply(&self, cfg: &mut config::AppCfg) {
        if let Some(w) = self.width {
            cfg.window.width = w;
        }
        if let Some(h) = self.height {
            cfg.window.height = h;
        }
        if self.validation {
            cfg.render.validation = true;
        }
    }
}

// SIGINT/SIGTERM: ask the frame loop to exit, then hold the signal thread
// until teardown is acknowledged.
#[cfg(unix)]
fn install_signal_handler(shutdown: ShutdownHandle) -> Result<()> {
    use signal_hook::{
        consts::{SIGINT, SIGTERM},
        iterator::Signals,
    };
    let mut signals = Signals::new([SIGINT, SIGTERM]).context("installing signal handlers")?;
    std::thread::Builder::new()
        .name("signals".into())
        .spawn(move || {
            if let Some(sig) = signals.forever().next() {
                info!("signal {sig}: shutting down");
                shutdown.request_and_wait();
            }
        })
        .context("spawning the signal thread")?;
    Ok(())
}

#[cfg(not(unix))]
fn install_signal_handler(_shutdown: ShutdownHandle) -> Result<()> {
    Ok(())
}

fn main() -> Result<()> {
    init_tracing();
    let args = Args::parse();
    let mut cfg = config::load(&args.config);
    args.apply(&mut cfg);

    let window = WinitWindow::create(cfg.window.width, cfg.window.height, &cfg.window.title)?;
    let (display, handle) = window.raw_handles()?;
    let api = AshApi::load(cfg.render.validation).context("loading Vulkan")?;
    let shaders = load_shader_code(&cfg.render.vertex_shader, &cfg.render.fragment_shader);

    let (exit, listener) = shutdown::channel();
    install_signal_handler(exit)?;

    let mut frames =
        FrameOrchestrator::new(window, cfg.frame_settings(), Geometry::triangle(), shaders);
    frames
        .initialize(api, &cfg.app_info(), |api, instance| {
            api.create_window_surface(instance, display, handle)
        })
        .context("initializing Vulkan")?;
    if let Some(sc) = frames.swapchain() {
        info!("swapchain lengths: {}", sc.default_swapchain_len());
    }

    let stats = frames.run(listener).context("frame loop")?;
    info!(
        "{} frames, {} swapchain recreations",
        stats.frames, stats.recreations
    );
    info!("Bye!");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_overrides_config() {
        let args = Args::try_parse_from([
            "vkdraw",
            "--width",
            "640",
            "--validation",
            "--config",
            "alt.toml",
        ])
        .unwrap();
        let mut cfg = config::AppCfg::default();
        cfg.render.validation = false;

        args.apply(&mut cfg);

        assert_eq!(args.config, PathBuf::from("alt.toml"));
        assert_eq!(cfg.window.width, 640);
        assert_eq!(cfg.window.height, 768);
        assert!(cfg.render.validation);
    }

    #[test]
    fn defaults_to_local_config() {
        let args = Args::try_parse_from(["vkdraw"]).unwrap();
        assert_eq!(args.config, PathBuf::from(config::DEFAULT_PATH));
        assert!(!args.validation);
    }
}
