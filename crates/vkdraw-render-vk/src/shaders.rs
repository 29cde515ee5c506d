// SPDX-License-Identifier: CEPL-1.0
use ash::util::read_spv;
use std::fs::File;
use std::path::Path;
use tracing::{debug, warn};
use vkdraw_render::{RenderError, RenderResult, ShaderCode};

/// Reads a compiled SPIR-V file into words. Byte order and alignment are
/// handled by `read_spv`; a length that is not a multiple of 4 is an error.
pub fn load_spirv(path: impl AsRef<Path>) -> RenderResult<Vec<u32>> {
    let path = path.as_ref();
    let mut file = File::open(path)
        .map_err(|e| RenderError::init(format!("opening shader {}: {e}", path.display())))?;
    let words = read_spv(&mut file)
        .map_err(|e| RenderError::init(format!("reading SPIR-V {}: {e}", path.display())))?;
    debug!("loaded {} ({} words)", path.display(), words.len());
    Ok(words)
}

/// A stage that fails to load is left empty; pipeline creation reports it.
pub fn load_shader_code(vertex: impl AsRef<Path>, fragment: impl AsRef<Path>) -> ShaderCode {
    let stage = |path: &Path| match load_spirv(path) {
        Ok(words) => Some(words),
        Err(e) => {
            warn!("{e}");
            None
        }
    };
    ShaderCode {
        vertex: stage(vertex.as_ref()),
        fragment: stage(fragment.as_ref()),
    }
}
