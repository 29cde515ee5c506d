// SPDX-License-Identifier: CEPL-1.0
use crate::api::{ApiError, GraphicsApi, PipelineDesc};
use crate::buffer::Vertex;
use crate::device::DeviceContext;
use crate::error::{RenderError, RenderResult};
use ash::vk;
use tracing::debug;

pub const SPIRV_MAGIC: u32 = 0x0723_0203;

/// SPIR-V words per stage. Loading/compiling them is the caller's business.
#[derive(Clone, Debug, Default)]
pub struct ShaderCode {
    pub vertex: Option<Vec<u32>>,
    pub fragment: Option<Vec<u32>>,
}

impl ShaderCode {
    pub fn new(vertex: Vec<u32>, fragment: Vec<u32>) -> Self {
        Self {
            vertex: Some(vertex),
            fragment: Some(fragment),
        }
    }
}

/// Word-aligned by construction; checks the header magic and minimum size.
pub fn validate_spirv<'a>(stage: &str, code: Option<&'a [u32]>) -> RenderResult<&'a [u32]> {
    let code = code.ok_or_else(|| RenderError::PipelineCreation {
        reason: format!("{stage} shader stage is missing"),
    })?;
    // 5-word header: magic, version, generator, bound, schema.
    if code.len() < 5 {
        return Err(RenderError::PipelineCreation {
            reason: format!("{stage} shader is {} words, shorter than a SPIR-V header", code.len()),
        });
    }
    if code[0] != SPIRV_MAGIC {
        return Err(RenderError::PipelineCreation {
            reason: format!("{stage} shader has bad SPIR-V magic {:#010x}", code[0]),
        });
    }
    Ok(code)
}

pub struct GfxPipelineInfo {
    layout: vk::PipelineLayout,
    pipeline: vk::Pipeline,
    viewport: vk::Extent2D,
    render_pass: vk::RenderPass,
}

// Bound to `render_pass` and `display_size`; a change to either needs a
// rebuild.
pub fn create_graphics_pipeline<G: GraphicsApi>(
    ctx: &mut DeviceContext<G>,
    shaders: &ShaderCode,
    display_size: vk::Extent2D,
    render_pass: vk::RenderPass,
) -> RenderResult<GfxPipelineInfo> {
    let vs_code = validate_spirv("vertex", shaders.vertex.as_deref())?;
    let fs_code = validate_spirv("fragment", shaders.fragment.as_deref())?;
    if render_pass == vk::RenderPass::null() {
        return Err(RenderError::PipelineCreation {
            reason: "no render pass to build against".into(),
        });
    }
    let failed = |e: ApiError| RenderError::PipelineCreation {
        reason: e.to_string(),
    };

    let api = ctx.api_mut();
    let vs = api.create_shader_module(vs_code).map_err(failed)?;
    let fs = match api.create_shader_module(fs_code) {
        Ok(m) => m,
        Err(e) => {
            api.destroy_shader_module(vs);
            return Err(failed(e));
        }
    };

    let built = api.create_pipeline_layout().and_then(|layout| {
        let desc = PipelineDesc {
            render_pass,
            layout,
            vertex_module: vs,
            fragment_module: fs,
            extent: display_size,
            vertex_layout: Vertex::layout(),
        };
        match api.create_graphics_pipeline(&desc) {
            Ok(pipeline) => Ok((layout, pipeline)),
            Err(e) => {
                api.destroy_pipeline_layout(layout);
                Err(e)
            }
        }
    });

    // Modules are only needed while the pipeline is compiled.
    api.destroy_shader_module(fs);
    api.destroy_shader_module(vs);

    let (layout, pipeline) = built.map_err(failed)?;
    debug!(
        "pipeline for {}x{}",
        display_size.width, display_size.height
    );
    Ok(GfxPipelineInfo {
        layout,
        pipeline,
        viewport: display_size,
        render_pass,
    })
}

impl GfxPipelineInfo {
    pub fn pipeline(&self) -> vk::Pipeline {
        self.pipeline
    }

    pub fn layout(&self) -> vk::PipelineLayout {
        self.layout
    }

    pub fn viewport(&self) -> vk::Extent2D {
        self.viewport
    }

    pub fn render_pass(&self) -> vk::RenderPass {
        self.render_pass
    }

    pub fn destroy<G: GraphicsApi>(self, ctx: &mut DeviceContext<G>) {
        let api = ctx.api_mut();
        api.destroy_pipeline(self.pipeline);
        api.destroy_pipeline_layout(self.layout);
    }
}
