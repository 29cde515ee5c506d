// SPDX-License-Identifier: CEPL-1.0
use crate::api::{ApiError, GraphicsApi, VertexLayout};
use crate::device::DeviceContext;
use crate::error::{RenderError, RenderResult};
use ash::vk;
use bytemuck::{Pod, Zeroable};
use tracing::debug;

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub pos: [f32; 3],
    pub color: [f32; 3],
}

impl Vertex {
    /// location 0 = position, location 1 = colour.
    pub fn layout() -> VertexLayout {
        VertexLayout {
            stride: std::mem::size_of::<Vertex>() as u32,
            attributes: vec![
                (0, vk::Format::R32G32B32_SFLOAT, 0),
                (1, vk::Format::R32G32B32_SFLOAT, std::mem::size_of::<[f32; 3]>() as u32),
            ],
        }
    }
}

const TRI_VERTS: &[Vertex] = &[
    // top (red)
    Vertex {
        pos: [0.0, -0.6, 0.0],
        color: [1.0, 0.0, 0.0],
    },
    // right (green)
    Vertex {
        pos: [0.5, 0.4, 0.0],
        color: [0.0, 1.0, 0.0],
    },
    // left (blue)
    Vertex {
        pos: [-0.5, 0.4, 0.0],
        color: [0.0, 0.0, 1.0],
    },
];
const TRI_IDXS: &[u32] = &[0, 1, 2];

/// Static geometry uploaded once at startup.
#[derive(Clone, Debug, PartialEq)]
pub struct Geometry {
    pub vertices: Vec<Vertex>,
    pub indices: Option<Vec<u32>>,
}

impl Geometry {
    pub fn triangle() -> Self {
        Self {
            vertices: TRI_VERTS.to_vec(),
            indices: Some(TRI_IDXS.to_vec()),
        }
    }
}

impl Default for Geometry {
    fn default() -> Self {
        Self::triangle()
    }
}

pub struct BufferInfo {
    vertex: (vk::Buffer, vk::DeviceMemory),
    index: Option<(vk::Buffer, vk::DeviceMemory)>,
    vertex_count: u32,
    index_count: u32,
}

/// First memory type allowed by `type_bits` that has every flag in `required`.
pub fn find_memory_type(
    props: &vk::PhysicalDeviceMemoryProperties,
    type_bits: u32,
    required: vk::MemoryPropertyFlags,
) -> Option<u32> {
    (0..props.memory_type_count.min(vk::MAX_MEMORY_TYPES as u32)).find(|&i| {
        (type_bits & (1 << i)) != 0
            && props.memory_types[i as usize]
                .property_flags
                .contains(required)
    })
}

fn oom(what: &str, e: ApiError) -> RenderError {
    if e.is_out_of_memory() {
        RenderError::OutOfDeviceMemory {
            reason: format!("{what}: {e}"),
        }
    } else {
        e.into()
    }
}

/// Buffer + host-visible memory holding `bytes`. Releases both on failure.
fn upload<G: GraphicsApi>(
    api: &mut G,
    mem_props: &vk::PhysicalDeviceMemoryProperties,
    what: &str,
    usage: vk::BufferUsageFlags,
    bytes: &[u8],
) -> RenderResult<(vk::Buffer, vk::DeviceMemory)> {
    let buf = api
        .create_buffer(bytes.len() as vk::DeviceSize, usage)
        .map_err(|e| oom(what, e))?;
    let req = api.buffer_memory_requirements(buf);
    let Some(type_index) = find_memory_type(
        mem_props,
        req.memory_type_bits,
        vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
    ) else {
        api.destroy_buffer(buf);
        return Err(RenderError::OutOfDeviceMemory {
            reason: format!("{what}: no host-visible coherent memory type"),
        });
    };
    let mem = match api.allocate_memory(req.size, type_index) {
        Ok(m) => m,
        Err(e) => {
            api.destroy_buffer(buf);
            return Err(oom(what, e));
        }
    };
    let filled = api
        .bind_buffer_memory(buf, mem)
        .and_then(|()| api.write_memory(mem, bytes));
    if let Err(e) = filled {
        api.destroy_buffer(buf);
        api.free_memory(mem);
        return Err(oom(what, e));
    }
    Ok((buf, mem))
}

impl<G: GraphicsApi> DeviceContext<G> {
    pub fn create_buffers(&mut self, geometry: &Geometry) -> RenderResult<BufferInfo> {
        if geometry.vertices.is_empty() {
            return Err(RenderError::init("geometry has no vertices"));
        }
        let mem_props = self.api().memory_properties(self.physical_device());
        let api = self.api_mut();

        let vertex = upload(
            api,
            &mem_props,
            "vertex buffer",
            vk::BufferUsageFlags::VERTEX_BUFFER,
            bytemuck::cast_slice(&geometry.vertices),
        )?;

        let index = match geometry.indices.as_deref() {
            Some(idx) if !idx.is_empty() => {
                match upload(
                    api,
                    &mem_props,
                    "index buffer",
                    vk::BufferUsageFlags::INDEX_BUFFER,
                    bytemuck::cast_slice(idx),
                ) {
                    Ok(b) => Some(b),
                    Err(e) => {
                        api.destroy_buffer(vertex.0);
                        api.free_memory(vertex.1);
                        return Err(e);
                    }
                }
            }
            _ => None,
        };

        let info = BufferInfo {
            vertex,
            index,
            vertex_count: geometry.vertices.len() as u32,
            index_count: geometry.indices.as_ref().map_or(0, |i| i.len() as u32),
        };
        debug!(
            "buffers: {} vertices, {} indices",
            info.vertex_count, info.index_count
        );
        Ok(info)
    }
}

impl BufferInfo {
    pub fn vertex_buffer(&self) -> vk::Buffer {
        self.vertex.0
    }

    pub fn vertex_count(&self) -> u32 {
        self.vertex_count
    }

    /// `(buffer, index count)` when the geometry is indexed.
    pub fn index_buffer(&self) -> Option<(vk::Buffer, u32)> {
        self.index.map(|(buf, _)| (buf, self.index_count))
    }

    /// Each buffer before the memory bound to it.
    pub fn destroy<G: GraphicsApi>(self, ctx: &mut DeviceContext<G>) {
        let api = ctx.api_mut();
        if let Some((buf, mem)) = self.index {
            api.destroy_buffer(buf);
            api.free_memory(mem);
        }
        api.destroy_buffer(self.vertex.0);
        api.free_memory(self.vertex.1);
    }
}
