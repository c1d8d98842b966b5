//! GPU-resident meshes.

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use minivk_resources::{MeshData, ModelVertex};
use minivk_rhi::buffer::AllocatedBuffer;
use minivk_rhi::device::Device;
use minivk_rhi::vertex::MeshVertex;
use minivk_rhi::{RhiError, RhiResult};

/// Converts loaded vertices to the layout the vertex shader expects.
pub fn to_gpu_vertices(vertices: &[ModelVertex]) -> Vec<MeshVertex> {
    vertices
        .iter()
        .map(|v| MeshVertex::new(v.position, v.normal, v.color))
        .collect()
}

/// A non-indexed triangle list in a host-visible vertex buffer.
pub struct Mesh {
    vertex_buffer: AllocatedBuffer,
    vertex_count: u32,
}

impl Mesh {
    pub fn upload(device: Arc<Device>, data: &MeshData) -> RhiResult<Self> {
        let vertices = to_gpu_vertices(&data.vertices);
        let vertex_count = u32::try_from(vertices.len()).map_err(|_| {
            RhiError::BufferError(format!("Mesh '{}' has too many vertices", data.name))
        })?;

        let vertex_buffer = AllocatedBuffer::with_data(
            device,
            &data.name,
            vk::BufferUsageFlags::VERTEX_BUFFER,
            bytemuck::cast_slice(&vertices),
        )?;

        debug!(
            "Uploaded mesh '{}': {} vertices, {} bytes",
            data.name,
            vertex_count,
            vertex_buffer.size()
        );

        Ok(Self {
            vertex_buffer,
            vertex_count,
        })
    }

    pub fn buffer(&self) -> vk::Buffer {
        self.vertex_buffer.handle()
    }

    pub fn vertex_count(&self) -> u32 {
        self.vertex_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;
    use minivk_resources::Model;

    #[test]
    fn test_gpu_vertices_keep_attributes() {
        let model = Model::triangle();
        let vertices = to_gpu_vertices(&model.meshes[0].vertices);
        assert_eq!(vertices.len(), 3);
        assert_eq!(vertices[0].position, Vec3::new(1.0, 1.0, 0.0));
        assert_eq!(vertices[0].normal, Vec3::Z);
        assert_eq!(vertices[2].color, Vec3::new(0.0, 0.0, 1.0));
    }

    #[test]
    fn test_gpu_vertex_bytes() {
        let model = Model::triangle();
        let vertices = to_gpu_vertices(&model.meshes[0].vertices);
        let bytes: &[u8] = bytemuck::cast_slice(&vertices);
        assert_eq!(bytes.len(), 3 * std::mem::size_of::<MeshVertex>());
    }
}
