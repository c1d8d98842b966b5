//! Descriptor set layouts derived from shader reflection.
//!
//! Each shader reports the set-0 bindings it uses ([`ShaderLayout`]). The
//! layouts of all stages in a program are merged into one
//! `VkDescriptorSetLayout`: a binding used by several stages gets the union of
//! their stage flags, and two stages disagreeing on a binding's kind is an
//! error.

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::shader::{Shader, ShaderStage};
use crate::spirv::{MAX_BINDINGS, ResourceKind, ShaderLayout};

/// Vulkan descriptor type for a reflected resource kind.
pub fn descriptor_type(kind: ResourceKind) -> vk::DescriptorType {
    match kind {
        ResourceKind::StorageBuffer => vk::DescriptorType::STORAGE_BUFFER,
        ResourceKind::StorageImage => vk::DescriptorType::STORAGE_IMAGE,
        ResourceKind::Sampler => vk::DescriptorType::SAMPLER,
        ResourceKind::CombinedImageSampler => vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
    }
}

/// Merges per-stage layouts into set-0 bindings sorted by binding number.
pub fn merge_bindings(
    stages: &[(ShaderStage, &ShaderLayout)],
) -> RhiResult<Vec<vk::DescriptorSetLayoutBinding<'static>>> {
    let mut merged: [Option<(ResourceKind, vk::ShaderStageFlags)>; MAX_BINDINGS] =
        [None; MAX_BINDINGS];

    for &(stage, layout) in stages {
        for (binding, kind) in layout.bindings() {
            let slot = &mut merged[binding as usize];
            match slot {
                None => *slot = Some((kind, stage.to_vk_stage())),
                Some((existing, flags)) if *existing == kind => {
                    *flags |= stage.to_vk_stage();
                }
                Some((existing, _)) => {
                    return Err(RhiError::PipelineError(format!(
                        "Binding {} is {:?} in one stage and {:?} in the {} stage",
                        binding, existing, kind, stage
                    )));
                }
            }
        }
    }

    Ok(merged
        .iter()
        .enumerate()
        .filter_map(|(binding, slot)| {
            slot.map(|(kind, flags)| {
                vk::DescriptorSetLayoutBinding::default()
                    .binding(binding as u32)
                    .descriptor_type(descriptor_type(kind))
                    .descriptor_count(1)
                    .stage_flags(flags)
            })
        })
        .collect())
}

pub struct DescriptorSetLayout {
    device: Arc<Device>,
    layout: vk::DescriptorSetLayout,
    binding_count: usize,
}

impl DescriptorSetLayout {
    pub fn new(
        device: Arc<Device>,
        bindings: &[vk::DescriptorSetLayoutBinding],
    ) -> RhiResult<Self> {
        let create_info = vk::DescriptorSetLayoutCreateInfo::default().bindings(bindings);

        let layout = unsafe {
            device
                .handle()
                .create_descriptor_set_layout(&create_info, None)?
        };

        debug!(
            "Created descriptor set layout with {} binding(s)",
            bindings.len()
        );

        Ok(Self {
            device,
            layout,
            binding_count: bindings.len(),
        })
    }

    /// Builds the set-0 layout for a shader program. Returns `None` when no
    /// stage uses any descriptor.
    pub fn for_shaders(device: Arc<Device>, shaders: &[&Shader]) -> RhiResult<Option<Self>> {
        let stages: Vec<(ShaderStage, &ShaderLayout)> =
            shaders.iter().map(|s| (s.stage(), s.layout())).collect();
        let bindings = merge_bindings(&stages)?;

        if bindings.is_empty() {
            return Ok(None);
        }
        Self::new(device, &bindings).map(Some)
    }

    #[inline]
    pub fn handle(&self) -> vk::DescriptorSetLayout {
        self.layout
    }

    #[inline]
    pub fn binding_count(&self) -> usize {
        self.binding_count
    }
}

impl Drop for DescriptorSetLayout {
    fn drop(&mut self) {
        unsafe {
            self.device
                .handle()
                .destroy_descriptor_set_layout(self.layout, None);
        }
        debug!("Destroyed descriptor set layout");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout_with(entries: &[(u32, ResourceKind)]) -> ShaderLayout {
        let mut layout = ShaderLayout::default();
        for &(binding, kind) in entries {
            layout.resource_mask |= 1 << binding;
            layout.resources[binding as usize] = Some(kind);
        }
        layout
    }

    #[test]
    fn test_descriptor_type_mapping() {
        assert_eq!(
            descriptor_type(ResourceKind::StorageBuffer),
            vk::DescriptorType::STORAGE_BUFFER
        );
        assert_eq!(
            descriptor_type(ResourceKind::StorageImage),
            vk::DescriptorType::STORAGE_IMAGE
        );
        assert_eq!(
            descriptor_type(ResourceKind::Sampler),
            vk::DescriptorType::SAMPLER
        );
        assert_eq!(
            descriptor_type(ResourceKind::CombinedImageSampler),
            vk::DescriptorType::COMBINED_IMAGE_SAMPLER
        );
    }

    #[test]
    fn test_merge_empty() {
        let empty = ShaderLayout::default();
        let bindings = merge_bindings(&[
            (ShaderStage::Vertex, &empty),
            (ShaderStage::Fragment, &empty),
        ])
        .unwrap();
        assert!(bindings.is_empty());
    }

    #[test]
    fn test_merge_unions_stage_flags() {
        let vertex = layout_with(&[(0, ResourceKind::StorageBuffer)]);
        let fragment = layout_with(&[
            (0, ResourceKind::StorageBuffer),
            (3, ResourceKind::CombinedImageSampler),
        ]);

        let bindings = merge_bindings(&[
            (ShaderStage::Vertex, &vertex),
            (ShaderStage::Fragment, &fragment),
        ])
        .unwrap();

        assert_eq!(bindings.len(), 2);
        assert_eq!(bindings[0].binding, 0);
        assert_eq!(bindings[0].descriptor_type, vk::DescriptorType::STORAGE_BUFFER);
        assert_eq!(
            bindings[0].stage_flags,
            vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT
        );
        assert_eq!(bindings[1].binding, 3);
        assert_eq!(bindings[1].stage_flags, vk::ShaderStageFlags::FRAGMENT);
        assert_eq!(bindings[1].descriptor_count, 1);
    }

    #[test]
    fn test_merge_rejects_conflicting_kinds() {
        let vertex = layout_with(&[(1, ResourceKind::StorageBuffer)]);
        let fragment = layout_with(&[(1, ResourceKind::StorageImage)]);

        let result = merge_bindings(&[
            (ShaderStage::Vertex, &vertex),
            (ShaderStage::Fragment, &fragment),
        ]);
        assert!(matches!(result, Err(RhiError::PipelineError(_))));
    }
}
