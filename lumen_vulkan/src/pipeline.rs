use crate::device::AshDevice;
use crate::shader::ShaderModule;
use crate::VulkanError;
use ash::vk;
use std::ffi::CStr;
use std::path::Path;
use std::sync::Arc;

pub(crate) const ENTRY_POINT_NAME: &CStr =
    unsafe { CStr::from_bytes_with_nul_unchecked(b"main\0") };

pub struct RenderPass {
    device: Arc<AshDevice>,
    pub handle: vk::RenderPass,
}

impl RenderPass {
    /// One subpass writing a presentable color attachment and a depth attachment.
    pub fn new(
        device: Arc<AshDevice>,
        color_format: vk::Format,
        depth_format: vk::Format,
    ) -> Result<Self, VulkanError> {
        let attachments = [
            vk::AttachmentDescription::builder()
                .format(color_format)
                .samples(vk::SampleCountFlags::TYPE_1)
                .load_op(vk::AttachmentLoadOp::CLEAR)
                .store_op(vk::AttachmentStoreOp::STORE)
                .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
                .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
                .initial_layout(vk::ImageLayout::UNDEFINED)
                .final_layout(vk::ImageLayout::PRESENT_SRC_KHR)
                .build(),
            vk::AttachmentDescription::builder()
                .format(depth_format)
                .samples(vk::SampleCountFlags::TYPE_1)
                .load_op(vk::AttachmentLoadOp::CLEAR)
                .store_op(vk::AttachmentStoreOp::DONT_CARE)
                .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
                .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
                .initial_layout(vk::ImageLayout::UNDEFINED)
                .final_layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL)
                .build(),
        ];

        let color_references = [vk::AttachmentReference {
            attachment: 0,
            layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        }];
        let depth_reference = vk::AttachmentReference {
            attachment: 1,
            layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
        };

        let subpasses = [vk::SubpassDescription::builder()
            .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
            .color_attachments(&color_references)
            .depth_stencil_attachment(&depth_reference)
            .build()];

        let dependencies = [vk::SubpassDependency::builder()
            .src_subpass(vk::SUBPASS_EXTERNAL)
            .dst_subpass(0)
            .src_stage_mask(
                vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
                    | vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS,
            )
            .src_access_mask(vk::AccessFlags::empty())
            .dst_stage_mask(
                vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
                    | vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS,
            )
            .dst_access_mask(
                vk::AccessFlags::COLOR_ATTACHMENT_WRITE
                    | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
            )
            .build()];

        let handle = unsafe {
            device.core.create_render_pass(
                &vk::RenderPassCreateInfo::builder()
                    .attachments(&attachments)
                    .subpasses(&subpasses)
                    .dependencies(&dependencies),
                None,
            )
        }?;

        Ok(Self { device, handle })
    }
}

impl Drop for RenderPass {
    fn drop(&mut self) {
        unsafe { self.device.core.destroy_render_pass(self.handle, None) };
    }
}

pub struct PipelineLayout {
    device: Arc<AshDevice>,
    pub handle: vk::PipelineLayout,
}

impl PipelineLayout {
    pub fn new(
        device: Arc<AshDevice>,
        set_layouts: &[vk::DescriptorSetLayout],
    ) -> Result<Self, VulkanError> {
        let handle = unsafe {
            device.core.create_pipeline_layout(
                &vk::PipelineLayoutCreateInfo::builder().set_layouts(set_layouts),
                None,
            )
        }?;
        Ok(Self { device, handle })
    }
}

impl Drop for PipelineLayout {
    fn drop(&mut self) {
        unsafe { self.device.core.destroy_pipeline_layout(self.handle, None) };
    }
}

pub struct GraphicsPipelineDescription<'a> {
    pub vertex_shader: &'a Path,
    pub fragment_shader: &'a Path,
    pub vertex_bindings: &'a [vk::VertexInputBindingDescription],
    pub vertex_attributes: &'a [vk::VertexInputAttributeDescription],
    pub set_layouts: &'a [vk::DescriptorSetLayout],
    pub render_pass: vk::RenderPass,
    pub extent: vk::Extent2D,
}

pub struct GraphicsPipeline {
    device: Arc<AshDevice>,
    pub layout: PipelineLayout,
    pub handle: vk::Pipeline,
}

impl GraphicsPipeline {
    pub fn new(
        device: Arc<AshDevice>,
        description: &GraphicsPipelineDescription,
    ) -> Result<Self, VulkanError> {
        let vertex_module = ShaderModule::load(device.clone(), description.vertex_shader)?;
        let fragment_module = ShaderModule::load(device.clone(), description.fragment_shader)?;
        let layout = PipelineLayout::new(device.clone(), description.set_layouts)?;

        let shader_stages = [
            vk::PipelineShaderStageCreateInfo::builder()
                .stage(vk::ShaderStageFlags::VERTEX)
                .module(vertex_module.handle)
                .name(ENTRY_POINT_NAME)
                .build(),
            vk::PipelineShaderStageCreateInfo::builder()
                .stage(vk::ShaderStageFlags::FRAGMENT)
                .module(fragment_module.handle)
                .name(ENTRY_POINT_NAME)
                .build(),
        ];

        let vertex_input_state = vk::PipelineVertexInputStateCreateInfo::builder()
            .vertex_binding_descriptions(description.vertex_bindings)
            .vertex_attribute_descriptions(description.vertex_attributes);

        let input_assembly_state = vk::PipelineInputAssemblyStateCreateInfo::builder()
            .topology(vk::PrimitiveTopology::TRIANGLE_LIST)
            .primitive_restart_enable(false);

        let viewports = [vk::Viewport {
            x: 0.0,
            y: 0.0,
            width: description.extent.width as f32,
            height: description.extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        }];
        let scissors = [vk::Rect2D {
            offset: vk::Offset2D::default(),
            extent: description.extent,
        }];
        let viewport_state = vk::PipelineViewportStateCreateInfo::builder()
            .viewports(&viewports)
            .scissors(&scissors);

        let rasterizer_state = vk::PipelineRasterizationStateCreateInfo::builder()
            .depth_clamp_enable(false)
            .rasterizer_discard_enable(false)
            .polygon_mode(vk::PolygonMode::FILL)
            .line_width(1.0)
            .cull_mode(vk::CullModeFlags::BACK)
            .front_face(vk::FrontFace::COUNTER_CLOCKWISE)
            .depth_bias_enable(false);

        let multisampling_state = vk::PipelineMultisampleStateCreateInfo::builder()
            .sample_shading_enable(false)
            .rasterization_samples(vk::SampleCountFlags::TYPE_1)
            .min_sample_shading(1.0);

        let depth_stencil_state = vk::PipelineDepthStencilStateCreateInfo::builder()
            .depth_test_enable(true)
            .depth_write_enable(true)
            .depth_compare_op(vk::CompareOp::LESS)
            .depth_bounds_test_enable(false)
            .stencil_test_enable(false)
            .min_depth_bounds(0.0)
            .max_depth_bounds(1.0);

        let color_blend_attachments = [vk::PipelineColorBlendAttachmentState::builder()
            .color_write_mask(vk::ColorComponentFlags::RGBA)
            .blend_enable(false)
            .build()];
        let color_blending_state = vk::PipelineColorBlendStateCreateInfo::builder()
            .logic_op_enable(false)
            .attachments(&color_blend_attachments);

        let create_info = vk::GraphicsPipelineCreateInfo::builder()
            .stages(&shader_stages)
            .vertex_input_state(&vertex_input_state)
            .input_assembly_state(&input_assembly_state)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterizer_state)
            .multisample_state(&multisampling_state)
            .depth_stencil_state(&depth_stencil_state)
            .color_blend_state(&color_blending_state)
            .layout(layout.handle)
            .render_pass(description.render_pass)
            .subpass(0)
            .build();

        let handle = unsafe {
            device
                .core
                .create_graphics_pipelines(vk::PipelineCache::null(), &[create_info], None)
        }
        .map_err(|(_, err)| err)?[0];

        info!(
            "Created graphics pipeline from {} and {}",
            description.vertex_shader.display(),
            description.fragment_shader.display()
        );

        Ok(Self {
            device,
            layout,
            handle,
        })
    }
}

impl Drop for GraphicsPipeline {
    fn drop(&mut self) {
        unsafe { self.device.core.destroy_pipeline(self.handle, None) };
    }
}
