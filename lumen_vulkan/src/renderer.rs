use crate::command::{record_compute_commands, record_graphics_commands, CommandPool, GraphicsRecording};
use crate::compute_pipeline::ComputePipeline;
use crate::descriptor_set::{
    write_descriptor_set, BindingCount, BindingDescription, DescriptorPool, DescriptorSetLayout,
    DescriptorWrite,
};
use crate::device::AshDevice;
use crate::frame::FrameOrchestrator;
use crate::geometry::{GeometryBuffer, GeometryData};
use crate::image::{find_depth_format, ImageDescription, ImageView, DEPTH_FORMAT_CANDIDATES};
use crate::instance::{AshInstance, Surface};
use crate::physical_device::PhysicalDevice;
use crate::pipeline::{GraphicsPipeline, GraphicsPipelineDescription, RenderPass};
use crate::resource_manager::ResourceManager;
use crate::sampler::{Sampler, SamplerDescription};
use crate::scene::GpuPrimitive;
use crate::swapchain::{Swapchain, DEFAULT_SURFACE_FORMATS};
use crate::transfer::{pack_regions, StagingTransfer};
use crate::uniform::{ComputeUniform, GraphicsUniform, RayCamera, UniformBuffer};
use crate::{BufferKey, ImageKey, Result, SetupPhase, VulkanError};
use ash::vk;
use bitflags::bitflags;
use raw_window_handle::{HasRawDisplayHandle, HasRawWindowHandle};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(2);
pub const RAYTRACED_IMAGE_FORMAT: vk::Format = vk::Format::R8G8B8A8_UNORM;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum RenderMode {
    Raster,
    Raytrace,
}

bitflags! {
    #[derive(Debug, Clone, Copy, Eq, PartialEq)]
    pub struct PipelineStages: u32 {
        const RASTER = 1 << 0;
        const COMPUTE = 1 << 1;
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ShaderPaths {
    pub vertex: PathBuf,
    pub fragment: PathBuf,
    pub compute: Option<PathBuf>,
}

pub mod bindings {
    pub const GRAPHICS_UNIFORM: u32 = 0;
    pub const RAYTRACED_IMAGE_SAMPLER: u32 = 1;

    pub const COMPUTE_OUTPUT_IMAGE: u32 = 0;
    pub const COMPUTE_UNIFORM: u32 = 1;
    pub const COMPUTE_PRIMITIVES: u32 = 2;
}

/// Which stages run and how their descriptor sets are laid out.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct PipelineConfig {
    pub mode: RenderMode,
    pub stages: PipelineStages,
    pub graphics_bindings: Vec<BindingDescription>,
    pub compute_bindings: Vec<BindingDescription>,
    pub shaders: ShaderPaths,
}

impl PipelineConfig {
    pub fn raster(shader_dir: &Path) -> Self {
        Self {
            mode: RenderMode::Raster,
            stages: PipelineStages::RASTER,
            graphics_bindings: vec![BindingDescription::new(
                bindings::GRAPHICS_UNIFORM,
                vk::DescriptorType::UNIFORM_BUFFER,
                vk::ShaderStageFlags::VERTEX,
            )],
            compute_bindings: Vec::new(),
            shaders: ShaderPaths {
                vertex: shader_dir.join("vert.spv"),
                fragment: shader_dir.join("frag.spv"),
                compute: None,
            },
        }
    }

    pub fn raytrace(shader_dir: &Path) -> Self {
        let raytracing_dir = shader_dir.join("raytracing");
        Self {
            mode: RenderMode::Raytrace,
            stages: PipelineStages::RASTER | PipelineStages::COMPUTE,
            graphics_bindings: vec![
                BindingDescription::new(
                    bindings::GRAPHICS_UNIFORM,
                    vk::DescriptorType::UNIFORM_BUFFER,
                    vk::ShaderStageFlags::VERTEX,
                ),
                BindingDescription::new(
                    bindings::RAYTRACED_IMAGE_SAMPLER,
                    vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
                    vk::ShaderStageFlags::FRAGMENT,
                ),
            ],
            compute_bindings: vec![
                BindingDescription::new(
                    bindings::COMPUTE_OUTPUT_IMAGE,
                    vk::DescriptorType::STORAGE_IMAGE,
                    vk::ShaderStageFlags::COMPUTE,
                ),
                BindingDescription::new(
                    bindings::COMPUTE_UNIFORM,
                    vk::DescriptorType::UNIFORM_BUFFER,
                    vk::ShaderStageFlags::COMPUTE,
                ),
                BindingDescription::new(
                    bindings::COMPUTE_PRIMITIVES,
                    vk::DescriptorType::STORAGE_BUFFER,
                    vk::ShaderStageFlags::COMPUTE,
                ),
            ],
            shaders: ShaderPaths {
                vertex: raytracing_dir.join("quad.vert.spv"),
                fragment: raytracing_dir.join("quad.frag.spv"),
                compute: Some(raytracing_dir.join("raytrace.comp.spv")),
            },
        }
    }

    pub fn for_mode(mode: RenderMode, shader_dir: &Path) -> Self {
        match mode {
            RenderMode::Raster => Self::raster(shader_dir),
            RenderMode::Raytrace => Self::raytrace(shader_dir),
        }
    }

    pub fn uses_compute(&self) -> bool {
        self.stages.contains(PipelineStages::COMPUTE)
    }

    fn active_layouts(&self) -> Vec<&[BindingDescription]> {
        let mut layouts = Vec::with_capacity(2);
        if self.stages.contains(PipelineStages::RASTER) {
            layouts.push(self.graphics_bindings.as_slice());
        }
        if self.uses_compute() {
            layouts.push(self.compute_bindings.as_slice());
        }
        layouts
    }

    /// Descriptor totals the shared pool must cover.
    pub fn binding_count(&self) -> BindingCount {
        BindingCount::from_layouts(self.active_layouts())
    }

    pub fn descriptor_set_count(&self) -> u32 {
        self.active_layouts().len() as u32
    }
}

#[derive(Debug, Clone)]
pub struct RendererSettings {
    pub app_name: String,
    pub extent: vk::Extent2D,
    pub validation: bool,
    pub acquire_timeout: Duration,
    pub surface_formats: Vec<vk::SurfaceFormatKHR>,
    pub clear_color: [f32; 4],
    pub pipeline: PipelineConfig,
}

impl RendererSettings {
    pub fn new(app_name: &str, pipeline: PipelineConfig) -> Self {
        Self {
            app_name: app_name.to_string(),
            extent: vk::Extent2D {
                width: 800,
                height: 600,
            },
            validation: cfg!(debug_assertions),
            acquire_timeout: DEFAULT_ACQUIRE_TIMEOUT,
            surface_formats: DEFAULT_SURFACE_FORMATS.to_vec(),
            clear_color: [0.0, 0.0, 0.0, 1.0],
            pipeline,
        }
    }

    fn acquire_timeout_ns(&self) -> u64 {
        u64::try_from(self.acquire_timeout.as_nanos()).unwrap_or(u64::MAX)
    }
}

/// Scene content handed over at start-up. Meshes feed the raster mode,
/// primitives feed the ray tracer.
#[derive(Debug, Clone, Default)]
pub struct SceneInput {
    pub geometries: Vec<GeometryData>,
    pub primitives: Vec<GpuPrimitive>,
    pub camera: RayCamera,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FrameUpdate {
    pub elapsed_seconds: f32,
    pub camera: Option<RayCamera>,
}

/// Counts of the objects a renderer holds, for start-up logging.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct RendererStats {
    pub meshes: usize,
    pub buffers: usize,
    pub images: usize,
    pub swapchain_images: usize,
    pub ray_traced: bool,
}

struct RaytracedImage {
    sampler: Sampler,
    view: ImageView,
    _image: ImageKey,
}

struct ComputeStage {
    pipeline: ComputePipeline,
    _set_layout: DescriptorSetLayout,
    uniform: UniformBuffer<ComputeUniform>,
    _primitives: BufferKey,
    primitive_count: u32,
    camera: RayCamera,
}

/// Graphics plus optional ray tracing renderer, configured by a [`PipelineConfig`].
///
/// Fields drop in declaration order, so every object goes before the ones it was built from.
pub struct Renderer {
    frame: FrameOrchestrator,
    _graphics_command_pool: CommandPool,
    graphics_command_buffers: Vec<vk::CommandBuffer>,
    compute: Option<ComputeStage>,
    graphics_pipeline: GraphicsPipeline,
    _descriptor_pool: DescriptorPool,
    _graphics_set_layout: DescriptorSetLayout,
    graphics_uniform: UniformBuffer<GraphicsUniform>,
    geometries: Vec<GeometryBuffer>,
    swapchain: Swapchain,
    _render_pass: RenderPass,
    raytraced: Option<RaytracedImage>,
    _depth_view: ImageView,
    _depth_image: ImageKey,
    resources: ResourceManager,
    transfer: StagingTransfer,
    config: PipelineConfig,
    device: Arc<AshDevice>,
}

impl Renderer {
    pub fn initialize<W: HasRawWindowHandle + HasRawDisplayHandle>(
        window: &W,
        settings: &RendererSettings,
        scene: SceneInput,
    ) -> Result<Self> {
        let config = settings.pipeline.clone();
        info!("Initializing {:?} renderer ({:?})", config.mode, config.stages);

        let instance = Arc::new(
            AshInstance::new(&settings.app_name, settings.validation, window.raw_display_handle())
                .phase("Instance creation")?,
        );
        let surface = Arc::new(Surface::new(instance.clone(), window).phase("Surface creation")?);
        let physical_device = PhysicalDevice::select(&instance, &surface).phase("Device selection")?;
        let device = Arc::new(
            AshDevice::new(instance.clone(), &physical_device).phase("Logical device creation")?,
        );

        let mut swapchain = Swapchain::new(
            device.clone(),
            surface,
            settings.extent,
            &settings.surface_formats,
        )
        .phase("Swapchain creation")?;
        let extent = swapchain.extent();

        // One-time commands need graphics and compute pipeline stages for their barriers.
        let transfer =
            StagingTransfer::new(device.clone(), device.queues.graphics).phase("Transfer setup")?;
        let mut resources = ResourceManager::new(device.clone());

        let depth_format = find_depth_format(&DEPTH_FORMAT_CANDIDATES, |format| {
            physical_device
                .format_properties(&instance, format)
                .optimal_tiling_features
        })
        .ok_or(VulkanError::NoSupportedDepthFormat)
        .phase("Depth buffer creation")?;
        let (depth_image, depth_view) =
            create_depth_buffer(&mut resources, &transfer, extent, depth_format)
                .phase("Depth buffer creation")?;
        info!("Depth format {:?}", depth_format);

        let render_pass = RenderPass::new(device.clone(), swapchain.format(), depth_format)
            .phase("Render pass creation")?;
        swapchain
            .create_framebuffers(render_pass.handle, depth_view.handle)
            .phase("Framebuffer creation")?;

        let geometry_data = match config.mode {
            RenderMode::Raster => scene.geometries,
            RenderMode::Raytrace => vec![GeometryData::fullscreen_quad().phase("Geometry upload")?],
        };
        let geometries =
            upload_geometries(&transfer, &mut resources, &geometry_data).phase("Geometry upload")?;

        let raytraced = if config.uses_compute() {
            Some(
                create_raytraced_image(&device, &mut resources, &transfer, extent)
                    .phase("Ray traced image creation")?,
            )
        } else {
            None
        };

        let aspect_ratio = extent.width as f32 / extent.height.max(1) as f32;
        let graphics_uniform = UniformBuffer::new(
            device.clone(),
            "Graphics Uniform",
            &GraphicsUniform::animated(0.0, aspect_ratio),
        )
        .phase("Uniform buffer creation")?;

        let graphics_set_layout = DescriptorSetLayout::new(device.clone(), &config.graphics_bindings)
            .phase("Descriptor creation")?;
        let descriptor_pool = DescriptorPool::new(
            device.clone(),
            config.binding_count(),
            config.descriptor_set_count(),
        )
        .phase("Descriptor creation")?;
        let graphics_descriptor_set = descriptor_pool
            .allocate(&graphics_set_layout)
            .phase("Descriptor creation")?;

        let mut graphics_writes = vec![DescriptorWrite::buffer(
            bindings::GRAPHICS_UNIFORM,
            vk::DescriptorType::UNIFORM_BUFFER,
            graphics_uniform.handle(),
        )];
        if let Some(raytraced) = &raytraced {
            graphics_writes.push(DescriptorWrite::image(
                bindings::RAYTRACED_IMAGE_SAMPLER,
                vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
                raytraced.sampler.handle,
                raytraced.view.handle,
                vk::ImageLayout::GENERAL,
            ));
        }
        write_descriptor_set(&device, graphics_descriptor_set, &graphics_writes);

        let (vertex_bindings, vertex_attributes) = geometry_data
            .first()
            .map(GeometryData::vertex_input_descriptions)
            .unwrap_or_default();
        let graphics_pipeline = GraphicsPipeline::new(
            device.clone(),
            &GraphicsPipelineDescription {
                vertex_shader: &config.shaders.vertex,
                fragment_shader: &config.shaders.fragment,
                vertex_bindings: &vertex_bindings,
                vertex_attributes: &vertex_attributes,
                set_layouts: &[graphics_set_layout.handle],
                render_pass: render_pass.handle,
                extent,
            },
        )
        .phase("Graphics pipeline creation")?;

        let compute = match (&raytraced, &config.shaders.compute) {
            (Some(raytraced), Some(shader)) => Some(
                create_compute_stage(
                    &device,
                    &config,
                    shader,
                    &descriptor_pool,
                    &mut resources,
                    &transfer,
                    raytraced,
                    &scene.primitives,
                    scene.camera,
                    extent,
                )
                .phase("Compute pipeline creation")?,
            ),
            (Some(_), None) => {
                return Err(VulkanError::MissingResource("compute shader"))
                    .phase("Compute pipeline creation")
            }
            (None, _) => None,
        };

        let graphics_command_pool = CommandPool::new(
            device.clone(),
            device.queues.graphics.family_index,
            vk::CommandPoolCreateFlags::empty(),
        )
        .phase("Command recording")?;
        let graphics_command_buffers = graphics_command_pool
            .allocate(swapchain.framebuffers.len() as u32)
            .phase("Command recording")?;
        let draws: Vec<_> = geometries.iter().map(GeometryBuffer::draw).collect();
        record_graphics_commands(
            &device,
            &graphics_command_buffers,
            &swapchain.framebuffer_handles(),
            &GraphicsRecording {
                render_pass: render_pass.handle,
                extent,
                pipeline: graphics_pipeline.handle,
                pipeline_layout: graphics_pipeline.layout.handle,
                descriptor_set: graphics_descriptor_set,
                geometries: &draws,
                clear_color: settings.clear_color,
            },
        )
        .phase("Command recording")?;

        let frame = FrameOrchestrator::new(
            device.clone(),
            config.uses_compute(),
            settings.acquire_timeout_ns(),
        )
        .phase("Synchronization setup")?;

        info!(
            "Renderer ready: {} meshes, {} resources in arena",
            geometries.len(),
            resources.buffer_count() + resources.image_count()
        );

        Ok(Self {
            frame,
            _graphics_command_pool: graphics_command_pool,
            graphics_command_buffers,
            compute,
            graphics_pipeline,
            _descriptor_pool: descriptor_pool,
            _graphics_set_layout: graphics_set_layout,
            graphics_uniform,
            geometries,
            swapchain,
            _render_pass: render_pass,
            raytraced,
            _depth_view: depth_view,
            _depth_image: depth_image,
            resources,
            transfer,
            config,
            device,
        })
    }

    pub fn stats(&self) -> RendererStats {
        RendererStats {
            meshes: self.geometries.len(),
            buffers: self.resources.buffer_count(),
            images: self.resources.image_count(),
            swapchain_images: self.swapchain.images.len(),
            ray_traced: self.raytraced.is_some(),
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.swapchain.extent()
    }

    fn aspect_ratio(&self) -> f32 {
        let extent = self.extent();
        extent.width as f32 / extent.height.max(1) as f32
    }

    /// Writes this frame's uniforms once no queued work reads them.
    pub fn update(&mut self, update: &FrameUpdate) -> Result<()> {
        unsafe { self.device.core.queue_wait_idle(self.device.queues.graphics.handle) }?;
        self.frame.wait_for_compute()?;

        let aspect_ratio = self.aspect_ratio();
        self.graphics_uniform
            .write(&GraphicsUniform::animated(update.elapsed_seconds, aspect_ratio))?;

        if let Some(compute) = &mut self.compute {
            if let Some(camera) = update.camera {
                compute.camera = camera;
            }
            compute.uniform.write(&ComputeUniform::new(
                &compute.camera,
                aspect_ratio,
                compute.primitive_count,
            ))?;
        }
        Ok(())
    }

    pub fn render(&mut self) -> Result<()> {
        let compute_command_buffer = self
            .compute
            .as_ref()
            .map(|compute| compute.pipeline.command_buffer);
        let image_index = self.frame.render_frame(
            &self.swapchain,
            &self.graphics_command_buffers,
            compute_command_buffer,
        )?;
        trace!("Presented swapchain image {}", image_index);
        Ok(())
    }

    /// Uploads a known pattern through staging and compares the device copy.
    pub fn verify_staging_round_trip(&self) -> Result<bool> {
        let index: Vec<u8> = (0..96u32).map(|i| (i * 7 % 251) as u8).collect();
        let position: Vec<u8> = (0..1024u32).map(|i| (i % 256) as u8).collect();
        let normal: Vec<u8> = (0..333u32).map(|i| (255 - i % 256) as u8).collect();
        let regions = [index.as_slice(), position.as_slice(), normal.as_slice()];

        let (buffer, offsets) = self.transfer.upload_to_device_local(
            "Round Trip",
            &regions,
            vk::BufferUsageFlags::STORAGE_BUFFER | vk::BufferUsageFlags::TRANSFER_SRC,
        )?;
        let downloaded = self.transfer.download_from_device_local(&buffer)?;

        let matches = offsets == [0, 96, 1120] && downloaded == pack_regions(&regions);
        if matches {
            info!("Staging round trip of {} bytes matched", downloaded.len());
        } else {
            error!("Staging round trip mismatch");
        }
        Ok(matches)
    }

    /// Waits for the GPU to finish, then releases everything.
    pub fn shutdown(self) -> Result<()> {
        self.device.wait_idle()?;
        info!("Renderer shut down");
        Ok(())
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        if let Err(err) = self.device.wait_idle() {
            error!("Failed to wait for device idle: {}", err);
        }
    }
}

fn create_depth_buffer(
    resources: &mut ResourceManager,
    transfer: &StagingTransfer,
    extent: vk::Extent2D,
    format: vk::Format,
) -> Result<(ImageKey, ImageView)> {
    let key = resources.create_image(
        "Depth Buffer",
        &ImageDescription::new_2d(extent, format, vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT),
        vk::MemoryPropertyFlags::DEVICE_LOCAL,
    )?;
    let image = resources.image(key)?;
    transfer.transition_image_layout(
        image.handle,
        format,
        vk::ImageLayout::UNDEFINED,
        vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
    )?;
    let view = image.create_view()?;
    Ok((key, view))
}

fn upload_geometries(
    transfer: &StagingTransfer,
    resources: &mut ResourceManager,
    geometries: &[GeometryData],
) -> Result<Vec<GeometryBuffer>> {
    let Some(first) = geometries.first() else {
        return Err(VulkanError::InvalidGeometry("scene has no meshes".to_string()));
    };
    // All meshes share one pipeline, so they must share one vertex layout.
    if let Some(mismatch) = geometries.iter().find(|g| g.surface.kind != first.surface.kind) {
        return Err(VulkanError::InvalidGeometry(format!(
            "mixed vertex layouts {:?} and {:?}",
            first.surface.kind, mismatch.surface.kind
        )));
    }

    geometries
        .iter()
        .enumerate()
        .map(|(i, geometry)| GeometryBuffer::upload(transfer, resources, &format!("Mesh {}", i), geometry))
        .collect()
}

fn create_raytraced_image(
    device: &Arc<AshDevice>,
    resources: &mut ResourceManager,
    transfer: &StagingTransfer,
    extent: vk::Extent2D,
) -> Result<RaytracedImage> {
    let mut description = ImageDescription::new_2d(
        extent,
        RAYTRACED_IMAGE_FORMAT,
        vk::ImageUsageFlags::STORAGE | vk::ImageUsageFlags::SAMPLED,
    );
    description.queue_families = device.queues.graphics_and_compute().to_vec();

    let image = resources.create_image(
        "Ray Traced Image",
        &description,
        vk::MemoryPropertyFlags::DEVICE_LOCAL,
    )?;
    let bound = resources.image(image)?;
    transfer.transition_image_layout(
        bound.handle,
        RAYTRACED_IMAGE_FORMAT,
        vk::ImageLayout::UNDEFINED,
        vk::ImageLayout::GENERAL,
    )?;

    Ok(RaytracedImage {
        sampler: Sampler::new(device.clone(), &SamplerDescription::default())?,
        view: bound.create_view()?,
        _image: image,
    })
}

#[allow(clippy::too_many_arguments)]
fn create_compute_stage(
    device: &Arc<AshDevice>,
    config: &PipelineConfig,
    shader: &Path,
    descriptor_pool: &DescriptorPool,
    resources: &mut ResourceManager,
    transfer: &StagingTransfer,
    raytraced: &RaytracedImage,
    primitives: &[GpuPrimitive],
    camera: RayCamera,
    extent: vk::Extent2D,
) -> Result<ComputeStage> {
    // The storage buffer cannot be empty, so an empty scene uploads one unused slot.
    let placeholder = [<GpuPrimitive as bytemuck::Zeroable>::zeroed()];
    let primitive_data: &[GpuPrimitive] = if primitives.is_empty() {
        &placeholder
    } else {
        primitives
    };
    // Copied on the graphics queue, read by the compute queue.
    let (primitive_buffer, _offsets) = transfer.upload_shared(
        "Scene Primitives",
        &[bytemuck::cast_slice(primitive_data)],
        vk::BufferUsageFlags::STORAGE_BUFFER,
        &device.queues.graphics_and_compute(),
    )?;
    let primitive_handle = primitive_buffer.handle;
    let primitive_key = resources.insert_buffer(primitive_buffer);
    let primitive_count = primitives.len() as u32;

    let aspect_ratio = extent.width as f32 / extent.height.max(1) as f32;
    let uniform = UniformBuffer::new(
        device.clone(),
        "Compute Uniform",
        &ComputeUniform::new(&camera, aspect_ratio, primitive_count),
    )?;

    let set_layout = DescriptorSetLayout::new(device.clone(), &config.compute_bindings)?;
    let descriptor_set = descriptor_pool.allocate(&set_layout)?;
    write_descriptor_set(
        device,
        descriptor_set,
        &[
            DescriptorWrite::image(
                bindings::COMPUTE_OUTPUT_IMAGE,
                vk::DescriptorType::STORAGE_IMAGE,
                vk::Sampler::null(),
                raytraced.view.handle,
                vk::ImageLayout::GENERAL,
            ),
            DescriptorWrite::buffer(
                bindings::COMPUTE_UNIFORM,
                vk::DescriptorType::UNIFORM_BUFFER,
                uniform.handle(),
            ),
            DescriptorWrite::buffer(
                bindings::COMPUTE_PRIMITIVES,
                vk::DescriptorType::STORAGE_BUFFER,
                primitive_handle,
            ),
        ],
    );

    let pipeline = ComputePipeline::new(device.clone(), shader, set_layout.handle)?;
    record_compute_commands(
        device,
        pipeline.command_buffer,
        pipeline.handle,
        pipeline.layout.handle,
        descriptor_set,
        extent,
    )?;

    info!("Ray tracing {} primitives", primitive_count);

    Ok(ComputeStage {
        pipeline,
        _set_layout: set_layout,
        uniform,
        _primitives: primitive_key,
        primitive_count,
        camera,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::BufferDescription;
    use crate::device::{AshQueue, DeviceQueues};

    #[test]
    fn raster_config_has_no_compute() {
        let config = PipelineConfig::for_mode(RenderMode::Raster, Path::new("shaders"));
        assert!(!config.uses_compute());
        assert_eq!(config.descriptor_set_count(), 1);
        assert_eq!(config.shaders.vertex, Path::new("shaders/vert.spv"));
        assert_eq!(config.shaders.compute, None);
        assert_eq!(
            config.binding_count(),
            BindingCount {
                uniform_buffers: 1,
                ..Default::default()
            }
        );
    }

    #[test]
    fn raytrace_pool_covers_both_layouts() {
        let config = PipelineConfig::for_mode(RenderMode::Raytrace, Path::new("shaders"));
        assert!(config.uses_compute());
        assert_eq!(config.descriptor_set_count(), 2);
        assert_eq!(
            config.binding_count(),
            BindingCount {
                uniform_buffers: 2,
                storage_buffers: 1,
                storage_images: 1,
                combined_image_samplers: 1,
            }
        );
        assert_eq!(
            config.shaders.compute.as_deref(),
            Some(Path::new("shaders/raytracing/raytrace.comp.spv"))
        );
    }

    #[test]
    fn compute_layout_has_image_uniform_and_primitives() {
        let config = PipelineConfig::raytrace(Path::new("shaders"));
        let types: Vec<_> = config
            .compute_bindings
            .iter()
            .map(|binding| (binding.binding, binding.descriptor_type))
            .collect();
        assert_eq!(
            types,
            vec![
                (0, vk::DescriptorType::STORAGE_IMAGE),
                (1, vk::DescriptorType::UNIFORM_BUFFER),
                (2, vk::DescriptorType::STORAGE_BUFFER),
            ]
        );
    }

    #[test]
    fn disabled_stage_is_not_pooled() {
        let mut config = PipelineConfig::raytrace(Path::new("shaders"));
        config.stages = PipelineStages::RASTER;
        assert_eq!(config.descriptor_set_count(), 1);
        assert_eq!(config.binding_count().storage_images, 0);
    }

    fn queues(graphics: u32, compute: u32) -> DeviceQueues {
        let queue = |family_index| AshQueue {
            family_index,
            handle: vk::Queue::null(),
        };
        DeviceQueues {
            graphics: queue(graphics),
            present: queue(graphics),
            compute: queue(compute),
            transfer: queue(graphics),
        }
    }

    #[test]
    fn primitive_buffer_is_concurrent_across_split_families() {
        let description = BufferDescription::new(64, vk::BufferUsageFlags::STORAGE_BUFFER)
            .shared_by(&queues(0, 1).graphics_and_compute());
        assert_eq!(description.sharing_mode(), (vk::SharingMode::CONCURRENT, vec![0, 1]));

        let description = BufferDescription::new(64, vk::BufferUsageFlags::STORAGE_BUFFER)
            .shared_by(&queues(0, 0).graphics_and_compute());
        assert_eq!(description.sharing_mode(), (vk::SharingMode::EXCLUSIVE, vec![]));
    }

    #[test]
    fn timeout_converts_to_nanoseconds() {
        let mut settings = RendererSettings::new("test", PipelineConfig::raster(Path::new(".")));
        assert_eq!(settings.acquire_timeout_ns(), 2_000_000_000);
        settings.acquire_timeout = Duration::MAX;
        assert_eq!(settings.acquire_timeout_ns(), u64::MAX);
    }
}
