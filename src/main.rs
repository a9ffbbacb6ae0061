#[macro_use]
extern crate log;

mod camera;
mod gltf_loader;
mod scene;

use anyhow::{bail, Context};
use clap::Parser;
use lumen_vulkan::ash::vk;
use lumen_vulkan::{FrameUpdate, PipelineConfig, RenderMode, Renderer, RendererSettings, VulkanError};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::{Duration, Instant};
use winit::{
    dpi::PhysicalSize,
    event::{Event, WindowEvent},
    event_loop::{ControlFlow, EventLoop},
    window::WindowBuilder,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
enum CliRenderMode {
    Raster,
    #[default]
    Raytrace,
}

impl From<CliRenderMode> for RenderMode {
    fn from(value: CliRenderMode) -> Self {
        match value {
            CliRenderMode::Raster => RenderMode::Raster,
            CliRenderMode::Raytrace => RenderMode::Raytrace,
        }
    }
}

/// Vulkan rasterizer and compute ray tracer.
#[derive(clap::Parser, Debug)]
#[command(name = "lumen")]
struct CliArgs {
    #[arg(long, value_enum, default_value_t = CliRenderMode::Raytrace)]
    mode: CliRenderMode,

    /// glTF file to render, a built-in scene otherwise
    #[arg(long)]
    scene: Option<PathBuf>,

    #[arg(long, default_value = "shaders")]
    shader_dir: PathBuf,

    #[arg(long, default_value_t = 800)]
    width: u32,

    #[arg(long, default_value_t = 600)]
    height: u32,

    #[arg(long, overrides_with = "no_validation")]
    validation: bool,

    #[arg(long, overrides_with = "validation")]
    no_validation: bool,

    #[arg(long, default_value_t = 2000)]
    acquire_timeout_ms: u64,

    /// Round trip a buffer through the staging path before rendering
    #[arg(long)]
    verify_upload: bool,
}

impl CliArgs {
    fn validation_enabled(&self) -> bool {
        if self.validation {
            true
        } else if self.no_validation {
            false
        } else {
            cfg!(debug_assertions)
        }
    }

    fn renderer_settings(&self) -> RendererSettings {
        let pipeline = PipelineConfig::for_mode(self.mode.into(), &self.shader_dir);
        let mut settings = RendererSettings::new("Lumen", pipeline);
        settings.extent = vk::Extent2D {
            width: self.width,
            height: self.height,
        };
        settings.validation = self.validation_enabled();
        settings.acquire_timeout = Duration::from_millis(self.acquire_timeout_ms);
        settings
    }
}

struct FpsCounter {
    frames: u32,
    window_start: Instant,
}

impl FpsCounter {
    fn new(now: Instant) -> Self {
        Self {
            frames: 0,
            window_start: now,
        }
    }

    /// Counts a frame, returning the frame count once a full second has passed.
    fn tick(&mut self, now: Instant) -> Option<u32> {
        self.frames += 1;
        if now.duration_since(self.window_start) >= Duration::from_secs(1) {
            let frames = self.frames;
            self.frames = 0;
            self.window_start = now;
            Some(frames)
        } else {
            None
        }
    }
}

fn init_logger() {
    let mut builder = pretty_env_logger::formatted_builder();
    match std::env::var("RUST_LOG") {
        Ok(filters) => builder.parse_filters(&filters),
        Err(_) => builder.filter_level(log::LevelFilter::Info),
    };
    builder.init();
}

fn is_unsupported_environment(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        cause
            .downcast_ref::<VulkanError>()
            .is_some_and(VulkanError::is_unsupported_environment)
    })
}

fn run(args: CliArgs) -> anyhow::Result<()> {
    let settings = args.renderer_settings();
    let scene = match &args.scene {
        Some(path) => gltf_loader::load_scene(path)?,
        None => scene::builtin_scene()?,
    };

    let event_loop = EventLoop::new()?;
    let window = WindowBuilder::new()
        .with_title("Lumen")
        .with_inner_size(PhysicalSize::new(args.width, args.height))
        .with_resizable(false)
        .build(&event_loop)?;

    let renderer =
        Renderer::initialize(&window, &settings, scene).context("Renderer initialization failed")?;
    info!("{:?}", renderer.stats());

    if args.verify_upload && !renderer.verify_staging_round_trip()? {
        bail!("Staging round trip returned different bytes");
    }

    let orbit = camera::OrbitCamera::default();
    let start = Instant::now();
    let mut fps = FpsCounter::new(start);
    let mut renderer = Some(renderer);
    let mut failure: Option<anyhow::Error> = None;

    event_loop.run(|event, elwt| {
        elwt.set_control_flow(ControlFlow::Poll);
        match event {
            Event::WindowEvent {
                event: WindowEvent::CloseRequested,
                ..
            } => {
                info!("The close button was pressed; stopping");
                elwt.exit();
            }
            Event::AboutToWait => {
                let Some(renderer) = renderer.as_mut() else {
                    return;
                };

                let elapsed_seconds = start.elapsed().as_secs_f32();
                let update = FrameUpdate {
                    elapsed_seconds,
                    camera: Some(orbit.at(elapsed_seconds)),
                };
                if let Err(err) = renderer.update(&update).and_then(|_| renderer.render()) {
                    failure = Some(anyhow::Error::new(err).context("Frame failed"));
                    elwt.exit();
                    return;
                }

                if let Some(frames) = fps.tick(Instant::now()) {
                    info!("FPS: {}", frames);
                }
            }
            Event::LoopExiting => {
                if let Some(renderer) = renderer.take() {
                    if let Err(err) = renderer.shutdown() {
                        error!("Shutdown failed: {}", err);
                    }
                }
            }
            _ => {}
        }
    })?;

    info!("Exiting Main Loop!");
    match failure {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

fn main() -> ExitCode {
    init_logger();
    let args = CliArgs::parse();
    debug!("{:?}", args);

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{:#}", err);
            if is_unsupported_environment(&err) {
                ExitCode::from(2)
            } else {
                ExitCode::FAILURE
            }
        }
    }
}
