#![warn(rustdoc::missing_crate_level_docs)]
#![warn(rustdoc::invalid_rust_codeblocks)]

//! # Voxel Section Renderer
//!
//! Chunk section meshing and render-data pipeline for voxel worlds.
//!
//! World sections are meshed off the main thread, packed into shared GPU
//! arenas per region and drawn with one multidraw call per region and pass.
//!
//! ## Key Modules
//!
//! * `task_management` - Worker pool, jobs, cancellation and collectors
//! * `rendering` - Section state, regions, occlusion, multidraw and meshing
//! * `world` - Blocks, sections and the snapshots builders read from
//! * `config` - Renderer settings
//! * `core` - Shared-state wrapper and position packing
//!
//! ## Frame Flow
//!
//! ```text
//! update_camera -> create_render_lists -> update_chunks -> upload_chunks -> render
//!                         |                     |                ^
//!                   occlusion BFS        builder workers ---- results channel
//! ```
//!
//! ## Usage
//!
//! ```rust,no_run
//! fn main() {
//!     voxel_section_renderer::run();
//! }
//! ```

use std::path::Path;

use cgmath::{Deg, Point3};
use log::{info, warn};

use config::RendererConfig;
use error::RenderResult;
use rendering::compile::render_pass::{RenderPassConfiguration, TerrainRenderPass};
use rendering::gpu::recording::RecordingCommandList;
use rendering::gpu::wgpu_backend::WgpuCommandList;
use rendering::gpu::CommandList;
use rendering::occlusion::viewport::{Camera, Projection};
use rendering::occlusion::Viewport;
use rendering::{ChunkRenderer, RenderSectionManager};
use world::block::BlockType;
use world::{GenerationMethod, World};

pub mod config;
pub mod core;
pub mod error;
pub mod rendering;
pub mod task_management;
pub mod world;

/// Settings file read by [`run`] when present.
pub const CONFIG_PATH: &str = "renderer.json";

const DEMO_FRAMES: i64 = 8;
const DEMO_WORLD_RADIUS: i32 = 3;

/// Initializes logging and renders a few frames of a generated world
/// without a window.
///
/// Uses the first wgpu adapter available and falls back to the in-memory
/// command list when there is none.
pub fn run() {
    let mut log_builder = env_logger::Builder::new();
    log_builder
        .target(env_logger::Target::Stdout)
        .parse_env("RUST_LOG")
        .init();

    info!("Logger initialized");

    let config = if Path::new(CONFIG_PATH).exists() {
        RendererConfig::load(CONFIG_PATH).unwrap_or_else(|err| {
            warn!("Ignoring {}: {}", CONFIG_PATH, err);
            RendererConfig::default()
        })
    } else {
        RendererConfig::default()
    };

    let result = match pollster::block_on(WgpuCommandList::headless()) {
        Ok(mut command_list) => run_demo(&mut command_list, config),
        Err(err) => {
            warn!("Falling back to the recording command list: {}", err);
            run_demo(&mut RecordingCommandList::new(), config)
        }
    };

    if let Err(err) = result {
        log::error!("Demo failed: {}", err);
    }
}

fn run_demo(command_list: &mut dyn CommandList, config: RendererConfig) -> RenderResult<()> {
    let mut world = World::new(GenerationMethod::Perlin, 42);
    for x in -DEMO_WORLD_RADIUS..=DEMO_WORLD_RADIUS {
        for z in -DEMO_WORLD_RADIUS..=DEMO_WORLD_RADIUS {
            for y in 0..2 {
                world.add_section_at(Point3::new(x, y, z));
            }
        }
    }
    info!("Generated {} sections", world.section_count());

    let mut manager = RenderSectionManager::new(config, RenderPassConfiguration::default(), command_list)?;
    let mut renderer = ChunkRenderer::new(command_list, manager.config());
    for &position in world.sections.keys() {
        manager.on_section_added(&world, position.x, position.y, position.z);
    }

    let projection = Projection::new(1280, 720, Deg(70.0), 0.1, 1000.0);
    for frame in 0..DEMO_FRAMES {
        let camera = Camera::new(
            Point3::new(frame as f32 * 4.0, 40.0, 8.0),
            Deg(frame as f32 * 45.0),
            Deg(-20.0),
        );
        if frame == DEMO_FRAMES / 2 {
            for section in world.set_block(8, 30, 8, BlockType::GLASS) {
                manager.schedule_rebuild(section.x, section.y, section.z, true);
            }
        }

        manager.update_camera(camera.position);
        let update_immediately = frame == 0;
        manager.create_render_lists(&Viewport::from_camera(&camera, &projection), frame, update_immediately);
        manager.update_chunks(&world, update_immediately);
        manager.upload_chunks(command_list)?;

        let mut batches = 0;
        for pass in TerrainRenderPass::all() {
            batches += manager.render_pass(&mut renderer, command_list, pass)?;
        }
        command_list.flush();
        info!("Frame {}: {} batches", frame, batches);
    }

    for line in manager.debug_strings() {
        info!("{}", line);
    }
    for (section, nanos) in manager.slowest_sections().iter().take(3) {
        info!("Slow section {:?}: {}us", section, nanos / 1000);
    }

    renderer.delete(command_list);
    manager.destroy(command_list);
    Ok(())
}
