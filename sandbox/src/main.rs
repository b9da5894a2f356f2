// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Weft sandbox.
//!
//! Starts a runtime, loads the level's textures behind a loading screen, then
//! runs a fixed number of frames with at most two frames awaiting
//! presentation.

mod scene;
mod systems;

use anyhow::{Context, Result};
use clap::Parser;
use scene::{Scene, Texture, TextureLoader};
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use systems::{ParticleSystem, RenderSystem};
use weft_assets::{LoadParams, ResourceCache};
use weft_core::fence::{FenceWatcher, ManualFence};
use weft_core::TaskBarrier;
use weft_runtime::{Runtime, RuntimeConfig};

const FRAMES_IN_FLIGHT: usize = 2;

#[derive(Parser)]
#[command(about = "Runs the Weft demo frame loop")]
struct Args {
    /// Runtime configuration file (TOML).
    #[arg(long, default_value = "weft.toml")]
    config: PathBuf,
    /// Number of frames to run.
    #[arg(long, default_value_t = 120)]
    frames: u64,
    /// Number of simulated particles.
    #[arg(long, default_value_t = 1024)]
    particles: usize,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let config = RuntimeConfig::load(Some(&args.config)).context("loading configuration")?;
    let mut runtime = Runtime::<Scene>::new(&config)?;

    let gpu = Arc::new(ManualFence::new());
    runtime.add_cache(ResourceCache::new(TextureLoader { width: 64 }));
    runtime.add_system(ParticleSystem::new(args.particles))?;
    runtime.add_system(RenderSystem::new(gpu.clone()))?;
    runtime.startup()?;

    let level: Vec<_> = ["level/ground.tex", "level/sky.tex", "level/rock.tex", "level/ground.tex"]
        .into_iter()
        .map(|name| {
            runtime
                .systems()
                .load_async::<Texture>(&LoadParams::new(name), runtime.queue())
        })
        .collect::<Result<_, _>>()?;
    let loading_screen = TaskBarrier::all(level.iter().map(|texture| texture.future().barrier()));
    while !loading_screen.is_signaled() {
        let loaded = level.iter().filter(|texture| texture.is_ready()).count();
        log::info!("Loading... {loaded}/{}", level.len());
        runtime.queue().yield_for(Duration::from_millis(5));
    }
    runtime.wait_for(&loading_screen)?;
    let texels = level
        .iter()
        .map(|texture| texture.get().map(|t| t.texels.len()))
        .sum::<Result<usize, _>>()?;
    log::info!("Level loaded: {} textures, {texels} texels.", level.len());

    let scene = Arc::new(Scene::default());
    let injected = runtime.set_frame(scene.clone());
    runtime.wait_for(&injected)?;

    let watcher = FenceWatcher::new();
    let mut in_flight = VecDeque::new();
    for n in 1..=args.frames {
        while in_flight.len() >= FRAMES_IN_FLIGHT {
            let oldest: &TaskBarrier = &in_flight[0];
            watcher.poll();
            if oldest.is_signaled() {
                in_flight.pop_front();
            } else {
                runtime.queue().yield_for(Duration::from_millis(1));
                runtime.queue().process_main_thread_tasks();
            }
        }
        let time = runtime.run_frame()?;
        in_flight.push_back(watcher.barrier_for(gpu.clone(), n));
        if n % 30 == 0 {
            log::info!("Frame {n} at {:.3}s.", time.current_time);
        }
    }
    runtime.wait_until_finished()?;
    runtime.queue().process_main_thread_tasks();
    watcher.poll();

    log::info!(
        "Presented {} frames, {} particle draws, texture width {}.",
        scene.presented.load(Ordering::SeqCst),
        scene.draws.load(Ordering::Relaxed),
        level[0].get()?.width
    );
    runtime.telemetry().log_summary();
    drop(level);
    runtime.shutdown();
    Ok(())
}
