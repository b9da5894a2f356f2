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

//! The demo's systems: particles are simulated on update, drawn on render
//! and presented on the main thread.

use crate::scene::{Camera, Particles, Scene, Texture};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use weft_assets::{LoadParams, ResourceHandle};
use weft_core::fence::ManualFence;
use weft_core::{TaskBarrier, TaskKind, TaskQueue};
use weft_systems::{
    InjectProc, ParameterizedTask, RenderParams, System, SystemContext, SystemError, UpdateParams,
};

pub struct ParticleSystem {
    count: usize,
}

impl ParticleSystem {
    pub fn new(count: usize) -> Self {
        Self { count }
    }
}

impl System<Scene> for ParticleSystem {
    fn name(&self) -> &str {
        "particles"
    }

    fn on_added_to(&mut self, context: &mut SystemContext<Scene>) {
        let count = self.count;
        context
            .frame_processor_mut()
            .add_injector(InjectProc::new::<Particles, _>(move |scene: &Scene| {
                *scene.particles.lock() = (0..count).map(|i| [i as f32, 0.0]).collect();
                Ok(())
            }));
        context
            .create_update_group("simulation")
            .add(ParameterizedTask::new(
                "integrate",
                |params: &UpdateParams<Scene>, _| {
                    let dt = params.time.elapsed_time as f32;
                    for particle in params.frame.particles.lock().iter_mut() {
                        particle[1] -= 9.81 * dt;
                    }
                    Ok(())
                },
            ));
    }

    fn startup(
        &mut self,
        _context: &mut SystemContext<Scene>,
        _queue: &TaskQueue,
    ) -> Result<Option<TaskBarrier>, SystemError> {
        Ok(None)
    }

    fn is_initialized(&self) -> bool {
        true
    }
}

/// Draws with the UI textures and signals the presentation fence.
pub struct RenderSystem {
    fence: Arc<ManualFence>,
    textures: Vec<ResourceHandle<Texture>>,
}

impl RenderSystem {
    pub fn new(fence: Arc<ManualFence>) -> Self {
        Self {
            fence,
            textures: Vec::new(),
        }
    }
}

impl System<Scene> for RenderSystem {
    fn name(&self) -> &str {
        "render"
    }

    fn on_added_to(&mut self, context: &mut SystemContext<Scene>) {
        context
            .frame_processor_mut()
            .add_injector(InjectProc::new::<Camera, _>(|scene: &Scene| {
                *scene.camera.lock() = [0.0, 2.0, -10.0];
                Ok(())
            }));

        let opaque = context.create_render_group("opaque");
        opaque.add(ParameterizedTask::new(
            "draw particles",
            |params: &RenderParams<Scene>, _| {
                let drawn = params.frame.particles.lock().len() as u64;
                params.frame.draws.fetch_add(drawn, Ordering::Relaxed);
                Ok(())
            },
        ));

        let fence = self.fence.clone();
        context
            .create_render_group("present")
            .add(
                ParameterizedTask::new("present", move |params: &RenderParams<Scene>, _| {
                    let frame = params.frame.presented.fetch_add(1, Ordering::SeqCst) + 1;
                    fence.signal(frame);
                    Ok(())
                })
                .kind(TaskKind::MainThread),
            );
    }

    fn startup(
        &mut self,
        context: &mut SystemContext<Scene>,
        queue: &TaskQueue,
    ) -> Result<Option<TaskBarrier>, SystemError> {
        for name in ["ui/font.tex", "ui/cursor.tex"] {
            let texture = context.load_async::<Texture>(&LoadParams::new(name), queue)?;
            self.textures.push(texture);
        }
        let ready = TaskBarrier::all(self.textures.iter().map(|texture| texture.future().barrier()));
        context.register_barrier("ui textures", ready.clone());
        Ok(Some(ready))
    }

    fn is_initialized(&self) -> bool {
        self.textures.iter().all(|texture| texture.is_ready())
    }

    fn shutdown(&mut self) {
        self.textures.clear();
    }
}
