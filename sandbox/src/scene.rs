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

//! The per-frame context of the demo and the textures it draws.

use parking_lot::Mutex;
use std::sync::atomic::AtomicU64;
use weft_assets::{Asset, LoadParams, ResourceLoader};

/// What the systems share for one frame.
#[derive(Default)]
pub struct Scene {
    pub camera: Mutex<[f32; 3]>,
    pub particles: Mutex<Vec<[f32; 2]>>,
    pub draws: AtomicU64,
    pub presented: AtomicU64,
}

/// Marker types naming what each injector fills.
pub struct Camera;
pub struct Particles;

pub struct Texture {
    pub width: u32,
    pub texels: Vec<u8>,
}

impl Asset for Texture {}

/// Generates a checkerboard per source name.
///
/// `decode` stands in for a disk read on an I/O worker; `finalize` for the
/// upload, which only the main thread may do.
pub struct TextureLoader {
    pub width: u32,
}

impl ResourceLoader for TextureLoader {
    type Resource = Texture;
    type Staged = Vec<u8>;

    fn decode(&self, params: &LoadParams) -> anyhow::Result<Vec<u8>> {
        let source = params.canonical_source();
        anyhow::ensure!(!source.ends_with(".missing"), "no such texture: {source}");
        std::thread::sleep(std::time::Duration::from_millis(15));
        let seed = source.bytes().fold(0u8, |acc, b| acc.wrapping_add(b));
        let side = self.width as usize;
        Ok((0..side * side)
            .map(|i| if (i / side + i % side) % 2 == 0 { seed } else { !seed })
            .collect())
    }

    fn finalize(&self, texels: Vec<u8>, _params: &LoadParams) -> anyhow::Result<Texture> {
        Ok(Texture {
            width: self.width,
            texels,
        })
    }

    fn finalize_on_main_thread(&self) -> bool {
        true
    }
}
