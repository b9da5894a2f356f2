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

use anyhow::Result;
use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use weft_assets::{Asset, FnLoader, LoadParams, ResourceCache};
use weft_core::telemetry::{MetricId, MetricValue};
use weft_core::{TaskBarrier, TaskQueue};
use weft_runtime::{ConfigError, Runtime, RuntimeConfig};
use weft_systems::{ParameterizedTask, System, SystemContext, SystemError, UpdateParams};

#[derive(Default)]
struct Counter {
    updates: AtomicUsize,
}

struct Tile(usize);
impl Asset for Tile {}

struct Ticker;

impl System<Counter> for Ticker {
    fn on_added_to(&mut self, context: &mut SystemContext<Counter>) {
        context.frame_processor().add_update_task(ParameterizedTask::new(
            "tick",
            |params: &UpdateParams<Counter>, _| {
                params.frame.updates.fetch_add(1, Ordering::SeqCst);
                Ok(())
            },
        ));
    }

    fn startup(
        &mut self,
        _context: &mut SystemContext<Counter>,
        _queue: &TaskQueue,
    ) -> Result<Option<TaskBarrier>, SystemError> {
        Ok(None)
    }

    fn is_initialized(&self) -> bool {
        true
    }
}

#[test]
fn config_file_drives_the_runtime() -> Result<()> {
    let mut file = tempfile::NamedTempFile::new()?;
    writeln!(
        file,
        "[pool]\nworker_threads = 2\nio_threads = 1\n\n[telemetry]\ninterval_ms = 0"
    )?;
    let config = RuntimeConfig::from_file(file.path())?;
    assert_eq!(config.pool.worker_threads, Some(2));

    let mut runtime = Runtime::<Counter>::new(&config)?;
    runtime.add_system(Ticker)?;
    runtime.add_cache(ResourceCache::new(FnLoader::new(|params: &LoadParams| {
        Ok(Tile(params.canonical_source().len()))
    })));
    runtime.startup()?;

    let tiles: Vec<_> = ["grass.tile", "sand.tile", "grass.tile"]
        .iter()
        .map(|name| runtime.systems().load_async::<Tile>(&LoadParams::new(*name), runtime.queue()))
        .collect::<Result<_, _>>()?;
    let loading_screen = TaskBarrier::all(tiles.iter().map(|tile| tile.future().barrier()));
    runtime.wait_for(&loading_screen)?;
    assert!(tiles[0].ptr_eq(&tiles[2]));
    assert_eq!(tiles[1].get()?.0, 9);

    let frame = Arc::new(Counter::default());
    runtime.set_frame(frame.clone());
    for _ in 0..5 {
        runtime.run_frame()?;
    }
    runtime.wait_until_finished()?;
    assert_eq!(frame.updates.load(Ordering::SeqCst), 5);
    assert_eq!(runtime.frame_count(), 5);

    let hits = MetricId::new("cache", "hits").with_label("resource", std::any::type_name::<Tile>());
    let registry = runtime.telemetry().metrics_registry();
    assert_eq!(registry.get(&hits)?.value, MetricValue::Counter(1));
    let frames = MetricId::new("runtime", "frames");
    assert_eq!(registry.get(&frames)?.value, MetricValue::Counter(5));
    let runtime_metrics: Vec<_> = registry
        .namespace("runtime")
        .into_iter()
        .map(|metric| metric.id.name)
        .collect();
    assert_eq!(runtime_metrics, vec!["frame_seconds", "frames"]);
    assert!(runtime.telemetry().summary().contains("runtime:frames = 5"));

    runtime.shutdown();
    Ok(())
}

#[test]
fn missing_file_is_an_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = RuntimeConfig::from_file(dir.path().join("absent.toml")).unwrap_err();
    assert!(matches!(err, ConfigError::Io { .. }));
    assert!(err.to_string().contains("absent.toml"));
}
