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

//! Frame timing.

use std::time::Instant;

/// Timing information handed to every update and render task.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FrameTime {
    /// Seconds since the clock started.
    pub current_time: f64,
    /// Seconds since the previous update.
    pub elapsed_time: f64,
}

impl FrameTime {
    /// Advances to the clock's current reading.
    pub fn update_from(&mut self, clock: &FrameClock) {
        let now = clock.elapsed_secs();
        self.elapsed_time = (now - self.current_time).max(0.0);
        self.current_time = now;
    }

    /// Returns a copy advanced to the clock's current reading.
    #[must_use]
    pub fn advanced(mut self, clock: &FrameClock) -> Self {
        self.update_from(clock);
        self
    }
}

/// A monotonic clock measuring time since it was created.
#[derive(Debug, Clone, Copy)]
pub struct FrameClock {
    start: Instant,
}

impl FrameClock {
    /// Starts a clock at the current instant.
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Returns the seconds elapsed since the clock started.
    pub fn elapsed_secs(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }

    /// Restarts the clock at the current instant.
    pub fn restart(&mut self) {
        self.start = Instant::now();
    }
}

impl Default for FrameClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn update_tracks_elapsed_time_between_readings() {
        let clock = FrameClock::new();
        let mut time = FrameTime::default();

        thread::sleep(Duration::from_millis(5));
        time.update_from(&clock);
        let first = time.current_time;
        assert!(first >= 0.005);
        assert_eq!(time.elapsed_time, first);

        thread::sleep(Duration::from_millis(5));
        time.update_from(&clock);
        assert!(time.current_time > first);
        assert!((time.elapsed_time - (time.current_time - first)).abs() < 1e-12);
    }

    #[test]
    fn advanced_leaves_the_original_untouched() {
        let clock = FrameClock::new();
        let start = FrameTime::default();
        thread::sleep(Duration::from_millis(1));
        let next = start.advanced(&clock);
        assert_eq!(start, FrameTime::default());
        assert!(next.current_time > 0.0);
    }
}
