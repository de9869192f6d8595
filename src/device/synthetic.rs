/*
MIT License

Copyright (c) 2021, 2022, 2024, 2025 Vincent Hiribarren

Permission is hereby granted, free of charge, to any person obtaining a copy
of this software and associated documentation files (the "Software"), to deal
in the Software without restriction, including without limitation the rights
to use, copy, modify, merge, publish, distribute, sublicense, and/or sell
copies of the Software, and to permit persons to whom the Software is
furnished to do so, subject to the following conditions:

The above copyright notice and this permission notice shall be included in all
copies or substantial portions of the Software.

THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM,
OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE
SOFTWARE.
*/

use std::env;

use anyhow::bail;
use log::{debug, info, warn};
use rayon::iter::{IndexedParallelIterator, ParallelIterator};
use rayon::slice::ParallelSliceMut;

use super::{DepthDevice, DeviceOptions, DeviceState, ImageResolution};

const ENV_FAILED_STARTS: &str = "DEPTH_CLOUD_FAILED_STARTS";

/// Raw samples are 11 bits wide, like structured-light sensors report them.
pub const MAX_RAW_DEPTH: u16 = 2047;

const RIPPLE_FREQUENCY: f32 = 18.0;
const RIPPLE_SPEED: f32 = 0.08;

/// Software depth camera producing a ripple moving outward from the frame
/// center. It can refuse a number of start requests before capturing.
pub struct SyntheticDepthDevice {
    name: String,
    state: DeviceState,
    resolution: ImageResolution,
    failed_starts: u32,
    start_attempts: u32,
    tick: u64,
    frame: Vec<u16>,
}

impl Default for SyntheticDepthDevice {
    fn default() -> Self {
        Self::new(0)
    }
}

impl SyntheticDepthDevice {
    #[must_use]
    pub fn new(failed_starts: u32) -> Self {
        Self {
            name: String::from("Synthetic depth camera"),
            state: DeviceState::NotStarted,
            resolution: ImageResolution::default(),
            failed_starts,
            start_attempts: 0,
            tick: 0,
            frame: Vec::new(),
        }
    }

    /// Reads the number of refused start requests from the environment.
    #[must_use]
    pub fn from_env() -> Self {
        let failed_starts = match env::var(ENV_FAILED_STARTS) {
            Ok(value) => value.parse().unwrap_or_else(|err| {
                warn!("Ignoring {ENV_FAILED_STARTS}={value}: {err}");
                0
            }),
            Err(_) => 0,
        };
        Self::new(failed_starts)
    }

    #[must_use]
    pub fn start_attempts(&self) -> u32 {
        self.start_attempts
    }

    #[must_use]
    pub fn resolution(&self) -> ImageResolution {
        self.resolution
    }

    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    fn render_frame(&mut self) {
        let width = self.resolution.width() as usize;
        let half_width = self.resolution.width() as f32 / 2.0;
        let half_height = self.resolution.height() as f32 / 2.0;
        let radius_max = half_width.hypot(half_height);
        let phase = self.tick as f32 * RIPPLE_SPEED;
        self.frame
            .par_chunks_mut(width)
            .enumerate()
            .for_each(|(y, row)| {
                let dy = y as f32 - half_height;
                for (x, sample) in row.iter_mut().enumerate() {
                    let dx = x as f32 - half_width;
                    let radius = dx.hypot(dy) / radius_max;
                    let wave = (radius * RIPPLE_FREQUENCY - phase).sin();
                    // Closer to the sensor in the middle, flattening outward
                    let depth = (0.35 + 0.25 * radius + 0.05 * wave).clamp(0.0, 1.0);
                    *sample = (depth * f32::from(MAX_RAW_DEPTH)) as u16;
                }
            });
    }
}

impl DepthDevice for SyntheticDepthDevice {
    fn name(&self) -> &str {
        &self.name
    }

    fn start(&mut self, options: &DeviceOptions) -> anyhow::Result<()> {
        self.start_attempts += 1;
        if self.state == DeviceState::Capturing {
            debug!("{} already capturing", self.name);
            return Ok(());
        }
        if self.start_attempts <= self.failed_starts {
            self.state = DeviceState::Failed;
            bail!(
                "{} did not answer start request {}/{}",
                self.name,
                self.start_attempts,
                self.failed_starts
            );
        }
        if options.is_skeleton_tracking_enabled() || options.is_video_enabled() {
            debug!("{} only provides a depth stream", self.name);
        }
        self.resolution = options.depth_resolution();
        self.frame = vec![0; self.resolution.pixel_count()];
        self.tick = 0;
        self.state = DeviceState::Capturing;
        info!(
            "{} capturing depth at {}x{}",
            self.name,
            self.resolution.width(),
            self.resolution.height()
        );
        Ok(())
    }

    fn state(&self) -> DeviceState {
        self.state
    }

    fn update(&mut self) {
        if self.state != DeviceState::Capturing {
            return;
        }
        self.tick += 1;
        self.render_frame();
    }

    fn depth_at(&self, x: u32, y: u32) -> f32 {
        if x >= self.resolution.width() || y >= self.resolution.height() {
            return 0.0;
        }
        let index = y as usize * self.resolution.width() as usize + x as usize;
        self.frame
            .get(index)
            .map_or(0.0, |raw| f32::from(*raw) / f32::from(MAX_RAW_DEPTH))
    }

    fn stop(&mut self) {
        if self.state == DeviceState::Capturing {
            info!("{} stopped", self.name);
        }
        self.state = DeviceState::NotStarted;
        self.frame.clear();
    }
}
