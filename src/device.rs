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

//! Depth capture devices.
//!
//! The application only talks to a device through [`DepthDevice`]: start it,
//! poll whether it captures, pull the latest frame, and sample normalized
//! depth per pixel. Whatever threads a backend runs stay behind that trait.

pub mod synthetic;

pub use synthetic::SyntheticDepthDevice;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ImageResolution {
    Res80x60,
    #[default]
    Res320x240,
    Res640x480,
    Res1280x960,
}

impl ImageResolution {
    #[must_use]
    pub const fn width(self) -> u32 {
        match self {
            Self::Res80x60 => 80,
            Self::Res320x240 => 320,
            Self::Res640x480 => 640,
            Self::Res1280x960 => 1280,
        }
    }
    #[must_use]
    pub const fn height(self) -> u32 {
        match self {
            Self::Res80x60 => 60,
            Self::Res320x240 => 240,
            Self::Res640x480 => 480,
            Self::Res1280x960 => 960,
        }
    }
    #[must_use]
    pub const fn pixel_count(self) -> usize {
        self.width() as usize * self.height() as usize
    }
}

/// Stream configuration passed to [`DepthDevice::start`].
///
/// Defaults enable every stream, at the device's default depth resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceOptions {
    skeleton_tracking: bool,
    video: bool,
    depth_resolution: ImageResolution,
}

impl Default for DeviceOptions {
    fn default() -> Self {
        Self {
            skeleton_tracking: true,
            video: true,
            depth_resolution: ImageResolution::default(),
        }
    }
}

impl DeviceOptions {
    /// Depth stream only, skeleton tracking and color video disabled.
    #[must_use]
    pub fn depth_only(resolution: ImageResolution) -> Self {
        Self::default()
            .enable_skeleton_tracking(false)
            .enable_video(false)
            .set_depth_resolution(resolution)
    }
    #[must_use]
    pub fn enable_skeleton_tracking(mut self, enabled: bool) -> Self {
        self.skeleton_tracking = enabled;
        self
    }
    #[must_use]
    pub fn enable_video(mut self, enabled: bool) -> Self {
        self.video = enabled;
        self
    }
    #[must_use]
    pub fn set_depth_resolution(mut self, resolution: ImageResolution) -> Self {
        self.depth_resolution = resolution;
        self
    }
    #[must_use]
    pub fn is_skeleton_tracking_enabled(&self) -> bool {
        self.skeleton_tracking
    }
    #[must_use]
    pub fn is_video_enabled(&self) -> bool {
        self.video
    }
    #[must_use]
    pub fn depth_resolution(&self) -> ImageResolution {
        self.depth_resolution
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeviceState {
    #[default]
    NotStarted,
    Capturing,
    /// Last start attempt failed. Another `start` may succeed.
    Failed,
}

pub trait DepthDevice: Send + Sync {
    fn name(&self) -> &str;
    /// Errors leave the device in [`DeviceState::Failed`].
    fn start(&mut self, options: &DeviceOptions) -> anyhow::Result<()>;
    fn state(&self) -> DeviceState;
    fn is_capturing(&self) -> bool {
        self.state() == DeviceState::Capturing
    }
    /// Pulls the latest depth frame, if any.
    fn update(&mut self);
    /// Normalized depth in `0.0..=1.0`. Reads `0.0` outside the frame or when
    /// no frame is available.
    fn depth_at(&self, x: u32, y: u32) -> f32;
    fn stop(&mut self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn depth_only_options() {
        let options = DeviceOptions::depth_only(ImageResolution::Res640x480);
        assert!(!options.is_skeleton_tracking_enabled());
        assert!(!options.is_video_enabled());
        assert_eq!(options.depth_resolution(), ImageResolution::Res640x480);
    }

    #[test]
    fn default_options_enable_all_streams() {
        let options = DeviceOptions::default();
        assert!(options.is_skeleton_tracking_enabled());
        assert!(options.is_video_enabled());
        assert_eq!(options.depth_resolution(), ImageResolution::Res320x240);
    }

    #[test]
    fn resolution_sizes() {
        assert_eq!(ImageResolution::Res640x480.pixel_count(), 307_200);
        assert_eq!(ImageResolution::Res80x60.width(), 80);
        assert_eq!(ImageResolution::Res1280x960.height(), 960);
    }
}
