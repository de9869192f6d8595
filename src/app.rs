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

//! Depth camera viewer: captures depth frames and shows them as points.

use cgmath::Point3;
use log::{debug, info, warn};
use winit::event::KeyEvent;
use winit::keyboard::{Key, NamedKey};

use crate::cameras::{Camera, CameraView, PerspectiveCameraConfig};
use crate::device::{DepthDevice, DeviceOptions};
use crate::point_cloud::{KINECT_SIZE, PointCloud, point_color, should_retry};
use crate::primitives::points::PointBatch;
use crate::{AppControl, DrawContext, LaunchContext, RenderContext, RenderLoopHandler};

pub const WINDOW_WIDTH: u32 = 1024;
pub const WINDOW_HEIGHT: u32 = 768;

const CAMERA_EYE: [f32; 3] = [0.0, 0.0, 670.0];
const CAMERA_FOVY_DEG: f32 = 60.0;
const CAMERA_NEAR: f32 = 0.01;
const CAMERA_FAR: f32 = 5000.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAction {
    Quit,
    ToggleFullScreen,
}

impl KeyAction {
    #[must_use]
    pub fn from_key(key: &Key) -> Option<Self> {
        match key {
            Key::Named(NamedKey::Escape) => Some(Self::Quit),
            Key::Character(c) if c.eq_ignore_ascii_case("f") => Some(Self::ToggleFullScreen),
            _ => None,
        }
    }
}

pub fn key_down(action: KeyAction, control: &mut AppControl) {
    match action {
        KeyAction::Quit => {
            info!("Quit requested");
            control.request_quit();
        }
        KeyAction::ToggleFullScreen => {
            control.toggle_fullscreen();
            info!("Full screen: {}", control.is_fullscreen());
        }
    }
}

/// Owns the depth device and the point list built from it.
pub struct DepthCapture {
    device: Box<dyn DepthDevice>,
    options: DeviceOptions,
    points: PointCloud,
}

impl DepthCapture {
    /// Starts `device` with depth only. A failed start is retried by
    /// [`DepthCapture::update`].
    pub fn setup(device: Box<dyn DepthDevice>) -> Self {
        let mut capture = Self {
            device,
            options: DeviceOptions::depth_only(KINECT_SIZE),
            points: PointCloud::new(KINECT_SIZE),
        };
        match capture.device.start(&capture.options) {
            Ok(()) => info!("{} started", capture.device.name()),
            Err(err) => warn!("{} failed to start: {err:#}", capture.device.name()),
        }
        capture
    }

    /// Rebuilds the points from the latest frame. A device that is not
    /// capturing is restarted every [`RETRY_INTERVAL_FRAMES`] frames, and
    /// a successful restart already yields points on that frame.
    ///
    /// [`RETRY_INTERVAL_FRAMES`]: crate::point_cloud::RETRY_INTERVAL_FRAMES
    pub fn update(&mut self, elapsed_frames: u64, eye_z: f32) {
        if !self.device.is_capturing() {
            self.points.clear();
            if !should_retry(elapsed_frames) {
                return;
            }
            debug!(
                "{} not capturing, restarting at frame {elapsed_frames}",
                self.device.name()
            );
            if let Err(err) = self.device.start(&self.options) {
                debug!("{} restart failed: {err:#}", self.device.name());
                return;
            }
            if !self.device.is_capturing() {
                return;
            }
            info!("{} started", self.device.name());
        }
        self.device.update();
        self.points.rebuild(self.device.as_ref(), eye_z);
    }

    pub fn shutdown(&mut self) {
        self.device.stop();
        self.points.clear();
    }

    #[must_use]
    pub fn is_capturing(&self) -> bool {
        self.device.is_capturing()
    }

    #[must_use]
    pub fn points(&self) -> &PointCloud {
        &self.points
    }
}

pub struct DepthCloudApp {
    capture: DepthCapture,
    camera: Camera,
    batch: PointBatch,
    is_shut_down: bool,
}

impl DepthCloudApp {
    pub fn new(
        LaunchContext { draw_context }: LaunchContext,
        device: Box<dyn DepthDevice>,
    ) -> anyhow::Result<Self> {
        draw_context.set_clear_color(Some(wgpu::Color::BLACK));
        let batch = PointBatch::new(draw_context, KINECT_SIZE.pixel_count())?;
        let capture = DepthCapture::setup(device);
        let camera = Camera::new(
            CameraView::look_at(Point3::from(CAMERA_EYE), Point3::new(0.0, 0.0, 0.0)),
            Box::new(PerspectiveCameraConfig {
                fovy: CAMERA_FOVY_DEG.to_radians(),
                aspect: draw_context.surface_ratio(),
                near: CAMERA_NEAR,
                far: CAMERA_FAR,
            }),
        );
        Ok(Self {
            capture,
            camera,
            batch,
            is_shut_down: false,
        })
    }

    fn eye_z(&self) -> f32 {
        self.camera.eye_position().z
    }

    fn draw(&mut self) {
        let eye_z = self.eye_z();
        self.batch.set_matrices(&self.camera);
        self.batch.begin();
        for point in self.capture.points().points() {
            self.batch.vertex(point_color(point.z, eye_z), *point);
        }
        self.batch.end();
    }
}

impl RenderLoopHandler for DepthCloudApp {
    fn on_keyboard_event(&mut self, event: &KeyEvent, control: &mut AppControl) {
        if let Some(action) = KeyAction::from_key(&event.logical_key) {
            key_down(action, control);
        }
    }

    fn on_resize(&mut self, draw_context: &DrawContext) {
        self.camera
            .resize_screen(draw_context.surface_dimensions());
    }

    fn on_update(&mut self, render_context: &RenderContext) {
        let eye_z = self.eye_z();
        self.capture
            .update(render_context.time_info.elapsed_frames, eye_z);
    }

    fn on_render(
        &mut self,
        _render_context: &RenderContext,
        render_pass: &mut wgpu::RenderPass<'static>,
    ) {
        self.draw();
        self.batch.render(render_pass);
    }

    fn on_shutdown(&mut self) {
        if self.is_shut_down {
            return;
        }
        self.is_shut_down = true;
        self.capture.shutdown();
        info!("Depth capture shut down");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    use anyhow::bail;

    use super::*;
    use crate::device::{DeviceState, ImageResolution, SyntheticDepthDevice};

    const EYE_Z: f32 = 670.0;

    #[derive(Default)]
    struct DeviceCalls {
        starts: AtomicU32,
        stops: AtomicU32,
        last_options: Mutex<Option<DeviceOptions>>,
    }

    impl DeviceCalls {
        fn starts(&self) -> u32 {
            self.starts.load(Ordering::SeqCst)
        }
        fn stops(&self) -> u32 {
            self.stops.load(Ordering::SeqCst)
        }
        fn last_options(&self) -> Option<DeviceOptions> {
            *self.last_options.lock().unwrap()
        }
    }

    /// Fails every start until `succeed_after` attempts, recording calls in `calls`.
    struct ScriptedDevice {
        calls: Arc<DeviceCalls>,
        succeed_after: u32,
        state: DeviceState,
    }

    impl ScriptedDevice {
        fn new(succeed_after: u32) -> (Self, Arc<DeviceCalls>) {
            let calls = Arc::new(DeviceCalls::default());
            let device = Self {
                calls: Arc::clone(&calls),
                succeed_after,
                state: DeviceState::NotStarted,
            };
            (device, calls)
        }
    }

    impl DepthDevice for ScriptedDevice {
        fn name(&self) -> &str {
            "scripted"
        }
        fn start(&mut self, options: &DeviceOptions) -> anyhow::Result<()> {
            let attempt = self.calls.starts.fetch_add(1, Ordering::SeqCst) + 1;
            *self.calls.last_options.lock().unwrap() = Some(*options);
            if attempt <= self.succeed_after {
                self.state = DeviceState::Failed;
                bail!("attempt {attempt} refused");
            }
            self.state = DeviceState::Capturing;
            Ok(())
        }
        fn state(&self) -> DeviceState {
            self.state
        }
        fn update(&mut self) {}
        fn depth_at(&self, _x: u32, _y: u32) -> f32 {
            0.25
        }
        fn stop(&mut self) {
            self.calls.stops.fetch_add(1, Ordering::SeqCst);
            self.state = DeviceState::NotStarted;
        }
    }

    #[test]
    fn setup_starts_depth_only() {
        let (device, calls) = ScriptedDevice::new(0);
        let capture = DepthCapture::setup(Box::new(device));
        assert_eq!(calls.starts(), 1);
        assert!(capture.is_capturing());
        assert_eq!(
            calls.last_options(),
            Some(DeviceOptions::depth_only(ImageResolution::Res640x480))
        );
    }

    #[test]
    fn capturing_frames_hold_full_point_list() {
        let (device, _) = ScriptedDevice::new(0);
        let mut capture = DepthCapture::setup(Box::new(device));
        for frame in 0..3 {
            capture.update(frame, EYE_Z);
            assert_eq!(capture.points().len(), 640 * 480);
        }
    }

    #[test]
    fn failed_device_retries_every_ninety_frames() {
        let (device, calls) = ScriptedDevice::new(u32::MAX);
        let mut capture = DepthCapture::setup(Box::new(device));
        assert_eq!(calls.starts(), 1);

        capture.update(45, EYE_Z);
        assert_eq!(calls.starts(), 1);

        for frame in 0..=180 {
            capture.update(frame, EYE_Z);
            assert!(capture.points().is_empty());
        }
        // One start at setup, then frames 0, 90 and 180
        assert_eq!(calls.starts(), 4);
    }

    #[test]
    fn retry_uses_depth_only_options() {
        let (device, calls) = ScriptedDevice::new(1);
        let mut capture = DepthCapture::setup(Box::new(device));
        assert!(!capture.is_capturing());
        *calls.last_options.lock().unwrap() = None;
        capture.update(0, EYE_Z);
        assert_eq!(calls.starts(), 2);
        assert!(capture.is_capturing());
        let options = calls.last_options().unwrap();
        assert_eq!(options, DeviceOptions::depth_only(ImageResolution::Res640x480));
        assert!(!options.is_video_enabled());
        assert!(!options.is_skeleton_tracking_enabled());
    }

    #[test]
    fn points_appear_on_the_frame_retry_succeeds() {
        let (device, calls) = ScriptedDevice::new(2);
        let mut capture = DepthCapture::setup(Box::new(device));
        for frame in 0..90 {
            capture.update(frame, EYE_Z);
            assert!(capture.points().is_empty());
        }
        assert_eq!(calls.starts(), 2);
        capture.update(90, EYE_Z);
        assert!(capture.is_capturing());
        assert_eq!(capture.points().len(), 640 * 480);
    }

    #[test]
    fn capture_loss_clears_points() {
        let (device, _) = ScriptedDevice::new(0);
        let mut capture = DepthCapture::setup(Box::new(device));
        capture.update(1, EYE_Z);
        assert!(!capture.points().is_empty());
        capture.device.stop();
        capture.update(2, EYE_Z);
        assert!(capture.points().is_empty());
    }

    #[test]
    fn shutdown_stops_device_and_clears_points() {
        let (device, calls) = ScriptedDevice::new(0);
        let mut capture = DepthCapture::setup(Box::new(device));
        capture.update(1, EYE_Z);
        capture.shutdown();
        assert_eq!(calls.stops(), 1);
        assert!(!capture.is_capturing());
        assert!(capture.points().is_empty());
    }

    #[test]
    fn synthetic_device_feeds_points() {
        let mut capture = DepthCapture::setup(Box::new(SyntheticDepthDevice::default()));
        capture.update(1, EYE_Z);
        assert_eq!(capture.points().len(), KINECT_SIZE.pixel_count());
        assert!(
            capture
                .points()
                .points()
                .iter()
                .all(|point| point.z <= EYE_Z)
        );
    }

    #[test]
    fn escape_requests_quit_once_per_press() {
        let mut control = AppControl::default();
        let action = KeyAction::from_key(&Key::Named(NamedKey::Escape));
        assert_eq!(action, Some(KeyAction::Quit));
        key_down(KeyAction::Quit, &mut control);
        assert!(control.take_quit_request());
        assert!(!control.take_quit_request());
        key_down(KeyAction::Quit, &mut control);
        assert!(control.take_quit_request());
    }

    #[test]
    fn f_toggles_full_screen() {
        let mut control = AppControl::default();
        let action = KeyAction::from_key(&Key::Character("f".into()));
        assert_eq!(action, Some(KeyAction::ToggleFullScreen));
        key_down(KeyAction::ToggleFullScreen, &mut control);
        assert!(control.is_fullscreen());
        key_down(KeyAction::ToggleFullScreen, &mut control);
        assert!(!control.is_fullscreen());
        assert!(!control.is_quit_requested());
    }

    #[test]
    fn other_keys_are_ignored() {
        assert_eq!(KeyAction::from_key(&Key::Character("g".into())), None);
        assert_eq!(KeyAction::from_key(&Key::Named(NamedKey::Enter)), None);
        assert_eq!(
            KeyAction::from_key(&Key::Character("F".into())),
            Some(KeyAction::ToggleFullScreen)
        );
    }
}
