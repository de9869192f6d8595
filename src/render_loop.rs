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

use crate::draw_context::DrawContext;
use web_time::{Duration, Instant};
use winit::event::KeyEvent;

pub struct TimeInfo {
    pub init_start: Instant,
    pub processing_delta: Duration,
    /// Number of frames completed before the current one. Zero on the first frame.
    pub elapsed_frames: u64,
}

impl Default for TimeInfo {
    fn default() -> Self {
        Self {
            init_start: Instant::now(),
            processing_delta: Duration::new(0, 0),
            elapsed_frames: 0,
        }
    }
}

pub struct RenderContext<'a> {
    pub time_info: &'a TimeInfo,
    pub draw_context: &'a DrawContext,
    pub(crate) _private: (),
}

/// Requests a handler can make to the host run loop.
///
/// The run loop reads these after each event and each frame: a quit request
/// ends the loop, a change of the full-screen flag is applied to the window.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct AppControl {
    quit_requested: bool,
    fullscreen: bool,
}

impl AppControl {
    pub fn request_quit(&mut self) {
        self.quit_requested = true;
    }
    #[must_use]
    pub fn is_quit_requested(&self) -> bool {
        self.quit_requested
    }
    /// Returns `true` once per quit request.
    pub fn take_quit_request(&mut self) -> bool {
        std::mem::take(&mut self.quit_requested)
    }
    pub fn toggle_fullscreen(&mut self) {
        self.fullscreen = !self.fullscreen;
    }
    #[must_use]
    pub fn is_fullscreen(&self) -> bool {
        self.fullscreen
    }
}

pub struct LaunchContext<'a> {
    pub draw_context: &'a mut DrawContext,
}

pub trait RenderLoopHandler {
    fn on_keyboard_event(&mut self, _event: &KeyEvent, _control: &mut AppControl) {}
    fn on_resize(&mut self, _draw_context: &DrawContext) {}
    fn on_update(&mut self, _render_context: &RenderContext) {}
    fn on_render(
        &mut self,
        render_context: &RenderContext,
        render_pass: &mut wgpu::RenderPass<'static>,
    );
    fn on_shutdown(&mut self) {}
    fn is_finished(&self) -> bool {
        false
    }
}

pub type RenderLoopBuilder =
    dyn Fn(LaunchContext) -> anyhow::Result<Box<dyn RenderLoopHandler>> + Send;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quit_request_is_taken_once() {
        let mut control = AppControl::default();
        assert!(!control.take_quit_request());
        control.request_quit();
        assert!(control.is_quit_requested());
        assert!(control.take_quit_request());
        assert!(!control.take_quit_request());
    }

    #[test]
    fn fullscreen_toggles_back_and_forth() {
        let mut control = AppControl::default();
        assert!(!control.is_fullscreen());
        control.toggle_fullscreen();
        assert!(control.is_fullscreen());
        control.toggle_fullscreen();
        assert!(!control.is_fullscreen());
    }
}
