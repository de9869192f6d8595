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

use std::sync::Arc;

use log::{error, info, warn};
use pollster::FutureExt;
use web_time::Instant;
use winit::application::ApplicationHandler;
use winit::dpi::LogicalSize;
use winit::event::{ElementState, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::{Fullscreen, Window, WindowId};

use crate::draw_context::DrawContext;
use crate::render_loop::{
    AppControl, LaunchContext, RenderContext, RenderLoopBuilder, RenderLoopHandler, TimeInfo,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowSettings {
    pub title: String,
    pub width: u32,
    pub height: u32,
}

struct WindowState {
    window: Arc<Window>,
    draw_context: DrawContext,
    handler: Box<dyn RenderLoopHandler>,
    time_info: TimeInfo,
    last_frame: Instant,
    fullscreen_applied: bool,
}

impl WindowState {
    fn redraw(&mut self) -> anyhow::Result<()> {
        let now = Instant::now();
        self.time_info.processing_delta = now - self.last_frame;
        self.last_frame = now;
        let render_context = RenderContext {
            time_info: &self.time_info,
            draw_context: &self.draw_context,
            _private: (),
        };
        let handler = &mut self.handler;
        handler.on_update(&render_context);
        let result = self.draw_context.render_scene(|pass| {
            handler.on_render(&render_context, &mut pass.forget_lifetime());
        });
        self.time_info.elapsed_frames += 1;
        match result {
            Ok(()) => Ok(()),
            Err(err) => match err.downcast_ref::<wgpu::SurfaceError>() {
                Some(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                    warn!("Surface lost, reconfiguring");
                    self.draw_context.reconfigure();
                    Ok(())
                }
                Some(wgpu::SurfaceError::Timeout) => {
                    warn!("Surface timeout, frame skipped");
                    Ok(())
                }
                _ => Err(err),
            },
        }
    }

    fn apply_fullscreen(&mut self, fullscreen: bool) {
        if self.fullscreen_applied == fullscreen {
            return;
        }
        self.window
            .set_fullscreen(fullscreen.then_some(Fullscreen::Borderless(None)));
        self.fullscreen_applied = fullscreen;
    }
}

struct EventLoopApp {
    settings: WindowSettings,
    builder: Box<RenderLoopBuilder>,
    control: AppControl,
    state: Option<WindowState>,
    failure: Option<anyhow::Error>,
}

impl EventLoopApp {
    fn init_state(&self, event_loop: &ActiveEventLoop) -> anyhow::Result<WindowState> {
        let attributes = Window::default_attributes()
            .with_title(self.settings.title.as_str())
            .with_inner_size(LogicalSize::new(self.settings.width, self.settings.height));
        let window = Arc::new(event_loop.create_window(attributes)?);
        let mut draw_context = DrawContext::new(Some(Arc::clone(&window)), None).block_on()?;
        let handler = (self.builder)(LaunchContext {
            draw_context: &mut draw_context,
        })?;
        Ok(WindowState {
            window,
            draw_context,
            handler,
            time_info: TimeInfo::default(),
            last_frame: Instant::now(),
            fullscreen_applied: false,
        })
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, err: anyhow::Error) {
        error!("{err:#}");
        self.failure = Some(err);
        event_loop.exit();
    }

    fn apply_control(&mut self, event_loop: &ActiveEventLoop) {
        if self.control.take_quit_request() {
            event_loop.exit();
            return;
        }
        if let Some(state) = self.state.as_mut() {
            state.apply_fullscreen(self.control.is_fullscreen());
        }
    }
}

impl ApplicationHandler for EventLoopApp {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.state.is_some() {
            return;
        }
        match self.init_state(event_loop) {
            Ok(state) => {
                state.window.request_redraw();
                self.state = Some(state);
            }
            Err(err) => self.fail(event_loop, err.context("Could not initialize window")),
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: WindowId,
        event: WindowEvent,
    ) {
        let Some(state) = self.state.as_mut() else {
            return;
        };
        match event {
            WindowEvent::CloseRequested => self.control.request_quit(),
            WindowEvent::Resized(size) => {
                state.draw_context.resize(size.width, size.height);
                state.handler.on_resize(&state.draw_context);
            }
            WindowEvent::KeyboardInput { event, .. } => {
                if event.state == ElementState::Pressed && !event.repeat {
                    state.handler.on_keyboard_event(&event, &mut self.control);
                }
            }
            WindowEvent::RedrawRequested => {
                if let Err(err) = state.redraw() {
                    self.fail(event_loop, err);
                    return;
                }
                if state.handler.is_finished() {
                    self.control.request_quit();
                }
            }
            _ => {}
        }
        self.apply_control(event_loop);
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(state) = &self.state {
            state.window.request_redraw();
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(state) = self.state.as_mut() {
            info!(
                "Leaving after {} frames",
                state.time_info.elapsed_frames
            );
            state.handler.on_shutdown();
        }
    }
}

pub fn init_event_loop(
    settings: WindowSettings,
    builder: Box<RenderLoopBuilder>,
) -> anyhow::Result<()> {
    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);
    let mut app = EventLoopApp {
        settings,
        builder,
        control: AppControl::default(),
        state: None,
        failure: None,
    };
    event_loop.run_app(&mut app)?;
    app.failure.map_or(Ok(()), Err)
}
