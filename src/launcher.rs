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

use log::{info, warn};
use pollster::FutureExt;
use std::env;

use crate::{
    Dimensions, LaunchContext,
    draw_context::DrawContext,
    render_loop::{RenderContext, RenderLoopBuilder, RenderLoopHandler, TimeInfo},
    window::{WindowSettings, init_event_loop},
};

const GLOBAL_LOG_FILTER: log::LevelFilter = log::LevelFilter::Info;
const ENV_HEADLESS: &str = "HEADLESS";
const ENV_HEADLESS_FRAMES: &str = "DEPTH_CLOUD_HEADLESS_FRAMES";
const DEFAULT_HEADLESS_FRAMES: u64 = 1;

pub fn launch_app<F>(settings: WindowSettings, builder: F) -> anyhow::Result<()>
where
    F: Fn(LaunchContext) -> anyhow::Result<Box<dyn RenderLoopHandler>> + 'static + Send,
{
    init_log()?;
    info!("Init app");
    let is_headless = env::var(ENV_HEADLESS).is_ok();
    if is_headless {
        info!("Running in headless mode");
        init_headless(&settings, Box::new(builder))
    } else {
        init_event_loop(settings, Box::new(builder))
    }
}

fn init_log() -> anyhow::Result<()> {
    use fern::colors::{Color, ColoredLevelConfig};
    let colors = ColoredLevelConfig::new()
        .info(Color::Blue)
        .debug(Color::Green);
    fern::Dispatch::new()
        .chain(std::io::stdout())
        .level(GLOBAL_LOG_FILTER)
        .level_for(env!("CARGO_CRATE_NAME"), log::LevelFilter::Debug)
        .format(move |out, message, record| {
            out.finish(format_args!(
                "{}[{}][{}:{}] {}",
                chrono::Local::now().format("[%H:%M:%S]"),
                colors.color(record.level()),
                record.target(),
                record.line().unwrap_or_default(),
                message
            ));
        })
        .apply()?;
    Ok(())
}

fn headless_frame_count() -> u64 {
    match env::var(ENV_HEADLESS_FRAMES) {
        Ok(value) => value.parse().unwrap_or_else(|err| {
            warn!("Ignoring {ENV_HEADLESS_FRAMES}={value}: {err}");
            DEFAULT_HEADLESS_FRAMES
        }),
        Err(_) => DEFAULT_HEADLESS_FRAMES,
    }
}

#[allow(clippy::needless_pass_by_value)]
fn init_headless(settings: &WindowSettings, builder: Box<RenderLoopBuilder>) -> anyhow::Result<()> {
    let draw_context = &mut DrawContext::new(
        None,
        Some(Dimensions {
            width: settings.width,
            height: settings.height,
        }),
    )
    .block_on()?;
    let mut handler = builder(LaunchContext {
        draw_context: &mut *draw_context,
    })?;
    let mut time_info = TimeInfo::default();
    let frame_count = headless_frame_count();
    for frame in 0..frame_count {
        time_info.elapsed_frames = frame;
        let render_context = RenderContext {
            time_info: &time_info,
            draw_context: &*draw_context,
            _private: (),
        };
        handler.on_update(&render_context);
        draw_context.render_scene(|pass| {
            handler.on_render(&render_context, &mut pass.forget_lifetime());
        })?;
        if handler.is_finished() {
            break;
        }
    }
    handler.on_shutdown();
    info!("Headless run done");
    Ok(())
}
