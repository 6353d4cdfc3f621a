// =============================================================================
// VORTEX RENDERER - one triangle through a raw Vulkan presentation pipeline
// =============================================================================
//
// ARCHITECTURE OVERVIEW:
// ┌─────────────────────────────────────────────────────────────────┐
// │  App (winit event loop, window, config)                         │
// │    └── Renderer (owns every GPU object)                         │
// │          └── Instance + Surface + Device                        │
// │                └── Swapchain + Pipeline + Command Buffers       │
// │                      └── FrameSync (fences, semaphores)         │
// └─────────────────────────────────────────────────────────────────┘
//
// FRAME FLOW:
// 1. Wait for the frame slot's fence
// 2. Acquire swapchain image
// 3. Submit the image's pre-recorded commands
// 4. Present rendered image to screen
// 5. Advance to the next frame slot
//
// =============================================================================

mod backend;
mod config;
mod renderer;

use anyhow::{Context, Result};
use backend::FrameOutcome;
use config::{Config, CONFIG_PATH};
use renderer::Renderer;
use std::sync::Arc;
use std::time::Instant;
use winit::{
    application::ApplicationHandler,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, EventLoop},
    window::{Window, WindowAttributes, WindowId},
};

// =============================================================================
// ENTRY POINT
// =============================================================================

fn main() -> Result<()> {
    // Load configuration from config.toml; its log level drives the logger,
    // so the load outcome is reported once logging is up
    let (config, load_status) = Config::load(CONFIG_PATH);

    init_logging(&config);
    load_status.log();
    log::debug!("Config: {:?}", config);
    log::info!("Starting Vortex renderer");
    log::info!(
        "Window: {}x{}, present mode: {}",
        config.window.width,
        config.window.height,
        config.graphics.present_mode
    );

    let event_loop = EventLoop::new()?;
    let mut app = App::new(config);
    event_loop.run_app(&mut app)?;

    // Fatal errors end the loop early and make the process exit non-zero
    match app.fatal.take() {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

/// Initialize logging; RUST_LOG overrides the configured level
fn init_logging(config: &Config) {
    let mut builder = env_logger::Builder::new();
    builder.filter_level(config.log_level());
    builder.parse_default_env();
    builder.init();
}

// =============================================================================
// APPLICATION STATE
// =============================================================================

/// Application driver: owns the window and the renderer.
///
/// IMPORTANT: the renderer must be dropped before the window, the surface
/// refers to it.
struct App {
    config: Config,

    renderer: Option<Renderer>,
    window: Option<Arc<Window>>,

    /// First unrecoverable error, returned from main
    fatal: Option<anyhow::Error>,

    // FPS tracking
    frame_count: u32,
    last_fps_update: Instant,
}

impl App {
    fn new(config: Config) -> Self {
        Self {
            config,
            renderer: None,
            window: None,
            fatal: None,
            frame_count: 0,
            last_fps_update: Instant::now(),
        }
    }

    /// Create the window and every Vulkan object, in that order
    fn start(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let window_attributes = WindowAttributes::default()
            .with_title(&self.config.window.title)
            .with_inner_size(winit::dpi::PhysicalSize::new(
                self.config.window.width,
                self.config.window.height,
            ))
            // Swapchain recreation is not supported
            .with_resizable(false);

        let window = Arc::new(
            event_loop
                .create_window(window_attributes)
                .context("Failed to create window")?,
        );

        let size = window.inner_size();
        let renderer = Renderer::new(&self.config, window.as_ref(), (size.width, size.height))
            .map_err(|e| {
                let context = if e.is_init() {
                    "Failed to initialize Vulkan"
                } else {
                    "Failed to record draw commands"
                };
                anyhow::Error::new(e).context(context)
            })?;

        self.renderer = Some(renderer);
        self.window = Some(window);
        Ok(())
    }

    /// Record the error and stop the loop
    fn fail(&mut self, event_loop: &ActiveEventLoop, error: anyhow::Error) {
        log::error!("{:#}", error);
        if self.fatal.is_none() {
            self.fatal = Some(error);
        }
        event_loop.exit();
    }

    /// Tear down in reverse: renderer first, then the window
    fn shutdown(&mut self) {
        self.renderer = None;
        self.window = None;
    }

    fn update_fps(&mut self) {
        if !self.config.debug.show_fps {
            return;
        }

        self.frame_count += 1;
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_fps_update).as_secs_f32();

        // Update title every second
        if elapsed >= 1.0 {
            let fps = self.frame_count as f32 / elapsed;
            if let Some(ref window) = self.window {
                window.set_title(&format!(
                    "{} - {:.0} FPS ({:.2}ms)",
                    self.config.window.title,
                    fps,
                    1000.0 / fps
                ));
            }
            log::debug!("{:.0} FPS", fps);

            self.frame_count = 0;
            self.last_fps_update = now;
        }
    }
}

// =============================================================================
// EVENT HANDLING
// =============================================================================

impl ApplicationHandler for App {
    /// Called when the application is ready to create windows.
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() || self.fatal.is_some() {
            return;
        }

        if let Err(e) = self.start(event_loop) {
            self.fail(event_loop, e);
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                log::info!("Close requested, shutting down...");
                event_loop.exit();
            }

            WindowEvent::KeyboardInput { event, .. } => {
                use winit::keyboard::{KeyCode, PhysicalKey};

                let escape = event.physical_key == PhysicalKey::Code(KeyCode::Escape);
                if event.state.is_pressed() && escape {
                    log::info!("ESC pressed, exiting...");
                    event_loop.exit();
                }
            }

            WindowEvent::Resized(size) => {
                log::debug!(
                    "Window resized to {}x{}; the swapchain keeps its original extent",
                    size.width,
                    size.height
                );
            }

            WindowEvent::RedrawRequested => {
                let Some(renderer) = self.renderer.as_mut() else {
                    return;
                };
                match renderer.draw_frame() {
                    Ok(FrameOutcome::Presented {
                        image_index,
                        status,
                    }) => {
                        log::trace!("Presented image {} ({:?})", image_index, status);
                        self.update_fps();
                    }
                    Ok(FrameOutcome::Skipped) => log::trace!("Frame skipped"),
                    Err(e) => {
                        let error = anyhow::Error::new(e).context("Render error");
                        self.fail(event_loop, error);
                    }
                }
            }

            _ => {}
        }
    }

    /// Called when the event loop is about to block waiting for events.
    /// We use this to request continuous redraws.
    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(ref window) = self.window {
            window.request_redraw();
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        self.shutdown();
    }
}
