//! Spinning quad demo
//!
//! Opens a window and drives the renderer once per event-loop tick. Image paths
//! given on the command line are loaded as textures before the first frame.
//!
//! Configuration is read from `quad_app.toml` or `quad_app.ron` in the working
//! directory when present.

use std::path::Path;

use frame_engine::foundation::logging;
use frame_engine::prelude::*;

const CONFIG_FILES: [&str; 2] = ["quad_app.toml", "quad_app.ron"];

fn load_config() -> Result<ApplicationConfig, ConfigError> {
    match CONFIG_FILES.iter().find(|file| Path::new(file).exists()) {
        Some(file) => ApplicationConfig::load_from_file(file),
        None => Ok(ApplicationConfig::new("Quad Demo")),
    }
}

// The renderer is declared first so it is dropped before the window it presents into
struct QuadApp {
    renderer: VulkanRenderer,
    window: Window,
    timer: Timer,
}

impl QuadApp {
    fn new(config: &ApplicationConfig, texture_paths: &[String]) -> Result<Self, Box<dyn std::error::Error>> {
        let mut window = Window::new(&config.window)?;

        let mut textures = TextureRegistry::new();
        for path in texture_paths {
            textures.queue_file(path)?;
            log::info!("Queued texture {}", path);
        }

        let renderer = VulkanRenderer::initialize(&mut window, &config.renderer, textures)?;
        Ok(Self {
            renderer,
            window,
            timer: Timer::new(),
        })
    }

    fn run(&mut self) -> VulkanResult<()> {
        while !self.window.should_close() {
            self.window.poll_events();
            self.timer.update();

            match self.renderer.update(self.timer.delta_time())? {
                FrameStatus::Presented { .. } => {}
                FrameStatus::SwapchainRebuilt => {
                    let extent = self.renderer.extent();
                    log::info!("Swapchain rebuilt at {}x{}", extent.width, extent.height);
                }
                FrameStatus::RebuildPending => {
                    // Minimized: sleep until the window changes instead of spinning
                    let (width, height) = self.window.get_framebuffer_size();
                    if width == 0 || height == 0 {
                        self.window.wait_events();
                    }
                }
            }
        }

        log::info!(
            "Presented {} frames in {:.1}s",
            self.renderer.frame_count(),
            self.timer.total_time()
        );
        Ok(())
    }

    fn shutdown(self) {
        self.renderer.shutdown();
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config()?;
    logging::init_with_level(&config.log_level);
    config.validate()?;

    let texture_paths: Vec<String> = std::env::args().skip(1).collect();
    let mut app = QuadApp::new(&config, &texture_paths)?;

    let result = app.run();
    app.shutdown();
    result?;
    Ok(())
}
