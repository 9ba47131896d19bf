//! Model viewer: spins the frame loop on a desktop window and streams in
//! the builtin cube plus any glTF file given on the command line.

use std::sync::Arc;

use lumen_render::asset::asset_hub::AssetHub;
use lumen_render::asset::model::Model;
use lumen_render::asset::task_pool::TaskHandle;
use lumen_render::asset::upload::ModelUploader;
use lumen_render::platform::input_manager::InputManager;
use lumen_render::platform::window_system::{self, RenderWindow, WindowKind};
use lumen_render::renderer::renderer::Renderer;
use lumen_render::renderer::settings::RendererSettings;
use winit::application::ApplicationHandler;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, EventLoop};
use winit::keyboard::KeyCode;
use winit::window::WindowId;

#[derive(Default)]
struct ViewerApp {
    model_path: Option<String>,

    window: Option<Box<dyn RenderWindow>>,
    renderer: Option<Renderer>,
    asset_hub: Option<Arc<AssetHub>>,
    input: InputManager,

    models: Vec<Arc<Model>>,
    pending_load: Option<TaskHandle<anyhow::Result<Arc<Model>>>>,
}

impl ViewerApp {
    fn init(&mut self, event_loop: &ActiveEventLoop) -> anyhow::Result<()> {
        let window = window_system::create_window(event_loop, WindowKind::Desktop, "lumen viewer", [1280, 720])?;
        let renderer = Renderer::new(window.as_ref(), RendererSettings::default())?;

        let uploader: Arc<dyn ModelUploader> = renderer.transfer_channel();
        let asset_hub = Arc::new(AssetHub::new(uploader));

        self.models.push(asset_hub.create_cube_model()?);
        if let Some(path) = &self.model_path {
            self.pending_load = Some(asset_hub.load_model_async(path)?);
        }

        self.window = Some(window);
        self.renderer = Some(renderer);
        self.asset_hub = Some(asset_hub);
        Ok(())
    }

    fn poll_pending_load(&mut self) {
        let Some(handle) = &self.pending_load else {
            return;
        };
        let Some(result) = handle.try_get() else {
            return;
        };
        self.pending_load = None;
        match result.and_then(|load| load) {
            Ok(model) => {
                log::info!("model {} ready ({} meshes)", model.name, model.meshes.len());
                self.models.push(model);
            }
            Err(e) => log::error!("background load failed: {e:#}"),
        }
    }

    fn draw_frame(&mut self) {
        let (Some(window), Some(renderer)) = (&self.window, &mut self.renderer) else {
            return;
        };
        if renderer.begin_frame(window.as_ref()) {
            renderer.render(&self.models);
            renderer.end_frame(window.as_ref());
        }
    }
}

impl ApplicationHandler for ViewerApp {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }
        if let Err(e) = self.init(event_loop) {
            log::error!("initialization failed: {e:#}");
            event_loop.exit();
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _window_id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => event_loop.exit(),
            WindowEvent::Resized(_) => {
                if let Some(renderer) = &mut self.renderer {
                    renderer.on_window_resize();
                }
            }
            WindowEvent::RedrawRequested => {
                self.poll_pending_load();
                self.draw_frame();
            }
            other => {
                self.input.handle_window_event(&other);
                if self.input.is_key_down(KeyCode::Escape) {
                    event_loop.exit();
                }
            }
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(window) = &self.window {
            window.request_redraw();
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        // wait out in-flight frames, then release model GPU memory, then
        // tear down the device that owns it
        if let Some(renderer) = &self.renderer {
            renderer.wait_idle();
        }
        self.models.clear();
        self.pending_load = None;
        if let Some(hub) = self.asset_hub.take() {
            hub.shutdown();
        }
        if let Some(renderer) = self.renderer.take() {
            renderer.shutdown();
        }
    }
}

fn main() -> anyhow::Result<()> {
    lumen_render::logging::init_log();

    let mut app = ViewerApp {
        model_path: std::env::args().nth(1),
        ..Default::default()
    };

    let event_loop = EventLoop::new()?;
    event_loop.run_app(&mut app)?;
    Ok(())
}
