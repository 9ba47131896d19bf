//! Window backends behind a small capability interface.

use raw_window_handle::{HasDisplayHandle, HasWindowHandle, RawDisplayHandle, RawWindowHandle};
use winit::event_loop::ActiveEventLoop;
use winit::window::Window;

/// What the renderer needs from a window: a surface to bind once at
/// startup, the current framebuffer size, and redraw scheduling.
pub trait RenderWindow {
    fn raw_display_handle(&self) -> RawDisplayHandle;
    fn raw_window_handle(&self) -> RawWindowHandle;
    fn inner_size(&self) -> [u32; 2];
    fn request_redraw(&self);
}

/// Closed set of window backends.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WindowKind {
    Desktop,
    // TODO: head-mounted display backend once an XR runtime is chosen
}

pub struct DesktopWindow {
    window: Window,
}

impl DesktopWindow {
    #[inline]
    pub fn winit_window(&self) -> &Window {
        &self.window
    }
}

impl RenderWindow for DesktopWindow {
    fn raw_display_handle(&self) -> RawDisplayHandle {
        self.window.display_handle().unwrap().as_raw()
    }

    fn raw_window_handle(&self) -> RawWindowHandle {
        self.window.window_handle().unwrap().as_raw()
    }

    fn inner_size(&self) -> [u32; 2] {
        let size = self.window.inner_size();
        [size.width, size.height]
    }

    fn request_redraw(&self) {
        self.window.request_redraw();
    }
}

/// Creates the backend for `kind`.
pub fn create_window(
    event_loop: &ActiveEventLoop,
    kind: WindowKind,
    title: &str,
    size: [u32; 2],
) -> anyhow::Result<Box<dyn RenderWindow>> {
    match kind {
        WindowKind::Desktop => {
            let attrs = Window::default_attributes()
                .with_title(title)
                .with_inner_size(winit::dpi::LogicalSize::new(size[0], size[1]));
            let window = event_loop.create_window(attrs)?;
            Ok(Box::new(DesktopWindow { window }))
        }
    }
}
