use edge_bridge_common::config::DisplayConfig;
use image::RgbImage;
use std::time::Duration;
use tracing::debug;

pub const RAW_WINDOW: &str = "Raw Image window";
pub const EDGE_WINDOW: &str = "Edge Detection";

/// How long each callback waits for UI events after drawing.
pub const EVENT_WAIT: Duration = Duration::from_millis(3);

#[derive(Debug, thiserror::Error)]
pub enum DisplayError {
    #[error("failed to open window '{0}': {1}")]
    Open(String, String),
    #[error("failed to draw window '{0}': {1}")]
    Draw(String, String),
}

/// Named on-screen windows for visual debugging.
pub trait DisplaySurface {
    /// Draw `frame` in the window called `window`, creating it if needed.
    fn show(&mut self, window: &str, frame: &RgbImage) -> Result<(), DisplayError>;

    /// Process pending UI events, blocking for at most `timeout`.
    fn wait_events(&mut self, timeout: Duration);
}

impl<T: DisplaySurface + ?Sized> DisplaySurface for Box<T> {
    fn show(&mut self, window: &str, frame: &RgbImage) -> Result<(), DisplayError> {
        (**self).show(window, frame)
    }

    fn wait_events(&mut self, timeout: Duration) {
        (**self).wait_events(timeout)
    }
}

/// Display that draws nothing, for machines without a screen.
pub struct Headless;

impl DisplaySurface for Headless {
    fn show(&mut self, window: &str, frame: &RgbImage) -> Result<(), DisplayError> {
        debug!(
            window,
            width = frame.width(),
            height = frame.height(),
            "headless, frame not shown"
        );
        Ok(())
    }

    fn wait_events(&mut self, _timeout: Duration) {}
}

/// Pick the display backend for this process.
#[cfg(feature = "display")]
pub fn open(config: &DisplayConfig) -> Box<dyn DisplaySurface> {
    if !config.enabled {
        return Box::new(Headless);
    }
    Box::new(window::WindowDisplay::new())
}

#[cfg(not(feature = "display"))]
pub fn open(config: &DisplayConfig) -> Box<dyn DisplaySurface> {
    if config.enabled {
        tracing::warn!(
            "display requested but built without the `display` feature, running headless"
        );
    }
    Box::new(Headless)
}

#[cfg(feature = "display")]
mod window {
    use super::{DisplayError, DisplaySurface};
    use image::RgbImage;
    use minifb::{Window, WindowOptions};
    use std::time::{Duration, Instant};
    use tracing::info;

    struct NamedWindow {
        name: String,
        window: Window,
        size: (usize, usize),
    }

    /// Native windows, one per name, opened lazily at the size of the first
    /// frame drawn into them. All windows close when this is dropped.
    #[derive(Default)]
    pub struct WindowDisplay {
        windows: Vec<NamedWindow>,
        buffer: Vec<u32>,
    }

    impl WindowDisplay {
        pub fn new() -> Self {
            // No windows yet: a native window needs a size, which only the
            // first frame shown under each name provides.
            Self::default()
        }

        fn window_for(
            &mut self,
            name: &str,
            size: (usize, usize),
        ) -> Result<&mut NamedWindow, DisplayError> {
            // A closed or resized window is replaced.
            self.windows
                .retain(|w| w.name != name || (w.window.is_open() && w.size == size));

            let idx = match self.windows.iter().position(|w| w.name == name) {
                Some(idx) => idx,
                None => {
                    let window = Window::new(name, size.0, size.1, WindowOptions::default())
                        .map_err(|e| DisplayError::Open(name.to_string(), e.to_string()))?;
                    info!(window = name, width = size.0, height = size.1, "window opened");
                    self.windows.push(NamedWindow {
                        name: name.to_string(),
                        window,
                        size,
                    });
                    self.windows.len() - 1
                }
            };
            Ok(&mut self.windows[idx])
        }
    }

    impl DisplaySurface for WindowDisplay {
        fn show(&mut self, name: &str, frame: &RgbImage) -> Result<(), DisplayError> {
            let size = (frame.width() as usize, frame.height() as usize);

            // minifb wants 0RGB packed into u32.
            let mut buffer = std::mem::take(&mut self.buffer);
            buffer.clear();
            buffer.extend(frame.pixels().map(|p| {
                let [r, g, b] = p.0;
                (u32::from(r) << 16) | (u32::from(g) << 8) | u32::from(b)
            }));

            let result = self.window_for(name, size).and_then(|w| {
                w.window
                    .update_with_buffer(&buffer, size.0, size.1)
                    .map_err(|e| DisplayError::Draw(name.to_string(), e.to_string()))
            });
            self.buffer = buffer;
            result
        }

        fn wait_events(&mut self, timeout: Duration) {
            let deadline = Instant::now() + timeout;
            for w in &mut self.windows {
                w.window.update();
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if !remaining.is_zero() {
                std::thread::sleep(remaining);
            }
        }
    }

    impl Drop for WindowDisplay {
        fn drop(&mut self) {
            for w in self.windows.drain(..) {
                info!(window = w.name, "closing window");
            }
        }
    }
}
