//! Screen host abstraction

use std::sync::Mutex;

use serde::Serialize;
use tracing::{debug, error};

/// Whatever displays the screens
///
/// The router drives it through a fixed sequence on every successful
/// navigation: `hide_all`, `highlight`, render, `show`, `scroll_to_top`
/// (unless preserved), `set_title`.
pub trait Viewport: Send + Sync {
    fn hide_all(&self);
    fn highlight(&self, path: &str);
    fn show(&self, path: &str);
    fn scroll_to_top(&self);
    fn set_title(&self, title: &str);
    /// Blocking error screen after an unrecoverable startup failure
    fn show_fatal_error(&self, message: &str);
}

/// What a [`HeadlessViewport`] currently displays
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ViewportState {
    pub visible: Option<String>,
    pub highlighted: Option<String>,
    pub title: String,
    pub scroll_resets: usize,
    pub fatal_error: Option<String>,
}

/// Viewport without a display, recording what would be shown
#[derive(Debug, Default)]
pub struct HeadlessViewport {
    state: Mutex<ViewportState>,
}

impl HeadlessViewport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> ViewportState {
        self.lock().clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ViewportState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Viewport for HeadlessViewport {
    fn hide_all(&self) {
        self.lock().visible = None;
    }

    fn highlight(&self, path: &str) {
        self.lock().highlighted = Some(path.to_string());
    }

    fn show(&self, path: &str) {
        debug!(%path, "HeadlessViewport::show");
        self.lock().visible = Some(path.to_string());
    }

    fn scroll_to_top(&self) {
        self.lock().scroll_resets += 1;
    }

    fn set_title(&self, title: &str) {
        self.lock().title = title.to_string();
    }

    fn show_fatal_error(&self, message: &str) {
        error!(%message, "Fatal error screen");
        let mut state = self.lock();
        state.visible = None;
        state.fatal_error = Some(message.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_headless_viewport_records_state() {
        let viewport = HeadlessViewport::new();
        viewport.show("dashboard");
        viewport.highlight("dashboard");
        viewport.set_title("Dashboard - SmartTrack");
        viewport.scroll_to_top();
        viewport.hide_all();

        let state = viewport.snapshot();
        assert_eq!(state.visible, None);
        assert_eq!(state.highlighted.as_deref(), Some("dashboard"));
        assert_eq!(state.title, "Dashboard - SmartTrack");
        assert_eq!(state.scroll_resets, 1);
    }

    #[test]
    fn test_fatal_error_replaces_screen() {
        let viewport = HeadlessViewport::new();
        viewport.show("dashboard");
        viewport.show_fatal_error("boom");

        let state = viewport.snapshot();
        assert_eq!(state.visible, None);
        assert_eq!(state.fatal_error.as_deref(), Some("boom"));
    }
}
