//! Display state shared by the session, the camera and the HTTP surface.
//!
//! Holds everything a user would see: the status line with its progress bar,
//! the telemetry figures, the last prediction, the two controls and any
//! alerts raised so far.

use parking_lot::RwLock;
use serde::Serialize;
use std::fmt;

use crate::session::SessionState;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Alert {
    pub category: String,
    pub description: String,
}

impl Alert {
    pub fn new(category: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            description: description.into(),
        }
    }
}

impl fmt::Display for Alert {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.category, self.description)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DashboardSnapshot {
    pub status_message: String,
    pub progress_percent: u8,
    pub elapsed: Option<String>,
    pub storage: Option<String>,
    pub memory: Option<String>,
    pub output: Option<String>,
    pub start_enabled: bool,
    pub predict_visible: bool,
    pub session_state: SessionState,
    pub alerts: Vec<Alert>,
}

impl Default for DashboardSnapshot {
    fn default() -> Self {
        Self {
            status_message: String::new(),
            progress_percent: 0,
            elapsed: None,
            storage: None,
            memory: None,
            output: None,
            start_enabled: true,
            predict_visible: false,
            session_state: SessionState::Idle,
            alerts: Vec::new(),
        }
    }
}

#[derive(Debug, Default)]
pub struct Dashboard {
    inner: RwLock<DashboardSnapshot>,
}

impl Dashboard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the status line and the progress bar width.
    pub fn report(&self, message: impl Into<String>, progress_percent: u8) {
        let message = message.into();
        let progress_percent = progress_percent.min(100);
        tracing::info!(progress = progress_percent, "{}", message);

        let mut inner = self.inner.write();
        inner.status_message = message;
        inner.progress_percent = progress_percent;
    }

    pub fn alert(&self, alert: Alert) {
        tracing::error!(category = %alert.category, "{}", alert.description);
        self.inner.write().alerts.push(alert);
    }

    pub fn set_elapsed(&self, text: impl Into<String>) {
        self.inner.write().elapsed = Some(text.into());
    }

    pub fn set_storage(&self, text: impl Into<String>) {
        self.inner.write().storage = Some(text.into());
    }

    pub fn set_memory(&self, text: impl Into<String>) {
        self.inner.write().memory = Some(text.into());
    }

    pub fn set_output(&self, text: impl Into<String>) {
        self.inner.write().output = Some(text.into());
    }

    /// Disables the start control. Returns `false` when it was already
    /// disabled, so only one caller ever wins the right to start a session.
    pub fn disable_start(&self) -> bool {
        let mut inner = self.inner.write();
        std::mem::replace(&mut inner.start_enabled, false)
    }

    pub fn set_predict_visible(&self, visible: bool) {
        self.inner.write().predict_visible = visible;
    }

    pub fn predict_visible(&self) -> bool {
        self.inner.read().predict_visible
    }

    pub(crate) fn set_session_state(&self, state: SessionState) {
        self.inner.write().session_state = state;
    }

    pub fn snapshot(&self) -> DashboardSnapshot {
        self.inner.read().clone()
    }
}
