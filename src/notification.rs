//! Blocking alerts shown as modal popups until dismissed

use std::collections::VecDeque;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertLevel {
    Info,
    Error,
}

#[derive(Debug, Clone)]
pub struct Alert {
    pub message: String,
    pub level: AlertLevel,
}

impl Alert {
    pub fn new(message: impl Into<String>, level: AlertLevel) -> Self {
        Self {
            message: message.into(),
            level,
        }
    }

    pub fn title(&self) -> &'static str {
        match self.level {
            AlertLevel::Info => " Notice ",
            AlertLevel::Error => " Error ",
        }
    }
}

/// Alerts waiting to be acknowledged, oldest first
#[derive(Debug, Default)]
pub struct AlertQueue {
    alerts: VecDeque<Alert>,
}

impl AlertQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raise(&mut self, message: impl Into<String>, level: AlertLevel) {
        let alert = Alert::new(message, level);
        log::debug!("Alert raised: {}", alert.message);
        self.alerts.push_back(alert);
    }

    pub fn info(&mut self, message: impl Into<String>) {
        self.raise(message, AlertLevel::Info);
    }

    pub fn error(&mut self, message: impl Into<String>) {
        self.raise(message, AlertLevel::Error);
    }

    /// The alert currently on screen
    pub fn current(&self) -> Option<&Alert> {
        self.alerts.front()
    }

    pub fn dismiss_current(&mut self) -> bool {
        self.alerts.pop_front().is_some()
    }

    pub fn is_blocking(&self) -> bool {
        !self.alerts.is_empty()
    }

    pub fn count(&self) -> usize {
        self.alerts.len()
    }
}
