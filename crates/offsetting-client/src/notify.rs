//! Outbound side of the session: user-facing notices and state updates.

use std::sync::{Mutex, MutexGuard};

use crate::state::ClientState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    Success,
    Info,
    Warning,
    Error,
}

/// A notice for the user: short title, longer message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub title: String,
    pub message: String,
    pub kind: NoticeKind,
}

impl Notification {
    pub fn new(kind: NoticeKind, title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            message: message.into(),
            kind,
        }
    }
}

pub trait Notifier: Send + Sync {
    fn notify(&self, notification: Notification);
}

pub trait StateSink: Send + Sync {
    fn publish(&self, state: &ClientState);
}

/// Writes notices to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, notification: Notification) {
        let Notification { title, message, kind } = notification;
        match kind {
            NoticeKind::Success | NoticeKind::Info => tracing::info!(%title, "{message}"),
            NoticeKind::Warning => tracing::warn!(%title, "{message}"),
            NoticeKind::Error => tracing::error!(%title, "{message}"),
        }
    }
}

/// Writes state updates to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl StateSink for LogSink {
    fn publish(&self, state: &ClientState) {
        tracing::info!(
            to_compensate = %state.to_compensate,
            total_compensated = %state.total_compensated,
            last_compensation_date = %state.last_compensation_date,
            "State updated"
        );
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Keeps every notice in memory.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    notifications: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notifications(&self) -> Vec<Notification> {
        lock(&self.notifications).clone()
    }

    pub fn last(&self) -> Option<Notification> {
        lock(&self.notifications).last().cloned()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notification: Notification) {
        lock(&self.notifications).push(notification);
    }
}

/// Keeps every published state in memory.
#[derive(Debug, Default)]
pub struct RecordingSink {
    states: Mutex<Vec<ClientState>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn states(&self) -> Vec<ClientState> {
        lock(&self.states).clone()
    }
}

impl StateSink for RecordingSink {
    fn publish(&self, state: &ClientState) {
        lock(&self.states).push(state.clone());
    }
}
