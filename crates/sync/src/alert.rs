//! Fire-and-forget handoff to whatever alerting/notification layer is
//! attached. The sync layer never waits on it.

use crate::world::Coordinate;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertUrgency {
    Info,
    Warning,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertKind {
    ConnectionLost,
    SessionError,
    MessageDropped,
}

#[derive(Debug, Clone)]
pub struct Alert {
    pub kind: AlertKind,
    pub text: String,
    pub urgency: AlertUrgency,
    pub coordinate: Option<Coordinate>,
}

impl Alert {
    pub fn new(kind: AlertKind, urgency: AlertUrgency, text: impl Into<String>) -> Self {
        Self {
            kind,
            text: text.into(),
            urgency,
            coordinate: None,
        }
    }
}

pub trait AlertSink: Send {
    fn notify(&self, alert: Alert);
}

/// Default sink: alerts land in the log.
#[derive(Debug, Default)]
pub struct LogAlertSink;

impl AlertSink for LogAlertSink {
    fn notify(&self, alert: Alert) {
        match alert.urgency {
            AlertUrgency::Info => log::info!("alert: {}", alert.text),
            AlertUrgency::Warning => log::warn!("alert: {}", alert.text),
            AlertUrgency::Critical => log::error!("alert: {}", alert.text),
        }
    }
}
