//! Audit events emitted for every state-changing downstream operation.
//!
//! The engine never stores events itself. Connectors publish into an
//! [`EventSink`] handed to them by the driver for the duration of a pass.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::info;

/// Principal recorded on every event.
pub const PRINCIPAL: &str = "idm-sync";

/// Kind of state change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    UserCreated,
    UserBlocked,
    UserUnblocked,
    UserAdded,
    UserUpdated,
    UserRemoved,
    /// A group, team or similar container was created.
    CompositeCreated,
}

impl EventType {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::UserCreated => "USER_CREATED",
            EventType::UserBlocked => "USER_BLOCKED",
            EventType::UserUnblocked => "USER_UNBLOCKED",
            EventType::UserAdded => "USER_ADDED",
            EventType::UserUpdated => "USER_UPDATED",
            EventType::UserRemoved => "USER_REMOVED",
            EventType::CompositeCreated => "COMPOSITE_CREATED",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One audit record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuditEvent {
    pub principal: &'static str,
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub timestamp: DateTime<Utc>,
    /// Free-form payload; always contains `application`.
    pub data: BTreeMap<String, String>,
}

impl AuditEvent {
    pub fn new(event_type: EventType, application: &str) -> Self {
        let mut data = BTreeMap::new();
        data.insert("application".to_string(), application.to_string());
        Self {
            principal: PRINCIPAL,
            event_type,
            timestamp: Utc::now(),
            data,
        }
    }

    /// Add a payload field.
    #[must_use]
    pub fn with(mut self, key: &str, value: impl Into<String>) -> Self {
        self.data.insert(key.to_string(), value.into());
        self
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.data.get(key).map(String::as_str)
    }

    #[must_use]
    pub fn application(&self) -> &str {
        self.get("application").unwrap_or_default()
    }

    #[must_use]
    pub fn username(&self) -> Option<&str> {
        self.get("username")
    }
}

/// Receiver of audit events.
pub trait EventSink: Send + Sync {
    fn publish(&self, event: AuditEvent);
}

/// Collects every event; used by tests and one-shot runs.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<AuditEvent>>,
}

impl RecordingSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn events(&self) -> Vec<AuditEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Event types in publication order.
    #[must_use]
    pub fn types(&self) -> Vec<EventType> {
        self.events().iter().map(|e| e.event_type).collect()
    }

    #[must_use]
    pub fn count(&self, event_type: EventType) -> usize {
        self.events()
            .iter()
            .filter(|e| e.event_type == event_type)
            .count()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.events.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl EventSink for RecordingSink {
    fn publish(&self, event: AuditEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }
}

/// Bounded audit log; drops the oldest event once `capacity` is reached.
#[derive(Debug)]
pub struct InMemoryAuditLog {
    capacity: usize,
    events: Mutex<VecDeque<AuditEvent>>,
}

impl InMemoryAuditLog {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            events: Mutex::new(VecDeque::with_capacity(capacity.clamp(1, 4096))),
        }
    }

    /// Events newest last, optionally filtered by `since`.
    #[must_use]
    pub fn find(&self, since: Option<DateTime<Utc>>) -> Vec<AuditEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|e| since.map_or(true, |s| e.timestamp >= s))
            .cloned()
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.events.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl EventSink for InMemoryAuditLog {
    fn publish(&self, event: AuditEvent) {
        let mut events = self.events.lock().unwrap_or_else(PoisonError::into_inner);
        while events.len() >= self.capacity {
            events.pop_front();
        }
        events.push_back(event);
    }
}

/// Logs every event at `info`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn publish(&self, event: AuditEvent) {
        let data = event
            .data
            .iter()
            .filter(|(k, _)| k.as_str() != "application")
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(", ");
        info!(
            principal = event.principal,
            event_type = %event.event_type,
            application = event.application(),
            data = %data,
            "Audit event"
        );
    }
}

/// Fans each event out to several sinks.
#[derive(Default, Clone)]
pub struct CompositeSink {
    sinks: Vec<Arc<dyn EventSink>>,
}

impl CompositeSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sinks.push(sink);
        self
    }
}

impl fmt::Debug for CompositeSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompositeSink")
            .field("sinks", &self.sinks.len())
            .finish()
    }
}

impl EventSink for CompositeSink {
    fn publish(&self, event: AuditEvent) {
        for sink in &self.sinks {
            sink.publish(event.clone());
        }
    }
}
