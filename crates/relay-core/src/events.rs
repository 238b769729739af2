//! Structured relay events.
//!
//! Components never log directly; they emit [`RelayEvent`]s into an injected
//! [`EventSink`]. Production wires [`TracingEvents`], tests wire
//! [`MemoryEvents`] and assert on what was emitted.

use std::sync::Mutex;

use chrono::NaiveDate;

use crate::domain::ChatId;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RelayEvent {
    /// Webhook secret header missing or wrong.
    Unauthorized,
    /// Update lacked text or chat id (or was not JSON); acknowledged anyway.
    UpdateIgnored { reason: String },
    StateCreated { chat_id: ChatId },
    DayRollover { chat_id: ChatId, previous: NaiveDate },
    CommandHandled { chat_id: ChatId, command: &'static str },
    QuotaExceeded {
        chat_id: ChatId,
        messages_today: u32,
        tokens_today: u64,
    },
    CompletionSucceeded { chat_id: ChatId, tokens: u64 },
    CompletionFailed { chat_id: ChatId, error: String },
    UsageRecorded {
        chat_id: ChatId,
        messages_today: u32,
        tokens_today: u64,
    },
    WriteConflict { chat_id: ChatId, attempt: u32 },
    StoreFailed { chat_id: ChatId, error: String },
    ReplySent { chat_id: ChatId, response: String },
    ReplyFailed { chat_id: ChatId, error: String },
}

pub trait EventSink: Send + Sync {
    fn emit(&self, event: RelayEvent);
}

/// Sink that turns events into `tracing` records.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingEvents;

impl EventSink for TracingEvents {
    fn emit(&self, event: RelayEvent) {
        use tracing::{debug, info, warn};

        match event {
            RelayEvent::Unauthorized => warn!("webhook secret mismatch"),
            RelayEvent::UpdateIgnored { reason } => info!(%reason, "no message to relay"),
            RelayEvent::StateCreated { chat_id } => info!(%chat_id, "created user state"),
            RelayEvent::DayRollover { chat_id, previous } => {
                debug!(%chat_id, %previous, "daily counters reset")
            }
            RelayEvent::CommandHandled { chat_id, command } => {
                info!(%chat_id, command, "command handled")
            }
            RelayEvent::QuotaExceeded {
                chat_id,
                messages_today,
                tokens_today,
            } => info!(%chat_id, messages_today, tokens_today, "daily quota exceeded"),
            RelayEvent::CompletionSucceeded { chat_id, tokens } => {
                debug!(%chat_id, tokens, "completion succeeded")
            }
            RelayEvent::CompletionFailed { chat_id, error } => {
                warn!(%chat_id, %error, "completion request failed, echoing input")
            }
            RelayEvent::UsageRecorded {
                chat_id,
                messages_today,
                tokens_today,
            } => debug!(%chat_id, messages_today, tokens_today, "usage recorded"),
            RelayEvent::WriteConflict { chat_id, attempt } => {
                debug!(%chat_id, attempt, "concurrent write detected, retrying")
            }
            RelayEvent::StoreFailed { chat_id, error } => {
                warn!(%chat_id, %error, "user state store failed")
            }
            RelayEvent::ReplySent { chat_id, response } => {
                info!(%chat_id, %response, "telegram response")
            }
            RelayEvent::ReplyFailed { chat_id, error } => {
                warn!(%chat_id, %error, "sendMessage failed")
            }
        }
    }
}

/// Sink that records every event in order.
#[derive(Debug, Default)]
pub struct MemoryEvents {
    events: Mutex<Vec<RelayEvent>>,
}

impl MemoryEvents {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<RelayEvent> {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn contains(&self, pred: impl Fn(&RelayEvent) -> bool) -> bool {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .any(pred)
    }
}

impl EventSink for MemoryEvents {
    fn emit(&self, event: RelayEvent) {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(event);
    }
}
