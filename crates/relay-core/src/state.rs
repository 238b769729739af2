//! Per-chat user state and the store that persists it.

use std::{fmt, str::FromStr, sync::Arc};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::{
    domain::ChatId,
    errors::Error,
    events::{EventSink, RelayEvent},
    store::{CasOutcome, KvEntry, KvStore},
    Result,
};

/// Attempts per read-modify-write before giving up on a contended key.
const MAX_WRITE_ATTEMPTS: u32 = 5;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tone {
    #[default]
    Friendly,
    Formal,
    Technical,
}

impl Tone {
    pub const ALL: [Tone; 3] = [Tone::Friendly, Tone::Formal, Tone::Technical];

    pub fn as_str(self) -> &'static str {
        match self {
            Tone::Friendly => "friendly",
            Tone::Formal => "formal",
            Tone::Technical => "technical",
        }
    }
}

impl fmt::Display for Tone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Tone {
    type Err = ();

    /// Case-sensitive: `Formal` is not a tone.
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Tone::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or(())
    }
}

/// The unified per-chat record stored under `user:<chatId>`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserState {
    #[serde(default)]
    pub tone: Tone,
    #[serde(default)]
    pub messages_today: u32,
    #[serde(default)]
    pub tokens_today: u64,
    pub last_reset_date: NaiveDate,
}

impl UserState {
    pub fn new(today: NaiveDate) -> Self {
        Self {
            tone: Tone::default(),
            messages_today: 0,
            tokens_today: 0,
            last_reset_date: today,
        }
    }

    /// Reset the daily counters if the record belongs to an earlier (or any
    /// other) day. Tone is never touched. Returns whether a reset happened.
    pub fn roll_over(&mut self, today: NaiveDate) -> bool {
        if self.last_reset_date == today {
            return false;
        }
        self.messages_today = 0;
        self.tokens_today = 0;
        self.last_reset_date = today;
        true
    }

    pub fn record_usage(&mut self, tokens: u64) {
        self.messages_today = self.messages_today.saturating_add(1);
        self.tokens_today = self.tokens_today.saturating_add(tokens);
    }
}

/// A state read from the store, already rolled over to `today`.
#[derive(Clone, Debug)]
pub struct Snapshot {
    pub state: UserState,
    pub revision: u64,
    /// The record did not exist and was just persisted with defaults.
    pub created: bool,
    /// The stored date differed from today; counters were reset in memory.
    pub rolled_over: bool,
}

pub fn user_key(chat_id: ChatId) -> String {
    format!("user:{}", chat_id.0)
}

pub struct UserStore {
    kv: Arc<dyn KvStore>,
    events: Arc<dyn EventSink>,
}

impl UserStore {
    pub fn new(kv: Arc<dyn KvStore>, events: Arc<dyn EventSink>) -> Self {
        Self { kv, events }
    }

    /// Read the chat's state, persisting the default record on first contact.
    pub async fn load_or_create(&self, chat_id: ChatId, today: NaiveDate) -> Result<Snapshot> {
        let key = user_key(chat_id);

        for attempt in 1..=MAX_WRITE_ATTEMPTS {
            if let Some(entry) = self.kv.get(&key).await? {
                let mut state = self.decode(chat_id, &entry, today);
                let previous = state.last_reset_date;
                let rolled_over = state.roll_over(today);
                if rolled_over {
                    self.events
                        .emit(RelayEvent::DayRollover { chat_id, previous });
                }
                return Ok(Snapshot {
                    state,
                    revision: entry.revision,
                    created: false,
                    rolled_over,
                });
            }

            let state = UserState::new(today);
            match self
                .kv
                .compare_and_put(&key, serde_json::to_vec(&state)?, None)
                .await?
            {
                CasOutcome::Written { revision } => {
                    self.events.emit(RelayEvent::StateCreated { chat_id });
                    return Ok(Snapshot {
                        state,
                        revision,
                        created: true,
                        rolled_over: false,
                    });
                }
                // Another request created it first; read theirs.
                CasOutcome::Conflict => {
                    self.events
                        .emit(RelayEvent::WriteConflict { chat_id, attempt });
                }
            }
        }

        Err(contended(chat_id))
    }

    pub async fn set_tone(&self, chat_id: ChatId, today: NaiveDate, tone: Tone) -> Result<UserState> {
        self.update(chat_id, today, |s| s.tone = tone).await
    }

    /// Count one completion call plus the tokens it reported.
    pub async fn record_usage(
        &self,
        chat_id: ChatId,
        today: NaiveDate,
        tokens: u64,
    ) -> Result<UserState> {
        let state = self
            .update(chat_id, today, |s| s.record_usage(tokens))
            .await?;
        self.events.emit(RelayEvent::UsageRecorded {
            chat_id,
            messages_today: state.messages_today,
            tokens_today: state.tokens_today,
        });
        Ok(state)
    }

    /// Read-modify-write with compare-and-put. Rollover and `apply` are
    /// re-run against the fresh record after every conflict.
    async fn update(
        &self,
        chat_id: ChatId,
        today: NaiveDate,
        apply: impl Fn(&mut UserState),
    ) -> Result<UserState> {
        let key = user_key(chat_id);

        for attempt in 1..=MAX_WRITE_ATTEMPTS {
            let (mut state, expected) = match self.kv.get(&key).await? {
                Some(entry) => (self.decode(chat_id, &entry, today), Some(entry.revision)),
                None => (UserState::new(today), None),
            };

            state.roll_over(today);
            apply(&mut state);

            match self
                .kv
                .compare_and_put(&key, serde_json::to_vec(&state)?, expected)
                .await?
            {
                CasOutcome::Written { .. } => return Ok(state),
                CasOutcome::Conflict => {
                    self.events
                        .emit(RelayEvent::WriteConflict { chat_id, attempt });
                }
            }
        }

        Err(contended(chat_id))
    }

    /// An unreadable record is treated as a fresh default one. The caller
    /// keeps the stored revision so the next write replaces it.
    fn decode(&self, chat_id: ChatId, entry: &KvEntry, today: NaiveDate) -> UserState {
        serde_json::from_slice(&entry.value).unwrap_or_else(|e| {
            self.events.emit(RelayEvent::StoreFailed {
                chat_id,
                error: format!("unreadable record replaced with defaults: {e}"),
            });
            UserState::new(today)
        })
    }
}

fn contended(chat_id: ChatId) -> Error {
    Error::Store(format!(
        "user:{} still contended after {MAX_WRITE_ATTEMPTS} attempts",
        chat_id.0
    ))
}
