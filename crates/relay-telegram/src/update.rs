//! The slice of the Telegram `Update` schema the relay consumes.

use serde::Deserialize;

use relay_core::domain::{ChatId, InboundUpdate};

#[derive(Debug, Default, Deserialize)]
struct Update {
    #[serde(default)]
    message: Option<Message>,
}

#[derive(Debug, Deserialize)]
struct Message {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    chat: Option<Chat>,
}

#[derive(Debug, Deserialize)]
struct Chat {
    #[serde(default)]
    id: Option<i64>,
}

/// Why an update carries nothing to relay.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Ignored {
    NotJson(String),
    NoMessage,
    NoText,
    NoChatId,
}

impl std::fmt::Display for Ignored {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Ignored::NotJson(e) => write!(f, "body is not a JSON update: {e}"),
            Ignored::NoMessage => f.write_str("update has no message"),
            Ignored::NoText => f.write_str("message has no text"),
            Ignored::NoChatId => f.write_str("message has no chat id"),
        }
    }
}

/// Empty text and chat id 0 count as absent.
pub fn parse_update(body: &[u8]) -> Result<InboundUpdate, Ignored> {
    let update: Update =
        serde_json::from_slice(body).map_err(|e| Ignored::NotJson(e.to_string()))?;
    let message = update.message.ok_or(Ignored::NoMessage)?;

    let text = message
        .text
        .filter(|t| !t.is_empty())
        .ok_or(Ignored::NoText)?;
    let chat_id = message
        .chat
        .and_then(|c| c.id)
        .filter(|id| *id != 0)
        .ok_or(Ignored::NoChatId)?;

    Ok(InboundUpdate {
        chat_id: ChatId(chat_id),
        text,
    })
}
