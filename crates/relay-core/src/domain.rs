/// Telegram chat id (numeric). Partition key for all persisted state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ChatId(pub i64);

impl std::fmt::Display for ChatId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The two fields of a Telegram update the relay consumes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InboundUpdate {
    pub chat_id: ChatId,
    pub text: String,
}
