use crate::state::UserState;

/// Daily caps per chat. Whichever is hit first closes the gate until rollover.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QuotaPolicy {
    pub message_cap: u32,
    pub token_cap: u64,
}

impl Default for QuotaPolicy {
    fn default() -> Self {
        Self {
            message_cap: 20,
            token_cap: 20_000,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QuotaDecision {
    Allowed,
    Exceeded,
}

impl QuotaPolicy {
    /// `state` must already be rolled over to today.
    pub fn check(&self, state: &UserState) -> QuotaDecision {
        if state.messages_today >= self.message_cap || state.tokens_today >= self.token_cap {
            return QuotaDecision::Exceeded;
        }
        QuotaDecision::Allowed
    }
}
