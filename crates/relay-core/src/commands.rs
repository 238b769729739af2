//! Slash-command parsing and the static texts the bot replies with.

use crate::{quota::QuotaPolicy, state::Tone, state::UserState};

pub const WELCOME_TEXT: &str = "Hi! Send me any message and I'll pass it to the model and relay the answer.\n\
Type /help to see what else I can do.";

pub const HELP_TEXT: &str = "Available commands:\n\
/start - welcome message\n\
/help - this list\n\
/settings - show your tone and today's usage\n\
/settings_tone <formal|friendly|technical> - change the reply tone";

pub const TONE_USAGE_TEXT: &str = "Usage: /settings_tone <formal|friendly|technical>";

pub const QUOTA_EXCEEDED_TEXT: &str = "Daily quota exceeded. Please try again tomorrow.";

pub const TONE_SAVE_FAILED_TEXT: &str = "Sorry, the tone could not be saved. Please try again later.";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    Start,
    Help,
    Settings,
    /// `None` when the argument is missing or not a known tone.
    SettingsTone(Option<Tone>),
}

impl Command {
    /// Exact, case-sensitive match on the first whitespace-delimited token.
    /// Anything else (including `/start@botname`) is not a command.
    pub fn parse(text: &str) -> Option<Command> {
        let mut tokens = text.split_whitespace();
        let cmd = match tokens.next()? {
            "/start" => Command::Start,
            "/help" => Command::Help,
            "/settings" => Command::Settings,
            "/settings_tone" => {
                Command::SettingsTone(tokens.next().and_then(|t| t.parse::<Tone>().ok()))
            }
            _ => return None,
        };
        Some(cmd)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Command::Start => "/start",
            Command::Help => "/help",
            Command::Settings => "/settings",
            Command::SettingsTone(_) => "/settings_tone",
        }
    }
}

pub fn settings_text(state: &UserState, policy: &QuotaPolicy) -> String {
    format!(
        "Current settings:\nTone: {}\nMessages today: {}/{}",
        state.tone, state.messages_today, policy.message_cap
    )
}

pub fn tone_changed_text(tone: Tone) -> &'static str {
    match tone {
        Tone::Friendly => "Tone set to friendly. I'll keep things relaxed and conversational.",
        Tone::Formal => "Tone set to formal. Replies will be precise and professional.",
        Tone::Technical => "Tone set to technical. Expect detailed, technically focused answers.",
    }
}
