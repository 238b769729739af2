//! The per-update control flow: load state, dispatch commands, gate on quota,
//! call the completion backend, record usage, reply.

use std::sync::Arc;

use chrono::NaiveDate;

use crate::{
    clock::Clock,
    commands::{self, Command},
    completion::{build_prompt, CompletionPort, CompletionRequest},
    domain::{ChatId, InboundUpdate},
    events::{EventSink, RelayEvent},
    messaging::ReplyPort,
    quota::{QuotaDecision, QuotaPolicy},
    state::{Snapshot, UserStore},
};

pub struct Relay {
    users: UserStore,
    completions: Arc<dyn CompletionPort>,
    replies: Arc<dyn ReplyPort>,
    clock: Arc<dyn Clock>,
    events: Arc<dyn EventSink>,
    policy: QuotaPolicy,
}

impl Relay {
    pub fn new(
        users: UserStore,
        completions: Arc<dyn CompletionPort>,
        replies: Arc<dyn ReplyPort>,
        clock: Arc<dyn Clock>,
        events: Arc<dyn EventSink>,
        policy: QuotaPolicy,
    ) -> Self {
        Self {
            users,
            completions,
            replies,
            clock,
            events,
            policy,
        }
    }

    pub fn events(&self) -> &Arc<dyn EventSink> {
        &self.events
    }

    /// Handle one update end to end.
    ///
    /// Never fails: the webhook must acknowledge every update, so errors are
    /// reported as events only.
    pub async fn handle_update(&self, update: InboundUpdate) {
        let InboundUpdate { chat_id, text } = update;
        let today = self.clock.today();

        let snapshot = match self.users.load_or_create(chat_id, today).await {
            Ok(s) => s,
            Err(e) => {
                self.events.emit(RelayEvent::StoreFailed {
                    chat_id,
                    error: e.to_string(),
                });
                return;
            }
        };

        if let Some(cmd) = Command::parse(&text) {
            self.handle_command(chat_id, today, cmd, &snapshot).await;
            return;
        }

        if self.policy.check(&snapshot.state) == QuotaDecision::Exceeded {
            self.events.emit(RelayEvent::QuotaExceeded {
                chat_id,
                messages_today: snapshot.state.messages_today,
                tokens_today: snapshot.state.tokens_today,
            });
            self.reply(chat_id, commands::QUOTA_EXCEEDED_TEXT).await;
            return;
        }

        let (reply, tokens) = self.complete(chat_id, &snapshot, &text).await;

        if let Err(e) = self.users.record_usage(chat_id, today, tokens).await {
            self.events.emit(RelayEvent::StoreFailed {
                chat_id,
                error: e.to_string(),
            });
        }

        self.reply(chat_id, &reply).await;
    }

    async fn handle_command(
        &self,
        chat_id: ChatId,
        today: NaiveDate,
        cmd: Command,
        snapshot: &Snapshot,
    ) {
        self.events.emit(RelayEvent::CommandHandled {
            chat_id,
            command: cmd.name(),
        });

        let text = match cmd {
            Command::Start => commands::WELCOME_TEXT.to_string(),
            Command::Help => commands::HELP_TEXT.to_string(),
            Command::Settings => commands::settings_text(&snapshot.state, &self.policy),
            Command::SettingsTone(None) => commands::TONE_USAGE_TEXT.to_string(),
            Command::SettingsTone(Some(tone)) => {
                match self.users.set_tone(chat_id, today, tone).await {
                    Ok(_) => commands::tone_changed_text(tone).to_string(),
                    Err(e) => {
                        self.events.emit(RelayEvent::StoreFailed {
                            chat_id,
                            error: e.to_string(),
                        });
                        commands::TONE_SAVE_FAILED_TEXT.to_string()
                    }
                }
            }
        };

        self.reply(chat_id, &text).await;
    }

    /// Returns the reply text and the tokens to account. Any failure degrades
    /// to echoing the input with zero tokens.
    async fn complete(&self, chat_id: ChatId, snapshot: &Snapshot, text: &str) -> (String, u64) {
        let req = CompletionRequest {
            prompt: build_prompt(snapshot.state.tone, text),
        };

        match self.completions.complete(req).await {
            Ok(completion) => {
                let tokens = completion.usage.total();
                self.events
                    .emit(RelayEvent::CompletionSucceeded { chat_id, tokens });
                (completion.text.unwrap_or_else(|| text.to_string()), tokens)
            }
            Err(e) => {
                self.events.emit(RelayEvent::CompletionFailed {
                    chat_id,
                    error: e.to_string(),
                });
                (text.to_string(), 0)
            }
        }
    }

    async fn reply(&self, chat_id: ChatId, text: &str) {
        match self.replies.send_text(chat_id, text).await {
            Ok(response) => self
                .events
                .emit(RelayEvent::ReplySent { chat_id, response }),
            Err(e) => self.events.emit(RelayEvent::ReplyFailed {
                chat_id,
                error: e.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::{
        clock::FixedClock,
        completion::{Completion, TokenUsage},
        errors::Error,
        events::MemoryEvents,
        state::{Tone, UserState},
        store::{CasOutcome, KvEntry, KvStore, MemoryKv},
        Result,
    };

    #[derive(Default)]
    struct FakeCompletions {
        prompts: Mutex<Vec<String>>,
        fail: bool,
        text: Option<String>,
        usage: TokenUsage,
    }

    impl FakeCompletions {
        fn answering(text: &str, input: u64, output: u64) -> Self {
            Self {
                text: Some(text.to_string()),
                usage: TokenUsage {
                    input_tokens: input,
                    output_tokens: output,
                },
                ..Default::default()
            }
        }

        fn failing() -> Self {
            Self {
                fail: true,
                ..Default::default()
            }
        }

        fn prompts(&self) -> Vec<String> {
            self.prompts.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl CompletionPort for FakeCompletions {
        async fn complete(&self, req: CompletionRequest) -> Result<Completion> {
            self.prompts.lock().unwrap().push(req.prompt);
            if self.fail {
                return Err(Error::External("connection refused".to_string()));
            }
            Ok(Completion {
                text: self.text.clone(),
                usage: self.usage,
            })
        }
    }

    #[derive(Default)]
    struct FakeReplies {
        sent: Mutex<Vec<(ChatId, String)>>,
        fail: bool,
    }

    impl FakeReplies {
        fn sent(&self) -> Vec<(ChatId, String)> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ReplyPort for FakeReplies {
        async fn send_text(&self, chat_id: ChatId, text: &str) -> Result<String> {
            self.sent.lock().unwrap().push((chat_id, text.to_string()));
            if self.fail {
                return Err(Error::External("telegram down".to_string()));
            }
            Ok(r#"{"ok":true}"#.to_string())
        }
    }

    /// Store that refuses everything.
    struct BrokenKv;

    #[async_trait]
    impl KvStore for BrokenKv {
        async fn get(&self, _key: &str) -> Result<Option<KvEntry>> {
            Err(Error::Store("disk on fire".to_string()))
        }

        async fn compare_and_put(
            &self,
            _key: &str,
            _value: Vec<u8>,
            _expected: Option<u64>,
        ) -> Result<CasOutcome> {
            Err(Error::Store("disk on fire".to_string()))
        }
    }

    /// Reads succeed, every write fails.
    struct ReadOnlyKv {
        inner: MemoryKv,
    }

    #[async_trait]
    impl KvStore for ReadOnlyKv {
        async fn get(&self, key: &str) -> Result<Option<KvEntry>> {
            self.inner.get(key).await
        }

        async fn compare_and_put(
            &self,
            _key: &str,
            _value: Vec<u8>,
            _expected: Option<u64>,
        ) -> Result<CasOutcome> {
            Err(Error::Store("read-only".to_string()))
        }
    }

    struct Harness {
        relay: Relay,
        kv: Arc<MemoryKv>,
        completions: Arc<FakeCompletions>,
        replies: Arc<FakeReplies>,
        clock: FixedClock,
        events: Arc<MemoryEvents>,
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, d).unwrap()
    }

    fn harness_with(completions: FakeCompletions, replies: FakeReplies) -> Harness {
        let kv = Arc::new(MemoryKv::new());
        let events = Arc::new(MemoryEvents::new());
        let completions = Arc::new(completions);
        let replies = Arc::new(replies);
        let clock = FixedClock::new(day(10));
        let relay = Relay::new(
            UserStore::new(kv.clone(), events.clone()),
            completions.clone(),
            replies.clone(),
            Arc::new(clock.clone()),
            events.clone(),
            QuotaPolicy::default(),
        );
        Harness {
            relay,
            kv,
            completions,
            replies,
            clock,
            events,
        }
    }

    fn harness() -> Harness {
        harness_with(
            FakeCompletions::answering("model says hi", 12, 30),
            FakeReplies::default(),
        )
    }

    fn update(chat: i64, text: &str) -> InboundUpdate {
        InboundUpdate {
            chat_id: ChatId(chat),
            text: text.to_string(),
        }
    }

    async fn stored(kv: &MemoryKv, chat: i64) -> Option<UserState> {
        kv.get(&format!("user:{chat}"))
            .await
            .unwrap()
            .map(|e| serde_json::from_slice(&e.value).unwrap())
    }

    async fn seed(kv: &MemoryKv, chat: i64, state: &UserState) {
        kv.compare_and_put(
            &format!("user:{chat}"),
            serde_json::to_vec(state).unwrap(),
            None,
        )
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn text_is_relayed_and_usage_recorded() {
        let h = harness();
        h.relay.handle_update(update(42, "hello")).await;

        assert_eq!(h.completions.prompts(), vec!["hello".to_string()]);
        assert_eq!(
            h.replies.sent(),
            vec![(ChatId(42), "model says hi".to_string())]
        );

        let s = stored(&h.kv, 42).await.unwrap();
        assert_eq!(s.messages_today, 1);
        assert_eq!(s.tokens_today, 42);
        assert!(h.events.contains(|e| matches!(e, RelayEvent::ReplySent { .. })));
    }

    #[tokio::test]
    async fn default_state_is_persisted_before_reply() {
        let h = harness();
        h.relay.handle_update(update(5, "/start")).await;

        assert_eq!(stored(&h.kv, 5).await, Some(UserState::new(day(10))));

        let events = h.events.events();
        let created = events
            .iter()
            .position(|e| matches!(e, RelayEvent::StateCreated { .. }))
            .unwrap();
        let sent = events
            .iter()
            .position(|e| matches!(e, RelayEvent::ReplySent { .. }))
            .unwrap();
        assert!(created < sent);
        assert_eq!(h.replies.sent()[0].1, commands::WELCOME_TEXT);
    }

    #[tokio::test]
    async fn settings_tone_persists_and_skips_completion() {
        let h = harness();
        h.relay
            .handle_update(update(42, "/settings_tone formal"))
            .await;

        assert_eq!(stored(&h.kv, 42).await.unwrap().tone, Tone::Formal);
        assert_eq!(
            h.replies.sent()[0].1,
            commands::tone_changed_text(Tone::Formal)
        );
        assert!(h.completions.prompts().is_empty());
    }

    #[tokio::test]
    async fn invalid_tone_leaves_state_alone() {
        let h = harness();
        let mut s = UserState::new(day(10));
        s.tone = Tone::Technical;
        seed(&h.kv, 42, &s).await;

        h.relay
            .handle_update(update(42, "/settings_tone shouty"))
            .await;
        h.relay.handle_update(update(42, "/settings_tone")).await;

        assert_eq!(stored(&h.kv, 42).await.unwrap(), s);
        assert_eq!(h.kv.get("user:42").await.unwrap().unwrap().revision, 1);
        for (_, text) in h.replies.sent() {
            assert_eq!(text, commands::TONE_USAGE_TEXT);
        }
    }

    #[tokio::test]
    async fn tone_prefixes_prompt() {
        let h = harness();
        h.relay
            .handle_update(update(1, "/settings_tone technical"))
            .await;
        h.relay.handle_update(update(1, "explain tcp")).await;

        let prompts = h.completions.prompts();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].ends_with("explain tcp"));
        assert_ne!(prompts[0], "explain tcp");
    }

    #[tokio::test]
    async fn quota_exceeded_blocks_without_mutation() {
        let h = harness();
        let mut s = UserState::new(day(10));
        s.messages_today = 20;
        seed(&h.kv, 42, &s).await;

        h.relay.handle_update(update(42, "hello")).await;

        assert!(h.completions.prompts().is_empty());
        assert_eq!(
            h.replies.sent(),
            vec![(ChatId(42), commands::QUOTA_EXCEEDED_TEXT.to_string())]
        );
        assert_eq!(stored(&h.kv, 42).await.unwrap(), s);
        assert_eq!(h.kv.get("user:42").await.unwrap().unwrap().revision, 1);
    }

    #[tokio::test]
    async fn token_cap_also_blocks() {
        let h = harness();
        let mut s = UserState::new(day(10));
        s.tokens_today = 20_000;
        seed(&h.kv, 3, &s).await;

        h.relay.handle_update(update(3, "hello")).await;
        assert!(h.completions.prompts().is_empty());
        assert!(h.events.contains(|e| matches!(
            e,
            RelayEvent::QuotaExceeded {
                tokens_today: 20_000,
                ..
            }
        )));
    }

    #[tokio::test]
    async fn yesterdays_cap_does_not_block_today() {
        let h = harness();
        let mut s = UserState::new(day(10));
        s.messages_today = 20;
        s.tokens_today = 25_000;
        s.tone = Tone::Formal;
        seed(&h.kv, 42, &s).await;

        h.clock.advance_days(1);
        h.relay.handle_update(update(42, "hello")).await;

        assert_eq!(h.completions.prompts().len(), 1);
        let after = stored(&h.kv, 42).await.unwrap();
        assert_eq!(after.messages_today, 1);
        assert_eq!(after.tokens_today, 42);
        assert_eq!(after.last_reset_date, day(11));
        assert_eq!(after.tone, Tone::Formal);
        assert!(h.events.contains(|e| matches!(e, RelayEvent::DayRollover { .. })));
    }

    #[tokio::test]
    async fn settings_reports_rolled_over_count() {
        let h = harness();
        let mut s = UserState::new(day(10));
        s.messages_today = 7;
        seed(&h.kv, 8, &s).await;

        h.relay.handle_update(update(8, "/settings")).await;
        assert!(h.replies.sent()[0].1.contains("Messages today: 7/20"));

        h.clock.advance_days(1);
        h.relay.handle_update(update(8, "/settings")).await;
        assert!(h.replies.sent()[1].1.contains("Messages today: 0/20"));
    }

    #[tokio::test]
    async fn completion_failure_echoes_and_counts_message_only() {
        let h = harness_with(FakeCompletions::failing(), FakeReplies::default());
        h.relay.handle_update(update(42, "ping")).await;

        assert_eq!(h.replies.sent(), vec![(ChatId(42), "ping".to_string())]);
        let s = stored(&h.kv, 42).await.unwrap();
        assert_eq!((s.messages_today, s.tokens_today), (1, 0));
        assert!(h.events.contains(|e| matches!(e, RelayEvent::CompletionFailed { .. })));
    }

    #[tokio::test]
    async fn empty_completion_falls_back_to_echo_but_counts_tokens() {
        let completions = FakeCompletions {
            usage: TokenUsage {
                input_tokens: 4,
                output_tokens: 0,
            },
            ..Default::default()
        };
        let h = harness_with(completions, FakeReplies::default());
        h.relay.handle_update(update(2, "anyone?")).await;

        assert_eq!(h.replies.sent()[0].1, "anyone?");
        assert_eq!(stored(&h.kv, 2).await.unwrap().tokens_today, 4);
    }

    #[tokio::test]
    async fn reply_failure_is_only_logged() {
        let replies = FakeReplies {
            fail: true,
            ..Default::default()
        };
        let h = harness_with(FakeCompletions::answering("x", 1, 1), replies);
        h.relay.handle_update(update(42, "hello")).await;

        assert!(h.events.contains(|e| matches!(e, RelayEvent::ReplyFailed { .. })));
        assert_eq!(stored(&h.kv, 42).await.unwrap().messages_today, 1);
    }

    #[tokio::test]
    async fn store_failure_stops_before_any_outbound_call() {
        let completions = Arc::new(FakeCompletions::answering("x", 1, 1));
        let replies = Arc::new(FakeReplies::default());
        let events = Arc::new(MemoryEvents::new());
        let relay = Relay::new(
            UserStore::new(Arc::new(BrokenKv), events.clone()),
            completions.clone(),
            replies.clone(),
            Arc::new(FixedClock::new(day(1))),
            events.clone(),
            QuotaPolicy::default(),
        );

        relay.handle_update(update(1, "hello")).await;

        assert!(completions.prompts().is_empty());
        assert!(replies.sent().is_empty());
        assert!(events.contains(|e| matches!(e, RelayEvent::StoreFailed { .. })));
    }

    #[tokio::test]
    async fn tone_save_failure_still_answers() {
        let kv = ReadOnlyKv {
            inner: MemoryKv::new(),
        };
        seed(&kv.inner, 4, &UserState::new(day(1))).await;
        let replies = Arc::new(FakeReplies::default());
        let events = Arc::new(MemoryEvents::new());
        let relay = Relay::new(
            UserStore::new(Arc::new(kv), events.clone()),
            Arc::new(FakeCompletions::answering("x", 1, 1)),
            replies.clone(),
            Arc::new(FixedClock::new(day(1))),
            events.clone(),
            QuotaPolicy::default(),
        );

        relay.handle_update(update(4, "/settings_tone formal")).await;

        assert_eq!(
            replies.sent(),
            vec![(ChatId(4), commands::TONE_SAVE_FAILED_TEXT.to_string())]
        );
        assert!(events.contains(|e| matches!(e, RelayEvent::StoreFailed { .. })));
    }

    #[tokio::test]
    async fn unreadable_record_does_not_silence_the_chat() {
        let h = harness();
        h.kv.compare_and_put(
            "user:8",
            br#"{"tone":"friendly","messages_today":1}"#.to_vec(),
            None,
        )
        .await
        .unwrap();

        h.relay.handle_update(update(8, "hello")).await;
        h.relay.handle_update(update(8, "/start")).await;

        assert_eq!(
            h.replies.sent(),
            vec![
                (ChatId(8), "model says hi".to_string()),
                (ChatId(8), commands::WELCOME_TEXT.to_string()),
            ]
        );
        let s = stored(&h.kv, 8).await.unwrap();
        assert_eq!(s.messages_today, 1);
        assert_eq!(s.last_reset_date, day(10));
        assert!(h.events.contains(|e| matches!(e, RelayEvent::StoreFailed { chat_id: ChatId(8), .. })));
    }
}
