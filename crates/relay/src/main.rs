use std::sync::Arc;

use anyhow::Context;
use tracing::info;

use relay_core::{
    clock::SystemClock,
    config::Config,
    events::{EventSink, TracingEvents},
    relay::Relay,
    state::UserStore,
    store::{KvStore, MemoryKv, SqliteKv},
};
use relay_openai::{OpenAiCompletions, OpenAiSettings};
use relay_telegram::{
    router::{router, WebhookState},
    TelegramSender,
};

mod signal;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    relay_core::logging::init("relay")?;

    let cfg = Config::load()?;

    let kv: Arc<dyn KvStore> = match &cfg.state_db_path {
        Some(path) => {
            info!(path = %path.display(), "using sqlite state store");
            Arc::new(SqliteKv::open(path).context("open state database")?)
        }
        None => {
            info!("using in-memory state store; usage resets on restart");
            Arc::new(MemoryKv::new())
        }
    };

    let events: Arc<dyn EventSink> = Arc::new(TracingEvents);

    let completions = OpenAiCompletions::new(OpenAiSettings {
        api_key: cfg.openai_api_key.clone(),
        base_url: cfg.openai_base_url.clone(),
        model: cfg.openai_model.clone(),
        max_output_tokens: cfg.max_output_tokens,
        timeout: cfg.http_timeout,
    })?;
    let replies = TelegramSender::new(
        cfg.telegram_api_base.clone(),
        cfg.bot_token.clone(),
        cfg.http_timeout,
    )?;

    let relay = Relay::new(
        UserStore::new(kv, events.clone()),
        Arc::new(completions),
        Arc::new(replies),
        Arc::new(SystemClock),
        events,
        cfg.quota,
    );

    let app = router(WebhookState {
        relay: Arc::new(relay),
        webhook_secret: Arc::from(cfg.webhook_secret.as_str()),
    });

    let listener = tokio::net::TcpListener::bind(cfg.listen_addr)
        .await
        .with_context(|| format!("bind {}", cfg.listen_addr))?;
    info!(
        addr = %cfg.listen_addr,
        model = %cfg.openai_model,
        message_cap = cfg.quota.message_cap,
        token_cap = cfg.quota.token_cap,
        "relay webhook server listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(signal::shutdown_signal())
        .await?;

    info!("relay stopped");
    Ok(())
}
