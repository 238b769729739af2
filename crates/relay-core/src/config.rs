use std::{env, fs, net::SocketAddr, path::Path, path::PathBuf, time::Duration};

use crate::{errors::Error, quota::QuotaPolicy, Result};

/// Typed configuration for the relay, read from environment variables.
#[derive(Clone, Debug)]
pub struct Config {
    // Secrets
    pub bot_token: String,
    pub webhook_secret: String,
    pub openai_api_key: String,

    // HTTP server
    pub listen_addr: SocketAddr,

    // Completion API
    pub openai_base_url: String,
    pub openai_model: String,
    pub max_output_tokens: u32,

    // Telegram
    pub telegram_api_base: String,

    // Quota
    pub quota: QuotaPolicy,

    // Outbound HTTP
    pub http_timeout: Duration,

    // State store (memory when unset)
    pub state_db_path: Option<PathBuf>,
}

impl Config {
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let required = |key: &str| {
            get(key)
                .and_then(non_empty)
                .ok_or_else(|| Error::Config(format!("{key} environment variable is required")))
        };

        let bot_token = required("BOT_TOKEN")?;
        let webhook_secret = required("WEBHOOK_SECRET")?;
        let openai_api_key = required("OPENAI_API_KEY")?;

        let listen_addr = match get("LISTEN_ADDR").and_then(non_empty) {
            Some(raw) => raw
                .trim()
                .parse::<SocketAddr>()
                .map_err(|e| Error::Config(format!("LISTEN_ADDR {raw:?} is invalid: {e}")))?,
            None => SocketAddr::from(([0, 0, 0, 0], 8080)),
        };

        let openai_base_url = get("OPENAI_BASE_URL")
            .and_then(non_empty)
            .map(|s| s.trim_end_matches('/').to_string())
            .unwrap_or_else(|| "https://api.openai.com".to_string());
        let openai_model = get("OPENAI_MODEL")
            .and_then(non_empty)
            .unwrap_or_else(|| "gpt-5-mini".to_string());
        let max_output_tokens = parse_or(get("MAX_OUTPUT_TOKENS"), 800u32);

        let telegram_api_base = get("TELEGRAM_API_BASE")
            .and_then(non_empty)
            .map(|s| s.trim_end_matches('/').to_string())
            .unwrap_or_else(|| "https://api.telegram.org".to_string());

        let defaults = QuotaPolicy::default();
        let quota = QuotaPolicy {
            message_cap: parse_or(get("DAILY_MESSAGE_CAP"), defaults.message_cap),
            token_cap: parse_or(get("DAILY_TOKEN_CAP"), defaults.token_cap),
        };

        let http_timeout = Duration::from_secs(parse_or(get("HTTP_TIMEOUT_SECS"), 60u64));

        let state_db_path = get("STATE_DB_PATH").and_then(non_empty).map(PathBuf::from);

        Ok(Self {
            bot_token,
            webhook_secret,
            openai_api_key,
            listen_addr,
            openai_base_url,
            openai_model,
            max_output_tokens,
            telegram_api_base,
            quota,
            http_timeout,
            state_db_path,
        })
    }
}

fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };

    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((k, v)) = line.split_once('=') else {
            continue;
        };

        let key = k.trim();
        if key.is_empty() {
            continue;
        }
        if env::var_os(key).is_some() {
            continue; // do not override existing env
        }

        env::set_var(key, strip_quotes(v.trim()));
    }
}

fn strip_quotes(val: &str) -> &str {
    if val.len() >= 2
        && ((val.starts_with('"') && val.ends_with('"'))
            || (val.starts_with('\'') && val.ends_with('\'')))
    {
        return &val[1..val.len() - 1];
    }
    val
}

fn parse_or<T: std::str::FromStr>(v: Option<String>, default: T) -> T {
    v.and_then(|s| s.trim().parse::<T>().ok()).unwrap_or(default)
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}
