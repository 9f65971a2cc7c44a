use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use url::Url;

/// Runtime configuration.
///
/// Layering: built-in defaults, then `config.toml` when present, then
/// `NEXUS_*` environment variables (`__` separates nested keys).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub listen_addr: String,
    pub database_url: String,
    pub loglevel: String,
    pub proxy: Option<Url>,

    /// Master secret for the private session cookie. Empty means a random
    /// key per process.
    pub session_secret: String,
    pub session_ttl_days: i64,
    pub insecure_cookie: bool,

    /// Enables `/api/dev/*` routes.
    pub dev_bypass: bool,
    pub dev_key: Option<String>,

    pub line: LineConfig,
    pub llm: LlmConfig,
    pub limits: LimitsConfig,
    pub generation: GenerationConfig,
    pub notation: NotationConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineConfig {
    pub channel_id: String,
    pub verify_url: Url,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    pub gemini_api_key: Option<String>,
    pub gemini_model: String,
    pub gemini_base_url: Url,
    pub openai_api_key: Option<String>,
    pub openai_model: String,
    pub openai_base_url: Url,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LimitsConfig {
    pub gen_max_per_day: i64,
    pub navi_max_per_day: i64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct GenerationConfig {
    pub concurrency: usize,
    pub requests_per_minute: u32,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct NotationConfig {
    pub keep_parentheses: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8000".to_string(),
            database_url: "sqlite://study-nexus.sqlite".to_string(),
            loglevel: "info".to_string(),
            proxy: None,
            session_secret: String::new(),
            session_ttl_days: 30,
            insecure_cookie: false,
            dev_bypass: false,
            dev_key: None,
            line: LineConfig {
                channel_id: String::new(),
                verify_url: parse_static_url(LINE_VERIFY_URL),
            },
            llm: LlmConfig {
                gemini_api_key: None,
                gemini_model: "gemini-2.5-pro".to_string(),
                gemini_base_url: parse_static_url(GEMINI_BASE_URL),
                openai_api_key: None,
                openai_model: "gpt-4o".to_string(),
                openai_base_url: parse_static_url(OPENAI_BASE_URL),
            },
            limits: LimitsConfig {
                gen_max_per_day: 10,
                navi_max_per_day: 3,
            },
            generation: GenerationConfig {
                concurrency: 2,
                requests_per_minute: 10,
            },
            notation: NotationConfig::default(),
        }
    }
}

impl Config {
    /// Resolve the configuration from defaults, `config.toml` and the environment.
    pub fn load() -> Result<Self, figment::Error> {
        Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file("config.toml"))
            .merge(Env::prefixed("NEXUS_").split("__"))
            .extract()
    }
}

pub const LINE_VERIFY_URL: &str = "https://api.line.me/oauth2/v2.1/verify";
pub const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";
pub const OPENAI_BASE_URL: &str = "https://api.openai.com";

fn parse_static_url(raw: &str) -> Url {
    Url::parse(raw).expect("built-in URL constant must parse")
}

pub static CONFIG: LazyLock<Config> = LazyLock::new(|| match Config::load() {
    Ok(cfg) => cfg,
    Err(e) => panic!("invalid configuration: {e}"),
});
