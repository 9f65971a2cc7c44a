use axum::extract::{DefaultBodyLimit, FromRef};
use axum::routing::{get, post};
use axum::{Json, Router};
use axum_extra::extract::cookie::Key;
use serde_json::json;
use std::sync::Arc;

use crate::config::Config;
use crate::db::StudyStorage;
use crate::error::NexusError;
use crate::handlers::{account, answer_check, auth, chat, generate, goals, quiz};
use crate::llm::AiProvider;
use crate::notation::MathNormalizer;
use crate::service::generation_actor::GenerationHandle;
use crate::service::usage::DailyLimits;

/// Chat uploads carry one image; anything larger is rejected with 413.
const BODY_LIMIT_BYTES: usize = 12 * 1024 * 1024;

#[derive(Clone)]
pub struct NexusState {
    pub storage: StudyStorage,
    pub provider: Arc<dyn AiProvider>,
    pub client: reqwest::Client,
    pub jobs: GenerationHandle,
    pub config: Arc<Config>,
    key: Key,
}

impl NexusState {
    pub fn new(
        storage: StudyStorage,
        provider: Arc<dyn AiProvider>,
        client: reqwest::Client,
        jobs: GenerationHandle,
        config: Arc<Config>,
        key: Key,
    ) -> Self {
        Self {
            storage,
            provider,
            client,
            jobs,
            config,
            key,
        }
    }

    pub fn cookie_key(&self) -> Key {
        self.key.clone()
    }

    pub fn session_ttl(&self) -> time::Duration {
        time::Duration::days(self.config.session_ttl_days)
    }

    pub fn secure_cookies(&self) -> bool {
        !self.config.insecure_cookie
    }

    pub fn limits(&self) -> DailyLimits {
        DailyLimits::from(self.config.limits)
    }

    pub fn normalizer(&self) -> MathNormalizer {
        MathNormalizer::new().keep_parentheses(self.config.notation.keep_parentheses)
    }
}

impl FromRef<NexusState> for Key {
    fn from_ref(state: &NexusState) -> Self {
        state.cookie_key()
    }
}

pub fn nexus_router(state: NexusState) -> Router {
    let api = Router::new()
        .route("/auth/line", post(auth::line_login))
        .route("/auth/logout", post(auth::logout))
        .route("/dev/login", get(auth::dev_login))
        .route("/dev/logout", get(auth::dev_logout))
        .route("/me", get(account::me))
        .route("/limits", get(account::limits))
        .route("/usage/increment", post(account::increment_usage))
        .route("/chat", post(chat::chat))
        .route("/generate/start", post(generate::start))
        .route("/generate/status", get(generate::status))
        .route(
            "/answer-check",
            post(answer_check::check).get(answer_check::history),
        )
        .route("/quiz/levels", post(quiz::levels))
        .route("/quiz/start", post(quiz::start))
        .route("/quiz/submit", post(quiz::submit))
        .route("/goal-planner", post(goals::save).get(goals::current))
        .route("/diag", get(diag));

    Router::new()
        .nest("/api", api)
        .fallback(|| async { NexusError::NotFound })
        .layer(DefaultBodyLimit::max(BODY_LIMIT_BYTES))
        .with_state(state)
}

/// GET /api/diag -> liveness and the active provider.
async fn diag(state: axum::extract::State<NexusState>) -> Json<serde_json::Value> {
    Json(json!({
        "ok": true,
        "provider": state.provider.name(),
        "devBypass": state.config.dev_bypass,
        "cookieSecure": state.secure_cookies(),
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}
