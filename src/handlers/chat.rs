use axum::{
    Json,
    extract::{Multipart, State},
};
use base64::Engine;
use serde_json::{Value, json};
use tracing::{debug, info};

use super::{charge_quota, current_user, refund_quota};
use crate::llm::prompts::{
    CHAT_FALLBACK, MATH_SUBJECT, ResponseType, chat_system_prompt, image_only_user_prompt,
};
use crate::llm::{CompletionRequest, InlineImage};
use crate::middleware::body::ApiMultipart;
use crate::middleware::session::Session;
use crate::service::usage::{UsageKind, today};
use crate::{NexusError, router::NexusState};

#[derive(Debug, Default)]
struct ChatForm {
    message: String,
    subject: String,
    response_type: String,
    image: Option<InlineImage>,
}

impl ChatForm {
    async fn read(mut multipart: Multipart) -> Result<Self, NexusError> {
        let mut form = ChatForm::default();
        while let Some(field) = multipart.next_field().await? {
            let name = field.name().unwrap_or_default().to_string();
            match name.as_str() {
                "message" => form.message = field.text().await?.trim().to_string(),
                "subject" => form.subject = field.text().await?.trim().to_string(),
                "responseType" => form.response_type = field.text().await?.trim().to_string(),
                "image" => {
                    let mime_type = field.content_type().unwrap_or("image/jpeg").to_string();
                    let bytes = field.bytes().await?;
                    if !bytes.is_empty() {
                        form.image = Some(InlineImage {
                            mime_type,
                            data_b64: base64::engine::general_purpose::STANDARD.encode(&bytes),
                        });
                    }
                }
                other => debug!(field = other, "ignoring unknown chat form field"),
            }
        }
        if form.subject.is_empty() {
            form.subject = MATH_SUBJECT.to_string();
        }
        Ok(form)
    }
}

/// POST /api/chat (multipart) -> tutoring answer with normalized notation.
///
/// One navi unit is reserved before the model call and handed back if the
/// provider fails.
pub async fn chat(
    State(state): State<NexusState>,
    session: Session,
    ApiMultipart(multipart): ApiMultipart,
) -> Result<Json<Value>, NexusError> {
    let form = ChatForm::read(multipart).await?;
    if form.message.is_empty() && form.image.is_none() {
        return Err(NexusError::bad_request("Message or image required"));
    }

    let user = current_user(&state, session).await?;
    let day = today();
    let count = charge_quota(&state, &user, UsageKind::Navi, day).await?;
    debug!(user_id = user.id, ?count, "navi unit reserved");

    let response_type = ResponseType::parse(&form.response_type);
    let user_prompt = if form.message.is_empty() {
        image_only_user_prompt(&form.subject, &form.response_type)
    } else {
        form.message.clone()
    };
    let request = CompletionRequest::new(chat_system_prompt(&form.subject, response_type), user_prompt)
        .with_image(form.image);

    let raw = match state.provider.complete(&request).await {
        Ok(raw) => raw,
        Err(e) => {
            refund_quota(&state, &user, UsageKind::Navi, day).await;
            return Err(e);
        }
    };
    let answer = if raw.trim().is_empty() {
        CHAT_FALLBACK.to_string()
    } else {
        raw
    };
    info!(
        user_id = user.id,
        provider = state.provider.name(),
        subject = %form.subject,
        "chat answered"
    );

    Ok(Json(json!({
        "success": true,
        "response": state.normalizer().normalize(&answer),
    })))
}
