use axum::extract::State;
use axum::Json;
use serde::Deserialize;
use std::sync::Arc;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::nlp::types::{Language, ParseRequest, ParseResponse};
use crate::server::AppState;

#[derive(Debug, Deserialize, ToSchema)]
pub struct ParsePromptRequest {
    pub prompt: String,
    #[serde(default)]
    pub locale: Option<Language>,
    #[serde(default)]
    pub user_timezone: Option<String>,
    #[serde(default)]
    pub user_id: Option<Uuid>,
}

#[utoipa::path(
    post,
    path = "/parse",
    tag = "parse",
    request_body = ParsePromptRequest,
    responses(
        (status = 200, description = "Parse outcome, success flag inside the envelope", body = ParseResponse),
    ),
    description = "Parse a natural-language prompt into a structured calendar event."
)]
pub(crate) async fn parse_prompt(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ParsePromptRequest>,
) -> Json<ParseResponse> {
    let request = ParseRequest {
        prompt: body.prompt,
        locale: body.locale,
        user_timezone: body
            .user_timezone
            .unwrap_or_else(|| state.settings.default_timezone.name().to_string()),
        user_id: body.user_id,
    };
    Json(state.parser.parse(&request))
}
