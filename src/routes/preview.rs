use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use garde::Validate;

use super::error::{ApiError, ApiResult};
use crate::app_state::AppState;
use crate::models::api::{PreviewRequest, PreviewResponse, ResetWildcardRequest};
use crate::services::wildcards::WildcardInfo;

/// POST /api/v1/preview — candidate prompts for a template or config, without
/// consuming wildcard rotation.
pub async fn preview_prompts(
    State(state): State<AppState>,
    Json(req): Json<PreviewRequest>,
) -> ApiResult<Json<PreviewResponse>> {
    req.validate()?;

    let template = match (req.template, req.config_name) {
        (Some(template), _) => template,
        (None, Some(name)) => state.configs.load(&name)?.prompt.positive,
        (None, None) => {
            return Err(ApiError::BadRequest(
                "either template or config_name is required".to_string(),
            ))
        }
    };

    let prompts = state.resolver.preview(&template, req.count)?;
    Ok(Json(PreviewResponse {
        wildcards: state.resolver.placeholders(&template),
        template,
        prompts,
    }))
}

/// GET /api/v1/configs
pub async fn list_configs(State(state): State<AppState>) -> ApiResult<Json<Vec<String>>> {
    Ok(Json(state.configs.list()?))
}

/// GET /api/v1/wildcards
pub async fn list_wildcards(State(state): State<AppState>) -> ApiResult<Json<Vec<WildcardInfo>>> {
    Ok(Json(state.wildcards.list()?))
}

/// POST /api/v1/wildcards/reset — forget a wildcard's rotation so its next use
/// starts a fresh bag.
pub async fn reset_wildcard(
    State(state): State<AppState>,
    Json(req): Json<ResetWildcardRequest>,
) -> ApiResult<StatusCode> {
    req.validate()?;
    state.wildcards.values(&req.name)?;
    state.wildcards.reset(&req.name)?;
    tracing::info!(wildcard = %req.name, "Wildcard rotation reset");
    Ok(StatusCode::NO_CONTENT)
}
