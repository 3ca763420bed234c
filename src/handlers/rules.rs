use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::error::Error;
use crate::rule_engine::{MatchLimits, RuleEngine};
use crate::rules::{Rule, RuleInput, RulesDao};
use crate::AppState;

pub fn error_response(e: Error) -> (StatusCode, String) {
    match e {
        Error::Validation { .. } => (StatusCode::BAD_REQUEST, e.to_string()),
        Error::RuleNotFound { .. } => (StatusCode::NOT_FOUND, e.to_string()),
        Error::Database(_) => {
            error!("Database error: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "internal error".to_string())
        }
    }
}

pub async fn list_rules(
    State(state): State<AppState>,
    Path(idsite): Path<i64>,
) -> Result<Json<Vec<Rule>>, (StatusCode, String)> {
    RulesDao::new(state.db)
        .get_rules_for_site(idsite)
        .await
        .map(Json)
        .map_err(error_response)
}

#[derive(Serialize)]
pub struct CreatedRule {
    pub idrule: i64,
}

pub async fn create_rule(
    State(state): State<AppState>,
    Path(idsite): Path<i64>,
    Json(input): Json<RuleInput>,
) -> Result<(StatusCode, Json<CreatedRule>), (StatusCode, String)> {
    let idrule = RulesDao::new(state.db)
        .add_rule(idsite, input)
        .await
        .map_err(error_response)?;
    Ok((StatusCode::CREATED, Json(CreatedRule { idrule })))
}

pub async fn update_rule(
    State(state): State<AppState>,
    Path((idsite, idrule)): Path<(i64, i64)>,
    Json(input): Json<RuleInput>,
) -> Result<StatusCode, (StatusCode, String)> {
    RulesDao::new(state.db)
        .update_rule(idrule, idsite, input)
        .await
        .map_err(error_response)?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn delete_rule(
    State(state): State<AppState>,
    Path((idsite, idrule)): Path<(i64, i64)>,
) -> Result<StatusCode, (StatusCode, String)> {
    RulesDao::new(state.db)
        .delete_rule(idrule, idsite)
        .await
        .map_err(error_response)?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Deserialize)]
pub struct TestUrlParams {
    pub url: String,
}

#[derive(Serialize)]
pub struct TestUrlResponse {
    pub group: String,
}

/// Preview which group a URL would be classified into with the site's
/// current rules.
pub async fn test_url(
    State(state): State<AppState>,
    Path(idsite): Path<i64>,
    Query(params): Query<TestUrlParams>,
) -> Result<Json<TestUrlResponse>, (StatusCode, String)> {
    let rules = RulesDao::new(state.db)
        .get_rules_for_site(idsite)
        .await
        .map_err(error_response)?;

    let engine = RuleEngine::compile(&rules, MatchLimits::default());
    Ok(Json(TestUrlResponse {
        group: engine.evaluate_url(&params.url).to_string(),
    }))
}
