use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::NaiveDate;
use serde::Deserialize;

use super::rules::error_response;
use crate::aggregators::content_group_aggregator::ContentGroupAggregator;
use crate::aggregators::TimeWindow;
use crate::report::ReportTable;
use crate::AppState;

#[derive(Deserialize)]
pub struct ReportParams {
    /// Inclusive date range, `YYYY-MM-DD`.
    pub date_start: String,
    pub date_end: String,
}

pub async fn get_content_groups(
    State(state): State<AppState>,
    Path(idsite): Path<i64>,
    Query(params): Query<ReportParams>,
) -> Result<Json<ReportTable>, (StatusCode, String)> {
    let window = parse_window(&params)
        .map_err(|message| (StatusCode::BAD_REQUEST, message))?;

    ContentGroupAggregator::new(state.db)
        .aggregate(idsite, window)
        .await
        .map(Json)
        .map_err(error_response)
}

fn parse_window(params: &ReportParams) -> Result<TimeWindow, String> {
    let start = parse_date(&params.date_start, "date_start")?;
    let end = parse_date(&params.date_end, "date_end")?;
    if end < start {
        return Err("date_end: must not be before date_start".to_string());
    }

    // The window covers both days fully.
    let start_ts = start.and_hms_opt(0, 0, 0).unwrap().and_utc().timestamp();
    let end_ts = end.and_hms_opt(23, 59, 59).unwrap().and_utc().timestamp();
    Ok(TimeWindow { start_ts, end_ts })
}

fn parse_date(value: &str, field: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|_| format!("{}: expected YYYY-MM-DD, got '{}'", field, value))
}
