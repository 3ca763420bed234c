pub mod content_group_aggregator;

/// Inclusive unix-second bounds of one aggregation run.
#[derive(Debug, Clone, Copy)]
pub struct TimeWindow {
    pub start_ts: i64,
    pub end_ts: i64,
}
