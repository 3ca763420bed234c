use std::collections::BTreeMap;
use std::sync::Arc;

use rusqlite::types::Value;
use rusqlite::params;
use tokio_rusqlite::Connection;
use tracing::debug;

use super::TimeWindow;
use crate::error::Result;
use crate::report::{GoalMetrics, PageMetrics, ReportTable};
use crate::rule_engine::{MatchLimits, RuleEngine};
use crate::rules::RulesDao;

/// `log_action.type` value for page-URL actions; other action types
/// (downloads, outlinks, titles) are ignored by content grouping.
const ACTION_TYPE_PAGE_URL: i64 = 1;

struct PageViewRow {
    idaction: i64,
    url: Option<String>,
    metrics: PageMetrics,
}

impl PageViewRow {
    fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        Ok(PageViewRow {
            idaction: row.get(0)?,
            url: row.get(1)?,
            metrics: PageMetrics {
                nb_visits: row.get(2)?,
                nb_uniq_visitors: row.get(3)?,
                nb_hits: row.get(4)?,
                sum_time_spent: row.get(5)?,
                entry_nb_visits: row.get(6)?,
                exit_nb_visits: row.get(7)?,
                bounce_count: row.get(8)?,
            },
        })
    }
}

struct GroupDistinctRow {
    content_group: Option<String>,
    nb_visits: i64,
    nb_uniq_visitors: i64,
}

impl GroupDistinctRow {
    fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        Ok(GroupDistinctRow {
            content_group: row.get(0)?,
            nb_visits: row.get(1)?,
            nb_uniq_visitors: row.get(2)?,
        })
    }
}

struct GoalRow {
    url: Option<String>,
    idgoal: i64,
    metrics: GoalMetrics,
}

impl GoalRow {
    fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        Ok(GoalRow {
            url: row.get(0)?,
            idgoal: row.get(1)?,
            metrics: GoalMetrics {
                nb_conversions: row.get(2)?,
                nb_visits_converted: row.get(3)?,
                revenue: row.get(4)?,
            },
        })
    }
}

/// Builds the content-group report for one site and time window.
///
/// Three sequential passes over the raw log: per-URL page metrics folded
/// into group rows, a correction query that recomputes the non-additive
/// distinct counts at group granularity, and a goal-conversion merge.
/// Each call rebuilds the report from scratch.
pub struct ContentGroupAggregator {
    db: Arc<Connection>,
    limits: MatchLimits,
}

impl ContentGroupAggregator {
    pub fn new(db: Arc<Connection>) -> Self {
        Self {
            db,
            limits: MatchLimits::default(),
        }
    }

    pub fn with_limits(db: Arc<Connection>, limits: MatchLimits) -> Self {
        Self { db, limits }
    }

    pub async fn aggregate(&self, idsite: i64, window: TimeWindow) -> Result<ReportTable> {
        let rules = RulesDao::new(self.db.clone())
            .get_rules_for_site(idsite)
            .await?;
        if rules.is_empty() {
            // No rules means content grouping is disabled for this site;
            // skip the log queries entirely.
            debug!("No content group rules for site {}, skipping", idsite);
            return Ok(ReportTable::default());
        }

        let engine = Arc::new(RuleEngine::compile(&rules, self.limits));

        let (report, group_idactions) = self
            .aggregate_page_metrics(idsite, window, engine.clone())
            .await?;
        let report = self
            .correct_group_distinct_metrics(idsite, window, report, group_idactions)
            .await?;
        let mut report = self
            .aggregate_goal_metrics(idsite, window, report, engine)
            .await?;

        report.sort_for_output();
        Ok(report)
    }

    /// Pass 1: per-URL page metrics, classified and folded into group rows
    /// and their URL sub-tables. Also collects, per group, the set of
    /// action ids that contributed to it; the correction query needs that
    /// map to re-group the raw rows.
    async fn aggregate_page_metrics(
        &self,
        idsite: i64,
        window: TimeWindow,
        engine: Arc<RuleEngine>,
    ) -> Result<(ReportTable, BTreeMap<String, Vec<i64>>)> {
        let query = format!(
            "SELECT
                la.idaction AS idaction,
                la.name AS url,
                COUNT(DISTINCT lva.idvisit) AS nb_visits,
                COUNT(DISTINCT lva.idvisitor) AS nb_uniq_visitors,
                COUNT(*) AS nb_hits,
                SUM(lva.time_spent) AS sum_time_spent,
                SUM(CASE WHEN lva.idaction_url_ref = 0 THEN 1 ELSE 0 END) AS entry_nb_visits,
                SUM(CASE WHEN NOT EXISTS (
                    SELECT 1 FROM log_link_visit_action nxt
                    WHERE nxt.idvisit = lva.idvisit AND nxt.idlink_va > lva.idlink_va
                ) THEN 1 ELSE 0 END) AS exit_nb_visits,
                SUM(CASE lv.visit_total_actions WHEN 1 THEN 1 ELSE 0 END) AS bounce_count
            FROM log_link_visit_action lva
            JOIN log_action la ON la.idaction = lva.idaction_url
            JOIN log_visit lv ON lv.idvisit = lva.idvisit
            WHERE lva.idsite = ?1
              AND lva.server_time >= ?2 AND lva.server_time <= ?3
              AND la.type = {}
            GROUP BY la.idaction
            ORDER BY nb_visits DESC",
            ACTION_TYPE_PAGE_URL
        );

        debug!("Aggregating page metrics for site {}: {}", idsite, query);

        let result = self
            .db
            .call(move |conn| {
                let mut stmt = conn.prepare(&query)?;
                let mut rows = stmt.query(params![idsite, window.start_ts, window.end_ts])?;

                let mut report = ReportTable::default();
                let mut group_idactions: BTreeMap<String, Vec<i64>> = BTreeMap::new();

                while let Some(row) = rows.next()? {
                    let row = PageViewRow::from_row(row)?;
                    let Some(url) = row.url.filter(|u| !u.is_empty()) else {
                        continue;
                    };

                    let group = engine.evaluate_url(&url).to_string();
                    group_idactions
                        .entry(group.clone())
                        .or_default()
                        .push(row.idaction);

                    let group_row = report.sum_row_with_label(&group, &row.metrics);
                    group_row.sum_url_row(&url, &row.metrics);
                }

                Ok((report, group_idactions))
            })
            .await?;
        Ok(result)
    }

    /// COUNT(DISTINCT) is not additive: a visit touching several URLs in
    /// one group would be counted once per URL. Re-query at group
    /// granularity, mapping each action id back to its group with a CASE
    /// expression, and overwrite the two distinct counts on the top-level
    /// rows. URL sub-rows keep their locally correct values.
    async fn correct_group_distinct_metrics(
        &self,
        idsite: i64,
        window: TimeWindow,
        mut report: ReportTable,
        group_idactions: BTreeMap<String, Vec<i64>>,
    ) -> Result<ReportTable> {
        if group_idactions.is_empty() {
            return Ok(report);
        }

        let mut case_parts = Vec::with_capacity(group_idactions.len());
        let mut bind: Vec<Value> = Vec::with_capacity(group_idactions.len() + 3);
        for (group, idactions) in &group_idactions {
            // Action ids come from our own Pass-1 rows; group names are
            // user data and go through placeholders.
            let ids = idactions
                .iter()
                .map(|id| id.to_string())
                .collect::<Vec<_>>()
                .join(",");
            case_parts.push(format!("WHEN la.idaction IN ({}) THEN ?", ids));
        }
        for group in group_idactions.keys() {
            bind.push(Value::from(group.clone()));
        }
        bind.push(Value::from(idsite));
        bind.push(Value::from(window.start_ts));
        bind.push(Value::from(window.end_ts));

        let query = format!(
            "SELECT
                CASE {} END AS content_group,
                COUNT(DISTINCT lva.idvisit) AS nb_visits,
                COUNT(DISTINCT lva.idvisitor) AS nb_uniq_visitors
            FROM log_link_visit_action lva
            JOIN log_action la ON la.idaction = lva.idaction_url
            WHERE lva.idsite = ?
              AND lva.server_time >= ? AND lva.server_time <= ?
              AND la.type = {}
            GROUP BY content_group",
            case_parts.join(" "),
            ACTION_TYPE_PAGE_URL
        );

        debug!(
            "Correcting distinct counts for site {}: {}",
            idsite, query
        );

        let report = self
            .db
            .call(move |conn| {
                let mut stmt = conn.prepare(&query)?;
                let mut rows = stmt.query(rusqlite::params_from_iter(bind))?;

                while let Some(row) = rows.next()? {
                    let row = GroupDistinctRow::from_row(row)?;
                    // Actions outside every group set fall out of the CASE
                    // as NULL.
                    let Some(group) = row.content_group else {
                        continue;
                    };
                    if let Some(group_row) = report.row_mut(&group) {
                        group_row.metrics.nb_visits = row.nb_visits;
                        group_row.metrics.nb_uniq_visitors = row.nb_uniq_visitors;
                    }
                }

                Ok(report)
            })
            .await?;
        Ok(report)
    }

    /// Pass 2: goal conversions joined to the page views of the converting
    /// visit, grouped by (action, goal), classified independently of
    /// Pass 1 and merged into existing group rows. A group that had no
    /// page-view row gets no row here.
    async fn aggregate_goal_metrics(
        &self,
        idsite: i64,
        window: TimeWindow,
        mut report: ReportTable,
        engine: Arc<RuleEngine>,
    ) -> Result<ReportTable> {
        let query = format!(
            "SELECT
                la.name AS url,
                lc.idgoal AS idgoal,
                COUNT(*) AS nb_conversions,
                COUNT(DISTINCT lc.idvisit) AS nb_visits_converted,
                ROUND(SUM(lc.revenue), 2) AS revenue
            FROM log_conversion lc
            JOIN log_link_visit_action lva ON lva.idvisit = lc.idvisit
            JOIN log_action la ON la.idaction = lva.idaction_url
            WHERE lc.idsite = ?1
              AND lc.server_time >= ?2 AND lc.server_time <= ?3
              AND lva.server_time <= lc.server_time
              AND la.type = {}
            GROUP BY la.idaction, lc.idgoal",
            ACTION_TYPE_PAGE_URL
        );

        debug!("Aggregating goal metrics for site {}: {}", idsite, query);

        let report = self
            .db
            .call(move |conn| {
                let mut stmt = conn.prepare(&query)?;
                let mut rows = stmt.query(params![idsite, window.start_ts, window.end_ts])?;

                while let Some(row) = rows.next()? {
                    let row = GoalRow::from_row(row)?;
                    let Some(url) = row.url.filter(|u| !u.is_empty()) else {
                        continue;
                    };

                    let group = engine.evaluate_url(&url).to_string();
                    let Some(group_row) = report.row_mut(&group) else {
                        continue;
                    };
                    group_row.merge_goal(row.idgoal, &row.metrics);
                }

                Ok(report)
            })
            .await?;
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migrations;
    use crate::rule_engine::GROUP_NOT_SET;
    use crate::rules::{MatchType, RuleInput, RulesDao};

    const WINDOW: TimeWindow = TimeWindow {
        start_ts: 100,
        end_ts: 1000,
    };

    async fn test_db() -> Arc<Connection> {
        let db = Connection::open_in_memory().await.unwrap();
        migrations::initialize_database(&db).await.unwrap();
        Arc::new(db)
    }

    async fn exec_batch(db: &Arc<Connection>, sql: &'static str) {
        db.call(move |conn| conn.execute_batch(sql).map_err(Into::into))
            .await
            .unwrap();
    }

    async fn add_prefix_rule(db: &Arc<Connection>, idsite: i64, group: &str, prefix: &str) {
        RulesDao::new(db.clone())
            .add_rule(
                idsite,
                RuleInput {
                    group_name: group.to_string(),
                    pattern: prefix.to_string(),
                    match_type: MatchType::Prefix,
                    priority: 0,
                },
            )
            .await
            .unwrap();
    }

    /// Two URLs in one group; visit 1 (visitor X) touches both, so the
    /// per-URL distinct counts sum to 5 while the true group-level counts
    /// are 4 and 4.
    async fn seed_docs_site(db: &Arc<Connection>) {
        exec_batch(
            db,
            "INSERT INTO log_action (idaction, name, type) VALUES
                (1, '/docs/a', 1),
                (2, '/docs/b', 1);
             INSERT INTO log_visit (idvisit, idsite, idvisitor, visit_total_actions) VALUES
                (1, 1, 'X', 2),
                (2, 1, 'Y', 1),
                (3, 1, 'Z', 1),
                (4, 1, 'W', 1);
             INSERT INTO log_link_visit_action
                (idlink_va, idsite, idvisit, idvisitor, idaction_url, idaction_url_ref, server_time, time_spent)
             VALUES
                (1, 1, 1, 'X', 1, 0, 100, 10),
                (2, 1, 1, 'X', 2, 1, 110, 10),
                (3, 1, 2, 'Y', 1, 0, 120, 10),
                (4, 1, 3, 'Z', 1, 0, 130, 10),
                (5, 1, 4, 'W', 2, 0, 140, 10);",
        )
        .await;
    }

    #[tokio::test]
    async fn folds_urls_into_groups_and_corrects_distinct_counts() {
        let db = test_db().await;
        seed_docs_site(&db).await;
        add_prefix_rule(&db, 1, "Documentation", "/docs/").await;

        let report = ContentGroupAggregator::new(db)
            .aggregate(1, WINDOW)
            .await
            .unwrap();

        assert_eq!(report.rows.len(), 1);
        let row = &report.rows[0];
        assert_eq!(row.label, "Documentation");

        // Additive metrics are exact sums of the per-URL rows.
        assert_eq!(row.metrics.nb_hits, 5);
        assert_eq!(row.metrics.sum_time_spent, 50);
        assert_eq!(row.metrics.entry_nb_visits, 4);
        assert_eq!(row.metrics.exit_nb_visits, 4);
        assert_eq!(row.metrics.bounce_count, 3);

        // Distinct counts come from the correction pass: visit 1 and
        // visitor X span both URLs and must be counted once.
        assert_eq!(row.metrics.nb_visits, 4);
        assert_eq!(row.metrics.nb_uniq_visitors, 4);

        // Sub-rows keep their locally correct distinct counts, whose sum
        // overcounts by design.
        assert_eq!(row.sub_rows.len(), 2);
        let sub_visits: i64 = row.sub_rows.iter().map(|s| s.metrics.nb_visits).sum();
        assert_eq!(sub_visits, 5);
        let sub_hits: i64 = row.sub_rows.iter().map(|s| s.metrics.nb_hits).sum();
        assert_eq!(row.metrics.nb_hits, sub_hits);
    }

    #[tokio::test]
    async fn unmatched_urls_land_in_the_not_set_group() {
        let db = test_db().await;
        seed_docs_site(&db).await;
        exec_batch(
            &db,
            "INSERT INTO log_action (idaction, name, type) VALUES (3, '/pricing', 1);
             INSERT INTO log_visit (idvisit, idsite, idvisitor, visit_total_actions) VALUES
                (5, 1, 'V', 1);
             INSERT INTO log_link_visit_action
                (idlink_va, idsite, idvisit, idvisitor, idaction_url, idaction_url_ref, server_time, time_spent)
             VALUES (6, 1, 5, 'V', 3, 0, 150, 0);",
        )
        .await;
        add_prefix_rule(&db, 1, "Documentation", "/docs/").await;

        let report = ContentGroupAggregator::new(db)
            .aggregate(1, WINDOW)
            .await
            .unwrap();

        assert_eq!(report.rows.len(), 2);
        let not_set = report
            .rows
            .iter()
            .find(|r| r.label == GROUP_NOT_SET)
            .unwrap();
        assert_eq!(not_set.metrics.nb_hits, 1);
        assert_eq!(not_set.metrics.nb_visits, 1);
    }

    #[tokio::test]
    async fn empty_urls_and_non_page_actions_are_skipped() {
        let db = test_db().await;
        seed_docs_site(&db).await;
        // An action with an empty name and a download-type action, both in
        // the window.
        exec_batch(
            &db,
            "INSERT INTO log_action (idaction, name, type) VALUES
                (3, '', 1),
                (4, '/docs/file.zip', 2);
             INSERT INTO log_visit (idvisit, idsite, idvisitor, visit_total_actions) VALUES
                (5, 1, 'V', 2);
             INSERT INTO log_link_visit_action
                (idlink_va, idsite, idvisit, idvisitor, idaction_url, idaction_url_ref, server_time, time_spent)
             VALUES
                (6, 1, 5, 'V', 3, 0, 150, 0),
                (7, 1, 5, 'V', 4, 0, 160, 0);",
        )
        .await;
        add_prefix_rule(&db, 1, "Documentation", "/docs/").await;

        let report = ContentGroupAggregator::new(db)
            .aggregate(1, WINDOW)
            .await
            .unwrap();

        assert_eq!(report.rows.len(), 1);
        assert_eq!(report.rows[0].label, "Documentation");
        assert_eq!(report.rows[0].metrics.nb_hits, 5);
    }

    #[tokio::test]
    async fn same_url_under_two_action_ids_folds_into_one_sub_row() {
        let db = test_db().await;
        exec_batch(
            &db,
            "INSERT INTO log_action (idaction, name, type) VALUES
                (1, '/docs/a', 1),
                (2, '/docs/a', 1);
             INSERT INTO log_visit (idvisit, idsite, idvisitor, visit_total_actions) VALUES
                (1, 1, 'X', 1),
                (2, 1, 'Y', 1);
             INSERT INTO log_link_visit_action
                (idlink_va, idsite, idvisit, idvisitor, idaction_url, idaction_url_ref, server_time, time_spent)
             VALUES
                (1, 1, 1, 'X', 1, 0, 100, 5),
                (2, 1, 2, 'Y', 2, 0, 110, 5);",
        )
        .await;
        add_prefix_rule(&db, 1, "Documentation", "/docs/").await;

        let report = ContentGroupAggregator::new(db)
            .aggregate(1, WINDOW)
            .await
            .unwrap();

        let row = &report.rows[0];
        assert_eq!(row.sub_rows.len(), 1);
        assert_eq!(row.sub_rows[0].label, "/docs/a");
        assert_eq!(row.sub_rows[0].metrics.nb_hits, 2);
        assert_eq!(row.metrics.nb_visits, 2);
    }

    #[tokio::test]
    async fn merges_goal_conversions_into_group_rows() {
        let db = test_db().await;
        seed_docs_site(&db).await;
        // Visit 1 converts goal 7 after viewing both URLs; both actions
        // attribute the conversion, and both land in the same group.
        exec_batch(
            &db,
            "INSERT INTO log_conversion (idconversion, idsite, idvisit, idgoal, server_time, revenue)
             VALUES (1, 1, 1, 7, 115, 10.128);",
        )
        .await;
        add_prefix_rule(&db, 1, "Documentation", "/docs/").await;

        let report = ContentGroupAggregator::new(db)
            .aggregate(1, WINDOW)
            .await
            .unwrap();

        let row = &report.rows[0];
        let goal = &row.goals[&7];
        assert_eq!(goal.nb_conversions, 2);
        assert_eq!(goal.nb_visits_converted, 2);
        // Each source row is rounded to 10.13 before the merge sums them.
        assert!((goal.revenue - 20.26).abs() < 1e-9);
    }

    #[tokio::test]
    async fn revenue_is_rounded_per_row_before_accumulation() {
        let db = test_db().await;
        exec_batch(
            &db,
            "INSERT INTO log_action (idaction, name, type) VALUES
                (1, '/docs/a', 1),
                (2, '/docs/b', 1);
             INSERT INTO log_visit (idvisit, idsite, idvisitor, visit_total_actions) VALUES
                (1, 1, 'X', 1),
                (2, 1, 'Y', 1);
             INSERT INTO log_link_visit_action
                (idlink_va, idsite, idvisit, idvisitor, idaction_url, idaction_url_ref, server_time, time_spent)
             VALUES
                (1, 1, 1, 'X', 1, 0, 100, 0),
                (2, 1, 2, 'Y', 2, 0, 110, 0);
             INSERT INTO log_conversion (idconversion, idsite, idvisit, idgoal, server_time, revenue)
             VALUES
                (1, 1, 1, 9, 120, 0.004),
                (2, 1, 2, 9, 130, 0.004);",
        )
        .await;
        add_prefix_rule(&db, 1, "Documentation", "/docs/").await;

        let report = ContentGroupAggregator::new(db)
            .aggregate(1, WINDOW)
            .await
            .unwrap();

        let goal = &report.rows[0].goals[&9];
        assert_eq!(goal.nb_conversions, 2);
        // 0.004 rounds to 0.00 per row; summing before rounding would
        // give 0.01.
        assert_eq!(goal.revenue, 0.0);
    }

    #[tokio::test]
    async fn goal_rows_without_a_page_row_are_skipped() {
        let db = test_db().await;
        // The page view happened before the window; only the conversion
        // falls inside it, so Pass 1 builds no group row to merge into.
        exec_batch(
            &db,
            "INSERT INTO log_action (idaction, name, type) VALUES (1, '/docs/a', 1);
             INSERT INTO log_visit (idvisit, idsite, idvisitor, visit_total_actions) VALUES
                (1, 1, 'X', 1);
             INSERT INTO log_link_visit_action
                (idlink_va, idsite, idvisit, idvisitor, idaction_url, idaction_url_ref, server_time, time_spent)
             VALUES (1, 1, 1, 'X', 1, 0, 50, 0);
             INSERT INTO log_conversion (idconversion, idsite, idvisit, idgoal, server_time, revenue)
             VALUES (1, 1, 1, 7, 150, 5.0);",
        )
        .await;
        add_prefix_rule(&db, 1, "Documentation", "/docs/").await;

        let report = ContentGroupAggregator::new(db)
            .aggregate(1, WINDOW)
            .await
            .unwrap();

        assert!(report.is_empty());
    }

    #[tokio::test]
    async fn empty_rule_set_short_circuits_without_querying_the_log() {
        let db = test_db().await;
        // Dropping the log tables proves the short-circuit: any log query
        // would fail with "no such table".
        exec_batch(
            &db,
            "DROP TABLE log_link_visit_action;
             DROP TABLE log_action;
             DROP TABLE log_visit;
             DROP TABLE log_conversion;",
        )
        .await;

        let report = ContentGroupAggregator::new(db)
            .aggregate(1, WINDOW)
            .await
            .unwrap();
        assert!(report.is_empty());
    }

    #[tokio::test]
    async fn repeated_runs_produce_identical_output() {
        let db = test_db().await;
        seed_docs_site(&db).await;
        exec_batch(
            &db,
            "INSERT INTO log_conversion (idconversion, idsite, idvisit, idgoal, server_time, revenue)
             VALUES (1, 1, 1, 7, 115, 10.128);",
        )
        .await;
        add_prefix_rule(&db, 1, "Documentation", "/docs/").await;

        let aggregator = ContentGroupAggregator::new(db);
        let first = aggregator.aggregate(1, WINDOW).await.unwrap();
        let second = aggregator.aggregate(1, WINDOW).await.unwrap();
        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
    }

    #[tokio::test]
    async fn rows_are_scoped_to_the_requested_site_and_window() {
        let db = test_db().await;
        seed_docs_site(&db).await;
        // Same shape of traffic on another site and outside the window.
        exec_batch(
            &db,
            "INSERT INTO log_visit (idvisit, idsite, idvisitor, visit_total_actions) VALUES
                (10, 2, 'Q', 1),
                (11, 1, 'R', 1);
             INSERT INTO log_link_visit_action
                (idlink_va, idsite, idvisit, idvisitor, idaction_url, idaction_url_ref, server_time, time_spent)
             VALUES
                (10, 2, 10, 'Q', 1, 0, 150, 0),
                (11, 1, 11, 'R', 1, 0, 5000, 0);",
        )
        .await;
        add_prefix_rule(&db, 1, "Documentation", "/docs/").await;

        let report = ContentGroupAggregator::new(db)
            .aggregate(1, WINDOW)
            .await
            .unwrap();

        let row = &report.rows[0];
        assert_eq!(row.metrics.nb_hits, 5);
        assert_eq!(row.metrics.nb_visits, 4);
    }

    #[tokio::test]
    async fn first_matching_rule_wins_across_match_types() {
        let db = test_db().await;
        seed_docs_site(&db).await;
        let dao = RulesDao::new(db.clone());
        dao.add_rule(
            1,
            RuleInput {
                group_name: "A Pages".to_string(),
                pattern: r"/docs/a$".to_string(),
                match_type: MatchType::Regex,
                priority: 0,
            },
        )
        .await
        .unwrap();
        dao.add_rule(
            1,
            RuleInput {
                group_name: "Documentation".to_string(),
                pattern: "/docs/".to_string(),
                match_type: MatchType::Prefix,
                priority: 1,
            },
        )
        .await
        .unwrap();

        let report = ContentGroupAggregator::new(db)
            .aggregate(1, WINDOW)
            .await
            .unwrap();

        let labels: Vec<&str> = report.rows.iter().map(|r| r.label.as_str()).collect();
        assert!(labels.contains(&"A Pages"));
        assert!(labels.contains(&"Documentation"));
        let a_pages = report.rows.iter().find(|r| r.label == "A Pages").unwrap();
        assert_eq!(a_pages.sub_rows.len(), 1);
        assert_eq!(a_pages.sub_rows[0].label, "/docs/a");
        assert_eq!(a_pages.metrics.nb_visits, 3);
    }
}
