use std::collections::{BTreeMap, HashMap};

use serde::Serialize;

/// Per-URL page metrics. Every field is additive except the two distinct
/// counts, which are only locally correct per source row; at the group
/// level they are overwritten by the distinct-count correction pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PageMetrics {
    pub nb_visits: i64,
    pub nb_uniq_visitors: i64,
    pub nb_hits: i64,
    pub sum_time_spent: i64,
    pub entry_nb_visits: i64,
    pub exit_nb_visits: i64,
    pub bounce_count: i64,
}

impl PageMetrics {
    pub fn add(&mut self, other: &PageMetrics) {
        self.nb_visits += other.nb_visits;
        self.nb_uniq_visitors += other.nb_uniq_visitors;
        self.nb_hits += other.nb_hits;
        self.sum_time_spent += other.sum_time_spent;
        self.entry_nb_visits += other.entry_nb_visits;
        self.exit_nb_visits += other.exit_nb_visits;
        self.bounce_count += other.bounce_count;
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize)]
pub struct GoalMetrics {
    pub nb_conversions: i64,
    pub nb_visits_converted: i64,
    pub revenue: f64,
}

impl GoalMetrics {
    /// Merge another row for the same goal. Source rows arrive with revenue
    /// already rounded to two decimals; the running total is kept at two
    /// decimals as well so accumulation order cannot leak float noise.
    pub fn add(&mut self, other: &GoalMetrics) {
        self.nb_conversions += other.nb_conversions;
        self.nb_visits_converted += other.nb_visits_converted;
        self.revenue = round2(self.revenue + other.revenue);
    }
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct UrlRow {
    pub label: String,
    pub metrics: PageMetrics,
}

/// One content group: summed page metrics, per-goal metrics, and the
/// per-URL rows the group was folded from.
#[derive(Debug, Default, Clone, Serialize)]
pub struct GroupRow {
    pub label: String,
    pub metrics: PageMetrics,
    pub goals: BTreeMap<i64, GoalMetrics>,
    pub sub_rows: Vec<UrlRow>,
    #[serde(skip)]
    url_index: HashMap<String, usize>,
}

impl GroupRow {
    fn new(label: &str) -> Self {
        Self {
            label: label.to_string(),
            ..Default::default()
        }
    }

    /// Fold a source row for `url` into this group's sub-table. The same
    /// URL may arrive more than once (e.g. several archiving sub-periods);
    /// repeats sum into the existing sub-row.
    pub fn sum_url_row(&mut self, url: &str, metrics: &PageMetrics) {
        match self.url_index.get(url) {
            Some(&idx) => self.sub_rows[idx].metrics.add(metrics),
            None => {
                self.url_index.insert(url.to_string(), self.sub_rows.len());
                self.sub_rows.push(UrlRow {
                    label: url.to_string(),
                    metrics: *metrics,
                });
            }
        }
    }

    pub fn merge_goal(&mut self, idgoal: i64, metrics: &GoalMetrics) {
        self.goals
            .entry(idgoal)
            .and_modify(|existing| existing.add(metrics))
            .or_insert(*metrics);
    }
}

/// The aggregation output: one row per content group. Rebuilt from scratch
/// on every aggregation call and never shared across calls.
#[derive(Debug, Default, Serialize)]
pub struct ReportTable {
    pub rows: Vec<GroupRow>,
    #[serde(skip)]
    index: HashMap<String, usize>,
}

impl ReportTable {
    /// Sum `metrics` into the group row for `label`, creating the row on
    /// first sight, and return it for sub-table folding.
    pub fn sum_row_with_label(&mut self, label: &str, metrics: &PageMetrics) -> &mut GroupRow {
        let idx = match self.index.get(label) {
            Some(&idx) => idx,
            None => {
                let idx = self.rows.len();
                self.index.insert(label.to_string(), idx);
                self.rows.push(GroupRow::new(label));
                idx
            }
        };
        let row = &mut self.rows[idx];
        row.metrics.add(metrics);
        row
    }

    pub fn row_mut(&mut self, label: &str) -> Option<&mut GroupRow> {
        let idx = *self.index.get(label)?;
        Some(&mut self.rows[idx])
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Order rows for output: visits descending, label ascending on ties,
    /// sub-rows the same way. Keeps repeated runs over identical input
    /// byte-identical when serialized.
    pub fn sort_for_output(&mut self) {
        self.rows.sort_by(|a, b| {
            b.metrics
                .nb_visits
                .cmp(&a.metrics.nb_visits)
                .then_with(|| a.label.cmp(&b.label))
        });
        for row in &mut self.rows {
            row.sub_rows.sort_by(|a, b| {
                b.metrics
                    .nb_visits
                    .cmp(&a.metrics.nb_visits)
                    .then_with(|| a.label.cmp(&b.label))
            });
        }
        self.index = self
            .rows
            .iter()
            .enumerate()
            .map(|(idx, row)| (row.label.clone(), idx))
            .collect();
    }
}
