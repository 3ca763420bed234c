use std::sync::Arc;

use chrono::Utc;
use rusqlite::params;
use serde::{Deserialize, Serialize};
use tokio_rusqlite::Connection;

use crate::error::{Error, Result};
use crate::rule_engine;

pub const MAX_GROUP_NAME_LEN: usize = 255;
pub const MAX_PATTERN_LEN: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchType {
    #[default]
    Prefix,
    Regex,
}

impl MatchType {
    fn as_str(&self) -> &'static str {
        match self {
            MatchType::Prefix => "prefix",
            MatchType::Regex => "regex",
        }
    }

    fn from_db(value: &str) -> Self {
        match value {
            "regex" => MatchType::Regex,
            _ => MatchType::Prefix,
        }
    }
}

/// A content-group rule as stored for one site. Immutable once fetched
/// for an evaluation pass; changes go through [`RulesDao`] only.
#[derive(Debug, Clone, Serialize)]
pub struct Rule {
    pub idrule: i64,
    pub idsite: i64,
    pub group_name: String,
    pub pattern: String,
    pub match_type: MatchType,
    pub priority: i64,
}

impl Rule {
    fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        let match_type: String = row.get(4)?;
        Ok(Rule {
            idrule: row.get(0)?,
            idsite: row.get(1)?,
            group_name: row.get(2)?,
            pattern: row.get(3)?,
            match_type: MatchType::from_db(&match_type),
            priority: row.get(5)?,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RuleInput {
    pub group_name: String,
    pub pattern: String,
    #[serde(default)]
    pub match_type: MatchType,
    #[serde(default)]
    pub priority: i64,
}

/// Validate a rule submission before it touches the database. Errors name
/// the offending field so the admin UI can attribute them.
pub fn validate_rule(input: &RuleInput) -> Result<()> {
    if input.group_name.trim().is_empty() {
        return Err(Error::validation("group_name", "group name is required"));
    }
    if input.group_name.chars().count() > MAX_GROUP_NAME_LEN {
        return Err(Error::validation(
            "group_name",
            format!("group name must be {} characters or less", MAX_GROUP_NAME_LEN),
        ));
    }
    if input.pattern.trim().is_empty() {
        return Err(Error::validation("pattern", "pattern is required"));
    }
    if input.pattern.chars().count() > MAX_PATTERN_LEN {
        return Err(Error::validation(
            "pattern",
            format!("pattern must be {} characters or less", MAX_PATTERN_LEN),
        ));
    }
    if input.priority < 0 {
        return Err(Error::validation("priority", "priority must be non-negative"));
    }
    if !rule_engine::is_valid_pattern(&input.pattern, input.match_type) {
        return Err(Error::validation(
            "pattern",
            "invalid or unsafe regex pattern",
        ));
    }
    Ok(())
}

pub struct RulesDao {
    db: Arc<Connection>,
}

impl RulesDao {
    pub fn new(db: Arc<Connection>) -> Self {
        Self { db }
    }

    /// All rules for a site in evaluation order: priority ascending, ties
    /// broken by creation order.
    pub async fn get_rules_for_site(&self, idsite: i64) -> Result<Vec<Rule>> {
        let rules = self
            .db
            .call(move |conn| {
                let mut stmt = conn.prepare_cached(
                    "SELECT idrule, idsite, group_name, pattern, match_type, priority
                     FROM content_group_rule
                     WHERE idsite = ?1
                     ORDER BY priority ASC, idrule ASC",
                )?;
                let rules = stmt
                    .query_map(params![idsite], Rule::from_row)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(rules)
            })
            .await?;
        Ok(rules)
    }

    pub async fn get_rule(&self, idrule: i64, idsite: i64) -> Result<Option<Rule>> {
        let rule = self
            .db
            .call(move |conn| {
                let mut stmt = conn.prepare_cached(
                    "SELECT idrule, idsite, group_name, pattern, match_type, priority
                     FROM content_group_rule
                     WHERE idrule = ?1 AND idsite = ?2",
                )?;
                match stmt.query_row(params![idrule, idsite], Rule::from_row) {
                    Ok(rule) => Ok(Some(rule)),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(tokio_rusqlite::Error::from(e)),
                }
            })
            .await?;
        Ok(rule)
    }

    pub async fn add_rule(&self, idsite: i64, input: RuleInput) -> Result<i64> {
        validate_rule(&input)?;

        let now = Utc::now().timestamp();
        let idrule = self
            .db
            .call(move |conn| {
                let mut stmt = conn.prepare_cached(
                    "INSERT INTO content_group_rule (
                        idsite, group_name, pattern, match_type, priority,
                        created_ts, updated_ts
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                    RETURNING idrule",
                )?;
                let idrule = stmt.query_row(
                    params![
                        idsite,
                        input.group_name,
                        input.pattern,
                        input.match_type.as_str(),
                        input.priority,
                        now,
                        now,
                    ],
                    |row| row.get(0),
                )?;
                Ok(idrule)
            })
            .await?;
        Ok(idrule)
    }

    pub async fn update_rule(&self, idrule: i64, idsite: i64, input: RuleInput) -> Result<()> {
        validate_rule(&input)?;

        let now = Utc::now().timestamp();
        let affected = self
            .db
            .call(move |conn| {
                conn.execute(
                    "UPDATE content_group_rule
                     SET group_name = ?1, pattern = ?2, match_type = ?3,
                         priority = ?4, updated_ts = ?5
                     WHERE idrule = ?6 AND idsite = ?7",
                    params![
                        input.group_name,
                        input.pattern,
                        input.match_type.as_str(),
                        input.priority,
                        now,
                        idrule,
                        idsite,
                    ],
                )
                .map_err(tokio_rusqlite::Error::from)
            })
            .await?;

        if affected == 0 {
            return Err(Error::RuleNotFound { idrule, idsite });
        }
        Ok(())
    }

    pub async fn delete_rule(&self, idrule: i64, idsite: i64) -> Result<()> {
        let affected = self
            .db
            .call(move |conn| {
                conn.execute(
                    "DELETE FROM content_group_rule WHERE idrule = ?1 AND idsite = ?2",
                    params![idrule, idsite],
                )
                .map_err(tokio_rusqlite::Error::from)
            })
            .await?;

        if affected == 0 {
            return Err(Error::RuleNotFound { idrule, idsite });
        }
        Ok(())
    }

    /// Remove every rule owned by a site, e.g. when the site is deleted.
    pub async fn delete_rules_for_site(&self, idsite: i64) -> Result<()> {
        self.db
            .call(move |conn| {
                conn.execute(
                    "DELETE FROM content_group_rule WHERE idsite = ?1",
                    params![idsite],
                )
                .map(|_| ())
                .map_err(tokio_rusqlite::Error::from)
            })
            .await?;
        Ok(())
    }
}
