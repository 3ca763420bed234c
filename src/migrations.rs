use anyhow::Result;
use rusqlite::params;
use tokio_rusqlite::Connection;
use tracing::info;

#[derive(Debug)]
struct Migration {
    name: &'static str,
    version: i32,
    up: fn(&rusqlite::Connection) -> rusqlite::Result<()>,
}

impl Migration {
    fn new(
        name: &'static str,
        version: i32,
        up: fn(&rusqlite::Connection) -> rusqlite::Result<()>,
    ) -> Self {
        Self { name, version, up }
    }
}

pub async fn initialize_database(db: &Connection) -> Result<()> {
    db.call(|conn| {
        // Raw log tables. These are the aggregation input; the tracker
        // writes them, the content-group aggregator only reads them.
        conn.execute(
            "CREATE TABLE IF NOT EXISTS log_action (
                idaction INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                type INTEGER NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS log_visit (
                idvisit INTEGER PRIMARY KEY,
                idsite INTEGER NOT NULL,
                idvisitor TEXT NOT NULL,
                visit_total_actions INTEGER NOT NULL DEFAULT 0
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS log_link_visit_action (
                idlink_va INTEGER PRIMARY KEY,
                idsite INTEGER NOT NULL,
                idvisit INTEGER NOT NULL,
                idvisitor TEXT NOT NULL,
                idaction_url INTEGER NOT NULL,
                idaction_url_ref INTEGER NOT NULL DEFAULT 0,
                server_time INTEGER NOT NULL,
                time_spent INTEGER NOT NULL DEFAULT 0
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS log_conversion (
                idconversion INTEGER PRIMARY KEY,
                idsite INTEGER NOT NULL,
                idvisit INTEGER NOT NULL,
                idgoal INTEGER NOT NULL,
                server_time INTEGER NOT NULL,
                revenue REAL NOT NULL DEFAULT 0
            )",
            [],
        )?;

        // Content-group rules, evaluated in (priority, idrule) order.
        conn.execute(
            "CREATE TABLE IF NOT EXISTS content_group_rule (
                idrule INTEGER PRIMARY KEY AUTOINCREMENT,
                idsite INTEGER NOT NULL,
                group_name TEXT NOT NULL,
                pattern TEXT NOT NULL,
                match_type TEXT NOT NULL DEFAULT 'prefix',
                priority INTEGER NOT NULL DEFAULT 0,
                created_ts INTEGER NOT NULL,
                updated_ts INTEGER NOT NULL
            )",
            [],
        )?;

        Ok(())
    })
    .await?;

    run_migrations(db).await?;

    Ok(())
}

fn get_migrations() -> Vec<Migration> {
    vec![Migration::new("Add aggregation indices", 1, |conn| {
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_link_va_site_time
             ON log_link_visit_action(idsite, server_time)",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_link_va_visit
             ON log_link_visit_action(idvisit, idlink_va)",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_conversion_site_time
             ON log_conversion(idsite, server_time)",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_rule_site_priority
             ON content_group_rule(idsite, priority)",
            [],
        )?;
        Ok(())
    })]
}

async fn run_migrations(db: &Connection) -> Result<()> {
    db.call(|conn| {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                applied_at INTEGER NOT NULL
            )",
            [],
        )?;

        for migration in get_migrations() {
            let applied: bool = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM schema_migrations WHERE version = ?1)",
                params![migration.version],
                |row| row.get(0),
            )?;
            if applied {
                continue;
            }

            (migration.up)(conn)?;
            conn.execute(
                "INSERT INTO schema_migrations (version, name, applied_at)
                 VALUES (?1, ?2, strftime('%s', 'now'))",
                params![migration.version, migration.name],
            )?;
            info!("Applied migration {}: {}", migration.version, migration.name);
        }

        Ok(())
    })
    .await?;

    Ok(())
}
