use anyhow::{Context, Result};
use sqlx::{Row, SqlitePool};
use tracing::info;

static MIGRATIONS: &[(&str, &str)] = &[(
    "202608151200_initial.sql",
    include_str!("../migrations/202608151200_initial.sql"),
)];

/// Apply any pending embedded migrations, recording each in
/// `schema_migrations`.
pub async fn apply_migrations(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version    TEXT PRIMARY KEY,
            applied_at TEXT NOT NULL
        )",
    )
    .execute(pool)
    .await
    .context("create schema_migrations table")?;

    for (version, sql) in MIGRATIONS {
        let applied = sqlx::query("SELECT version FROM schema_migrations WHERE version = ?1")
            .bind(version)
            .fetch_optional(pool)
            .await
            .context("check applied migration")?;
        if applied.is_some() {
            continue;
        }

        let mut tx = pool.begin().await.context("begin migration transaction")?;
        for statement in sql.split(';') {
            let statement = statement.trim();
            if statement.is_empty() {
                continue;
            }
            sqlx::query(statement)
                .execute(tx.as_mut())
                .await
                .with_context(|| format!("apply migration {version}"))?;
        }
        sqlx::query("INSERT INTO schema_migrations (version, applied_at) VALUES (?1, ?2)")
            .bind(version)
            .bind(chrono::Utc::now().to_rfc3339())
            .execute(tx.as_mut())
            .await
            .context("record migration")?;
        tx.commit().await.context("commit migration")?;

        info!(target: "wrenchcloud", event = "migration_applied", version = version);
    }

    Ok(())
}

/// Number of applied migrations; handy for health checks and tests.
pub async fn applied_count(pool: &SqlitePool) -> Result<i64> {
    let row = sqlx::query("SELECT COUNT(*) AS n FROM schema_migrations")
        .fetch_one(pool)
        .await
        .context("count applied migrations")?;
    Ok(row.try_get::<i64, _>("n")?)
}
