use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow},
    Pool, Row, Sqlite,
};
use std::{
    fs,
    path::{Path, PathBuf},
    str::FromStr,
    time::Duration,
};
use tracing::info;

use shared::domain::{ResponseId, SurveyAnswers, SurveyResponse};
use wizard::ResponseSink;

pub const DEFAULT_DATABASE_URL: &str = "sqlite://./data/survey.db";

#[derive(Clone)]
pub struct Storage {
    pool: Pool<Sqlite>,
}

impl Storage {
    pub async fn new(database_url: &str) -> Result<Self> {
        ensure_sqlite_parent_dir_exists(database_url)?;

        let connect_options = SqliteConnectOptions::from_str(database_url)
            .with_context(|| format!("invalid sqlite url '{database_url}'"))?
            .create_if_missing(true);
        // Every connection to an in-memory database sees its own empty schema.
        let pool_options = if is_in_memory(database_url) {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None::<Duration>)
                .max_lifetime(None::<Duration>)
        } else {
            SqlitePoolOptions::new().max_connections(5)
        };
        let pool = pool_options.connect_with(connect_options).await?;
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .context("failed to apply survey migrations")?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    pub async fn health_check(&self) -> Result<()> {
        let _: i64 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("sqlite ping failed")?;
        Ok(())
    }

    pub async fn insert_response(&self, answers: &SurveyAnswers) -> Result<ResponseId> {
        let rec = sqlx::query(
            "INSERT INTO responses (year_debt, company_scale, debt_amount, market_served) VALUES (?, ?, ?, ?) RETURNING id",
        )
        .bind(&answers.year_debt)
        .bind(&answers.company_scale)
        .bind(&answers.debt_amount)
        .bind(&answers.market_served)
        .fetch_one(&self.pool)
        .await
        .context("failed to insert survey response")?;
        let response_id = ResponseId(rec.get::<i64, _>(0));
        info!(response_id = response_id.0, "survey response stored");
        Ok(response_id)
    }

    pub async fn list_responses(&self) -> Result<Vec<SurveyResponse>> {
        let rows = sqlx::query(
            "SELECT id, year_debt, company_scale, debt_amount, market_served, submitted_at
             FROM responses
             ORDER BY id ASC",
        )
        .fetch_all(&self.pool)
        .await
        .context("failed to list survey responses")?;
        Ok(rows.iter().map(response_from_row).collect())
    }

    pub async fn load_response(&self, response_id: ResponseId) -> Result<Option<SurveyResponse>> {
        let row = sqlx::query(
            "SELECT id, year_debt, company_scale, debt_amount, market_served, submitted_at
             FROM responses
             WHERE id = ?",
        )
        .bind(response_id.0)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(response_from_row))
    }

    pub async fn count_responses(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM responses")
            .fetch_one(&self.pool)
            .await
            .context("failed to count survey responses")?;
        Ok(count)
    }
}

#[async_trait]
impl ResponseSink for Storage {
    async fn insert_response(&self, answers: &SurveyAnswers) -> Result<ResponseId> {
        Storage::insert_response(self, answers).await
    }
}

fn response_from_row(r: &SqliteRow) -> SurveyResponse {
    SurveyResponse {
        response_id: ResponseId(r.get::<i64, _>(0)),
        answers: SurveyAnswers {
            year_debt: r.get::<String, _>(1),
            company_scale: r.get::<String, _>(2),
            debt_amount: r.get::<String, _>(3),
            market_served: r.get::<String, _>(4),
        },
        submitted_at: r.get::<DateTime<Utc>, _>(5),
    }
}

/// Turns a plain path or loosely written sqlite url into one sqlx accepts.
pub fn normalize_database_url(raw_database_url: &str) -> String {
    let raw_database_url = raw_database_url.trim();

    if raw_database_url.is_empty() {
        return DEFAULT_DATABASE_URL.to_string();
    }

    if is_in_memory(raw_database_url) {
        return raw_database_url.to_string();
    }

    let path = if let Some(path) = raw_database_url.strip_prefix("sqlite://") {
        path
    } else if raw_database_url.contains("://") {
        return raw_database_url.to_string();
    } else if let Some(path) = raw_database_url.strip_prefix("sqlite:") {
        path
    } else {
        raw_database_url
    };

    let path = path.replace('\\', "/");
    if has_windows_drive(&path) {
        format!("sqlite:{path}")
    } else {
        format!("sqlite://{path}")
    }
}

fn is_in_memory(database_url: &str) -> bool {
    database_url.starts_with("sqlite::memory:")
}

fn has_windows_drive(path: &str) -> bool {
    let bytes = path.as_bytes();
    bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}

fn ensure_sqlite_parent_dir_exists(database_url: &str) -> Result<()> {
    let Some(path) = sqlite_path(database_url) else {
        return Ok(());
    };

    let Some(parent) = path.parent() else {
        return Ok(());
    };

    fs::create_dir_all(parent).with_context(|| {
        format!(
            "failed to create parent directory '{}' for database url '{database_url}'",
            parent.display()
        )
    })?;

    Ok(())
}

fn sqlite_path(database_url: &str) -> Option<PathBuf> {
    if is_in_memory(database_url) || !database_url.starts_with("sqlite:") {
        return None;
    }

    let path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .split('?')
        .next()
        .unwrap_or_default();

    if path.is_empty() {
        return None;
    }

    Some(Path::new(path).to_path_buf())
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
