use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sequencer::{ItemStore, SeqBound};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow},
    Pool, Row, Sqlite,
};
use std::{
    fs,
    path::{Path, PathBuf},
    str::FromStr,
};

use shared::domain::{ItemId, TodoItem};

const ITEM_COLUMNS: &str = "id, text, completed, seq, due_date";

#[derive(Clone)]
pub struct Storage {
    pool: Pool<Sqlite>,
}

/// Window over the ordered list. `limit: None` returns every remaining item.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ItemPage {
    pub offset: u32,
    pub limit: Option<u32>,
    pub completed: Option<bool>,
}

impl Storage {
    pub async fn new(database_url: &str) -> Result<Self> {
        ensure_sqlite_parent_dir_exists(database_url)?;

        let connect_options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(connect_options)
            .await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    pub async fn health_check(&self) -> Result<()> {
        let _: i64 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("sqlite ping failed")?;
        Ok(())
    }

    pub async fn insert_item(&self, item: &TodoItem) -> Result<()> {
        sqlx::query(
            "INSERT INTO todos (id, text, completed, seq, due_date) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(item.id.as_str())
        .bind(&item.text)
        .bind(item.completed)
        .bind(item.seq)
        .bind(item.due_date)
        .execute(&self.pool)
        .await
        .with_context(|| format!("failed to insert todo {}", item.id))?;
        Ok(())
    }

    pub async fn find_item(&self, id: &ItemId) -> Result<Option<TodoItem>> {
        let row = sqlx::query(&format!("SELECT {ITEM_COLUMNS} FROM todos WHERE id = ?"))
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(item_from_row).transpose()
    }

    /// Items in list order for one page, plus the count of all items matching
    /// the filter before paging.
    pub async fn list_items(&self, page: ItemPage) -> Result<(Vec<TodoItem>, u64)> {
        let rows = sqlx::query(&format!(
            "SELECT {ITEM_COLUMNS}
             FROM todos
             WHERE (?1 IS NULL OR completed = ?1)
             ORDER BY seq ASC, id ASC
             LIMIT ?2 OFFSET ?3"
        ))
        .bind(page.completed)
        .bind(page.limit.map_or(-1, i64::from))
        .bind(i64::from(page.offset))
        .fetch_all(&self.pool)
        .await
        .context("failed to list todos")?;

        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM todos WHERE (?1 IS NULL OR completed = ?1)")
                .bind(page.completed)
                .fetch_one(&self.pool)
                .await
                .context("failed to count todos")?;

        let items = rows.iter().map(item_from_row).collect::<Result<Vec<_>>>()?;
        Ok((items, u64::try_from(count).unwrap_or_default()))
    }

    pub async fn set_completed(&self, id: &ItemId, completed: bool) -> Result<bool> {
        let result = sqlx::query("UPDATE todos SET completed = ? WHERE id = ?")
            .bind(completed)
            .bind(id.as_str())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn set_due_date(&self, id: &ItemId, due_date: Option<DateTime<Utc>>) -> Result<bool> {
        let result = sqlx::query("UPDATE todos SET due_date = ? WHERE id = ?")
            .bind(due_date)
            .bind(id.as_str())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn delete_item(&self, id: &ItemId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM todos WHERE id = ?")
            .bind(id.as_str())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Rewrites every seq to `1..=n` in current list order. Returns the number
    /// of items renumbered.
    pub async fn renumber_seq(&self) -> Result<u64> {
        let mut tx = self.pool.begin().await?;
        let ids: Vec<String> = sqlx::query_scalar("SELECT id FROM todos ORDER BY seq ASC, id ASC")
            .fetch_all(&mut *tx)
            .await?;

        let mut seq = sequencer::INITIAL_SEQ;
        for id in &ids {
            sqlx::query("UPDATE todos SET seq = ? WHERE id = ?")
                .bind(seq)
                .bind(id)
                .execute(&mut *tx)
                .await?;
            seq += 1.0;
        }
        tx.commit().await.context("failed to commit renumbering")?;
        Ok(ids.len() as u64)
    }
}

#[async_trait]
impl ItemStore for Storage {
    async fn find_by_id(&self, id: &ItemId) -> Result<Option<TodoItem>> {
        self.find_item(id).await
    }

    async fn find_bounded_by_seq(
        &self,
        bound: SeqBound,
        exclude: &ItemId,
        limit: u32,
    ) -> Result<Vec<TodoItem>> {
        let (seq, filter) = match bound {
            SeqBound::AtMost(seq) => (seq, "seq <= ?1 AND id <> ?2 ORDER BY seq DESC, id DESC"),
            SeqBound::AtLeast(seq) => (seq, "seq >= ?1 AND id <> ?2 ORDER BY seq ASC, id ASC"),
        };
        let rows = sqlx::query(&format!(
            "SELECT {ITEM_COLUMNS} FROM todos WHERE {filter} LIMIT ?3"
        ))
        .bind(seq)
        .bind(exclude.as_str())
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .context("failed to query seq neighbors")?;
        rows.iter().map(item_from_row).collect()
    }

    async fn find_max_seq(&self) -> Result<Option<TodoItem>> {
        let row = sqlx::query(&format!(
            "SELECT {ITEM_COLUMNS} FROM todos ORDER BY seq DESC, id DESC LIMIT 1"
        ))
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(item_from_row).transpose()
    }

    async fn update_seq(&self, id: &ItemId, seq: f64) -> Result<()> {
        sqlx::query("UPDATE todos SET seq = ? WHERE id = ?")
            .bind(seq)
            .bind(id.as_str())
            .execute(&self.pool)
            .await
            .with_context(|| format!("failed to update seq of {id}"))?;
        Ok(())
    }
}

fn item_from_row(row: &SqliteRow) -> Result<TodoItem> {
    Ok(TodoItem {
        id: ItemId(row.try_get("id")?),
        text: row.try_get("text")?,
        completed: row.try_get("completed")?,
        seq: row.try_get("seq")?,
        due_date: row.try_get("due_date")?,
    })
}

fn ensure_sqlite_parent_dir_exists(database_url: &str) -> Result<()> {
    let Some(path) = sqlite_path(database_url) else {
        return Ok(());
    };

    let Some(parent) = path.parent() else {
        return Ok(());
    };

    if parent.as_os_str().is_empty() {
        return Ok(());
    }

    fs::create_dir_all(parent).with_context(|| {
        format!(
            "failed to create parent directory '{}' for database url '{database_url}'",
            parent.display()
        )
    })?;

    Ok(())
}

fn sqlite_path(database_url: &str) -> Option<PathBuf> {
    if database_url.starts_with("sqlite::memory:") || !database_url.starts_with("sqlite:") {
        return None;
    }

    let path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .split('?')
        .next()
        .unwrap_or_default();

    if path.is_empty() || path == ":memory:" {
        return None;
    }

    Some(Path::new(path).to_path_buf())
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
