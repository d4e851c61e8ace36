use crate::domain::ports::{Subscriber, UserDirectory};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Row, SqlitePool};

/// SQLite-backed subscriber registry for broadcast delivery
pub struct SqliteSubscriberDirectory {
    pool: SqlitePool,
}

impl SqliteSubscriberDirectory {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn register(&self, chat_id: i64) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO subscribers (chat_id, is_active, registered_at)
            VALUES (?, 1, ?)
            ON CONFLICT(chat_id) DO UPDATE SET is_active = 1
            "#,
        )
        .bind(chat_id)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .context("Failed to register subscriber")?;
        Ok(())
    }

    pub async fn deactivate(&self, chat_id: i64) -> Result<()> {
        sqlx::query("UPDATE subscribers SET is_active = 0 WHERE chat_id = ?")
            .bind(chat_id)
            .execute(&self.pool)
            .await
            .context("Failed to deactivate subscriber")?;
        Ok(())
    }
}

#[async_trait]
impl UserDirectory for SqliteSubscriberDirectory {
    async fn active_subscribers(&self) -> Result<Vec<Subscriber>> {
        let rows = sqlx::query("SELECT chat_id, is_active FROM subscribers WHERE is_active = 1")
            .fetch_all(&self.pool)
            .await?;
        rows.iter()
            .map(|row| {
                Ok(Subscriber {
                    chat_id: row.try_get("chat_id")?,
                    is_active: row.try_get("is_active")?,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::persistence::database::Database;

    async fn directory() -> SqliteSubscriberDirectory {
        let db = Database::new("sqlite::memory:").await.unwrap();
        SqliteSubscriberDirectory::new(db.pool)
    }

    #[tokio::test]
    async fn test_register_and_list() {
        let dir = directory().await;
        dir.register(1001).await.unwrap();
        dir.register(1002).await.unwrap();

        let active = dir.active_subscribers().await.unwrap();
        assert_eq!(active.len(), 2);
        assert!(active.iter().all(|s| s.is_active));
    }

    #[tokio::test]
    async fn test_deactivate_hides_subscriber() {
        let dir = directory().await;
        dir.register(1001).await.unwrap();
        dir.deactivate(1001).await.unwrap();
        assert!(dir.active_subscribers().await.unwrap().is_empty());

        // Re-registering reactivates
        dir.register(1001).await.unwrap();
        assert_eq!(dir.active_subscribers().await.unwrap().len(), 1);
    }
}
