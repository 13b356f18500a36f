//! SQLite store for holders, subscribers and the local webhook mirror.

use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use thiserror::Error;
use whale_core::{ChainId, HolderRecord, Subscriber, Webhook};

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("Corrupt row in {table}: {detail}")]
    Corrupt { table: &'static str, detail: String },
}

/// Active/total counts of the local webhook mirror.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MirrorCounts {
    pub total: u64,
    pub active: u64,
}

/// Database connection shared by every component.
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Connect to the SQLite database at the given URL and run migrations.
    pub async fn connect(database_url: &str) -> Result<Self, DbError> {
        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

        // Every in-memory connection is its own database, so keep exactly one.
        let max_connections = if database_url.contains(":memory:") { 1 } else { 5 };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;

        let db = Self { pool };
        db.run_migrations().await?;
        Ok(db)
    }

    /// Close every pooled connection. Later queries fail.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    async fn run_migrations(&self) -> Result<(), DbError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS holders (
                token_address TEXT NOT NULL,
                chain_id INTEGER NOT NULL,
                symbol TEXT NOT NULL,
                holder_addresses TEXT NOT NULL DEFAULT '[]',
                updated_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                PRIMARY KEY (token_address, chain_id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS subscribers (
                chat_id TEXT PRIMARY KEY,
                subscribed_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        // One webhook per (token, chain) created by this system.
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS webhooks (
                id TEXT PRIMARY KEY,
                token_address TEXT NOT NULL,
                chain_id INTEGER NOT NULL,
                active INTEGER NOT NULL DEFAULT 1,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                UNIQUE(token_address, chain_id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    // ------------------------------------------------------------------
    // Holders
    // ------------------------------------------------------------------

    /// Insert or replace the holder set for a (token, chain) pair.
    pub async fn upsert_holder(&self, record: &HolderRecord) -> Result<(), DbError> {
        let holders_json = serde_json::to_string(&record.holder_addresses).unwrap_or_default();

        sqlx::query(
            r#"
            INSERT INTO holders (token_address, chain_id, symbol, holder_addresses)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(token_address, chain_id)
            DO UPDATE SET symbol = excluded.symbol,
                          holder_addresses = excluded.holder_addresses,
                          updated_at = CURRENT_TIMESTAMP
            "#,
        )
        .bind(&record.token_address)
        .bind(record.chain_id.get() as i64)
        .bind(&record.symbol)
        .bind(&holders_json)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Holder record for a (token, chain) pair.
    pub async fn get_holder(
        &self,
        token_address: &str,
        chain_id: ChainId,
    ) -> Result<Option<HolderRecord>, DbError> {
        let row = sqlx::query_as::<_, (String, i64, String, String)>(
            "SELECT token_address, chain_id, symbol, holder_addresses FROM holders WHERE token_address = ? AND chain_id = ?",
        )
        .bind(whale_core::normalize_address(token_address))
        .bind(chain_id.get() as i64)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(holder_from_row))
    }

    /// All holder records, in insertion order.
    pub async fn list_holders(&self) -> Result<Vec<HolderRecord>, DbError> {
        let rows = sqlx::query_as::<_, (String, i64, String, String)>(
            "SELECT token_address, chain_id, symbol, holder_addresses FROM holders ORDER BY rowid",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(holder_from_row).collect())
    }

    pub async fn count_holders(&self) -> Result<u64, DbError> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM holders")
            .fetch_one(&self.pool)
            .await?;
        Ok(count as u64)
    }

    // ------------------------------------------------------------------
    // Subscribers
    // ------------------------------------------------------------------

    /// Register a chat. Returns `false` if it was already subscribed.
    pub async fn add_subscriber(&self, chat_id: &str) -> Result<bool, DbError> {
        let result =
            sqlx::query("INSERT OR IGNORE INTO subscribers (chat_id, subscribed_at) VALUES (?, ?)")
                .bind(chat_id)
                .bind(Utc::now().to_rfc3339())
                .execute(&self.pool)
                .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn get_subscriber(&self, chat_id: &str) -> Result<Option<Subscriber>, DbError> {
        let row = sqlx::query_as::<_, (String, String)>(
            "SELECT chat_id, subscribed_at FROM subscribers WHERE chat_id = ?",
        )
        .bind(chat_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(subscriber_from_row).transpose()
    }

    /// All subscribers, oldest first.
    pub async fn list_subscribers(&self) -> Result<Vec<Subscriber>, DbError> {
        let rows = sqlx::query_as::<_, (String, String)>(
            "SELECT chat_id, subscribed_at FROM subscribers ORDER BY rowid",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(subscriber_from_row).collect()
    }

    pub async fn count_subscribers(&self) -> Result<u64, DbError> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM subscribers")
            .fetch_one(&self.pool)
            .await?;
        Ok(count as u64)
    }

    // ------------------------------------------------------------------
    // Webhook mirror
    // ------------------------------------------------------------------

    /// Record a webhook created by this system.
    pub async fn insert_webhook(&self, webhook: &Webhook) -> Result<(), DbError> {
        sqlx::query(
            "INSERT INTO webhooks (id, token_address, chain_id, active) VALUES (?, ?, ?, ?)",
        )
        .bind(&webhook.id)
        .bind(whale_core::normalize_address(&webhook.token_address))
        .bind(webhook.chain_id.get() as i64)
        .bind(webhook.active)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Mirror row for a (token, chain) pair, if this system registered one.
    pub async fn webhook_for(
        &self,
        token_address: &str,
        chain_id: ChainId,
    ) -> Result<Option<Webhook>, DbError> {
        let row = sqlx::query_as::<_, (String, String, i64, bool)>(
            "SELECT id, token_address, chain_id, active FROM webhooks WHERE token_address = ? AND chain_id = ?",
        )
        .bind(whale_core::normalize_address(token_address))
        .bind(chain_id.get() as i64)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(webhook_from_row))
    }

    pub async fn get_webhook(&self, id: &str) -> Result<Option<Webhook>, DbError> {
        let row = sqlx::query_as::<_, (String, String, i64, bool)>(
            "SELECT id, token_address, chain_id, active FROM webhooks WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(webhook_from_row))
    }

    /// Every mirror row, in creation order.
    pub async fn list_webhooks(&self) -> Result<Vec<Webhook>, DbError> {
        let rows = sqlx::query_as::<_, (String, String, i64, bool)>(
            "SELECT id, token_address, chain_id, active FROM webhooks ORDER BY rowid",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(webhook_from_row).collect())
    }

    /// Set the mirror's active flag. Returns `false` if no mirror row exists.
    pub async fn set_webhook_active(&self, id: &str, active: bool) -> Result<bool, DbError> {
        let result = sqlx::query("UPDATE webhooks SET active = ? WHERE id = ?")
            .bind(active)
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn webhook_counts(&self) -> Result<MirrorCounts, DbError> {
        let (total, active) = sqlx::query_as::<_, (i64, i64)>(
            "SELECT COUNT(*), COALESCE(SUM(active), 0) FROM webhooks",
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(MirrorCounts {
            total: total as u64,
            active: active as u64,
        })
    }
}

fn holder_from_row(
    (token_address, chain_id, symbol, holders_json): (String, i64, String, String),
) -> HolderRecord {
    HolderRecord {
        token_address,
        chain_id: ChainId(chain_id as u64),
        symbol,
        holder_addresses: serde_json::from_str(&holders_json).unwrap_or_default(),
    }
}

fn webhook_from_row((id, token_address, chain_id, active): (String, String, i64, bool)) -> Webhook {
    Webhook {
        id,
        token_address,
        chain_id: ChainId(chain_id as u64),
        active,
    }
}

fn subscriber_from_row((chat_id, subscribed_at): (String, String)) -> Result<Subscriber, DbError> {
    let subscribed_at = DateTime::parse_from_rfc3339(&subscribed_at)
        .map_err(|e| DbError::Corrupt {
            table: "subscribers",
            detail: format!("{}: {}", chat_id, e),
        })?
        .with_timezone(&Utc);

    Ok(Subscriber {
        chat_id,
        subscribed_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn memory_db() -> Database {
        Database::connect("sqlite::memory:").await.unwrap()
    }

    #[tokio::test]
    async fn test_upsert_holder_replaces_existing() {
        let db = memory_db().await;
        let first = HolderRecord::new("0xABC", ChainId(1), "FOO", vec!["0x1".into()]);
        db.upsert_holder(&first).await.unwrap();

        let second = HolderRecord::new(
            "0xabc",
            ChainId(1),
            "FOO",
            vec!["0x2".into(), "0x3".into()],
        );
        db.upsert_holder(&second).await.unwrap();

        assert_eq!(db.count_holders().await.unwrap(), 1);
        let stored = db.get_holder("0xAbC", ChainId(1)).await.unwrap().unwrap();
        assert_eq!(stored.holder_addresses, vec!["0x2", "0x3"]);
    }

    #[tokio::test]
    async fn test_same_token_on_two_chains() {
        let db = memory_db().await;
        db.upsert_holder(&HolderRecord::new("0xabc", ChainId(1), "FOO", vec![]))
            .await
            .unwrap();
        db.upsert_holder(&HolderRecord::new("0xabc", ChainId(8453), "FOO", vec![]))
            .await
            .unwrap();

        assert_eq!(db.list_holders().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_resubscribe_is_noop() {
        let db = memory_db().await;

        assert!(db.add_subscriber("123456").await.unwrap());
        let first = db.get_subscriber("123456").await.unwrap().unwrap();

        assert!(!db.add_subscriber("123456").await.unwrap());
        assert_eq!(db.count_subscribers().await.unwrap(), 1);

        let again = db.get_subscriber("123456").await.unwrap().unwrap();
        assert_eq!(first.subscribed_at, again.subscribed_at);
    }

    #[tokio::test]
    async fn test_webhook_mirror() {
        let db = memory_db().await;
        let webhook = Webhook {
            id: "wh_1".into(),
            token_address: "0xABC".into(),
            chain_id: ChainId(1),
            active: true,
        };
        db.insert_webhook(&webhook).await.unwrap();

        let found = db.webhook_for("0xabc", ChainId(1)).await.unwrap().unwrap();
        assert_eq!(found.id, "wh_1");
        assert!(db.webhook_for("0xabc", ChainId(10)).await.unwrap().is_none());

        assert!(db.set_webhook_active("wh_1", false).await.unwrap());
        assert!(!db.get_webhook("wh_1").await.unwrap().unwrap().active);
        assert!(!db.set_webhook_active("missing", false).await.unwrap());

        let counts = db.webhook_counts().await.unwrap();
        assert_eq!(counts, MirrorCounts { total: 1, active: 0 });
    }

    #[tokio::test]
    async fn test_one_webhook_per_pair() {
        let db = memory_db().await;
        let mut webhook = Webhook {
            id: "wh_1".into(),
            token_address: "0xabc".into(),
            chain_id: ChainId(1),
            active: true,
        };
        db.insert_webhook(&webhook).await.unwrap();

        webhook.id = "wh_2".into();
        assert!(db.insert_webhook(&webhook).await.is_err());
    }
}
