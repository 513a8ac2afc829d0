//! SQLite identity store.

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use tracing::info;

use super::{Identity, IdentityKey, IdentityStore, StoreError};

static MEMDB_COUNTER: AtomicU64 = AtomicU64::new(0);

type IdentityRow = (
    String,
    String,
    Option<String>,
    Option<String>,
    String,
    Option<i64>,
);

/// Identity store backed by an SQLx SQLite pool.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Connection acquire timeout.
    const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

    /// Maximum time a connection can remain idle before being closed.
    const IDLE_TIMEOUT: Duration = Duration::from_secs(60);

    /// Open (or create) the database at `path`, running migrations.
    /// `:memory:` opens a private in-memory database.
    pub async fn open(path: &str) -> Result<Self, StoreError> {
        let pool = if path == ":memory:" {
            // Shared-cache memory databases are named per call so parallel
            // tests never see each other's rows.
            let id = MEMDB_COUNTER.fetch_add(1, Ordering::Relaxed);
            let memdb_uri = format!(
                "file:idmd-memdb-{}-{}?mode=memory&cache=shared",
                std::process::id(),
                id
            );
            let options = SqliteConnectOptions::new()
                .filename(&memdb_uri)
                .shared_cache(true)
                .create_if_missing(true);

            SqlitePoolOptions::new()
                .max_connections(1)
                .acquire_timeout(Self::ACQUIRE_TIMEOUT)
                .idle_timeout(Some(Self::IDLE_TIMEOUT))
                .connect_with(options)
                .await?
        } else {
            if let Some(parent) = Path::new(path).parent()
                && !parent.as_os_str().is_empty()
                && let Err(e) = std::fs::create_dir_all(parent)
            {
                tracing::warn!(path = %parent.display(), error = %e, "Failed to create database directory");
            }

            let options = SqliteConnectOptions::new()
                .filename(path)
                .create_if_missing(true);

            SqlitePoolOptions::new()
                .max_connections(5)
                .acquire_timeout(Self::ACQUIRE_TIMEOUT)
                .idle_timeout(Some(Self::IDLE_TIMEOUT))
                .connect_with(options)
                .await?
        };

        info!(path = %path, "Identity database connected");

        sqlx::migrate!("./migrations").run(&pool).await?;

        sqlx::query("PRAGMA journal_mode=WAL")
            .execute(&pool)
            .await?;
        sqlx::query("PRAGMA synchronous=NORMAL")
            .execute(&pool)
            .await?;

        Ok(Self { pool })
    }

    fn from_row(row: IdentityRow) -> Result<Identity, StoreError> {
        let (provider_id, username, name, email, groups, last_discharge) = row;
        let groups: Vec<String> =
            serde_json::from_str(&groups).map_err(|e| StoreError::Corrupt {
                provider_id: provider_id.clone(),
                reason: e.to_string(),
            })?;
        let last_discharge = last_discharge.and_then(|ms| Utc.timestamp_millis_opt(ms).single());
        Ok(Identity {
            provider_id,
            username,
            name,
            email,
            groups,
            last_discharge,
        })
    }
}

#[async_trait]
impl IdentityStore for SqliteStore {
    async fn identity(&self, key: IdentityKey<'_>) -> Result<Option<Identity>, StoreError> {
        let (sql, value) = match key {
            IdentityKey::ProviderId(id) => (
                "SELECT provider_id, username, name, email, groups, last_discharge \
                 FROM identities WHERE provider_id = ?",
                id,
            ),
            IdentityKey::Username(name) => (
                "SELECT provider_id, username, name, email, groups, last_discharge \
                 FROM identities WHERE username = ?",
                name,
            ),
        };
        let row = sqlx::query_as::<_, IdentityRow>(sql)
            .bind(value)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Self::from_row).transpose()
    }

    async fn upsert_identity(&self, identity: &Identity) -> Result<Identity, StoreError> {
        identity.check_domain()?;

        let groups = serde_json::to_string(&identity.groups).map_err(|e| StoreError::Corrupt {
            provider_id: identity.provider_id.clone(),
            reason: e.to_string(),
        })?;
        let last_discharge = identity.last_discharge.map(|t| t.timestamp_millis());

        let row = sqlx::query_as::<_, IdentityRow>(
            r#"
            INSERT INTO identities (provider_id, username, name, email, groups, last_discharge)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(provider_id) DO UPDATE SET
                username = excluded.username,
                name = excluded.name,
                email = excluded.email,
                groups = excluded.groups,
                last_discharge = NULLIF(MAX(COALESCE(identities.last_discharge, 0), COALESCE(excluded.last_discharge, 0)), 0)
            RETURNING provider_id, username, name, email, groups, last_discharge
            "#,
        )
        .bind(&identity.provider_id)
        .bind(&identity.username)
        .bind(&identity.name)
        .bind(&identity.email)
        .bind(&groups)
        .bind(last_discharge)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e
                && db_err.is_unique_violation()
            {
                return StoreError::DuplicateUsername(identity.username.clone());
            }
            StoreError::from(e)
        })?;

        Self::from_row(row)
    }

    async fn touch_last_discharge(
        &self,
        provider_id: &str,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE identities
            SET last_discharge = MAX(COALESCE(last_discharge, 0), ?)
            WHERE provider_id = ?
            "#,
        )
        .bind(at.timestamp_millis())
        .bind(provider_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
