use crate::domains::history::types::{ApiCallRecord, User};
use crate::errors::{DbError, DbResult};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

/// Read access to users and their API-call history.
///
/// Rows come back in whatever order the store returns them; callers must not
/// assume any ordering across users.
#[async_trait]
pub trait RowSource: Send + Sync {
    /// List every user
    async fn list_users(&self) -> DbResult<Vec<User>>;

    /// List all API calls recorded for one user
    async fn list_api_calls(&self, user_id: i64) -> DbResult<Vec<ApiCallRecord>>;
}

/// PostgreSQL implementation of RowSource
pub struct PgRowSource {
    pool: PgPool,
}

impl PgRowSource {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn map_user(row: &PgRow) -> DbResult<User> {
        Ok(User {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
        })
    }

    fn map_api_call(row: &PgRow) -> DbResult<ApiCallRecord> {
        Ok(ApiCallRecord {
            id: row.try_get("id")?,
            endpoint: row.try_get("endpoint")?,
            call_timestamp: Self::decode_timestamp(row, "call_timestamp")?,
        })
    }

    /// Accept both `timestamptz` and plain `timestamp` columns.
    /// A plain `timestamp` is read as UTC.
    fn decode_timestamp(row: &PgRow, column: &str) -> DbResult<DateTime<Utc>> {
        match row.try_get::<DateTime<Utc>, _>(column) {
            Ok(ts) => Ok(ts),
            Err(sqlx::Error::ColumnDecode { .. }) => {
                let naive: NaiveDateTime = row.try_get(column).map_err(|e| DbError::Decode {
                    column: column.to_string(),
                    reason: e.to_string(),
                })?;
                Ok(naive.and_utc())
            }
            Err(e) => Err(DbError::from(e)),
        }
    }
}

#[async_trait]
impl RowSource for PgRowSource {
    async fn list_users(&self) -> DbResult<Vec<User>> {
        // Cast so INTEGER and BIGINT id columns both decode as i64
        let rows = sqlx::query(r#"SELECT id::BIGINT AS id, name FROM "user""#)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(Self::map_user).collect()
    }

    async fn list_api_calls(&self, user_id: i64) -> DbResult<Vec<ApiCallRecord>> {
        let rows = sqlx::query(
            "SELECT id::BIGINT AS id, endpoint, call_timestamp
             FROM api_calls
             WHERE user_id = $1::BIGINT",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::map_api_call).collect()
    }
}
