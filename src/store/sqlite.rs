//! SQLite-backed audit store using `sqlx`.
//!
//! Timestamps are stored as integer microseconds since the Unix epoch so that
//! ordering and range filters work on plain integer comparisons.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use std::str::FromStr;
use std::time::Duration;

use crate::store::error::StoreError;
use crate::store::migrations;
use crate::store::record::{
    AuditEntry, AuditPage, AuditQuery, CapturedRequest, CapturedResponse, NewRequest,
    NewResponse, RequestId, ResponseId, StoreStats,
};
use crate::store::AuditStore;

const SELECT_ENTRY: &str = "
    SELECT r.id, r.ip_address, r.timestamp, r.endpoint, r.http_method, r.headers,
           r.payload, r.created_at,
           s.id AS response_id, s.response_status, s.response_payload,
           s.response_time, s.created_at AS response_created_at
    FROM requests r
    LEFT JOIN responses s ON s.request_id = r.id";

/// Audit store persisted in a SQLite database.
pub struct SqliteAuditStore {
    pool: SqlitePool,
}

impl SqliteAuditStore {
    /// Open (creating if needed) the database at `url` and run migrations.
    ///
    /// In-memory URLs are pinned to a single long-lived connection, since every
    /// SQLite connection to `:memory:` sees its own private database.
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let in_memory = url.contains(":memory:") || url.contains("mode=memory");

        let mut options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(5));
        if !in_memory {
            options = options.journal_mode(SqliteJournalMode::Wal);
        }

        let pool_options = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(max_connections.max(1))
        };

        let pool = pool_options.connect_with(options).await?;
        Self::from_pool(pool).await
    }

    /// Create from an existing pool (useful for testing).
    pub async fn from_pool(pool: SqlitePool) -> Result<Self, StoreError> {
        migrations::run_migrations(&pool).await?;
        tracing::debug!("Audit schema ready");
        Ok(Self { pool })
    }
}

#[async_trait]
impl AuditStore for SqliteAuditStore {
    async fn insert_request(&self, request: NewRequest) -> Result<CapturedRequest, StoreError> {
        let timestamp = to_micros(request.timestamp);
        let created_at = to_micros(Utc::now());

        let result = sqlx::query(
            "INSERT INTO requests
                (ip_address, timestamp, endpoint, http_method, headers, payload, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&request.ip_address)
        .bind(timestamp)
        .bind(&request.endpoint)
        .bind(&request.http_method)
        .bind(&request.headers)
        .bind(&request.payload)
        .bind(created_at)
        .execute(&self.pool)
        .await?;

        Ok(CapturedRequest {
            id: RequestId(result.last_insert_rowid()),
            ip_address: request.ip_address,
            timestamp: from_micros(timestamp)?,
            endpoint: request.endpoint,
            http_method: request.http_method,
            headers: request.headers,
            payload: request.payload,
            created_at: from_micros(created_at)?,
        })
    }

    async fn insert_response(&self, response: NewResponse) -> Result<CapturedResponse, StoreError> {
        let created_at = to_micros(response.created_at);
        let response_time = i64::try_from(response.response_time).unwrap_or(i64::MAX);

        let result = sqlx::query(
            "INSERT INTO responses
                (request_id, response_status, response_payload, response_time, created_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(response.request_id.0)
        .bind(i64::from(response.response_status))
        .bind(&response.response_payload)
        .bind(response_time)
        .bind(created_at)
        .execute(&self.pool)
        .await;

        let result = match result {
            Ok(result) => result,
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                return Err(StoreError::DuplicateResponse(response.request_id));
            }
            Err(sqlx::Error::Database(db)) if db.is_foreign_key_violation() => {
                return Err(StoreError::UnknownRequest(response.request_id));
            }
            Err(e) => return Err(e.into()),
        };

        Ok(CapturedResponse {
            id: ResponseId(result.last_insert_rowid()),
            request_id: response.request_id,
            response_status: response.response_status,
            response_payload: response.response_payload,
            response_time: response.response_time,
            created_at: from_micros(created_at)?,
        })
    }

    async fn get(&self, id: RequestId) -> Result<Option<AuditEntry>, StoreError> {
        let sql = format!("{SELECT_ENTRY} WHERE r.id = ?");
        let row = sqlx::query_as::<_, EntryRow>(&sql)
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await?;

        row.map(AuditEntry::try_from).transpose()
    }

    async fn query(&self, query: &AuditQuery) -> Result<AuditPage, StoreError> {
        let mut count = QueryBuilder::<Sqlite>::new(
            "SELECT COUNT(*) FROM requests r LEFT JOIN responses s ON s.request_id = r.id",
        );
        push_filters(&mut count, query);
        let total: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;

        let mut data = QueryBuilder::<Sqlite>::new(SELECT_ENTRY);
        push_filters(&mut data, query);
        data.push(" ORDER BY r.timestamp DESC, r.id DESC LIMIT ")
            .push_bind(i64::from(query.page_size))
            .push(" OFFSET ")
            .push_bind(i64::try_from(query.offset()).unwrap_or(i64::MAX));

        let rows: Vec<EntryRow> = data.build_query_as().fetch_all(&self.pool).await?;
        let entries = rows
            .into_iter()
            .map(AuditEntry::try_from)
            .collect::<Result<Vec<_>, _>>()?;

        #[allow(clippy::cast_sign_loss)]
        let total = total as u64;

        Ok(AuditPage {
            total,
            page: query.page,
            page_size: query.page_size,
            entries,
        })
    }

    async fn delete_request(&self, id: RequestId) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM requests WHERE id = ?")
            .bind(id.0)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn stats(&self) -> Result<StoreStats, StoreError> {
        let (requests, responses): (i64, i64) = sqlx::query_as(
            "SELECT (SELECT COUNT(*) FROM requests), (SELECT COUNT(*) FROM responses)",
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(StoreStats {
            total_requests: u64::try_from(requests).unwrap_or(0),
            total_responses: u64::try_from(responses).unwrap_or(0),
        })
    }
}

/// Append the WHERE clause for every filter set on the query.
fn push_filters(builder: &mut QueryBuilder<'_, Sqlite>, query: &AuditQuery) {
    let mut sep = " WHERE ";

    if let Some(ip) = &query.ip_address {
        builder.push(sep).push("r.ip_address = ").push_bind(ip.clone());
        sep = " AND ";
    }
    if let Some(fragment) = &query.endpoint {
        // instr() keeps `%` and `_` in the fragment literal.
        builder
            .push(sep)
            .push("instr(r.endpoint, ")
            .push_bind(fragment.clone())
            .push(") > 0");
        sep = " AND ";
    }
    if let Some(status) = query.status_code {
        builder.push(sep).push("s.response_status = ").push_bind(i64::from(status));
        sep = " AND ";
    }
    if let Some(from) = query.date_from {
        builder.push(sep).push("r.timestamp >= ").push_bind(to_micros(from));
        sep = " AND ";
    }
    if let Some(to) = query.date_to {
        builder.push(sep).push("r.timestamp <= ").push_bind(to_micros(to));
    }
}

fn to_micros(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_micros()
}

fn from_micros(micros: i64) -> Result<DateTime<Utc>, StoreError> {
    DateTime::from_timestamp_micros(micros)
        .ok_or_else(|| StoreError::Corrupt(format!("timestamp out of range: {micros}")))
}

/// Internal row type for the request/response join.
#[derive(sqlx::FromRow)]
struct EntryRow {
    id: i64,
    ip_address: String,
    timestamp: i64,
    endpoint: String,
    http_method: String,
    headers: String,
    payload: Option<String>,
    created_at: i64,
    response_id: Option<i64>,
    response_status: Option<i64>,
    response_payload: Option<String>,
    response_time: Option<i64>,
    response_created_at: Option<i64>,
}

impl TryFrom<EntryRow> for AuditEntry {
    type Error = StoreError;

    fn try_from(row: EntryRow) -> Result<Self, Self::Error> {
        let request_id = RequestId(row.id);

        let response = match (
            row.response_id,
            row.response_status,
            row.response_time,
            row.response_created_at,
        ) {
            (Some(id), Some(status), Some(time), Some(created_at)) => Some(CapturedResponse {
                id: ResponseId(id),
                request_id,
                response_status: u16::try_from(status)
                    .map_err(|_| StoreError::Corrupt(format!("status code {status}")))?,
                response_payload: row.response_payload.unwrap_or_default(),
                response_time: u64::try_from(time).unwrap_or(0),
                created_at: from_micros(created_at)?,
            }),
            _ => None,
        };

        Ok(AuditEntry {
            request: CapturedRequest {
                id: request_id,
                ip_address: row.ip_address,
                timestamp: from_micros(row.timestamp)?,
                endpoint: row.endpoint,
                http_method: row.http_method,
                headers: row.headers,
                payload: row.payload,
                created_at: from_micros(row.created_at)?,
            },
            response,
        })
    }
}
