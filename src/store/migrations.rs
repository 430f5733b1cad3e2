use sqlx::SqlitePool;

/// Create the capture tables and indexes if they do not already exist.
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    let create_requests = "
        CREATE TABLE IF NOT EXISTS requests (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            ip_address  TEXT    NOT NULL,
            timestamp   INTEGER NOT NULL,
            endpoint    TEXT    NOT NULL,
            http_method TEXT    NOT NULL,
            headers     TEXT    NOT NULL,
            payload     TEXT,
            created_at  INTEGER NOT NULL
        )
    ";

    // UNIQUE(request_id) is what makes the request/response link 1:1.
    let create_responses = "
        CREATE TABLE IF NOT EXISTS responses (
            id               INTEGER PRIMARY KEY AUTOINCREMENT,
            request_id       INTEGER NOT NULL UNIQUE
                             REFERENCES requests(id) ON DELETE CASCADE,
            response_status  INTEGER NOT NULL,
            response_payload TEXT    NOT NULL,
            response_time    INTEGER NOT NULL CHECK (response_time >= 0),
            created_at       INTEGER NOT NULL
        )
    ";

    sqlx::query(create_requests).execute(pool).await?;
    sqlx::query(create_responses).execute(pool).await?;

    let indexes = [
        "CREATE INDEX IF NOT EXISTS idx_requests_timestamp ON requests (timestamp DESC)",
        "CREATE INDEX IF NOT EXISTS idx_requests_ip_address ON requests (ip_address)",
        "CREATE INDEX IF NOT EXISTS idx_requests_endpoint ON requests (endpoint)",
        "CREATE INDEX IF NOT EXISTS idx_responses_status ON responses (response_status)",
    ];

    for idx in &indexes {
        sqlx::query(idx).execute(pool).await?;
    }

    Ok(())
}
