// crates/db/src/migrations.rs
/// Inline SQL migrations for the quotient job store.
///
/// We use simple inline migrations rather than sqlx migration files
/// because the schema is small and self-contained.

pub const MIGRATIONS: &[&str] = &[
    // Migration 1: jobs table
    r#"
CREATE TABLE IF NOT EXISTS jobs (
    id                  TEXT PRIMARY KEY,
    owner_id            TEXT NOT NULL,
    job_type            TEXT NOT NULL,
    params              TEXT NOT NULL DEFAULT '{}',
    status              TEXT NOT NULL DEFAULT 'queued'
        CHECK (status IN ('queued', 'running', 'completed', 'failed', 'cancelled')),
    priority            INTEGER NOT NULL DEFAULT 0,
    progress_percentage INTEGER NOT NULL DEFAULT 0
        CHECK (progress_percentage BETWEEN 0 AND 100),
    retry_count         INTEGER NOT NULL DEFAULT 0,
    max_retries         INTEGER NOT NULL DEFAULT 3,
    result              TEXT,
    error_message       TEXT,
    created_at          INTEGER NOT NULL,
    started_at          INTEGER,
    completed_at        INTEGER,
    failed_at           INTEGER,
    cancelled_at        INTEGER,
    not_before          INTEGER,
    backend_kind        TEXT NOT NULL,
    backend_ref         TEXT,
    CHECK (retry_count >= 0 AND retry_count <= max_retries)
);
"#,
    // Migration 2: candidate selection order (priority desc, FIFO within)
    r#"CREATE INDEX IF NOT EXISTS idx_jobs_selection ON jobs(status, priority DESC, created_at);"#,
    // Migration 3: per-owner active-job quota counting
    r#"CREATE INDEX IF NOT EXISTS idx_jobs_owner_status ON jobs(owner_id, status);"#,
    // Migration 4: per-backend running capacity counting
    r#"CREATE INDEX IF NOT EXISTS idx_jobs_backend_status ON jobs(backend_kind, status);"#,
];
