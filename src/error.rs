//! Error taxonomy for the ingestion pipeline.
//!
//! Per-record problems (derivation gaps, validation failures) are carried in
//! validation outcomes and never surface here. This module covers the failures
//! that abort a normalizer call or a batch write.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    /// The raw payload does not match the expected provider shape. Fatal for
    /// that normalizer invocation — no partial output is returned.
    #[error("malformed {source_name} payload: missing `{key_path}`")]
    MalformedSourceData {
        source_name: String,
        key_path: String,
    },

    /// Transient inability to reach the store. Batches hit by this are
    /// retried with backoff before the error is surfaced.
    #[error("store connection failed: {detail}")]
    StoreConnection { detail: String },

    /// A concurrent writer raced a uniqueness constraint. The batch is rolled
    /// back and retried once in full before this is reported.
    #[error("write conflict on {table} for record {record_key}")]
    ConflictOnWrite {
        table: &'static str,
        record_key: String,
    },

    /// A row-level write failed for a reason validation could not catch. The
    /// whole batch was rolled back; `record_key` identifies the offender.
    #[error("batch write to {table} failed on record {record_key}: {detail}")]
    BatchWrite {
        table: &'static str,
        record_key: String,
        detail: String,
    },
}

impl IngestError {
    pub fn malformed(source_name: &str, key_path: &str) -> Self {
        Self::MalformedSourceData {
            source_name: source_name.to_string(),
            key_path: key_path.to_string(),
        }
    }

    pub fn is_retryable_connection(&self) -> bool {
        matches!(self, Self::StoreConnection { .. })
    }
}

/// Map a sqlx error raised while writing `record_key` into `table` onto the
/// taxonomy above.
pub fn classify_write_error(table: &'static str, record_key: &str, e: sqlx::Error) -> IngestError {
    match &e {
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
            IngestError::StoreConnection {
                detail: e.to_string(),
            }
        }
        sqlx::Error::Database(db) if db.is_unique_violation() => IngestError::ConflictOnWrite {
            table,
            record_key: record_key.to_string(),
        },
        _ => IngestError::BatchWrite {
            table,
            record_key: record_key.to_string(),
            detail: e.to_string(),
        },
    }
}
