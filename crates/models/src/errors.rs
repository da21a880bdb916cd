use serde::{Deserialize, Serialize};

/// Error classes the worker dispatcher branches on.
///
/// * `Transient`: retried with backoff, counted against max attempts.
/// * `Permanent`: never retried; routed to the permanent-failure hook.
/// * `Business`: never retried; the job proceeds with partial results where
///   possible and surfaces the cause.
/// * `Integrity`: fatal; indicates a broken invariant and is never
///   auto-resolved.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Transient,
    Permanent,
    Business,
    Integrity,
}

/// An actor-level processing error carrying its retry class.
#[derive(Debug, thiserror::Error)]
#[error("{kind:?}: {message}")]
pub struct ProcessingError {
    pub kind: ErrorKind,
    pub message: String,
    #[source]
    pub source: Option<anyhow::Error>,
}

impl ProcessingError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
        }
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Transient, message)
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Permanent, message)
    }

    pub fn business(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Business, message)
    }

    pub fn integrity(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Integrity, message)
    }

    pub fn with_source(mut self, source: anyhow::Error) -> Self {
        self.source = Some(source);
        self
    }

    pub fn is_retryable(&self) -> bool {
        self.kind == ErrorKind::Transient
    }
}

/// Classify a database error: constraint violations are integrity errors,
/// everything else is transient (connection loss, pool timeouts, DB-busy).
pub fn classify_sqlx(err: &sqlx::Error) -> ErrorKind {
    match err {
        sqlx::Error::Database(db) if db.code().as_deref() == Some("23505") => {
            ErrorKind::Integrity
        }
        sqlx::Error::RowNotFound => ErrorKind::Permanent,
        _ => ErrorKind::Transient,
    }
}

/// Whether a database error is a unique-constraint violation
/// (Postgres SQLSTATE 23505).
pub fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.code().as_deref() == Some("23505"))
}

impl From<sqlx::Error> for ProcessingError {
    fn from(err: sqlx::Error) -> Self {
        let kind = classify_sqlx(&err);
        ProcessingError::new(kind, format!("database error: {err}"))
            .with_source(anyhow::Error::from(err))
    }
}
