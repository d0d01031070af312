//! Contract between the protocol handler and the SQL engine backing it.
//!
//! The handler never inspects SQL beyond rewriting it. Everything else
//! (parsing, planning, storage) happens behind these traits.
use crate::catalog::Catalog;
use crate::messages::{ErrorResponse, SqlState};
use async_trait::async_trait;
use std::fmt::{self, Write};
use std::sync::Arc;

pub type Result<T, E = BackendError> = std::result::Result<T, E>;

/// Message prefix for lookups of settings that don't exist.
pub const UNRECOGNIZED_PARAMETER: &str = "unrecognized configuration parameter";

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error(transparent)]
    Sqlite(#[from] async_sqlite::Error),

    #[error(transparent)]
    Rusqlite(#[from] async_sqlite::rusqlite::Error),

    #[error("data directory does not exist: {0}")]
    MissingDataDir(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl BackendError {
    /// Pick the closest Postgres error code for this error.
    pub fn sql_state(&self) -> SqlState {
        use async_sqlite::rusqlite::{Error as RusqliteError, ErrorCode};

        let err = match self {
            BackendError::Sqlite(async_sqlite::Error::Rusqlite(err)) => err,
            BackendError::Rusqlite(err) => err,
            _ => return SqlState::InternalError,
        };

        match err {
            RusqliteError::SqliteFailure(failure, _)
                if failure.code == ErrorCode::ConstraintViolation =>
            {
                SqlState::IntegrityConstraintViolation
            }
            RusqliteError::UserFunctionError(_) => SqlState::UndefinedObject,
            // Errors raised inside user functions only keep their message.
            RusqliteError::SqliteFailure(_, Some(msg))
                if msg.starts_with(UNRECOGNIZED_PARAMETER) =>
            {
                SqlState::UndefinedObject
            }
            RusqliteError::SqliteFailure(_, _)
            | RusqliteError::MultipleStatement
            | RusqliteError::InvalidParameterCount(_, _) => {
                SqlState::SyntaxErrorOrAccessRuleViolation
            }
            _ => SqlState::InternalError,
        }
    }
}

impl From<&BackendError> for ErrorResponse {
    fn from(err: &BackendError) -> Self {
        ErrorResponse::error(err.sql_state(), err.to_string())
    }
}

/// A single value in a result row.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Write the Postgres text representation of this value.
    ///
    /// Nulls write nothing; callers encode them out of band.
    pub fn write_text<W: Write>(&self, w: &mut W) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Integer(v) => write!(w, "{v}"),
            Value::Real(v) => write!(w, "{v}"),
            Value::Text(v) => w.write_str(v),
            Value::Blob(v) => {
                w.write_str("\\x")?;
                for b in v {
                    write!(w, "{b:02x}")?;
                }
                Ok(())
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub name: String,
}

impl Column {
    pub fn new(name: impl Into<String>) -> Self {
        Column { name: name.into() }
    }
}

/// Fully materialized output of a single statement execution.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultSet {
    pub columns: Vec<Column>,
    pub rows: Vec<Vec<Value>>,
    /// Rows changed by a statement that produces no columns.
    pub rows_affected: usize,
}

impl ResultSet {
    /// Result for statements producing rows.
    pub fn rows(columns: Vec<Column>, rows: Vec<Vec<Value>>) -> Self {
        ResultSet {
            columns,
            rows,
            rows_affected: 0,
        }
    }

    /// Result for statements producing no rows (inserts, ddl, etc).
    pub fn command(rows_affected: usize) -> Self {
        ResultSet {
            columns: Vec::new(),
            rows: Vec::new(),
            rows_affected,
        }
    }

    pub fn has_columns(&self) -> bool {
        !self.columns.is_empty()
    }
}

/// Details about the session a backend connection was opened for.
#[derive(Debug, Clone)]
pub struct SessionInfo {
    pub database: String,
    pub user: Option<String>,
}

/// An engine that can open connections scoped to a database name.
#[async_trait]
pub trait Backend: Send + Sync + 'static {
    type Connection: BackendConnection;

    /// Open a connection to the named database.
    ///
    /// The name has already been validated by the protocol handler.
    async fn open(&self, info: &SessionInfo) -> Result<Self::Connection>;
}

/// An open connection to the backing engine.
#[async_trait]
pub trait BackendConnection: Send + Sync + 'static {
    type Statement: PreparedStatement;

    /// Make the catalog tables and functions queryable on this connection.
    ///
    /// Must be idempotent.
    async fn install_catalog(&self, catalog: Arc<Catalog>, info: &SessionInfo) -> Result<()>;

    /// Execute a single statement without parameters.
    async fn query(&self, sql: &str) -> Result<ResultSet>;

    /// Prepare a statement for repeated execution.
    async fn prepare(&self, sql: &str) -> Result<Self::Statement>;

    /// Close the connection.
    async fn close(self) -> Result<()>;
}

/// A prepared statement handle.
#[async_trait]
pub trait PreparedStatement: Send + Sync + 'static {
    /// Columns the statement produces, known without executing it.
    fn columns(&self) -> &[Column];

    /// Number of parameters the statement expects.
    fn param_count(&self) -> usize;

    /// Execute with the provided text parameters.
    async fn query(&self, params: &[Option<String>]) -> Result<ResultSet>;
}
