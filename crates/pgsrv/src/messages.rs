use crate::backend::Value;
use std::collections::HashMap;
use std::fmt;

/// Version number (v3.0) used during normal frontend startup.
pub const VERSION_V3: i32 = 0x30000;
/// Version number used to request a cancellation.
pub const VERSION_CANCEL: i32 = (1234 << 16) + 5678;
/// Version number used to request an SSL connection.
pub const VERSION_SSL: i32 = (1234 << 16) + 5679;
/// Version number used to request a GSSAPI encrypted connection.
pub const VERSION_GSSENC: i32 = (1234 << 16) + 5680;

/// Oid for the `text` type. Every column is described with it.
pub const TEXT_OID: i32 = 25;

/// Messages sent by the frontend before a session is established.
#[derive(Debug)]
pub enum StartupMessage {
    StartupRequest {
        version: i32,
        params: HashMap<String, String>,
    },
    SSLRequest {
        version: i32,
    },
    GssEncRequest {
        version: i32,
    },
    CancelRequest {
        version: i32,
    },
}

/// Messages sent by the frontend once the session is serving queries.
#[derive(Debug)]
pub enum FrontendMessage {
    /// A query (or queries) to execute.
    Query { sql: String },
    /// Parse a single statement for later binding.
    Parse {
        name: String,
        sql: String,
        param_types: Vec<i32>,
    },
    /// Bind parameters to a parsed statement.
    Bind {
        portal: String,
        statement: String,
        param_formats: Vec<i16>,
        param_values: Vec<Option<Vec<u8>>>,
        result_formats: Vec<i16>,
    },
    Describe {
        object_type: DescribeObjectType,
        name: String,
    },
    Execute { portal: String, max_rows: i32 },
    /// Close a statement or portal. Shares the target byte with Describe.
    Close {
        object_type: DescribeObjectType,
        name: String,
    },
    Sync,
    Flush,
    Terminate,
}

impl FrontendMessage {
    /// Short name of the message, used in errors and logs.
    pub fn name(&self) -> &'static str {
        match self {
            FrontendMessage::Query { .. } => "Query",
            FrontendMessage::Parse { .. } => "Parse",
            FrontendMessage::Bind { .. } => "Bind",
            FrontendMessage::Describe { .. } => "Describe",
            FrontendMessage::Execute { .. } => "Execute",
            FrontendMessage::Close { .. } => "Close",
            FrontendMessage::Sync => "Sync",
            FrontendMessage::Flush => "Flush",
            FrontendMessage::Terminate => "Terminate",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescribeObjectType {
    Statement,
    Portal,
}

impl TryFrom<u8> for DescribeObjectType {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            b'S' => Ok(DescribeObjectType::Statement),
            b'P' => Ok(DescribeObjectType::Portal),
            other => Err(other),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionStatus {
    Idle,
    InBlock,
    Failed,
}

#[derive(Debug)]
pub enum BackendMessage {
    ErrorResponse(ErrorResponse),
    AuthenticationOk,
    EmptyQueryResponse,
    ParameterStatus { key: String, val: String },
    ReadyForQuery(TransactionStatus),
    CommandComplete { tag: String },
    RowDescription(Vec<FieldDescription>),
    DataRow(Vec<Value>),
    ParameterDescription(Vec<i32>),
    ParseComplete,
    BindComplete,
    CloseComplete,
    NoData,
}

impl From<ErrorResponse> for BackendMessage {
    fn from(err: ErrorResponse) -> Self {
        BackendMessage::ErrorResponse(err)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    Error,
    Fatal,
}

impl ErrorSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorSeverity::Error => "ERROR",
            ErrorSeverity::Fatal => "FATAL",
        }
    }
}

/// A subset of Postgres error codes.
///
/// See <https://www.postgresql.org/docs/current/errcodes-appendix.html>.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlState {
    ProtocolViolation,
    IntegrityConstraintViolation,
    InvalidCatalogName,
    SyntaxErrorOrAccessRuleViolation,
    UndefinedObject,
    InternalError,
}

impl SqlState {
    pub fn as_code_str(&self) -> &'static str {
        match self {
            SqlState::ProtocolViolation => "08P01",
            SqlState::IntegrityConstraintViolation => "23000",
            SqlState::InvalidCatalogName => "3D000",
            SqlState::SyntaxErrorOrAccessRuleViolation => "42000",
            SqlState::UndefinedObject => "42704",
            SqlState::InternalError => "XX000",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ErrorResponse {
    pub severity: ErrorSeverity,
    pub code: SqlState,
    pub message: String,
}

impl ErrorResponse {
    pub fn error(code: SqlState, msg: impl Into<String>) -> ErrorResponse {
        ErrorResponse {
            severity: ErrorSeverity::Error,
            code,
            message: msg.into(),
        }
    }

    pub fn fatal(code: SqlState, msg: impl Into<String>) -> ErrorResponse {
        ErrorResponse {
            severity: ErrorSeverity::Fatal,
            code,
            message: msg.into(),
        }
    }

    pub fn fatal_internal(msg: impl Into<String>) -> ErrorResponse {
        Self::fatal(SqlState::InternalError, msg)
    }
}

impl fmt::Display for ErrorResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}): {}",
            self.severity.as_str(),
            self.code.as_code_str(),
            self.message
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDescription {
    pub name: String,
    pub table_id: i32,
    pub col_id: i16,
    pub obj_id: i32,
    pub type_size: i16,
    pub type_mod: i32,
    pub format: i16,
}

impl FieldDescription {
    /// Describe a column by name only. The column is reported as a variable
    /// length `text` column in text format.
    pub fn new_named(name: impl Into<String>) -> FieldDescription {
        FieldDescription {
            name: name.into(),
            table_id: 0,
            col_id: 0,
            obj_id: TEXT_OID,
            type_size: -1,
            type_mod: -1,
            format: 0,
        }
    }
}
