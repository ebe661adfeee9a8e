use chrono::NaiveDateTime;
use serde_json::Value as JsonValue;

/// Values that can be bound as query parameters or read back from a row.
///
/// One enum covers both directions so executor call sites do not need to
/// branch on driver types:
/// ```rust
/// use pg_steady::prelude::*;
///
/// let params = vec![
///     RowValues::Int(1),
///     RowValues::Text("alice".into()),
///     RowValues::Bool(true),
/// ];
/// # let _ = params;
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum RowValues {
    /// 64-bit signed integer
    Int(i64),
    /// 64-bit float
    Float(f64),
    /// Character data
    Text(String),
    /// Boolean
    Bool(bool),
    /// Timestamp without time zone
    Timestamp(NaiveDateTime),
    /// SQL NULL
    Null,
    /// JSON document (`json`/`jsonb`)
    JSON(JsonValue),
    /// Raw bytes (`bytea`)
    Blob(Vec<u8>),
}

impl RowValues {
    /// True for SQL `NULL`.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// The integer payload, when this is an `Int`.
    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(value) => Some(*value),
            _ => None,
        }
    }

    /// The float payload, when this is a `Float`.
    #[must_use]
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(value) => Some(*value),
            _ => None,
        }
    }

    /// Borrow the text payload, when this is a `Text`.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(value) => Some(value),
            _ => None,
        }
    }

    /// The boolean payload, when this is a `Bool`.
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(value) => Some(*value),
            _ => None,
        }
    }

    /// The timestamp payload, when this is a `Timestamp`.
    #[must_use]
    pub fn as_timestamp(&self) -> Option<NaiveDateTime> {
        match self {
            Self::Timestamp(value) => Some(*value),
            _ => None,
        }
    }

    /// Borrow the JSON payload, when this is a `JSON`.
    #[must_use]
    pub fn as_json(&self) -> Option<&JsonValue> {
        match self {
            Self::JSON(value) => Some(value),
            _ => None,
        }
    }

    /// Borrow the binary payload, when this is a `Blob`.
    #[must_use]
    pub fn as_blob(&self) -> Option<&[u8]> {
        match self {
            Self::Blob(bytes) => Some(bytes),
            _ => None,
        }
    }
}

/// A SQL statement and its parameters bundled as a single unit.
///
/// Transaction batches are slices of these; statements execute in input
/// order on one handle.
#[derive(Debug, Clone)]
pub struct QueryAndParams {
    /// The SQL text
    pub query: String,
    /// The parameters bound to the statement
    pub params: Vec<RowValues>,
}

impl QueryAndParams {
    pub fn new(query: impl Into<String>, params: Vec<RowValues>) -> Self {
        Self {
            query: query.into(),
            params,
        }
    }

    /// Shorthand for a statement with no parameters.
    pub fn without_params(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            params: Vec::new(),
        }
    }
}
