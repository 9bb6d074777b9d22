use std::fmt;

/// Boxed error returned by user capabilities and custom converters.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Error kind for scalar conversions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Parse,
    Range,
    Type,
    Capability,
}

/// Conversion error returned by the scalar primitives and leaf assignments.
#[derive(Debug)]
pub struct ConvertError {
    pub kind: ErrorKind,
    pub message: String,
}

impl ConvertError {
    pub fn parse(msg: impl Into<String>) -> Self {
        Self { kind: ErrorKind::Parse, message: msg.into() }
    }

    pub fn range(msg: impl Into<String>) -> Self {
        Self { kind: ErrorKind::Range, message: msg.into() }
    }

    pub fn type_mismatch(msg: impl Into<String>) -> Self {
        Self { kind: ErrorKind::Type, message: msg.into() }
    }

    pub fn capability(msg: impl Into<String>) -> Self {
        Self { kind: ErrorKind::Capability, message: msg.into() }
    }

    /// Add context to the error, preserving the original ErrorKind.
    ///
    /// Produces: `"context: original message"`.
    pub fn with_context(self, ctx: impl fmt::Display) -> Self {
        Self {
            kind: self.kind,
            message: format!("{ctx}: {}", self.message),
        }
    }
}

impl fmt::Display for ConvertError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

impl std::error::Error for ConvertError {}

// ---------------------------------------------------------------------------
// From impls: standard error types → ConvertError with correct ErrorKind
// ---------------------------------------------------------------------------

impl From<std::num::ParseIntError> for ConvertError {
    fn from(e: std::num::ParseIntError) -> Self {
        Self::parse(e.to_string())
    }
}

impl From<std::num::ParseFloatError> for ConvertError {
    fn from(e: std::num::ParseFloatError) -> Self {
        Self::parse(e.to_string())
    }
}

impl From<serde_json::Error> for ConvertError {
    fn from(e: serde_json::Error) -> Self {
        Self::parse(e.to_string())
    }
}

impl From<BoxError> for ConvertError {
    fn from(e: BoxError) -> Self {
        Self::capability(e.to_string())
    }
}

/// Errors surfaced by a binding call.
///
/// A failure inside a nested struct field is returned as the nested call
/// produced it; only unattributed `Convert` errors pick up a field name on
/// the way out.
#[derive(Debug, thiserror::Error)]
pub enum BindError {
    #[error("invalid destination: {0}")]
    InvalidDestination(String),

    #[error("struct '{0}' has no bindable fields")]
    EmptyStructFields(&'static str),

    #[error("cannot bind a {0} source into a struct: expected a key/value mapping")]
    UnnormalizableSource(&'static str),

    #[error("error binding value to field '{field}': {source}")]
    Field { field: String, source: ConvertError },

    #[error("custom converter {from} -> {to} failed: {source}")]
    CustomConverter {
        from: &'static str,
        to: &'static str,
        source: BoxError,
    },

    #[error(transparent)]
    Convert(#[from] ConvertError),
}

impl BindError {
    pub fn field(field: impl Into<String>, source: ConvertError) -> Self {
        BindError::Field { field: field.into(), source }
    }

    /// Attribute an unattributed conversion error to `field`.
    ///
    /// Every other variant is returned unchanged.
    pub fn in_field(self, field: &str) -> Self {
        match self {
            BindError::Convert(source) => BindError::field(field, source),
            other => other,
        }
    }
}
