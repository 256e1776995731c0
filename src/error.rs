use std::error::Error as StdError;

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ErrorCategory {
    /// Any failure that cannot be confidently attributed to any other error
    /// category in this enum.
    ///
    /// In particular this means that use of Internal is never a guarantee
    /// the error is not, for example due to a user error - merely that it
    /// cannot be confidently determined by the code.
    Internal,

    /// The caller provided invalid input or requested an operation that is
    /// unsupported or impossible to complete in the current state.
    User,
}

/// Fine-grained condition flags for consumers that want to branch on error kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ErrorKind {
    /// The engine module (or its detached signature) could not be retrieved.
    Fetch,
    /// The engine module failed signature verification, or could not be
    /// verified at all.
    Integrity,
    /// A verified engine module could not be turned into a usable engine.
    Instantiation,
    /// A hash was requested before the engine finished instantiating.
    NotReady,
    /// The hashing primitive returned a non-success code. See
    /// [`HostError::primitive_code`].
    Primitive,
    /// Base64 input contained symbols outside the standard alphabet.
    InvalidEncoding,
    /// An encoded hash string could not be parsed.
    InvalidHash,
    /// An engine load was abandoned before instantiation completed.
    Cancelled,
    /// Loader configuration was missing or malformed.
    Config,
    /// Interaction with the filesystem or other I/O failed.
    Io,
    /// Unexpected state reached within host logic.
    InternalInvariant,
}

#[derive(Debug, Error)]
#[error("{msg}")]
pub struct HostError {
    /// Broad error category, always provided.
    pub category: ErrorCategory,
    /// Optional specific condition tag for consumers that need to
    /// branch their behavior. Any code consuming errors MUST handle
    /// the absence of a defined kind.
    pub kind: Option<ErrorKind>,
    code: Option<i32>,
    #[source]
    source: Option<Box<dyn StdError + Send + Sync + 'static>>,
    msg: String,
}

impl HostError {
    /// Creates a new error that also tags the failure with a kind.
    pub fn with_kind(category: ErrorCategory, kind: ErrorKind, msg: impl Into<String>) -> Self {
        Self {
            category,
            kind: Some(kind),
            code: None,
            source: None,
            msg: msg.into(),
        }
    }

    /// Creates a new error that carries both a kind tag and the originating source error.
    pub fn with_kind_and_source(
        category: ErrorCategory,
        kind: ErrorKind,
        msg: impl Into<String>,
        source: impl StdError + Send + Sync + 'static,
    ) -> Self {
        Self {
            category,
            kind: Some(kind),
            code: None,
            source: Some(Box::new(source)),
            msg: msg.into(),
        }
    }

    /// Creates a primitive failure carrying the primitive's numeric return
    /// code and, when the primitive exposes one, its own description.
    pub fn primitive(code: i32, description: Option<String>) -> Self {
        let msg = match description {
            Some(text) => format!("hashing primitive failed with code {}: {}", code, text),
            None => format!("hashing primitive failed with code {}", code),
        };
        Self {
            category: ErrorCategory::User,
            kind: Some(ErrorKind::Primitive),
            code: Some(code),
            source: None,
            msg,
        }
    }

    /// The user-facing message carried by the error.
    pub fn message(&self) -> &str {
        &self.msg
    }

    /// Numeric return code of the hashing primitive, for [`ErrorKind::Primitive`] errors.
    pub fn primitive_code(&self) -> Option<i32> {
        self.code
    }

    /// Returns the preserved source error if present.
    pub fn source_error(&self) -> Option<&(dyn StdError + Send + Sync + 'static)> {
        self.source.as_deref()
    }

    /// Wraps the current error with a higher-level message while preserving the original as source.
    pub fn with_context(self, msg: impl Into<String>) -> Self {
        let category = self.category;
        let kind = self.kind;
        let code = self.code;
        Self {
            category,
            kind,
            code,
            source: Some(Box::new(self)),
            msg: msg.into(),
        }
    }
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, HostError>;
