//! Error kinds shared by storage services, controllers and the HTTP boundary.
//!
//! Validation and lookup failures carry a message and keep their kind when a
//! controller adds context, so the HTTP layer can always map them to the
//! right status. Driver failures are carried as [`anyhow::Error`] and surface
//! verbatim.

/// Result type for storage and controller operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors with a kind the callers must distinguish.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// Entity failed semantic validation.
    #[error("invalid entity: {0}")]
    InvalidEntity(String),

    /// Connection failed validation.
    #[error("invalid connection: {0}")]
    InvalidConnection(String),

    /// User failed validation.
    #[error("invalid user: {0}")]
    InvalidUser(String),

    /// Device failed validation.
    #[error("invalid device: {0}")]
    InvalidDevice(String),

    /// Attachment of an object failed validation.
    #[error("invalid attachment: {0}")]
    InvalidAttachment(String),

    /// Namespace is not a valid tenant identifier.
    #[error("invalid namespace: {0}")]
    InvalidNamespace(String),

    /// Required entity is absent.
    #[error("not found: {0}")]
    NotFound(String),

    /// Tables of a namespace do not exist yet.
    #[error("namespace not found: {0}")]
    NamespaceNotFound(String),

    /// A referenced entity does not exist in the namespace.
    #[error("missing reference: {0}")]
    MissingReference(String),

    /// Bad or missing credentials.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Request quota exhausted.
    #[error("limit exceeded: {0}")]
    LimitExceeded(String),

    /// Storage or transport failure.
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

impl Error {
    /// Create a not found error.
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    /// Create an invalid entity error.
    pub fn invalid(reason: impl Into<String>) -> Self {
        Self::InvalidEntity(reason.into())
    }

    /// Create an unauthorized error.
    pub fn unauthorized(reason: impl Into<String>) -> Self {
        Self::Unauthorized(reason.into())
    }

    /// Prefix the message with `ctx` while keeping the error kind.
    #[must_use]
    pub fn context(self, ctx: impl std::fmt::Display) -> Self {
        let wrap = |msg: String| format!("{ctx}: {msg}");
        match self {
            Self::InvalidEntity(m) => Self::InvalidEntity(wrap(m)),
            Self::InvalidConnection(m) => Self::InvalidConnection(wrap(m)),
            Self::InvalidUser(m) => Self::InvalidUser(wrap(m)),
            Self::InvalidDevice(m) => Self::InvalidDevice(wrap(m)),
            Self::InvalidAttachment(m) => Self::InvalidAttachment(wrap(m)),
            Self::InvalidNamespace(m) => Self::InvalidNamespace(wrap(m)),
            Self::NotFound(m) => Self::NotFound(wrap(m)),
            Self::NamespaceNotFound(m) => Self::NamespaceNotFound(wrap(m)),
            Self::MissingReference(m) => Self::MissingReference(wrap(m)),
            Self::Unauthorized(m) => Self::Unauthorized(wrap(m)),
            Self::LimitExceeded(m) => Self::LimitExceeded(wrap(m)),
            Self::Storage(e) => Self::Storage(e.context(ctx.to_string())),
        }
    }

    /// Returns true for the not found kind.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Returns true for any of the validation kinds.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::InvalidEntity(_)
                | Self::InvalidConnection(_)
                | Self::InvalidUser(_)
                | Self::InvalidDevice(_)
                | Self::InvalidAttachment(_)
                | Self::InvalidNamespace(_)
        )
    }

    /// Get the appropriate HTTP status code for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            _ if self.is_validation() => 400,
            Self::NotFound(_) | Self::NamespaceNotFound(_) | Self::MissingReference(_) => 404,
            Self::Unauthorized(_) => 401,
            Self::LimitExceeded(_) => 429,
            _ => 500,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Storage(err.into())
    }
}
