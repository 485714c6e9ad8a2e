//! Error types for the Stripe service.
//!
//! Every failure surfaced to callers is a [`StripeServiceError`]. Local
//! precondition violations get their own variants; anything that went wrong on
//! the remote side is wrapped in a [`GatewayError`] carrying the operation
//! name, the gateway's message and, where available, the underlying cause.

use std::fmt;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, StripeServiceError>;

/// The single error type returned by every service operation.
#[derive(Debug, thiserror::Error)]
pub enum StripeServiceError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("A customer with email '{email}' already exists")]
    DuplicateEmail { email: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Expected at most one {entity} for {key}, found {count}")]
    AmbiguousResult {
        entity: &'static str,
        key: String,
        count: usize,
    },

    #[error("Plan '{plan_id}' does not exist")]
    InvalidPlan { plan_id: String },

    #[error("Coupon '{coupon_id}' does not exist")]
    InvalidCoupon {
        coupon_id: String,
        #[source]
        source: Option<GatewayError>,
    },

    #[error("Customer '{customer_id}' has no payment source on file")]
    NoPaymentSource { customer_id: String },

    #[error("Internal inconsistency: {0}")]
    InternalInconsistency(String),

    #[error("Invalid configuration: {0}")]
    Configuration(String),

    #[error(transparent)]
    Gateway(#[from] GatewayError),
}

/// Discriminant of a [`StripeServiceError`], for callers that only care about
/// the category of failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidArgument,
    DuplicateEmail,
    NotFound,
    AmbiguousResult,
    InvalidPlan,
    InvalidCoupon,
    NoPaymentSource,
    InternalInconsistency,
    Configuration,
    Gateway,
}

impl StripeServiceError {
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::InternalInconsistency(msg.into())
    }

    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn ambiguous(entity: &'static str, key: impl Into<String>, count: usize) -> Self {
        Self::AmbiguousResult {
            entity,
            key: key.into(),
            count,
        }
    }

    /// The category of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidArgument(_) => ErrorKind::InvalidArgument,
            Self::DuplicateEmail { .. } => ErrorKind::DuplicateEmail,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::AmbiguousResult { .. } => ErrorKind::AmbiguousResult,
            Self::InvalidPlan { .. } => ErrorKind::InvalidPlan,
            Self::InvalidCoupon { .. } => ErrorKind::InvalidCoupon,
            Self::NoPaymentSource { .. } => ErrorKind::NoPaymentSource,
            Self::InternalInconsistency(_) => ErrorKind::InternalInconsistency,
            Self::Configuration(_) => ErrorKind::Configuration,
            Self::Gateway(_) => ErrorKind::Gateway,
        }
    }

    /// The wrapped remote failure, if this error came from the gateway.
    #[must_use]
    pub fn gateway_error(&self) -> Option<&GatewayError> {
        match self {
            Self::Gateway(err) => Some(err),
            Self::InvalidCoupon { source, .. } => source.as_ref(),
            _ => None,
        }
    }
}

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// A failed call against the remote gateway.
///
/// Network failures, authentication problems, rate limiting and server errors
/// all end up here. The HTTP status is kept so callers implementing their own
/// retry policy can classify the failure.
#[derive(Debug)]
pub struct GatewayError {
    /// The gateway operation that failed (e.g. `"create_customer"`).
    pub operation: String,
    /// Message reported by the gateway or transport.
    pub message: String,
    /// Gateway-specific error code, if any (e.g. `"resource_missing"`).
    pub code: Option<String>,
    /// HTTP status of the failed request, if one was received.
    pub http_status: Option<u16>,
    source: Option<BoxError>,
}

impl GatewayError {
    pub fn new(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            message: message.into(),
            code: None,
            http_status: None,
            source: None,
        }
    }

    #[must_use]
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    #[must_use]
    pub fn with_status(mut self, status: u16) -> Self {
        self.http_status = Some(status);
        self
    }

    #[must_use]
    pub fn with_source(mut self, source: impl Into<BoxError>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Whether the gateway reported that the addressed resource does not exist.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        self.http_status == Some(404) || self.code.as_deref() == Some("resource_missing")
    }

    /// Check if this is a client error (4xx).
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        matches!(self.http_status, Some(400..=499))
    }

    /// Check if this is a server error (5xx) or a failure without a response.
    #[must_use]
    pub fn is_server_error(&self) -> bool {
        matches!(self.http_status, Some(500..=599) | None)
    }

    /// Rate limits (429), timeouts (408) and server errors (5xx) are worth
    /// retrying. This crate never retries on its own.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self.http_status, Some(408) | Some(429) | Some(500..=599))
    }
}

impl fmt::Display for GatewayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Stripe API error during '{}': {}", self.operation, self.message)?;
        if let Some(ref code) = self.code {
            write!(f, " (code: {})", code)?;
        }
        if let Some(status) = self.http_status {
            write!(f, " [HTTP {}]", status)?;
        }
        Ok(())
    }
}

impl std::error::Error for GatewayError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}
