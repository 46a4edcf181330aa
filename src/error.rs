//! Error taxonomy for stage resolution, composition and the proxy pipeline.

use std::fmt;

use crate::core::notice_bus::SubscriptionToken;
use crate::usd::path::PrimPath;

/// Errors surfaced by the stage holder and notice listener.
///
/// None of these cross the compute boundary: the proxy node records them
/// as its status and keeps answering queries.
#[derive(Debug, Clone, PartialEq)]
pub enum ProxyError {
    /// Path unresolvable or unreadable. The proxy shows as empty.
    InvalidAsset { path: String, reason: String },
    /// Requested prim missing from the composed stage. Recoverable: the
    /// pseudo-root is used instead.
    PrimNotFound { path: PrimPath },
    /// The asset resolved but the stage could not be composed. Last known
    /// good stage data is retained.
    CompositionError(String),
    /// A notice reached a listener through a subscription it no longer owns.
    StaleSubscription { token: SubscriptionToken },
}

impl ProxyError {
    /// Whether the proxy can keep presenting a usable stage.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, ProxyError::PrimNotFound { .. })
    }
}

impl fmt::Display for ProxyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProxyError::InvalidAsset { path, reason } => write!(f, "Invalid asset '{}': {}", path, reason),
            ProxyError::PrimNotFound { path } => write!(f, "Prim not found: {}", path),
            ProxyError::CompositionError(e) => write!(f, "Composition error: {}", e),
            ProxyError::StaleSubscription { token } => write!(f, "Notice delivered through stale subscription {}", token),
        }
    }
}

impl std::error::Error for ProxyError {}

/// Asset resolution failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    NotFound(String),
    PermissionDenied(String),
    Io(String),
}

impl fmt::Display for ResolveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolveError::NotFound(p) => write!(f, "Not found: {}", p),
            ResolveError::PermissionDenied(p) => write!(f, "Permission denied: {}", p),
            ResolveError::Io(e) => write!(f, "I/O error: {}", e),
        }
    }
}

impl std::error::Error for ResolveError {}

impl ResolveError {
    pub fn into_invalid_asset(self, path: &str) -> ProxyError {
        ProxyError::InvalidAsset {
            path: path.to_string(),
            reason: self.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let e = ResolveError::NotFound("a.json".into()).into_invalid_asset("a.json");
        assert_eq!(e.to_string(), "Invalid asset 'a.json': Not found: a.json");
        assert!(!e.is_recoverable());
        assert!(ProxyError::PrimNotFound { path: PrimPath::root() }.is_recoverable());
    }
}
