//! Correlation identifiers for cross-service log linkage.
//!
//! Every request through the registry carries a correlation id: supplied by
//! the caller when it passes validation, freshly generated otherwise. An
//! invalid id is replaced, never rejected; the request always proceeds.

use uuid::Uuid;

/// Canonical header used on outbound requests and response echoes.
pub const CORRELATION_HEADER: &str = "X-Correlation-ID";

/// Header names accepted on inbound requests, checked in order.
pub const ACCEPTED_HEADERS: [&str; 5] = [
    "X-Correlation-ID",
    "X-Request-ID",
    "X-Trace-ID",
    "Correlation-ID",
    "Request-ID",
];

const MAX_LEN: usize = 128;

/// An opaque token linking log lines across service boundaries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorrelationId(String);

impl CorrelationId {
    /// Mint a fresh random identifier.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Use the supplied identifier when it satisfies the charset and length
    /// rules; otherwise mint a fresh one.
    pub fn accept_or_generate(supplied: Option<&str>) -> Self {
        match supplied {
            Some(value) if is_valid(value) => Self(value.to_string()),
            Some(value) => {
                tracing::warn!("Replacing invalid correlation id: {}", value);
                Self::generate()
            }
            None => Self::generate(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifiers must be 1–128 chars of `[A-Za-z0-9._-]`.
fn is_valid(value: &str) -> bool {
    !value.is_empty()
        && value.len() <= MAX_LEN
        && value
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_well_formed_ids() {
        let id = CorrelationId::accept_or_generate(Some("req-42.alpha_7"));
        assert_eq!(id.as_str(), "req-42.alpha_7");
    }

    #[test]
    fn replaces_invalid_ids() {
        for bad in ["", "has space", "percent%sign", &"x".repeat(129)] {
            let id = CorrelationId::accept_or_generate(Some(bad));
            assert_ne!(id.as_str(), bad);
            assert!(!id.as_str().is_empty());
        }
    }

    #[test]
    fn generates_when_absent() {
        let id = CorrelationId::accept_or_generate(None);
        // Generated tokens are UUIDs, which themselves pass validation.
        assert!(Uuid::parse_str(id.as_str()).is_ok());
    }

    #[test]
    fn generated_ids_are_unique() {
        assert_ne!(
            CorrelationId::generate().as_str(),
            CorrelationId::generate().as_str()
        );
    }
}
