//! Error types for the proxy pipeline.

use thiserror::Error;

/// The one-of-three shape a [`crate::guard::RequestGuard`] rejection
/// carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ForbiddenPart {
    /// The first path segment is not an allow-listed FHIR resource type.
    Segment(String),
    /// A query parameter name is not allow-listed.
    Parameter(String),
    /// The HTTP method is not allow-listed (only `GET` is).
    Method(String),
}

impl ForbiddenPart {
    /// The human-readable noun phrase used in the rendered error message:
    /// `resource type`, `parameter`, or `method`.
    #[must_use]
    pub fn noun(&self) -> &'static str {
        match self {
            Self::Segment(_) => "resource type",
            Self::Parameter(_) => "parameter",
            Self::Method(_) => "method",
        }
    }

    /// The offending value itself.
    #[must_use]
    pub fn value(&self) -> &str {
        match self {
            Self::Segment(v) | Self::Parameter(v) | Self::Method(v) => v,
        }
    }
}

/// Errors raised by the gateway components.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// A [`crate::guard::RequestGuard`] rejection.
    #[error("Not allowed to query for \"{}\" {}.", .0.value(), .0.noun())]
    Forbidden(ForbiddenPart),

    /// The upstream did not respond within the configured deadline.
    #[error("upstream request timed out")]
    UpstreamTimeout,

    /// The upstream connection failed (DNS, TCP, TLS).
    #[error("upstream transport error: {0}")]
    UpstreamTransport(String),

    /// The upstream's capability statement did not have the expected
    /// `rest` shape.
    #[error("malformed capability statement: {0}")]
    MalformedConformance(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forbidden_parameter_message_matches_spec_wording() {
        let err = GatewayError::Forbidden(ForbiddenPart::Parameter("bad".to_string()));
        assert_eq!(err.to_string(), "Not allowed to query for \"bad\" parameter.");
    }

    #[test]
    fn forbidden_segment_message_uses_resource_type_noun() {
        let err = GatewayError::Forbidden(ForbiddenPart::Segment("Foo".to_string()));
        assert_eq!(err.to_string(), "Not allowed to query for \"Foo\" resource type.");
    }

    #[test]
    fn forbidden_method_message_uses_method_noun() {
        let err = GatewayError::Forbidden(ForbiddenPart::Method("POST".to_string()));
        assert_eq!(err.to_string(), "Not allowed to query for \"POST\" method.");
    }
}
