//! Allow-list enforcement on method, resource type, and query parameters
//! for proxied FHIR requests.

use crate::error::{ForbiddenPart, GatewayError};

const ALLOWED_METHODS: &[&str] = &["GET"];

const ALLOWED_QUERY_PARAMS: &[&str] = &[
    "_count",
    "_format",
    "_lastUpdated",
    "category",
    "patient",
    "_security",
    "beneficiary",
];

const ALLOWED_RESOURCE_TYPES: &[&str] = &[
    "metadata",
    "AllergyIntolerance",
    "Binary",
    "Condition",
    "Coverage",
    "DocumentReference",
    "Encounter",
    "ExplanationOfBenefit",
    "Immunization",
    "MedicationAdministration",
    "MedicationDispense",
    "MedicationStatement",
    "MedicationRequest",
    "Observation",
    "Patient",
    "Practitioner",
    "Procedure",
];

/// Rejects proxied FHIR requests that fall outside the method, resource
/// type, and query-parameter allow-lists.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestGuard;

impl RequestGuard {
    /// Checks `method`, the first segment of `path`, and every name in
    /// `query_param_names` against the allow-lists, in that order (method
    /// first, so a disallowed method is reported even if the path is also
    /// bad).
    ///
    /// # Errors
    /// [`GatewayError::Forbidden`] carrying exactly one of
    /// `{segment, parameter, method}` on the first violation found.
    pub fn check<'a>(
        &self,
        method: &str,
        path: &str,
        query_param_names: impl IntoIterator<Item = &'a str>,
    ) -> Result<(), GatewayError> {
        if !ALLOWED_METHODS.contains(&method) {
            return Err(GatewayError::Forbidden(ForbiddenPart::Method(
                method.to_string(),
            )));
        }

        let first_segment = path.trim_start_matches('/').split('/').next().unwrap_or("");
        if !ALLOWED_RESOURCE_TYPES.contains(&first_segment) {
            return Err(GatewayError::Forbidden(ForbiddenPart::Segment(
                first_segment.to_string(),
            )));
        }

        for name in query_param_names {
            if !ALLOWED_QUERY_PARAMS.contains(&name) {
                return Err(GatewayError::Forbidden(ForbiddenPart::Parameter(
                    name.to_string(),
                )));
            }
        }

        Ok(())
    }
}
