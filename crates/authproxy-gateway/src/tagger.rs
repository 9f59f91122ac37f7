//! Derives `_security` query-parameter values from the resolved bearer
//! token and strips caller-supplied ones; filters request headers to the
//! inbound allow-list.

use authproxy_storage::Token;

const INBOUND_HEADER_ALLOW_LIST: &[&str] = &["Accept", "Origin"];

/// Rewrites the outbound query string and header set for a proxied FHIR
/// request.
#[derive(Debug, Clone, Copy, Default)]
pub struct SecurityTagger;

impl SecurityTagger {
    /// Strips every inbound `_security` parameter, then — for a type-level
    /// search (exactly one path segment) — appends the two derived
    /// `_security` values.
    #[must_use]
    pub fn prepare_query(
        &self,
        path: &str,
        incoming: &[(String, String)],
        token: Option<&Token>,
    ) -> Vec<(String, String)> {
        let mut out: Vec<(String, String)> = incoming
            .iter()
            .filter(|(name, _)| name != "_security")
            .cloned()
            .collect();

        if Self::is_type_level_search(path) {
            match token {
                Some(token) => {
                    let labels = token
                        .security_labels
                        .iter()
                        .cloned()
                        .collect::<Vec<_>>()
                        .join(",");
                    out.push(("_security".to_string(), format!("public,{labels}")));
                    if let Some(patient_id) = &token.patient_id {
                        out.push(("_security".to_string(), format!("Patient/{patient_id}")));
                    }
                }
                None => out.push(("_security".to_string(), "public".to_string())),
            }
        }

        out
    }

    /// Retains only headers on the inbound allow-list (`Accept`, `Origin`),
    /// matched case-insensitively.
    #[must_use]
    pub fn filter_headers(&self, headers: &[(String, String)]) -> Vec<(String, String)> {
        headers
            .iter()
            .filter(|(name, _)| {
                INBOUND_HEADER_ALLOW_LIST
                    .iter()
                    .any(|allowed| allowed.eq_ignore_ascii_case(name))
            })
            .cloned()
            .collect()
    }

    fn is_type_level_search(path: &str) -> bool {
        path.trim_matches('/').split('/').filter(|s| !s.is_empty()).count() == 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use time::OffsetDateTime;
    use uuid::Uuid;

    fn token(security_labels: &[&str], patient_id: Option<&str>) -> Token {
        Token {
            id: Uuid::new_v4(),
            client_id: "c1".into(),
            user_id: 1,
            patient_id: patient_id.map(str::to_string),
            token_type: "bearer".into(),
            access_token: Some("at".into()),
            refresh_token: Some("rt".into()),
            scopes: BTreeSet::new(),
            security_labels: security_labels.iter().map(|s| (*s).to_string()).collect(),
            expires: Some(OffsetDateTime::now_utc()),
            approval_expires: OffsetDateTime::now_utc(),
            created_at: OffsetDateTime::now_utc(),
        }
    }

    #[test]
    fn strips_inbound_security_params() {
        let tagger = SecurityTagger;
        let incoming = vec![("_security".to_string(), "forged".to_string())];
        let out = tagger.prepare_query("Observation/1/sub", &incoming, None);
        assert!(out.is_empty());
    }

    #[test]
    fn type_level_search_without_token_gets_public_only() {
        let tagger = SecurityTagger;
        let out = tagger.prepare_query("Observation", &[], None);
        assert_eq!(out, vec![("_security".to_string(), "public".to_string())]);
    }

    #[test]
    fn type_level_search_with_token_gets_labels_and_patient() {
        let tagger = SecurityTagger;
        let t = token(&["medications"], Some("smart-1"));
        let out = tagger.prepare_query("Observation", &[("category".to_string(), "vital-signs".to_string())], Some(&t));
        assert_eq!(
            out,
            vec![
                ("category".to_string(), "vital-signs".to_string()),
                ("_security".to_string(), "public,medications".to_string()),
                ("_security".to_string(), "Patient/smart-1".to_string()),
            ]
        );
    }

    #[test]
    fn read_by_id_gets_no_security_tagging() {
        let tagger = SecurityTagger;
        let t = token(&["medications"], Some("smart-1"));
        let out = tagger.prepare_query("Observation/42", &[], Some(&t));
        assert!(out.is_empty());
    }

    #[test]
    fn header_filter_is_case_insensitive_and_drops_everything_else() {
        let tagger = SecurityTagger;
        let headers = vec![
            ("accept".to_string(), "application/json".to_string()),
            ("Authorization".to_string(), "Bearer x".to_string()),
            ("Origin".to_string(), "https://app".to_string()),
        ];
        let out = tagger.filter_headers(&headers);
        assert_eq!(out.len(), 2);
        assert!(out.iter().any(|(k, _)| k == "accept"));
        assert!(out.iter().any(|(k, _)| k == "Origin"));
    }
}
