//! Usage: Discovered OIDC endpoint set (`.well-known/openid-configuration`).

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// The provider's discovery document. Immutable once fetched; non-standard
/// keys (Ping publishes several) are retained in `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub issuer: Option<String>,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_session_endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub userinfo_endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jwks_uri: Option<String>,
    #[serde(default)]
    pub response_types_supported: Vec<String>,
    #[serde(default)]
    pub grant_types_supported: Vec<String>,
    #[serde(default)]
    pub code_challenge_methods_supported: Vec<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl Manifest {
    /// Ping advertises its logout endpoint under a vendor key; fall back to
    /// the standard one when it is absent.
    pub fn ping_end_session_endpoint(&self) -> Option<&str> {
        self.extra
            .get("ping_end_session_endpoint")
            .and_then(Value::as_str)
            .or(self.end_session_endpoint.as_deref())
    }

    /// An empty list means the document predates the PKCE metadata key.
    pub fn supports_pkce_s256(&self) -> bool {
        self.code_challenge_methods_supported.is_empty()
            || self
                .code_challenge_methods_supported
                .iter()
                .any(|m| m == "S256")
    }

    pub fn supports_refresh_token(&self) -> bool {
        self.grant_types_supported.iter().any(|g| g == "refresh_token")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DISCOVERY_DOC: &str = r#"{
        "issuer": "https://auth.example.com",
        "authorization_endpoint": "https://auth.example.com/as/authorization.oauth2",
        "token_endpoint": "https://auth.example.com/as/token.oauth2",
        "ping_end_session_endpoint": "https://auth.example.com/idp/startSLO.ping",
        "grant_types_supported": ["authorization_code", "refresh_token"],
        "code_challenge_methods_supported": ["S256", "plain"]
    }"#;

    #[test]
    fn parse_keeps_vendor_keys_in_extra() {
        let manifest: Manifest = serde_json::from_str(DISCOVERY_DOC).expect("manifest");
        assert_eq!(
            manifest.ping_end_session_endpoint(),
            Some("https://auth.example.com/idp/startSLO.ping")
        );
        assert!(manifest.end_session_endpoint.is_none());
    }

    #[test]
    fn end_session_falls_back_to_standard_key() {
        let manifest: Manifest = serde_json::from_str(
            r#"{
                "authorization_endpoint": "https://auth.example.com/authorize",
                "token_endpoint": "https://auth.example.com/token",
                "end_session_endpoint": "https://auth.example.com/logout"
            }"#,
        )
        .expect("manifest");
        assert_eq!(
            manifest.ping_end_session_endpoint(),
            Some("https://auth.example.com/logout")
        );
    }

    #[test]
    fn capability_checks_read_supported_lists() {
        let manifest: Manifest = serde_json::from_str(DISCOVERY_DOC).expect("manifest");
        assert!(manifest.supports_pkce_s256());
        assert!(manifest.supports_refresh_token());
    }

    #[test]
    fn missing_challenge_methods_defaults_to_pkce_capable() {
        let manifest: Manifest = serde_json::from_str(
            r#"{
                "authorization_endpoint": "https://auth.example.com/authorize",
                "token_endpoint": "https://auth.example.com/token"
            }"#,
        )
        .expect("manifest");
        assert!(manifest.supports_pkce_s256());
        assert!(!manifest.supports_refresh_token());
    }

    #[test]
    fn manifest_round_trips_through_json() {
        let manifest: Manifest = serde_json::from_str(DISCOVERY_DOC).expect("manifest");
        let encoded = serde_json::to_string(&manifest).expect("encode");
        let decoded: Manifest = serde_json::from_str(&encoded).expect("decode");
        assert_eq!(manifest, decoded);
    }
}
