//! Usage: Authenticated-session bundle (tokens plus the configuration that produced them).

use crate::config::{ProviderOptions, SetupConfig};
use crate::manifest::Manifest;
use crate::shared::error::AppResult;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    Id,
    Access,
    Refresh,
}

/// Everything that was in effect when the session was obtained. Refresh and
/// logout re-derive their requests from this rather than from live
/// configuration, so a session stays self-describing once persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionProvenance {
    pub manifest: Manifest,
    pub options: ProviderOptions,
    pub config: SetupConfig,
}

/// Result of a completed token exchange or refresh. At most one session is
/// current at a time; the vault holds the durable copy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthSession {
    pub id_token: Option<String>,
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub token_type: Option<String>,
    pub scope: Option<String>,
    /// Absolute unix seconds; `None` when the provider omitted `expires_in`.
    pub expires_at: Option<i64>,
    pub provider: SessionProvenance,
}

impl AuthSession {
    pub fn token(&self, kind: TokenKind) -> Option<&str> {
        let raw = match kind {
            TokenKind::Id => self.id_token.as_deref(),
            TokenKind::Access => Some(self.access_token.as_str()),
            TokenKind::Refresh => self.refresh_token.as_deref(),
        };
        raw.map(str::trim).filter(|v| !v.is_empty())
    }
}

/// Decode a JWT payload segment without verifying the signature. Claims come
/// back as loose JSON; signature validation is the provider's concern, not
/// this layer's.
pub fn decode_jwt_claims(token: &str) -> AppResult<Value> {
    let payload = token
        .split('.')
        .nth(1)
        .ok_or_else(|| "SEC_INVALID_INPUT: token is not a JWT".to_string())?;

    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim())
        .map_err(|e| format!("SEC_INVALID_INPUT: token payload is not base64url: {e}"))?;

    serde_json::from_slice(&bytes)
        .map_err(|e| format!("SEC_INVALID_INPUT: token payload is not json: {e}").into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{make_jwt, sample_session};

    #[test]
    fn token_accessor_trims_and_drops_blank_values() {
        let mut session = sample_session();
        session.refresh_token = Some("  ".to_string());
        assert_eq!(session.token(TokenKind::Refresh), None);
        assert_eq!(session.token(TokenKind::Access), Some("access-token-1"));
    }

    #[test]
    fn decode_jwt_claims_reads_payload_segment() {
        let token = make_jwt(&serde_json::json!({ "sub": "user-1", "aud": "conference-app" }));
        let claims = decode_jwt_claims(&token).expect("claims");
        assert_eq!(claims["sub"], "user-1");
        assert_eq!(claims["aud"], "conference-app");
    }

    #[test]
    fn decode_jwt_claims_rejects_non_jwt_input() {
        let err = decode_jwt_claims("not-a-jwt").expect_err("should fail");
        assert_eq!(err.code(), "SEC_INVALID_INPUT");
    }

    #[test]
    fn session_round_trips_through_json() {
        let session = sample_session();
        let encoded = serde_json::to_string(&session).expect("encode");
        let decoded: AuthSession = serde_json::from_str(&encoded).expect("decode");
        assert_eq!(session, decoded);
    }
}
