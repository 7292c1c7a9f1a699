//! Usage: Provider adapter contract — translates generic OIDC flow steps into
//! one provider family's concrete request shapes.
//!
//! The engine holds a `&dyn ProviderAdapter` and never a concrete type, so a
//! new identity-provider family only needs a new implementation of this trait.

pub mod ping;

use crate::config::{ProviderOptions, SetupConfig};
use crate::manifest::Manifest;
use crate::session::AuthSession;
use crate::shared::error::AppResult;

/// Output of every adapter operation: a target URL plus either query/fragment
/// parameters (authorization, logout) or a form payload (token exchange).
/// Consumed immediately by the engine's HTTP layer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestDescriptor {
    pub url: String,
    pub params: Vec<(String, String)>,
    pub payload: Option<Vec<(String, String)>>,
    /// Form field the engine fills with the authorization code or refresh
    /// token before sending the payload.
    pub token_code_name: Option<&'static str>,
}

impl RequestDescriptor {
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn payload_field(&self, name: &str) -> Option<&str> {
        self.payload
            .as_ref()?
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Overwrite a payload field in place, appending it when absent.
    pub fn set_payload_field(&mut self, name: &str, value: impl Into<String>) {
        let payload = self.payload.get_or_insert_with(Vec::new);
        let value = value.into();
        match payload.iter_mut().find(|(k, _)| k == name) {
            Some((_, existing)) => *existing = value,
            None => payload.push((name.to_string(), value)),
        }
    }
}

pub trait ProviderAdapter: Send + Sync {
    /// Stable key identifying the provider family (e.g. "ping").
    fn provider_key(&self) -> &'static str;

    /// Build the authorization request for the current attempt, generating
    /// PKCE key material if this attempt has none yet.
    fn authorize_request(
        &self,
        manifest: &Manifest,
        options: &ProviderOptions,
        config: &SetupConfig,
    ) -> AppResult<RequestDescriptor>;

    /// Build the token-exchange request using the same attempt's key material.
    fn token_request(
        &self,
        manifest: &Manifest,
        options: &ProviderOptions,
        config: &SetupConfig,
    ) -> AppResult<RequestDescriptor>;

    /// Re-derive the token request from the session's stored provenance and
    /// retarget it at the refresh grant.
    fn refresh_token_request(&self, session: Option<&AuthSession>) -> AppResult<RequestDescriptor>;

    /// Build the end-session request from the session's stored provenance.
    fn logout_request(&self, session: Option<&AuthSession>) -> AppResult<RequestDescriptor>;

    /// Drop the attempt's key material so the next authorization request
    /// starts from fresh keys. Called at every attempt boundary.
    fn reset_attempt(&self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_payload_field_overwrites_existing_entry() {
        let mut descriptor = RequestDescriptor {
            url: "https://example.com/token".to_string(),
            params: vec![],
            payload: Some(vec![(
                "grant_type".to_string(),
                "authorization_code".to_string(),
            )]),
            token_code_name: Some("code"),
        };
        descriptor.set_payload_field("grant_type", "refresh_token");
        assert_eq!(descriptor.payload_field("grant_type"), Some("refresh_token"));
        assert_eq!(descriptor.payload.as_ref().map(Vec::len), Some(1));
    }

    #[test]
    fn set_payload_field_creates_payload_when_missing() {
        let mut descriptor = RequestDescriptor::default();
        descriptor.set_payload_field("grant_type", "refresh_token");
        assert_eq!(descriptor.payload_field("grant_type"), Some("refresh_token"));
    }
}
