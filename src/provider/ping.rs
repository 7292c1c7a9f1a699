//! Usage: Ping identity-provider adapter (authorization-code + PKCE, implicit fallback).
//!
//! Specializations:
//! - `state` mirrors the `nonce`, binding the response to the request
//! - Logout uses `TargetResource`/`id_token_hint` rather than the standard
//!   `post_logout_redirect_uri`
//! - The logout endpoint may be published as `ping_end_session_endpoint`

use crate::config::{ProviderOptions, SetupConfig};
use crate::manifest::Manifest;
use crate::pkce::{generate_pkce_pair, generate_state_nonce, PkcePair};
use crate::provider::{ProviderAdapter, RequestDescriptor};
use crate::session::{AuthSession, TokenKind};
use crate::shared::error::AppResult;
use crate::shared::mutex_ext::MutexExt;
use std::sync::Mutex;

/// Key material for one authorization attempt. The verifier sent with the
/// token request must match the challenge from the authorization request of
/// the same attempt, so the pair lives here rather than per-request.
#[derive(Debug, Clone)]
struct AttemptKeys {
    pkce: PkcePair,
    nonce: String,
}

pub struct PingAdapter {
    attempt: Mutex<Option<AttemptKeys>>,
}

impl PingAdapter {
    pub fn new() -> Self {
        Self {
            attempt: Mutex::new(None),
        }
    }

    /// Generate-if-absent: every operation of one attempt sees the same keys.
    fn ensure_attempt(&self) -> AttemptKeys {
        let mut slot = self.attempt.lock_or_recover();
        slot.get_or_insert_with(|| AttemptKeys {
            pkce: generate_pkce_pair(),
            nonce: generate_state_nonce(),
        })
        .clone()
    }
}

impl Default for PingAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl ProviderAdapter for PingAdapter {
    fn provider_key(&self) -> &'static str {
        "ping"
    }

    fn authorize_request(
        &self,
        manifest: &Manifest,
        options: &ProviderOptions,
        config: &SetupConfig,
    ) -> AppResult<RequestDescriptor> {
        options.validate()?;
        let keys = self.ensure_attempt();

        let mut params: Vec<(String, String)> = vec![
            ("client_id".to_string(), options.client_id.clone()),
            ("redirect_uri".to_string(), options.redirect_uri.clone()),
            ("scope".to_string(), options.scope.clone()),
            ("nonce".to_string(), keys.nonce.clone()),
            ("state".to_string(), keys.nonce.clone()),
        ];

        if config.use_pkce() {
            params.push(("code_challenge_method".to_string(), "S256".to_string()));
            params.push(("code_challenge".to_string(), keys.pkce.code_challenge));
            params.push(("response_type".to_string(), "code".to_string()));
        } else {
            params.push(("response_type".to_string(), "id_token token".to_string()));
            params.push(("response_mode".to_string(), "fragment".to_string()));
        }

        Ok(RequestDescriptor {
            url: manifest.authorization_endpoint.clone(),
            params,
            payload: None,
            token_code_name: None,
        })
    }

    fn token_request(
        &self,
        manifest: &Manifest,
        options: &ProviderOptions,
        config: &SetupConfig,
    ) -> AppResult<RequestDescriptor> {
        let keys = self.ensure_attempt();

        let url = manifest.token_endpoint.clone();

        if !config.use_pkce() {
            // Implicit flow delivers tokens in the redirect fragment; there
            // is nothing to post to the token endpoint.
            return Ok(RequestDescriptor {
                url,
                ..RequestDescriptor::default()
            });
        }

        let payload: Vec<(String, String)> = vec![
            ("grant_type".to_string(), "authorization_code".to_string()),
            ("client_id".to_string(), options.client_id.clone()),
            ("code_verifier".to_string(), keys.pkce.code_verifier),
            ("redirect_uri".to_string(), options.redirect_uri.clone()),
            ("scope".to_string(), options.scope.clone()),
        ];

        Ok(RequestDescriptor {
            url,
            params: vec![],
            payload: Some(payload),
            token_code_name: Some("code"),
        })
    }

    fn refresh_token_request(&self, session: Option<&AuthSession>) -> AppResult<RequestDescriptor> {
        let session = session
            .ok_or_else(|| "SEC_INVALID_INPUT: a session is required to refresh".to_string())?;

        let mut info = self.token_request(
            &session.provider.manifest,
            &session.provider.options,
            &session.provider.config,
        )?;

        if session.provider.config.use_pkce() {
            info.set_payload_field("grant_type", "refresh_token");
            info.token_code_name = Some("refresh_token");
        }

        Ok(info)
    }

    fn logout_request(&self, session: Option<&AuthSession>) -> AppResult<RequestDescriptor> {
        let session = session
            .ok_or_else(|| "SEC_INVALID_INPUT: a session is required to log out".to_string())?;

        let url = session
            .provider
            .manifest
            .ping_end_session_endpoint()
            .ok_or_else(|| "SYSTEM_ERROR: manifest has no end-session endpoint".to_string())?
            .to_string();

        let token = session
            .token(TokenKind::Id)
            .ok_or_else(|| "AUTH_MISSING_TOKEN: could not get id token from session".to_string())?
            .to_string();

        let params = vec![
            (
                "TargetResource".to_string(),
                session.provider.options.logout_url.clone(),
            ),
            ("id_token_hint".to_string(), token),
        ];

        Ok(RequestDescriptor {
            url,
            params,
            payload: None,
            token_code_name: None,
        })
    }

    fn reset_attempt(&self) {
        *self.attempt.lock_or_recover() = None;
    }
}
