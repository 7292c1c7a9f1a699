//! Usage: Public fixture builders shared by unit and integration tests.

use crate::config::{
    AndroidBrowserOptions, FlowKind, IosBrowserOptions, Platform, ProviderOptions, SetupConfig,
    WebFlowOptions,
};
use crate::manifest::Manifest;
use crate::session::{AuthSession, SessionProvenance};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use std::collections::BTreeMap;

pub fn sample_manifest() -> Manifest {
    let mut extra = BTreeMap::new();
    extra.insert(
        "ping_end_session_endpoint".to_string(),
        serde_json::Value::String("https://auth.example.com/idp/startSLO.ping".to_string()),
    );
    Manifest {
        issuer: Some("https://auth.example.com".to_string()),
        authorization_endpoint: "https://auth.example.com/as/authorization.oauth2".to_string(),
        token_endpoint: "https://auth.example.com/as/token.oauth2".to_string(),
        end_session_endpoint: None,
        userinfo_endpoint: None,
        jwks_uri: None,
        response_types_supported: vec!["code".to_string()],
        grant_types_supported: vec!["authorization_code".to_string(), "refresh_token".to_string()],
        code_challenge_methods_supported: vec!["S256".to_string()],
        extra,
    }
}

pub fn sample_options() -> ProviderOptions {
    ProviderOptions {
        client_id: "conference-app".to_string(),
        redirect_uri: "http://localhost:8100/auth/callback".to_string(),
        scope: "openid profile email".to_string(),
        logout_url: "https://app.example.com/login".to_string(),
        discovery_url: "https://auth.example.com/.well-known/openid-configuration".to_string(),
        audience: None,
    }
}

pub fn pkce_setup() -> SetupConfig {
    SetupConfig {
        platform: Platform::Web,
        log_level: None,
        ios: IosBrowserOptions::default(),
        android: AndroidBrowserOptions::default(),
        web: WebFlowOptions {
            ui_mode: "current".to_string(),
            auth_flow: FlowKind::Pkce,
        },
    }
}

pub fn implicit_setup() -> SetupConfig {
    SetupConfig {
        platform: Platform::Web,
        log_level: None,
        ios: IosBrowserOptions::default(),
        android: AndroidBrowserOptions::default(),
        web: WebFlowOptions {
            ui_mode: "current".to_string(),
            auth_flow: FlowKind::Implicit,
        },
    }
}

/// Unsigned JWT carrying the given claims; good enough for decode-only paths.
pub fn make_jwt(claims: &serde_json::Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(claims.to_string().as_bytes());
    format!("{header}.{payload}.sig")
}

pub fn sample_session() -> AuthSession {
    let id_token = make_jwt(&serde_json::json!({ "sub": "user-1", "aud": "conference-app" }));
    AuthSession {
        id_token: Some(id_token),
        access_token: "access-token-1".to_string(),
        refresh_token: Some("refresh-token-1".to_string()),
        token_type: Some("Bearer".to_string()),
        scope: Some("openid profile email".to_string()),
        expires_at: Some(4_102_444_800),
        provider: SessionProvenance {
            manifest: sample_manifest(),
            options: sample_options(),
            config: pkce_setup(),
        },
    }
}
