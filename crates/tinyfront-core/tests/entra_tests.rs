//! Entra provider tests against a mock OpenID provider that signs its id
//! tokens with a fixture RSA key.

mod common;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Form, Json, Router};
use chrono::{Duration, Utc};
use openidconnect::core::{CoreJsonWebKeySet, CoreJwsSigningAlgorithm, CoreRsaPrivateSigningKey};
use openidconnect::{
    AccessToken, Audience, EndUserName, EndUserUsername, IssuerUrl, JsonWebKeyId, LocalizedClaim,
    Nonce, PkceCodeChallenge, PkceCodeVerifier, PrivateSigningKey, StandardClaims,
    SubjectIdentifier,
};
use serde_json::json;

use common::{RecordingNavigator, API_SCOPE};
use tinyfront_core::auth::{
    AuthError, AuthorizationRequest, EntraClaims, EntraIdToken, EntraIdTokenClaims,
    EntraProvider, GateEvent, IdentityProvider, MemorySecretStore, RedirectOutcome, SecretStore,
    SessionGate, SessionStore,
};

const TENANT_PATH: &str = "/tenant-9/v2.0";
const TOKEN_PATH: &str = "/tenant-9/oauth2/v2.0/token";
const AUTHORIZE_PATH: &str = "/tenant-9/oauth2/v2.0/authorize";
const JWKS_PATH: &str = "/tenant-9/discovery/v2.0/keys";
const CLIENT_ID: &str = "front-id";
const SIGNING_KEY_PEM: &str = include_str!("fixtures/idp_signing_key.pem");

/// Ways the mock provider can get its id tokens wrong.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
enum IdTokenFault {
    #[default]
    None,
    WrongAudience,
    BadSignature,
    /// `at_hash` computed over a different access token
    AccessTokenSwapped,
}

#[derive(Clone)]
struct MockIdp {
    base: String,
    key: Arc<CoreRsaPrivateSigningKey>,
    nonce: Arc<Mutex<Option<String>>>,
    fault: Arc<Mutex<IdTokenFault>>,
    forms: Arc<Mutex<Vec<HashMap<String, String>>>>,
}

impl MockIdp {
    fn form(&self, index: usize) -> HashMap<String, String> {
        self.forms.lock().unwrap()[index].clone()
    }

    fn issuer(&self) -> String {
        format!("{}{}", self.base, TENANT_PATH)
    }

    fn set_fault(&self, fault: IdTokenFault) {
        *self.fault.lock().unwrap() = fault;
    }

    fn sign(&self, oid: &str, audience: &str, nonce: Option<&str>, access_token: &str) -> String {
        let mut name = LocalizedClaim::new();
        name.insert(None, EndUserName::new("Grace Hopper".to_string()));
        let standard = StandardClaims::new(SubjectIdentifier::new(format!("pairwise-{}", oid)))
            .set_name(Some(name))
            .set_preferred_username(Some(EndUserUsername::new(
                "grace@example.com".to_string(),
            )));
        let claims = EntraIdTokenClaims::new(
            IssuerUrl::new(self.issuer()).unwrap(),
            vec![Audience::new(audience.to_string())],
            Utc::now() + Duration::hours(1),
            Utc::now(),
            standard,
            EntraClaims {
                oid: Some(oid.to_string()),
                tid: Some("tid-9".to_string()),
            },
        )
        .set_nonce(nonce.map(|n| Nonce::new(n.to_string())));

        EntraIdToken::new(
            claims,
            self.key.as_ref(),
            CoreJwsSigningAlgorithm::RsaSsaPkcs1V15Sha256,
            Some(&AccessToken::new(access_token.to_string())),
            None,
        )
        .unwrap()
        .to_string()
    }

    /// An id token for `access_token`, damaged according to the fault.
    fn id_token(&self, nonce: Option<&str>, access_token: &str) -> String {
        match *self.fault.lock().unwrap() {
            IdTokenFault::None => self.sign("oid-9", CLIENT_ID, nonce, access_token),
            IdTokenFault::WrongAudience => self.sign("oid-9", "some-other-app", nonce, access_token),
            IdTokenFault::AccessTokenSwapped => {
                self.sign("oid-9", CLIENT_ID, nonce, "a-different-token")
            }
            IdTokenFault::BadSignature => {
                // Claims of one token under the signature of another
                let genuine = self.sign("oid-9", CLIENT_ID, nonce, access_token);
                let forged = self.sign("oid-admin", CLIENT_ID, nonce, access_token);
                let signature = genuine.rsplit('.').next().unwrap();
                let unsigned = forged.rsplit_once('.').unwrap().0;
                format!("{}.{}", unsigned, signature)
            }
        }
    }
}

fn oauth_error(status: StatusCode, code: &str, description: &str) -> Response {
    (
        status,
        Json(json!({ "error": code, "error_description": description })),
    )
        .into_response()
}

async fn discovery(State(idp): State<MockIdp>) -> Response {
    Json(json!({
        "issuer": idp.issuer(),
        "authorization_endpoint": format!("{}{}", idp.base, AUTHORIZE_PATH),
        "token_endpoint": format!("{}{}", idp.base, TOKEN_PATH),
        "jwks_uri": format!("{}{}", idp.base, JWKS_PATH),
        "response_types_supported": ["code", "id_token", "code id_token"],
        "response_modes_supported": ["query", "fragment", "form_post"],
        "subject_types_supported": ["pairwise"],
        "id_token_signing_alg_values_supported": ["RS256"],
        "scopes_supported": ["openid", "profile", "email", "offline_access"],
    }))
    .into_response()
}

async fn jwks(State(idp): State<MockIdp>) -> Response {
    Json(CoreJsonWebKeySet::new(vec![idp.key.as_verification_key()])).into_response()
}

async fn token(
    State(idp): State<MockIdp>,
    Form(form): Form<HashMap<String, String>>,
) -> Response {
    idp.forms.lock().unwrap().push(form.clone());

    match form.get("grant_type").map(String::as_str) {
        Some("authorization_code") => {
            let nonce = idp.nonce.lock().unwrap().clone();
            Json(json!({
                "token_type": "Bearer",
                "access_token": "at-code",
                "expires_in": 3599,
                "refresh_token": "rt-code",
                "id_token": idp.id_token(nonce.as_deref(), "at-code"),
            }))
            .into_response()
        }
        Some("refresh_token") => match form.get("refresh_token").map(String::as_str) {
            Some("rt-revoked") => oauth_error(
                StatusCode::BAD_REQUEST,
                "invalid_grant",
                "AADSTS50173: The provided grant has expired due to it being revoked.",
            ),
            Some("rt-broken") => {
                (StatusCode::BAD_GATEWAY, "<html>upstream down</html>").into_response()
            }
            Some("rt-forever") => Json(json!({
                "token_type": "Bearer",
                "access_token": "at-forever",
                "expires_in": i64::MAX,
            }))
            .into_response(),
            // Refreshed id tokens carry no nonce
            _ => Json(json!({
                "token_type": "Bearer",
                "access_token": "at-refreshed",
                "expires_in": 3600,
                "refresh_token": "rt-rotated",
                "id_token": idp.id_token(None, "at-refreshed"),
            }))
            .into_response(),
        },
        _ => oauth_error(
            StatusCode::BAD_REQUEST,
            "unsupported_grant_type",
            "grant type not supported",
        ),
    }
}

async fn spawn_idp() -> (EntraProvider, MockIdp) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());

    let key = CoreRsaPrivateSigningKey::from_pem(
        SIGNING_KEY_PEM,
        Some(JsonWebKeyId::new("test-key".to_string())),
    )
    .unwrap();
    let idp = MockIdp {
        base: base.clone(),
        key: Arc::new(key),
        nonce: Arc::default(),
        fault: Arc::default(),
        forms: Arc::default(),
    };

    let router = Router::new()
        .route(
            &format!("{}/.well-known/openid-configuration", TENANT_PATH),
            get(discovery),
        )
        .route(JWKS_PATH, get(jwks))
        .route(TOKEN_PATH, post(token))
        .with_state(idp.clone());
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    let provider =
        EntraProvider::with_issuer(CLIENT_ID, &idp.issuer(), "http://localhost:5173").unwrap();
    (provider, idp)
}

fn gate_for(
    provider: EntraProvider,
    dir: &tempfile::TempDir,
) -> (
    SessionGate<EntraProvider>,
    Arc<RecordingNavigator>,
    Arc<MemorySecretStore>,
) {
    let navigator = Arc::new(RecordingNavigator::default());
    let secrets = Arc::new(MemorySecretStore::new());
    let gate = SessionGate::new(
        provider,
        SessionStore::new(dir.path().to_path_buf()),
        secrets.clone(),
        navigator.clone(),
    );
    (gate, navigator, secrets)
}

/// Log in through `gate` and feed the resulting callback back in, with the
/// mock provider issuing id tokens for the requested nonce.
async fn log_in(
    gate: &SessionGate<EntraProvider>,
    navigator: &RecordingNavigator,
    idp: &MockIdp,
) -> Option<RedirectOutcome> {
    gate.initialize(None).await.unwrap();
    gate.login().await.unwrap();
    *idp.nonce.lock().unwrap() = navigator.last_param("nonce");
    let state = navigator.last_param("state").unwrap();

    let callback = format!(
        "http://localhost:5173/?code=the-code&state={}&session_state=abc",
        state
    );
    gate.initialize(Some(&callback)).await.unwrap()
}

#[tokio::test]
async fn test_authorization_url_uses_discovered_endpoint() {
    let (provider, idp) = spawn_idp().await;
    let scopes = vec![
        "User.Read".to_string(),
        "openid".to_string(),
        "offline_access".to_string(),
    ];

    let redirect = provider
        .authorization_url(&AuthorizationRequest {
            scopes: &scopes,
            login_hint: Some("grace@example.com"),
        })
        .await
        .unwrap();

    let url = redirect.url.as_str();
    assert!(url.starts_with(&format!("{}{}", idp.base, AUTHORIZE_PATH)));
    let params: HashMap<String, String> = redirect.url.query_pairs().into_owned().collect();
    assert_eq!(params["client_id"], CLIENT_ID);
    assert_eq!(params["response_type"], "code");
    assert_eq!(params["response_mode"], "query");
    assert_eq!(params["redirect_uri"], "http://localhost:5173");
    assert_eq!(params["scope"], "openid User.Read offline_access");
    assert_eq!(params["login_hint"], "grace@example.com");
    assert_eq!(params["state"], redirect.state);
    assert_eq!(params["nonce"], redirect.nonce);
    assert_eq!(params["code_challenge_method"], "S256");
    let expected = PkceCodeChallenge::from_code_verifier_sha256(&PkceCodeVerifier::new(
        redirect.code_verifier.clone(),
    ));
    assert_eq!(params["code_challenge"], expected.as_str());

    // Each request gets fresh one-time values
    let again = provider
        .authorization_url(&AuthorizationRequest {
            scopes: &scopes,
            login_hint: None,
        })
        .await
        .unwrap();
    assert_ne!(again.state, redirect.state);
    assert_ne!(again.nonce, redirect.nonce);
    assert_ne!(again.code_verifier, redirect.code_verifier);
}

#[tokio::test]
async fn test_discovery_failure_is_reported() {
    let (_provider, idp) = spawn_idp().await;
    let provider = EntraProvider::with_issuer(
        CLIENT_ID,
        &format!("{}/unknown-tenant/v2.0", idp.base),
        "http://localhost:5173",
    )
    .unwrap();

    let err = provider
        .refresh("rt-1", &[API_SCOPE.to_string()])
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::Discovery(_)));
    assert!(!err.requires_interaction());
}

#[tokio::test]
async fn test_redeem_code_posts_pkce_verifier() {
    let (provider, idp) = spawn_idp().await;
    *idp.nonce.lock().unwrap() = Some("nonce-1".to_string());
    let scopes = vec!["User.Read".to_string(), "openid".to_string()];

    let grant = provider
        .redeem_code("code-1", "verifier-1", "nonce-1", &scopes)
        .await
        .unwrap();

    assert_eq!(grant.access_token, "at-code");
    assert_eq!(grant.refresh_token.as_deref(), Some("rt-code"));
    let account = grant.account.unwrap();
    assert_eq!(account.home_account_id, "oid-9.tid-9");
    assert_eq!(account.name.as_deref(), Some("Grace Hopper"));
    let remaining = grant.expires_at - Utc::now();
    assert!(remaining > Duration::minutes(55));

    let form = idp.form(0);
    assert_eq!(form["grant_type"], "authorization_code");
    assert_eq!(form["client_id"], CLIENT_ID);
    assert_eq!(form["code"], "code-1");
    assert_eq!(form["code_verifier"], "verifier-1");
    assert_eq!(form["redirect_uri"], "http://localhost:5173");
    assert_eq!(form["scope"], "User.Read openid");
}

#[tokio::test]
async fn test_refresh_rejection_requires_interaction() {
    let (provider, idp) = spawn_idp().await;

    let err = provider
        .refresh("rt-revoked", &[API_SCOPE.to_string()])
        .await
        .unwrap_err();

    match &err {
        AuthError::Oauth { code, description } => {
            assert_eq!(code, "invalid_grant");
            assert!(description.starts_with("AADSTS50173"));
        }
        other => panic!("unexpected error {:?}", other),
    }
    assert!(err.requires_interaction());
    assert_eq!(idp.form(0)["refresh_token"], "rt-revoked");
}

#[tokio::test]
async fn test_non_json_error_is_invalid_response() {
    let (provider, _idp) = spawn_idp().await;

    let err = provider
        .refresh("rt-broken", &[API_SCOPE.to_string()])
        .await
        .unwrap_err();

    match &err {
        AuthError::InvalidResponse(msg) => assert!(msg.contains("upstream down")),
        other => panic!("unexpected error {:?}", other),
    }
    assert!(!err.requires_interaction());
}

#[tokio::test]
async fn test_unrepresentable_lifetime_is_invalid_response() {
    let (provider, _idp) = spawn_idp().await;

    let err = provider
        .refresh("rt-forever", &[API_SCOPE.to_string()])
        .await
        .unwrap_err();

    match &err {
        AuthError::InvalidResponse(msg) => assert!(msg.contains("out of range")),
        other => panic!("unexpected error {:?}", other),
    }
}

#[tokio::test]
async fn test_sign_in_and_silent_refresh_end_to_end() {
    let (provider, idp) = spawn_idp().await;
    let dir = tempfile::tempdir().unwrap();
    let (gate, navigator, secrets) = gate_for(provider, &dir);

    let account = match log_in(&gate, &navigator, &idp).await {
        Some(RedirectOutcome::LoggedIn(account)) => account,
        other => panic!("expected login outcome, got {:?}", other),
    };
    assert_eq!(account.home_account_id, "oid-9.tid-9");
    assert_eq!(account.first_name(), "Grace");

    let redeem = idp.form(0);
    assert_eq!(redeem["code"], "the-code");
    let challenge = navigator.last_param("code_challenge").unwrap();
    let expected = PkceCodeChallenge::from_code_verifier_sha256(&PkceCodeVerifier::new(
        redeem["code_verifier"].clone(),
    ));
    assert_eq!(expected.as_str(), &challenge);
    assert_eq!(redeem["scope"], "User.Read openid profile offline_access");
    assert_eq!(secrets.get("oid-9.tid-9").unwrap().as_deref(), Some("rt-code"));

    let token = gate.acquire_token(API_SCOPE).await.unwrap();
    assert_eq!(token.secret(), "at-refreshed");
    let refresh = idp.form(1);
    assert_eq!(refresh["grant_type"], "refresh_token");
    assert_eq!(refresh["refresh_token"], "rt-code");
    assert_eq!(
        refresh["scope"],
        "api://back-id/access_as_user openid profile offline_access"
    );
    assert_eq!(secrets.get("oid-9.tid-9").unwrap().as_deref(), Some("rt-rotated"));
    assert_eq!(navigator.count(), 1);
}

#[tokio::test]
async fn test_callback_with_wrong_nonce_is_rejected() {
    let (provider, idp) = spawn_idp().await;
    let dir = tempfile::tempdir().unwrap();
    let (gate, navigator, secrets) = gate_for(provider, &dir);

    gate.initialize(None).await.unwrap();
    gate.login().await.unwrap();
    *idp.nonce.lock().unwrap() = Some("replayed-nonce".to_string());
    let state = navigator.last_param("state").unwrap();

    let callback = format!("http://localhost:5173/?code=the-code&state={}", state);
    let outcome = gate.initialize(Some(&callback)).await.unwrap();

    assert!(outcome.is_none());
    assert!(!gate.is_authenticated().await);
    assert!(secrets.get("oid-9.tid-9").unwrap().is_none());
}

#[tokio::test]
async fn test_forged_id_tokens_are_rejected() {
    for fault in [
        IdTokenFault::BadSignature,
        IdTokenFault::WrongAudience,
        IdTokenFault::AccessTokenSwapped,
    ] {
        let (provider, idp) = spawn_idp().await;
        idp.set_fault(fault);
        let dir = tempfile::tempdir().unwrap();
        let (gate, navigator, secrets) = gate_for(provider, &dir);
        let mut events = gate.subscribe();

        let outcome = log_in(&gate, &navigator, &idp).await;

        assert!(outcome.is_none(), "{:?} was accepted", fault);
        assert!(!gate.is_authenticated().await);
        assert!(secrets.get("oid-9.tid-9").unwrap().is_none());
        assert!(secrets.get("oid-admin.tid-9").unwrap().is_none());
        let failure = std::iter::from_fn(|| events.try_recv().ok()).find_map(|event| match event {
            GateEvent::LoginFailure(reason) => Some(reason),
            _ => None,
        });
        assert!(
            failure.is_some_and(|reason| reason.contains("id token")),
            "{:?} did not fail id token validation",
            fault
        );
    }
}

#[tokio::test]
async fn test_refreshed_id_token_is_still_verified() {
    let (provider, idp) = spawn_idp().await;
    let dir = tempfile::tempdir().unwrap();
    let (gate, navigator, _secrets) = gate_for(provider, &dir);
    assert!(log_in(&gate, &navigator, &idp).await.is_some());

    idp.set_fault(IdTokenFault::WrongAudience);
    let result = gate.acquire_token(API_SCOPE).await;

    // Not an interaction error, so no redirect
    assert!(result.is_err());
    assert_eq!(navigator.count(), 1);
}
