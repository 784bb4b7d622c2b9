// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! HTTP surface.
//!
//! Everything except health probes and the API docs lives under `/api/v1`.
//! The auth endpoints are public (login is rate limited per source address);
//! every other `/api/v1` route sits behind the access gate.

use std::time::Duration;

use axum::{
    http::{header, HeaderName, HeaderValue, Method},
    middleware,
    routing::{get, patch, post},
    Router,
};
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    set_header::SetResponseHeaderLayer,
    trace::TraceLayer,
};
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

use crate::{
    auth::{middleware::require_auth, rate_limit::limit_login, AuthMethod, AuthenticatedUser},
    mesh::{MeshNode, MeshRoute, MeshStatus},
    models::{
        CreatePeerRequest, LoginRequest, MessageResponse, PeerListResponse, PeerResponse,
        SettingsResponse, TokenResponse, UpdatePeerRequest, UpdateSettingsRequest,
    },
    state::AppState,
    storage::ConnectionLogEntry,
};

pub mod auth;
pub mod health;
pub mod mesh;
pub mod peers;
pub mod settings;

const CONTENT_SECURITY_POLICY: &str =
    "default-src 'self'; img-src 'self' data:; style-src 'self' 'unsafe-inline'";

pub fn router(state: AppState) -> Router {
    let auth_routes = Router::new()
        .route(
            "/auth/login",
            post(auth::login).layer(middleware::from_fn_with_state(state.clone(), limit_login)),
        )
        .route("/auth/refresh", post(auth::refresh))
        .route("/auth/logout", post(auth::logout));

    let protected_routes = Router::new()
        .route("/peers", get(peers::list_peers).post(peers::create_peer))
        .route(
            "/peers/{address}",
            patch(peers::update_peer).delete(peers::delete_peer),
        )
        .route("/peers/{address}/config", get(peers::get_peer_config))
        .route("/peers/{address}/qrcode", get(peers::get_peer_qrcode))
        .route("/peers/{address}/logs", get(peers::get_peer_logs))
        .route(
            "/settings",
            get(settings::get_settings).put(settings::update_settings),
        )
        .route("/interface/status", get(health::interface_status))
        .route("/mesh/status", get(mesh::status))
        .route("/mesh/connect", post(mesh::connect))
        .route("/mesh/disconnect", post(mesh::disconnect))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .nest("/api/v1", auth_routes.merge(protected_routes))
        .route("/health", get(health::liveness))
        .route("/health/ready", get(health::readiness))
        .with_state(state)
        .merge(SwaggerUi::new("/docs").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .layer(cors_layer())
        .layer(SetResponseHeaderLayer::if_not_present(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::if_not_present(
            header::X_FRAME_OPTIONS,
            HeaderValue::from_static("DENY"),
        ))
        .layer(SetResponseHeaderLayer::if_not_present(
            header::REFERRER_POLICY,
            HeaderValue::from_static("strict-origin-when-cross-origin"),
        ))
        .layer(SetResponseHeaderLayer::if_not_present(
            header::CONTENT_SECURITY_POLICY,
            HeaderValue::from_static(CONTENT_SECURITY_POLICY),
        ))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
}

/// Origins are mirrored with credentials allowed; the refresh cookie is
/// SameSite=Strict, which is what keeps cross-site requests out.
fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(AllowOrigin::mirror_request())
        .allow_credentials(true)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .expose_headers([
            header::CONTENT_DISPOSITION,
            HeaderName::from_static("x-request-id"),
        ])
        .max_age(Duration::from_secs(86400))
}

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT or API credential")
                    .build(),
            ),
        );
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        auth::login,
        auth::refresh,
        auth::logout,
        peers::create_peer,
        peers::list_peers,
        peers::update_peer,
        peers::delete_peer,
        peers::get_peer_config,
        peers::get_peer_qrcode,
        peers::get_peer_logs,
        settings::get_settings,
        settings::update_settings,
        health::liveness,
        health::readiness,
        health::interface_status,
        mesh::status,
        mesh::connect,
        mesh::disconnect
    ),
    components(
        schemas(
            CreatePeerRequest,
            UpdatePeerRequest,
            PeerResponse,
            PeerListResponse,
            ConnectionLogEntry,
            LoginRequest,
            TokenResponse,
            SettingsResponse,
            UpdateSettingsRequest,
            MessageResponse,
            AuthenticatedUser,
            AuthMethod,
            MeshStatus,
            MeshNode,
            MeshRoute,
            mesh::MeshConnectResponse,
            health::HealthResponse,
            health::ReadyResponse,
            health::HealthChecks,
            health::InterfaceStatusResponse
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Auth", description = "Login and token refresh"),
        (name = "Peers", description = "WireGuard peer provisioning"),
        (name = "Settings", description = "Client profile defaults and credentials"),
        (name = "Health", description = "Probes and interface status"),
        (name = "Mesh", description = "Tailscale mesh control")
    )
)]
struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::CommandOutput;
    use crate::testing::{TestApp, TEST_ADMIN, TEST_PASSWORD};
    use axum::{
        body::{to_bytes, Body},
        http::{HeaderMap, Request, StatusCode},
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;

    struct Reply {
        status: StatusCode,
        headers: HeaderMap,
        body: Vec<u8>,
    }

    impl Reply {
        fn json(&self) -> Value {
            serde_json::from_slice(&self.body).unwrap()
        }

        fn text(&self) -> String {
            String::from_utf8(self.body.clone()).unwrap()
        }

        /// `refresh_token=<value>` from the Set-Cookie header.
        fn refresh_cookie(&self) -> String {
            let set_cookie = self.headers[header::SET_COOKIE].to_str().unwrap();
            set_cookie.split(';').next().unwrap().to_string()
        }
    }

    async fn send(app: &Router, request: Request<Body>) -> Reply {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let body = to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap()
            .to_vec();
        Reply {
            status,
            headers,
            body,
        }
    }

    fn request(method: &str, uri: &str, bearer: Option<&str>, body: Option<Value>) -> Request<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = bearer {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        }
    }

    fn with_cookie(uri: &str, cookie: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::COOKIE, cookie)
            .body(Body::empty())
            .unwrap()
    }

    async fn login(app: &Router, password: &str) -> Reply {
        send(
            app,
            request(
                "POST",
                "/api/v1/auth/login",
                None,
                Some(json!({"username": TEST_ADMIN, "password": password})),
            ),
        )
        .await
    }

    async fn access_token(app: &Router) -> String {
        let reply = login(app, TEST_PASSWORD).await;
        assert_eq!(reply.status, StatusCode::OK);
        reply.json()["access_token"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn health_is_public_and_hardened() {
        let test = TestApp::new();
        let app = router(test.state.clone());

        let reply = send(&app, request("GET", "/health", None, None)).await;
        assert_eq!(reply.status, StatusCode::OK);
        assert_eq!(reply.json()["status"], "ok");
        assert_eq!(reply.headers[header::X_CONTENT_TYPE_OPTIONS], "nosniff");
        assert_eq!(reply.headers[header::X_FRAME_OPTIONS], "DENY");
        assert!(reply.headers.contains_key(header::CONTENT_SECURITY_POLICY));
        assert!(reply.headers.contains_key("x-request-id"));

        let ready = send(&app, request("GET", "/health/ready", None, None)).await;
        assert_eq!(ready.status, StatusCode::OK);
        assert_eq!(ready.json()["checks"]["storage"], "ok");
        assert_eq!(ready.json()["checks"]["interface"], "ok");
    }

    #[tokio::test]
    async fn openapi_document_is_served() {
        let app = router(TestApp::new().state.clone());
        let reply = send(&app, request("GET", "/api-doc/openapi.json", None, None)).await;
        assert_eq!(reply.status, StatusCode::OK);
        let doc = reply.json();
        assert!(doc["paths"]["/api/v1/peers"].is_object());
        assert!(doc["components"]["securitySchemes"]["bearer_auth"].is_object());
    }

    #[tokio::test]
    async fn protected_routes_reject_missing_or_bad_tokens() {
        let test = TestApp::new();
        let app = router(test.state.clone());

        let reply = send(&app, request("GET", "/api/v1/peers", None, None)).await;
        assert_eq!(reply.status, StatusCode::UNAUTHORIZED);
        assert_eq!(reply.json()["error_code"], "missing_auth_header");

        let reply = send(&app, request("GET", "/api/v1/peers", Some("garbage"), None)).await;
        assert_eq!(reply.status, StatusCode::UNAUTHORIZED);
        assert_eq!(reply.json()["error"], "Invalid or expired token");

        // 43 characters but not a known credential: same generic answer
        let fake_credential = "A".repeat(43);
        let reply = send(
            &app,
            request("GET", "/api/v1/peers", Some(&fake_credential), None),
        )
        .await;
        assert_eq!(reply.status, StatusCode::UNAUTHORIZED);
        assert_eq!(reply.json()["error"], "Invalid or expired token");
    }

    #[tokio::test]
    async fn login_sets_cookie_and_returns_stable_credential() {
        let test = TestApp::new();
        let app = router(test.state.clone());

        let first = login(&app, TEST_PASSWORD).await;
        assert_eq!(first.status, StatusCode::OK);
        let set_cookie = first.headers[header::SET_COOKIE].to_str().unwrap().to_string();
        assert!(set_cookie.starts_with("refresh_token="));
        assert!(set_cookie.contains("HttpOnly"));
        assert!(set_cookie.contains("SameSite=Strict"));
        assert!(set_cookie.contains("Path=/api/v1/auth"));

        let body = first.json();
        assert!(body.get("refresh_token").is_none());
        assert_eq!(body["token_type"], "Bearer");
        assert_eq!(body["expires_in"], 900);
        let credential = body["api_token"].as_str().unwrap().to_string();
        assert_eq!(credential.len(), 43);

        let second = login(&app, TEST_PASSWORD).await;
        assert_eq!(second.json()["api_token"], credential.as_str());

        // The credential works as a bearer value
        let reply = send(&app, request("GET", "/api/v1/peers", Some(&credential), None)).await;
        assert_eq!(reply.status, StatusCode::OK);
    }

    #[tokio::test]
    async fn wrong_password_is_rejected() {
        let test = TestApp::new();
        let app = router(test.state.clone());

        let reply = login(&app, "not-the-password").await;
        assert_eq!(reply.status, StatusCode::UNAUTHORIZED);
        assert_eq!(reply.json()["error"], "Invalid credentials");
        assert!(!reply.headers.contains_key(header::SET_COOKIE));
    }

    #[tokio::test]
    async fn sixth_login_attempt_is_rate_limited() {
        let test = TestApp::with_rate_limit(5);
        let app = router(test.state.clone());

        for _ in 0..5 {
            let reply = login(&app, "wrong-password").await;
            assert_eq!(reply.status, StatusCode::UNAUTHORIZED);
        }
        let reply = login(&app, TEST_PASSWORD).await;
        assert_eq!(reply.status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(reply.json()["error_code"], "rate_limited");
    }

    #[tokio::test]
    async fn refresh_rotates_and_rejects_reuse() {
        let test = TestApp::new();
        let app = router(test.state.clone());

        let cookie = login(&app, TEST_PASSWORD).await.refresh_cookie();

        let first = send(&app, with_cookie("/api/v1/auth/refresh", &cookie)).await;
        assert_eq!(first.status, StatusCode::OK);
        assert!(first.json()["access_token"].is_string());
        let rotated = first.refresh_cookie();
        assert_ne!(rotated, cookie);

        let reuse = send(&app, with_cookie("/api/v1/auth/refresh", &cookie)).await;
        assert_eq!(reuse.status, StatusCode::UNAUTHORIZED);
        assert_eq!(reuse.json()["error_code"], "invalid_token");

        let next = send(&app, with_cookie("/api/v1/auth/refresh", &rotated)).await;
        assert_eq!(next.status, StatusCode::OK);

        let missing = send(&app, request("POST", "/api/v1/auth/refresh", None, None)).await;
        assert_eq!(missing.status, StatusCode::UNAUTHORIZED);
        assert_eq!(missing.json()["error_code"], "missing_refresh_token");
    }

    #[tokio::test]
    async fn logout_revokes_refresh_token() {
        let test = TestApp::new();
        let app = router(test.state.clone());

        let cookie = login(&app, TEST_PASSWORD).await.refresh_cookie();
        let reply = send(&app, with_cookie("/api/v1/auth/logout", &cookie)).await;
        assert_eq!(reply.status, StatusCode::OK);
        assert!(reply.headers[header::SET_COOKIE]
            .to_str()
            .unwrap()
            .contains("Max-Age=0"));

        let refresh = send(&app, with_cookie("/api/v1/auth/refresh", &cookie)).await;
        assert_eq!(refresh.status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn peer_lifecycle() {
        let test = TestApp::new();
        let app = router(test.state.clone());
        let token = access_token(&app).await;

        let created = send(
            &app,
            request("POST", "/api/v1/peers", Some(&token), Some(json!({"name": "laptop"}))),
        )
        .await;
        assert_eq!(created.status, StatusCode::CREATED);
        let peer = created.json();
        assert_eq!(peer["assigned_ip"], "10.8.0.2");
        assert_eq!(peer["enabled"], true);
        assert!(peer.get("private_key").is_none());
        let public_key = peer["public_key"].as_str().unwrap().to_string();
        assert!(test.wg.has_peer(&public_key));

        test.wg.set_activity(
            &public_key,
            "203.0.113.9:40000",
            chrono::Utc::now().timestamp(),
            10,
            20,
        );
        let listed = send(&app, request("GET", "/api/v1/peers", Some(&token), None)).await;
        assert_eq!(listed.status, StatusCode::OK);
        let list = listed.json();
        assert_eq!(list["total"], 1);
        assert_eq!(list["online"], 1);
        assert_eq!(list["peers"][0]["endpoint"], "203.0.113.9:40000");

        let config = send(
            &app,
            request("GET", "/api/v1/peers/10.8.0.2/config", Some(&token), None),
        )
        .await;
        assert_eq!(config.status, StatusCode::OK);
        assert_eq!(
            config.headers[header::CONTENT_DISPOSITION],
            "attachment; filename=\"laptop.conf\""
        );
        assert!(config.text().contains("Address = 10.8.0.2/32"));

        let qr = send(
            &app,
            request("GET", "/api/v1/peers/10.8.0.2/qrcode", Some(&token), None),
        )
        .await;
        assert_eq!(qr.status, StatusCode::OK);
        assert_eq!(qr.headers[header::CONTENT_TYPE], "image/svg+xml");

        let disabled = send(
            &app,
            request(
                "PATCH",
                "/api/v1/peers/10.8.0.2",
                Some(&token),
                Some(json!({"enabled": false, "name": "old laptop"})),
            ),
        )
        .await;
        assert_eq!(disabled.status, StatusCode::OK);
        assert_eq!(disabled.json()["enabled"], false);
        assert_eq!(disabled.json()["name"], "old laptop");
        assert!(!test.wg.has_peer(&public_key));

        let deleted = send(
            &app,
            request("DELETE", "/api/v1/peers/10.8.0.2", Some(&token), None),
        )
        .await;
        assert_eq!(deleted.status, StatusCode::OK);

        let again = send(
            &app,
            request("DELETE", "/api/v1/peers/10.8.0.2", Some(&token), None),
        )
        .await;
        assert_eq!(again.status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn deleting_unknown_peer_makes_no_interface_call() {
        let test = TestApp::new();
        let app = router(test.state.clone());
        let token = access_token(&app).await;
        test.wg.clear_calls();

        let reply = send(
            &app,
            request("DELETE", "/api/v1/peers/10.8.0.5", Some(&token), None),
        )
        .await;
        assert_eq!(reply.status, StatusCode::NOT_FOUND);
        assert_eq!(reply.json()["error"], "Peer not found");
        assert!(test.wg.calls().is_empty());
    }

    #[tokio::test]
    async fn failed_live_add_leaves_no_peer() {
        let test = TestApp::new();
        let app = router(test.state.clone());
        let token = access_token(&app).await;
        test.wg.fail_set(true);

        let reply = send(
            &app,
            request("POST", "/api/v1/peers", Some(&token), Some(json!({"name": "phone"}))),
        )
        .await;
        assert_eq!(reply.status, StatusCode::BAD_GATEWAY);

        test.wg.fail_set(false);
        let listed = send(&app, request("GET", "/api/v1/peers", Some(&token), None)).await;
        assert_eq!(listed.json()["total"], 0);
    }

    #[tokio::test]
    async fn unsaved_delete_keeps_the_peer() {
        let test = TestApp::new();
        let app = router(test.state.clone());
        let token = access_token(&app).await;
        let created = send(
            &app,
            request("POST", "/api/v1/peers", Some(&token), Some(json!({"name": "phone"}))),
        )
        .await;
        assert_eq!(created.status, StatusCode::CREATED);
        test.wg.fail_save(true);

        let reply = send(
            &app,
            request("DELETE", "/api/v1/peers/10.8.0.2", Some(&token), None),
        )
        .await;
        assert_eq!(reply.status, StatusCode::BAD_GATEWAY);
        assert_eq!(test.wg.peer_count(), 1);

        let listed = send(&app, request("GET", "/api/v1/peers", Some(&token), None)).await;
        assert_eq!(listed.json()["total"], 1);
    }

    #[tokio::test]
    async fn malformed_address_is_a_bad_request() {
        let test = TestApp::new();
        let app = router(test.state.clone());
        let token = access_token(&app).await;

        let reply = send(
            &app,
            request("GET", "/api/v1/peers/10.8.0.999/logs", Some(&token), None),
        )
        .await;
        assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn settings_shadow_defaults_and_password_change_revokes_sessions() {
        let test = TestApp::new();
        let app = router(test.state.clone());

        let login_reply = login(&app, TEST_PASSWORD).await;
        let token = login_reply.json()["access_token"].as_str().unwrap().to_string();
        let old_credential = login_reply.json()["api_token"].as_str().unwrap().to_string();
        let cookie = login_reply.refresh_cookie();

        let current = send(&app, request("GET", "/api/v1/settings", Some(&token), None)).await;
        assert_eq!(current.json()["dns"], "1.1.1.1");
        assert_eq!(current.json()["logging_enabled"], false);
        assert_eq!(current.json()["api_token"], old_credential.as_str());

        let updated = send(
            &app,
            request(
                "PUT",
                "/api/v1/settings",
                Some(&token),
                Some(json!({
                    "dns": "9.9.9.9",
                    "logging_enabled": true,
                    "admin_password": "a-much-better-password"
                })),
            ),
        )
        .await;
        assert_eq!(updated.status, StatusCode::OK);

        let current = send(&app, request("GET", "/api/v1/settings", Some(&token), None)).await;
        assert_eq!(current.json()["dns"], "9.9.9.9");
        assert_eq!(current.json()["allowed_ips"], "0.0.0.0/0");
        assert_eq!(current.json()["logging_enabled"], true);
        assert_ne!(current.json()["api_token"], old_credential.as_str());

        let refresh = send(&app, with_cookie("/api/v1/auth/refresh", &cookie)).await;
        assert_eq!(refresh.status, StatusCode::UNAUTHORIZED);

        let stale = send(&app, request("GET", "/api/v1/peers", Some(&old_credential), None)).await;
        assert_eq!(stale.status, StatusCode::UNAUTHORIZED);

        assert_eq!(login(&app, TEST_PASSWORD).await.status, StatusCode::UNAUTHORIZED);
        assert_eq!(
            login(&app, "a-much-better-password").await.status,
            StatusCode::OK
        );
    }

    #[tokio::test]
    async fn settings_reject_multiline_values() {
        let test = TestApp::new();
        let app = router(test.state.clone());
        let token = access_token(&app).await;

        let reply = send(
            &app,
            request(
                "PUT",
                "/api/v1/settings",
                Some(&token),
                Some(json!({"dns": "1.1.1.1\nPostUp = id"})),
            ),
        )
        .await;
        assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn connection_logs_follow_logging_setting() {
        let test = TestApp::new();
        let app = router(test.state.clone());
        let token = access_token(&app).await;

        let created = send(
            &app,
            request("POST", "/api/v1/peers", Some(&token), Some(json!({"name": "tablet"}))),
        )
        .await;
        let public_key = created.json()["public_key"].as_str().unwrap().to_string();
        test.wg.set_activity(
            &public_key,
            "198.51.100.4:51000",
            chrono::Utc::now().timestamp(),
            1,
            1,
        );

        send(&app, request("GET", "/api/v1/peers", Some(&token), None)).await;
        let logs = send(
            &app,
            request("GET", "/api/v1/peers/10.8.0.2/logs", Some(&token), None),
        )
        .await;
        assert_eq!(logs.json().as_array().unwrap().len(), 0);

        send(
            &app,
            request(
                "PUT",
                "/api/v1/settings",
                Some(&token),
                Some(json!({"logging_enabled": true})),
            ),
        )
        .await;
        send(&app, request("GET", "/api/v1/peers", Some(&token), None)).await;
        send(&app, request("GET", "/api/v1/peers", Some(&token), None)).await;

        let logs = send(
            &app,
            request("GET", "/api/v1/peers/10.8.0.2/logs", Some(&token), None),
        )
        .await;
        let entries = logs.json();
        assert_eq!(entries.as_array().unwrap().len(), 1);
        assert_eq!(entries[0]["endpoint"], "198.51.100.4:51000");
    }

    #[tokio::test]
    async fn interface_status_is_protected_passthrough() {
        let test = TestApp::new();
        let app = router(test.state.clone());
        let token = access_token(&app).await;

        let reply = send(
            &app,
            request("GET", "/api/v1/interface/status", Some(&token), None),
        )
        .await;
        assert_eq!(reply.status, StatusCode::OK);
        assert_eq!(reply.json()["interface"], "wg0");
        assert!(reply.json()["output"]
            .as_str()
            .unwrap()
            .starts_with("interface: wg0"));
    }

    #[tokio::test]
    async fn mesh_endpoints() {
        let test = TestApp::new();
        let app = router(test.state.clone());
        let token = access_token(&app).await;

        test.tailscale.respond(
            "tailscale status --json",
            CommandOutput::ok(
                r#"{"BackendState": "NeedsLogin", "AuthURL": "https://login.tailscale.com/a/42", "Self": null, "Peer": null}"#,
            ),
        );
        test.tailscale
            .respond("tailscale up --accept-routes --reset", CommandOutput::ok(""));

        let status = send(&app, request("GET", "/api/v1/mesh/status", Some(&token), None)).await;
        assert_eq!(status.status, StatusCode::OK);
        assert_eq!(status.json()["backend_state"], "NeedsLogin");
        assert_eq!(status.json()["installed"], true);

        let connect = send(&app, request("POST", "/api/v1/mesh/connect", Some(&token), None)).await;
        assert_eq!(connect.status, StatusCode::OK);
        assert_eq!(connect.json()["auth_url"], "https://login.tailscale.com/a/42");
        assert_eq!(connect.json()["message"], "Please authenticate using the URL");

        test.tailscale.set_available(false);
        let disconnect = send(
            &app,
            request("POST", "/api/v1/mesh/disconnect", Some(&token), None),
        )
        .await;
        assert_eq!(disconnect.status, StatusCode::BAD_REQUEST);
    }
}
