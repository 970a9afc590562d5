use std::net::SocketAddr;

use axum::Router;
use tower_cookies::CookieManagerLayer;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::accounts;
use crate::state::AppState;

pub fn build_app(state: AppState) -> Router {
    let routes = accounts::router(&state);
    let routes = match state.config.route_version.as_deref() {
        Some(version) => Router::new().nest(&format!("/{}", version.trim_matches('/')), routes),
        None => routes,
    };

    routes
        .with_state(state)
        .layer(CookieManagerLayer::new())
        .layer(CorsLayer::permissive())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &axum::http::Request<_>| {
                    let method = req.method().clone();
                    let uri = req.uri().clone();
                    tracing::info_span!(
                        "http_request",
                        %method,
                        uri = %uri,
                        status = tracing::field::Empty
                    )
                })
                .on_response(
                    |res: &axum::http::Response<_>,
                     _latency: std::time::Duration,
                     span: &tracing::Span| {
                        let status = res.status();
                        span.record("status", tracing::field::display(status));
                        if status.is_server_error() {
                            tracing::error!(%status, "response");
                        } else {
                            tracing::info!(%status, "response");
                        }
                    },
                ),
        )
}

pub async fn serve(app: Router) -> anyhow::Result<()> {
    let addr: SocketAddr = format!(
        "{}:{}",
        std::env::var("APP_HOST").unwrap_or_else(|_| "0.0.0.0".into()),
        std::env::var("APP_PORT").unwrap_or_else(|_| "8080".into())
    )
    .parse()?;

    tracing::info!("listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    // Remote address is needed by the broker allow-list.
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        body::Body,
        http::{
            header::{CONTENT_TYPE, COOKIE, SET_COOKIE, USER_AGENT},
            Method, Request, StatusCode,
        },
        response::Response,
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use super::*;
    use crate::accounts::memory::testing::FlakyStore;
    use crate::accounts::repo::UserStore;
    use crate::accounts::repo_types::{Fields, UserField};
    use crate::broker::testing::RecordingPublisher;
    use crate::error::msg;

    fn json_request(method: Method, uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(CONTENT_TYPE, "application/json")
            .header(USER_AGENT, "msgbroker")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn read(resp: Response) -> Value {
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn signup_body() -> Value {
        json!({
            "name": "Vatsal",
            "email": "vatsal@gmail.com",
            "password": "Abcde@123",
            "registration_date": "15-11-2022 00:00:00"
        })
    }

    fn login_body(password: &str) -> Value {
        json!({ "email": "vatsal@gmail.com", "password": password })
    }

    async fn register(app: &Router) -> Response {
        app.clone()
            .oneshot(json_request(Method::POST, "/register", signup_body()))
            .await
            .unwrap()
    }

    async fn login(app: &Router, password: &str) -> Response {
        app.clone()
            .oneshot(json_request(Method::POST, "/login", login_body(password)))
            .await
            .unwrap()
    }

    async fn activate(app: &Router, st: &AppState) {
        let users = st.store.get(&Fields::new()).await.unwrap();
        let resp = app
            .clone()
            .oneshot(json_request(Method::PUT, "/activate", json!({ "user_id": users[0].id })))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn signup_on_empty_store() {
        let st = AppState::fake();
        let app = build_app(st.clone());

        let resp = register(&app).await;
        assert_eq!(resp.status(), StatusCode::CREATED);
        let body = read(resp).await;
        assert_eq!(body["message"], msg::SUCCESS);
        assert_eq!(body["data"], msg::ACTIVATION_IN_PROGRESS);

        let users = st
            .store
            .get(&Fields::new().with(UserField::Email, "vatsal@gmail.com"))
            .await
            .unwrap();
        assert_eq!(users.len(), 1);
        assert!(!users[0].active);

        let again = register(&app).await;
        assert_eq!(again.status(), StatusCode::BAD_REQUEST);
        assert_eq!(read(again).await["message"], msg::EMAIL_EXISTS);
    }

    #[tokio::test]
    async fn login_while_pending_is_accepted_without_cookie() {
        let app = build_app(AppState::fake());
        register(&app).await;

        let resp = login(&app, "Abcde@123").await;
        assert_eq!(resp.status(), StatusCode::ACCEPTED);
        assert!(resp.headers().get(SET_COOKIE).is_none());
        assert_eq!(read(resp).await["data"], msg::ACTIVATION_IN_PROGRESS);
    }

    #[tokio::test]
    async fn activated_login_sets_cookie_and_counts_one_device() {
        let st = AppState::fake();
        let app = build_app(st.clone());
        register(&app).await;
        activate(&app, &st).await;

        let resp = login(&app, "Abcde@123").await;
        assert_eq!(resp.status(), StatusCode::OK);
        let cookie = resp
            .headers()
            .get(SET_COOKIE)
            .and_then(|v| v.to_str().ok())
            .unwrap()
            .to_string();
        assert!(cookie.starts_with("token="));
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.contains("SameSite=Lax"));
        assert!(cookie.contains("Max-Age=300"));

        let users = st.store.get(&Fields::new()).await.unwrap();
        assert_eq!(users[0].active_devices, 1);

        let token = cookie.split(';').next().unwrap();
        let resp = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/user")
                    .header(COOKIE, token)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = read(resp).await;
        assert_eq!(body["data"]["name"], "Vatsal");
        assert_eq!(body["data"]["email"], "vat****@gmail.com");
        assert!(body["data"]["lastLogin"].is_string());
    }

    #[tokio::test]
    async fn wrong_password_leaves_device_count() {
        let st = AppState::fake();
        let app = build_app(st.clone());
        register(&app).await;
        activate(&app, &st).await;

        let resp = login(&app, "Wrong@123").await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(read(resp).await["message"], msg::INVALID_CREDENTIALS);
        let users = st.store.get(&Fields::new()).await.unwrap();
        assert_eq!(users[0].active_devices, 0);
    }

    #[tokio::test]
    async fn failed_device_write_returns_500_without_cookie() {
        let store = Arc::new(FlakyStore::default());
        let st = AppState::fake_with(store.clone(), Arc::new(RecordingPublisher::default()));
        let app = build_app(st.clone());
        register(&app).await;
        activate(&app, &st).await;

        store.fail_update(true);
        let resp = login(&app, "Abcde@123").await;
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(resp.headers().get(SET_COOKIE).is_none());
        assert_eq!(read(resp).await["message"], msg::LOGGING_IN);
    }

    #[tokio::test]
    async fn client_errors_use_the_envelope() {
        let app = build_app(AppState::fake());

        let mut bad_date = signup_body();
        bad_date["registration_date"] = json!("2022/11/15");
        let resp = app
            .clone()
            .oneshot(json_request(Method::POST, "/register", bad_date))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(read(resp).await["message"], msg::PARSE_REG_DATE);

        let resp = app
            .clone()
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri("/login")
                    .header(CONTENT_TYPE, "application/json")
                    .body(Body::from("{not json"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body = read(resp).await;
        assert_eq!(body["status"], 400);
        assert_eq!(body["message"], msg::UNMARSHAL);

        let resp = login(&app, "Abcde@123").await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(read(resp).await["message"], msg::ACCOUNT_NOT_FOUND);
    }

    #[tokio::test]
    async fn user_route_requires_cookie() {
        let app = build_app(AppState::fake());
        let resp = app
            .oneshot(Request::builder().uri("/user").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn activate_requires_broker_agent() {
        let st = AppState::fake();
        let app = build_app(st.clone());
        register(&app).await;
        let users = st.store.get(&Fields::new()).await.unwrap();

        let resp = app
            .clone()
            .oneshot(
                Request::builder()
                    .method(Method::PUT)
                    .uri("/activate")
                    .header(CONTENT_TYPE, "application/json")
                    .header(USER_AGENT, "Mozilla/5.0")
                    .body(Body::from(json!({ "user_id": users[0].id }).to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        let users = st.store.get(&Fields::new()).await.unwrap();
        assert!(!users[0].active);
    }

    #[tokio::test]
    async fn routes_nest_under_version_and_report_health() {
        let mut st = AppState::fake();
        let mut cfg = (*st.config).clone();
        cfg.route_version = Some("v1".into());
        st.config = Arc::new(cfg);
        let app = build_app(st);

        let resp = app
            .clone()
            .oneshot(Request::builder().uri("/v1/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let resp = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn unhealthy_store_reports_503() {
        let store = Arc::new(FlakyStore::default());
        store.fail_get(true);
        let app = build_app(AppState::fake_with(store, Arc::new(RecordingPublisher::default())));
        let resp = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
