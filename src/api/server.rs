use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;

use axum::body::Body;
use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{FromRequest, FromRequestParts, MatchedPath, Request};
use axum::middleware::{self, Next, from_fn};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use http::StatusCode;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::instrument;

use crate::api::handler::*;
use crate::api::middleware::auth::{AuthError, TokenSigner, authenticate};
use crate::booking::{BookingError, Lifecycle};
use crate::db::prelude::Store;

pub type JsonResult<T> = core::result::Result<Json<ApiResponse<T>>, RouteError>;

#[derive(Debug, Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub lifecycle: Lifecycle,
    pub signer: TokenSigner,
}

/// The response envelope every route returns.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            message: None,
            data: Some(data),
        }
    }

    pub fn with_message(message: impl Into<String>, data: T) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
            data: Some(data),
        }
    }
}

impl ApiResponse<()> {
    pub fn error(message: String) -> Self {
        Self {
            success: false,
            message: Some(message),
            data: None,
        }
    }
}

// Extractor wrappers so malformed bodies, queries and ids answer with the envelope.

#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(RouteError))]
pub struct ApiJson<T>(pub T);

#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(RouteError))]
pub struct ApiQuery<T>(pub T);

#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(RouteError))]
pub struct ApiPath<T>(pub T);

pub fn router(state: Arc<AppState>, cors: CorsLayer) -> Router {
    let staff_routes = Router::new()
        .route("/appointments", post(book_staff).get(list_appointments))
        .route("/appointments/{id}", get(get_appointment))
        .route(
            "/appointments/{id}/confirm-appointment",
            patch(confirm_appointment),
        )
        .route("/appointments/{id}/confirm-employee", patch(confirm_employee))
        .route("/appointments/{id}/change-barber", patch(change_barber))
        .route("/appointments/{id}/cancel", patch(cancel_appointment))
        .route("/appointments/{id}/complete", patch(complete_appointment))
        .route("/customers/{id}/loyalty", get(customer_loyalty))
        .route("/customers/{id}/redeem", post(redeem_reward))
        .route_layer(middleware::from_fn_with_state(state.clone(), authenticate));

    Router::new()
        .merge(staff_routes)
        //
        // general
        .route("/", get(|| async { Response::new(Body::empty()) }))
        //
        // public booking surface
        .route("/appointments/public/book", post(book_public))
        .route("/appointments/available-slots", get(available_slots))
        .route("/appointments/{id}/customer-rating", post(rate_customer))
        .route("/appointments/{id}/employee-rating", post(rate_employee))
        .route("/rewards", get(list_rewards))
        .layer(
            TraceLayer::new_for_http().make_span_with(|req: &axum::http::Request<_>| {
                let method = req.method();
                let uri = req.uri();

                let matched_path = req
                    .extensions()
                    .get::<MatchedPath>()
                    .map(|matched| matched.as_str());

                tracing::debug_span!("api_request", ?method, ?uri, ?matched_path)
            }),
        )
        .layer(cors)
        .layer(from_fn(log_route_errors))
        .with_state(state)
}

/// Logs `RouteError`s stashed in response extensions by [`RouteError::into_response`].
#[instrument(skip(request, next), fields(uri = request.uri().to_string()))]
async fn log_route_errors(request: Request, next: Next) -> Response {
    let res = next.run(request).await;
    if let Some(err) = res.extensions().get::<Arc<RouteError>>() {
        if res.status().is_server_error() {
            tracing::error!(error = ?err, "error occurred inside route handler");
        } else {
            tracing::warn!(error = ?err, status = %res.status(), "request rejected");
        }
    }

    res
}

async fn serve(
    state: Arc<AppState>,
    cors: CorsLayer,
    socket_addr: SocketAddr,
    tx: UnboundedSender<SocketAddr>,
) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(socket_addr).await?;
    let local_addr = listener.local_addr()?;

    if tx.send(local_addr).is_err() {
        tracing::warn!("server ready listener already gone");
    }

    axum::serve(listener, router(state, cors)).await
}

#[instrument(skip(state, cors, tx, rx))]
pub async fn start_server(
    state: Arc<AppState>,
    cors: CorsLayer,
    port: u16,
    tx: UnboundedSender<SocketAddr>,
    mut rx: UnboundedReceiver<SocketAddr>,
) -> Vec<JoinHandle<()>> {
    tracing::info!("starting server");
    let socket_addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)), port);

    let server_handle = tokio::task::spawn(async move {
        if let Err(e) = serve(state, cors, socket_addr, tx).await {
            tracing::error!(error = ?e, %socket_addr, "server exited with error");
        }
    });

    let logging_handle = tokio::task::spawn(async move {
        if let Some(addr) = rx.recv().await {
            tracing::info!(
                server_url = &format!("http://127.0.0.1:{}", addr.port()),
                "server ready"
            );
        }
    });

    vec![server_handle, logging_handle]
}

#[derive(Debug, Error)]
pub enum RouteError {
    #[error(transparent)]
    Booking(#[from] BookingError),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    JsonRejection(#[from] JsonRejection),

    #[error(transparent)]
    QueryRejection(#[from] QueryRejection),

    #[error(transparent)]
    PathRejection(#[from] PathRejection),

    #[error("{0}")]
    BadRequest(String),
}

impl IntoResponse for RouteError {
    fn into_response(self) -> Response {
        let (status, message, err) = match &self {
            RouteError::Booking(booking_err) => match booking_err {
                BookingError::Validation(_)
                | BookingError::SlotTaken { .. }
                | BookingError::Transition(_)
                | BookingError::Ledger(_) => {
                    (StatusCode::BAD_REQUEST, booking_err.to_string(), None)
                }
                BookingError::NotFound(_) => (StatusCode::NOT_FOUND, booking_err.to_string(), None),
                BookingError::Forbidden => {
                    (StatusCode::FORBIDDEN, booking_err.to_string(), Some(self))
                }
                BookingError::Store(store_err) => (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    store_err.to_string(),
                    Some(self),
                ),
            },

            RouteError::Auth(auth_err) => match auth_err {
                AuthError::Store(store_err) => (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    store_err.to_string(),
                    Some(self),
                ),
                _ => (StatusCode::UNAUTHORIZED, auth_err.to_string(), Some(self)),
            },

            RouteError::JsonRejection(rejection) => {
                (StatusCode::BAD_REQUEST, rejection.body_text(), None)
            }

            RouteError::QueryRejection(rejection) => {
                (StatusCode::BAD_REQUEST, rejection.body_text(), None)
            }

            RouteError::PathRejection(rejection) => {
                (StatusCode::BAD_REQUEST, rejection.body_text(), None)
            }

            RouteError::BadRequest(message) => (StatusCode::BAD_REQUEST, message.clone(), None),
        };

        let mut response = (status, Json(ApiResponse::error(message))).into_response();
        if let Some(err) = err {
            response.extensions_mut().insert(Arc::new(err));
        }

        response
    }
}

#[cfg(test)]
mod test {
    use chrono::{Duration, Utc};
    use http::header::{AUTHORIZATION, CONTENT_TYPE};
    use serde_json::{Value, json};
    use tower::ServiceExt;

    use super::*;
    use crate::api::middleware::auth::TokenSubject;
    use crate::api::middleware::cors_layer;
    use crate::booking::test::Fixture;

    struct TestApp {
        fx: Fixture,
        app: Router,
        signer: TokenSigner,
    }

    impl TestApp {
        async fn new() -> Self {
            let fx = Fixture::new().await;
            let signer = TokenSigner::new("test-secret");
            let state = Arc::new(AppState {
                store: Arc::new(fx.store.clone()),
                lifecycle: fx.lifecycle.clone(),
                signer: signer.clone(),
            });

            Self {
                app: router(state, cors_layer(vec!["*".into()])),
                fx,
                signer,
            }
        }

        fn token(&self, subject: TokenSubject) -> String {
            self.signer
                .issue(subject, Utc::now() + Duration::hours(1))
        }

        fn owner_token(&self) -> String {
            self.token(TokenSubject::User(self.fx.owner.id))
        }

        async fn send(
            &self,
            method: &str,
            uri: &str,
            token: Option<&str>,
            body: Option<Value>,
        ) -> (StatusCode, Value) {
            let mut req = http::Request::builder().method(method).uri(uri);
            if let Some(token) = token {
                req = req.header(AUTHORIZATION, format!("Bearer {token}"));
            }

            let req = match body {
                Some(body) => req
                    .header(CONTENT_TYPE, "application/json")
                    .body(Body::from(body.to_string())),
                None => req.body(Body::empty()),
            }
            .unwrap();

            let res = self.app.clone().oneshot(req).await.unwrap();
            let status = res.status();
            let bytes = axum::body::to_bytes(res.into_body(), usize::MAX)
                .await
                .unwrap();
            let value = if bytes.is_empty() {
                Value::Null
            } else {
                serde_json::from_slice(&bytes).unwrap()
            };

            (status, value)
        }

        fn booking(&self, phone: &str, time: &str) -> Value {
            json!({
                "businessId": self.fx.business.id,
                "customerName": "Sami",
                "customerPhone": phone,
                "serviceName": "Haircut",
                "date": "2026-03-14",
                "time": time,
            })
        }

        async fn book(&self, phone: &str, time: &str) -> String {
            let (status, body) = self
                .send(
                    "POST",
                    "/appointments/public/book",
                    None,
                    Some(self.booking(phone, time)),
                )
                .await;
            assert_eq!(status, StatusCode::CREATED, "{body}");

            body["data"]["id"].as_str().unwrap().to_string()
        }
    }

    #[tokio::test]
    async fn test_liveness() {
        let app = TestApp::new().await;
        let (status, body) = app.send("GET", "/", None, None).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, Value::Null);
    }

    #[tokio::test]
    async fn test_public_booking_and_conflict() {
        let app = TestApp::new().await;
        let id = app.book("0500000001", "14:00").await;
        assert!(!id.is_empty());

        let (status, body) = app
            .send(
                "POST",
                "/appointments/public/book",
                None,
                Some(app.booking("0500000002", "14:00")),
            )
            .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
        assert_eq!(body["message"], "the 14:00 slot on 2026-03-14 is already booked");
        assert!(body.get("data").is_none());
    }

    #[tokio::test]
    async fn test_public_booking_validation() {
        let app = TestApp::new().await;
        let mut missing = app.booking("0500000001", "14:00");
        missing["customerPhone"] = Value::Null;

        let (status, body) = app
            .send("POST", "/appointments/public/book", None, Some(missing))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "customerPhone is required");

        let mut bad_date = app.booking("0500000001", "14:00");
        bad_date["date"] = json!("14-03-2026");
        let (status, _) = app
            .send("POST", "/appointments/public/book", None, Some(bad_date))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        // unparseable body still answers with the envelope
        let (status, body) = app
            .send("POST", "/appointments/public/book", None, Some(json!([1, 2])))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn test_staff_routes_require_token() {
        let app = TestApp::new().await;
        let id = app.book("0500000001", "10:00").await;
        let uri = format!("/appointments/{id}/confirm-appointment");

        let (status, body) = app.send("PATCH", &uri, None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["message"], "missing bearer token");

        let (status, _) = app.send("PATCH", &uri, Some("user.nope.1.00"), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let client = app.token(TokenSubject::User(app.fx.client.id));
        let (status, _) = app.send("PATCH", &uri, Some(&client), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let owner = app.owner_token();
        let (status, body) = app.send("PATCH", &uri, Some(&owner), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["status"], "appointment_confirmed");
        assert_eq!(
            body["data"]["confirmations"]["appointmentConfirmed"]["confirmed"],
            true
        );
    }

    #[tokio::test]
    async fn test_lifecycle_over_http() {
        let app = TestApp::new().await;
        let token = app.owner_token();
        let id = app.book("0500000001", "11:00").await;

        let (status, body) = app
            .send(
                "PATCH",
                &format!("/appointments/{id}/confirm-employee"),
                Some(&token),
                None,
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(
            body["message"],
            "the appointment must be confirmed before the employee can confirm it"
        );

        // complete without a body
        let (status, body) = app
            .send(
                "PATCH",
                &format!("/appointments/{id}/complete"),
                Some(&token),
                None,
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["pointsActivated"], 100);
        assert_eq!(body["data"]["appointment"]["status"], "completed");

        let customer_id = body["data"]["appointment"]["customerId"]
            .as_str()
            .unwrap()
            .to_string();
        let (status, body) = app
            .send(
                "GET",
                &format!("/customers/{customer_id}/loyalty"),
                Some(&token),
                None,
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["loyaltyPoints"], 100);
        assert_eq!(body["data"]["pendingPoints"], 0);
        assert_eq!(body["data"]["pointsHistory"][0]["type"], "earned");

        let (status, _) = app
            .send(
                "PATCH",
                &format!("/appointments/{id}/cancel"),
                Some(&token),
                Some(json!({ "reason": "too late" })),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = app
            .send(
                "POST",
                &format!("/appointments/{id}/customer-rating"),
                None,
                Some(json!({ "score": 5, "comment": "sharp" })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["customerRating"]["score"], 5);
    }

    #[tokio::test]
    async fn test_not_found_and_bad_ids() {
        let app = TestApp::new().await;
        let token = app.owner_token();

        let (status, body) = app
            .send(
                "GET",
                &format!("/appointments/{}", uuid::Uuid::new_v4()),
                Some(&token),
                None,
            )
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["message"], "appointment not found");

        let (status, body) = app
            .send("GET", "/appointments/not-a-uuid", Some(&token), None)
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn test_slots_and_listing() {
        let app = TestApp::new().await;
        app.book("0500000001", "09:00").await;
        app.book("0500000002", "20:30").await;

        let (status, body) = app
            .send(
                "GET",
                &format!(
                    "/appointments/available-slots?businessId={}&date=2026-03-14",
                    app.fx.business.id
                ),
                None,
                None,
            )
            .await;
        assert_eq!(status, StatusCode::OK);

        let slots = body["data"].as_array().unwrap();
        assert_eq!(slots.len(), 25);
        let booked = slots
            .iter()
            .filter(|s| s["booked"] == true)
            .map(|s| s["time"].as_str().unwrap())
            .collect::<Vec<_>>();
        assert_eq!(booked, vec!["09:00", "20:30"]);

        let token = app.owner_token();
        let (status, body) = app
            .send(
                "GET",
                "/appointments?date=2026-03-14&status=pending",
                Some(&token),
                None,
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"].as_array().unwrap().len(), 2);

        let (status, body) = app
            .send(
                "GET",
                &format!("/rewards?businessId={}", app.fx.business.id),
                None,
                None,
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"][0]["pointsCost"], 80);
    }

    #[tokio::test]
    async fn test_staff_booking_with_employee_token() {
        let app = TestApp::new().await;
        let token = app.token(TokenSubject::Employee(app.fx.barber.id));

        let mut booking = app.booking("0500000009", "12:00");
        booking["employeeId"] = json!(app.fx.barber.id);
        let (status, body) = app
            .send("POST", "/appointments", Some(&token), Some(booking))
            .await;

        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["data"]["status"], "confirmed");
        assert_eq!(body["data"]["source"], "staff");
        assert_eq!(body["data"]["employeeName"], "Omar");
    }
}
