use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use axum::{
    Json, Router,
    extract::{Path, Request, State},
    http::{HeaderValue, StatusCode, header},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
};
use serde::{Deserialize, Serialize};
use tower_http::limit::RequestBodyLimitLayer;

use tonight_core::error::{MealListError, PickError};
use tonight_core::models::{
    EXPORT_VERSION, ExportData, HistoryEntry, ImportSummary, Pick, WeightedMeal,
};
use tonight_core::selector::{RandomSource, ThreadRandom};
use tonight_core::service::{Clock, SystemClock, TonightService};

const BODY_LIMIT: usize = 1024 * 1024; // 1 MB

type SharedRandom = Arc<dyn Fn() -> f64 + Send + Sync>;

#[derive(Clone)]
struct AppState {
    service: Arc<Mutex<TonightService>>,
    clock: Arc<dyn Clock>,
    random: SharedRandom,
    api_key: Option<String>,
}

impl AppState {
    fn service(&self) -> MutexGuard<'_, TonightService> {
        self.service.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// --- Request / Response types ---

#[derive(Deserialize)]
struct AddMealRequest {
    name: String,
}

#[derive(Deserialize)]
struct LogMealRequest {
    meal: String,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

// --- Error handling ---

enum ApiError {
    NotFound(String),
    BadRequest(String),
    Conflict(String),
    Unprocessable(String),
    Internal(anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            Self::Conflict(msg) => (StatusCode::CONFLICT, msg),
            Self::Unprocessable(msg) => (StatusCode::UNPROCESSABLE_ENTITY, msg),
            Self::Internal(err) => {
                tracing::error!(error = %format!("{err:#}"), "internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };
        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        if let Some(e) = err.downcast_ref::<MealListError>() {
            return match e {
                MealListError::Blank => Self::BadRequest(e.to_string()),
                MealListError::Duplicate(_) => Self::Conflict(e.to_string()),
                MealListError::NotFound(_) => Self::NotFound(e.to_string()),
            };
        }
        if let Some(e) = err.downcast_ref::<PickError>() {
            return Self::Unprocessable(e.to_string());
        }
        Self::Internal(err)
    }
}

impl From<MealListError> for ApiError {
    fn from(err: MealListError) -> Self {
        anyhow::Error::from(err).into()
    }
}

// --- Middleware ---

async fn require_auth(State(state): State<AppState>, request: Request, next: Next) -> Response {
    if let Some(ref expected_key) = state.api_key {
        let authorized = request
            .headers()
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .is_some_and(|token| token == expected_key);

        if !authorized {
            tracing::warn!(path = %request.uri().path(), "rejected unauthenticated request");
            return (
                StatusCode::UNAUTHORIZED,
                Json(ErrorResponse {
                    error: "Invalid or missing API key".to_string(),
                }),
            )
                .into_response();
        }
    }
    next.run(request).await
}

async fn security_headers(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert(
        "x-content-type-options",
        HeaderValue::from_static("nosniff"),
    );
    headers.insert("x-frame-options", HeaderValue::from_static("DENY"));
    headers.insert(
        "content-security-policy",
        HeaderValue::from_static("default-src 'none'"),
    );
    response
}

// --- Handlers ---

async fn list_meals(State(state): State<AppState>) -> Result<Json<Vec<String>>, ApiError> {
    let meals = state.service().list_meals()?;
    Ok(Json(meals))
}

async fn add_meal(
    State(state): State<AppState>,
    Json(req): Json<AddMealRequest>,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError> {
    let name = state.service().add_meal(&req.name)?;
    Ok((StatusCode::CREATED, Json(serde_json::json!({ "name": name }))))
}

async fn remove_meal(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<StatusCode, ApiError> {
    if state.service().remove_meal(&name)? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(MealListError::NotFound(name).into())
    }
}

async fn get_weights(State(state): State<AppState>) -> Result<Json<Vec<WeightedMeal>>, ApiError> {
    let weights = state.service().weights(state.clock.as_ref())?;
    Ok(Json(weights))
}

async fn pick_meal(State(state): State<AppState>) -> Result<Json<Pick>, ApiError> {
    let mut source = || (*state.random)();
    let pick = state.service().suggest(state.clock.as_ref(), &mut source)?;
    Ok(Json(pick))
}

async fn log_meal(
    State(state): State<AppState>,
    Json(req): Json<LogMealRequest>,
) -> Result<(StatusCode, Json<HistoryEntry>), ApiError> {
    let entry = state.service().log_meal(&req.meal, state.clock.as_ref())?;
    Ok((StatusCode::CREATED, Json(entry)))
}

async fn get_history(State(state): State<AppState>) -> Result<Json<Vec<HistoryEntry>>, ApiError> {
    let history = state.service().history()?;
    Ok(Json(history))
}

async fn get_recent_history(
    State(state): State<AppState>,
) -> Result<Json<Vec<HistoryEntry>>, ApiError> {
    let recent = state.service().recent_history(state.clock.as_ref())?;
    Ok(Json(recent))
}

async fn export_data(State(state): State<AppState>) -> Result<Json<ExportData>, ApiError> {
    let data = state.service().export_all()?;
    Ok(Json(data))
}

async fn import_data(
    State(state): State<AppState>,
    Json(data): Json<ExportData>,
) -> Result<Json<ImportSummary>, ApiError> {
    if data.version != EXPORT_VERSION {
        return Err(ApiError::BadRequest(format!(
            "Unsupported export version {} (expected {EXPORT_VERSION})",
            data.version
        )));
    }
    let summary = state
        .service()
        .import_all(&data, state.clock.as_ref())?;
    Ok(Json(summary))
}

// --- Router builder ---

fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/meals", get(list_meals).post(add_meal))
        .route("/api/meals/{name}", delete(remove_meal))
        .route("/api/weights", get(get_weights))
        .route("/api/pick", post(pick_meal))
        .route("/api/history", get(get_history).post(log_meal))
        .route("/api/history/recent", get(get_recent_history))
        .route("/api/export", get(export_data))
        .route("/api/import", post(import_data))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth))
        .layer(RequestBodyLimitLayer::new(BODY_LIMIT))
        .layer(middleware::from_fn(security_headers))
        .with_state(state)
}

// --- Server startup ---

/// Shorten a key for display. Keys too short to reveal safely are fully hidden.
fn mask_key(key: &str) -> String {
    if key.is_ascii() && key.len() >= 8 {
        format!("{}...{}", &key[..4], &key[key.len() - 4..])
    } else {
        "****".to_string()
    }
}

pub async fn start_server(
    service: TonightService,
    port: u16,
    bind: &str,
    api_key: Option<String>,
) -> anyhow::Result<()> {
    let state = AppState {
        service: Arc::new(Mutex::new(service)),
        clock: Arc::new(SystemClock),
        random: Arc::new(|| ThreadRandom.next_f64()),
        api_key: api_key.clone(),
    };

    let app = build_router(state);

    if let Some(ref key) = api_key {
        eprintln!(
            "API key: {} (see api_key file in data directory)",
            mask_key(key)
        );
    } else {
        eprintln!("Warning: Authentication disabled (--no-auth). API is open to anyone.");
    }

    if bind != "127.0.0.1" && bind != "localhost" && api_key.is_none() {
        eprintln!(
            "Warning: Listening on {bind} with no authentication. Any device on your network can access this API."
        );
    }

    let listener = tokio::net::TcpListener::bind(format!("{bind}:{port}")).await?;
    tracing::info!(%bind, port, "server listening");
    eprintln!("Listening on http://{bind}:{port}");
    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use http_body_util::BodyExt;
    use tonight_core::service::FixedClock;
    use tower::ServiceExt;

    const DAY_MS: i64 = 24 * 60 * 60 * 1000;
    const NOW: i64 = 1_750_000_000_000;

    fn test_state(api_key: Option<String>, r: f64) -> AppState {
        AppState {
            service: Arc::new(Mutex::new(TonightService::new_in_memory().unwrap())),
            clock: Arc::new(FixedClock(NOW)),
            random: Arc::new(move || r),
            api_key,
        }
    }

    fn test_app(api_key: Option<String>) -> Router {
        build_router(test_state(api_key, 0.5))
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let body = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&body).unwrap()
    }

    fn post_json(uri: &str, body: &serde_json::Value) -> axum::http::Request<Body> {
        axum::http::Request::post(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get_req(uri: &str) -> axum::http::Request<Body> {
        axum::http::Request::get(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn auth_missing_key_returns_401() {
        let app = test_app(Some("test-key-abc123".to_string()));

        let response = app.oneshot(get_req("/api/meals")).await.unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let json = body_json(response).await;
        assert_eq!(json["error"], "Invalid or missing API key");
    }

    #[tokio::test]
    async fn auth_wrong_key_returns_401() {
        let app = test_app(Some("test-key-abc123".to_string()));

        let response = app
            .oneshot(
                axum::http::Request::get("/api/meals")
                    .header("Authorization", "Bearer wrong-key")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn auth_correct_key_succeeds() {
        let app = test_app(Some("test-key-abc123".to_string()));

        let response = app
            .oneshot(
                axum::http::Request::get("/api/meals")
                    .header("Authorization", "Bearer test-key-abc123")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn security_headers_present() {
        let app = test_app(None);

        let response = app.oneshot(get_req("/api/meals")).await.unwrap();

        assert_eq!(
            response.headers().get("x-content-type-options").unwrap(),
            "nosniff"
        );
        assert_eq!(response.headers().get("x-frame-options").unwrap(), "DENY");
        assert_eq!(
            response.headers().get("content-security-policy").unwrap(),
            "default-src 'none'"
        );
    }

    #[tokio::test]
    async fn security_headers_on_auth_failure() {
        let app = test_app(Some("secret".to_string()));

        let response = app.oneshot(get_req("/api/meals")).await.unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            response.headers().get("x-content-type-options").unwrap(),
            "nosniff"
        );
    }

    #[tokio::test]
    async fn body_size_limit_rejects_oversized() {
        let app = test_app(None);

        let big_body = vec![0u8; BODY_LIMIT + 1];
        let response = app
            .oneshot(
                axum::http::Request::post("/api/meals")
                    .header("content-type", "application/json")
                    .body(Body::from(big_body))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn internal_error_does_not_leak_details() {
        let error = ApiError::Internal(anyhow::anyhow!("secret database path /home/user/tonight.db"));
        let response = error.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let json = body_json(response).await;
        assert_eq!(json["error"], "Internal server error");
        assert!(!json["error"].as_str().unwrap().contains("secret"));
    }

    #[tokio::test]
    async fn add_and_list_meals() {
        let app = test_app(None);

        let response = app
            .clone()
            .oneshot(post_json("/api/meals", &serde_json::json!({ "name": " Tacos " })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(body_json(response).await["name"], "Tacos");

        let response = app.oneshot(get_req("/api/meals")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, serde_json::json!(["Tacos"]));
    }

    #[tokio::test]
    async fn duplicate_meal_returns_409() {
        let app = test_app(None);
        let body = serde_json::json!({ "name": "Tacos" });

        let first = app.clone().oneshot(post_json("/api/meals", &body)).await.unwrap();
        assert_eq!(first.status(), StatusCode::CREATED);

        let second = app.oneshot(post_json("/api/meals", &body)).await.unwrap();
        assert_eq!(second.status(), StatusCode::CONFLICT);
        let json = body_json(second).await;
        assert!(json["error"].as_str().unwrap().contains("Tacos"));
    }

    #[tokio::test]
    async fn blank_meal_returns_400() {
        let app = test_app(None);
        let response = app
            .oneshot(post_json("/api/meals", &serde_json::json!({ "name": "   " })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn delete_meal_roundtrip() {
        let app = test_app(None);
        app.clone()
            .oneshot(post_json("/api/meals", &serde_json::json!({ "name": "Pad Thai" })))
            .await
            .unwrap();

        let response = app
            .clone()
            .oneshot(
                axum::http::Request::delete("/api/meals/Pad%20Thai")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let response = app
            .oneshot(
                axum::http::Request::delete("/api/meals/Pad%20Thai")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn pick_with_no_meals_returns_422() {
        let app = test_app(None);
        let response = app
            .oneshot(
                axum::http::Request::post("/api/pick")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let json = body_json(response).await;
        assert!(json["error"].as_str().unwrap().contains("Add a meal"));
    }

    #[tokio::test]
    async fn pick_uses_weights_and_injected_random() {
        let state = test_state(None, 0.95);
        {
            let svc = state.service();
            svc.add_meal("Tacos").unwrap();
            svc.add_meal("Pizza").unwrap();
            svc.log_meal("Pizza", &FixedClock(NOW - 2 * DAY_MS)).unwrap();
        }
        let app = build_router(state);

        let response = app.clone().oneshot(get_req("/api/weights")).await.unwrap();
        assert_eq!(
            body_json(response).await,
            serde_json::json!([
                { "meal": "Tacos", "weight": 10 },
                { "meal": "Pizza", "weight": 1 },
            ])
        );

        // Pool of 11, index floor(0.95 * 11) = 10 is the single Pizza slot.
        let response = app
            .oneshot(
                axum::http::Request::post("/api/pick")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["meal"], "Pizza");
        assert_eq!(json["was_penalized"], true);
    }

    #[tokio::test]
    async fn confirm_records_history() {
        let app = test_app(None);

        let response = app
            .clone()
            .oneshot(post_json("/api/history", &serde_json::json!({ "meal": "Curry" })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let json = body_json(response).await;
        assert_eq!(json["meal"], "Curry");
        assert_eq!(json["date"], NOW);

        let response = app.clone().oneshot(get_req("/api/history")).await.unwrap();
        assert_eq!(body_json(response).await.as_array().unwrap().len(), 1);

        let response = app.oneshot(get_req("/api/history/recent")).await.unwrap();
        let json = body_json(response).await;
        assert_eq!(json[0]["meal"], "Curry");
    }

    #[tokio::test]
    async fn export_then_import_into_fresh_server() {
        let source = test_app(None);
        source
            .clone()
            .oneshot(post_json("/api/meals", &serde_json::json!({ "name": "Ramen" })))
            .await
            .unwrap();
        let response = source.oneshot(get_req("/api/export")).await.unwrap();
        let exported = body_json(response).await;
        assert_eq!(exported["version"], 1);

        let target = test_app(None);
        let response = target
            .clone()
            .oneshot(post_json("/api/import", &exported))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["meals_added"], 1);
        assert_eq!(json["history_added"], 0);

        let response = target.oneshot(get_req("/api/meals")).await.unwrap();
        assert_eq!(body_json(response).await, serde_json::json!(["Ramen"]));
    }

    #[tokio::test]
    async fn import_rejects_unknown_version() {
        let app = test_app(None);
        let response = app
            .oneshot(post_json(
                "/api/import",
                &serde_json::json!({ "version": 7, "meals": [] }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn import_drops_future_history() {
        let state = test_state(None, 0.5);
        state.service().add_meal("Pizza").unwrap();
        let app = build_router(state.clone());

        let response = app
            .oneshot(post_json(
                "/api/import",
                &serde_json::json!({
                    "version": 1,
                    "meals": [],
                    "history": [{ "meal": "Pizza", "date": i64::MAX }],
                }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["history_added"], 0);

        let weights = state.service().weights(state.clock.as_ref()).unwrap();
        assert_eq!(weights[0].weight, 10);
    }

    #[test]
    fn mask_key_hides_short_keys() {
        assert_eq!(mask_key("abcdef0123456789"), "abcd...6789");
        assert_eq!(mask_key("abc"), "****");
        assert_eq!(mask_key(""), "****");
    }
}
