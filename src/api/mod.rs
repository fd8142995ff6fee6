//! HTTP surface.
//!
//! Thin axum handlers over the stores; every error is a [`StoreError`]
//! mapped to a status code here and nowhere else.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use uuid::Uuid;

use crate::config::Config;
use crate::contact::whatsapp_link;
use crate::domain::aggregates::cart::{CartItem, NewCartItem};
use crate::domain::aggregates::order::{Order, OrderStatus};
use crate::domain::aggregates::payment::{PaymentMethod, PaymentRequest};
use crate::domain::aggregates::platform::{NewPlatform, Platform, PlatformUpdate};
use crate::domain::aggregates::service::{NewService, ServicePackage, ServiceUpdate};
use crate::domain::aggregates::user::{User, UserRole};
use crate::domain::value_objects::{OrderId, PaymentId};
use crate::stores::auth::AuthStore;
use crate::stores::cart::CartStore;
use crate::stores::catalog::CatalogStore;
use crate::stores::orders::OrderStore;
use crate::stores::payments::PaymentStore;
use crate::sync::ChangeNotifier;
use crate::StoreError;

#[derive(Clone)]
pub struct AppState {
    pub catalog: Arc<CatalogStore>,
    pub carts: Arc<CartStore>,
    pub orders: Arc<OrderStore>,
    pub payments: Arc<PaymentStore>,
    pub auth: Arc<AuthStore>,
    pub notifier: Arc<ChangeNotifier>,
    pub config: Config,
}

pub struct ApiError(StoreError);

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            StoreError::Validation(_) => StatusCode::BAD_REQUEST,
            StoreError::NotFound(_) => StatusCode::NOT_FOUND,
            StoreError::Conflict(_) => StatusCode::CONFLICT,
            StoreError::InsufficientBalance => StatusCode::CONFLICT,
            StoreError::Auth => StatusCode::UNAUTHORIZED,
            StoreError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self.0, "request failed");
        }
        (status, Json(serde_json::json!({ "error": self.0.to_string() }))).into_response()
    }
}

type ApiResult<T> = std::result::Result<T, ApiError>;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route(
            "/health",
            get(|| async { Json(serde_json::json!({"status": "healthy", "service": "smm-storefront"})) }),
        )
        .route("/api/v1/platforms", get(list_platforms).post(create_platform))
        .route(
            "/api/v1/platforms/:id",
            get(get_platform).put(update_platform).delete(delete_platform),
        )
        .route("/api/v1/services", get(list_services).post(create_service))
        .route("/api/v1/services/by-platform/:name", get(platform_services))
        .route(
            "/api/v1/services/:id",
            get(get_service).put(update_service).delete(delete_service),
        )
        .route("/api/v1/cart/:session", get(get_cart).post(add_to_cart).delete(clear_cart))
        .route("/api/v1/cart/:session/items/:id", axum::routing::delete(remove_cart_item))
        .route("/api/v1/orders", get(list_orders).post(checkout))
        .route("/api/v1/orders/:id", get(get_order))
        .route("/api/v1/orders/:id/status", put(update_order_status))
        .route("/api/v1/orders/:id/cancel", post(cancel_order))
        .route("/api/v1/payments", get(list_payments).post(create_payment))
        .route("/api/v1/payments/:id/approve", post(approve_payment))
        .route("/api/v1/payments/:id/reject", post(reject_payment))
        .route("/api/v1/auth/register", post(register))
        .route("/api/v1/auth/login", post(login))
        .route("/api/v1/users/:id/balance", get(user_balance))
        .route("/api/v1/support/whatsapp", get(support_link))
        .route("/api/v1/sync/resync", post(resync))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Catalog

#[derive(Debug, Deserialize)]
struct PlatformListParams {
    /// Include inactive platforms (admin views).
    #[serde(default)]
    all: bool,
}

async fn list_platforms(
    State(s): State<AppState>,
    Query(params): Query<PlatformListParams>,
) -> Json<Vec<Platform>> {
    if params.all {
        Json(s.catalog.list_platforms())
    } else {
        Json(s.catalog.active_platforms())
    }
}

async fn get_platform(State(s): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<Json<Platform>> {
    Ok(Json(s.catalog.get_platform(id)?))
}

async fn create_platform(
    State(s): State<AppState>,
    Json(new): Json<NewPlatform>,
) -> ApiResult<(StatusCode, Json<Platform>)> {
    let platform = s.catalog.add_platform(new).await?;
    Ok((StatusCode::CREATED, Json(platform)))
}

async fn update_platform(
    State(s): State<AppState>,
    Path(id): Path<Uuid>,
    Json(update): Json<PlatformUpdate>,
) -> ApiResult<Json<Platform>> {
    Ok(Json(s.catalog.update_platform(id, update).await?))
}

async fn delete_platform(State(s): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<StatusCode> {
    s.catalog.delete_platform(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn platform_services(
    State(s): State<AppState>,
    Path(name): Path<String>,
) -> Json<Vec<ServicePackage>> {
    Json(s.catalog.services_by_platform(&name))
}

async fn list_services(State(s): State<AppState>) -> Json<Vec<ServicePackage>> {
    Json(s.catalog.list_services())
}

async fn get_service(
    State(s): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<ServicePackage>> {
    Ok(Json(s.catalog.get_service(id)?))
}

async fn create_service(
    State(s): State<AppState>,
    Json(new): Json<NewService>,
) -> ApiResult<(StatusCode, Json<ServicePackage>)> {
    let service = s.catalog.add_service(new).await?;
    Ok((StatusCode::CREATED, Json(service)))
}

async fn update_service(
    State(s): State<AppState>,
    Path(id): Path<Uuid>,
    Json(update): Json<ServiceUpdate>,
) -> ApiResult<Json<ServicePackage>> {
    Ok(Json(s.catalog.update_service(id, update).await?))
}

async fn delete_service(State(s): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<StatusCode> {
    s.catalog.delete_service(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ---------------------------------------------------------------------------
// Cart

#[derive(Debug, Serialize)]
struct CartResponse {
    items: Vec<CartItem>,
    total: Decimal,
}

async fn get_cart(State(s): State<AppState>, Path(session): Path<String>) -> Json<CartResponse> {
    Json(CartResponse {
        items: s.carts.items(&session),
        total: s.carts.total(&session),
    })
}

async fn add_to_cart(
    State(s): State<AppState>,
    Path(session): Path<String>,
    Json(new): Json<NewCartItem>,
) -> ApiResult<(StatusCode, Json<CartItem>)> {
    let item = s.carts.add_item(&session, new)?;
    Ok((StatusCode::CREATED, Json(item)))
}

async fn remove_cart_item(
    State(s): State<AppState>,
    Path((session, id)): Path<(String, String)>,
) -> ApiResult<StatusCode> {
    s.carts.remove_item(&session, &id)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn clear_cart(State(s): State<AppState>, Path(session): Path<String>) -> ApiResult<StatusCode> {
    s.carts.clear(&session)?;
    Ok(StatusCode::NO_CONTENT)
}

// ---------------------------------------------------------------------------
// Orders

#[derive(Debug, Deserialize)]
struct CheckoutRequest {
    user_id: Uuid,
    session: String,
    #[serde(default)]
    target_url: Option<String>,
}

async fn checkout(
    State(s): State<AppState>,
    Json(r): Json<CheckoutRequest>,
) -> ApiResult<(StatusCode, Json<Order>)> {
    s.auth.get(r.user_id)?;
    // Debit, order insert and cart wipe commit in one transaction.
    let order = s
        .orders
        .checkout_session(r.user_id, &r.session, r.target_url)
        .await?;
    Ok((StatusCode::CREATED, Json(order)))
}

#[derive(Debug, Deserialize)]
struct OrderListParams {
    user_id: Option<Uuid>,
}

async fn list_orders(
    State(s): State<AppState>,
    Query(params): Query<OrderListParams>,
) -> Json<Vec<Order>> {
    match params.user_id {
        Some(user_id) => Json(s.orders.user_orders(user_id)),
        None => Json(s.orders.all_orders()),
    }
}

async fn get_order(State(s): State<AppState>, Path(id): Path<String>) -> ApiResult<Json<Order>> {
    let id = OrderId::parse(id)?;
    Ok(Json(s.orders.get(&id)?))
}

#[derive(Debug, Deserialize)]
struct StatusUpdateRequest {
    status: OrderStatus,
}

async fn update_order_status(
    State(s): State<AppState>,
    Path(id): Path<String>,
    Json(r): Json<StatusUpdateRequest>,
) -> ApiResult<Json<Order>> {
    let id = OrderId::parse(id)?;
    Ok(Json(s.orders.update_order_status(&id, r.status)?))
}

async fn cancel_order(State(s): State<AppState>, Path(id): Path<String>) -> ApiResult<Json<Order>> {
    let id = OrderId::parse(id)?;
    Ok(Json(s.orders.cancel_order(&id)?))
}

// ---------------------------------------------------------------------------
// Payments

#[derive(Debug, Deserialize)]
struct CreatePaymentRequest {
    user_id: Uuid,
    amount: Decimal,
    method: PaymentMethod,
}

async fn create_payment(
    State(s): State<AppState>,
    Json(r): Json<CreatePaymentRequest>,
) -> ApiResult<(StatusCode, Json<PaymentRequest>)> {
    let user = s.auth.get(r.user_id)?;
    let request = s.payments.create_request(&user, r.amount, r.method)?;
    Ok((StatusCode::CREATED, Json(request)))
}

#[derive(Debug, Deserialize)]
struct PaymentListParams {
    #[serde(default)]
    pending: bool,
    user_id: Option<Uuid>,
}

async fn list_payments(
    State(s): State<AppState>,
    Query(params): Query<PaymentListParams>,
) -> Json<Vec<PaymentRequest>> {
    if params.pending {
        Json(s.payments.pending_requests())
    } else if let Some(user_id) = params.user_id {
        Json(s.payments.user_requests(user_id))
    } else {
        Json(s.payments.all_requests())
    }
}

#[derive(Debug, Default, Deserialize)]
struct ReviewRequest {
    admin_note: Option<String>,
}

async fn approve_payment(
    State(s): State<AppState>,
    Path(id): Path<String>,
    Json(r): Json<ReviewRequest>,
) -> ApiResult<Json<PaymentRequest>> {
    let id = PaymentId::parse(id)?;
    Ok(Json(s.payments.approve(&id, r.admin_note)?))
}

async fn reject_payment(
    State(s): State<AppState>,
    Path(id): Path<String>,
    Json(r): Json<ReviewRequest>,
) -> ApiResult<Json<PaymentRequest>> {
    let id = PaymentId::parse(id)?;
    Ok(Json(s.payments.reject(&id, r.admin_note)?))
}

// ---------------------------------------------------------------------------
// Auth and wallet

/// Public user view; the password hash never leaves the process.
#[derive(Debug, Serialize)]
struct UserResponse {
    id: Uuid,
    name: String,
    email: String,
    role: UserRole,
    balance: Decimal,
}

fn user_response(user: User, balance: Decimal) -> UserResponse {
    UserResponse {
        id: user.id,
        name: user.name,
        email: user.email.to_string(),
        role: user.role,
        balance,
    }
}

#[derive(Debug, Deserialize)]
struct RegisterRequest {
    name: String,
    email: String,
    password: String,
}

async fn register(
    State(s): State<AppState>,
    Json(r): Json<RegisterRequest>,
) -> ApiResult<(StatusCode, Json<UserResponse>)> {
    let user = s.auth.register(&r.name, &r.email, &r.password)?;
    Ok((StatusCode::CREATED, Json(user_response(user, Decimal::ZERO))))
}

#[derive(Debug, Deserialize)]
struct LoginRequest {
    email: String,
    password: String,
}

async fn login(State(s): State<AppState>, Json(r): Json<LoginRequest>) -> ApiResult<Json<UserResponse>> {
    let user = s.auth.login(&r.email, &r.password)?;
    let balance = s.auth.balance(user.id)?;
    Ok(Json(user_response(user, balance)))
}

async fn user_balance(
    State(s): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<serde_json::Value>> {
    s.auth.get(id)?;
    let balance = s.auth.balance(id)?;
    Ok(Json(serde_json::json!({ "user_id": id, "balance": balance })))
}

// ---------------------------------------------------------------------------
// Support and sync

#[derive(Debug, Deserialize)]
struct SupportParams {
    message: Option<String>,
}

async fn support_link(
    State(s): State<AppState>,
    Query(params): Query<SupportParams>,
) -> Json<serde_json::Value> {
    let message = params
        .message
        .unwrap_or_else(|| "Merhaba, destek almak istiyorum".into());
    let link = whatsapp_link(&s.config.support_phone, &message);
    Json(serde_json::json!({ "link": link }))
}

/// Force every subscriber in this process to re-read persisted state.
async fn resync(State(s): State<AppState>) -> StatusCode {
    s.notifier.resync();
    StatusCode::ACCEPTED
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_mapping() {
        let cases = [
            (StoreError::Validation("x".into()), StatusCode::BAD_REQUEST),
            (StoreError::NotFound("x".into()), StatusCode::NOT_FOUND),
            (StoreError::Conflict("x".into()), StatusCode::CONFLICT),
            (StoreError::InsufficientBalance, StatusCode::CONFLICT),
            (StoreError::Auth, StatusCode::UNAUTHORIZED),
            (StoreError::Storage("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, expected) in cases {
            let response = ApiError(err).into_response();
            assert_eq!(response.status(), expected);
        }
    }
}
