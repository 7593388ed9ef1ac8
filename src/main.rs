//! Vitrine Cart - cart & pricing service for the Vitrine storefront

use anyhow::Result;
use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use sqlx::postgres::PgPoolOptions;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;
use validator::Validate;

use vitrine_cart::context::{merge_items, MergeReport};
use vitrine_cart::domain::aggregates::cart::{total_items, total_price_cents};
use vitrine_cart::domain::aggregates::{CartItem, CartItemDetail};
use vitrine_cart::domain::value_objects::Money;
use vitrine_cart::local::LocalCartItem;
use vitrine_cart::pricing::{self, RoleId};
use vitrine_cart::service::CartService;
use vitrine_cart::store::{PgCartLogSink, PgCartStore, PgVariantStore, VariantStore};
use vitrine_cart::CartError;

type Engine = CartService<PgCartStore, PgCartLogSink>;

#[derive(Clone)]
pub struct AppState {
    pub engine: Engine,
    pub variants: PgVariantStore,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry().with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into())).with(tracing_subscriber::fmt::layer()).init();
    let db = PgPoolOptions::new().max_connections(10).connect(&std::env::var("DATABASE_URL")?).await?;
    sqlx::migrate!("./migrations").run(&db).await?;

    let mut log = PgCartLogSink::new(db.clone());
    if let Ok(url) = std::env::var("NATS_URL") {
        match async_nats::connect(&url).await {
            Ok(client) => log = log.with_nats(client),
            Err(err) => tracing::warn!(error = %err, "NATS unavailable, cart events stay local"),
        }
    }
    let currency = std::env::var("CART_CURRENCY").unwrap_or_else(|_| "NGN".to_string());
    let state = AppState {
        engine: CartService::new(PgCartStore::new(db.clone()), log, currency),
        variants: PgVariantStore::new(db),
    };

    let app = Router::new()
        .route("/health", get(|| async { Json(serde_json::json!({"status": "healthy", "service": "vitrine-cart"})) }))
        .route("/api/v1/variants/:id", get(get_variant))
        .route("/api/v1/cart", get(get_cart).delete(clear_cart))
        .route("/api/v1/cart/items", post(add_to_cart))
        .route("/api/v1/cart/items/:id", put(update_quantity).delete(remove_item))
        .route("/api/v1/cart/quantity/:variant_id", get(quantity_in_cart))
        .route("/api/v1/cart/merge", post(merge_cart))
        .layer(TraceLayer::new_for_http()).layer(CorsLayer::permissive()).with_state(state);

    let port = std::env::var("PORT").unwrap_or_else(|_| "8084".to_string());
    tracing::info!("🛒 Vitrine Cart listening on 0.0.0.0:{}", port);
    axum::serve(tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?, app).await?;
    Ok(())
}

// =============================================================================
// Identity & error plumbing
// =============================================================================

/// Identity is supplied by the session layer in front of this service and
/// trusted as given.
fn customer_id(headers: &HeaderMap) -> std::result::Result<Uuid, ApiError> {
    headers
        .get("x-customer-id")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| Uuid::parse_str(v).ok())
        .ok_or(ApiError::Unauthorized)
}

fn customer_role(headers: &HeaderMap) -> Option<RoleId> {
    headers
        .get("x-customer-role")
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(RoleId::new)
}

enum ApiError {
    Cart(CartError),
    Unauthorized,
    Validation(String),
}

impl From<CartError> for ApiError {
    fn from(err: CartError) -> Self { Self::Cart(err) }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, serde_json::json!({"error": "Missing or invalid customer identity"})),
            ApiError::Validation(msg) => (StatusCode::UNPROCESSABLE_ENTITY, serde_json::json!({"error": msg})),
            ApiError::Cart(err) => {
                let status = match &err {
                    CartError::VariantNotFound | CartError::CartNotFound | CartError::ItemNotFound => StatusCode::NOT_FOUND,
                    CartError::StockExceeded { .. } | CartError::Conflict => StatusCode::CONFLICT,
                    CartError::InvalidQuantity => StatusCode::UNPROCESSABLE_ENTITY,
                    CartError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
                };
                let body = match &err {
                    // The storefront renders "only N more available" from this.
                    CartError::StockExceeded { available } => serde_json::json!({"error": err.to_string(), "available": available}),
                    CartError::Storage(_) => serde_json::json!({"error": "Storage failure"}),
                    _ => serde_json::json!({"error": err.to_string()}),
                };
                (status, body)
            }
        };
        (status, Json(body)).into_response()
    }
}

// =============================================================================
// Handlers
// =============================================================================

#[derive(Debug, Serialize)]
pub struct VariantView {
    pub id: Uuid,
    pub sku: String,
    pub title: String,
    pub stock: i32,
    pub public_price_cents: i64,
    /// Price for the requesting role, already resolved server-side.
    pub effective_price: Money,
}

async fn get_variant(State(s): State<AppState>, headers: HeaderMap, Path(id): Path<Uuid>) -> std::result::Result<Json<VariantView>, ApiError> {
    let variant = s.variants.get_variant(id).await?.ok_or(CartError::VariantNotFound)?;
    let overrides = s.variants.role_overrides(id).await?;
    let role = customer_role(&headers);
    let effective = pricing::resolve(&variant, &overrides, role.as_ref());
    Ok(Json(VariantView {
        id: variant.id,
        sku: variant.sku,
        title: variant.title,
        stock: variant.stock,
        public_price_cents: variant.public_price_cents,
        effective_price: Money::new(effective, s.engine.currency()),
    }))
}

#[derive(Debug, Serialize)]
pub struct CartView {
    pub cart_id: Uuid,
    pub currency: String,
    pub items: Vec<CartItemDetail>,
    pub total_items: u32,
    pub total_price: Money,
}

async fn get_cart(State(s): State<AppState>, headers: HeaderMap) -> std::result::Result<Json<CartView>, ApiError> {
    let customer = customer_id(&headers)?;
    let cart = s.engine.get_or_create_cart(customer).await?;
    let items = s.engine.list_items(cart.id).await?;
    Ok(Json(CartView {
        cart_id: cart.id,
        total_items: total_items(&items),
        total_price: Money::new(total_price_cents(&items), &cart.currency),
        currency: cart.currency,
        items,
    }))
}

#[derive(Debug, Deserialize, Validate)]
pub struct AddToCartRequest {
    pub variant_id: Uuid,
    #[validate(range(min = 1))]
    pub quantity: u32,
}

async fn add_to_cart(State(s): State<AppState>, headers: HeaderMap, Json(r): Json<AddToCartRequest>) -> std::result::Result<(StatusCode, Json<CartItem>), ApiError> {
    r.validate().map_err(|e| ApiError::Validation(e.to_string()))?;
    let customer = customer_id(&headers)?;
    let role = customer_role(&headers);

    // Resolve the role price here, before the service freezes it onto the item.
    let variant = s.variants.get_variant(r.variant_id).await?.ok_or(CartError::VariantNotFound)?;
    let overrides = s.variants.role_overrides(r.variant_id).await?;
    let unit_price_cents = pricing::resolve(&variant, &overrides, role.as_ref());

    let cart = s.engine.get_or_create_cart(customer).await?;
    let item = s.engine.add_item(cart.id, r.variant_id, r.quantity, unit_price_cents).await?;
    Ok((StatusCode::CREATED, Json(item)))
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateQuantityRequest {
    #[validate(range(min = 1))]
    pub quantity: u32,
}

async fn update_quantity(State(s): State<AppState>, headers: HeaderMap, Path(id): Path<Uuid>, Json(r): Json<UpdateQuantityRequest>) -> std::result::Result<Json<CartItem>, ApiError> {
    r.validate().map_err(|e| ApiError::Validation(e.to_string()))?;
    customer_id(&headers)?;
    let item = s.engine.update_item_quantity(id, r.quantity).await?;
    Ok(Json(item))
}

async fn remove_item(State(s): State<AppState>, headers: HeaderMap, Path(id): Path<Uuid>) -> std::result::Result<StatusCode, ApiError> {
    customer_id(&headers)?;
    s.engine.remove_item(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn clear_cart(State(s): State<AppState>, headers: HeaderMap) -> std::result::Result<StatusCode, ApiError> {
    let customer = customer_id(&headers)?;
    let cart = s.engine.get_or_create_cart(customer).await?;
    s.engine.clear_cart(cart.id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn quantity_in_cart(State(s): State<AppState>, headers: HeaderMap, Path(variant_id): Path<Uuid>) -> std::result::Result<Json<serde_json::Value>, ApiError> {
    let customer = customer_id(&headers)?;
    let cart = s.engine.get_or_create_cart(customer).await?;
    let quantity = s.engine.quantity_in_cart(cart.id, variant_id).await?;
    Ok(Json(serde_json::json!({"variant_id": variant_id, "quantity": quantity})))
}

/// Login reconciliation: the storefront posts the device cart's items once
/// the visitor authenticates; rejected lines come back with the reason.
#[derive(Debug, Deserialize)]
pub struct MergeRequest {
    pub items: Vec<LocalCartItem>,
}

#[derive(Debug, Serialize)]
pub struct MergeView {
    pub merged: Vec<CartItem>,
    pub rejected: Vec<RejectionView>,
}

#[derive(Debug, Serialize)]
pub struct RejectionView {
    pub variant_id: Uuid,
    pub requested: u32,
    pub reason: String,
    pub available: Option<u32>,
}

impl From<MergeReport> for MergeView {
    fn from(report: MergeReport) -> Self {
        Self {
            merged: report.merged,
            rejected: report
                .rejected
                .into_iter()
                .map(|r| RejectionView {
                    variant_id: r.variant_id,
                    requested: r.requested,
                    reason: r.reason.to_string(),
                    available: match r.reason {
                        CartError::StockExceeded { available } => Some(available),
                        _ => None,
                    },
                })
                .collect(),
        }
    }
}

async fn merge_cart(State(s): State<AppState>, headers: HeaderMap, Json(r): Json<MergeRequest>) -> std::result::Result<Json<MergeView>, ApiError> {
    let customer = customer_id(&headers)?;
    let cart = s.engine.get_or_create_cart(customer).await?;
    let report = merge_items(&s.engine, cart.id, r.items).await;
    Ok(Json(report.into()))
}
