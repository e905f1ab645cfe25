//! Cart route handlers.
//!
//! All responses use the `{"success": ..., "data": ..., "message": ...}`
//! envelope. Mutations return the saved cart; reads return it enriched with
//! product details.

use axum::{
    Json,
    extract::{FromRequest, State},
};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use bazaar_core::{Cart, CartItem, EnrichedCart, LineKey};

use crate::cart::{CartError, MergeOutcome, parse_product_id};
use crate::error::{AppError, Result};
use crate::middleware::CartRequestIdentity;
use crate::state::AppState;

/// Success envelope.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    const fn data(data: T) -> Self {
        Self {
            success: true,
            message: None,
            data: Some(data),
        }
    }

    const fn message(message: &'static str, data: Option<T>) -> Self {
        Self {
            success: true,
            message: Some(message),
            data,
        }
    }
}

/// JSON request body whose rejections use the error envelope.
#[derive(Debug, FromRequest)]
#[from_request(via(Json), rejection(AppError))]
pub struct ApiJson<T>(pub T);

/// Identifies a line in request bodies.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineRequest {
    pub product_id: String,
    #[serde(default)]
    pub selected_size: String,
    #[serde(default)]
    pub selected_color: String,
}

impl LineRequest {
    fn key(&self) -> std::result::Result<LineKey, CartError> {
        Ok(LineKey::new(
            parse_product_id(&self.product_id)?,
            self.selected_size.clone(),
            self.selected_color.clone(),
        ))
    }
}

const fn default_quantity() -> i64 {
    1
}

/// Body of `POST /api/cart/items`.
#[derive(Debug, Deserialize)]
pub struct AddItemRequest {
    #[serde(flatten)]
    pub line: LineRequest,
    #[serde(default = "default_quantity")]
    pub quantity: i64,
}

/// Body of `PATCH /api/cart/items`.
#[derive(Debug, Deserialize)]
pub struct UpdateItemRequest {
    #[serde(flatten)]
    pub line: LineRequest,
    pub quantity: i64,
}

/// Convert a client quantity. Negative values and values beyond `u32` are rejected.
fn quantity(raw: i64) -> std::result::Result<u32, CartError> {
    u32::try_from(raw).map_err(|_| CartError::InvalidQuantity)
}

/// Show the cart with product details.
///
/// A shopper with no identity gets an empty cart rather than an error.
#[instrument(skip(state, resolved))]
pub async fn show(
    State(state): State<AppState>,
    CartRequestIdentity(resolved): CartRequestIdentity,
) -> Result<Json<ApiResponse<EnrichedCart>>> {
    let cart = match resolved.identity.as_ref() {
        Some(identity) => state.carts().get_cart_enriched(Some(identity)).await?,
        None => EnrichedCart::anonymous(),
    };
    Ok(Json(ApiResponse::data(cart)))
}

/// Add a line, or add to the quantity of an existing one.
#[instrument(skip(state, resolved))]
pub async fn add_item(
    State(state): State<AppState>,
    CartRequestIdentity(resolved): CartRequestIdentity,
    ApiJson(body): ApiJson<AddItemRequest>,
) -> Result<Json<ApiResponse<Cart>>> {
    let key = body.line.key()?;
    let item = CartItem::new(
        key.product_id,
        quantity(body.quantity)?,
        key.selected_size,
        key.selected_color,
    );

    let cart = state
        .carts()
        .add_item(resolved.identity.as_ref(), item)
        .await?;
    Ok(Json(ApiResponse::message("Item added to cart", Some(cart))))
}

/// Set the quantity of a line. Zero removes it.
#[instrument(skip(state, resolved))]
pub async fn update_item(
    State(state): State<AppState>,
    CartRequestIdentity(resolved): CartRequestIdentity,
    ApiJson(body): ApiJson<UpdateItemRequest>,
) -> Result<Json<ApiResponse<Cart>>> {
    let key = body.line.key()?;
    let quantity = quantity(body.quantity)?;

    let cart = state
        .carts()
        .update_quantity(resolved.identity.as_ref(), &key, quantity)
        .await?;
    Ok(Json(ApiResponse::data(cart)))
}

/// Remove a line.
#[instrument(skip(state, resolved))]
pub async fn remove_item(
    State(state): State<AppState>,
    CartRequestIdentity(resolved): CartRequestIdentity,
    ApiJson(body): ApiJson<LineRequest>,
) -> Result<Json<ApiResponse<Cart>>> {
    let key = body.key()?;
    let cart = state
        .carts()
        .remove_item(resolved.identity.as_ref(), &key)
        .await?;
    Ok(Json(ApiResponse::message("Item removed from cart", Some(cart))))
}

/// Remove every line.
#[instrument(skip(state, resolved))]
pub async fn clear(
    State(state): State<AppState>,
    CartRequestIdentity(resolved): CartRequestIdentity,
) -> Result<Json<ApiResponse<Cart>>> {
    let cart = state.carts().clear_cart(resolved.identity.as_ref()).await?;
    Ok(Json(ApiResponse::message("Cart cleared", Some(cart))))
}

/// Merge the `X-Session-ID` cart into the signed-in user's cart.
#[instrument(skip(state, resolved))]
pub async fn merge(
    State(state): State<AppState>,
    CartRequestIdentity(resolved): CartRequestIdentity,
) -> Result<Json<ApiResponse<Cart>>> {
    let outcome = state
        .carts()
        .merge_carts(resolved.identity.as_ref(), resolved.session_id.as_ref())
        .await?;

    let response = match outcome {
        MergeOutcome::Merged { cart, .. } => ApiResponse::message("Cart merged", Some(cart)),
        MergeOutcome::NothingToMerge => ApiResponse::message("Nothing to merge", None),
    };
    Ok(Json(response))
}
