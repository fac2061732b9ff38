use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get, patch, post},
    Json, Router,
};
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use super::common::{created_response, deleted_response, success_response, ValidatedJson};
use crate::{
    errors::ServiceError,
    models::{parse_enum, Cart, CartStatus},
    services::cart_service::{AddItemInput, CreateCartInput},
    ApiResponse, AppState,
};

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateQuantityRequest {
    pub quantity: i32,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CartStatusRequest {
    #[validate(length(min = 1))]
    pub status: String,
}

pub fn cart_routes() -> Router<AppState> {
    Router::new()
        .route("/", post(create_cart).get(list_carts))
        .route("/user/{email}", get(get_cart_for_user))
        .route("/{id}", get(get_cart).delete(delete_cart))
        .route("/{id}/items", post(add_item))
        .route("/{id}/items/{menu_item_id}", delete(remove_item))
        .route("/{id}/items/{menu_item_id}/quantity", patch(update_item_quantity))
        .route("/{id}/clear", delete(clear_cart))
        .route("/{id}/status", patch(change_status))
}

pub async fn create_cart(
    State(state): State<AppState>,
    ValidatedJson(input): ValidatedJson<CreateCartInput>,
) -> Result<(StatusCode, Json<ApiResponse<Cart>>), ServiceError> {
    let cart = state.services.carts.create_cart(input).await?;
    Ok(created_response(cart))
}

pub async fn list_carts(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Vec<Cart>>>, ServiceError> {
    Ok(success_response(state.services.carts.list_carts().await?))
}

pub async fn get_cart(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<Cart>>, ServiceError> {
    Ok(success_response(state.services.carts.get_cart(id).await?))
}

pub async fn get_cart_for_user(
    State(state): State<AppState>,
    Path(email): Path<String>,
) -> Result<Json<ApiResponse<Cart>>, ServiceError> {
    Ok(success_response(
        state.services.carts.get_cart_for_user(&email).await?,
    ))
}

pub async fn add_item(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    ValidatedJson(input): ValidatedJson<AddItemInput>,
) -> Result<Json<ApiResponse<Cart>>, ServiceError> {
    Ok(success_response(state.services.carts.add_item(id, input).await?))
}

pub async fn update_item_quantity(
    State(state): State<AppState>,
    Path((id, menu_item_id)): Path<(Uuid, Uuid)>,
    ValidatedJson(body): ValidatedJson<UpdateQuantityRequest>,
) -> Result<Json<ApiResponse<Cart>>, ServiceError> {
    let cart = state
        .services
        .carts
        .update_item_quantity(id, menu_item_id, body.quantity)
        .await?;
    Ok(success_response(cart))
}

pub async fn remove_item(
    State(state): State<AppState>,
    Path((id, menu_item_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<ApiResponse<Cart>>, ServiceError> {
    Ok(success_response(
        state.services.carts.remove_item(id, menu_item_id).await?,
    ))
}

pub async fn clear_cart(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<Cart>>, ServiceError> {
    Ok(success_response(state.services.carts.clear_cart(id).await?))
}

pub async fn delete_cart(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<()>>, ServiceError> {
    state.services.carts.delete_cart(id).await?;
    Ok(deleted_response("Cart deleted"))
}

pub async fn change_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    ValidatedJson(body): ValidatedJson<CartStatusRequest>,
) -> Result<Json<ApiResponse<Cart>>, ServiceError> {
    let status: CartStatus = parse_enum("cart status", &body.status)?;
    Ok(success_response(
        state.services.carts.change_status(id, status).await?,
    ))
}
