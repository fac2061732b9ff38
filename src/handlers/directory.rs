use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, patch, post, put},
    Json, Router,
};
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use super::common::{created_response, deleted_response, success_response, ValidatedJson};
use crate::{
    errors::ServiceError,
    models::{parse_enum, GeoPoint, MenuItem, Restaurant, Rider, RiderAvailability, User},
    services::directory_service::{
        MenuFilter, MenuItemUpdate, NewMenuItem, NewRestaurant, NewRider, NewUser,
        RestaurantFilter, RestaurantUpdate, RiderUpdate,
    },
    ApiResponse, AppState,
};

#[derive(Debug, Deserialize, Validate)]
pub struct RiderAvailabilityRequest {
    #[validate(length(min = 1))]
    pub availability: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct RiderLocationRequest {
    pub latitude: f64,
    pub longitude: f64,
}

/// Query parameters for `GET /restaurants`. `q` is a free-text search.
#[derive(Debug, Default, Deserialize)]
pub struct RestaurantListQuery {
    pub cuisine: Option<String>,
    pub city: Option<String>,
    pub area: Option<String>,
    pub category: Option<String>,
    pub featured: Option<bool>,
    pub q: Option<String>,
}

impl RestaurantListQuery {
    fn into_filter(self) -> RestaurantFilter {
        RestaurantFilter {
            cuisine: non_blank(self.cuisine),
            city: non_blank(self.city),
            area: non_blank(self.area),
            category: non_blank(self.category),
            featured: self.featured,
            search: non_blank(self.q),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct MenuListQuery {
    pub category: Option<String>,
    pub featured: Option<bool>,
    pub available: Option<bool>,
}

impl MenuListQuery {
    fn into_filter(self) -> MenuFilter {
        MenuFilter {
            category: non_blank(self.category),
            featured: self.featured,
            available: self.available,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct AvailableRidersQuery {
    pub city: Option<String>,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/", post(create_user))
        .route("/{email}", get(get_user))
}

pub fn restaurant_routes() -> Router<AppState> {
    Router::new()
        .route("/", post(create_restaurant).get(list_restaurants))
        .route(
            "/{id}",
            get(get_restaurant)
                .patch(update_restaurant)
                .delete(delete_restaurant),
        )
        .route("/{id}/menu", post(add_menu_item).get(list_menu))
        .route(
            "/{id}/menu/{menu_item_id}",
            get(get_menu_item)
                .patch(update_menu_item)
                .delete(delete_menu_item),
        )
}

pub fn rider_routes() -> Router<AppState> {
    Router::new()
        .route("/", post(create_rider))
        .route("/available", get(available_riders))
        .route("/{id}", get(get_rider).patch(update_rider).delete(delete_rider))
        .route("/{id}/availability", put(set_availability))
        .route("/{id}/location", patch(update_rider_location))
}

pub async fn create_user(
    State(state): State<AppState>,
    ValidatedJson(input): ValidatedJson<NewUser>,
) -> Result<(StatusCode, Json<ApiResponse<User>>), ServiceError> {
    Ok(created_response(
        state.services.directory.create_user(input).await?,
    ))
}

pub async fn get_user(
    State(state): State<AppState>,
    Path(email): Path<String>,
) -> Result<Json<ApiResponse<User>>, ServiceError> {
    Ok(success_response(
        state.services.directory.get_user_by_email(&email).await?,
    ))
}

pub async fn create_restaurant(
    State(state): State<AppState>,
    ValidatedJson(input): ValidatedJson<NewRestaurant>,
) -> Result<(StatusCode, Json<ApiResponse<Restaurant>>), ServiceError> {
    Ok(created_response(
        state.services.directory.create_restaurant(input).await?,
    ))
}

pub async fn get_restaurant(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<Restaurant>>, ServiceError> {
    Ok(success_response(
        state.services.directory.get_restaurant(id).await?,
    ))
}

pub async fn list_restaurants(
    State(state): State<AppState>,
    Query(query): Query<RestaurantListQuery>,
) -> Result<Json<ApiResponse<Vec<Restaurant>>>, ServiceError> {
    Ok(success_response(
        state
            .services
            .directory
            .list_restaurants(&query.into_filter())
            .await?,
    ))
}

pub async fn update_restaurant(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    ValidatedJson(input): ValidatedJson<RestaurantUpdate>,
) -> Result<Json<ApiResponse<Restaurant>>, ServiceError> {
    Ok(success_response(
        state.services.directory.update_restaurant(id, input).await?,
    ))
}

pub async fn delete_restaurant(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<()>>, ServiceError> {
    state.services.directory.delete_restaurant(id).await?;
    Ok(deleted_response("Restaurant deactivated"))
}

pub async fn add_menu_item(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    ValidatedJson(input): ValidatedJson<NewMenuItem>,
) -> Result<(StatusCode, Json<ApiResponse<MenuItem>>), ServiceError> {
    Ok(created_response(
        state.services.directory.add_menu_item(id, input).await?,
    ))
}

pub async fn list_menu(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<MenuListQuery>,
) -> Result<Json<ApiResponse<Vec<MenuItem>>>, ServiceError> {
    Ok(success_response(
        state
            .services
            .directory
            .list_menu(id, &query.into_filter())
            .await?,
    ))
}

pub async fn get_menu_item(
    State(state): State<AppState>,
    Path((id, menu_item_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<ApiResponse<MenuItem>>, ServiceError> {
    Ok(success_response(
        state.services.directory.get_menu_item(id, menu_item_id).await?,
    ))
}

pub async fn update_menu_item(
    State(state): State<AppState>,
    Path((id, menu_item_id)): Path<(Uuid, Uuid)>,
    ValidatedJson(input): ValidatedJson<MenuItemUpdate>,
) -> Result<Json<ApiResponse<MenuItem>>, ServiceError> {
    Ok(success_response(
        state
            .services
            .directory
            .update_menu_item(id, menu_item_id, input)
            .await?,
    ))
}

pub async fn delete_menu_item(
    State(state): State<AppState>,
    Path((id, menu_item_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<ApiResponse<()>>, ServiceError> {
    state
        .services
        .directory
        .delete_menu_item(id, menu_item_id)
        .await?;
    Ok(deleted_response("Menu item deleted"))
}

pub async fn create_rider(
    State(state): State<AppState>,
    ValidatedJson(input): ValidatedJson<NewRider>,
) -> Result<(StatusCode, Json<ApiResponse<Rider>>), ServiceError> {
    Ok(created_response(
        state.services.directory.create_rider(input).await?,
    ))
}

pub async fn get_rider(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<Rider>>, ServiceError> {
    Ok(success_response(state.services.directory.get_rider(id).await?))
}

pub async fn update_rider(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    ValidatedJson(input): ValidatedJson<RiderUpdate>,
) -> Result<Json<ApiResponse<Rider>>, ServiceError> {
    Ok(success_response(
        state.services.directory.update_rider(id, input).await?,
    ))
}

pub async fn update_rider_location(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    ValidatedJson(body): ValidatedJson<RiderLocationRequest>,
) -> Result<Json<ApiResponse<Rider>>, ServiceError> {
    let location = GeoPoint {
        latitude: body.latitude,
        longitude: body.longitude,
    };
    Ok(success_response(
        state
            .services
            .directory
            .update_rider_location(id, location)
            .await?,
    ))
}

pub async fn delete_rider(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<()>>, ServiceError> {
    state.services.directory.delete_rider(id).await?;
    Ok(deleted_response("Rider deleted"))
}

pub async fn available_riders(
    State(state): State<AppState>,
    Query(query): Query<AvailableRidersQuery>,
) -> Result<Json<ApiResponse<Vec<Rider>>>, ServiceError> {
    Ok(success_response(
        state
            .services
            .directory
            .available_riders(query.city.as_deref())
            .await?,
    ))
}

pub async fn set_availability(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    ValidatedJson(body): ValidatedJson<RiderAvailabilityRequest>,
) -> Result<Json<ApiResponse<Rider>>, ServiceError> {
    let availability: RiderAvailability = parse_enum("availability", &body.availability)?;
    Ok(success_response(
        state
            .services
            .directory
            .set_rider_availability(id, availability)
            .await?,
    ))
}
