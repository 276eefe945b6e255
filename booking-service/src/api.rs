use std::sync::Arc;

use axum::{
    async_trait,
    extract::{FromRequestParts, Path, Query, State},
    http::{request::Parts, StatusCode},
    response::Json,
    routing::{get, patch, post},
    Router,
};
use booking_engine::{
    Booking, BookingError, BookingRequest, BookingService, BookingSummary, Invoice, Room, UserRole,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<BookingService>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);
type ApiResult<T> = Result<T, ApiError>;

fn api_error(status: StatusCode, error: impl Into<String>) -> ApiError {
    (status, Json(ErrorResponse { error: error.into() }))
}

fn status_of(err: &BookingError) -> StatusCode {
    match err {
        BookingError::NotFound { .. } => StatusCode::NOT_FOUND,
        BookingError::NoAvailability { .. }
        | BookingError::RoomAlreadyExists(_)
        | BookingError::UserAlreadyExists(_) => StatusCode::CONFLICT,
        BookingError::InvalidInterval(_) | BookingError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        BookingError::Consistency(_) | BookingError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn from_engine(err: BookingError) -> ApiError {
    let status = status_of(&err);
    if status.is_server_error() {
        tracing::error!("Request failed: {}", err);
    }
    api_error(status, err.to_string())
}

/// Identity asserted by the gateway in front of this service.
#[derive(Debug, Clone)]
pub struct Caller {
    pub user_id: String,
    pub role: UserRole,
}

impl Caller {
    fn require_staff(&self) -> ApiResult<()> {
        if self.role.is_staff() {
            Ok(())
        } else {
            Err(api_error(StatusCode::FORBIDDEN, "staff access required"))
        }
    }

    fn require_self_or_staff(&self, user_id: &str) -> ApiResult<()> {
        if self.role.is_staff() || self.user_id == user_id {
            Ok(())
        } else {
            Err(api_error(StatusCode::FORBIDDEN, "not allowed to access this user's data"))
        }
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for Caller
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = |name: &str| {
            parts
                .headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };
        let user_id = header("x-user-id")
            .filter(|id| !id.is_empty())
            .ok_or_else(|| api_error(StatusCode::UNAUTHORIZED, "missing x-user-id header"))?;
        let role = header("x-user-role")
            .unwrap_or_else(|| UserRole::Customer.to_string())
            .parse::<UserRole>()
            .map_err(|e| api_error(StatusCode::UNAUTHORIZED, e.to_string()))?;
        Ok(Self { user_id, role })
    }
}

#[derive(Debug, Deserialize)]
pub struct AvailabilityParams {
    pub category: String,
    pub checkin: String,
    pub checkout: String,
}

#[derive(Debug, Serialize)]
pub struct AvailabilityResponse {
    pub category: String,
    pub count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rooms: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
pub struct CreateRoomRequest {
    pub room_id: String,
    pub category: String,
}

#[derive(Debug, Deserialize)]
pub struct RoomStatusRequest {
    pub status: String,
}

#[derive(Debug, Serialize)]
pub struct CheckoutResponse {
    pub booking: Booking,
    pub already_applied: bool,
    pub invoice: Option<Invoice>,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/bookings", post(create_booking))
        .route("/bookings/:booking_id", get(get_booking))
        .route("/bookings/:booking_id/checkout", post(checkout_booking))
        .route("/users/:user_id/bookings", get(user_bookings))
        .route("/rooms", post(create_room))
        .route("/rooms/availability", get(availability))
        .route("/rooms/:room_id/status", patch(update_room_status))
        .route("/health", get(health_check))
        .with_state(state)
        .layer(
            tower_http::cors::CorsLayer::new()
                .allow_origin(tower_http::cors::Any)
                .allow_methods(tower_http::cors::Any)
                .allow_headers(tower_http::cors::Any),
        )
}

pub async fn create_booking(
    State(state): State<AppState>,
    caller: Caller,
    Json(request): Json<BookingRequest>,
) -> ApiResult<(StatusCode, Json<Booking>)> {
    let booking = state
        .service
        .create_booking(&request, &caller.user_id)
        .await
        .map_err(from_engine)?;
    tracing::info!("Booking {} created for user {}", booking.booking_id, caller.user_id);
    Ok((StatusCode::CREATED, Json(booking)))
}

pub async fn get_booking(
    State(state): State<AppState>,
    caller: Caller,
    Path(booking_id): Path<Uuid>,
) -> ApiResult<Json<Booking>> {
    let booking = state.service.get_booking(booking_id).await.map_err(from_engine)?;
    caller.require_self_or_staff(&booking.user_id)?;
    Ok(Json(booking))
}

/// Staff-driven checkout; the automatic path arrives as a command instead.
pub async fn checkout_booking(
    State(state): State<AppState>,
    caller: Caller,
    Path(booking_id): Path<Uuid>,
) -> ApiResult<Json<CheckoutResponse>> {
    caller.require_staff()?;
    let booking = state.service.get_booking(booking_id).await.map_err(from_engine)?;
    let result = state
        .service
        .checkout(booking_id, &booking.user_id, &booking.room_id)
        .await
        .map_err(from_engine)?;
    Ok(Json(CheckoutResponse {
        already_applied: result.outcome.already_applied(),
        booking: result.outcome.into_booking(),
        invoice: result.invoice,
    }))
}

pub async fn user_bookings(
    State(state): State<AppState>,
    caller: Caller,
    Path(user_id): Path<String>,
) -> ApiResult<Json<Vec<BookingSummary>>> {
    caller.require_self_or_staff(&user_id)?;
    let bookings = state.service.user_bookings(&user_id).await.map_err(from_engine)?;
    Ok(Json(bookings))
}

/// Customers learn how many rooms are free, staff also which ones.
pub async fn availability(
    State(state): State<AppState>,
    caller: Caller,
    Query(params): Query<AvailabilityParams>,
) -> ApiResult<Json<AvailabilityResponse>> {
    let rooms = state
        .service
        .availability(&params.category, &params.checkin, &params.checkout)
        .await
        .map_err(from_engine)?;
    Ok(Json(AvailabilityResponse {
        category: params.category.to_ascii_uppercase(),
        count: rooms.len(),
        rooms: caller.role.is_staff().then_some(rooms),
    }))
}

pub async fn create_room(
    State(state): State<AppState>,
    caller: Caller,
    Json(request): Json<CreateRoomRequest>,
) -> ApiResult<(StatusCode, Json<Room>)> {
    caller.require_staff()?;
    let room = state
        .service
        .add_room(&request.room_id, &request.category)
        .await
        .map_err(from_engine)?;
    Ok((StatusCode::CREATED, Json(room)))
}

pub async fn update_room_status(
    State(state): State<AppState>,
    caller: Caller,
    Path(room_id): Path<String>,
    Json(request): Json<RoomStatusRequest>,
) -> ApiResult<Json<Room>> {
    caller.require_staff()?;
    state
        .service
        .update_room_status(&room_id, &request.status)
        .await
        .map_err(from_engine)?;
    let room = state.service.get_room(&room_id).await.map_err(from_engine)?;
    Ok(Json(room))
}

pub async fn health_check() -> &'static str {
    "OK"
}
