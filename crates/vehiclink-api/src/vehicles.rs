use anyhow::anyhow;
use axum::{
    Json,
    extract::{Path, State},
};

use vehiclink_types::api::VehicleOwnerResponse;

use crate::auth::AppState;
use crate::error::{ApiError, ApiResult, blocking};
use crate::input::normalize_vehicle_number;

/// GET /vehicles/{vnum}: who owns this vehicle.
pub async fn get_vehicle(
    State(state): State<AppState>,
    Path(vehicle_number): Path<String>,
) -> ApiResult<Json<VehicleOwnerResponse>> {
    let vehicle_number = normalize_vehicle_number(&vehicle_number);

    let owner = blocking(move || Ok(state.db.get_user_by_vehicle_number(&vehicle_number)?))
        .await?
        .ok_or(ApiError::NotFound("Vehicle not found"))?;

    Ok(Json(VehicleOwnerResponse {
        owner_id: owner
            .id
            .parse()
            .map_err(|e| anyhow!("Corrupt user id '{}': {}", owner.id, e))?,
        owner_name: owner.name,
        vehicle_name: owner.vehicle_name,
    }))
}
