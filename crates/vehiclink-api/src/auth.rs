use std::sync::Arc;

use anyhow::anyhow;
use axum::{Json, extract::State};
use tracing::{debug, info};
use uuid::Uuid;

use vehiclink_db::Database;
use vehiclink_db::models::{NewUser, Registration};
use vehiclink_types::api::{
    LoginRequest, LoginResponse, RegisterRequest, SendOtpRequest, StatusMessage, UserProfile,
    VerifyOtpRequest,
};

use crate::error::{ApiError, ApiJson, ApiResult, blocking};
use crate::input::{normalize_email, normalize_vehicle_number, present};
use crate::otp::{OtpCheck, OtpStore};
use crate::password::{hash_password, verify_password};

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    pub otp: OtpStore,
}

const INVALID_CREDENTIALS: &str = "Invalid credentials";

/// Passwords are taken verbatim; only an empty one counts as missing.
fn password_field(field: &Option<String>) -> Option<&str> {
    field.as_deref().filter(|p| !p.is_empty())
}

pub async fn send_otp(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<SendOtpRequest>,
) -> ApiResult<Json<StatusMessage>> {
    let email = present(&req.email)
        .map(normalize_email)
        .ok_or_else(|| ApiError::validation("Email required"))?;

    let db = state.clone();
    let lookup = email.clone();
    let registered = blocking(move || Ok(db.db.get_user_by_email(&lookup)?.is_some())).await?;
    if registered {
        return Err(ApiError::validation("Email already registered"));
    }

    let code = state.otp.issue(&email)?;
    // No mail delivery: the log is the only place the code shows up.
    info!("Verification code for {}: {}", email, code);

    Ok(Json(StatusMessage::new("OTP sent")))
}

pub async fn verify_otp(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<VerifyOtpRequest>,
) -> ApiResult<Json<StatusMessage>> {
    let (Some(email), Some(code)) = (present(&req.email), present(&req.otp)) else {
        return Err(ApiError::validation("Email and OTP required"));
    };
    let email = normalize_email(email);

    match state.otp.verify(&email, code)? {
        OtpCheck::Verified => Ok(Json(StatusMessage::new("OTP verified"))),
        check => {
            debug!("Code check for {} failed: {:?}", email, check);
            Err(ApiError::Unauthorized("Invalid OTP"))
        }
    }
}

pub async fn register(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<RegisterRequest>,
) -> ApiResult<Json<StatusMessage>> {
    let (Some(email), Some(name), Some(vehicle_name), Some(vehicle_number), Some(password)) = (
        present(&req.email),
        present(&req.name),
        present(&req.vehicle_name),
        present(&req.vehicle_number),
        password_field(&req.password),
    ) else {
        return Err(ApiError::validation("All fields required"));
    };

    let email = normalize_email(email);
    let name = name.to_string();
    let vehicle_name = vehicle_name.to_string();
    let vehicle_number = normalize_vehicle_number(vehicle_number);
    let password = password.to_string();

    let user_id = blocking(move || {
        let password_hash = hash_password(&password)?;
        let user_id = Uuid::new_v4().to_string();

        let outcome = state.db.register_user(&NewUser {
            id: &user_id,
            email: &email,
            name: &name,
            vehicle_name: &vehicle_name,
            vehicle_number: &vehicle_number,
            password_hash: &password_hash,
        })?;

        match outcome {
            Registration::Created => Ok(user_id),
            Registration::EmailTaken => Err(ApiError::validation("User already exists")),
            Registration::VehicleTaken => Err(ApiError::validation("Vehicle already registered")),
        }
    })
    .await?;

    info!("Registered user {}", user_id);
    Ok(Json(StatusMessage::new("Account created")))
}

pub async fn login(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<LoginRequest>,
) -> ApiResult<Json<LoginResponse>> {
    let (Some(email), Some(password)) = (present(&req.email), password_field(&req.password))
    else {
        return Err(ApiError::validation("Email and password required"));
    };
    let email = normalize_email(email);
    let password = password.to_string();

    let user = blocking(move || {
        let user = state.db.get_user_by_email(&email)?;
        let matched = verify_password(&password, user.as_ref().map(|u| u.password.as_str()))?;

        // Same answer whether the account is missing or the password is wrong
        match user {
            Some(user) if matched => Ok(user),
            _ => Err(ApiError::Unauthorized(INVALID_CREDENTIALS)),
        }
    })
    .await?;

    let id: Uuid = user
        .id
        .parse()
        .map_err(|e| anyhow!("Corrupt user id '{}': {}", user.id, e))?;

    Ok(Json(LoginResponse {
        message: "Login successful".to_string(),
        user: UserProfile {
            id,
            email: user.email,
            name: user.name,
            vehicle_name: user.vehicle_name,
            vehicle_number: user.vehicle_number,
        },
    }))
}
