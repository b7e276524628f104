// specdriven-service/src/routes/auth_routes.rs
use crate::models::{LoginResponse, ServiceError, User, UserCredentials};
use crate::utils::{caller_from_request, jwt, password, user_storage};
use actix_web::{get, post, web, HttpRequest, HttpResponse};
use chrono::Utc;
use log::{debug, error, info};
use serde_json::json;
use uuid::Uuid;

// Register a new user
#[post("/auth/register")]
async fn register(credentials: web::Json<UserCredentials>) -> Result<HttpResponse, ServiceError> {
    let email = credentials.email.trim().to_lowercase();
    info!("📝 Register request for email: {}", email);

    if email.is_empty() || credentials.password.is_empty() {
        return Err(ServiceError::BadRequest(
            "email and password are required".to_string(),
        ));
    }

    // Check if the email already exists
    if user_storage::find_user_by_email(&email)?.is_some() {
        error!("❌ Email already registered: {}", email);
        return Err(ServiceError::BadRequest("Email already registered".to_string()));
    }

    // Create a new user
    let user = User {
        id: Uuid::new_v4().to_string(),
        email,
        password_hash: password::hash_password(&credentials.password)?,
        name: credentials.name.clone(),
        created_at: Utc::now(),
    };

    // Save the user
    user_storage::save_user(&user)?;

    info!("✅ User registered successfully: {}", user.id);

    Ok(HttpResponse::Created().json(json!({
        "success": true,
        "data": {
            "user_id": user.id,
            "email": user.email
        }
    })))
}

// Login and get JWT token
#[post("/auth/login")]
async fn login(credentials: web::Json<UserCredentials>) -> Result<HttpResponse, ServiceError> {
    let email = credentials.email.trim().to_lowercase();
    info!("🔑 Login request for email: {}", email);

    // Find the user by email
    let user = match user_storage::find_user_by_email(&email)? {
        Some(user) => user,
        None => {
            error!("❌ User not found: {}", email);
            return Err(ServiceError::Unauthorized);
        }
    };

    // Verify password
    if !password::verify_password(&credentials.password, &user.password_hash)? {
        error!("❌ Invalid password for user: {}", email);
        return Err(ServiceError::Unauthorized);
    }

    // Generate JWT token
    let token = jwt::generate_token(&user)?;

    info!("✅ User logged in successfully: {}", user.id);

    // Return token in headers as well as response body
    let response = LoginResponse {
        token: token.clone(),
        user_id: user.id,
        email: user.email,
    };

    Ok(HttpResponse::Ok()
        .append_header(("Authorization", format!("Bearer {}", token)))
        .json(json!({
            "success": true,
            "data": response
        })))
}

// Get current user info (requires authentication)
#[get("/auth/me")]
async fn me(req: HttpRequest) -> Result<HttpResponse, ServiceError> {
    debug!("👤 Get user info request");

    let caller = caller_from_request(&req)?;

    let user = match user_storage::find_user_by_id(&caller.user_id)? {
        Some(user) => user,
        None => {
            error!("❌ User record missing for caller: {}", caller.user_id);
            return Err(ServiceError::Unauthorized);
        }
    };

    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "data": {
            "user_id": user.id,
            "email": user.email,
            "name": user.name,
            "created_at": user.created_at
        }
    })))
}

// Public auth routes, reachable without a token
pub fn init_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(register).service(login);
}

// Session routes that sit behind the auth middleware
pub fn init_session_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(me);
}
