// specdriven-service/src/utils/mod.rs
use crate::models::{CallerIdentity, Claims, ServiceError, User};
use actix_web::http::header;
use actix_web::{dev::ServiceRequest, HttpMessage, HttpRequest};
use bcrypt::{hash, verify, DEFAULT_COST};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use log::warn;
use std::env;
use std::fs;
use std::path::Path;
use std::sync::{Mutex, MutexGuard, TryLockError};
use std::thread;
use std::time::{Duration as StdDuration, Instant};

pub mod authorization;
pub mod invitation_storage;
pub mod membership_storage;
pub mod project_storage;
pub mod spec_storage;
pub mod token;

// How long a single request may wait on a busy store before giving up.
const STORE_WAIT_MS: u64 = 2_000;

// Cut-off for one request's store work. Handlers mint one per request and
// thread it through every mutating store call they make.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    at: Instant,
}

impl Deadline {
    pub fn new(timeout: StdDuration) -> Self {
        Deadline {
            at: Instant::now() + timeout,
        }
    }

    pub fn for_request() -> Self {
        Self::new(StdDuration::from_millis(STORE_WAIT_MS))
    }

    pub fn is_past(&self) -> bool {
        Instant::now() >= self.at
    }
}

// Process-wide mutex guarding one storage directory. Mutations serialize
// through `acquire`; a caller whose deadline runs out gets `StoreUnavailable`
// instead of queueing forever.
pub struct StoreLock {
    inner: Mutex<()>,
}

impl StoreLock {
    pub fn new() -> Self {
        StoreLock {
            inner: Mutex::new(()),
        }
    }

    pub fn acquire(&self, deadline: &Deadline) -> Result<MutexGuard<'_, ()>, ServiceError> {
        loop {
            match self.inner.try_lock() {
                Ok(guard) => return Ok(guard),
                Err(TryLockError::WouldBlock) => {
                    if deadline.is_past() {
                        warn!("Store lock wait exceeded its deadline");
                        return Err(ServiceError::StoreUnavailable);
                    }
                    thread::sleep(StdDuration::from_millis(2));
                }
                Err(TryLockError::Poisoned(poisoned)) => {
                    // A panicked holder leaves plain JSON files behind; the
                    // guard itself is still good for serializing access.
                    return Ok(poisoned.into_inner());
                }
            }
        }
    }
}

// Pull the verified caller identity the auth middleware stored on the request.
pub fn caller_from_request(req: &HttpRequest) -> Result<CallerIdentity, ServiceError> {
    req.extensions()
        .get::<CallerIdentity>()
        .cloned()
        .ok_or(ServiceError::Unauthorized)
}

// Runtime configuration; everything is optional with development defaults.
pub mod config {
    use std::env;

    pub fn bind_address() -> String {
        env::var("BIND_ADDR").unwrap_or_else(|_| "127.0.0.1:9090".to_string())
    }

    // Base for the accept/decline links that go into invitation emails
    pub fn frontend_url() -> String {
        env::var("FRONTEND_URL").unwrap_or_else(|_| "http://localhost:3000".to_string())
    }
}

// JWT utility functions
pub mod jwt {
    use super::*;

    // Get JWT secret from environment or use default
    fn get_jwt_secret() -> String {
        env::var("JWT_SECRET").unwrap_or_else(|_| "specdriven_super_secret_key".to_string())
    }

    // Generate a new JWT token for a user
    pub fn generate_token(user: &User) -> Result<String, ServiceError> {
        let secret = get_jwt_secret();
        let expiration = Utc::now()
            .checked_add_signed(Duration::days(7))
            .expect("Valid timestamp")
            .timestamp() as usize;

        let claims = Claims {
            sub: user.id.clone(),
            email: user.email.clone(),
            exp: expiration,
            iat: Utc::now().timestamp() as usize,
        };

        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(secret.as_ref()),
        )
        .map_err(|_| ServiceError::InternalServerError)
    }

    // Validate and decode a JWT token
    pub fn decode_token(token: &str) -> Result<Claims, ServiceError> {
        let secret = get_jwt_secret();

        decode::<Claims>(
            token,
            &DecodingKey::from_secret(secret.as_ref()),
            &Validation::default(),
        )
        .map(|data| data.claims)
        .map_err(|_| ServiceError::Unauthorized)
    }

    // Extract JWT from Authorization header
    pub fn extract_token_from_header(auth_header: &str) -> Result<String, ServiceError> {
        if !auth_header.starts_with("Bearer ") {
            return Err(ServiceError::Unauthorized);
        }

        Ok(auth_header.trim_start_matches("Bearer ").to_string())
    }
}

// Password utility functions
pub mod password {
    use super::*;

    // Hash a password using bcrypt
    pub fn hash_password(password: &str) -> Result<String, ServiceError> {
        hash(password, DEFAULT_COST).map_err(|_| ServiceError::InternalServerError)
    }

    // Verify a password against a hash
    pub fn verify_password(password: &str, hash: &str) -> Result<bool, ServiceError> {
        verify(password, hash).map_err(|_| ServiceError::InternalServerError)
    }
}

// User storage utilities
pub mod user_storage {
    use super::*;

    const USERS_DIR: &str = "./storage/users";

    // Save a user to storage
    pub fn save_user(user: &User) -> Result<(), ServiceError> {
        let users_dir = Path::new(USERS_DIR);
        if !users_dir.exists() {
            fs::create_dir_all(users_dir).map_err(|_| ServiceError::InternalServerError)?;
        }

        let user_path = format!("{}/{}.json", USERS_DIR, user.id);

        fs::write(
            &user_path,
            serde_json::to_string(&user).map_err(|_| ServiceError::InternalServerError)?,
        )
        .map_err(|_| ServiceError::InternalServerError)
    }

    // Find a user by email
    pub fn find_user_by_email(email: &str) -> Result<Option<User>, ServiceError> {
        let users_dir = Path::new(USERS_DIR);

        if !users_dir.exists() {
            fs::create_dir_all(users_dir).map_err(|_| ServiceError::InternalServerError)?;
            return Ok(None);
        }

        for entry in fs::read_dir(users_dir).map_err(|_| ServiceError::InternalServerError)? {
            let entry = entry.map_err(|_| ServiceError::InternalServerError)?;
            let path = entry.path();

            if path.is_file() && path.extension().map_or(false, |ext| ext == "json") {
                let content =
                    fs::read_to_string(&path).map_err(|_| ServiceError::InternalServerError)?;
                let user: User =
                    serde_json::from_str(&content).map_err(|_| ServiceError::InternalServerError)?;

                if user.email.eq_ignore_ascii_case(email) {
                    return Ok(Some(user));
                }
            }
        }

        Ok(None)
    }

    // Find a user by ID
    pub fn find_user_by_id(id: &str) -> Result<Option<User>, ServiceError> {
        let user_path = format!("{}/{}.json", USERS_DIR, id);
        let path = Path::new(&user_path);

        if !path.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(path).map_err(|_| ServiceError::InternalServerError)?;
        let user: User =
            serde_json::from_str(&content).map_err(|_| ServiceError::InternalServerError)?;

        Ok(Some(user))
    }
}

// Middleware for JWT authentication
pub mod auth_middleware {
    use super::*;
    use actix_web::dev::{forward_ready, Service, Transform};
    use actix_web::Error;
    use futures::future::{ok, Ready};
    use std::future::Future;
    use std::pin::Pin;
    use std::task::{Context, Poll};

    pub struct Authentication;

    impl<S, B> Transform<S, ServiceRequest> for Authentication
    where
        S: Service<ServiceRequest, Response = actix_web::dev::ServiceResponse<B>, Error = Error>,
        S::Future: 'static,
        B: 'static,
    {
        type Response = actix_web::dev::ServiceResponse<B>;
        type Error = Error;
        type Transform = AuthenticationMiddleware<S>;
        type InitError = ();
        type Future = Ready<Result<Self::Transform, Self::InitError>>;

        fn new_transform(&self, service: S) -> Self::Future {
            ok(AuthenticationMiddleware { service })
        }
    }

    pub struct AuthenticationMiddleware<S> {
        service: S,
    }

    impl<S, B> Service<ServiceRequest> for AuthenticationMiddleware<S>
    where
        S: Service<ServiceRequest, Response = actix_web::dev::ServiceResponse<B>, Error = Error>,
        S::Future: 'static,
        B: 'static,
    {
        type Response = actix_web::dev::ServiceResponse<B>;
        type Error = Error;
        type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>>>>;

        forward_ready!(service);

        fn call(&self, req: ServiceRequest) -> Self::Future {
            // Get Authorization header
            let auth_header = req.headers().get(header::AUTHORIZATION);

            if let Some(auth_header) = auth_header {
                if let Ok(auth_str) = auth_header.to_str() {
                    if let Ok(token) = jwt::extract_token_from_header(auth_str) {
                        if let Ok(claims) = jwt::decode_token(&token) {
                            // Handlers get the verified identity, never the
                            // raw token or claims
                            req.extensions_mut().insert(CallerIdentity::from(&claims));
                            let fut = self.service.call(req);
                            return Box::pin(async move { fut.await });
                        }
                    }
                }
            }

            Box::pin(async move { Err(ServiceError::Unauthorized.into()) })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration as StdDuration;

    #[test]
    fn jwt_round_trip_preserves_identity() {
        let user = User {
            id: "user-1".to_string(),
            email: "ada@example.com".to_string(),
            password_hash: "irrelevant".to_string(),
            name: None,
            created_at: Utc::now(),
        };

        let token = jwt::generate_token(&user).unwrap();
        let claims = jwt::decode_token(&token).unwrap();

        assert_eq!(claims.sub, "user-1");
        assert_eq!(claims.email, "ada@example.com");
    }

    #[test]
    fn garbage_tokens_are_unauthorized() {
        assert!(matches!(
            jwt::decode_token("not.a.jwt"),
            Err(ServiceError::Unauthorized)
        ));
        assert!(matches!(
            jwt::extract_token_from_header("Basic abc"),
            Err(ServiceError::Unauthorized)
        ));
    }

    #[test]
    fn password_hash_verifies_and_rejects() {
        let hashed = password::hash_password("hunter2").unwrap();
        assert!(password::verify_password("hunter2", &hashed).unwrap());
        assert!(!password::verify_password("hunter3", &hashed).unwrap());
    }

    #[test]
    fn store_lock_times_out_instead_of_blocking() {
        let lock = StoreLock::new();
        let deadline = Deadline::for_request();
        let guard = lock.acquire(&deadline).unwrap();

        let short = Deadline::new(StdDuration::from_millis(20));
        let second = lock.acquire(&short);
        assert!(matches!(second, Err(ServiceError::StoreUnavailable)));

        drop(guard);
        assert!(lock.acquire(&Deadline::for_request()).is_ok());
    }

    #[test]
    fn deadline_reports_expiry() {
        let past = Deadline::new(StdDuration::from_millis(0));
        std::thread::sleep(StdDuration::from_millis(5));
        assert!(past.is_past());
        assert!(!Deadline::for_request().is_past());
    }
}
