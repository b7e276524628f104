// specdriven-service/src/models/mod.rs
use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use chrono::{DateTime, Utc};
use derive_more::Display;
use serde::{Deserialize, Serialize};
use serde_json::json;

// Invitation models live in their own module
pub mod invitations;
pub use invitations::*;

// Collaborator roles, strictly ordered: each level includes everything below it.
// The derived Ord follows declaration order, so role comparisons are plain `>=`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Viewer = 0,
    Contributor = 1,
    Admin = 2,
    Owner = 3,
}

impl Role {
    pub fn at_least(self, floor: Role) -> bool {
        self >= floor
    }

    // Role strings arrive from clients; everything unknown is rejected here
    // instead of leaking into storage.
    pub fn parse(value: &str) -> Option<Role> {
        match value.trim().to_lowercase().as_str() {
            "viewer" => Some(Role::Viewer),
            "contributor" => Some(Role::Contributor),
            "admin" => Some(Role::Admin),
            "owner" => Some(Role::Owner),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Viewer => "viewer",
            Role::Contributor => "contributor",
            Role::Admin => "admin",
            Role::Owner => "owner",
        }
    }
}

// A durable grant: this user holds this role on this project.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Membership {
    pub user_id: String,
    pub project_id: String,
    pub role: Role,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub joined_at: DateTime<Utc>,
}

// Project models
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Project {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub owner_id: String,
    pub is_public: bool,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub updated_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct ProjectData {
    pub name: String,
    pub description: Option<String>,
    #[serde(default)]
    pub is_public: bool,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct UpdateProjectRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub is_public: Option<bool>,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct TransferOwnershipRequest {
    pub new_owner_id: String,
}

// Specification documents; content is opaque to the collaboration core.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Specification {
    pub id: String,
    pub project_id: String,
    pub title: String,
    pub description: Option<String>,
    pub content: String,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct SpecificationData {
    pub title: String,
    pub description: Option<String>,
    #[serde(default)]
    pub content: String,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct UpdateSpecificationRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub content: Option<String>,
}

// User models for authentication
#[derive(Serialize, Deserialize, Debug)]
pub struct UserCredentials {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct User {
    pub id: String,
    pub email: String,
    pub password_hash: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub created_at: DateTime<Utc>,
}

impl User {
    // Name shown in invitation emails and collaborator lists; falls back to
    // the mailbox part of the address.
    pub fn display_name(&self) -> String {
        match &self.name {
            Some(name) if !name.trim().is_empty() => name.clone(),
            _ => self.email.split('@').next().unwrap_or(&self.email).to_string(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug)]
pub struct LoginResponse {
    pub token: String,
    pub user_id: String,
    pub email: String,
}

// JWT claims structure for authentication
#[derive(Serialize, Deserialize, Debug)]
pub struct Claims {
    pub sub: String,  // Subject (user ID)
    pub email: String,
    pub exp: usize,   // Expiration time
    pub iat: usize,   // Issued at
}

// Verified identity of the requester. The auth middleware builds one from the
// token claims and hands it to every core operation explicitly; nothing below
// the route layer reads ambient request state.
#[derive(Debug, Clone)]
pub struct CallerIdentity {
    pub user_id: String,
    pub email: String,
}

impl From<&Claims> for CallerIdentity {
    fn from(claims: &Claims) -> Self {
        CallerIdentity {
            user_id: claims.sub.clone(),
            email: claims.email.clone(),
        }
    }
}

// Row in the collaborator list endpoint.
#[derive(Serialize, Debug)]
pub struct CollaboratorView {
    pub user_id: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub role: Role,
    pub joined_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct SetRoleRequest {
    pub role: String,
}

// Custom error types. Every variant maps to a stable machine-readable code so
// clients branch on `error.code`, never on the message text.
#[derive(Debug, Display)]
pub enum ServiceError {
    #[display(fmt = "Internal Server Error")]
    InternalServerError,

    #[display(fmt = "Bad request: {}", _0)]
    BadRequest(String),

    #[display(fmt = "Unauthorized")]
    Unauthorized,

    #[display(fmt = "You don't have permission to perform this action")]
    InsufficientPermission,

    #[display(fmt = "Not Found")]
    NotFound,

    #[display(fmt = "Conflict: {}", _0)]
    Conflict(String),

    #[display(fmt = "Invalid role: {}", _0)]
    InvalidRole(String),

    #[display(fmt = "Capacity exceeded: {}", _0)]
    CapacityExceeded(String),

    #[display(fmt = "Too many invitations sent, try again later")]
    RateLimited,

    #[display(fmt = "Invitation not found")]
    InvitationNotFound,

    #[display(fmt = "Invitation has expired")]
    InvitationExpired,

    #[display(fmt = "Invitation is no longer actionable")]
    InvitationNotActionable,

    #[display(fmt = "The project owner cannot be removed")]
    CannotRemoveOwner,

    #[display(fmt = "The owner role can only change through an ownership transfer")]
    CannotChangeOwnerRole,

    #[display(fmt = "Storage is busy, try again")]
    StoreUnavailable,
}

impl ServiceError {
    pub fn code(&self) -> &'static str {
        match self {
            ServiceError::InternalServerError => "INTERNAL_ERROR",
            ServiceError::BadRequest(_) => "VALIDATION_ERROR",
            ServiceError::Unauthorized => "UNAUTHORIZED",
            ServiceError::InsufficientPermission => "INSUFFICIENT_PERMISSIONS",
            ServiceError::NotFound => "NOT_FOUND",
            ServiceError::Conflict(_) => "CONFLICT",
            ServiceError::InvalidRole(_) => "INVALID_ROLE",
            ServiceError::CapacityExceeded(_) => "CAPACITY_EXCEEDED",
            ServiceError::RateLimited => "RATE_LIMITED",
            ServiceError::InvitationNotFound => "INVITATION_NOT_FOUND",
            ServiceError::InvitationExpired => "INVITATION_EXPIRED",
            ServiceError::InvitationNotActionable => "INVITATION_NOT_ACTIONABLE",
            ServiceError::CannotRemoveOwner => "CANNOT_REMOVE_OWNER",
            ServiceError::CannotChangeOwnerRole => "CANNOT_CHANGE_OWNER_ROLE",
            ServiceError::StoreUnavailable => "STORE_UNAVAILABLE",
        }
    }
}

// Implement std::error::Error for ServiceError
impl std::error::Error for ServiceError {}

// Implement ResponseError so handlers can bubble errors with `?` and still
// produce the standard response envelope.
impl ResponseError for ServiceError {
    fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::InternalServerError => StatusCode::INTERNAL_SERVER_ERROR,
            ServiceError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ServiceError::Unauthorized => StatusCode::UNAUTHORIZED,
            ServiceError::InsufficientPermission => StatusCode::FORBIDDEN,
            ServiceError::NotFound => StatusCode::NOT_FOUND,
            ServiceError::Conflict(_) => StatusCode::CONFLICT,
            ServiceError::InvalidRole(_) => StatusCode::BAD_REQUEST,
            ServiceError::CapacityExceeded(_) => StatusCode::CONFLICT,
            ServiceError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ServiceError::InvitationNotFound => StatusCode::NOT_FOUND,
            ServiceError::InvitationExpired => StatusCode::GONE,
            ServiceError::InvitationNotActionable => StatusCode::CONFLICT,
            ServiceError::CannotRemoveOwner => StatusCode::BAD_REQUEST,
            ServiceError::CannotChangeOwnerRole => StatusCode::BAD_REQUEST,
            ServiceError::StoreUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(json!({
            "success": false,
            "error": {
                "code": self.code(),
                "message": self.to_string(),
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roles_are_strictly_ordered() {
        assert!(Role::Viewer < Role::Contributor);
        assert!(Role::Contributor < Role::Admin);
        assert!(Role::Admin < Role::Owner);
    }

    #[test]
    fn at_least_includes_every_lower_floor() {
        assert!(Role::Owner.at_least(Role::Viewer));
        assert!(Role::Admin.at_least(Role::Admin));
        assert!(Role::Contributor.at_least(Role::Viewer));
        assert!(!Role::Viewer.at_least(Role::Contributor));
        assert!(!Role::Admin.at_least(Role::Owner));
    }

    #[test]
    fn role_parse_accepts_known_values_only() {
        assert_eq!(Role::parse("admin"), Some(Role::Admin));
        assert_eq!(Role::parse(" Contributor "), Some(Role::Contributor));
        assert_eq!(Role::parse("OWNER"), Some(Role::Owner));
        assert_eq!(Role::parse("editor"), None);
        assert_eq!(Role::parse(""), None);
    }

    #[test]
    fn role_round_trips_through_strings() {
        for role in [Role::Viewer, Role::Contributor, Role::Admin, Role::Owner] {
            assert_eq!(Role::parse(role.as_str()), Some(role));
        }
    }

    #[test]
    fn role_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Role::Admin).unwrap(), "\"admin\"");
        let parsed: Role = serde_json::from_str("\"viewer\"").unwrap();
        assert_eq!(parsed, Role::Viewer);
    }

    #[test]
    fn error_status_codes_match_the_catalogue() {
        assert_eq!(
            ServiceError::InsufficientPermission.status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(ServiceError::RateLimited.status_code(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(ServiceError::InvitationExpired.status_code(), StatusCode::GONE);
        assert_eq!(
            ServiceError::StoreUnavailable.status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(ServiceError::CannotRemoveOwner.status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn display_name_falls_back_to_mailbox() {
        let user = User {
            id: "u1".to_string(),
            email: "ada@example.com".to_string(),
            password_hash: "x".to_string(),
            name: None,
            created_at: Utc::now(),
        };
        assert_eq!(user.display_name(), "ada");

        let named = User { name: Some("Ada Lovelace".to_string()), ..user };
        assert_eq!(named.display_name(), "Ada Lovelace");
    }
}
