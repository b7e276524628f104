// specdriven-service/src/models/invitations.rs
use crate::models::Role;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

// Invitation lifetime before the link goes stale
pub const INVITATION_TTL_DAYS: i64 = 7;

// Invitation states. Only the first four are ever written to disk; `Expired`
// is derived from `expires_at` at read time so an invitation needs no
// background sweeper to die.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InvitationStatus {
    #[serde(rename = "pending")]
    Pending,
    #[serde(rename = "accepted")]
    Accepted,
    #[serde(rename = "declined")]
    Declined,
    #[serde(rename = "cancelled")]
    Cancelled,
    #[serde(rename = "expired")]
    Expired,
}

// Project invitation model. `token_salt` and `token_hash` are the only trace
// of the invitation token kept on disk; the raw token exists once, in the
// email payload.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ProjectInvitation {
    pub id: String,
    pub project_id: String,
    pub project_name: Option<String>, // Populated when retrieving
    pub email: String,
    pub inviter_id: String,
    pub inviter_name: Option<String>, // Populated when retrieving
    pub role: Role,
    pub message: Option<String>,
    pub token_salt: String,
    pub token_hash: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub status: InvitationStatus,
    pub accepted_by: Option<String>,
    pub responded_at: Option<DateTime<Utc>>,
}

impl ProjectInvitation {
    pub fn new(
        project_id: String,
        email: String,
        inviter_id: String,
        role: Role,
        message: Option<String>,
        token_salt: String,
        token_hash: String,
    ) -> Self {
        let now = Utc::now();
        let expires_at = now + Duration::days(INVITATION_TTL_DAYS);

        Self {
            id: uuid::Uuid::new_v4().to_string(),
            project_id,
            project_name: None,
            email,
            inviter_id,
            inviter_name: None,
            role,
            message,
            token_salt,
            token_hash,
            created_at: now,
            expires_at,
            status: InvitationStatus::Pending,
            accepted_by: None,
            responded_at: None,
        }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    // Pending and still inside its lifetime: the only state that can move.
    pub fn is_actionable_at(&self, now: DateTime<Utc>) -> bool {
        self.status == InvitationStatus::Pending && !self.is_expired_at(now)
    }

    // What callers see: a stored `pending` past its expiry reads as `expired`.
    pub fn effective_status_at(&self, now: DateTime<Utc>) -> InvitationStatus {
        if self.status == InvitationStatus::Pending && self.is_expired_at(now) {
            InvitationStatus::Expired
        } else {
            self.status
        }
    }
}

// Client-facing projection of an invitation. Deliberately drops the token
// salt and hash, and reports the derived status.
#[derive(Serialize, Debug)]
pub struct InvitationView {
    pub id: String,
    pub project_id: String,
    pub project_name: Option<String>,
    pub email: String,
    pub inviter_id: String,
    pub inviter_name: Option<String>,
    pub role: Role,
    pub message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub status: InvitationStatus,
    pub accepted_by: Option<String>,
    pub responded_at: Option<DateTime<Utc>>,
}

impl From<&ProjectInvitation> for InvitationView {
    fn from(invitation: &ProjectInvitation) -> Self {
        InvitationView {
            id: invitation.id.clone(),
            project_id: invitation.project_id.clone(),
            project_name: invitation.project_name.clone(),
            email: invitation.email.clone(),
            inviter_id: invitation.inviter_id.clone(),
            inviter_name: invitation.inviter_name.clone(),
            role: invitation.role,
            message: invitation.message.clone(),
            created_at: invitation.created_at,
            expires_at: invitation.expires_at,
            status: invitation.effective_status_at(Utc::now()),
            accepted_by: invitation.accepted_by.clone(),
            responded_at: invitation.responded_at,
        }
    }
}

// Request to invite a collaborator. The role arrives as a string and is
// validated against the closed role set at the route boundary.
#[derive(Serialize, Deserialize, Debug)]
pub struct CreateInvitationRequest {
    pub email: String,
    pub role: String,
    #[serde(default)]
    pub message: Option<String>,
}

// Body for accept/decline: the bearer token from the invitation link.
#[derive(Serialize, Deserialize, Debug)]
pub struct InvitationTokenRequest {
    pub token: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn invitation() -> ProjectInvitation {
        ProjectInvitation::new(
            "project-1".to_string(),
            "invitee@example.com".to_string(),
            "user-1".to_string(),
            Role::Contributor,
            None,
            "00".repeat(16),
            "00".repeat(32),
        )
    }

    #[test]
    fn new_invitation_is_pending_for_seven_days() {
        let inv = invitation();
        assert_eq!(inv.status, InvitationStatus::Pending);
        assert_eq!(inv.expires_at - inv.created_at, Duration::days(7));
        assert!(inv.is_actionable_at(Utc::now()));
    }

    #[test]
    fn pending_past_expiry_reads_as_expired_without_mutation() {
        let mut inv = invitation();
        inv.expires_at = Utc::now() - Duration::hours(1);

        assert_eq!(inv.effective_status_at(Utc::now()), InvitationStatus::Expired);
        assert!(!inv.is_actionable_at(Utc::now()));
        // The stored state is untouched
        assert_eq!(inv.status, InvitationStatus::Pending);
    }

    #[test]
    fn terminal_states_are_not_rewritten_by_expiry() {
        let mut inv = invitation();
        inv.status = InvitationStatus::Accepted;
        inv.expires_at = Utc::now() - Duration::hours(1);

        assert_eq!(inv.effective_status_at(Utc::now()), InvitationStatus::Accepted);
        assert!(!inv.is_actionable_at(Utc::now()));
    }

    #[test]
    fn view_hides_token_material() {
        let inv = invitation();
        let view = InvitationView::from(&inv);
        let body = serde_json::to_value(&view).unwrap();

        assert!(body.get("token_salt").is_none());
        assert!(body.get("token_hash").is_none());
        assert_eq!(body["status"], "pending");
    }
}
