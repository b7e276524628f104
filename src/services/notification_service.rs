// specdriven-service/src/services/notification_service.rs
//
// Email hand-off for invitations. Delivery goes to a development outbox:
// each email is a JSON file under ./storage/outbox for an external worker to
// drain. Failures are logged and swallowed; a lost email never rolls back
// the invitation it announces.
use crate::models::{ProjectInvitation, Role, ServiceError};
use crate::utils::{config, project_storage, user_storage};
use chrono::{DateTime, Utc};
use log::{error, info};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

const OUTBOX_DIR: &str = "./storage/outbox";

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct InvitationEmail {
    pub invitation_id: String,
    pub to: String,
    pub project_name: String,
    pub project_description: Option<String>,
    pub inviter_name: String,
    pub inviter_email: Option<String>,
    pub role: Role,
    pub personal_message: Option<String>,
    pub accept_url: String,
    pub decline_url: String,
    pub expires_at: DateTime<Utc>,
}

// Build the payload for one invitation email. The raw token appears nowhere
// but inside the two links.
pub fn build_invitation_email(
    invitation: &ProjectInvitation,
    raw_token: &str,
) -> Result<InvitationEmail, ServiceError> {
    let project = project_storage::find_project_by_id(&invitation.project_id)?;
    let inviter = user_storage::find_user_by_id(&invitation.inviter_id)?;

    let project_name = project
        .as_ref()
        .map(|p| p.name.clone())
        .unwrap_or_else(|| invitation.project_id.clone());
    let inviter_name = inviter
        .as_ref()
        .map(|u| u.display_name())
        .unwrap_or_else(|| invitation.inviter_id.clone());

    let base = config::frontend_url();
    Ok(InvitationEmail {
        invitation_id: invitation.id.clone(),
        to: invitation.email.clone(),
        project_name,
        project_description: project.and_then(|p| p.description),
        inviter_name,
        inviter_email: inviter.map(|u| u.email),
        role: invitation.role,
        personal_message: invitation.message.clone(),
        accept_url: format!(
            "{}/invitations/{}/accept?token={}",
            base, invitation.id, raw_token
        ),
        decline_url: format!(
            "{}/invitations/{}/decline?token={}",
            base, invitation.id, raw_token
        ),
        expires_at: invitation.expires_at,
    })
}

// Queue the invitation email. Fire and forget: the invitation is already
// persisted and stays valid whatever happens here.
pub fn deliver_invitation(invitation: &ProjectInvitation, raw_token: &str) {
    match build_invitation_email(invitation, raw_token) {
        Ok(email) => {
            if let Err(err) = write_outbox(&email) {
                error!("📧 Failed to queue invitation email for {}: {}", email.to, err);
            } else {
                info!(
                    "📧 Queued invitation email to {} for project '{}'",
                    email.to, email.project_name
                );
            }
        }
        Err(err) => {
            error!(
                "📧 Failed to build invitation email for invitation {}: {}",
                invitation.id, err
            );
        }
    }
}

fn write_outbox(email: &InvitationEmail) -> Result<(), ServiceError> {
    let dir = Path::new(OUTBOX_DIR);
    if !dir.exists() {
        fs::create_dir_all(dir).map_err(|e| {
            error!("Failed to create outbox directory: {:?}", e);
            ServiceError::InternalServerError
        })?;
    }

    let email_json = serde_json::to_string_pretty(email).map_err(|e| {
        error!("Failed to serialize invitation email: {:?}", e);
        ServiceError::InternalServerError
    })?;

    fs::write(format!("{}/{}.json", OUTBOX_DIR, email.invitation_id), email_json).map_err(|e| {
        error!("Failed to write outbox entry: {:?}", e);
        ServiceError::InternalServerError
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outbox_entry_carries_the_token_only_in_links() {
        let invitation = ProjectInvitation::new(
            "missing-project".to_string(),
            "invitee@example.com".to_string(),
            "missing-user".to_string(),
            Role::Viewer,
            Some("come take a look".to_string()),
            "00".repeat(16),
            "00".repeat(32),
        );
        let raw_token = "feedface".repeat(8);

        deliver_invitation(&invitation, &raw_token);

        let path = format!("{}/{}.json", OUTBOX_DIR, invitation.id);
        let content = fs::read_to_string(&path).unwrap();
        let email: InvitationEmail = serde_json::from_str(&content).unwrap();

        assert_eq!(email.to, "invitee@example.com");
        assert!(email.accept_url.contains(&raw_token));
        assert!(email.decline_url.contains(&raw_token));
        // Unknown project and inviter fall back to their ids
        assert_eq!(email.project_name, "missing-project");
        assert_eq!(email.inviter_name, "missing-user");

        let _ = fs::remove_file(path);
    }
}
