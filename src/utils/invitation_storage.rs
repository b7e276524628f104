// specdriven-service/src/utils/invitation_storage.rs
//
// Invitation lifecycle: create, accept, decline, cancel. One JSON file per
// invitation under ./storage/invitations. Expiry is never written back;
// reads derive it from `expires_at`.
use crate::models::{CallerIdentity, InvitationStatus, Membership, ProjectInvitation, Role, ServiceError};
use crate::utils::authorization::{self, Action};
use crate::utils::{membership_storage, project_storage, token, user_storage, Deadline, StoreLock};
use chrono::{Duration, Utc};
use log::{error, info, warn};
use regex::Regex;
use std::fs;
use std::path::Path;

const INVITATIONS_DIR: &str = "./storage/invitations";

// Ceiling on live pending invitations per project.
pub const MAX_PENDING_PER_PROJECT: usize = 10;

// Trailing-hour throttle per inviter per project. Every invitation sent in
// the window counts, whatever happened to it since.
pub const MAX_INVITES_PER_HOUR: usize = 5;

lazy_static::lazy_static! {
    static ref INVITATION_LOCK: StoreLock = StoreLock::new();
    // Same shape the web client enforces before submitting
    static ref EMAIL_RE: Regex = Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").unwrap();
}

// Initialize invitations directory
pub fn ensure_invitations_dir() -> std::io::Result<()> {
    let dir = Path::new(INVITATIONS_DIR);
    if !dir.exists() {
        info!("Creating invitations directory");
        fs::create_dir_all(dir)?;
    }
    Ok(())
}

// Save invitation to storage
pub fn save_invitation(invitation: &ProjectInvitation) -> Result<(), ServiceError> {
    ensure_invitations_dir().map_err(|e| {
        error!("Failed to create invitations directory: {:?}", e);
        ServiceError::StoreUnavailable
    })?;

    let invitation_path = format!("{}/{}.json", INVITATIONS_DIR, invitation.id);
    let invitation_json = serde_json::to_string_pretty(invitation).map_err(|e| {
        error!("Failed to serialize invitation: {:?}", e);
        ServiceError::InternalServerError
    })?;

    fs::write(&invitation_path, invitation_json).map_err(|e| {
        error!("Failed to save invitation: {:?}", e);
        ServiceError::StoreUnavailable
    })?;

    Ok(())
}

// Find invitation by ID
pub fn find_invitation_by_id(invitation_id: &str) -> Result<Option<ProjectInvitation>, ServiceError> {
    let invitation_path = format!("{}/{}.json", INVITATIONS_DIR, invitation_id);
    let path = Path::new(&invitation_path);

    if !path.exists() {
        return Ok(None);
    }

    let content = fs::read_to_string(path).map_err(|e| {
        error!("Failed to read invitation file: {:?}", e);
        ServiceError::StoreUnavailable
    })?;

    let invitation: ProjectInvitation = serde_json::from_str(&content).map_err(|e| {
        error!("Failed to parse invitation JSON: {:?}", e);
        ServiceError::InternalServerError
    })?;

    Ok(Some(invitation))
}

// Delete invitation
pub fn delete_invitation(invitation_id: &str) -> Result<bool, ServiceError> {
    let invitation_path = format!("{}/{}.json", INVITATIONS_DIR, invitation_id);
    let path = Path::new(&invitation_path);

    if !path.exists() {
        return Ok(false);
    }

    fs::remove_file(path).map_err(|e| {
        error!("Failed to delete invitation file: {:?}", e);
        ServiceError::StoreUnavailable
    })?;

    info!("🗑️ Deleted invitation: {}", invitation_id);
    Ok(true)
}

// Scan the invitations directory and keep entries matching the predicate.
// Unparseable files are logged and skipped rather than failing the scan.
fn collect_invitations(
    keep: impl Fn(&ProjectInvitation) -> bool,
) -> Result<Vec<ProjectInvitation>, ServiceError> {
    let dir = Path::new(INVITATIONS_DIR);
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let mut invitations = Vec::new();

    for entry_result in fs::read_dir(dir).map_err(|e| {
        error!("Failed to read invitations directory: {:?}", e);
        ServiceError::StoreUnavailable
    })? {
        let entry = entry_result.map_err(|e| {
            error!("Failed to read directory entry: {:?}", e);
            ServiceError::StoreUnavailable
        })?;

        let path = entry.path();
        if path.is_file() && path.extension().map_or(false, |ext| ext == "json") {
            let content = fs::read_to_string(&path).map_err(|e| {
                error!("Failed to read invitation file: {:?}", e);
                ServiceError::StoreUnavailable
            })?;

            let invitation: ProjectInvitation = match serde_json::from_str(&content) {
                Ok(inv) => inv,
                Err(e) => {
                    warn!("Skipping unparseable invitation file {:?}: {:?}", path, e);
                    continue;
                }
            };

            if keep(&invitation) {
                invitations.push(invitation);
            }
        }
    }

    Ok(invitations)
}

// Locate the invitation a raw link token belongs to. The salted hash is
// recomputed per candidate and compared in constant time; the scan itself
// never short-circuits on partial matches.
fn find_invitation_by_token(raw_token: &str) -> Result<Option<ProjectInvitation>, ServiceError> {
    for invitation in collect_invitations(|_| true)? {
        if token::verify(raw_token, &invitation.token_salt, &invitation.token_hash)? {
            return Ok(Some(invitation));
        }
    }
    Ok(None)
}

// Create an invitation and mint its token. Returns the stored invitation and
// the raw token; the raw token goes to the notifier and is otherwise gone.
pub fn create(
    project_id: &str,
    caller: &CallerIdentity,
    email: &str,
    role: Role,
    message: Option<String>,
    deadline: &Deadline,
) -> Result<(ProjectInvitation, String), ServiceError> {
    authorization::authorize(caller, project_id, Action::ManageCollaborators)?;

    if role == Role::Owner {
        return Err(ServiceError::InvalidRole(
            "ownership cannot be offered through an invitation".to_string(),
        ));
    }

    let email = email.trim().to_lowercase();
    if !EMAIL_RE.is_match(&email) {
        return Err(ServiceError::BadRequest(format!(
            "'{}' is not a valid email address",
            email
        )));
    }

    // Everything from here races with other creates and accepts, so the
    // counting happens under the lock.
    let _guard = INVITATION_LOCK.acquire(deadline)?;

    // An existing member needs a role change, not an invitation
    if let Some(user) = user_storage::find_user_by_email(&email)? {
        if membership_storage::get_role(project_id, &user.id)?.is_some() {
            return Err(ServiceError::Conflict(
                "this user is already a collaborator on the project".to_string(),
            ));
        }
    }

    let now = Utc::now();
    let project_invitations = collect_invitations(|inv| inv.project_id == project_id)?;

    if project_invitations
        .iter()
        .any(|inv| inv.email == email && inv.is_actionable_at(now))
    {
        return Err(ServiceError::Conflict(
            "a pending invitation for this email already exists".to_string(),
        ));
    }

    let pending = project_invitations
        .iter()
        .filter(|inv| inv.is_actionable_at(now))
        .count();
    if pending >= MAX_PENDING_PER_PROJECT {
        return Err(ServiceError::CapacityExceeded(format!(
            "a project can have at most {} pending invitations",
            MAX_PENDING_PER_PROJECT
        )));
    }

    let window_start = now - Duration::hours(1);
    let sent_recently = project_invitations
        .iter()
        .filter(|inv| inv.inviter_id == caller.user_id && inv.created_at > window_start)
        .count();
    if sent_recently >= MAX_INVITES_PER_HOUR {
        warn!(
            "Rate limit: {} already sent {} invitations for project {} this hour",
            caller.user_id, sent_recently, project_id
        );
        return Err(ServiceError::RateLimited);
    }

    let minted = token::issue();
    let invitation = ProjectInvitation::new(
        project_id.to_string(),
        email,
        caller.user_id.clone(),
        role,
        message,
        minted.salt,
        minted.hash,
    );
    save_invitation(&invitation)?;

    info!(
        "📧 Created invitation: {} for {} on project: {} as {:?}",
        invitation.id, invitation.email, project_id, role
    );
    Ok((invitation, minted.raw))
}

// Redeem an invitation. The caller must be signed in as the invited address;
// the membership grant and the pending->accepted transition land together or
// not at all.
pub fn accept(
    invitation_id: &str,
    raw_token: &str,
    caller: &CallerIdentity,
    deadline: &Deadline,
) -> Result<(ProjectInvitation, Membership), ServiceError> {
    // Lock order: invitations first, memberships inside grant_for_invitation.
    // This is the only path that holds both.
    let _guard = INVITATION_LOCK.acquire(deadline)?;

    let mut invitation = find_invitation_by_token(raw_token)?.ok_or(ServiceError::InvitationNotFound)?;

    // The link must be used against the invitation it was minted for
    if invitation.id != invitation_id {
        return Err(ServiceError::InvitationNotFound);
    }

    if !invitation.email.eq_ignore_ascii_case(&caller.email) {
        warn!(
            "Accept attempt by {} on invitation addressed to {}",
            caller.email, invitation.email
        );
        return Err(ServiceError::InvitationNotFound);
    }

    let now = Utc::now();
    if invitation.status != InvitationStatus::Pending {
        return Err(ServiceError::InvitationNotActionable);
    }
    if invitation.is_expired_at(now) {
        return Err(ServiceError::InvitationExpired);
    }

    invitation.status = InvitationStatus::Accepted;
    invitation.accepted_by = Some(caller.user_id.clone());
    invitation.responded_at = Some(now);

    let to_write = invitation.clone();
    let membership = membership_storage::grant_for_invitation(
        &invitation.project_id,
        &caller.user_id,
        invitation.role,
        deadline,
        move || save_invitation(&to_write),
    )?;

    info!(
        "✅ Invitation accepted: {} ({} joins project: {} as {:?})",
        invitation.id, caller.user_id, invitation.project_id, invitation.role
    );
    Ok((invitation, membership))
}

// Turn down an invitation. Token-addressed like accept, but no account or
// membership is involved.
pub fn decline(
    invitation_id: &str,
    raw_token: &str,
    deadline: &Deadline,
) -> Result<ProjectInvitation, ServiceError> {
    let _guard = INVITATION_LOCK.acquire(deadline)?;

    let mut invitation = find_invitation_by_token(raw_token)?.ok_or(ServiceError::InvitationNotFound)?;
    if invitation.id != invitation_id {
        return Err(ServiceError::InvitationNotFound);
    }

    if !invitation.is_actionable_at(Utc::now()) {
        return Err(ServiceError::InvitationNotActionable);
    }

    invitation.status = InvitationStatus::Declined;
    invitation.responded_at = Some(Utc::now());
    save_invitation(&invitation)?;

    info!("✅ Invitation declined: {}", invitation.id);
    Ok(invitation)
}

// Withdraw a pending invitation. Admin-level action on the project.
pub fn cancel(
    invitation_id: &str,
    project_id: &str,
    caller: &CallerIdentity,
    deadline: &Deadline,
) -> Result<ProjectInvitation, ServiceError> {
    let _guard = INVITATION_LOCK.acquire(deadline)?;

    let mut invitation =
        find_invitation_by_id(invitation_id)?.ok_or(ServiceError::InvitationNotFound)?;
    if invitation.project_id != project_id {
        return Err(ServiceError::InvitationNotFound);
    }

    authorization::authorize(caller, &invitation.project_id, Action::ManageCollaborators)?;

    if !invitation.is_actionable_at(Utc::now()) {
        return Err(ServiceError::InvitationNotActionable);
    }

    invitation.status = InvitationStatus::Cancelled;
    invitation.responded_at = Some(Utc::now());
    save_invitation(&invitation)?;

    info!("🗑️ Invitation cancelled: {} by {}", invitation.id, caller.user_id);
    Ok(invitation)
}

// Live pending invitations for a project, oldest first. Lazily expired
// entries stay on disk but are filtered out here.
pub fn list_pending(project_id: &str) -> Result<Vec<ProjectInvitation>, ServiceError> {
    let now = Utc::now();
    let mut pending = collect_invitations(|inv| inv.project_id == project_id && inv.is_actionable_at(now))?;
    pending.sort_by(|a, b| a.created_at.cmp(&b.created_at));
    Ok(pending)
}

// Full invitation history for one address, newest first. Callers are
// expected to present the derived status, not the stored one.
pub fn list_for_email(email: &str) -> Result<Vec<ProjectInvitation>, ServiceError> {
    let email = email.to_lowercase();
    let mut invitations = collect_invitations(|inv| inv.email == email)?;
    invitations.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Ok(invitations)
}

// Helper function to fill in project and inviter names for display
pub fn enrich_invitation(invitation: &mut ProjectInvitation) -> Result<(), ServiceError> {
    if let Some(project) = project_storage::find_project_by_id(&invitation.project_id)? {
        invitation.project_name = Some(project.name);
    }

    if let Some(user) = user_storage::find_user_by_id(&invitation.inviter_id)? {
        invitation.inviter_name = Some(user.display_name());
    }

    Ok(())
}

// Delete all invitations for a project, used when the project goes away.
pub fn delete_project_invitations(project_id: &str, deadline: &Deadline) -> Result<usize, ServiceError> {
    let _guard = INVITATION_LOCK.acquire(deadline)?;

    let invitations = collect_invitations(|inv| inv.project_id == project_id)?;
    let mut deleted_count = 0;

    for invitation in invitations {
        if delete_invitation(&invitation.id)? {
            deleted_count += 1;
        }
    }

    info!("🗑️ Deleted {} invitations for project: {}", deleted_count, project_id);
    Ok(deleted_count)
}
