// specdriven-service/src/utils/membership_storage.rs
//
// Source of truth for who holds which role on which project. One JSON file
// per project under ./storage/memberships; every mutation revalidates inside
// the store lock, so racing requests cannot break the single-owner rule or
// the member ceiling.
use crate::models::{CallerIdentity, Membership, Role, ServiceError};
use crate::utils::{authorization, Deadline, StoreLock};
use chrono::Utc;
use log::{error, info};
use std::fs;
use std::path::Path;

const MEMBERSHIPS_DIR: &str = "./storage/memberships";

// Hard ceiling on collaborators per project, owner included.
pub const MAX_MEMBERS_PER_PROJECT: usize = 50;

lazy_static::lazy_static! {
    static ref MEMBERSHIP_LOCK: StoreLock = StoreLock::new();
}

fn membership_path(project_id: &str) -> String {
    format!("{}/{}.json", MEMBERSHIPS_DIR, project_id)
}

// Missing file means a project with no members yet.
fn load_members(project_id: &str) -> Result<Vec<Membership>, ServiceError> {
    let path_str = membership_path(project_id);
    let path = Path::new(&path_str);

    if !path.exists() {
        return Ok(Vec::new());
    }

    let content = fs::read_to_string(path).map_err(|e| {
        error!("Failed to read memberships for project {}: {:?}", project_id, e);
        ServiceError::StoreUnavailable
    })?;

    serde_json::from_str(&content).map_err(|e| {
        error!("Corrupt membership file for project {}: {:?}", project_id, e);
        ServiceError::InternalServerError
    })
}

fn save_members(project_id: &str, members: &[Membership]) -> Result<(), ServiceError> {
    let dir = Path::new(MEMBERSHIPS_DIR);
    if !dir.exists() {
        fs::create_dir_all(dir).map_err(|e| {
            error!("Failed to create memberships directory: {:?}", e);
            ServiceError::StoreUnavailable
        })?;
    }

    let json = serde_json::to_string_pretty(members).map_err(|e| {
        error!("Failed to serialize memberships for project {}: {:?}", project_id, e);
        ServiceError::InternalServerError
    })?;

    fs::write(membership_path(project_id), json).map_err(|e| {
        error!("Failed to write memberships for project {}: {:?}", project_id, e);
        ServiceError::StoreUnavailable
    })
}

// Role lookup; absence is "no access", not an error. Lock-free read.
pub fn get_role(project_id: &str, user_id: &str) -> Result<Option<Role>, ServiceError> {
    let members = load_members(project_id)?;
    Ok(members
        .iter()
        .find(|m| m.user_id == user_id)
        .map(|m| m.role))
}

// All members, oldest first (insertion order is join order).
pub fn list(project_id: &str) -> Result<Vec<Membership>, ServiceError> {
    load_members(project_id)
}

// Seed a fresh project with its owner membership.
pub fn initialize_project(
    project_id: &str,
    owner_id: &str,
    deadline: &Deadline,
) -> Result<Membership, ServiceError> {
    let _guard = MEMBERSHIP_LOCK.acquire(deadline)?;

    let members = load_members(project_id)?;
    if !members.is_empty() {
        return Err(ServiceError::Conflict(
            "project membership is already initialized".to_string(),
        ));
    }

    let membership = Membership {
        user_id: owner_id.to_string(),
        project_id: project_id.to_string(),
        role: Role::Owner,
        joined_at: Utc::now(),
    };
    save_members(project_id, std::slice::from_ref(&membership))?;

    info!("👥 Initialized project: {} with owner: {}", project_id, owner_id);
    Ok(membership)
}

// Create or overwrite a membership. The ceiling is checked under the lock so
// two concurrent inserts cannot both pass the same count.
pub fn upsert(
    project_id: &str,
    user_id: &str,
    role: Role,
    deadline: &Deadline,
) -> Result<Membership, ServiceError> {
    let _guard = MEMBERSHIP_LOCK.acquire(deadline)?;
    upsert_locked(project_id, user_id, role)
}

// Caller must hold MEMBERSHIP_LOCK.
fn upsert_locked(project_id: &str, user_id: &str, role: Role) -> Result<Membership, ServiceError> {
    let mut members = load_members(project_id)?;

    if let Some(existing) = members.iter_mut().find(|m| m.user_id == user_id) {
        existing.role = role;
        let updated = existing.clone();
        save_members(project_id, &members)?;
        info!("🔄 Updated {} on project: {} to {:?}", user_id, project_id, role);
        return Ok(updated);
    }

    if members.len() >= MAX_MEMBERS_PER_PROJECT {
        return Err(ServiceError::CapacityExceeded(format!(
            "a project can have at most {} collaborators",
            MAX_MEMBERS_PER_PROJECT
        )));
    }

    let membership = Membership {
        user_id: user_id.to_string(),
        project_id: project_id.to_string(),
        role,
        joined_at: Utc::now(),
    };
    members.push(membership.clone());
    save_members(project_id, &members)?;

    info!("✅ Added {} to project: {} as {:?}", user_id, project_id, role);
    Ok(membership)
}

// Apply a membership grant together with an invitation transition. `commit`
// persists the invitation; if it fails, the membership write is rolled back
// so an accepted invitation and its membership land together or not at all.
pub fn grant_for_invitation(
    project_id: &str,
    user_id: &str,
    role: Role,
    deadline: &Deadline,
    commit: impl FnOnce() -> Result<(), ServiceError>,
) -> Result<Membership, ServiceError> {
    let _guard = MEMBERSHIP_LOCK.acquire(deadline)?;

    let before = load_members(project_id)?;
    let membership = upsert_locked(project_id, user_id, role)?;

    if let Err(err) = commit() {
        if let Err(restore_err) = save_members(project_id, &before) {
            error!(
                "Failed to roll back membership grant on project {}: {}",
                project_id, restore_err
            );
        }
        return Err(err);
    }

    Ok(membership)
}

// Change a member's role. The caller's own role is re-resolved under the
// lock so the assignment rules hold even against concurrent changes.
pub fn set_role(
    project_id: &str,
    target_user_id: &str,
    new_role: Role,
    caller: &CallerIdentity,
    deadline: &Deadline,
) -> Result<Membership, ServiceError> {
    let _guard = MEMBERSHIP_LOCK.acquire(deadline)?;

    let mut members = load_members(project_id)?;
    let caller_role = members
        .iter()
        .find(|m| m.user_id == caller.user_id)
        .map(|m| m.role)
        .ok_or(ServiceError::InsufficientPermission)?;
    if !caller_role.at_least(Role::Admin) {
        return Err(ServiceError::InsufficientPermission);
    }

    let target_index = members
        .iter()
        .position(|m| m.user_id == target_user_id)
        .ok_or(ServiceError::NotFound)?;
    let target_current = members[target_index].role;

    authorization::check_role_assignment(
        caller_role,
        target_current,
        new_role,
        caller.user_id == target_user_id,
    )?;

    members[target_index].role = new_role;
    let updated = members[target_index].clone();
    save_members(project_id, &members)?;

    info!(
        "🔄 Role of {} on project: {} changed {:?} -> {:?} by {}",
        target_user_id, project_id, target_current, new_role, caller.user_id
    );
    Ok(updated)
}

// Remove a member (or let one leave). Owner removal is refused here no
// matter what the routes checked.
pub fn remove(
    project_id: &str,
    target_user_id: &str,
    caller: &CallerIdentity,
    deadline: &Deadline,
) -> Result<(), ServiceError> {
    let _guard = MEMBERSHIP_LOCK.acquire(deadline)?;

    let mut members = load_members(project_id)?;
    let caller_role = members
        .iter()
        .find(|m| m.user_id == caller.user_id)
        .map(|m| m.role)
        .ok_or(ServiceError::InsufficientPermission)?;

    let target_role = members
        .iter()
        .find(|m| m.user_id == target_user_id)
        .map(|m| m.role)
        .ok_or(ServiceError::NotFound)?;

    let is_self = caller.user_id == target_user_id;
    if !is_self && !caller_role.at_least(Role::Admin) {
        return Err(ServiceError::InsufficientPermission);
    }
    authorization::check_removal(caller_role, target_role, is_self)?;

    members.retain(|m| m.user_id != target_user_id);
    save_members(project_id, &members)?;

    info!("🗑️ Removed {} from project: {}", target_user_id, project_id);
    Ok(())
}

// Swap the owner role to another existing member. One write, so readers see
// either the old owner or the new one, never zero or two.
pub fn transfer_ownership(
    project_id: &str,
    caller: &CallerIdentity,
    new_owner_id: &str,
    deadline: &Deadline,
) -> Result<Vec<Membership>, ServiceError> {
    let _guard = MEMBERSHIP_LOCK.acquire(deadline)?;

    let mut members = load_members(project_id)?;
    let caller_index = members
        .iter()
        .position(|m| m.user_id == caller.user_id)
        .ok_or(ServiceError::InsufficientPermission)?;
    if members[caller_index].role != Role::Owner {
        return Err(ServiceError::InsufficientPermission);
    }

    if new_owner_id == caller.user_id {
        return Err(ServiceError::BadRequest(
            "you already own this project".to_string(),
        ));
    }

    let new_owner_index = members
        .iter()
        .position(|m| m.user_id == new_owner_id)
        .ok_or(ServiceError::NotFound)?;

    members[caller_index].role = Role::Admin;
    members[new_owner_index].role = Role::Owner;
    save_members(project_id, &members)?;

    info!(
        "🔄 Ownership of project: {} moved from {} to {}",
        project_id, caller.user_id, new_owner_id
    );
    Ok(members)
}

// Drop the whole membership file, used when a project is deleted.
pub fn remove_project(project_id: &str, deadline: &Deadline) -> Result<(), ServiceError> {
    let _guard = MEMBERSHIP_LOCK.acquire(deadline)?;

    let path_str = membership_path(project_id);
    let path = Path::new(&path_str);
    if path.exists() {
        fs::remove_file(path).map_err(|e| {
            error!("Failed to delete memberships for project {}: {:?}", project_id, e);
            ServiceError::StoreUnavailable
        })?;
    }

    info!("🗑️ Dropped membership records for project: {}", project_id);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn caller(user_id: &str) -> CallerIdentity {
        CallerIdentity {
            user_id: user_id.to_string(),
            email: format!("{}@example.com", user_id),
        }
    }

    fn owner_count(project_id: &str) -> usize {
        list(project_id)
            .unwrap()
            .iter()
            .filter(|m| m.role == Role::Owner)
            .count()
    }

    #[test]
    fn initialize_seeds_exactly_one_owner() {
        let project_id = format!("member-test-{}", Uuid::new_v4());
        let deadline = Deadline::for_request();

        let membership = initialize_project(&project_id, "owner-1", &deadline).unwrap();
        assert_eq!(membership.role, Role::Owner);
        assert_eq!(owner_count(&project_id), 1);

        // A second initialization is refused
        assert!(matches!(
            initialize_project(&project_id, "owner-2", &deadline),
            Err(ServiceError::Conflict(_))
        ));
        assert_eq!(owner_count(&project_id), 1);

        remove_project(&project_id, &deadline).unwrap();
    }

    #[test]
    fn owner_survives_every_demotion_and_removal_attempt() {
        let project_id = format!("member-test-{}", Uuid::new_v4());
        let deadline = Deadline::for_request();

        initialize_project(&project_id, "owner-1", &deadline).unwrap();
        upsert(&project_id, "admin-1", Role::Admin, &deadline).unwrap();

        assert!(matches!(
            set_role(&project_id, "owner-1", Role::Viewer, &caller("admin-1"), &deadline),
            Err(ServiceError::CannotChangeOwnerRole)
        ));
        assert!(matches!(
            set_role(&project_id, "owner-1", Role::Viewer, &caller("owner-1"), &deadline),
            Err(ServiceError::CannotChangeOwnerRole)
        ));
        assert!(matches!(
            remove(&project_id, "owner-1", &caller("admin-1"), &deadline),
            Err(ServiceError::CannotRemoveOwner)
        ));
        assert!(matches!(
            remove(&project_id, "owner-1", &caller("owner-1"), &deadline),
            Err(ServiceError::CannotRemoveOwner)
        ));
        assert_eq!(owner_count(&project_id), 1);

        remove_project(&project_id, &deadline).unwrap();
    }

    #[test]
    fn set_role_never_mints_a_second_owner() {
        let project_id = format!("member-test-{}", Uuid::new_v4());
        let deadline = Deadline::for_request();

        initialize_project(&project_id, "owner-1", &deadline).unwrap();
        upsert(&project_id, "admin-1", Role::Admin, &deadline).unwrap();

        assert!(matches!(
            set_role(&project_id, "admin-1", Role::Owner, &caller("owner-1"), &deadline),
            Err(ServiceError::InvalidRole(_))
        ));
        assert_eq!(owner_count(&project_id), 1);

        remove_project(&project_id, &deadline).unwrap();
    }

    #[test]
    fn transfer_swaps_the_owner_in_one_step() {
        let project_id = format!("member-test-{}", Uuid::new_v4());
        let deadline = Deadline::for_request();

        initialize_project(&project_id, "owner-1", &deadline).unwrap();
        upsert(&project_id, "admin-1", Role::Admin, &deadline).unwrap();

        // Transfers only go to existing members
        assert!(matches!(
            transfer_ownership(&project_id, &caller("owner-1"), "stranger", &deadline),
            Err(ServiceError::NotFound)
        ));
        // And only from the owner
        assert!(matches!(
            transfer_ownership(&project_id, &caller("admin-1"), "admin-1", &deadline),
            Err(ServiceError::InsufficientPermission)
        ));

        let members = transfer_ownership(&project_id, &caller("owner-1"), "admin-1", &deadline).unwrap();
        assert_eq!(owner_count(&project_id), 1);
        let old_owner = members.iter().find(|m| m.user_id == "owner-1").unwrap();
        let new_owner = members.iter().find(|m| m.user_id == "admin-1").unwrap();
        assert_eq!(old_owner.role, Role::Admin);
        assert_eq!(new_owner.role, Role::Owner);

        remove_project(&project_id, &deadline).unwrap();
    }

    #[test]
    fn member_ceiling_is_enforced() {
        let project_id = format!("member-test-{}", Uuid::new_v4());
        let deadline = Deadline::for_request();

        initialize_project(&project_id, "owner-1", &deadline).unwrap();
        for i in 1..MAX_MEMBERS_PER_PROJECT {
            upsert(&project_id, &format!("user-{}", i), Role::Viewer, &deadline).unwrap();
        }
        assert_eq!(list(&project_id).unwrap().len(), MAX_MEMBERS_PER_PROJECT);

        assert!(matches!(
            upsert(&project_id, "one-too-many", Role::Viewer, &deadline),
            Err(ServiceError::CapacityExceeded(_))
        ));

        // Updating an existing member is not an insert and still works
        assert!(upsert(&project_id, "user-1", Role::Contributor, &deadline).is_ok());
        assert_eq!(list(&project_id).unwrap().len(), MAX_MEMBERS_PER_PROJECT);

        remove_project(&project_id, &deadline).unwrap();
    }

    #[test]
    fn rollback_undoes_the_grant_when_commit_fails() {
        let project_id = format!("member-test-{}", Uuid::new_v4());
        let deadline = Deadline::for_request();

        initialize_project(&project_id, "owner-1", &deadline).unwrap();

        let result = grant_for_invitation(&project_id, "invitee-1", Role::Contributor, &deadline, || {
            Err(ServiceError::InternalServerError)
        });
        assert!(result.is_err());
        assert_eq!(get_role(&project_id, "invitee-1").unwrap(), None);
        assert_eq!(list(&project_id).unwrap().len(), 1);

        let granted = grant_for_invitation(&project_id, "invitee-1", Role::Contributor, &deadline, || Ok(()));
        assert_eq!(granted.unwrap().role, Role::Contributor);
        assert_eq!(get_role(&project_id, "invitee-1").unwrap(), Some(Role::Contributor));

        remove_project(&project_id, &deadline).unwrap();
    }

    #[test]
    fn members_list_keeps_join_order() {
        let project_id = format!("member-test-{}", Uuid::new_v4());
        let deadline = Deadline::for_request();

        initialize_project(&project_id, "owner-1", &deadline).unwrap();
        upsert(&project_id, "second", Role::Viewer, &deadline).unwrap();
        upsert(&project_id, "third", Role::Contributor, &deadline).unwrap();

        let ids: Vec<String> = list(&project_id)
            .unwrap()
            .into_iter()
            .map(|m| m.user_id)
            .collect();
        assert_eq!(ids, vec!["owner-1", "second", "third"]);

        remove_project(&project_id, &deadline).unwrap();
    }
}
