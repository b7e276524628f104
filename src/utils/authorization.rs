// specdriven-service/src/utils/authorization.rs
//
// Single checkpoint for project-scoped permissions. Routes never compare
// roles themselves; they name the action and this module answers.
use crate::models::{CallerIdentity, Role, ServiceError};
use crate::utils::membership_storage;
use log::warn;

// Everything a caller can do to a project that needs a role check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    ViewProject,
    EditSpecification,
    ManageCollaborators,
    UpdateProject,
    DeleteProject,
    TransferOwnership,
    LeaveProject,
}

impl Action {
    // Minimum role for each action. Changing access rules means changing
    // this table, nothing else.
    pub fn required_role(self) -> Role {
        match self {
            Action::ViewProject => Role::Viewer,
            Action::LeaveProject => Role::Viewer,
            Action::EditSpecification => Role::Contributor,
            Action::ManageCollaborators => Role::Admin,
            Action::UpdateProject => Role::Admin,
            Action::DeleteProject => Role::Owner,
            Action::TransferOwnership => Role::Owner,
        }
    }
}

// Resolve the caller's role on the project and require it to meet the floor
// for `action`. No membership and too-low roles both come back as
// `InsufficientPermission`; the caller learns nothing about who else is on
// the project.
pub fn authorize(
    caller: &CallerIdentity,
    project_id: &str,
    action: Action,
) -> Result<Role, ServiceError> {
    let role = match membership_storage::get_role(project_id, &caller.user_id)? {
        Some(role) => role,
        None => {
            warn!(
                "Denied {:?} on project {}: user {} has no membership",
                action, project_id, caller.user_id
            );
            return Err(ServiceError::InsufficientPermission);
        }
    };

    let floor = action.required_role();
    if !role.at_least(floor) {
        warn!(
            "Denied {:?} on project {}: user {} is {:?}, needs {:?}",
            action, project_id, caller.user_id, role, floor
        );
        return Err(ServiceError::InsufficientPermission);
    }

    Ok(role)
}

// Rules for assigning `new_role` to a member who currently holds
// `target_current`. Shared by the set-role endpoint and invitation creation.
pub fn check_role_assignment(
    caller_role: Role,
    target_current: Role,
    new_role: Role,
    is_self: bool,
) -> Result<(), ServiceError> {
    if new_role == Role::Owner {
        return Err(ServiceError::InvalidRole(
            "the owner role can only be granted through an ownership transfer".to_string(),
        ));
    }
    if target_current == Role::Owner {
        return Err(ServiceError::CannotChangeOwnerRole);
    }
    // Nobody may lower their own access; losing admin takes another admin
    if is_self && new_role < caller_role {
        return Err(ServiceError::InsufficientPermission);
    }
    // Peers are protected: only a strictly higher role (or the owner)
    // may change an equal-or-higher member
    if !is_self && caller_role != Role::Owner && target_current >= caller_role {
        return Err(ServiceError::InsufficientPermission);
    }
    if new_role > caller_role {
        return Err(ServiceError::InsufficientPermission);
    }
    Ok(())
}

// Rules for removing a member. Leaving (self-removal) is always allowed
// below owner; removing someone else follows the same peer protection as
// role changes.
pub fn check_removal(
    caller_role: Role,
    target_role: Role,
    is_self: bool,
) -> Result<(), ServiceError> {
    if target_role == Role::Owner {
        return Err(ServiceError::CannotRemoveOwner);
    }
    if is_self {
        return Ok(());
    }
    if caller_role != Role::Owner && target_role >= caller_role {
        return Err(ServiceError::InsufficientPermission);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::{membership_storage, Deadline};
    use uuid::Uuid;

    fn caller(user_id: &str) -> CallerIdentity {
        CallerIdentity {
            user_id: user_id.to_string(),
            email: format!("{}@example.com", user_id),
        }
    }

    #[test]
    fn floors_follow_the_action_table() {
        assert_eq!(Action::ViewProject.required_role(), Role::Viewer);
        assert_eq!(Action::EditSpecification.required_role(), Role::Contributor);
        assert_eq!(Action::ManageCollaborators.required_role(), Role::Admin);
        assert_eq!(Action::UpdateProject.required_role(), Role::Admin);
        assert_eq!(Action::DeleteProject.required_role(), Role::Owner);
        assert_eq!(Action::TransferOwnership.required_role(), Role::Owner);
    }

    #[test]
    fn only_the_owner_may_delete_the_project() {
        let project_id = format!("authz-test-{}", Uuid::new_v4());
        let deadline = Deadline::for_request();

        membership_storage::initialize_project(&project_id, "owner-1", &deadline).unwrap();
        membership_storage::upsert(&project_id, "admin-1", Role::Admin, &deadline).unwrap();
        membership_storage::upsert(&project_id, "contrib-1", Role::Contributor, &deadline).unwrap();
        membership_storage::upsert(&project_id, "viewer-1", Role::Viewer, &deadline).unwrap();

        assert!(authorize(&caller("owner-1"), &project_id, Action::DeleteProject).is_ok());
        for blocked in ["admin-1", "contrib-1", "viewer-1", "stranger"] {
            assert!(matches!(
                authorize(&caller(blocked), &project_id, Action::DeleteProject),
                Err(ServiceError::InsufficientPermission)
            ));
        }

        // Every member may view; strangers may not
        for member in ["owner-1", "admin-1", "contrib-1", "viewer-1"] {
            assert!(authorize(&caller(member), &project_id, Action::ViewProject).is_ok());
        }
        assert!(authorize(&caller("stranger"), &project_id, Action::ViewProject).is_err());

        // Contributor can edit specs but not manage collaborators
        assert!(authorize(&caller("contrib-1"), &project_id, Action::EditSpecification).is_ok());
        assert!(authorize(&caller("contrib-1"), &project_id, Action::ManageCollaborators).is_err());

        membership_storage::remove_project(&project_id, &deadline).unwrap();
    }

    #[test]
    fn owner_role_is_never_assignable() {
        let err = check_role_assignment(Role::Owner, Role::Viewer, Role::Owner, false);
        assert!(matches!(err, Err(ServiceError::InvalidRole(_))));
    }

    #[test]
    fn owner_cannot_be_reassigned_even_by_themselves() {
        assert!(matches!(
            check_role_assignment(Role::Owner, Role::Owner, Role::Viewer, true),
            Err(ServiceError::CannotChangeOwnerRole)
        ));
        assert!(matches!(
            check_role_assignment(Role::Admin, Role::Owner, Role::Viewer, false),
            Err(ServiceError::CannotChangeOwnerRole)
        ));
    }

    #[test]
    fn self_demotion_is_blocked() {
        assert!(matches!(
            check_role_assignment(Role::Admin, Role::Admin, Role::Viewer, true),
            Err(ServiceError::InsufficientPermission)
        ));
        // Re-stating the current role is a no-op, not a demotion
        assert!(check_role_assignment(Role::Admin, Role::Admin, Role::Admin, true).is_ok());
    }

    #[test]
    fn admins_cannot_touch_other_admins() {
        assert!(matches!(
            check_role_assignment(Role::Admin, Role::Admin, Role::Viewer, false),
            Err(ServiceError::InsufficientPermission)
        ));
        assert!(matches!(
            check_removal(Role::Admin, Role::Admin, false),
            Err(ServiceError::InsufficientPermission)
        ));
        // The owner can
        assert!(check_role_assignment(Role::Owner, Role::Admin, Role::Viewer, false).is_ok());
        assert!(check_removal(Role::Owner, Role::Admin, false).is_ok());
    }

    #[test]
    fn no_granting_above_your_own_role() {
        assert!(matches!(
            check_role_assignment(Role::Admin, Role::Viewer, Role::Owner, false),
            Err(ServiceError::InvalidRole(_))
        ));
        // Equal to own level is fine
        assert!(check_role_assignment(Role::Admin, Role::Viewer, Role::Admin, false).is_ok());
    }

    #[test]
    fn owner_is_never_removable_but_members_may_leave() {
        assert!(matches!(
            check_removal(Role::Owner, Role::Owner, true),
            Err(ServiceError::CannotRemoveOwner)
        ));
        assert!(matches!(
            check_removal(Role::Admin, Role::Owner, false),
            Err(ServiceError::CannotRemoveOwner)
        ));
        assert!(check_removal(Role::Viewer, Role::Viewer, true).is_ok());
        assert!(check_removal(Role::Contributor, Role::Contributor, true).is_ok());
    }
}
