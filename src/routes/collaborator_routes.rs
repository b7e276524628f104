// specdriven-service/src/routes/collaborator_routes.rs
use crate::models::{
    CollaboratorView, CreateInvitationRequest, InvitationView, Role, ServiceError, SetRoleRequest,
};
use crate::services::notification_service;
use crate::utils::authorization::{self, Action};
use crate::utils::{
    caller_from_request, invitation_storage, membership_storage, project_storage, user_storage,
    Deadline,
};
use actix_web::{delete, get, post, put, web, HttpRequest, HttpResponse};
use log::info;
use serde_json::json;

// List the members of a project. Admins also see the pending invitations.
#[get("/projects/{project_id}/collaborators")]
async fn get_collaborators(
    req: HttpRequest,
    path: web::Path<String>,
) -> Result<HttpResponse, ServiceError> {
    let caller = caller_from_request(&req)?;
    let project_id = path.into_inner();

    info!("👥 Fetching collaborators for project: {}", project_id);

    let project = match project_storage::find_project_by_id(&project_id)? {
        Some(project) => project,
        None => return Err(ServiceError::NotFound),
    };

    let caller_role = if project.is_public {
        membership_storage::get_role(&project_id, &caller.user_id)?
    } else {
        Some(authorization::authorize(&caller, &project_id, Action::ViewProject)?)
    };

    let memberships = membership_storage::list(&project_id)?;
    let mut collaborators = Vec::with_capacity(memberships.len());
    for membership in &memberships {
        let user = user_storage::find_user_by_id(&membership.user_id)?;
        collaborators.push(CollaboratorView {
            user_id: membership.user_id.clone(),
            email: user.as_ref().map(|u| u.email.clone()),
            display_name: user.as_ref().map(|u| u.display_name()),
            role: membership.role,
            joined_at: membership.joined_at,
        });
    }

    let mut data = json!({
        "collaborators": collaborators,
        "count": collaborators.len()
    });

    // Pending invitations carry invitee addresses, so only admins get them
    if caller_role.map_or(false, |role| role.at_least(Role::Admin)) {
        let pending: Vec<InvitationView> = invitation_storage::list_pending(&project_id)?
            .iter()
            .map(InvitationView::from)
            .collect();
        data["pending_invitations"] = json!(pending);
    }

    Ok(HttpResponse::Ok().json(json!({ "success": true, "data": data })))
}

// Invite someone to the project by email (admin and up)
#[post("/projects/{project_id}/collaborators")]
async fn invite_collaborator(
    req: HttpRequest,
    path: web::Path<String>,
    data: web::Json<CreateInvitationRequest>,
) -> Result<HttpResponse, ServiceError> {
    let caller = caller_from_request(&req)?;
    let project_id = path.into_inner();
    let deadline = Deadline::for_request();

    info!(
        "📧 Invitation request for project: {} to: {} as: {}",
        project_id, data.email, data.role
    );

    if project_storage::find_project_by_id(&project_id)?.is_none() {
        return Err(ServiceError::NotFound);
    }

    let role = match Role::parse(&data.role) {
        Some(role) => role,
        None => {
            return Err(ServiceError::InvalidRole(format!(
                "'{}' is not a role; expected viewer, contributor or admin",
                data.role
            )))
        }
    };

    let (mut invitation, raw_token) = invitation_storage::create(
        &project_id,
        &caller,
        &data.email,
        role,
        data.message.clone(),
        &deadline,
    )?;

    invitation_storage::enrich_invitation(&mut invitation)?;
    notification_service::deliver_invitation(&invitation, &raw_token);

    Ok(HttpResponse::Created().json(json!({
        "success": true,
        "data": { "invitation": InvitationView::from(&invitation) }
    })))
}

// Change a member's role (admin and up, with the usual owner guards)
#[put("/projects/{project_id}/collaborators/{user_id}")]
async fn set_collaborator_role(
    req: HttpRequest,
    path: web::Path<(String, String)>,
    data: web::Json<SetRoleRequest>,
) -> Result<HttpResponse, ServiceError> {
    let caller = caller_from_request(&req)?;
    let (project_id, target_user_id) = path.into_inner();
    let deadline = Deadline::for_request();

    info!(
        "🔄 Role change request in project: {} for user: {} to: {}",
        project_id, target_user_id, data.role
    );

    if project_storage::find_project_by_id(&project_id)?.is_none() {
        return Err(ServiceError::NotFound);
    }

    authorization::authorize(&caller, &project_id, Action::ManageCollaborators)?;

    let new_role = match Role::parse(&data.role) {
        Some(role) => role,
        None => {
            return Err(ServiceError::InvalidRole(format!(
                "'{}' is not a role; expected viewer, contributor or admin",
                data.role
            )))
        }
    };

    let membership =
        membership_storage::set_role(&project_id, &target_user_id, new_role, &caller, &deadline)?;

    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "data": { "membership": membership }
    })))
}

// Remove a member. Admins remove others; anyone below owner removes themselves.
#[delete("/projects/{project_id}/collaborators/{user_id}")]
async fn remove_collaborator(
    req: HttpRequest,
    path: web::Path<(String, String)>,
) -> Result<HttpResponse, ServiceError> {
    let caller = caller_from_request(&req)?;
    let (project_id, target_user_id) = path.into_inner();
    let deadline = Deadline::for_request();

    info!(
        "🗑️ Removal request in project: {} for user: {}",
        project_id, target_user_id
    );

    if project_storage::find_project_by_id(&project_id)?.is_none() {
        return Err(ServiceError::NotFound);
    }

    let action = if target_user_id == caller.user_id {
        Action::LeaveProject
    } else {
        Action::ManageCollaborators
    };
    authorization::authorize(&caller, &project_id, action)?;

    membership_storage::remove(&project_id, &target_user_id, &caller, &deadline)?;

    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "data": { "message": "Collaborator removed" }
    })))
}

// Register all collaborator routes
pub fn init_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(get_collaborators)
        .service(invite_collaborator)
        .service(set_collaborator_role)
        .service(remove_collaborator);
}
