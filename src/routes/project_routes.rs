// specdriven-service/src/routes/project_routes.rs
use crate::models::{Project, ProjectData, ServiceError, TransferOwnershipRequest, UpdateProjectRequest};
use crate::utils::authorization::{self, Action};
use crate::utils::{
    caller_from_request, invitation_storage, membership_storage, project_storage, spec_storage,
    Deadline,
};
use actix_web::{delete, get, post, put, web, HttpRequest, HttpResponse};
use chrono::Utc;
use log::{error, info};
use serde_json::json;
use uuid::Uuid;

// Create a new project; the caller becomes its owner
#[post("/projects")]
async fn create_project(
    req: HttpRequest,
    data: web::Json<ProjectData>,
) -> Result<HttpResponse, ServiceError> {
    let caller = caller_from_request(&req)?;
    let deadline = Deadline::for_request();

    let name = data.name.trim();
    if name.is_empty() {
        return Err(ServiceError::BadRequest("project name is required".to_string()));
    }

    info!("📝 Creating project: {} for user: {}", name, caller.user_id);

    let now = Utc::now();
    let project = Project {
        id: Uuid::new_v4().to_string(),
        name: name.to_string(),
        description: data.description.clone(),
        owner_id: caller.user_id.clone(),
        is_public: data.is_public,
        created_at: now,
        updated_at: now,
    };

    project_storage::save_project(&project)?;

    // The owner membership is what actually grants access; without it the
    // project record is an orphan, so undo on failure
    if let Err(err) = membership_storage::initialize_project(&project.id, &caller.user_id, &deadline) {
        error!("❌ Failed to seed owner membership for project: {}", project.id);
        let _ = project_storage::delete_project(&project.id, &deadline);
        return Err(err);
    }

    info!("✅ Project created successfully: {}", project.id);

    Ok(HttpResponse::Created().json(json!({
        "success": true,
        "data": {
            "project": project,
            "user_role": "owner"
        }
    })))
}

// Get all projects the caller belongs to
#[get("/projects")]
async fn get_user_projects(req: HttpRequest) -> Result<HttpResponse, ServiceError> {
    let caller = caller_from_request(&req)?;

    info!("📋 Fetching projects for user: {}", caller.user_id);

    let projects: Vec<serde_json::Value> = project_storage::projects_for_user(&caller.user_id)?
        .into_iter()
        .map(|(project, role)| json!({ "project": project, "user_role": role }))
        .collect();

    info!("✅ Found {} projects for user: {}", projects.len(), caller.user_id);

    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "data": {
            "projects": projects,
            "count": projects.len()
        }
    })))
}

// Get a single project. Members always see it; non-members only when the
// project is public.
#[get("/projects/{project_id}")]
async fn get_project(req: HttpRequest, path: web::Path<String>) -> Result<HttpResponse, ServiceError> {
    let caller = caller_from_request(&req)?;
    let project_id = path.into_inner();

    let project = match project_storage::find_project_by_id(&project_id)? {
        Some(project) => project,
        None => {
            error!("❌ Project not found: {}", project_id);
            return Err(ServiceError::NotFound);
        }
    };

    let user_role = if project.is_public {
        membership_storage::get_role(&project_id, &caller.user_id)?
    } else {
        Some(authorization::authorize(&caller, &project_id, Action::ViewProject)?)
    };

    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "data": {
            "project": project,
            "user_role": user_role
        }
    })))
}

// Update project metadata (admin and up)
#[put("/projects/{project_id}")]
async fn update_project(
    req: HttpRequest,
    path: web::Path<String>,
    data: web::Json<UpdateProjectRequest>,
) -> Result<HttpResponse, ServiceError> {
    let caller = caller_from_request(&req)?;
    let project_id = path.into_inner();
    let deadline = Deadline::for_request();

    if project_storage::find_project_by_id(&project_id)?.is_none() {
        return Err(ServiceError::NotFound);
    }

    authorization::authorize(&caller, &project_id, Action::UpdateProject)?;

    let project = project_storage::update_project(&project_id, &data, &deadline)?;

    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "data": { "project": project }
    })))
}

// Delete a project and everything attached to it (owner only)
#[delete("/projects/{project_id}")]
async fn delete_project(req: HttpRequest, path: web::Path<String>) -> Result<HttpResponse, ServiceError> {
    let caller = caller_from_request(&req)?;
    let project_id = path.into_inner();
    let deadline = Deadline::for_request();

    info!("🗑️ Delete request for project: {} by user: {}", project_id, caller.user_id);

    if project_storage::find_project_by_id(&project_id)?.is_none() {
        return Err(ServiceError::NotFound);
    }

    authorization::authorize(&caller, &project_id, Action::DeleteProject)?;

    let invitations_deleted = invitation_storage::delete_project_invitations(&project_id, &deadline)?;
    let specs_deleted = spec_storage::delete_project_specs(&project_id, &deadline)?;
    membership_storage::remove_project(&project_id, &deadline)?;
    project_storage::delete_project(&project_id, &deadline)?;

    info!("✅ Project deleted: {}", project_id);

    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "data": {
            "message": "Project deleted successfully",
            "invitations_deleted": invitations_deleted,
            "specifications_deleted": specs_deleted
        }
    })))
}

// Hand the owner role to another member (owner only)
#[put("/projects/{project_id}/transfer-ownership")]
async fn transfer_ownership(
    req: HttpRequest,
    path: web::Path<String>,
    data: web::Json<TransferOwnershipRequest>,
) -> Result<HttpResponse, ServiceError> {
    let caller = caller_from_request(&req)?;
    let project_id = path.into_inner();
    let deadline = Deadline::for_request();

    info!(
        "🔄 Ownership transfer request for project: {} to user: {}",
        project_id, data.new_owner_id
    );

    if project_storage::find_project_by_id(&project_id)?.is_none() {
        return Err(ServiceError::NotFound);
    }

    authorization::authorize(&caller, &project_id, Action::TransferOwnership)?;

    let members =
        membership_storage::transfer_ownership(&project_id, &caller, &data.new_owner_id, &deadline)?;
    let project = project_storage::set_owner(&project_id, &data.new_owner_id, &deadline)?;

    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "data": {
            "project": project,
            "members": members
        }
    })))
}

// Walk away from a project. Anyone but the owner can.
#[delete("/projects/{project_id}/leave")]
async fn leave_project(req: HttpRequest, path: web::Path<String>) -> Result<HttpResponse, ServiceError> {
    let caller = caller_from_request(&req)?;
    let project_id = path.into_inner();
    let deadline = Deadline::for_request();

    authorization::authorize(&caller, &project_id, Action::LeaveProject)?;
    membership_storage::remove(&project_id, &caller.user_id, &caller, &deadline)?;

    info!("✅ User: {} left project: {}", caller.user_id, project_id);

    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "data": { "message": "You have left the project" }
    })))
}

// Register all project routes
pub fn init_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(create_project)
        .service(get_user_projects)
        .service(get_project)
        .service(update_project)
        .service(delete_project)
        .service(transfer_ownership)
        .service(leave_project);
}
