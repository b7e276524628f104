// specdriven-service/src/routes/spec_routes.rs
use crate::models::{ServiceError, Specification, SpecificationData, UpdateSpecificationRequest};
use crate::utils::authorization::{self, Action};
use crate::utils::{caller_from_request, project_storage, spec_storage, Deadline};
use actix_web::{delete, get, post, put, web, HttpRequest, HttpResponse};
use chrono::Utc;
use log::{error, info};
use serde_json::json;
use uuid::Uuid;

// Create a specification inside a project (contributor and up)
#[post("/projects/{project_id}/specifications")]
async fn create_specification(
    req: HttpRequest,
    path: web::Path<String>,
    data: web::Json<SpecificationData>,
) -> Result<HttpResponse, ServiceError> {
    let caller = caller_from_request(&req)?;
    let project_id = path.into_inner();

    info!("📝 Creating specification in project: {}", project_id);

    if project_storage::find_project_by_id(&project_id)?.is_none() {
        error!("❌ Project not found: {}", project_id);
        return Err(ServiceError::NotFound);
    }

    authorization::authorize(&caller, &project_id, Action::EditSpecification)?;

    let title = data.title.trim();
    if title.is_empty() {
        return Err(ServiceError::BadRequest("specification title is required".to_string()));
    }

    let now = Utc::now();
    let spec = Specification {
        id: Uuid::new_v4().to_string(),
        project_id: project_id.clone(),
        title: title.to_string(),
        description: data.description.clone(),
        content: data.content.clone(),
        created_by: caller.user_id.clone(),
        created_at: now,
        updated_at: now,
    };

    spec_storage::save_spec(&spec)?;

    info!("✅ Specification created: {}", spec.id);

    Ok(HttpResponse::Created().json(json!({
        "success": true,
        "data": { "specification": spec }
    })))
}

// List a project's specifications, oldest first
#[get("/projects/{project_id}/specifications")]
async fn get_specifications(
    req: HttpRequest,
    path: web::Path<String>,
) -> Result<HttpResponse, ServiceError> {
    let caller = caller_from_request(&req)?;
    let project_id = path.into_inner();

    let project = match project_storage::find_project_by_id(&project_id)? {
        Some(project) => project,
        None => return Err(ServiceError::NotFound),
    };

    if !project.is_public {
        authorization::authorize(&caller, &project_id, Action::ViewProject)?;
    }

    let specs = spec_storage::list_for_project(&project_id)?;

    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "data": {
            "specifications": specs,
            "count": specs.len()
        }
    })))
}

// Get one specification
#[get("/projects/{project_id}/specifications/{spec_id}")]
async fn get_specification(
    req: HttpRequest,
    path: web::Path<(String, String)>,
) -> Result<HttpResponse, ServiceError> {
    let caller = caller_from_request(&req)?;
    let (project_id, spec_id) = path.into_inner();

    let project = match project_storage::find_project_by_id(&project_id)? {
        Some(project) => project,
        None => return Err(ServiceError::NotFound),
    };

    if !project.is_public {
        authorization::authorize(&caller, &project_id, Action::ViewProject)?;
    }

    let spec = match spec_storage::find_spec_by_id(&spec_id)? {
        // A spec id from another project must not resolve through this path
        Some(spec) if spec.project_id == project_id => spec,
        _ => {
            error!("❌ Specification not found: {} in project: {}", spec_id, project_id);
            return Err(ServiceError::NotFound);
        }
    };

    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "data": { "specification": spec }
    })))
}

// Update a specification (contributor and up)
#[put("/projects/{project_id}/specifications/{spec_id}")]
async fn update_specification(
    req: HttpRequest,
    path: web::Path<(String, String)>,
    data: web::Json<UpdateSpecificationRequest>,
) -> Result<HttpResponse, ServiceError> {
    let caller = caller_from_request(&req)?;
    let (project_id, spec_id) = path.into_inner();
    let deadline = Deadline::for_request();

    info!("🔄 Updating specification: {} in project: {}", spec_id, project_id);

    authorization::authorize(&caller, &project_id, Action::EditSpecification)?;

    match spec_storage::find_spec_by_id(&spec_id)? {
        Some(spec) if spec.project_id == project_id => {}
        _ => return Err(ServiceError::NotFound),
    }

    let spec = spec_storage::update_spec(&spec_id, &data, &deadline)?;

    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "data": { "specification": spec }
    })))
}

// Delete a specification (contributor and up)
#[delete("/projects/{project_id}/specifications/{spec_id}")]
async fn delete_specification(
    req: HttpRequest,
    path: web::Path<(String, String)>,
) -> Result<HttpResponse, ServiceError> {
    let caller = caller_from_request(&req)?;
    let (project_id, spec_id) = path.into_inner();
    let deadline = Deadline::for_request();

    info!("🗑️ Deleting specification: {} in project: {}", spec_id, project_id);

    authorization::authorize(&caller, &project_id, Action::EditSpecification)?;

    match spec_storage::find_spec_by_id(&spec_id)? {
        Some(spec) if spec.project_id == project_id => {}
        _ => return Err(ServiceError::NotFound),
    }

    spec_storage::delete_spec(&spec_id, &deadline)?;

    info!("✅ Specification deleted: {}", spec_id);

    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "data": { "message": "Specification deleted successfully" }
    })))
}

// Register all specification routes
pub fn init_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(create_specification)
        .service(get_specifications)
        .service(get_specification)
        .service(update_specification)
        .service(delete_specification);
}
