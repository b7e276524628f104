// specdriven-service/src/utils/project_storage.rs
//
// Project metadata, one JSON file per project. Roles live in the membership
// store; `owner_id` here is display metadata kept in step by the routes.
use crate::models::{Project, Role, ServiceError, UpdateProjectRequest};
use crate::utils::{membership_storage, Deadline, StoreLock};
use chrono::Utc;
use log::{error, info, warn};
use std::fs;
use std::path::Path;

const PROJECTS_DIR: &str = "./storage/projects";

lazy_static::lazy_static! {
    static ref PROJECT_LOCK: StoreLock = StoreLock::new();
}

fn project_path(project_id: &str) -> String {
    format!("{}/{}.json", PROJECTS_DIR, project_id)
}

// Save project to storage
pub fn save_project(project: &Project) -> Result<(), ServiceError> {
    let dir = Path::new(PROJECTS_DIR);
    if !dir.exists() {
        fs::create_dir_all(dir).map_err(|e| {
            error!("Failed to create projects directory: {:?}", e);
            ServiceError::StoreUnavailable
        })?;
    }

    let project_json = serde_json::to_string_pretty(project).map_err(|e| {
        error!("Failed to serialize project: {:?}", e);
        ServiceError::InternalServerError
    })?;

    fs::write(project_path(&project.id), project_json).map_err(|e| {
        error!("Failed to save project: {:?}", e);
        ServiceError::StoreUnavailable
    })?;

    Ok(())
}

// Find project by ID
pub fn find_project_by_id(project_id: &str) -> Result<Option<Project>, ServiceError> {
    let path_str = project_path(project_id);
    let path = Path::new(&path_str);

    if !path.exists() {
        return Ok(None);
    }

    let content = fs::read_to_string(path).map_err(|e| {
        error!("Failed to read project file: {:?}", e);
        ServiceError::StoreUnavailable
    })?;

    let project: Project = serde_json::from_str(&content).map_err(|e| {
        error!("Failed to parse project JSON: {:?}", e);
        ServiceError::InternalServerError
    })?;

    Ok(Some(project))
}

// Apply a partial update under the store lock.
pub fn update_project(
    project_id: &str,
    changes: &UpdateProjectRequest,
    deadline: &Deadline,
) -> Result<Project, ServiceError> {
    let _guard = PROJECT_LOCK.acquire(deadline)?;

    let mut project = find_project_by_id(project_id)?.ok_or(ServiceError::NotFound)?;

    if let Some(name) = &changes.name {
        let name = name.trim();
        if name.is_empty() {
            return Err(ServiceError::BadRequest("project name cannot be empty".to_string()));
        }
        project.name = name.to_string();
    }
    if let Some(description) = &changes.description {
        project.description = Some(description.clone());
    }
    if let Some(is_public) = changes.is_public {
        project.is_public = is_public;
    }
    project.updated_at = Utc::now();

    save_project(&project)?;
    info!("🔄 Updated project: {}", project_id);
    Ok(project)
}

// Point the display owner at the user who now holds the owner membership.
pub fn set_owner(project_id: &str, new_owner_id: &str, deadline: &Deadline) -> Result<Project, ServiceError> {
    let _guard = PROJECT_LOCK.acquire(deadline)?;

    let mut project = find_project_by_id(project_id)?.ok_or(ServiceError::NotFound)?;
    project.owner_id = new_owner_id.to_string();
    project.updated_at = Utc::now();
    save_project(&project)?;
    Ok(project)
}

// Delete a project file.
pub fn delete_project(project_id: &str, deadline: &Deadline) -> Result<bool, ServiceError> {
    let _guard = PROJECT_LOCK.acquire(deadline)?;

    let path_str = project_path(project_id);
    let path = Path::new(&path_str);
    if !path.exists() {
        return Ok(false);
    }

    fs::remove_file(path).map_err(|e| {
        error!("Failed to delete project file: {:?}", e);
        ServiceError::StoreUnavailable
    })?;

    info!("🗑️ Deleted project: {}", project_id);
    Ok(true)
}

// Every project the user belongs to, with their role on it. Walks the
// projects directory and checks membership per project.
pub fn projects_for_user(user_id: &str) -> Result<Vec<(Project, Role)>, ServiceError> {
    let dir = Path::new(PROJECTS_DIR);
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let mut projects = Vec::new();

    for entry_result in fs::read_dir(dir).map_err(|e| {
        error!("Failed to read projects directory: {:?}", e);
        ServiceError::StoreUnavailable
    })? {
        let entry = entry_result.map_err(|e| {
            error!("Failed to read directory entry: {:?}", e);
            ServiceError::StoreUnavailable
        })?;

        let path = entry.path();
        if path.is_file() && path.extension().map_or(false, |ext| ext == "json") {
            let content = fs::read_to_string(&path).map_err(|e| {
                error!("Failed to read project file: {:?}", e);
                ServiceError::StoreUnavailable
            })?;

            let project: Project = match serde_json::from_str(&content) {
                Ok(project) => project,
                Err(e) => {
                    warn!("Skipping unparseable project file {:?}: {:?}", path, e);
                    continue;
                }
            };

            if let Some(role) = membership_storage::get_role(&project.id, user_id)? {
                projects.push((project, role));
            }
        }
    }

    // Newest first, same order the dashboard shows them
    projects.sort_by(|a, b| b.0.created_at.cmp(&a.0.created_at));
    Ok(projects)
}
