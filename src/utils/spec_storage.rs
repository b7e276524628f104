// specdriven-service/src/utils/spec_storage.rs
//
// Specification documents, one JSON file per document. The collaboration
// core treats content as opaque text; this store only cares that reads and
// edits went through the authorization guard first.
use crate::models::{ServiceError, Specification, UpdateSpecificationRequest};
use crate::utils::{Deadline, StoreLock};
use chrono::Utc;
use log::{error, info, warn};
use std::fs;
use std::path::Path;

const SPECS_DIR: &str = "./storage/specifications";

lazy_static::lazy_static! {
    static ref SPEC_LOCK: StoreLock = StoreLock::new();
}

fn spec_path(spec_id: &str) -> String {
    format!("{}/{}.json", SPECS_DIR, spec_id)
}

// Save specification to storage
pub fn save_spec(spec: &Specification) -> Result<(), ServiceError> {
    let dir = Path::new(SPECS_DIR);
    if !dir.exists() {
        fs::create_dir_all(dir).map_err(|e| {
            error!("Failed to create specifications directory: {:?}", e);
            ServiceError::StoreUnavailable
        })?;
    }

    let spec_json = serde_json::to_string_pretty(spec).map_err(|e| {
        error!("Failed to serialize specification: {:?}", e);
        ServiceError::InternalServerError
    })?;

    fs::write(spec_path(&spec.id), spec_json).map_err(|e| {
        error!("Failed to save specification: {:?}", e);
        ServiceError::StoreUnavailable
    })?;

    Ok(())
}

// Find specification by ID
pub fn find_spec_by_id(spec_id: &str) -> Result<Option<Specification>, ServiceError> {
    let path_str = spec_path(spec_id);
    let path = Path::new(&path_str);

    if !path.exists() {
        return Ok(None);
    }

    let content = fs::read_to_string(path).map_err(|e| {
        error!("Failed to read specification file: {:?}", e);
        ServiceError::StoreUnavailable
    })?;

    let spec: Specification = serde_json::from_str(&content).map_err(|e| {
        error!("Failed to parse specification JSON: {:?}", e);
        ServiceError::InternalServerError
    })?;

    Ok(Some(spec))
}

// Apply a partial update under the store lock.
pub fn update_spec(
    spec_id: &str,
    changes: &UpdateSpecificationRequest,
    deadline: &Deadline,
) -> Result<Specification, ServiceError> {
    let _guard = SPEC_LOCK.acquire(deadline)?;

    let mut spec = find_spec_by_id(spec_id)?.ok_or(ServiceError::NotFound)?;

    if let Some(title) = &changes.title {
        let title = title.trim();
        if title.is_empty() {
            return Err(ServiceError::BadRequest("specification title cannot be empty".to_string()));
        }
        spec.title = title.to_string();
    }
    if let Some(description) = &changes.description {
        spec.description = Some(description.clone());
    }
    if let Some(content) = &changes.content {
        spec.content = content.clone();
    }
    spec.updated_at = Utc::now();

    save_spec(&spec)?;
    info!("📝 Updated specification: {}", spec_id);
    Ok(spec)
}

// Delete one specification.
pub fn delete_spec(spec_id: &str, deadline: &Deadline) -> Result<bool, ServiceError> {
    let _guard = SPEC_LOCK.acquire(deadline)?;

    let path_str = spec_path(spec_id);
    let path = Path::new(&path_str);
    if !path.exists() {
        return Ok(false);
    }

    fs::remove_file(path).map_err(|e| {
        error!("Failed to delete specification file: {:?}", e);
        ServiceError::StoreUnavailable
    })?;

    info!("🗑️ Deleted specification: {}", spec_id);
    Ok(true)
}

// All specifications of a project, oldest first.
pub fn list_for_project(project_id: &str) -> Result<Vec<Specification>, ServiceError> {
    let dir = Path::new(SPECS_DIR);
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let mut specs = Vec::new();

    for entry_result in fs::read_dir(dir).map_err(|e| {
        error!("Failed to read specifications directory: {:?}", e);
        ServiceError::StoreUnavailable
    })? {
        let entry = entry_result.map_err(|e| {
            error!("Failed to read directory entry: {:?}", e);
            ServiceError::StoreUnavailable
        })?;

        let path = entry.path();
        if path.is_file() && path.extension().map_or(false, |ext| ext == "json") {
            let content = fs::read_to_string(&path).map_err(|e| {
                error!("Failed to read specification file: {:?}", e);
                ServiceError::StoreUnavailable
            })?;

            let spec: Specification = match serde_json::from_str(&content) {
                Ok(spec) => spec,
                Err(e) => {
                    warn!("Skipping unparseable specification file {:?}: {:?}", path, e);
                    continue;
                }
            };

            if spec.project_id == project_id {
                specs.push(spec);
            }
        }
    }

    specs.sort_by(|a, b| a.created_at.cmp(&b.created_at));
    Ok(specs)
}

// Drop every specification belonging to a project.
pub fn delete_project_specs(project_id: &str, deadline: &Deadline) -> Result<usize, ServiceError> {
    let specs = list_for_project(project_id)?;
    let _guard = SPEC_LOCK.acquire(deadline)?;

    let mut deleted_count = 0;
    for spec in specs {
        let path_str = spec_path(&spec.id);
        let path = Path::new(&path_str);
        if path.exists() {
            fs::remove_file(path).map_err(|e| {
                error!("Failed to delete specification file: {:?}", e);
                ServiceError::StoreUnavailable
            })?;
            deleted_count += 1;
        }
    }

    info!("🗑️ Deleted {} specifications for project: {}", deleted_count, project_id);
    Ok(deleted_count)
}
