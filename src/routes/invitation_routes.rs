// specdriven-service/src/routes/invitation_routes.rs
use crate::models::{InvitationTokenRequest, InvitationView, ServiceError};
use crate::utils::{caller_from_request, invitation_storage, Deadline};
use actix_web::{delete, get, put, web, HttpRequest, HttpResponse};
use log::info;
use serde_json::json;

// Everything ever sent to the caller's email address, newest first
#[get("/user/invitations")]
async fn get_user_invitations(req: HttpRequest) -> Result<HttpResponse, ServiceError> {
    let caller = caller_from_request(&req)?;

    info!("📋 Fetching invitations for: {}", caller.email);

    let mut invitations = invitation_storage::list_for_email(&caller.email)?;
    for invitation in invitations.iter_mut() {
        invitation_storage::enrich_invitation(invitation)?;
    }

    let views: Vec<InvitationView> = invitations.iter().map(InvitationView::from).collect();

    info!("✅ Found {} invitations for: {}", views.len(), caller.email);

    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "data": {
            "invitations": views,
            "count": views.len()
        }
    })))
}

// Accept an invitation with its emailed token. Membership is granted here.
#[put("/invitations/{invitation_id}/accept")]
async fn accept_invitation(
    req: HttpRequest,
    path: web::Path<String>,
    data: web::Json<InvitationTokenRequest>,
) -> Result<HttpResponse, ServiceError> {
    let caller = caller_from_request(&req)?;
    let invitation_id = path.into_inner();
    let deadline = Deadline::for_request();

    info!("✅ Accept request for invitation: {} by user: {}", invitation_id, caller.user_id);

    let (mut invitation, membership) =
        invitation_storage::accept(&invitation_id, &data.token, &caller, &deadline)?;
    invitation_storage::enrich_invitation(&mut invitation)?;

    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "data": {
            "invitation": InvitationView::from(&invitation),
            "membership": membership
        }
    })))
}

// Decline an invitation. The token alone identifies it, no account match
// is required, so an unwanted invite can be refused from any signed-in session.
#[put("/invitations/{invitation_id}/decline")]
async fn decline_invitation(
    path: web::Path<String>,
    data: web::Json<InvitationTokenRequest>,
) -> Result<HttpResponse, ServiceError> {
    let invitation_id = path.into_inner();
    let deadline = Deadline::for_request();

    info!("❌ Decline request for invitation: {}", invitation_id);

    let invitation = invitation_storage::decline(&invitation_id, &data.token, &deadline)?;

    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "data": { "invitation": InvitationView::from(&invitation) }
    })))
}

// Withdraw a pending invitation (admin and up on the project)
#[delete("/projects/{project_id}/invitations/{invitation_id}")]
async fn cancel_invitation(
    req: HttpRequest,
    path: web::Path<(String, String)>,
) -> Result<HttpResponse, ServiceError> {
    let caller = caller_from_request(&req)?;
    let (project_id, invitation_id) = path.into_inner();
    let deadline = Deadline::for_request();

    info!(
        "🗑️ Cancel request for invitation: {} in project: {}",
        invitation_id, project_id
    );

    let invitation = invitation_storage::cancel(&invitation_id, &project_id, &caller, &deadline)?;

    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "data": { "invitation": InvitationView::from(&invitation) }
    })))
}

// Register all invitation routes
pub fn init_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(get_user_invitations)
        .service(accept_invitation)
        .service(decline_invitation)
        .service(cancel_invitation);
}
