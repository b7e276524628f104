// src/routes/mod.rs
pub mod auth_routes;
pub mod collaborator_routes;
pub mod invitation_routes;
pub mod project_routes;
pub mod spec_routes;
