// specdriven-service/src/lib.rs
pub mod models;
pub mod routes;
pub mod services;
pub mod utils;
