// src/services/mod.rs
pub mod notification_service;
