//! HTTP handlers

pub mod agent;
pub mod alerts;
pub mod baseline;
pub mod health;
