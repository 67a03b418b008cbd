// Core types: errors, models, crypto and collaborator traits

pub mod crypto;
pub mod errors;
pub mod models;
pub mod resilience;
pub mod traits;
