pub mod config;
pub mod ecs;
pub mod error;
pub mod serialization;
