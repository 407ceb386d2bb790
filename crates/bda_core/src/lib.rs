pub mod audit;
pub mod cache;
pub mod config;
pub mod db;
pub mod decisions;
pub mod domain;
pub mod error;
pub mod feedback;
pub mod insights;
pub mod rate_limit;
pub mod validate;
