//! Core use-case services.
//!
//! # Responsibility
//! - Gate survey access by principal before any read or write.
//! - Orchestrate repository calls into survey and response use-cases.
//! - Keep the analytics aggregation free of storage concerns.

pub mod access;
pub mod analytics;
pub mod export;
pub mod response_service;
pub mod survey_service;
