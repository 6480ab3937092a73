//! Repository layer abstractions and SQLite implementations.
//!
//! # Responsibility
//! - Define survey and response data access contracts.
//! - Keep SQL details out of the authorization and use-case services.
//!
//! # Invariants
//! - Survey writes happen only inside a `SurveyUnitOfWork`.
//! - Repository APIs return semantic errors (`SurveyNotFound`,
//!   `QuestionNotFound`) in addition to DB transport errors.

pub mod response_repo;
pub mod survey_repo;
