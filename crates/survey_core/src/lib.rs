//! Core domain logic for survey authoring, response intake and analytics.
//! This crate is the single source of truth for survey invariants.

pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;

pub use config::{ConfigOverrides, CoreConfig};
pub use db::{open_db, open_db_in_memory, DbError};
pub use logging::{default_log_level, init_logging, logging_status, LoggingError};
pub use model::response::{Answer, AnswerValidationError, AnswerValue, Response, ResponseId};
pub use model::survey::{
    Question, QuestionDraft, QuestionId, QuestionOption, QuestionType, Survey, SurveyDraft,
    SurveyId, SurveyValidationError, UserId,
};
pub use repo::response_repo::{ResponseRepository, SqliteResponseRepository};
pub use repo::survey_repo::{
    RepoError, RepoResult, SqliteSurveyRepository, SurveyListQuery, SurveyRepository,
    SurveyUnitOfWork,
};
pub use service::access::{authorize, authorize_read, AccessError, AccessGrant, Principal};
pub use service::analytics::{
    aggregate, OptionSummary, QuestionAnalytics, QuestionSummary, SurveyAnalytics,
};
pub use service::export::responses_to_csv;
pub use service::response_service::{ResponseService, ResponseServiceError};
pub use service::survey_service::{SurveyService, SurveyServiceError, SyncStep};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
