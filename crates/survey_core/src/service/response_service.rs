//! Response intake and analytics use-cases.
//!
//! # Responsibility
//! - Validate and store submitted responses.
//! - Serve raw responses and CSV exports to survey managers and analytics
//!   to readers.
//!
//! # Invariants
//! - Responses are accepted only for existing, active surveys.
//! - Answers are validated against the survey definition before storage.
//! - Analytics is computed from a complete response set or not at all.

use crate::model::response::{validate_answers, Answer, AnswerValidationError, Response};
use crate::model::survey::{SurveyId, UserId};
use crate::repo::response_repo::ResponseRepository;
use crate::repo::survey_repo::{RepoError, SurveyRepository};
use crate::service::access::{authorize, authorize_read, AccessError, Principal};
use crate::service::analytics::{aggregate, SurveyAnalytics};
use crate::service::export::responses_to_csv;
use log::{error, info};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::{Instant, SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Errors from response service operations.
#[derive(Debug)]
pub enum ResponseServiceError {
    SurveyNotFound(SurveyId),
    Forbidden {
        survey_id: SurveyId,
        user_id: UserId,
    },
    AuthorizationContext(String),
    /// Survey exists but does not accept responses.
    SurveyInactive(SurveyId),
    InvalidAnswer(AnswerValidationError),
    /// A survey or response lookup failed.
    Upstream {
        op: &'static str,
        source: RepoError,
    },
    /// CSV rendering failed.
    Export(csv::Error),
}

impl ResponseServiceError {
    /// HTTP-style status class for edge adapters.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::SurveyNotFound(_) => 404,
            Self::Forbidden { .. } => 403,
            Self::AuthorizationContext(_) => 401,
            Self::SurveyInactive(_) | Self::InvalidAnswer(_) => 400,
            Self::Upstream { .. } | Self::Export(_) => 500,
        }
    }
}

impl Display for ResponseServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SurveyNotFound(id) => write!(f, "survey not found: {id}"),
            Self::Forbidden { survey_id, user_id } => {
                write!(f, "user {user_id} may not view responses of survey {survey_id}")
            }
            Self::AuthorizationContext(message) => {
                write!(f, "invalid authorization context: {message}")
            }
            Self::SurveyInactive(id) => write!(f, "survey {id} is not accepting responses"),
            Self::InvalidAnswer(err) => write!(f, "{err}"),
            Self::Upstream { op, source } => write!(f, "{op} failed: {source}"),
            Self::Export(err) => write!(f, "csv export failed: {err}"),
        }
    }
}

impl Error for ResponseServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::InvalidAnswer(err) => Some(err),
            Self::Upstream { source, .. } => Some(source),
            Self::Export(err) => Some(err),
            _ => None,
        }
    }
}

impl From<AccessError> for ResponseServiceError {
    fn from(value: AccessError) -> Self {
        match value {
            AccessError::SurveyNotFound(id) => Self::SurveyNotFound(id),
            AccessError::Forbidden { survey_id, user_id } => Self::Forbidden { survey_id, user_id },
            AccessError::AuthorizationContext(message) => Self::AuthorizationContext(message),
            AccessError::Repo(source) => Self::Upstream {
                op: "survey lookup",
                source,
            },
        }
    }
}

impl From<AnswerValidationError> for ResponseServiceError {
    fn from(value: AnswerValidationError) -> Self {
        Self::InvalidAnswer(value)
    }
}

/// Response use-case facade over survey and response storage.
pub struct ResponseService<S: SurveyRepository, R: ResponseRepository> {
    surveys: S,
    responses: R,
}

impl<S: SurveyRepository, R: ResponseRepository> ResponseService<S, R> {
    pub fn new(surveys: S, responses: R) -> Self {
        Self { surveys, responses }
    }

    /// Validates and stores one response. `user_id = None` is anonymous.
    pub fn submit_response(
        &self,
        survey_id: SurveyId,
        user_id: Option<UserId>,
        answers: Vec<Answer>,
    ) -> Result<Response, ResponseServiceError> {
        let survey = self
            .surveys
            .get_survey(survey_id)
            .map_err(|source| ResponseServiceError::Upstream {
                op: "survey lookup",
                source,
            })?
            .ok_or(ResponseServiceError::SurveyNotFound(survey_id))?;
        if !survey.is_active {
            return Err(ResponseServiceError::SurveyInactive(survey_id));
        }
        validate_answers(&survey, &answers)?;

        let response = Response {
            id: Uuid::new_v4(),
            survey_id,
            user_id,
            submitted_at: now_epoch_ms(),
            answers,
        };
        self.responses
            .create_response(&response)
            .map_err(|source| {
                error!(
                    "event=response_submit module=service status=error survey_id={survey_id} error={source}"
                );
                ResponseServiceError::Upstream {
                    op: "response insert",
                    source,
                }
            })?;

        info!(
            "event=response_submit module=service status=ok survey_id={survey_id} response_id={} answer_count={}",
            response.id,
            response.answers.len()
        );
        Ok(response)
    }

    /// Lists raw responses. Owner or admin only.
    pub fn list_responses(
        &self,
        principal: &Principal,
        survey_id: SurveyId,
    ) -> Result<Vec<Response>, ResponseServiceError> {
        authorize(&self.surveys, principal, survey_id)?;
        self.load_responses(survey_id)
    }

    /// Renders raw responses as CSV. Owner or admin only.
    pub fn export_responses_csv(
        &self,
        principal: &Principal,
        survey_id: SurveyId,
    ) -> Result<String, ResponseServiceError> {
        let (survey, _) = authorize(&self.surveys, principal, survey_id)?;
        let responses = self.load_responses(survey_id)?;
        let csv = responses_to_csv(&survey, &responses).map_err(|err| {
            error!(
                "event=response_export module=service status=error survey_id={survey_id} error={err}"
            );
            ResponseServiceError::Export(err)
        })?;
        info!(
            "event=response_export module=service status=ok survey_id={survey_id} rows={}",
            responses.len()
        );
        Ok(csv)
    }

    /// Builds the analytics report. Readable by anyone for active surveys.
    pub fn survey_analytics(
        &self,
        principal: &Principal,
        survey_id: SurveyId,
    ) -> Result<SurveyAnalytics, ResponseServiceError> {
        let started_at = Instant::now();
        let (survey, _) = authorize_read(&self.surveys, principal, survey_id)?;
        let responses = self.load_responses(survey_id)?;
        let report = aggregate(&survey, &responses);
        info!(
            "event=survey_analytics module=service status=ok survey_id={survey_id} total_responses={} question_count={} duration_ms={}",
            report.total_responses,
            report.question_analytics.len(),
            started_at.elapsed().as_millis()
        );
        Ok(report)
    }

    fn load_responses(&self, survey_id: SurveyId) -> Result<Vec<Response>, ResponseServiceError> {
        self.responses
            .list_responses_by_survey(survey_id)
            .map_err(|source| {
                error!(
                    "event=response_list module=service status=error survey_id={survey_id} error={source}"
                );
                ResponseServiceError::Upstream {
                    op: "response lookup",
                    source,
                }
            })
    }
}

fn now_epoch_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as i64)
        .unwrap_or_default()
}
