//! Survey lifecycle and question-tree synchronization use-cases.
//!
//! # Responsibility
//! - Gate every survey read/write through the authorization checks.
//! - Reconcile a survey's persisted question/option tree with a desired
//!   question list inside one unit of work.
//!
//! # Invariants
//! - Synchronization is all-or-nothing: on any failure the unit of work is
//!   rolled back and the survey tree equals its pre-call state.
//! - A draft id that does not belong to the survey fails the whole call; no
//!   question is ever created with a caller-chosen id.
//! - Options are fully replaced on every sync; option ids are not stable.
//! - Question positions are rewritten as the 1-based list index.
//! - `creator_id` is taken from the principal on create and never changes.
//! - Single-question edits keep positions dense: adds append, deletes
//!   renumber the remaining questions.
//!
//! # Known races
//! - Authorization reads outside the unit of work. A concurrent ownership or
//!   delete change between the check and `BEGIN IMMEDIATE` is not detected.

use crate::model::survey::{
    validate_question_drafts, Question, QuestionDraft, QuestionId, Survey, SurveyDraft, SurveyId,
    SurveyValidationError, UserId,
};
use crate::repo::survey_repo::{RepoError, SurveyListQuery, SurveyRepository, SurveyUnitOfWork};
use crate::service::access::{authorize, authorize_read, AccessError, Principal};
use log::{error, info, warn};
use std::collections::HashSet;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Instant;

/// Named step of a survey write, attached to repository failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStep {
    CreateSurvey,
    UpdateSurvey,
    LoadQuestions,
    CreateQuestion,
    UpdateQuestion,
    ReplaceOptions,
    DeleteQuestion,
    DeleteStaleQuestions,
    RenumberQuestions,
    SetActive,
    DeleteSurvey,
}

impl SyncStep {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CreateSurvey => "create_survey",
            Self::UpdateSurvey => "update_survey",
            Self::LoadQuestions => "load_questions",
            Self::CreateQuestion => "create_question",
            Self::UpdateQuestion => "update_question",
            Self::ReplaceOptions => "replace_options",
            Self::DeleteQuestion => "delete_question",
            Self::DeleteStaleQuestions => "delete_stale_questions",
            Self::RenumberQuestions => "renumber_questions",
            Self::SetActive => "set_active",
            Self::DeleteSurvey => "delete_survey",
        }
    }
}

impl Display for SyncStep {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors from survey service operations.
#[derive(Debug)]
pub enum SurveyServiceError {
    SurveyNotFound(SurveyId),
    /// A draft targets a question id the survey does not own.
    QuestionNotInSurvey {
        survey_id: SurveyId,
        question_id: QuestionId,
    },
    Forbidden {
        survey_id: SurveyId,
        user_id: UserId,
    },
    AuthorizationContext(String),
    InvalidDraft(SurveyValidationError),
    /// Unit-of-work begin or commit failed.
    Transaction {
        op: &'static str,
        source: RepoError,
    },
    /// A write step failed; the unit of work was rolled back.
    Step { step: SyncStep, source: RepoError },
    /// Non-transactional repository failure.
    Repo(RepoError),
    /// Committed state could not be read back.
    InconsistentState(String),
}

impl SurveyServiceError {
    /// HTTP-style status class for edge adapters.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::SurveyNotFound(_) | Self::QuestionNotInSurvey { .. } => 404,
            Self::Forbidden { .. } => 403,
            Self::AuthorizationContext(_) => 401,
            Self::InvalidDraft(_) => 400,
            Self::Transaction { .. }
            | Self::Step { .. }
            | Self::Repo(_)
            | Self::InconsistentState(_) => 500,
        }
    }
}

impl Display for SurveyServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SurveyNotFound(id) => write!(f, "survey not found: {id}"),
            Self::QuestionNotInSurvey {
                survey_id,
                question_id,
            } => write!(
                f,
                "question {question_id} does not belong to survey {survey_id}"
            ),
            Self::Forbidden { survey_id, user_id } => {
                write!(f, "user {user_id} may not modify survey {survey_id}")
            }
            Self::AuthorizationContext(message) => {
                write!(f, "invalid authorization context: {message}")
            }
            Self::InvalidDraft(err) => write!(f, "{err}"),
            Self::Transaction { op, source } => write!(f, "transaction {op} failed: {source}"),
            Self::Step { step, source } => write!(f, "survey write step {step} failed: {source}"),
            Self::Repo(err) => write!(f, "{err}"),
            Self::InconsistentState(message) => write!(f, "inconsistent survey state: {message}"),
        }
    }
}

impl Error for SurveyServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::InvalidDraft(err) => Some(err),
            Self::Transaction { source, .. } | Self::Step { source, .. } => Some(source),
            Self::Repo(err) => Some(err),
            _ => None,
        }
    }
}

impl From<AccessError> for SurveyServiceError {
    fn from(value: AccessError) -> Self {
        match value {
            AccessError::SurveyNotFound(id) => Self::SurveyNotFound(id),
            AccessError::Forbidden { survey_id, user_id } => Self::Forbidden { survey_id, user_id },
            AccessError::AuthorizationContext(message) => Self::AuthorizationContext(message),
            AccessError::Repo(err) => Self::Repo(err),
        }
    }
}

impl From<RepoError> for SurveyServiceError {
    fn from(value: RepoError) -> Self {
        Self::Repo(value)
    }
}

impl From<SurveyValidationError> for SurveyServiceError {
    fn from(value: SurveyValidationError) -> Self {
        Self::InvalidDraft(value)
    }
}

/// Survey use-case facade.
pub struct SurveyService<R: SurveyRepository> {
    repo: R,
}

impl<R: SurveyRepository> SurveyService<R> {
    /// Creates service from repository implementation.
    pub fn new(repo: R) -> Self {
        Self { repo }
    }

    /// Creates a survey owned by `principal` together with its questions.
    ///
    /// Drafts must not carry ids; a new survey owns no questions yet.
    pub fn create_survey(
        &self,
        principal: &Principal,
        draft: &SurveyDraft,
        questions: &[QuestionDraft],
    ) -> Result<Survey, SurveyServiceError> {
        principal.validate()?;
        draft.validate()?;
        validate_question_drafts(questions)?;

        let started_at = Instant::now();
        info!(
            "event=survey_create module=service status=start user_id={} question_count={}",
            principal.user_id,
            questions.len()
        );

        let outcome = self.in_unit_of_work(|uow| {
            let survey_id = uow
                .create_survey(principal.user_id, draft)
                .map_err(step_error(SyncStep::CreateSurvey))?;
            reconcile_questions(uow, survey_id, questions)?;
            Ok(survey_id)
        });

        match outcome {
            Ok(survey_id) => {
                info!(
                    "event=survey_create module=service status=ok survey_id={survey_id} duration_ms={}",
                    started_at.elapsed().as_millis()
                );
                self.read_back(survey_id)
            }
            Err(err) => {
                error!(
                    "event=survey_create module=service status=error duration_ms={} error={err}",
                    started_at.elapsed().as_millis()
                );
                Err(err)
            }
        }
    }

    /// Loads one survey with its ordered question tree.
    ///
    /// Non-owners may read active surveys.
    pub fn get_survey(
        &self,
        principal: &Principal,
        survey_id: SurveyId,
    ) -> Result<Survey, SurveyServiceError> {
        let (survey, _) = authorize_read(&self.repo, principal, survey_id)?;
        Ok(survey)
    }

    /// Lists surveys visible to `principal`, ordered by id.
    ///
    /// Admins see all surveys; others see their own plus active ones.
    /// `limit: None` returns everything after `offset`.
    pub fn list_surveys(
        &self,
        principal: &Principal,
        limit: Option<u32>,
        offset: u32,
    ) -> Result<Vec<Survey>, SurveyServiceError> {
        principal.validate()?;
        let query = SurveyListQuery {
            visible_to: (!principal.is_admin()).then_some(principal.user_id),
            limit,
            offset,
        };
        self.repo.list_surveys(&query).map_err(Into::into)
    }

    /// Rewrites survey fields and reconciles its question tree with
    /// `questions` in one unit of work.
    ///
    /// # Errors
    /// - `InvalidDraft` before any write when a draft is malformed.
    /// - `SurveyNotFound` / `Forbidden` / `AuthorizationContext` from the gate.
    /// - `QuestionNotInSurvey` when a draft id is not owned by the survey.
    /// - `Step` / `Transaction` for storage failures.
    pub fn sync_survey(
        &self,
        principal: &Principal,
        survey_id: SurveyId,
        draft: &SurveyDraft,
        questions: &[QuestionDraft],
    ) -> Result<Survey, SurveyServiceError> {
        authorize(&self.repo, principal, survey_id)?;
        draft.validate()?;
        validate_question_drafts(questions)?;

        let started_at = Instant::now();
        info!(
            "event=survey_sync module=service status=start survey_id={survey_id} user_id={} question_count={}",
            principal.user_id,
            questions.len()
        );

        let outcome = self.in_unit_of_work(|uow| {
            uow.update_survey(survey_id, draft)
                .map_err(step_error(SyncStep::UpdateSurvey))?;
            reconcile_questions(uow, survey_id, questions)
        });

        match outcome {
            Ok(()) => {
                info!(
                    "event=survey_sync module=service status=ok survey_id={survey_id} duration_ms={}",
                    started_at.elapsed().as_millis()
                );
                self.read_back(survey_id)
            }
            Err(err) => {
                error!(
                    "event=survey_sync module=service status=error survey_id={survey_id} duration_ms={} error={err}",
                    started_at.elapsed().as_millis()
                );
                Err(err)
            }
        }
    }

    /// Opens or closes a survey for responses.
    pub fn set_survey_active(
        &self,
        principal: &Principal,
        survey_id: SurveyId,
        is_active: bool,
    ) -> Result<Survey, SurveyServiceError> {
        authorize(&self.repo, principal, survey_id)?;
        self.in_unit_of_work(|uow| {
            uow.set_survey_active(survey_id, is_active)
                .map_err(step_error(SyncStep::SetActive))
        })?;
        info!(
            "event=survey_set_active module=service status=ok survey_id={survey_id} is_active={is_active}"
        );
        self.read_back(survey_id)
    }

    /// Deletes a survey with its questions, options and responses.
    pub fn delete_survey(
        &self,
        principal: &Principal,
        survey_id: SurveyId,
    ) -> Result<(), SurveyServiceError> {
        authorize(&self.repo, principal, survey_id)?;
        self.in_unit_of_work(|uow| {
            uow.delete_survey(survey_id)
                .map_err(step_error(SyncStep::DeleteSurvey))
        })?;
        info!("event=survey_delete module=service status=ok survey_id={survey_id}");
        Ok(())
    }

    /// Appends one question to the end of a survey.
    ///
    /// The draft must not carry an id.
    pub fn add_question(
        &self,
        principal: &Principal,
        survey_id: SurveyId,
        draft: &QuestionDraft,
    ) -> Result<Question, SurveyServiceError> {
        authorize(&self.repo, principal, survey_id)?;
        validate_question_drafts(std::slice::from_ref(draft))?;
        if let Some(question_id) = draft.id {
            return Err(SurveyServiceError::QuestionNotInSurvey {
                survey_id,
                question_id,
            });
        }

        let question_id = self.in_unit_of_work(|uow| {
            let position = uow
                .list_questions(survey_id)
                .map_err(step_error(SyncStep::LoadQuestions))?
                .len() as i64
                + 1;
            let question_id = uow
                .create_question(survey_id, draft, position)
                .map_err(step_error(SyncStep::CreateQuestion))?;
            replace_options(uow, question_id, draft)?;
            Ok(question_id)
        })?;
        info!(
            "event=question_add module=service status=ok survey_id={survey_id} question_id={question_id}"
        );
        self.read_back_question(survey_id, question_id)
    }

    /// Rewrites one question in place and fully replaces its options.
    ///
    /// The question keeps its position; `draft.id` is ignored.
    pub fn update_question(
        &self,
        principal: &Principal,
        survey_id: SurveyId,
        question_id: QuestionId,
        draft: &QuestionDraft,
    ) -> Result<Question, SurveyServiceError> {
        authorize(&self.repo, principal, survey_id)?;
        validate_question_drafts(std::slice::from_ref(draft))?;

        self.in_unit_of_work(|uow| {
            let position = owned_question(uow, survey_id, question_id)?.position;
            uow.update_question(survey_id, question_id, draft, position)
                .map_err(step_error(SyncStep::UpdateQuestion))?;
            replace_options(uow, question_id, draft)
        })?;
        info!(
            "event=question_update module=service status=ok survey_id={survey_id} question_id={question_id}"
        );
        self.read_back_question(survey_id, question_id)
    }

    /// Deletes one question (options cascade) and closes the position gap.
    ///
    /// Returns the survey with its renumbered question tree.
    pub fn delete_question(
        &self,
        principal: &Principal,
        survey_id: SurveyId,
        question_id: QuestionId,
    ) -> Result<Survey, SurveyServiceError> {
        authorize(&self.repo, principal, survey_id)?;

        let moved = self.in_unit_of_work(|uow| {
            owned_question(uow, survey_id, question_id)?;
            uow.delete_question(survey_id, question_id)
                .map_err(step_error(SyncStep::DeleteQuestion))?;
            uow.renumber_questions(survey_id)
                .map_err(step_error(SyncStep::RenumberQuestions))
        })?;
        info!(
            "event=question_delete module=service status=ok survey_id={survey_id} question_id={question_id} moved={moved}"
        );
        self.read_back(survey_id)
    }

    /// Runs `work` in a fresh unit of work: commit on `Ok`, roll back on `Err`.
    fn in_unit_of_work<T>(
        &self,
        work: impl FnOnce(&dyn SurveyUnitOfWork) -> Result<T, SurveyServiceError>,
    ) -> Result<T, SurveyServiceError> {
        let uow = self
            .repo
            .begin_unit_of_work()
            .map_err(|source| SurveyServiceError::Transaction { op: "begin", source })?;

        let outcome = work(uow.as_ref());
        match outcome {
            Ok(value) => {
                uow.commit()
                    .map_err(|source| SurveyServiceError::Transaction { op: "commit", source })?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = uow.rollback() {
                    warn!(
                        "event=uow_rollback module=service status=error error={rollback_err}"
                    );
                }
                Err(err)
            }
        }
    }

    fn read_back(&self, survey_id: SurveyId) -> Result<Survey, SurveyServiceError> {
        self.repo.get_survey(survey_id)?.ok_or_else(|| {
            SurveyServiceError::InconsistentState(format!(
                "survey {survey_id} missing after commit"
            ))
        })
    }

    fn read_back_question(
        &self,
        survey_id: SurveyId,
        question_id: QuestionId,
    ) -> Result<Question, SurveyServiceError> {
        self.repo
            .list_questions(survey_id)?
            .into_iter()
            .find(|question| question.id == question_id)
            .ok_or_else(|| {
                SurveyServiceError::InconsistentState(format!(
                    "question {question_id} missing after commit"
                ))
            })
    }
}

fn owned_question(
    uow: &dyn SurveyUnitOfWork,
    survey_id: SurveyId,
    question_id: QuestionId,
) -> Result<Question, SurveyServiceError> {
    uow.list_questions(survey_id)
        .map_err(step_error(SyncStep::LoadQuestions))?
        .into_iter()
        .find(|question| question.id == question_id)
        .ok_or(SurveyServiceError::QuestionNotInSurvey {
            survey_id,
            question_id,
        })
}

/// Applies the desired question list to `survey_id` within `uow`.
fn reconcile_questions(
    uow: &dyn SurveyUnitOfWork,
    survey_id: SurveyId,
    drafts: &[QuestionDraft],
) -> Result<(), SurveyServiceError> {
    let before: HashSet<QuestionId> = uow
        .list_questions(survey_id)
        .map_err(step_error(SyncStep::LoadQuestions))?
        .into_iter()
        .map(|question| question.id)
        .collect();

    let mut retained = Vec::with_capacity(drafts.len());
    for (index, draft) in drafts.iter().enumerate() {
        let position = index as i64 + 1;
        let question_id = match draft.id {
            Some(id) if before.contains(&id) => {
                uow.update_question(survey_id, id, draft, position)
                    .map_err(step_error(SyncStep::UpdateQuestion))?;
                id
            }
            Some(id) => {
                return Err(SurveyServiceError::QuestionNotInSurvey {
                    survey_id,
                    question_id: id,
                });
            }
            None => uow
                .create_question(survey_id, draft, position)
                .map_err(step_error(SyncStep::CreateQuestion))?,
        };
        replace_options(uow, question_id, draft)?;
        retained.push(question_id);
    }

    let removed = uow
        .delete_questions_except(survey_id, &retained)
        .map_err(step_error(SyncStep::DeleteStaleQuestions))?;
    info!(
        "event=survey_reconcile module=service status=ok survey_id={survey_id} before={} after={} removed={removed}",
        before.len(),
        retained.len()
    );
    Ok(())
}

fn replace_options(
    uow: &dyn SurveyUnitOfWork,
    question_id: QuestionId,
    draft: &QuestionDraft,
) -> Result<(), SurveyServiceError> {
    uow.delete_options_for_question(question_id)
        .map_err(step_error(SyncStep::ReplaceOptions))?;
    if !draft.kind.has_options() {
        return Ok(());
    }
    for (index, text) in draft.options.iter().enumerate() {
        uow.create_option(question_id, text.trim(), index as i64 + 1)
            .map_err(step_error(SyncStep::ReplaceOptions))?;
    }
    Ok(())
}

fn step_error(step: SyncStep) -> impl FnOnce(RepoError) -> SurveyServiceError {
    move |source| SurveyServiceError::Step { step, source }
}
