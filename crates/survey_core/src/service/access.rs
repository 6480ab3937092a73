//! Survey authorization gate.
//!
//! # Responsibility
//! - Decide whether a principal may read or mutate one survey.
//! - Keep identity-context failures distinct from access denial.
//!
//! # Invariants
//! - Principals carry a positive user id; blank roles are dropped.
//! - Role `admin` bypasses ownership for reads and writes.
//! - Public read applies to active surveys and never to writes.

use crate::model::survey::{Survey, SurveyId, UserId};
use crate::repo::survey_repo::{RepoError, SurveyRepository};
use log::{info, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Role name that grants unconditional survey access.
pub const ADMIN_ROLE: &str = "admin";

/// Acting identity, supplied by the caller on every gated operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub user_id: UserId,
    pub roles: Vec<String>,
}

impl Principal {
    /// Builds a principal, normalizing roles to trimmed non-empty entries.
    ///
    /// # Errors
    /// - `AuthorizationContext` when `user_id` is not positive.
    pub fn new<I, S>(user_id: UserId, roles: I) -> Result<Self, AccessError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        ensure_user_id(user_id)?;
        let roles = roles
            .into_iter()
            .map(|role| role.as_ref().trim().to_string())
            .filter(|role| !role.is_empty())
            .collect();
        Ok(Self { user_id, roles })
    }

    /// Parses identity values forwarded by the upstream auth layer.
    ///
    /// `roles` accepts `"admin,user"`, `"admin user"` and the bracketed
    /// `"[admin user]"` form. Missing roles mean no roles.
    ///
    /// # Errors
    /// - `AuthorizationContext` when `user_id` is missing or not a positive
    ///   integer.
    pub fn from_forwarded(user_id: Option<&str>, roles: Option<&str>) -> Result<Self, AccessError> {
        let raw_user_id = user_id
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .ok_or_else(|| AccessError::AuthorizationContext("user id is missing".to_string()))?;
        let parsed_user_id: UserId = raw_user_id.parse().map_err(|_| {
            AccessError::AuthorizationContext(format!("user id `{raw_user_id}` is not an integer"))
        })?;

        let raw_roles = roles.map(str::trim).unwrap_or_default();
        let unbracketed = raw_roles
            .strip_prefix('[')
            .and_then(|value| value.strip_suffix(']'))
            .unwrap_or(raw_roles);
        let split_roles = unbracketed
            .split(|ch: char| ch == ',' || ch.is_whitespace())
            .collect::<Vec<_>>();

        Self::new(parsed_user_id, split_roles)
    }

    /// Rejects principals whose fields were filled in without [`Principal::new`].
    pub fn validate(&self) -> Result<(), AccessError> {
        ensure_user_id(self.user_id)
    }

    pub fn is_admin(&self) -> bool {
        self.roles.iter().any(|role| role == ADMIN_ROLE)
    }
}

/// Path through which access was granted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessGrant {
    Owner,
    Admin,
    /// Read-only access to an active survey.
    PublicRead,
}

impl AccessGrant {
    pub fn can_write(self) -> bool {
        matches!(self, Self::Owner | Self::Admin)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Owner => "owner",
            Self::Admin => "admin",
            Self::PublicRead => "public_read",
        }
    }
}

/// Authorization gate failures.
#[derive(Debug)]
pub enum AccessError {
    SurveyNotFound(SurveyId),
    Forbidden {
        survey_id: SurveyId,
        user_id: UserId,
    },
    /// Identity context is missing or malformed.
    AuthorizationContext(String),
    Repo(RepoError),
}

impl Display for AccessError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SurveyNotFound(id) => write!(f, "survey not found: {id}"),
            Self::Forbidden { survey_id, user_id } => {
                write!(f, "user {user_id} may not access survey {survey_id}")
            }
            Self::AuthorizationContext(message) => {
                write!(f, "invalid authorization context: {message}")
            }
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for AccessError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Repo(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RepoError> for AccessError {
    fn from(value: RepoError) -> Self {
        Self::Repo(value)
    }
}

/// Loads `survey_id` and checks owner/admin access.
///
/// Returns the loaded survey so callers do not fetch it twice.
pub fn authorize<R: SurveyRepository + ?Sized>(
    repo: &R,
    principal: &Principal,
    survey_id: SurveyId,
) -> Result<(Survey, AccessGrant), AccessError> {
    let outcome = check_access(repo, principal, survey_id, false);
    log_decision("write", principal, survey_id, &outcome);
    outcome
}

/// Like [`authorize`], but grants `PublicRead` for active surveys.
pub fn authorize_read<R: SurveyRepository + ?Sized>(
    repo: &R,
    principal: &Principal,
    survey_id: SurveyId,
) -> Result<(Survey, AccessGrant), AccessError> {
    let outcome = check_access(repo, principal, survey_id, true);
    log_decision("read", principal, survey_id, &outcome);
    outcome
}

fn check_access<R: SurveyRepository + ?Sized>(
    repo: &R,
    principal: &Principal,
    survey_id: SurveyId,
    allow_public_read: bool,
) -> Result<(Survey, AccessGrant), AccessError> {
    principal.validate()?;

    let survey = repo
        .get_survey(survey_id)?
        .ok_or(AccessError::SurveyNotFound(survey_id))?;

    if principal.is_admin() {
        return Ok((survey, AccessGrant::Admin));
    }
    if survey.creator_id == principal.user_id {
        return Ok((survey, AccessGrant::Owner));
    }
    if allow_public_read && survey.is_active {
        return Ok((survey, AccessGrant::PublicRead));
    }

    Err(AccessError::Forbidden {
        survey_id,
        user_id: principal.user_id,
    })
}

fn ensure_user_id(user_id: UserId) -> Result<(), AccessError> {
    if user_id <= 0 {
        return Err(AccessError::AuthorizationContext(format!(
            "user id must be positive, got {user_id}"
        )));
    }
    Ok(())
}

fn log_decision(
    mode: &'static str,
    principal: &Principal,
    survey_id: SurveyId,
    outcome: &Result<(Survey, AccessGrant), AccessError>,
) {
    match outcome {
        Ok((_, grant)) => info!(
            "event=survey_authorize module=access status=ok mode={mode} survey_id={survey_id} user_id={} grant={}",
            principal.user_id,
            grant.as_str()
        ),
        Err(AccessError::Repo(err)) => warn!(
            "event=survey_authorize module=access status=error mode={mode} survey_id={survey_id} user_id={} error={err}",
            principal.user_id
        ),
        Err(err) => info!(
            "event=survey_authorize module=access status=denied mode={mode} survey_id={survey_id} user_id={} reason={}",
            principal.user_id,
            denial_reason(err)
        ),
    }
}

fn denial_reason(err: &AccessError) -> &'static str {
    match err {
        AccessError::SurveyNotFound(_) => "not_found",
        AccessError::Forbidden { .. } => "forbidden",
        AccessError::AuthorizationContext(_) => "context",
        AccessError::Repo(_) => "repo",
    }
}
