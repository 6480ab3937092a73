//! Submitted response model and answer validation.
//!
//! # Invariants
//! - Responses are immutable once stored.
//! - An answer's value shape depends on the referenced question type:
//!   scalar text for choice/text questions, a text list for checkboxes,
//!   a number (or numeric text) for linear scales.

use crate::model::survey::{
    Question, QuestionId, QuestionType, Survey, SurveyId, UserId, LINEAR_SCALE_MAX,
    LINEAR_SCALE_MIN,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

pub type ResponseId = Uuid;

/// Raw answer value as submitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AnswerValue {
    Number(f64),
    Text(String),
    Choices(Vec<String>),
}

impl AnswerValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(value) => Some(value.as_str()),
            _ => None,
        }
    }

    pub fn as_choices(&self) -> Option<&[String]> {
        match self {
            Self::Choices(values) => Some(values.as_slice()),
            _ => None,
        }
    }

    /// Coerces the value to an integer scale point.
    ///
    /// Accepts integral numbers and integer text (`"4"`, `" 4 "`). Range is
    /// not checked here.
    pub fn as_scale_point(&self) -> Option<i64> {
        match self {
            Self::Number(value) if value.is_finite() && value.fract() == 0.0 => {
                Some(*value as i64)
            }
            Self::Text(value) => value.trim().parse().ok(),
            _ => None,
        }
    }

    /// Whether the value carries no content (empty text or empty selection).
    pub fn is_blank(&self) -> bool {
        match self {
            Self::Number(_) => false,
            Self::Text(value) => value.trim().is_empty(),
            Self::Choices(values) => values.is_empty(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    pub question_id: QuestionId,
    pub value: AnswerValue,
}

impl Answer {
    pub fn new(question_id: QuestionId, value: AnswerValue) -> Self {
        Self { question_id, value }
    }

    pub fn text(question_id: QuestionId, value: impl Into<String>) -> Self {
        Self::new(question_id, AnswerValue::Text(value.into()))
    }

    pub fn number(question_id: QuestionId, value: f64) -> Self {
        Self::new(question_id, AnswerValue::Number(value))
    }

    pub fn choices<I, S>(question_id: QuestionId, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(
            question_id,
            AnswerValue::Choices(values.into_iter().map(Into::into).collect()),
        )
    }
}

/// One stored submission for a survey.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub id: ResponseId,
    pub survey_id: SurveyId,
    /// `None` for anonymous submissions.
    pub user_id: Option<UserId>,
    /// Epoch milliseconds.
    pub submitted_at: i64,
    pub answers: Vec<Answer>,
}

impl Response {
    /// First answer referencing `question_id`, if any.
    pub fn answer_for(&self, question_id: QuestionId) -> Option<&Answer> {
        self.answers
            .iter()
            .find(|answer| answer.question_id == question_id)
    }
}

/// Reasons a submitted answer set is rejected.
#[derive(Debug, Clone, PartialEq)]
pub enum AnswerValidationError {
    /// Answer references a question outside the survey.
    UnknownQuestion(QuestionId),
    DuplicateAnswer(QuestionId),
    ShapeMismatch {
        question_id: QuestionId,
        expected: QuestionType,
    },
    UnknownOption {
        question_id: QuestionId,
        value: String,
    },
    /// Checkbox answer selects the same option more than once.
    DuplicateSelection {
        question_id: QuestionId,
        value: String,
    },
    OutOfScale {
        question_id: QuestionId,
    },
    MissingRequired(QuestionId),
}

impl Display for AnswerValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownQuestion(id) => write!(f, "question {id} does not belong to survey"),
            Self::DuplicateAnswer(id) => write!(f, "question {id} answered more than once"),
            Self::ShapeMismatch {
                question_id,
                expected,
            } => write!(
                f,
                "answer for question {question_id} does not match type `{expected}`"
            ),
            Self::UnknownOption { question_id, value } => write!(
                f,
                "answer for question {question_id} selects unknown option `{value}`"
            ),
            Self::DuplicateSelection { question_id, value } => write!(
                f,
                "answer for question {question_id} selects `{value}` more than once"
            ),
            Self::OutOfScale { question_id } => write!(
                f,
                "answer for question {question_id} is outside {LINEAR_SCALE_MIN}..={LINEAR_SCALE_MAX}"
            ),
            Self::MissingRequired(id) => write!(f, "required question {id} is unanswered"),
        }
    }
}

impl Error for AnswerValidationError {}

/// Checks a submitted answer set against the survey definition.
///
/// Blank answers to optional questions are accepted and stored verbatim.
pub fn validate_answers(survey: &Survey, answers: &[Answer]) -> Result<(), AnswerValidationError> {
    let mut answered = HashSet::new();
    for answer in answers {
        let question = survey
            .question(answer.question_id)
            .ok_or(AnswerValidationError::UnknownQuestion(answer.question_id))?;
        if !answered.insert(answer.question_id) {
            return Err(AnswerValidationError::DuplicateAnswer(answer.question_id));
        }
        if !answer.value.is_blank() {
            validate_value_shape(question, &answer.value)?;
        }
    }

    for question in survey.questions.iter().filter(|question| question.required) {
        let has_content = answers
            .iter()
            .any(|answer| answer.question_id == question.id && !answer.value.is_blank());
        if !has_content {
            return Err(AnswerValidationError::MissingRequired(question.id));
        }
    }

    Ok(())
}

fn validate_value_shape(question: &Question, value: &AnswerValue) -> Result<(), AnswerValidationError> {
    let mismatch = || AnswerValidationError::ShapeMismatch {
        question_id: question.id,
        expected: question.kind,
    };
    let ensure_option = |text: &str| {
        if question.options.iter().any(|option| option.text == text) {
            Ok(())
        } else {
            Err(AnswerValidationError::UnknownOption {
                question_id: question.id,
                value: text.to_string(),
            })
        }
    };

    match question.kind {
        QuestionType::SingleChoice | QuestionType::MultipleChoice | QuestionType::Dropdown => {
            ensure_option(value.as_text().ok_or_else(mismatch)?)
        }
        QuestionType::Checkbox => {
            let mut selected = HashSet::new();
            value
                .as_choices()
                .ok_or_else(mismatch)?
                .iter()
                .try_for_each(|choice| {
                    ensure_option(choice.as_str())?;
                    if selected.insert(choice.as_str()) {
                        Ok(())
                    } else {
                        Err(AnswerValidationError::DuplicateSelection {
                            question_id: question.id,
                            value: choice.clone(),
                        })
                    }
                })
        }
        QuestionType::LinearScale => {
            let point = value.as_scale_point().ok_or_else(mismatch)?;
            if (LINEAR_SCALE_MIN..=LINEAR_SCALE_MAX).contains(&point) {
                Ok(())
            } else {
                Err(AnswerValidationError::OutOfScale {
                    question_id: question.id,
                })
            }
        }
        QuestionType::Text
        | QuestionType::Paragraph
        | QuestionType::ShortAnswer
        | QuestionType::Date => value.as_text().map(|_| ()).ok_or_else(mismatch),
    }
}
