//! Survey authoring model.
//!
//! # Responsibility
//! - Define the survey/question/option tree persisted by the repository.
//! - Define the draft shapes accepted by create and synchronize use-cases.
//!
//! # Invariants
//! - `Survey::id` is assigned by storage and never reused.
//! - `Survey::creator_id` never changes after creation.
//! - Question positions are 1-based and dense within one survey.
//! - Options exist only for choice-like question types.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type SurveyId = i64;
pub type QuestionId = i64;
pub type OptionId = i64;
/// Numeric principal id issued by the upstream auth layer.
pub type UserId = i64;

/// Lowest point of the fixed linear-scale domain.
pub const LINEAR_SCALE_MIN: i64 = 1;
/// Highest point of the fixed linear-scale domain.
pub const LINEAR_SCALE_MAX: i64 = 5;

/// Answer format of one question.
///
/// Serialized as the snake_case tag used on the wire and in storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionType {
    Text,
    Paragraph,
    ShortAnswer,
    Date,
    SingleChoice,
    MultipleChoice,
    Dropdown,
    Checkbox,
    LinearScale,
}

impl QuestionType {
    pub const ALL: [QuestionType; 9] = [
        Self::Text,
        Self::Paragraph,
        Self::ShortAnswer,
        Self::Date,
        Self::SingleChoice,
        Self::MultipleChoice,
        Self::Dropdown,
        Self::Checkbox,
        Self::LinearScale,
    ];

    /// Stable storage/wire tag.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Paragraph => "paragraph",
            Self::ShortAnswer => "short_answer",
            Self::Date => "date",
            Self::SingleChoice => "single_choice",
            Self::MultipleChoice => "multiple_choice",
            Self::Dropdown => "dropdown",
            Self::Checkbox => "checkbox",
            Self::LinearScale => "linear_scale",
        }
    }

    /// Parses a storage/wire tag. Tags are case-sensitive.
    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == value)
    }

    /// Whether this type carries an option list.
    pub fn has_options(self) -> bool {
        matches!(
            self,
            Self::SingleChoice | Self::MultipleChoice | Self::Dropdown | Self::Checkbox
        )
    }
}

impl Display for QuestionType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Persisted survey with its ordered question tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Survey {
    pub id: SurveyId,
    pub creator_id: UserId,
    pub title: String,
    pub description: String,
    pub is_active: bool,
    /// Epoch milliseconds.
    pub starts_at: Option<i64>,
    /// Epoch milliseconds. Never earlier than `starts_at` when both are set.
    pub ends_at: Option<i64>,
    /// Ordered by `position`. Empty for list projections.
    #[serde(default)]
    pub questions: Vec<Question>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Survey {
    /// Finds one question of this survey by id.
    pub fn question(&self, id: QuestionId) -> Option<&Question> {
        self.questions.iter().find(|question| question.id == id)
    }
}

/// Persisted question with its ordered options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    pub id: QuestionId,
    pub survey_id: SurveyId,
    pub text: String,
    #[serde(rename = "type")]
    pub kind: QuestionType,
    pub required: bool,
    /// 1-based and dense within the survey.
    pub position: i64,
    #[serde(default)]
    pub options: Vec<QuestionOption>,
}

/// Persisted option of a choice-like question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionOption {
    pub id: OptionId,
    pub question_id: QuestionId,
    pub text: String,
    pub position: i64,
}

/// Scalar survey fields accepted on create and update.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SurveyDraft {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub is_active: bool,
    #[serde(default)]
    pub starts_at: Option<i64>,
    #[serde(default)]
    pub ends_at: Option<i64>,
}

impl SurveyDraft {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    /// Checks scalar field invariants.
    pub fn validate(&self) -> Result<(), SurveyValidationError> {
        if self.title.trim().is_empty() {
            return Err(SurveyValidationError::BlankTitle);
        }
        if let (Some(starts_at), Some(ends_at)) = (self.starts_at, self.ends_at) {
            if ends_at < starts_at {
                return Err(SurveyValidationError::InvalidWindow { starts_at, ends_at });
            }
        }
        Ok(())
    }
}

/// Desired state of one question in a create or synchronize request.
///
/// `id = None` creates a question; `id = Some(..)` updates an existing one.
/// Options are plain texts: they carry no ids and are always fully replaced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionDraft {
    #[serde(default)]
    pub id: Option<QuestionId>,
    pub text: String,
    #[serde(rename = "type")]
    pub kind: QuestionType,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub options: Vec<String>,
}

impl QuestionDraft {
    pub fn new(text: impl Into<String>, kind: QuestionType) -> Self {
        Self {
            id: None,
            text: text.into(),
            kind,
            required: false,
            options: Vec::new(),
        }
    }

    /// Targets an existing question for in-place update.
    pub fn with_id(mut self, id: QuestionId) -> Self {
        self.id = Some(id);
        self
    }

    pub fn with_options<I, S>(mut self, options: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.options = options.into_iter().map(Into::into).collect();
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }
}

/// Validates a full question list before it reaches storage.
///
/// # Errors
/// - Blank question text.
/// - Blank option text on a choice-like question.
/// - The same existing question id listed twice.
pub fn validate_question_drafts(drafts: &[QuestionDraft]) -> Result<(), SurveyValidationError> {
    let mut seen_ids = HashSet::new();
    for (index, draft) in drafts.iter().enumerate() {
        if draft.text.trim().is_empty() {
            return Err(SurveyValidationError::BlankQuestionText { index });
        }
        if let Some(id) = draft.id {
            if !seen_ids.insert(id) {
                return Err(SurveyValidationError::DuplicateQuestionId(id));
            }
        }
        if draft.kind.has_options() {
            if let Some(option_index) = draft
                .options
                .iter()
                .position(|option| option.trim().is_empty())
            {
                return Err(SurveyValidationError::BlankOptionText {
                    index,
                    option_index,
                });
            }
        }
    }
    Ok(())
}

/// Draft validation failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SurveyValidationError {
    BlankTitle,
    InvalidWindow { starts_at: i64, ends_at: i64 },
    BlankQuestionText { index: usize },
    BlankOptionText { index: usize, option_index: usize },
    DuplicateQuestionId(QuestionId),
}

impl Display for SurveyValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BlankTitle => write!(f, "survey title must not be blank"),
            Self::InvalidWindow { starts_at, ends_at } => write!(
                f,
                "survey window ends before it starts: starts_at={starts_at} ends_at={ends_at}"
            ),
            Self::BlankQuestionText { index } => {
                write!(f, "question #{} has blank text", index + 1)
            }
            Self::BlankOptionText {
                index,
                option_index,
            } => write!(
                f,
                "question #{} option #{} has blank text",
                index + 1,
                option_index + 1
            ),
            Self::DuplicateQuestionId(id) => {
                write!(f, "question id {id} is listed more than once")
            }
        }
    }
}

impl Error for SurveyValidationError {}
