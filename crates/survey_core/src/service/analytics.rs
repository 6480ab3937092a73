//! Response analytics aggregation.
//!
//! # Responsibility
//! - Turn a survey definition plus its stored responses into per-question
//!   distribution summaries.
//!
//! # Invariants
//! - Pure: no I/O, no clock, no logging.
//! - Only the first answer per question in a response is considered.
//! - Percentage base is the number of respondents with a counted answer to
//!   that question, never the survey-wide response total.
//! - Linear scales always report the fixed `1..=5` domain.
//! - Zero responses yield zero-filled option/scale rows and empty text lists.

use crate::model::response::{AnswerValue, Response};
use crate::model::survey::{
    Question, QuestionId, QuestionType, Survey, SurveyId, LINEAR_SCALE_MAX, LINEAR_SCALE_MIN,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Aggregated report for one survey.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SurveyAnalytics {
    pub survey_id: SurveyId,
    pub survey_title: String,
    pub total_responses: usize,
    pub question_analytics: Vec<QuestionAnalytics>,
}

impl SurveyAnalytics {
    pub fn question(&self, question_id: QuestionId) -> Option<&QuestionAnalytics> {
        self.question_analytics
            .iter()
            .find(|entry| entry.question_id == question_id)
    }
}

/// Summary of one question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionAnalytics {
    pub question_id: QuestionId,
    pub question_text: String,
    pub question_type: QuestionType,
    /// Responses whose answer counted toward this summary.
    pub respondents: usize,
    #[serde(flatten)]
    pub summary: QuestionSummary,
}

/// Per-type summary body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "summary_kind", rename_all = "snake_case")]
pub enum QuestionSummary {
    Options {
        options: Vec<OptionSummary>,
    },
    Scale {
        options: Vec<OptionSummary>,
        /// Mean of counted scale points; `None` without respondents.
        average: Option<f64>,
    },
    TextAnswers {
        answers: Vec<String>,
    },
}

impl QuestionSummary {
    /// Option or scale rows; empty for text summaries.
    pub fn options(&self) -> &[OptionSummary] {
        match self {
            Self::Options { options } | Self::Scale { options, .. } => options,
            Self::TextAnswers { .. } => &[],
        }
    }

    /// Collected answers; empty for option and scale summaries.
    pub fn text_answers(&self) -> &[String] {
        match self {
            Self::TextAnswers { answers } => answers,
            _ => &[],
        }
    }
}

/// Count row for one option or scale point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionSummary {
    /// Option id, or the scale point itself for linear scales.
    pub option_id: i64,
    pub option_text: String,
    pub count: usize,
    pub percentage: f64,
}

/// Builds the analytics report for `survey` from `responses`.
///
/// Responses belonging to other surveys and answers referencing unknown
/// questions are ignored.
pub fn aggregate(survey: &Survey, responses: &[Response]) -> SurveyAnalytics {
    let responses: Vec<&Response> = responses
        .iter()
        .filter(|response| response.survey_id == survey.id)
        .collect();

    let question_analytics = survey
        .questions
        .iter()
        .map(|question| summarize_question(question, &responses))
        .collect();

    SurveyAnalytics {
        survey_id: survey.id,
        survey_title: survey.title.clone(),
        total_responses: responses.len(),
        question_analytics,
    }
}

fn summarize_question(question: &Question, responses: &[&Response]) -> QuestionAnalytics {
    let values = responses
        .iter()
        .filter_map(|response| response.answer_for(question.id))
        .map(|answer| &answer.value);

    let (respondents, summary) = match question.kind {
        QuestionType::SingleChoice | QuestionType::MultipleChoice | QuestionType::Dropdown => {
            summarize_single_choice(question, values)
        }
        QuestionType::Checkbox => summarize_checkbox(question, values),
        QuestionType::LinearScale => summarize_scale(values),
        QuestionType::Text
        | QuestionType::Paragraph
        | QuestionType::ShortAnswer
        | QuestionType::Date => summarize_text(values),
    };

    QuestionAnalytics {
        question_id: question.id,
        question_text: question.text.clone(),
        question_type: question.kind,
        respondents,
        summary,
    }
}

fn summarize_single_choice<'a>(
    question: &Question,
    values: impl Iterator<Item = &'a AnswerValue>,
) -> (usize, QuestionSummary) {
    let index = option_index(question);
    let mut counts = vec![0usize; question.options.len()];
    let mut respondents = 0;

    for value in values {
        if let Some(slot) = value.as_text().and_then(|text| index.get(text)) {
            counts[*slot] += 1;
            respondents += 1;
        }
    }

    let options = option_rows(question, &counts, respondents);
    (respondents, QuestionSummary::Options { options })
}

fn summarize_checkbox<'a>(
    question: &Question,
    values: impl Iterator<Item = &'a AnswerValue>,
) -> (usize, QuestionSummary) {
    let index = option_index(question);
    let mut counts = vec![0usize; question.options.len()];
    let mut respondents = 0;

    for selected in values.filter_map(AnswerValue::as_choices) {
        if selected.is_empty() {
            continue;
        }
        respondents += 1;
        for slot in selected.iter().filter_map(|text| index.get(text.as_str())) {
            counts[*slot] += 1;
        }
    }

    let options = option_rows(question, &counts, respondents);
    (respondents, QuestionSummary::Options { options })
}

fn summarize_scale<'a>(values: impl Iterator<Item = &'a AnswerValue>) -> (usize, QuestionSummary) {
    let mut counts = [0usize; (LINEAR_SCALE_MAX - LINEAR_SCALE_MIN + 1) as usize];
    let mut respondents = 0;
    let mut total: i64 = 0;

    for point in values.filter_map(AnswerValue::as_scale_point) {
        if !(LINEAR_SCALE_MIN..=LINEAR_SCALE_MAX).contains(&point) {
            continue;
        }
        counts[(point - LINEAR_SCALE_MIN) as usize] += 1;
        respondents += 1;
        total += point;
    }

    let options = (LINEAR_SCALE_MIN..=LINEAR_SCALE_MAX)
        .zip(counts)
        .map(|(point, count)| OptionSummary {
            option_id: point,
            option_text: point.to_string(),
            count,
            percentage: percentage(count, respondents),
        })
        .collect();
    let average = (respondents > 0).then(|| total as f64 / respondents as f64);

    (respondents, QuestionSummary::Scale { options, average })
}

fn summarize_text<'a>(values: impl Iterator<Item = &'a AnswerValue>) -> (usize, QuestionSummary) {
    let answers: Vec<String> = values
        .filter_map(AnswerValue::as_text)
        .filter(|text| !text.is_empty())
        .map(str::to_string)
        .collect();
    (answers.len(), QuestionSummary::TextAnswers { answers })
}

/// Maps option text to its slot in `question.options`. First wins on
/// duplicate texts.
fn option_index(question: &Question) -> HashMap<&str, usize> {
    let mut index = HashMap::with_capacity(question.options.len());
    for (slot, option) in question.options.iter().enumerate() {
        index.entry(option.text.as_str()).or_insert(slot);
    }
    index
}

fn option_rows(question: &Question, counts: &[usize], respondents: usize) -> Vec<OptionSummary> {
    question
        .options
        .iter()
        .zip(counts)
        .map(|(option, count)| OptionSummary {
            option_id: option.id,
            option_text: option.text.clone(),
            count: *count,
            percentage: percentage(*count, respondents),
        })
        .collect()
}

fn percentage(count: usize, base: usize) -> f64 {
    if base == 0 {
        0.0
    } else {
        count as f64 * 100.0 / base as f64
    }
}
