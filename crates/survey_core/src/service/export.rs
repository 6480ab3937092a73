//! CSV export of raw survey responses.
//!
//! One row per response and one column per question, in survey order.
//! Quoting and escaping are left to the `csv` writer.

use crate::model::response::{AnswerValue, Response};
use crate::model::survey::{Question, QuestionType, Survey};

/// Columns written before the question columns.
pub const LEADING_COLUMNS: [&str; 3] = ["response_id", "submitted_at", "user_id"];

/// Joins checkbox selections inside one cell.
pub const CHOICE_SEPARATOR: &str = "; ";

/// `user_id` cell of responses submitted without an identity.
pub const ANONYMOUS_USER: &str = "anonymous";

/// Renders `responses` of `survey` as CSV text, header row first.
///
/// Only the first answer per question is written. Answers to questions the
/// survey no longer has are skipped, and unanswered questions stay empty.
pub fn responses_to_csv(survey: &Survey, responses: &[Response]) -> Result<String, csv::Error> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(
        LEADING_COLUMNS
            .iter()
            .copied()
            .chain(survey.questions.iter().map(|question| question.text.as_str())),
    )?;

    for response in responses
        .iter()
        .filter(|response| response.survey_id == survey.id)
    {
        let user = response
            .user_id
            .map(|id| id.to_string())
            .unwrap_or_else(|| ANONYMOUS_USER.to_string());
        let cells = survey.questions.iter().map(|question| {
            response
                .answer_for(question.id)
                .map(|answer| render_cell(question, &answer.value))
                .unwrap_or_default()
        });
        writer.write_record(
            [response.id.to_string(), response.submitted_at.to_string(), user]
                .into_iter()
                .chain(cells),
        )?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|err| csv::Error::from(err.into_error()))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

fn render_cell(question: &Question, value: &AnswerValue) -> String {
    if question.kind == QuestionType::LinearScale {
        if let Some(point) = value.as_scale_point() {
            return point.to_string();
        }
    }
    match value {
        AnswerValue::Number(number) => number.to_string(),
        AnswerValue::Text(text) => text.clone(),
        AnswerValue::Choices(choices) => choices.join(CHOICE_SEPARATOR),
    }
}
