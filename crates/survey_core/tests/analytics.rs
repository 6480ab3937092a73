use serde_json::json;
use survey_core::{
    aggregate, Answer, Question, QuestionOption, QuestionSummary, QuestionType, Response, Survey,
};
use uuid::Uuid;

const SURVEY_ID: i64 = 7;

fn question(id: i64, kind: QuestionType, options: &[&str]) -> Question {
    Question {
        id,
        survey_id: SURVEY_ID,
        text: format!("Question {id}"),
        kind,
        required: false,
        position: id,
        options: options
            .iter()
            .enumerate()
            .map(|(index, text)| QuestionOption {
                id: id * 100 + index as i64,
                question_id: id,
                text: text.to_string(),
                position: index as i64 + 1,
            })
            .collect(),
    }
}

fn survey(questions: Vec<Question>) -> Survey {
    Survey {
        id: SURVEY_ID,
        creator_id: 1,
        title: "Quarterly pulse".to_string(),
        description: String::new(),
        is_active: true,
        starts_at: None,
        ends_at: None,
        questions,
        created_at: 0,
        updated_at: 0,
    }
}

fn response(answers: Vec<Answer>) -> Response {
    Response {
        id: Uuid::new_v4(),
        survey_id: SURVEY_ID,
        user_id: None,
        submitted_at: 0,
        answers,
    }
}

fn counts(summary: &QuestionSummary) -> Vec<usize> {
    summary.options().iter().map(|row| row.count).collect()
}

fn percentages(summary: &QuestionSummary) -> Vec<f64> {
    summary.options().iter().map(|row| row.percentage).collect()
}

#[test]
fn single_choice_counts_and_percentages() {
    let survey = survey(vec![question(
        1,
        QuestionType::SingleChoice,
        &["Option A", "Option B", "Option C"],
    )]);
    let responses: Vec<Response> = ["Option A", "Option B", "Option A", "Option C", "Option B"]
        .into_iter()
        .map(|choice| response(vec![Answer::text(1, choice)]))
        .collect();

    let report = aggregate(&survey, &responses);

    assert_eq!(report.survey_id, SURVEY_ID);
    assert_eq!(report.survey_title, "Quarterly pulse");
    assert_eq!(report.total_responses, 5);
    let entry = report.question(1).unwrap();
    assert_eq!(entry.respondents, 5);
    assert_eq!(counts(&entry.summary), vec![2, 2, 1]);
    assert_eq!(percentages(&entry.summary), vec![40.0, 40.0, 20.0]);
    let ids: Vec<i64> = entry.summary.options().iter().map(|row| row.option_id).collect();
    assert_eq!(ids, vec![100, 101, 102]);
}

#[test]
fn linear_scale_average_and_fixed_domain() {
    let survey = survey(vec![question(2, QuestionType::LinearScale, &[])]);
    let responses: Vec<Response> = [5.0, 3.0, 4.0, 2.0, 1.0]
        .into_iter()
        .map(|value| response(vec![Answer::number(2, value)]))
        .collect();

    let report = aggregate(&survey, &responses);
    let entry = report.question(2).unwrap();

    match &entry.summary {
        QuestionSummary::Scale { options, average } => {
            assert_eq!(*average, Some(3.0));
            let points: Vec<i64> = options.iter().map(|row| row.option_id).collect();
            assert_eq!(points, vec![1, 2, 3, 4, 5]);
            let labels: Vec<&str> = options.iter().map(|row| row.option_text.as_str()).collect();
            assert_eq!(labels, vec!["1", "2", "3", "4", "5"]);
        }
        other => panic!("unexpected summary: {other:?}"),
    }
    assert_eq!(counts(&entry.summary), vec![1, 1, 1, 1, 1]);
    assert_eq!(percentages(&entry.summary), vec![20.0; 5]);
}

#[test]
fn zero_responses_yield_zero_filled_skeleton() {
    let survey = survey(vec![
        question(1, QuestionType::SingleChoice, &["Yes", "No"]),
        question(2, QuestionType::LinearScale, &[]),
        question(3, QuestionType::Paragraph, &[]),
    ]);

    let report = aggregate(&survey, &[]);

    assert_eq!(report.total_responses, 0);
    assert_eq!(report.question_analytics.len(), 3);

    let choice = report.question(1).unwrap();
    assert_eq!(choice.respondents, 0);
    assert_eq!(counts(&choice.summary), vec![0, 0]);
    assert_eq!(percentages(&choice.summary), vec![0.0, 0.0]);

    let scale = report.question(2).unwrap();
    assert_eq!(counts(&scale.summary), vec![0; 5]);
    assert!(matches!(
        scale.summary,
        QuestionSummary::Scale { average: None, .. }
    ));

    let text = report.question(3).unwrap();
    assert!(text.summary.text_answers().is_empty());
}

#[test]
fn percentage_base_is_respondents_to_that_question() {
    let survey = survey(vec![
        question(1, QuestionType::Dropdown, &["Red", "Blue"]),
        question(2, QuestionType::ShortAnswer, &[]),
    ]);
    let responses = vec![
        response(vec![Answer::text(1, "Red"), Answer::text(2, "hi")]),
        response(vec![Answer::text(2, "only text")]),
        response(vec![Answer::text(1, "Purple")]),
        response(vec![Answer::text(1, "Blue")]),
    ];

    let report = aggregate(&survey, &responses);
    let entry = report.question(1).unwrap();

    assert_eq!(report.total_responses, 4);
    assert_eq!(entry.respondents, 2, "unmatched and missing answers are excluded");
    assert_eq!(percentages(&entry.summary), vec![50.0, 50.0]);
}

#[test]
fn percentages_sum_to_hundred_for_single_select_questions() {
    let survey = survey(vec![question(
        1,
        QuestionType::MultipleChoice,
        &["a", "b", "c"],
    )]);
    let responses: Vec<Response> = ["a", "b", "b", "c", "c", "c", "a"]
        .into_iter()
        .map(|choice| response(vec![Answer::text(1, choice)]))
        .collect();

    let report = aggregate(&survey, &responses);
    let total: f64 = percentages(&report.question(1).unwrap().summary).iter().sum();
    assert!((total - 100.0).abs() < 1e-9);
}

#[test]
fn checkbox_counts_each_selection_and_each_respondent_once() {
    let survey = survey(vec![question(
        4,
        QuestionType::Checkbox,
        &["Cheese", "Ham", "Olives"],
    )]);
    let responses = vec![
        response(vec![Answer::choices(4, ["Cheese", "Ham"])]),
        response(vec![Answer::choices(4, ["Cheese", "Pineapple"])]),
        response(vec![Answer::choices(4, Vec::<String>::new())]),
        response(vec![Answer::text(4, "Cheese")]),
    ];

    let report = aggregate(&survey, &responses);
    let entry = report.question(4).unwrap();

    assert_eq!(entry.respondents, 2);
    assert_eq!(counts(&entry.summary), vec![2, 1, 0]);
    assert_eq!(percentages(&entry.summary), vec![100.0, 50.0, 0.0]);
}

#[test]
fn scale_drops_out_of_range_and_non_integral_values() {
    let survey = survey(vec![question(2, QuestionType::LinearScale, &[])]);
    let responses = vec![
        response(vec![Answer::number(2, 4.0)]),
        response(vec![Answer::text(2, "2")]),
        response(vec![Answer::number(2, 6.0)]),
        response(vec![Answer::number(2, 2.5)]),
        response(vec![Answer::text(2, "great")]),
    ];

    let report = aggregate(&survey, &responses);
    let entry = report.question(2).unwrap();

    assert_eq!(entry.respondents, 2);
    assert_eq!(counts(&entry.summary), vec![0, 1, 0, 1, 0]);
    assert!(matches!(
        entry.summary,
        QuestionSummary::Scale {
            average: Some(avg),
            ..
        } if avg == 3.0
    ));
}

#[test]
fn text_answers_are_collected_in_order_skipping_blanks() {
    let survey = survey(vec![question(3, QuestionType::Date, &[])]);
    let responses = vec![
        response(vec![Answer::text(3, "2024-05-01")]),
        response(vec![Answer::text(3, "")]),
        response(vec![Answer::number(3, 12.0)]),
        response(vec![Answer::text(3, "2024-06-30")]),
    ];

    let report = aggregate(&survey, &responses);
    let entry = report.question(3).unwrap();

    assert_eq!(entry.respondents, 2);
    assert_eq!(entry.summary.text_answers(), ["2024-05-01", "2024-06-30"]);
}

#[test]
fn only_first_answer_per_question_counts() {
    let survey = survey(vec![question(1, QuestionType::SingleChoice, &["x", "y"])]);
    let responses = vec![response(vec![Answer::text(1, "x"), Answer::text(1, "y")])];

    let report = aggregate(&survey, &responses);
    assert_eq!(counts(&report.question(1).unwrap().summary), vec![1, 0]);
}

#[test]
fn report_serializes_with_flattened_summary() {
    let survey = survey(vec![
        question(1, QuestionType::SingleChoice, &["Yes"]),
        question(3, QuestionType::Text, &[]),
    ]);
    let responses = vec![response(vec![Answer::text(1, "Yes"), Answer::text(3, "ok")])];

    let value = serde_json::to_value(aggregate(&survey, &responses)).unwrap();

    assert_eq!(
        value["question_analytics"][0],
        json!({
            "question_id": 1,
            "question_text": "Question 1",
            "question_type": "single_choice",
            "respondents": 1,
            "summary_kind": "options",
            "options": [
                {"option_id": 100, "option_text": "Yes", "count": 1, "percentage": 100.0}
            ]
        })
    );
    assert_eq!(value["question_analytics"][1]["summary_kind"], "text_answers");
    assert_eq!(value["question_analytics"][1]["answers"], json!(["ok"]));
    assert_eq!(value["total_responses"], 1);
}
