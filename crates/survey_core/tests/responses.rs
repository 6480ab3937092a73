use rusqlite::Connection;
use survey_core::db::open_db_in_memory;
use survey_core::{
    Answer, AnswerValidationError, AnswerValue, Principal, QuestionDraft, QuestionSummary,
    QuestionType, ResponseRepository, ResponseService, ResponseServiceError,
    SqliteResponseRepository, SqliteSurveyRepository, Survey, SurveyDraft, SurveyService,
};

type Responses<'conn> =
    ResponseService<SqliteSurveyRepository<'conn>, SqliteResponseRepository<'conn>>;

const OWNER: i64 = 5;
const RESPONDENT: i64 = 6;

fn owner() -> Principal {
    Principal::new(OWNER, ["user"]).unwrap()
}

fn respondent() -> Principal {
    Principal::new(RESPONDENT, ["user"]).unwrap()
}

fn responses(conn: &Connection) -> Responses<'_> {
    ResponseService::new(
        SqliteSurveyRepository::try_new(conn).unwrap(),
        SqliteResponseRepository::try_new(conn).unwrap(),
    )
}

fn seed(conn: &Connection, is_active: bool) -> Survey {
    let surveys = SurveyService::new(SqliteSurveyRepository::try_new(conn).unwrap());
    let mut draft = SurveyDraft::new("Office move");
    draft.is_active = is_active;
    surveys
        .create_survey(
            &owner(),
            &draft,
            &[
                QuestionDraft::new("Preferred floor", QuestionType::SingleChoice)
                    .with_options(["First", "Second"])
                    .required(),
                QuestionDraft::new("Needs", QuestionType::Checkbox)
                    .with_options(["Parking", "Lockers", "Showers"]),
                QuestionDraft::new("Commute rating", QuestionType::LinearScale),
                QuestionDraft::new("Comments", QuestionType::Paragraph),
            ],
        )
        .unwrap()
}

fn ids(survey: &Survey) -> [i64; 4] {
    [
        survey.questions[0].id,
        survey.questions[1].id,
        survey.questions[2].id,
        survey.questions[3].id,
    ]
}

#[test]
fn submitted_response_is_stored_with_answers_in_order() {
    let conn = open_db_in_memory().unwrap();
    let survey = seed(&conn, true);
    let [floor, needs, rating, comments] = ids(&survey);
    let service = responses(&conn);

    let stored = service
        .submit_response(
            survey.id,
            Some(RESPONDENT),
            vec![
                Answer::text(floor, "Second"),
                Answer::choices(needs, ["Parking", "Showers"]),
                Answer::number(rating, 4.0),
                Answer::text(comments, "Bike racks please"),
            ],
        )
        .unwrap();
    assert_eq!(stored.user_id, Some(RESPONDENT));
    assert!(stored.submitted_at > 0);

    let listed = service.list_responses(&owner(), survey.id).unwrap();
    assert_eq!(listed, vec![stored]);
    assert_eq!(
        listed[0].answers[1].value,
        AnswerValue::Choices(vec!["Parking".to_string(), "Showers".to_string()])
    );
}

#[test]
fn anonymous_submission_is_allowed() {
    let conn = open_db_in_memory().unwrap();
    let survey = seed(&conn, true);
    let [floor, ..] = ids(&survey);

    let stored = responses(&conn)
        .submit_response(survey.id, None, vec![Answer::text(floor, "First")])
        .unwrap();
    assert_eq!(stored.user_id, None);
}

#[test]
fn inactive_or_missing_survey_rejects_submissions() {
    let conn = open_db_in_memory().unwrap();
    let survey = seed(&conn, false);
    let [floor, ..] = ids(&survey);
    let service = responses(&conn);

    let err = service
        .submit_response(survey.id, None, vec![Answer::text(floor, "First")])
        .unwrap_err();
    assert!(matches!(err, ResponseServiceError::SurveyInactive(id) if id == survey.id));
    assert_eq!(err.status_code(), 400);

    let err = service
        .submit_response(404, None, vec![])
        .unwrap_err();
    assert!(matches!(err, ResponseServiceError::SurveyNotFound(404)));
    assert_eq!(err.status_code(), 404);
}

#[test]
fn invalid_answers_are_rejected_without_storing_anything() {
    let conn = open_db_in_memory().unwrap();
    let survey = seed(&conn, true);
    let other = seed(&conn, true);
    let [floor, needs, rating, _] = ids(&survey);
    let service = responses(&conn);

    let cases = vec![
        (
            vec![Answer::text(floor, "First"), Answer::text(other.questions[3].id, "x")],
            AnswerValidationError::UnknownQuestion(other.questions[3].id),
        ),
        (
            vec![Answer::text(floor, "First"), Answer::text(floor, "Second")],
            AnswerValidationError::DuplicateAnswer(floor),
        ),
        (
            vec![Answer::text(floor, "Basement")],
            AnswerValidationError::UnknownOption {
                question_id: floor,
                value: "Basement".to_string(),
            },
        ),
        (
            vec![Answer::text(floor, "First"), Answer::text(needs, "Parking")],
            AnswerValidationError::ShapeMismatch {
                question_id: needs,
                expected: QuestionType::Checkbox,
            },
        ),
        (
            vec![Answer::text(floor, "First"), Answer::number(rating, 0.0)],
            AnswerValidationError::OutOfScale { question_id: rating },
        ),
        (
            vec![Answer::number(rating, 3.0)],
            AnswerValidationError::MissingRequired(floor),
        ),
    ];

    for (answers, expected) in cases {
        match service.submit_response(survey.id, Some(RESPONDENT), answers) {
            Err(ResponseServiceError::InvalidAnswer(actual)) => assert_eq!(actual, expected),
            other => panic!("expected {expected}, got {other:?}"),
        }
    }

    let repo = SqliteResponseRepository::try_new(&conn).unwrap();
    assert!(repo.list_responses_by_survey(survey.id).unwrap().is_empty());
}

#[test]
fn checkbox_answer_may_not_repeat_an_option() {
    let conn = open_db_in_memory().unwrap();
    let survey = seed(&conn, true);
    let [floor, needs, ..] = ids(&survey);
    let service = responses(&conn);

    let err = service
        .submit_response(
            survey.id,
            Some(RESPONDENT),
            vec![
                Answer::text(floor, "First"),
                Answer::choices(needs, ["Parking", "Parking"]),
            ],
        )
        .unwrap_err();
    assert_eq!(err.status_code(), 400);
    match err {
        ResponseServiceError::InvalidAnswer(AnswerValidationError::DuplicateSelection {
            question_id,
            value,
        }) => {
            assert_eq!(question_id, needs);
            assert_eq!(value, "Parking");
        }
        other => panic!("unexpected error: {other:?}"),
    }

    let report = service.survey_analytics(&owner(), survey.id).unwrap();
    assert_eq!(report.total_responses, 0);
    assert!(report
        .question(needs)
        .unwrap()
        .summary
        .options()
        .iter()
        .all(|row| row.count == 0 && row.percentage <= 100.0));
}

#[test]
fn raw_responses_are_owner_only_but_analytics_is_public_for_active_surveys() {
    let conn = open_db_in_memory().unwrap();
    let survey = seed(&conn, true);
    let service = responses(&conn);

    let err = service.list_responses(&respondent(), survey.id).unwrap_err();
    assert!(matches!(err, ResponseServiceError::Forbidden { .. }));
    assert_eq!(err.status_code(), 403);

    let report = service.survey_analytics(&respondent(), survey.id).unwrap();
    assert_eq!(report.total_responses, 0);

    let closed = seed(&conn, false);
    let err = service.survey_analytics(&respondent(), closed.id).unwrap_err();
    assert!(matches!(err, ResponseServiceError::Forbidden { .. }));
    assert!(service.survey_analytics(&owner(), closed.id).is_ok());
}

#[test]
fn analytics_reflects_stored_responses_end_to_end() {
    let conn = open_db_in_memory().unwrap();
    let survey = seed(&conn, true);
    let [floor, needs, rating, comments] = ids(&survey);
    let service = responses(&conn);

    let submissions = vec![
        vec![
            Answer::text(floor, "First"),
            Answer::choices(needs, ["Parking"]),
            Answer::number(rating, 5.0),
        ],
        vec![
            Answer::text(floor, "Second"),
            Answer::choices(needs, ["Parking", "Lockers"]),
            Answer::text(rating, "2"),
            Answer::text(comments, "Too far"),
        ],
        vec![Answer::text(floor, "First"), Answer::text(comments, "")],
    ];
    for answers in submissions {
        service
            .submit_response(survey.id, Some(RESPONDENT), answers)
            .unwrap();
    }

    let report = service.survey_analytics(&owner(), survey.id).unwrap();
    assert_eq!(report.total_responses, 3);

    let floor_rows = report.question(floor).unwrap().summary.options().to_vec();
    assert_eq!(floor_rows[0].count, 2);
    assert_eq!(floor_rows[1].count, 1);
    assert!((floor_rows[0].percentage - 200.0 / 3.0).abs() < 1e-9);

    let needs_entry = report.question(needs).unwrap();
    assert_eq!(needs_entry.respondents, 2);
    let needs_counts: Vec<usize> = needs_entry
        .summary
        .options()
        .iter()
        .map(|row| row.count)
        .collect();
    assert_eq!(needs_counts, vec![2, 1, 0]);

    assert!(matches!(
        report.question(rating).unwrap().summary,
        QuestionSummary::Scale {
            average: Some(avg),
            ..
        } if avg == 3.5
    ));
    assert_eq!(
        report.question(comments).unwrap().summary.text_answers(),
        ["Too far"]
    );
}

#[test]
fn deleting_a_survey_removes_its_responses() {
    let conn = open_db_in_memory().unwrap();
    let survey = seed(&conn, true);
    let [floor, ..] = ids(&survey);
    responses(&conn)
        .submit_response(survey.id, None, vec![Answer::text(floor, "First")])
        .unwrap();

    let surveys = SurveyService::new(SqliteSurveyRepository::try_new(&conn).unwrap());
    surveys.delete_survey(&owner(), survey.id).unwrap();

    let remaining: i64 = conn
        .query_row("SELECT COUNT(*) FROM response_answers;", [], |row| row.get(0))
        .unwrap();
    assert_eq!(remaining, 0);
    let repo = SqliteResponseRepository::try_new(&conn).unwrap();
    assert!(repo.list_responses_by_survey(survey.id).unwrap().is_empty());
}

#[test]
fn csv_export_has_one_column_per_question_and_flattens_values() {
    let conn = open_db_in_memory().unwrap();
    let survey = seed(&conn, true);
    let [floor, needs, rating, comments] = ids(&survey);
    let service = responses(&conn);

    let first = service
        .submit_response(
            survey.id,
            None,
            vec![
                Answer::text(floor, "First"),
                Answer::choices(needs, ["Parking", "Lockers"]),
                Answer::text(rating, " 4 "),
                Answer::text(comments, "Say \"hi\", ok"),
            ],
        )
        .unwrap();
    let second = service
        .submit_response(
            survey.id,
            Some(RESPONDENT),
            vec![Answer::text(floor, "Second"), Answer::number(rating, 2.0)],
        )
        .unwrap();

    let csv = service.export_responses_csv(&owner(), survey.id).unwrap();
    let lines: Vec<&str> = csv.lines().collect();
    assert_eq!(
        lines,
        vec![
            "response_id,submitted_at,user_id,Preferred floor,Needs,Commute rating,Comments"
                .to_string(),
            format!(
                "{},{},anonymous,First,Parking; Lockers,4,\"Say \"\"hi\"\", ok\"",
                first.id, first.submitted_at
            ),
            format!(
                "{},{},{RESPONDENT},Second,,2,",
                second.id, second.submitted_at
            ),
        ]
    );

    let err = service
        .export_responses_csv(&respondent(), survey.id)
        .unwrap_err();
    assert!(matches!(err, ResponseServiceError::Forbidden { .. }));
}

#[test]
fn csv_export_of_survey_without_responses_is_header_only() {
    let conn = open_db_in_memory().unwrap();
    let survey = seed(&conn, false);

    let csv = responses(&conn)
        .export_responses_csv(&owner(), survey.id)
        .unwrap();
    assert_eq!(csv.lines().count(), 1);
    assert!(csv.starts_with("response_id,submitted_at,user_id,Preferred floor,"));
}
