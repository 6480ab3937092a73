//! Response repository contracts and SQLite implementation.
//!
//! # Invariants
//! - A response and its answers are written in one transaction.
//! - Responses are listed in submission order; answers keep submitted order.

use crate::model::response::{Answer, AnswerValue, Response};
use crate::model::survey::SurveyId;
use crate::repo::survey_repo::{ensure_schema_ready, RepoError, RepoResult};
use rusqlite::{params, Connection, Transaction, TransactionBehavior};
use std::collections::HashMap;
use uuid::Uuid;

/// Append-only storage for submitted responses.
pub trait ResponseRepository {
    /// Stores one response with all of its answers.
    fn create_response(&self, response: &Response) -> RepoResult<()>;
    /// Lists every response of one survey, oldest first.
    fn list_responses_by_survey(&self, survey_id: SurveyId) -> RepoResult<Vec<Response>>;
}

/// SQLite-backed response repository.
pub struct SqliteResponseRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteResponseRepository<'conn> {
    /// Creates repository from a migrated connection.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_schema_ready(conn)?;
        Ok(Self { conn })
    }
}

impl ResponseRepository for SqliteResponseRepository<'_> {
    fn create_response(&self, response: &Response) -> RepoResult<()> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        tx.execute(
            "INSERT INTO responses (uuid, survey_id, user_id, submitted_at)
             VALUES (?1, ?2, ?3, ?4);",
            params![
                response.id.to_string(),
                response.survey_id,
                response.user_id,
                response.submitted_at,
            ],
        )?;

        {
            let mut stmt = tx.prepare(
                "INSERT INTO response_answers (response_uuid, position, question_id, value_json)
                 VALUES (?1, ?2, ?3, ?4);",
            )?;
            for (index, answer) in response.answers.iter().enumerate() {
                let value_json = serde_json::to_string(&answer.value).map_err(|err| {
                    RepoError::InvalidData(format!("answer value cannot be encoded: {err}"))
                })?;
                stmt.execute(params![
                    response.id.to_string(),
                    index as i64 + 1,
                    answer.question_id,
                    value_json,
                ])?;
            }
        }

        tx.commit()?;
        Ok(())
    }

    fn list_responses_by_survey(&self, survey_id: SurveyId) -> RepoResult<Vec<Response>> {
        let mut answers_by_response = load_answers(self.conn, survey_id)?;

        let mut stmt = self.conn.prepare(
            "SELECT uuid, survey_id, user_id, submitted_at
             FROM responses
             WHERE survey_id = ?1
             ORDER BY submitted_at ASC, rowid ASC;",
        )?;
        let mut rows = stmt.query([survey_id])?;
        let mut responses = Vec::new();
        while let Some(row) = rows.next()? {
            let raw_uuid: String = row.get("uuid")?;
            let id = parse_uuid(&raw_uuid)?;
            responses.push(Response {
                id,
                survey_id: row.get("survey_id")?,
                user_id: row.get("user_id")?,
                submitted_at: row.get("submitted_at")?,
                answers: answers_by_response.remove(&raw_uuid).unwrap_or_default(),
            });
        }
        Ok(responses)
    }
}

fn load_answers(
    conn: &Connection,
    survey_id: SurveyId,
) -> RepoResult<HashMap<String, Vec<Answer>>> {
    let mut stmt = conn.prepare(
        "SELECT a.response_uuid AS response_uuid, a.question_id AS question_id, a.value_json AS value_json
         FROM response_answers a
         INNER JOIN responses r ON r.uuid = a.response_uuid
         WHERE r.survey_id = ?1
         ORDER BY a.response_uuid ASC, a.position ASC;",
    )?;
    let mut rows = stmt.query([survey_id])?;
    let mut grouped: HashMap<String, Vec<Answer>> = HashMap::new();
    while let Some(row) = rows.next()? {
        let response_uuid: String = row.get("response_uuid")?;
        let value_json: String = row.get("value_json")?;
        let value: AnswerValue = serde_json::from_str(&value_json).map_err(|err| {
            RepoError::InvalidData(format!(
                "invalid answer value for response {response_uuid}: {err}"
            ))
        })?;
        grouped
            .entry(response_uuid)
            .or_default()
            .push(Answer::new(row.get("question_id")?, value));
    }
    Ok(grouped)
}

fn parse_uuid(value: &str) -> RepoResult<Uuid> {
    Uuid::parse_str(value)
        .map_err(|_| RepoError::InvalidData(format!("invalid uuid `{value}` in responses.uuid")))
}
