//! Survey repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Provide read APIs over the survey/question/option tree.
//! - Hand out unit-of-work values that group mutations in one transaction.
//!
//! # Invariants
//! - Every mutation goes through a `SurveyUnitOfWork`.
//! - A unit of work dropped without `commit` rolls back.
//! - Questions are returned ordered by `position ASC, id ASC`; options by
//!   `position ASC, id ASC`.

use crate::db::migrations::latest_version;
use crate::db::DbError;
use crate::model::survey::{
    OptionId, Question, QuestionDraft, QuestionId, QuestionOption, QuestionType, Survey,
    SurveyDraft, SurveyId, SurveyValidationError, UserId,
};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, Row, Transaction, TransactionBehavior};
use std::collections::HashMap;
use std::error::Error;
use std::fmt::{Display, Formatter};

const SURVEY_SELECT_SQL: &str = "SELECT
    id,
    creator_id,
    title,
    description,
    is_active,
    starts_at,
    ends_at,
    created_at,
    updated_at
FROM surveys";

pub type RepoResult<T> = Result<T, RepoError>;

/// Repository error shared by survey and response persistence.
#[derive(Debug)]
pub enum RepoError {
    Validation(SurveyValidationError),
    Db(DbError),
    SurveyNotFound(SurveyId),
    QuestionNotFound(QuestionId),
    /// Persisted data cannot be converted to a valid read model.
    InvalidData(String),
    /// Connection schema is not at the expected migrated version.
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::SurveyNotFound(id) => write!(f, "survey not found: {id}"),
            Self::QuestionNotFound(id) => write!(f, "question not found: {id}"),
            Self::InvalidData(message) => write!(f, "invalid persisted survey data: {message}"),
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "survey repository requires schema version {expected_version}, got {actual_version}"
            ),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<SurveyValidationError> for RepoError {
    fn from(value: SurveyValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Query options for listing surveys.
#[derive(Debug, Clone, Default)]
pub struct SurveyListQuery {
    /// `None` lists every survey. `Some(user)` lists surveys created by
    /// `user` plus all active surveys.
    pub visible_to: Option<UserId>,
    pub limit: Option<u32>,
    pub offset: u32,
}

/// Read access plus unit-of-work factory for survey trees.
pub trait SurveyRepository {
    /// Loads one survey with its full question/option tree.
    fn get_survey(&self, id: SurveyId) -> RepoResult<Option<Survey>>;
    /// Loads ordered questions (options nested) of one survey.
    fn list_questions(&self, survey_id: SurveyId) -> RepoResult<Vec<Question>>;
    /// Lists survey headers. `questions` is left empty.
    fn list_surveys(&self, query: &SurveyListQuery) -> RepoResult<Vec<Survey>>;
    /// Starts one atomic unit of work.
    fn begin_unit_of_work(&self) -> RepoResult<Box<dyn SurveyUnitOfWork + '_>>;
}

/// Transactional mutation surface for survey trees.
///
/// Nothing is visible outside the unit until `commit`. Dropping the value
/// without committing discards every change.
pub trait SurveyUnitOfWork {
    fn create_survey(&self, creator_id: UserId, draft: &SurveyDraft) -> RepoResult<SurveyId>;
    /// Rewrites scalar fields; `creator_id` is left untouched.
    fn update_survey(&self, id: SurveyId, draft: &SurveyDraft) -> RepoResult<()>;
    fn set_survey_active(&self, id: SurveyId, is_active: bool) -> RepoResult<()>;
    /// Deletes one survey and everything hanging off it.
    fn delete_survey(&self, id: SurveyId) -> RepoResult<()>;
    fn list_questions(&self, survey_id: SurveyId) -> RepoResult<Vec<Question>>;
    fn create_question(
        &self,
        survey_id: SurveyId,
        draft: &QuestionDraft,
        position: i64,
    ) -> RepoResult<QuestionId>;
    /// Updates text/type/required/position of a question owned by `survey_id`.
    fn update_question(
        &self,
        survey_id: SurveyId,
        question_id: QuestionId,
        draft: &QuestionDraft,
        position: i64,
    ) -> RepoResult<()>;
    fn delete_question(&self, survey_id: SurveyId, question_id: QuestionId) -> RepoResult<()>;
    fn create_option(
        &self,
        question_id: QuestionId,
        text: &str,
        position: i64,
    ) -> RepoResult<OptionId>;
    /// Returns the number of deleted options.
    fn delete_options_for_question(&self, question_id: QuestionId) -> RepoResult<usize>;
    /// Deletes every question of `survey_id` whose id is not in `keep`.
    /// Returns the number of deleted questions.
    fn delete_questions_except(&self, survey_id: SurveyId, keep: &[QuestionId])
        -> RepoResult<usize>;
    /// Rewrites question positions of `survey_id` to `1..=n` in current order.
    /// Returns the number of moved questions.
    fn renumber_questions(&self, survey_id: SurveyId) -> RepoResult<usize>;
    fn commit(self: Box<Self>) -> RepoResult<()>;
    fn rollback(self: Box<Self>) -> RepoResult<()>;
}

/// SQLite-backed survey repository.
pub struct SqliteSurveyRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteSurveyRepository<'conn> {
    /// Creates repository from a migrated connection.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_schema_ready(conn)?;
        Ok(Self { conn })
    }
}

impl SurveyRepository for SqliteSurveyRepository<'_> {
    fn get_survey(&self, id: SurveyId) -> RepoResult<Option<Survey>> {
        load_survey(self.conn, id)
    }

    fn list_questions(&self, survey_id: SurveyId) -> RepoResult<Vec<Question>> {
        load_questions(self.conn, survey_id)
    }

    fn list_surveys(&self, query: &SurveyListQuery) -> RepoResult<Vec<Survey>> {
        let mut sql = format!("{SURVEY_SELECT_SQL} WHERE 1 = 1");
        let mut bind_values: Vec<Value> = Vec::new();

        if let Some(user_id) = query.visible_to {
            sql.push_str(" AND (creator_id = ? OR is_active = 1)");
            bind_values.push(Value::Integer(user_id));
        }

        sql.push_str(" ORDER BY id ASC");

        if let Some(limit) = query.limit {
            sql.push_str(" LIMIT ?");
            bind_values.push(Value::Integer(i64::from(limit)));
            if query.offset > 0 {
                sql.push_str(" OFFSET ?");
                bind_values.push(Value::Integer(i64::from(query.offset)));
            }
        } else if query.offset > 0 {
            sql.push_str(" LIMIT -1 OFFSET ?");
            bind_values.push(Value::Integer(i64::from(query.offset)));
        }

        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(bind_values))?;
        let mut surveys = Vec::new();
        while let Some(row) = rows.next()? {
            surveys.push(parse_survey_row(row)?);
        }
        Ok(surveys)
    }

    fn begin_unit_of_work(&self) -> RepoResult<Box<dyn SurveyUnitOfWork + '_>> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        Ok(Box::new(SqliteSurveyUnitOfWork { tx }))
    }
}

/// One `BEGIN IMMEDIATE` transaction over the survey tables.
pub struct SqliteSurveyUnitOfWork<'conn> {
    tx: Transaction<'conn>,
}

impl SurveyUnitOfWork for SqliteSurveyUnitOfWork<'_> {
    fn create_survey(&self, creator_id: UserId, draft: &SurveyDraft) -> RepoResult<SurveyId> {
        draft.validate()?;
        self.tx.execute(
            "INSERT INTO surveys (
                creator_id,
                title,
                description,
                is_active,
                starts_at,
                ends_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6);",
            params![
                creator_id,
                draft.title.trim(),
                draft.description.as_str(),
                bool_to_int(draft.is_active),
                draft.starts_at,
                draft.ends_at,
            ],
        )?;
        Ok(self.tx.last_insert_rowid())
    }

    fn update_survey(&self, id: SurveyId, draft: &SurveyDraft) -> RepoResult<()> {
        draft.validate()?;
        let changed = self.tx.execute(
            "UPDATE surveys
             SET
                title = ?2,
                description = ?3,
                is_active = ?4,
                starts_at = ?5,
                ends_at = ?6,
                updated_at = (strftime('%s', 'now') * 1000)
             WHERE id = ?1;",
            params![
                id,
                draft.title.trim(),
                draft.description.as_str(),
                bool_to_int(draft.is_active),
                draft.starts_at,
                draft.ends_at,
            ],
        )?;
        if changed == 0 {
            return Err(RepoError::SurveyNotFound(id));
        }
        Ok(())
    }

    fn set_survey_active(&self, id: SurveyId, is_active: bool) -> RepoResult<()> {
        let changed = self.tx.execute(
            "UPDATE surveys
             SET is_active = ?2,
                 updated_at = (strftime('%s', 'now') * 1000)
             WHERE id = ?1;",
            params![id, bool_to_int(is_active)],
        )?;
        if changed == 0 {
            return Err(RepoError::SurveyNotFound(id));
        }
        Ok(())
    }

    fn delete_survey(&self, id: SurveyId) -> RepoResult<()> {
        let changed = self
            .tx
            .execute("DELETE FROM surveys WHERE id = ?1;", [id])?;
        if changed == 0 {
            return Err(RepoError::SurveyNotFound(id));
        }
        Ok(())
    }

    fn list_questions(&self, survey_id: SurveyId) -> RepoResult<Vec<Question>> {
        load_questions(&self.tx, survey_id)
    }

    fn create_question(
        &self,
        survey_id: SurveyId,
        draft: &QuestionDraft,
        position: i64,
    ) -> RepoResult<QuestionId> {
        self.tx.execute(
            "INSERT INTO questions (
                survey_id,
                text,
                type,
                required,
                position
            ) VALUES (?1, ?2, ?3, ?4, ?5);",
            params![
                survey_id,
                draft.text.trim(),
                draft.kind.as_str(),
                bool_to_int(draft.required),
                position,
            ],
        )?;
        Ok(self.tx.last_insert_rowid())
    }

    fn update_question(
        &self,
        survey_id: SurveyId,
        question_id: QuestionId,
        draft: &QuestionDraft,
        position: i64,
    ) -> RepoResult<()> {
        let changed = self.tx.execute(
            "UPDATE questions
             SET
                text = ?3,
                type = ?4,
                required = ?5,
                position = ?6,
                updated_at = (strftime('%s', 'now') * 1000)
             WHERE id = ?1
               AND survey_id = ?2;",
            params![
                question_id,
                survey_id,
                draft.text.trim(),
                draft.kind.as_str(),
                bool_to_int(draft.required),
                position,
            ],
        )?;
        if changed == 0 {
            return Err(RepoError::QuestionNotFound(question_id));
        }
        Ok(())
    }

    fn delete_question(&self, survey_id: SurveyId, question_id: QuestionId) -> RepoResult<()> {
        let changed = self.tx.execute(
            "DELETE FROM questions WHERE id = ?1 AND survey_id = ?2;",
            params![question_id, survey_id],
        )?;
        if changed == 0 {
            return Err(RepoError::QuestionNotFound(question_id));
        }
        Ok(())
    }

    fn create_option(
        &self,
        question_id: QuestionId,
        text: &str,
        position: i64,
    ) -> RepoResult<OptionId> {
        self.tx.execute(
            "INSERT INTO question_options (question_id, text, position)
             VALUES (?1, ?2, ?3);",
            params![question_id, text, position],
        )?;
        Ok(self.tx.last_insert_rowid())
    }

    fn delete_options_for_question(&self, question_id: QuestionId) -> RepoResult<usize> {
        let deleted = self.tx.execute(
            "DELETE FROM question_options WHERE question_id = ?1;",
            [question_id],
        )?;
        Ok(deleted)
    }

    fn delete_questions_except(
        &self,
        survey_id: SurveyId,
        keep: &[QuestionId],
    ) -> RepoResult<usize> {
        let mut sql = String::from("DELETE FROM questions WHERE survey_id = ?");
        let mut bind_values: Vec<Value> = vec![Value::Integer(survey_id)];
        if !keep.is_empty() {
            let placeholders = vec!["?"; keep.len()].join(", ");
            sql.push_str(&format!(" AND id NOT IN ({placeholders})"));
            bind_values.extend(keep.iter().map(|id| Value::Integer(*id)));
        }
        let deleted = self.tx.execute(&sql, params_from_iter(bind_values))?;
        Ok(deleted)
    }

    fn renumber_questions(&self, survey_id: SurveyId) -> RepoResult<usize> {
        let mut ordered: Vec<QuestionId> = Vec::new();
        {
            let mut stmt = self.tx.prepare(
                "SELECT id
                 FROM questions
                 WHERE survey_id = ?1
                 ORDER BY position ASC, id ASC;",
            )?;
            let mut rows = stmt.query([survey_id])?;
            while let Some(row) = rows.next()? {
                ordered.push(row.get(0)?);
            }
        }

        let mut moved = 0;
        for (index, question_id) in ordered.into_iter().enumerate() {
            moved += self.tx.execute(
                "UPDATE questions
                 SET position = ?2,
                     updated_at = (strftime('%s', 'now') * 1000)
                 WHERE id = ?1
                   AND position <> ?2;",
                params![question_id, index as i64 + 1],
            )?;
        }
        Ok(moved)
    }

    fn commit(self: Box<Self>) -> RepoResult<()> {
        self.tx.commit()?;
        Ok(())
    }

    fn rollback(self: Box<Self>) -> RepoResult<()> {
        self.tx.rollback()?;
        Ok(())
    }
}

fn load_survey(conn: &Connection, id: SurveyId) -> RepoResult<Option<Survey>> {
    let mut stmt = conn.prepare(&format!("{SURVEY_SELECT_SQL} WHERE id = ?1;"))?;
    let mut rows = stmt.query([id])?;
    let Some(row) = rows.next()? else {
        return Ok(None);
    };
    let mut survey = parse_survey_row(row)?;
    survey.questions = load_questions(conn, id)?;
    Ok(Some(survey))
}

fn load_questions(conn: &Connection, survey_id: SurveyId) -> RepoResult<Vec<Question>> {
    let mut options_by_question = load_options(conn, survey_id)?;

    let mut stmt = conn.prepare(
        "SELECT
            id,
            survey_id,
            text,
            type,
            required,
            position
         FROM questions
         WHERE survey_id = ?1
         ORDER BY position ASC, id ASC;",
    )?;
    let mut rows = stmt.query([survey_id])?;
    let mut questions = Vec::new();
    while let Some(row) = rows.next()? {
        let mut question = parse_question_row(row)?;
        question.options = options_by_question
            .remove(&question.id)
            .unwrap_or_default();
        questions.push(question);
    }
    Ok(questions)
}

fn load_options(
    conn: &Connection,
    survey_id: SurveyId,
) -> RepoResult<HashMap<QuestionId, Vec<QuestionOption>>> {
    let mut stmt = conn.prepare(
        "SELECT
            o.id AS id,
            o.question_id AS question_id,
            o.text AS text,
            o.position AS position
         FROM question_options o
         INNER JOIN questions q ON q.id = o.question_id
         WHERE q.survey_id = ?1
         ORDER BY o.question_id ASC, o.position ASC, o.id ASC;",
    )?;
    let mut rows = stmt.query([survey_id])?;
    let mut grouped: HashMap<QuestionId, Vec<QuestionOption>> = HashMap::new();
    while let Some(row) = rows.next()? {
        let option = QuestionOption {
            id: row.get("id")?,
            question_id: row.get("question_id")?,
            text: row.get("text")?,
            position: row.get("position")?,
        };
        grouped.entry(option.question_id).or_default().push(option);
    }
    Ok(grouped)
}

fn parse_survey_row(row: &Row<'_>) -> RepoResult<Survey> {
    Ok(Survey {
        id: row.get("id")?,
        creator_id: row.get("creator_id")?,
        title: row.get("title")?,
        description: row.get("description")?,
        is_active: parse_flag(row.get("is_active")?, "surveys.is_active")?,
        starts_at: row.get("starts_at")?,
        ends_at: row.get("ends_at")?,
        questions: Vec::new(),
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

fn parse_question_row(row: &Row<'_>) -> RepoResult<Question> {
    let type_text: String = row.get("type")?;
    let kind = QuestionType::parse(&type_text).ok_or_else(|| {
        RepoError::InvalidData(format!(
            "invalid question type `{type_text}` in questions.type"
        ))
    })?;

    Ok(Question {
        id: row.get("id")?,
        survey_id: row.get("survey_id")?,
        text: row.get("text")?,
        kind,
        required: parse_flag(row.get("required")?, "questions.required")?,
        position: row.get("position")?,
        options: Vec::new(),
    })
}

fn parse_flag(value: i64, column: &'static str) -> RepoResult<bool> {
    match value {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(RepoError::InvalidData(format!(
            "invalid flag value `{other}` in {column}"
        ))),
    }
}

fn bool_to_int(value: bool) -> i64 {
    if value {
        1
    } else {
        0
    }
}

/// Rejects connections that skipped `open_db`.
pub(crate) fn ensure_schema_ready(conn: &Connection) -> RepoResult<()> {
    let expected_version = latest_version();
    let actual_version: u32 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
    if actual_version != expected_version {
        return Err(RepoError::UninitializedConnection {
            expected_version,
            actual_version,
        });
    }
    Ok(())
}
