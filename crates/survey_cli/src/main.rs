//! Survey CLI: drives `survey_core` against a local SQLite file.
//!
//! # Usage
//!
//! ```text
//! survey --db <file> --user <id> [--roles admin,user] apply <survey.json> [--survey-id <id>]
//! survey --db <file> --user <id> show <survey-id>
//! survey --db <file> --user <id> list [--limit <n>] [--offset <n>]
//! survey --db <file> --user <id> question-add <survey-id> <question.json>
//! survey --db <file> --user <id> question-update <survey-id> <question-id> <question.json>
//! survey --db <file> --user <id> question-delete <survey-id> <question-id>
//! survey --db <file> --user <id> activate|deactivate|delete <survey-id>
//! survey --db <file> [--user <id>] submit <survey-id> <answers.json>
//! survey --db <file> --user <id> responses|report <survey-id>
//! survey --db <file> --user <id> export <survey-id> [--out <file.csv>]
//! ```
//!
//! Output is JSON on stdout, except `export` which writes CSV. Without
//! `--db` (or `SURVEY_DB_PATH`) an in-memory database is used and nothing
//! persists between runs.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::info;
use serde::{Deserialize, Serialize};
use survey_core::{
    Answer, ConfigOverrides, CoreConfig, Principal, QuestionDraft, QuestionId, ResponseService,
    SqliteResponseRepository, SqliteSurveyRepository, SurveyDraft, SurveyId, SurveyService,
};

#[derive(Parser, Debug)]
#[command(
    name = "survey",
    version,
    about = "Author surveys, collect responses and print analytics",
    long_about = None,
)]
struct Cli {
    /// SQLite database file. Falls back to SURVEY_DB_PATH, then in-memory.
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// trace|debug|info|warn|error. Falls back to SURVEY_LOG_LEVEL.
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Absolute directory for rolling log files. Falls back to SURVEY_LOG_DIR.
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    /// Acting user id.
    #[arg(long, global = true)]
    user: Option<String>,

    /// Acting user roles, e.g. `admin,user` or `[admin user]`.
    #[arg(long, global = true)]
    roles: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create a survey from a JSON document, or synchronize an existing one.
    Apply {
        /// Path to the survey document.
        file: PathBuf,
        /// Synchronize this survey instead of creating a new one.
        #[arg(long)]
        survey_id: Option<SurveyId>,
    },
    /// Print one survey with its questions.
    Show { survey_id: SurveyId },
    /// List surveys visible to the acting user, ordered by id.
    List {
        #[arg(long)]
        limit: Option<u32>,
        #[arg(long, default_value_t = 0)]
        offset: u32,
    },
    /// Append one question from a JSON question document.
    QuestionAdd { survey_id: SurveyId, file: PathBuf },
    /// Rewrite one question and replace its options.
    QuestionUpdate {
        survey_id: SurveyId,
        question_id: QuestionId,
        file: PathBuf,
    },
    /// Delete one question and renumber the rest.
    QuestionDelete {
        survey_id: SurveyId,
        question_id: QuestionId,
    },
    /// Open a survey for responses.
    Activate { survey_id: SurveyId },
    /// Close a survey for responses.
    Deactivate { survey_id: SurveyId },
    /// Delete a survey with its questions and responses.
    Delete { survey_id: SurveyId },
    /// Submit a response from a JSON array of answers.
    Submit {
        survey_id: SurveyId,
        /// Path to `[{"question_id": 1, "value": ...}, ...]`.
        file: PathBuf,
    },
    /// Print raw responses of a survey.
    Responses { survey_id: SurveyId },
    /// Print aggregated analytics of a survey.
    Report { survey_id: SurveyId },
    /// Export raw responses as CSV.
    Export {
        survey_id: SurveyId,
        /// Write to this file instead of stdout.
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

/// On-disk survey document accepted by `apply`.
#[derive(Debug, Deserialize)]
struct SurveyDocument {
    #[serde(flatten)]
    survey: SurveyDraft,
    #[serde(default)]
    questions: Vec<QuestionDraft>,
}

#[derive(Debug, Serialize)]
struct Deleted {
    survey_id: SurveyId,
    deleted: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = CoreConfig::resolve(ConfigOverrides {
        db_path: cli.db.clone(),
        log_level: cli.log_level.clone(),
        log_dir: cli.log_dir.clone(),
    })
    .context("invalid configuration")?;
    config.init_logging().context("failed to start logging")?;

    let conn = config
        .open_database()
        .context("failed to open survey database")?;
    info!(
        "event=cli_start module=cli status=ok version={}",
        survey_core::core_version()
    );

    let surveys = SurveyService::new(SqliteSurveyRepository::try_new(&conn)?);
    let responses = ResponseService::new(
        SqliteSurveyRepository::try_new(&conn)?,
        SqliteResponseRepository::try_new(&conn)?,
    );

    match cli.command {
        Commands::Apply { file, survey_id } => {
            let document: SurveyDocument = read_json(&file)?;
            let principal = principal(&cli.user, &cli.roles)?;
            let survey = match survey_id {
                Some(survey_id) => surveys.sync_survey(
                    &principal,
                    survey_id,
                    &document.survey,
                    &document.questions,
                )?,
                None => {
                    surveys.create_survey(&principal, &document.survey, &document.questions)?
                }
            };
            print_json(&survey)
        }
        Commands::Show { survey_id } => {
            let principal = principal(&cli.user, &cli.roles)?;
            print_json(&surveys.get_survey(&principal, survey_id)?)
        }
        Commands::List { limit, offset } => {
            let principal = principal(&cli.user, &cli.roles)?;
            print_json(&surveys.list_surveys(&principal, limit, offset)?)
        }
        Commands::QuestionAdd { survey_id, file } => {
            let draft: QuestionDraft = read_json(&file)?;
            let principal = principal(&cli.user, &cli.roles)?;
            print_json(&surveys.add_question(&principal, survey_id, &draft)?)
        }
        Commands::QuestionUpdate {
            survey_id,
            question_id,
            file,
        } => {
            let draft: QuestionDraft = read_json(&file)?;
            let principal = principal(&cli.user, &cli.roles)?;
            print_json(&surveys.update_question(&principal, survey_id, question_id, &draft)?)
        }
        Commands::QuestionDelete {
            survey_id,
            question_id,
        } => {
            let principal = principal(&cli.user, &cli.roles)?;
            print_json(&surveys.delete_question(&principal, survey_id, question_id)?)
        }
        Commands::Activate { survey_id } => {
            let principal = principal(&cli.user, &cli.roles)?;
            print_json(&surveys.set_survey_active(&principal, survey_id, true)?)
        }
        Commands::Deactivate { survey_id } => {
            let principal = principal(&cli.user, &cli.roles)?;
            print_json(&surveys.set_survey_active(&principal, survey_id, false)?)
        }
        Commands::Delete { survey_id } => {
            let principal = principal(&cli.user, &cli.roles)?;
            surveys.delete_survey(&principal, survey_id)?;
            print_json(&Deleted {
                survey_id,
                deleted: true,
            })
        }
        Commands::Submit { survey_id, file } => {
            let answers: Vec<Answer> = read_json(&file)?;
            // Anonymous unless a user id was given.
            let user_id = match cli.user.as_deref() {
                Some(_) => Some(principal(&cli.user, &cli.roles)?.user_id),
                None => None,
            };
            print_json(&responses.submit_response(survey_id, user_id, answers)?)
        }
        Commands::Responses { survey_id } => {
            let principal = principal(&cli.user, &cli.roles)?;
            print_json(&responses.list_responses(&principal, survey_id)?)
        }
        Commands::Report { survey_id } => {
            let principal = principal(&cli.user, &cli.roles)?;
            print_json(&responses.survey_analytics(&principal, survey_id)?)
        }
        Commands::Export { survey_id, out } => {
            let principal = principal(&cli.user, &cli.roles)?;
            let csv = responses.export_responses_csv(&principal, survey_id)?;
            match out {
                Some(path) => fs::write(&path, csv)
                    .with_context(|| format!("failed to write {}", path.display())),
                None => {
                    print!("{csv}");
                    Ok(())
                }
            }
        }
    }
}

fn principal(user: &Option<String>, roles: &Option<String>) -> Result<Principal> {
    Principal::from_forwarded(user.as_deref(), roles.as_deref())
        .context("a valid --user is required for this command")
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("failed to parse {}", path.display()))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{Cli, Commands, SurveyDocument};
    use clap::{CommandFactory, Parser};
    use survey_core::QuestionType;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn global_flags_parse_after_subcommand() {
        let cli = Cli::parse_from([
            "survey", "report", "7", "--user", "42", "--roles", "[admin user]",
        ]);
        assert!(matches!(cli.command, Commands::Report { survey_id: 7 }));
        assert_eq!(cli.user.as_deref(), Some("42"));
        assert_eq!(cli.roles.as_deref(), Some("[admin user]"));
    }

    #[test]
    fn question_and_paging_subcommands_parse() {
        let cli = Cli::parse_from(["survey", "list", "--limit", "10", "--offset", "20"]);
        assert!(matches!(
            cli.command,
            Commands::List {
                limit: Some(10),
                offset: 20
            }
        ));

        let cli = Cli::parse_from(["survey", "question-update", "3", "8", "q.json"]);
        assert!(matches!(
            cli.command,
            Commands::QuestionUpdate {
                survey_id: 3,
                question_id: 8,
                ..
            }
        ));

        let cli = Cli::parse_from(["survey", "export", "3", "--out", "out.csv", "--user", "1"]);
        match cli.command {
            Commands::Export { survey_id, out } => {
                assert_eq!(survey_id, 3);
                assert_eq!(out.as_deref(), Some(std::path::Path::new("out.csv")));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn survey_document_flattens_draft_fields() {
        let document: SurveyDocument = serde_json::from_str(
            r#"{
                "title": "Lunch",
                "is_active": true,
                "questions": [
                    {"text": "Where?", "type": "dropdown", "options": ["Cafe", "Deli"]},
                    {"id": 4, "text": "Rate it", "type": "linear_scale", "required": true}
                ]
            }"#,
        )
        .expect("document should parse");
        assert_eq!(document.survey.title, "Lunch");
        assert!(document.survey.is_active);
        assert_eq!(document.questions.len(), 2);
        assert_eq!(document.questions[1].id, Some(4));
        assert_eq!(document.questions[1].kind, QuestionType::LinearScale);
    }
}
