//! Domain model for survey authoring and response collection.
//!
//! # Responsibility
//! - Define the survey/question/option tree and its draft shapes.
//! - Define submitted responses and answer validation.
//!
//! # See also
//! - `repo` for persistence of these shapes.

pub mod response;
pub mod survey;
