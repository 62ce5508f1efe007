// src/models/question.rs

use serde::{Deserialize, Serialize};
use sqlx::prelude::FromRow;
use sqlx::types::Json;
use validator::Validate;

/// One selectable answer option.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Choice {
    /// Choice key shown to the user, e.g. "A".
    pub letter: String,
    pub text: String,
}

/// Represents the 'questions' table in the database.
/// Immutable once loaded for a session.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Question {
    pub id: i64,
    pub course_id: i64,

    /// The text content of the question.
    pub prompt: String,

    /// Ordered options, stored as a JSON array in the database.
    pub choices: Json<Vec<Choice>>,

    /// Letters of the correct choices. More than one letter makes the
    /// question multiple-choice.
    pub correct_letters: Json<Vec<String>>,

    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl Question {
    pub fn multiple_choice(&self) -> bool {
        self.correct_letters.0.len() > 1
    }
}

/// DTO for sending a question to a quiz taker (excludes the answer key).
#[derive(Debug, Serialize)]
pub struct PublicQuestion {
    pub id: i64,
    pub prompt: String,
    pub choices: Vec<Choice>,
    pub multiple_choice: bool,
}

impl From<&Question> for PublicQuestion {
    fn from(q: &Question) -> Self {
        Self {
            id: q.id,
            prompt: q.prompt.clone(),
            choices: q.choices.0.clone(),
            multiple_choice: q.multiple_choice(),
        }
    }
}

/// DTO for creating a new question.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateQuestionRequest {
    pub course_id: i64,
    #[validate(length(min = 1, max = 1000))]
    pub prompt: String,
    #[validate(custom(function = validate_choices))]
    pub choices: Vec<Choice>,
    #[validate(length(min = 1, max = 10))]
    pub correct_letters: Vec<String>,
}

impl CreateQuestionRequest {
    /// Every correct letter must name one of the listed choices.
    pub fn answers_match_choices(&self) -> bool {
        self.correct_letters
            .iter()
            .all(|l| self.choices.iter().any(|c| &c.letter == l))
    }
}

fn validate_choices(choices: &[Choice]) -> Result<(), validator::ValidationError> {
    if choices.len() < 2 {
        return Err(validator::ValidationError::new("need_at_least_two_choices"));
    }
    for c in choices {
        if c.letter.is_empty() || c.text.len() > 500 {
            return Err(validator::ValidationError::new("bad_choice"));
        }
    }
    Ok(())
}
