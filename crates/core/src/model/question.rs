use std::collections::HashSet;
use thiserror::Error;

use crate::model::ids::QuestionId;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum QuestionError {
    #[error("question prompt cannot be empty")]
    EmptyPrompt,

    #[error("multiple-choice question needs at least two choices, got {0}")]
    TooFewChoices(usize),

    #[error("multiple-choice question must have exactly one correct choice, got {0}")]
    CorrectChoiceCount(usize),

    #[error("duplicate choice id: {0}")]
    DuplicateChoice(u32),

    #[error("category cannot be empty")]
    EmptyCategory,
}

//
// ─── CATEGORY ──────────────────────────────────────────────────────────────────
//

/// Subject grouping used for per-user progress tallies.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Category(String);

impl Category {
    /// Creates a category, trimming surrounding whitespace.
    ///
    /// # Errors
    ///
    /// Returns `QuestionError::EmptyCategory` for a blank name.
    pub fn new(name: impl Into<String>) -> Result<Self, QuestionError> {
        let name = name.into();
        let trimmed = name.trim();
        if trimmed.is_empty() {
            return Err(QuestionError::EmptyCategory);
        }
        Ok(Self(trimmed.to_owned()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

//
// ─── CHOICES ───────────────────────────────────────────────────────────────────
//

/// One selectable answer of a multiple-choice question.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Choice {
    pub id: u32,
    pub text: String,
    pub correct: bool,
}

impl Choice {
    #[must_use]
    pub fn new(id: u32, text: impl Into<String>, correct: bool) -> Self {
        Self {
            id,
            text: text.into(),
            correct,
        }
    }
}

//
// ─── QUESTION ──────────────────────────────────────────────────────────────────
//

/// The scorable payload of a question.
///
/// Essays are collected but never auto-scored; multiple-choice answers
/// compare the submitted choice id against the single correct choice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuestionVariant {
    MultipleChoice { choices: Vec<Choice> },
    Essay,
}

/// A question that can appear in one or more quizzes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Question {
    id: QuestionId,
    prompt: String,
    category: Option<Category>,
    variant: QuestionVariant,
}

impl Question {
    /// Creates a multiple-choice question.
    ///
    /// # Errors
    ///
    /// Returns `QuestionError` when the prompt is blank, fewer than two
    /// choices are given, choice ids repeat, or the correct-choice count
    /// is not exactly one.
    pub fn multiple_choice(
        id: QuestionId,
        prompt: impl Into<String>,
        category: Option<Category>,
        choices: Vec<Choice>,
    ) -> Result<Self, QuestionError> {
        let prompt = validate_prompt(prompt.into())?;

        if choices.len() < 2 {
            return Err(QuestionError::TooFewChoices(choices.len()));
        }
        let mut seen = HashSet::with_capacity(choices.len());
        for choice in &choices {
            if !seen.insert(choice.id) {
                return Err(QuestionError::DuplicateChoice(choice.id));
            }
        }
        let correct = choices.iter().filter(|c| c.correct).count();
        if correct != 1 {
            return Err(QuestionError::CorrectChoiceCount(correct));
        }

        Ok(Self {
            id,
            prompt,
            category,
            variant: QuestionVariant::MultipleChoice { choices },
        })
    }

    /// Creates an essay question.
    ///
    /// # Errors
    ///
    /// Returns `QuestionError::EmptyPrompt` for a blank prompt.
    pub fn essay(
        id: QuestionId,
        prompt: impl Into<String>,
        category: Option<Category>,
    ) -> Result<Self, QuestionError> {
        Ok(Self {
            id,
            prompt: validate_prompt(prompt.into())?,
            category,
            variant: QuestionVariant::Essay,
        })
    }

    #[must_use]
    pub fn id(&self) -> QuestionId {
        self.id
    }

    #[must_use]
    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    #[must_use]
    pub fn category(&self) -> Option<&Category> {
        self.category.as_ref()
    }

    #[must_use]
    pub fn variant(&self) -> &QuestionVariant {
        &self.variant
    }

    /// Scores a submitted answer.
    ///
    /// Multiple-choice answers carry the chosen choice id; an unknown id
    /// simply scores as wrong. Essays return `None`: answered, not
    /// auto-scored.
    #[must_use]
    pub fn score(&self, answer: &str) -> Option<bool> {
        match &self.variant {
            QuestionVariant::MultipleChoice { choices } => {
                let Ok(chosen) = answer.trim().parse::<u32>() else {
                    return Some(false);
                };
                Some(
                    choices
                        .iter()
                        .any(|choice| choice.id == chosen && choice.correct),
                )
            }
            QuestionVariant::Essay => None,
        }
    }
}

fn validate_prompt(prompt: String) -> Result<String, QuestionError> {
    let trimmed = prompt.trim();
    if trimmed.is_empty() {
        return Err(QuestionError::EmptyPrompt);
    }
    Ok(trimmed.to_owned())
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;

    fn mc_question() -> Question {
        Question::multiple_choice(
            QuestionId::new(1),
            "Which extinguisher for electrical fires?",
            Some(Category::new("Fire safety").unwrap()),
            vec![
                Choice::new(1, "Water", false),
                Choice::new(2, "CO2", true),
                Choice::new(3, "Foam", false),
            ],
        )
        .unwrap()
    }

    #[test]
    fn multiple_choice_scores_correct_choice() {
        let question = mc_question();
        assert_eq!(question.score("2"), Some(true));
        assert_eq!(question.score("1"), Some(false));
    }

    #[test]
    fn unknown_choice_id_scores_wrong_not_error() {
        let question = mc_question();
        assert_eq!(question.score("99"), Some(false));
        assert_eq!(question.score("not-a-number"), Some(false));
    }

    #[test]
    fn essay_is_never_auto_scored() {
        let question = Question::essay(QuestionId::new(2), "Describe the lockout procedure", None)
            .unwrap();
        assert_eq!(question.score("any text at all"), None);
    }

    #[test]
    fn multiple_choice_requires_exactly_one_correct() {
        let err = Question::multiple_choice(
            QuestionId::new(1),
            "Pick one",
            None,
            vec![Choice::new(1, "A", true), Choice::new(2, "B", true)],
        )
        .unwrap_err();
        assert_eq!(err, QuestionError::CorrectChoiceCount(2));

        let err = Question::multiple_choice(
            QuestionId::new(1),
            "Pick one",
            None,
            vec![Choice::new(1, "A", false), Choice::new(2, "B", false)],
        )
        .unwrap_err();
        assert_eq!(err, QuestionError::CorrectChoiceCount(0));
    }

    #[test]
    fn multiple_choice_rejects_duplicate_choice_ids() {
        let err = Question::multiple_choice(
            QuestionId::new(1),
            "Pick one",
            None,
            vec![Choice::new(1, "A", true), Choice::new(1, "B", false)],
        )
        .unwrap_err();
        assert_eq!(err, QuestionError::DuplicateChoice(1));
    }

    #[test]
    fn category_trims_and_rejects_blank() {
        assert_eq!(Category::new("  PPE ").unwrap().as_str(), "PPE");
        assert_eq!(
            Category::new("   ").unwrap_err(),
            QuestionError::EmptyCategory
        );
    }
}
