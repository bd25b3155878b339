use rand::rng;
use rand::seq::SliceRandom;

use quiz_core::model::{QuestionId, Quiz};

/// Builds the question order for one sitting of a quiz.
///
/// The order starts from the quiz's insertion order, is shuffled when the
/// quiz asks for it, and is truncated to `max_questions` when configured.
pub struct OrderBuilder<'a> {
    quiz: &'a Quiz,
    shuffle: bool,
}

impl<'a> OrderBuilder<'a> {
    #[must_use]
    pub fn new(quiz: &'a Quiz) -> Self {
        Self {
            quiz,
            shuffle: quiz.flags().randomize_order,
        }
    }

    /// Override the quiz's shuffle flag (deterministic orders in tests).
    #[must_use]
    pub fn with_shuffle(mut self, shuffle: bool) -> Self {
        self.shuffle = shuffle;
        self
    }

    #[must_use]
    pub fn build(self) -> Vec<QuestionId> {
        let mut order: Vec<QuestionId> = self.quiz.question_ids().to_vec();

        if self.shuffle {
            let mut rng = rng();
            order.as_mut_slice().shuffle(&mut rng);
        }

        if let Some(cap) = self.quiz.max_questions() {
            let cap = usize::try_from(cap).unwrap_or(usize::MAX);
            order.truncate(cap);
        }

        order
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quiz_core::model::{CourseId, QuizFlags, QuizId};
    use quiz_core::time::fixed_now;
    use std::collections::HashSet;

    fn build_quiz(flags: QuizFlags, max_questions: Option<u32>) -> Quiz {
        Quiz::new(
            QuizId::new(1),
            CourseId::new(1),
            "Test",
            75,
            (1..=6).map(QuestionId::new).collect(),
            max_questions,
            flags,
            fixed_now(),
        )
        .unwrap()
    }

    #[test]
    fn unshuffled_order_follows_insertion_order() {
        let quiz = build_quiz(QuizFlags::default(), None);
        let order = OrderBuilder::new(&quiz).build();
        assert_eq!(order, quiz.question_ids());
    }

    #[test]
    fn shuffle_keeps_the_same_question_set() {
        let quiz = build_quiz(
            QuizFlags {
                randomize_order: true,
                ..QuizFlags::default()
            },
            None,
        );
        let order = OrderBuilder::new(&quiz).build();
        let expected: HashSet<_> = quiz.question_ids().iter().copied().collect();
        let got: HashSet<_> = order.iter().copied().collect();
        assert_eq!(got, expected);
        assert_eq!(order.len(), quiz.question_ids().len());
    }

    #[test]
    fn max_questions_caps_the_order() {
        let quiz = build_quiz(QuizFlags::default(), Some(3));
        let order = OrderBuilder::new(&quiz).build();
        assert_eq!(order.len(), 3);
        assert_eq!(order, &quiz.question_ids()[..3]);
    }

    #[test]
    fn with_shuffle_overrides_the_quiz_flag() {
        let quiz = build_quiz(
            QuizFlags {
                randomize_order: true,
                ..QuizFlags::default()
            },
            None,
        );
        let order = OrderBuilder::new(&quiz).with_shuffle(false).build();
        assert_eq!(order, quiz.question_ids());
    }
}
