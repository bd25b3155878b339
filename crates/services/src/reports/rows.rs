use chrono::{DateTime, Utc};

use quiz_core::model::{CourseId, Quiz, Sitting, SittingId, UserId, passed};

/// Declared gender, binary as the enrolment form collects it; anything
/// else stays unspecified and is excluded from the gender chart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gender {
    Male,
    Female,
}

/// Student attributes joined onto a sitting for reporting.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Demographics {
    pub full_name: String,
    pub company: Option<String>,
    pub gender: Option<Gender>,
}

/// One finalized sitting, flattened for the aggregation functions.
///
/// `approved()` goes through the core pass predicate so a row can never
/// disagree with the gating and finalize paths about what "approved" means.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportRow {
    pub sitting_id: SittingId,
    pub user_id: UserId,
    pub full_name: String,
    pub course_id: CourseId,
    pub course_title: String,
    pub course_code: String,
    pub program: Option<String>,
    pub company: Option<String>,
    pub gender: Option<Gender>,
    pub completed_at: Option<DateTime<Utc>>,
    pub approved_at: Option<DateTime<Utc>>,
    pub percent_correct: u8,
    pub pass_mark: u8,
    pub complete: bool,
    pub certificate_code: Option<String>,
}

impl ReportRow {
    /// Flattens a sitting and its quiz plus joined course/student data.
    #[must_use]
    pub fn from_sitting(
        sitting: &Sitting,
        quiz: &Quiz,
        course_title: impl Into<String>,
        course_code: impl Into<String>,
        program: Option<String>,
        demographics: Demographics,
    ) -> Self {
        Self {
            sitting_id: sitting.id(),
            user_id: sitting.user_id(),
            full_name: demographics.full_name,
            course_id: sitting.course_id(),
            course_title: course_title.into(),
            course_code: course_code.into(),
            program,
            company: demographics.company,
            gender: demographics.gender,
            completed_at: sitting.ended_at(),
            approved_at: sitting.approved_at(),
            percent_correct: sitting.percent_correct(),
            pass_mark: quiz.pass_mark(),
            complete: sitting.is_complete(),
            certificate_code: sitting.certificate_code().map(|c| c.as_str().to_owned()),
        }
    }

    /// The single pass/fail verdict, shared with the state machine.
    #[must_use]
    pub fn approved(&self) -> bool {
        passed(self.complete, self.percent_correct, self.pass_mark)
    }

    /// Score on the 0-20 grade scale used by course reports.
    #[must_use]
    pub fn grade_0_to_20(&self) -> f64 {
        f64::from(self.percent_correct) / 100.0 * 20.0
    }

    /// Company name if one was declared, trimmed.
    #[must_use]
    pub fn declared_company(&self) -> Option<&str> {
        self.company
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quiz_core::model::{CertificateCode, QuestionId, QuizFlags, QuizId};
    use quiz_core::time::fixed_now;

    fn passing_row() -> ReportRow {
        let order: Vec<_> = (1..=4).map(QuestionId::new).collect();
        let quiz = Quiz::new(
            QuizId::new(1),
            CourseId::new(1),
            "Safety induction",
            75,
            order.clone(),
            None,
            QuizFlags::default(),
            fixed_now(),
        )
        .unwrap();

        let mut sitting = Sitting::new(
            SittingId::new(1),
            UserId::new(1),
            quiz.id(),
            quiz.course_id(),
            order,
            fixed_now(),
        )
        .unwrap();
        for id in 1..=4u64 {
            let question = quiz_core::model::Question::multiple_choice(
                QuestionId::new(id),
                "Q",
                None,
                vec![
                    quiz_core::model::Choice::new(1, "A", true),
                    quiz_core::model::Choice::new(2, "B", false),
                ],
            )
            .unwrap();
            let answer = if id == 4 { "2" } else { "1" };
            sitting.record_answer(&question, answer).unwrap();
        }
        sitting
            .finalize(75, fixed_now(), CertificateCode::generate())
            .unwrap();

        ReportRow::from_sitting(
            &sitting,
            &quiz,
            "Safety induction",
            "0001",
            Some("Mining".to_owned()),
            Demographics {
                full_name: "Ana Quispe".to_owned(),
                company: Some("  Acme SAC ".to_owned()),
                gender: Some(Gender::Female),
            },
        )
    }

    #[test]
    fn approved_tracks_the_core_predicate() {
        let row = passing_row();
        assert!(row.complete);
        assert_eq!(row.percent_correct, 75);
        assert!(row.approved());

        let mut failing = row.clone();
        failing.percent_correct = 74;
        assert!(!failing.approved());

        let mut incomplete = row;
        incomplete.complete = false;
        assert!(!incomplete.approved());
    }

    #[test]
    fn grade_scale_and_company_trimming() {
        let row = passing_row();
        assert!((row.grade_0_to_20() - 15.0).abs() < f64::EPSILON);
        assert_eq!(row.declared_company(), Some("Acme SAC"));
    }
}
