use std::sync::Arc;

use async_trait::async_trait;
use quiz_core::model::{
    Category, Choice, CourseId, Question, QuestionId, Quiz, QuizFlags, QuizId, UserId,
};
use quiz_core::time::{fixed_clock, fixed_now};
use services::reports::{
    Demographics, MemoryCache, RawReportFilter, ReportRow, ReportRowSource,
};
use services::{Actor, Clock, DashboardService, QuizTakeService};
use storage::repository::{
    InMemoryRepository, QuizRepository, SittingRepository, StorageError,
};

/// Report rows straight out of the sitting repository, with canned
/// demographics standing in for the web layer's joins.
struct SittingRows {
    repo: InMemoryRepository,
    quiz: Quiz,
    users: Vec<UserId>,
}

#[async_trait]
impl ReportRowSource for SittingRows {
    async fn completed_rows(&self) -> Result<Vec<ReportRow>, StorageError> {
        let mut rows = Vec::new();
        for user in &self.users {
            for sitting in self
                .repo
                .completed_sittings(*user, self.quiz.id(), self.quiz.course_id())
                .await?
            {
                rows.push(ReportRow::from_sitting(
                    &sitting,
                    &self.quiz,
                    "Safety induction",
                    "0001",
                    Some("Mining".to_owned()),
                    Demographics {
                        full_name: format!("User {user}"),
                        ..Demographics::default()
                    },
                ));
            }
        }
        Ok(rows)
    }
}

async fn seed(repo: &InMemoryRepository, questions: u64) -> Quiz {
    for id in 1..=questions {
        let question = Question::multiple_choice(
            QuestionId::new(id),
            format!("Question {id}"),
            Some(Category::new("Safety").unwrap()),
            vec![Choice::new(1, "Right", true), Choice::new(2, "Wrong", false)],
        )
        .unwrap();
        repo.upsert_question(&question).await.unwrap();
    }
    let quiz = Quiz::new(
        QuizId::new(1),
        CourseId::new(1),
        "Safety induction",
        75,
        (1..=questions).map(QuestionId::new).collect(),
        None,
        QuizFlags {
            exam_paper: true,
            ..QuizFlags::default()
        },
        fixed_now(),
    )
    .unwrap();
    repo.upsert_quiz(&quiz).await.unwrap();
    quiz
}

#[tokio::test]
async fn full_loop_feeds_the_dashboard_and_invalidates_its_cache() {
    let repo = InMemoryRepository::new();
    let quiz = seed(&repo, 4).await;

    let cache: Arc<MemoryCache> = Arc::new(MemoryCache::new(fixed_clock()));
    let take = QuizTakeService::new(
        Clock::fixed(fixed_now()),
        Arc::new(repo.clone()),
        Arc::new(repo.clone()),
        Arc::new(repo.clone()),
    )
    .with_report_cache(cache.clone());

    let users = vec![UserId::new(1), UserId::new(2)];
    let dashboard = DashboardService::new(
        Arc::new(SittingRows {
            repo: repo.clone(),
            quiz: quiz.clone(),
            users: users.clone(),
        }),
        fixed_clock(),
    )
    .with_cache(cache.clone());

    // user 1 passes with 3/4
    let mut sitting = take
        .start_sitting(users[0], quiz.id(), quiz.course_id())
        .await
        .unwrap();
    let mut answered = 0;
    while let Some(question) = take.current_question(&sitting).await.unwrap() {
        let answer = if answered < 3 { "1" } else { "2" };
        take.submit_answer(&mut sitting, question.id(), answer)
            .await
            .unwrap();
        answered += 1;
    }
    let outcome = take.finalize(&mut sitting, Actor::Student).await.unwrap();
    assert!(outcome.passed);
    let code = outcome.certificate_code.clone().expect("certificate code");

    let raw = RawReportFilter::default();
    let first = dashboard.overview_dashboard(&raw).await;
    assert_eq!(first.stats.total_attempts, 1);
    assert_eq!(first.stats.approved, 1);

    // user 2 fails with 1/4; finalize must invalidate the cached dashboard
    let mut sitting2 = take
        .start_sitting(users[1], quiz.id(), quiz.course_id())
        .await
        .unwrap();
    let mut answered = 0;
    while let Some(question) = take.current_question(&sitting2).await.unwrap() {
        let answer = if answered < 1 { "1" } else { "2" };
        take.submit_answer(&mut sitting2, question.id(), answer)
            .await
            .unwrap();
        answered += 1;
    }
    let outcome2 = take.finalize(&mut sitting2, Actor::Student).await.unwrap();
    assert!(!outcome2.passed);
    assert!(outcome2.certificate_code.is_none());

    let second = dashboard.overview_dashboard(&raw).await;
    assert_eq!(second.stats.total_attempts, 2);
    assert_eq!(second.stats.approved, 1);
    assert_eq!(second.stats.failed, 1);

    // the stored certificate code is the one the caller saw
    let stored = repo.get_sitting(sitting.id()).await.unwrap().unwrap();
    assert_eq!(
        stored.certificate_code().map(|c| c.as_str().to_owned()),
        Some(code.as_str().to_owned())
    );
}

#[tokio::test]
async fn finalize_without_cache_still_completes() {
    let repo = InMemoryRepository::new();
    let quiz = seed(&repo, 1).await;

    let take = QuizTakeService::new(
        Clock::fixed(fixed_now()),
        Arc::new(repo.clone()),
        Arc::new(repo.clone()),
        Arc::new(repo.clone()),
    );

    let mut sitting = take
        .start_sitting(UserId::new(1), quiz.id(), quiz.course_id())
        .await
        .unwrap();
    let question = take.current_question(&sitting).await.unwrap().unwrap();
    take.submit_answer(&mut sitting, question.id(), "1")
        .await
        .unwrap();
    let outcome = take.finalize(&mut sitting, Actor::Student).await.unwrap();

    assert_eq!(outcome.score, 1);
    assert_eq!(outcome.max_score, 1);
    assert_eq!(outcome.percent_correct, 100);
}
