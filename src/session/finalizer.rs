//! Session finalization.
//!
//! Turns a user's buffered turns into a stored conversation and one
//! analytics record:
//!
//! 1. Under the user's lock: read the buffer, apply the answer-commit rule,
//!    append the conversation content, persist, clear the buffer.
//! 2. Without any lock: run the analysis calls concurrently under one
//!    deadline. Late or failed calls leave their fields unset.
//! 3. Under the lock again: append the analytics record and fold it into
//!    the day/week roll-ups.
//!
//! Content is never rolled back because analysis went badly.

use super::locks::UserLocks;
use super::tracker::{reconcile, Reconciliation};
use crate::analysis::aggregator::record_commit;
use crate::analysis::{AnalysisGateway, AnalysisStep, TitleSummaryParser};
use crate::calendar::Calendar;
use crate::error::Result;
use crate::models::{
    ContentAnalysis, ConversationAnalytics, ConversationContent, Sentiment, UserId, Vocabulary,
    WordCloud,
};
use crate::store::{TurnStore, UserStore};
use chrono::Utc;
use serde::Serialize;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Why a finalize call changed nothing durable (beyond a reverted flag).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NoOpReason {
    EmptyBuffer,
    /// Question was marked answered but the session held no reply.
    AnswerReverted,
    /// A single turn: nothing to summarize.
    TooShort,
}

/// Result of a committed finalize.
#[derive(Debug, Clone, Serialize)]
pub struct FinalizeReport {
    pub conversation_id: u64,
    pub turn_count: usize,
    pub answer_committed: bool,
    /// Analysis steps that failed, timed out or returned unparseable text.
    pub failed_steps: Vec<AnalysisStep>,
    pub analytics: ConversationAnalytics,
}

impl FinalizeReport {
    pub fn is_degraded(&self) -> bool {
        !self.failed_steps.is_empty()
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum FinalizeOutcome {
    NoOp { reason: NoOpReason },
    Committed(FinalizeReport),
}

/// Everything the analysis phase produced.
#[derive(Debug, Default)]
struct AnalysisResults {
    title: Option<String>,
    content_summary: Option<String>,
    word_cloud_summary: Option<String>,
    sentiment_summary: Option<String>,
    vocabulary_summary: Option<String>,
    sentiment: Option<Sentiment>,
    vocabulary: Option<Vocabulary>,
    word_clouds: Vec<WordCloud>,
    failed_steps: Vec<AnalysisStep>,
}

/// Drives finalize for any number of users; calls for one user are serialized.
pub struct SessionFinalizer {
    users: Arc<dyn UserStore>,
    turns: Arc<dyn TurnStore>,
    gateway: Arc<dyn AnalysisGateway>,
    locks: UserLocks,
    parser: TitleSummaryParser,
    calendar: Calendar,
    analysis_timeout: Duration,
    reverted_answers: AtomicU64,
}

impl SessionFinalizer {
    pub fn new(
        users: Arc<dyn UserStore>,
        turns: Arc<dyn TurnStore>,
        gateway: Arc<dyn AnalysisGateway>,
        locks: UserLocks,
    ) -> Self {
        Self {
            users,
            turns,
            gateway,
            locks,
            parser: TitleSummaryParser::default(),
            calendar: Calendar::default(),
            analysis_timeout: Duration::from_secs(120),
            reverted_answers: AtomicU64::new(0),
        }
    }

    pub fn with_parser(mut self, parser: TitleSummaryParser) -> Self {
        self.parser = parser;
        self
    }

    pub fn with_calendar(mut self, calendar: Calendar) -> Self {
        self.calendar = calendar;
        self
    }

    /// Overall budget for the analysis phase of one finalize.
    pub fn with_analysis_timeout(mut self, timeout: Duration) -> Self {
        self.analysis_timeout = timeout;
        self
    }

    /// How many times an answered flag was reverted for lack of a reply.
    pub fn reverted_answers(&self) -> u64 {
        self.reverted_answers.load(Ordering::Relaxed)
    }

    pub async fn finalize_session(&self, user_id: UserId) -> Result<FinalizeOutcome> {
        // Phase 1: content commit.
        let guard = self.locks.lock(user_id).await;

        let turns = self.turns.drain_all(user_id).await?;
        if turns.is_empty() {
            debug!(user_id, "Turn buffer empty, nothing to finalize");
            return Ok(FinalizeOutcome::NoOp {
                reason: NoOpReason::EmptyBuffer,
            });
        }

        let mut user = self.users.find_user(user_id).await?;
        let answer_committed = match reconcile(&mut user, &turns) {
            Reconciliation::Reverted => {
                self.users.save_user(&user).await?;
                let total = self.reverted_answers.fetch_add(1, Ordering::Relaxed) + 1;
                warn!(
                    user_id,
                    answer_reverted = true,
                    reverted_total = total,
                    "Question marked answered but session has no reply; answered flag reverted"
                );
                return Ok(FinalizeOutcome::NoOp {
                    reason: NoOpReason::AnswerReverted,
                });
            }
            Reconciliation::Committed(answer) => {
                info!(user_id, answer = %answer.content, "Answer committed");
                true
            }
            Reconciliation::Untouched => false,
        };

        if turns.len() <= 1 {
            debug!(user_id, "Single turn in buffer, nothing to summarize");
            return Ok(FinalizeOutcome::NoOp {
                reason: NoOpReason::TooShort,
            });
        }

        let turn_count = turns.len();
        let conversation_id = user.allocate_conversation_id();
        let content = ConversationContent::from_turns(conversation_id, turns, Utc::now());
        user.conversation_contents.push(content.clone());
        self.users.save_user(&user).await?;
        self.turns.clear(user_id).await?;
        let age = user.age;
        drop(guard);

        info!(
            user_id,
            conversation_id, turn_count, "Conversation content saved, running analysis"
        );

        // Phase 2: analysis, no lock held.
        let results = self.analyze(&content, age).await;
        if !results.failed_steps.is_empty() {
            warn!(
                user_id,
                conversation_id,
                failed = ?results.failed_steps,
                "Analysis partially failed; committing available fields"
            );
        }

        // Phase 3: analytics commit.
        let _guard = self.locks.lock(user_id).await;
        let mut user = self.users.find_user(user_id).await?;

        let analytics = ConversationAnalytics {
            conversation_id,
            title: results.title,
            content_summary: results.content_summary,
            sentiment_summary: results.sentiment_summary,
            vocabulary_summary: results.vocabulary_summary,
            word_cloud_summary: results.word_cloud_summary,
            sentiment: results.sentiment,
            vocabulary: results.vocabulary,
            word_clouds: results.word_clouds,
            created_at: Utc::now(),
        };
        user.conversation_analytics.push(analytics.clone());
        record_commit(&mut user, &self.calendar, &content, &analytics);
        self.users.save_user(&user).await?;

        info!(
            user_id,
            conversation_id,
            populated = analytics.populated_fields(),
            "Conversation analytics committed"
        );

        Ok(FinalizeOutcome::Committed(FinalizeReport {
            conversation_id,
            turn_count,
            answer_committed,
            failed_steps: results.failed_steps,
            analytics,
        }))
    }

    async fn analyze(&self, content: &ConversationContent, age: u32) -> AnalysisResults {
        let deadline = Instant::now() + self.analysis_timeout;
        let gateway = self.gateway.as_ref();

        let title_call = bounded(
            deadline,
            AnalysisStep::TitleSummary,
            gateway.summarize_title_and_content(content),
        );

        let dependent_calls = async {
            let bulk: Option<ContentAnalysis> = bounded(
                deadline,
                AnalysisStep::ContentAnalysis,
                gateway.analyze_content(content),
            )
            .await;

            let sentiment = bulk.as_ref().and_then(|a| a.sentiment);
            let vocabulary = bulk.as_ref().and_then(|a| a.vocabulary);
            let word_clouds = bulk.as_ref().map(|a| a.word_clouds.clone()).unwrap_or_default();

            let (word_cloud_summary, sentiment_summary, vocabulary_summary) = futures::join!(
                bounded(
                    deadline,
                    AnalysisStep::WordCloud,
                    gateway.summarize_word_cloud(&word_clouds),
                ),
                bounded(
                    deadline,
                    AnalysisStep::Sentiment,
                    gateway.summarize_sentiment(sentiment.as_ref()),
                ),
                bounded(
                    deadline,
                    AnalysisStep::Vocabulary,
                    gateway.summarize_vocabulary(vocabulary.as_ref(), age),
                ),
            );

            (
                bulk.is_some(),
                sentiment,
                vocabulary,
                word_clouds,
                word_cloud_summary,
                sentiment_summary,
                vocabulary_summary,
            )
        };

        let (
            title_reply,
            (
                bulk_ok,
                sentiment,
                vocabulary,
                word_clouds,
                word_cloud_summary,
                sentiment_summary,
                vocabulary_summary,
            ),
        ) = futures::join!(title_call, dependent_calls);

        let mut results = AnalysisResults {
            sentiment,
            vocabulary,
            word_clouds,
            ..Default::default()
        };

        match title_reply.map(|reply| self.parser.parse(&reply)) {
            Some(parsed) if parsed.is_parsed() => {
                results.title = parsed.title;
                results.content_summary = parsed.content_summary;
            }
            Some(_) => {
                warn!("Title/summary reply did not match the expected format");
                results.failed_steps.push(AnalysisStep::TitleSummary);
            }
            None => results.failed_steps.push(AnalysisStep::TitleSummary),
        }
        if !bulk_ok {
            results.failed_steps.push(AnalysisStep::ContentAnalysis);
        }

        results.word_cloud_summary =
            record_step(word_cloud_summary, AnalysisStep::WordCloud, &mut results.failed_steps);
        results.sentiment_summary =
            record_step(sentiment_summary, AnalysisStep::Sentiment, &mut results.failed_steps);
        results.vocabulary_summary =
            record_step(vocabulary_summary, AnalysisStep::Vocabulary, &mut results.failed_steps);

        results
    }
}

/// Run one analysis call against the shared deadline; failures become `None`.
async fn bounded<T, F>(deadline: Instant, step: AnalysisStep, call: F) -> Option<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout_at(deadline, call).await {
        Ok(Ok(value)) => Some(value),
        Ok(Err(e)) => {
            warn!(step = %step, error = %e, "Analysis call failed");
            None
        }
        Err(_) => {
            warn!(step = %step, "Analysis call exceeded the finalize deadline");
            None
        }
    }
}

fn record_step(
    value: Option<String>,
    step: AnalysisStep,
    failed: &mut Vec<AnalysisStep>,
) -> Option<String> {
    if value.is_none() {
        failed.push(step);
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::gateway::testing::ScriptedGateway;
    use crate::models::{QuestionState, Speaker, Turn, User};
    use crate::session::tracker::{create_question, mark_answered};
    use crate::store::{MemoryTurnStore, MemoryUserStore};

    struct Harness {
        users: Arc<MemoryUserStore>,
        turns: Arc<MemoryTurnStore>,
        gateway: Arc<ScriptedGateway>,
        finalizer: Arc<SessionFinalizer>,
    }

    fn harness_with(user: User, gateway: ScriptedGateway, timeout: Duration) -> Harness {
        let users = Arc::new(MemoryUserStore::with_users([user]));
        let turns = Arc::new(MemoryTurnStore::default());
        let gateway = Arc::new(gateway);
        let finalizer = Arc::new(
            SessionFinalizer::new(
                users.clone(),
                turns.clone(),
                gateway.clone(),
                UserLocks::new(),
            )
            .with_analysis_timeout(timeout),
        );
        Harness {
            users,
            turns,
            gateway,
            finalizer,
        }
    }

    fn harness(gateway: ScriptedGateway) -> Harness {
        harness_with(User::new(1, "Mina", 6), gateway, Duration::from_secs(5))
    }

    async fn buffer(h: &Harness, script: &[(Speaker, &str)]) {
        for (i, (speaker, text)) in script.iter().enumerate() {
            h.turns
                .append(1, Turn::new(i as u32, *speaker, *text))
                .await
                .unwrap();
        }
    }

    fn committed(outcome: FinalizeOutcome) -> FinalizeReport {
        match outcome {
            FinalizeOutcome::Committed(report) => report,
            other => panic!("expected commit, got {:?}", other),
        }
    }

    const SESSION: &[(Speaker, &str)] = &[
        (Speaker::Parent, "What did you see at the zoo?"),
        (Speaker::Child, "A big lion!"),
        (Speaker::Parent, "Was it loud?"),
        (Speaker::Child, "Very loud."),
    ];

    #[tokio::test]
    async fn test_full_finalize_commits_everything() {
        let h = harness(ScriptedGateway::default());
        buffer(&h, SESSION).await;

        let report = committed(h.finalizer.finalize_session(1).await.unwrap());
        assert!(!report.is_degraded());
        assert_eq!(report.turn_count, 4);
        assert_eq!(report.analytics.title.as_deref(), Some("Zoo Trip"));
        assert_eq!(
            report.analytics.content_summary.as_deref(),
            Some("We talked about the zoo.")
        );
        assert_eq!(report.analytics.sentiment_summary.as_deref(), Some("Mostly happy"));
        assert_eq!(report.analytics.populated_fields(), 5);
        assert_eq!(report.analytics.word_clouds.len(), 2);

        let user = h.users.find_user(1).await.unwrap();
        assert_eq!(user.conversation_contents.len(), 1);
        assert_eq!(user.conversation_analytics.len(), 1);
        assert_eq!(user.day_analytics.len(), 1);
        assert_eq!(user.week_analytics.len(), 1);
        assert_eq!(user.week_analytics[0].stats.conversation_count, 1);
        assert_eq!(h.gateway.vocabulary_ages(), vec![6]);

        // Buffer cleared.
        assert!(h.turns.drain_all(1).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_second_finalize_is_noop() {
        let h = harness(ScriptedGateway::default());
        buffer(&h, SESSION).await;

        committed(h.finalizer.finalize_session(1).await.unwrap());
        let second = h.finalizer.finalize_session(1).await.unwrap();
        assert!(matches!(
            second,
            FinalizeOutcome::NoOp {
                reason: NoOpReason::EmptyBuffer
            }
        ));

        let user = h.users.find_user(1).await.unwrap();
        assert_eq!(user.conversation_contents.len(), 1);
        assert_eq!(user.conversation_analytics.len(), 1);
    }

    #[tokio::test]
    async fn test_outcome_json_shape() {
        let h = harness(ScriptedGateway::failing(&[AnalysisStep::Sentiment]));
        buffer(&h, SESSION).await;

        let first = h.finalizer.finalize_session(1).await.unwrap();
        let json = serde_json::to_value(&first).unwrap();
        assert_eq!(json["outcome"], "committed");
        assert_eq!(json["conversation_id"], 1);
        assert_eq!(json["failed_steps"], serde_json::json!(["sentiment"]));
        assert_eq!(json["analytics"]["title"], "Zoo Trip");

        let second = h.finalizer.finalize_session(1).await.unwrap();
        let json = serde_json::to_value(&second).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"outcome": "no_op", "reason": "empty_buffer"})
        );
    }

    #[tokio::test]
    async fn test_answer_is_first_child_turn() {
        let mut user = User::new(1, "Mina", 6);
        create_question(&mut user, "What did you see at the zoo?");
        mark_answered(&mut user).unwrap();
        let h = harness_with(user, ScriptedGateway::default(), Duration::from_secs(5));
        buffer(&h, SESSION).await;

        let report = committed(h.finalizer.finalize_session(1).await.unwrap());
        assert!(report.answer_committed);

        let question = h.users.find_user(1).await.unwrap().current_question.unwrap();
        assert_eq!(question.answer.unwrap().content, "A big lion!");
    }

    #[tokio::test]
    async fn test_short_answered_session_reverts_and_aborts() {
        let mut user = User::new(1, "Mina", 6);
        create_question(&mut user, "What did you see at the zoo?");
        mark_answered(&mut user).unwrap();
        let h = harness_with(user, ScriptedGateway::default(), Duration::from_secs(5));
        buffer(&h, &SESSION[..1]).await;

        let outcome = h.finalizer.finalize_session(1).await.unwrap();
        assert!(matches!(
            outcome,
            FinalizeOutcome::NoOp {
                reason: NoOpReason::AnswerReverted
            }
        ));
        assert_eq!(h.finalizer.reverted_answers(), 1);

        let user = h.users.find_user(1).await.unwrap();
        let question = user.current_question.unwrap();
        assert!(!question.answered);
        assert!(question.answer.is_none());
        assert_eq!(question.state(), QuestionState::ActiveUnanswered);
        assert!(user.conversation_contents.is_empty());
        assert!(user.conversation_analytics.is_empty());
        assert!(h.gateway.calls().is_empty());
    }

    #[tokio::test]
    async fn test_single_turn_without_question_is_noop() {
        let h = harness(ScriptedGateway::default());
        buffer(&h, &SESSION[..1]).await;

        let outcome = h.finalizer.finalize_session(1).await.unwrap();
        assert!(matches!(
            outcome,
            FinalizeOutcome::NoOp {
                reason: NoOpReason::TooShort
            }
        ));
        assert!(h.users.find_user(1).await.unwrap().conversation_contents.is_empty());
        assert!(h.gateway.calls().is_empty());
    }

    #[tokio::test]
    async fn test_gateway_failures_degrade_without_losing_content() {
        let h = harness(ScriptedGateway::failing(&[
            AnalysisStep::TitleSummary,
            AnalysisStep::ContentAnalysis,
        ]));
        buffer(&h, SESSION).await;

        let report = committed(h.finalizer.finalize_session(1).await.unwrap());
        assert!(report.is_degraded());
        assert_eq!(
            report.failed_steps,
            vec![AnalysisStep::TitleSummary, AnalysisStep::ContentAnalysis]
        );
        assert!(report.analytics.title.is_none());
        assert!(report.analytics.content_summary.is_none());
        assert!(report.analytics.sentiment.is_none());
        // Summaries still ran, with absent analysis threaded through.
        assert_eq!(report.analytics.sentiment_summary.as_deref(), Some("No clear mood"));
        assert_eq!(h.gateway.sentiments_seen(), vec![None]);

        let user = h.users.find_user(1).await.unwrap();
        assert_eq!(user.conversation_contents.len(), 1);
        assert_eq!(user.conversation_analytics.len(), 1);
    }

    #[tokio::test]
    async fn test_unparseable_title_reply_leaves_fields_unset() {
        let gateway = ScriptedGateway::with_title_reply("A lovely chat about lions");
        let h = harness(gateway);
        buffer(&h, SESSION).await;

        let report = committed(h.finalizer.finalize_session(1).await.unwrap());
        assert!(report.analytics.title.is_none());
        assert!(report.analytics.content_summary.is_none());
        assert_eq!(report.failed_steps, vec![AnalysisStep::TitleSummary]);
        assert!(report.analytics.vocabulary_summary.is_some());
    }

    #[tokio::test]
    async fn test_slow_call_times_out_into_partial_result() {
        let h = harness_with(
            User::new(1, "Mina", 6),
            ScriptedGateway::stalling(&[AnalysisStep::WordCloud]),
            Duration::from_millis(200),
        );
        buffer(&h, SESSION).await;

        let report = committed(h.finalizer.finalize_session(1).await.unwrap());
        assert_eq!(report.failed_steps, vec![AnalysisStep::WordCloud]);
        assert!(report.analytics.word_cloud_summary.is_none());
        assert!(report.analytics.title.is_some());
        assert!(report.analytics.sentiment_summary.is_some());
    }

    #[tokio::test]
    async fn test_concurrent_finalize_creates_one_conversation() {
        let mut user = User::new(1, "Mina", 6);
        create_question(&mut user, "What did you see at the zoo?");
        mark_answered(&mut user).unwrap();
        let h = harness_with(user, ScriptedGateway::default(), Duration::from_secs(5));
        buffer(&h, SESSION).await;

        let a = tokio::spawn({
            let f = h.finalizer.clone();
            async move { f.finalize_session(1).await }
        });
        let b = tokio::spawn({
            let f = h.finalizer.clone();
            async move { f.finalize_session(1).await }
        });
        let outcomes = [a.await.unwrap().unwrap(), b.await.unwrap().unwrap()];

        let commits = outcomes
            .iter()
            .filter(|o| matches!(o, FinalizeOutcome::Committed(_)))
            .count();
        assert_eq!(commits, 1);

        let user = h.users.find_user(1).await.unwrap();
        assert_eq!(user.conversation_contents.len(), 1);
        assert_eq!(user.conversation_analytics.len(), 1);
        assert_eq!(
            user.current_question.unwrap().answer.unwrap().content,
            "A big lion!"
        );
    }

    #[tokio::test]
    async fn test_unknown_user_is_not_found() {
        let h = harness(ScriptedGateway::default());
        h.turns
            .append(2, Turn::new(0, Speaker::Parent, "hello"))
            .await
            .unwrap();

        let err = h.finalizer.finalize_session(2).await.unwrap_err();
        assert!(err.is_not_found());
    }
}
