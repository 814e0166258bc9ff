//! Question/answer state machine.
//!
//! Each user has at most one current question. Creating a new one moves
//! the previous question into an append-only history; only the current
//! question is ever mutated.
//!
//! ```text
//! Inactive --create--> ActiveUnanswered --mark_answered--> ActiveAnswered
//! ActiveAnswered --finalize, >= 2 turns--> answer committed (Inactive)
//! ActiveAnswered --finalize, <= 1 turn --> answered flag reverted
//! ```

use super::locks::UserLocks;
use crate::error::{Result, TalkieError};
use crate::models::{
    Answer, Question, QuestionAndAnswer, QuestionState, Speaker, Turn, User, UserId,
};
use crate::store::UserStore;
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info};

/// What finalize did to the current question.
#[derive(Debug, Clone, PartialEq)]
pub enum Reconciliation {
    /// The question was not waiting for an answer commit.
    Untouched,
    /// The first child reply was attached as the answer.
    Committed(Answer),
    /// Marked answered but the session holds no reply; flag cleared.
    Reverted,
}

/// Replace the current question with a new active one.
pub fn create_question(user: &mut User, content: impl Into<String>) {
    let question = Question::new(content);
    if let Some(previous) = user.current_question.replace(question) {
        user.question_history.push(previous);
    }
}

pub fn update_question(user: &mut User, content: impl Into<String>) -> Result<()> {
    let question = current_mut(user)?;
    question.content = content.into();
    Ok(())
}

/// Drop the current question. History is kept.
pub fn delete_question(user: &mut User) -> Result<Question> {
    user.current_question
        .take()
        .ok_or_else(|| TalkieError::not_found("question", user.id))
}

/// ActiveUnanswered -> ActiveAnswered.
pub fn mark_answered(user: &mut User) -> Result<()> {
    let question = current_mut(user)?;
    if question.state() == QuestionState::ActiveUnanswered {
        question.answered = true;
    }
    Ok(())
}

/// History oldest first, then the current question.
pub fn question_answers(user: &User) -> Vec<QuestionAndAnswer> {
    user.question_history
        .iter()
        .chain(user.current_question.iter())
        .map(QuestionAndAnswer::from)
        .collect()
}

/// Apply the answer-commit rule for a finalizing session.
///
/// `turns` is the drained buffer in order; index 0 is the initiating prompt.
pub fn reconcile(user: &mut User, turns: &[Turn]) -> Reconciliation {
    let Some(question) = user.current_question.as_mut() else {
        return Reconciliation::Untouched;
    };
    if question.state() != QuestionState::ActiveAnswered {
        return Reconciliation::Untouched;
    }

    if turns.len() <= 1 {
        question.answered = false;
        return Reconciliation::Reverted;
    }

    match first_child_reply(turns) {
        Some(reply) => {
            let answer = Answer {
                content: reply.text.clone(),
                created_at: Utc::now(),
            };
            question.answer = Some(answer.clone());
            Reconciliation::Committed(answer)
        }
        None => Reconciliation::Untouched,
    }
}

/// First child turn after the prompt; the second turn when no child spoke.
fn first_child_reply(turns: &[Turn]) -> Option<&Turn> {
    turns
        .iter()
        .skip(1)
        .find(|t| t.speaker == Speaker::Child)
        .or_else(|| turns.get(1))
}

fn current_mut(user: &mut User) -> Result<&mut Question> {
    let id = user.id;
    user.current_question
        .as_mut()
        .ok_or_else(|| TalkieError::not_found("question", id))
}

/// Question operations against the user store, serialized per user.
pub struct QuestionService {
    users: Arc<dyn UserStore>,
    locks: UserLocks,
}

impl QuestionService {
    pub fn new(users: Arc<dyn UserStore>, locks: UserLocks) -> Self {
        Self { users, locks }
    }

    pub async fn create(&self, user_id: UserId, content: &str) -> Result<()> {
        self.mutate(user_id, |user| {
            create_question(user, content);
            Ok(())
        })
        .await?;
        info!(user_id, "Question created");
        Ok(())
    }

    pub async fn update(&self, user_id: UserId, content: &str) -> Result<()> {
        self.mutate(user_id, |user| update_question(user, content))
            .await
    }

    pub async fn delete(&self, user_id: UserId) -> Result<()> {
        self.mutate(user_id, |user| delete_question(user).map(|_| ()))
            .await?;
        info!(user_id, "Question deleted");
        Ok(())
    }

    pub async fn mark_answered(&self, user_id: UserId) -> Result<()> {
        self.mutate(user_id, mark_answered).await
    }

    pub async fn list(&self, user_id: UserId) -> Result<Vec<QuestionAndAnswer>> {
        let user = self.users.find_user(user_id).await?;
        Ok(question_answers(&user))
    }

    async fn mutate<F>(&self, user_id: UserId, apply: F) -> Result<()>
    where
        F: FnOnce(&mut User) -> Result<()>,
    {
        let _guard = self.locks.lock(user_id).await;
        let mut user = self.users.find_user(user_id).await?;
        apply(&mut user)?;
        self.users.save_user(&user).await?;
        debug!(user_id, "Question state saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryUserStore;

    fn answered_user() -> User {
        let mut user = User::new(1, "Mina", 6);
        create_question(&mut user, "What made you laugh today?");
        mark_answered(&mut user).unwrap();
        user
    }

    fn turns(script: &[(Speaker, &str)]) -> Vec<Turn> {
        script.iter()
            .enumerate()
            .map(|(i, (speaker, text))| Turn::new(i as u32, *speaker, *text))
            .collect()
    }

    #[test]
    fn test_new_question_replaces_current() {
        let mut user = User::new(1, "Mina", 6);
        create_question(&mut user, "first");
        create_question(&mut user, "second");

        assert_eq!(user.current_question.as_ref().unwrap().content, "second");
        assert_eq!(user.question_history.len(), 1);
        assert_eq!(user.question_history[0].content, "first");

        let listed = question_answers(&user);
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[1].question, "second");
    }

    #[test]
    fn test_commit_uses_first_child_reply() {
        let mut user = answered_user();
        let session = turns(&[
            (Speaker::Parent, "What made you laugh today?"),
            (Speaker::Parent, "Take your time."),
            (Speaker::Child, "The puppy!"),
            (Speaker::Child, "It jumped."),
        ]);

        let outcome = reconcile(&mut user, &session);

        match outcome {
            Reconciliation::Committed(answer) => assert_eq!(answer.content, "The puppy!"),
            other => panic!("expected commit, got {:?}", other),
        }
        let question = user.current_question.as_ref().unwrap();
        assert_eq!(question.answer.as_ref().unwrap().content, "The puppy!");
        assert_eq!(question.state(), QuestionState::Inactive);
    }

    #[test]
    fn test_answer_is_attached_once() {
        let mut user = answered_user();
        let session = turns(&[(Speaker::Parent, "Q"), (Speaker::Child, "A1")]);
        assert!(matches!(
            reconcile(&mut user, &session),
            Reconciliation::Committed(_)
        ));

        let later = turns(&[(Speaker::Parent, "Q"), (Speaker::Child, "A2")]);
        assert_eq!(reconcile(&mut user, &later), Reconciliation::Untouched);
        assert_eq!(
            user.current_question.unwrap().answer.unwrap().content,
            "A1"
        );
    }

    #[test]
    fn test_short_session_reverts_answered_flag() {
        let mut user = answered_user();
        let session = turns(&[(Speaker::Parent, "What made you laugh today?")]);

        assert_eq!(reconcile(&mut user, &session), Reconciliation::Reverted);

        let question = user.current_question.as_ref().unwrap();
        assert!(!question.answered);
        assert!(question.answer.is_none());
        assert_eq!(question.state(), QuestionState::ActiveUnanswered);
    }

    #[test]
    fn test_unanswered_question_is_untouched() {
        let mut user = User::new(1, "Mina", 6);
        create_question(&mut user, "Q");
        let session = turns(&[(Speaker::Parent, "Q")]);

        assert_eq!(reconcile(&mut user, &session), Reconciliation::Untouched);
        assert_eq!(
            user.current_question.unwrap().state(),
            QuestionState::ActiveUnanswered
        );
    }

    #[test]
    fn test_missing_question_operations_are_not_found() {
        let mut user = User::new(1, "Mina", 6);
        assert!(update_question(&mut user, "x").unwrap_err().is_not_found());
        assert!(delete_question(&mut user).unwrap_err().is_not_found());
        assert!(mark_answered(&mut user).unwrap_err().is_not_found());
        assert_eq!(reconcile(&mut user, &[]), Reconciliation::Untouched);
    }

    #[tokio::test]
    async fn test_service_persists_changes() {
        let store = Arc::new(MemoryUserStore::with_users([User::new(9, "Jun", 5)]));
        let service = QuestionService::new(store.clone(), UserLocks::new());

        service.create(9, "Who did you play with?").await.unwrap();
        service.update(9, "Who did you play with today?").await.unwrap();
        service.mark_answered(9).await.unwrap();

        let user = store.find_user(9).await.unwrap();
        let question = user.current_question.unwrap();
        assert_eq!(question.content, "Who did you play with today?");
        assert!(question.answered);

        service.delete(9).await.unwrap();
        assert!(service.list(9).await.unwrap().is_empty());
        assert!(service.delete(9).await.unwrap_err().is_not_found());
        assert!(service.create(10, "?").await.unwrap_err().is_not_found());
    }
}
