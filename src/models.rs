//! Data models for the conversation engine.
//!
//! The [`User`] aggregate owns every durable collection (questions,
//! conversation contents, analytics and their day/week roll-ups). Turns
//! live in the separate turn buffer until a session is finalized.

use crate::calendar::WeekKey;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of a user in the stores.
pub type UserId = u64;

/// Who spoke a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    Parent,
    Child,
}

impl fmt::Display for Speaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Speaker::Parent => write!(f, "parent"),
            Speaker::Child => write!(f, "child"),
        }
    }
}

/// One utterance in a live session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub sequence_index: u32,
    pub speaker: Speaker,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

impl Turn {
    pub fn new(sequence_index: u32, speaker: Speaker, text: impl Into<String>) -> Self {
        Self {
            sequence_index,
            speaker,
            text: text.into(),
            timestamp: Utc::now(),
        }
    }
}

/// The child's reply to a question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// Lifecycle position of a question.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuestionState {
    /// Deactivated, or its answer is already committed.
    Inactive,
    ActiveUnanswered,
    /// Marked answered by the conversational layer, answer not yet committed.
    ActiveAnswered,
}

/// A parent question waiting for the child.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    pub content: String,
    pub active: bool,
    pub answered: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer: Option<Answer>,
    pub created_at: DateTime<Utc>,
}

impl Question {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            active: true,
            answered: false,
            answer: None,
            created_at: Utc::now(),
        }
    }

    pub fn state(&self) -> QuestionState {
        if !self.active || self.answer.is_some() {
            QuestionState::Inactive
        } else if self.answered {
            QuestionState::ActiveAnswered
        } else {
            QuestionState::ActiveUnanswered
        }
    }
}

/// The ordered turns of one finalized session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationContent {
    pub conversation_id: u64,
    pub turns: Vec<Turn>,
    pub created_at: DateTime<Utc>,
}

impl ConversationContent {
    /// Orders drained turns by sequence index (stable for equal indices).
    pub fn from_turns(conversation_id: u64, mut turns: Vec<Turn>, created_at: DateTime<Utc>) -> Self {
        turns.sort_by_key(|t| t.sequence_index);
        Self {
            conversation_id,
            turns,
            created_at,
        }
    }

    pub fn child_turn_count(&self) -> usize {
        self.turns
            .iter()
            .filter(|t| t.speaker == Speaker::Child)
            .count()
    }

    /// Plain transcript, one `speaker: text` line per turn.
    pub fn transcript(&self) -> String {
        self.turns
            .iter()
            .map(|t| format!("{}: {}", t.speaker, t.text))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// A word and how often the child used it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WordCloud {
    pub word: String,
    pub count: u32,
}

/// Emotion scores for a conversation (or sums of them in roll-ups).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Sentiment {
    #[serde(default)]
    pub happy: f64,
    #[serde(default)]
    pub sad: f64,
    #[serde(default)]
    pub angry: f64,
    #[serde(default)]
    pub fearful: f64,
    #[serde(default)]
    pub surprised: f64,
}

impl Sentiment {
    pub fn add(&mut self, other: &Sentiment) {
        self.happy += other.happy;
        self.sad += other.sad;
        self.angry += other.angry;
        self.fearful += other.fearful;
        self.surprised += other.surprised;
    }

    pub fn labeled(&self) -> [(&'static str, f64); 5] {
        [
            ("happy", self.happy),
            ("sad", self.sad),
            ("angry", self.angry),
            ("fearful", self.fearful),
            ("surprised", self.surprised),
        ]
    }

    /// Strongest emotion, `None` when every score is zero.
    pub fn dominant(&self) -> Option<&'static str> {
        self.labeled()
            .into_iter()
            .filter(|(_, v)| *v > 0.0)
            .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
            .map(|(label, _)| label)
    }
}

/// Vocabulary counts for a conversation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vocabulary {
    pub total_words: u32,
    pub unique_words: u32,
}

impl Vocabulary {
    pub fn add(&mut self, other: &Vocabulary) {
        // Counts come from the remote analysis service.
        self.total_words = self.total_words.saturating_add(other.total_words);
        self.unique_words = self.unique_words.saturating_add(other.unique_words);
    }

    /// Unique words per word spoken.
    pub fn diversity(&self) -> f64 {
        if self.total_words == 0 {
            0.0
        } else {
            self.unique_words as f64 / self.total_words as f64
        }
    }
}

/// Typed result of the bulk content analysis call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContentAnalysis {
    #[serde(default, alias = "wordClouds")]
    pub word_clouds: Vec<WordCloud>,
    #[serde(default)]
    pub vocabulary: Option<Vocabulary>,
    #[serde(default)]
    pub sentiment: Option<Sentiment>,
}

/// Analytics produced once per finalized session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationAnalytics {
    pub conversation_id: u64,
    pub title: Option<String>,
    pub content_summary: Option<String>,
    pub sentiment_summary: Option<String>,
    pub vocabulary_summary: Option<String>,
    pub word_cloud_summary: Option<String>,
    pub sentiment: Option<Sentiment>,
    pub vocabulary: Option<Vocabulary>,
    #[serde(default)]
    pub word_clouds: Vec<WordCloud>,
    pub created_at: DateTime<Utc>,
}

impl ConversationAnalytics {
    /// Number of the five text fields that were produced.
    pub fn populated_fields(&self) -> usize {
        [
            &self.title,
            &self.content_summary,
            &self.sentiment_summary,
            &self.vocabulary_summary,
            &self.word_cloud_summary,
        ]
        .iter()
        .filter(|f| f.is_some())
        .count()
    }
}

/// Running totals shared by day and week roll-ups.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversationStats {
    pub conversation_count: u32,
    pub turn_count: u32,
    pub child_turn_count: u32,
    pub sentiment: Sentiment,
    pub vocabulary: Vocabulary,
    #[serde(default)]
    pub word_clouds: Vec<WordCloud>,
}

/// Roll-up of one user's conversations on one local calendar day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DayAnalytics {
    pub date: NaiveDate,
    pub created_at: DateTime<Utc>,
    #[serde(flatten)]
    pub stats: ConversationStats,
}

/// Roll-up of one user's conversations in one (year, month, week).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeekAnalytics {
    #[serde(flatten)]
    pub key: WeekKey,
    pub created_at: DateTime<Utc>,
    #[serde(flatten)]
    pub stats: ConversationStats,
}

/// Aggregate root for everything durable about one child.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub age: u32,
    #[serde(default)]
    pub current_question: Option<Question>,
    #[serde(default)]
    pub question_history: Vec<Question>,
    #[serde(default)]
    pub conversation_contents: Vec<ConversationContent>,
    #[serde(default)]
    pub conversation_analytics: Vec<ConversationAnalytics>,
    #[serde(default)]
    pub day_analytics: Vec<DayAnalytics>,
    #[serde(default)]
    pub week_analytics: Vec<WeekAnalytics>,
    #[serde(default)]
    next_conversation_id: u64,
}

impl User {
    pub fn new(id: UserId, name: impl Into<String>, age: u32) -> Self {
        Self {
            id,
            name: name.into(),
            age,
            current_question: None,
            question_history: Vec::new(),
            conversation_contents: Vec::new(),
            conversation_analytics: Vec::new(),
            day_analytics: Vec::new(),
            week_analytics: Vec::new(),
            next_conversation_id: 1,
        }
    }

    /// Allocates the id for the next finalized conversation.
    pub fn allocate_conversation_id(&mut self) -> u64 {
        let id = self.next_conversation_id.max(1);
        self.next_conversation_id = id + 1;
        id
    }

    pub fn conversation_content(&self, conversation_id: u64) -> Option<&ConversationContent> {
        self.conversation_contents
            .iter()
            .find(|c| c.conversation_id == conversation_id)
    }

    pub fn conversation_analytics(&self, conversation_id: u64) -> Option<&ConversationAnalytics> {
        self.conversation_analytics
            .iter()
            .find(|a| a.conversation_id == conversation_id)
    }

    pub fn week_analytics(&self, key: WeekKey) -> Option<&WeekAnalytics> {
        self.week_analytics.iter().find(|w| w.key == key)
    }
}

/// Weekly statistics response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeeklyConversation {
    pub week: WeekAnalytics,
    pub days: Vec<DayAnalytics>,
}

/// One row of the per-day conversation list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationListItem {
    /// 1-based position within the day.
    pub order: usize,
    pub conversation_id: u64,
    pub title: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A conversation's analytics together with its transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationDetail {
    pub analytics: ConversationAnalytics,
    pub turns: Vec<Turn>,
}

/// A question as shown to the parent, with the committed answer if any.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionAndAnswer {
    pub question: String,
    pub active: bool,
    pub answered: bool,
    pub answer: Option<String>,
    pub asked_at: DateTime<Utc>,
}

impl From<&Question> for QuestionAndAnswer {
    fn from(q: &Question) -> Self {
        Self {
            question: q.content.clone(),
            active: q.active,
            answered: q.answered,
            answer: q.answer.as_ref().map(|a| a.content.clone()),
            asked_at: q.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_question_states() {
        let mut q = Question::new("What did you eat today?");
        assert_eq!(q.state(), QuestionState::ActiveUnanswered);

        q.answered = true;
        assert_eq!(q.state(), QuestionState::ActiveAnswered);

        q.answer = Some(Answer {
            content: "Rice".to_string(),
            created_at: Utc::now(),
        });
        assert_eq!(q.state(), QuestionState::Inactive);

        let mut closed = Question::new("Hi?");
        closed.active = false;
        closed.answered = true;
        assert_eq!(closed.state(), QuestionState::Inactive);
    }

    #[test]
    fn test_content_ordering() {
        let turns = vec![
            Turn::new(2, Speaker::Child, "I played"),
            Turn::new(0, Speaker::Parent, "What did you do?"),
        ];
        let content = ConversationContent::from_turns(1, turns, Utc::now());

        assert_eq!(content.turns.len(), 2);
        assert_eq!(content.turns[0].sequence_index, 0);
        assert_eq!(content.child_turn_count(), 1);
        assert_eq!(content.transcript(), "parent: What did you do?\nchild: I played");
    }

    #[test]
    fn test_sentiment_dominant() {
        let mut s = Sentiment {
            happy: 0.2,
            sad: 0.7,
            ..Default::default()
        };
        assert_eq!(s.dominant(), Some("sad"));

        s.add(&Sentiment {
            happy: 1.0,
            ..Default::default()
        });
        assert_eq!(s.dominant(), Some("happy"));
        assert_eq!(Sentiment::default().dominant(), None);
    }

    #[test]
    fn test_vocabulary_diversity() {
        let v = Vocabulary {
            total_words: 40,
            unique_words: 10,
        };
        assert_eq!(v.diversity(), 0.25);
        assert_eq!(Vocabulary::default().diversity(), 0.0);
    }

    #[test]
    fn test_vocabulary_sum_saturates() {
        let mut v = Vocabulary {
            total_words: u32::MAX,
            unique_words: 3,
        };
        v.add(&Vocabulary {
            total_words: 5,
            unique_words: 2,
        });
        assert_eq!(v.total_words, u32::MAX);
        assert_eq!(v.unique_words, 5);
    }

    #[test]
    fn test_conversation_ids_are_sequential() {
        let mut user = User::new(1, "Mina", 6);
        assert_eq!(user.allocate_conversation_id(), 1);
        assert_eq!(user.allocate_conversation_id(), 2);
    }

    #[test]
    fn test_content_analysis_accepts_camel_case_word_clouds() {
        let json = r#"{"wordClouds":[{"word":"dino","count":3}],"sentiment":{"happy":0.9}}"#;
        let analysis: ContentAnalysis = serde_json::from_str(json).unwrap();
        assert_eq!(analysis.word_clouds[0].word, "dino");
        assert_eq!(analysis.sentiment.unwrap().happy, 0.9);
        assert!(analysis.vocabulary.is_none());
    }
}
