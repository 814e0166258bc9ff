//! The analysis service seam.

use crate::error::Result;
use crate::models::{ContentAnalysis, ConversationContent, Sentiment, Vocabulary, WordCloud};
use async_trait::async_trait;
use serde::Serialize;
use std::fmt;

/// One remote call made while finalizing a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisStep {
    TitleSummary,
    ContentAnalysis,
    WordCloud,
    Sentiment,
    Vocabulary,
}

impl fmt::Display for AnalysisStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnalysisStep::TitleSummary => write!(f, "title/summary"),
            AnalysisStep::ContentAnalysis => write!(f, "content analysis"),
            AnalysisStep::WordCloud => write!(f, "word cloud summary"),
            AnalysisStep::Sentiment => write!(f, "sentiment summary"),
            AnalysisStep::Vocabulary => write!(f, "vocabulary summary"),
        }
    }
}

/// Remote analysis of a finished conversation.
///
/// Every call is independent and may fail on its own; callers treat a
/// failure as a missing field, not as a failed session.
#[async_trait]
pub trait AnalysisGateway: Send + Sync {
    /// Raw `summary: ... title: ...` reply for the conversation.
    async fn summarize_title_and_content(&self, content: &ConversationContent) -> Result<String>;

    async fn summarize_word_cloud(&self, word_clouds: &[WordCloud]) -> Result<String>;

    async fn summarize_sentiment(&self, sentiment: Option<&Sentiment>) -> Result<String>;

    /// `age` sets the level the summary is written against.
    async fn summarize_vocabulary(&self, vocabulary: Option<&Vocabulary>, age: u32)
        -> Result<String>;

    /// Bulk word-cloud/vocabulary/sentiment extraction.
    async fn analyze_content(&self, content: &ConversationContent) -> Result<ContentAnalysis>;
}
