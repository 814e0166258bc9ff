//! HTTP implementation of the analysis gateway.
//!
//! The four summaries are prompts sent to an Ollama chat endpoint. The bulk
//! word-cloud/vocabulary/sentiment extraction is a JSON POST to a separate
//! analysis service.

use super::gateway::AnalysisGateway;
use super::parser::{DEFAULT_SUMMARY_DELIMITER, DEFAULT_TITLE_DELIMITER};
use crate::error::{Result, TalkieError};
use crate::models::{
    ContentAnalysis, ConversationContent, Sentiment, Turn, Vocabulary, WordCloud,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

/// Configuration for the analysis client.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub llm_url: String,
    pub model_name: String,
    pub temperature: f32,
    pub analysis_url: String,
    /// Per-request timeout.
    pub timeout_seconds: u64,
    pub summary_delimiter: String,
    pub title_delimiter: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            llm_url: "http://localhost:11434".to_string(),
            model_name: "llama3.2:latest".to_string(),
            temperature: 0.3,
            analysis_url: "http://localhost:8000/analyze".to_string(),
            timeout_seconds: 60,
            summary_delimiter: DEFAULT_SUMMARY_DELIMITER.to_string(),
            title_delimiter: DEFAULT_TITLE_DELIMITER.to_string(),
        }
    }
}

/// Message in an Ollama chat request.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

/// Ollama chat API request.
#[derive(Debug, Serialize)]
struct OllamaChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f32,
}

/// Ollama chat API response.
#[derive(Debug, Deserialize)]
struct OllamaChatResponse {
    message: ChatMessage,
}

/// Bulk analysis request body.
#[derive(Debug, Serialize)]
struct ContentAnalysisRequest<'a> {
    conversation: &'a [Turn],
}

/// Talks to Ollama and the content analysis service.
pub struct HttpAnalysisClient {
    config: ClientConfig,
    http_client: reqwest::Client,
}

impl HttpAnalysisClient {
    pub fn new(config: ClientConfig) -> Result<Self> {
        info!(
            "Initializing analysis client with model {} at {}",
            config.model_name, config.llm_url
        );

        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| TalkieError::transport(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            config,
            http_client,
        })
    }

    /// Send one system+user prompt and return the reply text.
    async fn send_prompt(&self, system: &str, prompt: String) -> Result<String> {
        let url = format!("{}/api/chat", self.config.llm_url.trim_end_matches('/'));

        let request = OllamaChatRequest {
            model: self.config.model_name.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: system.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: prompt,
                },
            ],
            stream: false,
            options: OllamaOptions {
                temperature: self.config.temperature,
            },
        };

        debug!("Sending summary prompt to {}", url);

        let response = self
            .http_client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| self.describe_send_error(e, &self.config.llm_url))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(TalkieError::invalid_response(format!(
                "Ollama API error {}: {}",
                status, body
            )));
        }

        let chat_response: OllamaChatResponse = response.json().await.map_err(|e| {
            TalkieError::invalid_response(format!("Failed to parse Ollama response: {}", e))
        })?;

        Ok(chat_response.message.content)
    }

    fn describe_send_error(&self, e: reqwest::Error, endpoint: &str) -> TalkieError {
        if e.is_timeout() {
            TalkieError::transport(format!(
                "Request timed out after {}s",
                self.config.timeout_seconds
            ))
        } else if e.is_connect() {
            TalkieError::transport(format!("Cannot connect to {}", endpoint))
        } else {
            TalkieError::transport(format!("Failed to send request: {}", e))
        }
    }
}

#[async_trait]
impl AnalysisGateway for HttpAnalysisClient {
    async fn summarize_title_and_content(&self, content: &ConversationContent) -> Result<String> {
        let prompt = title_summary_prompt(
            content,
            &self.config.summary_delimiter,
            &self.config.title_delimiter,
        );
        self.send_prompt(SUMMARY_SYSTEM_PROMPT, prompt).await
    }

    async fn summarize_word_cloud(&self, word_clouds: &[WordCloud]) -> Result<String> {
        self.send_prompt(SUMMARY_SYSTEM_PROMPT, word_cloud_prompt(word_clouds))
            .await
    }

    async fn summarize_sentiment(&self, sentiment: Option<&Sentiment>) -> Result<String> {
        self.send_prompt(SUMMARY_SYSTEM_PROMPT, sentiment_prompt(sentiment))
            .await
    }

    async fn summarize_vocabulary(
        &self,
        vocabulary: Option<&Vocabulary>,
        age: u32,
    ) -> Result<String> {
        self.send_prompt(SUMMARY_SYSTEM_PROMPT, vocabulary_prompt(vocabulary, age))
            .await
    }

    async fn analyze_content(&self, content: &ConversationContent) -> Result<ContentAnalysis> {
        let request = ContentAnalysisRequest {
            conversation: &content.turns,
        };

        let response = self
            .http_client
            .post(&self.config.analysis_url)
            .json(&request)
            .send()
            .await
            .map_err(|e| self.describe_send_error(e, &self.config.analysis_url))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(TalkieError::invalid_response(format!(
                "Analysis service error {}: {}",
                status, body
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| TalkieError::transport(format!("Failed to read analysis body: {}", e)))?;
        debug!("Content analysis response: {}", body);

        serde_json::from_str(&body).map_err(|e| {
            TalkieError::invalid_response(format!("Failed to parse content analysis: {}", e))
        })
    }
}

fn title_summary_prompt(
    content: &ConversationContent,
    summary_delimiter: &str,
    title_delimiter: &str,
) -> String {
    let mut prompt = String::new();
    prompt.push_str("Summarize the following conversation between a parent and a child.\n");
    prompt.push_str("Reply in exactly this format and nothing else:\n");
    prompt.push_str(&format!(
        "{} <two or three sentences> {} <short title>\n\n",
        summary_delimiter, title_delimiter
    ));
    prompt.push_str("=== CONVERSATION ===\n");
    prompt.push_str(&content.transcript());
    prompt.push_str("\n=== END OF CONVERSATION ===\n");
    prompt
}

fn word_cloud_prompt(word_clouds: &[WordCloud]) -> String {
    if word_clouds.is_empty() {
        return "No frequent words were recorded for this conversation. \
                Say briefly that the child's interests could not be determined."
            .to_string();
    }

    let words = word_clouds
        .iter()
        .map(|w| format!("{} ({})", w.word, w.count))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "These are the words the child used most, with counts: {}.\n\
         Describe in two sentences what the child seems interested in.",
        words
    )
}

fn sentiment_prompt(sentiment: Option<&Sentiment>) -> String {
    let Some(sentiment) = sentiment else {
        return "No emotion scores were recorded for this conversation. \
                Say briefly that the child's mood could not be determined."
            .to_string();
    };

    let scores = sentiment
        .labeled()
        .iter()
        .map(|(label, score)| format!("{}: {:.2}", label, score))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "Emotion scores for the child in this conversation: {}.\n\
         Describe the child's mood in two warm sentences for a parent.",
        scores
    )
}

fn vocabulary_prompt(vocabulary: Option<&Vocabulary>, age: u32) -> String {
    match vocabulary {
        Some(v) => format!(
            "A {}-year-old child used {} words, {} of them distinct.\n\
             Comment in two sentences on this vocabulary compared with what is typical at that age.",
            age, v.total_words, v.unique_words
        ),
        None => format!(
            "No vocabulary counts were recorded for a {}-year-old child's conversation. \
             Say briefly that vocabulary could not be assessed this time.",
            age
        ),
    }
}

const SUMMARY_SYSTEM_PROMPT: &str = r#"You help parents understand conversations with their young child.
Write short, kind, plain sentences. Never invent details that are not in the input.
Follow any requested output format exactly."#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Speaker;
    use chrono::Utc;

    #[test]
    fn test_client_config_default() {
        let config = ClientConfig::default();
        assert_eq!(config.model_name, "llama3.2:latest");
        assert_eq!(config.summary_delimiter, "summary:");
        assert_eq!(config.title_delimiter, "title:");
    }

    #[test]
    fn test_title_prompt_names_delimiters_and_transcript() {
        let content = ConversationContent::from_turns(
            1,
            vec![
                Turn::new(0, Speaker::Parent, "How was school?"),
                Turn::new(1, Speaker::Child, "Fun!"),
            ],
            Utc::now(),
        );
        let prompt = title_summary_prompt(&content, "summary:", "title:");
        assert!(prompt.contains("summary: <two or three sentences> title: <short title>"));
        assert!(prompt.contains("child: Fun!"));
    }

    #[test]
    fn test_vocabulary_prompt_includes_age() {
        let v = Vocabulary {
            total_words: 50,
            unique_words: 30,
        };
        assert!(vocabulary_prompt(Some(&v), 5).contains("5-year-old"));
        assert!(vocabulary_prompt(None, 7).contains("7-year-old"));
    }

    #[test]
    fn test_absent_inputs_produce_fallback_prompts() {
        assert!(sentiment_prompt(None).contains("could not be determined"));
        assert!(word_cloud_prompt(&[]).contains("could not be determined"));
        let words = [WordCloud {
            word: "robot".to_string(),
            count: 4,
        }];
        assert!(word_cloud_prompt(&words).contains("robot (4)"));
    }

    #[tokio::test]
    async fn test_unreachable_service_is_transport_error() {
        let client = HttpAnalysisClient::new(ClientConfig {
            llm_url: "http://127.0.0.1:9".to_string(),
            analysis_url: "http://127.0.0.1:9/analyze".to_string(),
            timeout_seconds: 5,
            ..Default::default()
        })
        .unwrap();

        let err = client.summarize_sentiment(None).await.unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Transport);
    }
}
