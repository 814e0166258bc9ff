//! Title/summary reply parsing.
//!
//! The summarization model answers in the form
//! `<summary delimiter> ... <title delimiter> ...`. The split is strict:
//! each delimiter must appear exactly once, summary before title, with a
//! non-empty title part. Anything else leaves both fields unset. A bad
//! reply never fails a finalize.

pub const DEFAULT_SUMMARY_DELIMITER: &str = "summary:";
pub const DEFAULT_TITLE_DELIMITER: &str = "title:";

/// Parsed fields; `None` when the reply did not match the format.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TitleAndSummary {
    pub title: Option<String>,
    pub content_summary: Option<String>,
}

impl TitleAndSummary {
    pub fn is_parsed(&self) -> bool {
        self.title.is_some() && self.content_summary.is_some()
    }
}

/// Two-delimiter splitter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TitleSummaryParser {
    summary_delimiter: String,
    title_delimiter: String,
}

impl Default for TitleSummaryParser {
    fn default() -> Self {
        Self::new(DEFAULT_SUMMARY_DELIMITER, DEFAULT_TITLE_DELIMITER)
    }
}

impl TitleSummaryParser {
    pub fn new(summary_delimiter: impl Into<String>, title_delimiter: impl Into<String>) -> Self {
        Self {
            summary_delimiter: summary_delimiter.into(),
            title_delimiter: title_delimiter.into(),
        }
    }

    pub fn parse(&self, reply: &str) -> TitleAndSummary {
        if self.summary_delimiter.is_empty() || self.title_delimiter.is_empty() {
            return TitleAndSummary::default();
        }
        if reply.matches(self.title_delimiter.as_str()).count() != 1
            || reply.matches(self.summary_delimiter.as_str()).count() != 1
        {
            return TitleAndSummary::default();
        }

        let Some((head, title)) = reply.split_once(self.title_delimiter.as_str()) else {
            return TitleAndSummary::default();
        };
        let Some((_, summary)) = head.split_once(self.summary_delimiter.as_str()) else {
            // Summary delimiter sits after the title.
            return TitleAndSummary::default();
        };
        if title.is_empty() {
            return TitleAndSummary::default();
        }

        TitleAndSummary {
            title: Some(title.trim().to_string()),
            content_summary: Some(summary.trim().to_string()),
        }
    }
}
