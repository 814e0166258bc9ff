//! Weekly report generation.
//!
//! Renders a [`WeeklyConversation`] as Markdown for parents, or as JSON
//! for the upstream request layer.

use crate::analysis::aggregator::{busiest_day, sentiment_distribution, top_words};
use crate::models::{ConversationStats, DayAnalytics, WeekAnalytics, WeeklyConversation};
use anyhow::Result;

/// Words listed in the interests section.
const TOP_WORDS: usize = 10;

/// Generate a complete Markdown weekly report.
pub fn generate_markdown_report(weekly: &WeeklyConversation, child_name: &str) -> String {
    let mut output = String::new();

    output.push_str(&format!("# Weekly Conversations: {}\n\n", child_name));
    output.push_str(&generate_overview_section(&weekly.week, &weekly.days));
    output.push_str(&generate_sentiment_section(&weekly.week.stats));
    output.push_str(&generate_vocabulary_section(&weekly.week.stats));
    output.push_str(&generate_interests_section(&weekly.week.stats));
    output.push_str(&generate_frequency_section(&weekly.days));
    output.push_str(&generate_footer());

    output
}

/// Generate the overview section.
fn generate_overview_section(week: &WeekAnalytics, days: &[DayAnalytics]) -> String {
    let mut section = String::new();

    section.push_str("## Overview\n\n");
    section.push_str(&format!("- **Week:** {}\n", week.key));
    section.push_str(&format!(
        "- **Conversations:** {}\n",
        week.stats.conversation_count
    ));
    section.push_str(&format!(
        "- **Turns:** {} ({} by the child)\n",
        week.stats.turn_count, week.stats.child_turn_count
    ));
    section.push_str(&format!("- **Days with conversations:** {}\n", days.len()));
    if let Some(day) = busiest_day(days) {
        section.push_str(&format!(
            "- **Busiest day:** {} ({} conversations)\n",
            day.date.format("%Y-%m-%d (%a)"),
            day.stats.conversation_count
        ));
    }
    section.push('\n');

    section
}

/// Generate the sentiment section.
fn generate_sentiment_section(stats: &ConversationStats) -> String {
    let mut section = String::new();

    section.push_str("## Emotions\n\n");

    let shares = sentiment_distribution(stats);
    if shares.is_empty() {
        section.push_str("No emotion data was recorded this week.\n\n");
        return section;
    }

    if let Some(mood) = stats.sentiment.dominant() {
        section.push_str(&format!("Mostly **{}** this week.\n\n", mood));
    }

    section.push_str("| Emotion | Share |\n");
    section.push_str("|:---|:---:|\n");
    for (label, share) in shares {
        section.push_str(&format!("| {} | {:.0}% |\n", label, share * 100.0));
    }
    section.push('\n');

    section
}

/// Generate the vocabulary section.
fn generate_vocabulary_section(stats: &ConversationStats) -> String {
    let mut section = String::new();

    section.push_str("## Vocabulary\n\n");

    let vocabulary = &stats.vocabulary;
    if vocabulary.total_words == 0 {
        section.push_str("No vocabulary data was recorded this week.\n\n");
        return section;
    }

    section.push_str(&format!("- **Words spoken:** {}\n", vocabulary.total_words));
    section.push_str(&format!("- **Distinct words:** {}\n", vocabulary.unique_words));
    section.push_str(&format!(
        "- **Diversity:** {:.2}\n\n",
        vocabulary.diversity()
    ));

    section
}

/// Generate the interests (word cloud) section.
fn generate_interests_section(stats: &ConversationStats) -> String {
    let mut section = String::new();

    section.push_str("## Interests\n\n");

    let words = top_words(stats, TOP_WORDS);
    if words.is_empty() {
        section.push_str("No frequent words were recorded this week.\n\n");
        return section;
    }

    section.push_str("| Word | Count |\n");
    section.push_str("|:---|:---:|\n");
    for word in words {
        section.push_str(&format!("| {} | {} |\n", word.word, word.count));
    }
    section.push('\n');

    section
}

/// Generate the per-day conversation frequency section.
fn generate_frequency_section(days: &[DayAnalytics]) -> String {
    let mut section = String::new();

    section.push_str("## Conversation Frequency\n\n");

    if days.is_empty() {
        section.push_str("No daily statistics were recorded this week.\n\n");
        return section;
    }

    section.push_str("| Day | Conversations | Child turns |\n");
    section.push_str("|:---|:---:|:---:|\n");
    for day in days {
        section.push_str(&format!(
            "| {} | {} | {} |\n",
            day.date.format("%m-%d (%a)"),
            day.stats.conversation_count,
            day.stats.child_turn_count
        ));
    }
    section.push('\n');

    section
}

/// Generate the report footer.
fn generate_footer() -> String {
    "---\n\n*Report generated by talkie*\n".to_string()
}

/// Generate a JSON report.
pub fn generate_json_report(weekly: &WeeklyConversation) -> Result<String> {
    serde_json::to_string_pretty(weekly).map_err(Into::into)
}
