//! Day/week roll-ups and the weekly statistics query.
//!
//! Every committed conversation is folded into the user's DayAnalytics for
//! its local date and the WeekAnalytics for its `(year, month, week)`.
//! Weekly queries must name a range inside one such week.

use crate::calendar::{Calendar, WeekKey};
use crate::error::{Result, TalkieError};
use crate::models::{
    ConversationAnalytics, ConversationContent, ConversationStats, DayAnalytics, User, UserId,
    WeekAnalytics, WeeklyConversation, WordCloud,
};
use crate::store::UserStore;
use chrono::NaiveDate;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Word-cloud entries kept per roll-up.
pub const MAX_WORD_CLOUD_ENTRIES: usize = 30;

/// Fold one committed conversation into the user's day and week roll-ups.
pub fn record_commit(
    user: &mut User,
    calendar: &Calendar,
    content: &ConversationContent,
    analytics: &ConversationAnalytics,
) {
    let date = calendar.local_date(analytics.created_at);
    let key = calendar.week_key(date);

    match user.day_analytics.iter_mut().find(|d| d.date == date) {
        Some(day) => absorb(&mut day.stats, content, analytics),
        None => {
            let mut day = DayAnalytics {
                date,
                created_at: analytics.created_at,
                stats: ConversationStats::default(),
            };
            absorb(&mut day.stats, content, analytics);
            user.day_analytics.push(day);
        }
    }

    match user.week_analytics.iter_mut().find(|w| w.key == key) {
        Some(week) => absorb(&mut week.stats, content, analytics),
        None => {
            let mut week = WeekAnalytics {
                key,
                created_at: analytics.created_at,
                stats: ConversationStats::default(),
            };
            absorb(&mut week.stats, content, analytics);
            user.week_analytics.push(week);
        }
    }

    debug!(user_id = user.id, %date, week = %key, "Roll-ups updated");
}

fn absorb(
    stats: &mut ConversationStats,
    content: &ConversationContent,
    analytics: &ConversationAnalytics,
) {
    stats.conversation_count = stats.conversation_count.saturating_add(1);
    stats.turn_count = stats.turn_count.saturating_add(saturating_u32(content.turns.len()));
    stats.child_turn_count = stats
        .child_turn_count
        .saturating_add(saturating_u32(content.child_turn_count()));
    if let Some(sentiment) = &analytics.sentiment {
        stats.sentiment.add(sentiment);
    }
    if let Some(vocabulary) = &analytics.vocabulary {
        stats.vocabulary.add(vocabulary);
    }
    stats.word_clouds = merge_word_clouds(&stats.word_clouds, &analytics.word_clouds);
}

fn saturating_u32(n: usize) -> u32 {
    u32::try_from(n).unwrap_or(u32::MAX)
}

/// Sum counts per word, keep the most frequent (ties broken alphabetically).
pub fn merge_word_clouds(existing: &[WordCloud], incoming: &[WordCloud]) -> Vec<WordCloud> {
    let mut counts: HashMap<&str, u32> = HashMap::new();
    for entry in existing.iter().chain(incoming) {
        let count = counts.entry(entry.word.as_str()).or_default();
        *count = count.saturating_add(entry.count);
    }

    let mut merged: Vec<WordCloud> = counts
        .into_iter()
        .map(|(word, count)| WordCloud {
            word: word.to_string(),
            count,
        })
        .collect();
    merged.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.word.cmp(&b.word)));
    merged.truncate(MAX_WORD_CLOUD_ENTRIES);
    merged
}

/// Get the top N words of a roll-up.
pub fn top_words(stats: &ConversationStats, n: usize) -> Vec<&WordCloud> {
    stats.word_clouds.iter().take(n).collect()
}

/// Day with the most conversations (earliest on ties).
pub fn busiest_day(days: &[DayAnalytics]) -> Option<&DayAnalytics> {
    days.iter().max_by(|a, b| {
        a.stats
            .conversation_count
            .cmp(&b.stats.conversation_count)
            .then_with(|| b.date.cmp(&a.date))
    })
}

/// Share of each emotion in the summed scores, highest first.
pub fn sentiment_distribution(stats: &ConversationStats) -> Vec<(&'static str, f64)> {
    let labeled = stats.sentiment.labeled();
    let total: f64 = labeled.iter().map(|(_, v)| v).sum();
    if total <= 0.0 {
        return Vec::new();
    }

    let mut shares: Vec<_> = labeled
        .into_iter()
        .map(|(label, v)| (label, v / total))
        .collect();
    shares.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    shares
}

/// Resolve a weekly query against one user's aggregate.
///
/// Start and end must share `(year, month, week)`. Days are matched by
/// their own date's key, never by the query range.
pub fn weekly_view(
    user: &User,
    calendar: &Calendar,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<WeeklyConversation> {
    let key = aligned_week(calendar, start, end)?;

    let week = user
        .week_analytics(key)
        .cloned()
        .ok_or(TalkieError::NoWeeklyData {
            year: key.year,
            month: key.month,
            week: key.week,
        })?;

    let mut days: Vec<DayAnalytics> = user
        .day_analytics
        .iter()
        .filter(|d| calendar.week_key(d.date) == key)
        .cloned()
        .collect();
    days.sort_by_key(|d| d.date);

    Ok(WeeklyConversation { week, days })
}

/// The shared week key, or `RangeNotAligned`.
pub fn aligned_week(calendar: &Calendar, start: NaiveDate, end: NaiveDate) -> Result<WeekKey> {
    if !calendar.same_week(start, end) {
        return Err(TalkieError::RangeNotAligned { start, end });
    }
    Ok(calendar.week_key(end))
}

/// Weekly statistics over the user store.
pub struct TemporalAggregator {
    users: Arc<dyn UserStore>,
    calendar: Calendar,
}

impl TemporalAggregator {
    pub fn new(users: Arc<dyn UserStore>, calendar: Calendar) -> Self {
        Self { users, calendar }
    }

    /// Validation runs before the user lookup, so a misaligned range is
    /// rejected whatever data exists.
    pub async fn weekly_conversation(
        &self,
        user_id: UserId,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<WeeklyConversation> {
        aligned_week(&self.calendar, start, end)?;
        let user = self.users.find_user(user_id).await?;
        weekly_view(&user, &self.calendar, start, end)
    }
}
