//! Read-side queries over finalized conversations.

use crate::calendar::Calendar;
use crate::error::{Result, TalkieError};
use crate::models::{ConversationDetail, ConversationListItem, User, UserId};
use crate::store::UserStore;
use chrono::NaiveDate;
use std::sync::Arc;

/// Conversations committed on `date` (local calendar), in creation order.
pub fn conversations_on(user: &User, calendar: &Calendar, date: NaiveDate) -> Vec<ConversationListItem> {
    let mut analytics: Vec<_> = user
        .conversation_analytics
        .iter()
        .filter(|a| calendar.local_date(a.created_at) == date)
        .collect();
    analytics.sort_by_key(|a| (a.created_at, a.conversation_id));

    analytics
        .into_iter()
        .enumerate()
        .map(|(i, a)| ConversationListItem {
            order: i + 1,
            conversation_id: a.conversation_id,
            title: a.title.clone(),
            created_at: a.created_at,
        })
        .collect()
}

pub fn conversation_detail(user: &User, conversation_id: u64) -> Result<ConversationDetail> {
    let analytics = user
        .conversation_analytics(conversation_id)
        .ok_or_else(|| TalkieError::not_found("conversation", conversation_id))?;
    let turns = user
        .conversation_content(conversation_id)
        .map(|c| c.turns.clone())
        .unwrap_or_default();

    Ok(ConversationDetail {
        analytics: analytics.clone(),
        turns,
    })
}

/// The content summary; `None` when analysis could not produce one.
pub fn conversation_summary(user: &User, conversation_id: u64) -> Result<Option<String>> {
    user.conversation_analytics(conversation_id)
        .map(|a| a.content_summary.clone())
        .ok_or_else(|| TalkieError::not_found("conversation", conversation_id))
}

/// Store-backed wrapper around the history queries.
pub struct ConversationHistory {
    users: Arc<dyn UserStore>,
    calendar: Calendar,
}

impl ConversationHistory {
    pub fn new(users: Arc<dyn UserStore>, calendar: Calendar) -> Self {
        Self { users, calendar }
    }

    pub async fn list(&self, user_id: UserId, date: NaiveDate) -> Result<Vec<ConversationListItem>> {
        let user = self.users.find_user(user_id).await?;
        Ok(conversations_on(&user, &self.calendar, date))
    }

    pub async fn detail(&self, user_id: UserId, conversation_id: u64) -> Result<ConversationDetail> {
        let user = self.users.find_user(user_id).await?;
        conversation_detail(&user, conversation_id)
    }

    pub async fn summary(&self, user_id: UserId, conversation_id: u64) -> Result<Option<String>> {
        let user = self.users.find_user(user_id).await?;
        conversation_summary(&user, conversation_id)
    }
}
