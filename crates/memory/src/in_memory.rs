//! In-process [`ConversationMemory`](crate::provider::ConversationMemory),
//! used when no `redis_url` is configured and in tests. Grounded in the
//! gateway's own `SessionStore` (`RwLock<HashMap<..>>` over a shared map).

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use sa_domain::error::Result;
use sa_domain::model::{ConversationState, HistoryItem};

use crate::provider::ConversationMemory;

#[derive(Default)]
pub struct InMemoryConversationMemory {
    states: RwLock<HashMap<String, ConversationState>>,
    history: RwLock<HashMap<String, Vec<HistoryItem>>>,
}

impl InMemoryConversationMemory {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConversationMemory for InMemoryConversationMemory {
    async fn get_state(&self, conversation_id: &str) -> Result<ConversationState> {
        if let Some(state) = self.states.read().get(conversation_id) {
            return Ok(state.clone());
        }
        let state = ConversationState::new(conversation_id);
        self.states.write().insert(conversation_id.to_string(), state.clone());
        Ok(state)
    }

    async fn save_state(&self, state: &ConversationState) -> Result<()> {
        self.states.write().insert(state.conversation_id.clone(), state.clone());
        Ok(())
    }

    async fn append_history(&self, conversation_id: &str, item: HistoryItem) -> Result<()> {
        self.history.write().entry(conversation_id.to_string()).or_default().push(item);
        Ok(())
    }

    async fn get_history(&self, conversation_id: &str, limit: Option<usize>) -> Result<Vec<HistoryItem>> {
        let items = self.history.read().get(conversation_id).cloned().unwrap_or_default();
        match limit {
            Some(n) if items.len() > n => Ok(items[items.len() - n..].to_vec()),
            _ => Ok(items),
        }
    }

    async fn get_summary(&self, conversation_id: &str) -> Result<String> {
        Ok(self.get_state(conversation_id).await?.summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sa_domain::model::MessageRole;

    #[tokio::test]
    async fn fresh_conversation_starts_at_message_index_zero() {
        let mem = InMemoryConversationMemory::new();
        let state = mem.get_state("c1").await.unwrap();
        assert_eq!(state.message_index, 0);
    }

    #[tokio::test]
    async fn save_state_round_trips() {
        let mem = InMemoryConversationMemory::new();
        let mut state = mem.get_state("c1").await.unwrap();
        state.message_index = 3;
        mem.save_state(&state).await.unwrap();
        assert_eq!(mem.get_state("c1").await.unwrap().message_index, 3);
    }

    #[tokio::test]
    async fn history_appends_in_order_and_respects_limit() {
        let mem = InMemoryConversationMemory::new();
        for i in 0..5 {
            mem.append_history("c1", HistoryItem::new(MessageRole::User, format!("msg{i}")))
                .await
                .unwrap();
        }
        let all = mem.get_history("c1", None).await.unwrap();
        assert_eq!(all.len(), 5);
        assert_eq!(all[0].content, "msg0");

        let last_two = mem.get_history("c1", Some(2)).await.unwrap();
        assert_eq!(last_two.len(), 2);
        assert_eq!(last_two[0].content, "msg3");
        assert_eq!(last_two[1].content, "msg4");
    }

    #[tokio::test]
    async fn history_is_isolated_per_conversation() {
        let mem = InMemoryConversationMemory::new();
        mem.append_history("a", HistoryItem::new(MessageRole::User, "hi")).await.unwrap();
        assert!(mem.get_history("b", None).await.unwrap().is_empty());
    }
}
