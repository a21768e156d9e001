use parley_types::models::Message;

/// Local view of one chat thread: the messages received so far and the
/// highest id seen.
#[derive(Debug, Default)]
pub struct PollState {
    last_id: i64,
    messages: Vec<Message>,
}

impl PollState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from a known cursor, e.g. the last id of an initial page load.
    pub fn starting_after(last_id: i64) -> Self {
        Self { last_id: last_id.max(0), messages: Vec::new() }
    }

    pub fn last_id(&self) -> i64 {
        self.last_id
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Append messages newer than the cursor and advance it. Returns the
    /// newly appended messages, in id order.
    pub fn apply(&mut self, batch: Vec<Message>) -> &[Message] {
        let start = self.messages.len();
        let cursor = self.last_id;

        for message in batch {
            if message.id <= cursor || self.messages[start..].iter().any(|m| m.id == message.id) {
                continue;
            }
            self.last_id = self.last_id.max(message.id);
            self.messages.push(message);
        }

        self.messages[start..].sort_by_key(|m| m.id);
        &self.messages[start..]
    }
}

#[cfg(test)]
mod tests {
    use parley_types::models::{Author, Role};

    use super::*;

    fn msg(id: i64) -> Message {
        Message {
            id,
            author: Author { id: 1, username: "u".into(), full_name: "U".into(), role: Role::Qa },
            project_id: Some(1),
            page_id: None,
            reply_to: None,
            body: format!("m{id}"),
            mentions: Vec::new(),
            created_at: chrono::DateTime::default(),
            edited_at: None,
            deleted_at: None,
            is_deleted: false,
            reply_preview: None,
            can_edit: false,
            can_delete: false,
        }
    }

    fn ids(messages: &[Message]) -> Vec<i64> {
        messages.iter().map(|m| m.id).collect()
    }

    #[test]
    fn appends_and_advances() {
        let mut state = PollState::new();
        assert_eq!(ids(state.apply(vec![msg(3), msg(5)])), vec![3, 5]);
        assert_eq!(state.last_id(), 5);
        assert_eq!(ids(state.apply(vec![msg(6)])), vec![6]);
        assert_eq!(ids(state.messages()), vec![3, 5, 6]);
    }

    #[test]
    fn ignores_stale_and_duplicate_ids() {
        let mut state = PollState::starting_after(10);
        assert!(state.apply(vec![msg(9), msg(10)]).is_empty());
        assert_eq!(ids(state.apply(vec![msg(12), msg(11), msg(12)])), vec![11, 12]);
        assert!(state.apply(vec![msg(11), msg(12)]).is_empty());
        assert_eq!(state.last_id(), 12);
        assert_eq!(state.messages().len(), 2);
    }

    #[test]
    fn empty_batch_keeps_cursor() {
        let mut state = PollState::starting_after(4);
        assert!(state.apply(Vec::new()).is_empty());
        assert_eq!(state.last_id(), 4);
    }
}
