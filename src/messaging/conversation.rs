// The message list of one open thread as a participant sees it.

use chrono::Utc;

use super::pending::{CorrelationId, PendingQueue};
use crate::models::Message;

#[derive(Debug, Default)]
pub struct Conversation {
    pub thread_id: String,
    confirmed: Vec<Message>,
    pending: PendingQueue,
}

impl Conversation {
    pub fn new(thread_id: impl Into<String>) -> Self {
        Self {
            thread_id: thread_id.into(),
            ..Default::default()
        }
    }

    /// Shows `draft` right away under a temporary id.
    pub fn begin_send(&mut self, mut draft: Message) -> CorrelationId {
        draft.thread_id = self.thread_id.clone();
        self.pending.push(draft)
    }

    /// Swaps the pending message for the server record.
    ///
    /// The record may already be present if a poll fetched it first; it is not
    /// added twice.
    pub fn confirm(&mut self, correlation: &CorrelationId, record: Message) -> bool {
        let resolved = self.pending.resolve(correlation).is_some();
        if !self.confirmed.iter().any(|m| m.id == record.id) {
            self.confirmed.push(record);
        }
        resolved
    }

    /// Drops a pending message whose send failed and hands it back.
    pub fn fail(&mut self, correlation: &CorrelationId) -> Option<Message> {
        self.pending.resolve(correlation).map(|op| op.message)
    }

    /// Replaces the confirmed list with a fresh fetch. Returns whether anything changed.
    /// Pending sends are untouched.
    pub fn merge(&mut self, fetched: Vec<Message>) -> bool {
        if fetched == self.confirmed {
            return false;
        }
        self.confirmed = fetched;
        true
    }

    /// Confirmed messages followed by the pending ones, in send order.
    pub fn view(&self) -> Vec<Message> {
        self.confirmed
            .iter()
            .chain(self.pending.messages())
            .cloned()
            .collect()
    }

    /// Marks local copies addressed to `reader` as read and returns the ids that changed.
    pub fn mark_read_local(&mut self, reader: &str) -> Vec<String> {
        let now = Utc::now();
        self.confirmed
            .iter_mut()
            .filter(|m| m.recipient_email == reader && !m.is_read)
            .map(|m| {
                m.is_read = true;
                m.read_at = Some(now);
                m.id.clone()
            })
            .collect()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(id: &str, content: &str) -> Message {
        Message {
            id: id.into(),
            thread_id: "t1".into(),
            sender_email: "buyer@example.com".into(),
            recipient_email: "seller@example.com".into(),
            content: content.into(),
            ..Default::default()
        }
    }

    #[test]
    fn optimistic_send_is_replaced_by_id_swap() {
        let mut conversation = Conversation::new("t1");
        conversation.merge(vec![message("m1", "Is it available?")]);

        // Same content as an existing message; must not be confused with it.
        let correlation = conversation.begin_send(message("", "Is it available?"));
        let view = conversation.view();
        assert_eq!(view.len(), 2);
        assert_eq!(view[1].id, correlation.to_string());

        // The server normalised the content; matching is by correlation only.
        assert!(conversation.confirm(&correlation, message("m2", "Is it available? ")));
        let ids: Vec<String> = conversation.view().into_iter().map(|m| m.id).collect();
        assert_eq!(ids, vec!["m1", "m2"]);
        assert_eq!(conversation.pending_count(), 0);
    }

    #[test]
    fn failed_send_rolls_back() {
        let mut conversation = Conversation::new("t1");
        let correlation = conversation.begin_send(message("", "Hello"));
        let rolled_back = conversation.fail(&correlation).unwrap();
        assert_eq!(rolled_back.content, "Hello");
        assert!(conversation.view().is_empty());
    }

    #[test]
    fn poll_merge_keeps_pending_and_reports_changes() {
        let mut conversation = Conversation::new("t1");
        assert!(conversation.merge(vec![message("m1", "a")]));
        assert!(!conversation.merge(vec![message("m1", "a")]));

        let correlation = conversation.begin_send(message("", "b"));
        // Poll lands before the create returns and already contains the record.
        assert!(conversation.merge(vec![message("m1", "a"), message("m2", "b")]));
        assert_eq!(conversation.view().len(), 3);

        conversation.confirm(&correlation, message("m2", "b"));
        let ids: Vec<String> = conversation.view().into_iter().map(|m| m.id).collect();
        assert_eq!(ids, vec!["m1", "m2"]);
    }

    #[test]
    fn marks_only_messages_addressed_to_reader() {
        let mut conversation = Conversation::new("t1");
        let mut reply = message("m2", "yes");
        reply.sender_email = "seller@example.com".into();
        reply.recipient_email = "buyer@example.com".into();
        conversation.merge(vec![message("m1", "hi"), reply]);

        assert_eq!(conversation.mark_read_local("seller@example.com"), vec!["m1"]);
        assert!(conversation.mark_read_local("seller@example.com").is_empty());
    }
}
