use anyhow::anyhow;
use cached::{Cached, TimedSizedCache};
use chrono::Utc;
use futures::{future::join_all, Stream};
use serde::Serialize;
use serde_json::json;
use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
    time::Duration,
};
use tokio::{sync::Mutex, time::MissedTickBehavior};

use super::{
    conversation::Conversation,
    threads::{dedupe, sort_by_activity, ThreadSummary},
    MessagingError,
};
use crate::{
    backend::{Collection, Entities, Query},
    config::MessagingSettings,
    models::{Message, MessageThread, MessageType, OfferStatus, ThreadRole, User, Vehicle},
};

const PREVIEW_CHARS: usize = 100;
const NEW_THREAD_PREVIEW: &str = "New conversation started";
const MIN_POLL_INTERVAL: Duration = Duration::from_secs(1);

// (thread id, viewer email)
type ConversationKey = (String, String);

#[derive(Debug, Clone, Serialize)]
pub struct PollResult {
    pub changed: bool,
    pub messages: Vec<Message>,
}

/// "$18,500" style amounts for previews.
fn format_amount(amount: f64) -> String {
    let cents = (amount * 100.0).round() as i64;
    let digits = (cents / 100).to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }
    match cents % 100 {
        0 => grouped,
        rest => format!("{}.{:02}", grouped, rest),
    }
}

fn preview(content: &str) -> String {
    content.chars().take(PREVIEW_CHARS).collect()
}

pub struct MessagingService {
    threads: Collection<MessageThread>,
    messages: Collection<Message>,
    vehicles: Collection<Vehicle>,
    system_sender: String,
    poll_interval: Duration,
    // Idle conversations expire; a later open or poll rebuilds them from the backend.
    conversations: Mutex<TimedSizedCache<ConversationKey, Conversation>>,
}

impl MessagingService {
    pub fn new(entities: &Entities, settings: &MessagingSettings) -> Self {
        let poll_interval = Duration::from_secs(settings.poll_interval_secs).max(MIN_POLL_INTERVAL);
        Self {
            threads: entities.threads.clone(),
            messages: entities.messages.clone(),
            vehicles: entities.vehicles.clone(),
            system_sender: settings.system_sender.clone(),
            poll_interval,
            conversations: Mutex::new(TimedSizedCache::with_size_and_lifespan_and_refresh(
                settings.conversation_cache_size.max(1),
                settings.conversation_cache_ttl_secs,
                true,
            )),
        }
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    async fn with_conversation<R>(&self, viewer: &str, thread_id: &str, f: impl FnOnce(&mut Conversation) -> R) -> R {
        let mut conversations = self.conversations.lock().await;
        let conversation = conversations
            .cache_get_or_set_with((thread_id.to_string(), viewer.to_string()), || Conversation::new(thread_id));
        f(conversation)
    }

    async fn thread_for(&self, viewer: &str, thread_id: &str) -> Result<(MessageThread, ThreadRole), MessagingError> {
        let thread = self
            .threads
            .get(thread_id)
            .await?
            .ok_or_else(|| MessagingError::ThreadNotFound(thread_id.to_string()))?;
        let role = thread.role_of(viewer).ok_or(MessagingError::NotParticipant)?;
        Ok((thread, role))
    }

    async fn fetch_messages(&self, thread_id: &str) -> anyhow::Result<Vec<Message>> {
        self.messages
            .filter(Query::new().eq("thread_id", thread_id).sort("created_date"))
            .await
    }

    /// Threads where `viewer` is buyer or seller, joined with their vehicles,
    /// most recent activity first.
    pub async fn list_threads(&self, viewer: &str, search: Option<&str>) -> Result<Vec<ThreadSummary>, MessagingError> {
        let (as_buyer, as_seller) = futures::try_join!(
            self.threads
                .filter(Query::new().eq("buyer_email", viewer).sort("-last_message_at")),
            self.threads
                .filter(Query::new().eq("seller_email", viewer).sort("-last_message_at")),
        )?;
        let threads = dedupe(as_buyer.into_iter().chain(as_seller));

        let vehicle_ids: HashSet<&str> = threads.iter().map(|t| t.vehicle_id.as_str()).collect();
        let lookups = join_all(vehicle_ids.into_iter().map(|id| async move {
            match self.vehicles.get(id).await {
                Ok(vehicle) => vehicle,
                Err(e) => {
                    tracing::warn!(vehicle = id, "Failed to load vehicle for thread list: {:?}", e);
                    None
                }
            }
        }))
        .await;
        let vehicles: HashMap<String, Vehicle> = lookups.into_iter().flatten().map(|v| (v.id.clone(), v)).collect();

        let mut summaries: Vec<ThreadSummary> = threads
            .into_iter()
            .map(|thread| {
                let vehicle = vehicles.get(&thread.vehicle_id);
                ThreadSummary::new(thread, vehicle, viewer)
            })
            .filter(|summary| search.map_or(true, |q| summary.matches(q)))
            .collect();
        sort_by_activity(&mut summaries);
        Ok(summaries)
    }

    /// Finds or creates the thread between `buyer` and the vehicle's seller.
    pub async fn start_thread(&self, buyer: &User, vehicle_id: &str) -> Result<MessageThread, MessagingError> {
        let vehicle = self
            .vehicles
            .get(vehicle_id)
            .await?
            .ok_or_else(|| MessagingError::VehicleNotFound(vehicle_id.to_string()))?;
        let seller = vehicle
            .created_by
            .clone()
            .ok_or_else(|| MessagingError::Backend(anyhow!("Vehicle {} has no seller", vehicle_id)))?;
        if seller == buyer.email {
            return Err(MessagingError::SelfMessage);
        }

        let existing = self
            .threads
            .filter(
                Query::new()
                    .eq("vehicle_id", vehicle_id)
                    .eq("buyer_email", buyer.email.as_str())
                    .eq("seller_email", seller.as_str())
                    .limit(1),
            )
            .await?;
        if let Some(thread) = existing.into_iter().next() {
            return Ok(thread);
        }

        let key = MessageThread::key_for(vehicle_id, &buyer.email, &seller);
        let vehicle_name = format!("{} {} {}", vehicle.year, vehicle.make, vehicle.model);
        let thread = self
            .threads
            .create_idempotent(
                &json!({
                    "vehicle_id": vehicle_id,
                    "buyer_email": buyer.email,
                    "seller_email": seller,
                    "subject": format!("Inquiry about {}", vehicle_name),
                    "last_message_at": Utc::now(),
                    "last_message_preview": NEW_THREAD_PREVIEW,
                    "status": "active",
                    "unread_count_buyer": 0,
                    "unread_count_seller": 1,
                }),
                &key,
            )
            .await?;

        // A concurrent start already announced the buyer.
        if thread.last_message_preview.as_deref() != Some(NEW_THREAD_PREVIEW) {
            return Ok(thread);
        }

        let name = buyer.display_name();
        self.messages
            .create_idempotent(
                &json!({
                    "thread_id": thread.id,
                    "sender_email": self.system_sender,
                    "recipient_email": seller,
                    "content": format!(
                        "{} is interested in your {} listing. They can now message you directly about this vehicle.",
                        name, vehicle_name
                    ),
                    "message_type": MessageType::System,
                }),
                &format!("{}:announce", key),
            )
            .await?;
        let thread = self
            .threads
            .update(
                &thread.id,
                &json!({ "last_message_preview": format!("{} started a conversation", name) }),
            )
            .await?;
        tracing::info!(thread = %thread.id, vehicle = vehicle_id, buyer = %buyer.email, "Conversation started");
        Ok(thread)
    }

    /// Loads the thread's messages and marks what was addressed to `viewer` as read.
    pub async fn open_thread(&self, viewer: &str, thread_id: &str) -> Result<Vec<Message>, MessagingError> {
        let (thread, role) = self.thread_for(viewer, thread_id).await?;
        let fetched = self.fetch_messages(thread_id).await?;

        let (unread_ids, messages) = self
            .with_conversation(viewer, thread_id, |conversation| {
                conversation.merge(fetched);
                (conversation.mark_read_local(viewer), conversation.view())
            })
            .await;

        let reset = match role {
            ThreadRole::Buyer if thread.unread_count_buyer > 0 => Some(json!({ "unread_count_buyer": 0 })),
            ThreadRole::Seller if thread.unread_count_seller > 0 => Some(json!({ "unread_count_seller": 0 })),
            _ => None,
        };
        if let Some(reset) = reset {
            if let Err(e) = self.threads.update(thread_id, &reset).await {
                tracing::warn!(thread = thread_id, "Failed to reset unread counter: {:?}", e);
            }
        }

        let patch = json!({ "is_read": true, "read_at": Utc::now() });
        let results = join_all(unread_ids.iter().map(|id| self.messages.update(id, &patch))).await;
        for (id, result) in unread_ids.iter().zip(results) {
            if let Err(e) = result {
                tracing::warn!(message = %id, "Failed to mark message read: {:?}", e);
            }
        }
        Ok(messages)
    }

    /// Refetches the thread; `changed` is false when the confirmed list is identical.
    pub async fn poll(&self, viewer: &str, thread_id: &str) -> Result<PollResult, MessagingError> {
        self.thread_for(viewer, thread_id).await?;
        let fetched = self.fetch_messages(thread_id).await?;
        let result = self
            .with_conversation(viewer, thread_id, |conversation| PollResult {
                changed: conversation.merge(fetched),
                messages: conversation.view(),
            })
            .await;
        if result.changed {
            tracing::debug!(thread = thread_id, count = result.messages.len(), "Poll picked up changes");
        }
        Ok(result)
    }

    /// Polls every `poll_interval` and yields the message list whenever it changed.
    /// Ends when the thread is gone or `viewer` is no longer a participant.
    pub fn watch(self: Arc<Self>, viewer: String, thread_id: String) -> impl Stream<Item = Vec<Message>> + Send {
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        futures::stream::unfold((self, ticker), move |(service, mut ticker)| {
            let viewer = viewer.clone();
            let thread_id = thread_id.clone();
            async move {
                loop {
                    ticker.tick().await;
                    match service.poll(&viewer, &thread_id).await {
                        Ok(PollResult { changed: true, messages }) => return Some((messages, (service, ticker))),
                        Ok(_) => continue,
                        Err(e @ (MessagingError::ThreadNotFound(_) | MessagingError::NotParticipant)) => {
                            tracing::info!(thread = %thread_id, "Stopped watching thread: {}", e);
                            return None;
                        }
                        Err(e) => tracing::warn!(thread = %thread_id, "Poll failed: {:?}", e),
                    }
                }
            }
        })
    }

    pub async fn send_message(&self, viewer: &str, thread_id: &str, content: &str) -> Result<Message, MessagingError> {
        let content = content.trim();
        if content.is_empty() {
            return Err(MessagingError::EmptyMessage);
        }
        let draft = Message {
            content: content.to_string(),
            message_type: MessageType::Text,
            ..Default::default()
        };
        self.send(viewer, thread_id, draft, preview(content)).await
    }

    pub async fn send_offer(
        &self,
        viewer: &str,
        thread_id: &str,
        amount: f64,
        note: Option<&str>,
    ) -> Result<Message, MessagingError> {
        if !amount.is_finite() || amount <= 0.0 {
            return Err(MessagingError::InvalidOffer);
        }
        let formatted = format_amount(amount);
        let content = note
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| format!("I'd like to offer ${} for this vehicle.", formatted));
        let draft = Message {
            content,
            message_type: MessageType::Offer,
            offer_amount: Some(amount),
            offer_status: Some(OfferStatus::Pending),
            ..Default::default()
        };
        self.send(viewer, thread_id, draft, format!("Offer: ${}", formatted)).await
    }

    // Optimistic path shared by text and offer messages.
    async fn send(
        &self,
        viewer: &str,
        thread_id: &str,
        mut draft: Message,
        preview: String,
    ) -> Result<Message, MessagingError> {
        let (thread, role) = self.thread_for(viewer, thread_id).await?;
        draft.thread_id = thread_id.to_string();
        draft.sender_email = viewer.to_string();
        draft.recipient_email = thread.counterpart(viewer).to_string();

        let record = json!({
            "thread_id": draft.thread_id,
            "sender_email": draft.sender_email,
            "recipient_email": draft.recipient_email,
            "content": draft.content,
            "message_type": draft.message_type,
            "offer_amount": draft.offer_amount,
            "offer_status": draft.offer_status,
        });
        let correlation = self
            .with_conversation(viewer, thread_id, |conversation| conversation.begin_send(draft))
            .await;

        let created = match self.messages.create(&record).await {
            Ok(created) => created,
            Err(e) => {
                self.with_conversation(viewer, thread_id, |conversation| conversation.fail(&correlation))
                    .await;
                tracing::error!(thread = thread_id, "Failed to send message: {:?}", e);
                return Err(MessagingError::SendFailed(e));
            }
        };
        self.with_conversation(viewer, thread_id, |conversation| {
            conversation.confirm(&correlation, created.clone())
        })
        .await;

        let (buyer_unread, seller_unread) = match role {
            ThreadRole::Buyer => (0, thread.unread_count_seller + 1),
            ThreadRole::Seller => (thread.unread_count_buyer + 1, 0),
        };
        let activity = json!({
            "last_message_at": Utc::now(),
            "last_message_preview": preview,
            "unread_count_buyer": buyer_unread,
            "unread_count_seller": seller_unread,
        });
        // The message itself is stored; a stale thread header is not worth failing the send.
        if let Err(e) = self.threads.update(thread_id, &activity).await {
            tracing::warn!(thread = thread_id, "Failed to update thread after send: {:?}", e);
        }
        tracing::info!(thread = thread_id, message = %created.id, kind = %created.message_type, "Message sent");
        Ok(created)
    }

    /// Accepts or declines a pending offer addressed to `viewer`.
    pub async fn respond_to_offer(&self, viewer: &str, message_id: &str, accept: bool) -> Result<Message, MessagingError> {
        let offer = self
            .messages
            .get(message_id)
            .await?
            .ok_or_else(|| MessagingError::MessageNotFound(message_id.to_string()))?;
        if offer.message_type != MessageType::Offer || offer.offer_status != Some(OfferStatus::Pending) {
            return Err(MessagingError::OfferNotPending);
        }
        if offer.recipient_email != viewer {
            return Err(MessagingError::NotOfferRecipient);
        }
        let status = if accept { OfferStatus::Accepted } else { OfferStatus::Declined };
        let updated = self
            .messages
            .update(message_id, &json!({ "offer_status": status }))
            .await?;
        tracing::info!(message = message_id, status = %status, "Offer answered");
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        backend::{EntityKind, MemoryDataService},
        config::Settings,
    };

    fn messaging_settings(poll_interval_secs: u64, conversation_cache_size: usize) -> MessagingSettings {
        let mut settings = Settings::defaults().unwrap().messaging;
        settings.poll_interval_secs = poll_interval_secs;
        settings.conversation_cache_size = conversation_cache_size;
        settings
    }

    async fn service_with_threads(settings: &MessagingSettings, ids: &[&str]) -> MessagingService {
        let data = Arc::new(MemoryDataService::new());
        for id in ids {
            data.seed(
                EntityKind::MessageThread,
                json!({
                    "id": id,
                    "vehicle_id": "v1",
                    "buyer_email": "buyer@example.com",
                    "seller_email": "seller@example.com",
                }),
            )
            .await;
        }
        MessagingService::new(&Entities::new(data), settings)
    }

    #[tokio::test]
    async fn zero_poll_interval_is_raised_to_a_second() {
        let service = service_with_threads(&messaging_settings(0, 8), &[]).await;
        assert_eq!(service.poll_interval(), Duration::from_secs(1));

        let service = service_with_threads(&messaging_settings(7, 8), &[]).await;
        assert_eq!(service.poll_interval(), Duration::from_secs(7));
    }

    #[tokio::test]
    async fn conversation_cache_is_bounded() {
        let service = service_with_threads(&messaging_settings(5, 2), &["t1", "t2", "t3"]).await;
        for id in ["t1", "t2", "t3"] {
            service.poll("buyer@example.com", id).await.unwrap();
        }
        assert_eq!(service.conversations.lock().await.cache_size(), 2);

        // An evicted conversation is rebuilt from the backend on the next poll.
        let result = service.poll("buyer@example.com", "t1").await.unwrap();
        assert!(result.messages.is_empty());
    }

    #[test]
    fn amounts_are_grouped() {
        assert_eq!(format_amount(18500.0), "18,500");
        assert_eq!(format_amount(1234567.5), "1,234,567.50");
        assert_eq!(format_amount(999.0), "999");
    }

    #[test]
    fn previews_are_cut_at_a_char_boundary() {
        let long = "é".repeat(150);
        assert_eq!(preview(&long).chars().count(), 100);
        assert_eq!(preview("short"), "short");
    }
}
