// Thread list shaping: dedupe, vehicle join, search and ordering.

use serde::Serialize;
use std::collections::HashSet;

use crate::models::{MessageThread, ThreadRole, Vehicle};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VehicleSummary {
    pub id: String,
    pub title: String,
    pub year: i32,
    pub make: String,
    pub model: String,
    pub price: f64,
    pub thumbnail: Option<String>,
}

impl From<&Vehicle> for VehicleSummary {
    fn from(vehicle: &Vehicle) -> Self {
        Self {
            id: vehicle.id.clone(),
            title: vehicle.display_title(),
            year: vehicle.year,
            make: vehicle.make.clone(),
            model: vehicle.model.clone(),
            price: vehicle.price,
            thumbnail: vehicle.thumbnail().map(str::to_string),
        }
    }
}

/// A thread as listed for one participant.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThreadSummary {
    #[serde(flatten)]
    pub thread: MessageThread,
    pub vehicle: Option<VehicleSummary>,
    pub other_party: String,
    pub unread: u32,
}

impl ThreadSummary {
    pub fn new(thread: MessageThread, vehicle: Option<&Vehicle>, viewer: &str) -> Self {
        let unread = match thread.role_of(viewer) {
            Some(ThreadRole::Buyer) => thread.unread_count_buyer,
            Some(ThreadRole::Seller) => thread.unread_count_seller,
            None => 0,
        };
        Self {
            other_party: thread.counterpart(viewer).to_string(),
            vehicle: vehicle.map(VehicleSummary::from),
            thread,
            unread,
        }
    }

    /// Case-insensitive match on "year make model" and the other party's email.
    pub fn matches(&self, query: &str) -> bool {
        let query = query.trim().to_lowercase();
        if query.is_empty() {
            return true;
        }
        let vehicle = self
            .vehicle
            .as_ref()
            .map(|v| format!("{} {} {}", v.year, v.make, v.model).to_lowercase())
            .unwrap_or_default();
        vehicle.contains(&query) || self.other_party.to_lowercase().contains(&query)
    }
}

/// Keeps the first occurrence of each thread id.
pub fn dedupe(threads: impl IntoIterator<Item = MessageThread>) -> Vec<MessageThread> {
    let mut seen = HashSet::new();
    threads
        .into_iter()
        .filter(|thread| seen.insert(thread.id.clone()))
        .collect()
}

/// Most recent activity first; threads without activity go last.
pub fn sort_by_activity(summaries: &mut [ThreadSummary]) {
    summaries.sort_by(|a, b| b.thread.last_message_at.cmp(&a.thread.last_message_at));
}
