//! Buyer/seller conversations about a vehicle.
//!
//! Sends are optimistic: the message is shown under a temporary id from a
//! [`PendingQueue`] and swapped for the server record once the create returns.
//! Open threads are refreshed by polling; a poll only replaces the confirmed
//! list and never drops pending sends.

use thiserror::Error;

pub mod conversation;
pub mod pending;
pub mod service;
pub mod threads;

pub use conversation::Conversation;
pub use pending::{CorrelationId, PendingOp, PendingQueue};
pub use service::{MessagingService, PollResult};
pub use threads::{ThreadSummary, VehicleSummary};

#[derive(Error, Debug)]
pub enum MessagingError {
    #[error("You are not part of this conversation")]
    NotParticipant,
    #[error("Thread {0} not found")]
    ThreadNotFound(String),
    #[error("Vehicle {0} not found")]
    VehicleNotFound(String),
    #[error("Message {0} not found")]
    MessageNotFound(String),
    #[error("You cannot message yourself about your own listing")]
    SelfMessage,
    #[error("Message cannot be empty")]
    EmptyMessage,
    #[error("Offer amount must be a positive number")]
    InvalidOffer,
    #[error("This offer has already been answered")]
    OfferNotPending,
    #[error("Only the recipient of an offer can respond to it")]
    NotOfferRecipient,
    #[error("Failed to send message. Please try again.")]
    SendFailed(#[source] anyhow::Error),
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}
