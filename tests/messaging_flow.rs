mod common;

use carlot_rust::{
    backend::{DataService, EntityKind},
    messaging::MessagingError,
    models::{MessageType, OfferStatus},
};
use common::{seed_vehicle, test_app, user, TestApp, BUYER, SELLER};
use futures::StreamExt;
use std::time::Duration;

const OUTSIDER: &str = "outsider@example.com";

async fn app_with_thread() -> (TestApp, String) {
    let app = test_app();
    seed_vehicle(&app.data, "v1", SELLER, 18500.0).await;
    let thread = app
        .state
        .messaging
        .start_thread(&user(BUYER, "Ada Buyer"), "v1")
        .await
        .unwrap();
    (app, thread.id)
}

#[tokio::test]
async fn starting_twice_reuses_the_thread() {
    let app = test_app();
    seed_vehicle(&app.data, "v1", SELLER, 18500.0).await;
    let buyer = user(BUYER, "Ada Buyer");

    let first = app.state.messaging.start_thread(&buyer, "v1").await.unwrap();
    let second = app.state.messaging.start_thread(&buyer, "v1").await.unwrap();

    assert_eq!(first.id, second.id);
    assert_eq!(first.subject, "Inquiry about 2019 Honda Civic");
    assert_eq!(first.unread_count_seller, 1);
    assert_eq!(first.last_message_preview.as_deref(), Some("Ada Buyer started a conversation"));
    assert_eq!(app.data.count(EntityKind::MessageThread).await, 1);
    assert_eq!(app.data.count(EntityKind::Message).await, 1);

    let messages = app.state.messaging.open_thread(SELLER, &first.id).await.unwrap();
    assert_eq!(messages[0].message_type, MessageType::System);
    assert!(messages[0].content.starts_with("Ada Buyer is interested in your 2019 Honda Civic listing."));
}

#[tokio::test]
async fn sellers_cannot_message_themselves() {
    let app = test_app();
    seed_vehicle(&app.data, "v1", SELLER, 18500.0).await;

    let err = app
        .state
        .messaging
        .start_thread(&user(SELLER, "Sam Seller"), "v1")
        .await
        .unwrap_err();
    assert!(matches!(err, MessagingError::SelfMessage));

    let err = app
        .state
        .messaging
        .start_thread(&user(BUYER, "Ada Buyer"), "missing")
        .await
        .unwrap_err();
    assert!(matches!(err, MessagingError::VehicleNotFound(_)));
}

#[tokio::test]
async fn sending_updates_the_thread_header() {
    let (app, thread_id) = app_with_thread().await;
    let messaging = &app.state.messaging;

    let sent = messaging
        .send_message(BUYER, &thread_id, "  Is it still available?  ")
        .await
        .unwrap();
    assert_eq!(sent.content, "Is it still available?");
    assert_eq!(sent.recipient_email, SELLER);
    assert!(!sent.id.starts_with("temp-"));

    let thread = app.state.entities.threads.get(&thread_id).await.unwrap().unwrap();
    assert_eq!(thread.unread_count_seller, 2);
    assert_eq!(thread.unread_count_buyer, 0);
    assert_eq!(thread.last_message_preview.as_deref(), Some("Is it still available?"));

    messaging
        .send_message(SELLER, &thread_id, "Yes, come by Saturday.")
        .await
        .unwrap();
    let thread = app.state.entities.threads.get(&thread_id).await.unwrap().unwrap();
    assert_eq!(thread.unread_count_buyer, 1);
    assert_eq!(thread.unread_count_seller, 0);

    let err = messaging.send_message(BUYER, &thread_id, "   ").await.unwrap_err();
    assert!(matches!(err, MessagingError::EmptyMessage));
    let err = messaging.send_message(OUTSIDER, &thread_id, "hi").await.unwrap_err();
    assert!(matches!(err, MessagingError::NotParticipant));
}

#[tokio::test]
async fn offers_are_answered_by_their_recipient_once() {
    let (app, thread_id) = app_with_thread().await;
    let messaging = &app.state.messaging;

    let offer = messaging.send_offer(BUYER, &thread_id, 18000.0, None).await.unwrap();
    assert_eq!(offer.content, "I'd like to offer $18,000 for this vehicle.");
    assert_eq!(offer.offer_status, Some(OfferStatus::Pending));
    let thread = app.state.entities.threads.get(&thread_id).await.unwrap().unwrap();
    assert_eq!(thread.last_message_preview.as_deref(), Some("Offer: $18,000"));

    assert!(matches!(
        messaging.send_offer(BUYER, &thread_id, 0.0, None).await.unwrap_err(),
        MessagingError::InvalidOffer
    ));
    assert!(matches!(
        messaging.respond_to_offer(BUYER, &offer.id, true).await.unwrap_err(),
        MessagingError::NotOfferRecipient
    ));

    let accepted = messaging.respond_to_offer(SELLER, &offer.id, true).await.unwrap();
    assert_eq!(accepted.offer_status, Some(OfferStatus::Accepted));
    assert!(matches!(
        messaging.respond_to_offer(SELLER, &offer.id, false).await.unwrap_err(),
        MessagingError::OfferNotPending
    ));
}

#[tokio::test]
async fn opening_marks_incoming_messages_read() {
    let (app, thread_id) = app_with_thread().await;
    app.state
        .messaging
        .send_message(BUYER, &thread_id, "Any service records?")
        .await
        .unwrap();

    let messages = app.state.messaging.open_thread(SELLER, &thread_id).await.unwrap();
    assert_eq!(messages.len(), 2);
    assert!(messages.iter().all(|m| m.is_read));

    let stored = app.state.entities.messages.list("created_date").await.unwrap();
    assert!(stored.iter().all(|m| m.is_read && m.read_at.is_some()));
    let thread = app.state.entities.threads.get(&thread_id).await.unwrap().unwrap();
    assert_eq!(thread.unread_count_seller, 0);
}

#[tokio::test]
async fn thread_list_is_scoped_to_participants() {
    let (app, thread_id) = app_with_thread().await;
    let messaging = &app.state.messaging;

    let for_buyer = messaging.list_threads(BUYER, None).await.unwrap();
    assert_eq!(for_buyer.len(), 1);
    assert_eq!(for_buyer[0].thread.id, thread_id);
    assert_eq!(for_buyer[0].other_party, SELLER);
    assert_eq!(for_buyer[0].vehicle.as_ref().map(|v| v.id.as_str()), Some("v1"));

    assert_eq!(messaging.list_threads(SELLER, None).await.unwrap().len(), 1);
    assert!(messaging.list_threads(OUTSIDER, None).await.unwrap().is_empty());
    assert!(messaging
        .list_threads(BUYER, Some("zzz-no-match"))
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn polling_reports_changes_only_once() {
    let (app, thread_id) = app_with_thread().await;
    let messaging = &app.state.messaging;

    assert!(messaging.poll(BUYER, &thread_id).await.unwrap().changed);
    assert!(!messaging.poll(BUYER, &thread_id).await.unwrap().changed);

    messaging.send_message(SELLER, &thread_id, "Still here").await.unwrap();
    let result = messaging.poll(BUYER, &thread_id).await.unwrap();
    assert!(result.changed);
    assert_eq!(result.messages.len(), 2);

    assert!(matches!(
        messaging.poll(OUTSIDER, &thread_id).await.unwrap_err(),
        MessagingError::NotParticipant
    ));
}

#[tokio::test(start_paused = true)]
async fn watch_yields_new_messages_until_the_thread_goes_away() {
    let (app, thread_id) = app_with_thread().await;
    assert_eq!(app.state.messaging.poll_interval(), Duration::from_secs(5));

    let mut updates = Box::pin(
        app.state
            .messaging
            .clone()
            .watch(BUYER.to_string(), thread_id.clone()),
    );

    let initial = updates.next().await.unwrap();
    assert_eq!(initial.len(), 1);

    app.state
        .messaging
        .send_message(SELLER, &thread_id, "Price is firm")
        .await
        .unwrap();
    let next = updates.next().await.unwrap();
    assert_eq!(next.len(), 2);
    assert_eq!(next[1].content, "Price is firm");

    app.data.delete(EntityKind::MessageThread, &thread_id).await.unwrap();
    assert!(updates.next().await.is_none());
}
