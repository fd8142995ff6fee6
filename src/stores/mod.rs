//! Stateful stores the presentation layer talks to.

pub mod auth;
pub mod cart;
pub mod catalog;
pub mod ledger;
pub mod orders;
pub mod payments;
pub mod pg;

use crate::domain::events::DomainEvent;

/// Fire-and-forget domain event publication. Degrades silently when no
/// event bus is configured or the publish fails; events are advisory.
pub(crate) fn publish_event(client: &Option<async_nats::Client>, subject: &'static str, event: &DomainEvent) {
    let Some(client) = client.clone() else { return };
    let payload = match serde_json::to_vec(event) {
        Ok(payload) => payload,
        Err(e) => {
            tracing::warn!(error = %e, "unserializable domain event");
            return;
        }
    };
    tokio::spawn(async move {
        if let Err(e) = client.publish(subject, payload.into()).await {
            tracing::warn!(error = %e, subject, "event publish failed");
        }
    });
}
