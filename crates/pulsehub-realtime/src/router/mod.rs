//! Event router: one logical consumer over every typed inbound mailbox.
//!
//! Multi-step operations (registration, removal, group dispatch) are
//! serialized here. Anything that waits on a collaborator beyond a
//! single dispatch is handed to the background pool.

mod handlers;
pub mod ingress;

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use pulsehub_core::result::AppResult;

use crate::context::HubContext;
use crate::delivery::Provenance;

use self::ingress::Mailboxes;

/// Runs until `cancel` fires or every producer is gone.
pub(crate) async fn run(ctx: Arc<HubContext>, mut mb: Mailboxes, cancel: CancellationToken) {
    info!("Event router started");
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            Some(session) = mb.register.recv() => handlers::register(&ctx, session),
            Some((id, reason)) = mb.unregister.recv() => {
                ctx.remove_session(id, reason);
            }
            Some(message) = mb.message.recv() => {
                report("message", handlers::message(&ctx, message, Provenance::Local).await);
            }
            Some(message) = mb.relayed.recv() => {
                report("message", handlers::message(&ctx, message, Provenance::Bridge).await);
            }
            Some(reaction) = mb.reaction.recv() => report("reaction", handlers::reaction(&ctx, reaction)),
            Some(receipt) = mb.receipt.recv() => handlers::read_receipt(&ctx, receipt),
            Some(edit) = mb.edit.recv() => handlers::edit(&ctx, edit),
            Some(delivered) = mb.delivered.recv() => handlers::delivered(&ctx, delivered),
            Some(seen) = mb.seen.recv() => report("conversation_seen", handlers::conversation_seen(&ctx, seen)),
            Some(typing) = mb.typing.recv() => report("typing", handlers::typing(&ctx, typing)),
            Some(call) = mb.call.recv() => handlers::call_signal(&ctx, call),
            Some(rsvp) = mb.rsvp.recv() => handlers::rsvp(&ctx, rsvp),
            Some(feed) = mb.feed.recv() => handlers::feed(&ctx, feed),
            Some(refresh) = mb.presence.recv() => handlers::presence(&ctx, refresh),
            else => break,
        }
    }
    info!("Event router stopped");
}

fn report<T>(event_type: &'static str, result: AppResult<T>) {
    if let Err(e) = result {
        warn!(event_type, error = %e, "Handler failed");
    }
}
