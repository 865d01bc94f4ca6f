//! One handler per inbound mailbox.

use std::collections::HashSet;
use std::sync::Arc;

use futures::future::join_all;
use tracing::{debug, info, warn};

use pulsehub_core::events::{
    CallSignal, ChatMessage, ConversationSeen, FeedEvent, MessageDelivered, MessageEdited,
    MessageTarget, OutboundEvent, PresenceRefresh, ReactionChanged, ReadReceipt, RsvpUpdate,
    Typing,
};
use pulsehub_core::result::AppResult;
use pulsehub_core::types::id::{MessageId, UserId};

use crate::background::bounded;
use crate::connection::session::Session;
use crate::context::HubContext;
use crate::delivery::Provenance;
use crate::fanout::Audience;

pub(super) fn register(ctx: &Arc<HubContext>, session: Arc<Session>) {
    if !ctx.registry.add(Arc::clone(&session)) {
        debug!(conn_id = %session.id, "Session closed before registration");
        return;
    }
    info!(conn_id = %session.id, user_id = %session.user_id, groups = session.groups().len(), "Session online");

    let presence = Arc::clone(&ctx.presence);
    let joined = Arc::clone(&session);
    ctx.background
        .spawn("presence_register", async move { presence.on_register(joined).await });

    let drainer = Arc::clone(&ctx.drainer);
    let deadline = std::time::Duration::from_secs(ctx.config.pending.drain_timeout_seconds);
    ctx.background
        .spawn_with_deadline("pending_drain", deadline, async move {
            drainer.drain(session).await.map(|_| ())
        });
}

pub(super) async fn message(
    ctx: &Arc<HubContext>,
    message: ChatMessage,
    provenance: Provenance,
) -> AppResult<()> {
    let id = message.id;
    let report = ctx.delivery.dispatch(message, provenance).await?;
    debug!(message_id = %id, ?provenance, delivered = report.delivered, queued = report.queued, "Message dispatched");
    Ok(())
}

pub(super) fn reaction(ctx: &Arc<HubContext>, reaction: ReactionChanged) -> AppResult<()> {
    let target = MessageTarget::resolve(reaction.receiver_id, reaction.group_id)?;
    let reactor = reaction.user_id;
    let event = OutboundEvent::Reaction(reaction);
    match target {
        MessageTarget::Direct(peer) => ctx.delivery.to_users([peer, reactor], &event),
        MessageTarget::Group(group) => ctx.delivery.to_group(group, &event, None),
    };
    Ok(())
}

/// Readers' receipts go to the senders of the messages read.
pub(super) fn read_receipt(ctx: &Arc<HubContext>, receipt: ReadReceipt) {
    let task_ctx = Arc::clone(ctx);
    ctx.background.spawn("read_receipt", async move {
        let senders = senders_of(&task_ctx, &receipt.message_ids, receipt.reader_id).await;
        task_ctx
            .delivery
            .to_users(senders, &OutboundEvent::ReadReceipt(receipt));
        Ok(())
    });
}

/// Edits reach both sides of a direct conversation or the whole group.
pub(super) fn edit(ctx: &Arc<HubContext>, edit: MessageEdited) {
    let task_ctx = Arc::clone(ctx);
    ctx.background.spawn("message_edit", async move {
        let lookup = task_ctx.collaborators.messages.find_by_id(edit.message_id);
        let Some(stored) = bounded(task_ctx.config.collaborator_timeout(), lookup).await? else {
            debug!(message_id = %edit.message_id, "Edited message not found");
            return Ok(());
        };
        let sender = stored.sender_id;
        let event = OutboundEvent::Edit(edit);
        match MessageTarget::resolve(stored.receiver_id, stored.group_id)? {
            MessageTarget::Direct(receiver) => task_ctx.delivery.to_users([sender, receiver], &event),
            MessageTarget::Group(group) => task_ctx.delivery.to_group(group, &event, None),
        };
        Ok(())
    });
}

pub(super) fn delivered(ctx: &Arc<HubContext>, delivered: MessageDelivered) {
    let task_ctx = Arc::clone(ctx);
    ctx.background.spawn("message_delivered", async move {
        let senders = senders_of(&task_ctx, &delivered.message_ids, delivered.deliverer_id).await;
        task_ctx
            .delivery
            .to_users(senders, &OutboundEvent::Delivered(delivered));
        Ok(())
    });
}

pub(super) fn conversation_seen(ctx: &Arc<HubContext>, seen: ConversationSeen) -> AppResult<()> {
    let target = MessageTarget::resolve(seen.peer_id, seen.group_id)?;
    let viewer = seen.user_id;
    let event = OutboundEvent::ConversationSeen(seen);
    match target {
        MessageTarget::Direct(peer) => ctx.delivery.to_users([peer], &event),
        MessageTarget::Group(group) => ctx.delivery.to_group(group, &event, Some(viewer)),
    };
    Ok(())
}

pub(super) fn typing(ctx: &Arc<HubContext>, typing: Typing) -> AppResult<()> {
    let target = MessageTarget::resolve(typing.receiver_id, typing.group_id)?;
    let typist = typing.user_id;
    let event = OutboundEvent::Typing(typing);
    match target {
        MessageTarget::Direct(receiver) if receiver != typist => {
            ctx.delivery.to_users([receiver], &event)
        }
        MessageTarget::Direct(_) => 0,
        MessageTarget::Group(group) => ctx.delivery.to_group(group, &event, Some(typist)),
    };
    Ok(())
}

pub(super) fn call_signal(ctx: &Arc<HubContext>, signal: CallSignal) {
    let target = signal.target_id;
    let delivered = ctx
        .delivery
        .to_users([target], &OutboundEvent::CallSignal(signal));
    if delivered == 0 {
        debug!(user_id = %target, "Call target has no live Session");
    }
}

pub(super) fn rsvp(ctx: &Arc<HubContext>, update: RsvpUpdate) {
    let audience = update.audience();
    ctx.delivery
        .to_users(audience, &OutboundEvent::RsvpUpdate(update));
}

pub(super) fn feed(ctx: &Arc<HubContext>, event: FeedEvent) {
    let task_ctx = Arc::clone(ctx);
    ctx.background.spawn("feed_fanout", async move {
        let plan = task_ctx.classifier.classify(&event).await?;
        let kind = event.event_type.as_str();
        let outbound = OutboundEvent::FeedEvent(event);
        let delivered = match plan.audience {
            Audience::Everyone => task_ctx.delivery.to_everyone(&outbound),
            Audience::Users(users) => task_ctx.delivery.to_users(users, &outbound),
        };
        if let Some(notification) = plan.notification {
            let recipient = notification.recipient_id;
            task_ctx.delivery.to_users(
                [recipient],
                &OutboundEvent::NotificationCreated(notification),
            );
        }
        debug!(feed_type = kind, delivered, "Feed event fanned out");
        Ok(())
    });
}

pub(super) fn presence(ctx: &Arc<HubContext>, refresh: PresenceRefresh) {
    let presence = Arc::clone(&ctx.presence);
    ctx.background
        .spawn("presence_refresh", async move { presence.refresh(refresh.user_id).await });
}

/// Distinct senders of `ids`, excluding `except`. Lookups that fail or
/// time out are skipped.
async fn senders_of(ctx: &HubContext, ids: &[MessageId], except: UserId) -> HashSet<UserId> {
    let timeout = ctx.config.collaborator_timeout();
    let lookups = ids
        .iter()
        .map(|id| bounded(timeout, ctx.collaborators.messages.find_by_id(*id)));

    let mut senders = HashSet::new();
    for (id, result) in ids.iter().zip(join_all(lookups).await) {
        match result {
            Ok(Some(stored)) if stored.sender_id != except => {
                senders.insert(stored.sender_id);
            }
            Ok(_) => {}
            Err(e) => warn!(message_id = %id, error = %e, "Message lookup failed"),
        }
    }
    senders
}
