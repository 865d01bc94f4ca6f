//! End-to-end delivery scenarios against a running hub on the in-memory
//! store and in-memory collaborators.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use tokio::sync::mpsc;
use uuid::Uuid;

use pulsehub_cache::CacheManager;
use pulsehub_cache::memory::{MemoryCacheProvider, MemoryPubSub};
use pulsehub_core::config::{CacheConfig, RealtimeConfig};
use pulsehub_core::events::{
    CallSignal, ChatMessage, ConversationRef, ConversationSeen, FeedEvent, FeedEventType,
    InboundEvent, MessageEdited, OutboundEvent, PresenceRefresh, PresenceStatus, ReactionAction,
    ReactionChanged, ReadReceipt, RsvpUpdate, Typing,
};
use pulsehub_core::result::AppResult;
use pulsehub_core::traits::CacheProvider;
use pulsehub_core::types::id::{EventId, GroupId, MessageId, UserId};
use pulsehub_realtime::bridge::BridgePublisher;
use pulsehub_realtime::pending::OwnerKey;
use pulsehub_realtime::testing::InMemoryDirectory;
use pulsehub_realtime::{Hub, Session};

type Outbound = mpsc::Receiver<OutboundEvent>;

struct Harness {
    hub: Arc<Hub>,
    store: Arc<CacheManager>,
    directory: Arc<InMemoryDirectory>,
}

impl Harness {
    fn start() -> Self {
        Self::with_config(RealtimeConfig::default())
    }

    fn with_config(config: RealtimeConfig) -> Self {
        let store = Arc::new(CacheManager::in_memory(&CacheConfig::default()));
        Self::with_store(config, store)
    }

    fn with_store(config: RealtimeConfig, store: Arc<CacheManager>) -> Self {
        let directory = Arc::new(InMemoryDirectory::new());
        let hub = Hub::start(quick(config), Arc::clone(&store), directory.collaborators());
        Self {
            hub,
            store,
            directory,
        }
    }

    /// A second instance over the same store, bridge and collaborators.
    fn peer(&self) -> Arc<Hub> {
        Hub::start(
            quick(RealtimeConfig::default()),
            Arc::clone(&self.store),
            self.directory.collaborators(),
        )
    }

    async fn connect(&self, user: UserId) -> (Arc<Session>, Outbound) {
        connect_on(&self.hub, user).await
    }

    async fn pending_len(&self, owner: OwnerKey) -> usize {
        self.hub.pending().list(&owner).await.expect("list").len()
    }
}

fn quick(config: RealtimeConfig) -> RealtimeConfig {
    RealtimeConfig {
        collaborator_timeout_ms: 500,
        ..config
    }
}

async fn connect_on(hub: &Arc<Hub>, user: UserId) -> (Arc<Session>, Outbound) {
    let (session, rx) = hub.connect(user).await.expect("connect");
    let registry = Arc::clone(hub.registry());
    let id = session.id;
    eventually("session registered", || {
        let registry = Arc::clone(&registry);
        async move { registry.get(id).is_some() }
    })
    .await;
    (session, rx)
}

/// Publishes presence refreshes from a foreign origin until `hub`'s
/// bridge subscriber has relayed one, so later publishes are not missed.
async fn wait_for_bridge(hub: &Hub, store: &Arc<CacheManager>) {
    let stranger = BridgePublisher::new(
        Arc::clone(store),
        hub.config().bridge.channel.clone(),
        Uuid::new_v4(),
    );
    for _ in 0..100 {
        let refresh = InboundEvent::Presence(PresenceRefresh { user_id: UserId::new() });
        stranger.publish_event(refresh).await.expect("publish");
        tokio::time::sleep(Duration::from_millis(20)).await;
        if hub.metrics().snapshot().bridge_received > 0 {
            return;
        }
    }
    panic!("bridge subscriber never attached");
}

async fn eventually<F, Fut>(what: &str, mut check: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..300 {
        if check().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for: {what}");
}

/// Next event on `rx` matching `pred`, skipping anything else.
async fn next_matching<P>(rx: &mut Outbound, mut pred: P) -> OutboundEvent
where
    P: FnMut(&OutboundEvent) -> bool,
{
    tokio::time::timeout(Duration::from_secs(3), async {
        loop {
            match rx.recv().await {
                Some(event) if pred(&event) => return event,
                Some(_) => continue,
                None => panic!("outbound mailbox closed"),
            }
        }
    })
    .await
    .expect("expected event did not arrive")
}

async fn next_message(rx: &mut Outbound) -> ChatMessage {
    match next_matching(rx, |e| matches!(e, OutboundEvent::Message(_))).await {
        OutboundEvent::Message(m) => m,
        _ => unreachable!(),
    }
}

/// Whether anything matching `pred` is already waiting on `rx`.
fn has_waiting(rx: &mut Outbound, pred: impl Fn(&OutboundEvent) -> bool) -> bool {
    while let Ok(event) = rx.try_recv() {
        if pred(&event) {
            return true;
        }
    }
    false
}

fn direct(sender: UserId, receiver: UserId, content: &str) -> ChatMessage {
    ChatMessage {
        id: MessageId::new(),
        sender_id: sender,
        receiver_id: Some(receiver),
        group_id: None,
        content: content.to_string(),
        content_type: "text".to_string(),
        created_at: Utc::now(),
    }
}

fn to_group(sender: UserId, group: GroupId, content: &str) -> ChatMessage {
    ChatMessage {
        receiver_id: None,
        group_id: Some(group),
        ..direct(sender, UserId::new(), content)
    }
}

#[tokio::test]
async fn offline_recipient_gets_one_entry_and_drains_on_connect() {
    let h = &Harness::start();
    let (a, b) = (UserId::new(), UserId::new());
    let msg = direct(b, a, "while you were out");

    assert!(h.hub.submit(InboundEvent::Message(msg.clone())));
    eventually("entry queued", || async move { h.pending_len(OwnerKey::User(a)).await == 1 }).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(h.pending_len(OwnerKey::User(a)).await, 1);

    let (_session, mut rx) = h.connect(a).await;
    let received = next_message(&mut rx).await;
    assert_eq!(received.id, msg.id);
    assert_eq!(received.content, "while you were out");
    eventually("queue emptied", || async move { h.pending_len(OwnerKey::User(a)).await == 0 }).await;

    let snapshot = h.hub.metrics().snapshot();
    assert_eq!(snapshot.pending_enqueued, 1);
    assert_eq!(snapshot.pending_drained, 1);
    h.hub.shutdown().await;
}

#[tokio::test]
async fn every_device_of_the_recipient_receives_a_direct_message() {
    let h = &Harness::start();
    let (a, b) = (UserId::new(), UserId::new());
    let (_phone, mut phone_rx) = h.connect(a).await;
    let (_laptop, mut laptop_rx) = h.connect(a).await;

    let msg = direct(b, a, "hello both");
    h.hub.submit(InboundEvent::Message(msg.clone()));

    assert_eq!(next_message(&mut phone_rx).await.id, msg.id);
    assert_eq!(next_message(&mut laptop_rx).await.id, msg.id);
    assert_eq!(h.pending_len(OwnerKey::User(a)).await, 0);
    h.hub.shutdown().await;
}

#[tokio::test]
async fn live_delivery_is_acknowledged_to_the_sender() {
    let h = &Harness::start();
    let (a, b) = (UserId::new(), UserId::new());
    let (_sa, mut a_rx) = h.connect(a).await;
    let (_sb, mut b_rx) = h.connect(b).await;

    let msg = direct(b, a, "ping");
    h.hub.submit(InboundEvent::Message(msg.clone()));
    next_message(&mut a_rx).await;

    let ack = next_matching(&mut b_rx, |e| matches!(e, OutboundEvent::Delivered(_))).await;
    let OutboundEvent::Delivered(ack) = ack else { unreachable!() };
    assert_eq!(ack.message_ids, vec![msg.id]);
    assert_eq!(ack.deliverer_id, a);

    let marks = h.directory.delivery_marks();
    assert_eq!(marks.len(), 1);
    assert_eq!(marks[0].recipient, a);
    assert_eq!(marks[0].conversation, ConversationRef::Direct(b));
    h.hub.shutdown().await;
}

#[tokio::test]
async fn group_message_reaches_live_members_and_queues_the_rest() {
    let h = &Harness::start();
    let group = GroupId::new();
    let (a, b, c) = (UserId::new(), UserId::new(), UserId::new());
    for user in [a, b, c] {
        h.directory.add_member(group, user);
    }
    let (session_a, mut a_rx) = h.connect(a).await;
    assert!(session_a.is_member_of(group));

    let msg = to_group(a, group, "team update");
    h.hub.submit(InboundEvent::Message(msg.clone()));
    assert_eq!(next_message(&mut a_rx).await.id, msg.id);

    let owner_b = OwnerKey::GroupMember { group, member: b };
    let owner_c = OwnerKey::GroupMember { group, member: c };
    eventually("both offline members queued", || async move {
        h.pending_len(owner_b).await == 1 && h.pending_len(owner_c).await == 1
    })
    .await;
    assert_eq!(h.pending_len(OwnerKey::GroupMember { group, member: a }).await, 0);

    let (_session_b, mut b_rx) = h.connect(b).await;
    assert_eq!(next_message(&mut b_rx).await.id, msg.id);
    eventually("b drained", || async move { h.pending_len(owner_b).await == 0 }).await;
    assert_eq!(h.pending_len(owner_c).await, 1);
    h.hub.shutdown().await;
}

#[tokio::test]
async fn reconnect_drains_direct_and_group_entries() {
    let h = &Harness::start();
    let group = GroupId::new();
    let (me, peer) = (UserId::new(), UserId::new());
    h.directory.add_member(group, me);
    h.directory.add_member(group, peer);

    let directs = [direct(peer, me, "one"), direct(peer, me, "two")];
    let grouped = to_group(peer, group, "three");
    for m in directs.iter().chain([&grouped]) {
        h.hub.submit(InboundEvent::Message(m.clone()));
    }
    eventually("all queued", || async move {
        h.pending_len(OwnerKey::User(me)).await == 2
            && h.pending_len(OwnerKey::GroupMember { group, member: me }).await == 1
    })
    .await;

    let (_session, mut rx) = h.connect(me).await;
    let mut got = Vec::new();
    for _ in 0..3 {
        got.push(next_message(&mut rx).await.id);
    }
    for m in directs.iter().chain([&grouped]) {
        assert!(got.contains(&m.id));
    }
    eventually("queues emptied", || async move {
        h.pending_len(OwnerKey::User(me)).await == 0
            && h.pending_len(OwnerKey::GroupMember { group, member: me }).await == 0
    })
    .await;
    h.hub.shutdown().await;
}

#[tokio::test]
async fn disconnect_removes_session_everywhere_and_closes_mailbox() {
    let h = &Harness::start();
    let group = GroupId::new();
    let user = UserId::new();
    h.directory.add_member(group, user);
    let (session, mut rx) = h.connect(user).await;
    assert_eq!(h.hub.registry().by_group(group).len(), 1);

    let id = session.id;
    h.hub.disconnect(&session);
    eventually("session removed", || async move { h.hub.registry().get(id).is_none() }).await;

    assert!(h.hub.registry().by_user(user).is_empty());
    assert!(h.hub.registry().by_group(group).is_empty());
    assert!(!session.close(), "mailbox must already be closed");
    while rx.recv().await.is_some() {}
    assert_eq!(h.hub.metrics().snapshot().connections_active, 0);
    h.hub.shutdown().await;
}

#[tokio::test]
async fn slow_consumer_is_evicted_without_stalling_others() {
    let h = &Harness::with_config(RealtimeConfig {
        outbound_buffer_size: 2,
        ..RealtimeConfig::default()
    });
    let (slow, fast, sender) = (UserId::new(), UserId::new(), UserId::new());
    let (slow_session, _slow_rx) = h.connect(slow).await;
    let (_fast_session, mut fast_rx) = h.connect(fast).await;

    for i in 0..4 {
        h.hub.submit(InboundEvent::Message(direct(sender, slow, &format!("s{i}"))));
    }
    eventually("slow consumer evicted", || async move { !h.hub.registry().is_connected(slow) }).await;
    assert!(slow_session.is_closing());
    assert!(h.hub.metrics().snapshot().slow_consumer_evictions >= 1);

    for i in 0..3 {
        let msg = direct(sender, fast, &format!("f{i}"));
        h.hub.submit(InboundEvent::Message(msg.clone()));
        assert_eq!(next_message(&mut fast_rx).await.id, msg.id);
    }
    h.hub.shutdown().await;
}

#[tokio::test]
async fn feed_events_follow_visibility() {
    let h = &Harness::start();
    let (owner, friend, stranger) = (UserId::new(), UserId::new(), UserId::new());
    h.directory.relate(owner, friend);
    let (_so, mut owner_rx) = h.connect(owner).await;
    let (_sf, mut friend_rx) = h.connect(friend).await;
    let (_ss, mut stranger_rx) = h.connect(stranger).await;

    let is_feed = |e: &OutboundEvent| matches!(e, OutboundEvent::FeedEvent(_));
    let post = |visibility: &str| {
        InboundEvent::FeedEvent(FeedEvent {
            event_type: FeedEventType::PostCreated,
            payload: json!({ "owner_id": owner, "visibility": visibility }),
        })
    };

    h.hub.submit(post("public"));
    next_matching(&mut owner_rx, is_feed).await;
    next_matching(&mut friend_rx, is_feed).await;
    next_matching(&mut stranger_rx, is_feed).await;

    h.hub.submit(post("friends"));
    next_matching(&mut owner_rx, is_feed).await;
    next_matching(&mut friend_rx, is_feed).await;
    assert!(!has_waiting(&mut stranger_rx, is_feed));

    h.hub.submit(post("only_me"));
    next_matching(&mut owner_rx, is_feed).await;
    assert!(!has_waiting(&mut friend_rx, is_feed));
    assert!(!has_waiting(&mut stranger_rx, is_feed));
    h.hub.shutdown().await;
}

#[tokio::test]
async fn relations_exchange_presence_on_connect_and_disconnect() {
    let h = &Harness::start();
    let (a, b) = (UserId::new(), UserId::new());
    h.directory.relate(a, b);

    let (_sb, mut b_rx) = h.connect(b).await;
    let (sa, mut a_rx) = h.connect(a).await;

    let status_of = |user: UserId, status: PresenceStatus| {
        move |e: &OutboundEvent| {
            matches!(e, OutboundEvent::PresenceUpdate(p) if p.user_id == user && p.status == status)
        }
    };

    next_matching(&mut a_rx, status_of(b, PresenceStatus::Online)).await;
    next_matching(&mut a_rx, status_of(a, PresenceStatus::Online)).await;
    next_matching(&mut b_rx, status_of(a, PresenceStatus::Online)).await;

    h.hub.disconnect(&sa);
    next_matching(&mut b_rx, status_of(a, PresenceStatus::Offline)).await;
    eventually("a marked offline", || async move {
        !h.hub.presence().is_online(a).await.unwrap_or(true)
    })
    .await;
    h.hub.shutdown().await;
}

#[tokio::test]
async fn read_receipts_reach_the_original_sender() {
    let h = &Harness::start();
    let (reader, sender) = (UserId::new(), UserId::new());
    let msg = direct(sender, reader, "did you see this");
    h.directory.insert_message(&msg);
    let (_ss, mut sender_rx) = h.connect(sender).await;

    h.hub.submit(InboundEvent::ReadReceipt(ReadReceipt {
        reader_id: reader,
        message_ids: vec![msg.id],
    }));
    let receipt = next_matching(&mut sender_rx, |e| matches!(e, OutboundEvent::ReadReceipt(_))).await;
    let OutboundEvent::ReadReceipt(receipt) = receipt else { unreachable!() };
    assert_eq!(receipt.reader_id, reader);
    h.hub.shutdown().await;
}

#[tokio::test]
async fn bridge_delivers_messages_published_by_another_instance() {
    let h = &Harness::start();
    let (a, b) = (UserId::new(), UserId::new());
    let (_sa, mut a_rx) = h.connect(a).await;

    let peer = BridgePublisher::new(
        Arc::clone(&h.store),
        h.hub.config().bridge.channel.clone(),
        Uuid::new_v4(),
    );
    let msg = direct(b, a, "from elsewhere");

    // The subscription may not be up yet; keep publishing until it lands.
    let mut delivered = None;
    for _ in 0..100 {
        peer.publish(&msg).await.expect("publish");
        tokio::time::sleep(Duration::from_millis(20)).await;
        if let Ok(OutboundEvent::Message(m)) = a_rx.try_recv() {
            delivered = Some(m);
            break;
        }
    }
    assert_eq!(delivered.map(|m| m.id), Some(msg.id));
    assert!(h.hub.metrics().snapshot().bridge_received >= 1);
    h.hub.shutdown().await;
}

#[tokio::test]
async fn own_bridge_echo_is_ignored() {
    let h = &Harness::start();
    let (a, b) = (UserId::new(), UserId::new());
    let (_sa, mut a_rx) = h.connect(a).await;

    // Give the subscriber time to attach, then publish as this instance.
    tokio::time::sleep(Duration::from_millis(100)).await;
    let msg = direct(b, a, "once");
    h.hub.broadcast_message(msg.clone()).await.expect("broadcast");

    assert_eq!(next_message(&mut a_rx).await.id, msg.id);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!has_waiting(&mut a_rx, |e| matches!(e, OutboundEvent::Message(_))));
    h.hub.shutdown().await;
}

#[tokio::test]
async fn shutdown_closes_every_session() {
    let h = &Harness::start();
    let (_s1, mut rx1) = h.connect(UserId::new()).await;
    let (_s2, mut rx2) = h.connect(UserId::new()).await;

    h.hub.shutdown().await;

    assert_eq!(h.hub.registry().session_count(), 0);
    while rx1.recv().await.is_some() {}
    while rx2.recv().await.is_some() {}
    assert!(h.hub.connect(UserId::new()).await.is_err());
}

#[tokio::test]
async fn message_broadcast_to_an_offline_user_is_queued_once_across_instances() {
    let h = &Harness::start();
    let peer = h.peer();
    wait_for_bridge(&peer, &h.store).await;
    let (a, b) = (UserId::new(), UserId::new());

    let msg = direct(b, a, "nobody home");
    h.hub.broadcast_message(msg.clone()).await.expect("broadcast");
    eventually("entry queued", || async move { h.pending_len(OwnerKey::User(a)).await == 1 }).await;
    eventually("peer relayed it", || {
        let peer = Arc::clone(&peer);
        async move { peer.metrics().snapshot().bridge_received >= 2 }
    })
    .await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(h.hub.pending().list(&OwnerKey::User(a)).await.unwrap(), vec![msg.id]);
    assert_eq!(peer.metrics().snapshot().pending_enqueued, 0);
    peer.shutdown().await;
    h.hub.shutdown().await;
}

#[tokio::test]
async fn message_for_a_user_on_another_instance_is_delivered_not_queued() {
    let h = &Harness::start();
    let peer = h.peer();
    let (a, b) = (UserId::new(), UserId::new());
    let (_sa, mut a_rx) = connect_on(&peer, a).await;
    eventually("a online in the shared store", || async move {
        h.hub.presence().is_online(a).await.unwrap_or(false)
    })
    .await;
    wait_for_bridge(&peer, &h.store).await;

    let msg = direct(b, a, "over the bridge");
    h.hub.broadcast_message(msg.clone()).await.expect("broadcast");
    assert_eq!(next_message(&mut a_rx).await.id, msg.id);

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(h.pending_len(OwnerKey::User(a)).await, 0);
    assert_eq!(h.hub.metrics().snapshot().pending_enqueued, 0);
    assert!(!has_waiting(&mut a_rx, |e| matches!(e, OutboundEvent::Message(_))));
    peer.shutdown().await;
    h.hub.shutdown().await;
}

/// Queues 10 direct messages for `user` on a hub whose mailboxes hold 4.
async fn backlogged(user: UserId) -> (Harness, Vec<MessageId>) {
    let h = Harness::with_config(RealtimeConfig {
        outbound_buffer_size: 4,
        ..RealtimeConfig::default()
    });
    let sender = UserId::new();
    let mut ids = Vec::new();
    for i in 0..10 {
        let msg = direct(sender, user, &format!("m{i}"));
        ids.push(msg.id);
        assert!(h.hub.submit(InboundEvent::Message(msg)));
    }
    {
        let h = &h;
        eventually("backlog queued", || async move {
            h.pending_len(OwnerKey::User(user)).await == 10
        })
        .await;
    }
    (h, ids)
}

#[tokio::test]
async fn backlog_larger_than_the_mailbox_does_not_evict_the_reconnecting_session() {
    let user = UserId::new();
    let (h, _ids) = backlogged(user).await;
    let h = &h;

    let (session, _rx) = h.connect(user).await;
    eventually("drain started", || async move {
        h.pending_len(OwnerKey::User(user)).await < 10
    })
    .await;
    // Long enough for the drain to give up on a mailbox nobody reads.
    tokio::time::sleep(Duration::from_millis(1500)).await;

    assert!(h.hub.registry().get(session.id).is_some());
    assert!(!session.is_closing());
    assert_eq!(h.hub.metrics().snapshot().slow_consumer_evictions, 0);
    assert!(h.pending_len(OwnerKey::User(user)).await >= 6);
    h.hub.shutdown().await;
}

#[tokio::test]
async fn backlog_drains_completely_while_the_client_reads() {
    let user = UserId::new();
    let (h, ids) = backlogged(user).await;
    let h = &h;

    let (session, mut rx) = h.connect(user).await;
    let mut got = Vec::new();
    for _ in 0..ids.len() {
        got.push(next_message(&mut rx).await.id);
    }
    assert_eq!(got, ids);
    eventually("queue emptied", || async move {
        h.pending_len(OwnerKey::User(user)).await == 0
    })
    .await;
    assert!(!session.is_closing());
    assert_eq!(h.hub.metrics().snapshot().slow_consumer_evictions, 0);
    h.hub.shutdown().await;
}

/// Memory store whose list appends never complete.
#[derive(Debug)]
struct StalledLists(MemoryCacheProvider);

#[async_trait]
impl CacheProvider for StalledLists {
    async fn get(&self, key: &str) -> AppResult<Option<String>> {
        self.0.get(key).await
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> AppResult<()> {
        self.0.set(key, value, ttl).await
    }

    async fn exists(&self, key: &str) -> AppResult<bool> {
        self.0.exists(key).await
    }

    async fn expire(&self, key: &str, ttl: Duration) -> AppResult<bool> {
        self.0.expire(key, ttl).await
    }

    async fn list_push(&self, _key: &str, _value: &str, _max: usize, _ttl: Duration) -> AppResult<usize> {
        std::future::pending().await
    }

    async fn list_range(&self, key: &str) -> AppResult<Vec<String>> {
        self.0.list_range(key).await
    }

    async fn list_remove(&self, key: &str, value: &str) -> AppResult<usize> {
        self.0.list_remove(key, value).await
    }

    async fn health_check(&self) -> AppResult<bool> {
        Ok(true)
    }
}

#[tokio::test]
async fn stalled_store_does_not_stall_routing() {
    let config = CacheConfig::default();
    let store = Arc::new(CacheManager::from_providers(
        Arc::new(StalledLists(MemoryCacheProvider::new(&config.memory))),
        Arc::new(MemoryPubSub::new(config.memory.broadcast_capacity)),
    ));
    let h = &Harness::with_store(RealtimeConfig::default(), store);
    let (offline, online, sender) = (UserId::new(), UserId::new(), UserId::new());
    let (_s, mut rx) = h.connect(online).await;

    h.hub.submit(InboundEvent::Message(direct(sender, offline, "stuck")));
    let msg = direct(sender, online, "still flowing");
    h.hub.submit(InboundEvent::Message(msg.clone()));
    assert_eq!(next_message(&mut rx).await.id, msg.id);
    h.hub.shutdown().await;
}

#[tokio::test]
async fn typing_reaches_the_conversation_but_not_the_typist() {
    let h = &Harness::start();
    let group = GroupId::new();
    let (a, b) = (UserId::new(), UserId::new());
    h.directory.add_member(group, a);
    h.directory.add_member(group, b);
    let (_sa, mut a_rx) = h.connect(a).await;
    let (_sb, mut b_rx) = h.connect(b).await;
    let is_typing = |e: &OutboundEvent| matches!(e, OutboundEvent::Typing(t) if t.user_id == a);

    let typing = |receiver_id, group_id| {
        InboundEvent::Typing(Typing {
            user_id: a,
            receiver_id,
            group_id,
            is_typing: true,
        })
    };
    h.hub.submit(typing(None, Some(group)));
    next_matching(&mut b_rx, is_typing).await;
    h.hub.submit(typing(Some(b), None));
    next_matching(&mut b_rx, is_typing).await;
    h.hub.submit(typing(Some(a), None));

    // Settle the self-addressed indicator behind a marker on the same mailbox.
    h.hub.submit(typing(Some(b), None));
    next_matching(&mut b_rx, is_typing).await;
    assert!(!has_waiting(&mut a_rx, is_typing));
    h.hub.shutdown().await;
}

#[tokio::test]
async fn call_signal_reaches_only_its_target() {
    let h = &Harness::start();
    let (caller, callee, bystander) = (UserId::new(), UserId::new(), UserId::new());
    let (_s1, mut caller_rx) = h.connect(caller).await;
    let (_s2, mut callee_rx) = h.connect(callee).await;
    let (_s3, mut bystander_rx) = h.connect(bystander).await;

    h.hub.submit(InboundEvent::CallSignal(CallSignal {
        caller_id: caller,
        target_id: callee,
        signal_type: "offer".into(),
        payload: json!({ "sdp": "v=0" }),
    }));
    let OutboundEvent::CallSignal(signal) =
        next_matching(&mut callee_rx, |e| matches!(e, OutboundEvent::CallSignal(_))).await
    else {
        unreachable!()
    };
    assert_eq!(signal.caller_id, caller);
    assert_eq!(signal.payload["sdp"], "v=0");

    let is_call = |e: &OutboundEvent| matches!(e, OutboundEvent::CallSignal(_));
    assert!(!has_waiting(&mut caller_rx, is_call));
    assert!(!has_waiting(&mut bystander_rx, is_call));
    h.hub.shutdown().await;
}

#[tokio::test]
async fn edits_reach_both_direct_parties_and_the_whole_group() {
    let h = &Harness::start();
    let group = GroupId::new();
    let (a, b, c) = (UserId::new(), UserId::new(), UserId::new());
    h.directory.add_member(group, a);
    h.directory.add_member(group, c);
    let (_sa, mut a_rx) = h.connect(a).await;
    let (_sb, mut b_rx) = h.connect(b).await;
    let (_sc, mut c_rx) = h.connect(c).await;

    let private = direct(a, b, "typo");
    let public = to_group(a, group, "typo");
    h.directory.insert_message(&private);
    h.directory.insert_message(&public);
    let edit_of = |id: MessageId| {
        move |e: &OutboundEvent| matches!(e, OutboundEvent::Edit(edit) if edit.message_id == id)
    };
    let edit = |message_id| {
        InboundEvent::Edit(MessageEdited {
            message_id,
            editor_id: a,
            new_content: "fixed".into(),
        })
    };

    h.hub.submit(edit(private.id));
    next_matching(&mut a_rx, edit_of(private.id)).await;
    next_matching(&mut b_rx, edit_of(private.id)).await;
    assert!(!has_waiting(&mut c_rx, edit_of(private.id)));

    h.hub.submit(edit(public.id));
    next_matching(&mut a_rx, edit_of(public.id)).await;
    next_matching(&mut c_rx, edit_of(public.id)).await;
    assert!(!has_waiting(&mut b_rx, edit_of(public.id)));
    h.hub.shutdown().await;
}

#[tokio::test]
async fn rsvp_reaches_host_and_recipients_once() {
    let h = &Harness::start();
    let (host, guest, outsider) = (UserId::new(), UserId::new(), UserId::new());
    let (_sh, mut host_rx) = h.connect(host).await;
    let (_sg, mut guest_rx) = h.connect(guest).await;
    let (_so, mut outsider_rx) = h.connect(outsider).await;
    let is_rsvp = |e: &OutboundEvent| matches!(e, OutboundEvent::RsvpUpdate(_));

    h.hub.submit(InboundEvent::RsvpUpdate(RsvpUpdate {
        event_id: EventId::new(),
        user_id: guest,
        status: "going".into(),
        host_id: host,
        recipients: vec![guest, host, guest],
    }));
    next_matching(&mut host_rx, is_rsvp).await;
    next_matching(&mut guest_rx, is_rsvp).await;
    assert!(!has_waiting(&mut host_rx, is_rsvp));
    assert!(!has_waiting(&mut guest_rx, is_rsvp));
    assert!(!has_waiting(&mut outsider_rx, is_rsvp));
    h.hub.shutdown().await;
}

#[tokio::test]
async fn events_without_a_single_target_are_dropped_and_routing_continues() {
    let h = &Harness::start();
    let group = GroupId::new();
    let (a, b) = (UserId::new(), UserId::new());
    h.directory.add_member(group, a);
    let (_sa, mut a_rx) = h.connect(a).await;

    let reaction = |message_id, receiver_id, group_id| {
        InboundEvent::Reaction(ReactionChanged {
            message_id,
            user_id: b,
            emoji: "+1".into(),
            action: ReactionAction::Added,
            receiver_id,
            group_id,
        })
    };
    let seen = |peer_id, group_id| {
        InboundEvent::ConversationSeen(ConversationSeen {
            user_id: b,
            peer_id,
            group_id,
            seen_at: Utc::now(),
        })
    };

    h.hub.submit(reaction(MessageId::new(), Some(a), Some(group)));
    h.hub.submit(reaction(MessageId::new(), None, None));
    let valid = MessageId::new();
    h.hub.submit(reaction(valid, Some(a), None));
    let OutboundEvent::Reaction(got) =
        next_matching(&mut a_rx, |e| matches!(e, OutboundEvent::Reaction(_))).await
    else {
        unreachable!()
    };
    assert_eq!(got.message_id, valid);

    h.hub.submit(seen(Some(a), Some(group)));
    h.hub.submit(seen(None, None));
    h.hub.submit(seen(Some(a), None));
    let OutboundEvent::ConversationSeen(got) =
        next_matching(&mut a_rx, |e| matches!(e, OutboundEvent::ConversationSeen(_))).await
    else {
        unreachable!()
    };
    assert_eq!((got.peer_id, got.group_id), (Some(a), None));

    let msg = direct(b, a, "still here");
    h.hub.submit(InboundEvent::Message(msg.clone()));
    assert_eq!(next_message(&mut a_rx).await.id, msg.id);
    h.hub.shutdown().await;
}
