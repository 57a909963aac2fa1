use std::sync::Arc;

use parking_lot::Mutex;

use roomwire_client::contract::{ChatTransport, ChatTransportExt};
use roomwire_client::storage::{FileStorage, MemoryStorage, Storage};
use roomwire_client::store::{LocalTransport, RoomStore, DEFAULT_ROOMS};
use roomwire_client::EventFilter;
use roomwire_core::protocol::{ChatEvent, EventKind};
use roomwire_core::MAX_ROOM_MESSAGES;

fn open() -> (Arc<MemoryStorage>, Arc<RoomStore>) {
    let storage = Arc::new(MemoryStorage::new());
    let store = RoomStore::open(storage.clone(), "safespace").unwrap();
    (storage, store)
}

#[test]
fn seeds_starter_rooms_once() {
    let (storage, store) = open();
    let ids: Vec<String> = store.rooms().unwrap().into_iter().map(|r| r.id).collect();
    assert_eq!(ids, DEFAULT_ROOMS.iter().map(|(id, _)| id.to_string()).collect::<Vec<_>>());

    store.add_room("r1", "Room One").unwrap();
    // A second instance over the same storage must not overwrite.
    let again = RoomStore::open(storage, "safespace").unwrap();
    assert_eq!(again.rooms().unwrap().len(), DEFAULT_ROOMS.len() + 1);
}

#[test]
fn keeps_the_most_recent_hundred_messages() {
    let (_, store) = open();
    store.add_room("r1", "Room One").unwrap();
    for i in 0..105 {
        store.send_message("r1", &format!("message {i}")).unwrap();
    }

    let msgs = store.room_messages("r1").unwrap();
    assert_eq!(msgs.len(), MAX_ROOM_MESSAGES);
    assert_eq!(msgs[0].message, "message 5");
    assert_eq!(msgs[99].message, "message 104");
}

#[test]
fn message_count_tracks_sends_below_the_cap() {
    let (_, store) = open();
    for n in 1..=3 {
        store.send_message("anxiety-panic", "hello").unwrap();
        assert_eq!(store.room_messages("anxiety-panic").unwrap().len(), n);
    }
}

#[test]
fn send_trims_and_stamps_identity() {
    let (_, store) = open();
    let me = store.current_user().unwrap();
    let msg = store
        .send_message("general-support", "   hi there  ")
        .unwrap()
        .expect("room exists");
    assert_eq!(msg.message, "hi there");
    assert_eq!(msg.user_id, me.id);
    assert_eq!(msg.username, me.username);
    assert!(msg.id.starts_with("msg_"));

    // Blank text is accepted at this layer.
    assert!(store.send_message("general-support", "   ").unwrap().is_some());
}

#[test]
fn unknown_room_is_a_silent_no_op() {
    let (storage, store) = open();
    let before = storage.get(store.rooms_key()).unwrap();
    assert!(store.send_message("nope", "hi").unwrap().is_none());
    assert!(!store.join_room("nope").unwrap());
    assert!(!store.leave_room("nope").unwrap());
    assert!(store.room_messages("nope").unwrap().is_empty());
    assert_eq!(storage.get(store.rooms_key()).unwrap(), before);
}

#[test]
fn join_is_idempotent() {
    let (_, store) = open();
    let me = store.current_user().unwrap();
    assert!(store.join_room("depression-support").unwrap());
    assert!(!store.join_room("depression-support").unwrap());
    assert_eq!(store.active_users("depression-support").unwrap(), vec![me.id]);

    assert!(store.leave_room("depression-support").unwrap());
    assert!(!store.leave_room("depression-support").unwrap());
    assert!(store.active_users("depression-support").unwrap().is_empty());
}

#[test]
fn identity_is_stable_across_restarts_until_cleared() {
    let (storage, store) = open();
    let first = store.current_user().unwrap();
    assert_eq!(store.current_user().unwrap(), first);

    let restarted = RoomStore::open(storage.clone(), "safespace").unwrap();
    assert_eq!(restarted.current_user().unwrap(), first);

    restarted.clear_all_data().unwrap();
    let fresh = restarted.current_user().unwrap();
    assert_ne!(fresh, first);
    assert_eq!(store.current_user().unwrap(), fresh);
}

#[test]
fn corrupt_identity_is_regenerated() {
    let (storage, store) = open();
    storage.set("safespace_user", "{not json").unwrap();
    let user = store.current_user().unwrap();
    assert!(user.id.starts_with("user_"));
    assert_eq!(store.current_user().unwrap(), user);
}

#[test]
fn clear_all_data_reseeds() {
    let (_, store) = open();
    store.send_message("general-support", "hi").unwrap();
    store.add_room("extra", "Extra").unwrap();

    store.clear_all_data().unwrap();
    let rooms = store.rooms().unwrap();
    assert_eq!(rooms.len(), DEFAULT_ROOMS.len());
    assert!(rooms.iter().all(|r| r.messages.is_empty() && r.active_users.is_empty()));
}

#[test]
fn subscribe_replays_then_follows_changes() {
    let (_, store) = open();
    let seen: Arc<Mutex<Vec<usize>>> = Arc::new(Mutex::new(Vec::new()));

    let s = Arc::clone(&seen);
    let sub = store
        .subscribe(move |rooms| {
            let total = rooms.iter().map(|r| r.messages.len()).sum();
            s.lock().push(total);
        })
        .unwrap();

    store.send_message("general-support", "one").unwrap();
    store.send_message("general-support", "two").unwrap();
    assert_eq!(*seen.lock(), vec![0, 1, 2]);

    sub.unsubscribe();
    store.send_message("general-support", "three").unwrap();
    store.join_room("general-support").unwrap();
    assert_eq!(*seen.lock(), vec![0, 1, 2]);
}

#[test]
fn listeners_are_notified_in_registration_order() {
    let (_, store) = open();
    let order = Arc::new(Mutex::new(Vec::new()));

    let o = Arc::clone(&order);
    let _a = store.subscribe(move |_| o.lock().push("a")).unwrap();
    let o = Arc::clone(&order);
    let _b = store.subscribe(move |_| o.lock().push("b")).unwrap();
    order.lock().clear();

    store.join_room("anxiety-panic").unwrap();
    assert_eq!(*order.lock(), vec!["a", "b"]);
}

#[test]
fn concurrent_instances_do_not_lose_updates() {
    let storage = Arc::new(MemoryStorage::new());
    let tab_a = RoomStore::open(storage.clone(), "safespace").unwrap();
    let tab_b = RoomStore::open(storage.clone(), "safespace").unwrap();

    let handles: Vec<_> = [tab_a, tab_b]
        .into_iter()
        .map(|store| {
            std::thread::spawn(move || {
                for i in 0..20 {
                    store.send_message("general-support", &format!("m{i}")).unwrap();
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    let check = RoomStore::open(storage, "safespace").unwrap();
    assert_eq!(check.room_messages("general-support").unwrap().len(), 40);
}

#[test]
fn reload_fans_out_external_changes() {
    let storage = Arc::new(MemoryStorage::new());
    let tab_a = RoomStore::open(storage.clone(), "safespace").unwrap();
    let tab_b = RoomStore::open(storage.clone(), "safespace").unwrap();

    let latest = Arc::new(Mutex::new(0usize));
    let l = Arc::clone(&latest);
    let _sub = tab_a
        .subscribe(move |rooms| {
            *l.lock() = rooms.iter().map(|r| r.messages.len()).sum();
        })
        .unwrap();

    tab_b.send_message("anxiety-panic", "from the other tab").unwrap();
    assert_eq!(*latest.lock(), 0);
    tab_a.reload().unwrap();
    assert_eq!(*latest.lock(), 1);
}

#[tokio::test]
async fn follower_picks_up_writes_from_other_instances() {
    let storage = Arc::new(MemoryStorage::new());
    let tab_a = RoomStore::open(storage.clone(), "safespace").unwrap();
    let tab_b = RoomStore::open(storage.clone(), "safespace").unwrap();
    let follower = tab_a.follow_storage();

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let _sub = tab_a
        .subscribe(move |rooms| {
            let total: usize = rooms.iter().map(|r| r.messages.len()).sum();
            let _ = tx.send(total);
        })
        .unwrap();
    assert_eq!(rx.recv().await, Some(0));

    tab_b.send_message("general-support", "hello from b").unwrap();
    assert_eq!(rx.recv().await, Some(1));

    follower.abort();
}

#[test]
fn rejects_non_slug_room_ids() {
    let (_, store) = open();
    assert!(store.add_room("Not A Slug", "x").is_err());
    assert!(store.add_room("peer-support", "Peer Support").unwrap());
    assert!(!store.add_room("peer-support", "Duplicate").unwrap());
}

#[test]
fn file_backed_store_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let first = {
        let store = RoomStore::open(Arc::new(FileStorage::open(dir.path()).unwrap()), "safespace").unwrap();
        store.send_message("depression-support", "persisted").unwrap();
        store.current_user().unwrap()
    };

    let store = RoomStore::open(Arc::new(FileStorage::open(dir.path()).unwrap()), "safespace").unwrap();
    assert_eq!(store.current_user().unwrap(), first);
    let msgs = store.room_messages("depression-support").unwrap();
    assert_eq!(msgs.len(), 1);
    assert_eq!(msgs[0].message, "persisted");
}

#[test]
fn file_handles_on_one_dir_do_not_lose_updates() {
    let dir = tempfile::tempdir().unwrap();
    let open_tab = || {
        let storage = Arc::new(FileStorage::open(dir.path()).unwrap());
        RoomStore::open(storage, "safespace").unwrap()
    };
    let tabs = [open_tab(), open_tab()];

    std::thread::scope(|scope| {
        for store in &tabs {
            scope.spawn(move || {
                for i in 0..40 {
                    store.send_message("general-support", &format!("m{i}")).unwrap();
                }
            });
        }
    });

    let check = open_tab();
    assert_eq!(check.room_messages("general-support").unwrap().len(), 80);
}

#[tokio::test]
async fn local_transport_echoes_effective_mutations() {
    let (_, store) = open();
    let transport = LocalTransport::new(Arc::clone(&store));
    let kinds = Arc::new(Mutex::new(Vec::new()));

    let k = Arc::clone(&kinds);
    let sub = transport.on(EventFilter::All, move |env| k.lock().push(env.kind()));

    let me = store.current_user().unwrap();
    transport.connect(&me).await.unwrap();
    transport.join_room("general-support").await.unwrap();
    transport.join_room("general-support").await.unwrap();
    transport.send_message("general-support", " hi ").await.unwrap();
    transport.send_message("missing-room", "hi").await.unwrap();
    transport.leave_room("general-support").await.unwrap();

    assert_eq!(
        *kinds.lock(),
        vec![EventKind::Join, EventKind::Join, EventKind::Message, EventKind::Leave]
    );
    assert_eq!(store.room_messages("general-support").unwrap()[0].message, "hi");

    sub.unsubscribe();
    transport.send_message("general-support", "again").await.unwrap();
    assert_eq!(kinds.lock().len(), 4);
}

#[tokio::test]
async fn local_transport_disconnect_drops_listeners() {
    let (_, store) = open();
    let transport = LocalTransport::new(Arc::clone(&store));
    let hits = Arc::new(Mutex::new(0));

    let h = Arc::clone(&hits);
    let _sub = transport.on(EventKind::Message.into(), move |env| {
        assert!(matches!(env.event, ChatEvent::Message(_)));
        *h.lock() += 1;
    });
    transport.send_message("general-support", "one").await.unwrap();
    transport.disconnect().await;
    transport.send_message("general-support", "two").await.unwrap();
    assert_eq!(*hits.lock(), 1);
}
