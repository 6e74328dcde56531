//! # Validation Tier Tests (T0-T4)
//!
//! End-to-end scenarios against the public store surface.
//!
//! ## Tiers
//! - T0: Record Integrity
//! - T1: Tree Maintenance
//! - T2: Lazy Expansion
//! - T3: Listener Memoization
//! - T4: Serialized Concurrency

use arbor_core::{
    ExpandError, Expandable, ExpansionPolicy, Namespace, Payload, Record, RecordId, Store,
};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

fn ns() -> Namespace {
    Namespace::new("x", "y", "z")
}

fn ids(records: &[Record]) -> Vec<String> {
    records.iter().map(|r| r.id.0.clone()).collect()
}

// =============================================================================
// TIER T0: RECORD INTEGRITY
// =============================================================================

mod t0_record_integrity {
    use super::*;

    /// T0.1: A plain record is stored and trivially realised.
    #[test]
    fn plain_add_is_realised() {
        let store = Store::new().expect("store");
        store.add([Record::new("a", ns())]).wait().expect("add");

        let a = store.get(&RecordId::new("a")).expect("present");
        assert!(a.children_realised);
        assert_eq!(ids(&store.filter(|_| true)), vec!["a"]);
        store.shutdown();
    }

    /// T0.2: Adding the same id twice keeps exactly one record.
    #[test]
    fn add_twice_keeps_one() {
        let store = Store::new().expect("store");
        store.add([Record::new("a", ns())]).wait().expect("add");
        store.add([Record::new("a", ns())]).wait().expect("add");

        assert_eq!(store.len(), 1);
        store.shutdown();
    }

    /// T0.3: Setting the same id twice keeps the latest payload.
    #[test]
    fn set_twice_keeps_latest() {
        let store = Store::new().expect("store");
        store
            .set([Record::new("a", ns()).with_payload(serde_json::json!(1))])
            .wait()
            .expect("set");
        store
            .set([Record::new("a", ns()).with_payload(serde_json::json!(2))])
            .wait()
            .expect("set");

        let all = store.filter(|_| true);
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].payload.as_value(), Some(&serde_json::json!(2)));
        store.shutdown();
    }

    /// T0.4: A rejected batch leaves nothing behind.
    #[test]
    fn colliding_batch_is_rejected_whole() {
        let store = Store::new().expect("store");
        store.add([Record::new("a", ns())]).wait().expect("add");
        store
            .add([Record::new("b", ns()), Record::new("a", ns())])
            .wait()
            .expect("add");

        assert_eq!(ids(&store.records()), vec!["a"]);
        store.shutdown();
    }

    /// T0.5: Namespace filtering is exact and sorted by id.
    #[test]
    fn filter_by_namespace() {
        let store = Store::new().expect("store");
        let other = Namespace::new("x", "y", "other");
        store
            .add([
                Record::new("c", ns()),
                Record::new("b", other.clone()),
                Record::new("a", ns()),
            ])
            .wait()
            .expect("add");

        assert_eq!(ids(&store.filter_by_ns(&ns())), vec!["a", "c"]);
        assert_eq!(ids(&store.filter_by_ns(&other)), vec!["b"]);
        store.shutdown();
    }
}

// =============================================================================
// TIER T1: TREE MAINTENANCE
// =============================================================================

mod t1_tree_maintenance {
    use super::*;

    fn family(store: &Store) {
        store
            .add([
                Record::new("grandparent", ns()),
                Record::new("parent", ns()).with_parent("grandparent"),
                Record::new("child", ns()).with_parent("parent"),
                Record::new("unrelated", ns()),
            ])
            .wait()
            .expect("add");
    }

    /// T1.1: Removing a grandparent removes the whole line.
    #[test]
    fn cascading_removal() {
        let store = Store::new().expect("store");
        family(&store);

        store
            .remove(|r| r.id.as_str() == "grandparent")
            .wait()
            .expect("remove");

        assert_eq!(ids(&store.records()), vec!["unrelated"]);
        store.shutdown();
    }

    /// T1.2: Ancestry walks nearest parent first.
    #[test]
    fn ancestry_order() {
        let store = Store::new().expect("store");
        family(&store);

        let chain = store.ancestry(&RecordId::new("child"));
        assert_eq!(ids(&chain), vec!["parent", "grandparent"]);
        store.shutdown();
    }

    /// T1.3: In-place updates keep the record's position.
    #[test]
    fn update_keeps_position() {
        let store = Store::new().expect("store");
        family(&store);

        store
            .update(&RecordId::new("parent"), |r| {
                r.payload = Payload::from(serde_json::json!("touched"));
            })
            .expect("update");

        let records = store.records();
        assert_eq!(records[1].id.as_str(), "parent");
        assert_eq!(records[1].payload.as_value(), Some(&serde_json::json!("touched")));
        store.shutdown();
    }

    /// T1.4: Key/value settings live beside the records.
    #[test]
    fn key_vals() {
        let store = Store::new().expect("store");
        let _ = store.set_key_val("view.sort", "name");
        store.set_key_val("view.dir", "asc").wait().expect("set");

        assert_eq!(store.get_key_val("view.sort").as_deref(), Some("name"));
        assert_eq!(
            store.key_vals_with_prefix("view.").keys().collect::<Vec<_>>(),
            vec!["view.dir", "view.sort"]
        );
        assert!(store.is_empty());
        store.shutdown();
    }
}

// =============================================================================
// TIER T2: LAZY EXPANSION
// =============================================================================

mod t2_lazy_expansion {
    use super::*;

    /// A directory-like payload whose entries are files or more directories.
    #[derive(Debug)]
    struct Folder {
        path: String,
        depth: usize,
        policy: ExpansionPolicy,
        calls: Arc<AtomicUsize>,
    }

    impl Expandable for Folder {
        fn kind(&self) -> &str {
            "folder"
        }

        fn fields(&self) -> BTreeMap<String, String> {
            BTreeMap::from([("path".to_string(), self.path.clone())])
        }

        fn policy(&self) -> ExpansionPolicy {
            self.policy
        }

        fn children(&self, _store: &Store) -> Result<Vec<Record>, ExpandError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let file = Record::new(format!("{}/file", self.path), Namespace::new("fs", "list", "file"));
            if self.depth == 0 {
                return Ok(vec![file]);
            }
            let sub = Record::new(format!("{}/sub", self.path), Namespace::new("fs", "list", "dir"))
                .with_payload(Payload::expandable(Folder {
                    path: format!("{}/sub", self.path),
                    depth: self.depth - 1,
                    policy: self.policy,
                    calls: Arc::clone(&self.calls),
                }));
            Ok(vec![file, sub])
        }
    }

    fn folder(depth: usize, policy: ExpansionPolicy) -> (Record, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let record = Record::new("root", Namespace::new("fs", "list", "dir")).with_payload(
            Payload::expandable(Folder {
                path: "root".to_string(),
                depth,
                policy,
                calls: Arc::clone(&calls),
            }),
        );
        (record, calls)
    }

    /// T2.1: Eager payloads are realised to the bottom on add.
    #[test]
    fn eager_tree_realised_on_add() {
        let store = Store::new().expect("store");
        let (root, calls) = folder(2, ExpansionPolicy::Eager);
        store.add([root]).wait().expect("add");

        assert_eq!(store.len(), 6);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(
            ids(&store.ancestry(&RecordId::new("root/sub/sub/file"))),
            vec!["root/sub/sub", "root/sub", "root"]
        );
        store.shutdown();
    }

    /// T2.2: Expansion is idempotent: no duplicate children, no repeat calls.
    #[test]
    fn children_request_is_idempotent() {
        let store = Store::new().expect("store");
        let (root, calls) = folder(1, ExpansionPolicy::Deferred);
        store.add([root.clone()]).wait().expect("add");

        let first = store.children(&root).expect("children");
        let second = store.children(&root).expect("children");

        assert_eq!(ids(&first), vec!["root/file", "root/sub"]);
        assert_eq!(ids(&second), ids(&first));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(store.len(), 3);
        store.shutdown();
    }

    /// T2.3: Deferred children open one level at a time.
    #[test]
    fn deferred_opens_level_by_level() {
        let store = Store::new().expect("store");
        let (root, _calls) = folder(1, ExpansionPolicy::Deferred);
        store.add([root.clone()]).wait().expect("add");

        let level1 = store.children(&root).expect("children");
        let sub = level1
            .iter()
            .find(|r| r.id.as_str() == "root/sub")
            .expect("sub");
        assert!(!sub.children_realised);

        let level2 = store.children(sub).expect("children");
        assert_eq!(ids(&level2), vec!["root/sub/file"]);
        assert!(
            store
                .get(&RecordId::new("root/sub"))
                .expect("sub")
                .children_realised
        );
        store.shutdown();
    }

    /// T2.4: Suppressed payloads never expand, even on request.
    #[test]
    fn suppressed_never_expands() {
        let store = Store::new().expect("store");
        let (root, calls) = folder(1, ExpansionPolicy::Suppressed);
        store.add([root.clone()]).wait().expect("add");

        assert!(store.children(&root).expect("children").is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(store.len(), 1);
        store.shutdown();
    }
}

// =============================================================================
// TIER T3: LISTENER MEMOIZATION
// =============================================================================

mod t3_listener_memoization {
    use super::*;

    type Calls = Arc<Mutex<Vec<(Vec<String>, Vec<String>)>>>;

    fn watch_kind(store: &Store, kind: &'static str) -> Calls {
        let calls: Calls = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&calls);
        store
            .add_listener(
                kind,
                move |r| r.ns.kind == kind,
                move |old, new| sink.lock().push((ids(old), ids(new))),
            )
            .wait()
            .expect("register");
        calls
    }

    /// T3.1: Unchanged subsets do not re-fire; changes fire exactly once.
    #[test]
    fn fires_only_on_change() {
        let store = Store::new().expect("store");
        let calls = watch_kind(&store, "file");

        store
            .add([Record::new("f1", Namespace::new("x", "y", "file"))])
            .wait()
            .expect("add");
        store
            .add([Record::new("d1", Namespace::new("x", "y", "dir"))])
            .wait()
            .expect("add");
        store
            .add([Record::new("f2", Namespace::new("x", "y", "file"))])
            .wait()
            .expect("add");

        let calls = calls.lock();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0], (vec![], vec!["f1".to_string()]));
        assert_eq!(
            calls[1],
            (vec!["f1".to_string()], vec!["f1".to_string(), "f2".to_string()])
        );
        store.shutdown();
    }

    /// T3.2: A listener whose filter matches nothing is never called.
    #[test]
    fn empty_subset_never_fires() {
        let store = Store::new().expect("store");
        let calls = watch_kind(&store, "nothing");

        store.add([Record::new("a", ns())]).wait().expect("add");

        assert!(calls.lock().is_empty());
        store.shutdown();
    }

    /// T3.3: A panicking listener does not stop the worker.
    #[test]
    #[allow(clippy::panic)]
    fn panicking_listener_is_contained() {
        let store = Store::new().expect("store");
        let _ = store.add_listener(
            "bad",
            |_| true,
            |_, new| {
                if !new.is_empty() {
                    panic!("listener failure")
                }
            },
        );
        let calls = watch_kind(&store, "z");

        store.add([Record::new("a", ns())]).wait().expect("add");
        store.add([Record::new("b", ns())]).wait().expect("add");

        assert_eq!(calls.lock().len(), 2);
        assert_eq!(store.len(), 2);
        store.shutdown();
    }

    /// T3.4: A listener may write back into the store.
    #[test]
    fn listener_can_submit_follow_up_mutation() {
        let store = Store::new().expect("store");
        let writer = store.clone();
        let _ = store.add_listener(
            "mirror",
            |r| r.ns.kind == "z",
            move |_, new| {
                let _ = writer.set_key_val("seen", new.len().to_string());
            },
        );

        store.add([Record::new("a", ns())]).wait().expect("add");
        // The follow-up write was queued behind the add.
        store.update_state(|state| state).wait().expect("drain");

        assert_eq!(store.get_key_val("seen").as_deref(), Some("1"));
        store.shutdown();
    }
}

// =============================================================================
// TIER T4: SERIALIZED CONCURRENCY
// =============================================================================

mod t4_serialized_concurrency {
    use super::*;
    use arbor_core::Tag;
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;

    /// A deferred payload whose producer writes a tag onto another record.
    #[derive(Debug)]
    struct Stamping {
        target: RecordId,
    }

    impl Expandable for Stamping {
        fn kind(&self) -> &str {
            "stamping"
        }

        fn fields(&self) -> BTreeMap<String, String> {
            BTreeMap::from([("target".to_string(), self.target.to_string())])
        }

        fn policy(&self) -> ExpansionPolicy {
            ExpansionPolicy::Deferred
        }

        fn children(&self, store: &Store) -> Result<Vec<Record>, ExpandError> {
            store
                .update(&self.target, |r| {
                    r.tags.insert(Tag::new("opened"));
                })
                .map_err(|e| ExpandError::Failed(e.to_string()))?;
            Ok(vec![Record::new("stamp/child", ns())])
        }
    }

    /// T4.1: Every producer's writes land, each producer in its own order.
    #[test]
    fn concurrent_producers_are_serialized() {
        let store = Store::new().expect("store");
        let producers: Vec<_> = (0..4)
            .map(|p| {
                let store = store.clone();
                thread::spawn(move || {
                    for i in 0..50 {
                        let _ = store.add([Record::new(format!("p{p}-{i:02}"), ns())]);
                    }
                })
            })
            .collect();
        for producer in producers {
            producer.join().expect("producer");
        }
        store.update_state(|state| state).wait().expect("drain");

        let records = store.records();
        assert_eq!(records.len(), 200);
        for p in 0..4 {
            let mine: Vec<String> = records
                .iter()
                .map(|r| r.id.0.clone())
                .filter(|id| id.starts_with(&format!("p{p}-")))
                .collect();
            let mut sorted = mine.clone();
            sorted.sort();
            assert_eq!(mine, sorted);
        }
        store.shutdown();
    }

    /// T4.2: Concurrent in-place updates never lose a write.
    #[test]
    fn concurrent_updates_do_not_race() {
        let store = Store::new().expect("store");
        store
            .add([Record::new("counter", ns()).with_payload(serde_json::json!(0))])
            .wait()
            .expect("add");

        let workers: Vec<_> = (0..4)
            .map(|_| {
                let store = store.clone();
                thread::spawn(move || {
                    for _ in 0..25 {
                        store
                            .update(&RecordId::new("counter"), |r| {
                                let n = r.payload.as_value().and_then(|v| v.as_u64()).unwrap_or(0);
                                r.payload = Payload::from(serde_json::json!(n + 1));
                            })
                            .expect("update");
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().expect("worker");
        }

        let counter = store.get(&RecordId::new("counter")).expect("counter");
        assert_eq!(counter.payload.as_value(), Some(&serde_json::json!(100)));
        store.shutdown();
    }

    /// T4.3: Readers see either the old or the new state, never a mix.
    #[test]
    fn readers_see_whole_batches() {
        let store = Store::new().expect("store");
        let batch: Vec<Record> = (0..20).map(|i| Record::new(format!("r{i:02}"), ns())).collect();
        let handle = store.add(batch);

        let seen = store.len();
        assert!(seen == 0 || seen == 20);
        handle.wait().expect("add");
        assert_eq!(store.len(), 20);
        store.shutdown();
    }

    /// T4.4: A listener may update in place while another thread's update
    /// is waiting on the mutation that triggered it.
    #[test]
    fn listener_update_during_update_completes() {
        let store = Store::new().expect("store");
        store
            .add([Record::new("a", ns()), Record::new("b", ns())])
            .wait()
            .expect("add");

        let writer = store.clone();
        store
            .add_listener(
                "follow-a",
                |r| r.id.as_str() == "a",
                move |_, new| {
                    if new.iter().any(|r| r.has_tag("touched")) {
                        let _ = writer.update(&RecordId::new("b"), |r| {
                            r.tags.insert(Tag::new("followed"));
                        });
                    }
                },
            )
            .wait()
            .expect("register");

        let (done_tx, done_rx) = mpsc::channel();
        let updater = store.clone();
        thread::spawn(move || {
            let result = updater.update(&RecordId::new("a"), |r| {
                r.tags.insert(Tag::new("touched"));
            });
            let _ = done_tx.send(result);
        });

        done_rx
            .recv_timeout(Duration::from_secs(5))
            .expect("update returned")
            .expect("update");
        store.update_state(|state| state).wait().expect("drain");

        assert!(store.get(&RecordId::new("a")).expect("a").has_tag("touched"));
        assert!(store.get(&RecordId::new("b")).expect("b").has_tag("followed"));
        store.shutdown();
    }

    /// T4.5: A producer may write into the store during explicit expansion.
    #[test]
    fn producer_update_during_children_completes() {
        let store = Store::new().expect("store");
        let log = Record::new("log", ns());
        let stamp = Record::new("stamp", ns()).with_payload(Payload::expandable(Stamping {
            target: log.id.clone(),
        }));
        store.add([log, stamp.clone()]).wait().expect("add");

        let (done_tx, done_rx) = mpsc::channel();
        let reader = store.clone();
        thread::spawn(move || {
            let _ = done_tx.send(reader.children(&stamp));
        });

        let children = done_rx
            .recv_timeout(Duration::from_secs(5))
            .expect("children returned")
            .expect("children");

        assert_eq!(ids(&children), vec!["stamp/child"]);
        assert!(store.get(&RecordId::new("log")).expect("log").has_tag("opened"));
        assert!(store.get(&RecordId::new("stamp")).expect("stamp").children_realised);
        store.shutdown();
    }
}
