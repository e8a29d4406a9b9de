//! Tests for ghost-runtime: cache, tasks, process stack, runtime driver, sessions, queues

use ghost_core::{Error, Input, Trace, Url};
use ghost_runtime::driver::{locker_key, process_id_key, process_key, task_key};
use ghost_runtime::*;
use serde_json::json;
use std::sync::Arc;

fn task(think: &str) -> Task {
    Task::new(Url::new(think))
}

fn forgettable(think: &str, status: TaskStatus) -> Task {
    let mut t = task(think);
    t.is_forgettable = true;
    t.status = status;
    t
}

fn process_with(tasks: Vec<Task>) -> Process {
    // `tasks` are listed bottom-up; the first one is root.
    let mut iter = tasks.into_iter();
    let root = iter.next().expect("root task");
    let mut process = Process::new("S1", "P1", root);
    process.store_task(iter);
    process
}

// ===========================================================================
// MemoryCache
// ===========================================================================

#[test]
fn cache_set_get_remove() {
    let cache = MemoryCache::new();
    cache.set("a", "1", None).unwrap();
    cache.set("b", "2", Some(60)).unwrap();
    assert_eq!(cache.get("a").unwrap().as_deref(), Some("1"));
    assert_eq!(cache.remove(&["a", "missing"]).unwrap(), 1);
    assert_eq!(cache.get("a").unwrap(), None);
    assert_eq!(cache.keys(""), vec!["b".to_string()]);
}

#[test]
fn cache_lock_is_exclusive() {
    let cache = MemoryCache::new();
    assert!(cache.lock("l", "t1", 30).unwrap());
    assert!(!cache.lock("l", "t2", 30).unwrap());
    assert!(!cache.unlock("l", "t2").unwrap());
    assert!(cache.unlock("l", "t1").unwrap());
    assert!(cache.lock("l", "t2", 30).unwrap());
}

#[test]
fn cache_hash_members() {
    let cache = MemoryCache::new();
    cache.set_member("h", "x", "1").unwrap();
    cache.set_member("h", "y", "2").unwrap();
    assert_eq!(cache.get_member("h", "x").unwrap().as_deref(), Some("1"));
    assert!(cache.remove_member("h", "x").unwrap());
    assert!(!cache.remove_member("h", "x").unwrap());
    assert_eq!(cache.get_member("h", "y").unwrap().as_deref(), Some("2"));
}

#[test]
fn cache_expire_only_existing() {
    let cache = MemoryCache::new();
    assert!(!cache.expire("nope", 10).unwrap());
    cache.set("k", "v", None).unwrap();
    assert!(cache.expire("k", 10).unwrap());
    assert!(cache.expire("k", 0).unwrap());
    assert_eq!(cache.get("k").unwrap(), None);
}

// ===========================================================================
// Task
// ===========================================================================

#[test]
fn tid_ignores_stage_and_args() {
    let a = Task::make_tid(&Url::stage("booking", "ask"), None);
    let b = Task::make_tid(&Url::new("booking").with_arg("x", json!(1)), None);
    assert_eq!(a, b);
    assert_eq!(a.len(), 64);
    assert_ne!(a, Task::make_tid(&Url::new("booking"), Some("2")));
    assert_ne!(a, Task::make_tid(&Url::new("weather"), None));
}

#[test]
fn task_status_classes() {
    assert!(TaskStatus::Waiting.is_sleeping());
    assert!(TaskStatus::Depending.is_sleeping());
    assert!(!TaskStatus::Awaiting.is_sleeping());
    for s in [
        TaskStatus::Finished,
        TaskStatus::Canceled,
        TaskStatus::Failed,
        TaskStatus::Dead,
    ] {
        assert!(s.is_terminal());
        assert!(!s.is_alive());
    }
}

#[test]
fn task_callbacks_dedup_and_finish() {
    let mut t = task("child");
    t.add_callback("root");
    t.add_callback("root");
    assert_eq!(t.callbacks, vec!["root".to_string()]);

    t.depend_on("other");
    assert_eq!(t.status, TaskStatus::Depending);
    t.finish(json!({"value": 42}));
    assert_eq!(t.status, TaskStatus::Finished);
    assert_eq!(t.result, Some(json!({"value": 42})));
    assert!(t.depending.is_none());
}

#[test]
fn task_typed_vars() {
    #[derive(serde::Serialize, serde::Deserialize, PartialEq, Debug)]
    struct Counter {
        n: u32,
    }
    let mut t = task("counter");
    assert_eq!(t.vars_as::<Counter>(), None);
    t.set_vars(&Counter { n: 3 }).unwrap();
    assert_eq!(t.vars_as::<Counter>(), Some(Counter { n: 3 }));
    assert!(t.without_vars().vars.is_none());
}

#[test]
fn task_serde_skips_transient_fields() {
    let mut t = task("x");
    t.instanced = true;
    t.touched = true;
    let raw = serde_json::to_string(&t).unwrap();
    assert!(!raw.contains("instanced"));
    assert!(!raw.contains("touched"));
    let back: Task = serde_json::from_str(&raw).unwrap();
    assert!(!back.instanced);
    assert_eq!(back.tid, t.tid);
}

#[test]
fn task_null_result_survives_save() {
    let mut t = task("x");
    t.finish(serde_json::Value::Null);
    let raw = serde_json::to_string(&t).unwrap();
    let back: Task = serde_json::from_str(&raw).unwrap();
    assert_eq!(back.status, TaskStatus::Finished);
    assert_eq!(back.result, Some(serde_json::Value::Null));

    let fresh: Task = serde_json::from_str(&serde_json::to_string(&task("y")).unwrap()).unwrap();
    assert_eq!(fresh.result, None);
}

// ===========================================================================
// Process
// ===========================================================================

#[test]
fn process_push_sets_current_on_top() {
    let root = task("root");
    let child = task("child");
    let process = process_with(vec![root.clone(), child.clone()]);
    assert_eq!(process.current, child.tid);
    assert_eq!(process.root, root.tid);
    assert_eq!(process.tasks[0].tid, child.tid);
    assert_eq!(process.len(), 2);
}

#[test]
fn process_push_replaces_existing_copy() {
    let root = task("root");
    let mut process = process_with(vec![root.clone(), task("a")]);
    let mut again = root.clone();
    again.status = TaskStatus::Running;
    process.push(again);
    assert_eq!(process.len(), 2);
    assert_eq!(process.tasks[0].tid, root.tid);
    assert_eq!(process.tasks[0].status, TaskStatus::Running);
}

#[test]
fn process_pop_to_keeps_relative_order() {
    let (r, a, b, c) = (task("r"), task("a"), task("b"), task("c"));
    let mut process = process_with(vec![r.clone(), a.clone(), b.clone(), c.clone()]);
    // stack: c, b, a, r
    process.pop_to(&a.tid).unwrap();
    let order: Vec<&str> = process.tasks.iter().map(|t| t.think()).collect();
    assert_eq!(order, vec!["a", "c", "b", "r"]);
    assert_eq!(process.current, a.tid);

    let err = process.pop_to("missing").unwrap_err();
    assert!(matches!(err, Error::Logic(_)));
}

#[test]
fn process_replace_in_place() {
    let (r, a) = (task("r"), task("a"));
    let mut process = process_with(vec![r.clone(), a.clone()]);
    let mut updated = process.get(&r.tid).unwrap().clone();
    updated.status = TaskStatus::Waiting;
    process.replace(updated).unwrap();
    assert_eq!(process.tasks[1].status, TaskStatus::Waiting);
    assert_eq!(process.tasks[0].tid, a.tid);
    assert!(process.replace(task("zzz")).is_err());
}

#[test]
fn process_new_round_clears_marks() {
    let process = process_with(vec![task("r"), task("a")]);
    assert!(process.tasks.iter().all(|t| t.touched));
    let next = process.new_round();
    assert_eq!(next.round, process.round + 1);
    assert!(next.tasks.iter().all(|t| !t.touched));
    assert_eq!(process.tasks[0].status, next.tasks[0].status);
}

#[test]
fn process_previous_live_and_ancestors() {
    let r = task("r");
    let mut dead = task("dead");
    dead.status = TaskStatus::Dead;
    let mut top = task("top");
    top.status = TaskStatus::Awaiting;
    let process = process_with(vec![r.clone(), dead.clone(), top.clone()]);
    assert_eq!(process.previous_live(&top.tid).unwrap().tid, r.tid);
    assert_eq!(process.ancestors_of(&top.tid), vec![r.tid.clone()]);
}

#[test]
fn gc_drops_terminal_and_forgettable() {
    let r = task("r");
    let mut done = task("done");
    done.status = TaskStatus::Finished;
    let idle = forgettable("idle", TaskStatus::Awaiting);
    let sleeping = forgettable("sleeping", TaskStatus::Waiting);
    let keeper = task("keeper");
    let mut current = task("current");
    current.status = TaskStatus::Awaiting;
    let mut process = process_with(vec![
        r.clone(),
        done,
        idle,
        sleeping.clone(),
        keeper.clone(),
        current.clone(),
    ]);

    let dropped = process.gc(20);
    let names: Vec<&str> = dropped.iter().map(|t| t.think()).collect();
    assert_eq!(names, vec!["idle", "done"]);
    for tid in [&r.tid, &sleeping.tid, &keeper.tid, &current.tid] {
        assert!(process.contains(tid));
    }
    process.validate().unwrap();
}

#[test]
fn gc_keeps_callback_chain() {
    let r = task("r");
    let mut finished = forgettable("finished", TaskStatus::Finished);
    finished.add_callback("listener-tid");
    let listener = Task::with_tid("listener-tid", Url::new("listener"));
    let mut process = process_with(vec![r, listener, finished.clone()]);
    let root = process.root.clone();
    process.pop_to(&root).unwrap();
    let dropped = process.gc(20);
    assert!(dropped.is_empty());
    assert!(process.contains(&finished.tid));
    assert!(process.contains("listener-tid"));
}

#[test]
fn gc_caps_by_round_then_depth() {
    let r = task("r");
    let mut process = Process::new("S1", "P1", r.clone());
    for i in 0..4 {
        let url = Url::new("worker");
        let mut w = Task::with_tid(Task::make_tid(&url, Some(&i.to_string())), url);
        w.is_forgettable = true;
        w.status = TaskStatus::Waiting;
        process.push(w);
    }
    process = process.new_round();
    let mut current = task("current");
    current.status = TaskStatus::Awaiting;
    process.push(current.clone());
    // Freshen the newest worker so it outlives the others.
    let newest = process.tasks[1].tid.clone();
    process.set_status(&newest, TaskStatus::Waiting).unwrap();

    let dropped = process.gc(3);
    assert_eq!(dropped.len(), 3);
    assert_eq!(process.len(), 3);
    assert!(process.contains(&r.tid));
    assert!(process.contains(&current.tid));
    assert!(process.contains(&newest));
}

#[test]
fn gc_never_drops_essential_even_over_cap() {
    let r = task("r");
    let mut a = task("a");
    a.status = TaskStatus::Waiting;
    let mut b = task("b");
    b.status = TaskStatus::Running;
    b.add_callback(&a.tid);
    let mut process = process_with(vec![r.clone(), a.clone(), b.clone()]);
    let dropped = process.gc(1);
    assert!(dropped.is_empty());
    assert_eq!(process.len(), 3);
}

#[test]
fn validate_catches_broken_invariants() {
    let mut process = process_with(vec![task("r")]);
    process.validate().unwrap();

    process.current = "ghost".into();
    assert!(process.validate().is_err());
    process.current = process.root.clone();

    process.tasks[0].status = TaskStatus::Depending;
    assert!(process.validate().is_err());
    process.tasks[0].depending = Some("x".into());
    process.validate().unwrap();

    let dup = process.tasks[0].clone();
    process.tasks.push(dup);
    assert!(process.validate().is_err());
}

#[test]
fn process_serde_roundtrip() {
    let mut child = task("child");
    child.status = TaskStatus::Awaiting;
    child.vars = Some(json!({"step": 2}));
    child.stages.push_back("confirm".into());
    child.add_callback("root-cb");
    let process = process_with(vec![task("r"), child.clone()]);

    let raw = serde_json::to_string(&process).unwrap();
    let back: Process = serde_json::from_str(&raw).unwrap();
    assert_eq!(back.root, process.root);
    assert_eq!(back.current, process.current);
    let restored = back.get(&child.tid).unwrap();
    assert_eq!(restored.vars, child.vars);
    assert_eq!(restored.stages, child.stages);
    assert_eq!(restored.callbacks, child.callbacks);
    assert_eq!(restored.status, TaskStatus::Awaiting);
}

// ===========================================================================
// CacheRuntime
// ===========================================================================

fn runtime(cache: &Arc<MemoryCache>) -> CacheRuntime {
    CacheRuntime::new(cache.clone(), 86_400)
}

#[test]
fn runtime_lock_is_idempotent_per_instance() {
    let cache = Arc::new(MemoryCache::new());
    let first = runtime(&cache);
    let second = runtime(&cache);
    assert!(first.lock_process("S1", "P1", 30).unwrap());
    assert!(first.lock_process("S1", "P1", 30).unwrap());
    assert!(!second.lock_process("S1", "P1", 30).unwrap());

    assert!(first.unlock_process("S1", "P1").unwrap());
    assert!(!first.unlock_process("S1", "P1").unwrap());
    assert!(second.lock_process("S1", "P1", 30).unwrap());
}

#[test]
fn runtime_save_and_fetch_process() {
    let cache = Arc::new(MemoryCache::new());
    let rt = runtime(&cache);
    let process = process_with(vec![task("r"), task("a")]);
    rt.lock_process("S1", "P1", 30).unwrap();
    rt.save_process_data(&process).unwrap();

    assert_eq!(rt.get_process_id("S1").unwrap().as_deref(), Some("P1"));
    assert!(cache.get(&process_key("S1", "P1")).unwrap().is_some());
    assert!(cache.get(&locker_key("S1", "P1")).unwrap().is_some());
    let loaded = rt.fetch_process("S1", "P1").unwrap().unwrap();
    assert_eq!(loaded.len(), 2);
    assert_eq!(loaded.current, process.current);
    assert!(loaded.tasks.iter().all(|t| t.instanced));
}

#[test]
fn runtime_rejects_writes_without_lock() {
    let cache = Arc::new(MemoryCache::new());
    let rt = runtime(&cache);
    let process = process_with(vec![task("r")]);
    let err = rt.save_process_data(&process).unwrap_err();
    assert!(matches!(err, Error::LockLost { .. }));

    let mut memo = task("memo");
    memo.is_long_term = true;
    memo.vars = Some(json!({"stale": true}));
    let err = rt.save_task_data("S1", "P1", &[&memo]).unwrap_err();
    assert!(matches!(err, Error::LockLost { .. }));
    assert_eq!(cache.get(&task_key("S1", &memo.tid)).unwrap(), None);
}

#[test]
fn runtime_claims_process_id_once() {
    let cache = Arc::new(MemoryCache::new());
    let first = runtime(&cache);
    let second = runtime(&cache);
    assert_eq!(first.claim_process_id("S1", "P1", 30).unwrap(), "P1");
    assert_eq!(second.claim_process_id("S1", "P2", 30).unwrap(), "P1");
    assert_eq!(second.get_process_id("S1").unwrap().as_deref(), Some("P1"));
}

#[test]
fn runtime_detects_stolen_lock() {
    let cache = Arc::new(MemoryCache::new());
    let stale = runtime(&cache);
    assert!(stale.lock_process("S1", "P1", 0).unwrap());

    // Lock TTL ran out and another turn took over.
    let fresh = runtime(&cache);
    assert!(fresh.lock_process("S1", "P1", 30).unwrap());

    let process = process_with(vec![task("r")]);
    assert!(matches!(
        stale.save_process_data(&process),
        Err(Error::LockLost { .. })
    ));
    assert!(!stale.lock_process("S1", "P1", 30).unwrap());
    fresh.save_process_data(&process).unwrap();
}

#[test]
fn runtime_long_term_vars_live_in_own_slot() {
    let cache = Arc::new(MemoryCache::new());
    let rt = runtime(&cache);
    let mut memo = task("memo");
    memo.is_long_term = true;
    memo.overdue = 120;
    memo.vars = Some(json!({"notes": ["a", "b"]}));
    let process = process_with(vec![task("r"), memo.clone()]);

    rt.lock_process("S1", "P1", 30).unwrap();
    rt.save_process_data(&process).unwrap();
    rt.save_task_data("S1", "P1", &[&memo]).unwrap();

    let record = cache.get(&process_key("S1", "P1")).unwrap().unwrap();
    assert!(!record.contains("notes"));
    assert!(cache.get(&task_key("S1", &memo.tid)).unwrap().is_some());

    let loaded = rt.fetch_process("S1", "P1").unwrap().unwrap();
    let stub = loaded.get(&memo.tid).unwrap();
    assert!(stub.vars.is_none());
    assert!(!stub.instanced);
    assert_eq!(
        rt.fetch_task_data("S1", &memo.tid).unwrap(),
        Some(json!({"notes": ["a", "b"]}))
    );
}

#[test]
fn runtime_remove_process_clears_pointer() {
    let cache = Arc::new(MemoryCache::new());
    let rt = runtime(&cache);
    let process = process_with(vec![task("r")]);
    rt.lock_process("S1", "P1", 30).unwrap();
    rt.save_process_data(&process).unwrap();
    rt.remove_process(&process).unwrap();
    assert_eq!(cache.get(&process_id_key("S1")).unwrap(), None);
    assert_eq!(rt.fetch_process("S1", "P1").unwrap().map(|p| p.pid), None);
}

#[test]
fn runtime_factory_creates_independent_instances() {
    let cache = Arc::new(MemoryCache::new());
    let factory = CacheRuntime::factory(cache.clone(), 60);
    let a = factory.create();
    let b = factory.create();
    assert!(a.lock_process("S1", "P1", 30).unwrap());
    assert!(!b.lock_process("S1", "P1", 30).unwrap());
}

// ===========================================================================
// Session
// ===========================================================================

#[test]
fn session_scratch_roundtrip() {
    let cache = Arc::new(MemoryCache::new());
    let session = Session::new(&Trace::new("S1"), cache.clone(), 3_600);
    assert_eq!(session.get::<u32>("count").unwrap(), None);
    session.set("count", &3u32).unwrap();
    assert_eq!(session.get::<u32>("count").unwrap(), Some(3));
    assert_eq!(session.get::<String>("count").unwrap(), None);
    assert!(session.remove("count").unwrap());
    assert!(session.refresh().unwrap());
    assert_eq!(cache.keys("session:"), vec!["session:S1:scratch".to_string()]);
}

#[test]
fn session_ids_are_unique() {
    let cache = Arc::new(MemoryCache::new());
    let session = Session::new(&Trace::new("S1"), cache, 60);
    assert_ne!(session.new_process_id(), session.new_process_id());
    assert_ne!(session.new_message_id(), session.new_message_id());
    assert_eq!(session.session_id, "S1");
}

// ===========================================================================
// Queues
// ===========================================================================

#[test]
fn memory_queue_is_fifo() {
    let queue = MemoryQueue::new();
    queue.push(Input::text("S1", "one")).unwrap();
    queue.push(Input::text("S1", "two")).unwrap();
    assert_eq!(queue.len(), 2);
    assert_eq!(queue.pop().unwrap().text_payload(), Some("one"));
    let rest = queue.drain();
    assert_eq!(rest[0].text_payload(), Some("two"));
    assert!(queue.is_empty());
}

#[test]
fn channel_queue_forwards_and_reports_closed() {
    let (queue, mut rx) = ChannelQueue::channel();
    queue.push(Input::text("S1", "later").as_async()).unwrap();
    let got = rx.try_recv().unwrap();
    assert!(got.is_async);
    drop(rx);
    assert!(queue.push(Input::text("S1", "lost")).is_err());
}
