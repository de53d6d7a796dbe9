use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing_test::traced_test;

use super::*;
use crate::error::code;
use crate::future::{KeyValue, RangeChunk};
use crate::host::{ChannelWaker, EventLoop};
use crate::test_utils::{fake_future, ready_future, Resolution, SlowWaker};
use crate::version::Version;

type Results = Rc<RefCell<Vec<Result<Outcome>>>>;

fn recorder() -> (Results, impl FnOnce(Result<Outcome>) + 'static) {
    let results: Results = Rc::new(RefCell::new(Vec::new()));
    let sink = results.clone();
    (results, move |r| sink.borrow_mut().push(r))
}

#[tokio::test]
async fn awaitable_receives_value() {
    let mut host = EventLoop::new();
    let (future, remote) = fake_future();
    let pending = host.bridge().deliver(future, Extract::Value).unwrap();

    let network = remote.complete_later(
        Resolution::Value(Some(b"hello".to_vec())),
        Duration::from_millis(10),
    );
    let outcome = host.run_until(pending).await.unwrap().unwrap();
    network.join().unwrap();

    assert_eq!(outcome, Outcome::Value(Some(b"hello".to_vec())));
    assert!(remote.is_destroyed());
    assert_eq!(host.bridge().pending(), 0);
}

#[test]
fn nothing_is_delivered_before_completion() {
    let mut host = EventLoop::new();
    let (results, continuation) = recorder();
    let (future, remote) = fake_future();
    host.bridge()
        .deliver_with(future, Extract::Value, continuation)
        .unwrap();

    assert_eq!(host.turn().unwrap(), 0);
    assert!(results.borrow().is_empty());
    assert_eq!(host.bridge().pending(), 1);
    assert!(!remote.is_destroyed());

    remote.complete(Resolution::Value(None));
    assert!(results.borrow().is_empty());
    assert_eq!(host.turn().unwrap(), 1);

    let results = results.borrow();
    assert_eq!(results.len(), 1);
    assert_eq!(*results[0].as_ref().unwrap(), Outcome::Value(None));
    assert!(remote.is_destroyed());
    assert!(!remote.destroyed_early());
}

#[test]
fn ready_future_is_still_delivered_on_a_later_turn() {
    let mut host = EventLoop::new();
    let (results, continuation) = recorder();
    let (future, _remote) = ready_future(Resolution::Int64(4096));

    host.bridge()
        .deliver_with(future, Extract::Int64, continuation)
        .unwrap();
    assert!(results.borrow().is_empty());

    assert_eq!(host.turn().unwrap(), 1);
    assert_eq!(*results.borrow()[0].as_ref().unwrap(), Outcome::Int64(4096));
}

#[test]
fn completions_are_delivered_in_completion_order() {
    let mut host = EventLoop::new();
    let order = Rc::new(RefCell::new(Vec::new()));

    let (first, first_remote) = fake_future();
    let (second, second_remote) = fake_future();
    let first_id = {
        let order = order.clone();
        host.bridge()
            .deliver_to(
                Box::new(first),
                Extract::Unit,
                Sink::continuation(move |_| order.borrow_mut().push("first")),
            )
            .unwrap()
    };
    let second_id = {
        let order = order.clone();
        host.bridge()
            .deliver_to(
                Box::new(second),
                Extract::Unit,
                Sink::continuation(move |_| order.borrow_mut().push("second")),
            )
            .unwrap()
    };
    assert_ne!(first_id, second_id);

    second_remote.complete(Resolution::Unit);
    assert_eq!(host.turn_blocking().unwrap(), second_id);
    first_remote.complete(Resolution::Unit);
    assert_eq!(host.turn_blocking().unwrap(), first_id);

    assert_eq!(*order.borrow(), vec!["second", "first"]);
}

#[test]
fn remote_error_is_delivered_as_result() {
    let mut host = EventLoop::new();
    let (results, continuation) = recorder();
    let (future, remote) = fake_future();
    host.bridge()
        .deliver_with(future, Extract::Unit, continuation)
        .unwrap();

    remote.complete(Resolution::Error(code::NOT_COMMITTED));
    host.turn().unwrap();

    let results = results.borrow();
    match &results[0] {
        Err(e @ Error::Remote(remote)) => {
            assert_eq!(remote.code, code::NOT_COMMITTED);
            assert_eq!(e.remote_code(), Some(code::NOT_COMMITTED));
        }
        other => panic!("expected remote error, got {:?}", other),
    }
}

#[test]
fn results_are_read_in_the_requested_shape() {
    let mut host = EventLoop::new();
    let (results, continuation) = recorder();
    let (version, _v) = ready_future(Resolution::Int64(0x0102_0304_0506_0708));
    host.bridge()
        .deliver_with(version, Extract::Version, continuation)
        .unwrap();

    let chunk = RangeChunk {
        results: vec![KeyValue::new(b"a".to_vec(), b"1".to_vec())],
        more: true,
    };
    let (range, _r) = ready_future(Resolution::KeyValues(chunk.clone()));
    let pending = host.bridge().deliver(range, Extract::KeyValues).unwrap();

    assert_eq!(host.turn().unwrap(), 2);
    let version = match results.borrow()[0].as_ref().unwrap() {
        Outcome::Version(v) => *v,
        other => panic!("expected version, got {:?}", other),
    };
    assert_eq!(version, Version::new(0x0102_0304_0506_0708));
    assert_eq!(version.to_be_bytes(), [1, 2, 3, 4, 5, 6, 7, 8]);

    let outcome = tokio::runtime::Builder::new_current_thread()
        .build()
        .unwrap()
        .block_on(pending)
        .unwrap();
    assert_eq!(outcome, Outcome::KeyValues(chunk));
}

#[test]
fn delivery_waits_for_network_thread_release() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let returned = Arc::new(AtomicBool::new(false));
    let bridge = Bridge::new(Arc::new(SlowWaker {
        inner: ChannelWaker::new(tx),
        delay: Duration::from_millis(50),
        returned: returned.clone(),
    }));

    let observed = Rc::new(RefCell::new(None));
    let (future, remote) = fake_future();
    {
        let observed = observed.clone();
        let returned = returned.clone();
        bridge
            .deliver_with(future, Extract::Unit, move |r| {
                assert!(r.is_ok());
                *observed.borrow_mut() = Some(returned.load(Ordering::SeqCst));
            })
            .unwrap();
    }

    let network = remote.complete_later(Resolution::Unit, Duration::ZERO);
    let id = rx.blocking_recv().unwrap();
    bridge.dispatch(id).unwrap();
    network.join().unwrap();

    assert_eq!(*observed.borrow(), Some(true));
}

#[test]
#[traced_test]
fn unknown_operation_is_rejected() {
    let host = EventLoop::new();
    assert!(matches!(
        host.bridge().dispatch(42),
        Err(Error::Lifecycle(_))
    ));
    assert!(logs_contain("dispatch for unknown operation"));
}

#[test]
fn early_dispatch_leaves_operation_pending() {
    let mut host = EventLoop::new();
    let (results, continuation) = recorder();
    let (future, remote) = fake_future();
    let id = host
        .bridge()
        .deliver_to(Box::new(future), Extract::Unit, Sink::continuation(continuation))
        .unwrap();

    assert!(matches!(
        host.bridge().dispatch(id),
        Err(Error::Lifecycle(_))
    ));
    assert_eq!(host.bridge().pending(), 1);
    assert!(!remote.is_destroyed());

    remote.complete(Resolution::Unit);
    assert_eq!(host.turn().unwrap(), 1);
    assert_eq!(results.borrow().len(), 1);
}

#[tokio::test]
async fn pending_fails_when_bridge_is_dropped() {
    let host = EventLoop::new();
    let (future, remote) = fake_future();
    let pending = host.bridge().deliver(future, Extract::Unit).unwrap();

    drop(host);
    assert!(matches!(pending.await, Err(Error::Lifecycle(_))));
    assert_eq!(remote.cancel_requests(), 1);
    assert!(remote.is_destroyed());
    assert!(!remote.destroyed_early());
}

#[test]
fn dropping_bridge_does_not_cancel_completed_operations() {
    let host = EventLoop::new();
    let (future, remote) = fake_future();
    host.bridge()
        .deliver_with(future, Extract::Unit, |_| panic!("delivered after drop"))
        .unwrap();

    remote.complete(Resolution::Unit);
    drop(host);
    assert_eq!(remote.cancel_requests(), 0);
    assert!(remote.is_destroyed());
    assert!(!remote.destroyed_early());
}

#[test]
fn dropping_bridge_cancels_pending_watch() {
    let host = EventLoop::new();
    let (future, remote) = fake_future();
    let watch = host
        .bridge()
        .watch_with(future, crate::watch::WatchPolicy::standard(), |_| {})
        .unwrap();
    assert_eq!(watch.state(), crate::watch::WatchState::Active);

    drop(watch);
    drop(host);
    assert_eq!(remote.cancel_requests(), 1);
    assert!(!remote.destroyed_early());
}

#[test]
fn refused_registration_is_returned_to_the_caller() {
    let mut host = EventLoop::new();
    let (results, continuation) = recorder();
    let (future, remote) = fake_future();
    remote.refuse_callbacks(2017);

    let err = host
        .bridge()
        .deliver_with(future, Extract::Unit, continuation)
        .unwrap_err();
    assert_eq!(err.remote_code(), Some(2017));
    assert_eq!(host.bridge().pending(), 0);
    assert!(remote.is_destroyed());
    assert!(!remote.destroyed_early());

    assert_eq!(host.turn().unwrap(), 0);
    assert!(results.borrow().is_empty());
}

#[test]
fn continuation_can_start_another_operation() {
    let mut host = EventLoop::new();
    let (results, inner) = recorder();
    let (first, first_remote) = fake_future();
    let bridge = host.bridge().clone();

    host.bridge()
        .deliver_with(first, Extract::Unit, move |r| {
            assert!(r.is_ok());
            let (second, _remote) = ready_future(Resolution::Key(b"k".to_vec()));
            bridge.deliver_with(second, Extract::Key, inner).unwrap();
        })
        .unwrap();

    first_remote.complete(Resolution::Unit);
    assert_eq!(host.turn().unwrap(), 2);
    assert_eq!(
        *results.borrow()[0].as_ref().unwrap(),
        Outcome::Key(b"k".to_vec())
    );
    assert_eq!(host.bridge().pending(), 0);
}

#[test]
fn concurrent_completions_are_each_delivered_once() {
    const OPS: usize = 64;

    let mut host = EventLoop::new();
    let counts = Rc::new(RefCell::new(HashMap::new()));
    let mut network = Vec::new();

    for i in 0..OPS {
        let (future, remote) = fake_future();
        let counts = counts.clone();
        host.bridge()
            .deliver_with(future, Extract::Int64, move |r| {
                let n = match r.unwrap() {
                    Outcome::Int64(n) => n,
                    other => panic!("unexpected {:?}", other),
                };
                *counts.borrow_mut().entry(n).or_insert(0) += 1;
            })
            .unwrap();
        let delay = Duration::from_millis((OPS - i) as u64 % 7);
        network.push(remote.complete_later(Resolution::Int64(i as i64), delay));
    }

    for _ in 0..OPS {
        host.turn_blocking().unwrap();
    }
    for handle in network {
        handle.join().unwrap();
    }

    assert_eq!(host.turn().unwrap(), 0);
    assert_eq!(host.bridge().pending(), 0);
    let counts = counts.borrow();
    assert_eq!(counts.len(), OPS);
    assert!(counts.values().all(|&c| c == 1));
}
