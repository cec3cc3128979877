use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use std::thread;
use std::time::Duration;

use desk_hardware::error::HwError;
use desk_hardware::util::wait_until_with_timeout;

#[test]
fn wait_until_success_path() {
    let done = Arc::new(AtomicBool::new(false));
    let done_bg = done.clone();
    thread::spawn(move || {
        thread::sleep(Duration::from_millis(3));
        done_bg.store(true, Ordering::Relaxed);
    });

    let res = wait_until_with_timeout(
        || done.load(Ordering::Relaxed),
        Duration::from_millis(500),
        Duration::from_micros(200),
    );
    assert!(res.is_ok(), "expected success, got {res:?}");
}

#[test]
fn wait_until_timeout_path() {
    let err = wait_until_with_timeout(|| false, Duration::from_millis(5), Duration::from_micros(200))
        .expect_err("expected timeout error");

    match err {
        HwError::Timeout => {}
        other => panic!("unexpected error: {other:?}"),
    }
}
