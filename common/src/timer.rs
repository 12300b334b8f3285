use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Cancellation handle for a running timer. Dropping the handle leaves the
/// timer running.
#[derive(Debug, Clone)]
pub struct TimerHandle {
    stop: Arc<AtomicBool>,
}

impl TimerHandle {
    pub fn cancel(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    /// False once the timer fired, finished or was cancelled.
    pub fn is_active(&self) -> bool {
        !self.stop.load(Ordering::SeqCst)
    }
}

/// Runs `f` once after `delay_ms` unless cancelled first.
pub fn once<F>(name: &str, delay_ms: u64, f: F) -> TimerHandle
where
    F: FnOnce() + Send + 'static,
{
    let stop = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&stop);
    thread::Builder::new()
        .name(name.to_string())
        .spawn(move || {
            thread::sleep(Duration::from_millis(delay_ms));
            if !flag.swap(true, Ordering::SeqCst) {
                f();
            }
        })
        .expect("failed to spawn timer thread");
    TimerHandle { stop }
}

/// Runs `f` every `period_ms` until it returns false or the handle is
/// cancelled. The first call happens one period after arming.
pub fn every<F>(name: &str, period_ms: u64, mut f: F) -> TimerHandle
where
    F: FnMut() -> bool + Send + 'static,
{
    let stop = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&stop);
    thread::Builder::new()
        .name(name.to_string())
        .spawn(move || loop {
            thread::sleep(Duration::from_millis(period_ms));
            if flag.load(Ordering::SeqCst) {
                break;
            }
            if !f() {
                flag.store(true, Ordering::SeqCst);
                break;
            }
        })
        .expect("failed to spawn timer thread");
    TimerHandle { stop }
}
