use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::events::{EventEmitter, MeetEvent};
use crate::tasks::ScheduledTask;

/// Whole seconds spent in the session, ticking once per second.
pub struct ElapsedTimer {
    seconds: Arc<AtomicU64>,
    ticker: Mutex<Option<ScheduledTask>>,
}

impl ElapsedTimer {
    pub fn new() -> Self {
        Self {
            seconds: Arc::new(AtomicU64::new(0)),
            ticker: Mutex::new(None),
        }
    }

    /// Reset to zero and start ticking. A running timer is restarted.
    pub fn start(&self, emitter: EventEmitter) {
        self.seconds.store(0, Ordering::SeqCst);
        let seconds = self.seconds.clone();
        let task = ScheduledTask::every("elapsed-timer", Duration::from_secs(1), move || {
            let now = seconds.fetch_add(1, Ordering::SeqCst) + 1;
            emitter.emit(MeetEvent::ElapsedTimeChanged(now));
        });
        *self.ticker.lock().expect("timer lock poisoned") = Some(task);
    }

    /// Stop ticking; the count is kept.
    pub fn stop(&self) {
        self.ticker.lock().expect("timer lock poisoned").take();
    }

    #[cfg(test)]
    pub fn is_running(&self) -> bool {
        self.ticker
            .lock()
            .expect("timer lock poisoned")
            .as_ref()
            .is_some_and(|t| !t.is_finished())
    }

    pub fn seconds(&self) -> u64 {
        self.seconds.load(Ordering::SeqCst)
    }
}

impl Default for ElapsedTimer {
    fn default() -> Self {
        Self::new()
    }
}

/// `MM:SS`, with minutes growing past two digits as needed.
pub fn format_elapsed(seconds: u64) -> String {
    format!("{:02}:{:02}", seconds / 60, seconds % 60)
}
