//! Progress and IPC notifier (§4.7): a single logical notification bus.
//! In-process subscribers are dispatched to synchronously; a dedicated
//! receiver thread re-injects notifications a subprocess sends over the
//! transport abstraction in [`transport`]. [`progress`] carries the
//! richer structured progress record out-of-process consumers read.

pub mod progress;
pub mod transport;

use std::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Idle,
    Start,
    Run,
    Success,
    Failure,
    Download,
    Done,
    Subprocess,
    Progress,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

#[derive(Debug, Clone)]
pub struct Notification {
    pub status: Status,
    pub error_code: i32,
    pub level: Level,
    pub message: String,
}

impl Notification {
    pub fn info(status: Status, message: impl Into<String>) -> Self {
        Notification {
            status,
            error_code: 0,
            level: Level::Info,
            message: message.into(),
        }
    }

    pub fn error(status: Status, error_code: i32, message: impl Into<String>) -> Self {
        Notification {
            status,
            error_code,
            level: Level::Error,
            message: message.into(),
        }
    }

    fn log(&self) {
        let text = format!("[{:?}] {}", self.status, self.message);
        match self.level {
            Level::Error => log::error!("{text}"),
            Level::Warn => log::warn!("{text}"),
            Level::Info => log::info!("{text}"),
            Level::Debug => log::debug!("{text}"),
            Level::Trace => log::trace!("{text}"),
        }
    }
}

pub trait NotifierSubscriber: Send {
    fn notify(&self, notification: &Notification);
}

/// In-process dispatch bus. The subscriber list is read-often,
/// written-rarely and is protected by a mutex (§5 shared-resource
/// policy); within one sender, delivery order is preserved.
#[derive(Default)]
pub struct NotifierBus {
    subscribers: Mutex<Vec<Box<dyn NotifierSubscriber>>>,
}

impl NotifierBus {
    pub fn new() -> Self {
        NotifierBus { subscribers: Mutex::new(Vec::new()) }
    }

    pub fn subscribe(&self, subscriber: Box<dyn NotifierSubscriber>) {
        self.subscribers.lock().unwrap().push(subscriber);
    }

    pub fn notify(&self, notification: Notification) {
        notification.log();
        let subscribers = self.subscribers.lock().unwrap();
        for subscriber in subscribers.iter() {
            subscriber.notify(&notification);
        }
    }
}

/// The structured progress record consumed by the coordinator's
/// step-accounting and by out-of-process progress-socket clients.
#[derive(Debug, Clone)]
pub struct ProgressRecord {
    pub current_step: u32,
    pub total_steps: u32,
    pub current_artifact: String,
    pub handler_name: String,
    pub percent: u8,
    pub download_percent: u8,
}

pub trait ProgressReporter: Send + Sync {
    fn report(&self, record: ProgressRecord);
}

/// A reporter that forwards progress as ordinary `Status::Progress`
/// notifications onto the bus, for callers with no separate progress
/// socket.
pub struct BusProgressReporter<'a> {
    pub bus: &'a NotifierBus,
}

impl<'a> ProgressReporter for BusProgressReporter<'a> {
    fn report(&self, record: ProgressRecord) {
        self.bus.notify(Notification::info(
            Status::Progress,
            format!("{}/{} {} ({}%) via {}", record.current_step, record.total_steps, record.current_artifact, record.percent, record.handler_name),
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingSubscriber(Arc<AtomicUsize>);

    impl NotifierSubscriber for CountingSubscriber {
        fn notify(&self, _notification: &Notification) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn dispatches_to_all_subscribers() {
        let bus = NotifierBus::new();
        let count = Arc::new(AtomicUsize::new(0));
        bus.subscribe(Box::new(CountingSubscriber(count.clone())));
        bus.subscribe(Box::new(CountingSubscriber(count.clone())));

        bus.notify(Notification::info(Status::Start, "beginning"));
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn progress_reporter_forwards_to_bus() {
        let bus = NotifierBus::new();
        let count = Arc::new(AtomicUsize::new(0));
        bus.subscribe(Box::new(CountingSubscriber(count.clone())));

        let reporter = BusProgressReporter { bus: &bus };
        reporter.report(ProgressRecord {
            current_step: 1,
            total_steps: 3,
            current_artifact: "rootfs".to_string(),
            handler_name: "raw".to_string(),
            percent: 33,
            download_percent: 100,
        });
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
