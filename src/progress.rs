//! # Progress and Log Channel
//!
//! An evaluation reports an integer percentage at partition/bucket granularity and a
//! stream of short status lines. Both travel over one crossbeam channel as
//! [`EngineEvent`]s and are mirrored to `tracing`. An optional observer sees each
//! event synchronously on the evaluating thread.

use crossbeam_channel::{unbounded, Receiver, Sender};
use std::fmt;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    Progress { rule: String, percent: u8 },
    Log { rule: String, message: String },
}

/// Called inline, before the event is queued on the channel.
pub type EventObserver = Arc<dyn Fn(&EngineEvent) + Send + Sync>;

/// Cloneable handle to the event channel; silent when no receiver was requested.
#[derive(Clone, Default)]
pub struct ProgressReporter {
    sender: Option<Sender<EngineEvent>>,
    observer: Option<EventObserver>,
}

impl fmt::Debug for ProgressReporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProgressReporter")
            .field("sender", &self.sender.is_some())
            .field("observer", &self.observer.is_some())
            .finish()
    }
}

impl ProgressReporter {
    pub fn silent() -> Self {
        Self::default()
    }

    pub fn new(sender: Sender<EngineEvent>) -> Self {
        Self {
            sender: Some(sender),
            observer: None,
        }
    }

    pub fn channel() -> (Self, Receiver<EngineEvent>) {
        let (sender, receiver) = unbounded();
        (Self::new(sender), receiver)
    }

    pub fn with_observer(mut self, observer: impl Fn(&EngineEvent) + Send + Sync + 'static) -> Self {
        self.observer = Some(Arc::new(observer));
        self
    }

    /// Per-evaluation state; percentages never go backwards within one tracker.
    pub fn tracker(&self, rule: &str) -> ProgressTracker {
        ProgressTracker {
            rule: rule.to_string(),
            sender: self.sender.clone(),
            observer: self.observer.clone(),
            last: None,
        }
    }
}

pub struct ProgressTracker {
    rule: String,
    sender: Option<Sender<EngineEvent>>,
    observer: Option<EventObserver>,
    last: Option<u8>,
}

impl fmt::Debug for ProgressTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProgressTracker")
            .field("rule", &self.rule)
            .field("last", &self.last)
            .finish_non_exhaustive()
    }
}

impl ProgressTracker {
    pub fn rule(&self) -> &str {
        &self.rule
    }

    /// Last percentage emitted.
    pub fn percent(&self) -> u8 {
        self.last.unwrap_or(0)
    }

    /// Emit `percent` (clamped to 100) if it is ahead of the last emitted value.
    pub fn report(&mut self, percent: u8) {
        let percent = percent.min(100);
        if self.last.is_some_and(|last| percent <= last) {
            return;
        }
        self.last = Some(percent);
        self.send(EngineEvent::Progress {
            rule: self.rule.clone(),
            percent,
        });
    }

    /// Progress after `done` of `total` units; held below 100 until [`finish`](Self::finish).
    pub fn step(&mut self, done: usize, total: usize) {
        if total == 0 {
            return;
        }
        let percent = (done.saturating_mul(100) / total).min(99) as u8;
        self.report(percent);
    }

    pub fn finish(&mut self) {
        self.report(100);
    }

    pub fn log(&mut self, message: impl Into<String>) {
        let message = message.into();
        info!(rule = %self.rule, "{message}");
        self.send(EngineEvent::Log {
            rule: self.rule.clone(),
            message,
        });
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        let message = message.into();
        warn!(rule = %self.rule, "{message}");
        self.send(EngineEvent::Log {
            rule: self.rule.clone(),
            message,
        });
    }

    fn send(&self, event: EngineEvent) {
        if let Some(observer) = &self.observer {
            observer(&event);
        }
        if let Some(sender) = &self.sender {
            // A dropped receiver only means nobody is listening.
            let _ = sender.send(event);
        }
    }
}
