//! Fire-and-forget side work detached from mutations.
//!
//! # Invariants
//! - Spawning never runs the task; it only queues it.
//! - A failing or panicking task is logged and counted; the failure never
//!   reaches the code that spawned it.

use crate::logging::panic_payload_text;
use log::{debug, warn};
use std::collections::VecDeque;
use std::error::Error;
use std::fmt::{Debug, Display, Formatter};
use std::panic::{self, AssertUnwindSafe};

/// Failure reported by a detached task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetachedTaskError {
    pub task: String,
    pub message: String,
}

impl DetachedTaskError {
    pub fn new(task: &str, message: impl Into<String>) -> Self {
        Self {
            task: task.to_string(),
            message: message.into(),
        }
    }
}

impl Display for DetachedTaskError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "detached task `{}` failed: {}", self.task, self.message)
    }
}

impl Error for DetachedTaskError {}

type TaskFn = Box<dyn FnOnce() -> Result<(), DetachedTaskError>>;

/// Outcome counts of one `run_pending` call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TaskReport {
    pub completed: usize,
    pub failed: usize,
}

/// Queue of detached tasks, drained by the host loop.
#[derive(Default)]
pub struct DetachedTasks {
    queue: VecDeque<(String, TaskFn)>,
}

impl DetachedTasks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn spawn(
        &mut self,
        name: &str,
        task: impl FnOnce() -> Result<(), DetachedTaskError> + 'static,
    ) {
        self.queue.push_back((name.to_string(), Box::new(task)));
    }

    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Runs every queued task, including tasks queued meanwhile.
    pub fn run_pending(&mut self) -> TaskReport {
        let mut report = TaskReport::default();
        while let Some((name, task)) = self.queue.pop_front() {
            let outcome = panic::catch_unwind(AssertUnwindSafe(task));
            let failure = match outcome {
                Ok(Ok(())) => None,
                Ok(Err(err)) => Some(err.message),
                Err(payload) => Some(format!("panicked: {}", panic_payload_text(payload.as_ref()))),
            };
            match failure {
                None => {
                    report.completed += 1;
                    debug!("event=detached_task module=task status=ok task={name}");
                }
                Some(message) => {
                    report.failed += 1;
                    warn!(
                        "event=detached_task module=task status=error task={} error={}",
                        name, message
                    );
                }
            }
        }
        report
    }
}

impl Debug for DetachedTasks {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DetachedTasks")
            .field("pending", &self.queue.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::{DetachedTaskError, DetachedTasks, TaskReport};
    use std::cell::Cell;
    use std::rc::Rc;

    #[test]
    fn spawn_defers_execution() {
        let ran = Rc::new(Cell::new(false));
        let flag = Rc::clone(&ran);
        let mut tasks = DetachedTasks::new();
        tasks.spawn("mark", move || {
            flag.set(true);
            Ok(())
        });
        assert!(!ran.get());
        assert_eq!(tasks.pending(), 1);

        let report = tasks.run_pending();
        assert!(ran.get());
        assert_eq!(report, TaskReport { completed: 1, failed: 0 });
    }

    #[test]
    fn failures_are_counted_not_propagated() {
        let mut tasks = DetachedTasks::new();
        tasks.spawn("fails", || Err(DetachedTaskError::new("fails", "no target")));
        tasks.spawn("panics", || panic!("animation backend gone"));
        tasks.spawn("ok", || Ok(()));

        let report = tasks.run_pending();
        assert_eq!(report, TaskReport { completed: 1, failed: 2 });
        assert_eq!(tasks.pending(), 0);
    }
}
