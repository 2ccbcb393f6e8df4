use std::{
    any::Any,
    panic::{self, AssertUnwindSafe},
};

pub(crate) type JobFn = Box<dyn FnOnce() + Send + 'static>;

/// A unit of requested work: a caller-assigned identifier and the
/// command to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    pub id: u64,
    pub command: String,
}

impl Task {
    pub fn new(id: u64, command: impl Into<String>) -> Self {
        Self {
            id,
            command: command.into(),
        }
    }
}

/// The output of a processed [`Task`], correlated by the task id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskResult {
    pub id: u64,
    pub output: String,
}

/// A closure submitted to a [`TaskPool`](crate::TaskPool).
pub(crate) struct Job {
    job_fn: JobFn,
}

impl Job {
    pub(crate) fn new(job_fn: JobFn) -> Self {
        Self { job_fn }
    }

    /// Runs the closure. A panic is caught and its message returned,
    /// so the calling worker survives.
    pub(crate) fn run(self) -> Result<(), String> {
        panic::catch_unwind(AssertUnwindSafe(self.job_fn)).map_err(panic_message)
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "<unknown panic>".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::Job;

    #[test]
    fn test_job_captures_panic_message() {
        let ok = Job::new(Box::new(|| ()));
        assert!(ok.run().is_ok());

        let static_msg = Job::new(Box::new(|| panic!("boom")));
        assert_eq!(Err("boom".to_string()), static_msg.run());

        let code = 7;
        let formatted = Job::new(Box::new(move || panic!("failed with {}", code)));
        assert_eq!(Err("failed with 7".to_string()), formatted.run());
    }
}
