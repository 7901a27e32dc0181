use std::time::Duration;

use crate::command::{Exec, Step, System};
use crate::error::CommandError;

/// How a [`Configurer`] reacts to a failed step.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Policy {
    /// Run every step and report all failures together.
    Aggregate,
    /// Stop at the first failure.
    FailFast,
}

/// Applies an ordered list of configuration commands.
pub struct Configurer<E = System> {
    policy: Policy,
    timeout: Duration,
    exec: E,
}

impl Configurer {
    pub fn new(policy: Policy, timeout: Duration) -> Self {
        Self::with_exec(policy, timeout, System)
    }
}

impl<E: Exec> Configurer<E> {
    pub fn with_exec(policy: Policy, timeout: Duration, exec: E) -> Self {
        Self {
            policy,
            timeout,
            exec,
        }
    }

    pub fn policy(&self) -> Policy {
        self.policy
    }

    /// Run `steps` in order under the configured policy.
    ///
    /// Each step is bounded by the timeout. Under [`Policy::Aggregate`] a
    /// single failure is returned as-is and several are combined into
    /// [`CommandError::Multiple`].
    pub fn apply(&self, steps: &[Step]) -> Result<(), CommandError> {
        let mut failure = None;
        for step in steps {
            if let Err(err) = self.exec.exec(step, self.timeout) {
                log::warn!("configuration step failed: {err}");
                match self.policy {
                    Policy::FailFast => return Err(err),
                    Policy::Aggregate => failure = Some(CommandError::append(failure, err)),
                }
            }
        }
        match failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Records every step and fails those whose index is listed.
    #[derive(Default)]
    pub(crate) struct Script {
        pub(crate) ran: Mutex<Vec<Step>>,
        pub(crate) failing: Vec<usize>,
    }

    impl Script {
        pub(crate) fn failing(failing: Vec<usize>) -> Self {
            Self {
                ran: Mutex::new(Vec::new()),
                failing,
            }
        }
    }

    impl Exec for Script {
        fn exec(&self, step: &Step, _timeout: Duration) -> Result<String, CommandError> {
            let mut ran = self.ran.lock().unwrap();
            let index = ran.len();
            ran.push(step.clone());
            if self.failing.contains(&index) {
                return Err(CommandError::Status {
                    command: step.to_string(),
                    status: "exit status: 1".into(),
                    stderr: format!("step {index}"),
                });
            }
            Ok(String::new())
        }
    }

    fn steps() -> Vec<Step> {
        (0..3)
            .map(|i| Step::new("ip", [format!("step{i}")]))
            .collect()
    }

    #[test]
    fn aggregate_runs_everything() {
        let script = Script::failing(vec![1]);
        let configurer = Configurer::with_exec(Policy::Aggregate, Duration::from_secs(1), &script);
        let err = configurer.apply(&steps()).unwrap_err();
        assert_eq!(script.ran.lock().unwrap().len(), 3);
        match err {
            CommandError::Status { command, stderr, .. } => {
                assert_eq!(command, "ip step1");
                assert_eq!(stderr, "step 1");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn aggregate_collects_every_failure() {
        let script = Script::failing(vec![0, 2]);
        let configurer = Configurer::with_exec(Policy::Aggregate, Duration::from_secs(1), &script);
        let err = configurer.apply(&steps()).unwrap_err();
        assert!(matches!(err, CommandError::Multiple(_)));
        assert_eq!(err.errors().len(), 2);
    }

    #[test]
    fn fail_fast_stops_at_first_failure() {
        let script = Script::failing(vec![1]);
        let configurer = Configurer::with_exec(Policy::FailFast, Duration::from_secs(1), &script);
        assert!(configurer.apply(&steps()).is_err());
        assert_eq!(script.ran.lock().unwrap().len(), 2);
    }

    #[test]
    fn empty_list_succeeds() {
        let script = Script::default();
        let configurer = Configurer::with_exec(Policy::FailFast, Duration::from_secs(1), &script);
        assert!(configurer.apply(&[]).is_ok());
    }
}
