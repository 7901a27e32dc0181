use std::any::Any;
use std::backtrace::Backtrace;
use std::fmt;

/// Longest stack trace kept in a [`Fault`].
pub const MAX_STACK_LEN: usize = 4096;

/// A panic caught at a task boundary.
#[derive(Clone, Debug)]
pub struct Fault {
    /// Where the panic was contained, e.g. `relay b->a`.
    pub context: String,
    pub message: String,
    /// Stack captured when the panic was contained.
    pub backtrace: String,
}

impl Fault {
    pub(crate) fn new(context: &str, payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_string()
        };
        let mut backtrace = Backtrace::force_capture().to_string();
        truncate(&mut backtrace, MAX_STACK_LEN);
        Self {
            context: context.to_string(),
            message,
            backtrace,
        }
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: panic: {}\nstack:\n{}",
            self.context, self.message, self.backtrace
        )
    }
}

fn truncate(s: &mut String, max: usize) {
    if s.len() <= max {
        return;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    s.truncate(end);
}

/// Receives the diagnostics of relays and accept loops.
pub trait Report: Send + Sync {
    fn warn(&self, message: &str);
    fn error(&self, message: &str);
    fn fault(&self, fault: &Fault) {
        self.error(&fault.to_string())
    }
}

/// Forwards every report to the `log` facade under a fixed target.
#[derive(Copy, Clone, Debug)]
pub struct LogReport {
    target: &'static str,
}

impl LogReport {
    pub const fn new(target: &'static str) -> Self {
        Self { target }
    }
}

impl Report for LogReport {
    fn warn(&self, message: &str) {
        log::warn!(target: self.target, "{message}");
    }

    fn error(&self, message: &str) {
        log::error!(target: self.target, "{message}");
    }

    fn fault(&self, fault: &Fault) {
        log::error!(target: self.target, "{fault}");
    }
}
