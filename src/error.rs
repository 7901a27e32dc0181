use std::io;
use std::sync::Arc;
use std::time::Duration;

#[derive(thiserror::Error, Debug, Clone)]
pub enum Error {
    #[error("clone device {0} does not exist")]
    DeviceMissing(&'static str),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[cfg(unix)]
    #[error("ioctl {request} failed: {errno}")]
    Ioctl {
        request: &'static str,
        errno: nix::errno::Errno,
    },

    #[error("device closed while in use")]
    ClosedWhileInUse,

    #[error(transparent)]
    Command(#[from] CommandError),

    #[error(transparent)]
    Io(Arc<io::Error>),

    #[error("{0}")]
    String(String),
}

impl Error {
    #[cfg(unix)]
    pub(crate) fn ioctl(request: &'static str, errno: nix::errno::Errno) -> Self {
        Error::Ioctl { request, errno }
    }

    /// The OS error code carried by this error, if any.
    pub fn raw_os_error(&self) -> Option<i32> {
        match self {
            #[cfg(unix)]
            Error::Ioctl { errno, .. } => Some(*errno as i32),
            Error::Io(err) => err.raw_os_error(),
            _ => None,
        }
    }

    /// Whether `err` reports an operation on (or interrupted by) a closed device.
    pub fn is_closed(err: &io::Error) -> bool {
        matches!(
            err.get_ref().and_then(|e| e.downcast_ref::<Error>()),
            Some(Error::ClosedWhileInUse)
        )
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Self::Io(Arc::new(err))
    }
}

impl From<&str> for Error {
    fn from(err: &str) -> Self {
        Self::String(err.to_string())
    }
}

impl From<String> for Error {
    fn from(err: String) -> Self {
        Self::String(err)
    }
}

impl From<&String> for Error {
    fn from(err: &String) -> Self {
        Self::String(err.to_string())
    }
}

impl From<Error> for io::Error {
    fn from(value: Error) -> Self {
        match value {
            Error::Io(err) => match Arc::try_unwrap(err) {
                Ok(err) => err,
                Err(err) => io::Error::new(err.kind(), err.to_string()),
            },
            Error::ClosedWhileInUse => io::Error::new(io::ErrorKind::NotConnected, value),
            Error::DeviceMissing(_) => io::Error::new(io::ErrorKind::NotFound, value),
            Error::PermissionDenied(_) => io::Error::new(io::ErrorKind::PermissionDenied, value),
            Error::InvalidConfig(_) => io::Error::new(io::ErrorKind::InvalidInput, value),
            #[cfg(unix)]
            Error::Ioctl { errno, .. } => io::Error::from_raw_os_error(errno as i32),
            _ => io::Error::new(io::ErrorKind::Other, value),
        }
    }
}

/// Failure of an external configuration command.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    #[error("`{command}` could not be started: {reason}")]
    Spawn { command: String, reason: String },

    #[error("`{command}` timed out after {timeout:?}")]
    Timeout { command: String, timeout: Duration },

    #[error("`{command}` exited with {status}: {stderr}")]
    Status {
        command: String,
        status: String,
        stderr: String,
    },

    #[error("{}", join(.0))]
    Multiple(Vec<CommandError>),
}

impl CommandError {
    /// Individual failures, flattening `Multiple`.
    pub fn errors(&self) -> Vec<&CommandError> {
        match self {
            CommandError::Multiple(errs) => errs.iter().flat_map(|e| e.errors()).collect(),
            err => vec![err],
        }
    }

    /// Combine `err` into an accumulated result, keeping a lone failure unwrapped.
    pub(crate) fn append(acc: Option<CommandError>, err: CommandError) -> CommandError {
        match acc {
            None => err,
            Some(CommandError::Multiple(mut errs)) => {
                errs.push(err);
                CommandError::Multiple(errs)
            }
            Some(first) => CommandError::Multiple(vec![first, err]),
        }
    }
}

fn join(errs: &[CommandError]) -> String {
    errs.iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Outcome class of a failed `accept`.
#[derive(Debug)]
pub enum AcceptError {
    /// Expected to clear on its own; the loop keeps going.
    Transient(io::Error),
    /// The listener cannot continue serving.
    Fatal(io::Error),
}

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

pub type Result<T, E = Error> = ::std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closed_round_trips_through_io_error() {
        let err: io::Error = Error::ClosedWhileInUse.into();
        assert_eq!(err.kind(), io::ErrorKind::NotConnected);
        assert!(Error::is_closed(&err));
        assert!(!Error::is_closed(&io::Error::from(io::ErrorKind::NotConnected)));
    }

    #[test]
    fn append_keeps_single_failure() {
        let one = CommandError::Timeout {
            command: "ip".into(),
            timeout: Duration::from_secs(2),
        };
        let acc = CommandError::append(None, one.clone());
        assert_eq!(acc, one);
        let acc = CommandError::append(Some(acc), one.clone());
        let acc = CommandError::append(Some(acc), one.clone());
        assert_eq!(acc.errors().len(), 3);
    }

    #[cfg(unix)]
    #[test]
    fn ioctl_carries_errno() {
        let err = Error::ioctl("TUNSETIFF", nix::errno::Errno::EPERM);
        assert_eq!(err.raw_os_error(), Some(libc::EPERM));
        let io: io::Error = err.into();
        assert_eq!(io.raw_os_error(), Some(libc::EPERM));
    }
}
