use std::io;
use std::net::{TcpListener, TcpStream};
#[cfg(unix)]
use std::os::unix::net::{UnixListener, UnixStream};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::error::AcceptError;
use crate::report::{Fault, LogReport, Report};

/// Text a [`Listener`] may put in its error once it has been closed.
///
/// std listeners never produce it; custom listeners use it to end
/// [`Server::serve`] quietly. A std listener that was `shutdown(2)` fails
/// `accept` with `EINVAL`, which is recognised as well.
pub const CLOSED_LISTENER: &str = "use of closed network connection";

/// A source of incoming connections.
pub trait Listener {
    type Stream: Send + 'static;

    fn accept(&self) -> io::Result<Self::Stream>;
}

impl Listener for TcpListener {
    type Stream = TcpStream;

    fn accept(&self) -> io::Result<TcpStream> {
        let (stream, peer) = TcpListener::accept(self)?;
        log::debug!("accepted {peer}");
        Ok(stream)
    }
}

#[cfg(unix)]
impl Listener for UnixListener {
    type Stream = UnixStream;

    fn accept(&self) -> io::Result<UnixStream> {
        UnixListener::accept(self).map(|(stream, _)| stream)
    }
}

impl AcceptError {
    /// Sort an accept failure into retryable and terminal.
    pub fn classify(err: io::Error) -> Self {
        if is_transient(&err) {
            AcceptError::Transient(err)
        } else {
            AcceptError::Fatal(err)
        }
    }

    /// Whether the failure only says the listener was shut down.
    pub fn is_shutdown(&self) -> bool {
        match self {
            AcceptError::Fatal(err) => is_closed_listener(err),
            AcceptError::Transient(_) => false,
        }
    }
}

fn is_closed_listener(err: &io::Error) -> bool {
    #[cfg(unix)]
    if err.raw_os_error() == Some(libc::EINVAL) {
        return true;
    }
    err.to_string().contains(CLOSED_LISTENER)
}

fn is_transient(err: &io::Error) -> bool {
    use io::ErrorKind::*;
    if matches!(
        err.kind(),
        WouldBlock | Interrupted | TimedOut | ConnectionAborted | ConnectionReset
    ) {
        return true;
    }
    #[cfg(unix)]
    if let Some(code) = err.raw_os_error() {
        return matches!(
            code,
            libc::EMFILE | libc::ENFILE | libc::ENOBUFS | libc::ENOMEM
        );
    }
    false
}

/// What a serving loop does after a failed accept.
pub(crate) enum Next {
    Retry,
    Stop(io::Result<()>),
}

/// Report `err` and decide whether to keep accepting.
pub(crate) fn on_accept_error(report: &dyn Report, err: io::Error) -> Next {
    match AcceptError::classify(err) {
        AcceptError::Transient(err) => {
            report.warn(&format!("temporary accept failure err={err}"));
            Next::Retry
        }
        AcceptError::Fatal(err) if is_closed_listener(&err) => {
            log::debug!("listener closed");
            Next::Stop(Ok(()))
        }
        AcceptError::Fatal(err) => {
            report.error(&format!("accept failed err={err}"));
            Next::Stop(Err(err))
        }
    }
}

/// Work handed to a freshly spawned thread.
pub(crate) type Task = Box<dyn FnOnce() + Send + 'static>;

/// Start `task` on a new thread, returning the OS refusal instead of panicking.
pub(crate) fn spawn_thread(task: Task) -> io::Result<JoinHandle<()>> {
    thread::Builder::new().spawn(task)
}

/// Accept loop handing every connection to its own thread.
#[derive(Clone)]
pub struct Server {
    report: Arc<dyn Report>,
}

impl Default for Server {
    fn default() -> Self {
        Self::new()
    }
}

impl Server {
    pub fn new() -> Self {
        Self::with_report(Arc::new(LogReport::new("tun_drive::server")))
    }

    pub fn with_report(report: Arc<dyn Report>) -> Self {
        Self { report }
    }

    /// Accept connections until the listener fails for good.
    ///
    /// Transient failures are reported as warnings and retried after
    /// yielding. A panicking handler is reported as a fault and never stops
    /// the loop, nor does a connection whose thread the OS refuses to start;
    /// that connection is reported and dropped. Returns `Ok(())` when the
    /// listener was closed and the terminal error otherwise.
    pub fn serve<L, H>(&self, listener: &L, handler: H) -> io::Result<()>
    where
        L: Listener,
        H: Fn(L::Stream) + Send + Sync + 'static,
    {
        self.serve_with(listener, handler, spawn_thread)
    }

    pub(crate) fn serve_with<L, H, S>(&self, listener: &L, handler: H, spawn: S) -> io::Result<()>
    where
        L: Listener,
        H: Fn(L::Stream) + Send + Sync + 'static,
        S: Fn(Task) -> io::Result<JoinHandle<()>>,
    {
        let handler = Arc::new(handler);
        loop {
            match listener.accept() {
                Ok(stream) => {
                    let handler = handler.clone();
                    let report = self.report.clone();
                    let task: Task = Box::new(move || {
                        let rs = panic::catch_unwind(AssertUnwindSafe(|| handler(stream)));
                        if let Err(payload) = rs {
                            report.fault(&Fault::new("connection handler", payload));
                        }
                    });
                    if let Err(err) = spawn(task) {
                        self.report
                            .error(&format!("unable to start connection handler err={err}"));
                    }
                }
                Err(err) => match on_accept_error(&*self.report, err) {
                    Next::Retry => thread::yield_now(),
                    Next::Stop(rs) => return rs,
                },
            }
        }
    }
}
