use std::io::{self, Read, Write};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::JoinHandle;

use crate::report::{Fault, LogReport, Report};
use crate::server::{spawn_thread, Task};

/// Large enough for any IP packet.
pub(crate) const BUFFER_SIZE: usize = u16::MAX as usize;

/// Copies bytes between two duplex endpoints in both directions.
#[derive(Clone)]
pub struct Proxy {
    report: Arc<dyn Report>,
}

impl Default for Proxy {
    fn default() -> Self {
        Self::new()
    }
}

impl Proxy {
    pub fn new() -> Self {
        Self::with_report(Arc::new(LogReport::new("tun_drive::relay")))
    }

    pub fn with_report(report: Arc<dyn Report>) -> Self {
        Self { report }
    }

    /// Relay `b` into `a` on a new thread and `a` into `b` on the calling
    /// thread, returning once the `a -> b` direction ends.
    ///
    /// A direction ends on end-of-stream, on an I/O error (reported as an
    /// error) or on a panic (reported as a fault). Neither endpoint is closed
    /// and the other direction keeps running; join the returned handle to
    /// wait for it.
    ///
    /// When the OS refuses the extra thread nothing is relayed; the failure
    /// is reported and returned.
    pub fn copy<A, B>(&self, a: Arc<A>, b: Arc<B>) -> io::Result<JoinHandle<()>>
    where
        A: Send + Sync + 'static,
        B: Send + Sync + 'static,
        for<'x> &'x A: Read + Write,
        for<'x> &'x B: Read + Write,
    {
        self.copy_with(a, b, spawn_thread)
    }

    pub(crate) fn copy_with<A, B, S>(&self, a: Arc<A>, b: Arc<B>, spawn: S) -> io::Result<JoinHandle<()>>
    where
        A: Send + Sync + 'static,
        B: Send + Sync + 'static,
        for<'x> &'x A: Read + Write,
        for<'x> &'x B: Read + Write,
        S: FnOnce(Task) -> io::Result<JoinHandle<()>>,
    {
        let report = self.report.clone();
        let (src, dst) = (b.clone(), a.clone());
        let task: Task = Box::new(move || contain(&*report, "relay b->a", || pipe(&*src, &*dst)));
        let peer = spawn(task).inspect_err(|err| {
            self.report
                .error(&format!("relay b->a: unable to start err={err}"))
        })?;
        contain(&*self.report, "relay a->b", || pipe(&*a, &*b));
        Ok(peer)
    }
}

/// Copy `src` into `dst` until end-of-stream.
pub(crate) fn pipe<R: Read, W: Write>(mut src: R, mut dst: W) -> io::Result<u64> {
    let mut buf = vec![0u8; BUFFER_SIZE];
    let mut total = 0u64;
    loop {
        let len = match src.read(&mut buf) {
            Ok(0) => return Ok(total),
            Ok(len) => len,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        dst.write_all(&buf[..len])?;
        total += len as u64;
    }
}

fn contain<F>(report: &dyn Report, context: &str, f: F)
where
    F: FnOnce() -> io::Result<u64>,
{
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(total)) => log::trace!("{context}: finished after {total} bytes"),
        Ok(Err(e)) => report.error(&format!("{context}: copy failed err={e}")),
        Err(payload) => report.fault(&Fault::new(context, payload)),
    }
}
