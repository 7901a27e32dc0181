use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::error::{Error, Result};

/// Raw operations a platform descriptor offers to a [`Handle`].
///
/// Implementations do no locking of their own; the handle serialises reads
/// against reads and writes against writes, and guarantees `close` runs once
/// with no read or write in flight.
pub trait RawDevice: Send + Sync {
    /// Block until a packet is read, or until [`RawDevice::wake`] is called.
    fn read(&self, buf: &mut [u8]) -> io::Result<usize>;
    /// Block until the packet is written, or until [`RawDevice::wake`] is called.
    fn write(&self, buf: &[u8]) -> io::Result<usize>;
    /// Single non-blocking read attempt; `WouldBlock` when nothing is queued.
    fn try_read(&self, buf: &mut [u8]) -> io::Result<usize>;
    /// Single non-blocking write attempt.
    fn try_write(&self, buf: &[u8]) -> io::Result<usize>;
    /// Ask the kernel which interface name this descriptor is bound to.
    fn query_name(&self) -> Result<String>;
    /// Make every pending and future blocking call return promptly.
    fn wake(&self) -> io::Result<()>;
    /// Release the descriptor.
    fn close(&self) -> io::Result<()>;
}

#[derive(Debug)]
enum NameState {
    Unresolved,
    Resolved(Result<String>),
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum CloseState {
    Open,
    Closed,
}

/// An open kernel virtual interface.
///
/// Reads exclude other reads and writes exclude other writes, but a read and
/// a write may be in flight at the same time. The interface name is resolved
/// once and memoised together with any failure. Closing is one-shot and may
/// happen from any thread while other threads are blocked in `recv`/`send`;
/// they return [`Error::ClosedWhileInUse`].
#[derive(Debug)]
pub struct Handle<R> {
    raw: R,
    name: Mutex<NameState>,
    read_lock: Mutex<()>,
    write_lock: Mutex<()>,
    state: Mutex<CloseState>,
    closed: AtomicBool,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn closed_error() -> io::Error {
    Error::ClosedWhileInUse.into()
}

#[cfg(unix)]
fn is_bad_descriptor(err: &io::Error) -> bool {
    match err.raw_os_error() {
        Some(code) if code == libc::EBADF => true,
        #[cfg(target_os = "linux")]
        Some(code) if code == libc::EBADFD => true,
        _ => false,
    }
}

#[cfg(not(unix))]
fn is_bad_descriptor(_err: &io::Error) -> bool {
    false
}

impl<R: RawDevice> Handle<R> {
    pub fn new(raw: R) -> Self {
        Self {
            raw,
            name: Mutex::new(NameState::Unresolved),
            read_lock: Mutex::new(()),
            write_lock: Mutex::new(()),
            state: Mutex::new(CloseState::Open),
            closed: AtomicBool::new(false),
        }
    }

    pub fn get_ref(&self) -> &R {
        &self.raw
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn check_open(&self) -> io::Result<()> {
        if self.is_closed() {
            return Err(closed_error());
        }
        Ok(())
    }

    fn settle(&self, rs: io::Result<usize>) -> io::Result<usize> {
        match rs {
            Err(e) if self.is_closed() || is_bad_descriptor(&e) => {
                log::trace!("device closed while in use: {e}");
                Err(closed_error())
            }
            rs => rs,
        }
    }

    /// Recv a packet from the device, blocking until one arrives or the device is closed.
    pub fn recv(&self, buf: &mut [u8]) -> io::Result<usize> {
        let _guard = lock(&self.read_lock);
        self.check_open()?;
        let rs = self.raw.read(buf);
        self.settle(rs)
    }

    /// Send a packet to the device.
    pub fn send(&self, buf: &[u8]) -> io::Result<usize> {
        let _guard = lock(&self.write_lock);
        self.check_open()?;
        let rs = self.raw.write(buf);
        self.settle(rs)
    }

    pub fn try_recv(&self, buf: &mut [u8]) -> io::Result<usize> {
        let _guard = lock(&self.read_lock);
        self.check_open()?;
        let rs = self.raw.try_read(buf);
        self.settle(rs)
    }

    pub fn try_send(&self, buf: &[u8]) -> io::Result<usize> {
        let _guard = lock(&self.write_lock);
        self.check_open()?;
        let rs = self.raw.try_write(buf);
        self.settle(rs)
    }

    /// Name of the interface as assigned by the kernel.
    ///
    /// The first call performs the query; its result, success or failure, is
    /// returned to every later caller.
    pub fn name(&self) -> Result<String> {
        let mut state = lock(&self.name);
        if let NameState::Resolved(rs) = &*state {
            return rs.clone();
        }
        // the descriptor number may already belong to someone else
        if self.is_closed() {
            return Err(Error::ClosedWhileInUse);
        }
        let rs = self.raw.query_name();
        *state = NameState::Resolved(rs.clone());
        rs
    }

    /// Close the device.
    ///
    /// Only the first call closes the descriptor and reports its outcome;
    /// later calls return `Ok(())`.
    pub fn close(&self) -> Result<()> {
        let mut state = lock(&self.state);
        if *state == CloseState::Closed {
            return Ok(());
        }
        *state = CloseState::Closed;
        self.closed.store(true, Ordering::SeqCst);
        if let Err(e) = self.raw.wake() {
            log::warn!("failed to wake pending device calls: {e}");
        }
        let _read = lock(&self.read_lock);
        let _write = lock(&self.write_lock);
        // a name query in flight still uses the descriptor
        let _name = lock(&self.name);
        self.raw.close().map_err(Error::from)
    }
}

impl<R: RawDevice> Read for &Handle<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.recv(buf)
    }
}

impl<R: RawDevice> Write for &Handle<R> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.send(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<R: RawDevice> Read for Handle<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.recv(buf)
    }
}

impl<R: RawDevice> Write for Handle<R> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.send(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Returns `-1` once the handle is closed, since the number may already
/// belong to another file.
#[cfg(unix)]
impl<R: RawDevice + std::os::fd::AsRawFd> std::os::fd::AsRawFd for Handle<R> {
    fn as_raw_fd(&self) -> std::os::fd::RawFd {
        if self.is_closed() {
            return -1;
        }
        self.raw.as_raw_fd()
    }
}
