use std::io;
use std::sync::Arc;

use windows_sys::Win32::Foundation::ERROR_BUFFER_OVERFLOW;
use wintun::{load_from_path, Adapter, Session};

use crate::error::{Error, Result};
use crate::handle::{Handle, RawDevice};
use crate::platform::windows::PlatformConfig;

/// A wintun session.
pub struct Tun {
    session: Arc<Session>,
}

/// A TUN device using the wintun driver.
pub type Device = Handle<Tun>;

fn wintun_error(e: wintun::Error) -> Error {
    match e {
        wintun::Error::Io(err) => err.into(),
        e => Error::String(e.to_string()),
    }
}

/// Adapter GUID derived from its name, so reopening finds the same adapter.
fn hash_name(input_str: &str) -> u128 {
    use std::hash::{Hash, Hasher};
    let mut hasher = std::hash::DefaultHasher::new();
    8765028472139845610u64.hash(&mut hasher);
    input_str.hash(&mut hasher);
    let front = hasher.finish();

    let mut hasher = std::hash::DefaultHasher::new();
    12874056902134875693u64.hash(&mut hasher);
    input_str.hash(&mut hasher);
    let back = hasher.finish();
    (u128::from(front) << 64) | u128::from(back)
}

/// Open the adapter called `name`, creating it if needed, and start a session.
pub(crate) fn start(name: &str, platform: &PlatformConfig) -> Result<Device> {
    let wintun = unsafe { load_from_path(&platform.wintun_file) }.map_err(|e| {
        log::error!("failed to load {}: {e}", platform.wintun_file);
        wintun_error(e)
    })?;
    let guid = platform.device_guid.unwrap_or_else(|| hash_name(name));
    let adapter = match Adapter::open(&wintun, name) {
        Ok(adapter) => adapter,
        Err(_) => Adapter::create(&wintun, name, name, Some(guid)).map_err(wintun_error)?,
    };
    let session = adapter
        .start_session(platform.ring_capacity.unwrap_or(wintun::MAX_RING_CAPACITY))
        .map_err(wintun_error)?;
    Ok(Device::new(Tun { session }))
}

impl Tun {
    pub fn get_session(&self) -> Arc<Session> {
        self.session.clone()
    }

    fn aborted(e: wintun::Error) -> io::Error {
        io::Error::new(io::ErrorKind::ConnectionAborted, e)
    }
}

impl RawDevice for Tun {
    fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        let packet = self.session.receive_blocking().map_err(Self::aborted)?;
        let bytes = packet.bytes();
        let len = bytes.len().min(buf.len());
        buf[..len].copy_from_slice(&bytes[..len]);
        Ok(len)
    }

    fn write(&self, buf: &[u8]) -> io::Result<usize> {
        let size = u16::try_from(buf.len())
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "packet too large"))?;
        let mut packet = self.session.allocate_send_packet(size).map_err(|e| match e {
            wintun::Error::Io(err) => err,
            e => io::Error::new(io::ErrorKind::Other, e.to_string()),
        })?;
        packet.bytes_mut().copy_from_slice(buf);
        self.session.send_packet(packet);
        Ok(buf.len())
    }

    fn try_read(&self, buf: &mut [u8]) -> io::Result<usize> {
        match self.session.try_receive().map_err(Self::aborted)? {
            Some(packet) => {
                let bytes = packet.bytes();
                let len = bytes.len().min(buf.len());
                buf[..len].copy_from_slice(&bytes[..len]);
                Ok(len)
            }
            None => Err(io::Error::from(io::ErrorKind::WouldBlock)),
        }
    }

    fn try_write(&self, buf: &[u8]) -> io::Result<usize> {
        match self.write(buf) {
            Err(e) if e.raw_os_error() == Some(ERROR_BUFFER_OVERFLOW as i32) => {
                Err(io::Error::from(io::ErrorKind::WouldBlock))
            }
            rs => rs,
        }
    }

    fn query_name(&self) -> Result<String> {
        self.session.get_adapter().get_name().map_err(wintun_error)
    }

    fn wake(&self) -> io::Result<()> {
        self.session.shutdown().map_err(Self::aborted)
    }

    /// The session ends when the last reference drops; shutting it down
    /// here makes every later call fail.
    fn close(&self) -> io::Result<()> {
        self.session.shutdown().map_err(Self::aborted)
    }
}

impl Handle<Tun> {
    /// Interface index of the adapter.
    pub fn if_index(&self) -> Result<u32> {
        self.get_ref()
            .session
            .get_adapter()
            .get_adapter_index()
            .map_err(wintun_error)
    }

    pub fn mtu(&self) -> Result<u16> {
        let mtu = self
            .get_ref()
            .session
            .get_adapter()
            .get_mtu()
            .map_err(wintun_error)?;
        Ok(u16::try_from(mtu).unwrap_or(u16::MAX))
    }

    pub fn set_mtu(&self, mtu: u16) -> Result<()> {
        self.get_ref()
            .session
            .get_adapter()
            .set_mtu(mtu as _)
            .map_err(wintun_error)
    }
}
