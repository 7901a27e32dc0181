use std::io;
use std::pin::Pin;
use std::task::{ready, Context, Poll};

use tokio::io::unix::AsyncFd;
use tokio::io::{AsyncRead, AsyncWrite, Interest, ReadBuf};

use crate::platform::Device;

/// An async TUN device wrapper around a TUN device.
///
/// The inner [`Device`] is not exposed by reference, so it can only be
/// closed through [`AsyncDevice::close`] or by dropping the wrapper, both of
/// which deregister the descriptor from tokio before it is released.
pub struct AsyncDevice {
    inner: AsyncFd<Device>,
}

impl AsyncDevice {
    /// Create a new `AsyncDevice` wrapping around a `Device`.
    pub fn new(device: Device) -> io::Result<AsyncDevice> {
        device.get_ref().fd.set_nonblock()?;
        Ok(AsyncDevice {
            inner: AsyncFd::new(device)?,
        })
    }

    /// Deregister from tokio and return the device.
    pub fn into_inner(self) -> Device {
        self.inner.into_inner()
    }

    /// Deregister from tokio, then close the device.
    pub fn close(self) -> crate::Result<()> {
        self.into_inner().close()
    }

    pub fn name(&self) -> crate::Result<String> {
        self.inner.get_ref().name()
    }

    pub fn mtu(&self) -> crate::Result<u16> {
        self.inner.get_ref().mtu()
    }

    pub fn set_mtu(&self, mtu: u16) -> crate::Result<()> {
        self.inner.get_ref().set_mtu(mtu)
    }

    pub fn if_index(&self) -> crate::Result<u32> {
        self.inner.get_ref().if_index()
    }

    /// Recv a packet from the device.
    pub async fn recv(&self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner
            .async_io(Interest::READABLE, |device| device.try_recv(buf))
            .await
    }

    /// Send a packet to the device.
    pub async fn send(&self, buf: &[u8]) -> io::Result<usize> {
        self.inner
            .async_io(Interest::WRITABLE, |device| device.try_send(buf))
            .await
    }
}

impl AsyncRead for AsyncDevice {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        loop {
            let mut guard = ready!(self.inner.poll_read_ready(cx))?;
            let unfilled = buf.initialize_unfilled();
            match guard.try_io(|inner| inner.get_ref().try_recv(unfilled)) {
                Ok(Ok(len)) => {
                    buf.advance(len);
                    return Poll::Ready(Ok(()));
                }
                Ok(Err(err)) => return Poll::Ready(Err(err)),
                Err(_would_block) => continue,
            }
        }
    }
}

impl AsyncWrite for AsyncDevice {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        loop {
            let mut guard = ready!(self.inner.poll_write_ready(cx))?;
            match guard.try_io(|inner| inner.get_ref().try_send(buf)) {
                Ok(result) => return Poll::Ready(result),
                Err(_would_block) => continue,
            }
        }
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}
