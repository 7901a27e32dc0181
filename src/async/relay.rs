use std::future::Future;
use std::io;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::task::JoinHandle;

use crate::relay::BUFFER_SIZE;
use crate::report::{Fault, LogReport, Report};

/// Copies bytes between two async duplex endpoints in both directions.
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

    /// Relay `b` into `a` on a spawned task and `a` into `b` on the
    /// current one, resolving once the `a -> b` direction ends.
    ///
    /// The spawned direction keeps running; await the returned handle to
    /// wait for it.
    pub async fn copy<A, B>(&self, a: A, b: B) -> JoinHandle<()>
    where
        A: AsyncRead + AsyncWrite + Send + 'static,
        B: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (a_read, a_write) = tokio::io::split(a);
        let (b_read, b_write) = tokio::io::split(b);
        let report = self.report.clone();
        let peer = tokio::spawn(async move {
            contain(&*report, "relay b->a", pipe(b_read, a_write)).await;
        });
        contain(&*self.report, "relay a->b", pipe(a_read, b_write)).await;
        peer
    }
}

async fn pipe<R, W>(mut src: R, mut dst: W) -> io::Result<u64>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; BUFFER_SIZE];
    let mut total = 0u64;
    loop {
        let len = src.read(&mut buf).await?;
        if len == 0 {
            return Ok(total);
        }
        dst.write_all(&buf[..len]).await?;
        total += len as u64;
    }
}

async fn contain<F>(report: &dyn Report, context: &str, fut: F)
where
    F: Future<Output = io::Result<u64>>,
{
    match AssertUnwindSafe(fut).catch_unwind().await {
        Ok(Ok(total)) => log::trace!("{context}: finished after {total} bytes"),
        Ok(Err(e)) => report.error(&format!("{context}: copy failed err={e}")),
        Err(payload) => report.fault(&Fault::new(context, payload)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::tests::Recording;
    use std::pin::Pin;
    use std::task::{Context, Poll};
    use tokio::io::{duplex, ReadBuf};

    /// Panics on the first read; swallows writes.
    struct Exploding;

    impl AsyncRead for Exploding {
        fn poll_read(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            _buf: &mut ReadBuf<'_>,
        ) -> Poll<io::Result<()>> {
            panic!("reader exploded")
        }
    }

    impl AsyncWrite for Exploding {
        fn poll_write(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &[u8],
        ) -> Poll<io::Result<usize>> {
            Poll::Ready(Ok(buf.len()))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    #[tokio::test]
    async fn copies_both_directions() {
        let (a, mut a_peer) = duplex(1024);
        let (b, mut b_peer) = duplex(1024);
        let report = Arc::new(Recording::default());
        let proxy = Proxy::with_report(report.clone());

        let relay = tokio::spawn(async move { proxy.copy(a, b).await.await.unwrap() });

        a_peer.write_all(b"ping").await.unwrap();
        let mut buf = [0u8; 4];
        b_peer.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"ping");

        b_peer.write_all(b"pong").await.unwrap();
        a_peer.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"pong");

        drop(a_peer);
        drop(b_peer);
        relay.await.unwrap();
        assert!(report.faults.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn panic_in_spawned_direction_is_contained() {
        let (a, mut a_peer) = duplex(1024);
        let report = Arc::new(Recording::default());
        let proxy = Proxy::with_report(report.clone());

        let relay = tokio::spawn(async move { proxy.copy(a, Exploding).await.await.unwrap() });
        a_peer.write_all(b"still alive").await.unwrap();
        drop(a_peer);
        relay.await.unwrap();

        let faults = report.faults.lock().unwrap();
        assert_eq!(faults.len(), 1);
        assert_eq!(faults[0].context, "relay b->a");
        assert_eq!(faults[0].message, "reader exploded");
    }
}
