use std::future::Future;
use std::io;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tokio::net::{TcpListener, TcpStream};

use crate::report::{Fault, LogReport, Report};
use crate::server::{on_accept_error, Next};

/// An async source of incoming connections.
pub trait Accept {
    type Stream: Send + 'static;

    fn accept(&self) -> impl Future<Output = io::Result<Self::Stream>> + Send;
}

impl Accept for TcpListener {
    type Stream = TcpStream;

    fn accept(&self) -> impl Future<Output = io::Result<TcpStream>> + Send {
        async move {
            let (stream, peer) = TcpListener::accept(self).await?;
            log::debug!("accepted {peer}");
            Ok(stream)
        }
    }
}

/// Accept loop spawning a tokio task per connection.
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

    /// Accept connections until the listener fails for good, with the same
    /// classification as [`crate::Server::serve`].
    pub async fn serve<L, H, F>(&self, listener: &L, handler: H) -> io::Result<()>
    where
        L: Accept,
        H: Fn(L::Stream) -> F,
        F: Future<Output = ()> + Send + 'static,
    {
        loop {
            match listener.accept().await {
                Ok(stream) => {
                    let task = handler(stream);
                    let report = self.report.clone();
                    tokio::spawn(async move {
                        if let Err(payload) = AssertUnwindSafe(task).catch_unwind().await {
                            report.fault(&Fault::new("connection handler", payload));
                        }
                    });
                }
                Err(err) => match on_accept_error(&*self.report, err) {
                    Next::Retry => tokio::task::yield_now().await,
                    Next::Stop(rs) => return rs,
                },
            }
        }
    }
}
