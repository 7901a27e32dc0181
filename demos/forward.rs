use std::net::{TcpListener, TcpStream};
use std::sync::mpsc::Receiver;
use std::sync::Arc;

use tun_drive::{BoxError, Proxy, Server};

/// Forward every TCP connection on LISTEN to TARGET.
///
/// `cargo run --example forward -- 127.0.0.1:7000 127.0.0.1:8000`
fn main() -> Result<(), BoxError> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let (tx, rx) = std::sync::mpsc::channel();

    let handle = ctrlc2::set_handler(move || {
        tx.send(()).expect("Signal error.");
        true
    })
    .expect("Error setting Ctrl-C handler");

    main_entry(rx)?;
    handle.join().unwrap();
    Ok(())
}

fn main_entry(quit: Receiver<()>) -> Result<(), BoxError> {
    let mut args = std::env::args().skip(1);
    let listen = args.next().unwrap_or_else(|| "127.0.0.1:7000".to_string());
    let target = args.next().unwrap_or_else(|| "127.0.0.1:8000".to_string());

    let listener = TcpListener::bind(&listen)?;
    log::info!("forwarding {listen} -> {target}");
    std::thread::spawn(move || {
        let rs = Server::new().serve(&listener, move |client| {
            let upstream = match TcpStream::connect(&target) {
                Ok(upstream) => upstream,
                Err(e) => {
                    log::warn!("connect {target}: {e}");
                    return;
                }
            };
            if let Ok(peer) = Proxy::new().copy(Arc::new(client), Arc::new(upstream)) {
                let _ = peer.join();
            }
        });
        if let Err(e) = rs {
            log::error!("listener stopped: {e}");
        }
    });
    quit.recv()?;
    log::info!("Quit...");
    Ok(())
}
