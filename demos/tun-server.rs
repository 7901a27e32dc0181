use std::net::TcpListener;
use std::sync::mpsc::Receiver;
use std::sync::Arc;

use tun_drive::{BoxError, Configuration, Drive, Proxy, Server};

/// Bridge a TUN interface to TCP clients.
///
/// Bytes read from a client are written to the interface and packets read
/// from the interface go back to the client.
fn main() -> Result<(), BoxError> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("trace")).init();
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
    let config = Configuration::new()
        .address("10.0.0.12/24")
        .mtu(1400);
    #[cfg(target_os = "windows")]
    let config = config.platform_config(|config| {
        config.device_guid(9099482345783245345345_u128);
    });

    let drive = Arc::new(Drive::new(&config)?);
    drive.up()?;
    log::info!("Successfully created tun {:?}", drive.name());
    println!("mtu = {:?}", drive.mtu());
    println!("addresses = {:?}", drive.addresses());

    let listener = TcpListener::bind("0.0.0.0:7000")?;
    let served = drive.clone();
    std::thread::spawn(move || {
        let rs = Server::new().serve(&listener, move |stream| {
            if let Ok(peer) = Proxy::new().copy(Arc::new(stream), served.clone()) {
                let _ = peer.join();
            }
        });
        if let Err(e) = rs {
            log::error!("listener stopped: {e}");
        }
    });

    quit.recv()?;
    log::info!("Quit...");
    drive.close()?;
    Ok(())
}
