use tokio::net::TcpListener;
use tokio::sync::mpsc::Receiver;
use tun_drive::{BoxError, Configuration};

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("trace")).init();
    let (tx, rx) = tokio::sync::mpsc::channel::<()>(1);

    ctrlc2::set_async_handler(async move {
        tx.send(()).await.expect("Signal error");
    })
    .await;

    main_entry(rx).await?;
    Ok(())
}

#[cfg(windows)]
async fn main_entry(_quit: Receiver<()>) -> Result<(), BoxError> {
    unimplemented!()
}

/// Relay the first TCP client on port 7000 to a TUN interface.
#[cfg(unix)]
async fn main_entry(mut quit: Receiver<()>) -> Result<(), BoxError> {
    use tun_drive::r#async::{AsyncDevice, Proxy};
    use tun_drive::Drive;

    log::info!("starting");
    let drive = Drive::new(&Configuration::new().address("10.0.0.39/24"))?;
    drive.up()?;
    let name = drive.name()?;
    log::info!("Successfully created tun {name}");
    let dev = AsyncDevice::new(drive.into_device())?;

    let listener = TcpListener::bind("0.0.0.0:7000").await?;
    tokio::select! {
        _ = quit.recv() => {
            log::info!("Quit...");
        }
        accepted = listener.accept() => {
            let (stream, peer) = accepted?;
            log::info!("relaying {peer} <-> {name}");
            let spawned = Proxy::new().copy(stream, dev).await;
            let _ = spawned.await;
        }
    }
    Ok(())
}
