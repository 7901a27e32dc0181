use pnet_packet::ip::IpNextHeaderProtocols;
use pnet_packet::ipv4::{checksum, MutableIpv4Packet};

use tun_drive::{Configuration, Drive, Error};

/// Open a device, or explain why this host cannot.
fn open(address: &str) -> Option<Drive> {
    let config = Configuration::new().mtu(1500).address(address);
    match Drive::new(&config) {
        Ok(drive) => Some(drive),
        Err(e @ (Error::DeviceMissing(_) | Error::PermissionDenied(_))) => {
            eprintln!("skipping: {e}");
            None
        }
        Err(e) if e.raw_os_error() == Some(libc::EPERM) => {
            eprintln!("skipping: {e}");
            None
        }
        Err(e) => panic!("unexpected failure creating device: {e}"),
    }
}

fn probe_packet() -> Vec<u8> {
    let mut buf = vec![0u8; 60];
    let mut packet = MutableIpv4Packet::new(&mut buf).unwrap();
    packet.set_version(4);
    packet.set_header_length(5);
    packet.set_total_length(60);
    packet.set_ttl(64);
    packet.set_next_level_protocol(IpNextHeaderProtocols::Udp);
    packet.set_source("10.0.0.2".parse().unwrap());
    packet.set_destination("10.0.0.1".parse().unwrap());
    let sum = checksum(&packet.to_immutable());
    packet.set_checksum(sum);
    buf
}

#[cfg(not(feature = "async_tokio"))]
#[test]
fn create_and_write() {
    let Some(drive) = open("10.0.0.0/24") else {
        return;
    };
    assert!(!drive.name().unwrap().is_empty());
    assert_eq!(drive.mtu().unwrap(), 1500);
    assert_eq!(drive.send(&probe_packet()).unwrap(), 60);
    drive.close().unwrap();
    assert!(drive.close().is_ok());
}

#[cfg(not(feature = "async_tokio"))]
#[test]
fn close_unblocks_reader() {
    use std::sync::Arc;
    use std::time::Duration;

    let Some(drive) = open("10.0.1.0/24") else {
        return;
    };
    let drive = Arc::new(drive);
    let reader = {
        let drive = drive.clone();
        std::thread::spawn(move || {
            let mut buf = [0u8; 2048];
            loop {
                if let Err(e) = drive.recv(&mut buf) {
                    return e;
                }
            }
        })
    };
    std::thread::sleep(Duration::from_millis(200));
    drive.close().unwrap();
    let err = reader.join().unwrap();
    assert!(Error::is_closed(&err), "{err}");
}

#[cfg(all(target_os = "linux", not(feature = "async_tokio")))]
#[test]
fn test_udp() {
    use pnet_packet::Packet;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    let test_msg = "test udp";
    let Some(drive) = open("10.26.1.100/24") else {
        return;
    };
    if let Err(e) = drive.up() {
        eprintln!("skipping: {e}");
        return;
    }
    let drive = Arc::new(drive);
    let test_udp_v4 = Arc::new(AtomicBool::new(false));
    let test_udp_v4_c = test_udp_v4.clone();
    let reader = drive.clone();
    std::thread::spawn(move || {
        let mut buf = [0; 65535];
        while let Ok(len) = reader.recv(&mut buf) {
            if let Some(ipv4_packet) = pnet_packet::ipv4::Ipv4Packet::new(&buf[..len]) {
                if ipv4_packet.get_next_level_protocol() == IpNextHeaderProtocols::Udp {
                    if let Some(udp_packet) =
                        pnet_packet::udp::UdpPacket::new(ipv4_packet.payload())
                    {
                        if udp_packet.payload() == test_msg.as_bytes() {
                            test_udp_v4.store(true, Ordering::SeqCst);
                        }
                    }
                }
            }
        }
    });
    let udp_socket = std::net::UdpSocket::bind("10.26.1.100:0").unwrap();
    let deadline = Instant::now() + Duration::from_secs(6);
    while !test_udp_v4_c.load(Ordering::SeqCst) && Instant::now() < deadline {
        udp_socket
            .send_to(test_msg.as_bytes(), "10.26.1.101:8080")
            .unwrap();
        std::thread::sleep(Duration::from_millis(100));
    }
    assert!(test_udp_v4_c.load(Ordering::SeqCst));
    drive.close().unwrap();
}

#[cfg(all(unix, feature = "async_tokio"))]
#[tokio::test]
async fn async_write() {
    let Some(drive) = open("10.0.2.0/24") else {
        return;
    };
    let device = tun_drive::r#async::AsyncDevice::new(drive.into_device()).unwrap();
    assert!(!device.name().unwrap().is_empty());
    assert_eq!(device.send(&probe_packet()).await.unwrap(), 60);
    device.close().unwrap();
}
