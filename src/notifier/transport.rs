//! Local transport a subprocess uses to push notifications back to the
//! main process's [`super::NotifierBus`]. Abstracted behind a trait so
//! the Unix-specific datagram socket (or a Linux abstract-namespace
//! address) isn't baked into the coordinator (DESIGN NOTES §9: "abstract
//! the IPC transport behind a `NotifierTransport` capability").

use std::io;
use std::os::unix::net::UnixDatagram;
use std::path::{Path, PathBuf};

use super::Notification;

/// Wire encoding for one notification: a single line of
/// `status\terror_code\tlevel\tmessage`. Kept deliberately simple; it is
/// an internal protocol between this process and its own subprocesses,
/// not a public API.
pub fn encode(notification: &Notification) -> Vec<u8> {
    format!("{:?}\t{}\t{:?}\t{}\n", notification.status, notification.error_code, notification.level, notification.message).into_bytes()
}

pub fn decode(bytes: &[u8]) -> Option<Notification> {
    let text = std::str::from_utf8(bytes).ok()?;
    let mut fields = text.trim_end().splitn(4, '\t');
    let status = parse_status(fields.next()?)?;
    let error_code: i32 = fields.next()?.parse().ok()?;
    let level = parse_level(fields.next()?)?;
    let message = fields.next()?.to_string();
    Some(Notification {
        status,
        error_code,
        level,
        message,
    })
}

fn parse_status(s: &str) -> Option<super::Status> {
    use super::Status::*;
    Some(match s {
        "Idle" => Idle,
        "Start" => Start,
        "Run" => Run,
        "Success" => Success,
        "Failure" => Failure,
        "Download" => Download,
        "Done" => Done,
        "Subprocess" => Subprocess,
        "Progress" => Progress,
        _ => return None,
    })
}

fn parse_level(s: &str) -> Option<super::Level> {
    use super::Level::*;
    Some(match s {
        "Error" => Error,
        "Warn" => Warn,
        "Info" => Info,
        "Debug" => Debug,
        "Trace" => Trace,
        _ => return None,
    })
}

/// A transport a subprocess can send notifications over. Implemented
/// for a bound `UnixDatagram` so a script or chained-handler subprocess
/// can push a notification without access to the in-process bus.
pub trait NotifierTransport: Send {
    fn send(&self, notification: &Notification) -> io::Result<()>;
}

pub struct DatagramTransport {
    socket: UnixDatagram,
}

impl DatagramTransport {
    pub fn connect(path: &Path) -> io::Result<Self> {
        let socket = UnixDatagram::unbound()?;
        socket.connect(path)?;
        Ok(DatagramTransport { socket })
    }

    /// Binds the receiving end used by the main process's notifier
    /// thread (§4.7, §5: "one dedicated thread services the notifier's
    /// inbound datagram socket").
    pub fn bind(path: &Path) -> io::Result<UnixDatagram> {
        let _ = std::fs::remove_file(path);
        UnixDatagram::bind(path)
    }
}

impl NotifierTransport for DatagramTransport {
    fn send(&self, notification: &Notification) -> io::Result<()> {
        let bytes = encode(notification);
        self.socket.send(&bytes)?;
        Ok(())
    }
}

/// Services the receiving socket: reads datagrams and re-injects
/// decoded notifications into the in-process bus. Runs on the
/// dedicated notifier thread; returns when the socket is closed.
pub fn pump_into_bus(socket: &UnixDatagram, bus: &super::NotifierBus) -> io::Result<()> {
    let mut buf = [0u8; 4096];
    loop {
        let n = match socket.recv(&mut buf) {
            Ok(0) => return Ok(()),
            Ok(n) => n,
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => continue,
            Err(err) => return Err(err),
        };
        if let Some(notification) = decode(&buf[..n]) {
            bus.notify(notification);
        }
    }
}

#[allow(dead_code)]
fn socket_path_in(dir: &Path, name: &str) -> PathBuf {
    dir.join(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifier::{Level, Status};

    #[test]
    fn encode_decode_roundtrip() {
        let n = Notification::error(Status::Failure, 7, "hash mismatch on rootfs");
        let decoded = decode(&encode(&n)).unwrap();
        assert_eq!(decoded.status, Status::Failure);
        assert_eq!(decoded.error_code, 7);
        assert_eq!(decoded.level, Level::Error);
        assert_eq!(decoded.message, "hash mismatch on rootfs");
    }

    #[test]
    fn datagram_transport_delivers_to_bus() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notify.sock");
        let recv_socket = DatagramTransport::bind(&path).unwrap();
        let sender = DatagramTransport::connect(&path).unwrap();

        sender.send(&Notification::info(Status::Start, "begin")).unwrap();

        let mut buf = [0u8; 4096];
        let n = recv_socket.recv(&mut buf).unwrap();
        let decoded = decode(&buf[..n]).unwrap();
        assert_eq!(decoded.message, "begin");
    }

    #[test]
    fn malformed_datagram_fails_to_decode() {
        assert!(decode(b"not a valid record").is_none());
    }
}
