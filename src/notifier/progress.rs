//! The progress socket: out-of-process consumers (dashboards, LEDs, a
//! CLI front-end's own progress bar) read a sequence of fixed-size
//! progress records over a local stream socket (§6).

use std::io::{self, Read, Write};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::Path;

use super::ProgressRecord;

/// Wire size of one encoded record: 4 x u32 fields + a fixed-width name
/// buffer for the artifact and handler names. Fixed-size so a client
/// can `read_exact` without a length prefix.
pub const ARTIFACT_NAME_LEN: usize = 64;
pub const HANDLER_NAME_LEN: usize = 32;
pub const RECORD_LEN: usize = 4 + 4 + ARTIFACT_NAME_LEN + HANDLER_NAME_LEN + 1 + 1;

pub fn encode(record: &ProgressRecord) -> [u8; RECORD_LEN] {
    let mut buf = [0u8; RECORD_LEN];
    buf[0..4].copy_from_slice(&record.current_step.to_le_bytes());
    buf[4..8].copy_from_slice(&record.total_steps.to_le_bytes());
    write_fixed(&mut buf[8..8 + ARTIFACT_NAME_LEN], &record.current_artifact);
    let handler_off = 8 + ARTIFACT_NAME_LEN;
    write_fixed(&mut buf[handler_off..handler_off + HANDLER_NAME_LEN], &record.handler_name);
    buf[RECORD_LEN - 2] = record.percent;
    buf[RECORD_LEN - 1] = record.download_percent;
    buf
}

fn write_fixed(dst: &mut [u8], s: &str) {
    let bytes = s.as_bytes();
    let n = bytes.len().min(dst.len());
    dst[..n].copy_from_slice(&bytes[..n]);
}

pub fn decode(buf: &[u8; RECORD_LEN]) -> ProgressRecord {
    let current_step = u32::from_le_bytes(buf[0..4].try_into().unwrap());
    let total_steps = u32::from_le_bytes(buf[4..8].try_into().unwrap());
    let current_artifact = read_fixed(&buf[8..8 + ARTIFACT_NAME_LEN]);
    let handler_off = 8 + ARTIFACT_NAME_LEN;
    let handler_name = read_fixed(&buf[handler_off..handler_off + HANDLER_NAME_LEN]);
    ProgressRecord {
        current_step,
        total_steps,
        current_artifact,
        handler_name,
        percent: buf[RECORD_LEN - 2],
        download_percent: buf[RECORD_LEN - 1],
    }
}

fn read_fixed(src: &[u8]) -> String {
    let end = src.iter().position(|&b| b == 0).unwrap_or(src.len());
    String::from_utf8_lossy(&src[..end]).into_owned()
}

pub struct ProgressSocket {
    listener: UnixListener,
}

impl ProgressSocket {
    pub fn bind(path: &Path) -> io::Result<Self> {
        let _ = std::fs::remove_file(path);
        Ok(ProgressSocket { listener: UnixListener::bind(path)? })
    }

    /// Broadcasts one record to every currently-connected client,
    /// dropping clients that error on write (they will reconnect).
    pub fn broadcast(&self, record: &ProgressRecord, clients: &mut Vec<UnixStream>) {
        let bytes = encode(record);
        clients.retain_mut(|client| client.write_all(&bytes).is_ok());
    }

    pub fn accept_pending(&self, clients: &mut Vec<UnixStream>) -> io::Result<()> {
        self.listener.set_nonblocking(true)?;
        loop {
            match self.listener.accept() {
                Ok((stream, _)) => clients.push(stream),
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => break,
                Err(err) => return Err(err),
            }
        }
        Ok(())
    }
}

pub fn read_one(stream: &mut UnixStream) -> io::Result<ProgressRecord> {
    let mut buf = [0u8; RECORD_LEN];
    stream.read_exact(&mut buf)?;
    Ok(decode(&buf))
}
