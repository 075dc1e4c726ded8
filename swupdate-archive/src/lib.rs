//! Forward-only reader for the "newc" cpio archive format used to carry an
//! update package: a sequence of `(header, payload)` entries terminated by
//! a `TRAILER!!!` sentinel. No seeking is ever performed; entries are
//! visited in the order they were written and each payload byte is read
//! exactly once.

mod error;

use std::io::Read;

pub use error::Error;
pub type Result<T> = std::result::Result<T, Error>;

const MAGIC: &[u8; 6] = b"070701";
const TRAILER_NAME: &str = "TRAILER!!!";
const HEADER_LEN: usize = 110;

/// One archive entry header, with numeric fields already decoded from the
/// fixed-width hex representation on the wire.
#[derive(Debug, Clone)]
pub struct Header {
    pub name: String,
    pub filesize: u64,
    pub mode: u32,
    pub mtime: u32,
}

impl Header {
    fn is_trailer(&self) -> bool {
        self.name == TRAILER_NAME
    }
}

#[derive(Debug, PartialEq, Eq)]
enum State {
    AwaitingHeader,
    InPayload { remaining: u64, pad: u8 },
    Eof,
}

/// Reads entries from an upstream byte source one at a time.
///
/// `next()` parses the next header; `payload()` then hands out a bounded
/// reader that yields exactly `filesize` bytes. `next()` must not be called
/// again until that payload reader has been drained to completion (or
/// [`ArchiveReader::skip`] has been used instead) -- doing so is a
/// programming error and is rejected rather than silently re-synced.
pub struct ArchiveReader<R> {
    source: R,
    position: u64,
    state: State,
}

impl<R: Read> ArchiveReader<R> {
    pub fn open(source: R) -> Self {
        ArchiveReader {
            source,
            position: 0,
            state: State::AwaitingHeader,
        }
    }

    pub fn position(&self) -> u64 {
        self.position
    }

    fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        self.source.read_exact(buf).map_err(|err| Error::ShortRead(self.position, err))?;
        self.position += buf.len() as u64;
        Ok(())
    }

    fn discard(&mut self, mut n: u64) -> Result<()> {
        let mut sink = [0u8; 256];
        while n > 0 {
            let chunk = n.min(sink.len() as u64) as usize;
            self.read_exact(&mut sink[..chunk])?;
            n -= chunk as u64;
        }
        Ok(())
    }

    /// Pad amount to the next 4-byte boundary counting from the start of
    /// the archive, given the number of bytes already consumed.
    fn pad_for(position: u64) -> u8 {
        ((4 - (position % 4)) % 4) as u8
    }

    /// Parses the next header. Returns `Ok(None)` once the `TRAILER!!!`
    /// sentinel has been consumed (clean end-of-archive).
    pub fn next(&mut self) -> Result<Option<Header>> {
        match self.state {
            State::InPayload { remaining, .. } if remaining > 0 => {
                return Err(Error::PayloadNotExhausted(remaining));
            }
            State::InPayload { pad, .. } => {
                self.discard(pad as u64)?;
                self.state = State::AwaitingHeader;
            }
            State::Eof => return Ok(None),
            State::AwaitingHeader => {}
        }

        let mut raw = [0u8; HEADER_LEN];
        let start = self.position;
        match self.source.read_exact(&mut raw) {
            Ok(()) => self.position += HEADER_LEN as u64,
            Err(err) if err.kind() == std::io::ErrorKind::UnexpectedEof => {
                return Err(Error::PartialHeaderAtEof(start));
            }
            Err(err) => return Err(Error::ShortRead(start, err)),
        }

        if &raw[0..6] != MAGIC {
            return Err(Error::BadMagic(start, raw[0..6].to_vec()));
        }

        let namesize = parse_hex_field(&raw, 94, start)? as usize;
        let filesize = parse_hex_field(&raw, 54, start)?;
        let mode = parse_hex_field(&raw, 14, start)?;
        let mtime = parse_hex_field(&raw, 46, start)?;

        if namesize == 0 {
            return Err(Error::BadNameLength(start));
        }

        let mut namebuf = vec![0u8; namesize];
        self.read_exact(&mut namebuf)?;
        // name is NUL-terminated; strip the trailing NUL(s).
        while namebuf.last() == Some(&0) {
            namebuf.pop();
        }
        let name = String::from_utf8(namebuf).map_err(|err| Error::BadName(start, err))?;

        let name_pad = Self::pad_for(self.position);
        self.discard(name_pad as u64)?;

        let header = Header {
            name,
            filesize,
            mode,
            mtime,
        };

        if header.is_trailer() {
            self.state = State::Eof;
            return Ok(None);
        }

        let payload_pad = Self::pad_for_size(filesize);
        self.state = State::InPayload {
            remaining: filesize,
            pad: payload_pad,
        };

        Ok(Some(header))
    }

    fn pad_for_size(size: u64) -> u8 {
        ((4 - (size % 4)) % 4) as u8
    }

    /// Returns a reader bounded to the current entry's declared payload
    /// size. Once it reaches EOF the archive reader automatically skips
    /// the padding and is ready for the next `next()` call.
    pub fn payload(&mut self) -> PayloadReader<'_, R> {
        PayloadReader { archive: self }
    }

    /// Discards the current entry's payload without handing it to a caller.
    pub fn skip(&mut self) -> Result<()> {
        let remaining = match self.state {
            State::InPayload { remaining, pad } => {
                self.discard(remaining)?;
                self.discard(pad as u64)?;
                self.state = State::AwaitingHeader;
                return Ok(());
            }
            _ => 0,
        };
        let _ = remaining;
        Ok(())
    }
}

/// Bounded reader over the current entry's payload bytes.
pub struct PayloadReader<'a, R> {
    archive: &'a mut ArchiveReader<R>,
}

impl<'a, R: Read> Read for PayloadReader<'a, R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let (remaining, pad) = match self.archive.state {
            State::InPayload { remaining, pad } => (remaining, pad),
            _ => return Ok(0),
        };

        if remaining == 0 {
            return Ok(0);
        }

        let want = (buf.len() as u64).min(remaining) as usize;
        let n = self.archive.source.read(&mut buf[..want])?;
        self.archive.position += n as u64;

        let remaining = remaining - n as u64;
        if remaining == 0 {
            // Payload fully drained: skip the pad bytes now so the archive
            // reader is immediately ready for the next header.
            let mut sink = [0u8; 4];
            self.archive.source.read_exact(&mut sink[..pad as usize])?;
            self.archive.position += pad as u64;
            self.archive.state = State::AwaitingHeader;
        } else {
            self.archive.state = State::InPayload { remaining, pad };
        }

        Ok(n)
    }
}

fn parse_hex_field(raw: &[u8], offset: usize, entry_start: u64) -> Result<u64> {
    let field = &raw[offset..offset + 8];
    let s = std::str::from_utf8(field).map_err(|_| Error::BadHexField(entry_start, offset))?;
    u64::from_str_radix(s, 16).map_err(|_| Error::BadHexField(entry_start, offset))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn hex8(v: u64) -> String {
        format!("{:08x}", v)
    }

    fn encode_entry(name: &str, data: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        let namesize = name.len() + 1; // NUL terminator
        out.extend_from_slice(MAGIC);
        out.extend_from_slice(hex8(0).as_bytes()); // ino
        out.extend_from_slice(hex8(0o100644).as_bytes()); // mode
        out.extend_from_slice(hex8(0).as_bytes()); // uid
        out.extend_from_slice(hex8(0).as_bytes()); // gid
        out.extend_from_slice(hex8(1).as_bytes()); // nlink
        out.extend_from_slice(hex8(0).as_bytes()); // mtime
        out.extend_from_slice(hex8(data.len() as u64).as_bytes()); // filesize
        out.extend_from_slice(hex8(0).as_bytes()); // devmajor
        out.extend_from_slice(hex8(0).as_bytes()); // devminor
        out.extend_from_slice(hex8(0).as_bytes()); // rdevmajor
        out.extend_from_slice(hex8(0).as_bytes()); // rdevminor
        out.extend_from_slice(hex8(namesize as u64).as_bytes()); // namesize
        out.extend_from_slice(hex8(0).as_bytes()); // check
        assert_eq!(out.len(), HEADER_LEN);

        out.extend_from_slice(name.as_bytes());
        out.push(0);
        let pad = ArchiveReader::<Cursor<Vec<u8>>>::pad_for(out.len() as u64);
        out.extend(std::iter::repeat(0u8).take(pad as usize));

        out.extend_from_slice(data);
        let pad = ArchiveReader::<Cursor<Vec<u8>>>::pad_for_size(data.len() as u64);
        out.extend(std::iter::repeat(0u8).take(pad as usize));

        out
    }

    fn encode_trailer() -> Vec<u8> {
        encode_entry(TRAILER_NAME, &[])
    }

    #[test]
    fn reads_entries_in_order_then_eof() {
        let mut bytes = encode_entry("sw-description", b"hello");
        bytes.extend(encode_entry("payload.bin", b"world!!"));
        bytes.extend(encode_trailer());

        let mut reader = ArchiveReader::open(Cursor::new(bytes));

        let h1 = reader.next().unwrap().expect("first entry");
        assert_eq!(h1.name, "sw-description");
        let mut buf = Vec::new();
        reader.payload().read_to_end(&mut buf).unwrap();
        assert_eq!(buf, b"hello");

        let h2 = reader.next().unwrap().expect("second entry");
        assert_eq!(h2.name, "payload.bin");
        let mut buf2 = Vec::new();
        reader.payload().read_to_end(&mut buf2).unwrap();
        assert_eq!(buf2, b"world!!");

        assert!(reader.next().unwrap().is_none());
        assert!(reader.next().unwrap().is_none());
    }

    #[test]
    fn rejects_next_before_payload_drained() {
        let mut bytes = encode_entry("a", b"0123456789");
        bytes.extend(encode_trailer());
        let mut reader = ArchiveReader::open(Cursor::new(bytes));

        reader.next().unwrap();
        match reader.next() {
            Err(Error::PayloadNotExhausted(_)) => {}
            other => panic!("expected PayloadNotExhausted, got {other:?}"),
        }
    }

    #[test]
    fn skip_discards_payload_and_pad() {
        let mut bytes = encode_entry("a", b"0123456789");
        bytes.extend(encode_entry("b", b"next"));
        bytes.extend(encode_trailer());
        let mut reader = ArchiveReader::open(Cursor::new(bytes));

        reader.next().unwrap();
        reader.skip().unwrap();
        let h = reader.next().unwrap().expect("second entry");
        assert_eq!(h.name, "b");
    }

    #[test]
    fn bad_magic_is_rejected() {
        let mut bytes = encode_entry("a", b"x");
        bytes[0] = b'9';
        let mut reader = ArchiveReader::open(Cursor::new(bytes));
        match reader.next() {
            Err(Error::BadMagic(..)) => {}
            other => panic!("expected BadMagic, got {other:?}"),
        }
    }

    #[test]
    fn partial_header_at_eof_is_distinct_from_clean_eof() {
        let bytes = vec![0u8; 10];
        let mut reader = ArchiveReader::open(Cursor::new(bytes));
        match reader.next() {
            Err(Error::PartialHeaderAtEof(_)) => {}
            other => panic!("expected PartialHeaderAtEof, got {other:?}"),
        }
    }
}
