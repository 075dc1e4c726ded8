#[derive(Debug)]
pub enum Error {
    ShortRead(u64, std::io::Error),
    PartialHeaderAtEof(u64),
    BadMagic(u64, Vec<u8>),
    BadHexField(u64, usize),
    BadNameLength(u64),
    BadName(u64, std::string::FromUtf8Error),
    PayloadNotExhausted(u64),
}

impl std::error::Error for Error {}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::ShortRead(pos, err) => write!(f, "short read at offset {pos}: {err}"),
            Error::PartialHeaderAtEof(pos) => write!(f, "partial header at offset {pos}: truncated archive"),
            Error::BadMagic(pos, magic) => write!(f, "bad magic at offset {pos}: {magic:?}"),
            Error::BadHexField(pos, field_off) => write!(f, "non-hex header field at offset {pos} (field offset {field_off})"),
            Error::BadNameLength(pos) => write!(f, "zero-length name at offset {pos}"),
            Error::BadName(pos, err) => write!(f, "invalid name encoding at offset {pos}: {err}"),
            Error::PayloadNotExhausted(remaining) => write!(f, "next() called with {remaining} payload bytes still unread"),
        }
    }
}
