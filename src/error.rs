use std::path::PathBuf;

#[derive(Debug)]
pub enum Error {
    Archive(swupdate_archive::Error),
    Parse(String),
    NoGrammarMatched,
    ManifestTooLarge { limit: usize, actual: usize },
    Validation(ValidationFailure),
    Signature(swupdate_crypto::Error),
    MissingSignatureEntry,
    HashMismatch(swupdate_crypto::Error),
    Decrypt(swupdate_crypto::Error),
    Decompress(swupdate_crypto::Error),
    Handler(String, Box<dyn std::error::Error + Send + Sync>),
    UnknownHandler(String),
    Bootloader(String),
    NoBootloaderAvailable,
    Io(std::io::Error),
    OpenFile(PathBuf, std::io::Error),
    Cancelled,
    Config(String),
}

#[derive(Debug)]
pub enum ValidationFailure {
    NoMatchingHardware { board: String, revision: String },
    MissingHandler(String),
    HandlerCapabilityMismatch { handler: String, artifact: String },
    MissingHashInSignedMode(String),
    HashPresentButVerificationDisabled(String),
    HashMissingButVerificationEnabled(String),
    Downgrade { package: String, minimum: String },
    AboveMaxVersion { package: String, maximum: String },
    Reinstall { version: String },
    DuplicateHandlerName(String),
}

impl std::error::Error for Error {}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Archive(err) => write!(f, "archive format error: {err}"),
            Error::Parse(detail) => write!(f, "manifest parse error: {detail}"),
            Error::NoGrammarMatched => write!(f, "no registered manifest grammar could parse this package"),
            Error::ManifestTooLarge { limit, actual } => write!(f, "manifest entry is {actual} bytes, exceeding the {limit} byte limit"),
            Error::Validation(failure) => write!(f, "manifest validation failed: {failure}"),
            Error::Signature(err) => write!(f, "signature verification failed: {err}"),
            Error::MissingSignatureEntry => write!(f, "signed-image mode is enabled but the archive has no signature entry"),
            Error::HashMismatch(err) => write!(f, "{err}"),
            Error::Decrypt(err) => write!(f, "decrypt failed: {err}"),
            Error::Decompress(err) => write!(f, "decompress failed: {err}"),
            Error::Handler(name, err) => write!(f, "handler {name:?} failed: {err}"),
            Error::UnknownHandler(name) => write!(f, "no handler registered for type {name:?}"),
            Error::Bootloader(detail) => write!(f, "bootloader adapter error: {detail}"),
            Error::NoBootloaderAvailable => write!(f, "no bootloader backend reported itself available"),
            Error::Io(err) => write!(f, "I/O error: {err}"),
            Error::OpenFile(path, err) => write!(f, "failed to open {path:?}: {err}"),
            Error::Cancelled => write!(f, "update session was cancelled"),
            Error::Config(detail) => write!(f, "configuration error: {detail}"),
        }
    }
}

impl std::fmt::Display for ValidationFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationFailure::NoMatchingHardware { board, revision } => {
                write!(f, "no hardware-compatibility entry matches ({board}, {revision})")
            }
            ValidationFailure::MissingHandler(ty) => write!(f, "artifact type {ty:?} has no registered handler"),
            ValidationFailure::HandlerCapabilityMismatch { handler, artifact } => {
                write!(f, "handler {handler:?} does not accept artifact {artifact:?}'s classification")
            }
            ValidationFailure::MissingHashInSignedMode(name) => {
                write!(f, "artifact {name:?} carries data but has no sha256 in signed-image mode")
            }
            ValidationFailure::HashPresentButVerificationDisabled(name) => {
                write!(f, "artifact {name:?} declares a sha256 but hash verification is disabled")
            }
            ValidationFailure::HashMissingButVerificationEnabled(name) => {
                write!(f, "artifact {name:?} has no sha256 but hash verification is enabled")
            }
            ValidationFailure::Downgrade { package, minimum } => {
                write!(f, "package version {package} is lower than the required minimum {minimum}")
            }
            ValidationFailure::AboveMaxVersion { package, maximum } => {
                write!(f, "package version {package} exceeds the maximum allowed version {maximum}")
            }
            ValidationFailure::Reinstall { version } => {
                write!(f, "package version {version} matches the currently installed version and reinstall is disabled")
            }
            ValidationFailure::DuplicateHandlerName(name) => write!(f, "a handler named {name:?} is already registered"),
        }
    }
}

impl From<swupdate_archive::Error> for Error {
    fn from(err: swupdate_archive::Error) -> Self {
        Error::Archive(err)
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
