//! Error types for the lookup engine.

use std::path::PathBuf;

/// Everything that can go wrong between opening a data file and reading a
/// value out of a result.
///
/// The set is closed; callers can match exhaustively. No code path in this
/// crate panics to signal a failure: every fallible operation returns one
/// of these by value and leaves observable state unchanged.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("insufficient memory for {0}")]
    InsufficientMemory(&'static str),
    #[error("corrupt data: {0}")]
    CorruptData(String),
    #[error("data file version {found} is not supported (requires {major}.{minor})",
        major = ipintel_fmt::FileVersion::SUPPORTED.0,
        minor = ipintel_fmt::FileVersion::SUPPORTED.1)]
    IncorrectVersion { found: String },
    #[error("file not found: {0}")]
    FileNotFound(PathBuf),
    #[error("file busy: {0}")]
    FileBusy(PathBuf),
    #[error("file failure on {path}: {source}")]
    FileFailure {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("pointer out of bounds: offset {offset} length {length} span {span}")]
    PointerOutOfBounds {
        offset: usize,
        length: usize,
        span: usize,
    },
    #[error("null pointer: {0}")]
    NullPointer(&'static str),
    #[error("too many open files")]
    TooManyOpenFiles,
    #[error("required property {0:?} is not present in the data set")]
    RequiredPropertyNotPresent(String),
    #[error("profile at offset {0} has no values")]
    EmptyProfile(u32),
    #[error("collection failure: {0}")]
    CollectionFailure(String),
    #[error("failed to copy data file to {0}")]
    FileCopyError(PathBuf),
    #[error("file already exists: {0}")]
    FileExists(PathBuf),
    #[error("file write error on {path}: {source}")]
    FileWriteError {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("file read error: {0}")]
    FileReadError(std::io::Error),
    #[error("permission denied: {0}")]
    FilePermissionDenied(PathBuf),
    #[error("file path too long: {0} bytes")]
    FilePathTooLong(usize),
    #[error("encoding error: {0}")]
    EncodingError(String),
    #[error("invalid collection config: {0}")]
    InvalidCollectionConfig(&'static str),
    #[error("invalid config: {0}")]
    InvalidConfig(&'static str),
    #[error("insufficient handles")]
    InsufficientHandles,
    #[error("collection index {index} out of range (count {count})")]
    CollectionIndexOutOfRange { index: u32, count: u32 },
    #[error("collection offset {offset} out of range (length {length})")]
    CollectionOffsetOutOfRange { offset: u32, length: u32 },
    #[error("collection file seek failed: {0}")]
    CollectionFileSeekFail(std::io::Error),
    #[error("collection file read failed: {0}")]
    CollectionFileReadFail(std::io::Error),
    #[error("incorrect IP address format: {0:?}")]
    IncorrectIpAddressFormat(String),
    #[error("temp file error: {0}")]
    TempFileError(String),
    #[error("insufficient capacity: {needed} needed, {available} available")]
    InsufficientCapacity { needed: usize, available: usize },
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("unsupported stored value type {0}")]
    UnsupportedStoredValueType(u8),
    #[error("file too large: {0} bytes")]
    FileTooLarge(u64),
    #[error("unknown geometry type {0}")]
    UnknownGeometry(u32),
    #[error("reserved geometry type {0}")]
    ReservedGeometry(u32),
}

impl Error {
    pub(crate) fn corrupt(message: impl Into<String>) -> Error {
        Error::CorruptData(message.into())
    }

    /// Maps an open/copy-time io error onto the taxonomy, attributing it to
    /// `path`.
    pub(crate) fn from_io_for_path(err: std::io::Error, path: &std::path::Path) -> Error {
        use std::io::ErrorKind;
        match err.kind() {
            ErrorKind::NotFound => Error::FileNotFound(path.to_path_buf()),
            ErrorKind::PermissionDenied => Error::FilePermissionDenied(path.to_path_buf()),
            ErrorKind::ResourceBusy => Error::FileBusy(path.to_path_buf()),
            _ => Error::FileFailure {
                path: path.to_path_buf(),
                source: err,
            },
        }
    }
}

impl From<binrw::Error> for Error {
    fn from(err: binrw::Error) -> Error {
        match err {
            binrw::Error::Io(io) => Error::FileReadError(io),
            other => Error::CorruptData(other.to_string()),
        }
    }
}

/// Why a lookup produced no values for a property.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoValueReason {
    /// The required-property index does not name a property.
    InvalidProperty,
    /// The lookup produced no per-component results at all.
    NoResults,
    /// The relevant component resolved to no profile for this address.
    NullProfile,
    /// Values exist for the property; or the cause cannot be classified.
    Unknown,
}

impl std::fmt::Display for NoValueReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            NoValueReason::InvalidProperty => "invalid property",
            NoValueReason::NoResults => "no results",
            NoValueReason::NullProfile => "null profile",
            NoValueReason::Unknown => "unknown",
        };
        f.write_str(text)
    }
}
