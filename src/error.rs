use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Common errors that can be used throughout the crate.
#[derive(Debug, Error)]
pub enum SfsError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("disk is full")]
    OutOfSpace,

    #[error("repeated file/directory named '{0}'")]
    DuplicateName(String),

    #[error("can't add file/directory named '{0}'")]
    InvalidName(String),

    #[error("file size too big '{path}' ({size} bytes)")]
    FileTooLarge { path: PathBuf, size: u64 },

    #[error("invalid SpartaDOS file system: {0}")]
    BadSuperblock(String),

    #[error("can't create an image big enough")]
    GeometryExhausted,

    #[error("'{0}' already exists")]
    AlreadyExists(PathBuf),

    #[error("not a SpartaDOS file system image")]
    NotSparta,

    #[error("not a HOWFEN DOS menu disk")]
    NotHowfen,

    #[error("invalid file type '{0}'")]
    InvalidFileType(PathBuf),

    #[error("extracting from HOWFEN DOS not supported")]
    ExtractionUnsupported,
}

pub type Result<T> = std::result::Result<T, SfsError>;
