//! Storage layer for atomic file operations.

mod atomic_file;

pub use atomic_file::{
    AtomicFile, AtomicFileError, FileFormat, remove_if_exists, with_lock, write_atomic,
};
