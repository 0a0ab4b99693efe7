#![warn(
    clippy::pedantic,
    clippy::single_char_lifetime_names,
    clippy::std_instead_of_core
)]
#![allow(clippy::enum_glob_use, clippy::missing_errors_doc)]

//! A library for reading Relic Entertainment's SGA archive container.
//!
//! An SGA archive packs a tree of drives, folders, and files, with
//! optional per-file zlib compression and salted digests over the header
//! and payload. Four on-disk variants are supported: [`v2`] (Dawn of War,
//! Impossible Creatures), [`v5`] (Dawn of War II), [`v7`] (Company of
//! Heroes 2), and [`v9`] (Age of Empires IV).
//!
//! # Reading
//! ```rust
//! use sga::{prelude::*, v2};
//!
//! fn example() -> Option<()> {
//!     let fd = std::fs::File::open(r"path/to/W40kData.sga").ok()?;
//!     let mut archive = v2::Archive::read(&fd).ok()?;
//!     for drive in archive.drives_mut() {
//!         for file in drive.files_mut() {
//!             let len = file.data().ok()?.len();
//!             println!("{}: {} bytes", file.path(), len);
//!         }
//!     }
//!     Some(())
//! }
//! ```
//!
//! When the version is not known up front, [`Archive`] sniffs the header
//! and dispatches to the matching driver, and [`guess_version`] peeks the
//! version tag alone.

mod checksum;
mod containers;
mod derive;
mod format;
pub mod fs;
mod guess;
mod io;
mod names;
mod protocols;
mod toc;
pub mod v2;
pub mod v5;
pub mod v7;
pub mod v9;

use core::num::TryFromIntError;
use std::io as std_io;

pub use bstr::{BStr, BString};

pub use crate::{
    checksum::{Md5Checksum, Sha256Checksum, FILE_MD5_SALT, HEADER_MD5_SALT},
    format::{StorageType, VerificationType, Version},
    guess::{guess_version, Archive},
};

/// Decode an archive that borrows the given byte slice wherever possible.
pub struct Borrowed<'borrow>(pub &'borrow [u8]);

/// Decode an archive by copying out of the given byte slice, yielding a
/// tree free of the slice's lifetime.
pub struct Copied<'copy>(pub &'copy [u8]);

mod private {
    pub trait Sealed {}
}

use private::Sealed;

#[non_exhaustive]
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("can not compress the given file because it is already compressed")]
    AlreadyCompressed,

    #[error("can not decompress the given file because it is already decompressed")]
    AlreadyDecompressed,

    #[error("checksum mismatch... expected {expected}, but got {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    #[error("buffer failed to decompress to the expected size... expected {expected} bytes, but got {actual} bytes")]
    DecompressionSizeMismatch { expected: usize, actual: usize },

    #[error("{kind} index is out of range: {value}")]
    IndexOutOfRange { kind: &'static str, value: usize },

    #[error(transparent)]
    IntegralTruncation(#[from] TryFromIntError),

    #[error("invalid magic read from archive header: {0:?}")]
    InvalidMagic([u8; 8]),

    #[error("invalid storage type read from file entry: {0}")]
    InvalidStorageType(u32),

    #[error("invalid verification type read from file entry: {0}")]
    InvalidVerificationType(u8),

    #[error("unsupported archive version: {0}")]
    InvalidVersion(Version),

    #[error(transparent)]
    Io(#[from] std_io::Error),

    #[error("name table ended after {read} of {expected} names")]
    NameTableTruncated { expected: usize, read: usize },

    #[error("reserved header field holds an unexpected value: {0}")]
    ReservedFieldMismatch(u32),

    #[error("archive version {actual} does not match the reader's version {expected}")]
    VersionMismatch { expected: Version, actual: Version },
}

pub type Result<T> = core::result::Result<T, Error>;

/// Common read interface over the supported source types, using the
/// default [`ReadOptions`].
pub trait Reader<T>: Sealed {
    type Error;
    type Item;

    fn read(source: T) -> core::result::Result<Self::Item, Self::Error>;
}

/// Common read interface over the supported source types.
pub trait ReaderWithOptions<T>: Sealed {
    type Error;
    type Item;
    type Options;

    fn read_with_options(
        source: T,
        options: &Self::Options,
    ) -> core::result::Result<Self::Item, Self::Error>;
}

#[derive(Clone, Copy, Debug, Default)]
#[repr(transparent)]
pub struct ReadOptionsBuilder(ReadOptions);

impl ReadOptionsBuilder {
    #[must_use]
    pub fn build(self) -> ReadOptions {
        self.0
    }

    /// Resolve file payloads to bytes on first access instead of at
    /// decode time.
    #[must_use]
    pub fn lazy(mut self, lazy: bool) -> Self {
        self.0.lazy = lazy;
        self
    }

    /// Inflate compressed payloads when they are resolved.
    #[must_use]
    pub fn decompress(mut self, decompress: bool) -> Self {
        self.0.decompress = decompress;
        self
    }

    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[derive(Clone, Copy, Debug)]
pub struct ReadOptions {
    lazy: bool,
    decompress: bool,
}

impl ReadOptions {
    #[must_use]
    pub fn builder() -> ReadOptionsBuilder {
        ReadOptionsBuilder::new()
    }

    #[must_use]
    pub fn lazy(&self) -> bool {
        self.lazy
    }

    #[must_use]
    pub fn decompress(&self) -> bool {
        self.decompress
    }
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self {
            lazy: false,
            decompress: true,
        }
    }
}

pub mod prelude {
    pub use crate::{Reader as _, ReaderWithOptions as _};
}
