use crate::{
    derive,
    format::{self, Version},
    io::Source,
    v2, v5, v7, v9, Error, ReadOptions, Result,
};
use core::mem;
use std::io::Read;

/// Peek the magic word and version tag from the head of a stream.
/// Returns `None` when the stream does not open with `_ARCHIVE`.
pub fn guess_version<In>(source: &mut In) -> Option<Version>
where
    In: ?Sized + Read,
{
    let mut buf = [0u8; format::MAGIC.len() + 2 * mem::size_of::<u16>()];
    source.read_exact(&mut buf).ok()?;
    if buf[..8] != format::MAGIC {
        return None;
    }

    let major = u16::from_le_bytes([buf[8], buf[9]]);
    let minor = u16::from_le_bytes([buf[10], buf[11]]);
    Some(Version::new(major, minor))
}

/// An archive of any supported version, decoded by sniffing the version
/// tag and dispatching to the matching driver.
pub enum Archive<'bytes> {
    V2(v2::Archive<'bytes>),
    V5(v5::Archive<'bytes>),
    V7(v7::Archive<'bytes>),
    V9(v9::Archive<'bytes>),
}

impl<'bytes> Archive<'bytes> {
    #[must_use]
    pub fn version(&self) -> Version {
        match self {
            Self::V2(_) => Version::V2,
            Self::V5(_) => Version::V5,
            Self::V7(_) => Version::V7,
            Self::V9(_) => Version::V9,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::V2(archive) => archive.name(),
            Self::V5(archive) => archive.name(),
            Self::V7(archive) => archive.name(),
            Self::V9(archive) => archive.name(),
        }
    }

    pub fn load_data(&mut self) -> Result<()> {
        match self {
            Self::V2(archive) => archive.load_data(),
            Self::V5(archive) => archive.load_data(),
            Self::V7(archive) => archive.load_data(),
            Self::V9(archive) => archive.load_data(),
        }
    }

    fn do_read<In>(source: &mut In, options: &ReadOptions) -> Result<Self>
    where
        In: ?Sized + Source<'bytes>,
    {
        let version = source.save_restore_position(|source| -> Result<Version> {
            format::read_magic(source)?;
            Ok(Version::read(source)?)
        })??;

        match version {
            Version::V2 => Ok(Self::V2(v2::Archive::do_read(source, options)?)),
            Version::V5 => Ok(Self::V5(v5::Archive::do_read(source, options)?)),
            Version::V7 => Ok(Self::V7(v7::Archive::do_read(source, options)?)),
            Version::V9 => Ok(Self::V9(v9::Archive::do_read(source, options)?)),
            _ => Err(Error::InvalidVersion(version)),
        }
    }
}

derive::reader!(Archive);
