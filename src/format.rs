use crate::{
    io::{Sink, Source},
    Error, Result,
};
use chrono::{DateTime, Utc};
use core::fmt::{self, Display, Formatter};
use std::io::{self, Write};

/// Every archive opens with this eight-byte word.
pub(crate) const MAGIC: [u8; 8] = *b"_ARCHIVE";

pub(crate) fn read_magic<'bytes, In>(source: &mut In) -> Result<()>
where
    In: ?Sized + Source<'bytes>,
{
    let magic: [u8; 8] = source.read()?;
    if magic == MAGIC {
        Ok(())
    } else {
        Err(Error::InvalidMagic(magic))
    }
}

/// The two-field version tag following the magic word.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Version {
    pub major: u16,
    pub minor: u16,
}

impl Version {
    pub const V2: Version = Version::new(2, 0);
    pub const V5: Version = Version::new(5, 0);
    pub const V7: Version = Version::new(7, 0);
    pub const V9: Version = Version::new(9, 0);

    #[must_use]
    pub const fn new(major: u16, minor: u16) -> Self {
        Self { major, minor }
    }

    pub(crate) fn read<'bytes, In>(source: &mut In) -> io::Result<Self>
    where
        In: ?Sized + Source<'bytes>,
    {
        let (major, minor) = source.read()?;
        Ok(Self { major, minor })
    }

    #[allow(dead_code)]
    pub(crate) fn write<Out>(&self, sink: &mut Sink<Out>) -> io::Result<()>
    where
        Out: Write,
    {
        sink.write(&(self.major, self.minor))
    }
}

impl Display for Version {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// How a file's payload is laid down in the data section.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum StorageType {
    /// Uncompressed.
    #[default]
    Store,

    /// zlib-compressed as a single buffer.
    BufferCompress,

    /// zlib-compressed as a stream of blocks.
    StreamCompress,
}

impl StorageType {
    /// V2 encodes storage as 0/16/32.
    pub(crate) fn from_legacy_value(value: u32) -> Result<Self> {
        match value {
            0 => Ok(Self::Store),
            16 => Ok(Self::BufferCompress),
            32 => Ok(Self::StreamCompress),
            _ => Err(Error::InvalidStorageType(value)),
        }
    }

    #[allow(dead_code)]
    pub(crate) fn legacy_value(self) -> u32 {
        match self {
            Self::Store => 0,
            Self::BufferCompress => 16,
            Self::StreamCompress => 32,
        }
    }

    /// V5 and later carry the enum value directly.
    pub(crate) fn from_value(value: u8) -> Result<Self> {
        match value {
            0 => Ok(Self::Store),
            1 => Ok(Self::BufferCompress),
            2 => Ok(Self::StreamCompress),
            _ => Err(Error::InvalidStorageType(value.into())),
        }
    }

    #[allow(dead_code)]
    pub(crate) fn value(self) -> u8 {
        match self {
            Self::Store => 0,
            Self::BufferCompress => 1,
            Self::StreamCompress => 2,
        }
    }
}

/// Seconds-since-epoch as stored in V5+ file records. Every u32 lands
/// inside chrono's representable range.
pub(crate) fn timestamp(seconds: u32) -> DateTime<Utc> {
    DateTime::from_timestamp(i64::from(seconds), 0).unwrap_or_default()
}

/// The per-file integrity mode carried by V5 and later.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum VerificationType {
    #[default]
    None,
    Crc,
    CrcBlocks,
    Md5Blocks,
    Sha1Blocks,
}

impl VerificationType {
    pub(crate) fn from_value(value: u8) -> Result<Self> {
        match value {
            0 => Ok(Self::None),
            1 => Ok(Self::Crc),
            2 => Ok(Self::CrcBlocks),
            3 => Ok(Self::Md5Blocks),
            4 => Ok(Self::Sha1Blocks),
            _ => Err(Error::InvalidVerificationType(value)),
        }
    }

    #[allow(dead_code)]
    pub(crate) fn value(self) -> u8 {
        match self {
            Self::None => 0,
            Self::Crc => 1,
            Self::CrcBlocks => 2,
            Self::Md5Blocks => 3,
            Self::Sha1Blocks => 4,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{StorageType, VerificationType, Version};

    #[test]
    fn version_ordering_and_display() {
        assert!(Version::V2 < Version::V5);
        assert!(Version::new(5, 1) > Version::V5);
        assert_eq!(Version::V7.to_string(), "7.0");
    }

    #[test]
    fn storage_wire_values() {
        assert_eq!(
            StorageType::from_legacy_value(16).unwrap(),
            StorageType::BufferCompress
        );
        assert_eq!(
            StorageType::from_value(2).unwrap(),
            StorageType::StreamCompress
        );
        assert!(StorageType::from_legacy_value(1).is_err());
        assert!(StorageType::from_value(3).is_err());

        for storage in [
            StorageType::Store,
            StorageType::BufferCompress,
            StorageType::StreamCompress,
        ] {
            assert_eq!(
                StorageType::from_legacy_value(storage.legacy_value()).unwrap(),
                storage
            );
            assert_eq!(StorageType::from_value(storage.value()).unwrap(), storage);
        }
    }

    #[test]
    fn verification_wire_values() {
        assert_eq!(
            VerificationType::from_value(3).unwrap(),
            VerificationType::Md5Blocks
        );
        assert!(VerificationType::from_value(5).is_err());
    }
}
