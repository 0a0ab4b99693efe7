//! SGA version 5.0
//!
//! Used by Dawn of War II. The header gains an explicit `header_pos`, a
//! reserved `(1, 0)` pair, and one undocumented scalar; file records gain
//! a modification timestamp and a verification mode. Indices are still
//! u16, and the same two salted MD5 digests guard the archive.

use crate::{
    checksum::{Md5Checksum, FILE_MD5_SALT, HEADER_MD5_SALT},
    containers::Bytes,
    derive,
    format::{self, timestamp, Version},
    fs,
    io::{Sink, Source},
    protocols::FixedUtf16,
    toc::{self, FileDef, IndexWidth, Pointers, TocHeader},
    Error, ReadOptions, Result, StorageType, VerificationType,
};
use chrono::{DateTime, Utc};
use std::io::Write;

pub const VERSION: Version = Version::V5;

pub type Archive<'bytes> = fs::Archive<'bytes, Metadata<'bytes>, FileMetadata>;
pub type Drive<'bytes> = fs::Drive<'bytes, FileMetadata>;
pub type Folder<'bytes> = fs::Folder<'bytes, FileMetadata>;
pub type File<'bytes> = fs::File<'bytes, FileMetadata>;

/// Per-file metadata exposed by V5 archives.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct FileMetadata {
    pub modified: DateTime<Utc>,
    pub verification: VerificationType,
}

pub struct Metadata<'bytes> {
    file_md5: Md5Checksum<'bytes>,
    header_md5: Md5Checksum<'bytes>,
    unk_a: u32,
}

impl<'bytes> Metadata<'bytes> {
    /// Covers `header_pos` through the end of the archive.
    #[must_use]
    pub fn file_md5(&self) -> &Md5Checksum<'bytes> {
        &self.file_md5
    }

    /// Covers `header_pos` through `header_pos + header_size`. Bound to
    /// the header salt; historical writers disagree on which salt was
    /// meant, so [`Md5Checksum::validate_with_salt`] accepts another.
    #[must_use]
    pub fn header_md5(&self) -> &Md5Checksum<'bytes> {
        &self.header_md5
    }

    #[must_use]
    pub fn unk_a(&self) -> u32 {
        self.unk_a
    }
}

struct Header {
    name: String,
    file_md5: [u8; 16],
    header_md5: [u8; 16],
    unk_a: u32,
    ptrs: Pointers,
}

impl<'bytes> Archive<'bytes> {
    pub(crate) fn do_read<In>(source: &mut In, options: &ReadOptions) -> Result<Self>
    where
        In: ?Sized + Source<'bytes>,
    {
        format::read_magic(source)?;
        let version = Version::read(source)?;
        if version != VERSION {
            return Err(Error::VersionMismatch {
                expected: VERSION,
                actual: version,
            });
        }

        let header = read_header(source)?;
        source.seek_absolute(header.ptrs.header_pos)?;
        let toc = TocHeader::read(source, IndexWidth::Half)?;
        let drives = toc::read_contents(
            source,
            &toc,
            &header.ptrs,
            IndexWidth::Half,
            read_file_def,
            options.decompress(),
        )?;

        let metadata = read_metadata(source, &header)?;
        let mut archive = fs::Archive::new(header.name, metadata, drives);
        if !options.lazy() {
            archive.load_data()?;
        }
        Ok(archive)
    }
}

fn read_header<'bytes, In>(source: &mut In) -> Result<Header>
where
    In: ?Sized + Source<'bytes>,
{
    let file_md5: [u8; 16] = source.read()?;
    let name = source.read_protocol::<FixedUtf16<128>>()?;
    let header_md5: [u8; 16] = source.read()?;
    let (header_size, data_pos, header_pos, rsv_1, rsv_0, unk_a): (u32, u32, u32, u32, u32, u32) =
        source.read()?;
    if rsv_1 != 1 {
        return Err(Error::ReservedFieldMismatch(rsv_1));
    }
    if rsv_0 != 0 {
        return Err(Error::ReservedFieldMismatch(rsv_0));
    }

    Ok(Header {
        name,
        file_md5,
        header_md5,
        unk_a,
        ptrs: Pointers {
            header_pos: header_pos as usize,
            header_size: header_size as usize,
            data_pos: data_pos as usize,
            data_size: None,
        },
    })
}

fn read_metadata<'bytes, In>(source: &mut In, header: &Header) -> Result<Metadata<'bytes>>
where
    In: ?Sized + Source<'bytes>,
{
    let file_window = source.save_restore_position(|source| -> Result<Bytes<'bytes>> {
        source.seek_absolute(header.ptrs.header_pos)?;
        Ok(source.read_bytes_to_end())
    })??;
    let header_window = source.save_restore_position(|source| -> Result<Bytes<'bytes>> {
        source.seek_absolute(header.ptrs.header_pos)?;
        Ok(source.read_bytes(header.ptrs.header_size)?)
    })??;

    Ok(Metadata {
        file_md5: Md5Checksum::new(header.file_md5, file_window, Some(FILE_MD5_SALT)),
        header_md5: Md5Checksum::new(header.header_md5, header_window, Some(HEADER_MD5_SALT)),
        unk_a: header.unk_a,
    })
}

fn read_file_def<'bytes, In>(source: &mut In) -> Result<FileDef<FileMetadata>>
where
    In: ?Sized + Source<'bytes>,
{
    let (name_pos, data_pos, length_on_disk, length_in_archive, modified): (u32, u32, u32, u32, u32) =
        source.read()?;
    let (verification, storage): (u8, u8) = source.read()?;

    Ok(FileDef {
        name_pos,
        data_pos: data_pos.into(),
        length_on_disk,
        length_in_archive,
        storage_type: StorageType::from_value(storage)?,
        metadata: FileMetadata {
            modified: timestamp(modified),
            verification: VerificationType::from_value(verification)?,
        },
    })
}

#[allow(dead_code)]
fn write_file_def<Out>(sink: &mut Sink<'_, Out>, def: &FileDef<FileMetadata>) -> Result<()>
where
    Out: Write,
{
    let modified = u32::try_from(def.metadata.modified.timestamp())?;
    sink.write(&(
        def.name_pos,
        u32::try_from(def.data_pos)?,
        def.length_on_disk,
        def.length_in_archive,
        modified,
    ))?;
    sink.write(&(def.metadata.verification.value(), def.storage_type.value()))?;
    Ok(())
}

derive::reader!(Archive);
