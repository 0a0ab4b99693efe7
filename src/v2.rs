//! SGA version 2.0
//!
//! The original shipping format, used by Dawn of War and Impossible
//! Creatures. V2 carries no per-file metadata, packs its indices as u16,
//! and guards the archive with two salted MD5 digests: one over the whole
//! run from `header_pos`, one over the header alone.
//!
//! # Reading
//! ```rust
//! use sga::{prelude::*, v2};
//!
//! fn example() -> Option<()> {
//!     let fd = std::fs::File::open(r"path/to/W40kData.sga").ok()?;
//!     let mut archive = v2::Archive::read(&fd).ok()?;
//!     archive.metadata().header_md5().validate().ok()?;
//!     let drive = archive.drives_mut().first_mut()?;
//!     let bytes = drive.files_mut().first_mut()?.data().ok()?;
//!     let _ = bytes;
//!     Some(())
//! }
//! ```

use crate::{
    checksum::{Md5Checksum, FILE_MD5_SALT, HEADER_MD5_SALT},
    containers::Bytes,
    derive,
    format::{self, Version},
    fs,
    io::{Sink, Source},
    protocols::FixedUtf16,
    toc::{self, FileDef, IndexWidth, Pointers, TocHeader},
    Error, ReadOptions, Result, StorageType,
};
use std::io::Write;

pub const VERSION: Version = Version::V2;

pub type Archive<'bytes> = fs::Archive<'bytes, Metadata<'bytes>, ()>;
pub type Drive<'bytes> = fs::Drive<'bytes, ()>;
pub type Folder<'bytes> = fs::Folder<'bytes, ()>;
pub type File<'bytes> = fs::File<'bytes, ()>;

/// The two digests a V2 header stores. Validation is opt-in; decoding
/// never verifies them.
pub struct Metadata<'bytes> {
    file_md5: Md5Checksum<'bytes>,
    header_md5: Md5Checksum<'bytes>,
}

impl<'bytes> Metadata<'bytes> {
    /// Covers `header_pos` through the end of the archive.
    #[must_use]
    pub fn file_md5(&self) -> &Md5Checksum<'bytes> {
        &self.file_md5
    }

    /// Covers `header_pos` through `header_pos + header_size`.
    #[must_use]
    pub fn header_md5(&self) -> &Md5Checksum<'bytes> {
        &self.header_md5
    }
}

struct Header {
    name: String,
    file_md5: [u8; 16],
    header_md5: [u8; 16],
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
        // The TOC sits at header_pos, which is exactly where the header
        // parse leaves the cursor.
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
    let (header_size, data_pos): (u32, u32) = source.read()?;
    let header_pos = source.stream_position();

    Ok(Header {
        name,
        file_md5,
        header_md5,
        ptrs: Pointers {
            header_pos,
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
    })
}

fn read_file_def<'bytes, In>(source: &mut In) -> Result<FileDef<()>>
where
    In: ?Sized + Source<'bytes>,
{
    let (name_pos, storage, data_pos, length_on_disk, length_in_archive): (u32, u32, u32, u32, u32) =
        source.read()?;
    Ok(FileDef {
        name_pos,
        data_pos: data_pos.into(),
        length_on_disk,
        length_in_archive,
        storage_type: StorageType::from_legacy_value(storage)?,
        metadata: (),
    })
}

#[allow(dead_code)]
fn write_file_def<Out>(sink: &mut Sink<'_, Out>, def: &FileDef<()>) -> Result<()>
where
    Out: Write,
{
    sink.write(&(
        def.name_pos,
        def.storage_type.legacy_value(),
        u32::try_from(def.data_pos)?,
        def.length_on_disk,
        def.length_in_archive,
    ))?;
    Ok(())
}

derive::reader!(Archive);
