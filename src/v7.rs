//! SGA version 7.0
//!
//! Used by Company of Heroes 2. Indices widen to u32, the archive-wide
//! MD5 digests are gone, and a small footer after the TOC header carries
//! the block size used by block-compressed payloads. File records add a
//! CRC-32 and a hash position on top of the V5 metadata.

use crate::{
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

pub const VERSION: Version = Version::V7;

pub type Archive<'bytes> = fs::Archive<'bytes, Metadata, FileMetadata>;
pub type Drive<'bytes> = fs::Drive<'bytes, FileMetadata>;
pub type Folder<'bytes> = fs::Folder<'bytes, FileMetadata>;
pub type File<'bytes> = fs::File<'bytes, FileMetadata>;

/// Per-file metadata exposed by V7 archives.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct FileMetadata {
    pub modified: DateTime<Utc>,
    pub verification: VerificationType,
    pub crc: u32,
    pub hash_pos: u32,
}

#[derive(Clone, Copy, Debug)]
pub struct Metadata {
    unk_a: u32,
    block_size: u32,
}

impl Metadata {
    #[must_use]
    pub fn unk_a(&self) -> u32 {
        self.unk_a
    }

    #[must_use]
    pub fn block_size(&self) -> u32 {
        self.block_size
    }
}

struct Header {
    name: String,
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
        // header_pos is implicit and the cursor already sits there
        let toc = TocHeader::read(source, IndexWidth::Full)?;
        let (unk_a, block_size): (u32, u32) = source.read()?;
        let drives = toc::read_contents(
            source,
            &toc,
            &header.ptrs,
            IndexWidth::Full,
            read_file_def,
            options.decompress(),
        )?;

        let metadata = Metadata { unk_a, block_size };
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
    let name = source.read_protocol::<FixedUtf16<128>>()?;
    let (header_size, data_pos, rsv_1): (u32, u32, u32) = source.read()?;
    if rsv_1 != 1 {
        return Err(Error::ReservedFieldMismatch(rsv_1));
    }
    let header_pos = source.stream_position();

    Ok(Header {
        name,
        ptrs: Pointers {
            header_pos,
            header_size: header_size as usize,
            data_pos: data_pos as usize,
            data_size: None,
        },
    })
}

fn read_file_def<'bytes, In>(source: &mut In) -> Result<FileDef<FileMetadata>>
where
    In: ?Sized + Source<'bytes>,
{
    let (name_pos, data_pos, length_on_disk, length_in_archive, modified): (u32, u32, u32, u32, u32) =
        source.read()?;
    let (verification, storage): (u8, u8) = source.read()?;
    let (crc, hash_pos): (u32, u32) = source.read()?;

    Ok(FileDef {
        name_pos,
        data_pos: data_pos.into(),
        length_on_disk,
        length_in_archive,
        storage_type: StorageType::from_value(storage)?,
        metadata: FileMetadata {
            modified: timestamp(modified),
            verification: VerificationType::from_value(verification)?,
            crc,
            hash_pos,
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
    sink.write(&(def.metadata.crc, def.metadata.hash_pos))?;
    Ok(())
}

derive::reader!(Archive);

#[cfg(test)]
mod tests {
    use super::{write_file_def, Archive, FileMetadata, VERSION};
    use crate::{
        format::{self, timestamp},
        io::Sink,
        protocols::FixedUtf16,
        toc::{DriveDef, FileDef, FolderDef, IndexWidth, TocHeader, TocSection},
        Borrowed, Reader as _, StorageType, VerificationType,
    };
    use bstr::BString;

    const HEADER_POS: usize = 152;
    const TOC_LEN: u32 = 32;
    const FOOTER_LEN: u32 = 8;
    const DRIVE_LEN: u32 = 148;
    const FOLDER_LEN: u32 = 20;
    const FILE_LEN: u32 = 30;

    /// Two drives with disjoint folder and file ranges.
    fn two_drive_archive() -> Vec<u8> {
        let names = b"root\0a.txt\0b.txt\0".to_vec();
        let payload_a = b"AAAA";
        let payload_b = b"BBBBBB";

        let file_defs = [
            FileDef {
                name_pos: 5,
                data_pos: 0,
                length_on_disk: payload_a.len() as u32,
                length_in_archive: payload_a.len() as u32,
                storage_type: StorageType::Store,
                metadata: FileMetadata {
                    modified: timestamp(1_600_000_000),
                    verification: VerificationType::None,
                    crc: 0xCAFE,
                    hash_pos: 12,
                },
            },
            FileDef {
                name_pos: 11,
                data_pos: payload_a.len() as u64,
                length_on_disk: payload_b.len() as u32,
                length_in_archive: payload_b.len() as u32,
                storage_type: StorageType::Store,
                metadata: FileMetadata {
                    modified: timestamp(1_700_000_000),
                    verification: VerificationType::None,
                    crc: 0xF00D,
                    hash_pos: 34,
                },
            },
        ];

        let drives_at = TOC_LEN + FOOTER_LEN;
        let folders_at = drives_at + 2 * DRIVE_LEN;
        let files_at = folders_at + 2 * FOLDER_LEN;
        let names_at = files_at + 2 * FILE_LEN;
        let header_size = names_at as usize + names.len();
        let data_pos = HEADER_POS + header_size;

        let mut blob = Vec::new();
        let mut sink = Sink::new(&mut blob);
        TocHeader {
            drives: TocSection {
                offset: drives_at,
                count: 2,
            },
            folders: TocSection {
                offset: folders_at,
                count: 2,
            },
            files: TocSection {
                offset: files_at,
                count: 2,
            },
            names: TocSection {
                offset: names_at,
                count: 3,
            },
        }
        .write(&mut sink, IndexWidth::Full)
        .unwrap();
        sink.write(&(77u32, 0x8000u32)).unwrap();
        DriveDef {
            alias: BString::from("a"),
            name: BString::from("first"),
            folder_range: 0..1,
            file_range: 0..1,
            root_folder: 0,
        }
        .write(&mut sink, IndexWidth::Full)
        .unwrap();
        DriveDef {
            alias: BString::from("b"),
            name: BString::from("second"),
            folder_range: 1..2,
            file_range: 1..2,
            root_folder: 1,
        }
        .write(&mut sink, IndexWidth::Full)
        .unwrap();
        FolderDef {
            name_pos: 0,
            folder_range: 1..1,
            file_range: 0..1,
        }
        .write(&mut sink, IndexWidth::Full)
        .unwrap();
        FolderDef {
            name_pos: 0,
            folder_range: 2..2,
            file_range: 1..2,
        }
        .write(&mut sink, IndexWidth::Full)
        .unwrap();
        for def in &file_defs {
            write_file_def(&mut sink, def).unwrap();
        }
        blob.extend_from_slice(&names);

        let mut out = Vec::new();
        let mut sink = Sink::new(&mut out);
        sink.write_bytes(&format::MAGIC).unwrap();
        VERSION.write(&mut sink).unwrap();
        sink.write_protocol::<FixedUtf16<128>>("pair").unwrap();
        sink.write(&(header_size as u32, data_pos as u32, 1u32))
            .unwrap();
        assert_eq!(out.len(), HEADER_POS);
        out.extend_from_slice(&blob);
        out.extend_from_slice(payload_a);
        out.extend_from_slice(payload_b);
        out
    }

    #[test]
    fn drives_keep_their_own_files() -> anyhow::Result<()> {
        let stream = two_drive_archive();
        let mut archive = Archive::read(Borrowed(&stream))?;

        assert_eq!(archive.name(), "pair");
        assert_eq!(archive.drives().len(), 2);
        assert_eq!(archive.metadata().unk_a(), 77);
        assert_eq!(archive.metadata().block_size(), 0x8000);

        {
            let first = &mut archive.drives_mut()[0];
            assert_eq!(first.files().len(), 1);
            assert_eq!(first.files()[0].path(), "a:/a.txt");
            assert_eq!(first.files_mut()[0].data()?, b"AAAA");
        }
        {
            let second = &mut archive.drives_mut()[1];
            assert_eq!(second.files().len(), 1);
            assert_eq!(second.files()[0].path(), "b:/b.txt");
            assert_eq!(second.files_mut()[0].data()?, b"BBBBBB");
        }

        let metadata = archive.drives()[1].files()[0].metadata();
        assert_eq!(metadata.crc, 0xF00D);
        assert_eq!(metadata.hash_pos, 34);
        Ok(())
    }

    #[test]
    fn walks_visit_each_drive_in_isolation() -> anyhow::Result<()> {
        let stream = two_drive_archive();
        let archive = Archive::read(Borrowed(&stream))?;

        let mut seen = Vec::new();
        for visit in archive.walk() {
            for file in visit.files() {
                // the parent chain is recoverable from the visit
                let mut expected = visit.parent().path().to_owned();
                expected.push(b'/');
                expected.extend_from_slice(file.name().as_ref());
                assert_eq!(file.path(), &expected);
                seen.push(file.path().to_owned());
            }
        }

        assert_eq!(seen, [BString::from("a:/a.txt"), BString::from("b:/b.txt")]);
        Ok(())
    }
}
