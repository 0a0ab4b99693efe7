//! SGA version 9.0
//!
//! Used by Age of Empires IV. Header offsets grow to 64 bits, the
//! archive carries a SHA-256 over its header window instead of the old
//! MD5 pair, and the post-TOC footer gains a second undocumented scalar.
//! File records match V7's shape with a 64-bit data position.

use crate::{
    checksum::Sha256Checksum,
    containers::Bytes,
    derive,
    format::{self, timestamp, Version},
    fs,
    io::{Sink, Source},
    protocols::FixedUtf16,
    toc::{self, FileDef, IndexWidth, Pointers, TocHeader},
    Error, ReadOptions, Result, StorageType, VerificationType,
};
use std::io::Write;

pub const VERSION: Version = Version::V9;

pub use crate::v7::FileMetadata;

pub type Archive<'bytes> = fs::Archive<'bytes, Metadata<'bytes>, FileMetadata>;
pub type Drive<'bytes> = fs::Drive<'bytes, FileMetadata>;
pub type Folder<'bytes> = fs::Folder<'bytes, FileMetadata>;
pub type File<'bytes> = fs::File<'bytes, FileMetadata>;

pub struct Metadata<'bytes> {
    header_sha256: Sha256Checksum<'bytes>,
    unk_a: u32,
    unk_b: u32,
    block_size: u32,
}

impl<'bytes> Metadata<'bytes> {
    /// Covers `header_pos` through `header_pos + header_size`.
    #[must_use]
    pub fn header_sha256(&self) -> &Sha256Checksum<'bytes> {
        &self.header_sha256
    }

    #[must_use]
    pub fn unk_a(&self) -> u32 {
        self.unk_a
    }

    #[must_use]
    pub fn unk_b(&self) -> u32 {
        self.unk_b
    }

    #[must_use]
    pub fn block_size(&self) -> u32 {
        self.block_size
    }
}

struct Header {
    name: String,
    sha256: [u8; 32],
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
        let toc = TocHeader::read(source, IndexWidth::Full)?;
        let (unk_a, unk_b, block_size): (u32, u32, u32) = source.read()?;
        let drives = toc::read_contents(
            source,
            &toc,
            &header.ptrs,
            IndexWidth::Full,
            read_file_def,
            options.decompress(),
        )?;

        let header_window = source.save_restore_position(|source| -> Result<Bytes<'bytes>> {
            source.seek_absolute(header.ptrs.header_pos)?;
            Ok(source.read_bytes(header.ptrs.header_size)?)
        })??;
        let metadata = Metadata {
            header_sha256: Sha256Checksum::new(header.sha256, header_window),
            unk_a,
            unk_b,
            block_size,
        };

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
    let (header_pos, header_size, data_pos, data_size, rsv_1): (u64, u32, u64, u64, u32) =
        source.read()?;
    if rsv_1 != 1 {
        return Err(Error::ReservedFieldMismatch(rsv_1));
    }

    // 256 bytes on disk; the digest occupies the leading 32
    let stored: [u8; 256] = source.read()?;
    let mut sha256 = [0u8; 32];
    sha256.copy_from_slice(&stored[..32]);

    Ok(Header {
        name,
        sha256,
        ptrs: Pointers {
            header_pos: header_pos.try_into()?,
            header_size: header_size as usize,
            data_pos: data_pos.try_into()?,
            data_size: Some(data_size.try_into()?),
        },
    })
}

fn read_file_def<'bytes, In>(source: &mut In) -> Result<FileDef<FileMetadata>>
where
    In: ?Sized + Source<'bytes>,
{
    let (name_pos, hash_pos, data_pos): (u32, u32, u64) = source.read()?;
    let (length_on_disk, length_in_archive, modified): (u32, u32, u32) = source.read()?;
    let (verification, storage): (u8, u8) = source.read()?;
    let crc: u32 = source.read()?;

    Ok(FileDef {
        name_pos,
        data_pos,
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
    sink.write(&(def.name_pos, def.metadata.hash_pos, def.data_pos))?;
    sink.write(&(def.length_on_disk, def.length_in_archive, modified))?;
    sink.write(&(def.metadata.verification.value(), def.storage_type.value()))?;
    sink.write(&def.metadata.crc)?;
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
        Borrowed, Error, Reader as _, StorageType, VerificationType,
    };
    use bstr::BString;
    use sha2::{Digest as _, Sha256};

    const HEADER_POS: usize = 428;
    const SHA_AT: usize = 172;
    const TOC_LEN: u32 = 32;
    const FOOTER_LEN: u32 = 12;
    const DRIVE_LEN: u32 = 148;
    const FOLDER_LEN: u32 = 20;
    const FILE_LEN: u32 = 34;

    fn build_archive(payload: &[u8]) -> Vec<u8> {
        let names = b"root\0data.bin\0".to_vec();
        let file_def = FileDef {
            name_pos: 5,
            data_pos: 0,
            length_on_disk: payload.len() as u32,
            length_in_archive: payload.len() as u32,
            storage_type: StorageType::Store,
            metadata: FileMetadata {
                modified: timestamp(1_650_000_000),
                verification: VerificationType::CrcBlocks,
                crc: 0xABCD,
                hash_pos: 96,
            },
        };

        let drives_at = TOC_LEN + FOOTER_LEN;
        let folders_at = drives_at + DRIVE_LEN;
        let files_at = folders_at + FOLDER_LEN;
        let names_at = files_at + FILE_LEN;
        let header_size = names_at as usize + names.len();
        let data_pos = HEADER_POS + header_size;

        let mut blob = Vec::new();
        let mut sink = Sink::new(&mut blob);
        TocHeader {
            drives: TocSection {
                offset: drives_at,
                count: 1,
            },
            folders: TocSection {
                offset: folders_at,
                count: 1,
            },
            files: TocSection {
                offset: files_at,
                count: 1,
            },
            names: TocSection {
                offset: names_at,
                count: 2,
            },
        }
        .write(&mut sink, IndexWidth::Full)
        .unwrap();
        sink.write(&(5u32, 6u32, 0x10000u32)).unwrap();
        DriveDef {
            alias: BString::from("data"),
            name: BString::from("drive"),
            folder_range: 0..1,
            file_range: 0..1,
            root_folder: 0,
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
        write_file_def(&mut sink, &file_def).unwrap();
        blob.extend_from_slice(&names);

        let mut out = Vec::new();
        let mut sink = Sink::new(&mut out);
        sink.write_bytes(&format::MAGIC).unwrap();
        VERSION.write(&mut sink).unwrap();
        sink.write_protocol::<FixedUtf16<128>>("wide").unwrap();
        sink.write(&(
            HEADER_POS as u64,
            header_size as u32,
            data_pos as u64,
            payload.len() as u64,
            1u32,
        ))
        .unwrap();
        sink.write(&[0u8; 256]).unwrap();
        assert_eq!(out.len(), HEADER_POS);
        out.extend_from_slice(&blob);
        out.extend_from_slice(payload);

        let digest: [u8; 32] = {
            let mut hasher = Sha256::new();
            hasher.update(&out[HEADER_POS..HEADER_POS + header_size]);
            hasher.finalize().into()
        };
        out[SHA_AT..SHA_AT + 32].copy_from_slice(&digest);

        out
    }

    #[test]
    fn wide_offsets_decode() -> anyhow::Result<()> {
        let stream = build_archive(b"payload");
        let mut archive = Archive::read(Borrowed(&stream))?;

        assert_eq!(archive.name(), "wide");
        assert_eq!(archive.metadata().unk_a(), 5);
        assert_eq!(archive.metadata().unk_b(), 6);
        assert_eq!(archive.metadata().block_size(), 0x10000);

        let file = &mut archive.drives_mut()[0].files_mut()[0];
        assert_eq!(file.path(), "data:/data.bin");
        assert_eq!(file.data()?, b"payload");

        let metadata = file.metadata();
        assert_eq!(metadata.verification, VerificationType::CrcBlocks);
        assert_eq!(metadata.crc, 0xABCD);
        assert_eq!(metadata.hash_pos, 96);
        Ok(())
    }

    #[test]
    fn the_header_digest_validates() -> anyhow::Result<()> {
        let stream = build_archive(b"payload");
        let archive = Archive::read(Borrowed(&stream))?;
        archive.metadata().header_sha256().validate()?;
        Ok(())
    }

    #[test]
    fn corrupting_the_header_window_fails_validation_but_not_decoding() -> anyhow::Result<()> {
        let mut stream = build_archive(b"payload");
        // flip a padding byte of the drive alias, inside the header window
        stream[HEADER_POS + (TOC_LEN + FOOTER_LEN) as usize + 63] ^= 1;

        let archive = Archive::read(Borrowed(&stream))?;
        assert!(matches!(
            archive.metadata().header_sha256().validate(),
            Err(Error::ChecksumMismatch { .. })
        ));
        Ok(())
    }

    #[test]
    fn reserved_fields_must_hold_their_constants() {
        let mut stream = build_archive(b"payload");
        stream[168..172].copy_from_slice(&0u32.to_le_bytes());
        let result = Archive::read(Borrowed(&stream));
        assert!(matches!(result, Err(Error::ReservedFieldMismatch(0))));
    }
}
