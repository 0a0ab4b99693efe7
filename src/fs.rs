//! The decoded archive tree.
//!
//! Ownership runs strictly top-down: an [`Archive`] owns its drives, a
//! [`Drive`] owns its folders and files, a [`Folder`] owns its children.
//! Every node materializes its full path at decode time, and [`Walk`]
//! visits hand back the containing node, so parent chains can be
//! reconstructed without back-pointers.

use crate::{
    containers::{Bytes, CompressableBytes},
    Error, Result, StorageType,
};
use bstr::{BStr, BString};
use core::mem;
use flate2::{
    write::{ZlibDecoder, ZlibEncoder},
    Compression,
};
use std::io::Write;

/// A deferred reference to a file's packed byte window. Consumed by the
/// first read of the file's data.
pub(crate) struct DataHandle<'bytes> {
    packed: Bytes<'bytes>,
    unpacked_len: usize,
    decompress: bool,
}

impl<'bytes> DataHandle<'bytes> {
    #[must_use]
    pub(crate) fn new(packed: Bytes<'bytes>, unpacked_len: usize, decompress: bool) -> Self {
        Self {
            packed,
            unpacked_len,
            decompress,
        }
    }

    /// Equal packed and unpacked lengths mean the payload was stored raw
    /// and must not be inflated.
    fn resolve(self) -> Result<(CompressableBytes<'bytes>, bool)> {
        let stored = self.packed.len() == self.unpacked_len;
        if self.decompress && !stored {
            let mut decoder = ZlibDecoder::new(Vec::new());
            decoder.write_all(self.packed.as_bytes())?;
            let inflated = decoder.finish()?;
            if inflated.len() != self.unpacked_len {
                return Err(Error::DecompressionSizeMismatch {
                    expected: self.unpacked_len,
                    actual: inflated.len(),
                });
            }
            Ok((CompressableBytes::from_owned(inflated, None), false))
        } else {
            let decompressed_len = (!stored).then_some(self.unpacked_len);
            Ok((self.packed.into_compressable(decompressed_len), !stored))
        }
    }
}

pub(crate) enum FileData<'bytes> {
    Loaded(CompressableBytes<'bytes>),
    Pending(DataHandle<'bytes>),
}

/// A file entry: a name, version-specific metadata, and a payload that is
/// either materialized or still pending in the source.
pub struct File<'bytes, FM> {
    name: BString,
    path: BString,
    storage_type: StorageType,
    compressed: bool,
    metadata: FM,
    data: FileData<'bytes>,
}

impl<'bytes, FM> File<'bytes, FM> {
    #[must_use]
    pub(crate) fn new(
        name: BString,
        path: BString,
        storage_type: StorageType,
        metadata: FM,
        handle: DataHandle<'bytes>,
    ) -> Self {
        Self {
            name,
            path,
            storage_type,
            compressed: storage_type != StorageType::Store,
            metadata,
            data: FileData::Pending(handle),
        }
    }

    #[must_use]
    pub fn name(&self) -> &BStr {
        self.name.as_ref()
    }

    #[must_use]
    pub fn path(&self) -> &BStr {
        self.path.as_ref()
    }

    #[must_use]
    pub fn storage_type(&self) -> StorageType {
        self.storage_type
    }

    #[must_use]
    pub fn metadata(&self) -> &FM {
        &self.metadata
    }

    /// Whether the bytes currently held (or still pending) are
    /// compressed.
    #[must_use]
    pub fn is_compressed(&self) -> bool {
        self.compressed
    }

    #[must_use]
    pub fn is_loaded(&self) -> bool {
        matches!(self.data, FileData::Loaded(_))
    }

    /// The materialized payload, when there is one.
    #[must_use]
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match &self.data {
            FileData::Loaded(bytes) => Some(bytes.as_bytes()),
            FileData::Pending(_) => None,
        }
    }

    /// The payload, resolving and caching it on first access.
    pub fn data(&mut self) -> Result<&[u8]> {
        self.resolve()?;
        match &self.data {
            FileData::Loaded(bytes) => Ok(bytes.as_bytes()),
            FileData::Pending(_) => unreachable!(),
        }
    }

    /// Deflate a materialized payload in place.
    pub fn compress(&mut self) -> Result<()> {
        self.resolve()?;
        if self.compressed {
            return Err(Error::AlreadyCompressed);
        }

        if let FileData::Loaded(bytes) = &self.data {
            let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(bytes.as_bytes())?;
            let packed = encoder.finish()?;
            let unpacked_len = bytes.len();
            self.data = FileData::Loaded(CompressableBytes::from_owned(
                packed,
                Some(unpacked_len),
            ));
            self.compressed = true;
        }
        Ok(())
    }

    /// Inflate a materialized payload in place.
    pub fn decompress(&mut self) -> Result<()> {
        self.resolve()?;
        if !self.compressed {
            return Err(Error::AlreadyDecompressed);
        }

        if let FileData::Loaded(bytes) = &self.data {
            let mut decoder = ZlibDecoder::new(Vec::new());
            decoder.write_all(bytes.as_bytes())?;
            let inflated = decoder.finish()?;
            if let Some(expected) = bytes.decompressed_len() {
                if inflated.len() != expected {
                    return Err(Error::DecompressionSizeMismatch {
                        expected,
                        actual: inflated.len(),
                    });
                }
            }
            self.data = FileData::Loaded(CompressableBytes::from_owned(inflated, None));
            self.compressed = false;
        }
        Ok(())
    }

    fn resolve(&mut self) -> Result<()> {
        if matches!(self.data, FileData::Pending(_)) {
            let data = mem::replace(
                &mut self.data,
                FileData::Loaded(CompressableBytes::default()),
            );
            if let FileData::Pending(handle) = data {
                let (bytes, compressed) = handle.resolve()?;
                self.compressed = compressed;
                self.data = FileData::Loaded(bytes);
            }
        }
        Ok(())
    }
}

/// A folder entry holding its sub-folders and files.
pub struct Folder<'bytes, FM> {
    name: BString,
    path: BString,
    folders: Vec<Folder<'bytes, FM>>,
    files: Vec<File<'bytes, FM>>,
}

impl<'bytes, FM> Folder<'bytes, FM> {
    #[must_use]
    pub(crate) fn new(
        name: BString,
        path: BString,
        folders: Vec<Folder<'bytes, FM>>,
        files: Vec<File<'bytes, FM>>,
    ) -> Self {
        Self {
            name,
            path,
            folders,
            files,
        }
    }

    #[must_use]
    pub fn name(&self) -> &BStr {
        self.name.as_ref()
    }

    #[must_use]
    pub fn path(&self) -> &BStr {
        self.path.as_ref()
    }

    #[must_use]
    pub fn folders(&self) -> &[Folder<'bytes, FM>] {
        &self.folders
    }

    #[must_use]
    pub fn folders_mut(&mut self) -> &mut [Folder<'bytes, FM>] {
        &mut self.folders
    }

    #[must_use]
    pub fn files(&self) -> &[File<'bytes, FM>] {
        &self.files
    }

    #[must_use]
    pub fn files_mut(&mut self) -> &mut [File<'bytes, FM>] {
        &mut self.files
    }

    pub fn load_data(&mut self) -> Result<()> {
        for file in &mut self.files {
            file.resolve()?;
        }
        for folder in &mut self.folders {
            folder.load_data()?;
        }
        Ok(())
    }
}

/// A top-level logical partition of an archive, identified by a short
/// alias. A drive's immediate folders and files are those of its root
/// folder.
pub struct Drive<'bytes, FM> {
    alias: BString,
    name: BString,
    path: BString,
    folders: Vec<Folder<'bytes, FM>>,
    files: Vec<File<'bytes, FM>>,
}

impl<'bytes, FM> Drive<'bytes, FM> {
    #[must_use]
    pub(crate) fn new(
        alias: BString,
        name: BString,
        path: BString,
        folders: Vec<Folder<'bytes, FM>>,
        files: Vec<File<'bytes, FM>>,
    ) -> Self {
        Self {
            alias,
            name,
            path,
            folders,
            files,
        }
    }

    #[must_use]
    pub fn alias(&self) -> &BStr {
        self.alias.as_ref()
    }

    #[must_use]
    pub fn name(&self) -> &BStr {
        self.name.as_ref()
    }

    #[must_use]
    pub fn path(&self) -> &BStr {
        self.path.as_ref()
    }

    #[must_use]
    pub fn folders(&self) -> &[Folder<'bytes, FM>] {
        &self.folders
    }

    #[must_use]
    pub fn folders_mut(&mut self) -> &mut [Folder<'bytes, FM>] {
        &mut self.folders
    }

    #[must_use]
    pub fn files(&self) -> &[File<'bytes, FM>] {
        &self.files
    }

    #[must_use]
    pub fn files_mut(&mut self) -> &mut [File<'bytes, FM>] {
        &mut self.files
    }

    /// Visit this drive and every folder below it, pre-order, in on-disk
    /// order.
    #[must_use]
    pub fn walk<'walk>(&'walk self) -> Walk<'walk, 'bytes, FM> {
        Walk {
            stack: vec![Parent::Drive(self)],
        }
    }

    pub fn load_data(&mut self) -> Result<()> {
        for file in &mut self.files {
            file.resolve()?;
        }
        for folder in &mut self.folders {
            folder.load_data()?;
        }
        Ok(())
    }
}

/// A decoded archive: a name, version-specific metadata, and the drives
/// in on-disk order.
pub struct Archive<'bytes, M, FM> {
    name: String,
    metadata: M,
    drives: Vec<Drive<'bytes, FM>>,
}

impl<'bytes, M, FM> Archive<'bytes, M, FM> {
    #[must_use]
    pub(crate) fn new(name: String, metadata: M, drives: Vec<Drive<'bytes, FM>>) -> Self {
        Self {
            name,
            metadata,
            drives,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn metadata(&self) -> &M {
        &self.metadata
    }

    #[must_use]
    pub fn drives(&self) -> &[Drive<'bytes, FM>] {
        &self.drives
    }

    #[must_use]
    pub fn drives_mut(&mut self) -> &mut [Drive<'bytes, FM>] {
        &mut self.drives
    }

    /// Visit every drive and folder of the archive, pre-order, in
    /// on-disk order.
    pub fn walk<'walk>(&'walk self) -> impl Iterator<Item = Visit<'walk, 'bytes, FM>> {
        self.drives.iter().flat_map(Drive::walk)
    }

    /// Force every pending file payload to resolve, in tree order.
    pub fn load_data(&mut self) -> Result<()> {
        for drive in &mut self.drives {
            drive.load_data()?;
        }
        Ok(())
    }
}

/// The node whose immediate children a [`Visit`] lists.
pub enum Parent<'walk, 'bytes, FM> {
    Drive(&'walk Drive<'bytes, FM>),
    Folder(&'walk Folder<'bytes, FM>),
}

impl<'walk, 'bytes, FM> Parent<'walk, 'bytes, FM> {
    #[must_use]
    pub fn name(&self) -> &'walk BStr {
        match *self {
            Self::Drive(drive) => drive.name(),
            Self::Folder(folder) => folder.name(),
        }
    }

    #[must_use]
    pub fn path(&self) -> &'walk BStr {
        match *self {
            Self::Drive(drive) => drive.path(),
            Self::Folder(folder) => folder.path(),
        }
    }

    fn contents(&self) -> (&'walk [Folder<'bytes, FM>], &'walk [File<'bytes, FM>]) {
        match *self {
            Self::Drive(drive) => (drive.folders(), drive.files()),
            Self::Folder(folder) => (folder.folders(), folder.files()),
        }
    }
}

/// One step of a walk: a container and its immediate children.
pub struct Visit<'walk, 'bytes, FM> {
    parent: Parent<'walk, 'bytes, FM>,
    folders: &'walk [Folder<'bytes, FM>],
    files: &'walk [File<'bytes, FM>],
}

impl<'walk, 'bytes, FM> Visit<'walk, 'bytes, FM> {
    #[must_use]
    pub fn parent(&self) -> &Parent<'walk, 'bytes, FM> {
        &self.parent
    }

    #[must_use]
    pub fn folders(&self) -> &'walk [Folder<'bytes, FM>] {
        self.folders
    }

    #[must_use]
    pub fn files(&self) -> &'walk [File<'bytes, FM>] {
        self.files
    }
}

pub struct Walk<'walk, 'bytes, FM> {
    stack: Vec<Parent<'walk, 'bytes, FM>>,
}

impl<'walk, 'bytes, FM> Iterator for Walk<'walk, 'bytes, FM> {
    type Item = Visit<'walk, 'bytes, FM>;

    fn next(&mut self) -> Option<Self::Item> {
        let parent = self.stack.pop()?;
        let (folders, files) = parent.contents();
        for folder in folders.iter().rev() {
            self.stack.push(Parent::Folder(folder));
        }
        Some(Visit {
            parent,
            folders,
            files,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::{DataHandle, File};
    use crate::{containers::Bytes, Error, StorageType};
    use bstr::BString;
    use flate2::{write::ZlibEncoder, Compression};
    use std::io::Write as _;

    fn deflate(payload: &[u8]) -> Vec<u8> {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(payload).unwrap();
        encoder.finish().unwrap()
    }

    fn make_file(handle: DataHandle<'_>, storage_type: StorageType) -> File<'_, ()> {
        File::new(
            BString::from("file.bin"),
            BString::from("data:/file.bin"),
            storage_type,
            (),
            handle,
        )
    }

    #[test]
    fn stored_payloads_resolve_verbatim() -> anyhow::Result<()> {
        let payload = b"stored payload";
        let handle = DataHandle::new(Bytes::from_borrowed(payload), payload.len(), true);
        let mut file = make_file(handle, StorageType::Store);

        assert!(!file.is_loaded());
        assert!(file.as_bytes().is_none());
        assert_eq!(file.data()?, payload);
        assert!(file.is_loaded());
        assert!(!file.is_compressed());
        Ok(())
    }

    #[test]
    fn compressed_payloads_inflate_on_first_read() -> anyhow::Result<()> {
        let payload = b"Hello, World!";
        let packed = deflate(payload);
        let handle = DataHandle::new(Bytes::from_owned(packed), payload.len(), true);
        let mut file = make_file(handle, StorageType::BufferCompress);

        assert!(file.is_compressed());
        assert_eq!(file.data()?, payload);
        assert!(!file.is_compressed());
        Ok(())
    }

    #[test]
    fn opting_out_of_decompression_keeps_the_packed_bytes() -> anyhow::Result<()> {
        let payload = b"Hello, World!";
        let packed = deflate(payload);
        let handle = DataHandle::new(Bytes::from_owned(packed.clone()), payload.len(), false);
        let mut file = make_file(handle, StorageType::BufferCompress);

        assert_eq!(file.data()?, &packed[..]);
        assert!(file.is_compressed());

        file.decompress()?;
        assert_eq!(file.as_bytes(), Some(&payload[..]));
        assert!(!file.is_compressed());
        Ok(())
    }

    #[test]
    fn inflated_size_must_match_the_declared_size() {
        let payload = b"Hello, World!";
        let packed = deflate(payload);
        let handle = DataHandle::new(Bytes::from_owned(packed), payload.len() + 4, true);
        let mut file = make_file(handle, StorageType::BufferCompress);

        assert!(matches!(
            file.data(),
            Err(Error::DecompressionSizeMismatch { .. })
        ));
    }

    #[test]
    fn compress_round_trips_in_place() -> anyhow::Result<()> {
        let payload = b"round trip me";
        let handle = DataHandle::new(Bytes::from_borrowed(payload), payload.len(), true);
        let mut file = make_file(handle, StorageType::Store);

        file.data()?;
        file.compress()?;
        assert!(file.is_compressed());
        assert_ne!(file.as_bytes(), Some(&payload[..]));
        assert!(matches!(file.compress(), Err(Error::AlreadyCompressed)));

        file.decompress()?;
        assert_eq!(file.as_bytes(), Some(&payload[..]));
        assert!(matches!(
            file.decompress(),
            Err(Error::AlreadyDecompressed)
        ));
        Ok(())
    }
}
