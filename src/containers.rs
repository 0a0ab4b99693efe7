use memmap2::Mmap;
use std::sync::Arc;

mod detail {
    use memmap2::Mmap;
    use std::sync::Arc;

    pub enum Bytes<'bytes> {
        Owned(Vec<u8>),
        Borrowed(&'bytes [u8]),
        Mapped {
            pos: usize,
            len: usize,
            mapping: Arc<Mmap>,
        },
    }
}

use detail::Bytes::*;

pub(crate) struct Bytes<'bytes> {
    inner: detail::Bytes<'bytes>,
}

impl<'bytes> Bytes<'bytes> {
    #[must_use]
    pub(crate) fn as_bytes(&self) -> &[u8] {
        match &self.inner {
            Owned(bytes) => bytes,
            Borrowed(bytes) => bytes,
            Mapped { pos, len, mapping } => &mapping[*pos..*pos + *len],
        }
    }

    #[must_use]
    pub(crate) fn from_borrowed(bytes: &'bytes [u8]) -> Self {
        Self {
            inner: Borrowed(bytes),
        }
    }

    #[must_use]
    pub(crate) fn from_owned(bytes: Vec<u8>) -> Self {
        Self {
            inner: Owned(bytes),
        }
    }

    #[must_use]
    pub(crate) fn len(&self) -> usize {
        match &self.inner {
            Owned(bytes) => bytes.len(),
            Borrowed(bytes) => bytes.len(),
            Mapped { len, .. } => *len,
        }
    }

    #[must_use]
    pub(crate) fn into_compressable(
        self,
        decompressed_len: Option<usize>,
    ) -> CompressableBytes<'bytes> {
        CompressableBytes {
            bytes: self,
            decompressed_len,
        }
    }
}

impl Bytes<'static> {
    #[must_use]
    pub(crate) fn from_mapped(pos: usize, len: usize, mapping: Arc<Mmap>) -> Self {
        Self {
            inner: Mapped { pos, len, mapping },
        }
    }
}

impl<'bytes> Default for Bytes<'bytes> {
    fn default() -> Self {
        Self {
            inner: Owned(Vec::new()),
        }
    }
}

/// A byte payload that remembers the length it inflates to, when it is
/// compressed at all.
#[derive(Default)]
pub(crate) struct CompressableBytes<'bytes> {
    bytes: Bytes<'bytes>,
    decompressed_len: Option<usize>,
}

impl<'bytes> CompressableBytes<'bytes> {
    #[must_use]
    pub(crate) fn as_bytes(&self) -> &[u8] {
        self.bytes.as_bytes()
    }

    #[must_use]
    pub(crate) fn decompressed_len(&self) -> Option<usize> {
        self.decompressed_len
    }

    #[must_use]
    pub(crate) fn from_owned(bytes: Vec<u8>, decompressed_len: Option<usize>) -> Self {
        Self {
            bytes: Bytes::from_owned(bytes),
            decompressed_len,
        }
    }

    #[must_use]
    pub(crate) fn len(&self) -> usize {
        self.bytes.len()
    }
}
