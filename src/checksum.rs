use crate::{containers::Bytes, Error, Result};
use md5::{Digest, Md5};
use sha2::Sha256;

/// Salt for the whole-archive MD5 carried by V2 and V5 headers.
pub const FILE_MD5_SALT: &[u8] = b"E01519D6-2DB7-4640-AF54-0A23319C56C3";

/// Salt for the header MD5 carried by V2 and V5 headers.
pub const HEADER_MD5_SALT: &[u8] = b"DFC9AF62-FC1B-4180-BC27-11CCE87D3EFF";

const CHUNK_SIZE: usize = 256 * 1024;

fn feed<D>(mut hasher: D, salt: Option<&[u8]>, window: &[u8]) -> D
where
    D: Digest,
{
    if let Some(salt) = salt {
        hasher.update(salt);
    }
    for chunk in window.chunks(CHUNK_SIZE) {
        hasher.update(chunk);
    }
    hasher
}

fn hex(bytes: &[u8]) -> String {
    use core::fmt::Write as _;
    bytes.iter().fold(String::new(), |mut out, byte| {
        _ = write!(out, "{byte:02x}");
        out
    })
}

/// A deferred MD5 check: the digest an archive claims, bound to the byte
/// window it claims it for. Validation is opt-in so that archives with
/// drifted digests can still be inspected.
pub struct Md5Checksum<'bytes> {
    expected: [u8; 16],
    window: Bytes<'bytes>,
    salt: Option<&'static [u8]>,
}

impl<'bytes> Md5Checksum<'bytes> {
    #[must_use]
    pub(crate) fn new(
        expected: [u8; 16],
        window: Bytes<'bytes>,
        salt: Option<&'static [u8]>,
    ) -> Self {
        Self {
            expected,
            window,
            salt,
        }
    }

    /// The digest stored in the archive.
    #[must_use]
    pub fn expected(&self) -> &[u8; 16] {
        &self.expected
    }

    /// Digest the bound window with the bound salt.
    #[must_use]
    pub fn compute(&self) -> [u8; 16] {
        self.compute_with_salt(self.salt)
    }

    /// Digest the bound window with a caller-chosen salt.
    #[must_use]
    pub fn compute_with_salt(&self, salt: Option<&[u8]>) -> [u8; 16] {
        feed(Md5::new(), salt, self.window.as_bytes())
            .finalize()
            .into()
    }

    pub fn validate(&self) -> Result<()> {
        self.validate_with_salt(self.salt)
    }

    pub fn validate_with_salt(&self, salt: Option<&[u8]>) -> Result<()> {
        let actual = self.compute_with_salt(salt);
        if actual == self.expected {
            Ok(())
        } else {
            Err(Error::ChecksumMismatch {
                expected: hex(&self.expected),
                actual: hex(&actual),
            })
        }
    }
}

/// A deferred SHA-256 check over a declared window, as carried by V9
/// headers.
pub struct Sha256Checksum<'bytes> {
    expected: [u8; 32],
    window: Bytes<'bytes>,
}

impl<'bytes> Sha256Checksum<'bytes> {
    #[must_use]
    pub(crate) fn new(expected: [u8; 32], window: Bytes<'bytes>) -> Self {
        Self { expected, window }
    }

    /// The digest stored in the archive.
    #[must_use]
    pub fn expected(&self) -> &[u8; 32] {
        &self.expected
    }

    #[must_use]
    pub fn compute(&self) -> [u8; 32] {
        feed(Sha256::new(), None, self.window.as_bytes())
            .finalize()
            .into()
    }

    pub fn validate(&self) -> Result<()> {
        let actual = self.compute();
        if actual == self.expected {
            Ok(())
        } else {
            Err(Error::ChecksumMismatch {
                expected: hex(&self.expected),
                actual: hex(&actual),
            })
        }
    }
}
