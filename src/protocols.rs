use crate::io::{BinaryReadable, BinaryWriteable, Sink, Source};
use bstr::{BStr as ByteStr, BString as ByteString};
use std::io::{self, Write};

#[derive(Debug, thiserror::Error)]
enum Error {
    #[error("a string is too large to fit its fixed-width field")]
    StringTooLarge,

    #[error("a name field does not hold valid utf-16")]
    InvalidUtf16,
}

impl From<Error> for io::Error {
    fn from(value: Error) -> Self {
        Self::new(io::ErrorKind::InvalidData, value)
    }
}

/// An ASCII field occupying exactly `N` bytes, NUL-padded on the right.
pub(crate) struct FixedAscii<const N: usize>;

impl<const N: usize> BinaryReadable for FixedAscii<N> {
    type Item = ByteString;

    fn from_stream<'bytes, In>(stream: &mut In) -> io::Result<Self::Item>
    where
        In: ?Sized + Source<'bytes>,
    {
        let mut result = vec![0u8; N];
        stream.read_into(&mut result[..])?;
        while result.last() == Some(&0) {
            result.pop();
        }
        result.shrink_to_fit();
        Ok(result.into())
    }
}

impl<const N: usize> BinaryWriteable for FixedAscii<N> {
    type Item = ByteStr;

    fn to_stream<Out>(stream: &mut Sink<'_, Out>, item: &Self::Item) -> io::Result<()>
    where
        Out: Write,
    {
        if item.len() > N {
            return Err(Error::StringTooLarge.into());
        }

        stream.write_bytes(item)?;
        stream.write_bytes(&vec![0u8; N - item.len()])?;
        Ok(())
    }
}

/// A UTF-16-LE field occupying exactly `N` bytes, NUL-padded on the
/// right.
pub(crate) struct FixedUtf16<const N: usize>;

impl<const N: usize> BinaryReadable for FixedUtf16<N> {
    type Item = String;

    fn from_stream<'bytes, In>(stream: &mut In) -> io::Result<Self::Item>
    where
        In: ?Sized + Source<'bytes>,
    {
        let mut raw = vec![0u8; N];
        stream.read_into(&mut raw[..])?;

        let mut units: Vec<u16> = raw
            .chunks_exact(2)
            .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
            .collect();
        while units.last() == Some(&0) {
            units.pop();
        }

        String::from_utf16(&units).map_err(|_| Error::InvalidUtf16.into())
    }
}

impl<const N: usize> BinaryWriteable for FixedUtf16<N> {
    type Item = str;

    fn to_stream<Out>(stream: &mut Sink<'_, Out>, item: &Self::Item) -> io::Result<()>
    where
        Out: Write,
    {
        let units: Vec<u16> = item.encode_utf16().collect();
        if units.len() * 2 > N {
            return Err(Error::StringTooLarge.into());
        }

        for unit in &units {
            stream.write_bytes(&unit.to_le_bytes())?;
        }
        stream.write_bytes(&vec![0u8; N - units.len() * 2])?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{FixedAscii, FixedUtf16};
    use crate::io::{BorrowedSource, Sink, Source as _};
    use bstr::ByteSlice as _;

    #[test]
    fn ascii_fields_are_trimmed_and_padded() -> anyhow::Result<()> {
        let mut buffer = Vec::new();
        let mut sink = Sink::new(&mut buffer);
        sink.write_protocol::<FixedAscii<8>>(b"data".as_bstr())?;
        assert_eq!(buffer, b"data\0\0\0\0");

        let mut source = BorrowedSource::from(&buffer[..]);
        let name = source.read_protocol::<FixedAscii<8>>()?;
        assert_eq!(name, "data");
        Ok(())
    }

    #[test]
    fn oversized_ascii_fields_are_rejected() {
        let mut buffer = Vec::new();
        let mut sink = Sink::new(&mut buffer);
        let result = sink.write_protocol::<FixedAscii<4>>(b"too long".as_bstr());
        assert!(result.is_err());
    }

    #[test]
    fn utf16_fields_round_trip() -> anyhow::Result<()> {
        let mut buffer = Vec::new();
        let mut sink = Sink::new(&mut buffer);
        sink.write_protocol::<FixedUtf16<16>>("test")?;
        assert_eq!(buffer.len(), 16);

        let mut source = BorrowedSource::from(&buffer[..]);
        let name = source.read_protocol::<FixedUtf16<16>>()?;
        assert_eq!(name, "test");
        Ok(())
    }
}
