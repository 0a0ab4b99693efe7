use crate::{io::Source, toc::TocSection, Error, Result};
use bstr::BString;
use core::mem;
use std::collections::HashMap;

const CHUNK_SIZE: usize = 256;

/// How the name table announces its own end: all shipping versions store
/// a string count, but a byte-size terminator also exists in the wild.
#[derive(Clone, Copy)]
pub(crate) enum NameTerminator {
    Count,
    Size,
}

/// Decode the run of NUL-terminated names, keyed by each string's byte
/// offset within the table.
pub(crate) fn read_name_table<'bytes, In>(
    source: &mut In,
    section: TocSection,
    header_pos: usize,
    terminator: NameTerminator,
) -> Result<HashMap<u32, BString>>
where
    In: ?Sized + Source<'bytes>,
{
    source.seek_absolute(header_pos + section.offset as usize)?;
    match terminator {
        NameTerminator::Count => read_by_count(source, section.count as usize),
        NameTerminator::Size => read_by_size(source, section.count as usize),
    }
}

fn read_by_count<'bytes, In>(source: &mut In, count: usize) -> Result<HashMap<u32, BString>>
where
    In: ?Sized + Source<'bytes>,
{
    let mut names = HashMap::with_capacity(count);
    let mut residual = Vec::new();
    let mut offset: u32 = 0;

    while names.len() < count {
        let available = source.as_bytes().len() - source.stream_position();
        let take = available.min(CHUNK_SIZE);
        if take == 0 {
            return Err(Error::NameTableTruncated {
                expected: count,
                read: names.len(),
            });
        }

        let chunk = source.read_bytes(take)?;
        let chunk = chunk.as_bytes();
        let mut start = 0;
        while let Some(nul) = chunk[start..].iter().position(|&byte| byte == 0) {
            residual.extend_from_slice(&chunk[start..start + nul]);
            let name = BString::from(mem::take(&mut residual));
            let advance = u32::try_from(name.len() + 1)?;
            names.insert(offset, name);
            offset += advance;
            start += nul + 1;
            if names.len() == count {
                return Ok(names);
            }
        }
        residual.extend_from_slice(&chunk[start..]);
    }

    Ok(names)
}

fn read_by_size<'bytes, In>(source: &mut In, size: usize) -> Result<HashMap<u32, BString>>
where
    In: ?Sized + Source<'bytes>,
{
    let block = source.read_bytes(size)?;
    let mut names = HashMap::new();
    let mut offset: u32 = 0;
    for part in block.as_bytes().split(|&byte| byte == 0) {
        let advance = u32::try_from(part.len() + 1)?;
        names.insert(offset, BString::from(part));
        offset += advance;
    }
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::{read_name_table, NameTerminator};
    use crate::{io::BorrowedSource, toc::TocSection, Error};

    fn section(offset: u32, count: u32) -> TocSection {
        TocSection { offset, count }
    }

    #[test]
    fn offsets_key_the_decoded_names() -> anyhow::Result<()> {
        let table = b"a\0bc\0def\0";
        let mut source = BorrowedSource::from(&table[..]);
        let names = read_name_table(&mut source, section(0, 3), 0, NameTerminator::Count)?;

        assert_eq!(names.len(), 3);
        assert_eq!(names[&0], "a");
        assert_eq!(names[&2], "bc");
        assert_eq!(names[&5], "def");
        Ok(())
    }

    #[test]
    fn names_may_straddle_chunk_boundaries() -> anyhow::Result<()> {
        let mut table = vec![b'x'; 700];
        table.push(0);
        table.extend_from_slice(b"tail\0");

        let mut source = BorrowedSource::from(&table[..]);
        let names = read_name_table(&mut source, section(0, 2), 0, NameTerminator::Count)?;

        assert_eq!(names[&0].len(), 700);
        assert_eq!(names[&701], "tail");
        Ok(())
    }

    #[test]
    fn an_empty_table_is_legal() -> anyhow::Result<()> {
        let mut source = BorrowedSource::from(&b""[..]);
        let names = read_name_table(&mut source, section(0, 0), 0, NameTerminator::Count)?;
        assert!(names.is_empty());
        Ok(())
    }

    #[test]
    fn running_dry_before_the_count_is_an_error() {
        let table = b"one\0two\0";
        let mut source = BorrowedSource::from(&table[..]);
        let result = read_name_table(&mut source, section(0, 3), 0, NameTerminator::Count);
        assert!(matches!(
            result,
            Err(Error::NameTableTruncated {
                expected: 3,
                read: 2
            })
        ));
    }

    #[test]
    fn size_terminated_tables_split_the_whole_run() -> anyhow::Result<()> {
        let table = b"a\0bc\0";
        let mut source = BorrowedSource::from(&table[..]);
        let names = read_name_table(&mut source, section(0, 5), 0, NameTerminator::Size)?;
        assert_eq!(names[&0], "a");
        assert_eq!(names[&2], "bc");
        Ok(())
    }
}
