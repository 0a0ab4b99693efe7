use crate::{
    containers::Bytes,
    fs::{DataHandle, Drive, File, Folder},
    io::{Sink, Source},
    names::{read_name_table, NameTerminator},
    protocols::FixedAscii,
    Error, Result, StorageType,
};
use bstr::{BStr, BString};
use core::ops::Range;
use std::{
    collections::HashMap,
    io::{self, Write},
};

/// Width of the drive/folder/file indices and TOC counts: V2 and V5 pack
/// them as u16, V7 and V9 as u32.
#[derive(Clone, Copy)]
pub(crate) enum IndexWidth {
    Half,
    Full,
}

impl IndexWidth {
    pub(crate) fn read<'bytes, In>(self, source: &mut In) -> io::Result<u32>
    where
        In: ?Sized + Source<'bytes>,
    {
        match self {
            Self::Half => Ok(source.read::<u16>()?.into()),
            Self::Full => source.read::<u32>(),
        }
    }

    #[allow(dead_code)]
    pub(crate) fn write<Out>(self, sink: &mut Sink<'_, Out>, value: u32) -> io::Result<()>
    where
        Out: Write,
    {
        match self {
            Self::Half => {
                let value = u16::try_from(value)
                    .map_err(|err| io::Error::new(io::ErrorKind::InvalidInput, err))?;
                sink.write(&value)
            }
            Self::Full => sink.write(&value),
        }
    }
}

/// One `(offset, count)` pair of the table of contents. Offsets are
/// relative to the archive's `header_pos`.
#[derive(Clone, Copy, Debug)]
pub(crate) struct TocSection {
    pub(crate) offset: u32,
    pub(crate) count: u32,
}

impl TocSection {
    fn read<'bytes, In>(source: &mut In, width: IndexWidth) -> io::Result<Self>
    where
        In: ?Sized + Source<'bytes>,
    {
        let offset = source.read()?;
        let count = width.read(source)?;
        Ok(Self { offset, count })
    }

    #[allow(dead_code)]
    fn write<Out>(&self, sink: &mut Sink<'_, Out>, width: IndexWidth) -> io::Result<()>
    where
        Out: Write,
    {
        sink.write(&self.offset)?;
        width.write(sink, self.count)
    }
}

/// The fixed-order directory of the archive header: drives, folders,
/// files, names.
#[derive(Clone, Copy, Debug)]
pub(crate) struct TocHeader {
    pub(crate) drives: TocSection,
    pub(crate) folders: TocSection,
    pub(crate) files: TocSection,
    pub(crate) names: TocSection,
}

impl TocHeader {
    pub(crate) fn read<'bytes, In>(source: &mut In, width: IndexWidth) -> io::Result<Self>
    where
        In: ?Sized + Source<'bytes>,
    {
        let drives = TocSection::read(source, width)?;
        let folders = TocSection::read(source, width)?;
        let files = TocSection::read(source, width)?;
        let names = TocSection::read(source, width)?;
        Ok(Self {
            drives,
            folders,
            files,
            names,
        })
    }

    #[allow(dead_code)]
    pub(crate) fn write<Out>(&self, sink: &mut Sink<'_, Out>, width: IndexWidth) -> io::Result<()>
    where
        Out: Write,
    {
        self.drives.write(sink, width)?;
        self.folders.write(sink, width)?;
        self.files.write(sink, width)?;
        self.names.write(sink, width)
    }
}

/// Offsets established by the version header, consumed by the TOC and
/// checksum layers.
pub(crate) struct Pointers {
    pub(crate) header_pos: usize,
    pub(crate) header_size: usize,
    pub(crate) data_pos: usize,
    #[allow(dead_code)]
    pub(crate) data_size: Option<usize>,
}

#[derive(Clone, Debug)]
pub(crate) struct DriveDef {
    pub(crate) alias: BString,
    pub(crate) name: BString,
    pub(crate) folder_range: Range<u32>,
    pub(crate) file_range: Range<u32>,
    pub(crate) root_folder: u32,
}

impl DriveDef {
    pub(crate) fn read<'bytes, In>(source: &mut In, width: IndexWidth) -> Result<Self>
    where
        In: ?Sized + Source<'bytes>,
    {
        let alias = source.read_protocol::<FixedAscii<64>>()?;
        let name = source.read_protocol::<FixedAscii<64>>()?;
        let folder_start = width.read(source)?;
        let folder_end = width.read(source)?;
        let file_start = width.read(source)?;
        let file_end = width.read(source)?;
        let root_folder = width.read(source)?;
        Ok(Self {
            alias,
            name,
            folder_range: folder_start..folder_end,
            file_range: file_start..file_end,
            root_folder,
        })
    }

    #[allow(dead_code)]
    pub(crate) fn write<Out>(&self, sink: &mut Sink<'_, Out>, width: IndexWidth) -> Result<()>
    where
        Out: Write,
    {
        sink.write_protocol::<FixedAscii<64>>(self.alias.as_ref())?;
        sink.write_protocol::<FixedAscii<64>>(self.name.as_ref())?;
        width.write(sink, self.folder_range.start)?;
        width.write(sink, self.folder_range.end)?;
        width.write(sink, self.file_range.start)?;
        width.write(sink, self.file_range.end)?;
        width.write(sink, self.root_folder)?;
        Ok(())
    }
}

#[derive(Clone, Debug)]
pub(crate) struct FolderDef {
    pub(crate) name_pos: u32,
    pub(crate) folder_range: Range<u32>,
    pub(crate) file_range: Range<u32>,
}

impl FolderDef {
    pub(crate) fn read<'bytes, In>(source: &mut In, width: IndexWidth) -> Result<Self>
    where
        In: ?Sized + Source<'bytes>,
    {
        let name_pos = source.read()?;
        let folder_start = width.read(source)?;
        let folder_end = width.read(source)?;
        let file_start = width.read(source)?;
        let file_end = width.read(source)?;
        Ok(Self {
            name_pos,
            folder_range: folder_start..folder_end,
            file_range: file_start..file_end,
        })
    }

    #[allow(dead_code)]
    pub(crate) fn write<Out>(&self, sink: &mut Sink<'_, Out>, width: IndexWidth) -> Result<()>
    where
        Out: Write,
    {
        sink.write(&self.name_pos)?;
        width.write(sink, self.folder_range.start)?;
        width.write(sink, self.folder_range.end)?;
        width.write(sink, self.file_range.start)?;
        width.write(sink, self.file_range.end)?;
        Ok(())
    }
}

/// The canonical file record. Each version's driver decodes its own wire
/// layout into this shape, narrowing the leftovers into the `metadata`
/// payload it exposes on [`File`].
#[derive(Clone, Debug)]
pub(crate) struct FileDef<FM> {
    pub(crate) name_pos: u32,
    pub(crate) data_pos: u64,
    pub(crate) length_on_disk: u32,
    pub(crate) length_in_archive: u32,
    pub(crate) storage_type: StorageType,
    pub(crate) metadata: FM,
}

/// Read the three definition arrays in TOC order.
pub(crate) fn read_definitions<'bytes, In, FM, ReadFile>(
    source: &mut In,
    toc: &TocHeader,
    header_pos: usize,
    width: IndexWidth,
    mut read_file: ReadFile,
) -> Result<(Vec<DriveDef>, Vec<FolderDef>, Vec<FileDef<FM>>)>
where
    In: ?Sized + Source<'bytes>,
    ReadFile: FnMut(&mut In) -> Result<FileDef<FM>>,
{
    source.seek_absolute(header_pos + toc.drives.offset as usize)?;
    let mut drives = Vec::with_capacity(toc.drives.count as usize);
    for _ in 0..toc.drives.count {
        drives.push(DriveDef::read(source, width)?);
    }

    source.seek_absolute(header_pos + toc.folders.offset as usize)?;
    let mut folders = Vec::with_capacity(toc.folders.count as usize);
    for _ in 0..toc.folders.count {
        folders.push(FolderDef::read(source, width)?);
    }

    source.seek_absolute(header_pos + toc.files.offset as usize)?;
    let mut files = Vec::with_capacity(toc.files.count as usize);
    for _ in 0..toc.files.count {
        files.push(read_file(source)?);
    }

    Ok((drives, folders, files))
}

/// Read definitions and names, then assemble the drive trees.
pub(crate) fn read_contents<'bytes, In, FM, ReadFile>(
    source: &mut In,
    toc: &TocHeader,
    ptrs: &Pointers,
    width: IndexWidth,
    read_file: ReadFile,
    decompress: bool,
) -> Result<Vec<Drive<'bytes, FM>>>
where
    In: ?Sized + Source<'bytes>,
    FM: Clone,
    ReadFile: FnMut(&mut In) -> Result<FileDef<FM>>,
{
    let (drive_defs, folder_defs, file_defs) =
        read_definitions(source, toc, ptrs.header_pos, width, read_file)?;
    let names = read_name_table(source, toc.names, ptrs.header_pos, NameTerminator::Count)?;
    assemble_drives(
        source,
        &drive_defs,
        &folder_defs,
        &file_defs,
        &names,
        ptrs.data_pos,
        decompress,
    )
}

fn subslice<'defs, T>(
    items: &'defs [T],
    range: &Range<u32>,
    kind: &'static str,
) -> Result<&'defs [T]> {
    let start = range.start as usize;
    let end = range.end as usize;
    if start > end || end > items.len() {
        return Err(Error::IndexOutOfRange { kind, value: end });
    }
    Ok(&items[start..end])
}

fn join_path(parent: &BStr, name: &BStr) -> BString {
    let mut path = parent.to_owned();
    path.push(b'/');
    path.extend_from_slice(name.as_ref());
    path
}

/// Materialize the parented trees from the flat definition arrays. Folder
/// and file ranges are global and get re-based onto each drive's local
/// slice; the drive adopts the children of its root folder.
pub(crate) fn assemble_drives<'bytes, In, FM>(
    source: &mut In,
    drive_defs: &[DriveDef],
    folder_defs: &[FolderDef],
    file_defs: &[FileDef<FM>],
    names: &HashMap<u32, BString>,
    data_pos: usize,
    decompress: bool,
) -> Result<Vec<Drive<'bytes, FM>>>
where
    In: ?Sized + Source<'bytes>,
    FM: Clone,
{
    let mut drives = Vec::with_capacity(drive_defs.len());
    for drive_def in drive_defs {
        let local_folders = subslice(folder_defs, &drive_def.folder_range, "folder")?;
        let local_files = subslice(file_defs, &drive_def.file_range, "file")?;

        let path: BString = {
            let mut path = drive_def.alias.clone();
            path.push(b':');
            path
        };

        let (folders, files) = if local_folders.is_empty() {
            (Vec::new(), Vec::new())
        } else {
            let root = drive_def
                .root_folder
                .checked_sub(drive_def.folder_range.start)
                .map(|index| index as usize)
                .filter(|index| *index < local_folders.len())
                .ok_or(Error::IndexOutOfRange {
                    kind: "root folder",
                    value: drive_def.root_folder as usize,
                })?;

            let mut builder = TreeBuilder {
                source: &mut *source,
                folder_defs: local_folders,
                file_defs: local_files,
                names,
                folder_start: drive_def.folder_range.start,
                file_start: drive_def.file_range.start,
                data_pos,
                decompress,
                _bytes: std::marker::PhantomData,
            };
            builder.build_children(&local_folders[root], path.as_ref())?
        };

        drives.push(Drive::new(
            drive_def.alias.clone(),
            drive_def.name.clone(),
            path,
            folders,
            files,
        ));
    }
    Ok(drives)
}

struct TreeBuilder<'ctx, 'bytes, In, FM>
where
    In: ?Sized + Source<'bytes>,
{
    source: &'ctx mut In,
    folder_defs: &'ctx [FolderDef],
    file_defs: &'ctx [FileDef<FM>],
    names: &'ctx HashMap<u32, BString>,
    folder_start: u32,
    file_start: u32,
    data_pos: usize,
    decompress: bool,
    _bytes: std::marker::PhantomData<&'bytes ()>,
}

impl<'ctx, 'bytes, In, FM> TreeBuilder<'ctx, 'bytes, In, FM>
where
    In: ?Sized + Source<'bytes>,
    FM: Clone,
{
    fn build_children(
        &mut self,
        def: &FolderDef,
        path: &BStr,
    ) -> Result<(Vec<Folder<'bytes, FM>>, Vec<File<'bytes, FM>>)> {
        let folder_defs = self.folder_defs;
        let file_defs = self.file_defs;

        let folder_indices = rebase(
            &def.folder_range,
            self.folder_start,
            folder_defs.len(),
            "folder",
        )?;
        let file_indices = rebase(&def.file_range, self.file_start, file_defs.len(), "file")?;

        let mut folders = Vec::with_capacity(folder_indices.len());
        for index in folder_indices {
            folders.push(self.build_folder(&folder_defs[index], path)?);
        }

        let mut files = Vec::with_capacity(file_indices.len());
        for index in file_indices {
            files.push(self.build_file(&file_defs[index], path)?);
        }

        Ok((folders, files))
    }

    fn build_folder(&mut self, def: &FolderDef, parent_path: &BStr) -> Result<Folder<'bytes, FM>> {
        let name = self.lookup_name(def.name_pos)?;
        let path = join_path(parent_path, name.as_ref());
        let (folders, files) = self.build_children(def, path.as_ref())?;
        Ok(Folder::new(name, path, folders, files))
    }

    fn build_file(&mut self, def: &FileDef<FM>, parent_path: &BStr) -> Result<File<'bytes, FM>> {
        let name = self.lookup_name(def.name_pos)?;
        let path = join_path(parent_path, name.as_ref());

        let jump_to = self.data_pos + usize::try_from(def.data_pos)?;
        let packed_len = def.length_in_archive as usize;
        let packed = self
            .source
            .save_restore_position(|source| -> Result<Bytes<'bytes>> {
                source.seek_absolute(jump_to)?;
                Ok(source.read_bytes(packed_len)?)
            })??;
        let handle = DataHandle::new(packed, def.length_on_disk as usize, self.decompress);

        Ok(File::new(
            name,
            path,
            def.storage_type,
            def.metadata.clone(),
            handle,
        ))
    }

    fn lookup_name(&self, name_pos: u32) -> Result<BString> {
        self.names
            .get(&name_pos)
            .cloned()
            .ok_or(Error::IndexOutOfRange {
                kind: "name",
                value: name_pos as usize,
            })
    }
}

fn rebase(
    range: &Range<u32>,
    start: u32,
    len: usize,
    kind: &'static str,
) -> Result<Range<usize>> {
    let out_of_range = || Error::IndexOutOfRange {
        kind,
        value: range.end as usize,
    };
    let lo = range.start.checked_sub(start).ok_or_else(out_of_range)? as usize;
    let hi = range.end.checked_sub(start).ok_or_else(out_of_range)? as usize;
    if lo > hi || hi > len {
        return Err(out_of_range());
    }
    Ok(lo..hi)
}
