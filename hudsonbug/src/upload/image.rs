//! Program images and their sections.

use std::ops::Range;
use std::path::{Path, PathBuf};

use bitflags::bitflags;
use object::elf::{FileHeader32, FileHeader64, PT_LOAD, SHF_ALLOC};
use object::read::elf::{FileHeader, ProgramHeader};
use object::{Endianness, FileKind, Object, ObjectSection};

/// Errors while reading a program image.
#[derive(Debug, thiserror::Error, docsplay::Display)]
pub enum ImageError {
    /// Unable to open file {path}.
    Open {
        path: PathBuf,
        source: std::io::Error,
    },

    /// File {path} is not an object file.
    NotAnObject {
        path: PathBuf,
        source: object::read::Error,
    },

    /// File {path} is a {format} image, only ELF object files can be uploaded.
    UnsupportedFormat { path: PathBuf, format: String },

    /// Failed to read section {name}.
    Section {
        name: String,
        source: object::read::Error,
    },

    /// Section {name} is located at {address:#x}, outside of the 32-bit address space.
    AddressOutOfRange { name: String, address: u64 },
}

impl ImageError {
    fn not_an_object(path: &Path) -> impl FnOnce(object::read::Error) -> Self + '_ {
        move |source| ImageError::NotAnObject {
            path: path.to_owned(),
            source,
        }
    }
}

bitflags! {
    /// Properties of a [`Section`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct SectionFlags: u32 {
        /// The section occupies memory while the program runs.
        const ALLOC = 1 << 0;
        /// The section has contents that are copied to the target.
        const LOAD = 1 << 1;
    }
}

/// A section of a program image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section<'data> {
    name: &'data str,
    flags: SectionFlags,
    link_address: u32,
    data: &'data [u8],
}

impl<'data> Section<'data> {
    pub fn new(
        name: &'data str,
        flags: SectionFlags,
        link_address: u32,
        data: &'data [u8],
    ) -> Self {
        Self {
            name,
            flags,
            link_address,
            data,
        }
    }

    pub fn name(&self) -> &'data str {
        self.name
    }

    pub fn flags(&self) -> SectionFlags {
        self.flags
    }

    /// The load address recorded in the image, before relocation by a base address.
    pub fn link_address(&self) -> u32 {
        self.link_address
    }

    /// Size of the contents in bytes.
    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }

    /// Whether the section's contents are copied to the target.
    pub fn is_loadable(&self) -> bool {
        self.flags.contains(SectionFlags::LOAD)
    }

    /// Reads up to `len` bytes at `offset`. Reads past the end are truncated.
    pub fn contents(&self, offset: usize, len: usize) -> &'data [u8] {
        let start = offset.min(self.data.len());
        let end = offset.saturating_add(len).min(self.data.len());
        &self.data[start..end]
    }
}

/// A `PT_LOAD` segment: where its file contents end up in target memory.
#[derive(Debug, Clone, PartialEq, Eq)]
struct LoadSegment {
    file_range: Range<u64>,
    physical_address: u64,
}

impl LoadSegment {
    /// The physical address of the file range `offset..offset + size`, if this segment holds it.
    fn physical_address_of(&self, offset: u64, size: u64) -> Option<u64> {
        let end = offset.checked_add(size)?;
        (self.file_range.start <= offset && end <= self.file_range.end)
            .then(|| self.physical_address + (offset - self.file_range.start))
    }
}

fn load_segments<Elf: FileHeader<Endian = Endianness>>(
    data: &[u8],
) -> object::read::Result<Vec<LoadSegment>> {
    let header = Elf::parse(data)?;
    let endian = header.endian()?;

    let mut segments = Vec::new();
    for segment in header.program_headers(endian, data)? {
        if segment.p_type(endian) != PT_LOAD {
            continue;
        }

        let (offset, size) = segment.file_range(endian);
        if size == 0 {
            continue;
        }

        // The data will be placed at the physical address of the segment.
        let physical_address: u64 = segment.p_paddr(endian).into();
        tracing::debug!(
            "Found loadable segment, file offset {:#x}, size {:#x}, address {:#010x}",
            offset,
            size,
            physical_address
        );

        segments.push(LoadSegment {
            file_range: offset..offset + size,
            physical_address,
        });
    }

    Ok(segments)
}

/// A parsed program image.
///
/// The image borrows the file contents, which the caller keeps alive for as long as
/// sections are in use.
pub struct ObjectImage<'data> {
    path: PathBuf,
    file: object::File<'data>,
    segments: Vec<LoadSegment>,
}

impl std::fmt::Debug for ObjectImage<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectImage")
            .field("path", &self.path)
            .field("segments", &self.segments)
            .finish_non_exhaustive()
    }
}

impl<'data> ObjectImage<'data> {
    /// Parses the contents of the file at `path`.
    pub fn parse(path: &Path, data: &'data [u8]) -> Result<Self, ImageError> {
        let kind = FileKind::parse(data).map_err(ImageError::not_an_object(path))?;

        let segments = match kind {
            FileKind::Elf32 => load_segments::<FileHeader32<Endianness>>(data),
            FileKind::Elf64 => load_segments::<FileHeader64<Endianness>>(data),
            other => {
                return Err(ImageError::UnsupportedFormat {
                    path: path.to_owned(),
                    format: format!("{other:?}"),
                })
            }
        }
        .map_err(ImageError::not_an_object(path))?;

        let file = object::File::parse(data).map_err(ImageError::not_an_object(path))?;

        Ok(Self {
            path: path.to_owned(),
            file,
            segments,
        })
    }

    /// The address of the entry point.
    pub fn entry(&self) -> u64 {
        self.file.entry()
    }

    /// Iterates all sections in file order.
    ///
    /// The iteration is lazy and can be restarted by calling this again.
    pub fn sections(&self) -> impl Iterator<Item = Result<Section<'data>, ImageError>> + '_ {
        self.file
            .sections()
            .map(move |section| self.section(&section))
    }

    fn section(&self, section: &object::Section<'data, '_>) -> Result<Section<'data>, ImageError> {
        let name = section.name().map_err(|source| ImageError::Section {
            name: format!("#{}", section.index().0),
            source,
        })?;
        let read_error = |source| ImageError::Section {
            name: name.to_owned(),
            source,
        };

        let mut flags = SectionFlags::empty();
        if let object::SectionFlags::Elf { sh_flags } = section.flags() {
            if sh_flags & u64::from(SHF_ALLOC) != 0 {
                flags |= SectionFlags::ALLOC;
            }
        }

        let file_range = section.file_range();
        if flags.contains(SectionFlags::ALLOC) && file_range.is_some() {
            flags |= SectionFlags::LOAD;
        }

        let address = file_range
            .and_then(|(offset, size)| {
                self.segments
                    .iter()
                    .find_map(|segment| segment.physical_address_of(offset, size))
            })
            .unwrap_or_else(|| section.address());

        let link_address = if flags.contains(SectionFlags::LOAD) {
            u32::try_from(address).map_err(|_| ImageError::AddressOutOfRange {
                name: name.to_owned(),
                address,
            })?
        } else {
            // Only used for display.
            address as u32
        };

        let data = if flags.contains(SectionFlags::LOAD) {
            section.data().map_err(read_error)?
        } else {
            &[]
        };

        Ok(Section::new(name, flags, link_address, data))
    }
}
