//! Minimal ELF parser for the tether host tools.
//!
//! Parses just enough of an ELF32/ELF64 image to feed the DWARF reader and
//! the type graph: the file header, the section header table (looked up by
//! name), and the `PT_LOAD` program headers used to harvest initializer
//! bytes for constants. Zero-copy: all accessors return slices into the
//! input buffer.

mod header;

pub use header::{Class, Endian, FileHeader};

use core::fmt;

/// `p_type` value of a loadable program header.
pub const PT_LOAD: u32 = 1;

/// Errors produced while parsing an ELF image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElfError {
    /// The file does not start with the ELF magic.
    BadMagic,
    /// Unknown `EI_CLASS` value.
    UnsupportedClass,
    /// Unknown `EI_DATA` value.
    UnsupportedEndian,
    /// A header or table runs past the end of the file.
    Truncated,
    /// A section name is not valid UTF-8.
    BadSectionName,
}

impl fmt::Display for ElfError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BadMagic => write!(f, "not an ELF file"),
            Self::UnsupportedClass => write!(f, "unsupported ELF class"),
            Self::UnsupportedEndian => write!(f, "unsupported ELF byte order"),
            Self::Truncated => write!(f, "ELF data truncated"),
            Self::BadSectionName => write!(f, "section name is not valid UTF-8"),
        }
    }
}

impl std::error::Error for ElfError {}

/// A section header with its resolved name.
#[derive(Debug, Clone, Copy)]
pub struct Section<'a> {
    /// Section name from `.shstrtab`.
    pub name: &'a str,
    /// `sh_type` value.
    pub sh_type: u32,
    /// Virtual address of the section at execution.
    pub addr: u64,
    /// File offset of the section contents.
    pub offset: u64,
    /// Size of the section contents in bytes.
    pub size: u64,
}

/// A program header entry.
#[derive(Debug, Clone, Copy)]
pub struct Segment {
    /// `p_type` value (see [`PT_LOAD`]).
    pub p_type: u32,
    /// File offset of the segment image.
    pub offset: u64,
    /// Virtual address of the segment.
    pub vaddr: u64,
    /// Number of bytes in the file image.
    pub filesz: u64,
    /// Number of bytes in the memory image.
    pub memsz: u64,
}

/// A parsed ELF image.
#[derive(Debug)]
pub struct ElfFile<'a> {
    data: &'a [u8],
    header: FileHeader,
    sections: Vec<Section<'a>>,
    segments: Vec<Segment>,
}

impl<'a> ElfFile<'a> {
    /// Parse the file header, section table, and program headers.
    ///
    /// # Errors
    ///
    /// Returns [`ElfError`] when the image is malformed or uses an
    /// unsupported class or byte order.
    pub fn parse(data: &'a [u8]) -> Result<Self, ElfError> {
        let header = FileHeader::parse(data)?;
        let sections = parse_sections(data, &header)?;
        let segments = parse_segments(data, &header)?;
        Ok(Self {
            data,
            header,
            sections,
            segments,
        })
    }

    /// Word width of the image.
    #[must_use]
    pub fn class(&self) -> Class {
        self.header.class
    }

    /// Byte order of the image.
    #[must_use]
    pub fn endian(&self) -> Endian {
        self.header.endian
    }

    /// Entry point virtual address.
    #[must_use]
    pub fn entry_point(&self) -> u64 {
        self.header.entry
    }

    /// Looks up a section header by name.
    #[must_use]
    pub fn section(&self, name: &str) -> Option<&Section<'a>> {
        self.sections.iter().find(|s| s.name == name)
    }

    /// Returns the contents of the named section, or `None` if absent
    /// or out of bounds.
    #[must_use]
    pub fn section_data(&self, name: &str) -> Option<&'a [u8]> {
        let section = self.section(name)?;
        let start = usize::try_from(section.offset).ok()?;
        let end = start.checked_add(usize::try_from(section.size).ok()?)?;
        self.data.get(start..end)
    }

    /// Iterates over all section headers.
    pub fn sections(&self) -> impl Iterator<Item = &Section<'a>> {
        self.sections.iter()
    }

    /// Iterates over `PT_LOAD` program headers.
    pub fn load_segments(&self) -> impl Iterator<Item = &Segment> {
        self.segments.iter().filter(|s| s.p_type == PT_LOAD)
    }

    /// Returns `len` file-image bytes backing the virtual address `vaddr`.
    ///
    /// Only bytes covered by a `PT_LOAD` segment's file image (`p_filesz`)
    /// qualify; addresses in zero-initialized tails (`.bss`) return `None`.
    #[must_use]
    pub fn file_bytes_at_vaddr(&self, vaddr: u64, len: u64) -> Option<&'a [u8]> {
        for segment in self.load_segments() {
            if vaddr < segment.vaddr {
                continue;
            }
            let within = vaddr - segment.vaddr;
            if within.checked_add(len)? > segment.filesz {
                continue;
            }
            let start = usize::try_from(segment.offset.checked_add(within)?).ok()?;
            let end = start.checked_add(usize::try_from(len).ok()?)?;
            return self.data.get(start..end);
        }
        None
    }
}

fn parse_sections<'a>(
    data: &'a [u8],
    header: &FileHeader,
) -> Result<Vec<Section<'a>>, ElfError> {
    if header.shnum == 0 {
        return Ok(Vec::new());
    }
    let endian = header.endian;
    let class = header.class;
    let shoff = usize::try_from(header.shoff).map_err(|_| ElfError::Truncated)?;
    let entsize = usize::from(header.shentsize);

    // First pass: raw headers (name is still an index into .shstrtab).
    struct RawSection {
        name_off: u32,
        sh_type: u32,
        addr: u64,
        offset: u64,
        size: u64,
    }
    let mut raw = Vec::with_capacity(usize::from(header.shnum));
    for i in 0..usize::from(header.shnum) {
        let base = shoff + i * entsize;
        let (addr_off, offset_off, size_off) = match class {
            Class::Elf32 => (12, 16, 20),
            Class::Elf64 => (16, 24, 32),
        };
        raw.push(RawSection {
            name_off: endian.u32(data, base)?,
            sh_type: endian.u32(data, base + 4)?,
            addr: endian.word(class, data, base + addr_off)?,
            offset: endian.word(class, data, base + offset_off)?,
            size: endian.word(class, data, base + size_off)?,
        });
    }

    // Resolve names through the section name string table.
    let strtab = raw
        .get(usize::from(header.shstrndx))
        .ok_or(ElfError::Truncated)?;
    let str_start = usize::try_from(strtab.offset).map_err(|_| ElfError::Truncated)?;
    let str_end = str_start
        .checked_add(usize::try_from(strtab.size).map_err(|_| ElfError::Truncated)?)
        .ok_or(ElfError::Truncated)?;
    let strings = data.get(str_start..str_end).ok_or(ElfError::Truncated)?;

    let mut sections = Vec::with_capacity(raw.len());
    for section in &raw {
        let name_off = section.name_off as usize;
        let tail = strings.get(name_off..).ok_or(ElfError::Truncated)?;
        let nul = tail
            .iter()
            .position(|&b| b == 0)
            .ok_or(ElfError::Truncated)?;
        let name =
            core::str::from_utf8(&tail[..nul]).map_err(|_| ElfError::BadSectionName)?;
        sections.push(Section {
            name,
            sh_type: section.sh_type,
            addr: section.addr,
            offset: section.offset,
            size: section.size,
        });
    }
    Ok(sections)
}

fn parse_segments(data: &[u8], header: &FileHeader) -> Result<Vec<Segment>, ElfError> {
    if header.phnum == 0 {
        return Ok(Vec::new());
    }
    let endian = header.endian;
    let class = header.class;
    let phoff = usize::try_from(header.phoff).map_err(|_| ElfError::Truncated)?;
    let entsize = usize::from(header.phentsize);

    let mut segments = Vec::with_capacity(usize::from(header.phnum));
    for i in 0..usize::from(header.phnum) {
        let base = phoff + i * entsize;
        let p_type = endian.u32(data, base)?;
        // ELF64 inserts p_flags between p_type and p_offset.
        let segment = match class {
            Class::Elf32 => Segment {
                p_type,
                offset: endian.word(class, data, base + 4)?,
                vaddr: endian.word(class, data, base + 8)?,
                filesz: endian.word(class, data, base + 16)?,
                memsz: endian.word(class, data, base + 20)?,
            },
            Class::Elf64 => Segment {
                p_type,
                offset: endian.u64(data, base + 8)?,
                vaddr: endian.u64(data, base + 16)?,
                filesz: endian.u64(data, base + 32)?,
                memsz: endian.u64(data, base + 40)?,
            },
        };
        segments.push(segment);
    }
    Ok(segments)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Build a small ELF64 little-endian image with the given sections and
    /// one PT_LOAD segment mapping `seg_vaddr` to `seg_data`.
    pub(crate) fn make_elf64(
        sections: &[(&str, &[u8])],
        seg_vaddr: u64,
        seg_data: &[u8],
    ) -> Vec<u8> {
        let mut buf = vec![0u8; 64];
        buf[0..4].copy_from_slice(&header::ELF_MAGIC);
        buf[4] = 2; // ELFCLASS64
        buf[5] = 1; // ELFDATA2LSB
        buf[6] = 1; // EV_CURRENT

        // Program header table right after the file header.
        let phoff = buf.len();
        buf.resize(phoff + 56, 0);

        // Segment contents.
        let seg_offset = buf.len();
        buf.extend_from_slice(seg_data);

        // Section contents, remembering offsets.
        let mut placed = Vec::new();
        for (name, data) in sections {
            let offset = buf.len();
            buf.extend_from_slice(data);
            placed.push((*name, offset, data.len()));
        }

        // Section name string table.
        let mut shstrtab = vec![0u8];
        let mut name_offsets = Vec::new();
        for (name, _, _) in &placed {
            name_offsets.push(shstrtab.len());
            shstrtab.extend_from_slice(name.as_bytes());
            shstrtab.push(0);
        }
        let shstr_name_off = shstrtab.len();
        shstrtab.extend_from_slice(b".shstrtab\0");
        let shstrtab_offset = buf.len();
        buf.extend_from_slice(&shstrtab);

        // Section header table: null entry, user sections, .shstrtab.
        let shoff = buf.len();
        let shnum = placed.len() + 2;
        let mut write_shdr = |buf: &mut Vec<u8>, name_off: u32, offset: usize, size: usize| {
            let base = buf.len();
            buf.resize(base + 64, 0);
            buf[base..base + 4].copy_from_slice(&name_off.to_le_bytes());
            buf[base + 4..base + 8].copy_from_slice(&1u32.to_le_bytes()); // SHT_PROGBITS
            buf[base + 24..base + 32].copy_from_slice(&(offset as u64).to_le_bytes());
            buf[base + 32..base + 40].copy_from_slice(&(size as u64).to_le_bytes());
        };
        write_shdr(&mut buf, 0, 0, 0);
        for (i, (_, offset, size)) in placed.iter().enumerate() {
            write_shdr(&mut buf, name_offsets[i] as u32, *offset, *size);
        }
        write_shdr(&mut buf, shstr_name_off as u32, shstrtab_offset, shstrtab.len());

        // Fill in the program header (PT_LOAD).
        buf[phoff..phoff + 4].copy_from_slice(&PT_LOAD.to_le_bytes());
        buf[phoff + 8..phoff + 16].copy_from_slice(&(seg_offset as u64).to_le_bytes());
        buf[phoff + 16..phoff + 24].copy_from_slice(&seg_vaddr.to_le_bytes());
        buf[phoff + 32..phoff + 40].copy_from_slice(&(seg_data.len() as u64).to_le_bytes());
        buf[phoff + 40..phoff + 48].copy_from_slice(&(seg_data.len() as u64).to_le_bytes());

        // Fix up the file header tables.
        buf[32..40].copy_from_slice(&(phoff as u64).to_le_bytes());
        buf[40..48].copy_from_slice(&(shoff as u64).to_le_bytes());
        buf[54..56].copy_from_slice(&56u16.to_le_bytes()); // phentsize
        buf[56..58].copy_from_slice(&1u16.to_le_bytes()); // phnum
        buf[58..60].copy_from_slice(&64u16.to_le_bytes()); // shentsize
        buf[60..62].copy_from_slice(&(shnum as u16).to_le_bytes());
        buf[62..64].copy_from_slice(&((shnum - 1) as u16).to_le_bytes()); // shstrndx

        buf
    }

    #[test]
    fn parse_sections_by_name() {
        let image = make_elf64(&[(".debug_info", b"\x01\x02\x03")], 0, &[]);
        let elf = ElfFile::parse(&image).unwrap();
        assert_eq!(elf.class(), Class::Elf64);
        assert_eq!(elf.endian(), Endian::Little);
        assert_eq!(elf.section_data(".debug_info"), Some(&b"\x01\x02\x03"[..]));
        assert!(elf.section_data(".debug_abbrev").is_none());
    }

    #[test]
    fn load_segment_lookup() {
        let image = make_elf64(&[], 0x1000, b"\xaa\xbb\xcc\xdd");
        let elf = ElfFile::parse(&image).unwrap();
        assert_eq!(elf.load_segments().count(), 1);
        assert_eq!(
            elf.file_bytes_at_vaddr(0x1001, 2),
            Some(&b"\xbb\xcc"[..])
        );
        // Past the file image.
        assert!(elf.file_bytes_at_vaddr(0x1003, 2).is_none());
        // Below the segment.
        assert!(elf.file_bytes_at_vaddr(0xfff, 1).is_none());
    }

    #[test]
    fn truncated_input() {
        let image = make_elf64(&[], 0, &[]);
        assert_eq!(
            ElfFile::parse(&image[..40]).unwrap_err(),
            ElfError::Truncated
        );
    }
}
