//! Minimal DWARF `.debug_info` reader for the tether host tools.
//!
//! Parses compilation units and their DIE trees into an offset-indexed
//! in-memory form, resolving strings through `.debug_str`,
//! `.debug_line_str`, and `.debug_str_offsets`, and addresses through
//! `.debug_addr`. Supports DWARF versions 4 and 5 (DWARF32 only) — enough
//! to recover the C type and symbol information of a compiled target.
//!
//! Line programs, location lists, and range lists are out of scope; the
//! only location expression honored by consumers is a bare `DW_OP_addr`.

pub mod consts;

mod abbrev;
mod reader;
mod unit;

pub use abbrev::{Abbrev, AbbrevTable, AttrSpec};
pub use unit::{AttrValue, Die, Unit};

use core::fmt;

use tether_elf::{ElfFile, Endian};

/// Errors produced while parsing DWARF data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DwarfError {
    /// The input data is too short for the declared structure.
    Truncated,
    /// An unsupported DWARF version was encountered.
    UnsupportedVersion(u16),
    /// 64-bit DWARF is not supported.
    Dwarf64Unsupported,
    /// A DIE references an abbreviation code missing from its table.
    BadAbbrevCode(u64),
    /// An attribute uses a form this reader does not implement.
    UnknownForm(u64),
    /// A DWARF 5 unit header carries an unexpected unit type.
    BadUnitType(u8),
    /// A unit contains no compile-unit root DIE.
    MissingCompileUnit,
    /// A string is not valid UTF-8.
    InvalidUtf8,
    /// A LEB128 value does not fit in 64 bits.
    LebOverflow,
    /// A required section is absent from the image.
    MissingSection(&'static str),
}

impl fmt::Display for DwarfError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Truncated => write!(f, "DWARF data truncated"),
            Self::UnsupportedVersion(v) => write!(f, "unsupported DWARF version {v}"),
            Self::Dwarf64Unsupported => write!(f, "64-bit DWARF is not supported"),
            Self::BadAbbrevCode(code) => write!(f, "unknown abbreviation code {code}"),
            Self::UnknownForm(form) => write!(f, "unsupported attribute form {form:#x}"),
            Self::BadUnitType(t) => write!(f, "unexpected unit type {t:#x}"),
            Self::MissingCompileUnit => write!(f, "unit has no compile-unit DIE"),
            Self::InvalidUtf8 => write!(f, "invalid UTF-8 in DWARF data"),
            Self::LebOverflow => write!(f, "LEB128 value overflows 64 bits"),
            Self::MissingSection(name) => write!(f, "missing section {name}"),
        }
    }
}

impl std::error::Error for DwarfError {}

/// The DWARF sections of one ELF image.
pub struct Dwarf<'a> {
    pub(crate) info: &'a [u8],
    pub(crate) abbrev: &'a [u8],
    pub(crate) str_: Option<&'a [u8]>,
    pub(crate) line_str: Option<&'a [u8]>,
    pub(crate) str_offsets: Option<&'a [u8]>,
    pub(crate) addr: Option<&'a [u8]>,
    pub(crate) endian: Endian,
}

impl<'a> Dwarf<'a> {
    /// Collects the DWARF sections from a parsed ELF image.
    ///
    /// # Errors
    ///
    /// Returns [`DwarfError::MissingSection`] when `.debug_info` or
    /// `.debug_abbrev` is absent — an image without debug info cannot be
    /// used at all.
    pub fn load(elf: &ElfFile<'a>) -> Result<Self, DwarfError> {
        let info = elf
            .section_data(".debug_info")
            .ok_or(DwarfError::MissingSection(".debug_info"))?;
        let abbrev = elf
            .section_data(".debug_abbrev")
            .ok_or(DwarfError::MissingSection(".debug_abbrev"))?;
        Ok(Self {
            info,
            abbrev,
            str_: elf.section_data(".debug_str"),
            line_str: elf.section_data(".debug_line_str"),
            str_offsets: elf.section_data(".debug_str_offsets"),
            addr: elf.section_data(".debug_addr"),
            endian: elf.endian(),
        })
    }

    /// Builds a `Dwarf` directly from section slices.
    #[must_use]
    #[allow(clippy::similar_names, reason = "section names are what they are")]
    pub fn from_sections(
        info: &'a [u8],
        abbrev: &'a [u8],
        str_: Option<&'a [u8]>,
        line_str: Option<&'a [u8]>,
        str_offsets: Option<&'a [u8]>,
        addr: Option<&'a [u8]>,
        endian: Endian,
    ) -> Self {
        Self {
            info,
            abbrev,
            str_,
            line_str,
            str_offsets,
            addr,
            endian,
        }
    }

    /// Byte order of the image.
    #[must_use]
    pub fn endian(&self) -> Endian {
        self.endian
    }

    /// Parses every compilation unit in `.debug_info`.
    ///
    /// # Errors
    ///
    /// Propagates the first parse error; a malformed unit poisons the whole
    /// read (callers wanting tolerance filter per-DIE, not per-unit).
    pub fn units(&self) -> Result<Vec<Unit<'a>>, DwarfError> {
        let mut units = Vec::new();
        let mut offset = 0usize;
        while offset < self.info.len() {
            let unit = Unit::parse(self, offset)?;
            offset = unit.end;
            units.push(unit);
        }
        Ok(units)
    }
}
