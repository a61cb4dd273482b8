//! Compilation unit and DIE parsing.
//!
//! Each `.debug_info` unit is parsed eagerly into a flat, offset-ordered
//! vector of [`Die`]s with explicit child lists. Reference-form attribute
//! values are stored as absolute `.debug_info` offsets so they can be
//! resolved across units.

use crate::abbrev::AbbrevTable;
use crate::consts::*;
use crate::reader::{Reader, str_at};
use crate::{Dwarf, DwarfError};

/// A decoded attribute value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttrValue<'a> {
    /// A target address (`DW_FORM_addr`, resolved `addrx`).
    Addr(u64),
    /// An unsigned constant.
    Uint(u64),
    /// A signed constant (`DW_FORM_sdata`, `implicit_const`).
    Int(i64),
    /// A flag.
    Flag(bool),
    /// A string (inline or resolved through a string section).
    Str(&'a str),
    /// A byte block (`exprloc`, `block*`, `data16`).
    Bytes(&'a [u8]),
    /// A reference to another DIE, as an absolute `.debug_info` offset.
    Ref(usize),
    /// An unresolved `.debug_str_offsets` index (internal; resolved before
    /// the unit is returned).
    StrIndex(u64),
    /// An unresolved `.debug_addr` index (internal; resolved before the
    /// unit is returned).
    AddrIndex(u64),
}

impl AttrValue<'_> {
    /// The value as an unsigned integer, if it has one.
    #[must_use]
    pub fn as_uint(&self) -> Option<u64> {
        match *self {
            Self::Addr(v) | Self::Uint(v) => Some(v),
            Self::Int(v) => u64::try_from(v).ok(),
            Self::Flag(f) => Some(u64::from(f)),
            _ => None,
        }
    }

    /// The value as a signed integer, if it has one.
    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        match *self {
            Self::Int(v) => Some(v),
            Self::Addr(v) | Self::Uint(v) => i64::try_from(v).ok().or(Some(v as i64)),
            _ => None,
        }
    }

    /// The value as a string, if it is one.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match *self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }
}

/// A debugging information entry.
#[derive(Debug)]
pub struct Die<'a> {
    /// Absolute `.debug_info` offset of this DIE.
    pub offset: usize,
    /// `DW_TAG_*` code.
    pub tag: u64,
    /// Nesting depth; the compile-unit root is depth 0.
    pub depth: usize,
    /// Attributes in declaration order.
    pub attrs: Vec<(u64, AttrValue<'a>)>,
    /// Indices of child DIEs within the owning [`Unit`].
    pub children: Vec<usize>,
}

impl<'a> Die<'a> {
    /// Looks up an attribute value by `DW_AT_*` code.
    #[must_use]
    pub fn attr(&self, at: u64) -> Option<&AttrValue<'a>> {
        self.attrs.iter().find(|(a, _)| *a == at).map(|(_, v)| v)
    }

    /// The `DW_AT_name` string, if present.
    #[must_use]
    pub fn name(&self) -> Option<&'a str> {
        match self.attr(DW_AT_NAME) {
            Some(AttrValue::Str(s)) => Some(s),
            _ => None,
        }
    }

    /// An unsigned attribute value, if present.
    #[must_use]
    pub fn uint(&self, at: u64) -> Option<u64> {
        self.attr(at).and_then(AttrValue::as_uint)
    }

    /// The absolute offset referenced by `DW_AT_type`, if present.
    #[must_use]
    pub fn type_ref(&self) -> Option<usize> {
        match self.attr(DW_AT_TYPE) {
            Some(&AttrValue::Ref(offset)) => Some(offset),
            _ => None,
        }
    }
}

/// A parsed compilation unit.
#[derive(Debug)]
pub struct Unit<'a> {
    /// Absolute `.debug_info` offset of the unit header.
    pub offset: usize,
    /// One past the last `.debug_info` offset belonging to this unit.
    pub end: usize,
    /// DWARF version (4 or 5).
    pub version: u16,
    /// Size in bytes of a target address.
    pub address_size: u8,
    dies: Vec<Die<'a>>,
}

impl<'a> Unit<'a> {
    /// The compile-unit root DIE.
    #[must_use]
    pub fn root(&self) -> &Die<'a> {
        &self.dies[0]
    }

    /// All DIEs of the unit in offset order.
    #[must_use]
    pub fn dies(&self) -> &[Die<'a>] {
        &self.dies
    }

    /// The DIE at index `index` (as stored in [`Die::children`]).
    #[must_use]
    pub fn die(&self, index: usize) -> &Die<'a> {
        &self.dies[index]
    }

    /// Looks up a DIE by absolute `.debug_info` offset.
    #[must_use]
    pub fn die_at_offset(&self, offset: usize) -> Option<&Die<'a>> {
        self.dies
            .binary_search_by_key(&offset, |d| d.offset)
            .ok()
            .map(|i| &self.dies[i])
    }

    /// Returns `true` if `offset` falls within this unit.
    #[must_use]
    pub fn contains(&self, offset: usize) -> bool {
        (self.offset..self.end).contains(&offset)
    }

    /// Parse one unit starting at `offset` of `.debug_info`.
    pub(crate) fn parse(dwarf: &Dwarf<'a>, offset: usize) -> Result<Self, DwarfError> {
        let mut reader = Reader::new(dwarf.info, dwarf.endian);
        reader.seek(offset);

        let unit_length = reader.u32()?;
        if unit_length == 0xffff_ffff {
            return Err(DwarfError::Dwarf64Unsupported);
        }
        let end = reader
            .pos()
            .checked_add(unit_length as usize)
            .ok_or(DwarfError::Truncated)?;
        if end > dwarf.info.len() {
            return Err(DwarfError::Truncated);
        }

        let version = reader.u16()?;
        let (abbrev_offset, address_size) = match version {
            4 => {
                let abbrev_offset = reader.u32()? as usize;
                let address_size = reader.u8()?;
                (abbrev_offset, address_size)
            }
            5 => {
                let unit_type = reader.u8()?;
                if unit_type != DW_UT_COMPILE && unit_type != DW_UT_PARTIAL {
                    return Err(DwarfError::BadUnitType(unit_type));
                }
                let address_size = reader.u8()?;
                let abbrev_offset = reader.u32()? as usize;
                (abbrev_offset, address_size)
            }
            v => return Err(DwarfError::UnsupportedVersion(v)),
        };

        let abbrevs = AbbrevTable::parse(dwarf.abbrev, abbrev_offset, dwarf.endian)?;

        let mut dies: Vec<Die<'a>> = Vec::new();
        let mut parents: Vec<usize> = Vec::new();
        while reader.pos() < end {
            let die_offset = reader.pos();
            let code = reader.uleb()?;
            if code == 0 {
                // Null entry: end of the current sibling chain.
                if parents.pop().is_none() {
                    break;
                }
                continue;
            }
            let abbrev = abbrevs
                .get(code)
                .ok_or(DwarfError::BadAbbrevCode(code))?;

            let mut attrs = Vec::with_capacity(abbrev.attrs.len());
            for spec in &abbrev.attrs {
                let value = decode_form(
                    dwarf,
                    &mut reader,
                    spec.form,
                    spec.implicit_const,
                    address_size,
                    offset,
                )?;
                attrs.push((spec.at, value));
            }

            let index = dies.len();
            if let Some(&parent) = parents.last() {
                dies[parent].children.push(index);
            }
            dies.push(Die {
                offset: die_offset,
                tag: abbrev.tag,
                depth: parents.len(),
                attrs,
                children: Vec::new(),
            });
            if abbrev.has_children {
                parents.push(index);
            }
        }

        if dies.is_empty() || dies[0].tag != DW_TAG_COMPILE_UNIT {
            return Err(DwarfError::MissingCompileUnit);
        }

        let mut unit = Self {
            offset,
            end,
            version,
            address_size,
            dies,
        };
        unit.resolve_indexed_values(dwarf)?;
        Ok(unit)
    }

    /// Resolve `strx`/`addrx` attribute values through `.debug_str_offsets`
    /// and `.debug_addr`, using the bases announced on the root DIE (or the
    /// DWARF32 defaults of 8 when absent).
    fn resolve_indexed_values(&mut self, dwarf: &Dwarf<'a>) -> Result<(), DwarfError> {
        let str_offsets_base = self
            .root()
            .uint(DW_AT_STR_OFFSETS_BASE)
            .unwrap_or(8) as usize;
        let addr_base = self.root().uint(DW_AT_ADDR_BASE).unwrap_or(8) as usize;
        let address_size = usize::from(self.address_size);

        for die in &mut self.dies {
            for (_, value) in &mut die.attrs {
                match *value {
                    AttrValue::StrIndex(index) => {
                        let section = dwarf
                            .str_offsets
                            .ok_or(DwarfError::MissingSection(".debug_str_offsets"))?;
                        let entry = str_offsets_base + index as usize * 4;
                        let offset = dwarf
                            .endian
                            .u32(section, entry)
                            .map_err(|_| DwarfError::Truncated)?;
                        let strings = dwarf
                            .str_
                            .ok_or(DwarfError::MissingSection(".debug_str"))?;
                        *value = AttrValue::Str(str_at(strings, offset as usize)?);
                    }
                    AttrValue::AddrIndex(index) => {
                        let section = dwarf
                            .addr
                            .ok_or(DwarfError::MissingSection(".debug_addr"))?;
                        let entry = addr_base + index as usize * address_size;
                        let mut reader = Reader::new(section, dwarf.endian);
                        reader.seek(entry);
                        *value = AttrValue::Addr(reader.uint(address_size)?);
                    }
                    _ => {}
                }
            }
        }
        Ok(())
    }
}

/// Decode one attribute value of the given form.
fn decode_form<'a>(
    dwarf: &Dwarf<'a>,
    reader: &mut Reader<'a>,
    form: u64,
    implicit_const: i64,
    address_size: u8,
    unit_offset: usize,
) -> Result<AttrValue<'a>, DwarfError> {
    let mut form = form;
    loop {
        return Ok(match form {
            DW_FORM_ADDR => AttrValue::Addr(reader.uint(usize::from(address_size))?),
            DW_FORM_DATA1 => AttrValue::Uint(u64::from(reader.u8()?)),
            DW_FORM_DATA2 => AttrValue::Uint(u64::from(reader.u16()?)),
            DW_FORM_DATA4 => AttrValue::Uint(u64::from(reader.u32()?)),
            DW_FORM_DATA8 => AttrValue::Uint(reader.u64()?),
            DW_FORM_DATA16 => AttrValue::Bytes(reader.bytes(16)?),
            DW_FORM_UDATA => AttrValue::Uint(reader.uleb()?),
            DW_FORM_SDATA => AttrValue::Int(reader.sleb()?),
            DW_FORM_IMPLICIT_CONST => AttrValue::Int(implicit_const),
            DW_FORM_FLAG => AttrValue::Flag(reader.u8()? != 0),
            DW_FORM_FLAG_PRESENT => AttrValue::Flag(true),
            DW_FORM_STRING => AttrValue::Str(reader.nul_str()?),
            DW_FORM_STRP => {
                let offset = reader.u32()? as usize;
                let strings = dwarf
                    .str_
                    .ok_or(DwarfError::MissingSection(".debug_str"))?;
                AttrValue::Str(str_at(strings, offset)?)
            }
            DW_FORM_LINE_STRP => {
                let offset = reader.u32()? as usize;
                let strings = dwarf
                    .line_str
                    .ok_or(DwarfError::MissingSection(".debug_line_str"))?;
                AttrValue::Str(str_at(strings, offset)?)
            }
            DW_FORM_STRX => AttrValue::StrIndex(reader.uleb()?),
            DW_FORM_STRX1 => AttrValue::StrIndex(u64::from(reader.u8()?)),
            DW_FORM_STRX2 => AttrValue::StrIndex(u64::from(reader.u16()?)),
            DW_FORM_STRX3 => AttrValue::StrIndex(reader.uint(3)?),
            DW_FORM_STRX4 => AttrValue::StrIndex(u64::from(reader.u32()?)),
            DW_FORM_ADDRX => AttrValue::AddrIndex(reader.uleb()?),
            DW_FORM_ADDRX1 => AttrValue::AddrIndex(u64::from(reader.u8()?)),
            DW_FORM_ADDRX2 => AttrValue::AddrIndex(u64::from(reader.u16()?)),
            DW_FORM_ADDRX3 => AttrValue::AddrIndex(reader.uint(3)?),
            DW_FORM_ADDRX4 => AttrValue::AddrIndex(u64::from(reader.u32()?)),
            DW_FORM_REF1 => AttrValue::Ref(unit_offset + reader.u8()? as usize),
            DW_FORM_REF2 => AttrValue::Ref(unit_offset + reader.u16()? as usize),
            DW_FORM_REF4 => AttrValue::Ref(unit_offset + reader.u32()? as usize),
            DW_FORM_REF8 => AttrValue::Ref(unit_offset + reader.u64()? as usize),
            DW_FORM_REF_UDATA => AttrValue::Ref(unit_offset + reader.uleb()? as usize),
            DW_FORM_REF_ADDR => AttrValue::Ref(reader.u32()? as usize),
            DW_FORM_REF_SIG8 => AttrValue::Uint(reader.u64()?),
            DW_FORM_SEC_OFFSET => AttrValue::Uint(u64::from(reader.u32()?)),
            DW_FORM_LOCLISTX | DW_FORM_RNGLISTX => AttrValue::Uint(reader.uleb()?),
            DW_FORM_EXPRLOC => {
                let len = reader.uleb()? as usize;
                AttrValue::Bytes(reader.bytes(len)?)
            }
            DW_FORM_BLOCK1 => {
                let len = reader.u8()? as usize;
                AttrValue::Bytes(reader.bytes(len)?)
            }
            DW_FORM_BLOCK2 => {
                let len = reader.u16()? as usize;
                AttrValue::Bytes(reader.bytes(len)?)
            }
            DW_FORM_BLOCK4 => {
                let len = reader.u32()? as usize;
                AttrValue::Bytes(reader.bytes(len)?)
            }
            DW_FORM_BLOCK => {
                let len = reader.uleb()? as usize;
                AttrValue::Bytes(reader.bytes(len)?)
            }
            DW_FORM_INDIRECT => {
                form = reader.uleb()?;
                continue;
            }
            other => return Err(DwarfError::UnknownForm(other)),
        });
    }
}
