//! `.debug_abbrev` table parsing.
//!
//! Each compilation unit points at an abbreviation table that gives, per
//! abbreviation code, the DIE tag, whether the DIE has children, and the
//! ordered list of (attribute, form) pairs its data follows.

use std::collections::HashMap;

use tether_elf::Endian;

use crate::DwarfError;
use crate::consts::DW_FORM_IMPLICIT_CONST;
use crate::reader::Reader;

/// One attribute specification within an abbreviation.
#[derive(Debug, Clone, Copy)]
pub struct AttrSpec {
    /// `DW_AT_*` code.
    pub at: u64,
    /// `DW_FORM_*` code.
    pub form: u64,
    /// Constant value carried by `DW_FORM_implicit_const`.
    pub implicit_const: i64,
}

/// A single abbreviation declaration.
#[derive(Debug, Clone)]
pub struct Abbrev {
    /// `DW_TAG_*` code.
    pub tag: u64,
    /// Whether DIEs using this abbreviation own children.
    pub has_children: bool,
    /// Attribute specifications in data order.
    pub attrs: Vec<AttrSpec>,
}

/// The abbreviation table of one compilation unit, keyed by code.
#[derive(Debug, Default)]
pub struct AbbrevTable {
    by_code: HashMap<u64, Abbrev>,
}

impl AbbrevTable {
    /// Parse the table starting at `offset` of `.debug_abbrev`.
    ///
    /// # Errors
    ///
    /// Returns [`DwarfError::Truncated`] when a declaration runs past the
    /// end of the section.
    pub fn parse(abbrev: &[u8], offset: usize, endian: Endian) -> Result<Self, DwarfError> {
        let mut reader = Reader::new(abbrev, endian);
        reader.seek(offset);

        let mut by_code = HashMap::new();
        loop {
            let code = reader.uleb()?;
            if code == 0 {
                break; // end of table
            }
            let tag = reader.uleb()?;
            let has_children = reader.u8()? != 0;

            let mut attrs = Vec::new();
            loop {
                let at = reader.uleb()?;
                let form = reader.uleb()?;
                if at == 0 && form == 0 {
                    break;
                }
                let implicit_const = if form == DW_FORM_IMPLICIT_CONST {
                    reader.sleb()?
                } else {
                    0
                };
                attrs.push(AttrSpec {
                    at,
                    form,
                    implicit_const,
                });
            }
            by_code.insert(
                code,
                Abbrev {
                    tag,
                    has_children,
                    attrs,
                },
            );
        }
        Ok(Self { by_code })
    }

    /// Looks up an abbreviation by code.
    #[must_use]
    pub fn get(&self, code: u64) -> Option<&Abbrev> {
        self.by_code.get(&code)
    }
}
