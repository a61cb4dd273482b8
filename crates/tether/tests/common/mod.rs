#![allow(dead_code, reason = "shared between test binaries with different needs")]

//! Test support: build tiny ELF images with hand-assembled DWARF v4 data.
//!
//! Tests describe a DIE tree with [`DieSpec`]; the builder assigns one
//! abbreviation per DIE, serializes `.debug_info`/`.debug_abbrev`, patches
//! label references, and wraps the sections into a minimal ELF64
//! little-endian image (optionally with one `PT_LOAD` segment for
//! const-harvesting tests).

use std::collections::HashMap;

// DWARF constants, duplicated here so the builder reads standalone.
pub const DW_TAG_ARRAY_TYPE: u64 = 0x01;
pub const DW_TAG_ENUMERATION_TYPE: u64 = 0x04;
pub const DW_TAG_FORMAL_PARAMETER: u64 = 0x05;
pub const DW_TAG_MEMBER: u64 = 0x0d;
pub const DW_TAG_POINTER_TYPE: u64 = 0x0f;
pub const DW_TAG_COMPILE_UNIT: u64 = 0x11;
pub const DW_TAG_STRUCTURE_TYPE: u64 = 0x13;
pub const DW_TAG_TYPEDEF: u64 = 0x16;
pub const DW_TAG_UNION_TYPE: u64 = 0x17;
pub const DW_TAG_SUBRANGE_TYPE: u64 = 0x21;
pub const DW_TAG_BASE_TYPE: u64 = 0x24;
pub const DW_TAG_CONST_TYPE: u64 = 0x26;
pub const DW_TAG_ENUMERATOR: u64 = 0x28;
pub const DW_TAG_SUBPROGRAM: u64 = 0x2e;
pub const DW_TAG_VARIABLE: u64 = 0x34;

pub const DW_AT_LOCATION: u64 = 0x02;
pub const DW_AT_NAME: u64 = 0x03;
pub const DW_AT_BYTE_SIZE: u64 = 0x0b;
pub const DW_AT_LOW_PC: u64 = 0x11;
pub const DW_AT_CONST_VALUE: u64 = 0x1c;
pub const DW_AT_UPPER_BOUND: u64 = 0x2f;
pub const DW_AT_DATA_MEMBER_LOCATION: u64 = 0x38;
pub const DW_AT_DECLARATION: u64 = 0x3c;
pub const DW_AT_ENCODING: u64 = 0x3e;
pub const DW_AT_TYPE: u64 = 0x49;

pub const DW_ATE_FLOAT: u64 = 0x04;
pub const DW_ATE_SIGNED: u64 = 0x05;
pub const DW_ATE_SIGNED_CHAR: u64 = 0x06;
pub const DW_ATE_UNSIGNED: u64 = 0x07;
pub const DW_ATE_UNSIGNED_CHAR: u64 = 0x08;

const DW_FORM_ADDR: u8 = 0x01;
const DW_FORM_DATA4: u8 = 0x06;
const DW_FORM_DATA8: u8 = 0x07;
const DW_FORM_STRING: u8 = 0x08;
const DW_FORM_DATA1: u8 = 0x0b;
const DW_FORM_FLAG: u8 = 0x0c;
const DW_FORM_SDATA: u8 = 0x0d;
const DW_FORM_REF4: u8 = 0x13;
const DW_FORM_EXPRLOC: u8 = 0x18;

const DW_OP_ADDR: u8 = 0x03;

/// An attribute value with its wire form implied.
pub enum AttrVal {
    U8(u8),
    U32(u32),
    U64(u64),
    Sdata(i64),
    Str(String),
    Addr(u64),
    /// Reference to the [`DieSpec::label`] of another DIE.
    Ref(u32),
    Exprloc(Vec<u8>),
    Flag(bool),
}

/// A DIE to serialize, with children.
pub struct DieSpec {
    pub tag: u64,
    pub label: Option<u32>,
    pub attrs: Vec<(u64, AttrVal)>,
    pub children: Vec<DieSpec>,
}

/// Starts a DIE description.
pub fn die(tag: u64) -> DieSpec {
    DieSpec {
        tag,
        label: None,
        attrs: Vec::new(),
        children: Vec::new(),
    }
}

impl DieSpec {
    /// Tags this DIE so other DIEs can reference it.
    pub fn label(mut self, label: u32) -> Self {
        self.label = Some(label);
        self
    }

    pub fn attr(mut self, at: u64, val: AttrVal) -> Self {
        self.attrs.push((at, val));
        self
    }

    pub fn name(self, name: &str) -> Self {
        self.attr(DW_AT_NAME, AttrVal::Str(name.into()))
    }

    pub fn byte_size(self, size: u32) -> Self {
        self.attr(DW_AT_BYTE_SIZE, AttrVal::U32(size))
    }

    pub fn encoding(self, encoding: u64) -> Self {
        self.attr(DW_AT_ENCODING, AttrVal::U8(encoding as u8))
    }

    pub fn type_ref(self, label: u32) -> Self {
        self.attr(DW_AT_TYPE, AttrVal::Ref(label))
    }

    /// A `DW_AT_location` of `DW_OP_addr <addr>` (8-byte address).
    pub fn location(self, addr: u64) -> Self {
        let mut expr = vec![DW_OP_ADDR];
        expr.extend_from_slice(&addr.to_le_bytes());
        self.attr(DW_AT_LOCATION, AttrVal::Exprloc(expr))
    }

    pub fn child(mut self, spec: DieSpec) -> Self {
        self.children.push(spec);
        self
    }
}

/// A shorthand for a named base type.
pub fn base_type(name: &str, size: u32, encoding: u64) -> DieSpec {
    die(DW_TAG_BASE_TYPE)
        .name(name)
        .byte_size(size)
        .encoding(encoding)
}

/// A shorthand for a named typedef of a labelled type.
pub fn typedef(name: &str, of: u32) -> DieSpec {
    die(DW_TAG_TYPEDEF).name(name).type_ref(of)
}

/// A shorthand for a struct member at a byte offset.
pub fn member(name: &str, ty: u32, offset: u32) -> DieSpec {
    die(DW_TAG_MEMBER)
        .name(name)
        .type_ref(ty)
        .attr(DW_AT_DATA_MEMBER_LOCATION, AttrVal::U32(offset))
}

// ---------------------------------------------------------------------------
// Serialization
// ---------------------------------------------------------------------------

/// DWARF v4, DWARF32, 8-byte addresses: 11-byte unit header.
const UNIT_HEADER_LEN: usize = 11;

struct Serializer {
    abbrev: Vec<u8>,
    body: Vec<u8>,
    next_code: u8,
    labels: HashMap<u32, u32>,
    patches: Vec<(usize, u32)>,
}

impl Serializer {
    fn emit(&mut self, spec: &DieSpec) {
        if let Some(label) = spec.label {
            self.labels
                .insert(label, (UNIT_HEADER_LEN + self.body.len()) as u32);
        }

        let code = self.next_code;
        assert!(code < 0x80, "too many DIEs for the single-byte abbrev path");
        self.next_code += 1;

        // Abbreviation declaration mirroring exactly this DIE's attributes.
        self.abbrev.push(code);
        assert!(spec.tag < 0x80);
        self.abbrev.push(spec.tag as u8);
        self.abbrev.push(u8::from(!spec.children.is_empty()));
        for (at, val) in &spec.attrs {
            assert!(*at < 0x80);
            self.abbrev.push(*at as u8);
            self.abbrev.push(form_of(val));
        }
        self.abbrev.extend_from_slice(&[0, 0]);

        // DIE data.
        self.body.push(code);
        for (_, val) in &spec.attrs {
            match val {
                AttrVal::U8(v) => self.body.push(*v),
                AttrVal::U32(v) => self.body.extend_from_slice(&v.to_le_bytes()),
                AttrVal::U64(v) => self.body.extend_from_slice(&v.to_le_bytes()),
                AttrVal::Sdata(v) => push_sleb(&mut self.body, *v),
                AttrVal::Str(s) => {
                    self.body.extend_from_slice(s.as_bytes());
                    self.body.push(0);
                }
                AttrVal::Addr(v) => self.body.extend_from_slice(&v.to_le_bytes()),
                AttrVal::Ref(label) => {
                    self.patches.push((self.body.len(), *label));
                    self.body.extend_from_slice(&[0; 4]);
                }
                AttrVal::Exprloc(expr) => {
                    assert!(expr.len() < 0x80);
                    self.body.push(expr.len() as u8);
                    self.body.extend_from_slice(expr);
                }
                AttrVal::Flag(f) => self.body.push(u8::from(*f)),
            }
        }

        if !spec.children.is_empty() {
            for child in &spec.children {
                self.emit(child);
            }
            self.body.push(0); // end of children
        }
    }
}

fn form_of(val: &AttrVal) -> u8 {
    match val {
        AttrVal::U8(_) => DW_FORM_DATA1,
        AttrVal::U32(_) => DW_FORM_DATA4,
        AttrVal::U64(_) => DW_FORM_DATA8,
        AttrVal::Sdata(_) => DW_FORM_SDATA,
        AttrVal::Str(_) => DW_FORM_STRING,
        AttrVal::Addr(_) => DW_FORM_ADDR,
        AttrVal::Ref(_) => DW_FORM_REF4,
        AttrVal::Exprloc(_) => DW_FORM_EXPRLOC,
        AttrVal::Flag(_) => DW_FORM_FLAG,
    }
}

fn push_sleb(out: &mut Vec<u8>, mut value: i64) {
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        let done = (value == 0 && byte & 0x40 == 0) || (value == -1 && byte & 0x40 != 0);
        out.push(if done { byte } else { byte | 0x80 });
        if done {
            break;
        }
    }
}

/// Serializes a compile unit (the root must be `DW_TAG_compile_unit`).
pub fn build_unit(root: &DieSpec) -> (Vec<u8>, Vec<u8>) {
    assert_eq!(root.tag, DW_TAG_COMPILE_UNIT);
    let mut ser = Serializer {
        abbrev: Vec::new(),
        body: Vec::new(),
        next_code: 1,
        labels: HashMap::new(),
        patches: Vec::new(),
    };
    ser.emit(root);
    ser.abbrev.push(0); // end of abbreviation table

    for (pos, label) in &ser.patches {
        let offset = ser.labels[label];
        ser.body[*pos..pos + 4].copy_from_slice(&offset.to_le_bytes());
    }

    let mut info = Vec::new();
    // unit_length counts everything after itself.
    info.extend_from_slice(&((UNIT_HEADER_LEN - 4 + ser.body.len()) as u32).to_le_bytes());
    info.extend_from_slice(&4u16.to_le_bytes()); // version
    info.extend_from_slice(&0u32.to_le_bytes()); // abbrev offset
    info.push(8); // address size
    info.extend_from_slice(&ser.body);
    (info, ser.abbrev)
}

// ---------------------------------------------------------------------------
// ELF wrapping
// ---------------------------------------------------------------------------

/// Wraps `.debug_info`/`.debug_abbrev` plus optional loadable segments into
/// an ELF64 little-endian image.
pub fn build_elf(root: &DieSpec, segments: &[(u64, Vec<u8>)]) -> Vec<u8> {
    let (info, abbrev) = build_unit(root);

    let mut buf = vec![0u8; 64];
    buf[0..4].copy_from_slice(&[0x7f, b'E', b'L', b'F']);
    buf[4] = 2; // ELFCLASS64
    buf[5] = 1; // ELFDATA2LSB
    buf[6] = 1;

    // Program headers.
    let phoff = buf.len();
    buf.resize(phoff + 56 * segments.len(), 0);

    // Segment images.
    let mut seg_offsets = Vec::new();
    for (_, data) in segments {
        seg_offsets.push(buf.len());
        buf.extend_from_slice(data);
    }

    // Section contents.
    let sections: Vec<(&str, &[u8])> =
        vec![(".debug_info", &info), (".debug_abbrev", &abbrev)];
    let mut placed = Vec::new();
    for (name, data) in &sections {
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

    // Section header table.
    let shoff = buf.len();
    let shnum = placed.len() + 2;
    let mut write_shdr = |buf: &mut Vec<u8>, name_off: u32, offset: usize, size: usize| {
        let base = buf.len();
        buf.resize(base + 64, 0);
        buf[base..base + 4].copy_from_slice(&name_off.to_le_bytes());
        buf[base + 4..base + 8].copy_from_slice(&1u32.to_le_bytes());
        buf[base + 24..base + 32].copy_from_slice(&(offset as u64).to_le_bytes());
        buf[base + 32..base + 40].copy_from_slice(&(size as u64).to_le_bytes());
    };
    write_shdr(&mut buf, 0, 0, 0);
    for (i, (_, offset, size)) in placed.iter().enumerate() {
        write_shdr(&mut buf, name_offsets[i] as u32, *offset, *size);
    }
    write_shdr(&mut buf, shstr_name_off as u32, shstrtab_offset, shstrtab.len());

    // Program headers (PT_LOAD each).
    for (i, (vaddr, data)) in segments.iter().enumerate() {
        let base = phoff + 56 * i;
        buf[base..base + 4].copy_from_slice(&1u32.to_le_bytes());
        buf[base + 8..base + 16].copy_from_slice(&(seg_offsets[i] as u64).to_le_bytes());
        buf[base + 16..base + 24].copy_from_slice(&vaddr.to_le_bytes());
        buf[base + 32..base + 40].copy_from_slice(&(data.len() as u64).to_le_bytes());
        buf[base + 40..base + 48].copy_from_slice(&(data.len() as u64).to_le_bytes());
    }

    // File header tables.
    buf[32..40].copy_from_slice(&(phoff as u64).to_le_bytes());
    buf[40..48].copy_from_slice(&(shoff as u64).to_le_bytes());
    buf[54..56].copy_from_slice(&56u16.to_le_bytes());
    buf[56..58].copy_from_slice(&(segments.len() as u16).to_le_bytes());
    buf[58..60].copy_from_slice(&64u16.to_le_bytes());
    buf[60..62].copy_from_slice(&(shnum as u16).to_le_bytes());
    buf[62..64].copy_from_slice(&((shnum - 1) as u16).to_le_bytes());

    buf
}
