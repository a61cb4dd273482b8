//! The C type graph recovered from a target's DWARF debug info.
//!
//! A process-wide dictionary mapping canonical type names (`"unsigned
//! int"`, `"struct foo"`, `"uint8_t *"`, `"uint32_t [10]"`) to type nodes,
//! plus a flat enumerator table, the target byte order, and the target
//! pointer width. Nodes live in an arena indexed by [`TypeId`]; the
//! dictionary owns them and everything else borrows.
//!
//! Construction walks every compilation unit at depth 1, dispatching on the
//! DIE tag. Structs are registered *before* their members are walked so a
//! linked list's pointer-to-self resolves to the node under construction
//! instead of recursing forever. A second observation of a name merges
//! into the existing node, filling only fields that were still unresolved.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::rc::Rc;

use tether_dwarf::consts::*;
use tether_dwarf::{AttrValue, Die, Dwarf, Unit};
use tether_elf::ElfFile;
pub use tether_elf::Endian;

use crate::error::{Error, Result};

/// Index of a node within a [`TypeGraph`].
pub type TypeId = usize;

/// Sentinel for an unknown or incomplete size or length.
pub const UNSIZED: i64 = -1;

/// One struct or union member, in declaration order.
#[derive(Debug, Clone)]
pub struct Member {
    /// Member name.
    pub name: String,
    /// Byte offset from the start of the aggregate (zero for union members).
    pub offset: u64,
    /// Member type.
    pub ty: TypeId,
}

/// What a type node is, as a tagged sum.
#[derive(Debug, Clone)]
pub enum TypeKind {
    /// The `void` sentinel.
    Void,
    /// An integer (including `char` and `_Bool`).
    Int {
        /// Whether the type is signed.
        signed: bool,
    },
    /// A floating-point type. Tracked for size accounting only; marshalling
    /// floats is not implemented.
    Float,
    /// A pointer.
    Pointer {
        /// The pointee type.
        base: TypeId,
    },
    /// An array.
    Array {
        /// The element type.
        base: TypeId,
        /// Element count, or [`UNSIZED`] for unsized declarations.
        length: i64,
    },
    /// A struct.
    Struct {
        /// Members in declaration order.
        members: Vec<Member>,
    },
    /// A union. Member offsets are all zero.
    Union {
        /// Members in declaration order.
        members: Vec<Member>,
    },
    /// A named target variable.
    Variable {
        /// The variable's declared type.
        ty: TypeId,
        /// Absolute target address; `None` until an extern is resolved.
        address: Option<u64>,
        /// Initializer bytes harvested from a loadable segment, for
        /// constants readable without touching the link.
        data: Option<Rc<Vec<u8>>>,
    },
    /// A named target function.
    Function {
        /// Return type; `None` for `void`.
        return_type: Option<TypeId>,
        /// Formal parameter types in order.
        arguments: Vec<TypeId>,
        /// Entry address.
        address: Option<u64>,
    },
}

impl TypeKind {
    /// A short lowercase name of the kind, for display.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Void => "void",
            Self::Int { .. } => "int",
            Self::Float => "float",
            Self::Pointer { .. } => "pointer",
            Self::Array { .. } => "array",
            Self::Struct { .. } => "struct",
            Self::Union { .. } => "union",
            Self::Variable { .. } => "variable",
            Self::Function { .. } => "function",
        }
    }
}

/// A node of the type graph.
#[derive(Debug, Clone)]
pub struct TypeNode {
    /// The canonical name (dictionary key), or `"?"` for anonymous types.
    pub typename: String,
    /// Size in bytes, or [`UNSIZED`].
    pub size: i64,
    /// The node's payload.
    pub kind: TypeKind,
}

/// Name placeholder for types that have none.
const ANON: &str = "?";

/// The type dictionary of one target image (possibly merged from several).
pub struct TypeGraph {
    nodes: Vec<TypeNode>,
    by_name: BTreeMap<String, TypeId>,
    /// Enumerator values, flat across all enums.
    pub enums: BTreeMap<String, i64>,
    /// Byte order of target data.
    pub endian: Endian,
    /// Target pointer width in bytes (`sizeof(void *)`).
    pub word_size: usize,
    /// Skip malformed DIEs instead of failing the whole load.
    pub tolerant: bool,
    void_id: TypeId,
}

impl TypeGraph {
    fn empty() -> Self {
        let mut graph = Self {
            nodes: Vec::new(),
            by_name: BTreeMap::new(),
            enums: BTreeMap::new(),
            endian: Endian::Little,
            word_size: 8,
            tolerant: false,
            void_id: 0,
        };
        graph.void_id = graph.intern(TypeNode {
            typename: "void".into(),
            size: UNSIZED,
            kind: TypeKind::Void,
        });
        graph
    }

    /// Loads the type graph from an ELF file on disk.
    ///
    /// # Errors
    ///
    /// I/O, ELF, and DWARF errors, plus [`Error::Unimplemented`] for DWARF
    /// constructs outside the supported subset (unless `tolerant`).
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        Self::from_elf_bytes(&bytes)
    }

    /// Loads the graph, keeping only compilation units accepted by `filter`
    /// (called with the unit's source path).
    ///
    /// # Errors
    ///
    /// See [`TypeGraph::load`].
    pub fn load_with_filter(path: &Path, filter: impl Fn(&str) -> bool) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        let mut graph = Self::empty();
        graph.build(&bytes, Some(&filter))?;
        Ok(graph)
    }

    /// Builds the graph from an in-memory ELF image.
    ///
    /// # Errors
    ///
    /// See [`TypeGraph::load`].
    pub fn from_elf_bytes(bytes: &[u8]) -> Result<Self> {
        let mut graph = Self::empty();
        graph.build(bytes, None)?;
        Ok(graph)
    }

    /// Merges a second ELF image into the graph, resolving externs.
    ///
    /// Already-resolved fields are never overwritten; unresolved addresses,
    /// sizes, lengths, and const data are filled in.
    ///
    /// # Errors
    ///
    /// See [`TypeGraph::load`].
    pub fn merge_file(&mut self, path: &Path) -> Result<()> {
        let bytes = std::fs::read(path)?;
        self.merge_elf_bytes(&bytes)
    }

    /// Merges an in-memory ELF image into the graph. See
    /// [`TypeGraph::merge_file`].
    ///
    /// # Errors
    ///
    /// See [`TypeGraph::load`].
    pub fn merge_elf_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.build(bytes, None)
    }

    fn build(&mut self, bytes: &[u8], filter: Option<&dyn Fn(&str) -> bool>) -> Result<()> {
        let elf = ElfFile::parse(bytes)?;
        let dwarf = Dwarf::load(&elf)?;
        let units = dwarf.units()?;

        self.endian = elf.endian();
        if let Some(unit) = units.first() {
            self.word_size = usize::from(unit.address_size);
        }
        self.ensure_sentinels();

        let mut builder = Builder {
            graph: self,
            elf: &elf,
            units: &units,
            built: HashMap::new(),
        };
        builder.run(filter)
    }

    /// Registers the `void *` and `NULL` sentinels (requires `word_size`).
    fn ensure_sentinels(&mut self) {
        let void_ptr = self.intern(TypeNode {
            typename: "void *".into(),
            size: self.word_size as i64,
            kind: TypeKind::Pointer { base: self.void_id },
        });
        self.intern(TypeNode {
            typename: "NULL".into(),
            size: self.word_size as i64,
            kind: TypeKind::Variable {
                ty: void_ptr,
                address: Some(0),
                data: None,
            },
        });
    }

    /// Looks up a node id by canonical name.
    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<TypeId> {
        self.by_name.get(name).copied()
    }

    /// The node behind an id.
    #[must_use]
    pub fn node(&self, id: TypeId) -> &TypeNode {
        &self.nodes[id]
    }

    /// The size in bytes of a node, or [`UNSIZED`].
    #[must_use]
    pub fn size_of(&self, id: TypeId) -> i64 {
        self.nodes[id].size
    }

    /// Iterates all registered names with their ids, in name order.
    pub fn names(&self) -> impl Iterator<Item = (&str, TypeId)> {
        self.by_name.iter().map(|(name, &id)| (name.as_str(), id))
    }

    /// The `void` sentinel node.
    #[must_use]
    pub fn void_id(&self) -> TypeId {
        self.void_id
    }

    /// Insert-or-merge: returns the canonical id for the node's name.
    ///
    /// Anonymous nodes are always appended. For a name collision the
    /// existing node wins and only its unresolved fields are filled from
    /// the candidate.
    fn intern(&mut self, node: TypeNode) -> TypeId {
        if node.typename == ANON {
            self.nodes.push(node);
            return self.nodes.len() - 1;
        }
        if let Some(&existing) = self.by_name.get(&node.typename) {
            self.update(existing, node);
            return existing;
        }
        let id = self.nodes.len();
        self.by_name.insert(node.typename.clone(), id);
        self.nodes.push(node);
        id
    }

    /// Fills unresolved fields of `id` from `candidate`; resolved fields
    /// are left untouched.
    fn update(&mut self, id: TypeId, candidate: TypeNode) {
        let node = &mut self.nodes[id];
        match (&mut node.kind, candidate.kind) {
            (
                TypeKind::Variable { ty, address, data },
                TypeKind::Variable {
                    ty: new_ty,
                    address: new_address,
                    data: new_data,
                },
            ) => {
                if address.is_none() {
                    *address = new_address;
                }
                if data.is_none() {
                    *data = new_data;
                }
                if node.size == UNSIZED {
                    *ty = new_ty;
                    node.size = candidate.size;
                }
            }
            (
                TypeKind::Function { address, .. },
                TypeKind::Function {
                    address: new_address,
                    ..
                },
            ) => {
                if address.is_none() {
                    *address = new_address;
                }
            }
            (TypeKind::Array { length, .. }, TypeKind::Array { length: new_length, .. }) => {
                if *length == UNSIZED {
                    *length = new_length;
                }
            }
            (TypeKind::Struct { members }, TypeKind::Struct { members: new_members })
            | (TypeKind::Union { members }, TypeKind::Union { members: new_members }) => {
                if members.is_empty() {
                    *members = new_members;
                }
            }
            _ => {}
        }
        if self.nodes[id].size == UNSIZED {
            self.nodes[id].size = candidate.size;
        }
    }

    /// Replaces the member list and size of a freshly-registered aggregate,
    /// unless a previous observation already resolved them.
    fn fill_members(&mut self, id: TypeId, new_members: Vec<Member>, size: i64) {
        let node = &mut self.nodes[id];
        match &mut node.kind {
            TypeKind::Struct { members } | TypeKind::Union { members } => {
                if members.is_empty() {
                    *members = new_members;
                }
            }
            _ => {}
        }
        if node.size == UNSIZED {
            node.size = size;
        }
    }

    /// Synthesizes a type from a textual declaration.
    ///
    /// Recognized shapes: a registered base name, `<decl> *`, `<decl> [N]`,
    /// and `<decl> []`. Pointers and sized arrays are registered under
    /// their canonical name; unsized arrays are fabricated but stay
    /// anonymous in the dictionary.
    ///
    /// # Errors
    ///
    /// [`Error::UnknownType`] for anything else.
    pub fn type_from_string(&mut self, decl: &str) -> Result<TypeId> {
        let s = decl.trim();
        if let Some(rest) = s.strip_suffix('*') {
            let base = self.type_from_string(rest)?;
            let typename = format!("{} *", self.nodes[base].typename);
            return Ok(self.intern(TypeNode {
                typename,
                size: self.word_size as i64,
                kind: TypeKind::Pointer { base },
            }));
        }
        if let Some(rest) = s.strip_suffix(']') {
            let open = rest.rfind('[').ok_or_else(|| Error::UnknownType(s.into()))?;
            let base = self.type_from_string(&rest[..open])?;
            let count = rest[open + 1..].trim();
            if count.is_empty() {
                // Unsized: usable as a handle, but not a canonical name.
                let typename = format!("{} []", self.nodes[base].typename);
                self.nodes.push(TypeNode {
                    typename,
                    size: UNSIZED,
                    kind: TypeKind::Array {
                        base,
                        length: UNSIZED,
                    },
                });
                return Ok(self.nodes.len() - 1);
            }
            let length: i64 = count
                .parse()
                .map_err(|_| Error::UnknownType(s.into()))?;
            return Ok(self.sized_array(base, length));
        }
        self.lookup(s).ok_or_else(|| Error::UnknownType(s.into()))
    }

    /// Registers (or finds) the sized-array type `base [length]`.
    pub(crate) fn sized_array(&mut self, base: TypeId, length: i64) -> TypeId {
        let base_size = self.nodes[base].size;
        let typename = format!("{} [{}]", self.nodes[base].typename, length);
        let size = if length >= 0 && base_size >= 0 {
            length * base_size
        } else {
            UNSIZED
        };
        self.intern(TypeNode {
            typename,
            size,
            kind: TypeKind::Array { base, length },
        })
    }
}

// ---------------------------------------------------------------------------
// DWARF walk
// ---------------------------------------------------------------------------

struct Builder<'a, 'g> {
    graph: &'g mut TypeGraph,
    elf: &'a ElfFile<'a>,
    units: &'a [Unit<'a>],
    /// DIE offset → node id, per input file. Pre-seeded for aggregates so
    /// self-references resolve mid-walk.
    built: HashMap<usize, TypeId>,
}

impl<'a> Builder<'a, '_> {
    fn run(&mut self, filter: Option<&dyn Fn(&str) -> bool>) -> Result<()> {
        let units = self.units;
        for unit in units {
            let cu_name = unit.root().name().unwrap_or("");
            if let Some(filter) = filter {
                if !filter(cu_name) {
                    continue;
                }
            }
            for &child in &unit.root().children {
                let result = self.top_level(unit, unit.die(child));
                match result {
                    Err(_) if self.graph.tolerant => {}
                    other => other?,
                }
            }
        }
        Ok(())
    }

    fn top_level(&mut self, unit: &'a Unit<'a>, die: &'a Die<'a>) -> Result<()> {
        match die.tag {
            DW_TAG_VARIABLE => self.add_variable(unit, die),
            DW_TAG_SUBPROGRAM => self.add_function(unit, die),
            DW_TAG_BASE_TYPE
            | DW_TAG_TYPEDEF
            | DW_TAG_POINTER_TYPE
            | DW_TAG_ARRAY_TYPE
            | DW_TAG_STRUCTURE_TYPE
            | DW_TAG_UNION_TYPE
            | DW_TAG_ENUMERATION_TYPE
            | DW_TAG_CONST_TYPE
            | DW_TAG_VOLATILE_TYPE => {
                self.type_at(die.offset)?;
                Ok(())
            }
            // Lexical blocks, imported declarations, and the like carry no
            // type information we consume.
            _ => Ok(()),
        }
    }

    fn die_at(&self, offset: usize) -> Result<(&'a Unit<'a>, &'a Die<'a>)> {
        for unit in self.units {
            if unit.contains(offset) {
                let die = unit
                    .die_at_offset(offset)
                    .ok_or(Error::Dwarf(tether_dwarf::DwarfError::Truncated))?;
                return Ok((unit, die));
            }
        }
        Err(Error::Dwarf(tether_dwarf::DwarfError::Truncated))
    }

    /// Builds (or finds) the node for the type DIE at `offset`.
    fn type_at(&mut self, offset: usize) -> Result<TypeId> {
        if let Some(&id) = self.built.get(&offset) {
            return Ok(id);
        }
        let (unit, die) = self.die_at(offset)?;
        let id = match die.tag {
            DW_TAG_BASE_TYPE => self.base_type(die)?,
            DW_TAG_TYPEDEF => self.typedef(die)?,
            DW_TAG_POINTER_TYPE => self.pointer(die)?,
            DW_TAG_ARRAY_TYPE => self.array(unit, die)?,
            DW_TAG_STRUCTURE_TYPE => self.aggregate(unit, die, false)?,
            DW_TAG_UNION_TYPE => self.aggregate(unit, die, true)?,
            DW_TAG_ENUMERATION_TYPE => self.enumeration(unit, die)?,
            DW_TAG_CONST_TYPE | DW_TAG_VOLATILE_TYPE => {
                // Qualifiers are transparent.
                match die.type_ref() {
                    Some(inner) => self.type_at(inner)?,
                    None => self.graph.void_id(),
                }
            }
            DW_TAG_SUBROUTINE_TYPE => self.graph.void_id(),
            _ => return Err(Error::Unimplemented("DWARF type tag")),
        };
        self.built.insert(offset, id);
        Ok(id)
    }

    fn byte_size(die: &Die<'_>) -> i64 {
        die.uint(DW_AT_BYTE_SIZE)
            .and_then(|v| i64::try_from(v).ok())
            .unwrap_or(UNSIZED)
    }

    fn base_type(&mut self, die: &Die<'_>) -> Result<TypeId> {
        let kind = match die.uint(DW_AT_ENCODING).unwrap_or(0) {
            DW_ATE_SIGNED | DW_ATE_SIGNED_CHAR => TypeKind::Int { signed: true },
            DW_ATE_UNSIGNED | DW_ATE_UNSIGNED_CHAR | DW_ATE_BOOLEAN => {
                TypeKind::Int { signed: false }
            }
            DW_ATE_FLOAT => TypeKind::Float,
            _ => return Err(Error::Unimplemented("DWARF base type encoding")),
        };
        Ok(self.graph.intern(TypeNode {
            typename: die.name().unwrap_or(ANON).into(),
            size: Self::byte_size(die),
            kind,
        }))
    }

    /// Typedefs flatten: the node's kind is a copy of the underlying kind
    /// under the typedef's own name, so `typedef struct … foo_t` looks up
    /// as a struct named `foo_t`.
    fn typedef(&mut self, die: &Die<'_>) -> Result<TypeId> {
        let base = match die.type_ref() {
            Some(inner) => self.type_at(inner)?,
            None => self.graph.void_id(),
        };
        let (size, kind) = {
            let node = self.graph.node(base);
            (node.size, node.kind.clone())
        };
        Ok(self.graph.intern(TypeNode {
            typename: die.name().unwrap_or(ANON).into(),
            size,
            kind,
        }))
    }

    fn pointer(&mut self, die: &Die<'_>) -> Result<TypeId> {
        let base = match die.type_ref() {
            Some(inner) => self.type_at(inner)?,
            None => self.graph.void_id(),
        };
        let typename = format!("{} *", self.graph.node(base).typename);
        Ok(self.graph.intern(TypeNode {
            typename,
            size: self.graph.word_size as i64,
            kind: TypeKind::Pointer { base },
        }))
    }

    fn array(&mut self, unit: &'a Unit<'a>, die: &'a Die<'a>) -> Result<TypeId> {
        let base = match die.type_ref() {
            Some(inner) => self.type_at(inner)?,
            None => self.graph.void_id(),
        };
        let mut length = UNSIZED;
        for &child in &die.children {
            let child = unit.die(child);
            if child.tag != DW_TAG_SUBRANGE_TYPE {
                continue;
            }
            if let Some(count) = child.uint(DW_AT_COUNT) {
                length = i64::try_from(count).unwrap_or(UNSIZED);
            } else if let Some(upper) = child.uint(DW_AT_UPPER_BOUND) {
                length = i64::try_from(upper + 1).unwrap_or(UNSIZED);
            }
        }
        if length >= 0 {
            Ok(self.graph.sized_array(base, length))
        } else {
            let typename = format!("{} []", self.graph.node(base).typename);
            Ok(self.graph.intern(TypeNode {
                typename,
                size: UNSIZED,
                kind: TypeKind::Array { base, length },
            }))
        }
    }

    fn aggregate(&mut self, unit: &'a Unit<'a>, die: &'a Die<'a>, is_union: bool) -> Result<TypeId> {
        let typename = match die.name() {
            Some(name) if is_union => format!("union {name}"),
            Some(name) => format!("struct {name}"),
            None => ANON.into(),
        };
        let size = Self::byte_size(die);
        let kind = if is_union {
            TypeKind::Union {
                members: Vec::new(),
            }
        } else {
            TypeKind::Struct {
                members: Vec::new(),
            }
        };
        // Register the shell before walking members so a pointer-to-self
        // member finds this very node.
        let id = self.graph.intern(TypeNode {
            typename,
            size,
            kind,
        });
        self.built.insert(die.offset, id);

        let mut members = Vec::new();
        for &child in &die.children {
            let child = unit.die(child);
            if child.tag != DW_TAG_MEMBER {
                continue;
            }
            let Some(name) = child.name() else { continue };
            let Some(ty_ref) = child.type_ref() else {
                continue;
            };
            let ty = self.type_at(ty_ref)?;
            members.push(Member {
                name: name.into(),
                offset: member_offset(child),
                ty,
            });
        }
        self.graph.fill_members(id, members, size);
        Ok(id)
    }

    /// An enum is an int; its enumerators land in the flat enum table.
    fn enumeration(&mut self, unit: &'a Unit<'a>, die: &'a Die<'a>) -> Result<TypeId> {
        let typename = match die.name() {
            Some(name) => format!("enum {name}"),
            None => ANON.into(),
        };
        let size = match Self::byte_size(die) {
            UNSIZED => 4,
            size => size,
        };
        let id = self.graph.intern(TypeNode {
            typename,
            size,
            kind: TypeKind::Int { signed: true },
        });
        for &child in &die.children {
            let child = unit.die(child);
            if child.tag != DW_TAG_ENUMERATOR {
                continue;
            }
            let Some(name) = child.name() else { continue };
            let value = child
                .attr(DW_AT_CONST_VALUE)
                .and_then(AttrValue::as_int)
                .unwrap_or(0);
            self.graph.enums.insert(name.into(), value);
        }
        Ok(id)
    }

    fn add_variable(&mut self, unit: &'a Unit<'a>, die: &'a Die<'a>) -> Result<()> {
        let Some(name) = die.name() else {
            return Ok(());
        };
        let Some(ty_ref) = die.type_ref() else {
            return Ok(());
        };
        // The const qualifier is unwrapped by type_at; remember whether it
        // was there, because only const variables get their initializer
        // bytes harvested.
        let is_const = self
            .die_at(ty_ref)
            .map(|(_, d)| d.tag == DW_TAG_CONST_TYPE)
            .unwrap_or(false);
        let ty = self.type_at(ty_ref)?;
        let size = self.graph.size_of(ty);

        let address = variable_address(unit, die, self.elf.endian());
        let data = match (is_const, address) {
            (true, Some(addr)) if size > 0 => self
                .elf
                .file_bytes_at_vaddr(addr, size as u64)
                .map(|bytes| Rc::new(bytes.to_vec())),
            _ => None,
        };

        self.graph.intern(TypeNode {
            typename: name.into(),
            size,
            kind: TypeKind::Variable { ty, address, data },
        });
        Ok(())
    }

    fn add_function(&mut self, unit: &'a Unit<'a>, die: &'a Die<'a>) -> Result<()> {
        let Some(name) = die.name() else {
            return Ok(());
        };
        // A subprogram without code has nothing callable; skip it.
        let Some(address) = die.uint(DW_AT_LOW_PC) else {
            return Ok(());
        };
        let return_type = match die.type_ref() {
            Some(inner) => Some(self.type_at(inner)?),
            None => None,
        };
        let mut arguments = Vec::new();
        for &child in &die.children {
            let child = unit.die(child);
            if child.tag != DW_TAG_FORMAL_PARAMETER {
                continue;
            }
            if let Some(ty_ref) = child.type_ref() {
                arguments.push(self.type_at(ty_ref)?);
            }
        }
        self.graph.intern(TypeNode {
            typename: name.into(),
            size: UNSIZED,
            kind: TypeKind::Function {
                return_type,
                arguments,
                address: Some(address),
            },
        });
        Ok(())
    }
}

/// Decodes `DW_AT_data_member_location`: either a plain constant or a
/// `DW_OP_plus_uconst` expression. Unions typically omit it entirely.
fn member_offset(die: &Die<'_>) -> u64 {
    match die.attr(DW_AT_DATA_MEMBER_LOCATION) {
        Some(AttrValue::Uint(offset)) => *offset,
        Some(AttrValue::Int(offset)) => u64::try_from(*offset).unwrap_or(0),
        Some(AttrValue::Bytes(expr)) if expr.first() == Some(&0x23) => {
            // DW_OP_plus_uconst ULEB128
            let mut value: u64 = 0;
            let mut shift = 0;
            for &byte in &expr[1..] {
                value |= u64::from(byte & 0x7f) << shift;
                if byte & 0x80 == 0 {
                    break;
                }
                shift += 7;
            }
            value
        }
        _ => 0,
    }
}

/// Resolves `DW_AT_location` to an address. Only a bare `DW_OP_addr`
/// expression is honored; anything else reports no address.
fn variable_address(unit: &Unit<'_>, die: &Die<'_>, endian: Endian) -> Option<u64> {
    match die.attr(DW_AT_LOCATION) {
        Some(AttrValue::Bytes(expr)) => {
            let address_size = usize::from(unit.address_size);
            if expr.len() != 1 + address_size || expr[0] != DW_OP_ADDR {
                return None;
            }
            let bytes = &expr[1..];
            let value = match endian {
                Endian::Little => bytes
                    .iter()
                    .rev()
                    .fold(0u64, |acc, &b| (acc << 8) | u64::from(b)),
                Endian::Big => bytes.iter().fold(0u64, |acc, &b| (acc << 8) | u64::from(b)),
            };
            Some(value)
        }
        Some(AttrValue::Addr(addr)) => Some(*addr),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph_with_uint8() -> TypeGraph {
        let mut graph = TypeGraph::empty();
        graph.word_size = 8;
        graph.ensure_sentinels();
        graph.intern(TypeNode {
            typename: "uint8_t".into(),
            size: 1,
            kind: TypeKind::Int { signed: false },
        });
        graph.intern(TypeNode {
            typename: "uint32_t".into(),
            size: 4,
            kind: TypeKind::Int { signed: false },
        });
        graph
    }

    #[test]
    fn sentinels_always_exist() {
        let graph = graph_with_uint8();
        assert!(graph.lookup("void").is_some());
        let null = graph.lookup("NULL").unwrap();
        match &graph.node(null).kind {
            TypeKind::Variable { address, .. } => assert_eq!(*address, Some(0)),
            other => panic!("NULL is {}", other.name()),
        }
    }

    #[test]
    fn string_pointer() {
        let mut graph = graph_with_uint8();
        let id = graph.type_from_string("uint8_t *").unwrap();
        let node = graph.node(id);
        assert_eq!(node.typename, "uint8_t *");
        assert_eq!(node.size, 8);
        match node.kind {
            TypeKind::Pointer { base } => {
                assert_eq!(graph.node(base).typename, "uint8_t");
            }
            _ => panic!("not a pointer"),
        }
        // Registered: a second synthesis returns the same node.
        assert_eq!(graph.type_from_string("uint8_t *").unwrap(), id);
        assert_eq!(graph.lookup("uint8_t *"), Some(id));
    }

    #[test]
    fn string_pointer_to_pointer() {
        let mut graph = graph_with_uint8();
        let id = graph.type_from_string("uint8_t **").unwrap();
        match graph.node(id).kind {
            TypeKind::Pointer { base } => {
                assert_eq!(graph.node(base).typename, "uint8_t *");
            }
            _ => panic!("not a pointer"),
        }
        // The intermediate level registered too.
        assert!(graph.lookup("uint8_t *").is_some());
    }

    #[test]
    fn string_sized_array() {
        let mut graph = graph_with_uint8();
        let id = graph.type_from_string("uint32_t[2]").unwrap();
        let node = graph.node(id);
        assert_eq!(node.typename, "uint32_t [2]");
        assert_eq!(node.size, 8);
        match node.kind {
            TypeKind::Array { length, .. } => assert_eq!(length, 2),
            _ => panic!("not an array"),
        }
        assert_eq!(graph.lookup("uint32_t [2]"), Some(id));
    }

    #[test]
    fn string_unsized_array_is_not_registered() {
        let mut graph = graph_with_uint8();
        let id = graph.type_from_string("uint8_t []").unwrap();
        assert_eq!(graph.size_of(id), UNSIZED);
        assert_eq!(graph.lookup("uint8_t []"), None);
    }

    #[test]
    fn string_unknown_type() {
        let mut graph = graph_with_uint8();
        assert!(matches!(
            graph.type_from_string("does_not_exist *"),
            Err(Error::UnknownType(_))
        ));
        assert!(matches!(
            graph.type_from_string("uint8_t [x]"),
            Err(Error::UnknownType(_))
        ));
    }

    #[test]
    fn merge_fills_unresolved_fields_only() {
        let mut graph = graph_with_uint8();
        let ty = graph.lookup("uint32_t").unwrap();
        // Extern declaration: no address, no size resolution yet.
        graph.intern(TypeNode {
            typename: "counter".into(),
            size: UNSIZED,
            kind: TypeKind::Variable {
                ty,
                address: None,
                data: None,
            },
        });
        // Definition from a second image.
        graph.intern(TypeNode {
            typename: "counter".into(),
            size: 4,
            kind: TypeKind::Variable {
                ty,
                address: Some(0x2000),
                data: None,
            },
        });
        let id = graph.lookup("counter").unwrap();
        assert_eq!(graph.size_of(id), 4);
        match &graph.node(id).kind {
            TypeKind::Variable { address, .. } => assert_eq!(*address, Some(0x2000)),
            _ => panic!("not a variable"),
        }

        // A third observation must not overwrite the resolved address.
        graph.intern(TypeNode {
            typename: "counter".into(),
            size: 4,
            kind: TypeKind::Variable {
                ty,
                address: Some(0x9999),
                data: None,
            },
        });
        match &graph.node(graph.lookup("counter").unwrap()).kind {
            TypeKind::Variable { address, .. } => assert_eq!(*address, Some(0x2000)),
            _ => panic!("not a variable"),
        }
    }
}
