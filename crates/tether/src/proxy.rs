//! Typed handles on remote values and functions.
//!
//! A [`VarProxy`] behaves like a pointer to its element type: it supports
//! indexing, slicing, struct member access, and assignment, turning each
//! operation into byte-level traffic on the link (or into reads of a
//! harvested const image, which never touch the wire). A [`FuncProxy`]
//! marshals arguments into pointer words and issues the call primitive.
//!
//! Proxies are cheap and copyable. They do not own target memory; whatever
//! they point at belongs either to a static target symbol or to a scratch
//! allocation, which stays alive for as long as some proxy holds its
//! keepalive handle.

use std::rc::Rc;

use tether_elf::Endian;

use crate::alloc::Allocation;
use crate::error::{Error, Result};
use crate::graph::{TypeId, TypeKind, UNSIZED};
use crate::library::Lib;
use crate::proto::{int_to_uint, uint_to_int};

/// What a library lookup or element read produces.
pub enum Value<'l> {
    /// A plain integer (primitive reads, compatibility-mode unwrapping).
    Int(i64),
    /// A variable handle.
    Var(VarProxy<'l>),
    /// A callable handle.
    Func(FuncProxy<'l>),
}

impl<'l> Value<'l> {
    /// The integer inside, or [`Error::TypeMismatch`].
    ///
    /// # Errors
    ///
    /// When the value is not an integer.
    pub fn as_int(&self) -> Result<i64> {
        match self {
            Self::Int(v) => Ok(*v),
            _ => Err(Error::TypeMismatch("expected an integer value")),
        }
    }

    /// The integer inside, reinterpreted unsigned (for 64-bit registers).
    ///
    /// # Errors
    ///
    /// When the value is not an integer.
    pub fn as_uint(&self) -> Result<u64> {
        Ok(self.as_int()? as u64)
    }

    /// The variable proxy inside, or [`Error::TypeMismatch`].
    ///
    /// # Errors
    ///
    /// When the value is not a variable.
    pub fn into_var(self) -> Result<VarProxy<'l>> {
        match self {
            Self::Var(v) => Ok(v),
            _ => Err(Error::TypeMismatch("expected a variable")),
        }
    }

    /// The function proxy inside, or [`Error::TypeMismatch`].
    ///
    /// # Errors
    ///
    /// When the value is not a function.
    pub fn into_func(self) -> Result<FuncProxy<'l>> {
        match self {
            Self::Func(f) => Ok(f),
            _ => Err(Error::TypeMismatch("expected a function")),
        }
    }
}

/// A right-hand side for proxy assignment.
pub enum Rhs<'v, 'l> {
    /// An integer, encoded to the element size (two's complement when
    /// negative).
    Int(i64),
    /// Another proxy: stores its address into a pointer, or copies its
    /// bytes into anything else.
    Var(&'v VarProxy<'l>),
    /// Positional assignment of struct members, in declaration order.
    Fields(Vec<Rhs<'v, 'l>>),
}

impl From<i64> for Rhs<'_, '_> {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl<'v, 'l> From<&'v VarProxy<'l>> for Rhs<'v, 'l> {
    fn from(value: &'v VarProxy<'l>) -> Self {
        Self::Var(value)
    }
}

/// A harvested const image, shared between a proxy and its sub-proxies.
#[derive(Clone)]
pub(crate) struct CachedData {
    bytes: Rc<Vec<u8>>,
    offset: usize,
}

impl CachedData {
    pub(crate) fn new(bytes: Rc<Vec<u8>>) -> Self {
        Self { bytes, offset: 0 }
    }

    fn advanced(&self, by: usize) -> Self {
        Self {
            bytes: Rc::clone(&self.bytes),
            offset: self.offset + by,
        }
    }

    fn get(&self, len: usize) -> Option<&[u8]> {
        self.bytes.get(self.offset..self.offset + len)
    }
}

/// Encodes an unsigned value into `size` bytes of target byte order.
fn encode(value: u64, size: usize, endian: Endian) -> Vec<u8> {
    match endian {
        Endian::Little => value.to_le_bytes()[..size].to_vec(),
        Endian::Big => value.to_be_bytes()[8 - size..].to_vec(),
    }
}

/// Decodes target-byte-order bytes into an unsigned value.
fn decode(bytes: &[u8], endian: Endian) -> u64 {
    match endian {
        Endian::Little => bytes
            .iter()
            .rev()
            .fold(0u64, |acc, &b| (acc << 8) | u64::from(b)),
        Endian::Big => bytes.iter().fold(0u64, |acc, &b| (acc << 8) | u64::from(b)),
    }
}

// ---------------------------------------------------------------------------
// VarProxy
// ---------------------------------------------------------------------------

/// A typed handle on target memory. See the module docs.
#[derive(Clone)]
pub struct VarProxy<'l> {
    lib: &'l Lib,
    /// Element type. Array types are flattened on construction.
    ty: TypeId,
    address: u64,
    /// Element count, or [`UNSIZED`] for a singleton.
    length: i64,
    data: Option<CachedData>,
    /// Keeps a scratch slot reserved while any clone of this proxy lives.
    keepalive: Option<Rc<Allocation>>,
}

impl<'l> VarProxy<'l> {
    /// Builds a proxy, flattening a declared array type into
    /// `(element type, length)`.
    pub(crate) fn from_parts(
        lib: &'l Lib,
        ty: TypeId,
        address: u64,
        length: i64,
        data: Option<CachedData>,
        keepalive: Option<Rc<Allocation>>,
    ) -> Self {
        let (ty, length) = match lib.kind_of(ty) {
            TypeKind::Array {
                base,
                length: declared,
            } => (base, declared),
            _ => (ty, length),
        };
        Self {
            lib,
            ty,
            address,
            length,
            data,
            keepalive,
        }
    }

    /// Absolute target address.
    #[must_use]
    pub fn address(&self) -> u64 {
        self.address
    }

    /// Element count, or [`UNSIZED`] for a singleton.
    #[must_use]
    pub fn length(&self) -> i64 {
        self.length
    }

    /// The element type id.
    #[must_use]
    pub fn type_id(&self) -> TypeId {
        self.ty
    }

    /// The element type's canonical name.
    #[must_use]
    pub fn typename(&self) -> String {
        self.lib.typename_of(self.ty)
    }

    /// `true` when this proxy reads from a harvested const image instead of
    /// the link.
    #[must_use]
    pub fn is_cached(&self) -> bool {
        self.data.is_some()
    }

    /// The element count.
    ///
    /// # Errors
    ///
    /// [`Error::UnsizedArray`] for singletons and unsized declarations.
    pub fn len(&self) -> Result<usize> {
        usize::try_from(self.length).map_err(|_| Error::UnsizedArray)
    }

    /// `true` when the proxy is a zero-length array.
    ///
    /// # Errors
    ///
    /// [`Error::UnsizedArray`] when there is no length at all.
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Total size in bytes: element size times element count.
    #[must_use]
    pub fn byte_size(&self) -> i64 {
        let elem = self.lib.size_of(self.ty);
        if self.length >= 0 && elem >= 0 {
            self.length * elem
        } else {
            elem
        }
    }

    fn elem_size(&self) -> Result<usize> {
        usize::try_from(self.lib.size_of(self.ty))
            .map_err(|_| Error::TypeMismatch("element size unknown"))
            .and_then(|s| {
                if s == 0 {
                    Err(Error::TypeMismatch("element size unknown"))
                } else {
                    Ok(s)
                }
            })
    }

    fn check_index(&self, index: i64) -> Result<()> {
        if index < 0 || (self.length != UNSIZED && index >= self.length) {
            return Err(Error::IndexOutOfRange {
                index,
                length: self.length,
            });
        }
        Ok(())
    }

    /// Reads the raw bytes of element `index`.
    fn elem_bytes(&self, index: i64) -> Result<Vec<u8>> {
        let size = self.elem_size()?;
        let offset = index as usize * size;
        if let Some(cache) = &self.data {
            if let Some(bytes) = cache.get(offset + size) {
                return Ok(bytes[offset..offset + size].to_vec());
            }
        }
        self.lib
            .com()
            .memory_read(self.address + offset as u64, size)
    }

    /// Indexed read.
    ///
    /// Integers decode with their declared signedness; pointers dereference
    /// into a proxy over the pointee at the stored address; anything else
    /// becomes a proxy at the element address.
    ///
    /// # Errors
    ///
    /// Bounds, link, and [`Error::Unimplemented`] for float elements.
    pub fn get(&self, index: i64) -> Result<Value<'l>> {
        self.check_index(index)?;
        match self.lib.kind_of(self.ty) {
            TypeKind::Int { signed } => {
                let bytes = self.elem_bytes(index)?;
                let raw = decode(&bytes, self.lib.endian());
                Ok(Value::Int(if signed {
                    uint_to_int(raw, bytes.len())
                } else {
                    raw as i64
                }))
            }
            TypeKind::Float => Err(Error::Unimplemented("float marshalling")),
            TypeKind::Pointer { base } => {
                let bytes = self.elem_bytes(index)?;
                let pointee = decode(&bytes, self.lib.endian());
                Ok(Value::Var(VarProxy::from_parts(
                    self.lib,
                    base,
                    pointee,
                    UNSIZED,
                    None,
                    None,
                )))
            }
            _ => {
                let size = self.elem_size()?;
                let offset = index as usize * size;
                Ok(Value::Var(VarProxy {
                    lib: self.lib,
                    ty: self.ty,
                    address: self.address + offset as u64,
                    length: UNSIZED,
                    data: self.data.as_ref().map(|d| d.advanced(offset)),
                    keepalive: self.keepalive.clone(),
                }))
            }
        }
    }

    /// Indexed read of a primitive element.
    ///
    /// # Errors
    ///
    /// [`Error::TypeMismatch`] when the element is not an integer.
    pub fn get_int(&self, index: i64) -> Result<i64> {
        self.get(index)?.as_int()
    }

    /// Sliced read of primitive elements in one link transaction.
    ///
    /// # Errors
    ///
    /// [`Error::TypeMismatch`] for non-integer elements; bounds and link
    /// errors otherwise.
    pub fn get_ints(&self, start: i64, stop: i64) -> Result<Vec<i64>> {
        let TypeKind::Int { signed } = self.lib.kind_of(self.ty) else {
            return Err(Error::TypeMismatch("sliced integer read on non-integer"));
        };
        self.check_slice(start, stop)?;
        let size = self.elem_size()?;
        let count = (stop - start) as usize;
        let offset = start as usize * size;

        let bytes = if let Some(cache) = &self.data {
            match cache.get(offset + count * size) {
                Some(bytes) => bytes[offset..offset + count * size].to_vec(),
                None => self
                    .lib
                    .com()
                    .memory_read(self.address + offset as u64, count * size)?,
            }
        } else {
            self.lib
                .com()
                .memory_read(self.address + offset as u64, count * size)?
        };

        let endian = self.lib.endian();
        Ok(bytes
            .chunks(size)
            .map(|chunk| {
                let raw = decode(chunk, endian);
                if signed {
                    uint_to_int(raw, size)
                } else {
                    raw as i64
                }
            })
            .collect())
    }

    /// Sliced read of composite elements: one independent proxy each.
    ///
    /// # Errors
    ///
    /// Bounds and link errors.
    pub fn get_proxies(&self, start: i64, stop: i64) -> Result<Vec<VarProxy<'l>>> {
        self.check_slice(start, stop)?;
        (start..stop)
            .map(|i| self.get(i).and_then(Value::into_var))
            .collect()
    }

    fn check_slice(&self, start: i64, stop: i64) -> Result<()> {
        if start < 0 || stop < start {
            return Err(Error::IndexOutOfRange {
                index: start,
                length: self.length,
            });
        }
        if self.length != UNSIZED && stop > self.length {
            return Err(Error::IndexOutOfRange {
                index: stop,
                length: self.length,
            });
        }
        Ok(())
    }

    /// Reads the whole object image: the const cache when present, a
    /// single memory read otherwise.
    ///
    /// # Errors
    ///
    /// Link errors.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let size = self.elem_size()?;
        let total = size * usize::try_from(self.length.max(1)).unwrap_or(1);
        if let Some(cache) = &self.data {
            if let Some(bytes) = cache.get(total) {
                return Ok(bytes.to_vec());
            }
        }
        self.lib.com().memory_read(self.address, total)
    }

    /// Indexed write.
    ///
    /// # Errors
    ///
    /// Bounds, link, and type mismatch errors; see [`Rhs`].
    pub fn set(&self, index: i64, value: Rhs<'_, 'l>) -> Result<()> {
        self.check_index(index)?;
        let size = self.elem_size()?;
        let address = self.address + (index as usize * size) as u64;
        self.write_at(address, value)
    }

    /// Writes `value` into the element-sized cell at `address`.
    fn write_at(&self, address: u64, value: Rhs<'_, 'l>) -> Result<()> {
        let size = self.elem_size()?;
        let endian = self.lib.endian();
        match (self.lib.kind_of(self.ty), value) {
            (TypeKind::Pointer { .. }, Rhs::Var(var)) => {
                let bytes = encode(var.address(), size, endian);
                self.lib.com().memory_write(address, &bytes)
            }
            (_, Rhs::Var(var)) => {
                // Copying a buffer into a non-pointer cell transfers its
                // whole image, like a memmove from the source object.
                let bytes = var.to_bytes()?;
                self.lib.com().memory_write(address, &bytes)
            }
            (TypeKind::Struct { members } | TypeKind::Union { members }, Rhs::Fields(values)) => {
                for (member, value) in members.iter().zip(values) {
                    let elem = VarProxy::from_parts(
                        self.lib,
                        member.ty,
                        address + member.offset,
                        UNSIZED,
                        None,
                        None,
                    );
                    elem.write_at(address + member.offset, value)?;
                }
                Ok(())
            }
            (TypeKind::Float, _) => Err(Error::Unimplemented("float marshalling")),
            (_, Rhs::Int(v)) => {
                let bytes = encode(int_to_uint(v, size), size, endian);
                self.lib.com().memory_write(address, &bytes)
            }
            (_, Rhs::Fields(_)) => {
                Err(Error::TypeMismatch("positional assignment needs a struct"))
            }
        }
    }

    /// Sliced write of primitive elements in one link transaction,
    /// starting at element `start`.
    ///
    /// # Errors
    ///
    /// [`Error::UnsizedArray`] on a singleton, bounds and type errors
    /// otherwise.
    pub fn set_ints(&self, start: i64, values: &[i64]) -> Result<()> {
        if self.length == UNSIZED {
            return Err(Error::UnsizedArray);
        }
        let TypeKind::Int { .. } = self.lib.kind_of(self.ty) else {
            return Err(Error::TypeMismatch("sliced integer write on non-integer"));
        };
        let stop = start + values.len() as i64;
        self.check_slice(start, stop)?;
        let size = self.elem_size()?;
        let endian = self.lib.endian();
        let mut bytes = Vec::with_capacity(values.len() * size);
        for &v in values {
            bytes.extend_from_slice(&encode(int_to_uint(v, size), size, endian));
        }
        self.lib
            .com()
            .memory_write(self.address + (start as usize * size) as u64, &bytes)
    }

    /// Writes raw bytes starting at element `start`.
    ///
    /// # Errors
    ///
    /// Link errors.
    pub fn set_bytes(&self, start: i64, bytes: &[u8]) -> Result<()> {
        let size = self.elem_size()?;
        self.lib
            .com()
            .memory_write(self.address + (start as usize * size) as u64, bytes)
    }

    /// Struct member read.
    ///
    /// Primitives unwrap to integers. In compatibility mode a
    /// length-unspecified pointer member dereferences once, so chained
    /// accesses read naturally.
    ///
    /// # Errors
    ///
    /// [`Error::TypeMismatch`] on non-aggregates, [`Error::UnknownMember`],
    /// and link errors.
    pub fn member(&self, name: &str) -> Result<Value<'l>> {
        let member = self.member_info(name)?;
        let proxy = VarProxy::from_parts(
            self.lib,
            member.ty,
            self.address + member.offset,
            UNSIZED,
            None,
            None,
        );
        match self.lib.kind_of(proxy.ty) {
            TypeKind::Int { .. } if proxy.length == UNSIZED => {
                Ok(Value::Int(proxy.get_int(0)?))
            }
            TypeKind::Pointer { .. }
                if self.lib.cffi_compat() && proxy.length == UNSIZED =>
            {
                proxy.get(0)
            }
            _ => Ok(Value::Var(proxy)),
        }
    }

    /// Struct member write.
    ///
    /// # Errors
    ///
    /// See [`VarProxy::member`] and [`Rhs`].
    pub fn set_member(&self, name: &str, value: Rhs<'_, 'l>) -> Result<()> {
        let member = self.member_info(name)?;
        let proxy = VarProxy::from_parts(
            self.lib,
            member.ty,
            self.address + member.offset,
            UNSIZED,
            None,
            None,
        );
        proxy.write_at(proxy.address, value)
    }

    fn member_info(&self, name: &str) -> Result<crate::graph::Member> {
        match self.lib.kind_of(self.ty) {
            TypeKind::Struct { members } | TypeKind::Union { members } => members
                .into_iter()
                .find(|m| m.name == name)
                .ok_or_else(|| Error::UnknownMember(name.into())),
            _ => Err(Error::TypeMismatch("member access on a non-aggregate")),
        }
    }

    /// Materializes all elements (fast path: one read for primitives).
    ///
    /// # Errors
    ///
    /// [`Error::UnsizedArray`] when the length is unknown.
    pub fn elements(&self) -> Result<Vec<Value<'l>>> {
        let len = i64::try_from(self.len()?).unwrap_or(0);
        match self.lib.kind_of(self.ty) {
            TypeKind::Int { .. } => Ok(self
                .get_ints(0, len)?
                .into_iter()
                .map(Value::Int)
                .collect()),
            _ => Ok(self
                .get_proxies(0, len)?
                .into_iter()
                .map(Value::Var)
                .collect()),
        }
    }

    /// The scratch keepalive handle, when this proxy owns an allocation.
    pub(crate) fn keepalive(&self) -> Option<&Rc<Allocation>> {
        self.keepalive.as_ref()
    }
}

impl PartialEq for VarProxy<'_> {
    /// Two proxies are equal when they agree on type and address.
    fn eq(&self, other: &Self) -> bool {
        self.ty == other.ty && self.address == other.address
    }
}

impl core::fmt::Debug for VarProxy<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "<{}[{}] @ 0x{:08x}>",
            self.typename(),
            self.length,
            self.address
        )
    }
}

// ---------------------------------------------------------------------------
// FuncProxy
// ---------------------------------------------------------------------------

/// An argument to a remote call.
pub enum Arg<'v, 'l> {
    /// A signed integer, truncated to a pointer word.
    Int(i64),
    /// An unsigned integer.
    Uint(u64),
    /// A proxy: passes its target address.
    Var(&'v VarProxy<'l>),
    /// A byte buffer: copied into a scratch allocation, passed by address.
    Bytes(&'v [u8]),
    /// Floats are deliberately not marshalled.
    Float(f64),
}

/// A typed handle on a target function.
pub struct FuncProxy<'l> {
    lib: &'l Lib,
    ty: TypeId,
    address: u64,
}

impl<'l> FuncProxy<'l> {
    pub(crate) fn new(lib: &'l Lib, ty: TypeId, address: u64) -> Self {
        Self { lib, ty, address }
    }

    /// Entry address of the function.
    #[must_use]
    pub fn address(&self) -> u64 {
        self.address
    }

    /// Calls the function.
    ///
    /// Returns `None` for `void`, an integer for primitive returns
    /// (signed per the declared type), and a proxy for pointer and
    /// struct-by-value returns. Struct returns wider than a pointer go
    /// through the companion out-pointer convention.
    ///
    /// # Errors
    ///
    /// Link errors, [`Error::Unimplemented`] for floats, and scratch
    /// allocation failures for buffer arguments.
    pub fn call(&self, args: &[Arg<'_, 'l>]) -> Result<Option<Value<'l>>> {
        let (words, _keepalive) = self.marshal(args)?;

        let TypeKind::Function {
            return_type,
            arguments,
            ..
        } = self.lib.kind_of(self.ty)
        else {
            return Err(Error::TypeMismatch("call on a non-function"));
        };

        // Companion out-pointer convention: allocate the return object,
        // pass its address as a synthetic first argument, no reply payload.
        if self
            .lib
            .typename_of(self.ty)
            .starts_with(self.lib.companion_prefix_ptr())
        {
            let out_ty = *arguments
                .first()
                .ok_or(Error::TypeMismatch("out-pointer variant without output"))?;
            let out = self.lib.new_from_type(out_ty)?;
            let mut all = vec![out.address()];
            all.extend_from_slice(&words);
            self.lib.com().call(self.address, 0, &all)?;
            return Ok(Some(Value::Var(out)));
        }

        let retsize = return_type
            .map(|ty| self.lib.size_of(ty).max(0) as usize)
            .unwrap_or(0);
        let raw = self.lib.com().call(self.address, retsize, &words)?;

        let Some(return_type) = return_type else {
            return Ok(None);
        };
        self.unmarshal_return(return_type, raw).map(Some)
    }

    fn marshal(&self, args: &[Arg<'_, 'l>]) -> Result<(Vec<u64>, Vec<VarProxy<'l>>)> {
        let word = self.lib.word_size();
        let mut words = Vec::with_capacity(args.len());
        let mut keepalive = Vec::new();
        for arg in args {
            match arg {
                Arg::Int(v) => words.push(int_to_uint(*v, word)),
                Arg::Uint(v) => words.push(*v),
                Arg::Var(var) => words.push(var.address()),
                Arg::Bytes(bytes) => {
                    let var = self.lib.new_bytes(bytes)?;
                    words.push(var.address());
                    keepalive.push(var);
                }
                Arg::Float(_) => return Err(Error::Unimplemented("float marshalling")),
            }
        }
        Ok((words, keepalive))
    }

    fn unmarshal_return(&self, return_type: TypeId, raw: u64) -> Result<Value<'l>> {
        let size = self.lib.size_of(return_type).max(0) as usize;
        match self.lib.kind_of(return_type) {
            TypeKind::Int { signed } => Ok(Value::Int(if signed {
                uint_to_int(raw, size.min(self.lib.word_size()))
            } else {
                raw as i64
            })),
            TypeKind::Float => Err(Error::Unimplemented("float marshalling")),
            TypeKind::Pointer { base } => Ok(Value::Var(VarProxy::from_parts(
                self.lib,
                base,
                raw,
                UNSIZED,
                None,
                None,
            ))),
            TypeKind::Array { .. } => Ok(Value::Var(VarProxy::from_parts(
                self.lib,
                return_type,
                raw,
                UNSIZED,
                None,
                None,
            ))),
            TypeKind::Struct { .. } | TypeKind::Union { .. } => {
                // A struct no wider than a word came back in the return
                // register; park it in scratch so it is addressable.
                let out = self.lib.new_from_type(return_type)?;
                let bytes = encode(raw, size, self.lib.endian());
                out.set_bytes(0, &bytes)?;
                Ok(Value::Var(out))
            }
            _ => Err(Error::TypeMismatch("unsupported return type")),
        }
    }
}

impl PartialEq for FuncProxy<'_> {
    /// Two function proxies are equal when they point at the same address.
    fn eq(&self, other: &Self) -> bool {
        self.address == other.address
    }
}

impl core::fmt::Debug for FuncProxy<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "<fn {} @ 0x{:08x}>", self.lib.typename_of(self.ty), self.address)
    }
}
