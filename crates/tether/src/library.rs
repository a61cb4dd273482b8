//! The library facade: name lookup, scratch allocation, raw memory ops.
//!
//! A [`Lib`] owns the type graph, the commander, and the scratch allocator,
//! and hands out borrowed [`VarProxy`]/[`FuncProxy`] handles. Lookups
//! mirror an FFI binding: `lib.get("counter")` resolves a global,
//! `lib.get("f")` a function, and `lib.new_var("uint8_t [10]")` places a
//! fresh zeroed object in the target's scratch region.
//!
//! Everything is single-threaded; interior mutability (`RefCell`) covers
//! the commander, the allocator, and on-the-fly type synthesis. Callers
//! wanting to share a `Lib` across threads must wrap it in a mutex
//! themselves.

use std::cell::{Ref, RefCell, RefMut};

use tether_elf::Endian;

use crate::alloc::ScratchAllocator;
use crate::error::{Error, Result};
use crate::graph::{TypeGraph, TypeId, TypeKind, UNSIZED};
use crate::proto::Commander;
use crate::proxy::{CachedData, FuncProxy, Value, VarProxy};

/// Default name of the target-side scratch region symbol.
pub const DEFAULT_HEAP_SYMBOL: &str = "gti2_memory";

/// Default prefix of companion-generated symbols.
pub const COMPANION_PREFIX: &str = "_gti2_";

/// Default prefix of companion out-pointer call variants.
pub const COMPANION_PREFIX_PTR: &str = "_gti2_ptr_";

/// Initializer for a fresh scratch object.
pub enum NewInit<'v, 'l> {
    /// Leave it zeroed.
    Zeroed,
    /// Element count for an unsized array declaration.
    Len(usize),
    /// A scalar value.
    Int(i64),
    /// Positional element values.
    Ints(Vec<i64>),
    /// Raw bytes (also sizes an unsized array declaration).
    Bytes(Vec<u8>),
    /// A proxy, stored into a pointer object.
    Var(&'v VarProxy<'l>),
}

/// The facade over one attached target.
pub struct Lib {
    graph: RefCell<TypeGraph>,
    com: RefCell<Commander>,
    heap: RefCell<Option<ScratchAllocator>>,
    cffi_compat: RefCell<bool>,
    companion_prefix: String,
    companion_prefix_ptr: String,
}

impl Lib {
    /// Binds a type graph to a connected commander.
    ///
    /// The commander's word size is forced to the pointer width the DWARF
    /// data declared.
    #[must_use]
    pub fn attach(graph: TypeGraph, mut com: Commander) -> Self {
        com.word_size = graph.word_size;
        Self {
            graph: RefCell::new(graph),
            com: RefCell::new(com),
            heap: RefCell::new(None),
            cffi_compat: RefCell::new(true),
            companion_prefix: COMPANION_PREFIX.into(),
            companion_prefix_ptr: COMPANION_PREFIX_PTR.into(),
        }
    }

    /// Overrides the companion symbol prefixes.
    #[must_use]
    pub fn with_companion_prefix(mut self, prefix: &str, prefix_ptr: &str) -> Self {
        self.companion_prefix = prefix.into();
        self.companion_prefix_ptr = prefix_ptr.into();
        self
    }

    /// Locates the scratch region by symbol name and arms the allocator.
    ///
    /// # Errors
    ///
    /// [`Error::UnknownType`] when the symbol is absent,
    /// [`Error::UnknownAddress`] when it has no address.
    pub fn init_heap(&self, symbol: &str) -> Result<()> {
        let heap_var = self.var(symbol)?;
        let size = u64::try_from(heap_var.byte_size()).unwrap_or(0);
        *self.heap.borrow_mut() = Some(ScratchAllocator::new(heap_var.address(), size));
        Ok(())
    }

    /// Read access to the type graph.
    #[must_use]
    pub fn graph(&self) -> Ref<'_, TypeGraph> {
        self.graph.borrow()
    }

    // -- name resolution ---------------------------------------------------

    fn resolve(&self, name: &str) -> Result<TypeId> {
        let graph = self.graph.borrow();
        graph
            .lookup(name)
            .or_else(|| graph.lookup(&format!("{}{name}", self.companion_prefix)))
            .ok_or_else(|| Error::UnknownType(name.into()))
    }

    /// Looks up a global name.
    ///
    /// Variables produce proxies (or, in compatibility mode, plain
    /// integers for scalars); functions produce callables, with
    /// wide-struct returns transparently redirected to their companion
    /// out-pointer variant.
    ///
    /// # Errors
    ///
    /// [`Error::UnknownType`] for unknown names, [`Error::TypeMismatch`]
    /// for names that are plain types, [`Error::UnknownAddress`] for
    /// unresolved externs.
    pub fn get(&self, name: &str) -> Result<Value<'_>> {
        let id = self.resolve(name)?;
        match self.kind_of(id) {
            TypeKind::Variable { .. } => {
                let proxy = self.var_from_id(name, id)?;
                if *self.cffi_compat.borrow() && proxy.length() == UNSIZED {
                    if let TypeKind::Int { .. } = self.kind_of(proxy.type_id()) {
                        return Ok(Value::Int(proxy.get_int(0)?));
                    }
                }
                Ok(Value::Var(proxy))
            }
            TypeKind::Function { return_type, .. } => {
                // Struct-by-value returns wider than a word cannot come
                // back through the call primitive; use the companion.
                let wide = return_type
                    .map(|ty| {
                        !matches!(self.kind_of(ty), TypeKind::Pointer { .. })
                            && self.size_of(ty) > self.word_size() as i64
                    })
                    .unwrap_or(false);
                let id = if wide {
                    let redirect = format!("{}{name}", self.companion_prefix_ptr);
                    self.graph
                        .borrow()
                        .lookup(&redirect)
                        .ok_or(Error::UnknownType(redirect))?
                } else {
                    id
                };
                let TypeKind::Function { address, .. } = self.kind_of(id) else {
                    return Err(Error::TypeMismatch("companion symbol is not a function"));
                };
                let address = address.ok_or_else(|| Error::UnknownAddress(name.into()))?;
                Ok(Value::Func(FuncProxy::new(self, id, address)))
            }
            _ => Err(Error::TypeMismatch("neither a variable nor a function")),
        }
    }

    /// Looks up a global variable as a proxy, bypassing compatibility-mode
    /// unwrapping.
    ///
    /// # Errors
    ///
    /// See [`Lib::get`].
    pub fn var(&self, name: &str) -> Result<VarProxy<'_>> {
        let id = self.resolve(name)?;
        match self.kind_of(id) {
            TypeKind::Variable { .. } => self.var_from_id(name, id),
            _ => Err(Error::TypeMismatch("not a variable")),
        }
    }

    /// Looks up a function.
    ///
    /// # Errors
    ///
    /// See [`Lib::get`].
    pub fn func(&self, name: &str) -> Result<FuncProxy<'_>> {
        self.get(name)?.into_func()
    }

    fn var_from_id(&self, name: &str, id: TypeId) -> Result<VarProxy<'_>> {
        let TypeKind::Variable { ty, address, data } = self.kind_of(id) else {
            return Err(Error::TypeMismatch("not a variable"));
        };
        let address = address.ok_or_else(|| Error::UnknownAddress(name.into()))?;
        Ok(VarProxy::from_parts(
            self,
            ty,
            address,
            UNSIZED,
            data.map(CachedData::new),
            None,
        ))
    }

    // -- scratch objects ---------------------------------------------------

    /// Allocates a zeroed scratch object from a textual declaration.
    ///
    /// # Errors
    ///
    /// See [`Lib::new_var_with`].
    pub fn new_var(&self, decl: &str) -> Result<VarProxy<'_>> {
        self.new_var_with(decl, NewInit::Zeroed)
    }

    /// Allocates a scratch object and initializes it.
    ///
    /// `"uint8_t [10]"` places a ten-byte array; `"uint32_t *"` places a
    /// single `uint32_t`; an unsized `"uint8_t []"` takes its length from
    /// [`NewInit::Len`], [`NewInit::Bytes`], or [`NewInit::Ints`]. The
    /// object is zeroed before any initializer is applied.
    ///
    /// # Errors
    ///
    /// [`Error::UnknownType`], [`Error::OutOfMemory`], allocation without
    /// [`Lib::init_heap`], and link errors.
    pub fn new_var_with(&self, decl: &str, init: NewInit<'_, '_>) -> Result<VarProxy<'_>> {
        let mut id = self.graph.borrow_mut().type_from_string(decl)?;

        // Size an unsized array declaration from its initializer.
        if let TypeKind::Array {
            base,
            length: UNSIZED,
        } = self.kind_of(id)
        {
            let length = match &init {
                NewInit::Len(n) => *n,
                NewInit::Bytes(bytes) => bytes.len(),
                NewInit::Ints(values) => values.len(),
                _ => return Err(Error::UnsizedArray),
            };
            id = self
                .graph
                .borrow_mut()
                .sized_array(base, i64::try_from(length).unwrap_or(0));
        }

        let proxy = self.new_from_type(id)?;
        match init {
            NewInit::Zeroed | NewInit::Len(_) => {}
            NewInit::Int(v) => proxy.set(0, v.into())?,
            NewInit::Ints(values) => proxy.set_ints(0, &values)?,
            NewInit::Bytes(bytes) => proxy.set_bytes(0, &bytes)?,
            NewInit::Var(var) => proxy.set(0, var.into())?,
        }
        Ok(proxy)
    }

    /// Allocates a byte buffer in scratch and copies `bytes` into it.
    ///
    /// # Errors
    ///
    /// See [`Lib::new_var_with`].
    pub fn new_bytes(&self, bytes: &[u8]) -> Result<VarProxy<'_>> {
        self.new_var_with("uint8_t []", NewInit::Bytes(bytes.to_vec()))
    }

    /// Allocates a zeroed scratch object for an already-resolved type.
    ///
    /// Pointer types allocate their pointee (`new` of `"T *"` places a
    /// `T`); array types allocate the whole array.
    ///
    /// # Errors
    ///
    /// See [`Lib::new_var_with`].
    pub fn new_from_type(&self, id: TypeId) -> Result<VarProxy<'_>> {
        let elem = match self.kind_of(id) {
            TypeKind::Pointer { base } => base,
            _ => id,
        };
        // from_parts flattens arrays into (element, length).
        let shape = VarProxy::from_parts(self, elem, 0, UNSIZED, None, None);
        let required = u64::try_from(shape.byte_size())
            .map_err(|_| Error::TypeMismatch("cannot size allocation"))?;

        let allocation = {
            let mut heap = self.heap.borrow_mut();
            let heap = heap
                .as_mut()
                .ok_or(Error::TypeMismatch("scratch allocator not initialized"))?;
            heap.allocate(required)?
        };
        let address = allocation.address;
        self.memset(address, 0, required as usize)?;
        Ok(VarProxy::from_parts(
            self,
            elem,
            address,
            shape.length(),
            None,
            Some(allocation),
        ))
    }

    /// Explicitly releases a proxy's scratch slot.
    pub fn free(&self, var: &VarProxy<'_>) {
        if let Some(allocation) = var.keepalive() {
            if let Some(heap) = self.heap.borrow_mut().as_mut() {
                heap.free(allocation);
            }
        }
    }

    // -- raw memory --------------------------------------------------------

    /// Fills `len` bytes at `addr` with `value`.
    ///
    /// # Errors
    ///
    /// Link errors.
    pub fn memset(&self, addr: u64, value: u8, len: usize) -> Result<()> {
        self.com.borrow_mut().memory_write(addr, &vec![value; len])
    }

    /// Copies `len` bytes from `src` to `dst` inside the target.
    ///
    /// # Errors
    ///
    /// Link errors.
    pub fn memmove(&self, dst: u64, src: u64, len: usize) -> Result<()> {
        let bytes = self.com.borrow_mut().memory_read(src, len)?;
        self.com.borrow_mut().memory_write(dst, &bytes)
    }

    /// Reads raw target memory.
    ///
    /// # Errors
    ///
    /// Link errors.
    pub fn read_mem(&self, addr: u64, len: usize) -> Result<Vec<u8>> {
        self.com.borrow_mut().memory_read(addr, len)
    }

    /// Writes raw target memory.
    ///
    /// # Errors
    ///
    /// Link errors.
    pub fn write_mem(&self, addr: u64, bytes: &[u8]) -> Result<()> {
        self.com.borrow_mut().memory_write(addr, bytes)
    }

    /// Round-trips bytes through the target.
    ///
    /// # Errors
    ///
    /// Link errors.
    pub fn echo(&self, bytes: &[u8]) -> Result<Vec<u8>> {
        self.com.borrow_mut().echo(bytes)
    }

    /// Total byte size of the object behind a proxy.
    #[must_use]
    pub fn sizeof_var(&self, var: &VarProxy<'_>) -> i64 {
        var.byte_size()
    }

    /// Target address of the object behind a proxy.
    #[must_use]
    pub fn addressof(&self, var: &VarProxy<'_>) -> u64 {
        var.address()
    }

    // -- accessors used by the proxy layer ---------------------------------

    pub(crate) fn kind_of(&self, id: TypeId) -> TypeKind {
        self.graph.borrow().node(id).kind.clone()
    }

    pub(crate) fn size_of(&self, id: TypeId) -> i64 {
        self.graph.borrow().size_of(id)
    }

    pub(crate) fn typename_of(&self, id: TypeId) -> String {
        self.graph.borrow().node(id).typename.clone()
    }

    pub(crate) fn endian(&self) -> Endian {
        self.graph.borrow().endian
    }

    pub(crate) fn word_size(&self) -> usize {
        self.graph.borrow().word_size
    }

    pub(crate) fn com(&self) -> RefMut<'_, Commander> {
        self.com.borrow_mut()
    }

    /// Whether compatibility mode is on (the default): scalar globals
    /// unwrap to integers and length-unspecified pointer members
    /// auto-dereference once on access.
    #[must_use]
    pub fn cffi_compat(&self) -> bool {
        *self.cffi_compat.borrow()
    }

    /// Toggles compatibility mode. Turn it off to make every access
    /// explicit for bit-level tests.
    pub fn set_cffi_compat(&self, on: bool) {
        *self.cffi_compat.borrow_mut() = on;
    }

    pub(crate) fn companion_prefix_ptr(&self) -> &str {
        &self.companion_prefix_ptr
    }
}
