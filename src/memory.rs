//! Typed-memory gateway.
//!
//! Synchronous façade over engine typed-data primitives. No operation here fails: an engine error
//! is logged and turned into a "no data" value ([`TypedData::NONE`], empty bytes, empty text).

use crate::engine::{DataSpaces, TextRequest, TypedData, TypedRequest};
use crate::muted_error;
use bytes::Bytes;
use indexmap::IndexMap;
use lru::LruCache;
use std::num::NonZeroUsize;

const TYPE_NAME_CACHE_SIZE: usize = 1024;

/// Cache of resolved type names, keyed by module base and type id.
pub struct TypeNameCache(LruCache<(u64, u32), String>);

impl TypeNameCache {
    pub fn new() -> Self {
        let cap = NonZeroUsize::new(TYPE_NAME_CACHE_SIZE).unwrap_or(NonZeroUsize::MIN);
        Self(LruCache::new(cap))
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }
}

impl Default for TypeNameCache {
    fn default() -> Self {
        Self::new()
    }
}

pub struct MemoryGateway<'a> {
    spaces: &'a mut dyn DataSpaces,
    type_names: &'a mut TypeNameCache,
    pointer_size: u8,
}

impl<'a> MemoryGateway<'a> {
    pub fn new(
        spaces: &'a mut dyn DataSpaces,
        type_names: &'a mut TypeNameCache,
        pointer_size: u8,
    ) -> Self {
        Self {
            spaces,
            type_names,
            pointer_size,
        }
    }

    /// Size of debuggee pointer in bytes.
    pub fn pointer_size(&self) -> u8 {
        self.pointer_size
    }

    pub fn create(&mut self, module_base: u64, offset: u64, type_id: u32) -> TypedData {
        self.request(TypedRequest::FromTypeId {
            module_base,
            offset,
            type_id,
        })
    }

    pub fn dereference(&mut self, data: &TypedData) -> TypedData {
        if data.is_none() {
            return TypedData::NONE;
        }
        self.request(TypedRequest::Dereference(data))
    }

    pub fn field(&mut self, data: &TypedData, name: &str) -> TypedData {
        if data.is_none() {
            return TypedData::NONE;
        }
        self.request(TypedRequest::Field(data, name))
    }

    pub fn array_element(&mut self, data: &TypedData, index: u64) -> TypedData {
        if data.is_none() {
            return TypedData::NONE;
        }
        self.request(TypedRequest::ArrayElement(data, index))
    }

    pub fn evaluate(&mut self, expression: &str) -> TypedData {
        self.request(TypedRequest::Evaluate(expression))
    }

    fn request(&mut self, request: TypedRequest<'_>) -> TypedData {
        muted_error!(self.spaces.typed_data(request), "typed data request:").unwrap_or_default()
    }

    pub fn read_bytes(&mut self, offset: u64, size: u32) -> Bytes {
        muted_error!(self.spaces.read_virtual(offset, size), "read memory:")
            .map(Bytes::from)
            .unwrap_or_default()
    }

    /// Read NUL terminated string (at most `max_len` bytes), invalid UTF-8 sequences are replaced.
    pub fn read_string(&mut self, offset: u64, max_len: u32) -> String {
        let raw = muted_error!(self.spaces.read_string(offset, max_len), "read string:")
            .unwrap_or_default();
        let end = raw.iter().position(|b| *b == 0).unwrap_or(raw.len());
        String::from_utf8_lossy(&raw[..end]).into_owned()
    }

    /// Raw bytes of a NUL terminated string (at most `max_len`), `None` if memory is unreadable.
    pub fn read_c_bytes(&mut self, offset: u64, max_len: u32) -> Option<Vec<u8>> {
        muted_error!(self.spaces.read_string(offset, max_len), "read string:")
    }

    /// Read little-endian unsigned integer of `size` bytes (at most 8), 0 on failure.
    pub fn read_uint(&mut self, offset: u64, size: u8) -> u64 {
        let size = size.min(8);
        let bytes = self.read_bytes(offset, size as u32);
        if bytes.len() < size as usize {
            return 0;
        }
        let mut buf = [0u8; 8];
        buf[..size as usize].copy_from_slice(&bytes[..size as usize]);
        u64::from_le_bytes(buf)
    }

    /// Read pointer-sized value at `offset`.
    pub fn read_pointer(&mut self, offset: u64) -> u64 {
        self.read_uint(offset, self.pointer_size)
    }

    pub fn write_bytes(&mut self, offset: u64, bytes: &[u8]) -> bool {
        muted_error!(self.spaces.write_virtual(offset, bytes), "write memory:")
            .map(|written| written as usize == bytes.len())
            .unwrap_or(false)
    }

    pub fn type_definition(&mut self, data: &TypedData) -> String {
        if data.is_none() {
            return String::new();
        }
        muted_error!(
            self.spaces.typed_text(TextRequest::TypeDefinition, data),
            "output type definition:"
        )
        .unwrap_or_default()
    }

    pub fn short_value(&mut self, data: &TypedData) -> String {
        if data.is_none() {
            return String::new();
        }
        muted_error!(
            self.spaces.typed_text(TextRequest::SimpleValue, data),
            "output value:"
        )
        .map(|text| text.trim().to_string())
        .unwrap_or_default()
    }

    pub fn field_names(&mut self, data: &TypedData) -> Vec<String> {
        if data.is_none() {
            return vec![];
        }
        muted_error!(self.spaces.field_names(data), "enumerate fields:").unwrap_or_default()
    }

    /// Fields of a value in declaration order.
    pub fn fields(&mut self, data: &TypedData) -> IndexMap<String, TypedData> {
        self.field_names(data)
            .into_iter()
            .map(|name| {
                let field = self.field(data, &name);
                (name, field)
            })
            .collect()
    }

    pub fn type_name(&mut self, data: &TypedData) -> String {
        if data.is_none() {
            return String::new();
        }
        let key = (data.module_base, data.type_id);
        if let Some(name) = self.type_names.0.get(&key) {
            return name.clone();
        }

        let name = muted_error!(
            self.spaces.type_name(data.module_base, data.type_id),
            "type name:"
        )
        .unwrap_or_default();
        if !name.is_empty() {
            self.type_names.0.put(key, name.clone());
        }
        name
    }
}
