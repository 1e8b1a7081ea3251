use crate::memory::MemoryGateway;
use crate::visualizer::{
    required_field, VariableMetaData, Visualization, VisualizeError, Visualizer,
};

/// Longest string decoded from debuggee memory.
const STRING_LEN_GUARD: u64 = 64 * 1024;
/// Longest nul-terminated string read before giving up on terminator search.
const MAX_C_STRING_SIZE: u32 = 200;

const WTF8_TYPE: &str = "struct std::sys_common::wtf8::Wtf8";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StringKind {
    /// `&str`: pointer and length.
    Static,
    /// `String`: vector of bytes.
    Dynamic,
    /// `&str *`: pointer to nul-terminated bytes.
    Pointer,
}

fn string_kind(type_name: &str) -> Option<StringKind> {
    if type_name.eq_ignore_ascii_case("struct &str") || type_name.eq_ignore_ascii_case("&str") {
        return Some(StringKind::Static);
    }
    if type_name.eq_ignore_ascii_case("struct &str *") {
        return Some(StringKind::Pointer);
    }
    if type_name.contains("string::String") {
        return Some(StringKind::Dynamic);
    }
    None
}

/// Decode `len` bytes at `ptr` as utf-8.
fn decode_utf8(mem: &mut MemoryGateway<'_>, ptr: u64, len: u64) -> Result<String, VisualizeError> {
    if len == 0 {
        return Ok(String::new());
    }
    if ptr == 0 {
        return Err(VisualizeError::Unreadable(ptr));
    }

    let to_read = len.min(STRING_LEN_GUARD);
    let bytes = mem.read_bytes(ptr, to_read as u32);
    if (bytes.len() as u64) < to_read {
        return Err(VisualizeError::Unreadable(ptr));
    }
    let mut text = String::from_utf8_lossy(&bytes).into_owned();
    if to_read < len {
        text.push_str("...");
    }
    Ok(text)
}

/// Read a nul-terminated string at `offset`, at most [`MAX_C_STRING_SIZE`] bytes.
/// A string without terminator in this range ends with "...".
fn read_c_string(mem: &mut MemoryGateway<'_>, offset: u64) -> Result<String, VisualizeError> {
    let raw = mem
        .read_c_bytes(offset, MAX_C_STRING_SIZE)
        .ok_or(VisualizeError::Unreadable(offset))?;

    Ok(match raw.iter().position(|b| *b == 0) {
        Some(end) => String::from_utf8_lossy(&raw[..end]).into_owned(),
        None if raw.len() < MAX_C_STRING_SIZE as usize => String::from_utf8_lossy(&raw).into_owned(),
        None => format!("{}...", String::from_utf8_lossy(&raw)),
    })
}

/// Rust `&str` and `String` values.
pub struct StringVisualizer;

impl StringVisualizer {
    fn pointer_and_len(
        &self,
        mem: &mut MemoryGateway<'_>,
        meta: &VariableMetaData,
        kind: StringKind,
    ) -> Result<(u64, u64), VisualizeError> {
        let data = &meta.data;
        match kind {
            StringKind::Static => {
                let length = required_field(mem, data, "length")?;
                let data_ptr = mem.field(data, "data_ptr");
                let ptr = if data_ptr.is_none() {
                    mem.read_pointer(data.offset)
                } else {
                    mem.read_pointer(data_ptr.offset)
                };
                Ok((ptr, length.data))
            }
            StringKind::Dynamic => {
                let vec_name = mem
                    .field_names(data)
                    .into_iter()
                    .next()
                    .ok_or(VisualizeError::FieldNotFound("vec"))?;
                let vec = mem.field(data, &vec_name);
                let len = required_field(mem, &vec, "len")?;
                let buf = required_field(mem, &vec, "buf")?;
                Ok((mem.read_pointer(buf.offset), len.data))
            }
            StringKind::Pointer => Err(VisualizeError::NoData(meta.name.clone())),
        }
    }
}

impl Visualizer for StringVisualizer {
    fn name(&self) -> &'static str {
        "string"
    }

    fn can_handle(&self, _: &mut MemoryGateway<'_>, meta: &VariableMetaData) -> bool {
        string_kind(&meta.type_name).is_some()
    }

    fn handle(
        &self,
        mem: &mut MemoryGateway<'_>,
        meta: &VariableMetaData,
    ) -> Result<Visualization, VisualizeError> {
        let kind = string_kind(&meta.type_name)
            .ok_or_else(|| VisualizeError::NoData(meta.name.clone()))?;
        let text = match kind {
            StringKind::Pointer => {
                let pointee = mem.dereference(&meta.data);
                if pointee.is_none() {
                    return Err(VisualizeError::NoData(meta.name.clone()));
                }
                read_c_string(mem, pointee.offset)?
            }
            StringKind::Static | StringKind::Dynamic => {
                let (ptr, len) = self.pointer_and_len(mem, meta, kind)?;
                decode_utf8(mem, ptr, len)?
            }
        };
        Ok(Visualization::leaf(format!("\"{text}\"")))
    }

    fn children(
        &self,
        _: &mut MemoryGateway<'_>,
        _: &VariableMetaData,
    ) -> Result<Vec<VariableMetaData>, VisualizeError> {
        Ok(vec![])
    }
}

/// Platform strings (`OsString` internals on windows).
pub struct Wtf8Visualizer;

impl Visualizer for Wtf8Visualizer {
    fn name(&self) -> &'static str {
        "wtf8"
    }

    fn can_handle(&self, _: &mut MemoryGateway<'_>, meta: &VariableMetaData) -> bool {
        meta.type_name == WTF8_TYPE
    }

    fn handle(
        &self,
        mem: &mut MemoryGateway<'_>,
        meta: &VariableMetaData,
    ) -> Result<Visualization, VisualizeError> {
        let text = read_c_string(mem, meta.data.offset)?;
        Ok(Visualization::leaf(format!("\"{text}\"")))
    }

    fn children(
        &self,
        _: &mut MemoryGateway<'_>,
        _: &VariableMetaData,
    ) -> Result<Vec<VariableMetaData>, VisualizeError> {
        Ok(vec![])
    }
}
