use crate::engine::{SymTag, TypedData};
use crate::memory::MemoryGateway;
use crate::visualizer::{
    array_children, required_field, VariableMetaData, Visualization, VisualizeError, Visualizer,
};

const VEC_TYPE_PREFIXES: [&str; 3] = [
    "struct collections::vec::Vec",
    "struct alloc::vec::Vec",
    "alloc::vec::Vec",
];

/// Max depth of wrapper structures (`RawVec`, `Unique`, `NonNull`) around a buffer pointer.
const MAX_POINTER_DEPTH: usize = 6;

/// Descend through first fields of `data` until a pointer typed value.
fn find_pointer(mem: &mut MemoryGateway<'_>, data: &TypedData) -> Option<TypedData> {
    let mut current = *data;
    for _ in 0..MAX_POINTER_DEPTH {
        if current.is_none() {
            return None;
        }
        if current.tag == SymTag::Pointer {
            return Some(current);
        }
        let first = mem.field_names(&current).into_iter().next()?;
        current = mem.field(&current, &first);
    }
    None
}

/// `Vec<T>` values.
pub struct VecVisualizer;

impl Visualizer for VecVisualizer {
    fn name(&self) -> &'static str {
        "vec"
    }

    fn can_handle(&self, _: &mut MemoryGateway<'_>, meta: &VariableMetaData) -> bool {
        VEC_TYPE_PREFIXES
            .iter()
            .any(|prefix| meta.type_name.starts_with(prefix))
    }

    fn handle(
        &self,
        mem: &mut MemoryGateway<'_>,
        meta: &VariableMetaData,
    ) -> Result<Visualization, VisualizeError> {
        let len = required_field(mem, &meta.data, "len")?.data;
        let generics = meta
            .type_name
            .find("Vec")
            .map(|idx| &meta.type_name[idx + 3..])
            .unwrap_or_default();
        Ok(Visualization {
            value: format!("Vec{generics} [{len}]"),
            has_children: len > 0,
        })
    }

    fn children(
        &self,
        mem: &mut MemoryGateway<'_>,
        meta: &VariableMetaData,
    ) -> Result<Vec<VariableMetaData>, VisualizeError> {
        let len = required_field(mem, &meta.data, "len")?.data;
        let buf = required_field(mem, &meta.data, "buf")?;
        let ptr = find_pointer(mem, &buf).ok_or(VisualizeError::FieldNotFound("buf.ptr"))?;
        Ok(array_children(mem, &ptr, len))
    }
}

/// `&[T]` values.
pub struct SliceVisualizer;

impl Visualizer for SliceVisualizer {
    fn name(&self) -> &'static str {
        "slice"
    }

    fn can_handle(&self, _: &mut MemoryGateway<'_>, meta: &VariableMetaData) -> bool {
        meta.type_name.contains("&[")
    }

    fn handle(
        &self,
        mem: &mut MemoryGateway<'_>,
        meta: &VariableMetaData,
    ) -> Result<Visualization, VisualizeError> {
        let len = required_field(mem, &meta.data, "length")?.data;
        Ok(Visualization {
            value: format!("{} [{len}]", meta.type_name),
            has_children: len > 0,
        })
    }

    fn children(
        &self,
        mem: &mut MemoryGateway<'_>,
        meta: &VariableMetaData,
    ) -> Result<Vec<VariableMetaData>, VisualizeError> {
        let len = required_field(mem, &meta.data, "length")?.data;
        let data_ptr = required_field(mem, &meta.data, "data_ptr")?;
        Ok(array_children(mem, &data_ptr, len))
    }
}
