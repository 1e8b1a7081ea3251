//! Visualizer chain.
//!
//! Turns typed-memory handles into display values. A [`VisualizerRegistry`] holds an ordered list
//! of type specific visualizers and a structural default; the first visualizer whose predicate
//! accepts a value decodes it.

pub mod collection;
pub mod default;
pub mod enums;
pub mod string;

pub use collection::{SliceVisualizer, VecVisualizer};
pub use default::StructuralVisualizer;
pub use enums::{EncodedEnumVisualizer, NicheRule, TaggedEnumVisualizer, TrailingPointerRule};
pub use string::{StringVisualizer, Wtf8Visualizer};

use crate::engine::TypedData;
use crate::memory::MemoryGateway;
use log::warn;

/// Value shown when no visualizer can decode a value.
pub const UNIDENTIFIED_VALUE: &str = "<could not identify value>";
/// Value shown for enum discriminants without known variant.
pub const UNKNOWN_VALUE: &str = "<Unknown>";
/// Limit of array elements exposed as children.
pub const LEN_GUARD: u64 = 10_000;

/// Decoding input: a named typed-memory handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariableMetaData {
    pub name: String,
    pub type_name: String,
    pub data: TypedData,
}

impl VariableMetaData {
    pub fn new(name: impl Into<String>, type_name: impl Into<String>, data: TypedData) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
            data,
        }
    }

    /// Create metadata with a type name resolved from the engine.
    pub fn resolve(mem: &mut MemoryGateway<'_>, name: impl Into<String>, data: TypedData) -> Self {
        let type_name = mem.type_name(&data);
        Self::new(name, type_name, data)
    }
}

/// Decoding output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Visualization {
    pub value: String,
    pub has_children: bool,
}

impl Visualization {
    pub fn leaf(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            has_children: false,
        }
    }

    pub fn unidentified() -> Self {
        Self::leaf(UNIDENTIFIED_VALUE)
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum VisualizeError {
    #[error("no data for `{0}`")]
    NoData(String),
    #[error("field `{0}` not found")]
    FieldNotFound(&'static str),
    #[error("memory at {0:#x} is not readable")]
    Unreadable(u64),
    #[error("unrecognized type definition: {0}")]
    TypeDefinition(String),
}

pub trait Visualizer: Send {
    fn name(&self) -> &'static str;

    fn can_handle(&self, mem: &mut MemoryGateway<'_>, meta: &VariableMetaData) -> bool;

    fn handle(
        &self,
        mem: &mut MemoryGateway<'_>,
        meta: &VariableMetaData,
    ) -> Result<Visualization, VisualizeError>;

    /// Direct children of a value, never visits grandchildren.
    fn children(
        &self,
        mem: &mut MemoryGateway<'_>,
        meta: &VariableMetaData,
    ) -> Result<Vec<VariableMetaData>, VisualizeError>;
}

pub struct VisualizerRegistry {
    visualizers: Vec<Box<dyn Visualizer>>,
    default: Box<dyn Visualizer>,
}

impl VisualizerRegistry {
    pub fn new(default: Box<dyn Visualizer>) -> Self {
        Self {
            visualizers: vec![],
            default,
        }
    }

    /// Registry with all rust visualizers, more specific first.
    pub fn with_rust_visualizers() -> Self {
        let mut registry = Self::new(Box::new(StructuralVisualizer));
        registry.register(Box::new(StringVisualizer));
        registry.register(Box::new(Wtf8Visualizer));
        registry.register(Box::new(VecVisualizer));
        registry.register(Box::new(SliceVisualizer));
        registry.register(Box::new(TaggedEnumVisualizer));
        registry.register(Box::new(EncodedEnumVisualizer::new(Box::new(
            TrailingPointerRule,
        ))));
        registry
    }

    /// Append visualizer, it takes precedence over the default and all visualizers added later.
    pub fn register(&mut self, visualizer: Box<dyn Visualizer>) {
        self.visualizers.push(visualizer);
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.visualizers
            .iter()
            .chain(std::iter::once(&self.default))
            .map(|v| v.name())
    }

    fn find(&self, mem: &mut MemoryGateway<'_>, meta: &VariableMetaData) -> Option<&dyn Visualizer> {
        self.visualizers
            .iter()
            .find(|v| v.can_handle(mem, meta))
            .map(|v| v.as_ref())
    }

    /// Decode a value. Never fails: falls back to the default visualizer and then to a sentinel.
    pub fn resolve(&self, mem: &mut MemoryGateway<'_>, meta: &VariableMetaData) -> Visualization {
        if let Some(visualizer) = self.find(mem, meta) {
            match visualizer.handle(mem, meta) {
                Ok(v) => return v,
                Err(e) => {
                    warn!(target: "visualizer", "{} failed on `{}` ({}): {e:#}", visualizer.name(), meta.name, meta.type_name)
                }
            }
        }

        self.default.handle(mem, meta).unwrap_or_else(|e| {
            warn!(target: "visualizer", "{} failed on `{}` ({}): {e:#}", self.default.name(), meta.name, meta.type_name);
            Visualization::unidentified()
        })
    }

    /// Children of a value, empty if they can't be decoded.
    pub fn children(
        &self,
        mem: &mut MemoryGateway<'_>,
        meta: &VariableMetaData,
    ) -> Vec<VariableMetaData> {
        let visualizer = self.find(mem, meta).unwrap_or(self.default.as_ref());
        visualizer.children(mem, meta).unwrap_or_else(|e| {
            warn!(target: "visualizer", "{} can't expand `{}`: {e:#}", visualizer.name(), meta.name);
            vec![]
        })
    }
}

impl Default for VisualizerRegistry {
    fn default() -> Self {
        Self::with_rust_visualizers()
    }
}

/// Number of elements in an array typed value, 0 if element size is unknown.
pub(crate) fn array_len(mem: &mut MemoryGateway<'_>, array: &TypedData) -> u64 {
    let element = mem.dereference(array);
    if element.size == 0 {
        return 0;
    }
    (array.size / element.size) as u64
}

/// Elements `[0..len)` of an array or pointer typed value.
pub(crate) fn array_children(
    mem: &mut MemoryGateway<'_>,
    base: &TypedData,
    len: u64,
) -> Vec<VariableMetaData> {
    (0..len.min(LEN_GUARD))
        .map(|i| {
            let element = mem.array_element(base, i);
            VariableMetaData::resolve(mem, format!("[{i}]"), element)
        })
        .collect()
}

/// Look up a field, `FieldNotFound` if engine has no data for it.
pub(crate) fn required_field(
    mem: &mut MemoryGateway<'_>,
    data: &TypedData,
    name: &'static str,
) -> Result<TypedData, VisualizeError> {
    let field = mem.field(data, name);
    if field.is_none() {
        return Err(VisualizeError::FieldNotFound(name));
    }
    Ok(field)
}
