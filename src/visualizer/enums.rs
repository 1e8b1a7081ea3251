//! Rust enum layouts as described by debug info of old rustc versions.
//!
//! Tagged enums carry a discriminant byte at the start of the value and one `RUST$ENUM$*` marker
//! field before fields of every variant. Niche-encoded enums (`Option<&T>` like) have no
//! discriminant, the active variant is decided by a [`NicheRule`].

use crate::engine::{SymTag, TypedData};
use crate::memory::MemoryGateway;
use crate::visualizer::{
    VariableMetaData, Visualization, VisualizeError, Visualizer, UNKNOWN_VALUE,
};
use std::collections::HashMap;

pub const TAGGED_ENUM_PREFIX: &str = "RUST$ENUM$";
pub const ENCODED_ENUM_PREFIX: &str = "RUST$ENCODED$ENUM$";

fn has_prefix(name: &str, prefix: &str) -> bool {
    name.len() >= prefix.len()
        && name.as_bytes()[..prefix.len()].eq_ignore_ascii_case(prefix.as_bytes())
}

/// Parse `Name = 0nValue` lines of a type definition into a value to variant name mapping.
///
/// Lines that don't follow this form are skipped.
pub fn parse_variants(definition: &str) -> HashMap<u64, String> {
    definition
        .lines()
        .filter_map(|line| {
            let (name, value) = line.split_once('=')?;
            let value = value.trim();
            let value = value.strip_prefix("0n").unwrap_or(value);
            let value: u64 = value.trim().parse().ok()?;
            Some((value, name.trim().to_string()))
        })
        .collect()
}

/// Enum with discriminant byte.
pub struct TaggedEnumVisualizer;

impl TaggedEnumVisualizer {
    fn discriminant(&self, mem: &mut MemoryGateway<'_>, data: &TypedData) -> Result<u64, VisualizeError> {
        mem.read_bytes(data.offset, 1)
            .first()
            .map(|b| *b as u64)
            .ok_or(VisualizeError::Unreadable(data.offset))
    }
}

impl Visualizer for TaggedEnumVisualizer {
    fn name(&self) -> &'static str {
        "tagged-enum"
    }

    fn can_handle(&self, mem: &mut MemoryGateway<'_>, meta: &VariableMetaData) -> bool {
        mem.field_names(&meta.data)
            .iter()
            .any(|name| has_prefix(name, TAGGED_ENUM_PREFIX))
    }

    fn handle(
        &self,
        mem: &mut MemoryGateway<'_>,
        meta: &VariableMetaData,
    ) -> Result<Visualization, VisualizeError> {
        let marker_name = mem
            .field_names(&meta.data)
            .into_iter()
            .next()
            .ok_or(VisualizeError::FieldNotFound("RUST$ENUM$"))?;
        let marker = mem.field(&meta.data, &marker_name);
        let variants = parse_variants(&mem.type_definition(&marker));
        let discriminant = self.discriminant(mem, &meta.data)?;

        let value = match variants.get(&discriminant) {
            Some(variant) => format!("{}::{variant}", meta.type_name),
            None => UNKNOWN_VALUE.to_string(),
        };
        Ok(Visualization {
            value,
            has_children: true,
        })
    }

    fn children(
        &self,
        mem: &mut MemoryGateway<'_>,
        meta: &VariableMetaData,
    ) -> Result<Vec<VariableMetaData>, VisualizeError> {
        let discriminant = self.discriminant(mem, &meta.data)?;
        let mut variant_idx: Option<u64> = None;
        let mut children = vec![];
        for name in mem.field_names(&meta.data) {
            if has_prefix(&name, TAGGED_ENUM_PREFIX) {
                variant_idx = Some(variant_idx.map_or(0, |i| i + 1));
                continue;
            }
            if variant_idx == Some(discriminant) {
                let field = mem.field(&meta.data, &name);
                children.push(VariableMetaData::resolve(mem, name, field));
            }
        }
        Ok(children)
    }
}

/// Decides which variant of a niche-encoded enum is active.
pub trait NicheRule: Send {
    fn name(&self) -> &'static str;

    /// True if the data-carrying variant is active.
    fn is_dataful(&self, mem: &mut MemoryGateway<'_>, data: &TypedData) -> Result<bool, VisualizeError>;
}

/// Null pointer optimization of rustc < 1.15: the enum value is the payload pointer
/// (the last pointer-sized word), zero means the dataless variant.
pub struct TrailingPointerRule;

impl NicheRule for TrailingPointerRule {
    fn name(&self) -> &'static str {
        "trailing-pointer-v1"
    }

    fn is_dataful(&self, mem: &mut MemoryGateway<'_>, data: &TypedData) -> Result<bool, VisualizeError> {
        let ptr_size = mem.pointer_size() as u32;
        if data.size < ptr_size {
            return Err(VisualizeError::NoData(format!(
                "{}: value of {} bytes",
                self.name(),
                data.size
            )));
        }
        let offset = data.offset + (data.size - ptr_size) as u64;
        let word = mem.read_bytes(offset, ptr_size);
        if word.len() < ptr_size as usize {
            return Err(VisualizeError::Unreadable(offset));
        }
        Ok(word.iter().any(|b| *b != 0))
    }
}

/// Parse names of the dataless and the dataful variants from a niche-encoded enum definition.
///
/// The dataless name goes after the last `$` of the marker field, the dataful one after the
/// variant path separator: `RUST$ENCODED$ENUM$0$None : Option::Some`.
pub fn parse_encoded_variants(definition: &str) -> Result<(String, String), VisualizeError> {
    let bad_definition = || VisualizeError::TypeDefinition(definition.to_string());

    let (marker, rest) = definition.split_once(':').ok_or_else(bad_definition)?;
    let marker = marker.trim();
    let none = marker
        .rfind('$')
        .map(|idx| &marker[idx + 1..])
        .unwrap_or(marker)
        .trim();

    let rest = rest.trim();
    let some = match rest.find(':') {
        Some(idx) => rest.get(idx + 2..).ok_or_else(bad_definition)?,
        None => rest,
    }
    .trim();

    if none.is_empty() || some.is_empty() {
        return Err(bad_definition());
    }
    Ok((none.to_string(), some.to_string()))
}

/// Niche-encoded enum, variant is decided by a [`NicheRule`].
pub struct EncodedEnumVisualizer {
    rule: Box<dyn NicheRule>,
}

impl EncodedEnumVisualizer {
    pub fn new(rule: Box<dyn NicheRule>) -> Self {
        Self { rule }
    }
}

impl Visualizer for EncodedEnumVisualizer {
    fn name(&self) -> &'static str {
        "encoded-enum"
    }

    fn can_handle(&self, mem: &mut MemoryGateway<'_>, meta: &VariableMetaData) -> bool {
        mem.field_names(&meta.data)
            .iter()
            .any(|name| has_prefix(name, ENCODED_ENUM_PREFIX))
    }

    fn handle(
        &self,
        mem: &mut MemoryGateway<'_>,
        meta: &VariableMetaData,
    ) -> Result<Visualization, VisualizeError> {
        let (none, some) = parse_encoded_variants(&mem.type_definition(&meta.data))?;
        let dataful = self.rule.is_dataful(mem, &meta.data)?;
        let variant = if dataful { some } else { none };
        Ok(Visualization {
            value: format!("{}::{variant}", meta.type_name),
            has_children: dataful,
        })
    }

    fn children(
        &self,
        mem: &mut MemoryGateway<'_>,
        meta: &VariableMetaData,
    ) -> Result<Vec<VariableMetaData>, VisualizeError> {
        if !self.rule.is_dataful(mem, &meta.data)? {
            return Ok(vec![]);
        }

        let (_, payload) = mem
            .fields(&meta.data)
            .into_iter()
            .next()
            .ok_or(VisualizeError::FieldNotFound("RUST$ENCODED$ENUM$"))?;
        let inner = if payload.tag == SymTag::Pointer {
            let pointee = mem.dereference(&payload);
            if pointee.is_none() {
                payload
            } else {
                pointee
            }
        } else {
            payload
        };
        Ok(vec![VariableMetaData::resolve(mem, "inner", inner)])
    }
}
