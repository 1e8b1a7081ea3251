use crate::engine::SymTag;
use crate::memory::MemoryGateway;
use crate::visualizer::{
    array_children, array_len, VariableMetaData, Visualization, VisualizeError, Visualizer,
};

/// Structural visualizer: pointers, arrays and plain structures, accepts any value.
pub struct StructuralVisualizer;

impl Visualizer for StructuralVisualizer {
    fn name(&self) -> &'static str {
        "structural"
    }

    fn can_handle(&self, _: &mut MemoryGateway<'_>, _: &VariableMetaData) -> bool {
        true
    }

    fn handle(
        &self,
        mem: &mut MemoryGateway<'_>,
        meta: &VariableMetaData,
    ) -> Result<Visualization, VisualizeError> {
        let data = &meta.data;
        if data.is_none() {
            return Err(VisualizeError::NoData(meta.name.clone()));
        }

        let visualization = match data.tag {
            SymTag::Pointer => Visualization {
                value: format!("{:#x} ({})", data.data, meta.type_name),
                has_children: data.data != 0,
            },
            SymTag::Array => Visualization {
                value: meta.type_name.clone(),
                has_children: array_len(mem, data) > 0,
            },
            _ => {
                let has_children = !mem.field_names(data).is_empty();
                Visualization {
                    value: mem.short_value(data),
                    has_children,
                }
            }
        };
        Ok(visualization)
    }

    fn children(
        &self,
        mem: &mut MemoryGateway<'_>,
        meta: &VariableMetaData,
    ) -> Result<Vec<VariableMetaData>, VisualizeError> {
        let data = &meta.data;
        match data.tag {
            SymTag::Pointer => {
                if data.data == 0 {
                    return Ok(vec![]);
                }
                let inner = mem.dereference(data);
                if inner.is_none() {
                    return Err(VisualizeError::NoData(format!("*{}", meta.name)));
                }
                Ok(vec![VariableMetaData::resolve(mem, "inner", inner)])
            }
            SymTag::Array => {
                let len = array_len(mem, data);
                Ok(array_children(mem, data, len))
            }
            _ => Ok(mem
                .fields(data)
                .into_iter()
                .map(|(name, field)| VariableMetaData::resolve(mem, name, field))
                .collect()),
        }
    }
}
