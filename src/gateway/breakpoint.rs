use std::collections::HashMap;
use std::fmt::{Display, Formatter};

/// Source breakpoint as the engine sees it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Breakpoint {
    pub file: String,
    pub line: u32,
}

impl Breakpoint {
    pub fn new(file: impl Into<String>, line: u32) -> Self {
        Self {
            file: file.into(),
            line,
        }
    }
}

impl Display for Breakpoint {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.file, self.line)
    }
}

/// Result of setting one breakpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BreakpointResult {
    pub breakpoint: Breakpoint,
    pub verified: bool,
}

/// Breakpoints registered in the engine, keyed by engine breakpoint id.
///
/// Ids are never reused during the table lifetime, so an old hit notification can't be
/// attributed to a newer breakpoint.
#[derive(Debug, Default)]
pub struct BreakpointTable {
    last_id: u32,
    by_id: HashMap<u32, Breakpoint>,
    by_file: HashMap<String, Vec<u32>>,
}

impl BreakpointTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&mut self) -> u32 {
        self.last_id += 1;
        self.last_id
    }

    pub fn insert(&mut self, id: u32, breakpoint: Breakpoint) {
        self.by_file
            .entry(breakpoint.file.clone())
            .or_default()
            .push(id);
        self.by_id.insert(id, breakpoint);
    }

    /// Forget all breakpoints of a file, return their ids.
    pub fn take_file(&mut self, file: &str) -> Vec<u32> {
        let ids = self.by_file.remove(file).unwrap_or_default();
        for id in &ids {
            self.by_id.remove(id);
        }
        ids
    }

    pub fn get(&self, id: u32) -> Option<&Breakpoint> {
        self.by_id.get(&id)
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}
