//! Entity state store.
//!
//! Indexed graph of threads, frames, scopes and variables of a stopped debuggee. Every entity gets a
//! handle from one counter shared by all kinds, so a protocol reference designates exactly one
//! entity. The whole store is valid only until the debuggee resumes, see [`StateStore::clear`].

use crate::engine::ScopeKind;
use crate::visualizer::VariableMetaData;
use indexmap::IndexMap;
use log::warn;
use std::collections::HashMap;
use std::fmt::{Display, Formatter};
use strum_macros::Display as StrumDisplay;

/// Limit of parent edges followed by reverse lookups.
const MAX_ANCESTOR_DEPTH: usize = 512;

/// Protocol visible entity handle. Zero is never issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Handle(i64);

impl Handle {
    /// "No children" reference.
    pub const NONE: Handle = Handle(0);

    pub fn from_raw(raw: i64) -> Self {
        Handle(raw)
    }

    pub fn as_raw(self) -> i64 {
        self.0
    }

    pub fn is_none(self) -> bool {
        self.0 == 0
    }
}

impl Display for Handle {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, StrumDisplay)]
#[strum(serialize_all = "lowercase")]
pub enum EntityKind {
    Thread,
    Frame,
    Scope,
    Variable,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Thread {
    pub handle: Handle,
    pub system_id: u32,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub handle: Handle,
    pub instruction_offset: u64,
    /// Frame number in the stack, 0 is the innermost frame.
    pub order: u32,
    pub file: Option<String>,
    pub line: u32,
    pub function: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Scope {
    pub handle: Handle,
    pub kind: ScopeKind,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    pub handle: Handle,
    pub name: String,
    pub type_name: String,
    pub value: String,
    pub has_children: bool,
    pub meta: VariableMetaData,
}

impl Variable {
    /// Protocol reference for expansion, [`Handle::NONE`] if variable has no children.
    pub fn reference(&self) -> Handle {
        if self.has_children {
            self.handle
        } else {
            Handle::NONE
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Entity {
    Thread(Thread),
    Frame(Frame),
    Scope(Scope),
    Variable(Variable),
}

impl Entity {
    pub fn kind(&self) -> EntityKind {
        match self {
            Entity::Thread(_) => EntityKind::Thread,
            Entity::Frame(_) => EntityKind::Frame,
            Entity::Scope(_) => EntityKind::Scope,
            Entity::Variable(_) => EntityKind::Variable,
        }
    }
}

/// Entity reference returned by [`StateStore::get`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EntityRef<'a> {
    Thread(&'a Thread),
    Frame(&'a Frame),
    Scope(&'a Scope),
    Variable(&'a Variable),
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum StateError {
    #[error("unknown parent handle {0}")]
    UnknownParent(Handle),
    #[error("{child} can't be a child of {parent} ({parent_kind})")]
    InvalidParent {
        child: EntityKind,
        parent: Handle,
        parent_kind: EntityKind,
    },
    #[error("thread entity must be registered with `add_thread`")]
    ThreadIsRoot,
}

#[derive(Default)]
pub struct StateStore {
    last_handle: i64,

    threads: IndexMap<Handle, Thread>,
    thread_by_system_id: HashMap<u32, Handle>,
    frames: IndexMap<Handle, Frame>,
    scopes: IndexMap<Handle, Scope>,
    variables: IndexMap<Handle, Variable>,

    parents: HashMap<Handle, Handle>,
    children: HashMap<Handle, Vec<Handle>>,

    current_thread: Option<u32>,
    current_frame: Option<Handle>,
}

impl StateStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_handle(&mut self) -> Handle {
        self.last_handle += 1;
        Handle(self.last_handle)
    }

    fn kind_of(&self, handle: Handle) -> Option<EntityKind> {
        if self.threads.contains_key(&handle) {
            Some(EntityKind::Thread)
        } else if self.frames.contains_key(&handle) {
            Some(EntityKind::Frame)
        } else if self.scopes.contains_key(&handle) {
            Some(EntityKind::Scope)
        } else if self.variables.contains_key(&handle) {
            Some(EntityKind::Variable)
        } else {
            None
        }
    }

    /// Register a thread by its system id, return handle of already known thread if any.
    pub fn add_thread(&mut self, system_id: u32, name: impl Into<String>) -> Handle {
        if let Some(handle) = self.thread_by_system_id.get(&system_id) {
            return *handle;
        }
        let handle = self.next_handle();
        self.threads.insert(
            handle,
            Thread {
                handle,
                system_id,
                name: name.into(),
            },
        );
        self.thread_by_system_id.insert(system_id, handle);
        handle
    }

    /// Allocate a handle, build entity with `factory` and register it as a child of `parent`.
    pub fn add(
        &mut self,
        parent: Handle,
        factory: impl FnOnce(Handle) -> Entity,
    ) -> Result<Handle, StateError> {
        let parent_kind = self
            .kind_of(parent)
            .ok_or(StateError::UnknownParent(parent))?;

        let handle = self.next_handle();
        let entity = factory(handle);
        let invalid_parent = |child| StateError::InvalidParent {
            child,
            parent,
            parent_kind,
        };
        match entity {
            Entity::Thread(_) => return Err(StateError::ThreadIsRoot),
            Entity::Frame(frame) => {
                if parent_kind != EntityKind::Thread {
                    return Err(invalid_parent(EntityKind::Frame));
                }
                self.frames.insert(handle, Frame { handle, ..frame });
            }
            Entity::Scope(scope) => {
                if parent_kind != EntityKind::Frame {
                    return Err(invalid_parent(EntityKind::Scope));
                }
                self.scopes.insert(handle, Scope { handle, ..scope });
            }
            Entity::Variable(var) => {
                if parent_kind == EntityKind::Thread {
                    return Err(invalid_parent(EntityKind::Variable));
                }
                self.variables.insert(handle, Variable { handle, ..var });
            }
        }
        self.parents.insert(handle, parent);
        self.children.entry(parent).or_default().push(handle);
        Ok(handle)
    }

    pub fn get(&self, handle: Handle) -> Option<EntityRef<'_>> {
        if let Some(t) = self.threads.get(&handle) {
            return Some(EntityRef::Thread(t));
        }
        if let Some(f) = self.frames.get(&handle) {
            return Some(EntityRef::Frame(f));
        }
        if let Some(s) = self.scopes.get(&handle) {
            return Some(EntityRef::Scope(s));
        }
        self.variables.get(&handle).map(EntityRef::Variable)
    }

    pub fn thread(&self, handle: Handle) -> Option<&Thread> {
        self.threads.get(&handle)
    }

    pub fn thread_by_system_id(&self, system_id: u32) -> Option<&Thread> {
        self.thread_by_system_id
            .get(&system_id)
            .and_then(|h| self.threads.get(h))
    }

    pub fn threads(&self) -> impl Iterator<Item = &Thread> {
        self.threads.values()
    }

    pub fn frame(&self, handle: Handle) -> Option<&Frame> {
        self.frames.get(&handle)
    }

    pub fn scope(&self, handle: Handle) -> Option<&Scope> {
        self.scopes.get(&handle)
    }

    pub fn variable(&self, handle: Handle) -> Option<&Variable> {
        self.variables.get(&handle)
    }

    pub fn variable_mut(&mut self, handle: Handle) -> Option<&mut Variable> {
        self.variables.get_mut(&handle)
    }

    pub fn parent(&self, handle: Handle) -> Option<Handle> {
        self.parents.get(&handle).copied()
    }

    /// Children of entity in creation order.
    pub fn children(&self, handle: Handle) -> &[Handle] {
        self.children
            .get(&handle)
            .map(|c| c.as_slice())
            .unwrap_or_default()
    }

    pub fn frames_of(&self, thread: Handle) -> impl Iterator<Item = &Frame> {
        self.children(thread)
            .iter()
            .filter_map(|h| self.frames.get(h))
    }

    pub fn scopes_of(&self, frame: Handle) -> impl Iterator<Item = &Scope> {
        self.children(frame)
            .iter()
            .filter_map(|h| self.scopes.get(h))
    }

    pub fn variables_of(&self, parent: Handle) -> impl Iterator<Item = &Variable> {
        self.children(parent)
            .iter()
            .filter_map(|h| self.variables.get(h))
    }

    /// Walk parent edges from `handle` until an entity of `kind` is found.
    ///
    /// Returns `handle` itself if `handle` is of `kind` or no such ancestor exists.
    pub fn ancestor(&self, handle: Handle, kind: EntityKind) -> Handle {
        let mut current = handle;
        for _ in 0..MAX_ANCESTOR_DEPTH {
            if self.kind_of(current) == Some(kind) {
                return current;
            }
            match self.parents.get(&current) {
                Some(parent) => current = *parent,
                None => return handle,
            }
        }
        warn!(target: "gateway", "parent chain of {handle} is too deep");
        handle
    }

    /// Thread that owns a frame (or any descendant of a frame).
    pub fn thread_of(&self, handle: Handle) -> Handle {
        self.ancestor(handle, EntityKind::Thread)
    }

    /// Frame that owns a scope (or any descendant of a scope).
    pub fn frame_of(&self, handle: Handle) -> Handle {
        self.ancestor(handle, EntityKind::Frame)
    }

    /// Topmost scope that owns a variable.
    pub fn scope_of(&self, handle: Handle) -> Handle {
        self.ancestor(handle, EntityKind::Scope)
    }

    /// Keep only threads from `alive` list, subtrees of removed threads are dropped too.
    pub fn retain_threads(&mut self, alive: &[u32]) {
        let dead: Vec<Handle> = self
            .threads
            .values()
            .filter(|t| !alive.contains(&t.system_id))
            .map(|t| t.handle)
            .collect();
        for handle in dead {
            self.remove_subtree(handle);
        }
    }

    /// Drop all descendants of `handle`, the entity itself stays.
    pub fn remove_children(&mut self, handle: Handle) {
        for child in self.children(handle).to_vec() {
            self.remove_subtree(child);
        }
    }

    fn remove_subtree(&mut self, root: Handle) {
        let mut stack = vec![root];
        while let Some(handle) = stack.pop() {
            if let Some(children) = self.children.remove(&handle) {
                stack.extend(children);
            }
            if let Some(thread) = self.threads.shift_remove(&handle) {
                self.thread_by_system_id.remove(&thread.system_id);
                if self.current_thread == Some(thread.system_id) {
                    self.current_thread = None;
                }
            }
            self.frames.shift_remove(&handle);
            self.scopes.shift_remove(&handle);
            self.variables.shift_remove(&handle);
            if let Some(parent) = self.parents.remove(&handle) {
                if let Some(siblings) = self.children.get_mut(&parent) {
                    siblings.retain(|h| *h != handle);
                }
            }
            if self.current_frame == Some(handle) {
                self.current_frame = None;
            }
        }
    }

    pub fn current_thread(&self) -> Option<u32> {
        self.current_thread
    }

    pub fn set_current_thread(&mut self, system_id: u32) {
        self.current_thread = Some(system_id);
    }

    pub fn current_frame(&self) -> Option<Handle> {
        self.current_frame
    }

    pub fn set_current_frame(&mut self, frame: Handle) {
        self.current_frame = Some(frame);
    }

    /// Drop all entities and reset handle counter.
    pub fn clear(&mut self) {
        self.last_handle = 0;
        self.threads.clear();
        self.thread_by_system_id.clear();
        self.frames.clear();
        self.scopes.clear();
        self.variables.clear();
        self.parents.clear();
        self.children.clear();
        self.current_thread = None;
        self.current_frame = None;
    }

    pub fn is_empty(&self) -> bool {
        self.threads.is_empty()
            && self.frames.is_empty()
            && self.scopes.is_empty()
            && self.variables.is_empty()
    }
}
