use std::{any::Any, collections::HashMap, rc::Rc};

use tracing::warn;

use crate::{DecodeError, decoding::ObjectSlot};

/// Strings seen while decoding, in order of first appearance.
pub(crate) struct StringTable {
    strings: Vec<String>,
    limit: Option<usize>,
}

impl StringTable {
    pub(crate) fn new(limit: Option<usize>) -> Self {
        Self {
            strings: vec![],
            limit,
        }
    }

    pub(crate) fn push(&mut self, string: &str) -> Result<(), DecodeError> {
        if string.is_empty() {
            return Ok(());
        }
        if let Some(limit) = self.limit.filter(|limit| self.strings.len() >= *limit) {
            warn!(limit, "String table limit reached");
            return Err(DecodeError::CacheLimitExceeded {
                table: "string",
                limit,
            });
        }
        self.strings.push(string.to_owned());
        Ok(())
    }

    pub(crate) fn get(&self, index: usize) -> Result<&str, DecodeError> {
        self.strings
            .get(index)
            .map(String::as_str)
            .ok_or(DecodeError::StringReferenceOutOfBounds {
                index,
                len: self.strings.len(),
            })
    }

    pub(crate) fn clear(&mut self) {
        self.strings.clear();
    }
}

pub(crate) enum Entry {
    /// Reserved for an owned composite that is still being decoded.
    Pending(&'static str),
    Ready(Rc<dyn Any>),
}

/// Arrays and objects seen while decoding, in order of first appearance.
///
/// Entries are reserved before their members are decoded, so members may
/// refer to their ancestors.
pub(crate) struct ObjectTable {
    entries: Vec<Entry>,
    limit: Option<usize>,
}

impl ObjectTable {
    pub(crate) fn new(limit: Option<usize>) -> Self {
        Self {
            entries: vec![],
            limit,
        }
    }

    pub(crate) fn reserve(&mut self, type_name: &'static str) -> Result<ObjectSlot, DecodeError> {
        if let Some(limit) = self.limit.filter(|limit| self.entries.len() >= *limit) {
            warn!(limit, "Object table limit reached");
            return Err(DecodeError::CacheLimitExceeded {
                table: "object",
                limit,
            });
        }
        self.entries.push(Entry::Pending(type_name));
        Ok(ObjectSlot::reserved(self.entries.len() - 1))
    }

    pub(crate) fn fill(&mut self, index: usize, value: Rc<dyn Any>) {
        if let Some(entry) = self.entries.get_mut(index) {
            *entry = Entry::Ready(value);
        }
    }

    pub(crate) fn get(&self, index: usize) -> Result<&Entry, DecodeError> {
        self.entries
            .get(index)
            .ok_or(DecodeError::ObjectReferenceOutOfBounds {
                index,
                len: self.entries.len(),
            })
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
    }
}

/// Strings written while encoding, mapped to their table index.
#[derive(Default)]
pub(crate) struct StringIndex {
    indices: HashMap<String, u32>,
}

impl StringIndex {
    pub(crate) fn get(&self, string: &str) -> Option<u32> {
        self.indices.get(string).copied()
    }

    pub(crate) fn insert(&mut self, string: &str) {
        if string.is_empty() {
            return;
        }
        let index = self.indices.len() as u32;
        self.indices.entry(string.to_owned()).or_insert(index);
    }

    pub(crate) fn clear(&mut self) {
        self.indices.clear();
    }
}

/// Composites written while encoding.
///
/// Every composite takes an index, but only shared handles can be found
/// again. Their allocations are kept alive until the next reset, so an
/// address is never reused for a different value within a session.
#[derive(Default)]
pub(crate) struct IdentityIndex {
    indices: HashMap<usize, u32>,
    handles: Vec<Rc<dyn Any>>,
    next: u32,
}

impl IdentityIndex {
    pub(crate) fn get(&self, addr: usize) -> Option<u32> {
        self.indices.get(&addr).copied()
    }

    pub(crate) fn register(&mut self, identity: Option<(usize, Rc<dyn Any>)>) -> u32 {
        let index = self.next;
        self.next += 1;
        if let Some((addr, handle)) = identity {
            self.indices.insert(addr, index);
            self.handles.push(handle);
        }
        index
    }

    pub(crate) fn clear(&mut self) {
        self.indices.clear();
        self.handles.clear();
        self.next = 0;
    }
}
