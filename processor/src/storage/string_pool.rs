//! String interning

use std::collections::HashMap;
use tracery_shared::types::ids::StringId;

/// Deduplicated string storage. Id 0 is always the empty string.
#[derive(Debug, Clone)]
pub struct StringPool {
    strings: Vec<String>,
    index: HashMap<String, StringId>,
}

impl StringPool {
    pub fn new() -> Self {
        let mut index = HashMap::new();
        index.insert(String::new(), StringId::EMPTY);
        Self {
            strings: vec![String::new()],
            index,
        }
    }

    /// Intern `s`, returning the id of the existing copy if there is one
    pub fn intern(&mut self, s: &str) -> StringId {
        if let Some(&id) = self.index.get(s) {
            return id;
        }
        let id = StringId(self.strings.len() as u32);
        self.strings.push(s.to_owned());
        self.index.insert(s.to_owned(), id);
        id
    }

    /// Intern raw bytes, replacing invalid UTF-8 sequences
    pub fn intern_bytes(&mut self, bytes: &[u8]) -> StringId {
        self.intern(&String::from_utf8_lossy(bytes))
    }

    /// Panics if `id` was not handed out by this pool.
    pub fn get(&self, id: StringId) -> &str {
        &self.strings[id.0 as usize]
    }

    pub fn try_get(&self, id: StringId) -> Option<&str> {
        self.strings.get(id.0 as usize).map(String::as_str)
    }

    pub fn lookup(&self, s: &str) -> Option<StringId> {
        self.index.get(s).copied()
    }

    pub fn len(&self) -> usize {
        self.strings.len()
    }

    pub fn is_empty(&self) -> bool {
        // The empty string is always present.
        false
    }
}

impl Default for StringPool {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intern_dedups() {
        let mut pool = StringPool::new();
        let a = pool.intern("libc.so");
        let b = pool.intern("libc.so");
        assert_eq!(a, b);
        assert_eq!(pool.get(a), "libc.so");
        assert_eq!(pool.lookup("libc.so"), Some(a));
        assert_eq!(pool.lookup("missing"), None);
    }

    #[test]
    fn test_empty_string_is_id_zero() {
        let mut pool = StringPool::new();
        assert_eq!(pool.intern(""), StringId::EMPTY);
        assert_eq!(pool.get(StringId::EMPTY), "");
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn test_intern_bytes_lossy() {
        let mut pool = StringPool::new();
        let id = pool.intern_bytes(&[b'a', 0xff]);
        assert_eq!(pool.get(id), "a\u{fffd}");
        assert!(pool.try_get(StringId(99)).is_none());
    }
}
