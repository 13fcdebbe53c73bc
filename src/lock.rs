//! Programmatic edit lock
//!
//! Marks the document the engine is currently writing so that change events
//! caused by its own edits are not fed back into area tracking.

use std::cell::RefCell;
use std::rc::Rc;

/// Shared handle naming the document under a programmatic edit, if any.
///
/// Clones share state. Hosts keep a clone to decide whether a change came
/// from the user or from the engine.
#[derive(Debug, Clone, Default)]
pub struct EditLock {
    writing: Rc<RefCell<Option<String>>>,
}

impl EditLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark `uri` as being written until the returned guard drops
    pub fn acquire(&self, uri: &str) -> EditGuard {
        let previous = self.writing.borrow_mut().replace(uri.to_string());
        if let Some(previous) = &previous {
            log::warn!("edit lock for {} taken while {} was held", uri, previous);
        }
        EditGuard {
            writing: Rc::clone(&self.writing),
            previous,
        }
    }

    pub fn is_held(&self) -> bool {
        self.writing.borrow().is_some()
    }

    pub fn is_writing(&self, uri: &str) -> bool {
        self.writing.borrow().as_deref() == Some(uri)
    }
}

/// Releases the edit lock on drop, on every exit path
#[derive(Debug)]
pub struct EditGuard {
    writing: Rc<RefCell<Option<String>>>,
    previous: Option<String>,
}

impl Drop for EditGuard {
    fn drop(&mut self) {
        *self.writing.borrow_mut() = self.previous.take();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guard_releases_on_drop() {
        let lock = EditLock::new();
        {
            let _guard = lock.acquire("file:///a.rs");
            assert!(lock.is_held());
            assert!(lock.is_writing("file:///a.rs"));
            assert!(!lock.is_writing("file:///b.rs"));
        }
        assert!(!lock.is_held());
    }

    #[test]
    fn test_guard_releases_on_early_return() {
        fn failing(lock: &EditLock) -> anyhow::Result<()> {
            let _guard = lock.acquire("file:///a.rs");
            anyhow::bail!("edit rejected")
        }

        let lock = EditLock::new();
        assert!(failing(&lock).is_err());
        assert!(!lock.is_held());
    }

    #[test]
    fn test_nested_guard_restores_outer() {
        let lock = EditLock::new();
        let outer = lock.acquire("file:///a.rs");
        {
            let _inner = lock.acquire("file:///b.rs");
            assert!(lock.is_writing("file:///b.rs"));
        }
        assert!(lock.is_writing("file:///a.rs"));
        drop(outer);
        assert!(!lock.is_held());
    }
}
