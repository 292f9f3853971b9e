// Copyright 2023 Meta Platforms, Inc. and affiliates.
//
// Redistribution and use in source and binary forms, with or without modification, are permitted provided that the following conditions are met:
//
// 1. Redistributions of source code must retain the above copyright notice, this list of conditions and the following disclaimer.
//
// 2. Redistributions in binary form must reproduce the above copyright notice, this list of conditions and the following disclaimer in the documentation and/or other materials provided with the distribution.
//
// 3. Neither the name of the copyright holder nor the names of its contributors may be used to endorse or promote products derived from this software without specific prior written permission.
//
// THIS SOFTWARE IS PROVIDED BY THE COPYRIGHT HOLDERS AND CONTRIBUTORS "AS IS" AND ANY EXPRESS OR IMPLIED WARRANTIES, INCLUDING, BUT NOT LIMITED TO, THE IMPLIED WARRANTIES OF MERCHANTABILITY AND FITNESS FOR A PARTICULAR PURPOSE ARE DISCLAIMED. IN NO EVENT SHALL THE COPYRIGHT HOLDER OR CONTRIBUTORS BE LIABLE FOR ANY DIRECT, INDIRECT, INCIDENTAL, SPECIAL, EXEMPLARY, OR CONSEQUENTIAL DAMAGES (INCLUDING, BUT NOT LIMITED TO, PROCUREMENT OF SUBSTITUTE GOODS OR SERVICES; LOSS OF USE, DATA, OR PROFITS; OR BUSINESS INTERRUPTION) HOWEVER CAUSED AND ON ANY THEORY OF LIABILITY, WHETHER IN CONTRACT, STRICT LIABILITY, OR TORT (INCLUDING NEGLIGENCE OR OTHERWISE) ARISING IN ANY WAY OUT OF THE USE OF THIS SOFTWARE, EVEN IF ADVISED OF THE POSSIBILITY OF SUCH DAMAGE.

//! Process-wide storage de-duplication registry (spec §3, §9), generalizing
//! the old per-opcode `VariableStore` trait into a shared, reference-counted
//! registry keyed by the uniquing rule in [`crate::hii::model::StorageKey`].

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use log::debug;

use crate::hii::model::Storage;
use crate::hii::model::StorageKey;

/// One shared storage plus an explicit reference count. The count is kept
/// alongside `Rc::strong_count` rather than relying on it, so the registry's
/// notion of "still referenced" survives a form-set being rebuilt from
/// scratch and handed a fresh set of `Rc` clones (spec §9).
struct Entry {
    storage: Rc<RefCell<Storage>>,
    refcount: u32,
}

/// Explicit value, owned by whatever constructs the form-set parser (the
/// CLI, or a test) -- deliberately not a process-global singleton.
#[derive(Default)]
pub struct StorageRegistry {
    entries: HashMap<StorageKey, Entry>,
}

impl StorageRegistry {
    pub fn new() -> Self {
        StorageRegistry { entries: HashMap::new() }
    }

    /// Registers a storage reference, creating the shared entry on first
    /// sight and bumping the refcount on every subsequent registration for
    /// the same uniquing key.
    pub fn init(&mut self, storage: Storage) -> Rc<RefCell<Storage>> {
        let key = storage.unique_key();
        let entry = self.entries.entry(key).or_insert_with(|| {
            debug!("registering new storage {:?}", storage.guid);
            Entry { storage: Rc::new(RefCell::new(storage)), refcount: 0 }
        });
        entry.refcount += 1;
        Rc::clone(&entry.storage)
    }

    /// Drops one reference to the storage identified by `key`, removing the
    /// entry entirely once the count reaches zero.
    pub fn teardown(&mut self, key: &StorageKey) {
        let Some(entry) = self.entries.get_mut(key) else { return };
        entry.refcount = entry.refcount.saturating_sub(1);
        if entry.refcount == 0 {
            debug!("last reference to storage dropped, removing from registry");
            self.entries.remove(key);
        }
    }

    pub fn get(&self, key: &StorageKey) -> Option<Rc<RefCell<Storage>>> {
        self.entries.get(key).map(|e| Rc::clone(&e.storage))
    }

    pub fn refcount(&self, key: &StorageKey) -> u32 {
        self.entries.get(key).map(|e| e.refcount).unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hii::model::Guid;
    use crate::hii::model::StorageKind;

    fn make_storage(name: &str) -> Storage {
        Storage {
            var_store_id: 1,
            kind: StorageKind::EfiVariable,
            name: name.to_string(),
            guid: Guid { data1: 1, data2: 0, data3: 0, data4: [0; 8] },
            size: 4,
            hii_handle: 0,
        }
    }

    #[test]
    fn re_registering_the_same_key_bumps_refcount_not_entry_count() {
        let mut registry = StorageRegistry::new();
        let first = registry.init(make_storage("Setup"));
        let second = registry.init(make_storage("Setup"));
        assert!(Rc::ptr_eq(&first, &second));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.refcount(&first.borrow().unique_key()), 2);
    }

    #[test]
    fn teardown_removes_the_entry_once_refcount_hits_zero() {
        let mut registry = StorageRegistry::new();
        let storage = registry.init(make_storage("Setup"));
        let key = storage.borrow().unique_key();
        registry.teardown(&key);
        assert!(registry.is_empty());
    }

    #[test]
    fn distinct_names_stay_distinct_entries() {
        let mut registry = StorageRegistry::new();
        registry.init(make_storage("Setup"));
        registry.init(make_storage("Boot"));
        assert_eq!(registry.len(), 2);
    }
}
