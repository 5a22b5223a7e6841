// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.

//! Bounded min-heap of monitored elements with a key to slot index.

use std::collections::HashMap;
use std::mem;

use crate::error::Error;
use crate::heavy_hitters::sketch::Element;

/// The monitored elements of a top-k sketch.
///
/// Elements are kept in an array-backed binary min-heap ordered by count, with ties
/// broken so that the element carrying the larger error sits closer to the root.
/// The index maps every monitored key to the slot currently holding it and is
/// updated together with every move of the heap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct MonitoredSet {
    capacity: usize,
    elements: Vec<Element>,
    index: HashMap<Vec<u8>, usize>,
}

impl MonitoredSet {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            elements: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Rebuilds a set from serialized slots and index entries.
    ///
    /// The elements are taken in slot order as given. Fails if the index is not a
    /// bijection onto the slots or the slots do not form a valid heap.
    pub fn from_parts(
        capacity: usize,
        elements: Vec<Element>,
        entries: Vec<(Vec<u8>, usize)>,
    ) -> Result<Self, Error> {
        if elements.len() > capacity {
            return Err(Error::deserial(format!(
                "{} monitored elements exceed capacity {capacity}",
                elements.len()
            )));
        }
        if entries.len() != elements.len() {
            return Err(Error::deserial(format!(
                "index has {} entries for {} monitored elements",
                entries.len(),
                elements.len()
            )));
        }

        let mut index = HashMap::with_capacity(capacity);
        for (key, slot) in entries {
            match elements.get(slot) {
                Some(element) if element.key() == key.as_slice() => {}
                Some(_) => {
                    return Err(Error::deserial(format!(
                        "index entry for slot {slot} names a different key"
                    )));
                }
                None => {
                    return Err(Error::deserial(format!(
                        "index slot {slot} out of range for {} elements",
                        elements.len()
                    )));
                }
            }
            if index.insert(key, slot).is_some() {
                return Err(Error::deserial("duplicate key in monitored index"));
            }
        }

        let set = Self {
            capacity,
            elements,
            index,
        };
        for slot in 1..set.elements.len() {
            if set.less(slot, parent(slot)) {
                return Err(Error::deserial(format!(
                    "monitored elements violate heap order at slot {slot}"
                )));
            }
        }
        Ok(set)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.elements.len() >= self.capacity
    }

    /// Returns the slot holding `key`, if it is monitored.
    pub fn contains(&self, key: &[u8]) -> Option<usize> {
        self.index.get(key).copied()
    }

    pub fn get(&self, slot: usize) -> &Element {
        &self.elements[slot]
    }

    /// The element with the smallest count.
    pub fn min(&self) -> Option<&Element> {
        self.elements.first()
    }

    /// Adds `delta` to the count at `slot` and restores heap order.
    ///
    /// Returns a copy of the updated element.
    pub fn increment(&mut self, slot: usize, delta: u64) -> Element {
        let element = &mut self.elements[slot];
        element.count = element.count.saturating_add(delta);
        let slot = self.fix(slot);
        self.elements[slot].clone()
    }

    /// Adds a new element.
    ///
    /// # Panics
    ///
    /// Panics if the set is full or the key is already monitored.
    pub fn push(&mut self, element: Element) {
        assert!(
            !self.is_full(),
            "push on a full monitored set (capacity {})",
            self.capacity
        );
        assert!(
            !self.index.contains_key(element.key()),
            "key is already monitored"
        );
        let slot = self.elements.len();
        self.index.insert(element.key().to_vec(), slot);
        self.elements.push(element);
        self.sift_up(slot);
    }

    /// Removes and returns the element with the smallest count.
    ///
    /// # Panics
    ///
    /// Panics if the set is empty.
    pub fn pop_min(&mut self) -> Element {
        assert!(!self.is_empty(), "pop_min on an empty monitored set");
        let min = self.elements.swap_remove(0);
        self.index.remove(min.key());
        if let Some(root) = self.elements.first() {
            if let Some(entry) = self.index.get_mut(root.key()) {
                *entry = 0;
            }
            self.sift_down(0);
        }
        min
    }

    /// Overwrites the minimum element with `element` and returns the evicted one.
    ///
    /// # Panics
    ///
    /// Panics if the set is empty or the new key is already monitored.
    pub fn replace_min(&mut self, element: Element) -> Element {
        assert!(!self.is_empty(), "replace_min on an empty monitored set");
        assert!(
            !self.index.contains_key(element.key()),
            "key is already monitored"
        );
        self.index.insert(element.key().to_vec(), 0);
        let evicted = mem::replace(&mut self.elements[0], element);
        self.index.remove(evicted.key());
        self.sift_down(0);
        evicted
    }

    /// Copies the elements in slot order.
    pub fn snapshot(&self) -> Vec<Element> {
        self.elements.clone()
    }

    pub fn elements(&self) -> &[Element] {
        &self.elements
    }

    /// Index entries ordered by slot.
    pub fn index_entries(&self) -> Vec<(&[u8], usize)> {
        let mut entries: Vec<(&[u8], usize)> = self
            .index
            .iter()
            .map(|(key, &slot)| (key.as_slice(), slot))
            .collect();
        entries.sort_unstable_by_key(|&(_, slot)| slot);
        entries
    }

    pub fn clear(&mut self) {
        self.elements.clear();
        self.index.clear();
    }

    /// Moves the element at `slot` to its heap position and returns the new slot.
    fn fix(&mut self, slot: usize) -> usize {
        let slot = self.sift_up(slot);
        self.sift_down(slot)
    }

    fn sift_up(&mut self, mut slot: usize) -> usize {
        while slot > 0 {
            let up = parent(slot);
            if !self.less(slot, up) {
                break;
            }
            self.swap(slot, up);
            slot = up;
        }
        slot
    }

    fn sift_down(&mut self, mut slot: usize) -> usize {
        let len = self.elements.len();
        loop {
            let left = 2 * slot + 1;
            if left >= len {
                return slot;
            }
            let right = left + 1;
            let child = if right < len && self.less(right, left) {
                right
            } else {
                left
            };
            if !self.less(child, slot) {
                return slot;
            }
            self.swap(slot, child);
            slot = child;
        }
    }

    fn less(&self, i: usize, j: usize) -> bool {
        let (a, b) = (&self.elements[i], &self.elements[j]);
        a.count < b.count || (a.count == b.count && a.error > b.error)
    }

    fn swap(&mut self, i: usize, j: usize) {
        if i == j {
            return;
        }
        self.elements.swap(i, j);
        for slot in [i, j] {
            if let Some(entry) = self.index.get_mut(self.elements[slot].key()) {
                *entry = slot;
            }
        }
    }
}

fn parent(slot: usize) -> usize {
    (slot - 1) / 2
}
