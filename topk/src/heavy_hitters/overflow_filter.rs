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

use crate::error::Error;
use crate::hash::hash_key;
use crate::hash::reduce;

/// Flat array of counters standing in for the counts of unmonitored keys.
///
/// Keys are placed by hashing and reducing into the array length, so several keys
/// may share a bucket. Sharing only inflates the reported error of those keys.
///
/// The counters are allocated on the first write. Until then every bucket reads as
/// zero, so a sketch that never overflows pays nothing for its filter.
#[derive(Debug, Clone)]
pub(crate) struct OverflowFilter {
    len: usize,
    // Either empty or exactly `len` long.
    counters: Vec<u64>,
}

impl OverflowFilter {
    pub fn new(len: usize) -> Self {
        Self {
            len,
            counters: Vec::new(),
        }
    }

    pub fn from_counters(counters: Vec<u64>) -> Self {
        Self {
            len: counters.len(),
            counters,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_allocated(&self) -> bool {
        !self.counters.is_empty()
    }

    /// Iterates over all `len` counters, including unallocated ones as zero.
    pub fn counters(&self) -> impl Iterator<Item = u64> + '_ {
        let unallocated = if self.is_allocated() { 0 } else { self.len };
        self.counters
            .iter()
            .copied()
            .chain(std::iter::repeat_n(0, unallocated))
    }

    /// Returns the bucket index for `key`.
    pub fn bucket(&self, key: &[u8]) -> usize {
        reduce(hash_key(key), self.len as u32) as usize
    }

    pub fn get(&self, index: usize) -> u64 {
        debug_assert!(index < self.len);
        self.counters.get(index).copied().unwrap_or(0)
    }

    pub fn set(&mut self, index: usize, count: u64) {
        self.counters_mut()[index] = count;
    }

    /// Adds `delta` to a bucket, saturating at `u64::MAX`.
    pub fn add(&mut self, index: usize, delta: u64) {
        let counter = &mut self.counters_mut()[index];
        *counter = counter.saturating_add(delta);
    }

    /// Adds `other` into this filter bucket by bucket.
    pub fn merge(&mut self, other: &OverflowFilter) -> Result<(), Error> {
        if self.len() != other.len() {
            return Err(Error::incompatible_merge(
                "filter length",
                self.len(),
                other.len(),
            ));
        }
        if !other.is_allocated() {
            return Ok(());
        }
        for (ours, theirs) in self.counters_mut().iter_mut().zip(&other.counters) {
            *ours = ours.saturating_add(*theirs);
        }
        Ok(())
    }

    pub fn clear(&mut self) {
        self.counters = Vec::new();
    }

    fn counters_mut(&mut self) -> &mut [u64] {
        if self.counters.is_empty() {
            self.counters = vec![0; self.len];
        }
        &mut self.counters
    }
}

impl PartialEq for OverflowFilter {
    fn eq(&self, other: &Self) -> bool {
        if self.len != other.len {
            return false;
        }
        match (self.is_allocated(), other.is_allocated()) {
            (false, false) => true,
            (true, true) => self.counters == other.counters,
            (true, false) => self.counters.iter().all(|&c| c == 0),
            (false, true) => other.counters.iter().all(|&c| c == 0),
        }
    }
}

impl Eq for OverflowFilter {}
