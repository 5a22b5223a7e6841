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

//! Filtered Space-Saving sketch implementation.

use std::cmp::Ordering;
use std::collections::HashMap;

use crate::error::Error;
use crate::heavy_hitters::monitored_set::MonitoredSet;
use crate::heavy_hitters::overflow_filter::OverflowFilter;

/// An estimate for a single key.
///
/// The true cumulative weight of the key lies in `[lower_bound(), upper_bound()]`,
/// that is `count() - error() <= true weight <= count()`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Element {
    pub(super) key: Vec<u8>,
    pub(super) count: u64,
    pub(super) error: u64,
}

impl Element {
    pub(crate) fn new(key: Vec<u8>, count: u64, error: u64) -> Self {
        Self { key, count, error }
    }

    /// Returns the key.
    pub fn key(&self) -> &[u8] {
        &self.key
    }

    /// Returns the estimated cumulative weight.
    pub fn count(&self) -> u64 {
        self.count
    }

    /// Returns the maximum overcount of [`count`](Self::count).
    pub fn error(&self) -> u64 {
        self.error
    }

    /// Returns the guaranteed minimum weight, `count - error`.
    pub fn lower_bound(&self) -> u64 {
        self.count.saturating_sub(self.error)
    }

    /// Returns the maximum possible weight. Same as [`count`](Self::count).
    pub fn upper_bound(&self) -> u64 {
        self.count
    }
}

/// Count descending, then key ascending.
fn by_count_descending(a: &Element, b: &Element) -> Ordering {
    b.count.cmp(&a.count).then_with(|| a.key.cmp(&b.key))
}

/// Filtered Space-Saving sketch for the top-k heaviest keys of a weighted stream.
///
/// The sketch monitors `target_size * over_provision_factor` keys individually and
/// keeps a filter of `capacity * filter_multiplier` shared counters for everything
/// else. A key only displaces the lightest monitored key once its filter estimate
/// plus the new weight reaches that key's count.
///
/// # Examples
///
/// ```
/// use topk::heavy_hitters::TopKSketch;
///
/// let mut sketch = TopKSketch::new(10);
/// sketch.insert("a", 5);
/// sketch.insert("b", 3);
/// sketch.insert("c", 7);
///
/// let top = sketch.keys();
/// assert_eq!(top[0].key(), b"c");
/// assert_eq!(sketch.estimate("a").count(), 5);
/// assert_eq!(sketch.count(), 15);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopKSketch {
    pub(super) target_size: usize,
    pub(super) over_provision_factor: u8,
    pub(super) filter_multiplier: u8,
    pub(super) total_weight: u64,
    pub(super) monitored: MonitoredSet,
    pub(super) filter: OverflowFilter,
}

impl TopKSketch {
    /// Default ratio of monitored elements to `target_size`.
    pub const OVER_PROVISION_FACTOR: u8 = 6;
    /// Default ratio of filter counters to monitored elements.
    pub const FILTER_MULTIPLIER: u8 = 6;

    /// Creates a sketch reporting the top `target_size` keys with default tuning.
    ///
    /// # Panics
    ///
    /// Panics if `target_size` is zero or the filter would not be addressable.
    /// Use [`try_new`](Self::try_new) to get an error instead.
    pub fn new(target_size: usize) -> Self {
        match Self::try_new(target_size) {
            Ok(sketch) => sketch,
            Err(err) => panic!("{}", err.message()),
        }
    }

    /// Creates a sketch reporting the top `target_size` keys with default tuning.
    pub fn try_new(target_size: usize) -> Result<Self, Error> {
        TopKSketchBuilder::new(target_size).build()
    }

    /// Returns a builder for a sketch with custom tuning.
    ///
    /// # Examples
    ///
    /// ```
    /// use topk::heavy_hitters::TopKSketch;
    ///
    /// let sketch = TopKSketch::builder(20)
    ///     .over_provision_factor(4)
    ///     .filter_multiplier(8)
    ///     .build()
    ///     .unwrap();
    /// assert_eq!(sketch.capacity(), 80);
    /// assert_eq!(sketch.filter_len(), 640);
    /// ```
    pub fn builder(target_size: usize) -> TopKSketchBuilder {
        TopKSketchBuilder::new(target_size)
    }

    /// Returns the number of keys reported by [`keys`](Self::keys).
    pub fn target_size(&self) -> usize {
        self.target_size
    }

    /// Returns the maximum number of individually monitored keys.
    pub fn capacity(&self) -> usize {
        self.monitored.capacity()
    }

    /// Returns the number of overflow filter counters.
    pub fn filter_len(&self) -> usize {
        self.filter.len()
    }

    /// Returns the configured over-provision factor.
    pub fn over_provision_factor(&self) -> u8 {
        self.over_provision_factor
    }

    /// Returns the configured filter multiplier.
    pub fn filter_multiplier(&self) -> u8 {
        self.filter_multiplier
    }

    /// Returns the number of keys currently monitored.
    pub fn num_monitored(&self) -> usize {
        self.monitored.len()
    }

    /// Returns the total weight inserted since creation or the last [`clear`](Self::clear).
    pub fn count(&self) -> u64 {
        self.total_weight
    }

    /// Returns true if no weight has been inserted.
    pub fn is_empty(&self) -> bool {
        self.total_weight == 0
    }

    /// Inserts `key` with a weight of one.
    pub fn update(&mut self, key: impl AsRef<[u8]>) -> Element {
        self.insert(key, 1)
    }

    /// Inserts `key` with the given weight and returns its updated estimate.
    ///
    /// Counts and the total weight saturate at `u64::MAX`.
    ///
    /// # Panics
    ///
    /// Panics if `weight` is zero.
    pub fn insert(&mut self, key: impl AsRef<[u8]>, weight: u64) -> Element {
        assert!(weight > 0, "weight must be positive");
        let key = key.as_ref();
        self.total_weight = self.total_weight.saturating_add(weight);

        if let Some(slot) = self.monitored.contains(key) {
            return self.monitored.increment(slot, weight);
        }

        if !self.monitored.is_full() {
            let element = Element::new(key.to_vec(), weight, 0);
            self.monitored.push(element.clone());
            return element;
        }

        let bucket = self.filter.bucket(key);
        let filter_estimate = self.filter.get(bucket);
        let min_count = self.monitored.min().map_or(0, Element::count);
        let element = Element::new(
            key.to_vec(),
            filter_estimate.saturating_add(weight),
            filter_estimate,
        );

        if element.count < min_count {
            self.filter.add(bucket, weight);
            return element;
        }

        let evicted = self.monitored.replace_min(element.clone());
        self.bank(&evicted);
        tracing::trace!(
            target: "topk",
            evicted_count = evicted.count,
            filter_estimate,
            weight,
            "evicted minimum monitored key"
        );
        element
    }

    /// Returns the current estimate for `key`.
    ///
    /// Monitored keys report their own count and error. Other keys report the value
    /// of their filter bucket as both count and error, so their weight may be
    /// anywhere between zero and that value.
    pub fn estimate(&self, key: impl AsRef<[u8]>) -> Element {
        let key = key.as_ref();
        if let Some(slot) = self.monitored.contains(key) {
            return self.monitored.get(slot).clone();
        }
        let count = self.filter.get(self.filter.bucket(key));
        Element::new(key.to_vec(), count, count)
    }

    /// Returns the top `target_size` monitored keys.
    ///
    /// Sorted by count descending, ties broken by key ascending.
    pub fn keys(&self) -> Vec<Element> {
        let mut elements = self.monitored.snapshot();
        elements.sort_by(by_count_descending);
        elements.truncate(self.target_size);
        elements
    }

    /// Merges `other` into this sketch.
    ///
    /// Keys monitored by both sketches sum their counts and errors. A key monitored by
    /// only one sketch adds the other sketch's filter bucket to its count and error.
    /// The combined estimates are ranked and the best `capacity` of them become the
    /// new monitored set; the filters are summed bucket by bucket.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::IncompatibleMerge`](crate::error::ErrorKind::IncompatibleMerge)
    /// if the sketches differ in target size or tuning.
    ///
    /// # Examples
    ///
    /// ```
    /// use topk::heavy_hitters::TopKSketch;
    ///
    /// let mut left = TopKSketch::new(5);
    /// let mut right = TopKSketch::new(5);
    /// left.insert("a", 3);
    /// right.insert("a", 4);
    /// right.insert("b", 1);
    ///
    /// left.merge(&right).unwrap();
    /// assert_eq!(left.estimate("a").count(), 7);
    /// assert_eq!(left.count(), 8);
    /// ```
    pub fn merge(&mut self, other: &TopKSketch) -> Result<(), Error> {
        if self.target_size != other.target_size {
            return Err(Error::incompatible_merge(
                "target size",
                self.target_size,
                other.target_size,
            ));
        }
        if self.over_provision_factor != other.over_provision_factor
            || self.filter_multiplier != other.filter_multiplier
        {
            return Err(Error::incompatible_merge(
                "tuning",
                format!("{}x{}", self.over_provision_factor, self.filter_multiplier),
                format!("{}x{}", other.over_provision_factor, other.filter_multiplier),
            ));
        }

        let mut combined: HashMap<&[u8], Element> =
            HashMap::with_capacity(self.monitored.len() + other.monitored.len());
        for element in self.monitored.elements() {
            let mut merged = element.clone();
            match other.monitored.contains(&element.key) {
                Some(slot) => {
                    let theirs = other.monitored.get(slot);
                    merged.count = merged.count.saturating_add(theirs.count);
                    merged.error = merged.error.saturating_add(theirs.error);
                }
                None => {
                    let theirs = other.filter.get(other.filter.bucket(&element.key));
                    merged.count = merged.count.saturating_add(theirs);
                    merged.error = merged.error.saturating_add(theirs);
                }
            }
            combined.insert(&element.key, merged);
        }
        for element in other.monitored.elements() {
            if self.monitored.contains(&element.key).is_some() {
                continue;
            }
            let ours = self.filter.get(self.filter.bucket(&element.key));
            let mut merged = element.clone();
            merged.count = merged.count.saturating_add(ours);
            merged.error = merged.error.saturating_add(ours);
            combined.insert(&element.key, merged);
        }

        let mut elements: Vec<Element> = combined.into_values().collect();
        elements.sort_by(by_count_descending);
        let capacity = self.monitored.capacity();
        let dropped = if elements.len() > capacity {
            elements.split_off(capacity)
        } else {
            Vec::new()
        };

        let mut monitored = MonitoredSet::new(capacity);
        for element in elements {
            monitored.push(element);
        }

        self.filter.merge(&other.filter)?;
        // Keys that fell out of the monitored set keep their combined count as a floor.
        for element in &dropped {
            self.bank(element);
        }
        self.monitored = monitored;
        self.total_weight = self.total_weight.saturating_add(other.total_weight);
        tracing::debug!(
            target: "topk",
            monitored = self.monitored.len(),
            total_weight = self.total_weight,
            "merged sketches"
        );
        Ok(())
    }

    /// Resets the sketch to its freshly created state, keeping its configuration.
    pub fn clear(&mut self) {
        self.monitored.clear();
        self.filter.clear();
        self.total_weight = 0;
    }

    /// Records the last known count of a key leaving the monitored set in its filter
    /// bucket. A bucket never decreases.
    fn bank(&mut self, element: &Element) {
        let bucket = self.filter.bucket(&element.key);
        let banked = self.filter.get(bucket).max(element.count);
        self.filter.set(bucket, banked);
    }
}

/// Builder for [`TopKSketch`] instances with custom tuning.
#[derive(Debug, Clone)]
pub struct TopKSketchBuilder {
    target_size: usize,
    over_provision_factor: u8,
    filter_multiplier: u8,
}

impl TopKSketchBuilder {
    /// Starts a builder for a sketch reporting the top `target_size` keys.
    pub fn new(target_size: usize) -> Self {
        Self {
            target_size,
            over_provision_factor: TopKSketch::OVER_PROVISION_FACTOR,
            filter_multiplier: TopKSketch::FILTER_MULTIPLIER,
        }
    }

    /// Sets how many keys are monitored per reported key.
    pub fn over_provision_factor(mut self, factor: u8) -> Self {
        self.over_provision_factor = factor;
        self
    }

    /// Sets how many filter counters are allocated per monitored key.
    pub fn filter_multiplier(mut self, multiplier: u8) -> Self {
        self.filter_multiplier = multiplier;
        self
    }

    /// Builds the sketch.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::ConfigInvalid`](crate::error::ErrorKind::ConfigInvalid) if any
    /// parameter is zero or the filter length does not fit in a `u32`.
    pub fn build(self) -> Result<TopKSketch, Error> {
        if self.target_size == 0 {
            return Err(Error::config_invalid("target_size must be positive"));
        }
        if self.over_provision_factor == 0 {
            return Err(Error::config_invalid(
                "over_provision_factor must be positive",
            ));
        }
        if self.filter_multiplier == 0 {
            return Err(Error::config_invalid("filter_multiplier must be positive"));
        }
        let filter_len = self
            .target_size
            .checked_mul(self.over_provision_factor as usize)
            .and_then(|capacity| capacity.checked_mul(self.filter_multiplier as usize))
            .filter(|&len| len <= u32::MAX as usize)
            .ok_or_else(|| {
                Error::config_invalid("filter length exceeds u32::MAX")
                    .with_context("target_size", self.target_size)
            })?;
        let capacity = self.target_size * self.over_provision_factor as usize;

        Ok(TopKSketch {
            target_size: self.target_size,
            over_provision_factor: self.over_provision_factor,
            filter_multiplier: self.filter_multiplier,
            total_weight: 0,
            monitored: MonitoredSet::new(capacity),
            filter: OverflowFilter::new(filter_len),
        })
    }
}
