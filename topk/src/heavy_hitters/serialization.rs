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

//! Binary serialization for top-k sketches.
//!
//! # Layout (Little Endian)
//!
//! | Byte | Field | Description |
//! |------|-------|-------------|
//! | 0 | preamble_longs | Number of 8-byte longs in preamble (always 3) |
//! | 1 | serial_version | Serialization version (currently 1) |
//! | 2 | family_id | Family ID (27 for top-k) |
//! | 3 | flags | Bit 2 set when nothing has been inserted |
//! | 4 | over_provision_factor | Monitored keys per reported key |
//! | 5 | filter_multiplier | Filter counters per monitored key |
//! | 6-7 | unused | Zero |
//! | 8-15 | target_size | Number of reported keys |
//! | 16-23 | total_weight | Sum of all inserted weights |
//!
//! Empty sketches end after the preamble. Otherwise the preamble is followed by:
//!
//! 1. the overflow filter: `u32` length, then that many `u64` counters;
//! 2. the monitored index: `u32` length, then per entry a `u32` key length, the key
//!    bytes and the `u32` heap slot;
//! 3. the monitored elements in heap order: `u32` length, then per element a `u32`
//!    key length, the key bytes, the `u64` count and the `u64` error.

use std::io;
use std::io::Read;
use std::io::Write;

use crate::codec::SketchBytes;
use crate::codec::SketchSlice;
use crate::error::Error;
use crate::heavy_hitters::TopKSketch;
use crate::heavy_hitters::TopKSketchBuilder;
use crate::heavy_hitters::monitored_set::MonitoredSet;
use crate::heavy_hitters::overflow_filter::OverflowFilter;
use crate::heavy_hitters::sketch::Element;

pub(super) const PREAMBLE_LONGS: u8 = 3;
pub(super) const SERIAL_VERSION: u8 = 1;
pub(super) const TOPK_FAMILY_ID: u8 = 27;
pub(super) const FLAG_EMPTY: u8 = 1 << 2;

const PREAMBLE_BYTES: usize = PREAMBLE_LONGS as usize * 8;

fn make_error(tag: &'static str) -> impl FnOnce(io::Error) -> Error {
    move |_| Error::insufficient_data(tag)
}

fn read_len(cursor: &mut SketchSlice<'_>, tag: &'static str) -> Result<usize, Error> {
    cursor.read_u32_le().map(|n| n as usize).map_err(make_error(tag))
}

impl TopKSketch {
    /// Serializes this sketch to bytes.
    ///
    /// # Examples
    ///
    /// ```
    /// use topk::heavy_hitters::TopKSketch;
    ///
    /// let mut sketch = TopKSketch::new(4);
    /// sketch.insert("apple", 3);
    ///
    /// let bytes = sketch.serialize();
    /// let restored = TopKSketch::deserialize(&bytes).unwrap();
    /// assert_eq!(restored, sketch);
    /// ```
    pub fn serialize(&self) -> Vec<u8> {
        let is_empty = self.is_empty();
        let mut capacity = PREAMBLE_BYTES;
        if !is_empty {
            capacity += 12 + self.filter.len() * 8;
            for element in self.monitored.elements() {
                capacity += 2 * (4 + element.key.len()) + 4 + 16;
            }
        }
        let mut bytes = SketchBytes::with_capacity(capacity);

        bytes.write_u8(PREAMBLE_LONGS);
        bytes.write_u8(SERIAL_VERSION);
        bytes.write_u8(TOPK_FAMILY_ID);
        bytes.write_u8(if is_empty { FLAG_EMPTY } else { 0 });
        bytes.write_u8(self.over_provision_factor);
        bytes.write_u8(self.filter_multiplier);
        bytes.write_u8(0); // unused
        bytes.write_u8(0); // unused
        bytes.write_u64_le(self.target_size as u64);
        bytes.write_u64_le(self.total_weight);

        if is_empty {
            return bytes.into_bytes();
        }

        bytes.write_u32_le(self.filter.len() as u32);
        for counter in self.filter.counters() {
            bytes.write_u64_le(counter);
        }

        let entries = self.monitored.index_entries();
        bytes.write_u32_le(entries.len() as u32);
        for (key, slot) in entries {
            bytes.write_len_prefixed(key);
            bytes.write_u32_le(slot as u32);
        }

        let elements = self.monitored.elements();
        bytes.write_u32_le(elements.len() as u32);
        for element in elements {
            bytes.write_len_prefixed(&element.key);
            bytes.write_u64_le(element.count);
            bytes.write_u64_le(element.error);
        }

        bytes.into_bytes()
    }

    /// Deserializes a sketch from bytes.
    ///
    /// The monitored elements are restored in their serialized heap order, so the
    /// result is identical to the sketch that was serialized.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::MalformedDeserializeData`](crate::error::ErrorKind::MalformedDeserializeData)
    /// if the data is truncated, carries trailing bytes, has the wrong family or
    /// version, or describes an inconsistent sketch.
    pub fn deserialize(bytes: &[u8]) -> Result<TopKSketch, Error> {
        Self::deserialize_inner(bytes).inspect_err(|err| {
            tracing::debug!(target: "topk", error = %err, "rejected serialized sketch");
        })
    }

    fn deserialize_inner(bytes: &[u8]) -> Result<TopKSketch, Error> {
        let mut cursor = SketchSlice::new(bytes);

        let preamble_longs = cursor.read_u8().map_err(make_error("preamble_longs"))?;
        let serial_version = cursor.read_u8().map_err(make_error("serial_version"))?;
        let family_id = cursor.read_u8().map_err(make_error("family_id"))?;
        let flags = cursor.read_u8().map_err(make_error("flags"))?;
        let over_provision_factor = cursor
            .read_u8()
            .map_err(make_error("over_provision_factor"))?;
        let filter_multiplier = cursor.read_u8().map_err(make_error("filter_multiplier"))?;
        let unused1 = cursor.read_u8().map_err(make_error("unused1"))?;
        let unused2 = cursor.read_u8().map_err(make_error("unused2"))?;

        if family_id != TOPK_FAMILY_ID {
            return Err(Error::invalid_family(TOPK_FAMILY_ID, family_id, "TopK"));
        }
        if serial_version != SERIAL_VERSION {
            return Err(Error::unsupported_serial_version(
                SERIAL_VERSION,
                serial_version,
            ));
        }
        if preamble_longs != PREAMBLE_LONGS {
            return Err(Error::invalid_preamble_longs(PREAMBLE_LONGS, preamble_longs));
        }
        if flags & !FLAG_EMPTY != 0 {
            return Err(Error::deserial(format!("unknown flags: {flags:#04x}")));
        }
        if unused1 != 0 || unused2 != 0 {
            return Err(Error::deserial("non-zero reserved preamble bytes"));
        }

        let target_size = cursor.read_u64_le().map_err(make_error("target_size"))?;
        let total_weight = cursor.read_u64_le().map_err(make_error("total_weight"))?;
        let target_size = usize::try_from(target_size)
            .map_err(|_| Error::deserial(format!("target_size out of range: {target_size}")))?;
        let is_empty = (flags & FLAG_EMPTY) != 0;

        // The filter is allocated up front, so its declared size must be present.
        if !is_empty {
            let filter_bytes = target_size
                .checked_mul(over_provision_factor as usize)
                .and_then(|capacity| capacity.checked_mul(filter_multiplier as usize))
                .and_then(|len| len.checked_mul(8));
            match filter_bytes {
                Some(needed) if needed <= cursor.remaining() => {}
                _ => return Err(Error::insufficient_data("filter")),
            }
        }

        let mut sketch = TopKSketchBuilder::new(target_size)
            .over_provision_factor(over_provision_factor)
            .filter_multiplier(filter_multiplier)
            .build()
            .map_err(|err| {
                Error::deserial(format!("invalid configuration: {}", err.message()))
                    .with_context("target_size", target_size)
            })?;

        if is_empty {
            if total_weight != 0 {
                return Err(Error::deserial("empty sketch with non-zero total weight"));
            }
            expect_exhausted(&cursor)?;
            return Ok(sketch);
        }
        if total_weight == 0 {
            return Err(Error::deserial("non-empty sketch with zero total weight"));
        }

        let filter_len = read_len(&mut cursor, "filter_length")?;
        if filter_len != sketch.filter.len() {
            return Err(Error::deserial(format!(
                "filter length mismatch: expected {}, got {filter_len}",
                sketch.filter.len()
            )));
        }
        let mut counters = Vec::with_capacity(filter_len);
        for _ in 0..filter_len {
            counters.push(cursor.read_u64_le().map_err(make_error("filter"))?);
        }

        let capacity = sketch.monitored.capacity();
        let num_entries = read_len(&mut cursor, "index_length")?;
        if num_entries > capacity {
            return Err(Error::deserial(format!(
                "index length {num_entries} exceeds capacity {capacity}"
            )));
        }
        let mut entries = Vec::with_capacity(num_entries);
        for _ in 0..num_entries {
            let key = cursor
                .read_len_prefixed()
                .map_err(make_error("index_key"))?;
            let slot = read_len(&mut cursor, "index_slot")?;
            entries.push((key, slot));
        }

        let num_elements = read_len(&mut cursor, "elements_length")?;
        if num_elements > capacity {
            return Err(Error::deserial(format!(
                "element count {num_elements} exceeds capacity {capacity}"
            )));
        }
        let mut elements = Vec::with_capacity(num_elements);
        for _ in 0..num_elements {
            let key = cursor
                .read_len_prefixed()
                .map_err(make_error("element_key"))?;
            let count = cursor.read_u64_le().map_err(make_error("element_count"))?;
            let error = cursor.read_u64_le().map_err(make_error("element_error"))?;
            if error > count {
                return Err(Error::deserial(format!(
                    "element error {error} exceeds count {count}"
                )));
            }
            elements.push(Element::new(key, count, error));
        }
        expect_exhausted(&cursor)?;

        sketch.filter = OverflowFilter::from_counters(counters);
        sketch.monitored = MonitoredSet::from_parts(capacity, elements, entries)?;
        sketch.total_weight = total_weight;
        Ok(sketch)
    }

    /// Writes the serialized sketch to `writer`.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        writer.write_all(&self.serialize())
    }

    /// Reads a serialized sketch from `reader` until end of input.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::MalformedDeserializeData`](crate::error::ErrorKind::MalformedDeserializeData)
    /// if reading fails or the data is malformed. I/O failures are kept as the error source.
    pub fn read_from<R: Read>(mut reader: R) -> Result<TopKSketch, Error> {
        let mut bytes = Vec::new();
        reader
            .read_to_end(&mut bytes)
            .map_err(|err| Error::deserial("failed to read sketch").set_source(err))?;
        Self::deserialize(&bytes)
    }
}

fn expect_exhausted(cursor: &SketchSlice<'_>) -> Result<(), Error> {
    match cursor.remaining() {
        0 => Ok(()),
        n => Err(Error::deserial(format!("{n} trailing bytes after sketch"))),
    }
}
