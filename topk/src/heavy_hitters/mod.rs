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

//! Filtered Space-Saving sketch for finding heavy hitters in weighted streams.
//!
//! The sketch tracks a bounded set of keys individually and routes everything else
//! through a small array of hashed counters (the overflow filter). A key is only
//! promoted into the monitored set once its filter estimate shows it can outweigh the
//! lightest monitored key, which keeps rare keys from churning the set. Every reported
//! [`Element`] bounds the true weight from both sides:
//! `count - error <= true weight <= count`.
//!
//! For background, see Metwally et al., "Efficient Computation of Frequent and Top-k
//! Elements in Data Streams", and Homem and Carvalho, "Finding Top-k Elements in Data
//! Streams" (Filtered Space-Saving).
//!
//! # Usage
//!
//! ```rust
//! use topk::heavy_hitters::TopKSketch;
//!
//! let mut sketch = TopKSketch::new(10);
//! for (key, weight) in [("a", 5), ("b", 3), ("c", 7), ("d", 2)] {
//!     sketch.insert(key, weight);
//! }
//!
//! let top: Vec<_> = sketch.keys().iter().map(|e| e.key().to_vec()).collect();
//! assert_eq!(top, vec![b"c".to_vec(), b"a".to_vec(), b"b".to_vec(), b"d".to_vec()]);
//! assert_eq!(sketch.count(), 17);
//! ```
//!
//! # Sharding
//!
//! A sketch is not synchronized. To ingest in parallel, build one sketch per shard of
//! the stream and merge them afterwards:
//!
//! ```rust
//! use topk::heavy_hitters::TopKSketch;
//!
//! let shards = [vec!["x", "y", "x"], vec!["x", "z"]];
//! let mut sketches = shards.iter().map(|shard| {
//!     let mut sketch = TopKSketch::new(2);
//!     for key in shard {
//!         sketch.update(key);
//!     }
//!     sketch
//! });
//!
//! let mut merged = sketches.next().unwrap();
//! for sketch in sketches {
//!     merged.merge(&sketch).unwrap();
//! }
//! assert_eq!(merged.keys()[0].key(), b"x");
//! assert_eq!(merged.estimate("x").count(), 3);
//! ```
//!
//! # Serialization
//!
//! ```rust
//! use topk::heavy_hitters::TopKSketch;
//!
//! let mut sketch = TopKSketch::new(8);
//! sketch.insert("example.com", 42);
//!
//! let bytes = sketch.serialize();
//! let decoded = TopKSketch::deserialize(&bytes).unwrap();
//! assert_eq!(decoded.estimate("example.com").count(), 42);
//! ```

mod monitored_set;
mod overflow_filter;
mod serialization;
mod sketch;

pub use self::sketch::Element;
pub use self::sketch::TopKSketch;
pub use self::sketch::TopKSketchBuilder;
