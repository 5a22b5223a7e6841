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

//! Hashing primitives for the top-k sketch.
//!
//! Keys are hashed with MurmurHash3 (x64, 128-bit) and the digest is reduced
//! into a bounded bucket range with [`reduce`].

/// Maps a 64-bit digest into `[0, n)`.
///
/// Multiplies the low 32 bits of `hash` by `n` and keeps the high 32 bits of the
/// product. Unlike `hash % n` this needs no division and is not biased when `n`
/// is not a power of two.
///
/// # Examples
///
/// ```
/// use topk::hash::reduce;
///
/// assert_eq!(reduce(0, 100), 0);
/// assert_eq!(reduce(u64::MAX, 100), 99);
/// assert!(reduce(0xdead_beef, 7) < 7);
/// ```
#[inline]
pub fn reduce(hash: u64, n: u32) -> u32 {
    (((hash as u32) as u64 * n as u64) >> 32) as u32
}

/// Returns the 64-bit digest used to place `key` in the overflow filter.
#[inline]
pub(crate) fn hash_key(key: &[u8]) -> u64 {
    let (h1, _) = mur3::murmurhash3_x64_128(key, 0);
    h1
}
