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

#![allow(dead_code)]

use std::collections::HashMap;

use rand::Rng;
use rand::SeedableRng;
use rand::rngs::StdRng;
use topk::heavy_hitters::Element;

/// Keys `word-N` with `N` drawn from an exponential distribution of the given mean.
pub fn exponential_words(seed: u64, len: usize, mean: f64) -> Vec<String> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..len)
        .map(|_| {
            let u: f64 = rng.random();
            let x = -(1.0 - u).ln() * mean;
            format!("word-{}", x as u64)
        })
        .collect()
}

pub fn exact_counts<'a>(items: impl IntoIterator<Item = (&'a str, u64)>) -> HashMap<String, u64> {
    let mut counts = HashMap::new();
    for (key, weight) in items {
        *counts.entry(key.to_string()).or_insert(0) += weight;
    }
    counts
}

/// Keys sorted by exact count descending, then key ascending.
pub fn exact_ranking(counts: &HashMap<String, u64>) -> Vec<(String, u64)> {
    let mut ranking: Vec<(String, u64)> = counts.iter().map(|(k, &v)| (k.clone(), v)).collect();
    ranking.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranking
}

pub fn assert_bounds(element: &Element, exact: u64) {
    let key = String::from_utf8_lossy(element.key());
    assert!(
        element.count() >= exact,
        "estimate lower than exact: key={key}, exact={exact}, estimate={}",
        element.count()
    );
    assert!(
        element.lower_bound() <= exact,
        "error bounds too large: key={key}, count={}, error={}, exact={exact}",
        element.count(),
        element.error()
    );
}

pub fn key_str(element: &Element) -> &str {
    std::str::from_utf8(element.key()).unwrap()
}
