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

mod common;

use common::assert_bounds;
use common::exact_counts;
use common::exact_ranking;
use common::exponential_words;
use common::key_str;
use googletest::assert_that;
use googletest::prelude::contains_substring;
use googletest::prelude::eq;
use googletest::prelude::le;
use rand::Rng;
use rand::SeedableRng;
use rand::rngs::StdRng;
use topk::error::ErrorKind;
use topk::heavy_hitters::TopKSketch;

#[test]
fn test_empty() {
    let sketch = TopKSketch::new(10);
    assert!(sketch.is_empty());
    assert_eq!(sketch.count(), 0);
    assert!(sketch.keys().is_empty());
    assert_eq!(sketch.target_size(), 10);
    assert_eq!(sketch.capacity(), 60);
    assert_eq!(sketch.filter_len(), 360);

    let unseen = sketch.estimate("nothing");
    assert_eq!(unseen.key(), b"nothing");
    assert_eq!(unseen.count(), 0);
    assert_eq!(unseen.error(), 0);
}

#[test]
fn test_small_stream_is_exact() {
    let mut sketch = TopKSketch::new(10);
    for (key, weight) in [("a", 5), ("b", 3), ("c", 7), ("d", 2)] {
        let element = sketch.insert(key, weight);
        assert_eq!(element.count(), weight);
        assert_eq!(element.error(), 0);
    }

    let top = sketch.keys();
    let ranked: Vec<(&str, u64)> = top.iter().map(|e| (key_str(e), e.count())).collect();
    assert_eq!(ranked, vec![("c", 7), ("a", 5), ("b", 3), ("d", 2)]);
    assert_eq!(sketch.estimate("a").count(), 5);
    assert_eq!(sketch.count(), 17);
}

#[test]
fn test_repeated_insert_accumulates() {
    let mut sketch = TopKSketch::new(2);
    sketch.update("a");
    sketch.insert("a", 4);
    let element = sketch.update("a");
    assert_eq!(element.count(), 6);
    assert_eq!(element.error(), 0);
    assert_eq!(sketch.num_monitored(), 1);
}

#[test]
fn test_keys_ties_break_by_key() {
    let mut sketch = TopKSketch::new(3);
    for key in ["delta", "alpha", "charlie", "bravo"] {
        sketch.insert(key, 2);
    }
    let top = sketch.keys();
    let keys: Vec<&str> = top.iter().map(key_str).collect();
    assert_eq!(keys, vec!["alpha", "bravo", "charlie"]);
}

#[test]
fn test_keys_truncates_to_target_size() {
    let mut sketch = TopKSketch::new(3);
    for i in 1..=10u64 {
        sketch.insert(format!("key-{i:02}"), i);
    }
    let top = sketch.keys();
    assert_eq!(top.len(), 3);
    let keys: Vec<&str> = top.iter().map(key_str).collect();
    assert_eq!(keys, vec!["key-10", "key-09", "key-08"]);
    assert_eq!(sketch.num_monitored(), 10);
}

#[test]
fn test_light_key_goes_to_filter_when_full() {
    let mut sketch = TopKSketch::new(1);
    for key in ["a", "b", "c", "d", "e", "f"] {
        sketch.insert(key, 10);
    }
    assert_eq!(sketch.num_monitored(), sketch.capacity());

    let element = sketch.insert("light", 3);
    assert_eq!(element.count(), 3);
    assert_eq!(element.error(), 0);
    assert!(sketch.keys().iter().all(|e| e.key() != b"light"));

    let estimate = sketch.estimate("light");
    assert!(estimate.count() >= 3);
    assert_eq!(estimate.count(), estimate.error());
}

#[test]
fn test_heavy_key_evicts_minimum() {
    let mut sketch = TopKSketch::new(1);
    for (key, weight) in [("a", 10), ("b", 10), ("c", 10), ("d", 10), ("e", 10), ("min", 2)] {
        sketch.insert(key, weight);
    }

    let element = sketch.insert("heavy", 50);
    assert_eq!(element.key(), b"heavy");
    assert_eq!(element.count(), 50 + element.error());
    assert_eq!(sketch.keys()[0].key(), b"heavy");
    assert_eq!(sketch.num_monitored(), sketch.capacity());

    // the evicted key keeps at least its last count through the filter
    let evicted = sketch.estimate("min");
    assert!(evicted.count() >= 2);
    assert_eq!(evicted.count(), evicted.error());
}

#[test]
fn test_error_bounds_hold_on_every_insert() {
    let mut rng = StdRng::seed_from_u64(42);
    let words = exponential_words(1, 20_000, 30.0);
    let mut sketch = TopKSketch::new(10);
    let mut exact = std::collections::HashMap::<String, u64>::new();
    let mut total = 0;

    for word in &words {
        let weight = rng.random_range(1..=5u64);
        total += weight;
        *exact.entry(word.clone()).or_insert(0) += weight;
        let element = sketch.insert(word, weight);
        assert_eq!(element.key(), word.as_bytes());
        assert_bounds(&element, exact[word]);
    }

    assert_eq!(sketch.count(), total);
    for (word, &count) in &exact {
        assert_bounds(&sketch.estimate(word), count);
    }
}

#[test]
fn test_top_keys_match_exact_ranking() {
    let words = exponential_words(7, 50_000, 10.0);
    let mut sketch = TopKSketch::new(20);
    for word in &words {
        sketch.update(word);
    }

    let exact = exact_counts(words.iter().map(|w| (w.as_str(), 1)));
    let ranking = exact_ranking(&exact);
    let top = sketch.keys();
    assert_eq!(top.len(), 20);
    for i in 0..10 {
        assert_eq!(key_str(&top[i]), ranking[i].0, "rank {i}");
        assert_eq!(top[i].count(), ranking[i].1, "rank {i}");
    }
    assert_eq!(sketch.count(), words.len() as u64);
}

#[test]
fn test_estimate_agrees_with_keys() {
    let words = exponential_words(3, 10_000, 25.0);
    let mut sketch = TopKSketch::new(15);
    for word in &words {
        sketch.update(word);
    }
    for element in sketch.keys() {
        assert_eq!(sketch.estimate(element.key()), element);
    }
}

#[test]
fn test_keys_are_sorted() {
    let words = exponential_words(5, 10_000, 40.0);
    let mut sketch = TopKSketch::new(25);
    for word in &words {
        sketch.update(word);
    }
    let top = sketch.keys();
    for pair in top.windows(2) {
        assert_that!(pair[1].count(), le(pair[0].count()));
        if pair[0].count() == pair[1].count() {
            assert!(pair[0].key() < pair[1].key());
        }
    }
}

#[test]
fn test_clear_resets_state() {
    let words = exponential_words(11, 5_000, 20.0);
    let mut sketch = TopKSketch::new(5);
    for word in &words {
        sketch.update(word);
    }
    assert!(!sketch.is_empty());

    sketch.clear();
    assert!(sketch.is_empty());
    assert_eq!(sketch.count(), 0);
    assert!(sketch.keys().is_empty());
    assert_eq!(sketch.target_size(), 5);
    assert_eq!(sketch.capacity(), 30);
    for word in &words {
        assert_eq!(sketch.estimate(word).count(), 0);
    }
    assert_eq!(sketch, TopKSketch::new(5));

    sketch.insert("again", 2);
    assert_eq!(sketch.keys()[0].count(), 2);
}

#[test]
fn test_alternative_tunings_keep_bounds() {
    let words = exponential_words(13, 10_000, 30.0);
    let exact = exact_counts(words.iter().map(|w| (w.as_str(), 1)));
    for (factor, multiplier) in [(1, 1), (2, 3), (6, 6), (10, 2)] {
        let mut sketch = TopKSketch::builder(8)
            .over_provision_factor(factor)
            .filter_multiplier(multiplier)
            .build()
            .unwrap();
        assert_eq!(sketch.capacity(), 8 * factor as usize);
        assert_eq!(sketch.filter_len(), 8 * factor as usize * multiplier as usize);
        for word in &words {
            sketch.update(word);
        }
        assert_that!(sketch.keys().len(), eq(8));
        for (word, &count) in &exact {
            assert_bounds(&sketch.estimate(word), count);
        }
    }
}

#[test]
fn test_default_tuning_constants() {
    assert_eq!(TopKSketch::OVER_PROVISION_FACTOR, 6);
    assert_eq!(TopKSketch::FILTER_MULTIPLIER, 6);
    let sketch = TopKSketch::new(7);
    assert_eq!(sketch.over_provision_factor(), TopKSketch::OVER_PROVISION_FACTOR);
    assert_eq!(sketch.filter_multiplier(), TopKSketch::FILTER_MULTIPLIER);
}

#[test]
fn test_invalid_configuration() {
    let err = TopKSketch::try_new(0).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ConfigInvalid);
    assert_that!(err.message(), contains_substring("target_size must be positive"));

    let err = TopKSketch::builder(4)
        .over_provision_factor(0)
        .build()
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ConfigInvalid);

    let err = TopKSketch::builder(4).filter_multiplier(0).build().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ConfigInvalid);

    let err = TopKSketch::builder(usize::MAX).build().unwrap_err();
    assert_that!(err.message(), contains_substring("filter length"));
}

#[test]
#[should_panic(expected = "target_size must be positive")]
fn test_zero_target_size_panics() {
    TopKSketch::new(0);
}

#[test]
#[should_panic(expected = "weight must be positive")]
fn test_zero_weight_panics() {
    let mut sketch = TopKSketch::new(1);
    sketch.insert("a", 0);
}

#[test]
fn test_binary_keys() {
    let mut sketch = TopKSketch::new(4);
    sketch.insert([0u8, 1, 2], 3);
    sketch.insert(vec![0xffu8, 0x00], 1);
    sketch.insert(&b"\x00\x01\x02"[..], 2);
    let top = sketch.keys();
    assert_eq!(top[0].key(), &[0u8, 1, 2]);
    assert_eq!(top[0].count(), 5);
    assert_eq!(top[1].key(), &[0xffu8, 0x00]);
}

#[test]
fn test_weights_saturate() {
    let mut sketch = TopKSketch::new(1);
    sketch.insert("a", u64::MAX - 1);
    let element = sketch.insert("a", 5);
    assert_eq!(element.count(), u64::MAX);
    assert_eq!(element.error(), 0);
    assert_eq!(sketch.count(), u64::MAX);

    sketch.insert("b", u64::MAX);
    assert_eq!(sketch.estimate("b").count(), u64::MAX);
    assert_eq!(sketch.count(), u64::MAX);
}
