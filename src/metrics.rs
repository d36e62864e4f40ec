// Copyright (c) MySocial Team
// SPDX-License-Identifier: Apache-2.0

use once_cell::sync::Lazy;
use prometheus::{
    register_histogram_vec_with_registry, register_int_counter_vec_with_registry, HistogramVec,
    IntCounterVec, Registry,
};

/// Registry holding every engine metric
pub static REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);

/// Feed assembly requests, labelled by scope
pub static FEED_REQUESTS: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec_with_registry!(
        "feed_requests_total",
        "Number of feed assembly requests by scope",
        &["scope"],
        REGISTRY.clone()
    )
    .expect("register feed_requests_total")
});

/// Rows returned to callers, labelled by scope
pub static FEED_ROWS: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec_with_registry!(
        "feed_rows_returned_total",
        "Number of post rows returned by scope",
        &["scope"],
        REGISTRY.clone()
    )
    .expect("register feed_rows_returned_total")
});

/// Feed assembly latency in seconds, labelled by scope
pub static FEED_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec_with_registry!(
        "feed_request_duration_seconds",
        "Feed assembly latency in seconds by scope",
        &["scope"],
        REGISTRY.clone()
    )
    .expect("register feed_request_duration_seconds")
});

/// Single-post capability checks that ended in a denial, labelled by capability
pub static PERMISSION_DENIALS: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec_with_registry!(
        "permission_denials_total",
        "Single-post capability denials by capability",
        &["capability"],
        REGISTRY.clone()
    )
    .expect("register permission_denials_total")
});

/// Gather all engine metrics for scraping
pub fn gather() -> Vec<prometheus::proto::MetricFamily> {
    REGISTRY.gather()
}
