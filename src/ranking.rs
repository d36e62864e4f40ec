// Copyright (c) MySocial Team
// SPDX-License-Identifier: Apache-2.0

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashSet;

use crate::models::content::{EngagementStats, Post};
use crate::models::{PostId, TagId};

/// Extra weight a followed tag adds to the engagement score
const FOLLOWED_TAG_BOOST: f64 = 5.0;

/// Requested feed ordering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RankOrder {
    Id,
    Liked,
    Commented,
    Reblogged,
    Score,
}

impl Default for RankOrder {
    fn default() -> Self {
        RankOrder::Id
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    Desc,
}

impl Default for SortDirection {
    fn default() -> Self {
        SortDirection::Desc
    }
}

/// Inputs the ranking needs beyond the post itself.
///
/// `now` is fixed per request so a page of scores is deterministic for a
/// given (post, viewer, timestamp).
#[derive(Debug, Clone)]
pub struct RankingParams {
    pub now: DateTime<Utc>,
    pub gravity: f64,
    pub followed_tag_ids: HashSet<TagId>,
}

/// Recency-decayed engagement score: monotonically increasing in
/// engagement, monotonically decreasing in post age.
pub fn engagement_score(
    stats: &EngagementStats,
    followed_tag_overlap: usize,
    created_at: DateTime<Utc>,
    now: DateTime<Utc>,
    gravity: f64,
) -> f64 {
    let engagement = stats.total() as f64 + followed_tag_overlap as f64 * FOLLOWED_TAG_BOOST;
    let age_hours = (now - created_at).num_seconds().max(0) as f64 / 3600.0;
    engagement / (age_hours + 2.0).powf(gravity)
}

/// Sortable key for one post under one order mode.
///
/// Engagement for the liked/commented/reblogged orders comes from the
/// reblog chain root, since engagement is attributed to the origin.
pub fn sort_key(
    order: RankOrder,
    post: &Post,
    root_stats: &EngagementStats,
    params: &RankingParams,
) -> SortKey {
    let primary = match order {
        RankOrder::Id => post.id as f64,
        RankOrder::Liked => root_stats.num_likes as f64,
        RankOrder::Commented => root_stats.num_comments as f64,
        RankOrder::Reblogged => root_stats.num_reblogs as f64,
        RankOrder::Score => {
            let overlap = post
                .tag_ids
                .iter()
                .filter(|t| params.followed_tag_ids.contains(t))
                .count();
            engagement_score(&post.stats, overlap, post.created_at, params.now, params.gravity)
        }
    };
    SortKey { primary, id: post.id }
}

/// Comparison key with the post id appended as the final tie-break, so
/// pagination stays deterministic when primary values collide
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SortKey {
    primary: f64,
    id: PostId,
}

impl SortKey {
    pub fn compare(&self, other: &SortKey, direction: SortDirection) -> Ordering {
        let ord = self
            .primary
            .total_cmp(&other.primary)
            .then_with(|| self.id.cmp(&other.id));
        match direction {
            SortDirection::Asc => ord,
            SortDirection::Desc => ord.reverse(),
        }
    }
}
