// Copyright (c) MySocial Team
// SPDX-License-Identifier: Apache-2.0

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use super::access_control::{AcgSetting, CapabilityGroups};
use super::{AliasId, BlogId, CommunityId, PostId, TagId};

/// A blog owned by exactly one alias
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Blog {
    pub id: BlogId,
    pub owner_alias_id: AliasId,
    /// Content gate for the whole blog: `Open` or `Subscribers`
    pub content_access: AcgSetting,
    pub created_at: DateTime<Utc>,
}

/// A collectively-owned community with members and moderators
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Community {
    pub id: CommunityId,
    /// View gate for community content: `Open` or `Members`
    pub visibility: AcgSetting,
    /// Comment gate inherited by every post in the community
    pub comment_access: AcgSetting,
    /// Reaction gate inherited by every post in the community
    pub react_access: AcgSetting,
    /// Whether minor viewers may see this community at all
    pub allow_minors: bool,
    pub members: HashSet<AliasId>,
    pub moderators: HashSet<AliasId>,
    pub created_at: DateTime<Utc>,
}

impl Community {
    /// Members and moderators both count as community membership
    pub fn is_member(&self, alias: Option<AliasId>) -> bool {
        match alias {
            Some(a) => self.members.contains(&a) || self.moderators.contains(&a),
            None => false,
        }
    }
}

/// Engagement counters for a post
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct EngagementStats {
    pub num_likes: i64,
    pub num_comments: i64,
    pub num_reblogs: i64,
}

impl EngagementStats {
    pub fn total(&self) -> i64 {
        self.num_likes + self.num_comments + self.num_reblogs
    }
}

/// A post belonging to exactly one of a blog or a community.
///
/// `reblog_of` links to the parent when this post is a reblog; chains are
/// acyclic by construction but resolved defensively as an unbounded list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Post {
    pub id: PostId,
    pub blog_id: Option<BlogId>,
    pub community_id: Option<CommunityId>,
    pub author_alias_id: AliasId,
    pub reblog_of: Option<PostId>,
    /// False for a reblog that adds no content of its own
    pub has_own_content: bool,
    pub tag_ids: HashSet<TagId>,
    pub groups: CapabilityGroups,
    pub stats: EngagementStats,
    pub created_at: DateTime<Utc>,
}

/// A tag; the parent/child hierarchy over tags lives behind the tag
/// hierarchy service and is only consumed for descendant expansion
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tag {
    pub id: TagId,
    pub name: String,
}
