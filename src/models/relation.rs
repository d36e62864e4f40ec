// Copyright (c) MySocial Team
// SPDX-License-Identifier: Apache-2.0

use serde::{Deserialize, Serialize};

use super::{AliasId, BlogId, CommunityId, TagId};

/// Kind of a relation edge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgeType {
    Follow,
    Block,
}

/// Target of a relation edge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FollowTarget {
    Alias(AliasId),
    Blog(BlogId),
    Community(CommunityId),
    Tag(TagId),
}

/// Directed relation edge from an alias to a target entity.
///
/// At most one edge exists per (source, target) pair. A block edge is
/// stored one-way but evaluated symmetrically: content from X is hidden
/// from Y if either account blocks the other.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FollowEdge {
    pub source_alias_id: AliasId,
    pub target: FollowTarget,
    pub edge_type: EdgeType,
}
