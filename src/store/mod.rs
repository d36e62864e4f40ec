// Copyright (c) MySocial Team
// SPDX-License-Identifier: Apache-2.0

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::models::access_control::{AccessControlGroup, Capability};
use crate::models::alias::Alias;
use crate::models::content::{Blog, Community, Post, Tag};
use crate::models::relation::FollowEdge;
use crate::models::{AccountId, AliasId, BlogId, CommunityId, GroupId, PostId, TagId};
use crate::permission::PermissionContext;
use crate::ranking::{RankOrder, RankingParams, SortDirection};

/// Durable storage of identities, content entities and relation edges
#[async_trait]
pub trait RelationStore: Send + Sync {
    /// Open one consistent read view for a single request.
    ///
    /// Every read of a request (full-table scans and the final post query)
    /// goes through the same snapshot, so a concurrent follow/block
    /// mutation cannot make them disagree.
    async fn snapshot(&self) -> Result<Arc<dyn RelationSnapshot>>;
}

/// One consistent read view of the relation store
#[async_trait]
pub trait RelationSnapshot: Send + Sync {
    async fn fetch_aliases(&self) -> Result<Vec<Alias>>;
    async fn fetch_blogs(&self) -> Result<Vec<Blog>>;
    async fn fetch_communities(&self) -> Result<Vec<Community>>;

    /// All edges whose source is any alias of the account
    async fn edges_from_account(&self, account_id: AccountId) -> Result<Vec<FollowEdge>>;

    /// Block edges, from anywhere, targeting an alias of the account
    async fn block_edges_against(&self, account_id: AccountId) -> Result<Vec<FollowEdge>>;

    /// Ids of the access-control groups the alias belongs to
    async fn group_memberships_of(&self, alias_id: AliasId) -> Result<HashSet<GroupId>>;

    async fn fetch_groups(
        &self,
        ids: &[GroupId],
    ) -> Result<HashMap<GroupId, AccessControlGroup>>;

    async fn fetch_post(&self, id: PostId) -> Result<Option<Post>>;
    async fn fetch_posts(&self, ids: &[PostId]) -> Result<HashMap<PostId, Post>>;
    async fn fetch_tags(&self, ids: &[TagId]) -> Result<Vec<Tag>>;

    async fn blog_exists(&self, id: BlogId) -> Result<bool>;
    async fn community_exists(&self, id: CommunityId) -> Result<bool>;

    /// Run one post query: filter, order, paginate.
    ///
    /// Returns the page of rows plus the total count of the filtered,
    /// de-duplicated set (not the unfiltered one).
    async fn find_posts(&self, query: &PostQuery) -> Result<(Vec<Post>, i64)>;
}

/// Transitive descendant expansion over the external tag hierarchy
#[async_trait]
pub trait TagHierarchy: Send + Sync {
    /// Expand a tag name into itself plus all transitive descendants.
    /// An unknown name yields an empty set, never an error.
    async fn descendant_tag_ids(&self, tag_name: &str) -> Result<Vec<TagId>>;
}

/// Sources a followed-only feed may draw from
#[derive(Debug, Clone, Default)]
pub struct FollowedSources {
    pub blogs: HashSet<BlogId>,
    pub communities: HashSet<CommunityId>,
    /// A post carrying any of these tags qualifies even from an unfollowed source
    pub tag_ids: HashSet<TagId>,
}

/// Declarative, push-downable post predicate.
///
/// Every condition is a set-membership test over precomputed per-request
/// sets, so a backing store can translate the whole filter into its own
/// query language instead of loading candidate rows for a callback.
#[derive(Debug, Clone, Default)]
pub struct PostFilter {
    /// Scope restriction to one blog
    pub blog_id: Option<BlogId>,
    /// Scope restriction to one community
    pub community_id: Option<CommunityId>,
    /// Authors that must never appear (blocked or minors-gated)
    pub blocked_authors: HashSet<AliasId>,
    /// Blogs whose posts must never appear
    pub blocked_blogs: HashSet<BlogId>,
    /// Communities whose posts must never appear
    pub blocked_communities: HashSet<CommunityId>,
    /// Any of these tags on a post hides it
    pub blocked_tag_ids: HashSet<TagId>,
    /// Followed-only mode: the post must come from a followed source
    pub followed_sources: Option<FollowedSources>,
    /// Search mode: the post must carry at least one tag id from every
    /// group (conjunctive across terms, disjunctive within a term)
    pub required_tag_groups: Vec<HashSet<TagId>>,
    /// Drop reblogs that add no content of their own
    pub exclude_empty_reblogs: bool,
    /// Viewer capability sets for the access-control gates
    pub permission: PermissionContext,
}

impl PostFilter {
    /// Structural accessibility of one post: author, blog, community and
    /// tag blocks plus the view capability gates. Re-applied to every
    /// reblog chain entry so a blocked intermediate never leaks.
    pub fn allows_visibility(
        &self,
        post: &Post,
        groups: &HashMap<GroupId, AccessControlGroup>,
    ) -> bool {
        if self.blocked_authors.contains(&post.author_alias_id) {
            return false;
        }
        if post
            .blog_id
            .map_or(false, |id| self.blocked_blogs.contains(&id))
        {
            return false;
        }
        if post
            .community_id
            .map_or(false, |id| self.blocked_communities.contains(&id))
        {
            return false;
        }
        if post.tag_ids.iter().any(|t| self.blocked_tag_ids.contains(t)) {
            return false;
        }
        self.permission.can(Capability::View, post, groups)
    }

    /// Scope and mode conditions that apply to candidate rows only,
    /// never to reblog chain ancestors
    pub fn matches_scope(&self, post: &Post) -> bool {
        if let Some(blog_id) = self.blog_id {
            if post.blog_id != Some(blog_id) {
                return false;
            }
        }
        if let Some(community_id) = self.community_id {
            if post.community_id != Some(community_id) {
                return false;
            }
        }
        if let Some(sources) = &self.followed_sources {
            let followed = post
                .blog_id
                .map_or(false, |id| sources.blogs.contains(&id))
                || post
                    .community_id
                    .map_or(false, |id| sources.communities.contains(&id))
                || post.tag_ids.iter().any(|t| sources.tag_ids.contains(t));
            if !followed {
                return false;
            }
        }
        for group in &self.required_tag_groups {
            if !post.tag_ids.iter().any(|t| group.contains(t)) {
                return false;
            }
        }
        if self.exclude_empty_reblogs && post.reblog_of.is_some() && !post.has_own_content {
            return false;
        }
        true
    }
}

/// A fully-specified post query: declarative predicate plus ordering,
/// ranking inputs and pagination
#[derive(Debug, Clone)]
pub struct PostQuery {
    pub filter: PostFilter,
    pub order: RankOrder,
    pub direction: SortDirection,
    pub ranking: RankingParams,
    pub limit: i64,
    pub offset: i64,
}
