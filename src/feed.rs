// Copyright (c) MySocial Team
// SPDX-License-Identifier: Apache-2.0

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error};

use crate::config::Config;
use crate::error::{EngineError, Result};
use crate::metrics;
use crate::models::access_control::Capability;
use crate::models::content::Post;
use crate::models::relation::{EdgeType, FollowEdge, FollowTarget};
use crate::models::{BlogId, CommunityId, GroupId, PostId, TagId};
use crate::permission::PermissionContext;
use crate::ranking::{RankOrder, RankingParams, SortDirection};
use crate::store::{
    FollowedSources, PostFilter, PostQuery, RelationSnapshot, RelationStore, TagHierarchy,
};
use crate::visibility::{self, ViewerContext, VisibilitySets};

/// What a feed request ranges over
#[derive(Debug, Clone)]
pub enum FeedScope {
    /// Every accessible post
    All,
    /// Posts of one blog
    Blog(BlogId),
    /// Posts of one community
    Community(CommunityId),
    /// The personalized feed; `followed_only` restricts it to followed
    /// blogs/communities and followed tags
    Feed { followed_only: bool },
    /// Tag search; terms are conjunctive, each term expands to its
    /// descendant tags disjunctively
    Search { tags: Vec<String> },
}

impl FeedScope {
    fn label(&self) -> &'static str {
        match self {
            FeedScope::All => "all",
            FeedScope::Blog(_) => "blog",
            FeedScope::Community(_) => "community",
            FeedScope::Feed { .. } => "feed",
            FeedScope::Search { .. } => "search",
        }
    }
}

/// Raw scope parameters as a route layer would deliver them.
///
/// Converting to `FeedScope` rejects conflicting parameters before any
/// query executes.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScopeParams {
    pub blog_id: Option<BlogId>,
    pub community_id: Option<CommunityId>,
    pub followed_only: Option<bool>,
    pub search_tags: Option<Vec<String>>,
}

impl TryFrom<ScopeParams> for FeedScope {
    type Error = EngineError;

    fn try_from(params: ScopeParams) -> Result<FeedScope> {
        let set = [
            params.blog_id.is_some(),
            params.community_id.is_some(),
            params.followed_only.is_some(),
            params.search_tags.is_some(),
        ]
        .iter()
        .filter(|s| **s)
        .count();
        if set > 1 {
            return Err(EngineError::InvalidScope(
                "more than one of blog, community, feed and search was specified".to_string(),
            ));
        }
        Ok(if let Some(blog_id) = params.blog_id {
            FeedScope::Blog(blog_id)
        } else if let Some(community_id) = params.community_id {
            FeedScope::Community(community_id)
        } else if let Some(followed_only) = params.followed_only {
            FeedScope::Feed { followed_only }
        } else if let Some(tags) = params.search_tags {
            FeedScope::Search { tags }
        } else {
            FeedScope::All
        })
    }
}

/// One feed-assembly request
#[derive(Debug, Clone)]
pub struct FeedRequest {
    pub viewer: ViewerContext,
    pub scope: FeedScope,
    pub page: i64,
    pub order: RankOrder,
    pub direction: SortDirection,
    pub exclude_empty_reblogs: bool,
}

impl FeedRequest {
    pub fn new(viewer: ViewerContext, scope: FeedScope) -> Self {
        FeedRequest {
            viewer,
            scope,
            page: 1,
            order: RankOrder::default(),
            direction: SortDirection::default(),
            exclude_empty_reblogs: false,
        }
    }
}

/// A post row plus its reblog chain, root first.
///
/// Chain entries were each re-validated against the same accessibility
/// predicate as the row; a blocked intermediate is omitted outright.
#[derive(Debug, Clone, Serialize)]
pub struct FeedPost {
    pub post: Post,
    pub reblog_chain: Vec<Post>,
}

/// One page of an assembled feed
#[derive(Debug, Clone, Serialize)]
pub struct FeedPage {
    pub posts: Vec<FeedPost>,
    pub total: i64,
    pub page: i64,
    pub page_size: i64,
    pub total_pages: i64,
}

/// The visibility and ranking engine.
///
/// A pure reader over the relation store and the tag hierarchy; all
/// per-request sets are computed here and discarded with the response.
pub struct FeedEngine {
    store: Arc<dyn RelationStore>,
    tags: Arc<dyn TagHierarchy>,
    config: Config,
}

impl FeedEngine {
    pub fn new(store: Arc<dyn RelationStore>, tags: Arc<dyn TagHierarchy>) -> Self {
        Self::with_config(store, tags, Config::get().clone())
    }

    pub fn with_config(
        store: Arc<dyn RelationStore>,
        tags: Arc<dyn TagHierarchy>,
        config: Config,
    ) -> Self {
        FeedEngine {
            store,
            tags,
            config,
        }
    }

    /// Assemble one page of the feed for a viewer
    pub async fn assemble(&self, request: &FeedRequest) -> Result<FeedPage> {
        let started = Instant::now();
        let scope_label = request.scope.label();
        metrics::FEED_REQUESTS.with_label_values(&[scope_label]).inc();
        debug!(scope = scope_label, page = request.page, "assembling feed");

        let snapshot = self.deadline("relation store", self.store.snapshot()).await?;

        // Scope existence checks run before any scan so a bad scope is a
        // clean not-found instead of an empty page
        let mut required_tag_groups: Vec<HashSet<TagId>> = Vec::new();
        match &request.scope {
            FeedScope::Blog(id) => {
                if !self
                    .deadline("relation store", snapshot.blog_exists(*id))
                    .await?
                {
                    return Err(EngineError::NotFound("blog"));
                }
            }
            FeedScope::Community(id) => {
                if !self
                    .deadline("relation store", snapshot.community_exists(*id))
                    .await?
                {
                    return Err(EngineError::NotFound("community"));
                }
            }
            FeedScope::Search { tags } => {
                for name in tags {
                    // An unknown tag contributes an empty group, which can
                    // never match: zero results, not an error
                    let ids = self
                        .deadline("tag hierarchy", self.tags.descendant_tag_ids(name))
                        .await?;
                    required_tag_groups.push(ids.into_iter().collect());
                }
            }
            _ => {}
        }

        let scan = self
            .deadline(
                "relation store",
                visibility::scan_viewer(&*snapshot, &request.viewer),
            )
            .await?;
        let (blocked_tags, followed_tags) =
            self.expand_tag_edges(&*snapshot, &scan.viewer_edges).await?;
        let permission = self
            .permission_context(&*snapshot, &request.viewer, &scan)
            .await?;

        let followed_only = matches!(request.scope, FeedScope::Feed { followed_only: true });
        let is_search = matches!(request.scope, FeedScope::Search { .. });
        let VisibilitySets {
            blocked_accounts: _,
            inaccessible_blogs,
            followed_blogs,
            inaccessible_communities,
            followed_communities,
            inaccessible_authors,
        } = scan.sets;

        let followed_sources = if followed_only {
            Some(FollowedSources {
                blogs: followed_blogs,
                communities: followed_communities,
                tag_ids: followed_tags.clone(),
            })
        } else {
            None
        };

        let filter = PostFilter {
            blog_id: match request.scope {
                FeedScope::Blog(id) => Some(id),
                _ => None,
            },
            community_id: match request.scope {
                FeedScope::Community(id) => Some(id),
                _ => None,
            },
            blocked_authors: inaccessible_authors,
            blocked_blogs: inaccessible_blogs,
            blocked_communities: inaccessible_communities,
            blocked_tag_ids: blocked_tags,
            followed_sources,
            required_tag_groups,
            // Search never surfaces contentless reblogs
            exclude_empty_reblogs: request.exclude_empty_reblogs || is_search,
            permission,
        };

        let page = request.page.max(1);
        let page_size = self.config.feed.page_size;
        let query = PostQuery {
            filter,
            order: request.order,
            direction: request.direction,
            ranking: RankingParams {
                now: Utc::now(),
                gravity: self.config.ranking.gravity,
                followed_tag_ids: followed_tags,
            },
            limit: page_size,
            offset: (page - 1) * page_size,
        };
        let (rows, total) = self
            .deadline("relation store", snapshot.find_posts(&query))
            .await?;
        let posts = self.resolve_chains(&*snapshot, &query.filter, rows).await?;

        let total_pages = if total == 0 {
            0
        } else {
            (total + page_size - 1) / page_size
        };
        metrics::FEED_ROWS
            .with_label_values(&[scope_label])
            .inc_by(posts.len() as u64);
        metrics::FEED_DURATION
            .with_label_values(&[scope_label])
            .observe(started.elapsed().as_secs_f64());
        debug!(
            scope = scope_label,
            rows = posts.len(),
            total,
            "assembled feed page"
        );

        Ok(FeedPage {
            posts,
            total,
            page,
            page_size,
            total_pages,
        })
    }

    /// Whether the viewer may see the post at all
    pub async fn can_view(&self, post_id: PostId, viewer: &ViewerContext) -> Result<bool> {
        self.check_capability(Capability::View, post_id, viewer).await
    }

    /// Whether the viewer may comment on the post
    pub async fn can_comment(&self, post_id: PostId, viewer: &ViewerContext) -> Result<bool> {
        self.check_capability(Capability::Comment, post_id, viewer)
            .await
    }

    /// Whether the viewer may react to the post
    pub async fn can_react(&self, post_id: PostId, viewer: &ViewerContext) -> Result<bool> {
        self.check_capability(Capability::React, post_id, viewer)
            .await
    }

    async fn check_capability(
        &self,
        capability: Capability,
        post_id: PostId,
        viewer: &ViewerContext,
    ) -> Result<bool> {
        let snapshot = self.deadline("relation store", self.store.snapshot()).await?;
        let post = self
            .deadline("relation store", snapshot.fetch_post(post_id))
            .await?
            .ok_or(EngineError::NotFound("post"))?;

        let scan = self
            .deadline("relation store", visibility::scan_viewer(&*snapshot, viewer))
            .await?;
        let permission = self.permission_context(&*snapshot, viewer, &scan).await?;
        let filter = PostFilter {
            blocked_authors: scan.sets.inaccessible_authors,
            blocked_blogs: scan.sets.inaccessible_blogs,
            blocked_communities: scan.sets.inaccessible_communities,
            permission,
            ..PostFilter::default()
        };

        // Resolve the origin; a reblog of a lost or looping chain fails closed
        let mut root = post.clone();
        let mut seen = HashSet::new();
        while let Some(parent_id) = root.reblog_of {
            if !seen.insert(parent_id) {
                return Ok(false);
            }
            match self
                .deadline("relation store", snapshot.fetch_post(parent_id))
                .await?
            {
                Some(parent) => root = parent,
                None => return Ok(false),
            }
        }

        let mut group_ids: Vec<GroupId> = post.groups.all().collect();
        group_ids.extend(root.groups.view.iter().copied());
        let groups = self
            .deadline("relation store", snapshot.fetch_groups(&group_ids))
            .await?;

        let visible = filter.allows_visibility(&post, &groups)
            && (root.id == post.id || filter.allows_visibility(&root, &groups));
        let allowed = visible
            && match capability {
                Capability::View => true,
                _ => filter.permission.can(capability, &post, &groups),
            };
        if !allowed {
            metrics::PERMISSION_DENIALS
                .with_label_values(&[capability.as_str()])
                .inc();
        }
        Ok(allowed)
    }

    async fn permission_context(
        &self,
        snapshot: &dyn RelationSnapshot,
        viewer: &ViewerContext,
        scan: &visibility::ViewerScan,
    ) -> Result<PermissionContext> {
        let group_memberships = match viewer.alias_id {
            Some(alias_id) => {
                self.deadline("relation store", snapshot.group_memberships_of(alias_id))
                    .await?
            }
            None => HashSet::new(),
        };
        Ok(PermissionContext::build(
            viewer,
            &scan.blogs,
            &scan.communities,
            &scan.viewer_edges,
            group_memberships,
        ))
    }

    /// Expand the viewer's tag follow/block edges into descendant-closed
    /// id sets
    async fn expand_tag_edges(
        &self,
        snapshot: &dyn RelationSnapshot,
        viewer_edges: &[FollowEdge],
    ) -> Result<(HashSet<TagId>, HashSet<TagId>)> {
        let mut blocked_ids = Vec::new();
        let mut followed_ids = Vec::new();
        for edge in viewer_edges {
            if let FollowTarget::Tag(tag_id) = edge.target {
                match edge.edge_type {
                    EdgeType::Block => blocked_ids.push(tag_id),
                    EdgeType::Follow => followed_ids.push(tag_id),
                }
            }
        }
        let blocked = self.expand_tags(snapshot, &blocked_ids).await?;
        let followed = self.expand_tags(snapshot, &followed_ids).await?;
        Ok((blocked, followed))
    }

    async fn expand_tags(
        &self,
        snapshot: &dyn RelationSnapshot,
        ids: &[TagId],
    ) -> Result<HashSet<TagId>> {
        if ids.is_empty() {
            return Ok(HashSet::new());
        }
        let tags = self
            .deadline("relation store", snapshot.fetch_tags(ids))
            .await?;
        let mut out = HashSet::new();
        for tag in tags {
            // A followed or blocked tag implies every tag below it
            let descendants = self
                .deadline("tag hierarchy", self.tags.descendant_tag_ids(&tag.name))
                .await?;
            out.extend(descendants);
            out.insert(tag.id);
        }
        Ok(out)
    }

    /// Fetch and re-validate the reblog chains for one page of rows
    async fn resolve_chains(
        &self,
        snapshot: &dyn RelationSnapshot,
        filter: &PostFilter,
        rows: Vec<Post>,
    ) -> Result<Vec<FeedPost>> {
        let mut ancestors: HashMap<PostId, Post> = HashMap::new();
        let mut frontier: Vec<PostId> = rows.iter().filter_map(|p| p.reblog_of).collect();
        loop {
            frontier.retain(|id| !ancestors.contains_key(id));
            frontier.dedup();
            if frontier.is_empty() {
                break;
            }
            let fetched = self
                .deadline("relation store", snapshot.fetch_posts(&frontier))
                .await?;
            if fetched.is_empty() {
                break;
            }
            frontier = fetched.values().filter_map(|p| p.reblog_of).collect();
            ancestors.extend(fetched);
        }

        let group_ids: Vec<GroupId> = ancestors
            .values()
            .flat_map(|p| p.groups.view.iter().copied())
            .collect();
        let groups = if group_ids.is_empty() {
            HashMap::new()
        } else {
            self.deadline("relation store", snapshot.fetch_groups(&group_ids))
                .await?
        };

        let mut out = Vec::with_capacity(rows.len());
        for post in rows {
            let mut chain = Vec::new();
            let mut cursor = post.reblog_of;
            let mut seen = HashSet::new();
            while let Some(id) = cursor {
                if !seen.insert(id) {
                    break;
                }
                match ancestors.get(&id) {
                    Some(parent) => {
                        cursor = parent.reblog_of;
                        chain.push(parent.clone());
                    }
                    None => break,
                }
            }
            chain.reverse();
            // A blocked intermediate reblog is dropped, never rendered
            chain.retain(|entry| filter.allows_visibility(entry, &groups));
            out.push(FeedPost {
                post,
                reblog_chain: chain,
            });
        }
        Ok(out)
    }

    /// Bound one dependency call; on timeout the request fails closed
    /// rather than returning partial visibility data
    async fn deadline<T, F>(&self, dependency: &'static str, fut: F) -> Result<T>
    where
        F: Future<Output = anyhow::Result<T>>,
    {
        let timeout = self.config.dependency_timeout();
        match tokio::time::timeout(timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => {
                error!(dependency, error = %e, "dependency call failed");
                Err(EngineError::Store(e))
            }
            Err(_) => {
                error!(dependency, ?timeout, "dependency call timed out, failing closed");
                Err(EngineError::DependencyTimeout {
                    dependency,
                    timeout,
                })
            }
        }
    }
}
