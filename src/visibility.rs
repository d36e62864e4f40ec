// Copyright (c) MySocial Team
// SPDX-License-Identifier: Apache-2.0

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tracing::debug;

use crate::models::access_control::AcgSetting;
use crate::models::alias::Alias;
use crate::models::content::{Blog, Community};
use crate::models::relation::{EdgeType, FollowEdge, FollowTarget};
use crate::models::{AccountId, AliasId, BlogId, CommunityId};
use crate::store::RelationSnapshot;

/// The identity a request is evaluated for
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViewerContext {
    pub alias_id: Option<AliasId>,
    pub account_id: Option<AccountId>,
    pub is_minor: bool,
    pub show_minors: bool,
}

impl ViewerContext {
    /// Anonymous viewers are treated as minors
    pub fn anonymous() -> Self {
        ViewerContext {
            alias_id: None,
            account_id: None,
            is_minor: true,
            show_minors: true,
        }
    }

    pub fn for_alias(alias: &Alias) -> Self {
        ViewerContext {
            alias_id: Some(alias.id),
            account_id: Some(alias.account_id),
            is_minor: alias.is_minor,
            show_minors: alias.show_minors,
        }
    }
}

/// Per-request partition of blogs, communities and authors into entities
/// that may appear and entities that must never appear
#[derive(Debug, Clone, Default)]
pub struct VisibilitySets {
    /// Accounts blocked by the viewer's account or blocking it
    pub blocked_accounts: HashSet<AccountId>,
    pub inaccessible_blogs: HashSet<BlogId>,
    /// Accessible blogs the viewer explicitly follows
    pub followed_blogs: HashSet<BlogId>,
    pub inaccessible_communities: HashSet<CommunityId>,
    /// Accessible communities the viewer explicitly follows
    pub followed_communities: HashSet<CommunityId>,
    pub inaccessible_authors: HashSet<AliasId>,
}

/// Raw scan output kept around so later stages reuse the same fetches
pub(crate) struct ViewerScan {
    pub sets: VisibilitySets,
    pub blogs: Vec<Blog>,
    pub communities: Vec<Community>,
    /// Edges whose source is the viewer's current alias
    pub viewer_edges: Vec<FollowEdge>,
}

/// Compute the per-request visibility sets for one viewer.
///
/// Runs one pass over all aliases, blogs and communities so blocking and
/// minors rules are evaluated once per request instead of once per
/// candidate post; the feed layer intersects candidates against the
/// resulting id-sets.
pub async fn resolve_visibility(
    snapshot: &dyn RelationSnapshot,
    viewer: &ViewerContext,
) -> Result<VisibilitySets> {
    Ok(scan_viewer(snapshot, viewer).await?.sets)
}

pub(crate) async fn scan_viewer(
    snapshot: &dyn RelationSnapshot,
    viewer: &ViewerContext,
) -> Result<ViewerScan> {
    let (aliases, blogs, communities) = futures::try_join!(
        snapshot.fetch_aliases(),
        snapshot.fetch_blogs(),
        snapshot.fetch_communities(),
    )?;
    let (account_edges, reverse_blocks) = match viewer.account_id {
        Some(account_id) => futures::try_join!(
            snapshot.edges_from_account(account_id),
            snapshot.block_edges_against(account_id),
        )?,
        None => (Vec::new(), Vec::new()),
    };

    let alias_accounts: HashMap<AliasId, AccountId> =
        aliases.iter().map(|a| (a.id, a.account_id)).collect();

    let mut sets = VisibilitySets::default();

    // Mutual blocking collapses to one account set per request; blocking is
    // account-wide even though edges are stored between specific aliases.
    for edge in &account_edges {
        if edge.edge_type == EdgeType::Block {
            if let FollowTarget::Alias(target) = edge.target {
                if let Some(account) = alias_accounts.get(&target) {
                    sets.blocked_accounts.insert(*account);
                }
            }
        }
    }
    for edge in &reverse_blocks {
        if let Some(account) = alias_accounts.get(&edge.source_alias_id) {
            sets.blocked_accounts.insert(*account);
        }
    }

    // Authors: blocked accounts plus the minors mismatch, applied in both
    // directions. The viewer's own aliases are never gated against them.
    for alias in &aliases {
        if viewer.account_id == Some(alias.account_id) {
            continue;
        }
        if sets.blocked_accounts.contains(&alias.account_id)
            || (viewer.is_minor && !alias.show_minors)
            || (!viewer.show_minors && alias.is_minor)
        {
            sets.inaccessible_authors.insert(alias.id);
        }
    }

    let viewer_edges: Vec<FollowEdge> = account_edges
        .iter()
        .filter(|e| viewer.alias_id == Some(e.source_alias_id))
        .cloned()
        .collect();

    let mut followed_blog_ids = HashSet::new();
    let mut blocked_blog_ids = HashSet::new();
    let mut followed_community_ids = HashSet::new();
    let mut blocked_community_ids = HashSet::new();
    for edge in &viewer_edges {
        match (edge.edge_type, edge.target) {
            (EdgeType::Follow, FollowTarget::Blog(id)) => {
                followed_blog_ids.insert(id);
            }
            (EdgeType::Block, FollowTarget::Blog(id)) => {
                blocked_blog_ids.insert(id);
            }
            (EdgeType::Follow, FollowTarget::Community(id)) => {
                followed_community_ids.insert(id);
            }
            (EdgeType::Block, FollowTarget::Community(id)) => {
                blocked_community_ids.insert(id);
            }
            _ => {}
        }
    }

    for blog in &blogs {
        let owner_account = alias_accounts.get(&blog.owner_alias_id);
        if viewer.account_id.is_some() && owner_account == viewer.account_id.as_ref() {
            // The viewer always sees their own blogs
            if followed_blog_ids.contains(&blog.id) {
                sets.followed_blogs.insert(blog.id);
            }
            continue;
        }
        let follows = followed_blog_ids.contains(&blog.id);
        let owner_hidden = sets.inaccessible_authors.contains(&blog.owner_alias_id);
        let subscriber_gated = blog.content_access == AcgSetting::Subscribers && !follows;
        if owner_hidden || blocked_blog_ids.contains(&blog.id) || subscriber_gated {
            sets.inaccessible_blogs.insert(blog.id);
        } else if follows {
            sets.followed_blogs.insert(blog.id);
        }
    }

    for community in &communities {
        let member = community.is_member(viewer.alias_id);
        let member_gated = community.visibility == AcgSetting::Members && !member;
        let minor_gated = viewer.is_minor && !community.allow_minors;
        if member_gated || minor_gated || blocked_community_ids.contains(&community.id) {
            sets.inaccessible_communities.insert(community.id);
        } else if followed_community_ids.contains(&community.id) {
            sets.followed_communities.insert(community.id);
        }
    }

    debug!(
        blocked_accounts = sets.blocked_accounts.len(),
        hidden_authors = sets.inaccessible_authors.len(),
        hidden_blogs = sets.inaccessible_blogs.len(),
        hidden_communities = sets.inaccessible_communities.len(),
        "resolved visibility sets"
    );

    Ok(ViewerScan {
        sets,
        blogs,
        communities,
        viewer_edges,
    })
}
