// Copyright (c) MySocial Team
// SPDX-License-Identifier: Apache-2.0

use std::collections::{HashMap, HashSet};

use crate::models::access_control::{AccessControlGroup, AcgSetting, Capability};
use crate::models::content::{Blog, Community, Post};
use crate::models::relation::{EdgeType, FollowEdge, FollowTarget};
use crate::models::{AliasId, BlogId, CommunityId, GroupId};
use crate::visibility::ViewerContext;

/// Viewer membership sets computed once per request.
///
/// Everything the capability gates need is reduced to set membership here,
/// so the resulting predicate can be pushed down to a backing store instead
/// of evaluated as a per-row callback.
#[derive(Debug, Clone, Default)]
pub struct PermissionContext {
    pub alias_id: Option<AliasId>,
    /// Access-control groups the viewer belongs to
    pub group_memberships: HashSet<GroupId>,
    /// Communities the viewer is a member or moderator of
    pub member_communities: HashSet<CommunityId>,
    /// Blogs the viewer holds a follow edge to
    pub followed_blogs: HashSet<BlogId>,
    /// Blogs owned by the viewer's alias
    pub owned_blogs: HashSet<BlogId>,
    /// Communities whose view gate is `Members`
    pub member_gated_communities: HashSet<CommunityId>,
    /// Communities whose comment gate is `Members`
    pub comment_gated_communities: HashSet<CommunityId>,
    /// Communities whose reaction gate is `Members`
    pub react_gated_communities: HashSet<CommunityId>,
    /// Blogs whose content gate is `Subscribers`
    pub subscriber_gated_blogs: HashSet<BlogId>,
}

impl PermissionContext {
    /// Build the context from data fetched once for the request
    pub fn build(
        viewer: &ViewerContext,
        blogs: &[Blog],
        communities: &[Community],
        viewer_edges: &[FollowEdge],
        group_memberships: HashSet<GroupId>,
    ) -> Self {
        let mut ctx = PermissionContext {
            alias_id: viewer.alias_id,
            group_memberships,
            ..Default::default()
        };
        for blog in blogs {
            if viewer.alias_id == Some(blog.owner_alias_id) {
                ctx.owned_blogs.insert(blog.id);
            }
            if blog.content_access == AcgSetting::Subscribers {
                ctx.subscriber_gated_blogs.insert(blog.id);
            }
        }
        for community in communities {
            if community.is_member(viewer.alias_id) {
                ctx.member_communities.insert(community.id);
            }
            if community.visibility == AcgSetting::Members {
                ctx.member_gated_communities.insert(community.id);
            }
            if community.comment_access == AcgSetting::Members {
                ctx.comment_gated_communities.insert(community.id);
            }
            if community.react_access == AcgSetting::Members {
                ctx.react_gated_communities.insert(community.id);
            }
        }
        for edge in viewer_edges {
            if edge.edge_type == EdgeType::Follow {
                if let FollowTarget::Blog(blog_id) = edge.target {
                    ctx.followed_blogs.insert(blog_id);
                }
            }
        }
        ctx
    }

    /// Whether the viewer holds the capability on this post.
    ///
    /// Evaluation order, short-circuiting on the first denial:
    /// 1. any blacklist group listing the viewer denies;
    /// 2. if whitelist groups exist, the viewer must belong to at least one;
    /// 3. a `Members` community gate requires community membership;
    /// 4. a `Subscribers` blog gate requires ownership or a follow edge.
    ///
    /// Group membership is resolved against the precomputed
    /// `group_memberships` set, never the group member lists, so the whole
    /// predicate stays set-membership over per-request data. Anonymous
    /// viewers have an empty set and are denied outright by any non-empty
    /// whitelist.
    pub fn can(
        &self,
        capability: Capability,
        post: &Post,
        groups: &HashMap<GroupId, AccessControlGroup>,
    ) -> bool {
        let mut saw_whitelist = false;
        let mut in_whitelist = false;
        for id in post.groups.for_capability(capability) {
            let Some(group) = groups.get(id) else {
                continue;
            };
            match group.setting {
                AcgSetting::SpecificExclude => {
                    if self.group_memberships.contains(id) {
                        return false;
                    }
                }
                AcgSetting::SpecificInclude => {
                    saw_whitelist = true;
                    if self.group_memberships.contains(id) {
                        in_whitelist = true;
                    }
                }
                _ => {}
            }
        }
        if saw_whitelist && !in_whitelist {
            return false;
        }
        if let Some(community_id) = post.community_id {
            let gated = match capability {
                Capability::View => &self.member_gated_communities,
                Capability::Comment => &self.comment_gated_communities,
                Capability::React => &self.react_gated_communities,
            };
            if gated.contains(&community_id) && !self.member_communities.contains(&community_id) {
                return false;
            }
        }
        if let Some(blog_id) = post.blog_id {
            if self.subscriber_gated_blogs.contains(&blog_id)
                && !self.owned_blogs.contains(&blog_id)
                && !self.followed_blogs.contains(&blog_id)
            {
                return false;
            }
        }
        true
    }
}
