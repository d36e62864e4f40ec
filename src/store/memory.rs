// Copyright (c) MySocial Team
// SPDX-License-Identifier: Apache-2.0

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::{Arc, RwLock};

use crate::models::access_control::AccessControlGroup;
use crate::models::alias::Alias;
use crate::models::content::{Blog, Community, Post, Tag};
use crate::models::relation::{EdgeType, FollowEdge, FollowTarget};
use crate::models::{AccountId, AliasId, BlogId, CommunityId, GroupId, PostId, TagId};
use crate::ranking;
use crate::store::{PostQuery, RelationSnapshot, RelationStore, TagHierarchy};

/// In-memory relation store.
///
/// The reference backend for the engine and the substrate for its tests.
/// State lives in an immutable `Arc`; mutators copy-and-swap it, so a
/// snapshot is one `Arc` clone and stays consistent for the whole request
/// no matter what is written concurrently.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<Arc<StoreState>>,
}

#[derive(Debug, Clone, Default)]
struct StoreState {
    aliases: HashMap<AliasId, Alias>,
    blogs: HashMap<BlogId, Blog>,
    communities: HashMap<CommunityId, Community>,
    posts: BTreeMap<PostId, Post>,
    edges: Vec<FollowEdge>,
    groups: HashMap<GroupId, AccessControlGroup>,
    tags: HashMap<TagId, Tag>,
    tag_children: HashMap<TagId, Vec<TagId>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn mutate(&self, apply: impl FnOnce(&mut StoreState)) {
        let mut guard = self.state.write().expect("store lock poisoned");
        let mut next = (**guard).clone();
        apply(&mut next);
        *guard = Arc::new(next);
    }

    fn current(&self) -> Arc<StoreState> {
        self.state.read().expect("store lock poisoned").clone()
    }

    pub fn insert_alias(&self, alias: Alias) {
        self.mutate(|s| {
            s.aliases.insert(alias.id, alias);
        });
    }

    pub fn insert_blog(&self, blog: Blog) {
        self.mutate(|s| {
            s.blogs.insert(blog.id, blog);
        });
    }

    pub fn insert_community(&self, community: Community) {
        self.mutate(|s| {
            s.communities.insert(community.id, community);
        });
    }

    pub fn insert_post(&self, post: Post) {
        self.mutate(|s| {
            s.posts.insert(post.id, post);
        });
    }

    pub fn insert_group(&self, group: AccessControlGroup) {
        self.mutate(|s| {
            s.groups.insert(group.id, group);
        });
    }

    pub fn add_group_member(&self, group_id: GroupId, alias_id: AliasId) {
        self.mutate(|s| {
            if let Some(group) = s.groups.get_mut(&group_id) {
                group.members.insert(alias_id);
            }
        });
    }

    pub fn insert_tag(&self, tag: Tag, parent: Option<TagId>) {
        self.mutate(|s| {
            if let Some(parent_id) = parent {
                s.tag_children.entry(parent_id).or_default().push(tag.id);
            }
            s.tags.insert(tag.id, tag);
        });
    }

    /// Insert or replace the edge for this (source, target) pair
    pub fn upsert_edge(&self, edge: FollowEdge) {
        self.mutate(|s| {
            s.edges
                .retain(|e| !(e.source_alias_id == edge.source_alias_id && e.target == edge.target));
            s.edges.push(edge);
        });
    }

    pub fn remove_edge(&self, source_alias_id: AliasId, target: FollowTarget) {
        self.mutate(|s| {
            s.edges
                .retain(|e| !(e.source_alias_id == source_alias_id && e.target == target));
        });
    }
}

#[async_trait]
impl RelationStore for MemoryStore {
    async fn snapshot(&self) -> Result<Arc<dyn RelationSnapshot>> {
        Ok(Arc::new(MemorySnapshot {
            state: self.current(),
        }))
    }
}

#[async_trait]
impl TagHierarchy for MemoryStore {
    async fn descendant_tag_ids(&self, tag_name: &str) -> Result<Vec<TagId>> {
        let state = self.current();
        let Some(root) = state.tags.values().find(|t| t.name == tag_name) else {
            return Ok(Vec::new());
        };
        Ok(descendants_of(&state, root.id))
    }
}

fn descendants_of(state: &StoreState, root: TagId) -> Vec<TagId> {
    let mut out = Vec::new();
    let mut seen = HashSet::new();
    let mut queue = VecDeque::from([root]);
    while let Some(id) = queue.pop_front() {
        if !seen.insert(id) {
            continue;
        }
        out.push(id);
        if let Some(children) = state.tag_children.get(&id) {
            queue.extend(children.iter().copied());
        }
    }
    out
}

struct MemorySnapshot {
    state: Arc<StoreState>,
}

impl MemorySnapshot {
    fn account_of(&self, alias_id: AliasId) -> Option<AccountId> {
        self.state.aliases.get(&alias_id).map(|a| a.account_id)
    }

    /// Walk a reblog chain to its root; `None` when a parent is missing
    /// or the chain loops, which callers treat as an invalid origin
    fn chain_root<'a>(&'a self, post: &'a Post) -> Option<&'a Post> {
        let mut current = post;
        let mut seen = HashSet::new();
        while let Some(parent_id) = current.reblog_of {
            if !seen.insert(parent_id) {
                return None;
            }
            current = self.state.posts.get(&parent_id)?;
        }
        Some(current)
    }
}

#[async_trait]
impl RelationSnapshot for MemorySnapshot {
    async fn fetch_aliases(&self) -> Result<Vec<Alias>> {
        Ok(self.state.aliases.values().cloned().collect())
    }

    async fn fetch_blogs(&self) -> Result<Vec<Blog>> {
        Ok(self.state.blogs.values().cloned().collect())
    }

    async fn fetch_communities(&self) -> Result<Vec<Community>> {
        Ok(self.state.communities.values().cloned().collect())
    }

    async fn edges_from_account(&self, account_id: AccountId) -> Result<Vec<FollowEdge>> {
        Ok(self
            .state
            .edges
            .iter()
            .filter(|e| self.account_of(e.source_alias_id) == Some(account_id))
            .cloned()
            .collect())
    }

    async fn block_edges_against(&self, account_id: AccountId) -> Result<Vec<FollowEdge>> {
        Ok(self
            .state
            .edges
            .iter()
            .filter(|e| {
                e.edge_type == EdgeType::Block
                    && match e.target {
                        FollowTarget::Alias(target) => {
                            self.account_of(target) == Some(account_id)
                        }
                        _ => false,
                    }
            })
            .cloned()
            .collect())
    }

    async fn group_memberships_of(&self, alias_id: AliasId) -> Result<HashSet<GroupId>> {
        Ok(self
            .state
            .groups
            .values()
            .filter(|g| g.members.contains(&alias_id))
            .map(|g| g.id)
            .collect())
    }

    async fn fetch_groups(
        &self,
        ids: &[GroupId],
    ) -> Result<HashMap<GroupId, AccessControlGroup>> {
        Ok(ids
            .iter()
            .filter_map(|id| self.state.groups.get(id).map(|g| (*id, g.clone())))
            .collect())
    }

    async fn fetch_post(&self, id: PostId) -> Result<Option<Post>> {
        Ok(self.state.posts.get(&id).cloned())
    }

    async fn fetch_posts(&self, ids: &[PostId]) -> Result<HashMap<PostId, Post>> {
        Ok(ids
            .iter()
            .filter_map(|id| self.state.posts.get(id).map(|p| (*id, p.clone())))
            .collect())
    }

    async fn fetch_tags(&self, ids: &[TagId]) -> Result<Vec<Tag>> {
        Ok(ids
            .iter()
            .filter_map(|id| self.state.tags.get(id).cloned())
            .collect())
    }

    async fn blog_exists(&self, id: BlogId) -> Result<bool> {
        Ok(self.state.blogs.contains_key(&id))
    }

    async fn community_exists(&self, id: CommunityId) -> Result<bool> {
        Ok(self.state.communities.contains_key(&id))
    }

    async fn find_posts(&self, query: &PostQuery) -> Result<(Vec<Post>, i64)> {
        if query.limit < 0 || query.offset < 0 {
            return Err(anyhow!("negative limit or offset"));
        }
        let groups = &self.state.groups;
        let mut matched: Vec<(&Post, ranking::SortKey)> = Vec::new();
        for post in self.state.posts.values() {
            if !query.filter.matches_scope(post) {
                continue;
            }
            if !query.filter.allows_visibility(post, groups) {
                continue;
            }
            // Never show a reblog of an invisible post: the chain root
            // itself must pass the accessibility predicate.
            let Some(root) = self.chain_root(post) else {
                continue;
            };
            if root.id != post.id && !query.filter.allows_visibility(root, groups) {
                continue;
            }
            let key = ranking::sort_key(query.order, post, &root.stats, &query.ranking);
            matched.push((post, key));
        }
        matched.sort_by(|(_, a), (_, b)| a.compare(b, query.direction));
        let total = matched.len() as i64;
        let rows = matched
            .into_iter()
            .skip(query.offset as usize)
            .take(query.limit as usize)
            .map(|(post, _)| post.clone())
            .collect();
        Ok((rows, total))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::access_control::CapabilityGroups;
    use crate::models::content::EngagementStats;
    use crate::permission::PermissionContext;
    use crate::ranking::{RankOrder, RankingParams, SortDirection};
    use crate::store::PostFilter;
    use chrono::Utc;

    fn post(id: PostId, blog_id: BlogId) -> Post {
        Post {
            id,
            blog_id: Some(blog_id),
            community_id: None,
            author_alias_id: 1,
            reblog_of: None,
            has_own_content: true,
            tag_ids: HashSet::new(),
            groups: CapabilityGroups::default(),
            stats: EngagementStats::default(),
            created_at: Utc::now(),
        }
    }

    fn query(limit: i64, offset: i64) -> PostQuery {
        PostQuery {
            filter: PostFilter {
                permission: PermissionContext {
                    alias_id: Some(1),
                    ..Default::default()
                },
                ..Default::default()
            },
            order: RankOrder::Id,
            direction: SortDirection::Desc,
            ranking: RankingParams {
                now: Utc::now(),
                gravity: 1.5,
                followed_tag_ids: HashSet::new(),
            },
            limit,
            offset,
        }
    }

    #[tokio::test]
    async fn upsert_edge_keeps_one_edge_per_pair() {
        let store = MemoryStore::new();
        store.insert_alias(Alias {
            id: 1,
            account_id: 1,
            is_minor: false,
            show_minors: true,
        });
        store.upsert_edge(FollowEdge {
            source_alias_id: 1,
            target: FollowTarget::Blog(5),
            edge_type: EdgeType::Follow,
        });
        store.upsert_edge(FollowEdge {
            source_alias_id: 1,
            target: FollowTarget::Blog(5),
            edge_type: EdgeType::Block,
        });

        let snapshot = store.snapshot().await.unwrap();
        let edges = snapshot.edges_from_account(1).await.unwrap();
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].edge_type, EdgeType::Block);
    }

    #[tokio::test]
    async fn remove_edge_deletes_the_pair() {
        let store = MemoryStore::new();
        store.insert_alias(Alias {
            id: 1,
            account_id: 1,
            is_minor: false,
            show_minors: true,
        });
        store.upsert_edge(FollowEdge {
            source_alias_id: 1,
            target: FollowTarget::Blog(5),
            edge_type: EdgeType::Follow,
        });
        store.remove_edge(1, FollowTarget::Blog(5));

        let snapshot = store.snapshot().await.unwrap();
        assert!(snapshot.edges_from_account(1).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn descendant_expansion_is_transitive() {
        let store = MemoryStore::new();
        store.insert_tag(
            Tag {
                id: 1,
                name: "art".into(),
            },
            None,
        );
        store.insert_tag(
            Tag {
                id: 2,
                name: "painting".into(),
            },
            Some(1),
        );
        store.insert_tag(
            Tag {
                id: 3,
                name: "watercolor".into(),
            },
            Some(2),
        );

        let mut ids = store.descendant_tag_ids("art").await.unwrap();
        ids.sort();
        assert_eq!(ids, vec![1, 2, 3]);
        assert!(store.descendant_tag_ids("no-such-tag").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn pagination_is_disjoint_and_exhaustive() {
        let store = MemoryStore::new();
        for id in 1..=5 {
            store.insert_post(post(id, 1));
        }
        let snapshot = store.snapshot().await.unwrap();

        let mut seen = Vec::new();
        for page in 0..3 {
            let (rows, total) = snapshot.find_posts(&query(2, page * 2)).await.unwrap();
            assert_eq!(total, 5);
            seen.extend(rows.iter().map(|p| p.id));
        }
        assert_eq!(seen, vec![5, 4, 3, 2, 1]);
    }

    #[tokio::test]
    async fn snapshot_is_isolated_from_later_writes() {
        let store = MemoryStore::new();
        store.insert_post(post(1, 1));
        let snapshot = store.snapshot().await.unwrap();
        store.insert_post(post(2, 1));

        let (rows, total) = snapshot.find_posts(&query(10, 0)).await.unwrap();
        assert_eq!(total, 1);
        assert_eq!(rows[0].id, 1);
    }

    #[tokio::test]
    async fn reblog_with_missing_parent_is_excluded() {
        let store = MemoryStore::new();
        let mut reblog = post(2, 1);
        reblog.reblog_of = Some(99);
        store.insert_post(reblog);

        let snapshot = store.snapshot().await.unwrap();
        let (rows, total) = snapshot.find_posts(&query(10, 0)).await.unwrap();
        assert!(rows.is_empty());
        assert_eq!(total, 0);
    }
}
