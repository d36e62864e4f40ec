// Copyright (c) MySocial Team
// SPDX-License-Identifier: Apache-2.0

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use super::{AliasId, GroupId};

/// Rule attached to an access-control group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AcgSetting {
    /// No restriction
    Open,
    /// Restricted to community members
    Members,
    /// Restricted to followers of the owning blog
    Subscribers,
    /// Explicit whitelist of aliases
    SpecificInclude,
    /// Explicit blacklist of aliases
    SpecificExclude,
}

/// Capability a group reference guards on a post
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Capability {
    View,
    Comment,
    React,
}

impl Capability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::View => "view",
            Capability::Comment => "comment",
            Capability::React => "react",
        }
    }
}

/// A named rule plus a mutable membership set controlling one capability
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessControlGroup {
    pub id: GroupId,
    pub setting: AcgSetting,
    pub members: HashSet<AliasId>,
}

/// Group references a post carries, one list per capability dimension
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CapabilityGroups {
    pub view: Vec<GroupId>,
    pub comment: Vec<GroupId>,
    pub react: Vec<GroupId>,
}

impl CapabilityGroups {
    pub fn for_capability(&self, capability: Capability) -> &[GroupId] {
        match capability {
            Capability::View => &self.view,
            Capability::Comment => &self.comment,
            Capability::React => &self.react,
        }
    }

    /// All referenced group ids across every capability
    pub fn all(&self) -> impl Iterator<Item = GroupId> + '_ {
        self.view
            .iter()
            .chain(self.comment.iter())
            .chain(self.react.iter())
            .copied()
    }
}
