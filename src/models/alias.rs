// Copyright (c) MySocial Team
// SPDX-License-Identifier: Apache-2.0

use serde::{Deserialize, Serialize};

use super::{AccountId, AliasId};

/// A user-facing persona; one account may operate several.
///
/// Blocking is expressed between aliases but always evaluated at the
/// account level: blocking any alias of an account blocks all of them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alias {
    pub id: AliasId,
    pub account_id: AccountId,
    /// Whether this alias belongs to a minor
    pub is_minor: bool,
    /// Whether this alias is willing to see minor-authored content
    pub show_minors: bool,
}
