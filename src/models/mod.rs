// Copyright (c) MySocial Team
// SPDX-License-Identifier: Apache-2.0

pub mod access_control;
pub mod alias;
pub mod content;
pub mod relation;

pub type AccountId = i64;
pub type AliasId = i64;
pub type BlogId = i64;
pub type CommunityId = i64;
pub type PostId = i64;
pub type TagId = i64;
pub type GroupId = i64;
