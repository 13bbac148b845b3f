// Copyright (C) 2025 Stackwright Contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Ownership tags applied to every cluster-scoped cloud resource.

use stackwright_cloud::Tag;

/// Tag key marking a resource as owned by a cluster; value is the cluster uid.
pub const CLUSTER_TAG_KEY: &str = "stackwright.io/cluster";

/// Tag key recording the human-readable cluster name.
pub const CLUSTER_NAME_TAG_KEY: &str = "stackwright.io/cluster-name";

/// Tag key recording the node pool a resource belongs to.
pub const NODE_POOL_TAG_KEY: &str = "stackwright.io/node-pool";

/// The ownership tag for a cluster.
pub fn ownership_tag(cluster_uid: &str) -> Tag {
    Tag::new(CLUSTER_TAG_KEY, cluster_uid)
}

/// Standard tag set for cluster-scoped resources.
pub fn cluster_tags(cluster_uid: &str, cluster_name: &str) -> Vec<Tag> {
    vec![
        ownership_tag(cluster_uid),
        Tag::new(CLUSTER_NAME_TAG_KEY, cluster_name),
    ]
}

/// Tag set for a node pool's resources.
pub fn node_pool_tags(cluster_uid: &str, cluster_name: &str, pool_name: &str) -> Vec<Tag> {
    let mut tags = cluster_tags(cluster_uid, cluster_name);
    tags.push(Tag::new(NODE_POOL_TAG_KEY, pool_name));
    tags
}
