// Copyright (C) 2025 Stackwright Contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Deterministic subnet CIDR assignment.
//!
//! Availability zones that need subnets are sorted and assigned sequential
//! /20 blocks out of the cluster VPC range, so a replayed or retried
//! workflow computes the same layout.

use std::collections::BTreeMap;

/// The VPC range subnets are carved from.
pub const VPC_CIDR: &str = "10.0.0.0/16";

/// A /16 holds sixteen /20 blocks.
const MAX_BLOCKS: usize = 16;

/// Assign each zone a /20 block inside [`VPC_CIDR`], in sorted zone order.
///
/// Returns `None` when more zones are requested than the VPC can hold.
pub fn assign_subnet_blocks(zones: &[String]) -> Option<BTreeMap<String, String>> {
    let mut sorted: Vec<&String> = zones.iter().collect();
    sorted.sort();
    sorted.dedup();
    if sorted.len() > MAX_BLOCKS {
        return None;
    }
    Some(
        sorted
            .into_iter()
            .enumerate()
            .map(|(i, zone)| (zone.clone(), format!("10.0.{}.0/20", i * 16)))
            .collect(),
    )
}
