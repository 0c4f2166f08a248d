//! Hit aggregation
//!
//! Hits are filtered by the query's range and uri allow-list, grouped by
//! `(app, uri)` and counted either raw or by distinct client address.
//! Groups are returned by count descending; equal counts keep the order in
//! which the group was first seen.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::debug;

use crate::error::ServiceResult;
use crate::stats::models::{HitRecord, StatEntry, StatsQuery};
use crate::storage::HitStorage;

struct Group<'a> {
    app: &'a str,
    uri: &'a str,
    hits: u64,
    ips: HashSet<&'a str>,
}

/// Aggregate hits supplied in insertion order
pub fn aggregate<'a, I>(hits: I, query: &StatsQuery) -> Vec<StatEntry>
where
    I: IntoIterator<Item = &'a HitRecord>,
{
    let mut index: HashMap<(&'a str, &'a str), usize> = HashMap::new();
    let mut groups: Vec<Group<'a>> = Vec::new();

    for hit in hits.into_iter().filter(|hit| query.admits(hit)) {
        let slot = *index
            .entry((hit.app.as_str(), hit.uri.as_str()))
            .or_insert_with(|| {
                groups.push(Group {
                    app: &hit.app,
                    uri: &hit.uri,
                    hits: 0,
                    ips: HashSet::new(),
                });
                groups.len() - 1
            });

        let group = &mut groups[slot];
        group.hits += 1;
        if query.unique {
            group.ips.insert(&hit.ip);
        }
    }

    let mut entries: Vec<StatEntry> = groups
        .into_iter()
        .map(|group| StatEntry {
            app: group.app.to_string(),
            uri: group.uri.to_string(),
            hits: if query.unique {
                group.ips.len() as u64
            } else {
                group.hits
            },
        })
        .collect();

    // Stable sort keeps first-seen order among equal counts
    entries.sort_by(|a, b| b.hits.cmp(&a.hits));
    entries
}

/// Answers statistics queries against the hit log
#[derive(Clone)]
pub struct StatsAggregator {
    hits: Arc<dyn HitStorage>,
}

impl StatsAggregator {
    pub fn new(hits: Arc<dyn HitStorage>) -> Self {
        Self { hits }
    }

    pub async fn query(&self, query: &StatsQuery) -> ServiceResult<Vec<StatEntry>> {
        let entries = self.hits.hit_stats(query).await?;
        debug!(
            groups = entries.len(),
            unique = query.unique,
            "Answered stats query"
        );
        Ok(entries)
    }
}
