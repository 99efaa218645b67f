use std::collections::HashSet;

use crate::models::SearchResult;

/// Append `incoming` to `acc`, skipping titles already present and stopping
/// once `acc` holds `limit` entries. First occurrence wins; order is kept.
/// Returns how many results were added.
pub fn append_unique(
    acc: &mut Vec<SearchResult>,
    incoming: impl IntoIterator<Item = SearchResult>,
    limit: usize,
) -> usize {
    let mut seen: HashSet<String> = acc.iter().map(|r| r.title.clone()).collect();
    let before = acc.len();

    for result in incoming {
        if acc.len() >= limit {
            break;
        }
        if seen.insert(result.title.clone()) {
            acc.push(result);
        }
    }

    acc.len() - before
}
