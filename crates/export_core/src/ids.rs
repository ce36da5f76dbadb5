use std::collections::HashSet;

/// Extracts the distinct ids of `items`, keeping the position of first occurrence.
///
/// `extract` is applied to every item in input order; repeats are skipped.
pub fn collect_unique<I, S, F>(items: I, mut extract: F) -> Vec<String>
where
    I: IntoIterator,
    F: FnMut(&I::Item) -> S,
    S: Into<String>,
{
    let mut seen = HashSet::new();
    let mut ids = Vec::new();
    for item in items {
        let id = extract(&item).into();
        if seen.insert(id.clone()) {
            ids.push(id);
        }
    }
    ids
}
