use std::collections::HashMap;

/// Builds a lookup from `key(item)` to item.
///
/// Items sharing a key overwrite each other: the last one in input order wins.
pub fn index_by<I, F>(items: I, mut key: F) -> HashMap<String, I::Item>
where
    I: IntoIterator,
    F: FnMut(&I::Item) -> String,
{
    let iter = items.into_iter();
    let mut index = HashMap::with_capacity(iter.size_hint().0);
    for item in iter {
        index.insert(key(&item), item);
    }
    index
}
