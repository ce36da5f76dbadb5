use export_core::{collect_unique, index_by, Page};
use pretty_assertions::assert_eq;

#[derive(Debug, Clone, PartialEq, Eq)]
struct Keyed {
    key: &'static str,
    v: u32,
}

#[test]
fn collect_unique_keeps_first_seen_order() {
    let items = ["A", "B", "A", "C", "B"];
    let ids = collect_unique(items, |s| *s);
    assert_eq!(ids, vec!["A", "B", "C"]);
}

#[test]
fn collect_unique_on_empty_input_is_empty() {
    let ids = collect_unique(Vec::<Keyed>::new(), |k| k.key);
    assert!(ids.is_empty());
}

#[test]
fn collect_unique_extracts_cross_references() {
    let instruments = vec![
        Keyed { key: "https://api.example.com/markets/XNAS/", v: 1 },
        Keyed { key: "https://api.example.com/markets/XNYS/", v: 2 },
        Keyed { key: "https://api.example.com/markets/XNAS/", v: 3 },
    ];
    let ids = collect_unique(&instruments, |k| k.key.to_string());
    assert_eq!(
        ids,
        vec![
            "https://api.example.com/markets/XNAS/".to_string(),
            "https://api.example.com/markets/XNYS/".to_string(),
        ]
    );
}

#[test]
fn index_by_last_write_wins() {
    let items = vec![Keyed { key: "x", v: 1 }, Keyed { key: "x", v: 2 }];
    let index = index_by(items, |k| k.key.to_string());
    assert_eq!(index.len(), 1);
    assert_eq!(index["x"].v, 2);
}

#[test]
fn index_by_keeps_distinct_keys() {
    let items = vec![Keyed { key: "a", v: 1 }, Keyed { key: "b", v: 2 }];
    let index = index_by(items.clone(), |k| k.key.to_string());
    assert_eq!(index.get("a"), Some(&items[0]));
    assert_eq!(index.get("b"), Some(&items[1]));
    assert_eq!(index.get("c"), None);
}

#[test]
fn page_cursor_marks_end_of_listing() {
    assert!(Page::<u8>::default().is_last());
    assert!(Page::last(vec![1, 2]).is_last());
    assert!(!Page::new(vec![1], "cursor-2").is_last());
}
