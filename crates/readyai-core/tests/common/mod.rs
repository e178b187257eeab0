//! Shared helpers for readyai-core integration tests.

use readyai_core::{Dom, MemoryDom, PageSnapshot, SearchRoots};
use readyai_types::DetectionMode;
use std::path::PathBuf;

/// Load a page fixture from `tests/fixtures/pages`.
pub fn load_page(name: &str) -> PageSnapshot {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join("pages")
        .join(format!("{}.json", name));

    let content = std::fs::read_to_string(&path)
        .unwrap_or_else(|e| panic!("Failed to read fixture {}: {}", path.display(), e));

    serde_json::from_str(&content)
        .unwrap_or_else(|e| panic!("Failed to parse fixture {}: {}", path.display(), e))
}

/// Build a DOM from a fixture and index its search roots for `mode`.
pub fn load_dom(name: &str, mode: DetectionMode) -> (MemoryDom, SearchRoots<<MemoryDom as Dom>::Node>) {
    let dom = MemoryDom::from_snapshot(load_page(name));
    let mut roots = SearchRoots::new();
    roots.init(&dom, mode.uses_deep_search(), 0);
    (dom, roots)
}
