//! Comparison Engine (spec.md §4.6): deterministic diff between two
//! `RenderedDocument`s (JS-rendered vs plain-fetched).

use std::collections::{BTreeSet, HashMap, HashSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::document::{ImageEntry, LinkEntry, RenderedDocument, Section};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StringDiff {
    pub js_value: String,
    pub non_js_value: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct SetDiff {
    pub added: Vec<String>,
    pub removed: Vec<String>,
}

impl SetDiff {
    fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum SectionDiffKind {
    Unchanged,
    Changed {
        non_js_body: String,
        heading_level_changed: bool,
    },
    AddedByJs,
    RemovedByJs,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SectionDiff {
    pub section_id: String,
    pub heading_level: u8,
    pub heading_text: String,
    pub kind: SectionDiffKind,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct KeyedDiff {
    pub added: Vec<String>,
    pub removed: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StructuredDataDiff {
    pub added: Vec<String>,
    pub removed: Vec<String>,
    pub changed: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CompareDiff {
    pub title: Option<StringDiff>,
    pub meta_description: Option<StringDiff>,
    pub canonical_url: Option<StringDiff>,
    pub meta_robots: Option<StringDiff>,
    pub h1: Option<SetDiff>,
    pub h2: Option<SetDiff>,
    pub h3: Option<SetDiff>,
    pub sections: Vec<SectionDiff>,
    pub links: KeyedDiff,
    pub links_added_count: usize,
    pub links_removed_count: usize,
    pub images: KeyedDiff,
    pub images_added_count: usize,
    pub images_removed_count: usize,
    pub structured_data: StructuredDataDiff,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum OverallChange {
    None,
    Minor,
    Major,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderingImpact {
    pub content_change_percent: f64,
    pub title_changed: bool,
    pub overall_change: OverallChange,
}

fn string_diff(js: &str, non_js: &str) -> Option<StringDiff> {
    if js == non_js {
        None
    } else {
        Some(StringDiff {
            js_value: js.to_string(),
            non_js_value: non_js.to_string(),
        })
    }
}

fn set_diff(js: &[String], non_js: &[String]) -> Option<SetDiff> {
    let js_set: BTreeSet<&String> = js.iter().collect();
    let non_js_set: BTreeSet<&String> = non_js.iter().collect();
    if js_set == non_js_set {
        return None;
    }
    let added: Vec<String> = js_set.difference(&non_js_set).map(|s| s.to_string()).collect();
    let removed: Vec<String> = non_js_set.difference(&js_set).map(|s| s.to_string()).collect();
    Some(SetDiff { added, removed })
}

fn normalize_heading_text(text: &str) -> String {
    text.trim().to_lowercase()
}

fn diff_sections(js: &[Section], non_js: &[Section]) -> Vec<SectionDiff> {
    let mut js_remaining: Vec<&Section> = js.iter().collect();
    let mut non_js_remaining: Vec<&Section> = non_js.iter().collect();
    let mut out = Vec::new();

    // Pass 1: exact key match (heading_level, normalized heading text).
    let mut matched_js_idx = Vec::new();
    let mut matched_non_js_idx = Vec::new();
    for (ji, js_sec) in js_remaining.iter().enumerate() {
        let key = (js_sec.heading_level, normalize_heading_text(&js_sec.heading_text));
        if let Some(ni) = non_js_remaining.iter().position(|n| {
            (n.heading_level, normalize_heading_text(&n.heading_text)) == key
        }) {
            let non_js_sec = non_js_remaining[ni];
            let kind = if js_sec.body_markdown == non_js_sec.body_markdown {
                SectionDiffKind::Unchanged
            } else {
                SectionDiffKind::Changed {
                    non_js_body: non_js_sec.body_markdown.clone(),
                    heading_level_changed: false,
                }
            };
            out.push(SectionDiff {
                section_id: js_sec.section_id.clone(),
                heading_level: js_sec.heading_level,
                heading_text: js_sec.heading_text.clone(),
                kind,
            });
            matched_js_idx.push(ji);
            matched_non_js_idx.push(ni);
        }
    }
    // Remove matched, preserving relative order, highest index first.
    let mut matched_js_idx_sorted = matched_js_idx.clone();
    matched_js_idx_sorted.sort_unstable_by(|a, b| b.cmp(a));
    for idx in matched_js_idx_sorted {
        js_remaining.remove(idx);
    }
    let mut matched_non_js_idx_sorted = matched_non_js_idx.clone();
    matched_non_js_idx_sorted.sort_unstable_by(|a, b| b.cmp(a));
    for idx in matched_non_js_idx_sorted {
        non_js_remaining.remove(idx);
    }

    // Pass 2: text-only fallback for unmatched JS sections with non-empty
    // heading text, against unconsumed non-JS sections. Intro sections
    // (empty heading text) never participate here.
    let mut still_unmatched_js = Vec::new();
    for js_sec in js_remaining.into_iter() {
        if js_sec.heading_text.trim().is_empty() {
            still_unmatched_js.push(js_sec);
            continue;
        }
        let key = normalize_heading_text(&js_sec.heading_text);
        if let Some(ni) = non_js_remaining
            .iter()
            .position(|n| normalize_heading_text(&n.heading_text) == key)
        {
            let non_js_sec = non_js_remaining.remove(ni);
            out.push(SectionDiff {
                section_id: js_sec.section_id.clone(),
                heading_level: js_sec.heading_level,
                heading_text: js_sec.heading_text.clone(),
                kind: SectionDiffKind::Changed {
                    non_js_body: non_js_sec.body_markdown.clone(),
                    heading_level_changed: true,
                },
            });
        } else {
            still_unmatched_js.push(js_sec);
        }
    }

    // Pass 3: remaining sections on each side.
    for js_sec in still_unmatched_js {
        out.push(SectionDiff {
            section_id: js_sec.section_id.clone(),
            heading_level: js_sec.heading_level,
            heading_text: js_sec.heading_text.clone(),
            kind: SectionDiffKind::AddedByJs,
        });
    }
    for non_js_sec in non_js_remaining {
        out.push(SectionDiff {
            section_id: non_js_sec.section_id.clone(),
            heading_level: non_js_sec.heading_level,
            heading_text: non_js_sec.heading_text.clone(),
            kind: SectionDiffKind::RemovedByJs,
        });
    }

    out
}

fn dedup_links(links: &[LinkEntry]) -> HashMap<&str, &LinkEntry> {
    let mut seen = HashMap::new();
    for link in links {
        seen.entry(link.href.as_str()).or_insert(link);
    }
    seen
}

fn dedup_images(images: &[ImageEntry]) -> HashMap<&str, &ImageEntry> {
    let mut seen = HashMap::new();
    for image in images {
        seen.entry(image.src.as_str()).or_insert(image);
    }
    seen
}

fn keyed_set_diff<'a>(js_keys: &HashSet<&'a str>, non_js_keys: &HashSet<&'a str>) -> KeyedDiff {
    let mut added: Vec<String> = js_keys.difference(non_js_keys).map(|s| s.to_string()).collect();
    let mut removed: Vec<String> = non_js_keys.difference(js_keys).map(|s| s.to_string()).collect();
    added.sort();
    removed.sort();
    KeyedDiff { added, removed }
}

fn structured_data_type_key(value: &Value, fallback_index: usize) -> String {
    match value.get("@type") {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Array(arr)) => {
            let joined: Vec<String> = arr
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect();
            if joined.is_empty() {
                format!("(unknown-{fallback_index})")
            } else {
                joined.join(",")
            }
        }
        _ => format!("(unknown-{fallback_index})"),
    }
}

fn index_structured_data(blocks: &[Value]) -> HashMap<String, String> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    let mut out = HashMap::new();
    for (i, block) in blocks.iter().enumerate() {
        let base_key = structured_data_type_key(block, i);
        let count = counts.entry(base_key.clone()).or_insert(0);
        *count += 1;
        let key = if *count == 1 {
            base_key
        } else {
            format!("{base_key}#{count}")
        };
        let raw = serde_json::to_string(block).unwrap_or_default();
        out.insert(key, raw);
    }
    out
}

fn diff_structured_data(js: &[Value], non_js: &[Value]) -> StructuredDataDiff {
    let js_indexed = index_structured_data(js);
    let non_js_indexed = index_structured_data(non_js);

    let mut added = Vec::new();
    let mut removed = Vec::new();
    let mut changed = Vec::new();

    for (key, raw) in &js_indexed {
        match non_js_indexed.get(key) {
            None => added.push(key.clone()),
            Some(other_raw) if other_raw != raw => changed.push(key.clone()),
            _ => {}
        }
    }
    for key in non_js_indexed.keys() {
        if !js_indexed.contains_key(key) {
            removed.push(key.clone());
        }
    }

    added.sort();
    removed.sort();
    changed.sort();
    StructuredDataDiff {
        added,
        removed,
        changed,
    }
}

pub fn diff(js: &RenderedDocument, non_js: &RenderedDocument) -> CompareDiff {
    let js_links = dedup_links(&js.links);
    let non_js_links = dedup_links(&non_js.links);
    let js_link_keys: HashSet<&str> = js_links.keys().copied().collect();
    let non_js_link_keys: HashSet<&str> = non_js_links.keys().copied().collect();
    let links = keyed_set_diff(&js_link_keys, &non_js_link_keys);

    let js_images = dedup_images(&js.images);
    let non_js_images = dedup_images(&non_js.images);
    let js_image_keys: HashSet<&str> = js_images.keys().copied().collect();
    let non_js_image_keys: HashSet<&str> = non_js_images.keys().copied().collect();
    let images = keyed_set_diff(&js_image_keys, &non_js_image_keys);

    CompareDiff {
        title: string_diff(&js.title, &non_js.title),
        meta_description: string_diff(&js.meta_description, &non_js.meta_description),
        canonical_url: string_diff(&js.canonical_url, &non_js.canonical_url),
        meta_robots: string_diff(&js.meta_robots, &non_js.meta_robots),
        h1: set_diff(&js.h1, &non_js.h1),
        h2: set_diff(&js.h2, &non_js.h2),
        h3: set_diff(&js.h3, &non_js.h3),
        sections: diff_sections(&js.sections, &non_js.sections),
        links_added_count: links.added.len(),
        links_removed_count: links.removed.len(),
        links,
        images_added_count: images.added.len(),
        images_removed_count: images.removed.len(),
        images,
        structured_data: diff_structured_data(&js.structured_data, &non_js.structured_data),
    }
}

pub fn classify_impact(js: &RenderedDocument, non_js: &RenderedDocument, diff: &CompareDiff) -> RenderingImpact {
    let wc_js = js.word_count as f64;
    let wc_non = non_js.word_count as f64;
    let denom = wc_js.max(wc_non).max(1.0);
    let content_change_percent = ((wc_js - wc_non).abs() / denom * 100.0 * 10.0).round() / 10.0;

    let title_changed = diff.title.is_some();
    let meta_desc_changed = diff.meta_description.is_some();
    let canonical_changed = diff.canonical_url.is_some();
    let h1_changed = diff.h1.is_some();

    let no_add_remove = diff.links_added_count == 0
        && diff.links_removed_count == 0
        && diff.images_added_count == 0
        && diff.images_removed_count == 0
        && diff.structured_data.added.is_empty()
        && diff.structured_data.removed.is_empty()
        && diff.structured_data.changed.is_empty();

    let overall_change = if !title_changed
        && !meta_desc_changed
        && !canonical_changed
        && !h1_changed
        && content_change_percent < 5.0
        && no_add_remove
    {
        OverallChange::None
    } else if title_changed
        || content_change_percent > 30.0
        || diff.links_added_count > 10
        || diff.images_added_count > 5
    {
        OverallChange::Major
    } else {
        OverallChange::Minor
    };

    RenderingImpact {
        content_change_percent,
        title_changed,
        overall_change,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(title: &str, word_count: usize) -> RenderedDocument {
        RenderedDocument {
            title: title.to_string(),
            word_count,
            ..Default::default()
        }
    }

    #[test]
    fn identical_documents_diff_to_none_and_unchanged_sections() {
        let a = RenderedDocument {
            title: "Same".to_string(),
            word_count: 100,
            sections: vec![Section {
                section_id: "s1".to_string(),
                heading_level: 1,
                heading_text: "Intro".to_string(),
                body_markdown: "hello".to_string(),
                detection_method: "semantic".to_string(),
            }],
            ..Default::default()
        };
        let b = a.clone();
        let d = diff(&a, &b);
        let impact = classify_impact(&a, &b, &d);
        assert_eq!(impact.overall_change, OverallChange::None);
        assert!(d.sections.iter().all(|s| matches!(s.kind, SectionDiffKind::Unchanged)));
    }

    #[test]
    fn title_change_is_major() {
        let a = doc("A", 50);
        let b = doc("B", 50);
        let d = diff(&a, &b);
        let impact = classify_impact(&a, &b, &d);
        assert_eq!(impact.overall_change, OverallChange::Major);
        assert!(impact.title_changed);
    }

    #[test]
    fn set_diff_sorted_and_minimal() {
        let h1 = vec!["A".to_string(), "B".to_string()];
        let h1_other = vec!["B".to_string(), "C".to_string()];
        let d = set_diff(&h1, &h1_other).unwrap();
        assert_eq!(d.added, vec!["A".to_string()]);
        assert_eq!(d.removed, vec!["C".to_string()]);
    }

    #[test]
    fn section_text_only_fallback_marks_heading_level_changed() {
        let js_sections = vec![Section {
            section_id: "s1".to_string(),
            heading_level: 2,
            heading_text: "Pricing".to_string(),
            body_markdown: "new body".to_string(),
            detection_method: "semantic".to_string(),
        }];
        let non_js_sections = vec![Section {
            section_id: "s1".to_string(),
            heading_level: 1,
            heading_text: "Pricing".to_string(),
            body_markdown: "old body".to_string(),
            detection_method: "semantic".to_string(),
        }];
        let diffs = diff_sections(&js_sections, &non_js_sections);
        assert_eq!(diffs.len(), 1);
        match &diffs[0].kind {
            SectionDiffKind::Changed {
                heading_level_changed,
                ..
            } => assert!(*heading_level_changed),
            other => panic!("expected Changed, got {other:?}"),
        }
    }

    #[test]
    fn structured_data_collision_suffix_and_classification() {
        let js = vec![
            serde_json::json!({"@type": "Product", "name": "A"}),
            serde_json::json!({"@type": "Product", "name": "B"}),
        ];
        let non_js = vec![serde_json::json!({"@type": "Product", "name": "A"})];
        let d = diff_structured_data(&js, &non_js);
        assert!(d.added.contains(&"Product#2".to_string()));
        assert!(d.added.is_empty() == false);
    }

    #[test]
    fn links_and_images_dedup_by_key_with_raw_counts() {
        let js_links = vec![
            LinkEntry { href: "/a".to_string(), text: "A".to_string() },
            LinkEntry { href: "/a".to_string(), text: "A-dup".to_string() },
            LinkEntry { href: "/b".to_string(), text: "B".to_string() },
        ];
        let non_js_links = vec![LinkEntry { href: "/a".to_string(), text: "A".to_string() }];
        let js_doc = RenderedDocument {
            links: js_links,
            ..Default::default()
        };
        let non_js_doc = RenderedDocument {
            links: non_js_links,
            ..Default::default()
        };
        let d = diff(&js_doc, &non_js_doc);
        assert_eq!(d.links.added, vec!["/b".to_string()]);
        assert_eq!(d.links_added_count, 1);
    }
}
