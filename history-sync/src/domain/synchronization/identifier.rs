//! Identifier Normalizer
//!
//! Converts whatever a point cell holds into the canonical identifier used for
//! lookups and matching. Never fails: odd input degrades to a best-effort string.

use lazy_static::lazy_static;
use regex::Regex;

use super::value_objects::cell_value::{CellValue, Fragment};

/// Cleaned, non-empty identifier string, e.g. `1.1.8.1`.
pub type CanonicalId = String;

lazy_static! {
    static ref POINT_ID_PATTERN: Regex = Regex::new(r"^[0-9.]+$").expect("static pattern");
}

pub fn normalize(cell: &CellValue) -> Option<CanonicalId> {
    let raw = match cell {
        CellValue::Empty => return None,
        CellValue::Scalar(scalar) => scalar.to_text(),
        CellValue::RichTextSequence(fragments) => join_fragments(fragments),
        CellValue::SingleObject(fragment) => match fragment.textual_payload() {
            Some(text) => text.to_string(),
            None => stringify_fragment(fragment),
        },
    };
    clean(&raw)
}

/// Concatenates fragment text in order. Two numeric segments that meet with no
/// separator (a linked segment split out of a dotted point id) are joined with `.`.
fn join_fragments(fragments: &[Fragment]) -> String {
    let mut joined = String::new();
    for text in fragments.iter().filter_map(Fragment::textual_payload) {
        let meets_digit = joined.ends_with(|c: char| c.is_ascii_digit())
            && text.starts_with(|c: char| c.is_ascii_digit());
        if meets_digit {
            joined.push('.');
        }
        joined.push_str(text);
    }
    joined
}

fn clean(raw: &str) -> Option<CanonicalId> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn stringify_fragment(fragment: &Fragment) -> String {
    if fragment.attributes.is_empty() {
        return String::new();
    }
    serde_json::to_string(&fragment.attributes).unwrap_or_default()
}

/// Advisory device-point naming check (`digits and dots`). Lookups proceed either way.
pub fn is_well_formed(id: &str) -> bool {
    POINT_ID_PATTERN.is_match(id.trim())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::synchronization::value_objects::cell_value::Fragment;
    use serde_json::json;

    #[test]
    fn it_should_concatenate_rich_text_and_drop_links() {
        let cell = CellValue::RichTextSequence(vec![
            Fragment::text("1.1.8"),
            Fragment::text("1")
                .with_attribute("type", "url")
                .with_attribute("link", "https://example.com/points/1"),
            Fragment::text(".2"),
        ]);
        assert_eq!(normalize(&cell), Some("1.1.8.1.2".to_string()));
    }

    #[test]
    fn it_should_only_add_separators_between_numeric_segments() {
        let cell: CellValue = serde_json::from_value(json!([
            {"text": "2."},
            {"text": "4", "link": "https://example.com/points/4"},
            {"text": "7"}
        ]))
        .unwrap();
        assert_eq!(normalize(&cell), Some("2.4.7".into()));

        let cell: CellValue =
            serde_json::from_value(json!([{"text": "Pump "}, {"text": "A"}])).unwrap();
        assert_eq!(normalize(&cell), Some("Pump A".into()));
    }

    #[test]
    fn it_should_return_none_for_empty_cells() {
        assert_eq!(normalize(&CellValue::Empty), None);
        assert_eq!(normalize(&CellValue::text("")), None);
        assert_eq!(normalize(&CellValue::text("   \t ")), None);
        assert_eq!(normalize(&CellValue::RichTextSequence(vec![])), None);
    }

    #[test]
    fn it_should_trim_and_stringify_scalars() {
        assert_eq!(normalize(&CellValue::text("  1.1.8.1 ")), Some("1.1.8.1".into()));
        let number: CellValue = serde_json::from_value(json!(29.125)).unwrap();
        assert_eq!(normalize(&number), Some("29.125".into()));
    }

    #[test]
    fn it_should_follow_text_precedence_for_single_objects() {
        let cell: CellValue =
            serde_json::from_value(json!({"value": "2.3", "content": "ignored"})).unwrap();
        assert_eq!(normalize(&cell), Some("2.3".into()));

        let cell: CellValue = serde_json::from_value(json!({"content": " 4.5 "})).unwrap();
        assert_eq!(normalize(&cell), Some("4.5".into()));
    }

    #[test]
    fn it_should_fall_back_to_the_whole_object() {
        let cell: CellValue = serde_json::from_value(json!({"id": "opt1"})).unwrap();
        assert_eq!(normalize(&cell), Some(r#"{"id":"opt1"}"#.into()));
    }

    #[test]
    fn it_should_use_empty_text_for_fragments_without_payload() {
        let cell: CellValue = serde_json::from_value(json!([
            {"text": "1.1"},
            {"type": "mention", "token": "abc"},
            {"value": ".9"}
        ]))
        .unwrap();
        assert_eq!(normalize(&cell), Some("1.1.9".into()));
    }

    #[test]
    fn it_should_flag_malformed_point_ids_without_rejecting_them() {
        assert!(is_well_formed("1.1.8.1"));
        assert!(!is_well_formed("pump-1"));
        assert_eq!(normalize(&CellValue::text("pump-1")), Some("pump-1".into()));
    }
}
