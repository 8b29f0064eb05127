use super::*;

fn q(pairs: &[(&str, &[&str])]) -> HashMap<String, Vec<String>> {
    pairs
        .iter()
        .map(|(k, vs)| (k.to_string(), vs.iter().map(|v| v.to_string()).collect()))
        .collect()
}

#[test]
fn recognized_names_are_case_insensitive() {
    let p = FilterParams::build(&q(&[
        ("FilterType", &["ZIP_ENTRY"]),
        ("MAXDEPTH", &["3"]),
        ("useNaturalSort", &["TRUE"]),
        ("noSize", &["true"]),
        ("alwaysarchive", &["yes"]),
    ]))
    .unwrap();
    assert_eq!(p.filter_type(), Some("ZIP_ENTRY"));
    assert_eq!(p.max_depth(), 3);
    assert!(p.natural_sort());
    assert!(p.estimate_size_disabled());
    // anything other than "true" is false, never an error
    assert!(!p.always_archive());
}

#[test]
fn absent_filter_type_and_defaults() {
    let p = FilterParams::build(&HashMap::new()).unwrap();
    assert_eq!(p.filter_type(), None);
    assert_eq!(p.max_depth(), DEFAULT_MAX_DEPTH);
    assert_eq!(p.start_entry_index(), None);
    assert_eq!(p.entries_count(), None);
    assert!(p.selected_entries().is_empty());
}

#[test]
fn scalar_takes_first_non_blank_value() {
    let p = FilterParams::build(&q(&[("filterType", &["", "  ", "TIFF_ROI_PIXELS", "ZIP_ENTRY"])])).unwrap();
    assert_eq!(p.filter_type(), Some("TIFF_ROI_PIXELS"));
}

#[test]
fn selected_entries_collects_all_values() {
    let p = FilterParams::build(&q(&[("selectedEntries", &["a.txt", "b.txt", ""])])).unwrap();
    let got: Vec<&str> = p.selected_entries().iter().map(|s| s.as_str()).collect();
    assert_eq!(got, vec!["a.txt", "b.txt"]);
}

#[test]
fn malformed_max_depth_falls_back_silently() {
    let p = FilterParams::build(&q(&[("maxDepth", &["deep"])])).unwrap();
    assert_eq!(p.max_depth(), 1);
    let p = FilterParams::build(&q(&[("maxDepth", &["", "-1"])])).unwrap();
    assert_eq!(p.max_depth(), -1);
}

#[test]
fn malformed_pagination_is_rejected() {
    let err = FilterParams::build(&q(&[("startEntryIndex", &["abc"])])).unwrap_err();
    match err {
        ContentError::InvalidParameter { name, value, .. } => {
            assert_eq!(name, "startEntryIndex");
            assert_eq!(value, "abc");
        }
        other => panic!("unexpected error {other:?}"),
    }
    assert!(FilterParams::build(&q(&[("entriesCount", &["1.5"])])).is_err());
    // blank means absent
    let p = FilterParams::build(&q(&[("startEntryIndex", &["  "]), ("entriesCount", &[" 20 "])])).unwrap();
    assert_eq!(p.start_entry_index(), None);
    assert_eq!(p.entries_count(), Some(20));
}

#[test]
fn negative_pagination_is_clamped() {
    let p = FilterParams::build(&q(&[("startEntryIndex", &["-1"]), ("entriesCount", &["-5"])])).unwrap();
    assert_eq!(p.start_entry_index(), Some(0));
    assert_eq!(p.entries_count(), None);
    let p = FilterParams::build(&q(&[("startEntryIndex", &["99999999999"]), ("entriesCount", &["0"])])).unwrap();
    assert_eq!(p.start_entry_index(), Some(u32::MAX));
    assert_eq!(p.entries_count(), Some(0));
}

#[test]
fn invalid_entry_pattern_is_rejected() {
    assert!(FilterParams::build(&q(&[("entryPattern", &["(unclosed"])])).is_err());
}

#[test]
fn unrecognized_keys_keep_first_value() {
    let p = FilterParams::build(&q(&[("xCenter", &["10", "20"]), ("entryName", &["data/a.bin"]), ("empty", &[])])).unwrap();
    assert_eq!(p.get_int("xCenter", 0).unwrap(), 10);
    assert_eq!(p.get_int("XCENTER", 0).unwrap(), 10);
    assert_eq!(p.get_str("entryName", ""), "data/a.bin");
    assert!(!p.extra().contains_key("empty"));
}

#[test]
fn numeric_extension_accessor_fails_fast() {
    let p = FilterParams::from_pairs([("dimX", "wide")]).unwrap();
    assert!(p.get_int("dimX", -1).is_err());
    assert_eq!(p.get_int("dimY", -1).unwrap(), -1);
}

#[test]
fn match_entry_prefers_selection_over_pattern() {
    let p = FilterParams::from_pairs([("selectedEntries", "b.txt"), ("entryPattern", "^a")]).unwrap();
    assert!(p.match_entry("dir/b.txt"));
    assert!(!p.match_entry("a.txt"));

    let p = FilterParams::from_pairs([("entryPattern", r"\.tif$")]).unwrap();
    assert!(p.match_entry("stack/z01.tif"));
    assert!(!p.match_entry("stack/z01.png"));

    assert!(FilterParams::default().match_entry("anything"));
}

#[test]
fn depth_check_honors_unlimited() {
    let p = FilterParams::from_pairs([("maxDepth", "2")]).unwrap();
    assert!(p.check_depth(1));
    assert!(!p.check_depth(2));
    let p = FilterParams::from_pairs([("maxDepth", "-1")]).unwrap();
    assert!(p.check_depth(1000));
}
