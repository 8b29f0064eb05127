use super::*;

fn tree() -> tempfile::TempDir {
    let tmp = tempfile::tempdir().unwrap();
    let root = tmp.path();
    fs::create_dir_all(root.join("stack/sub")).unwrap();
    for name in ["z1.tif", "z2.tif", "z10.tif", "notes.txt"] {
        fs::write(root.join("stack").join(name), name.as_bytes()).unwrap();
    }
    fs::write(root.join("stack/sub/deep.tif"), b"deep").unwrap();
    tmp
}

fn names(nodes: &[ContentNode]) -> Vec<String> {
    nodes.iter().map(|n| n.object_key()).collect()
}

#[test]
fn logical_path_validation() {
    assert_eq!(normalize_logical_path("/a/b/").unwrap(), "a/b");
    assert_eq!(normalize_logical_path("").unwrap(), "");
    assert_eq!(normalize_logical_path("Cafe\u{0301}").unwrap(), "Caf\u{e9}");
    assert!(normalize_logical_path("a//b").is_err());
    assert!(normalize_logical_path("a/../b").is_err());
    assert!(normalize_logical_path("a/./b").is_err());
    assert!(normalize_logical_path("a\0b").is_err());
}

#[test]
fn natural_ordering() {
    let mut v = vec!["z10.tif", "z2.tif", "z1.tif", "a", "z02.tif"];
    v.sort_by(|a, b| natural_cmp(a, b));
    assert_eq!(v, vec!["a", "z1.tif", "z2.tif", "z02.tif", "z10.tif"]);
    assert_eq!(natural_cmp("x", "x"), Ordering::Equal);
}

#[test]
fn file_resolves_to_itself() {
    let tmp = tree();
    let r = FsResolver::new(tmp.path());
    let nodes = r.resolve("stack/z1.tif", &FilterParams::default()).unwrap();
    assert_eq!(names(&nodes), vec!["/stack/z1.tif"]);
    assert_eq!(nodes[0].prefix(), "stack");
    assert_eq!(nodes[0].size(), 6);
    assert!(nodes[0].last_modified().is_some());
}

#[test]
fn missing_path_is_empty() {
    let tmp = tree();
    assert!(FsResolver::new(tmp.path()).resolve("nope/x", &FilterParams::default()).unwrap().is_empty());
}

#[test]
fn directory_listing_respects_depth_and_sort() {
    let tmp = tree();
    let r = FsResolver::new(tmp.path());
    let lexical = r.resolve("stack", &FilterParams::default()).unwrap();
    assert_eq!(names(&lexical), vec!["/stack/notes.txt", "/stack/z1.tif", "/stack/z10.tif", "/stack/z2.tif"]);

    let p = FilterParams::from_pairs([("useNaturalSort", "true"), ("maxDepth", "-1")]).unwrap();
    let natural = r.resolve("stack", &p).unwrap();
    assert_eq!(
        names(&natural),
        vec!["/stack/notes.txt", "/stack/sub/deep.tif", "/stack/z1.tif", "/stack/z2.tif", "/stack/z10.tif"]
    );
    assert_eq!(natural[1].prefix(), "stack/sub");
}

#[test]
fn listing_filters_and_paginates() {
    let tmp = tree();
    let r = FsResolver::new(tmp.path());
    let p = FilterParams::from_pairs([
        ("entryPattern", r"\.tif$"),
        ("useNaturalSort", "true"),
        ("startEntryIndex", "1"),
        ("entriesCount", "1"),
    ])
    .unwrap();
    assert_eq!(names(&r.resolve("stack", &p).unwrap()), vec!["/stack/z2.tif"]);

    let p = FilterParams::from_pairs([("selectedEntries", "z10.tif"), ("selectedEntries", "notes.txt")]).unwrap();
    assert_eq!(names(&r.resolve("/stack/", &p).unwrap()), vec!["/stack/notes.txt", "/stack/z10.tif"]);
}

#[test]
fn zero_depth_lists_nothing() {
    let tmp = tree();
    let p = FilterParams::from_pairs([("maxDepth", "0")]).unwrap();
    assert!(FsResolver::new(tmp.path()).resolve("stack", &p).unwrap().is_empty());
}
