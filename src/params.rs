//! Typed view over raw request query parameters.
//!
//! Recognized names are matched case-insensitively; every other key with a value
//! is kept (lower-cased) in an extension map for filter-specific lookups such as
//! region coordinates or archive entry names.

use std::collections::{BTreeSet, HashMap};

use regex::Regex;

use crate::error::{ContentError, ContentResult};

pub const DEFAULT_MAX_DEPTH: i32 = 1;

const FILTER_TYPE: &str = "filtertype";
const SELECTED_ENTRIES: &str = "selectedentries";
const MAX_DEPTH: &str = "maxdepth";
const NATURAL_SORT: &str = "usenaturalsort";
const NO_SIZE: &str = "nosize";
const ALWAYS_ARCHIVE: &str = "alwaysarchive";
const ENTRY_PATTERN: &str = "entrypattern";
const START_ENTRY_INDEX: &str = "startentryindex";
const ENTRIES_COUNT: &str = "entriescount";

#[derive(Debug, Clone)]
pub struct FilterParams {
    filter_type: Option<String>,
    selected_entries: BTreeSet<String>,
    max_depth: i32,
    natural_sort: bool,
    estimate_size_disabled: bool,
    always_archive: bool,
    entry_name_pattern: Option<Regex>,
    start_entry_index: Option<u32>,
    entries_count: Option<u32>,
    extra: HashMap<String, String>,
}

impl Default for FilterParams {
    fn default() -> Self {
        Self {
            filter_type: None,
            selected_entries: BTreeSet::new(),
            max_depth: DEFAULT_MAX_DEPTH,
            natural_sort: false,
            estimate_size_disabled: false,
            always_archive: false,
            entry_name_pattern: None,
            start_entry_index: None,
            entries_count: None,
            extra: HashMap::new(),
        }
    }
}

fn first_non_blank(values: &[String]) -> Option<&str> {
    values.iter().map(|v| v.trim()).find(|v| !v.is_empty())
}

fn parse_flag(values: &[String]) -> bool {
    first_non_blank(values).map(|v| v.eq_ignore_ascii_case("true")).unwrap_or(false)
}

fn parse_count(name: &str, values: &[String]) -> ContentResult<Option<i64>> {
    match first_non_blank(values) {
        None => Ok(None),
        Some(v) => v.parse::<i64>().map(Some).map_err(|_| ContentError::invalid_number(name, v)),
    }
}

impl FilterParams {
    /// Build the bag from query parameters as delivered by the request layer.
    pub fn build(query: &HashMap<String, Vec<String>>) -> ContentResult<Self> {
        let mut p = FilterParams::default();
        for (key, values) in query {
            if key.trim().is_empty() || values.is_empty() { continue; }
            let lk = key.trim().to_ascii_lowercase();
            match lk.as_str() {
                FILTER_TYPE => p.filter_type = first_non_blank(values).map(|s| s.to_string()),
                SELECTED_ENTRIES => {
                    p.selected_entries.extend(
                        values.iter().map(|v| v.trim()).filter(|v| !v.is_empty()).map(|v| v.to_string()),
                    );
                }
                // Unparseable depth falls back to the default rather than failing the request.
                MAX_DEPTH => {
                    p.max_depth = first_non_blank(values)
                        .and_then(|v| v.parse::<i32>().ok())
                        .unwrap_or(DEFAULT_MAX_DEPTH);
                }
                NATURAL_SORT => p.natural_sort = parse_flag(values),
                NO_SIZE => p.estimate_size_disabled = parse_flag(values),
                ALWAYS_ARCHIVE => p.always_archive = parse_flag(values),
                ENTRY_PATTERN => {
                    if let Some(pat) = first_non_blank(values) {
                        let re = Regex::new(pat).map_err(|e| ContentError::InvalidParameter {
                            name: "entryPattern".to_string(),
                            value: pat.to_string(),
                            reason: e.to_string(),
                        })?;
                        p.entry_name_pattern = Some(re);
                    }
                }
                // Negative offsets start at the first entry; a negative count means no limit.
                START_ENTRY_INDEX => {
                    p.start_entry_index =
                        parse_count("startEntryIndex", values)?.map(|v| v.clamp(0, i64::from(u32::MAX)) as u32);
                }
                ENTRIES_COUNT => {
                    p.entries_count = parse_count("entriesCount", values)?
                        .and_then(|v| u32::try_from(v.min(i64::from(u32::MAX))).ok());
                }
                _ => {
                    p.extra.insert(lk, values[0].clone());
                }
            }
        }
        Ok(p)
    }

    /// Build from `key=value` pairs; repeated keys accumulate values in order.
    pub fn from_pairs<K, V, I>(pairs: I) -> ContentResult<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut query: HashMap<String, Vec<String>> = HashMap::new();
        for (k, v) in pairs {
            query.entry(k.into()).or_default().push(v.into());
        }
        Self::build(&query)
    }

    pub fn filter_type(&self) -> Option<&str> { self.filter_type.as_deref() }
    pub fn selected_entries(&self) -> &BTreeSet<String> { &self.selected_entries }
    pub fn max_depth(&self) -> i32 { self.max_depth }
    pub fn natural_sort(&self) -> bool { self.natural_sort }
    pub fn estimate_size_disabled(&self) -> bool { self.estimate_size_disabled }
    pub fn always_archive(&self) -> bool { self.always_archive }
    pub fn entry_name_pattern(&self) -> Option<&str> { self.entry_name_pattern.as_ref().map(|r| r.as_str()) }
    pub fn start_entry_index(&self) -> Option<u32> { self.start_entry_index }
    pub fn entries_count(&self) -> Option<u32> { self.entries_count }
    pub fn extra(&self) -> &HashMap<String, String> { &self.extra }

    /// Filter-specific string value; blank counts as absent.
    pub fn get_str<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        match self.extra.get(&key.to_ascii_lowercase()) {
            Some(v) if !v.trim().is_empty() => v.as_str(),
            _ => default,
        }
    }

    /// Filter-specific integer value. Present but non-numeric values are rejected.
    pub fn get_int(&self, key: &str, default: i64) -> ContentResult<i64> {
        let v = self.get_str(key, "").trim();
        if v.is_empty() {
            return Ok(default);
        }
        v.parse::<i64>().map_err(|_| ContentError::invalid_number(key, v))
    }

    /// True while `current_depth` is still inside the requested traversal depth.
    /// A negative max depth means unlimited.
    pub fn check_depth(&self, current_depth: i32) -> bool {
        self.max_depth < 0 || current_depth < self.max_depth
    }

    /// Selection predicate for listed entries: the allow-list is matched on the file
    /// name, the pattern anywhere in the full entry path.
    pub fn match_entry(&self, entry_path: &str) -> bool {
        let file_name = entry_path.rsplit('/').next().unwrap_or(entry_path);
        if !self.selected_entries.is_empty() {
            self.selected_entries.contains(file_name)
        } else if let Some(re) = &self.entry_name_pattern {
            re.is_match(entry_path)
        } else {
            true
        }
    }

    /// Copy with `alwaysArchive` forced on or off.
    pub fn with_always_archive(&self, always_archive: bool) -> Self {
        let mut p = self.clone();
        p.always_archive = always_archive;
        p
    }
}

#[cfg(test)]
mod params_tests;
