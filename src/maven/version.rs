use std::cmp::Ordering;
use std::fmt::{Display, Formatter};
use std::hash::{Hash, Hasher};

use crate::maven::coordinates::ValueError;

/// A version string as it appears in a Maven repository, ordered the way Maven orders release
///  versions: numeric segments compare numerically, well-known qualifiers (alpha, beta, milestone,
///  rc, snapshot) sort before the plain release, anything else sorts after it.
///
/// Equality is plain string equality. Versions that Maven considers equivalent ("1.0" and "1.0.0")
///  are distinct values, ordered by their raw text as a tie-break.
#[derive(Debug, Clone)]
pub struct ArtifactVersion {
    value: String,
    items: Vec<Item>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Item {
    /// decimal digits without leading zeros, so that arbitrarily long numbers compare correctly
    Int(String),
    Qualifier(String),
}

impl ArtifactVersion {
    pub fn new(value: impl Into<String>) -> Result<ArtifactVersion, ValueError> {
        let value = value.into();
        if value.trim().is_empty() {
            return Err(ValueError::Blank("version"));
        }
        if value.contains('/') || value.chars().any(char::is_whitespace) {
            return Err(ValueError::InvalidVersion(value));
        }

        let items = tokenize(&value);
        if items.is_empty() {
            return Err(ValueError::InvalidVersion(value));
        }
        Ok(ArtifactVersion { value, items })
    }

    /// Accepts a directory name as a release version only if it starts with a numeric segment, so
    ///  that directories like `docs` or `sources` are not mistaken for versions.
    pub fn parse_directory_name(name: &str) -> Option<ArtifactVersion> {
        let name = name.trim_end_matches('/');
        if !name.starts_with(|c: char| c.is_ascii_digit()) {
            return None;
        }
        ArtifactVersion::new(name).ok()
    }

    pub fn as_str(&self) -> &str {
        &self.value
    }

    pub fn is_snapshot(&self) -> bool {
        self.value.ends_with("-SNAPSHOT")
    }
}

impl PartialEq for ArtifactVersion {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}
impl Eq for ArtifactVersion {}

impl Hash for ArtifactVersion {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.value.hash(state);
    }
}

impl PartialOrd for ArtifactVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for ArtifactVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        compare_items(&self.items, &other.items)
            .then_with(|| self.value.cmp(&other.value))
    }
}

impl Display for ArtifactVersion {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.value)
    }
}

fn tokenize(value: &str) -> Vec<Item> {
    let lower = value.to_lowercase();

    let mut raw: Vec<String> = vec![];
    let mut current = String::new();
    let mut current_is_digit = false;
    for c in lower.chars() {
        if c == '.' || c == '-' || c == '_' {
            if !current.is_empty() {
                raw.push(std::mem::take(&mut current));
            }
            continue;
        }
        let is_digit = c.is_ascii_digit();
        if !current.is_empty() && is_digit != current_is_digit {
            raw.push(std::mem::take(&mut current));
        }
        current_is_digit = is_digit;
        current.push(c);
    }
    if !current.is_empty() {
        raw.push(current);
    }

    let mut items = Vec::with_capacity(raw.len());
    for (idx, token) in raw.iter().enumerate() {
        if token.starts_with(|c: char| c.is_ascii_digit()) {
            let trimmed = token.trim_start_matches('0');
            items.push(Item::Int(if trimmed.is_empty() { "0".to_string() } else { trimmed.to_string() }));
        }
        else {
            // "a1", "b2", "m3" are shorthand for alpha / beta / milestone
            let followed_by_number = raw.get(idx + 1)
                .map(|next| next.starts_with(|c: char| c.is_ascii_digit()))
                .unwrap_or(false);
            let qualifier = match (token.as_str(), followed_by_number) {
                ("a", true) => "alpha",
                ("b", true) => "beta",
                ("m", true) => "milestone",
                ("cr", _) => "rc",
                ("ga", _) | ("final", _) | ("release", _) => "",
                (other, _) => other,
            };
            items.push(Item::Qualifier(qualifier.to_string()));
        }
    }

    // trailing zeros and release markers carry no meaning: "1.0" == "1" == "1-final"
    while items.len() > 1 {
        let redundant = match items.last() {
            Some(Item::Int(n)) => n == "0",
            Some(Item::Qualifier(q)) => q.is_empty(),
            None => false,
        };
        if !redundant {
            break;
        }
        items.pop();
    }
    items
}

const QUALIFIER_ORDER: [&str; 7] = ["alpha", "beta", "milestone", "rc", "snapshot", "", "sp"];

fn qualifier_rank(qualifier: &str) -> usize {
    QUALIFIER_ORDER.iter()
        .position(|q| *q == qualifier)
        .unwrap_or(QUALIFIER_ORDER.len())
}

fn compare_qualifiers(a: &str, b: &str) -> Ordering {
    qualifier_rank(a).cmp(&qualifier_rank(b))
        .then_with(|| a.cmp(b))
}

fn compare_ints(a: &str, b: &str) -> Ordering {
    a.len().cmp(&b.len())
        .then_with(|| a.cmp(b))
}

/// compares an item against a missing item at the same position
fn compare_to_absent(item: &Item) -> Ordering {
    match item {
        Item::Int(n) => if n == "0" { Ordering::Equal } else { Ordering::Greater },
        Item::Qualifier(q) => compare_qualifiers(q, ""),
    }
}

fn compare_items(a: &[Item], b: &[Item]) -> Ordering {
    let len = a.len().max(b.len());
    for idx in 0..len {
        let ordering = match (a.get(idx), b.get(idx)) {
            (Some(x), None) => compare_to_absent(x),
            (None, Some(y)) => compare_to_absent(y).reverse(),
            (Some(Item::Int(x)), Some(Item::Int(y))) => compare_ints(x, y),
            (Some(Item::Qualifier(x)), Some(Item::Qualifier(y))) => compare_qualifiers(x, y),
            (Some(Item::Int(_)), Some(Item::Qualifier(_))) => Ordering::Greater,
            (Some(Item::Qualifier(_)), Some(Item::Int(_))) => Ordering::Less,
            (None, None) => Ordering::Equal,
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}
