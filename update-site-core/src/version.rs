//! Version number parsing and ordering
//!
//! Versions are compared item by item. Numeric items compare numerically,
//! qualifiers by a fixed maturity ranking. Before comparing, zeros closing a
//! run of numbers are dropped along with trailing release qualifiers, so
//! `1.0`, `1.0.0`, `1.0.0.0` and `1-final` are the same version and
//! `1.0-sp` sorts the same way against all of them.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unparseable version '{raw}': {reason}")]
pub struct VersionError {
    pub raw: String,
    pub reason: &'static str,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Item {
    Number(u64),
    Qualifier(String),
}

/// Rank of the implicit qualifier of a plain release
const RELEASE_RANK: u8 = 5;

/// Spelling used for comparison; plain-release qualifiers become empty
fn canonical_qualifier(qualifier: &str) -> &str {
    match qualifier {
        "a" => "alpha",
        "b" => "beta",
        "m" => "milestone",
        "cr" => "rc",
        "ga" | "final" | "release" => "",
        other => other,
    }
}

fn qualifier_rank(qualifier: &str) -> u8 {
    match qualifier {
        "alpha" | "a" => 0,
        "beta" | "b" => 1,
        "milestone" | "m" => 2,
        "rc" | "cr" => 3,
        "snapshot" => 4,
        "" | "ga" | "final" | "release" => RELEASE_RANK,
        "sp" => 6,
        _ => 7,
    }
}

fn compare_items(left: Option<&Item>, right: Option<&Item>) -> Ordering {
    match (left, right) {
        (None, None) => Ordering::Equal,
        (Some(Item::Number(a)), None) => a.cmp(&0),
        (None, Some(Item::Number(b))) => 0.cmp(b),
        (Some(Item::Qualifier(a)), None) => qualifier_rank(a).cmp(&RELEASE_RANK),
        (None, Some(Item::Qualifier(b))) => RELEASE_RANK.cmp(&qualifier_rank(b)),
        (Some(Item::Number(_)), Some(Item::Qualifier(_))) => Ordering::Greater,
        (Some(Item::Qualifier(_)), Some(Item::Number(_))) => Ordering::Less,
        (Some(Item::Number(a)), Some(Item::Number(b))) => a.cmp(b),
        (Some(Item::Qualifier(a)), Some(Item::Qualifier(b))) => qualifier_rank(a)
            .cmp(&qualifier_rank(b))
            .then_with(|| a.cmp(b)),
    }
}

/// Comparison key of parsed items
fn normalize(items: &[Item]) -> Vec<Item> {
    let mut key: Vec<Item> = Vec::with_capacity(items.len());
    for item in items {
        match item {
            Item::Qualifier(q) => {
                while key.last() == Some(&Item::Number(0)) {
                    key.pop();
                }
                key.push(Item::Qualifier(canonical_qualifier(q).to_string()));
            }
            Item::Number(n) => key.push(Item::Number(*n)),
        }
    }
    while matches!(key.last(), Some(Item::Number(0)))
        || matches!(key.last(), Some(Item::Qualifier(q)) if q.is_empty())
    {
        key.pop();
    }
    key
}

/// A parsed version number that remembers the string it came from
///
/// Ordering and equality use only the parsed items; `raw` is carried along
/// so callers can tell cosmetically different spellings apart.
#[derive(Debug, Clone)]
pub struct VersionNumber {
    raw: String,
    items: Vec<Item>,
    key: Vec<Item>,
}

impl VersionNumber {
    pub fn parse(raw: &str) -> Result<Self, VersionError> {
        let error = |reason| VersionError {
            raw: raw.to_string(),
            reason,
        };

        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(error("empty version"));
        }
        if !trimmed.starts_with(|c: char| c.is_ascii_digit()) {
            return Err(error("version must start with a digit"));
        }
        if trimmed
            .chars()
            .any(|c| !(c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_' | '+')))
        {
            return Err(error("illegal character"));
        }

        let mut items = Vec::new();
        for segment in trimmed.split(['.', '-', '_', '+']) {
            if segment.is_empty() {
                continue;
            }
            let mut current = String::new();
            let mut current_is_digit = false;
            for c in segment.chars() {
                let is_digit = c.is_ascii_digit();
                if !current.is_empty() && is_digit != current_is_digit {
                    items.push(Self::item(&current, current_is_digit, raw)?);
                    current.clear();
                }
                current_is_digit = is_digit;
                current.push(c);
            }
            if !current.is_empty() {
                items.push(Self::item(&current, current_is_digit, raw)?);
            }
        }

        Ok(Self {
            raw: trimmed.to_string(),
            key: normalize(&items),
            items,
        })
    }

    fn item(token: &str, numeric: bool, raw: &str) -> Result<Item, VersionError> {
        if numeric {
            token.parse::<u64>().map(Item::Number).map_err(|_| VersionError {
                raw: raw.to_string(),
                reason: "numeric component out of range",
            })
        } else {
            Ok(Item::Qualifier(token.to_ascii_lowercase()))
        }
    }

    /// The string this version was parsed from
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Leading numeric components, up to the first qualifier
    pub fn numeric_components(&self) -> Vec<u64> {
        self.items
            .iter()
            .map_while(|item| match item {
                Item::Number(n) => Some(*n),
                Item::Qualifier(_) => None,
            })
            .collect()
    }

    /// Whether the version is exactly `major.minor.patch` with no qualifier
    pub fn is_stable(&self) -> bool {
        self.items.len() == 3 && self.numeric_components().len() == 3
    }
}

impl PartialEq for VersionNumber {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for VersionNumber {}

impl PartialOrd for VersionNumber {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for VersionNumber {
    fn cmp(&self, other: &Self) -> Ordering {
        let len = self.key.len().max(other.key.len());
        (0..len)
            .map(|i| compare_items(self.key.get(i), other.key.get(i)))
            .find(|ordering| *ordering != Ordering::Equal)
            .unwrap_or(Ordering::Equal)
    }
}

impl FromStr for VersionNumber {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for VersionNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl serde::Serialize for VersionNumber {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.raw)
    }
}

impl<'de> serde::Deserialize<'de> for VersionNumber {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        VersionNumber::parse(&raw).map_err(serde::de::Error::custom)
    }
}
