//! Normalization of place names before comparison.
//!
//! The same function is applied to survey names and gazetteer names. `NormalizedName` can only be
//! built through [`normalize`], so the matcher never sees a name that was normalized twice in two
//! different ways or not at all.

use std::fmt::Display;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

/// Characters treated as word separators in reported names.
const SEPARATORS: [char; 3] = ['/', '-', '_'];

/// One or more trailing `CENTRE` tokens, as in `AMBOSITRA CENTRE`.
static CENTRE_SUFFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:\s+CENTRE)+$").expect("valid regex"));

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct NormalizedName(String);

impl NormalizedName {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Length in characters, the denominator of the relative distance.
    pub fn char_len(&self) -> usize {
        self.0.chars().count()
    }
}

impl Display for NormalizedName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for NormalizedName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Uppercase, turn separators into spaces, collapse whitespace and drop a trailing ` CENTRE`.
///
/// Uppercasing comes first so that `centre` in any case is stripped.
pub fn normalize(raw: &str) -> NormalizedName {
    let upper = raw.trim().to_uppercase();
    let spaced: String = upper
        .chars()
        .map(|c| if SEPARATORS.contains(&c) { ' ' } else { c })
        .collect();
    let collapsed = spaced.split_whitespace().collect::<Vec<_>>().join(" ");
    NormalizedName(CENTRE_SUFFIX.replace(&collapsed, "").trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn separators_should_become_spaces() {
        assert_eq!(normalize("FERAMANGA-AVARATRA").as_str(), "FERAMANGA AVARATRA");
        assert_eq!(normalize("ambohimahasoa/ivoamba").as_str(), "AMBOHIMAHASOA IVOAMBA");
        assert_eq!(normalize("  Anjoma__Itsara  ").as_str(), "ANJOMA ITSARA");
    }

    #[test]
    fn trailing_centre_should_be_stripped() {
        assert_eq!(normalize("Ambositra Centre").as_str(), "AMBOSITRA");
        assert_eq!(normalize("ambositra centre").as_str(), "AMBOSITRA");
        assert_eq!(normalize("AMBOSITRA/CENTRE").as_str(), "AMBOSITRA");
        assert_eq!(normalize("AMBOSITRA CENTRE CENTRE").as_str(), "AMBOSITRA");
        // Only a trailing token is stripped
        assert_eq!(normalize("CENTRE AMBOSITRA").as_str(), "CENTRE AMBOSITRA");
        assert_eq!(normalize("AMBOSITRACENTRE").as_str(), "AMBOSITRACENTRE");
        assert_eq!(normalize("CENTRE").as_str(), "CENTRE");
    }

    #[test]
    fn normalizing_twice_should_change_nothing() {
        for raw in [
            "FERAMANGA-AVARATRA",
            "ambositra centre",
            "  a / b - c _ centre ",
            "Ambohimahasoa",
            "",
            "CENTRE",
            "Île Sainte-Marie",
        ] {
            let once = normalize(raw);
            let twice = normalize(once.as_str());
            assert_eq!(once, twice, "normalization of {raw:?} should be idempotent");
        }
    }

    #[test]
    fn blank_names_should_normalize_to_empty() {
        assert!(normalize("   ").is_empty());
        assert!(normalize("/-_").is_empty());
        assert_eq!(normalize("Île").char_len(), 3);
    }
}
