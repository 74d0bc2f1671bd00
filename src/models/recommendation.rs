use serde::{Deserialize, Serialize};

use super::PreferenceState;

/// Outcome of one retrieval request
///
/// The two failure variants are signals, not errors: `NotFound` echoes the
/// requested title back, `InsufficientCandidates` hands back the untouched
/// preference state because the filtered set was too small to query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Recommendation {
    /// Titles in index rank order. Empty when the index could not be reached.
    Titles { titles: Vec<String> },
    /// The requested title is not in the catalog
    NotFound { title: String },
    /// The filtered candidate set had no more rows than requested neighbors
    InsufficientCandidates {
        preferences: PreferenceState,
        candidates: usize,
    },
}

impl Recommendation {
    pub fn titles(titles: Vec<String>) -> Self {
        Recommendation::Titles { titles }
    }

    /// Titles when the retrieval produced at least one, `None` otherwise
    pub fn non_empty_titles(&self) -> Option<&[String]> {
        match self {
            Recommendation::Titles { titles } if !titles.is_empty() => Some(titles),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_titles_serialization() {
        let rec = Recommendation::titles(vec!["Heat".to_string()]);
        let json = serde_json::to_value(&rec).unwrap();
        assert_eq!(json["outcome"], "titles");
        assert_eq!(json["titles"][0], "Heat");
    }

    #[test]
    fn test_not_found_serialization() {
        let rec = Recommendation::NotFound {
            title: "Unknown".to_string(),
        };
        let json = serde_json::to_value(&rec).unwrap();
        assert_eq!(json["outcome"], "not_found");
        assert_eq!(json["title"], "Unknown");
    }

    #[test]
    fn test_insufficient_candidates_round_trip() {
        let rec = Recommendation::InsufficientCandidates {
            preferences: PreferenceState::new(),
            candidates: 2,
        };
        let json = serde_json::to_string(&rec).unwrap();
        let back: Recommendation = serde_json::from_str(&json).unwrap();
        assert_eq!(back, rec);
    }

    #[test]
    fn test_non_empty_titles() {
        assert!(Recommendation::titles(vec![]).non_empty_titles().is_none());
        assert!(Recommendation::NotFound {
            title: "x".to_string()
        }
        .non_empty_titles()
        .is_none());
        assert_eq!(
            Recommendation::titles(vec!["Heat".to_string()])
                .non_empty_titles()
                .unwrap()
                .len(),
            1
        );
    }
}
