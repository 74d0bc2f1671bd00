/// Free-text preference extraction
///
/// Matching is closed-world: only genres, directors and actors present in the
/// fitted schema are ever recognized. Every match is appended, so the same
/// genre mentioned in two turns appears twice in the state.
use crate::{
    models::PreferenceState,
    services::encoder::{FeatureKind, FeatureSchema},
};

const RATING_TRIGGER: &str = "vote average";
const TITLE_TRIGGER: &str = "movie";

/// Vocabulary entry with its lowercased form precomputed
#[derive(Debug, Clone)]
struct Term {
    name: String,
    folded: String,
}

impl Term {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            folded: name.to_lowercase(),
        }
    }
}

/// Parses chat messages into preference updates
#[derive(Debug, Clone)]
pub struct PreferenceExtractor {
    genres: Vec<Term>,
    directors: Vec<Term>,
    actors: Vec<Term>,
}

impl PreferenceExtractor {
    /// Builds an extractor over the vocabularies of a fitted schema
    pub fn from_schema(schema: &FeatureSchema) -> Self {
        let terms = |kind: FeatureKind| -> Vec<Term> {
            schema
                .vocabulary(kind)
                .filter(|name| !name.is_empty())
                .map(Term::new)
                .collect()
        };

        Self {
            genres: terms(FeatureKind::Genre),
            directors: terms(FeatureKind::Director),
            actors: terms(FeatureKind::Cast),
        }
    }

    /// Returns `state` updated with everything recognized in `message`
    pub fn extract(&self, message: &str, mut state: PreferenceState) -> PreferenceState {
        let folded = message.to_lowercase();

        state.genres.extend(Self::matches(&self.genres, &folded));
        state.directors.extend(Self::matches(&self.directors, &folded));
        state.actors.extend(Self::matches(&self.actors, &folded));

        if let Some(raw) = text_after_last(message, RATING_TRIGGER) {
            match parse_rating(raw) {
                Some(threshold) => state.rating_threshold = threshold,
                None => tracing::info!(
                    input = %raw,
                    "Invalid vote average provided, keeping previous threshold"
                ),
            }
        }

        if let Some(title) = text_after_last(message, TITLE_TRIGGER) {
            state.movie = Some(title.to_string());
        }

        state
    }

    fn matches<'a>(terms: &'a [Term], folded: &'a str) -> impl Iterator<Item = String> + 'a {
        terms
            .iter()
            .filter(move |term| folded.contains(term.folded.as_str()))
            .map(|term| term.name.clone())
    }
}

/// Trimmed text following the last occurrence of `trigger`
///
/// The trigger is detected in any case, but the text is cut at its last
/// exact-case occurrence; a message naming the trigger only in another case
/// yields the whole message.
fn text_after_last<'a>(message: &'a str, trigger: &str) -> Option<&'a str> {
    if !message.to_lowercase().contains(trigger) {
        return None;
    }
    let start = message.rfind(trigger).map_or(0, |at| at + trigger.len());
    Some(message[start..].trim())
}

/// Parses a rating threshold, rescaling the 1-10 range to 0-1
///
/// Values outside [1, 10] are returned unchanged: 0.7 stays 0.7 and 11 stays 11.
/// `nan` and `inf` are rejected.
fn parse_rating(raw: &str) -> Option<f64> {
    let value = raw.parse::<f64>().ok().filter(|value| value.is_finite())?;
    if (1.0..=10.0).contains(&value) {
        Some(value / 10.0)
    } else {
        Some(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{MovieRecord, DEFAULT_RATING_THRESHOLD};

    fn extractor() -> PreferenceExtractor {
        let movies = vec![
            MovieRecord::new(1, "The Shining")
                .with_genres(&["Horror", "Thriller"])
                .with_cast(&["Jack Nicholson", "Shelley Duvall"])
                .with_director("Stanley Kubrick"),
            MovieRecord::new(2, "Die Hard")
                .with_genres(&["Action"])
                .with_cast(&["Bruce Willis"])
                .with_director("John McTiernan"),
            MovieRecord::new(3, "Amélie")
                .with_genres(&["Comedy", "Romance"])
                .with_cast(&["Audrey Tautou"]),
        ];
        PreferenceExtractor::from_schema(&FeatureSchema::fit(&movies))
    }

    #[test]
    fn test_genres_accumulate_across_turns() {
        let extractor = extractor();
        let state = extractor.extract("I like Action movies", PreferenceState::new());
        let state = extractor.extract("I like Horror movies", state);
        assert_eq!(state.genres, vec!["Action".to_string(), "Horror".to_string()]);
    }

    #[test]
    fn test_repeated_mentions_are_not_deduplicated() {
        let extractor = extractor();
        let state = extractor.extract("horror please", PreferenceState::new());
        let state = extractor.extract("more HORROR", state);
        assert_eq!(state.genres, vec!["Horror".to_string(), "Horror".to_string()]);
    }

    #[test]
    fn test_directors_and_actors_case_insensitive() {
        let extractor = extractor();
        let state = extractor.extract(
            "something by stanley kubrick with JACK NICHOLSON",
            PreferenceState::new(),
        );
        assert_eq!(state.directors, vec!["Stanley Kubrick".to_string()]);
        assert_eq!(state.actors, vec!["Jack Nicholson".to_string()]);
        assert!(state.genres.is_empty());
    }

    #[test]
    fn test_out_of_vocabulary_names_are_ignored() {
        let extractor = extractor();
        let state = extractor.extract("a western with Clint Eastwood", PreferenceState::new());
        assert!(state.has_no_attributes());
    }

    #[test]
    fn test_rating_on_ten_point_scale_is_normalized() {
        let extractor = extractor();
        let state = extractor.extract("vote average 7", PreferenceState::new());
        assert!((state.rating_threshold - 0.7).abs() < 1e-9);
    }

    #[test]
    fn test_rating_below_one_is_kept() {
        let extractor = extractor();
        let state = extractor.extract("vote average 0.7", PreferenceState::new());
        assert_eq!(state.rating_threshold, 0.7);
    }

    #[test]
    fn test_rating_above_ten_is_not_clamped() {
        let extractor = extractor();
        let state = extractor.extract("vote average 11", PreferenceState::new());
        assert_eq!(state.rating_threshold, 11.0);
    }

    #[test]
    fn test_rating_trigger_in_other_case_keeps_threshold() {
        let extractor = extractor();
        let state = extractor.extract("Vote Average 11", PreferenceState::new());
        assert_eq!(state.rating_threshold, DEFAULT_RATING_THRESHOLD);
    }

    #[test]
    fn test_non_finite_rating_keeps_previous_threshold() {
        let extractor = extractor();
        let mut state = PreferenceState::new();
        state.rating_threshold = 0.8;

        let state = extractor.extract("vote average nan", state);
        assert_eq!(state.rating_threshold, 0.8);
        let state = extractor.extract("vote average inf", state);
        assert_eq!(state.rating_threshold, 0.8);
        let state = extractor.extract("vote average -infinity", state);
        assert_eq!(state.rating_threshold, 0.8);

        let json = serde_json::to_string(&state).unwrap();
        let reloaded: PreferenceState = serde_json::from_str(&json).unwrap();
        assert_eq!(reloaded, state);
    }

    #[test]
    fn test_unparseable_rating_keeps_previous_threshold() {
        let extractor = extractor();
        let mut state = PreferenceState::new();
        state.rating_threshold = 0.8;
        let state = extractor.extract("vote average of at least seven", state);
        assert_eq!(state.rating_threshold, 0.8);
    }

    #[test]
    fn test_rating_uses_last_occurrence() {
        let extractor = extractor();
        let state = extractor.extract("vote average 3 no wait vote average 9", PreferenceState::new());
        assert!((state.rating_threshold - 0.9).abs() < 1e-9);
    }

    #[test]
    fn test_title_after_last_movie_mention() {
        let extractor = extractor();
        let state = extractor.extract("recommend something like the movie Die Hard ", PreferenceState::new());
        assert_eq!(state.movie.as_deref(), Some("Die Hard"));
    }

    #[test]
    fn test_title_is_overwritten() {
        let extractor = extractor();
        let state = extractor.extract("movie Die Hard", PreferenceState::new());
        let state = extractor.extract("the movie The Shining", state);
        assert_eq!(state.movie.as_deref(), Some("The Shining"));
    }

    #[test]
    fn test_title_trigger_in_other_case_takes_whole_message() {
        let extractor = extractor();
        let state = extractor.extract("MOVIE The Shining", PreferenceState::new());
        assert_eq!(state.movie.as_deref(), Some("MOVIE The Shining"));
    }

    #[test]
    fn test_plural_movies_still_triggers_title() {
        let extractor = extractor();
        let state = extractor.extract("I like Action movies", PreferenceState::new());
        assert_eq!(state.movie.as_deref(), Some("s"));
    }

    #[test]
    fn test_title_keeps_non_ascii_text() {
        let extractor = extractor();
        let state = extractor.extract("the movie Amélie", PreferenceState::new());
        assert_eq!(state.movie.as_deref(), Some("Amélie"));
        assert!(state.actors.is_empty());
    }

    #[test]
    fn test_message_without_triggers_leaves_state_unchanged() {
        let extractor = extractor();
        let before = PreferenceState::new();
        let after = extractor.extract("hello there", before.clone());
        assert_eq!(before, after);
    }

    #[test]
    fn test_parse_rating_bounds() {
        assert_eq!(parse_rating("1"), Some(0.1));
        assert_eq!(parse_rating("10"), Some(1.0));
        assert_eq!(parse_rating("0.99"), Some(0.99));
        assert_eq!(parse_rating("-3"), Some(-3.0));
        assert_eq!(parse_rating("high"), None);
        assert_eq!(parse_rating("NaN"), None);
        assert_eq!(parse_rating("infinity"), None);
    }
}
