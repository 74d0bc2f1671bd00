/// Feature encoding for the movie corpus
///
/// Fitting derives a closed vocabulary from the whole corpus: one dimension per
/// distinct genre, cast member, director and title, plus the normalized rating.
/// The resulting [`FeatureSchema`] is frozen. A movie added later with an actor
/// the schema has never seen has no dimension for that actor, so any corpus
/// change requires a full refit (and re-indexing) rather than an incremental
/// update.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    models::{MovieId, MovieRecord, MovieSummary},
};

/// Which attribute a feature column one-hot encodes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeatureKind {
    Genre,
    Cast,
    Director,
    Title,
    Rating,
}

impl FeatureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FeatureKind::Genre => "genre",
            FeatureKind::Cast => "cast",
            FeatureKind::Director => "director",
            FeatureKind::Title => "title",
            FeatureKind::Rating => "rating",
        }
    }
}

impl std::str::FromStr for FeatureKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "genre" => Ok(FeatureKind::Genre),
            "cast" => Ok(FeatureKind::Cast),
            "director" => Ok(FeatureKind::Director),
            "title" => Ok(FeatureKind::Title),
            "rating" => Ok(FeatureKind::Rating),
            other => Err(AppError::Schema(format!("Unknown feature kind '{}'", other))),
        }
    }
}

/// One dimension of the feature space
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FeatureColumn {
    pub kind: FeatureKind,
    pub name: String,
}

impl FeatureColumn {
    fn new(kind: FeatureKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
        }
    }
}

const RATING_COLUMN: &str = "vote_average";

/// Frozen vocabulary snapshot and dimension ordering
///
/// Columns are grouped by kind (genres, cast, directors, titles) and sorted
/// within each group; the rating is always the last column. `fit_id` versions
/// the snapshot: vectors are only comparable when produced by the same fit.
#[derive(Debug, Clone)]
pub struct FeatureSchema {
    fit_id: Uuid,
    fitted_at: DateTime<Utc>,
    columns: Vec<FeatureColumn>,
    corpus: Vec<MovieId>,
    positions: HashMap<(FeatureKind, String), usize>,
}

impl FeatureSchema {
    /// Fits the vocabulary over the whole corpus
    pub fn fit(movies: &[MovieRecord]) -> Self {
        let mut genres = BTreeSet::new();
        let mut cast = BTreeSet::new();
        let mut directors = BTreeSet::new();
        let mut titles = BTreeSet::new();

        for movie in movies {
            genres.extend(movie.genres.iter().cloned());
            cast.extend(movie.cast.iter().cloned());
            if !movie.director.is_empty() {
                directors.insert(movie.director.clone());
            }
            titles.insert(movie.title.clone());
        }

        let columns = [
            (FeatureKind::Genre, genres),
            (FeatureKind::Cast, cast),
            (FeatureKind::Director, directors),
            (FeatureKind::Title, titles),
        ]
        .into_iter()
        .flat_map(|(kind, names)| names.into_iter().map(move |name| FeatureColumn::new(kind, name)))
        .chain(std::iter::once(FeatureColumn::new(
            FeatureKind::Rating,
            RATING_COLUMN,
        )))
        .collect();

        let schema = Self::assemble(
            Uuid::new_v4(),
            Utc::now(),
            columns,
            movies.iter().map(|movie| movie.id).collect(),
        );

        tracing::info!(
            fit_id = %schema.fit_id,
            movies = movies.len(),
            dimension = schema.dimension(),
            "Fitted feature schema"
        );

        schema
    }

    /// Rebuilds a previously persisted schema
    pub fn from_parts(
        fit_id: Uuid,
        fitted_at: DateTime<Utc>,
        columns: Vec<FeatureColumn>,
        corpus: Vec<MovieId>,
    ) -> AppResult<Self> {
        match columns.last() {
            Some(column) if column.kind == FeatureKind::Rating => {}
            _ => {
                return Err(AppError::Schema(format!(
                    "Schema {} does not end with the rating column",
                    fit_id
                )))
            }
        }

        let schema = Self::assemble(fit_id, fitted_at, columns, corpus);
        if schema.positions.len() != schema.columns.len() {
            return Err(AppError::Schema(format!(
                "Schema {} contains duplicate columns",
                fit_id
            )));
        }

        Ok(schema)
    }

    fn assemble(
        fit_id: Uuid,
        fitted_at: DateTime<Utc>,
        columns: Vec<FeatureColumn>,
        corpus: Vec<MovieId>,
    ) -> Self {
        let positions = columns
            .iter()
            .enumerate()
            .map(|(position, column)| ((column.kind, column.name.clone()), position))
            .collect();

        Self {
            fit_id,
            fitted_at,
            columns,
            corpus,
            positions,
        }
    }

    pub fn fit_id(&self) -> Uuid {
        self.fit_id
    }

    pub fn fitted_at(&self) -> DateTime<Utc> {
        self.fitted_at
    }

    pub fn columns(&self) -> &[FeatureColumn] {
        &self.columns
    }

    /// Movie ids the schema was fitted on, in corpus order
    pub fn corpus(&self) -> &[MovieId] {
        &self.corpus
    }

    pub fn dimension(&self) -> usize {
        self.columns.len()
    }

    pub fn position(&self, kind: FeatureKind, name: &str) -> Option<usize> {
        self.positions.get(&(kind, name.to_string())).copied()
    }

    fn rating_position(&self) -> usize {
        self.columns.len() - 1
    }

    /// Names known for one feature kind, in column order
    pub fn vocabulary(&self, kind: FeatureKind) -> impl Iterator<Item = &str> {
        self.columns
            .iter()
            .filter(move |column| column.kind == kind)
            .map(|column| column.name.as_str())
    }

    /// Projects a movie into this feature space
    ///
    /// Values outside the fitted vocabulary have no dimension and are ignored.
    pub fn encode(&self, movie: &MovieRecord) -> Vec<f32> {
        let mut vector = vec![0.0_f32; self.dimension()];

        let one_hot = movie
            .genres
            .iter()
            .map(|genre| (FeatureKind::Genre, genre))
            .chain(movie.cast.iter().map(|actor| (FeatureKind::Cast, actor)))
            .chain(std::iter::once((FeatureKind::Director, &movie.director)))
            .chain(std::iter::once((FeatureKind::Title, &movie.title)));

        for (kind, name) in one_hot {
            if let Some(position) = self.position(kind, name) {
                vector[position] = 1.0;
            }
        }

        let rating = movie.vote_average / 10.0;
        vector[self.rating_position()] = if rating.is_finite() { rating as f32 } else { 0.0 };

        vector
    }

    /// Fails unless vectors of `dimension` components live in this feature space
    pub fn check_dimension(&self, dimension: usize) -> AppResult<()> {
        if dimension != self.dimension() {
            return Err(AppError::Schema(format!(
                "Vectors have {} dimensions, schema {} expects {}; refit and rebuild the index",
                dimension,
                self.fit_id,
                self.dimension()
            )));
        }
        Ok(())
    }

    /// Fails unless `movies` is exactly the corpus this schema was fitted on
    pub fn check_corpus(&self, movies: &[MovieRecord]) -> AppResult<()> {
        let same = movies.len() == self.corpus.len()
            && movies.iter().zip(&self.corpus).all(|(movie, id)| movie.id == *id);

        if !same {
            return Err(AppError::Schema(format!(
                "Corpus changed since schema {} was fitted ({} movies now, {} at fit time); refit required",
                self.fit_id,
                movies.len(),
                self.corpus.len()
            )));
        }
        Ok(())
    }
}

/// Row of the encoded table: identifying columns plus the feature vector
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedMovie {
    pub id: MovieId,
    pub title: String,
    /// Normalized rating at full precision, used for threshold filtering
    pub vote_average: f64,
    pub features: Vec<f32>,
}

/// The three aligned tables produced by a fit
///
/// `descriptive` keeps display metadata untouched, `encoded` carries the one-hot
/// and rating features, and the vector table is the numeric part of `encoded`.
/// All share the corpus row order.
#[derive(Debug, Clone)]
pub struct MovieTables {
    schema: FeatureSchema,
    descriptive: Vec<MovieSummary>,
    encoded: Vec<EncodedMovie>,
    rows_by_id: HashMap<MovieId, usize>,
}

impl MovieTables {
    /// Fits a new schema on `movies` and encodes them
    pub fn fit(movies: &[MovieRecord]) -> Self {
        let schema = FeatureSchema::fit(movies);
        Self::encode_corpus(schema, movies)
    }

    /// Encodes `movies` against an existing schema fitted on the same corpus
    pub fn with_schema(schema: FeatureSchema, movies: &[MovieRecord]) -> AppResult<Self> {
        schema.check_corpus(movies)?;
        Ok(Self::encode_corpus(schema, movies))
    }

    fn encode_corpus(schema: FeatureSchema, movies: &[MovieRecord]) -> Self {
        let descriptive = movies.iter().map(MovieSummary::from).collect();

        let encoded = movies
            .iter()
            .map(|movie| EncodedMovie {
                id: movie.id,
                title: movie.title.clone(),
                vote_average: movie.vote_average / 10.0,
                features: schema.encode(movie),
            })
            .collect();

        let mut rows_by_id = HashMap::with_capacity(movies.len());
        for (row, movie) in movies.iter().enumerate() {
            rows_by_id.entry(movie.id).or_insert(row);
        }

        Self {
            schema,
            descriptive,
            encoded,
            rows_by_id,
        }
    }

    pub fn schema(&self) -> &FeatureSchema {
        &self.schema
    }

    pub fn descriptive(&self) -> &[MovieSummary] {
        &self.descriptive
    }

    pub fn encoded(&self) -> &[EncodedMovie] {
        &self.encoded
    }

    /// Vector table: numeric feature rows with their ids, in corpus order
    pub fn vectors(&self) -> impl Iterator<Item = (MovieId, &[f32])> {
        self.encoded
            .iter()
            .map(|row| (row.id, row.features.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.encoded.len()
    }

    pub fn is_empty(&self) -> bool {
        self.encoded.is_empty()
    }

    /// First descriptive row carrying exactly `title`
    pub fn row_by_title(&self, title: &str) -> Option<usize> {
        self.descriptive.iter().position(|movie| movie.title == title)
    }

    pub fn title_of(&self, id: MovieId) -> Option<&str> {
        self.rows_by_id
            .get(&id)
            .map(|&row| self.descriptive[row].title.as_str())
    }

    /// True when the one-hot column `(kind, name)` is set for `row`
    ///
    /// Names outside the vocabulary have no column and never match.
    pub fn has_feature(&self, row: &EncodedMovie, kind: FeatureKind, name: &str) -> bool {
        self.schema
            .position(kind, name)
            .map(|position| row.features[position] == 1.0)
            .unwrap_or(false)
    }
}
