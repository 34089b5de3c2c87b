//! Synthetic movie dataset
//!
//! Generates documents shaped like the `sample_mflix.movies` collection so
//! the benchmark pipelines have realistic fields to project, average and
//! sort. Output is fully determined by the seed.

use rand::{rngs::SmallRng, Rng, SeedableRng};
use serde_json::{json, Map, Value};

use crate::store::Document;

const GENRES: &[&str] = &[
    "Drama", "Comedy", "Action", "Romance", "Thriller", "Crime", "Documentary", "Horror",
];

const TITLE_WORDS: &[&str] = &[
    "Silent", "River", "Night", "Golden", "Last", "City", "Storm", "Garden", "Echo", "Winter",
    "Paper", "Moon", "Iron", "Hidden", "Summer", "Road",
];

/// Share of documents without an IMDb rating
const MISSING_IMDB_RATIO: f64 = 0.05;
/// Share of documents without a viewer rating
const MISSING_TOMATOES_RATIO: f64 = 0.25;

/// Generate `count` movie documents from `seed`
pub fn synthetic_movies(count: usize, seed: u64) -> Vec<Document> {
    let mut rng = SmallRng::seed_from_u64(seed);
    (0..count).map(|i| synthetic_movie(&mut rng, i)).collect()
}

fn synthetic_movie(rng: &mut SmallRng, index: usize) -> Document {
    let first = TITLE_WORDS[rng.gen_range(0..TITLE_WORDS.len())];
    let second = TITLE_WORDS[rng.gen_range(0..TITLE_WORDS.len())];
    let genre_count = rng.gen_range(1..=3);
    let genres: Vec<&str> = (0..genre_count)
        .map(|_| GENRES[rng.gen_range(0..GENRES.len())])
        .collect();

    let mut movie = Map::new();
    movie.insert("_id".to_string(), json!(index as u64 + 1));
    movie.insert(
        "title".to_string(),
        json!(format!("The {} {} {}", first, second, index)),
    );
    movie.insert("year".to_string(), json!(rng.gen_range(1920..=2016)));
    movie.insert("genres".to_string(), json!(genres));
    movie.insert("runtime".to_string(), json!(rng.gen_range(60..=210)));

    if !rng.gen_bool(MISSING_IMDB_RATIO) {
        movie.insert(
            "imdb".to_string(),
            json!({
                "rating": round_one(rng.gen_range(1.0..=10.0)),
                "votes": rng.gen_range(5..=2_000_000),
            }),
        );
    }

    if !rng.gen_bool(MISSING_TOMATOES_RATIO) {
        movie.insert(
            "tomatoes".to_string(),
            json!({
                "viewer": {
                    "rating": round_one(rng.gen_range(0.0..=5.0)),
                    "numReviews": rng.gen_range(0..=500_000),
                }
            }),
        );
    }

    Value::Object(movie)
}

fn round_one(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
