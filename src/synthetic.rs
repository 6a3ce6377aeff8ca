//! Seeded synthetic movie graphs for demos, tests and benchmarks.
//!
//! Studios prefer a genre; a movie takes its studio's preference with
//! probability [`STUDIO_PULL`]. Budgets overlap between genres, so the core
//! attribute alone is a weak predictor. Actors specialise in a genre and are
//! cast mostly into movies of that genre, which makes co-starring movies
//! share labels: the dependency collective inference exploits.
//!
//! Items are numbered studios first, then movies, then actors.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::error::{DataResult, FeatureResult};
use crate::graph::index::GraphStore;
use crate::graph::{ItemId, RelationalStore, Value, item_id};
use crate::source::{ClassLabel, Source};

/// Probability that a movie has its studio's preferred genre.
pub const STUDIO_PULL: f64 = 0.8;

/// Probability that a cast member specialises in the movie's genre.
const CAST_PULL: f64 = 0.75;

const GENRES: [&str; 2] = ["comedy", "drama"];

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MovieDataset {
    pub studios: usize,
    pub movies: usize,
    pub actors: usize,
    /// Maximum cast size; each movie casts between 1 and this many actors.
    pub max_cast: usize,
    pub seed: u64,
}

impl Default for MovieDataset {
    fn default() -> Self {
        Self {
            studios: 6,
            movies: 200,
            actors: 120,
            max_cast: 4,
            seed: 0,
        }
    }
}

impl MovieDataset {
    pub fn label() -> ClassLabel {
        ClassLabel::new("movie", "genre")
    }

    /// Sources a movie-genre model can aggregate over.
    pub fn default_sources() -> FeatureResult<Vec<Source>> {
        [
            "[self].budget",
            "[>made_by:studio].prefers",
            "[<acted_in:actor].gender",
            "[<acted_in:actor].famous",
            "[<acted_in:actor]",
            "[<acted_in:actor.>acted_in:movie].genre",
        ]
        .into_iter()
        .map(str::parse::<Source>)
        .collect()
    }

    pub fn studio_ids(&self) -> impl Iterator<Item = u64> {
        1..=self.studios as u64
    }

    pub fn movie_ids(&self) -> impl Iterator<Item = u64> {
        let start = self.studios as u64 + 1;
        start..start + self.movies as u64
    }

    pub fn actor_ids(&self) -> impl Iterator<Item = u64> {
        let start = (self.studios + self.movies) as u64 + 1;
        start..start + self.actors as u64
    }

    pub fn generate(&self) -> DataResult<GraphStore> {
        let mut rng = StdRng::seed_from_u64(self.seed);
        let store = GraphStore::new();

        let mut studios = Vec::with_capacity(self.studios);
        for (i, raw) in self.studio_ids().enumerate() {
            let id = item_id(raw)?;
            store.add_item(id, "studio")?;
            let prefers = GENRES[i % GENRES.len()];
            store.set_attribute(id, "prefers", prefers.into())?;
            studios.push((id, prefers));
        }

        // Actor pools per specialty.
        let mut pools: [Vec<ItemId>; 2] = [Vec::new(), Vec::new()];
        for raw in self.actor_ids() {
            let id = item_id(raw)?;
            store.add_item(id, "actor")?;
            let specialty = rng.gen_range(0..GENRES.len());
            let female = rng.gen_bool(if specialty == 1 { 0.7 } else { 0.35 });
            store.set_attribute(id, "gender", if female { "f" } else { "m" }.into())?;
            let famous = rng.gen_bool(0.25);
            store.set_attribute(id, "famous", if famous { "y" } else { "n" }.into())?;
            pools[specialty].push(id);
        }

        for raw in self.movie_ids() {
            let id = item_id(raw)?;
            store.add_item(id, "movie")?;
            let Some(&(studio, prefers)) = studios.choose(&mut rng) else {
                continue;
            };
            store.add_link(id, studio, "made_by")?;
            let genre = if rng.gen_bool(STUDIO_PULL) {
                prefers
            } else {
                other_genre(prefers)
            };
            store.set_attribute(id, "genre", genre.into())?;
            let budget = if genre == "drama" {
                rng.gen_range(10.0..40.0_f64)
            } else {
                rng.gen_range(30.0..80.0_f64)
            };
            store.set_attribute(id, "budget", Value::Num(budget.round()))?;

            let genre_index = usize::from(genre == "drama");
            let cast = rng.gen_range(1..=self.max_cast.max(1));
            let mut cast_ids: Vec<ItemId> = Vec::with_capacity(cast);
            for _ in 0..cast {
                let pool = if rng.gen_bool(CAST_PULL) {
                    &pools[genre_index]
                } else {
                    &pools[1 - genre_index]
                };
                if let Some(&actor) = pool.choose(&mut rng) {
                    if !cast_ids.contains(&actor) {
                        cast_ids.push(actor);
                        store.add_link(actor, id, "acted_in")?;
                    }
                }
            }
        }

        tracing::info!(
            studios = self.studios,
            movies = self.movies,
            actors = self.actors,
            links = store.link_count(),
            seed = self.seed,
            "generated movie graph"
        );
        Ok(store)
    }
}

fn other_genre(genre: &str) -> &'static str {
    if genre == GENRES[0] {
        GENRES[1]
    } else {
        GENRES[0]
    }
}

/// Deterministically split `population` into (train, test) with roughly
/// `test_fraction` of the items in test.
pub fn train_test_split(
    population: &[ItemId],
    test_fraction: f64,
    seed: u64,
) -> (Vec<ItemId>, Vec<ItemId>) {
    let mut shuffled = population.to_vec();
    shuffled.shuffle(&mut StdRng::seed_from_u64(seed));
    let test_len = ((population.len() as f64) * test_fraction.clamp(0.0, 1.0)).round() as usize;
    let mut train = shuffled.split_off(test_len);
    let mut test = shuffled;
    train.sort();
    test.sort();
    (train, test)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::RelationalStore;

    fn small() -> MovieDataset {
        MovieDataset {
            studios: 2,
            movies: 30,
            actors: 20,
            max_cast: 3,
            seed: 11,
        }
    }

    #[test]
    fn generation_is_deterministic() {
        let a = small().generate().unwrap();
        let b = small().generate().unwrap();
        assert_eq!(a.link_count(), b.link_count());
        for raw in small().movie_ids() {
            let id = ItemId::new(raw).unwrap();
            assert_eq!(
                a.attribute(id, "genre").unwrap(),
                b.attribute(id, "genre").unwrap()
            );
        }
    }

    #[test]
    fn every_movie_is_labelled_and_made_by_one_studio() {
        let dataset = small();
        let store = dataset.generate().unwrap();
        assert_eq!(store.items_of_kind("movie").unwrap().len(), 30);
        for raw in dataset.movie_ids() {
            let id = ItemId::new(raw).unwrap();
            assert!(store.attribute(id, "genre").unwrap().is_some());
            let studios = store
                .neighbors(id, &crate::graph::Hop::outgoing("made_by", Some("studio")))
                .unwrap();
            assert_eq!(studios.len(), 1);
        }
    }

    #[test]
    fn default_sources_parse() {
        let sources = MovieDataset::default_sources().unwrap();
        assert_eq!(sources.len(), 6);
        assert!(sources.iter().any(|s| s.mentions("genre")));
    }

    #[test]
    fn split_is_disjoint_and_complete() {
        let population: Vec<ItemId> = (1..=10).filter_map(ItemId::new).collect();
        let (train, test) = train_test_split(&population, 0.3, 1);
        assert_eq!(test.len(), 3);
        assert_eq!(train.len(), 7);
        let mut all: Vec<ItemId> = train.iter().chain(test.iter()).copied().collect();
        all.sort();
        assert_eq!(all, population);
    }
}
