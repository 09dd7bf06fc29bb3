//! Stop lists
//!
//! Stops come from either a detector scores file (JSON, keyed by stop id) or
//! a plain CSV. In the scores file a stop with a non-empty `amenity_scores`
//! map was already confirmed and counts as a known positive; everything else
//! is a candidate the agent has to check. All candidates are kept and a
//! sample of the positives is mixed in.
//!
//! ```text
//! { "1042": { "latitude": 33.77, "longitude": -84.39,
//!             "gmaps_place_name": "Peachtree St & 10th St",
//!             "amenity_scores": { "sign": 0.91 } } }
//! ```
//!
//! ```text
//! latitude,longitude,name
//! 33.77,-84.39,Peachtree St & 10th St
//! ```

use std::{
    collections::{BTreeMap, HashSet},
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};
use serde::Deserialize;

use crate::env::types::Stop;

/// Supplier of stops, one per episode
pub trait StopSource {
    /// Next stop to search, or `None` once the list is exhausted
    fn next_stop(&mut self) -> Option<Stop>;
}

/// How a stop list is assembled
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    /// Shuffle the final list
    pub shuffle: bool,
    /// Seed for sampling and shuffling; entropy when `None`
    pub seed: Option<u64>,
    /// Known positives to mix in (scores files only); all of them when
    /// fewer are available
    pub num_positives: usize,
    /// Completion log of an earlier run; stops already logged are skipped
    pub ignore_path: Option<PathBuf>,
}

impl LoadOptions {
    /// Shuffled, unseeded, no positives, nothing ignored
    pub fn new() -> Self {
        Self {
            shuffle: true,
            ..Default::default()
        }
    }

    /// Set shuffling
    pub fn shuffle(mut self, shuffle: bool) -> Self {
        self.shuffle = shuffle;
        self
    }

    /// Set the random seed
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Set the number of known positives to include
    pub fn num_positives(mut self, num: usize) -> Self {
        self.num_positives = num;
        self
    }

    /// Skip stops already present in this completion log
    pub fn ignore_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.ignore_path = Some(path.into());
        self
    }
}

#[derive(Debug, Deserialize)]
struct ScoreEntry {
    latitude: f64,
    longitude: f64,
    gmaps_place_name: String,
    #[serde(default)]
    amenity_scores: BTreeMap<String, f64>,
}

#[derive(Debug, Deserialize)]
struct CsvRow {
    latitude: f64,
    longitude: f64,
    name: String,
}

#[derive(Debug, Deserialize)]
struct LoggedStop {
    place_name: String,
}

/// In-memory stop list handed out in order
#[derive(Debug, Clone, Default)]
pub struct StopLoader {
    stops: Vec<Stop>,
    index: usize,
}

impl StopLoader {
    /// Wrap an existing list
    pub fn from_stops(stops: Vec<Stop>) -> Self {
        Self { stops, index: 0 }
    }

    /// Load a stop list; files ending in `.csv` are read as CSV, anything
    /// else as a scores file
    pub fn load<P: AsRef<Path>>(path: P, options: &LoadOptions) -> Result<Self> {
        let path = path.as_ref();
        let ignored = match &options.ignore_path {
            Some(ignore) => load_ignored(ignore)?,
            None => HashSet::new(),
        };
        let mut rng = match options.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let is_csv = path.extension().map_or(false, |ext| ext.eq_ignore_ascii_case("csv"));
        let mut stops = if is_csv {
            load_csv(path, &ignored)?
        } else {
            load_scores(path, &ignored, options.num_positives, &mut rng)?
        };

        if options.shuffle {
            stops.shuffle(&mut rng);
        }
        tracing::info!("Loaded {} stops from {}", stops.len(), path.display());
        Ok(Self::from_stops(stops))
    }

    /// All stops, in hand-out order
    pub fn stops(&self) -> &[Stop] {
        &self.stops
    }

    /// Number of stops
    pub fn len(&self) -> usize {
        self.stops.len()
    }

    /// Whether the list is empty
    pub fn is_empty(&self) -> bool {
        self.stops.is_empty()
    }

    /// Stops not handed out yet
    pub fn remaining(&self) -> usize {
        self.stops.len() - self.index
    }

    /// Split the remaining stops round-robin into `n` loaders
    pub fn partition(self, n: usize) -> Vec<StopLoader> {
        let n = n.max(1);
        let mut parts = vec![Vec::new(); n];
        for (i, stop) in self.stops.into_iter().skip(self.index).enumerate() {
            parts[i % n].push(stop);
        }
        parts.into_iter().map(StopLoader::from_stops).collect()
    }
}

impl StopSource for StopLoader {
    fn next_stop(&mut self) -> Option<Stop> {
        let stop = self.stops.get(self.index).cloned()?;
        self.index += 1;
        Some(stop)
    }
}

fn load_ignored(path: &Path) -> Result<HashSet<String>> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("reading ignore list {}", path.display()))?;
    let logged: Vec<LoggedStop> = serde_json::from_str(&contents)
        .with_context(|| format!("parsing ignore list {}", path.display()))?;
    Ok(logged.into_iter().map(|l| l.place_name).collect())
}

fn load_csv(path: &Path, ignored: &HashSet<String>) -> Result<Vec<Stop>> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("Failed to open CSV file: {}", path.display()))?;

    let mut stops = Vec::new();
    for (line, row) in reader.deserialize::<CsvRow>().enumerate() {
        let row = row.with_context(|| format!("{}: bad row {}", path.display(), line + 1))?;
        if ignored.contains(&row.name) {
            continue;
        }
        stops.push(Stop::new(row.latitude, row.longitude, row.name, false));
    }
    Ok(stops)
}

fn load_scores(
    path: &Path,
    ignored: &HashSet<String>,
    num_positives: usize,
    rng: &mut StdRng,
) -> Result<Vec<Stop>> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("reading stop scores {}", path.display()))?;
    let scores: BTreeMap<String, ScoreEntry> = serde_json::from_str(&contents)
        .with_context(|| format!("parsing stop scores {}", path.display()))?;

    let mut candidates = Vec::new();
    let mut positives = Vec::new();
    for entry in scores.into_values() {
        if ignored.contains(&entry.gmaps_place_name) {
            continue;
        }
        let positive = !entry.amenity_scores.is_empty();
        let stop = Stop::new(
            entry.latitude,
            entry.longitude,
            entry.gmaps_place_name,
            positive,
        );
        if positive {
            positives.push(stop);
        } else {
            candidates.push(stop);
        }
    }

    if num_positives > positives.len() {
        tracing::warn!(
            "Requested {} positives but only {} are available",
            num_positives,
            positives.len()
        );
    }
    candidates.extend(positives.choose_multiple(rng, num_positives).cloned());
    Ok(candidates)
}
