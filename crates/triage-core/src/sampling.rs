use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

/// Seeded, exclusion-aware subset selection.
///
/// One sampler lives for one invocation. Tasks chained with `next` receive the
/// caller's seed and exclusion index so related selections (the reviewers that
/// were requested, the people notified about it) line up.
#[derive(Debug, Clone)]
pub struct Sampler {
    seed: i64,
    exclude: Option<usize>,
    same_seed: bool,
    seeded: bool,
}

impl Sampler {
    /// `same_seed` keeps seed and exclusion across [`Sampler::init_seed`]
    /// calls once they have been set.
    pub fn new(same_seed: bool) -> Self {
        Self {
            seed: 0,
            exclude: None,
            same_seed,
            seeded: false,
        }
    }

    pub fn seed(&self) -> i64 {
        self.seed
    }

    pub fn exclude(&self) -> Option<usize> {
        self.exclude
    }

    pub fn set_exclude(&mut self, index: usize) {
        self.exclude = Some(index);
    }

    /// Take over the state of the task that chained to this one.
    pub fn adopt(&mut self, seed: i64, exclude: Option<usize>) {
        self.seed = seed;
        self.exclude = exclude;
        self.seeded = true;
    }

    /// Called before every action.
    pub fn init_seed(&mut self) {
        if self.same_seed && self.seeded {
            return;
        }
        self.reset();
    }

    /// Fresh seed from the clock and no exclusion, regardless of `same_seed`.
    pub fn reset(&mut self) {
        self.seed = clock_seed();
        self.exclude = None;
        self.seeded = true;
    }

    /// Sort, drop the excluded index, then shuffle and truncate to `limit`.
    ///
    /// The result depends only on the set of inputs, the seed and the
    /// exclusion index.
    pub fn sample(&self, mut items: Vec<String>, limit: Option<usize>) -> Vec<String> {
        items.sort();
        if let Some(i) = self.exclude {
            if i < items.len() {
                items.remove(i);
            }
        }
        let Some(limit) = limit else {
            return items;
        };
        let mut rng = StdRng::seed_from_u64(self.seed as u64);
        items.shuffle(&mut rng);
        items.truncate(limit);
        items
    }
}

fn clock_seed() -> i64 {
    let now = chrono::Utc::now();
    now.timestamp_nanos_opt()
        .unwrap_or_else(|| now.timestamp_micros())
}
