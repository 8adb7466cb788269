use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use spatial_crossmatch::{
    CrossmatchConfig, CrossmatchResult, CrossmatchSession, Extent, FileIndexStore, KeyDomain,
    MemoryIndexStore, RecordLocator, ResultPair, SpatialIndexStore,
};
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::path::Path;
use std::sync::Arc;
use std::{env, fs};

/// An index entry as handed to the builders.
pub type Entry = (Option<Extent>, RecordLocator);

/// Runs a test between a setup and a teardown step.
/// The teardown runs even when the test fails or panics.
pub fn run_test<T, B, A>(before: B, test: T, after: A)
where
    T: Fn(TestContext) -> CrossmatchResult<()>,
    B: Fn() -> CrossmatchResult<TestContext>,
    A: Fn(TestContext) -> CrossmatchResult<()>,
{
    let ctx = match before() {
        Ok(ctx) => ctx,
        Err(e) => panic!("Before run failed: {:?}", e),
    };

    let test_ctx = ctx.clone();
    let result = std::panic::catch_unwind(AssertUnwindSafe(move || test(test_ctx)));

    if let Err(e) = after(ctx) {
        eprintln!("Warning: After run failed: {:?}", e);
    }

    match result {
        Ok(Ok(())) => {}
        Ok(Err(e)) => panic!("Test failed: {:?}", e),
        Err(panic) => std::panic::resume_unwind(panic),
    }
}

#[derive(Clone)]
pub struct TestContext {
    path: String,
    memory: MemoryIndexStore,
    files: FileIndexStore,
}

impl TestContext {
    pub fn path(&self) -> &str {
        &self.path
    }

    /// In-memory host with small pages, so modest inputs build deep trees.
    pub fn memory(&self) -> MemoryIndexStore {
        self.memory.clone()
    }

    /// File host rooted at the context's directory.
    pub fn files(&self) -> FileIndexStore {
        self.files.clone()
    }

    pub fn shared_memory(&self) -> Arc<dyn SpatialIndexStore> {
        Arc::new(self.memory.clone())
    }

    pub fn shared_files(&self) -> Arc<dyn SpatialIndexStore> {
        Arc::new(self.files.clone())
    }
}

pub fn random_path() -> String {
    let id = uuid::Uuid::new_v4();
    env::temp_dir()
        .join(format!("crossmatch-{}", id))
        .to_string_lossy()
        .into_owned()
}

pub fn create_test_context() -> CrossmatchResult<TestContext> {
    create_test_context_with_capacity(4)
}

pub fn create_test_context_with_capacity(node_capacity: usize) -> CrossmatchResult<TestContext> {
    let path = random_path();
    let files = FileIndexStore::open_with_node_capacity(&path, node_capacity)?;
    Ok(TestContext {
        path,
        memory: MemoryIndexStore::with_node_capacity(node_capacity),
        files,
    })
}

pub fn cleanup(ctx: TestContext) -> CrossmatchResult<()> {
    let path = ctx.path().to_string();
    drop(ctx);
    if Path::new(&path).exists() {
        fs::remove_dir_all(&path)?;
    }
    Ok(())
}

/// Random boxes (and a share of points) inside `[0, world)` in every
/// dimension. Roughly `null_ratio` of the entries have no extent.
pub fn random_entries(
    seed: u64,
    count: u64,
    dimensions: usize,
    world: f64,
    max_side: f64,
    null_ratio: f64,
) -> Vec<Entry> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..count)
        .map(|i| {
            if rng.random_bool(null_ratio) {
                return (None, RecordLocator(i));
            }
            let point = rng.random_bool(0.25);
            let lower: Vec<f64> = (0..dimensions).map(|_| rng.random_range(0.0..world)).collect();
            let upper: Vec<f64> = lower
                .iter()
                .map(|lo| if point { *lo } else { lo + rng.random_range(0.0..max_side) })
                .collect();
            let extent = Extent::new(lower, upper).ok();
            (extent, RecordLocator(i))
        })
        .collect()
}

/// A regular grid of `side`-wide squares starting at `offset`.
pub fn grid(count: u64, columns: u64, side: f64, offset: f64) -> Vec<Entry> {
    (0..count)
        .map(|i| {
            let x = (i % columns) as f64 + offset;
            let y = (i / columns) as f64 + offset;
            (Some(Extent::rect(x, y, x + side, y + side)), RecordLocator(i))
        })
        .collect()
}

/// Every overlapping pair by nested loop, sorted.
pub fn brute_force(outer: &[Entry], inner: &[Entry]) -> Vec<ResultPair> {
    let mut pairs = Vec::new();
    for (a, left) in outer {
        for (b, right) in inner {
            if let (Some(a), Some(b)) = (a, b) {
                if a.overlaps(b) {
                    pairs.push(ResultPair::new(*left, *right));
                }
            }
        }
    }
    pairs.sort();
    pairs
}

/// Drains a session and returns its pairs sorted, duplicates kept.
pub fn collect_sorted(session: CrossmatchSession) -> CrossmatchResult<Vec<ResultPair>> {
    let mut pairs = session.collect::<CrossmatchResult<Vec<_>>>()?;
    pairs.sort();
    Ok(pairs)
}

/// Runs a full cross-match of two trees by name.
pub fn crossmatch(
    store: Arc<dyn SpatialIndexStore>,
    outer: &str,
    inner: &str,
    config: CrossmatchConfig,
) -> CrossmatchResult<Vec<ResultPair>> {
    collect_sorted(CrossmatchSession::open_with_config(
        store, outer, inner, config,
    )?)
}

/// Checks that every pair refers to overlapping entries of the two inputs.
pub fn all_pairs_overlap(pairs: &[ResultPair], outer: &[Entry], inner: &[Entry]) -> bool {
    let outer: HashMap<RecordLocator, &Extent> = outer
        .iter()
        .filter_map(|(e, l)| e.as_ref().map(|e| (*l, e)))
        .collect();
    let inner: HashMap<RecordLocator, &Extent> = inner
        .iter()
        .filter_map(|(e, l)| e.as_ref().map(|e| (*l, e)))
        .collect();

    pairs.iter().all(|pair| {
        match (outer.get(&pair.left), inner.get(&pair.right)) {
            (Some(a), Some(b)) => a.overlaps(b),
            _ => false,
        }
    })
}

/// Creates the same pair of trees in a memory store.
pub fn create_pair(
    store: &MemoryIndexStore,
    dimensions: usize,
    outer: &[Entry],
    inner: &[Entry],
) -> CrossmatchResult<()> {
    store.create_tree("outer", KeyDomain::new(dimensions), outer.to_vec())?;
    store.create_tree("inner", KeyDomain::new(dimensions), inner.to_vec())?;
    Ok(())
}
