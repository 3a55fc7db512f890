//! Evaluation of task nodes.
//!
//! Finished values go to a byte-bounded LRU owned by the executor. Concurrent
//! evaluations of one node share a single flight, which is dropped once the
//! value is cached and every waiter has its copy.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use ndarray::Array3;
use tokio::sync::{OnceCell, Semaphore};
use tokio::task::JoinSet;
use tracing::debug;

use crate::error::TileError;
use crate::tile::{fetch_tile, mask_tile};

use super::results::{ResultCache, DEFAULT_RESULT_CACHE_CAPACITY};
use super::task::{Delayed, NodeId, TaskKey, TaskOp};

type TileResult = Result<Arc<Array3<u8>>, TileError>;
type BoxedEval<'a> = Pin<Box<dyn Future<Output = TileResult> + Send + 'a>>;
type Flight = Arc<OnceCell<TileResult>>;

#[derive(Default)]
struct Counters {
    ops_run: AtomicUsize,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

struct InFlightGuard<'a> {
    counters: &'a Counters,
}

impl Counters {
    fn enter(&self) -> InFlightGuard<'_> {
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(current, Ordering::SeqCst);
        InFlightGuard { counters: self }
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.counters.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.counters.ops_run.fetch_add(1, Ordering::SeqCst);
    }
}

/// Evaluates [`Delayed`] nodes with bounded parallelism.
///
/// Dependencies are evaluated before their dependents. A permit is held
/// only while a node's own operation runs, never while waiting on inputs.
/// Clones share permits, counters and cached values.
#[derive(Clone)]
pub struct Executor {
    permits: Arc<Semaphore>,
    counters: Arc<Counters>,
    results: Arc<ResultCache>,
    in_flight: Arc<Mutex<HashMap<NodeId, Flight>>>,
}

impl Executor {
    /// Executor running at most `concurrency` operations at once, with the
    /// default result cache.
    pub fn new(concurrency: usize) -> Self {
        Self::with_cache_capacity(concurrency, DEFAULT_RESULT_CACHE_CAPACITY)
    }

    /// Executor keeping at most `max_bytes` of finished tiles.
    ///
    /// A capacity of 0 keeps nothing: every compute evaluates again.
    pub fn with_cache_capacity(concurrency: usize, max_bytes: usize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(concurrency.max(1))),
            counters: Arc::new(Counters::default()),
            results: Arc::new(ResultCache::with_capacity(max_bytes)),
            in_flight: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Value of `node`, computing it and its inputs if needed.
    pub async fn compute(&self, node: &Delayed) -> TileResult {
        self.evaluate(node).await
    }

    /// Values of `nodes` in order, evaluated concurrently.
    pub async fn compute_all(&self, nodes: &[Delayed]) -> Result<Vec<Arc<Array3<u8>>>, TileError> {
        let mut tasks = JoinSet::new();
        for (index, node) in nodes.iter().enumerate() {
            let executor = self.clone();
            let node = node.clone();
            tasks.spawn(async move { (index, executor.evaluate(&node).await) });
        }

        let mut results: Vec<Option<Arc<Array3<u8>>>> = vec![None; nodes.len()];
        while let Some(joined) = tasks.join_next().await {
            let (index, result) = joined.map_err(|e| TileError::TaskFailed {
                message: e.to_string(),
            })?;
            results[index] = Some(result?);
        }

        results
            .into_iter()
            .map(|r| {
                r.ok_or_else(|| TileError::TaskFailed {
                    message: "task finished without a result".to_string(),
                })
            })
            .collect()
    }

    /// Operations completed, successfully or not.
    pub fn ops_run(&self) -> usize {
        self.counters.ops_run.load(Ordering::SeqCst)
    }

    /// Most operations ever running at the same time.
    pub fn peak_in_flight(&self) -> usize {
        self.counters.peak.load(Ordering::SeqCst)
    }

    /// Whether the value of `node` is currently cached.
    pub fn is_cached(&self, node: &Delayed) -> bool {
        self.results.contains(&node.id())
    }

    /// Bytes of tile values currently cached.
    pub fn cached_bytes(&self) -> usize {
        self.results.size()
    }

    pub fn cached_tiles(&self) -> usize {
        self.results.len()
    }

    pub fn cache_capacity(&self) -> usize {
        self.results.capacity()
    }

    /// Evaluations started and not yet finished.
    pub fn pending_evaluations(&self) -> usize {
        self.in_flight.lock().map(|f| f.len()).unwrap_or(0)
    }

    pub fn clear_cache(&self) {
        self.results.clear();
    }

    fn evaluate<'a>(&'a self, node: &'a Delayed) -> BoxedEval<'a> {
        Box::pin(async move {
            let id = node.id();
            if let Some(value) = self.results.get(&id) {
                return Ok(value);
            }

            let flight = {
                let mut in_flight = self.in_flight.lock().map_err(|_| TileError::TaskFailed {
                    message: "executor lock poisoned".to_string(),
                })?;
                // Re-check under the flight lock: the leader may have finished
                // between the lookup above and here.
                if let Some(value) = self.results.get(&id) {
                    return Ok(value);
                }
                Arc::clone(in_flight.entry(id).or_default())
            };

            flight
                .get_or_init(|| async {
                    let result = self.evaluate_inputs_then_run(node).await;
                    if let Ok(value) = &result {
                        self.results.put(id, Arc::clone(value));
                    }
                    if let Ok(mut in_flight) = self.in_flight.lock() {
                        in_flight.remove(&id);
                    }
                    result
                })
                .await
                .clone()
        })
    }

    async fn evaluate_inputs_then_run(&self, node: &Delayed) -> TileResult {
        let mut inputs = Vec::with_capacity(node.0.deps.len());
        for dep in &node.0.deps {
            inputs.push(self.evaluate(dep).await?);
        }
        self.run(node.key(), &node.0.op, inputs).await.map(Arc::new)
    }

    async fn run(
        &self,
        key: TaskKey,
        op: &TaskOp,
        inputs: Vec<Arc<Array3<u8>>>,
    ) -> Result<Array3<u8>, TileError> {
        let _permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|e| TileError::TaskFailed {
                message: e.to_string(),
            })?;
        let _guard = self.counters.enter();
        debug!(?key, "Running task");

        match op {
            TaskOp::Fetch { source } => {
                fetch_tile(source.as_ref(), key.level, key.col, key.row).await
            }
            TaskOp::Mask { num_levels, params } => {
                let raw = inputs.into_iter().next().ok_or_else(|| TileError::TaskFailed {
                    message: format!("mask task {key:?} has no input tile"),
                })?;
                let params = Arc::clone(params);
                let num_levels = *num_levels;
                tokio::task::spawn_blocking(move || {
                    mask_tile(&raw, key.level, num_levels, &params)
                })
                .await
                .map_err(|e| TileError::TaskFailed {
                    message: e.to_string(),
                })?
            }
        }
    }
}
