//! Task nodes and the memoizing graph builder.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::config::StainParams;
use crate::slide::SlideSource;

/// What a node computes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskKind {
    Fetch,
    Mask,
}

/// Identity of a node. Two requests with the same key share one node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskKey {
    pub kind: TaskKind,
    pub level: usize,
    pub col: u32,
    pub row: u32,
}

impl TaskKey {
    pub fn fetch(level: usize, col: u32, row: u32) -> Self {
        Self {
            kind: TaskKind::Fetch,
            level,
            col,
            row,
        }
    }

    pub fn mask(level: usize, col: u32, row: u32) -> Self {
        Self {
            kind: TaskKind::Mask,
            level,
            col,
            row,
        }
    }
}

/// Identity of a node across graphs: keys repeat from one slide to the next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct NodeId {
    pub(crate) graph: u64,
    pub(crate) key: TaskKey,
}

pub(crate) enum TaskOp {
    Fetch {
        source: Arc<dyn SlideSource>,
    },
    /// Takes the raw tile as its single input
    Mask {
        num_levels: usize,
        params: Arc<StainParams>,
    },
}

pub(crate) struct Node {
    pub(crate) id: NodeId,
    pub(crate) deps: Vec<Delayed>,
    pub(crate) op: TaskOp,
}

/// Handle to a deferred tile computation.
///
/// A node holds no pixels. Finished values live in the evaluating
/// [`Executor`](super::Executor)'s bounded cache.
#[derive(Clone)]
pub struct Delayed(pub(crate) Arc<Node>);

impl Delayed {
    fn new(id: NodeId, deps: Vec<Delayed>, op: TaskOp) -> Self {
        Self(Arc::new(Node { id, deps, op }))
    }

    pub fn key(&self) -> TaskKey {
        self.0.id.key
    }

    pub(crate) fn id(&self) -> NodeId {
        self.0.id
    }

    pub fn dependencies(&self) -> &[Delayed] {
        &self.0.deps
    }

    /// Whether both handles refer to the same node.
    pub fn ptr_eq(&self, other: &Delayed) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Delayed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Delayed")
            .field("graph", &self.0.id.graph)
            .field("key", &self.0.id.key)
            .field("deps", &self.0.deps.len())
            .finish()
    }
}

static NEXT_GRAPH: AtomicU64 = AtomicU64::new(1);

/// Builds nodes, memoized by [`TaskKey`].
pub struct TaskGraph {
    id: u64,
    nodes: HashMap<TaskKey, Delayed>,
}

impl Default for TaskGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskGraph {
    pub fn new() -> Self {
        Self {
            id: NEXT_GRAPH.fetch_add(1, Ordering::Relaxed),
            nodes: HashMap::new(),
        }
    }

    fn node_id(&self, key: TaskKey) -> NodeId {
        NodeId { graph: self.id, key }
    }

    /// Node fetching tile `(col, row)` of `level` from `source`.
    pub fn fetch(
        &mut self,
        source: &Arc<dyn SlideSource>,
        level: usize,
        col: u32,
        row: u32,
    ) -> Delayed {
        let key = TaskKey::fetch(level, col, row);
        let id = self.node_id(key);
        self.nodes
            .entry(key)
            .or_insert_with(|| {
                Delayed::new(
                    id,
                    Vec::new(),
                    TaskOp::Fetch {
                        source: Arc::clone(source),
                    },
                )
            })
            .clone()
    }

    /// Node masking the tile produced by `raw`.
    pub fn mask(&mut self, raw: &Delayed, num_levels: usize, params: &Arc<StainParams>) -> Delayed {
        let raw_key = raw.key();
        let key = TaskKey::mask(raw_key.level, raw_key.col, raw_key.row);
        let id = self.node_id(key);
        self.nodes
            .entry(key)
            .or_insert_with(|| {
                Delayed::new(
                    id,
                    vec![raw.clone()],
                    TaskOp::Mask {
                        num_levels,
                        params: Arc::clone(params),
                    },
                )
            })
            .clone()
    }

    pub fn get(&self, key: &TaskKey) -> Option<&Delayed> {
        self.nodes.get(key)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}
