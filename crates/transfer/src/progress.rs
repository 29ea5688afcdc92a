//! Hierarchical weighted progress.
//!
//! Every node owns its own small state behind its own lock. Updates flow from
//! a node to its ancestors one lock at a time, so no code path ever holds two
//! node locks and arbitrarily deep trees cannot deadlock. Each change
//! publishes a fresh [`ProgressSnapshot`] on a `watch` channel; slow readers
//! only ever see the latest one. Snapshots are built while holding the
//! channel's write lock, so a newer snapshot is never replaced by an older one.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::watch;

/// Completed nodes kept in snapshots after they leave the tree.
const FINISHED_LIMIT: usize = 16;

/// One rendered line of progress.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressLine {
    /// Nesting depth; the root is 0.
    pub depth: usize,
    pub label: String,
    pub annotation: Option<String>,
    pub completed: u64,
    pub total: u64,
}

impl ProgressLine {
    /// Completed fraction in `0.0..=1.0`. An empty total counts as done.
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            return 1.0;
        }
        (self.completed as f64 / self.total as f64).min(1.0)
    }
}

/// The root plus every node that has not completed yet, depth first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProgressSnapshot {
    pub lines: Vec<ProgressLine>,
    /// The most recently completed nodes with their final annotation,
    /// oldest first.
    pub finished: Vec<ProgressLine>,
}

impl ProgressSnapshot {
    /// The root line, if any snapshot has been taken.
    pub fn root(&self) -> Option<&ProgressLine> {
        self.lines.first()
    }
}

/// Owner of a progress tree and its snapshot channel.
pub struct ProgressTree {
    root: ProgressNode,
    updates: watch::Receiver<ProgressSnapshot>,
}

impl ProgressTree {
    /// Creates a tree whose root is labelled `label` and weighs `initial_total`.
    pub fn start(label: impl Into<String>, initial_total: u64) -> Self {
        let (tx, updates) = watch::channel(ProgressSnapshot::default());
        let root = ProgressNode {
            inner: Arc::new(Node {
                state: Mutex::new(NodeState::new(label.into(), initial_total)),
                parent: None,
                shared: Arc::new(Shared {
                    publisher: tx,
                    finished: Mutex::new(VecDeque::new()),
                }),
            }),
        };
        root.publish();
        Self { root, updates }
    }

    pub fn root(&self) -> &ProgressNode {
        &self.root
    }

    /// Returns a receiver that sees the latest snapshot after every change.
    pub fn subscribe(&self) -> watch::Receiver<ProgressSnapshot> {
        self.updates.clone()
    }

    /// Builds a snapshot of the tree as it is now.
    pub fn snapshot(&self) -> ProgressSnapshot {
        self.root.inner.snapshot()
    }
}

/// Handle to one node of a [`ProgressTree`]. Cheap to clone and `Send`.
#[derive(Clone)]
pub struct ProgressNode {
    inner: Arc<Node>,
}

struct Node {
    state: Mutex<NodeState>,
    parent: Option<Arc<Node>>,
    shared: Arc<Shared>,
}

/// State common to every node of one tree.
struct Shared {
    publisher: watch::Sender<ProgressSnapshot>,
    finished: Mutex<VecDeque<ProgressLine>>,
}

impl Shared {
    fn record_finished(&self, line: ProgressLine) {
        let mut finished = self.finished.lock().unwrap_or_else(|e| e.into_inner());
        if finished.len() == FINISHED_LIMIT {
            finished.pop_front();
        }
        finished.push_back(line);
    }
}

struct NodeState {
    label: String,
    annotation: Option<String>,
    total: u64,
    completed: u64,
    done: bool,
    children: Vec<Arc<Node>>,
}

impl NodeState {
    fn new(label: String, total: u64) -> Self {
        Self {
            label,
            annotation: None,
            total,
            completed: 0,
            done: false,
            children: Vec::new(),
        }
    }

    /// Applies deltas and grows the total if completion overtook it.
    /// Returns how much the total grew beyond `total_delta`.
    fn apply(&mut self, completed_delta: u64, total_delta: u64) -> u64 {
        self.total = self.total.saturating_add(total_delta);
        self.completed = self.completed.saturating_add(completed_delta);
        let overflow = self.completed.saturating_sub(self.total);
        self.total += overflow;
        overflow
    }
}

impl Node {
    fn lock(&self) -> MutexGuard<'_, NodeState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Pushes deltas up the ancestor chain, one lock at a time.
    fn propagate(&self, completed_delta: u64, mut total_delta: u64) {
        let mut next = self.parent.clone();
        while let Some(node) = next {
            if completed_delta == 0 && total_delta == 0 {
                break;
            }
            {
                let mut state = node.lock();
                if state.done {
                    break;
                }
                total_delta += state.apply(completed_delta, total_delta);
            }
            next = node.parent.clone();
        }
    }

    fn root(self: &Arc<Self>) -> Arc<Node> {
        let mut node = Arc::clone(self);
        while let Some(parent) = node.parent.clone() {
            node = parent;
        }
        node
    }

    fn depth(&self) -> usize {
        let mut depth = 0;
        let mut next = self.parent.as_ref();
        while let Some(node) = next {
            depth += 1;
            next = node.parent.as_ref();
        }
        depth
    }

    fn snapshot(&self) -> ProgressSnapshot {
        let mut lines = Vec::new();
        self.collect(0, &mut lines);
        let finished = self
            .shared
            .finished
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .cloned()
            .collect();
        ProgressSnapshot { lines, finished }
    }

    fn collect(&self, depth: usize, lines: &mut Vec<ProgressLine>) {
        let children = {
            let state = self.lock();
            lines.push(ProgressLine {
                depth,
                label: state.label.clone(),
                annotation: state.annotation.clone(),
                completed: state.completed,
                total: state.total,
            });
            state.children.clone()
        };
        for child in children {
            child.collect(depth + 1, lines);
        }
    }
}

impl ProgressNode {
    /// Creates a child weighing `initial_total`.
    ///
    /// The child's weight is part of this node's total, not added to it; use
    /// [`add_to_total`](Self::add_to_total) on the child when it grows.
    pub fn create_child(&self, initial_total: u64) -> ProgressNode {
        let child = Arc::new(Node {
            state: Mutex::new(NodeState::new(String::new(), initial_total)),
            parent: Some(Arc::clone(&self.inner)),
            shared: Arc::clone(&self.inner.shared),
        });
        self.inner.lock().children.push(Arc::clone(&child));
        ProgressNode { inner: child }
    }

    /// Grows this node's total, and every ancestor's, by `amount`.
    pub fn add_to_total(&self, amount: u64) {
        {
            let mut state = self.inner.lock();
            if state.done {
                return;
            }
            state.total = state.total.saturating_add(amount);
        }
        self.inner.propagate(0, amount);
        self.publish();
    }

    /// Records `amount` of completed weight and relabels the node.
    ///
    /// If completion would pass the total, the total grows to match first.
    pub fn advance(&self, label: impl Into<String>, amount: u64) {
        let grown = {
            let mut state = self.inner.lock();
            if state.done {
                return;
            }
            state.label = label.into();
            state.apply(amount, 0)
        };
        self.inner.propagate(amount, grown);
        self.publish();
    }

    pub fn set_label(&self, label: impl Into<String>) {
        self.inner.lock().label = label.into();
        self.publish();
    }

    /// Marks the node finished, counting any remaining weight as completed.
    ///
    /// A completed child leaves the tree's active lines and shows up, with
    /// its annotation, in [`ProgressSnapshot::finished`]. Safe to call more
    /// than once and from cleanup paths; only the first call has an effect.
    pub fn complete(&self, annotation: Option<&str>) {
        let (remaining, line) = {
            let mut state = self.inner.lock();
            if state.done {
                return;
            }
            state.done = true;
            state.annotation = annotation.map(str::to_string);
            let remaining = state.total - state.completed;
            state.completed = state.total;
            let line = ProgressLine {
                depth: 0,
                label: state.label.clone(),
                annotation: state.annotation.clone(),
                completed: state.completed,
                total: state.total,
            };
            (remaining, line)
        };
        self.inner.propagate(remaining, 0);

        if let Some(parent) = &self.inner.parent {
            parent
                .lock()
                .children
                .retain(|c| !Arc::ptr_eq(c, &self.inner));
            self.inner.shared.record_finished(ProgressLine {
                depth: self.inner.depth(),
                ..line
            });
        }
        self.publish();
    }

    pub fn is_complete(&self) -> bool {
        self.inner.lock().done
    }

    /// Current `(completed, total)` of this node.
    pub fn weights(&self) -> (u64, u64) {
        let state = self.inner.lock();
        (state.completed, state.total)
    }

    fn publish(&self) {
        let root = self.inner.root();
        self.inner
            .shared
            .publisher
            .send_modify(|snapshot| *snapshot = root.snapshot());
    }
}
