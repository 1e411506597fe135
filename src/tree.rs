//! Rooted tree with attached sequences and a per-node operation cache.
//!
//! # Overview
//! Evaluating the likelihood of one alignment site costs one operation per
//! internal node (postorder traversal). Two sites whose states below a node
//! are identical produce the same *pattern* at that node, so the second one
//! can look the result up instead of recomputing it (subtree repeats).
//!
//! Patterns are interned bottom-up:
//! ```text
//!            root   key = (id(n1), id(C))
//!           /    \
//!         n1      C
//!        /  \
//!       A    B      key(n1) = (char(A), char(B))
//! ```
//! Each internal node keeps a map `key -> id`. A site is charged one
//! operation at a node only when its key is new there.
//!
//! # Mutable cache
//! The maps persist between calls, so counting a growing set of sites
//! charges only the increment. That makes the cache shared mutable state:
//! whoever needs an independent "what-if" must work on its own clone (see
//! `Partition`, which keeps its tree behind an `Arc` and clones on first
//! write). [`Tree::simulate_operations`] evaluates against the cache
//! without touching it.

use crate::alignment::Alignment;
use crate::bitset::Bitset;
use crate::error::{Result, SchedulerError};
use phylotree::tree::Tree as PhyloTree;
use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, HashMap};
use std::ops::{Add, AddAssign};
use std::sync::Arc;

/// Index of a node in the tree arena.
pub type NodeId = usize;

type PatternKey = Vec<u32>;

const EPSILON: f64 = 1e-12;

/// A node of the tree arena.
#[derive(Debug, Clone)]
pub struct Node {
    pub name: Option<String>,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    /// Length of the edge leading to the parent, if known.
    pub parent_edge: Option<f64>,
}

impl Node {
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }
}

/// Result of counting likelihood operations for a set of sites.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OperationCount {
    /// One operation per internal node per site, no sharing.
    pub op_maximum: u64,
    /// Operations left after subtree repeats and cached sites are shared.
    pub op_optimized: u64,
}

impl OperationCount {
    /// Percentage of operations saved; 0 when nothing was counted.
    pub fn op_savings(&self) -> f64 {
        if self.op_maximum == 0 {
            return 0.0;
        }
        (self.op_maximum - self.op_optimized) as f64 / self.op_maximum as f64 * 100.0
    }
}

impl Add for OperationCount {
    type Output = OperationCount;

    fn add(self, rhs: Self) -> Self::Output {
        OperationCount {
            op_maximum: self.op_maximum + rhs.op_maximum,
            op_optimized: self.op_optimized + rhs.op_optimized,
        }
    }
}

impl AddAssign for OperationCount {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

/// Memoised patterns per node plus the set of sites already charged.
#[derive(Debug, Clone, Default)]
struct OperationCache {
    patterns: Vec<HashMap<PatternKey, u32>>,
    counted: Bitset,
}

impl OperationCache {
    fn with_nodes(n: usize) -> Self {
        OperationCache {
            patterns: vec![HashMap::new(); n],
            counted: Bitset::default(),
        }
    }
}

/// The Tree Model: topology, leaf sequences and the operation cache.
///
/// Cloning is a deep copy of topology and cache; sequence characters are
/// shared.
#[derive(Debug, Clone)]
pub struct Tree {
    nodes: Vec<Node>,
    root: NodeId,
    postorder: Vec<NodeId>,
    sequences: Vec<Option<Arc<[u8]>>>,
    num_sites: Option<usize>,
    cache: OperationCache,
}

impl Tree {
    /// Parses a Newick string through `phylotree` and converts it.
    pub fn from_newick(newick: &str) -> Result<Self> {
        let phylo = PhyloTree::from_newick(newick.trim())
            .map_err(|e| SchedulerError::TreeParse(e.to_string()))?;
        Self::from_phylo(&phylo)
    }

    /// Converts a `phylotree` tree into the arena representation.
    ///
    /// Nodes are numbered in preorder from the root.
    pub fn from_phylo(tree: &PhyloTree) -> Result<Self> {
        let root_id = tree
            .get_root()
            .map_err(|e| SchedulerError::TreeParse(e.to_string()))?;
        let mut nodes = Vec::new();
        Self::copy_subtree(tree, root_id, None, &mut nodes)?;
        Self::from_nodes(nodes, 0)
    }

    fn copy_subtree(
        tree: &PhyloTree,
        node_id: usize,
        parent: Option<NodeId>,
        nodes: &mut Vec<Node>,
    ) -> Result<NodeId> {
        let node = tree
            .get(&node_id)
            .map_err(|e| SchedulerError::TreeParse(e.to_string()))?;
        let idx = nodes.len();
        nodes.push(Node {
            name: node.name.clone(),
            parent,
            children: Vec::with_capacity(node.children.len()),
            parent_edge: node.parent_edge,
        });
        for &child_id in &node.children {
            let child = Self::copy_subtree(tree, child_id, Some(idx), nodes)?;
            nodes[idx].children.push(child);
        }
        Ok(idx)
    }

    /// Builds a tree from an arena whose parent/child links are consistent.
    pub fn from_nodes(nodes: Vec<Node>, root: NodeId) -> Result<Self> {
        if nodes.is_empty() {
            return Err(SchedulerError::EmptyTree);
        }
        if root >= nodes.len() {
            return Err(SchedulerError::UnknownNode(root));
        }
        let n = nodes.len();
        let mut tree = Tree {
            nodes,
            root,
            postorder: Vec::new(),
            sequences: vec![None; n],
            num_sites: None,
            cache: OperationCache::with_nodes(n),
        };
        tree.rebuild_postorder();
        Ok(tree)
    }

    fn rebuild_postorder(&mut self) {
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut stack = vec![(self.root, false)];
        while let Some((node, expanded)) = stack.pop() {
            if expanded {
                order.push(node);
                continue;
            }
            stack.push((node, true));
            for &child in self.nodes[node].children.iter().rev() {
                stack.push((child, false));
            }
        }
        self.postorder = order;
    }

    /// Binds sequences from the alignment by node label and clears the
    /// cache. Labelled inner nodes (rerooted tips) pick up their sequence too.
    ///
    /// # Errors
    /// `MissingSequence` when a leaf label is absent from the alignment.
    pub fn attach_sequences(&mut self, alignment: &Alignment) -> Result<()> {
        let mut sequences = vec![None; self.nodes.len()];
        for (id, node) in self.nodes.iter().enumerate() {
            let seq = node.name.as_deref().and_then(|label| alignment.get(label));
            match seq {
                Some(seq) => sequences[id] = Some(Arc::clone(seq)),
                None if node.is_leaf() => {
                    return Err(SchedulerError::MissingSequence(
                        node.name.clone().unwrap_or_default(),
                    ));
                }
                None => {}
            }
        }
        self.sequences = sequences;
        self.num_sites = Some(alignment.num_sites());
        self.clear_cache();
        Ok(())
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn leaf_count(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_leaf()).count()
    }

    /// Nodes with at least one child; each costs one operation per site.
    pub fn internal_node_count(&self) -> usize {
        self.nodes.len() - self.leaf_count()
    }

    /// Number of alignment sites, once sequences are attached.
    pub fn num_sites(&self) -> Option<usize> {
        self.num_sites
    }

    /// Looks up a node by label.
    pub fn find(&self, label: &str) -> Option<NodeId> {
        self.nodes
            .iter()
            .position(|n| n.name.as_deref() == Some(label))
    }

    /// Longest root-to-leaf path, in edges.
    pub fn height(&self) -> usize {
        let mut heights = vec![0usize; self.nodes.len()];
        for &n in &self.postorder {
            heights[n] = self.nodes[n]
                .children
                .iter()
                .map(|&c| heights[c] + 1)
                .max()
                .unwrap_or(0);
        }
        heights[self.root]
    }

    /// Sites charged against the cache so far, ascending.
    pub fn counted_sites(&self) -> impl Iterator<Item = usize> + '_ {
        self.cache.counted.iter_ones()
    }

    /// Forgets every memoised pattern.
    pub fn clear_cache(&mut self) {
        self.cache = OperationCache::with_nodes(self.nodes.len());
    }

    /// Counts operations for `sites` and commits the new patterns, so a
    /// later call only pays for what is new.
    pub fn count_operations(&mut self, sites: &[usize]) -> Result<OperationCount> {
        let (count, overlay) = self.evaluate(sites, true)?;
        for (patterns, fresh) in self.cache.patterns.iter_mut().zip(overlay) {
            patterns.extend(fresh);
        }
        for &site in sites {
            self.cache.counted.insert(site);
        }
        Ok(count)
    }

    /// Same count as [`Tree::count_operations`] without committing anything.
    pub fn simulate_operations(&self, sites: &[usize]) -> Result<OperationCount> {
        Ok(self.evaluate(sites, true)?.0)
    }

    /// Cost of `sites` against an empty cache, ignoring what is memoised.
    pub fn simulate_fresh(&self, sites: &[usize]) -> Result<OperationCount> {
        Ok(self.evaluate(sites, false)?.0)
    }

    fn evaluate(
        &self,
        sites: &[usize],
        use_cache: bool,
    ) -> Result<(OperationCount, Vec<HashMap<PatternKey, u32>>)> {
        let mut overlay: Vec<HashMap<PatternKey, u32>> = vec![HashMap::new(); self.nodes.len()];
        if sites.is_empty() {
            return Ok((OperationCount::default(), overlay));
        }
        let num_sites = self.num_sites.ok_or(SchedulerError::NoSequences)?;

        let mut ids = vec![0u32; self.nodes.len()];
        let mut optimized = 0u64;

        for &site in sites {
            if site >= num_sites {
                return Err(SchedulerError::SiteOutOfRange { site, num_sites });
            }
            for &n in &self.postorder {
                let node = &self.nodes[n];
                let own = self.sequences[n].as_ref().map(|seq| u32::from(seq[site]));

                if node.is_leaf() {
                    ids[n] = own.ok_or_else(|| {
                        SchedulerError::MissingSequence(node.name.clone().unwrap_or_default())
                    })?;
                    continue;
                }

                let mut key: PatternKey = Vec::with_capacity(node.children.len() + 1);
                key.extend(node.children.iter().map(|&c| ids[c]));
                // A rerooted tip keeps its own state next to its children.
                key.extend(own);

                let cached = if use_cache {
                    self.cache.patterns[n].get(&key).copied()
                } else {
                    None
                };
                ids[n] = match cached {
                    Some(id) => id,
                    None => {
                        let base = if use_cache { self.cache.patterns[n].len() } else { 0 };
                        let next = (base + overlay[n].len()) as u32;
                        match overlay[n].entry(key) {
                            Entry::Occupied(e) => *e.get(),
                            Entry::Vacant(e) => {
                                optimized += 1;
                                *e.insert(next)
                            }
                        }
                    }
                };
            }
        }

        let count = OperationCount {
            op_maximum: self.internal_node_count() as u64 * sites.len() as u64,
            op_optimized: optimized,
        };
        Ok((count, overlay))
    }

    /// For every counted site, how many other counted sites share its
    /// pattern, summed over all internal nodes.
    ///
    /// Sites with a low count gain little from staying next to the others
    /// and are the cheapest to move. Sites without any sharing map to 0.
    pub fn site_dependency_count(&self) -> Result<BTreeMap<usize, usize>> {
        let sites: Vec<usize> = self.counted_sites().collect();
        if sites.is_empty() {
            return Ok(BTreeMap::new());
        }
        let internal: Vec<NodeId> = self
            .postorder
            .iter()
            .copied()
            .filter(|&n| !self.nodes[n].is_leaf())
            .collect();

        let mut ids = vec![0u32; self.nodes.len()];
        let mut site_patterns: Vec<Vec<u32>> = Vec::with_capacity(sites.len());
        let mut occurrences: HashMap<(NodeId, u32), usize> = HashMap::new();

        for &site in &sites {
            self.cached_ids(site, &mut ids)?;
            let row: Vec<u32> = internal.iter().map(|&n| ids[n]).collect();
            for (&n, &id) in internal.iter().zip(&row) {
                *occurrences.entry((n, id)).or_insert(0) += 1;
            }
            site_patterns.push(row);
        }

        Ok(sites
            .into_iter()
            .zip(site_patterns)
            .map(|(site, row)| {
                let shared = internal
                    .iter()
                    .zip(&row)
                    .map(|(&n, &id)| occurrences[&(n, id)] - 1)
                    .sum();
                (site, shared)
            })
            .collect())
    }

    /// Pattern ids of an already counted site, read from the cache only.
    fn cached_ids(&self, site: usize, ids: &mut [u32]) -> Result<()> {
        for &n in &self.postorder {
            let node = &self.nodes[n];
            let own = self.sequences[n].as_ref().map(|seq| u32::from(seq[site]));
            if node.is_leaf() {
                ids[n] = own.ok_or_else(|| {
                    SchedulerError::MissingSequence(node.name.clone().unwrap_or_default())
                })?;
                continue;
            }
            let mut key: PatternKey = node.children.iter().map(|&c| ids[c]).collect();
            key.extend(own);
            ids[n] = self.cache.patterns[n].get(&key).copied().unwrap_or(u32::MAX);
        }
        Ok(())
    }

    /// Makes `new_root` the root by reversing the parent links on its path
    /// to the current root. Edge lengths travel with their edges; the node
    /// and edge sets are unchanged. Clears the cache.
    pub fn reroot(&mut self, new_root: NodeId) -> Result<()> {
        if new_root >= self.nodes.len() {
            return Err(SchedulerError::UnknownNode(new_root));
        }
        if new_root == self.root {
            return Ok(());
        }

        let mut path = vec![new_root];
        while let Some(parent) = self.nodes[path[path.len() - 1]].parent {
            path.push(parent);
        }

        for i in (0..path.len() - 1).rev() {
            let (child, parent) = (path[i], path[i + 1]);
            self.nodes[parent].children.retain(|&c| c != child);
            self.nodes[child].children.push(parent);
            self.nodes[parent].parent = Some(child);
            self.nodes[parent].parent_edge = self.nodes[child].parent_edge;
        }
        self.nodes[new_root].parent = None;
        self.nodes[new_root].parent_edge = None;

        self.root = new_root;
        self.rebuild_postorder();
        self.clear_cache();
        Ok(())
    }

    /// Roots the tree halfway along the longest tip-to-tip path.
    ///
    /// Missing edge lengths count as 1. A new root node is inserted when
    /// the midpoint falls inside an edge.
    pub fn midpoint_root(&mut self) -> Result<()> {
        let tips: Vec<NodeId> = (0..self.nodes.len())
            .filter(|&n| self.degree(n) <= 1)
            .collect();
        if tips.len() < 2 {
            return Ok(());
        }

        let (from_first, _) = self.distances_from(tips[0]);
        let b = Self::farthest(&tips, &from_first);
        let (from_b, pred) = self.distances_from(b);
        let c = Self::farthest(&tips, &from_b);
        let half = from_b[c] / 2.0;

        // Walk from c back towards b until the midpoint is reached.
        let mut acc = 0.0;
        let mut u = c;
        while let Some(v) = pred[u] {
            let w = self.edge_length(u, v);
            if acc + w + EPSILON >= half {
                let offset = half - acc;
                if offset <= EPSILON {
                    return self.reroot(u);
                }
                if (w - offset).abs() <= EPSILON {
                    return self.reroot(v);
                }
                let mid = self.split_edge(u, v, offset);
                return self.reroot(mid);
            }
            acc += w;
            u = v;
        }
        self.reroot(u)
    }

    fn degree(&self, n: NodeId) -> usize {
        self.nodes[n].children.len() + usize::from(self.nodes[n].parent.is_some())
    }

    fn edge_length(&self, a: NodeId, b: NodeId) -> f64 {
        let child = if self.nodes[a].parent == Some(b) { a } else { b };
        self.nodes[child].parent_edge.unwrap_or(1.0)
    }

    fn neighbours(&self, n: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes[n]
            .children
            .iter()
            .copied()
            .chain(self.nodes[n].parent)
    }

    /// Unrooted path lengths from `start` plus the predecessor towards it.
    fn distances_from(&self, start: NodeId) -> (Vec<f64>, Vec<Option<NodeId>>) {
        let mut dist = vec![f64::NAN; self.nodes.len()];
        let mut pred = vec![None; self.nodes.len()];
        dist[start] = 0.0;
        let mut stack = vec![start];
        while let Some(n) = stack.pop() {
            for m in self.neighbours(n) {
                if dist[m].is_nan() {
                    dist[m] = dist[n] + self.edge_length(n, m);
                    pred[m] = Some(n);
                    stack.push(m);
                }
            }
        }
        (dist, pred)
    }

    fn farthest(tips: &[NodeId], dist: &[f64]) -> NodeId {
        let mut best = tips[0];
        for &t in tips {
            if dist[t] > dist[best] {
                best = t;
            }
        }
        best
    }

    /// Inserts a node on edge `(u, v)` at distance `offset` from `u`.
    fn split_edge(&mut self, u: NodeId, v: NodeId, offset: f64) -> NodeId {
        let w = self.edge_length(u, v);
        let (child, parent, from_child) = if self.nodes[u].parent == Some(v) {
            (u, v, offset)
        } else {
            (v, u, w - offset)
        };

        let mid = self.nodes.len();
        self.nodes.push(Node {
            name: None,
            parent: Some(parent),
            children: vec![child],
            parent_edge: Some(w - from_child),
        });
        self.sequences.push(None);
        if let Some(slot) = self.nodes[parent].children.iter_mut().find(|c| **c == child) {
            *slot = mid;
        }
        self.nodes[child].parent = Some(mid);
        self.nodes[child].parent_edge = Some(from_child);
        mid
    }
}
