use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Handle to a node inside a [`Trie`]. Only meaningful for the trie that issued it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// How word scores are propagated up to interior nodes by [`Trie::smear`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SmearMode {
    #[default]
    None,
    Max,
    Logadd,
}

#[derive(Debug, Clone, Default)]
struct TrieNode {
    children: HashMap<usize, NodeId>,
    labels: Vec<usize>,
    scores: Vec<f32>,
    max_score: f32,
}

/// Prefix tree over token ids. Nodes that complete a word carry one or more
/// word labels (homophones and spelling variants share a node).
#[derive(Debug, Clone)]
pub struct Trie {
    nodes: Vec<TrieNode>,
    max_labels: usize,
}

impl Default for Trie {
    fn default() -> Self {
        Self::new()
    }
}

impl Trie {
    pub fn new() -> Self {
        Self {
            nodes: vec![TrieNode::default()],
            max_labels: 0,
        }
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.len() == 1
    }

    /// Largest number of labels stored on a single node.
    pub fn max_labels(&self) -> usize {
        self.max_labels
    }

    /// Inserts `spelling` and attaches `label` with its unigram `score` to the final node.
    pub fn insert(&mut self, spelling: &[usize], label: usize, score: f32) -> NodeId {
        let mut node = self.root();
        for &token in spelling {
            node = match self.nodes[node.0].children.get(&token) {
                Some(&next) => next,
                None => {
                    let next = NodeId(self.nodes.len());
                    self.nodes.push(TrieNode::default());
                    self.nodes[node.0].children.insert(token, next);
                    next
                }
            };
        }

        let entry = &mut self.nodes[node.0];
        entry.labels.push(label);
        entry.scores.push(score);
        self.max_labels = self.max_labels.max(entry.labels.len());
        node
    }

    pub fn search(&self, spelling: &[usize]) -> Option<NodeId> {
        spelling
            .iter()
            .try_fold(self.root(), |node, &token| self.child(node, token))
    }

    pub fn child(&self, node: NodeId, token: usize) -> Option<NodeId> {
        self.nodes.get(node.0)?.children.get(&token).copied()
    }

    pub fn has_children(&self, node: NodeId) -> bool {
        self.nodes
            .get(node.0)
            .is_some_and(|n| !n.children.is_empty())
    }

    pub fn labels(&self, node: NodeId) -> &[usize] {
        self.nodes
            .get(node.0)
            .map(|n| n.labels.as_slice())
            .unwrap_or_default()
    }

    pub fn max_score(&self, node: NodeId) -> f32 {
        self.nodes.get(node.0).map(|n| n.max_score).unwrap_or(0.0)
    }

    /// Recomputes every node's look-ahead score from the word scores beneath it.
    pub fn smear(&mut self, mode: SmearMode) {
        if mode == SmearMode::None {
            for node in &mut self.nodes {
                node.max_score = 0.0;
            }
            return;
        }

        // Children are always pushed after their parent, so a reverse sweep
        // visits every child before the node that owns it.
        for idx in (0..self.nodes.len()).rev() {
            let mut acc = f32::NEG_INFINITY;
            for &score in &self.nodes[idx].scores {
                acc = combine(acc, score, mode);
            }
            for child in self.nodes[idx].children.values() {
                acc = combine(acc, self.nodes[child.0].max_score, mode);
            }
            self.nodes[idx].max_score = acc;
        }
        log::debug!("Smeared trie with {} nodes ({:?})", self.nodes.len(), mode);
    }
}

fn combine(acc: f32, score: f32, mode: SmearMode) -> f32 {
    match mode {
        SmearMode::Logadd => log_add(acc, score),
        SmearMode::Max | SmearMode::None => acc.max(score),
    }
}

fn log_add(a: f32, b: f32) -> f32 {
    let (hi, lo) = if a >= b { (a, b) } else { (b, a) };
    if lo == f32::NEG_INFINITY {
        return hi;
    }
    hi + (lo - hi).exp().ln_1p()
}
