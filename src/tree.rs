//! Arena-backed search tree.
//!
//! Nodes live in one `Vec` and refer to each other by [`NodeId`]. A tree
//! belongs to exactly one search call and is dropped as a whole when the
//! search returns, so nodes are never removed individually.

use crate::Move;

/// Index of a node inside its [`SearchTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

impl NodeId {
    /// The root is always the first node allocated.
    pub const ROOT: NodeId = NodeId(0);

    #[inline]
    pub fn index(self) -> usize {
        self.0
    }
}

/// A node of the search tree.
#[derive(Debug, Clone)]
pub struct SearchNode {
    /// Parent node (None for root)
    pub parent: Option<NodeId>,
    /// Move that led here from the parent (None for root)
    pub mv: Option<Move>,
    pub children: Vec<NodeId>,
    pub visits: u32,
    /// Sum of simulation outcomes, each in `[0, 1]`.
    pub reward: f64,
    /// Legal moves not expanded into children yet.
    pub untried: Vec<Move>,
}

impl SearchNode {
    fn new(parent: Option<NodeId>, mv: Option<Move>, untried: Vec<Move>) -> Self {
        SearchNode {
            parent,
            mv,
            children: Vec::new(),
            visits: 0,
            reward: 0.0,
            untried,
        }
    }

    /// Mean reward per visit.
    ///
    /// # Returns
    /// `0.0` when the node has never been visited.
    #[inline]
    pub fn value(&self) -> f64 {
        if self.visits != 0 {
            self.reward / self.visits as f64
        } else {
            0.0
        }
    }

    /// Fully expanded nodes with children are descended through during selection.
    #[inline]
    pub fn is_fully_expanded(&self) -> bool {
        self.untried.is_empty()
    }
}

/// UCB1 priority of a child.
///
/// # Parameters
/// - `reward`, `visits`: the child's accumulated statistics
/// - `parent_visits`: visit count of the child's parent
/// - `exploration`: the exploration constant `C`
///
/// # Returns
/// `f64::INFINITY` for unvisited children.
#[inline]
pub fn ucb1(reward: f64, visits: u32, parent_visits: u32, exploration: f64) -> f64 {
    if visits == 0 {
        return f64::INFINITY;
    }
    let n = visits as f64;
    reward / n + exploration * ((parent_visits as f64).ln() / n).sqrt()
}

/// The search tree.
#[derive(Debug, Clone)]
pub struct SearchTree {
    nodes: Vec<SearchNode>,
}

impl SearchTree {
    /// Creates a tree holding only a root with the given untried moves.
    pub fn new(root_moves: Vec<Move>) -> Self {
        SearchTree {
            nodes: vec![SearchNode::new(None, None, root_moves)],
        }
    }

    #[inline]
    pub fn root(&self) -> NodeId {
        NodeId::ROOT
    }

    #[inline]
    pub fn get(&self, id: NodeId) -> &SearchNode {
        &self.nodes[id.0]
    }

    #[inline]
    pub fn get_mut(&mut self, id: NodeId) -> &mut SearchNode {
        &mut self.nodes[id.0]
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Adds a child reached by `mv` under `parent`.
    ///
    /// # Parameters
    /// - `parent`: the node being expanded
    /// - `mv`: the move leading to the child
    /// - `untried`: the legal moves of the child's state
    ///
    /// # Returns
    /// The id of the new child.
    pub fn add_child(&mut self, parent: NodeId, mv: Move, untried: Vec<Move>) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(SearchNode::new(Some(parent), Some(mv), untried));
        self.nodes[parent.0].children.push(id);
        id
    }

    /// Adds `reward` to every node from `leaf` up to the root.
    ///
    /// The same value is credited at every depth; it is never flipped per ply.
    pub fn backpropagate(&mut self, leaf: NodeId, reward: f64) {
        let mut current = Some(leaf);
        while let Some(id) = current {
            let node = &mut self.nodes[id.0];
            node.visits += 1;
            node.reward += reward;
            current = node.parent;
        }
    }

    /// Child of `id` with the highest UCB1 priority; the first one wins ties.
    pub fn select_child(&self, id: NodeId, exploration: f64) -> Option<NodeId> {
        let node = self.get(id);
        let mut best = None;
        let mut best_score = f64::NEG_INFINITY;
        for &child in &node.children {
            let c = self.get(child);
            let score = ucb1(c.reward, c.visits, node.visits, exploration);
            if best.is_none() || score > best_score {
                best = Some(child);
                best_score = score;
            }
        }
        best
    }

    /// Child of `id` with the highest visit count; the first one wins ties.
    pub fn most_visited_child(&self, id: NodeId) -> Option<NodeId> {
        let mut best: Option<NodeId> = None;
        for &child in &self.get(id).children {
            match best {
                Some(b) if self.get(b).visits >= self.get(child).visits => {}
                _ => best = Some(child),
            }
        }
        best
    }

    /// Up to `n` children of `id` ordered by descending visit count.
    ///
    /// The sort is stable, so equally visited children keep expansion order.
    pub fn top_children(&self, id: NodeId, n: usize) -> Vec<NodeId> {
        let mut children = self.get(id).children.clone();
        children.sort_by(|a, b| self.get(*b).visits.cmp(&self.get(*a).visits));
        children.truncate(n);
        children
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn moves(n: u8) -> Vec<Move> {
        (0..n).map(|c| Move::new(0, c)).collect()
    }

    #[test]
    fn test_root() {
        let tree = SearchTree::new(moves(4));
        let root = tree.get(tree.root());

        assert!(root.parent.is_none());
        assert!(root.mv.is_none());
        assert!(root.children.is_empty());
        assert_eq!(root.untried.len(), 4);
        assert_eq!(root.value(), 0.0);
        assert_eq!(tree.len(), 1);
    }

    #[test]
    fn test_add_child() {
        let mut tree = SearchTree::new(moves(3));
        let root = tree.root();
        let a = tree.add_child(root, Move::new(0, 0), moves(2));
        let b = tree.add_child(root, Move::new(0, 1), Vec::new());
        let aa = tree.add_child(a, Move::new(1, 1), Vec::new());

        assert_eq!(tree.get(root).children, vec![a, b]);
        assert_eq!(tree.get(a).children, vec![aa]);
        assert_eq!(tree.get(aa).parent, Some(a));
        assert_eq!(tree.get(a).parent, Some(root));
        assert_eq!(tree.get(b).mv, Some(Move::new(0, 1)));
        assert_eq!(tree.len(), 4);
    }

    #[test]
    fn test_backpropagate_same_reward_every_depth() {
        let mut tree = SearchTree::new(moves(1));
        let root = tree.root();
        let a = tree.add_child(root, Move::new(0, 0), moves(1));
        let b = tree.add_child(a, Move::new(0, 1), Vec::new());

        tree.backpropagate(b, 1.0);
        tree.backpropagate(a, 0.5);

        assert_eq!(tree.get(root).visits, 2);
        assert_eq!(tree.get(root).reward, 1.5);
        assert_eq!(tree.get(a).visits, 2);
        assert_eq!(tree.get(a).reward, 1.5);
        assert_eq!(tree.get(b).visits, 1);
        assert_eq!(tree.get(b).reward, 1.0);
        assert_eq!(tree.get(a).value(), 0.75);
    }

    #[test]
    fn test_ucb1() {
        assert_eq!(ucb1(0.0, 0, 10, 1.0), f64::INFINITY);
        assert_eq!(ucb1(1.0, 2, 1, 1.0), 0.5);
        let expected = 0.5 + std::f64::consts::SQRT_2 * ((4f64).ln() / 2.0).sqrt();
        assert!((ucb1(1.0, 2, 4, std::f64::consts::SQRT_2) - expected).abs() < 1e-12);
    }

    #[test]
    fn test_select_prefers_unvisited() {
        let mut tree = SearchTree::new(moves(2));
        let root = tree.root();
        let a = tree.add_child(root, Move::new(0, 0), Vec::new());
        let b = tree.add_child(root, Move::new(0, 1), Vec::new());
        tree.backpropagate(a, 1.0);

        assert_eq!(tree.select_child(root, 1.0), Some(b));
    }

    #[test]
    fn test_select_first_on_tie() {
        let mut tree = SearchTree::new(moves(2));
        let root = tree.root();
        let a = tree.add_child(root, Move::new(0, 0), Vec::new());
        let _b = tree.add_child(root, Move::new(0, 1), Vec::new());

        assert_eq!(tree.select_child(root, 1.0), Some(a));
        assert_eq!(tree.select_child(a, 1.0), None);
    }

    #[test]
    fn test_most_visited_and_top_children() {
        let mut tree = SearchTree::new(moves(3));
        let root = tree.root();
        let a = tree.add_child(root, Move::new(0, 0), Vec::new());
        let b = tree.add_child(root, Move::new(0, 1), Vec::new());
        let c = tree.add_child(root, Move::new(0, 2), Vec::new());
        tree.backpropagate(a, 0.0);
        tree.backpropagate(b, 1.0);
        tree.backpropagate(b, 1.0);
        tree.backpropagate(c, 0.0);
        tree.backpropagate(c, 0.0);

        // b and c tie on visits; b was expanded first.
        assert_eq!(tree.most_visited_child(root), Some(b));
        assert_eq!(tree.top_children(root, 2), vec![b, c]);
        assert_eq!(tree.top_children(root, 10), vec![b, c, a]);
        assert_eq!(tree.most_visited_child(a), None);
    }
}
