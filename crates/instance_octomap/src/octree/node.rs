//! OcNode - one node of the explicit occupancy octree.
//!
//! A node without children is a leaf. Leaves above the finest depth appear
//! after pruning and stand for their whole block.

/// Child slots of an inner node, indexed by octant.
pub(crate) type Children = [Option<Box<OcNode>>; 8];

/// Occupancy octree node.
#[derive(Clone, Debug, Default)]
pub struct OcNode {
  pub(crate) log_odds: f32,
  pub(crate) children: Option<Box<Children>>,
}

impl OcNode {
  pub(crate) fn new(log_odds: f32) -> Self {
    Self {
      log_odds,
      children: None,
    }
  }

  /// Stored log-odds value. For inner nodes: maximum over children.
  #[inline]
  pub fn log_odds(&self) -> f32 {
    self.log_odds
  }

  /// Occupancy probability of this node.
  #[inline]
  pub fn occupancy(&self) -> f64 {
    super::occupancy::probability(self.log_odds)
  }

  #[inline]
  pub fn has_children(&self) -> bool {
    self.children.is_some()
  }

  #[inline]
  pub(crate) fn child(&self, octant: usize) -> Option<&OcNode> {
    self.children.as_ref()?[octant].as_deref()
  }

  /// Split a pruned leaf into 8 children carrying its value.
  pub(crate) fn expand(&mut self) {
    debug_assert!(self.children.is_none());
    let value = self.log_odds;
    let children: Children = std::array::from_fn(|_| Some(Box::new(OcNode::new(value))));
    self.children = Some(Box::new(children));
  }

  /// Set value to the maximum of existing children.
  pub(crate) fn update_inner_occupancy(&mut self) {
    if let Some(children) = &self.children {
      let max = children
        .iter()
        .flatten()
        .map(|child| child.log_odds)
        .fold(f32::NEG_INFINITY, f32::max);
      if max.is_finite() {
        self.log_odds = max;
      }
    }
  }

  /// True when all 8 children exist, are leaves and share one value.
  pub(crate) fn is_collapsible(&self) -> bool {
    let Some(children) = &self.children else {
      return false;
    };
    let Some(first) = children[0].as_deref() else {
      return false;
    };
    children.iter().all(|child| match child.as_deref() {
      Some(child) => !child.has_children() && child.log_odds == first.log_odds,
      None => false,
    })
  }

  /// Number of nodes in this subtree, including self.
  pub(crate) fn subtree_size(&self) -> usize {
    1 + self
      .children
      .iter()
      .flat_map(|children| children.iter().flatten())
      .map(|child| child.subtree_size())
      .sum::<usize>()
  }
}
