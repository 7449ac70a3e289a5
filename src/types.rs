//! Core identifiers and the liveness-predicate abstraction consumed by the
//! builder and searcher.

use std::fmt;

/// A dense, non-negative integer ordinal identifying one indexed vector.
///
/// Assigned by the caller of [`crate::builder::GraphIndexBuilder::add_node`]
/// and stable for the lifetime of the graph. Wrapping a bare `u32` in a
/// newtype keeps node ids from being accidentally mixed up with vector
/// dimensions, capacities, or other `usize`/`u32` counters scattered
/// through the builder and searcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
pub struct NodeId(pub u32);

impl NodeId {
    #[inline]
    pub fn as_usize(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for NodeId {
    fn from(v: u32) -> Self {
        NodeId(v)
    }
}

impl From<NodeId> for u32 {
    fn from(v: NodeId) -> Self {
        v.0
    }
}

impl From<usize> for NodeId {
    fn from(v: usize) -> Self {
        NodeId(v as u32)
    }
}

/// Similarity of two vectors; higher is always more similar regardless of
/// the underlying metric (callers translate raw distances into this
/// convention before they reach the core — see `distance::heap_score`).
pub type Score = f32;

/// The graph-wide search entry point: a node together with the topmost
/// layer it participates in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeAtLevel {
    pub node: NodeId,
    pub level: u16,
}

/// A live/accept predicate over node ids.
///
/// Consumed by the searcher (intersected with the graph's own deletion
/// bitset) and by the builder's deletion/reconnection passes. Unlike an
/// `Option<&dyn Bits>`, every API that needs a predicate takes `&dyn Bits`
/// directly — there is no nil sentinel to reject at the boundary, because
/// the type itself can't be absent. Use [`AcceptAll`] where the original
/// algorithm would have passed a null/always-true predicate.
pub trait Bits: Send + Sync {
    fn get(&self, id: NodeId) -> bool;

    /// Combine with another predicate: a node passes only if it passes
    /// both. Used to intersect a caller's accept predicate with the
    /// graph's liveness predicate at the start of a search.
    fn and<'a>(&'a self, other: &'a dyn Bits) -> AndBits<'a>
    where
        Self: Sized,
    {
        AndBits { a: self, b: other }
    }
}

/// Sentinel predicate that accepts every node.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAll;

impl Bits for AcceptAll {
    #[inline]
    fn get(&self, _id: NodeId) -> bool {
        true
    }
}

/// Sentinel predicate that rejects every node.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptNone;

impl Bits for AcceptNone {
    #[inline]
    fn get(&self, _id: NodeId) -> bool {
        false
    }
}

/// Combinator produced by [`Bits::and`].
pub struct AndBits<'a> {
    a: &'a dyn Bits,
    b: &'a dyn Bits,
}

impl<'a> Bits for AndBits<'a> {
    #[inline]
    fn get(&self, id: NodeId) -> bool {
        self.a.get(id) && self.b.get(id)
    }
}

impl Bits for Box<dyn Bits> {
    #[inline]
    fn get(&self, id: NodeId) -> bool {
        self.as_ref().get(id)
    }
}
