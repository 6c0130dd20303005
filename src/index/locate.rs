//! Translating a range predicate into a bin interval
//!
//! A predicate reads `left_bound left_op x right_op right_bound`, either
//! side optional. Each (side, operator) pair maps to a pair of edges on the
//! integer line; the edges of both sides are intersected and clamped to the
//! bin count. For every integer `v` in `0..bin_count`, `v` satisfies the
//! predicate exactly when `lo <= v < hi`.

use std::fmt;

/// Comparison operator of one side of a range predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareOp {
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
}

impl CompareOp {
    /// Evaluates `a op b`.
    pub fn holds(&self, a: f64, b: f64) -> bool {
        match self {
            CompareOp::Lt => a < b,
            CompareOp::Le => a <= b,
            CompareOp::Gt => a > b,
            CompareOp::Ge => a >= b,
            CompareOp::Eq => a == b,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
            CompareOp::Eq => "==",
        }
    }

    fn slot(&self) -> usize {
        match self {
            CompareOp::Lt => 0,
            CompareOp::Le => 1,
            CompareOp::Gt => 2,
            CompareOp::Ge => 3,
            CompareOp::Eq => 4,
        }
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A one-dimensional range predicate on a column value `x`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RangeDescriptor {
    /// `bound op x`
    pub left: Option<(CompareOp, f64)>,
    /// `x op bound`
    pub right: Option<(CompareOp, f64)>,
}

impl RangeDescriptor {
    /// Matches every value.
    pub fn all() -> Self {
        Self::default()
    }

    /// `x < bound`
    pub fn lt(bound: f64) -> Self {
        Self::right(CompareOp::Lt, bound)
    }

    /// `x <= bound`
    pub fn le(bound: f64) -> Self {
        Self::right(CompareOp::Le, bound)
    }

    /// `x > bound`
    pub fn gt(bound: f64) -> Self {
        Self::right(CompareOp::Gt, bound)
    }

    /// `x >= bound`
    pub fn ge(bound: f64) -> Self {
        Self::right(CompareOp::Ge, bound)
    }

    /// `x == bound`
    pub fn eq(bound: f64) -> Self {
        Self::right(CompareOp::Eq, bound)
    }

    /// `lo lo_op x hi_op hi`, e.g. `between(Le, 5.0, Lt, 12.0)` for `5 <= x < 12`.
    pub fn between(lo_op: CompareOp, lo: f64, hi_op: CompareOp, hi: f64) -> Self {
        Self {
            left: Some((lo_op, lo)),
            right: Some((hi_op, hi)),
        }
    }

    fn right(op: CompareOp, bound: f64) -> Self {
        Self {
            left: None,
            right: Some((op, bound)),
        }
    }

    /// Adds `x op bound` to the predicate.
    pub fn and_right(self, op: CompareOp, bound: f64) -> Self {
        Self {
            right: Some((op, bound)),
            ..self
        }
    }

    /// Adds `bound op x` to the predicate.
    pub fn and_left(self, op: CompareOp, bound: f64) -> Self {
        Self {
            left: Some((op, bound)),
            ..self
        }
    }

    /// Evaluates the predicate for one value.
    pub fn matches(&self, x: f64) -> bool {
        let left = self.left.map_or(true, |(op, b)| op.holds(b, x));
        let right = self.right.map_or(true, |(op, b)| op.holds(x, b));
        left && right
    }
}

impl fmt::Display for RangeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some((op, b)) = self.left {
            write!(f, "{} {} ", b, op)?;
        }
        f.write_str("x")?;
        if let Some((op, b)) = self.right {
            write!(f, " {} {}", op, b)?;
        }
        Ok(())
    }
}

/// Half-open interval of bins `lo..hi`; empty when `lo == hi`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BinRange {
    pub lo: usize,
    pub hi: usize,
}

impl BinRange {
    pub fn is_empty(&self) -> bool {
        self.lo >= self.hi
    }

    pub fn len(&self) -> usize {
        self.hi.saturating_sub(self.lo)
    }
}

/// An interval edge on the integer line.
#[derive(Debug, Clone, Copy)]
enum Edge {
    /// No constraint from this side
    Open,
    /// `ceil(b)`: the first integer `>= b`
    Ceil,
    /// `floor(b) + 1`: the first integer `> b`
    AfterFloor,
}

/// `(lower edge, upper edge)` contributed by one side.
type Edges = (Edge, Edge);

const OPEN: Edges = (Edge::Open, Edge::Open);

/// `bound op x`, indexed by operator slot.
const LEFT: [Edges; 5] = [
    (Edge::AfterFloor, Edge::Open), // b < x
    (Edge::Ceil, Edge::Open),       // b <= x
    (Edge::Open, Edge::Ceil),       // b > x
    (Edge::Open, Edge::AfterFloor), // b >= x
    (Edge::Ceil, Edge::AfterFloor), // b == x
];

/// `x op bound`, indexed by operator slot.
const RIGHT: [Edges; 5] = [
    (Edge::Open, Edge::Ceil),       // x < b
    (Edge::Open, Edge::AfterFloor), // x <= b
    (Edge::AfterFloor, Edge::Open), // x > b
    (Edge::Ceil, Edge::Open),       // x >= b
    (Edge::Ceil, Edge::AfterFloor), // x == b
];

/// Resolves an edge for bound `b`, clamped to `0..=bin_count`.
fn resolve(edge: Edge, b: f64, open: usize, bin_count: usize) -> usize {
    let v = match edge {
        Edge::Open => return open,
        Edge::Ceil => b.ceil(),
        Edge::AfterFloor => b.floor() + 1.0,
    };
    if v <= 0.0 {
        0
    } else if v >= bin_count as f64 {
        bin_count
    } else {
        v as usize
    }
}

/// Bins whose values satisfy `d`, for an index of `bin_count` bins.
pub fn locate(d: &RangeDescriptor, bin_count: usize) -> BinRange {
    let sides = [
        d.left.map(|(op, b)| (LEFT[op.slot()], b)),
        d.right.map(|(op, b)| (RIGHT[op.slot()], b)),
    ];

    let mut lo = 0;
    let mut hi = bin_count;
    for (edges, b) in sides.iter().map(|s| s.unwrap_or((OPEN, 0.0))) {
        if b.is_nan() {
            return BinRange { lo: 0, hi: 0 };
        }
        lo = lo.max(resolve(edges.0, b, 0, bin_count));
        hi = hi.min(resolve(edges.1, b, bin_count, bin_count));
    }
    if hi < lo {
        hi = lo;
    }
    BinRange { lo, hi }
}
