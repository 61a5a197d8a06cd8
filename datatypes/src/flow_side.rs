//! Output of the flow-hash canonicalization (C3, §4.2).

use serde::{Deserialize, Serialize};

/// Which argument order the flow-hash canonicalization chose as canonical.
/// `flow_hash` is direction-independent by construction; this marker lets a
/// caller still recover which side was "first" without re-deriving it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlowSideMarker {
    /// The left-hand argument pair was kept as given (or won an IP tiebreak).
    LhsGeRhs,
    /// The right-hand argument pair was canonicalized to the front.
    RhsGtLhs,
}
