//! Identity types for the pipeline system.
//!
//! `StageId` and `ViewId` are newtypes over `u32` that serve as direct array
//! indices into their storage vectors. `ProxyId` names an object living in
//! the external stage/render backend.

use std::fmt;

/// Index into `StageGraph::stages`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct StageId(pub u32);

impl StageId {
    pub const INVALID: StageId = StageId(u32::MAX);

    #[inline]
    pub fn is_valid(self) -> bool {
        self != Self::INVALID
    }

    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for StageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == Self::INVALID {
            write!(f, "StageId(INVALID)")
        } else {
            write!(f, "StageId({})", self.0)
        }
    }
}

impl fmt::Display for StageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Index into the orchestrator's view list. Also the `-v<index>` image suffix.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ViewId(pub u32);

impl ViewId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for ViewId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ViewId({})", self.0)
    }
}

/// Handle of an object owned by the backend (filter, reader, writer).
///
/// Views attach rendered stages and downstream filters connect their input
/// ports through this handle.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProxyId(pub u64);

impl fmt::Debug for ProxyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ProxyId({})", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_id() {
        let id = StageId(42);
        assert!(id.is_valid());
        assert_eq!(id.index(), 42);
        assert!(!StageId::INVALID.is_valid());
        assert_eq!(format!("{:?}", StageId::INVALID), "StageId(INVALID)");
    }

    #[test]
    fn test_view_id() {
        let id = ViewId(1);
        assert_eq!(id.index(), 1);
        assert_eq!(format!("{:?}", id), "ViewId(1)");
    }
}
