//! Slab geometry: four clip planes carving two stacked bands out of the volume.
//!
//! ```text
//!   origin + 2·pitch·ŷ  ── P4 (-n) ──┐
//!                                    │ slab B
//!   origin +   pitch·ŷ  ── P3 (+n) ──┤
//!                       ── P2 (-n) ──┐
//!                                    │ slab A
//!   origin              ── P1 (+n) ──┘
//! ```
//!
//! Each slab is bounded by two planes with opposite normals, so the
//! intersection of their half-spaces is a finite band. The computation is a
//! pure function of `(origin, normal, pitch)`.

use crate::pipeline::error::{PipelineError, PipelineResult};
use crate::types::{add_scaled, negate, Vec3};

/// Stacking axis of the slabs ("vertical").
pub const STACK_AXIS: Vec3 = [0.0, 1.0, 0.0];

/// One clip plane as `(origin, normal)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClipPlane {
    pub origin: Vec3,
    pub normal: Vec3,
}

impl ClipPlane {
    pub fn new(origin: Vec3, normal: Vec3) -> Self {
        Self { origin, normal }
    }
}

/// The four planes of the two stacked slabs, in clip-stage order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SlabPlanes {
    pub p1: ClipPlane,
    pub p2: ClipPlane,
    pub p3: ClipPlane,
    pub p4: ClipPlane,
}

impl SlabPlanes {
    /// Planes in the order they are pushed to Clip1..Clip4.
    pub fn as_array(&self) -> [ClipPlane; 4] {
        [self.p1, self.p2, self.p3, self.p4]
    }

    /// Bounding planes of slab A (Clip1, Clip2).
    pub fn slab_a(&self) -> (ClipPlane, ClipPlane) {
        (self.p1, self.p2)
    }

    /// Bounding planes of slab B (Clip3, Clip4).
    pub fn slab_b(&self) -> (ClipPlane, ClipPlane) {
        (self.p3, self.p4)
    }
}

/// Derives the four slab planes from one user plane and a pitch.
pub struct SlabGeometryComputer;

impl SlabGeometryComputer {
    /// Compute the slab planes.
    ///
    /// `pitch` is the thickness of each slab along [`STACK_AXIS`] and must be
    /// finite and strictly positive.
    pub fn compute(origin: Vec3, normal: Vec3, pitch: f64) -> PipelineResult<SlabPlanes> {
        if !pitch.is_finite() || pitch <= 0.0 {
            return Err(PipelineError::InvalidPitch(pitch));
        }

        let flipped = negate(normal);
        let mid = add_scaled(origin, pitch, STACK_AXIS);
        let top = add_scaled(origin, 2.0 * pitch, STACK_AXIS);

        Ok(SlabPlanes {
            p1: ClipPlane::new(origin, normal),
            p2: ClipPlane::new(mid, flipped),
            p3: ClipPlane::new(mid, normal),
            p4: ClipPlane::new(top, flipped),
        })
    }
}
