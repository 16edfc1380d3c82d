//! Collective MIN/MAX reduction of per-partition scalars to the root partition.
//!
//! Every partition must issue the same reductions in the same order each
//! step; a partition that skips one leaves the others blocked forever. The
//! core does not detect this.

use crate::pipeline::error::{PipelineError, PipelineResult};
use crate::types::{Bounds, ScalarRange};
use crossbeam_channel::{bounded, Receiver, Sender};

/// Rank that receives every reduction result.
pub const ROOT_RANK: usize = 0;

/// Element-wise combination operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReduceOp {
    Min,
    Max,
}

impl ReduceOp {
    #[inline]
    pub fn combine(&self, a: f64, b: f64) -> f64 {
        match self {
            ReduceOp::Min => a.min(b),
            ReduceOp::Max => a.max(b),
        }
    }
}

/// Transport for collective reductions.
pub trait Communicator: Send {
    fn rank(&self) -> usize;
    fn size(&self) -> usize;

    fn is_root(&self) -> bool {
        self.rank() == ROOT_RANK
    }

    /// Combine `values` element-wise across all partitions. Blocks every
    /// partition until the collective completes; only the root receives the
    /// result, on other ranks `values` is left untouched.
    fn reduce(&mut self, values: &mut [f64], op: ReduceOp) -> PipelineResult<()>;
}

/// A run with a single partition. Reductions are the identity.
#[derive(Debug, Default, Clone, Copy)]
pub struct SingleProcess;

impl Communicator for SingleProcess {
    fn rank(&self) -> usize {
        ROOT_RANK
    }

    fn size(&self) -> usize {
        1
    }

    fn reduce(&mut self, _values: &mut [f64], _op: ReduceOp) -> PipelineResult<()> {
        Ok(())
    }
}

type Contribution = Vec<f64>;

/// Link of one non-root rank to the root.
struct RootLink {
    to_root: Sender<Contribution>,
    done: Receiver<()>,
}

/// Root side of the link to one non-root rank.
struct RankLink {
    inbox: Receiver<Contribution>,
    done: Sender<()>,
}

/// One partition of an in-process group, each running on its own thread.
///
/// Every non-root rank has a dedicated channel pair with the root, so
/// consecutive reductions from one rank are matched in order. A non-root
/// rank returns from [`Communicator::reduce`] only once the root has
/// collected every contribution of that collective.
pub struct ThreadCommunicator {
    rank: usize,
    size: usize,
    root: Option<RootLink>,
    /// Root only: one link per non-root rank, in rank order.
    ranks: Vec<RankLink>,
}

impl ThreadCommunicator {
    /// Create the communicators of a group of `size` partitions.
    pub fn group(size: usize) -> Vec<ThreadCommunicator> {
        let size = size.max(1);
        let mut ranks = Vec::with_capacity(size - 1);
        let mut others = Vec::with_capacity(size - 1);
        for rank in 1..size {
            let (to_root, inbox) = bounded(1);
            let (done_tx, done_rx) = bounded(1);
            ranks.push(RankLink {
                inbox,
                done: done_tx,
            });
            others.push(ThreadCommunicator {
                rank,
                size,
                root: Some(RootLink {
                    to_root,
                    done: done_rx,
                }),
                ranks: Vec::new(),
            });
        }

        let mut group = Vec::with_capacity(size);
        group.push(ThreadCommunicator {
            rank: ROOT_RANK,
            size,
            root: None,
            ranks,
        });
        group.extend(others);
        group
    }
}

impl Communicator for ThreadCommunicator {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }

    fn reduce(&mut self, values: &mut [f64], op: ReduceOp) -> PipelineResult<()> {
        if let Some(root) = &self.root {
            root.to_root
                .send(values.to_vec())
                .map_err(|_| PipelineError::ChannelSend)?;
            return root.done.recv().map_err(|_| PipelineError::ChannelRecv);
        }

        let mut contributions = Vec::with_capacity(self.ranks.len());
        for link in &self.ranks {
            contributions.push(link.inbox.recv().map_err(|_| PipelineError::ChannelRecv)?);
        }
        // Every rank is released before contributions are checked
        for link in &self.ranks {
            link.done.send(()).map_err(|_| PipelineError::ChannelSend)?;
        }

        for (rank, remote) in contributions.into_iter().enumerate().map(|(i, r)| (i + 1, r)) {
            if remote.len() != values.len() {
                return Err(PipelineError::Collective(format!(
                    "rank {} contributed {} values, root has {}",
                    rank,
                    remote.len(),
                    values.len()
                )));
            }
            for (local, r) in values.iter_mut().zip(remote) {
                *local = op.combine(*local, r);
            }
        }
        Ok(())
    }
}

/// Reduces diagnostics through a [`Communicator`].
pub struct DistributedReducer {
    comm: Box<dyn Communicator>,
    calls: u64,
}

impl DistributedReducer {
    pub fn new(comm: Box<dyn Communicator>) -> Self {
        Self { comm, calls: 0 }
    }

    pub fn rank(&self) -> usize {
        self.comm.rank()
    }

    pub fn size(&self) -> usize {
        self.comm.size()
    }

    pub fn is_root(&self) -> bool {
        self.comm.is_root()
    }

    /// Number of collective calls issued so far.
    pub fn calls(&self) -> u64 {
        self.calls
    }

    pub fn reduce(&mut self, values: &mut [f64], op: ReduceOp) -> PipelineResult<()> {
        self.calls += 1;
        self.comm.reduce(values, op)
    }

    /// Global bounding box: MIN over lower corners, then MAX over upper ones.
    pub fn reduce_bounds(&mut self, local: Bounds) -> PipelineResult<Bounds> {
        let mut mins = local.mins();
        let mut maxs = local.maxs();
        self.reduce(&mut mins, ReduceOp::Min)?;
        self.reduce(&mut maxs, ReduceOp::Max)?;
        Ok(Bounds::from_corners(mins, maxs))
    }

    /// Global scalar range: MIN over lows, then MAX over highs.
    pub fn reduce_range(&mut self, local: ScalarRange) -> PipelineResult<ScalarRange> {
        let mut low = [local.low];
        let mut high = [local.high];
        self.reduce(&mut low, ReduceOp::Min)?;
        self.reduce(&mut high, ReduceOp::Max)?;
        Ok(ScalarRange::new(low[0], high[0]))
    }
}
