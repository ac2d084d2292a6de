//! Thin façade over intra-process (threads) or inter-process (MPI) message passing.
//!
//! Messages are *contiguous byte slices* (no zero-copy guarantees).
//! Send handles complete eagerly; receive handles block in `.wait()` until
//! the matching message has arrived. Messages between one `(src, dst, tag)`
//! triple are delivered in FIFO order on every backend.
//!
//! Every member of a communicator must take part in each collective built on
//! top of this layer. A rank that skips a call leaves its peers blocked; the
//! in-process backend turns a *panicking* rank into [`StatsError::CommAborted`]
//! on its peers, but a rank that silently diverges still hangs them.

use crate::algs::collective;
use crate::stats_error::StatsError;
use bytes::Bytes;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

/// Typed message tag.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct CommTag(pub u16);

impl CommTag {
    pub const fn new(tag: u16) -> Self {
        Self(tag)
    }
    pub const fn as_u16(self) -> u16 {
        self.0
    }
    /// Companion tag `k` slots above this one (payload after header, ...).
    pub const fn offset(self, k: u16) -> Self {
        Self(self.0.wrapping_add(k))
    }
}

/// Point-to-point communication interface (minimal by design).
///
/// Collectives live in [`crate::algs::collective`] and are written once
/// against this trait.
pub trait Communicator: Sized {
    /// Handle returned by `isend`.
    type SendHandle: Wait;
    /// Handle returned by `irecv`.
    type RecvHandle: Wait;

    /// Rank of the calling process within this communicator.
    fn rank(&self) -> usize;
    /// Number of members.
    fn size(&self) -> usize;

    fn isend(&self, peer: usize, tag: u16, buf: &[u8]) -> Self::SendHandle;
    /// Receive at most `buf.len()` bytes from `peer`; longer messages are truncated.
    fn irecv(&self, peer: usize, tag: u16, buf: &mut [u8]) -> Self::RecvHandle;

    /// Block until a message with `tag` is pending from any source and return
    /// that source's rank. Safe only when at most one sender can use `tag`.
    fn probe_any(&self, tag: u16) -> Result<usize, StatsError>;

    /// Collective split: members passing `true` form a new communicator ordered
    /// by their rank here; members passing `false` get `None`.
    fn split(&self, active: bool) -> Result<Option<Self>, StatsError>;
}

/// Anything that can be waited on.
pub trait Wait {
    /// Wait for completion and return the received data (if any).
    fn wait(self) -> Option<Vec<u8>>;
}

impl Wait for () {
    fn wait(self) -> Option<Vec<u8>> {
        None
    }
}

/// Compile-time no-op comm for single-process runs.
///
/// Collectives never message self, so every collective degenerates to a local
/// copy on `NoComm`.
#[derive(Clone, Debug, Default)]
pub struct NoComm;

impl Communicator for NoComm {
    type SendHandle = ();
    type RecvHandle = ();

    fn rank(&self) -> usize {
        0
    }
    fn size(&self) -> usize {
        1
    }
    fn isend(&self, _peer: usize, _tag: u16, _buf: &[u8]) {}
    fn irecv(&self, _peer: usize, _tag: u16, _buf: &mut [u8]) {}

    fn probe_any(&self, tag: u16) -> Result<usize, StatsError> {
        Err(StatsError::CommError {
            neighbor: 0,
            source: format!("probe on tag {tag} can never be satisfied on a single rank").into(),
        })
    }

    fn split(&self, active: bool) -> Result<Option<Self>, StatsError> {
        Ok(active.then_some(NoComm))
    }
}

// --- LocalComm: intra-process, one thread per rank ---

type Key = (u64, usize, usize, u16); // (context, src, dst, tag)

const NO_RANK: usize = usize::MAX;

#[derive(Default)]
struct Mailbox {
    queues: DashMap<Key, VecDeque<Bytes>>,
    aborted: AtomicBool,
    first_failure: AtomicUsize,
    /// (parent context, split sequence) -> child context
    contexts: Mutex<HashMap<(u64, u64), u64>>,
    next_context: AtomicU64,
}

impl Mailbox {
    fn new() -> Self {
        Self {
            first_failure: AtomicUsize::new(NO_RANK),
            next_context: AtomicU64::new(1),
            ..Default::default()
        }
    }

    fn push(&self, key: Key, data: Bytes) {
        self.queues.entry(key).or_default().push_back(data);
    }

    fn pop(&self, key: &Key) -> Option<Bytes> {
        self.queues.get_mut(key).and_then(|mut q| q.pop_front())
    }

    fn pending_source(&self, context: u64, dst: usize, tag: u16) -> Option<usize> {
        self.queues
            .iter()
            .filter(|e| {
                let (ctx, _, d, t) = *e.key();
                ctx == context && d == dst && t == tag && !e.value().is_empty()
            })
            .map(|e| e.key().1)
            .min()
    }

    fn child_context(&self, parent: u64, seq: u64) -> u64 {
        let mut map = self.contexts.lock();
        *map.entry((parent, seq))
            .or_insert_with(|| self.next_context.fetch_add(1, Ordering::Relaxed))
    }

    fn abort(&self, rank: usize) {
        let _ = self.first_failure.compare_exchange(
            NO_RANK,
            rank,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
        self.aborted.store(true, Ordering::Release);
    }

    fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::Acquire)
    }
}

/// Receive handle of [`LocalComm`]; blocks in `wait`.
pub struct LocalHandle {
    mailbox: Arc<Mailbox>,
    key: Key,
    len: usize,
}

impl Wait for LocalHandle {
    fn wait(self) -> Option<Vec<u8>> {
        loop {
            if let Some(bytes) = self.mailbox.pop(&self.key) {
                let n = bytes.len().min(self.len);
                return Some(bytes[..n].to_vec());
            }
            if self.mailbox.is_aborted() {
                return None;
            }
            std::thread::yield_now();
        }
    }
}

/// In-process communicator: every rank is a thread sharing one mailbox.
#[derive(Clone)]
pub struct LocalComm {
    mailbox: Arc<Mailbox>,
    context: u64,
    rank: usize,
    size: usize,
    splits: Arc<AtomicU64>,
}

impl std::fmt::Debug for LocalComm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalComm")
            .field("context", &self.context)
            .field("rank", &self.rank)
            .field("size", &self.size)
            .finish()
    }
}

impl Communicator for LocalComm {
    type SendHandle = ();
    type RecvHandle = LocalHandle;

    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }

    fn isend(&self, peer: usize, tag: u16, buf: &[u8]) {
        let key = (self.context, self.rank, peer, tag);
        self.mailbox.push(key, Bytes::copy_from_slice(buf));
    }

    fn irecv(&self, peer: usize, tag: u16, buf: &mut [u8]) -> LocalHandle {
        LocalHandle {
            mailbox: self.mailbox.clone(),
            key: (self.context, peer, self.rank, tag),
            len: buf.len(),
        }
    }

    fn probe_any(&self, tag: u16) -> Result<usize, StatsError> {
        loop {
            if let Some(src) = self.mailbox.pending_source(self.context, self.rank, tag) {
                return Ok(src);
            }
            if self.mailbox.is_aborted() {
                return Err(StatsError::CommAborted);
            }
            std::thread::yield_now();
        }
    }

    fn split(&self, active: bool) -> Result<Option<Self>, StatsError> {
        let flags = collective::all_gather_concat(self, &[u8::from(active)])?;
        let seq = self.splits.fetch_add(1, Ordering::Relaxed);
        if !active {
            return Ok(None);
        }
        let rank = flags[..self.rank].iter().filter(|&&f| f != 0).count();
        let size = flags.iter().filter(|&&f| f != 0).count();
        Ok(Some(LocalComm {
            mailbox: self.mailbox.clone(),
            context: self.mailbox.child_context(self.context, seq),
            rank,
            size,
            splits: Arc::new(AtomicU64::new(0)),
        }))
    }
}

/// A fixed-size in-process process mesh.
pub struct LocalUniverse {
    mailbox: Arc<Mailbox>,
    size: usize,
}

struct AbortOnPanic {
    mailbox: Arc<Mailbox>,
    rank: usize,
}

impl Drop for AbortOnPanic {
    fn drop(&mut self) {
        if std::thread::panicking() {
            self.mailbox.abort(self.rank);
        }
    }
}

impl LocalUniverse {
    pub fn new(size: usize) -> Self {
        assert!(size > 0, "a process mesh needs at least one rank");
        Self {
            mailbox: Arc::new(Mailbox::new()),
            size,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// World communicator handle for `rank`. Take exactly one per rank.
    pub fn world(&self, rank: usize) -> LocalComm {
        assert!(rank < self.size, "rank {rank} out of range 0..{}", self.size);
        LocalComm {
            mailbox: self.mailbox.clone(),
            context: 0,
            rank,
            size: self.size,
            splits: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Run `f` on `size` ranks, one thread each, and return the per-rank
    /// results in rank order. If any rank panics, the panic of the first
    /// failing rank is resumed on the caller.
    pub fn run<R, F>(size: usize, f: F) -> Vec<R>
    where
        F: Fn(LocalComm) -> R + Sync,
        R: Send,
    {
        let universe = LocalUniverse::new(size);
        let f = &f;
        let joined: Vec<std::thread::Result<R>> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..size)
                .map(|rank| {
                    let comm = universe.world(rank);
                    let guard = AbortOnPanic {
                        mailbox: universe.mailbox.clone(),
                        rank,
                    };
                    scope.spawn(move || {
                        let _guard = guard;
                        f(comm)
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join()).collect()
        });

        let first = universe.mailbox.first_failure.load(Ordering::Acquire);
        let mut out = Vec::with_capacity(size);
        let mut panics = Vec::new();
        for (rank, res) in joined.into_iter().enumerate() {
            match res {
                Ok(v) => out.push(v),
                Err(payload) => panics.push((rank, payload)),
            }
        }
        if !panics.is_empty() {
            let idx = panics.iter().position(|(r, _)| *r == first).unwrap_or(0);
            let (_, payload) = panics.swap_remove(idx);
            std::panic::resume_unwind(payload);
        }
        out
    }
}

// --- MPI backend (feature = "mpi-support") ---
#[cfg(feature = "mpi-support")]
mod mpi_backend {
    use super::*;
    use mpi::environment::Universe;
    use mpi::topology::{Color, Communicator as MpiCommunicator, SimpleCommunicator};
    use mpi::traits::{Destination, Source};
    use std::rc::Rc;

    /// MPI communicator. Receives complete inside `irecv`; the collectives in
    /// this crate never post a receive that depends on a later local send.
    pub struct MpiComm {
        comm: SimpleCommunicator,
        rank: usize,
        size: usize,
        _universe: Rc<Universe>,
    }

    /// Receive handle already holding its payload.
    pub struct MpiRecv(Option<Vec<u8>>);

    impl Wait for MpiRecv {
        fn wait(self) -> Option<Vec<u8>> {
            self.0
        }
    }

    impl MpiComm {
        /// Initialize MPI and return the world communicator.
        pub fn new() -> Result<Self, StatsError> {
            let universe = mpi::initialize()
                .ok_or_else(|| StatsError::Config("MPI initialization failed".into()))?;
            let comm = universe.world();
            let rank = comm.rank() as usize;
            let size = comm.size() as usize;
            Ok(Self {
                comm,
                rank,
                size,
                _universe: Rc::new(universe),
            })
        }
    }

    impl Communicator for MpiComm {
        type SendHandle = ();
        type RecvHandle = MpiRecv;

        fn rank(&self) -> usize {
            self.rank
        }

        fn size(&self) -> usize {
            self.size
        }

        fn isend(&self, peer: usize, tag: u16, buf: &[u8]) {
            self.comm
                .process_at_rank(peer as i32)
                .send_with_tag(buf, i32::from(tag));
        }

        fn irecv(&self, peer: usize, tag: u16, buf: &mut [u8]) -> MpiRecv {
            let (mut data, _status) = self
                .comm
                .process_at_rank(peer as i32)
                .receive_vec_with_tag::<u8>(i32::from(tag));
            data.truncate(buf.len());
            MpiRecv(Some(data))
        }

        fn probe_any(&self, tag: u16) -> Result<usize, StatsError> {
            let status = self.comm.any_process().probe_with_tag(i32::from(tag));
            Ok(status.source_rank() as usize)
        }

        fn split(&self, active: bool) -> Result<Option<Self>, StatsError> {
            let color = if active {
                Color::with_value(0)
            } else {
                Color::undefined()
            };
            Ok(self.comm.split_by_color(color).map(|comm| {
                let rank = comm.rank() as usize;
                let size = comm.size() as usize;
                MpiComm {
                    comm,
                    rank,
                    size,
                    _universe: self._universe.clone(),
                }
            }))
        }
    }
}

#[cfg(feature = "mpi-support")]
pub use mpi_backend::MpiComm;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_roundtrip_two_ranks() {
        let universe = LocalUniverse::new(2);
        let comm0 = universe.world(0);
        let comm1 = universe.world(1);

        let mut recv_buf = [0u8; 4];
        let recv_handle = comm1.irecv(0, 7, &mut recv_buf);
        comm0.isend(1, 7, &[1, 2, 3, 4]);

        let data = recv_handle
            .wait()
            .expect("Expected to receive data from rank 0");
        recv_buf.copy_from_slice(&data);
        assert_eq!(&recv_buf, &[1, 2, 3, 4]);
    }

    #[test]
    fn local_fifo_and_truncation() {
        let universe = LocalUniverse::new(2);
        let (c0, c1) = (universe.world(0), universe.world(1));
        for i in 0..5u8 {
            c0.isend(1, 3, &[i, i, i]);
        }
        let mut got = Vec::new();
        for _ in 0..5 {
            let mut b = [0u8; 2];
            got.push(c1.irecv(0, 3, &mut b).wait().unwrap());
        }
        assert_eq!(got[4], vec![4, 4]);
        assert_eq!(got.iter().map(|v| v[0]).collect::<Vec<_>>(), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn probe_reports_the_single_sender() {
        let universe = LocalUniverse::new(3);
        let (c0, c2) = (universe.world(0), universe.world(2));
        c2.isend(0, 11, &[9]);
        assert_eq!(c0.probe_any(11).unwrap(), 2);
    }

    #[test]
    fn split_ranks_follow_parent_order() {
        let out = LocalUniverse::run(4, |world| {
            let sub = world.split(world.rank() % 2 == 1).unwrap();
            sub.map(|c| (c.rank(), c.size()))
        });
        assert_eq!(out, vec![None, Some((0, 2)), None, Some((1, 2))]);
    }

    #[test]
    fn no_comm_split_follows_flag() {
        assert!(NoComm.split(true).unwrap().is_some());
        assert!(NoComm.split(false).unwrap().is_none());
        assert!(NoComm.probe_any(1).is_err());
    }
}
