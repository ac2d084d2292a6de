//! Blocking collectives written once against [`Communicator`].
//!
//! Every function here is a collective: all members of `comm` must call it,
//! in the same order, with the same `root`. Calling one on a process that is
//! not a member of `comm` (or letting members diverge on whether to call) is
//! undefined behavior from the protocol's point of view, typically a hang.
//!
//! Elements are any [`Pod`] type; the element width is the only layout
//! information needed. Results are ordered by ascending contributor rank.
//! The root never messages itself, so every collective works on
//! [`NoComm`](crate::algs::communicator::NoComm).

use crate::algs::communicator::{CommTag, Communicator, Wait};
use crate::algs::wire::{WireCount, cast_slice, cast_slice_mut, decode_vec};
use crate::stats_error::StatsError;
use bytemuck::Pod;
use std::mem::size_of;

/// Header/payload tag pair for gathers toward a root.
pub const GATHER_TAG: CommTag = CommTag(0x5100);
/// Header/payload tag pair for broadcasts from a root.
pub const BCAST_TAG: CommTag = CommTag(0x5200);

fn recv_exact<C: Communicator>(
    comm: &C,
    peer: usize,
    tag: CommTag,
    len: usize,
) -> Result<Vec<u8>, StatsError> {
    let mut buf = vec![0u8; len];
    let data = comm
        .irecv(peer, tag.as_u16(), &mut buf)
        .wait()
        .ok_or(StatsError::CommAborted)?;
    if data.len() != len {
        return Err(StatsError::CommError {
            neighbor: peer,
            source: format!("expected {len} bytes, got {}", data.len()).into(),
        });
    }
    Ok(data)
}

fn recv_count<C: Communicator>(comm: &C, peer: usize, tag: CommTag) -> Result<usize, StatsError> {
    let data = recv_exact(comm, peer, tag, size_of::<WireCount>())?;
    let mut cnt = WireCount::new(0);
    cast_slice_mut(std::slice::from_mut(&mut cnt)).copy_from_slice(&data);
    Ok(cnt.get())
}

fn send_counted<T: Pod, C: Communicator>(comm: &C, peer: usize, tag: CommTag, items: &[T]) {
    let count = WireCount::new(items.len());
    let header = comm.isend(peer, tag.as_u16(), cast_slice(std::slice::from_ref(&count)));
    let payload = comm.isend(peer, tag.offset(1).as_u16(), cast_slice(items));
    let _ = header.wait();
    let _ = payload.wait();
}

fn recv_counted<T: Pod, C: Communicator>(
    comm: &C,
    peer: usize,
    tag: CommTag,
) -> Result<Vec<T>, StatsError> {
    let n = recv_count(comm, peer, tag)?;
    let data = recv_exact(comm, peer, tag.offset(1), n * size_of::<T>())?;
    decode_vec(&data, peer)
}

/// Gather variable-length contributions to `root`.
///
/// Returns `Some(pieces)` on the root, with `pieces[r]` holding rank `r`'s
/// contribution, and `None` elsewhere.
pub fn gather_varcount<T: Pod, C: Communicator>(
    comm: &C,
    root: usize,
    local: &[T],
) -> Result<Option<Vec<Vec<T>>>, StatsError> {
    if comm.rank() != root {
        send_counted(comm, root, GATHER_TAG, local);
        return Ok(None);
    }
    let mut pieces = Vec::with_capacity(comm.size());
    for peer in 0..comm.size() {
        if peer == root {
            pieces.push(local.to_vec());
        } else {
            pieces.push(recv_counted(comm, peer, GATHER_TAG)?);
        }
    }
    Ok(Some(pieces))
}

/// Concatenation of all contributions in rank order on `root`; empty elsewhere.
pub fn gather_concat<T: Pod, C: Communicator>(
    comm: &C,
    root: usize,
    local: &[T],
) -> Result<Vec<T>, StatsError> {
    Ok(gather_varcount(comm, root, local)?
        .map(|pieces| pieces.concat())
        .unwrap_or_default())
}

/// Broadcast a variable-length vector from `root`; `data` is replaced on
/// every other member.
pub fn broadcast_vec<T: Pod, C: Communicator>(
    comm: &C,
    root: usize,
    data: &mut Vec<T>,
) -> Result<(), StatsError> {
    if comm.rank() == root {
        for peer in (0..comm.size()).filter(|&p| p != root) {
            send_counted(comm, peer, BCAST_TAG, data);
        }
    } else {
        *data = recv_counted(comm, root, BCAST_TAG)?;
    }
    Ok(())
}

/// Broadcast a fixed-width buffer from `root` into `value` on every member.
pub fn broadcast<T: Pod, C: Communicator>(
    comm: &C,
    root: usize,
    value: &mut [T],
) -> Result<(), StatsError> {
    let mut buf = value.to_vec();
    broadcast_vec(comm, root, &mut buf)?;
    if buf.len() != value.len() {
        return Err(StatsError::CommError {
            neighbor: root,
            source: format!("broadcast of {} elements into {}", buf.len(), value.len()).into(),
        });
    }
    value.copy_from_slice(&buf);
    Ok(())
}

/// Concatenation of all contributions in rank order, on every member.
pub fn all_gather_concat<T: Pod, C: Communicator>(
    comm: &C,
    local: &[T],
) -> Result<Vec<T>, StatsError> {
    let mut all = gather_concat(comm, 0, local)?;
    broadcast_vec(comm, 0, &mut all)?;
    Ok(all)
}

/// Element-wise reduction of equal-width contributions to `root`, folded in
/// ascending rank order.
pub fn reduce<T, C, F>(
    comm: &C,
    root: usize,
    local: &[T],
    op: F,
) -> Result<Option<Vec<T>>, StatsError>
where
    T: Pod,
    C: Communicator,
    F: Fn(T, T) -> T,
{
    let Some(pieces) = gather_varcount(comm, root, local)? else {
        return Ok(None);
    };
    let mut acc = pieces[0].clone();
    for (peer, piece) in pieces.iter().enumerate().skip(1) {
        if piece.len() != acc.len() {
            return Err(StatsError::CommError {
                neighbor: peer,
                source: format!("reduce width {} differs from {}", piece.len(), acc.len()).into(),
            });
        }
        for (a, &b) in acc.iter_mut().zip(piece) {
            *a = op(*a, b);
        }
    }
    Ok(Some(acc))
}

/// [`reduce`] to rank 0 followed by a broadcast of the result.
pub fn all_reduce<T, C, F>(comm: &C, local: &[T], op: F) -> Result<Vec<T>, StatsError>
where
    T: Pod,
    C: Communicator,
    F: Fn(T, T) -> T,
{
    let mut out = reduce(comm, 0, local, op)?.unwrap_or_else(|| local.to_vec());
    broadcast(comm, 0, &mut out)?;
    Ok(out)
}
