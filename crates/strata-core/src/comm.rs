//! Distributed-execution contract.
//!
//! The core never talks to a message-passing library directly. It needs a
//! process rank, the number of processes, a barrier, and a logical-AND
//! vote used to abort collective operations when any rank fails. That is
//! the whole [`Communicator`] surface.
//!
//! Two implementations ship with the crate:
//!
//! - [`SingleProcess`]: the serial case (rank 0 of 1).
//! - [`ThreadGroup`]: N ranks emulated on threads over crossbeam channels,
//!   used by tests and local multi-rank runs.

use std::cell::{Cell, RefCell};

use crossbeam_channel::{unbounded, Receiver, Sender};

use crate::id::Rank;

/// Process rank, size, and collective synchronisation.
pub trait Communicator {
    /// Rank of the calling process.
    fn rank(&self) -> Rank;

    /// Number of processes in the run.
    fn size(&self) -> usize;

    /// Collective logical AND: returns `true` only if every rank voted
    /// `true`. Every rank must call it the same number of times.
    fn all_agree(&self, ok: bool) -> bool;

    /// Block until every rank has reached the barrier.
    fn barrier(&self) {
        let _ = self.all_agree(true);
    }
}

/// Serial communicator: rank 0 of a single process.
#[derive(Clone, Copy, Debug, Default)]
pub struct SingleProcess;

impl Communicator for SingleProcess {
    fn rank(&self) -> Rank {
        Rank::ROOT
    }

    fn size(&self) -> usize {
        1
    }

    fn all_agree(&self, ok: bool) -> bool {
        ok
    }
}

#[derive(Clone, Copy, Debug)]
enum Message {
    Vote { from: usize, round: u64, ok: bool },
    /// Sent when a handle is dropped, after `rounds` completed collectives.
    Left { from: usize, rounds: u64 },
}

/// One rank of an in-process group of communicating threads.
///
/// Create the whole group with [`ThreadGroup::group`] and move one handle
/// into each worker thread. A handle is `Send` but not `Sync`.
///
/// A peer may run at most one collective ahead of the slowest rank, so
/// votes are tagged with their round and early votes are parked until the
/// matching round is entered. Dropping a handle tells its peers that it
/// will not vote again; every later collective then fails on the
/// surviving ranks instead of waiting for it.
pub struct ThreadGroup {
    rank: Rank,
    peers: Vec<Option<Sender<Message>>>,
    inbox: Receiver<Message>,
    round: Cell<u64>,
    early: RefCell<Vec<(usize, u64, bool)>>,
    departed: RefCell<Vec<Option<u64>>>,
}

impl ThreadGroup {
    /// Create `size` connected handles, one per rank, in rank order.
    ///
    /// # Panics
    ///
    /// Panics if `size` is zero or exceeds `u32::MAX`.
    pub fn group(size: usize) -> Vec<ThreadGroup> {
        assert!(size > 0, "thread group needs at least one rank");
        assert!(u32::try_from(size).is_ok(), "thread group size exceeds u32");
        let (senders, receivers): (Vec<_>, Vec<_>) = (0..size).map(|_| unbounded()).unzip();
        receivers
            .into_iter()
            .enumerate()
            .map(|(me, inbox)| ThreadGroup {
                rank: Rank(me as u32),
                peers: senders
                    .iter()
                    .enumerate()
                    .map(|(i, tx)| (i != me).then(|| tx.clone()))
                    .collect(),
                inbox,
                round: Cell::new(0),
                early: RefCell::new(Vec::new()),
                departed: RefCell::new(vec![None; size]),
            })
            .collect()
    }

    fn me(&self) -> usize {
        self.rank.0 as usize
    }
}

impl Communicator for ThreadGroup {
    fn rank(&self) -> Rank {
        self.rank
    }

    fn size(&self) -> usize {
        self.peers.len()
    }

    fn all_agree(&self, ok: bool) -> bool {
        let round = self.round.get();
        self.round.set(round + 1);
        let me = self.me();

        let mut agreed = ok;
        for tx in self.peers.iter().flatten() {
            if tx.send(Message::Vote { from: me, round, ok }).is_err() {
                agreed = false;
            }
        }

        let mut voted = vec![false; self.peers.len()];
        voted[me] = true;
        self.early.borrow_mut().retain(|&(from, r, v)| {
            if r == round {
                agreed &= v;
                voted[from] = true;
                false
            } else {
                true
            }
        });

        loop {
            // A peer that left before reaching this round never votes in it.
            let mut waiting = false;
            for (peer, done) in voted.iter_mut().enumerate() {
                if *done {
                    continue;
                }
                match self.departed.borrow()[peer] {
                    Some(rounds) if rounds <= round => {
                        agreed = false;
                        *done = true;
                    }
                    _ => waiting = true,
                }
            }
            if !waiting {
                return agreed;
            }
            match self.inbox.recv() {
                Ok(Message::Vote { from, round: r, ok }) if r == round => {
                    agreed &= ok;
                    voted[from] = true;
                }
                Ok(Message::Vote { from, round: r, ok }) => {
                    self.early.borrow_mut().push((from, r, ok));
                }
                Ok(Message::Left { from, rounds }) => {
                    self.departed.borrow_mut()[from] = Some(rounds);
                }
                // Every peer is gone; the collective can never complete.
                Err(_) => return false,
            }
        }
    }
}

impl Drop for ThreadGroup {
    fn drop(&mut self) {
        let msg = Message::Left {
            from: self.me(),
            rounds: self.round.get(),
        };
        for tx in self.peers.iter().flatten() {
            let _ = tx.send(msg);
        }
    }
}

impl std::fmt::Debug for ThreadGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadGroup")
            .field("rank", &self.rank)
            .field("size", &self.peers.len())
            .field("round", &self.round.get())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn single_process_is_rank_zero() {
        let c = SingleProcess;
        assert_eq!(c.rank(), Rank::ROOT);
        assert_eq!(c.size(), 1);
        assert!(c.all_agree(true));
        assert!(!c.all_agree(false));
    }

    #[test]
    fn group_of_one_behaves_serially() {
        let mut g = ThreadGroup::group(1);
        let c = g.pop().unwrap();
        assert!(c.all_agree(true));
        assert!(!c.all_agree(false));
    }

    #[test]
    fn group_votes_are_collective() {
        let handles: Vec<_> = ThreadGroup::group(4)
            .into_iter()
            .map(|comm| {
                thread::spawn(move || {
                    let me = comm.rank().0;
                    let all_true = comm.all_agree(true);
                    // Rank 2 vetoes the second round.
                    let second = comm.all_agree(me != 2);
                    comm.barrier();
                    let third = comm.all_agree(true);
                    (all_true, second, third)
                })
            })
            .collect();
        for h in handles {
            let (first, second, third) = h.join().unwrap();
            assert!(first);
            assert!(!second);
            assert!(third);
        }
    }

    #[test]
    fn rank_that_leaves_fails_later_collectives() {
        let mut g = ThreadGroup::group(3);
        let quitter = g.pop().unwrap();
        let quit = thread::spawn(move || {
            assert!(quitter.all_agree(true));
            drop(quitter);
        });
        let handles: Vec<_> = g
            .into_iter()
            .map(|comm| {
                thread::spawn(move || {
                    let first = comm.all_agree(true);
                    let second = comm.all_agree(true);
                    let third = comm.all_agree(true);
                    (first, second, third)
                })
            })
            .collect();
        quit.join().unwrap();
        for h in handles {
            let (first, second, third) = h.join().unwrap();
            assert!(first);
            assert!(!second);
            assert!(!third);
        }
    }

    #[test]
    fn rank_that_never_votes_does_not_block_peers() {
        let mut g = ThreadGroup::group(4);
        drop(g.remove(1));
        let handles: Vec<_> = g
            .into_iter()
            .map(|comm| thread::spawn(move || comm.all_agree(true)))
            .collect();
        for h in handles {
            assert!(!h.join().unwrap());
        }
    }

    #[test]
    fn ranks_are_assigned_in_order() {
        let g = ThreadGroup::group(3);
        let ranks: Vec<_> = g.iter().map(|c| c.rank().0).collect();
        assert_eq!(ranks, vec![0, 1, 2]);
        assert!(g.iter().all(|c| c.size() == 3));
    }
}
