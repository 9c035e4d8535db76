use mio::net::TcpStream;

use std::net::{IpAddr, SocketAddr};

/// What the server knows about a connected client. Captured when the connection is accepted;
/// `tag` is free for the service to use.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerInfo {
    pub addr: SocketAddr,
    pub tag: Option<String>,
}

impl PeerInfo {
    pub fn new(addr: SocketAddr) -> Self {
        PeerInfo { addr, tag: None }
    }

    pub fn name(&self) -> IpAddr {
        self.addr.ip()
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }
}

struct Slot<S> {
    stream: S,
    peer: PeerInfo,
}

/// Fixed number of client slots, addressed by index. A slot index is only ever handed out again
/// once its previous occupant has been released, and the lowest free index always goes first.
pub struct ConnectionTable<S = TcpStream> {
    slots: Vec<Option<Slot<S>>>,
    occupied: usize,
}

impl<S> ConnectionTable<S> {
    pub fn with_capacity(capacity: usize) -> Self {
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || None);
        ConnectionTable { slots, occupied: 0 }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn len(&self) -> usize {
        self.occupied
    }

    pub fn is_empty(&self) -> bool {
        self.occupied == 0
    }

    /// The lowest free slot index, or `None` when the table is full.
    pub fn try_allocate(&self) -> Option<usize> {
        self.slots.iter().position(Option::is_none)
    }

    /// Put a freshly accepted client into a free slot.
    ///
    /// Panics if the slot is out of range or already taken, as that means the caller lost track
    /// of the table.
    pub fn occupy(&mut self, index: usize, stream: S, peer: PeerInfo) {
        let slot = &mut self.slots[index];
        assert!(slot.is_none(), "slot {} is already occupied", index);
        *slot = Some(Slot { stream, peer });
        self.occupied += 1;
    }

    pub fn get_mut(&mut self, index: usize) -> Option<(&mut S, &mut PeerInfo)> {
        self.slots
            .get_mut(index)
            .and_then(Option::as_mut)
            .map(|slot| (&mut slot.stream, &mut slot.peer))
    }

    /// Occupied slots and their streams, in ascending index order.
    pub fn occupied(&self) -> impl Iterator<Item = (usize, &S)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| slot.as_ref().map(|slot| (index, &slot.stream)))
    }

    /// Empty a slot, handing its stream and peer to `close`. Returns false (and does not call
    /// `close`) if the slot was already empty.
    pub fn release<F>(&mut self, index: usize, close: F) -> bool
    where
        F: FnOnce(S, PeerInfo),
    {
        match self.slots.get_mut(index).and_then(Option::take) {
            Some(Slot { stream, peer }) => {
                self.occupied -= 1;
                close(stream, peer);
                true
            }
            None => false,
        }
    }

    /// Release every occupied slot in ascending order. Returns how many were released.
    pub fn release_all<F>(&mut self, mut close: F) -> usize
    where
        F: FnMut(usize, S, PeerInfo),
    {
        let mut released = 0;
        for index in 0..self.slots.len() {
            if self.release(index, |stream, peer| close(index, stream, peer)) {
                released += 1;
            }
        }
        released
    }
}
