//! The adapter module contains the [`CoreAdapter`] trait and other related types.
//!
//! An adapter owns the room membership of one namespace and performs the broadcast fan-out.
//! It can be implemented to share this state between multiple servers.
//! The default in-memory implementation is the [`CoreLocalAdapter`].
use std::{
    borrow::Cow,
    collections::{HashMap, HashSet},
    error::Error as StdError,
    future::{self, Future},
    sync::{Arc, RwLock},
};

use crate::{
    Str,
    errors::{AdapterError, BroadcastError, SocketError},
    packet::Packet,
    parser::Parse,
    sid::Sid,
    transport::Frame,
};

/// A room identifier
pub type Room = Cow<'static, str>;

/// Flags that can be used to modify the behavior of the broadcast methods.
#[derive(Copy, Clone, Debug, Hash, PartialEq, Eq)]
pub enum BroadcastFlags {
    /// Broadcast to all the selected sockets, except the sender
    Broadcast = 0x01,
    /// The packet may be dropped for sockets that cannot currently accept writes
    Volatile = 0x02,
}

/// Options that select the recipients of a broadcast.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BroadcastOptions {
    /// The flags to apply to the broadcast represented as a bitflag.
    flags: u8,
    /// The rooms to broadcast to. Empty means every connected socket of the namespace.
    pub rooms: HashSet<Room>,
    /// The sockets to exclude from the broadcast.
    pub except: HashSet<Sid>,
}
impl BroadcastOptions {
    /// Add any flags to the options.
    pub fn add_flag(&mut self, flag: BroadcastFlags) {
        self.flags |= flag as u8;
    }
    /// Check if the options have a flag.
    pub fn has_flag(&self, flag: BroadcastFlags) -> bool {
        self.flags & flag as u8 == flag as u8
    }
    /// Create options excluding the given sender.
    pub fn except_sender(sid: Sid) -> Self {
        Self {
            except: HashSet::from([sid]),
            ..Default::default()
        }
    }
}

/// A trait for types that can be used as a room parameter.
///
/// [`String`], [`Vec<String>`], [`Vec<&str>`], [`&'static str`](str) and const arrays are implemented by default.
pub trait RoomParam: Send + 'static {
    /// The type of the iterator returned by `into_room_iter`.
    type IntoIter: Iterator<Item = Room>;

    /// Convert `self` into an iterator of rooms.
    fn into_room_iter(self) -> Self::IntoIter;
}

impl RoomParam for Room {
    type IntoIter = std::iter::Once<Room>;
    #[inline(always)]
    fn into_room_iter(self) -> Self::IntoIter {
        std::iter::once(self)
    }
}
impl RoomParam for String {
    type IntoIter = std::iter::Once<Room>;
    #[inline(always)]
    fn into_room_iter(self) -> Self::IntoIter {
        std::iter::once(Cow::Owned(self))
    }
}
impl RoomParam for &'static str {
    type IntoIter = std::iter::Once<Room>;
    #[inline(always)]
    fn into_room_iter(self) -> Self::IntoIter {
        std::iter::once(Cow::Borrowed(self))
    }
}
impl RoomParam for Vec<String> {
    type IntoIter = std::iter::Map<std::vec::IntoIter<String>, fn(String) -> Room>;
    #[inline(always)]
    fn into_room_iter(self) -> Self::IntoIter {
        self.into_iter().map(Cow::Owned)
    }
}
impl RoomParam for Vec<&'static str> {
    type IntoIter = std::iter::Map<std::vec::IntoIter<&'static str>, fn(&'static str) -> Room>;
    #[inline(always)]
    fn into_room_iter(self) -> Self::IntoIter {
        self.into_iter().map(Cow::Borrowed)
    }
}
impl RoomParam for Vec<Room> {
    type IntoIter = std::vec::IntoIter<Room>;
    #[inline(always)]
    fn into_room_iter(self) -> Self::IntoIter {
        self.into_iter()
    }
}
impl<const COUNT: usize> RoomParam for [&'static str; COUNT] {
    type IntoIter =
        std::iter::Map<std::array::IntoIter<&'static str, COUNT>, fn(&'static str) -> Room>;
    #[inline(always)]
    fn into_room_iter(self) -> Self::IntoIter {
        self.into_iter().map(Cow::Borrowed)
    }
}
impl RoomParam for Sid {
    type IntoIter = std::iter::Once<Room>;
    #[inline(always)]
    fn into_room_iter(self) -> Self::IntoIter {
        std::iter::once(Cow::Owned(self.to_string()))
    }
}

/// The [`SocketEmitter`] is implemented by the session layer for each namespace.
/// It lets the adapter reach the namespace sockets without depending on the session crate.
pub trait SocketEmitter: Send + Sync + 'static {
    /// Get the ids of every connected socket in the namespace.
    fn get_all_sids(&self) -> Vec<Sid>;
    /// Write already encoded frames to each of the given sockets.
    fn send_many(
        &self,
        sids: Vec<Sid>,
        frames: Vec<Frame>,
        volatile: bool,
    ) -> Result<(), Vec<SocketError>>;
    /// Get the path of the namespace.
    fn path(&self) -> &Str;
    /// Get the parser used to encode packets for this namespace.
    fn parser(&self) -> Arc<dyn Parse>;
}

/// An adapter is responsible for the room membership of a namespace and for broadcasting to it.
/// Its defaults delegate to the [`CoreLocalAdapter`] returned by [`CoreAdapter::get_local`].
///
/// Room join and leave return futures: an implementation backed by a remote store may
/// resolve them later, while the local one resolves immediately.
pub trait CoreAdapter<E: SocketEmitter>: Sized + Send + Sync + 'static {
    /// An error that can occur when using the adapter.
    type Error: StdError + Into<AdapterError> + Send + 'static;
    /// A shared state between all the namespace adapters.
    /// This can be used to share a connection for example.
    type State: Send + Sync + 'static;

    /// Creates a new adapter with the given state and local adapter.
    fn new(state: &Self::State, local: CoreLocalAdapter<E>) -> Self;

    /// Adds the socket to the room.
    fn add(&self, sid: Sid, room: Room) -> impl Future<Output = Result<(), Self::Error>> + Send {
        self.get_local().add(sid, room);
        future::ready(Ok(()))
    }

    /// Removes the socket from the room.
    fn remove(&self, sid: Sid, room: Room) -> impl Future<Output = Result<(), Self::Error>> + Send {
        self.get_local().remove(sid, &room);
        future::ready(Ok(()))
    }

    /// Removes the socket from all the rooms.
    fn remove_all(&self, sid: Sid) -> Result<(), Self::Error> {
        self.get_local().remove_all(sid);
        Ok(())
    }

    /// Broadcasts the packet to the sockets that match the [`BroadcastOptions`].
    fn broadcast(&self, packet: Packet, opts: BroadcastOptions) -> Result<(), BroadcastError> {
        self.get_local().broadcast(packet, opts)
    }

    /// Returns the sockets ids that match the [`BroadcastOptions`].
    fn sockets(&self, opts: BroadcastOptions) -> Result<Vec<Sid>, Self::Error> {
        Ok(self.get_local().sockets(opts))
    }

    /// Returns the rooms of the socket.
    fn socket_rooms(&self, sid: Sid) -> Result<Vec<Room>, Self::Error> {
        Ok(self.get_local().socket_rooms(sid))
    }

    /// Returns all the non-empty rooms of the namespace.
    fn rooms(&self) -> Result<Vec<Room>, Self::Error> {
        Ok(self.get_local().rooms())
    }

    /// Returns the local adapter. Used to enable default behaviors.
    fn get_local(&self) -> &CoreLocalAdapter<E>;
}

/// The default adapter. Stores the state in memory.
pub struct CoreLocalAdapter<E> {
    rooms: RwLock<HashMap<Room, HashSet<Sid>>>,
    sockets: E,
}

impl<E: SocketEmitter> CoreLocalAdapter<E> {
    /// Create a new local adapter with the given sockets interface.
    pub fn new(sockets: E) -> Self {
        Self {
            rooms: RwLock::new(HashMap::new()),
            sockets,
        }
    }

    /// Adds the socket to the room.
    pub fn add(&self, sid: Sid, room: Room) {
        let mut rooms_map = self.rooms.write().unwrap();
        rooms_map.entry(room).or_default().insert(sid);
    }

    /// Removes the socket from the room. Empty rooms are dropped.
    pub fn remove(&self, sid: Sid, room: &str) {
        let mut rooms_map = self.rooms.write().unwrap();
        if let Some(sockets) = rooms_map.get_mut(room) {
            sockets.remove(&sid);
            if sockets.is_empty() {
                rooms_map.remove(room);
            }
        }
    }

    /// Removes the socket from all the rooms.
    pub fn remove_all(&self, sid: Sid) {
        let mut rooms_map = self.rooms.write().unwrap();
        rooms_map.retain(|_, sockets| {
            sockets.remove(&sid);
            !sockets.is_empty()
        });
    }

    /// Broadcasts the packet to the sockets that match the [`BroadcastOptions`].
    /// The packet is encoded once and the frames are shared between recipients.
    pub fn broadcast(&self, packet: Packet, opts: BroadcastOptions) -> Result<(), BroadcastError> {
        let volatile = opts.has_flag(BroadcastFlags::Volatile);
        let sids = self.apply_opts(opts);

        #[cfg(feature = "tracing")]
        tracing::debug!(ns = ?self.path(), "broadcasting packet to {} sockets", sids.len());

        if sids.is_empty() {
            return Ok(());
        }
        let frames = self.sockets.parser().encode(&packet)?;
        self.sockets.send_many(sids, frames, volatile)?;
        Ok(())
    }

    /// Returns the sockets ids that match the [`BroadcastOptions`].
    pub fn sockets(&self, opts: BroadcastOptions) -> Vec<Sid> {
        self.apply_opts(opts)
    }

    /// Returns the rooms of the socket.
    pub fn socket_rooms(&self, sid: Sid) -> Vec<Room> {
        let rooms_map = self.rooms.read().unwrap();
        rooms_map
            .iter()
            .filter(|(_, sockets)| sockets.contains(&sid))
            .map(|(room, _)| room.clone())
            .collect()
    }

    /// Returns all the rooms for this adapter.
    pub fn rooms(&self) -> Vec<Room> {
        self.rooms.read().unwrap().keys().cloned().collect()
    }

    /// Get the namespace path.
    pub fn path(&self) -> &Str {
        self.sockets.path()
    }
}

impl<E: SocketEmitter> CoreLocalAdapter<E> {
    /// Applies the given `opts` and return the sockets that match.
    /// A socket in several of the selected rooms is only returned once.
    fn apply_opts(&self, opts: BroadcastOptions) -> Vec<Sid> {
        if opts.rooms.is_empty() {
            return self
                .sockets
                .get_all_sids()
                .into_iter()
                .filter(|id| !opts.except.contains(id))
                .collect();
        }

        let rooms_map = self.rooms.read().unwrap();
        let mut seen = HashSet::new();
        opts.rooms
            .iter()
            .filter_map(|room| rooms_map.get(room))
            .flatten()
            .copied()
            .filter(|id| !opts.except.contains(id) && seen.insert(*id))
            .collect()
    }
}
