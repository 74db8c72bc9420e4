//! Registry of live channel connections.
//!
//! Exactly one [`ChannelConnection`] exists per address. Observers acquire and
//! release addresses; the first acquire opens the channel and the last release
//! closes and drops it.

use std::{collections::HashMap, ops::Sub, time::Duration};

use murmur_proto::{ChannelAddress, OutboundFrame};

use crate::{
    connection::{ChannelAction, ChannelConnection, ConnectionConfig},
    env::Environment,
    error::ChannelError,
};

#[derive(Debug)]
struct Entry<I>
where
    I: Copy + Ord + Send + Sync + Sub<Output = Duration>,
{
    connection: ChannelConnection<I>,
    observers: usize,
}

/// Reference-counted connections keyed by address.
#[derive(Debug)]
pub struct ChannelRegistry<I>
where
    I: Copy + Ord + Send + Sync + Sub<Output = Duration>,
{
    config: ConnectionConfig,
    entries: HashMap<ChannelAddress, Entry<I>>,
}

impl<I> ChannelRegistry<I>
where
    I: Copy + Ord + Send + Sync + Sub<Output = Duration>,
{
    /// Create an empty registry. New connections use `config`.
    pub fn new(config: ConnectionConfig) -> Self {
        Self { config, entries: HashMap::new() }
    }

    /// Add an observer for `address`, creating and opening the connection on
    /// first use.
    pub fn acquire(&mut self, address: ChannelAddress) -> Vec<ChannelAction> {
        if let Some(entry) = self.entries.get_mut(&address) {
            entry.observers += 1;
            return Vec::new();
        }

        let mut connection = ChannelConnection::new(address, self.config);
        let actions = connection.open();
        self.entries.insert(address, Entry { connection, observers: 1 });
        actions
    }

    /// Remove an observer. The last release closes the connection and drops
    /// it from the registry.
    ///
    /// # Errors
    ///
    /// - `ChannelError::UnknownAddress` if `address` was never acquired
    pub fn release(&mut self, address: ChannelAddress) -> Result<Vec<ChannelAction>, ChannelError> {
        let entry =
            self.entries.get_mut(&address).ok_or(ChannelError::UnknownAddress(address))?;

        entry.observers -= 1;
        if entry.observers > 0 {
            return Ok(Vec::new());
        }

        let actions = entry.connection.close();
        self.entries.remove(&address);
        Ok(actions)
    }

    /// Connection for `address`, if acquired.
    pub fn get(&self, address: &ChannelAddress) -> Option<&ChannelConnection<I>> {
        self.entries.get(address).map(|entry| &entry.connection)
    }

    /// Number of observers holding `address`.
    pub fn observers(&self, address: &ChannelAddress) -> usize {
        self.entries.get(address).map_or(0, |entry| entry.observers)
    }

    /// True if `address` is acquired and connected.
    pub fn is_connected(&self, address: &ChannelAddress) -> bool {
        self.get(address).is_some_and(ChannelConnection::is_connected)
    }

    /// All live connections.
    pub fn connections(&self) -> impl Iterator<Item = &ChannelConnection<I>> {
        self.entries.values().map(|entry| &entry.connection)
    }

    /// Number of live connections.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if no connection is live.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Transport for `address` opened.
    ///
    /// A transport that opens after its address was released is told to
    /// close.
    pub fn handle_opened(&mut self, address: ChannelAddress, now: I) -> Vec<ChannelAction> {
        match self.entries.get_mut(&address) {
            Some(entry) => entry.connection.handle_opened(now),
            None => vec![ChannelAction::CloseTransport { address }],
        }
    }

    /// Transport for `address` closed. Ignored for released addresses.
    pub fn handle_closed<E: Environment>(&mut self, address: ChannelAddress, env: &E, now: I) {
        if let Some(entry) = self.entries.get_mut(&address) {
            entry.connection.handle_closed(env, now);
        }
    }

    /// Send on `address`. Dropped if not acquired or not connected.
    pub fn send(&mut self, address: ChannelAddress, frame: OutboundFrame) -> Vec<ChannelAction> {
        match self.entries.get_mut(&address) {
            Some(entry) => entry.connection.send(frame),
            None => {
                tracing::debug!(%address, kind = frame.kind(), "dropping frame for released channel");
                Vec::new()
            },
        }
    }

    /// Register a durable frame on `address`.
    ///
    /// # Errors
    ///
    /// - `ChannelError::UnknownAddress` if `address` was never acquired
    pub fn set_durable(
        &mut self,
        address: ChannelAddress,
        frame: OutboundFrame,
    ) -> Result<(), ChannelError> {
        let entry = self.entries.get_mut(&address).ok_or(ChannelError::UnknownAddress(address))?;
        entry.connection.set_durable(frame);
        Ok(())
    }

    /// Tick every connection.
    pub fn tick(&mut self, now: I) -> Vec<ChannelAction> {
        let mut addresses: Vec<_> = self.entries.keys().copied().collect();
        addresses.sort();

        let mut actions = Vec::new();
        for address in addresses {
            if let Some(entry) = self.entries.get_mut(&address) {
                actions.extend(entry.connection.tick(now));
            }
        }
        actions
    }

    /// Close every connection and empty the registry.
    pub fn close_all(&mut self) -> Vec<ChannelAction> {
        let mut addresses: Vec<_> = self.entries.keys().copied().collect();
        addresses.sort();

        let mut actions = Vec::new();
        for address in addresses {
            if let Some(mut entry) = self.entries.remove(&address) {
                actions.extend(entry.connection.close());
            }
        }
        actions
    }
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use super::*;
    use crate::connection::ChannelState;

    fn registry() -> ChannelRegistry<Instant> {
        ChannelRegistry::new(ConnectionConfig::default())
    }

    #[test]
    fn first_acquire_opens() {
        let mut registry = registry();
        let address = ChannelAddress::room(1, 1);

        let actions = registry.acquire(address);
        assert_eq!(actions, vec![ChannelAction::OpenTransport { address }]);
        assert_eq!(registry.observers(&address), 1);

        assert!(registry.acquire(address).is_empty());
        assert_eq!(registry.observers(&address), 2);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn last_release_closes_and_removes() {
        let mut registry = registry();
        let address = ChannelAddress::room(1, 1);
        registry.acquire(address);
        registry.acquire(address);
        registry.handle_opened(address, Instant::now());

        assert!(registry.release(address).unwrap().is_empty());
        assert!(registry.get(&address).is_some());

        let actions = registry.release(address).unwrap();
        assert_eq!(actions, vec![ChannelAction::CloseTransport { address }]);
        assert!(registry.get(&address).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn release_unknown_address_fails() {
        let mut registry = registry();
        let result = registry.release(ChannelAddress::Global);
        assert_eq!(result, Err(ChannelError::UnknownAddress(ChannelAddress::Global)));
    }

    #[test]
    fn late_open_for_released_address_is_closed() {
        let mut registry = registry();
        let address = ChannelAddress::room(3, 4);
        registry.acquire(address);
        registry.release(address).unwrap();

        let actions = registry.handle_opened(address, Instant::now());
        assert_eq!(actions, vec![ChannelAction::CloseTransport { address }]);
    }

    #[test]
    fn send_to_released_address_is_dropped() {
        let mut registry = registry();
        assert!(registry.send(ChannelAddress::Global, OutboundFrame::Heartbeat).is_empty());
    }

    #[test]
    fn tick_reaches_every_connection() {
        let mut registry = registry();
        let t0 = Instant::now();
        let room = ChannelAddress::room(1, 1);
        registry.acquire(ChannelAddress::Global);
        registry.acquire(room);
        registry.handle_opened(ChannelAddress::Global, t0);
        registry.handle_opened(room, t0);

        let actions = registry.tick(t0 + Duration::from_secs(30));
        assert_eq!(actions.len(), 2);
        assert!(actions.iter().all(|action| matches!(
            action,
            ChannelAction::SendFrame { frame: OutboundFrame::Heartbeat, .. }
        )));
    }

    #[test]
    fn close_all_empties_registry() {
        let mut registry = registry();
        registry.acquire(ChannelAddress::Global);
        registry.acquire(ChannelAddress::room(1, 1));

        let actions = registry.close_all();
        assert_eq!(actions.len(), 2);
        assert!(registry.is_empty());
        assert_eq!(
            registry.get(&ChannelAddress::Global).map(ChannelConnection::state),
            None::<ChannelState>
        );
    }
}
