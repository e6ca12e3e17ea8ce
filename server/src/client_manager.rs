//! Connection registry for the chess server.
//!
//! Tracks every open TCP connection, the channel feeding its writer task, and
//! whether it has completed the `Join` handshake. Only joined connections
//! receive broadcasts.

use log::{info, warn};
use shared::{ConnectionId, Packet};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Instant;
use tokio::sync::mpsc;

/// A connected client and its outgoing packet queue.
#[derive(Debug)]
pub struct Client {
    pub id: ConnectionId,
    pub addr: SocketAddr,
    pub connected_at: Instant,
    /// Set once a valid `Join` arrived.
    pub joined: bool,
    outgoing: mpsc::UnboundedSender<Packet>,
}

impl Client {
    pub fn new(
        id: ConnectionId,
        addr: SocketAddr,
        outgoing: mpsc::UnboundedSender<Packet>,
    ) -> Self {
        Self {
            id,
            addr,
            connected_at: Instant::now(),
            joined: false,
            outgoing,
        }
    }

    /// Queues a packet for the writer task. False if the writer is gone.
    pub fn send(&self, packet: Packet) -> bool {
        self.outgoing.send(packet).is_ok()
    }
}

/// Manages all connected clients.
///
/// Ids start at 1 and are never reused within a server run, so a departed
/// connection can never be confused with a new one holding its old id.
pub struct ClientManager {
    clients: HashMap<ConnectionId, Client>,
    next_client_id: ConnectionId,
    max_clients: usize,
}

impl ClientManager {
    pub fn new(max_clients: usize) -> Self {
        Self {
            clients: HashMap::new(),
            next_client_id: 1,
            max_clients,
        }
    }

    /// Registers a new connection, `None` when the server is at capacity.
    pub fn add_client(
        &mut self,
        addr: SocketAddr,
        outgoing: mpsc::UnboundedSender<Packet>,
    ) -> Option<ConnectionId> {
        if self.clients.len() >= self.max_clients {
            return None;
        }

        let client_id = self.next_client_id;
        self.next_client_id += 1;

        info!("Client {} connected from {}", client_id, addr);
        self.clients
            .insert(client_id, Client::new(client_id, addr, outgoing));

        Some(client_id)
    }

    pub fn remove_client(&mut self, client_id: ConnectionId) -> bool {
        if let Some(client) = self.clients.remove(&client_id) {
            info!(
                "Client {} disconnected after {:?}",
                client.id,
                client.connected_at.elapsed()
            );
            true
        } else {
            false
        }
    }

    pub fn mark_joined(&mut self, client_id: ConnectionId) -> bool {
        match self.clients.get_mut(&client_id) {
            Some(client) => {
                client.joined = true;
                true
            }
            None => false,
        }
    }

    pub fn is_joined(&self, client_id: ConnectionId) -> bool {
        self.clients.get(&client_id).is_some_and(|c| c.joined)
    }

    pub fn send_to(&self, client_id: ConnectionId, packet: Packet) -> bool {
        match self.clients.get(&client_id) {
            Some(client) => {
                let sent = client.send(packet);
                if !sent {
                    warn!("Writer for client {} is closed", client_id);
                }
                sent
            }
            None => false,
        }
    }

    /// Sends the same packet to every joined connection. Returns how many got it.
    pub fn broadcast(&self, packet: &Packet) -> usize {
        self.clients
            .values()
            .filter(|c| c.joined)
            .filter(|c| c.send(packet.clone()))
            .count()
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::Color;

    fn test_addr() -> SocketAddr {
        "127.0.0.1:8080".parse().unwrap()
    }

    fn test_addr2() -> SocketAddr {
        "127.0.0.1:8081".parse().unwrap()
    }

    fn channel() -> (
        mpsc::UnboundedSender<Packet>,
        mpsc::UnboundedReceiver<Packet>,
    ) {
        mpsc::unbounded_channel()
    }

    #[test]
    fn test_client_manager_creation() {
        let manager = ClientManager::new(5);
        assert_eq!(manager.max_clients, 5);
        assert!(manager.is_empty());
        assert_eq!(manager.len(), 0);
    }

    #[test]
    fn test_ids_start_at_one_and_increase() {
        let mut manager = ClientManager::new(3);
        let (tx1, _rx1) = channel();
        let (tx2, _rx2) = channel();

        assert_eq!(manager.add_client(test_addr(), tx1), Some(1));
        assert_eq!(manager.add_client(test_addr2(), tx2), Some(2));
        assert_eq!(manager.len(), 2);
    }

    #[test]
    fn test_ids_not_reused_after_removal() {
        let mut manager = ClientManager::new(2);
        let (tx1, _rx1) = channel();
        let (tx2, _rx2) = channel();

        let first = manager.add_client(test_addr(), tx1).unwrap();
        assert!(manager.remove_client(first));
        let second = manager.add_client(test_addr(), tx2).unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn test_add_client_max_capacity() {
        let mut manager = ClientManager::new(1);
        let (tx1, _rx1) = channel();
        let (tx2, _rx2) = channel();

        assert!(manager.add_client(test_addr(), tx1).is_some());
        assert!(manager.add_client(test_addr2(), tx2).is_none());
        assert_eq!(manager.len(), 1);
    }

    #[test]
    fn test_remove_nonexistent_client() {
        let mut manager = ClientManager::new(2);
        assert!(!manager.remove_client(999));
    }

    #[test]
    fn test_broadcast_reaches_only_joined() {
        let mut manager = ClientManager::new(3);
        let (tx1, mut rx1) = channel();
        let (tx2, mut rx2) = channel();

        let joined = manager.add_client(test_addr(), tx1).unwrap();
        let _pending = manager.add_client(test_addr2(), tx2).unwrap();
        assert!(manager.mark_joined(joined));

        assert_eq!(manager.broadcast(&Packet::SpectatorAssigned), 1);
        assert_eq!(rx1.try_recv().unwrap(), Packet::SpectatorAssigned);
        assert!(rx2.try_recv().is_err());
        assert!(manager.is_joined(joined));
    }

    #[test]
    fn test_send_to_specific_client() {
        let mut manager = ClientManager::new(2);
        let (tx1, mut rx1) = channel();
        let id = manager.add_client(test_addr(), tx1).unwrap();

        let packet = Packet::SeatAssigned { seat: Color::White };
        assert!(manager.send_to(id, packet.clone()));
        assert_eq!(rx1.try_recv().unwrap(), packet);
        assert!(!manager.send_to(id + 1, packet));
    }

    #[test]
    fn test_send_to_closed_writer() {
        let mut manager = ClientManager::new(1);
        let (tx, rx) = channel();
        let id = manager.add_client(test_addr(), tx).unwrap();
        drop(rx);

        assert!(!manager.send_to(id, Packet::SpectatorAssigned));
        assert!(!manager.is_joined(id));
    }
}
