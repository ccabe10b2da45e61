//! Connection Registry - Live Observers, Topics and Heartbeats
//!
//! Owns every connected client's transport, its last heartbeat and its
//! topic memberships. All maps live behind one `RwLock` so a disconnect
//! removes a client from the connection table and from every topic in a
//! single critical section.
//!
//! Duplicate client ids are rejected; the existing connection is kept.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::domain::error::RegistryError;
use crate::domain::topic::Topic;
use crate::ports::transport::ClientTransport;

/// Unique client identifier.
pub type ClientId = String;

/// Identifies one accepted connection, distinct across reconnects with the same id.
pub type SessionId = u64;

struct ClientConnection {
  session: SessionId,
  transport: Arc<dyn ClientTransport>,
  last_heartbeat: Instant,
  topics: HashSet<Topic>,
}

impl ClientConnection {
  fn recipient(&self, client_id: &str) -> Recipient {
    Recipient {
      client_id: client_id.to_string(),
      session: self.session,
      transport: Arc::clone(&self.transport),
    }
  }
}

#[derive(Default)]
struct RegistryState {
  connections: HashMap<ClientId, ClientConnection>,
  subscribers: HashMap<Topic, HashSet<ClientId>>,
}

impl RegistryState {
  fn remove(&mut self, client_id: &str) -> Option<ClientConnection> {
    let conn = self.connections.remove(client_id)?;
    for topic in &conn.topics {
      if let Some(members) = self.subscribers.get_mut(topic) {
        members.remove(client_id);
        if topic.is_dynamic() && members.is_empty() {
          self.subscribers.remove(topic);
        }
      }
    }
    Some(conn)
  }
}

/// One delivery target resolved from the registry.
///
/// Carries the session so that a failed delivery evicts this connection
/// and never a newer one that reused the id.
#[derive(Clone)]
pub struct Recipient {
  /// Client id.
  pub client_id: ClientId,
  /// Session the transport belongs to.
  pub session: SessionId,
  /// Outbound half of that session.
  pub transport: Arc<dyn ClientTransport>,
}

/// Liveness view of one connection, taken by the heartbeat sweep.
#[derive(Clone)]
pub struct HeartbeatEntry {
  /// Client id.
  pub client_id: ClientId,
  /// Session the age was measured on.
  pub session: SessionId,
  /// Transport for probes and forced close.
  pub transport: Arc<dyn ClientTransport>,
  /// Time since the last client heartbeat.
  pub elapsed: Duration,
}

/// Registry of connected observers.
pub struct ConnectionRegistry {
  state: RwLock<RegistryState>,
  next_session: AtomicU64,
}

impl ConnectionRegistry {
  /// Create a registry with the fixed topics pre-declared.
  pub fn new() -> Self {
    let subscribers = Topic::FIXED
      .into_iter()
      .map(|topic| (topic, HashSet::new()))
      .collect();

    Self {
      state: RwLock::new(RegistryState {
        connections: HashMap::new(),
        subscribers,
      }),
      next_session: AtomicU64::new(1),
    }
  }

  /// Register a connection and stamp its heartbeat.
  ///
  /// # Errors
  /// `DuplicateClient` if `client_id` is already connected.
  pub async fn connect(
    &self,
    transport: Arc<dyn ClientTransport>,
    client_id: &str,
  ) -> Result<SessionId, RegistryError> {
    let mut state = self.state.write().await;
    if state.connections.contains_key(client_id) {
      warn!(client_id, "Rejected connection with duplicate client id");
      return Err(RegistryError::DuplicateClient(client_id.to_string()));
    }

    let session = self.next_session.fetch_add(1, Ordering::Relaxed);
    state.connections.insert(
      client_id.to_string(),
      ClientConnection {
        session,
        transport,
        last_heartbeat: Instant::now(),
        topics: HashSet::new(),
      },
    );

    info!(
      client_id,
      total = state.connections.len(),
      "Client connected"
    );
    Ok(session)
  }

  /// Remove a connection and all of its topic memberships. Idempotent.
  ///
  /// Returns the removed transport so the caller may close it.
  pub async fn disconnect(&self, client_id: &str) -> Option<Arc<dyn ClientTransport>> {
    let mut state = self.state.write().await;
    let conn = state.remove(client_id)?;
    info!(
      client_id,
      total = state.connections.len(),
      "Client disconnected"
    );
    Some(conn.transport)
  }

  /// Disconnect only if `client_id` still refers to `session`.
  ///
  /// Used by socket handlers on exit, so a closing socket never removes a
  /// newer connection that reused its id.
  pub async fn disconnect_session(&self, client_id: &str, session: SessionId) -> bool {
    let mut state = self.state.write().await;
    let current = state.connections.get(client_id).map(|c| c.session);
    if current != Some(session) {
      return false;
    }
    state.remove(client_id);
    info!(
      client_id,
      total = state.connections.len(),
      "Client disconnected"
    );
    true
  }

  /// Subscribe a client to a topic by wire name.
  ///
  /// Unknown topics and unknown clients are a logged no-op. Returns whether
  /// the membership now holds.
  pub async fn subscribe(&self, client_id: &str, topic_name: &str) -> bool {
    let Some(topic) = Topic::parse(topic_name) else {
      warn!(client_id, topic = topic_name, "Subscribe to unknown topic ignored");
      return false;
    };

    let mut state = self.state.write().await;
    let Some(conn) = state.connections.get_mut(client_id) else {
      debug!(client_id, %topic, "Subscribe from unknown client ignored");
      return false;
    };
    conn.topics.insert(topic);
    state
      .subscribers
      .entry(topic)
      .or_default()
      .insert(client_id.to_string());

    debug!(client_id, %topic, "Client subscribed");
    true
  }

  /// Unsubscribe a client from a topic by wire name.
  pub async fn unsubscribe(&self, client_id: &str, topic_name: &str) -> bool {
    let Some(topic) = Topic::parse(topic_name) else {
      warn!(client_id, topic = topic_name, "Unsubscribe from unknown topic ignored");
      return false;
    };

    let mut state = self.state.write().await;
    let Some(conn) = state.connections.get_mut(client_id) else {
      return false;
    };
    let was_member = conn.topics.remove(&topic);
    if let Some(members) = state.subscribers.get_mut(&topic) {
      members.remove(client_id);
      if topic.is_dynamic() && members.is_empty() {
        state.subscribers.remove(&topic);
      }
    }

    debug!(client_id, %topic, "Client unsubscribed");
    was_member
  }

  /// Refresh a client's heartbeat. No-op for unknown clients.
  pub async fn heartbeat(&self, client_id: &str) -> bool {
    let mut state = self.state.write().await;
    match state.connections.get_mut(client_id) {
      Some(conn) => {
        conn.last_heartbeat = Instant::now();
        true
      }
      None => false,
    }
  }

  /// Resolve recipients: the topic's subscribers, or everyone when `topic` is `None`.
  pub async fn recipients(&self, topic: Option<Topic>) -> Vec<Recipient> {
    let state = self.state.read().await;
    match topic {
      Some(topic) => state
        .subscribers
        .get(&topic)
        .into_iter()
        .flatten()
        .filter_map(|id| state.connections.get(id).map(|c| c.recipient(id)))
        .collect(),
      None => state
        .connections
        .iter()
        .map(|(id, c)| c.recipient(id))
        .collect(),
    }
  }

  /// Delivery target of a single client.
  pub async fn recipient(&self, client_id: &str) -> Option<Recipient> {
    let state = self.state.read().await;
    state.connections.get(client_id).map(|c| c.recipient(client_id))
  }

  /// Heartbeat ages of every connection, measured now.
  pub async fn heartbeat_snapshot(&self) -> Vec<HeartbeatEntry> {
    let state = self.state.read().await;
    let now = Instant::now();
    state
      .connections
      .iter()
      .map(|(id, c)| HeartbeatEntry {
        client_id: id.clone(),
        session: c.session,
        transport: Arc::clone(&c.transport),
        elapsed: now.saturating_duration_since(c.last_heartbeat),
      })
      .collect()
  }

  /// Whether a client is connected.
  pub async fn is_connected(&self, client_id: &str) -> bool {
    self.state.read().await.connections.contains_key(client_id)
  }

  /// Number of connected clients.
  pub async fn connection_count(&self) -> usize {
    self.state.read().await.connections.len()
  }

  /// Number of subscribers of a topic.
  pub async fn subscriber_count(&self, topic: Topic) -> usize {
    self
      .state
      .read()
      .await
      .subscribers
      .get(&topic)
      .map_or(0, HashSet::len)
  }

  /// Topics a client is subscribed to, sorted.
  pub async fn topics_of(&self, client_id: &str) -> Vec<Topic> {
    let state = self.state.read().await;
    let mut topics: Vec<Topic> = state
      .connections
      .get(client_id)
      .map(|c| c.topics.iter().copied().collect())
      .unwrap_or_default();
    topics.sort_unstable();
    topics
  }
}

impl Default for ConnectionRegistry {
  fn default() -> Self {
    Self::new()
  }
}
