//! Venue adapters: capability contract, registry and the simulated venue

pub mod sim;
pub mod traits;

pub use sim::{FillBehavior, SimVenue};
pub use traits::*;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Venue connection status, mirrored to UI subscribers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionStatus {
    /// Venue responding normally
    Connected,
    /// Venue skipped for the current cycle after a failed read
    Degraded,
    /// Venue unreachable
    Disconnected,
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionStatus::Connected => write!(f, "connected"),
            ConnectionStatus::Degraded => write!(f, "degraded"),
            ConnectionStatus::Disconnected => write!(f, "disconnected"),
        }
    }
}

/// Registry of venue adapters, built once at startup and passed by
/// reference to every component that needs venue access.
///
/// Iteration order is insertion order, which keeps scanner output
/// deterministic for a given configuration.
#[derive(Clone, Default)]
pub struct VenueRegistry {
    venues: IndexMap<String, Arc<dyn VenueAdapter>>,
}

impl VenueRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            venues: IndexMap::new(),
        }
    }

    /// Register a venue under its own name. Replaces any previous
    /// registration with the same name.
    pub fn register(&mut self, venue: Arc<dyn VenueAdapter>) {
        self.venues.insert(venue.name().to_string(), venue);
    }

    /// Look up a venue by name
    pub fn get(&self, name: &str) -> Option<&Arc<dyn VenueAdapter>> {
        self.venues.get(name)
    }

    /// Registered venue names, in insertion order
    pub fn names(&self) -> Vec<String> {
        self.venues.keys().cloned().collect()
    }

    /// Iterate venues in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Arc<dyn VenueAdapter>)> {
        self.venues.iter()
    }

    /// Number of registered venues
    pub fn len(&self) -> usize {
        self.venues.len()
    }

    /// True when no venue is registered
    pub fn is_empty(&self) -> bool {
        self.venues.is_empty()
    }
}

impl fmt::Debug for VenueRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VenueRegistry")
            .field("venues", &self.names())
            .finish()
    }
}
