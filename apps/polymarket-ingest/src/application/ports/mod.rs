//! Port Interfaces
//!
//! Defines the interfaces (ports) for external systems following
//! the Hexagonal Architecture pattern. These are the contracts that
//! infrastructure adapters must implement.
//!
//! ## Driven Ports (Outbound)
//!
//! - `MarketTransport`: The venue streaming connection
//! - `WatchListPort`: Monitored-markets source
//! - `BookStorePort`: Book event persistence
//! - `NotificationPort`: Derivative event publishing
//!
//! ## Driver Ports (Inbound)
//!
//! - `CommandSource`: Operator command queue
//! - `IngestionControl`: Supervisor requests from reconciler and commands

mod book_store_port;
mod command_port;
mod ingestion_control_port;
mod market_transport_port;
mod notification_port;
mod watch_list_port;

pub use book_store_port::{BookStorePort, StoreError, StoredBookRecord};
pub use command_port::{CommandEnvelope, CommandSource};
pub use ingestion_control_port::{ControlError, IngestionControl};
pub use market_transport_port::{Credentials, MarketTransport, TransportError};
pub use notification_port::{NotificationPayload, NotificationPort, market_topic};
pub use watch_list_port::{StaticWatchList, WatchListError, WatchListPort};

#[cfg(test)]
pub use book_store_port::MockBookStorePort;
#[cfg(test)]
pub use ingestion_control_port::MockIngestionControl;
#[cfg(test)]
pub use notification_port::MockNotificationPort;
#[cfg(test)]
pub use watch_list_port::MockWatchListPort;
