//! Клиент шины сообщений: STOMP поверх WebSocket с автоматическим
//! переподключением и восстановлением подписок.

pub mod client;
pub mod config;
pub mod memory;
pub mod registry;
pub mod stomp;
pub mod subscription;
pub mod transport;

pub use client::{BusClient, ConnectionState};
pub use config::{BusConfig, ReconnectPolicy};
pub use memory::{BrokerSubscription, MemoryBroker};
pub use registry::{Handler, SubscriptionRegistry};
pub use subscription::SubscriptionHandle;
pub use transport::{websocket_url, Transport, TransportLink, WebSocketTransport};
