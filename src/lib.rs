/// Message bus client: STOMP over WebSocket, reconnect and resubscribe.
pub mod bus;
/// Application settings loading.
pub mod config;
/// Flexible logging (formatting, filters, sinks).
pub mod logging;
/// Notice model, page board and live feed.
pub mod notice;
/// Push relay: system notifications, page signals and click routing.
pub mod relay;

// -----------------------------------------------------------------------------
//  Frequently used public types
// -----------------------------------------------------------------------------

/// Bus client, its configuration and subscription handles.
pub use bus::{BusClient, BusConfig, ConnectionState, ReconnectPolicy, SubscriptionHandle};
/// Settings loaded from file and environment.
pub use config::Settings;
/// Logging initialization.
pub use logging::{init_logging, LoggingConfig, LoggingHandle};
/// Error types shared by every module.
pub use noticelink_error::{BusError, ConfigError, NoticeResult, RelayError, StackError, StatusCode};
/// Normalized notices and page-facing events.
pub use notice::{Notice, NoticeBoard, NoticeFeed, NoticeKind, PageEvent, PageRoute, PageSignal};
/// Push relay and its collaborators.
pub use relay::{
    ClickOutcome, NotificationRelay, Notifier, PageRegistry, PushPayload, RelayOptions,
    TracingNotifier,
};
