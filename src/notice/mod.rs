//! Уведомления: нормализованная модель, доска состояния страницы,
//! сигналы для страниц и живая лента с шины.

pub mod board;
pub mod feed;
pub mod model;
pub mod signal;

pub use board::{normalize_unread_count, NoticeBoard, UNREAD_DISPLAY_CAP};
pub use feed::{user_topic, NoticeFeed, USER_QUEUE};
pub use model::{Notice, NoticeKind};
pub use signal::{PageEvent, PageRoute, PageSignal};
