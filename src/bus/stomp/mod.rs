//! Протокол STOMP 1.2 поверх транспорта шины.
//!
//! - `frame`: модель кадра, команды и согласование heart-beat.
//! - `encoder`: сериализация кадра в текст (с экранированием заголовков).
//! - `decoder`: инкрементальный разбор входящего текста в кадры и heart-beat.

pub mod decoder;
pub mod encoder;
pub mod frame;

pub use decoder::*;
pub use encoder::*;
pub use frame::*;
