pub mod bus;
pub mod config;
pub mod relay;

// Публичный экспорт всех типов ошибок и функций из вложенных
// модулей, чтобы упростить доступ к ним из внешнего кода.
pub use bus::*;
pub use config::*;
pub use relay::*;
