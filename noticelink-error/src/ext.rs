use std::{any::Any, error::Error};

use crate::StatusCode;

/// Расширение для ошибок библиотеки (object-safe).
///
/// Даёт статус-код ошибки и доступ к конкретному типу через downcast.
pub trait ErrorExt: Error + Send + Sync + 'static {
    /// Статус ошибки.
    ///
    /// По умолчанию возвращает [`StatusCode::Internal`].
    fn status_code(&self) -> StatusCode {
        StatusCode::Internal
    }

    /// Возвращает ошибку как [`Any`](std::any::Any),
    /// чтобы можно было выполнить downcast к конкретному типу.
    fn as_any(&self) -> &dyn Any;
}

/// Трейт-расширение для `Result`, добавляющее удобные методы контекстирования.
///
/// Позволяет вызывать `.context(...)` и `.with_context(...)` на результатах,
/// превращая ошибку в [`StackError`](crate::StackError) и приклеивая к ней
/// контекст.
pub trait ResultExt<T> {
    /// Добавляет контекст к ошибке.
    fn context<C>(
        self,
        ctx: C,
    ) -> Result<T, crate::StackError>
    where
        C: Into<String>;

    /// Добавляет ленивый контекст (вызывается только в случае ошибки).
    fn with_context<C, F>(
        self,
        f: F,
    ) -> Result<T, crate::StackError>
    where
        C: Into<String>,
        F: FnOnce() -> C;
}

impl<T, E> ResultExt<T> for Result<T, E>
where
    E: Into<crate::StackError>,
{
    #[track_caller]
    fn context<C>(
        self,
        ctx: C,
    ) -> Result<T, crate::StackError>
    where
        C: Into<String>,
    {
        self.map_err(|e| e.into().context(ctx))
    }

    #[track_caller]
    fn with_context<C, F>(
        self,
        f: F,
    ) -> Result<T, crate::StackError>
    where
        C: Into<String>,
        F: FnOnce() -> C,
    {
        self.map_err(|e| e.into().context(f()))
    }
}

#[cfg(test)]
mod tests {
    use std::fmt;

    use super::*;
    use crate::BusError;

    // Ошибка без переопределения status_code (использует default = Internal).
    #[derive(Debug)]
    struct DefaultError(&'static str);

    impl fmt::Display for DefaultError {
        fn fmt(
            &self,
            f: &mut fmt::Formatter<'_>,
        ) -> fmt::Result {
            write!(f, "DefaultError: {}", self.0)
        }
    }

    impl Error for DefaultError {}

    impl ErrorExt for DefaultError {
        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    /// Тест проверяет статус по умолчанию и downcast.
    #[test]
    fn test_default_status_and_downcast() {
        let err = DefaultError("secret");
        assert_eq!(err.status_code(), StatusCode::Internal);
        assert!(err.as_any().downcast_ref::<DefaultError>().is_some());
    }

    /// Тест проверяет, что with_context вычисляется только при ошибке.
    #[test]
    fn test_with_context_is_lazy() {
        let mut called = false;
        let ok: Result<u8, BusError> = Ok(1);
        let _ = ok.with_context(|| {
            called = true;
            "never"
        });
        assert!(!called);

        let err: Result<u8, BusError> = Err(BusError::NotConnected);
        let stack = err.context("sending SUBSCRIBE").unwrap_err();
        assert_eq!(stack.contexts()[0].message, "sending SUBSCRIBE");
        assert_eq!(stack.status_code(), StatusCode::NotConnected);
    }
}
