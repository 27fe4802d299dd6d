use serde_json::Value;

use super::{model::as_u64, Notice};

/// Потолок счётчика непрочитанного при локальном увеличении.
pub const UNREAD_DISPLAY_CAP: u32 = 99;

/// Состояние уведомлений страницы: последние уведомления и счётчик
/// непрочитанного.
///
/// Авторитетное состояние живёт на сервере. Доска лишь применяет
/// оптимистичные изменения до следующего перечитывания.
#[derive(Debug, Clone, Default)]
pub struct NoticeBoard {
    items: Vec<Notice>,
    unread: u32,
}

impl NoticeBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn items(&self) -> &[Notice] {
        &self.items
    }

    pub fn unread(&self) -> u32 {
        self.unread
    }

    /// Ставит уведомление в начало списка. Непрочитанное увеличивает
    /// счётчик, но не выше [`UNREAD_DISPLAY_CAP`].
    pub fn prepend(
        &mut self,
        notice: Notice,
    ) {
        if !notice.read {
            self.unread = self.unread.saturating_add(1).min(UNREAD_DISPLAY_CAP);
        }
        self.items.insert(0, notice);
    }

    /// Заменяет список результатом перечитывания.
    pub fn replace(
        &mut self,
        items: Vec<Notice>,
    ) {
        self.items = items;
    }

    /// Устанавливает счётчик из ответа сервера (см. [`normalize_unread_count`]).
    pub fn set_unread(
        &mut self,
        count: u32,
    ) {
        self.unread = count;
    }

    /// Помечает уведомление прочитанным. Возвращает `true`, если оно было
    /// непрочитанным.
    pub fn mark_read(
        &mut self,
        id: u64,
    ) -> bool {
        match self.items.iter_mut().find(|n| n.id == id) {
            Some(n) if !n.read => {
                n.read = true;
                self.unread = self.unread.saturating_sub(1);
                true
            }
            _ => false,
        }
    }

    pub fn mark_all_read(&mut self) {
        self.items.iter_mut().for_each(|n| n.read = true);
        self.unread = 0;
    }
}

/// Извлекает число непрочитанных из ответа сервера.
///
/// Поддерживаются обе исторические формы: объект со счётчиком `count` или
/// `unread`, и список тредов, у каждого из которых своё поле `unread`
/// (суммируется). Всё остальное даёт 0.
pub fn normalize_unread_count(raw: &Value) -> u32 {
    let clamp = |n: u64| u32::try_from(n).unwrap_or(u32::MAX);
    match raw {
        Value::Object(map) => ["count", "unread"]
            .iter()
            .find_map(|key| map.get(*key).filter(|v| !v.is_null()))
            .map(|v| as_u64(v).map(clamp).unwrap_or(0))
            .unwrap_or(0),
        Value::Array(threads) => {
            let total: u64 = threads
                .iter()
                .filter_map(|t| t.get("unread"))
                .filter_map(as_u64)
                .sum();
            clamp(total)
        }
        _ => 0,
    }
}
