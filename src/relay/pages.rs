//! Канал между фоновым контекстом и открытыми страницами.
//!
//! Каждая страница регистрируется в [`PageRegistry`] и получает
//! [`PageHandle`] с входящим каналом событий. Закрытая страница (хэндл
//! уничтожен) обнаруживается при следующей отправке и удаляется из реестра.

use std::sync::{
    atomic::{AtomicU64, AtomicUsize, Ordering},
    Arc,
};

use dashmap::DashMap;
use noticelink_error::RelayError;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, trace};
use uuid::Uuid;

use crate::notice::PageEvent;

/// Реестр открытых страниц.
#[derive(Clone)]
pub struct PageRegistry {
    inner: Arc<RegistryInner>,
}

struct RegistryInner {
    pages: DashMap<String, PageEntry>,
    next_seq: AtomicU64,
    /// Страницы, открытые фоновым контекстом, передаются хозяину окон.
    opened_tx: mpsc::UnboundedSender<PageHandle>,
    opened_rx: Mutex<Option<mpsc::UnboundedReceiver<PageHandle>>>,
}

struct PageEntry {
    /// Порядок открытия: "первая" страница — с наименьшим номером.
    seq: u64,
    url: Option<String>,
    events: mpsc::UnboundedSender<PageEvent>,
    focus: Arc<AtomicUsize>,
}

/// Сторона страницы.
#[derive(Debug)]
pub struct PageHandle {
    id: String,
    url: Option<String>,
    events: mpsc::UnboundedReceiver<PageEvent>,
    focus: Arc<AtomicUsize>,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl PageRegistry {
    pub fn new() -> Self {
        let (opened_tx, opened_rx) = mpsc::unbounded_channel();
        Self {
            inner: Arc::new(RegistryInner {
                pages: DashMap::new(),
                next_seq: AtomicU64::new(0),
                opened_tx,
                opened_rx: Mutex::new(Some(opened_rx)),
            }),
        }
    }

    /// Регистрирует страницу, открытую пользователем.
    pub fn open_page(
        &self,
        url: Option<&str>,
    ) -> PageHandle {
        let id = Uuid::new_v4().to_string();
        let (tx, rx) = mpsc::unbounded_channel();
        let focus = Arc::new(AtomicUsize::new(0));
        let seq = self.inner.next_seq.fetch_add(1, Ordering::SeqCst);
        self.inner.pages.insert(
            id.clone(),
            PageEntry {
                seq,
                url: url.map(str::to_string),
                events: tx,
                focus: focus.clone(),
            },
        );
        debug!(page = %id, ?url, "Page registered");
        PageHandle {
            id,
            url: url.map(str::to_string),
            events: rx,
            focus,
        }
    }

    /// Открывает новую страницу по адресу `url`. Её хэндл уходит хозяину
    /// окон (см. [`PageRegistry::take_opened`]).
    pub fn open_window(
        &self,
        url: &str,
    ) -> Result<String, RelayError> {
        let handle = self.open_page(Some(url));
        let id = handle.id.clone();
        if self.inner.opened_tx.send(handle).is_err() {
            self.inner.pages.remove(&id);
            return Err(RelayError::PageOpenFailed {
                url: url.to_string(),
                reason: "no window host is listening".to_string(),
            });
        }
        Ok(id)
    }

    /// Забирает канал страниц, открытых фоновым контекстом. Доступен один
    /// раз.
    pub fn take_opened(&self) -> Option<mpsc::UnboundedReceiver<PageHandle>> {
        self.inner.opened_rx.lock().take()
    }

    /// Живые страницы в порядке открытия.
    pub fn pages(&self) -> Vec<String> {
        self.prune();
        let mut pages: Vec<(u64, String)> = self
            .inner
            .pages
            .iter()
            .map(|e| (e.seq, e.key().clone()))
            .collect();
        pages.sort();
        pages.into_iter().map(|(_, id)| id).collect()
    }

    pub fn url_of(
        &self,
        page: &str,
    ) -> Option<String> {
        self.inner.pages.get(page).and_then(|e| e.url.clone())
    }

    pub fn len(&self) -> usize {
        self.pages().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Отправляет событие одной странице.
    pub fn post(
        &self,
        page: &str,
        event: PageEvent,
    ) -> Result<(), RelayError> {
        let delivered = match self.inner.pages.get(page) {
            Some(entry) => entry.events.send(event).is_ok(),
            None => false,
        };
        if delivered {
            trace!(page, "Event posted to page");
            return Ok(());
        }
        self.inner.pages.remove(page);
        Err(RelayError::PageClosed {
            page_id: page.to_string(),
        })
    }

    /// Рассылает событие всем страницам. Возвращает число получателей.
    pub fn broadcast(
        &self,
        event: PageEvent,
    ) -> usize {
        let mut delivered = 0;
        let mut closed = Vec::new();
        for entry in self.inner.pages.iter() {
            if entry.events.send(event.clone()).is_ok() {
                delivered += 1;
            } else {
                closed.push(entry.key().clone());
            }
        }
        for page in closed {
            debug!(page = %page, "Pruning closed page");
            self.inner.pages.remove(&page);
        }
        delivered
    }

    /// Переводит фокус на страницу.
    pub fn focus(
        &self,
        page: &str,
    ) -> Result<(), RelayError> {
        match self.inner.pages.get(page) {
            Some(entry) if !entry.events.is_closed() => {
                entry.focus.fetch_add(1, Ordering::SeqCst);
                debug!(page, "Page focused");
                Ok(())
            }
            _ => Err(RelayError::PageClosed {
                page_id: page.to_string(),
            }),
        }
    }

    fn prune(&self) {
        self.inner.pages.retain(|_, e| !e.events.is_closed());
    }
}

impl PageHandle {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    /// Следующее событие для страницы.
    pub async fn recv(&mut self) -> Option<PageEvent> {
        self.events.recv().await
    }

    pub fn try_recv(&mut self) -> Option<PageEvent> {
        self.events.try_recv().ok()
    }

    /// Сколько раз страница получала фокус.
    pub fn focus_count(&self) -> usize {
        self.focus.load(Ordering::SeqCst)
    }
}

////////////////////////////////////////////////////////////////////////////////
// Общие реализации трейтов
////////////////////////////////////////////////////////////////////////////////

impl Default for PageRegistry {
    fn default() -> Self {
        Self::new()
    }
}
