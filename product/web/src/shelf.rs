use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use parking_lot::Mutex;

/// A finished ZIP waiting for the browser to fetch it.
#[derive(Debug, Clone)]
pub struct ReadyArchive {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

/// Bounded hand-off between the harvest that built an archive and the
/// download request that collects it. Each archive can be taken once; the
/// oldest is dropped when the shelf is full.
#[derive(Debug, Clone)]
pub struct ArchiveShelf {
    inner: Arc<Mutex<ShelfInner>>,
    capacity: usize,
}

#[derive(Debug, Default)]
struct ShelfInner {
    order: VecDeque<String>,
    items: HashMap<String, ReadyArchive>,
}

impl ArchiveShelf {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(ShelfInner::default())),
            capacity: capacity.max(1),
        }
    }

    pub fn put(&self, archive: ReadyArchive) -> String {
        let id = uuid::Uuid::new_v4().simple().to_string();
        let mut inner = self.inner.lock();
        inner.order.push_back(id.clone());
        inner.items.insert(id.clone(), archive);
        while inner.order.len() > self.capacity {
            if let Some(oldest) = inner.order.pop_front() {
                inner.items.remove(&oldest);
            }
        }
        id
    }

    pub fn take(&self, id: &str) -> Option<ReadyArchive> {
        let mut inner = self.inner.lock();
        let archive = inner.items.remove(id)?;
        inner.order.retain(|existing| existing != id);
        Some(archive)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
