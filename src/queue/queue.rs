use std::collections::VecDeque;

use tokio::sync::Mutex;

/// FIFO shared between any number of producers and the dispatch loop. Every
/// operation takes the lock once, so an item is handed out exactly once.
#[derive(Debug)]
pub struct Queue<T> {
    items: Mutex<VecDeque<T>>,
}

impl<T> Default for Queue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Queue<T> {
    pub fn new() -> Self {
        Queue {
            items: Mutex::new(VecDeque::new()),
        }
    }

    pub async fn enqueue(&self, item: T) {
        self.items.lock().await.push_back(item);
    }

    pub async fn dequeue(&self) -> Option<T> {
        self.items.lock().await.pop_front()
    }

    pub async fn len(&self) -> usize {
        self.items.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.items.lock().await.is_empty()
    }
}

impl<T: Clone> Queue<T> {
    pub async fn peek(&self) -> Option<T> {
        self.items.lock().await.front().cloned()
    }
}
