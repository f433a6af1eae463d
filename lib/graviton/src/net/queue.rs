use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

/// Thread-safe FIFO shared between the network and simulation tasks.
/// A bounded queue drops its oldest entry on overflow so producers never
/// block; the real-time loops on either side must not stall on each other.
pub struct SafeQueue<T> {
    inner: Mutex<VecDeque<T>>,
    capacity: Option<usize>,
}

impl<T> SafeQueue<T> {
    pub fn unbounded() -> SafeQueue<T> {
        SafeQueue {
            inner: Mutex::new(VecDeque::new()),
            capacity: None,
        }
    }

    pub fn bounded(capacity: usize) -> SafeQueue<T> {
        SafeQueue {
            inner: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity: Some(capacity),
        }
    }

    fn lock(&self) -> MutexGuard<VecDeque<T>> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Returns false when an old entry had to be dropped to make room.
    pub fn push(&self, item: T) -> bool {
        let mut queue = self.lock();
        let mut clean = true;

        if let Some(capacity) = self.capacity {
            while queue.len() >= capacity {
                queue.pop_front();
                clean = false;
            }
        }

        queue.push_back(item);
        clean
    }

    pub fn push_front(&self, item: T) {
        self.lock().push_front(item);
    }

    pub fn try_pop(&self) -> Option<T> {
        self.lock().pop_front()
    }

    pub fn drain(&self) -> Vec<T> {
        self.lock().drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_fifo_order() {
        let queue = SafeQueue::unbounded();

        queue.push(1);
        queue.push(2);
        queue.push(3);

        assert_eq!(queue.try_pop(), Some(1));
        assert_eq!(queue.try_pop(), Some(2));
        assert_eq!(queue.try_pop(), Some(3));
        assert_eq!(queue.try_pop(), None);
    }

    #[test]
    fn test_bounded_drops_oldest() {
        let queue = SafeQueue::bounded(2);

        assert!(queue.push(1));
        assert!(queue.push(2));
        assert!(!queue.push(3));

        assert_eq!(queue.drain(), vec![2, 3]);
    }

    #[test]
    fn test_push_front_requeues() {
        let queue = SafeQueue::unbounded();

        queue.push(2);
        queue.push_front(1);

        assert_eq!(queue.drain(), vec![1, 2]);
    }

    #[test]
    fn test_concurrent_producers() {
        let queue = Arc::new(SafeQueue::unbounded());

        let handles: Vec<_> = (0..4)
            .map(|t| {
                let queue = Arc::clone(&queue);
                thread::spawn(move || {
                    for i in 0..100 {
                        queue.push(t * 100 + i);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(queue.len(), 400);
    }
}
