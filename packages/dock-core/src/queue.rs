//! Single-threaded FIFO callback queue.
//!
//! Handles are cheap clones of the same queue. Anything may push at any
//! time, including from inside a callback that is itself being dispatched
//! from this queue; the dispatcher picks the new entry up after the current
//! one returns. Entries from one producer keep their order.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

pub struct TaskQueue<T> {
    inner: Rc<RefCell<VecDeque<T>>>,
}

impl<T> TaskQueue<T> {
    pub fn new() -> Self {
        Self {
            inner: Rc::new(RefCell::new(VecDeque::new())),
        }
    }

    pub fn push(&self, task: T) {
        self.inner.borrow_mut().push_back(task);
    }

    /// Pop one entry. The borrow is released before returning so the caller
    /// may push while handling it.
    pub fn pop(&self) -> Option<T> {
        self.inner.borrow_mut().pop_front()
    }

    /// Take everything queued so far.
    pub fn drain(&self) -> Vec<T> {
        self.inner.borrow_mut().drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.inner.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.borrow().is_empty()
    }
}

impl<T> Clone for TaskQueue<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T> Default for TaskQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for TaskQueue<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.inner.borrow().iter()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_during_dispatch_runs_after_current() {
        let queue: TaskQueue<u32> = TaskQueue::new();
        let producer = queue.clone();
        queue.push(1);
        queue.push(2);

        let mut seen = Vec::new();
        while let Some(n) = queue.pop() {
            if n == 1 {
                producer.push(10);
            }
            seen.push(n);
        }
        assert_eq!(seen, vec![1, 2, 10]);
    }

    #[test]
    fn test_drain_empties() {
        let queue = TaskQueue::new();
        queue.push("a");
        queue.push("b");
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.drain(), vec!["a", "b"]);
        assert!(queue.is_empty());
    }
}
