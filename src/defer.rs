//! Iterative teardown for deeply nested values.
//!
//! Effects and trampolines are built out of closures that capture other
//! effects and continuations. A chain of ten thousand `and_then` calls is
//! therefore a ten-thousand-deep ownership tree, and the compiler-generated
//! drop glue would walk it recursively. [`Deferred`] breaks that recursion:
//! dropping a `Deferred` while another one is already being torn down on the
//! same thread only enqueues the value, and the outermost drop drains the
//! queue in a loop.

use std::any::Any;
use std::cell::RefCell;

thread_local! {
    static PENDING: RefCell<Option<Vec<Box<dyn Any>>>> = const { RefCell::new(None) };
}

/// Owns a value whose drop is flattened into the thread's teardown queue.
pub(crate) struct Deferred<T: 'static>(Option<T>);

impl<T: 'static> Deferred<T> {
    pub(crate) fn new(value: T) -> Self {
        Deferred(Some(value))
    }

    pub(crate) fn get(&self) -> &T {
        match &self.0 {
            Some(value) => value,
            None => unreachable!("deferred value is only taken by drop or into_inner"),
        }
    }

    pub(crate) fn into_inner(mut self) -> T {
        match self.0.take() {
            Some(value) => value,
            None => unreachable!("deferred value is only taken by drop or into_inner"),
        }
    }
}

impl<T: 'static> Drop for Deferred<T> {
    fn drop(&mut self) {
        if let Some(value) = self.0.take() {
            release(Box::new(value));
        }
    }
}

/// Resets the queue even if a destructor panics mid-drain.
struct DrainGuard;

impl Drop for DrainGuard {
    fn drop(&mut self) {
        let leftover = PENDING.try_with(|pending| pending.borrow_mut().take());
        // Anything left here was queued by a panicking destructor; dropping it
        // outside the borrow starts a fresh drain.
        drop(leftover);
    }
}

fn release(value: Box<dyn Any>) {
    let owner = PENDING.try_with(|pending| {
        let mut pending = pending.borrow_mut();
        match pending.as_mut() {
            Some(queue) => {
                queue.push(value);
                None
            }
            None => {
                *pending = Some(Vec::new());
                Some(value)
            }
        }
    });

    // `Err` means thread-local storage is gone; the closure (and the value it
    // captured) has already been dropped the ordinary way.
    if let Ok(Some(value)) = owner {
        let _guard = DrainGuard;
        drop(value);
        while let Some(next) = PENDING.with(|pending| pending.borrow_mut().as_mut().and_then(Vec::pop))
        {
            drop(next);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct Node {
        _next: Option<Deferred<Box<Node>>>,
        drops: Arc<AtomicUsize>,
    }

    impl Drop for Node {
        fn drop(&mut self) {
            self.drops.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_deep_chain_drops_every_node() {
        let drops = Arc::new(AtomicUsize::new(0));
        let mut head: Option<Deferred<Box<Node>>> = None;
        for _ in 0..200_000 {
            head = Some(Deferred::new(Box::new(Node {
                _next: head.take(),
                drops: Arc::clone(&drops),
            })));
        }

        let handle = std::thread::Builder::new()
            .stack_size(128 * 1024)
            .spawn(move || drop(head))
            .unwrap();
        handle.join().unwrap();

        assert_eq!(drops.load(Ordering::SeqCst), 200_000);
    }

    #[test]
    fn test_into_inner_skips_deferred_drop() {
        let drops = Arc::new(AtomicUsize::new(0));
        let node = Deferred::new(Box::new(Node {
            _next: None,
            drops: Arc::clone(&drops),
        }));
        let inner = node.into_inner();
        assert_eq!(drops.load(Ordering::SeqCst), 0);
        drop(inner);
        assert_eq!(drops.load(Ordering::SeqCst), 1);
    }
}
