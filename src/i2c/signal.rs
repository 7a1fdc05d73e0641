// Licensed under the Apache-2.0 license

//! Completion hand-off from interrupt context to task context.

use core::cell::{Cell, RefCell};
use core::future::poll_fn;
use core::task::{Poll, Waker};

use critical_section::Mutex;

use crate::i2c::common::Error;

/// One-shot slot carrying the outcome of the last transfer.
///
/// The interrupt side calls [`CompletionSignal::signal`]; the task side either
/// polls [`CompletionSignal::try_take`] or awaits [`CompletionSignal::wait`].
pub struct CompletionSignal {
    outcome: Mutex<Cell<Option<Result<(), Error>>>>,
    waker: Mutex<RefCell<Option<Waker>>>,
}

impl Default for CompletionSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl CompletionSignal {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            outcome: Mutex::new(Cell::new(None)),
            waker: Mutex::new(RefCell::new(None)),
        }
    }

    /// Drop any stale outcome. Call before arming a new transfer.
    pub fn reset(&self) {
        critical_section::with(|cs| self.outcome.borrow(cs).set(None));
    }

    /// Publish an outcome and wake the waiting task, if any.
    pub fn signal(&self, outcome: Result<(), Error>) {
        let waker = critical_section::with(|cs| {
            self.outcome.borrow(cs).set(Some(outcome));
            self.waker.borrow_ref_mut(cs).take()
        });
        if let Some(waker) = waker {
            waker.wake();
        }
    }

    #[must_use]
    pub fn is_signaled(&self) -> bool {
        critical_section::with(|cs| self.outcome.borrow(cs).get().is_some())
    }

    /// Consume the outcome if one has been published.
    pub fn try_take(&self) -> Option<Result<(), Error>> {
        critical_section::with(|cs| self.outcome.borrow(cs).take())
    }

    /// Wait for the outcome and consume it.
    ///
    /// The waker is registered in the same critical section that checks the
    /// slot, so a signal cannot slip in between.
    pub async fn wait(&self) -> Result<(), Error> {
        poll_fn(|cx| {
            critical_section::with(|cs| {
                if let Some(outcome) = self.outcome.borrow(cs).take() {
                    return Poll::Ready(outcome);
                }
                let mut slot = self.waker.borrow_ref_mut(cs);
                match slot.as_ref() {
                    Some(waker) if waker.will_wake(cx.waker()) => {}
                    _ => *slot = Some(cx.waker().clone()),
                }
                Poll::Pending
            })
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::future::Future;
    use core::pin::pin;
    use core::sync::atomic::{AtomicUsize, Ordering};
    use core::task::Context;
    use futures::task::{waker, ArcWake};
    use std::sync::Arc;

    #[derive(Default)]
    struct CountingWaker {
        wakes: AtomicUsize,
    }

    impl ArcWake for CountingWaker {
        fn wake_by_ref(arc_self: &Arc<Self>) {
            arc_self.wakes.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_try_take_is_one_shot() {
        let signal = CompletionSignal::new();
        assert_eq!(signal.try_take(), None);
        signal.signal(Ok(()));
        assert!(signal.is_signaled());
        assert_eq!(signal.try_take(), Some(Ok(())));
        assert!(!signal.is_signaled());
        assert_eq!(signal.try_take(), None);
    }

    #[test]
    fn test_reset_discards_stale_outcome() {
        let signal = CompletionSignal::new();
        signal.signal(Err(Error::AckFailed { attempts: 2 }));
        signal.reset();
        assert_eq!(signal.try_take(), None);
    }

    #[test]
    fn test_wait_wakes_on_signal() {
        let signal = CompletionSignal::new();
        let counter = Arc::new(CountingWaker::default());
        let waker = waker(counter.clone());
        let mut cx = Context::from_waker(&waker);

        let mut fut = pin!(signal.wait());
        assert!(fut.as_mut().poll(&mut cx).is_pending());
        assert!(fut.as_mut().poll(&mut cx).is_pending());
        assert_eq!(counter.wakes.load(Ordering::SeqCst), 0);

        signal.signal(Err(Error::AckFailed { attempts: 5 }));
        assert_eq!(counter.wakes.load(Ordering::SeqCst), 1);
        assert_eq!(
            fut.as_mut().poll(&mut cx),
            Poll::Ready(Err(Error::AckFailed { attempts: 5 }))
        );
    }

    #[test]
    fn test_wait_ready_when_already_signaled() {
        let signal = CompletionSignal::new();
        signal.signal(Ok(()));
        assert_eq!(futures::executor::block_on(signal.wait()), Ok(()));
    }
}
