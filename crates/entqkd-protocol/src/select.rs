//! Two-sided wait.
//!
//! A round often needs two independent things before it can proceed: a
//! prepared qubit and an entangled pair, or a pair half and the corrections
//! for it. Either may come first. [`DualWait`] arms both, reports each as it
//! fires, and lets the caller re-arm a side without losing the other.

use std::future::{poll_fn, Future};
use std::pin::Pin;
use std::task::{Context, Poll};

/// Boxed, sendable future.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Which side fired, with its output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Arrival<L, R> {
    Left(L),
    Right(R),
}

/// Which sides have fired since they were last armed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WaitProgress {
    pub got_left: bool,
    pub got_right: bool,
}

impl WaitProgress {
    pub fn both(&self) -> bool {
        self.got_left && self.got_right
    }
}

enum Side<'a, T> {
    Armed(BoxFuture<'a, T>),
    Fired,
}

impl<'a, T> Side<'a, T> {
    fn poll(&mut self, cx: &mut Context<'_>) -> Poll<Option<T>> {
        match self {
            Side::Armed(fut) => match fut.as_mut().poll(cx) {
                Poll::Ready(out) => {
                    *self = Side::Fired;
                    Poll::Ready(Some(out))
                }
                Poll::Pending => Poll::Pending,
            },
            Side::Fired => Poll::Ready(None),
        }
    }

    fn fired(&self) -> bool {
        matches!(self, Side::Fired)
    }
}

/// Wait on two futures, yielding each output as it completes.
///
/// When both sides are ready in the same poll, the side that did not fire
/// last goes first, so neither can starve the other across re-arms.
pub struct DualWait<'a, L, R> {
    left: Side<'a, L>,
    right: Side<'a, R>,
    left_first: bool,
}

impl<'a, L, R> DualWait<'a, L, R> {
    /// Arm both sides.
    pub fn new<FL, FR>(left: FL, right: FR) -> Self
    where
        FL: Future<Output = L> + Send + 'a,
        FR: Future<Output = R> + Send + 'a,
    {
        Self {
            left: Side::Armed(Box::pin(left)),
            right: Side::Armed(Box::pin(right)),
            left_first: true,
        }
    }

    pub fn progress(&self) -> WaitProgress {
        WaitProgress {
            got_left: self.left.fired(),
            got_right: self.right.fired(),
        }
    }

    /// Arm the left side again, dropping any pending left future.
    pub fn rearm_left<F>(&mut self, fut: F)
    where
        F: Future<Output = L> + Send + 'a,
    {
        self.left = Side::Armed(Box::pin(fut));
    }

    /// Arm the right side again, dropping any pending right future.
    pub fn rearm_right<F>(&mut self, fut: F)
    where
        F: Future<Output = R> + Send + 'a,
    {
        self.right = Side::Armed(Box::pin(fut));
    }

    /// Poll for the next arrival. `Ready(None)` once both sides have fired.
    pub fn poll_next(&mut self, cx: &mut Context<'_>) -> Poll<Option<Arrival<L, R>>> {
        if self.left.fired() && self.right.fired() {
            return Poll::Ready(None);
        }

        if self.left_first {
            if let Poll::Ready(Some(out)) = self.left.poll(cx) {
                self.left_first = false;
                return Poll::Ready(Some(Arrival::Left(out)));
            }
            if let Poll::Ready(Some(out)) = self.right.poll(cx) {
                self.left_first = true;
                return Poll::Ready(Some(Arrival::Right(out)));
            }
        } else {
            if let Poll::Ready(Some(out)) = self.right.poll(cx) {
                self.left_first = true;
                return Poll::Ready(Some(Arrival::Right(out)));
            }
            if let Poll::Ready(Some(out)) = self.left.poll(cx) {
                self.left_first = false;
                return Poll::Ready(Some(Arrival::Left(out)));
            }
        }

        Poll::Pending
    }

    /// Wait for the next arrival.
    pub async fn next(&mut self) -> Option<Arrival<L, R>> {
        poll_fn(|cx| self.poll_next(cx)).await
    }

    /// Wait for both sides and return their outputs.
    ///
    /// Returns `None` if either side already fired through [`next`](Self::next)
    /// and was not re-armed.
    pub async fn both(mut self) -> Option<(L, R)> {
        let mut left = None;
        let mut right = None;
        while let Some(arrival) = self.next().await {
            match arrival {
                Arrival::Left(l) => left = Some(l),
                Arrival::Right(r) => right = Some(r),
            }
        }
        left.zip(right)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock;
    use std::time::Duration;
    use tokio::time::Instant;

    async fn after(nanos: u64, value: u32) -> u32 {
        clock::sleep(Duration::from_nanos(nanos)).await;
        value
    }

    #[tokio::test(start_paused = true)]
    async fn test_arrivals_follow_time() {
        let mut wait = DualWait::new(after(30, 1), after(10, 2));

        assert_eq!(wait.next().await, Some(Arrival::Right(2)));
        assert_eq!(
            wait.progress(),
            WaitProgress {
                got_left: false,
                got_right: true
            }
        );
        assert_eq!(wait.next().await, Some(Arrival::Left(1)));
        assert!(wait.progress().both());
        assert_eq!(wait.next().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_either_order_yields_both() {
        for (l, r) in [(5, 50), (50, 5), (20, 20)] {
            let start = Instant::now();
            let both = DualWait::new(after(l, 7), after(r, 9)).both().await;
            assert_eq!(both, Some((7, 9)));
            assert_eq!(clock::since(start), Duration::from_nanos(l.max(r)));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_both_after_partial_next_is_none() {
        let mut wait = DualWait::new(after(10, 1), after(20, 2));
        assert_eq!(wait.next().await, Some(Arrival::Left(1)));
        assert_eq!(wait.both().await, None);

        let mut wait = DualWait::new(after(10, 1), after(20, 2));
        assert_eq!(wait.next().await, Some(Arrival::Left(1)));
        wait.rearm_left(after(5, 3));
        assert_eq!(wait.both().await, Some((3, 2)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_simultaneous_arrivals_alternate() {
        let mut wait = DualWait::new(async { 'l' }, async { 'r' });
        assert_eq!(wait.next().await, Some(Arrival::Left('l')));
        assert_eq!(wait.next().await, Some(Arrival::Right('r')));

        wait.rearm_left(async { 'L' });
        wait.rearm_right(async { 'R' });
        // Right fired last, so left goes first again.
        assert_eq!(wait.next().await, Some(Arrival::Left('L')));

        wait.rearm_left(async { 'x' });
        // Left fired last; right now has priority.
        assert_eq!(wait.next().await, Some(Arrival::Right('R')));
        assert_eq!(wait.next().await, Some(Arrival::Left('x')));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rearm_keeps_other_side_pending() {
        let mut wait = DualWait::new(after(10, 1), after(100, 2));
        assert_eq!(wait.next().await, Some(Arrival::Left(1)));

        wait.rearm_left(after(10, 3));
        assert_eq!(wait.next().await, Some(Arrival::Left(3)));
        assert!(!wait.progress().got_right);
        assert_eq!(wait.next().await, Some(Arrival::Right(2)));
    }
}
