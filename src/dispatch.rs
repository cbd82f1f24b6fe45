//! Ordering of cell broadcasts.
//!
//! A cell publishes every value it caches on two lanes:
//! - the internal lane feeds the cells derived from it. It runs synchronously,
//!   so when a write returns every dependent cell has cached the new value,
//!   even when the write happens inside a subscriber callback;
//! - the external lane feeds user observers. It is held back while anything
//!   else is in flight and drained FIFO by the outermost call, so the direct
//!   subscribers of a value always hear about a change before the subscribers
//!   of values derived from it.
//!
//! Subject subscriptions changed during an emission are deferred by rxrust to
//! the context scheduler. [`CellScheduler`](crate::stream::CellScheduler) hands
//! them to this module, which runs them between two external deliveries.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;

use tracing::trace;

type Job = Box<dyn FnOnce()>;

// Set while the internal lane is being drained on this thread.
thread_local! {
    static PROPAGATING: Cell<bool> = const { Cell::new(false) };
}

// Open batches, plus the external drain loop itself.
thread_local! {
    static HOLDS: Cell<usize> = const { Cell::new(0) };
}

thread_local! {
    static INTERNAL: RefCell<VecDeque<Job>> = const { RefCell::new(VecDeque::new()) };
    static EXTERNAL: RefCell<VecDeque<Job>> = const { RefCell::new(VecDeque::new()) };
    static DEFERRED: RefCell<VecDeque<Job>> = const { RefCell::new(VecDeque::new()) };
}

/// Whether a cell broadcast is running on this thread.
///
/// Inside a subscriber callback this is `true`. Values written from there are
/// cached by every dependent cell at once, and delivered to observers once the
/// callback's own broadcast completes.
pub fn is_dispatching() -> bool {
    HOLDS.with(Cell::get) > 0 || PROPAGATING.with(Cell::get)
}

fn push(queue: &'static std::thread::LocalKey<RefCell<VecDeque<Job>>>, job: Job) -> usize {
    queue.with(|queue| {
        let mut queue = queue.borrow_mut();
        queue.push_back(job);
        queue.len()
    })
}

fn pop(queue: &'static std::thread::LocalKey<RefCell<VecDeque<Job>>>) -> Option<Job> {
    queue.with(|queue| queue.borrow_mut().pop_front())
}

/// Hands `internal` to the derived cells and queues `external` for observers.
pub(crate) fn publish(internal: impl FnOnce() + 'static, external: impl FnOnce() + 'static) {
    push(&EXTERNAL, Box::new(external));
    if PROPAGATING.with(Cell::get) {
        cov_mark::hit!(nested_broadcast_queued);
        let pending = push(&INTERNAL, Box::new(internal));
        trace!(pending, "queued nested broadcast");
    } else {
        let _lane = Propagation::enter();
        internal();
        while let Some(next) = pop(&INTERNAL) {
            next();
        }
    }
    flush();
}

/// Queues `external` for observers only.
pub(crate) fn notify(external: impl FnOnce() + 'static) {
    push(&EXTERNAL, Box::new(external));
    flush();
}

/// Runs a subscription change rxrust could not apply during an emission.
///
/// The job waits for the next point where no subject is mid-emission.
pub(crate) fn defer(job: impl FnOnce() + 'static) {
    let pending = push(&DEFERRED, Box::new(job));
    trace!(pending, "deferred subscription change");
}

/// Runs `f` with observer delivery held back until it returns.
///
/// Writes go through here so no observer runs while a subject owned by a cell
/// is still emitting.
pub(crate) fn batch<R>(f: impl FnOnce() -> R) -> R {
    let result = {
        let _hold = Hold::enter();
        f()
    };
    flush();
    result
}

fn flush() {
    if is_dispatching() {
        return;
    }
    let _hold = Hold::enter();
    loop {
        while let Some(job) = pop(&DEFERRED) {
            job();
        }
        let Some(next) = pop(&EXTERNAL) else {
            break;
        };
        next();
    }
}

/// Marks the internal lane as draining. Cleared on unwind too, so one failing
/// operator does not leave the thread stuck in queueing mode.
struct Propagation;

impl Propagation {
    fn enter() -> Self {
        PROPAGATING.with(|flag| flag.set(true));
        Propagation
    }
}

impl Drop for Propagation {
    fn drop(&mut self) {
        PROPAGATING.with(|flag| flag.set(false));
        if std::thread::panicking() {
            drop(INTERNAL.with(|queue| std::mem::take(&mut *queue.borrow_mut())));
        }
    }
}

struct Hold;

impl Hold {
    fn enter() -> Self {
        HOLDS.with(|holds| holds.set(holds.get() + 1));
        Hold
    }
}

impl Drop for Hold {
    fn drop(&mut self) {
        HOLDS.with(|holds| holds.set(holds.get().saturating_sub(1)));
        if std::thread::panicking() && HOLDS.with(Cell::get) == 0 {
            drop(EXTERNAL.with(|queue| std::mem::take(&mut *queue.borrow_mut())));
            drop(DEFERRED.with(|queue| std::mem::take(&mut *queue.borrow_mut())));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Rc;

    fn log() -> Rc<RefCell<Vec<&'static str>>> {
        Rc::default()
    }

    #[test]
    fn internal_lane_runs_before_any_observer() {
        let log = log();

        let (inner, outer) = (Rc::clone(&log), Rc::clone(&log));
        publish(
            move || {
                inner.borrow_mut().push("derived:a");
                let (inner, outer) = (Rc::clone(&inner), Rc::clone(&inner));
                publish(
                    move || inner.borrow_mut().push("derived:b"),
                    move || outer.borrow_mut().push("observer:b"),
                );
            },
            move || outer.borrow_mut().push("observer:a"),
        );

        assert_eq!(
            *log.borrow(),
            ["derived:a", "derived:b", "observer:a", "observer:b"]
        );
        assert!(!is_dispatching());
    }

    #[test]
    fn nested_internal_broadcasts_keep_fifo_order() {
        cov_mark::check!(nested_broadcast_queued);
        let log = Rc::new(RefCell::new(Vec::new()));

        let sink = Rc::clone(&log);
        publish(
            move || {
                for n in 0..3 {
                    let sink = Rc::clone(&sink);
                    publish(move || sink.borrow_mut().push(n), || {});
                }
                sink.borrow_mut().push(99);
            },
            || {},
        );

        assert_eq!(*log.borrow(), [99, 0, 1, 2]);
    }

    #[test]
    fn write_from_an_observer_propagates_at_once() {
        let log = log();

        let sink = Rc::clone(&log);
        notify(move || {
            sink.borrow_mut().push("observer:start");
            let (inner, outer) = (Rc::clone(&sink), Rc::clone(&sink));
            batch(|| {
                publish(
                    move || inner.borrow_mut().push("derived"),
                    move || outer.borrow_mut().push("observer:nested"),
                )
            });
            sink.borrow_mut().push("observer:end");
        });

        assert_eq!(
            *log.borrow(),
            ["observer:start", "derived", "observer:end", "observer:nested"]
        );
    }

    #[test]
    fn batch_holds_observers_until_it_returns() {
        let log = log();

        let sink = Rc::clone(&log);
        batch(|| {
            let observer = Rc::clone(&sink);
            notify(move || observer.borrow_mut().push("observer"));
            assert!(is_dispatching());
            sink.borrow_mut().push("write");
        });

        assert_eq!(*log.borrow(), ["write", "observer"]);
    }

    #[test]
    fn deferred_jobs_run_between_deliveries() {
        let log = log();

        let sink = Rc::clone(&log);
        notify(move || {
            let deferred = Rc::clone(&sink);
            defer(move || deferred.borrow_mut().push("deferred"));
            let next = Rc::clone(&sink);
            notify(move || next.borrow_mut().push("second"));
            sink.borrow_mut().push("first");
        });

        assert_eq!(*log.borrow(), ["first", "deferred", "second"]);
    }

    #[test]
    fn panicking_observer_resets_the_dispatcher() {
        let result = std::panic::catch_unwind(|| {
            notify(|| {
                notify(|| {});
                panic!("subscriber failed");
            });
        });
        assert!(result.is_err());
        assert!(!is_dispatching());
        assert_eq!(EXTERNAL.with(|queue| queue.borrow().len()), 0);
    }
}
