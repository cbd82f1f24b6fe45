//! Runtime state of one reactive value on one owner.
//!
//! A cell owns four subjects:
//! - the upstream slot, a behavior subject of streams flattened with
//!   `switch_map`, so a view can swap its whole source and a lazily
//!   initialized property can install its backing subject on first write;
//! - the backing subject of a property, holding the last written value;
//! - the internal output, followed by the cells derived from this one;
//! - the external output, followed by everything else.
//!
//! The cell subscribes to the live stream (upstream plus modifier chain)
//! exactly once. That caching subscription stores each value synchronously and
//! then publishes it on both outputs through the dispatcher. Upstream work
//! therefore runs once per cell however many observers there are.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use tracing::{debug, error};

use crate::dispatch;
use crate::stream::{
    self, BehaviorSubject, BoxedSubscription, Observable, Observer, Stream, Subscription,
};
use crate::value::Name;
use crate::{Error, Result};

/// Type-erased view of a cell, as kept by the instance store.
pub(crate) trait AnyCell {
    fn name(&self) -> &Name;

    fn is_disposed(&self) -> bool;

    fn dispose(&self) -> Result<()>;

    fn into_any(self: Rc<Self>) -> Rc<dyn Any>;
}

pub(crate) struct ValueCell<T> {
    name: Name,
    value: RefCell<Option<T>>,
    fault: RefCell<Option<Error>>,
    disposed: Cell<bool>,
    completed: Cell<bool>,
    upstream: BehaviorSubject<Stream<T>>,
    internal: BehaviorSubject<Option<T>>,
    output: BehaviorSubject<Option<T>>,
    /// Source of truth of a property. Always `None` for views.
    backing: RefCell<Option<BehaviorSubject<T>>>,
    caching: RefCell<Option<BoxedSubscription>>,
}

impl<T: Clone + 'static> ValueCell<T> {
    /// Builds a cell around `raw` and connects it.
    ///
    /// `modify` turns the flattened upstream into the live stream.
    pub(crate) fn new(
        name: Name,
        raw: Stream<T>,
        backing: Option<BehaviorSubject<T>>,
        modify: impl FnOnce(Stream<T>) -> Stream<T>,
    ) -> Rc<Self> {
        let upstream = stream::behavior_subject(raw);
        let live = modify(
            upstream
                .clone()
                .switch_map(|source: Stream<T>| source)
                .box_it_clone(),
        );

        let cell = Rc::new(Self {
            name,
            value: RefCell::new(None),
            fault: RefCell::new(None),
            disposed: Cell::new(false),
            completed: Cell::new(false),
            upstream,
            internal: stream::behavior_subject(None),
            output: stream::behavior_subject(None),
            backing: RefCell::new(backing),
            caching: RefCell::new(None),
        });

        let caching = live.subscribe_with(CacheObserver {
            cell: Rc::downgrade(&cell),
        });
        *cell.caching.borrow_mut() = Some(caching);

        debug!(name = %cell.name, initialized = cell.is_initialized(), "realized cell");
        cell
    }

    fn receive(&self, value: T) {
        *self.value.borrow_mut() = Some(value.clone());
        let mut internal = self.internal.clone();
        let mut output = self.output.clone();
        let delivered = value.clone();
        dispatch::publish(
            move || internal.next(Some(value)),
            move || output.next(Some(delivered)),
        );
    }

    fn fail(&self, err: Error) {
        error!(name = %self.name, error = %err, "reactive value faulted");
        *self.fault.borrow_mut() = Some(err.clone());
        let internal = self.internal.clone();
        let output = self.output.clone();
        let delivered = err.clone();
        dispatch::publish(move || internal.error(err), move || output.error(delivered));
    }

    fn finish(&self) {
        if self.completed.replace(true) {
            return;
        }
        let internal = self.internal.clone();
        let output = self.output.clone();
        dispatch::publish(move || internal.complete(), move || output.complete());
    }

    pub(crate) fn is_initialized(&self) -> bool {
        self.value.borrow().is_some()
    }

    pub(crate) fn check_disposed(&self) -> Result<()> {
        if self.disposed.get() {
            return Err(Error::Disposed {
                name: self.name.clone(),
            });
        }
        Ok(())
    }

    /// The cached value.
    pub(crate) fn value(&self) -> Result<T> {
        self.check_disposed()?;
        if let Some(fault) = self.fault.borrow().as_ref() {
            return Err(Error::Faulted {
                name: self.name.clone(),
                source: Box::new(fault.clone()),
            });
        }
        self.value.borrow().clone().ok_or_else(|| Error::NotInitialized {
            name: self.name.clone(),
        })
    }

    /// The externally visible stream.
    pub(crate) fn observable(&self) -> Result<Stream<T>> {
        self.check_disposed()?;
        Ok(self.follow(&self.output))
    }

    /// The stream derived cells follow. It settles before any observer of
    /// [`observable`](Self::observable) runs.
    pub(crate) fn changes(&self) -> Result<Stream<T>> {
        self.check_disposed()?;
        Ok(self.follow(&self.internal))
    }

    // Subjects forget how they terminated, so late subscribers are answered
    // from the cell's own state.
    fn follow(&self, subject: &BehaviorSubject<Option<T>>) -> Stream<T> {
        if let Some(fault) = self.fault.borrow().clone() {
            return stream::throw(fault);
        }
        if self.completed.get() {
            return stream::of(self.value.borrow().clone());
        }
        subject
            .clone()
            .filter_map(|value: Option<T>| value)
            .box_it_clone()
    }

    /// Replaces the whole upstream; the previous one is unsubscribed.
    pub(crate) fn replace_upstream(&self, source: Stream<T>) -> Result<()> {
        self.check_disposed()?;
        let mut upstream = self.upstream.clone();
        dispatch::batch(move || upstream.next(source));
        Ok(())
    }

    /// Writes into the backing subject, installing it on the first write.
    pub(crate) fn push(&self, value: T) -> Result<()> {
        self.check_disposed()?;
        let backing = self.backing.borrow().clone();
        dispatch::batch(|| match backing {
            Some(mut subject) => subject.next(value),
            None => {
                cov_mark::hit!(lazy_property_first_write);
                let subject = stream::behavior_subject(value);
                *self.backing.borrow_mut() = Some(subject.clone());
                self.upstream.clone().next(subject.box_it_clone());
            }
        });
        Ok(())
    }
}

impl<T: Clone + 'static> AnyCell for ValueCell<T> {
    fn name(&self) -> &Name {
        &self.name
    }

    fn is_disposed(&self) -> bool {
        self.disposed.get()
    }

    fn dispose(&self) -> Result<()> {
        if self.disposed.replace(true) {
            return Err(Error::AlreadyDisposed {
                name: self.name.clone(),
            });
        }

        dispatch::batch(|| {
            let caching = self.caching.borrow_mut().take();
            if let Some(subscription) = caching {
                subscription.unsubscribe();
            }
            let backing = self.backing.borrow_mut().take();
            if let Some(subject) = backing {
                subject.complete();
            }
            self.upstream.clone().complete();
            self.finish();
        });

        debug!(name = %self.name, "disposed cell");
        Ok(())
    }

    fn into_any(self: Rc<Self>) -> Rc<dyn Any> {
        self
    }
}

impl<T> fmt::Debug for ValueCell<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValueCell")
            .field("name", &self.name)
            .field("initialized", &self.value.borrow().is_some())
            .field("faulted", &self.fault.borrow().is_some())
            .field("disposed", &self.disposed.get())
            .finish_non_exhaustive()
    }
}

impl<T> Drop for ValueCell<T> {
    fn drop(&mut self) {
        if let Some(subscription) = self.caching.get_mut().take() {
            subscription.unsubscribe();
        }
    }
}

/// The caching subscription. Holds the cell weakly so a dropped store frees
/// its cells even while sources are still alive.
struct CacheObserver<T> {
    cell: Weak<ValueCell<T>>,
}

impl<T: Clone + 'static> Observer<T, Error> for CacheObserver<T> {
    fn next(&mut self, value: T) {
        if let Some(cell) = self.cell.upgrade() {
            cell.receive(value);
        }
    }

    fn error(self, err: Error) {
        if let Some(cell) = self.cell.upgrade() {
            cell.fail(err);
        }
    }

    fn complete(self) {
        if let Some(cell) = self.cell.upgrade() {
            cell.finish();
        }
    }

    fn is_closed(&self) -> bool {
        self.cell.upgrade().is_none_or(|cell| cell.disposed.get())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::testing::{Event, record};
    use crate::stream::{ObservableFactory, Rx};
    use rxrust::observer::Emitter;

    fn plain(name: &str, raw: Stream<i32>) -> Rc<ValueCell<i32>> {
        ValueCell::new(name.into(), raw, None, |live| live)
    }

    #[test]
    fn caches_the_latest_upstream_value() {
        let source = stream::subject::<i32>();
        let cell = plain("value", source.clone().box_it_clone());
        assert!(!cell.is_initialized());
        assert!(matches!(cell.value(), Err(Error::NotInitialized { .. })));

        source.clone().next(4);
        assert_eq!(cell.value().unwrap(), 4);
    }

    #[test]
    fn upstream_runs_once_for_many_observers() {
        let subscriptions = Rc::new(Cell::new(0));
        let counter = Rc::clone(&subscriptions);
        let raw = Rx::create(move |emitter: &mut dyn Emitter<i32, Error>| {
            counter.set(counter.get() + 1);
            emitter.next(1);
        })
        .box_it_clone();
        let cell = plain("shared", raw);

        let (first, _) = record(&cell.observable().unwrap());
        let (second, _) = record(&cell.observable().unwrap());

        assert_eq!(subscriptions.get(), 1);
        assert_eq!(*first.borrow(), vec![Event::Next(1)]);
        assert_eq!(*second.borrow(), vec![Event::Next(1)]);
    }

    #[test]
    fn first_push_installs_backing_subject() {
        cov_mark::check!(lazy_property_first_write);
        let cell = plain("lazy", stream::empty());

        cell.push(1).unwrap();
        cell.push(2).unwrap();

        assert_eq!(cell.value().unwrap(), 2);
    }

    #[test]
    fn replacing_upstream_drops_the_old_source() {
        let old = stream::subject::<i32>();
        let cell = plain("view", old.clone().box_it_clone());
        old.clone().next(1);

        let new = stream::behavior_subject(10);
        cell.replace_upstream(new.box_it_clone()).unwrap();
        old.clone().next(2);

        assert_eq!(cell.value().unwrap(), 10);
        assert_eq!(old.inner.subscriber_count(), 0);
    }

    #[test]
    fn derived_stream_settles_before_observers_run() {
        let source = stream::subject::<i32>();
        let cell = plain("value", source.clone().box_it_clone());
        let derived = plain("derived", cell.changes().unwrap());
        let (events, _) = record(&cell.observable().unwrap());

        let seen = Rc::clone(&derived);
        let _ = cell
            .observable()
            .unwrap()
            .on_error(|_| {})
            .subscribe(move |v: i32| assert_eq!(seen.value().unwrap(), v));
        source.clone().next(5);

        assert_eq!(derived.value().unwrap(), 5);
        assert_eq!(*events.borrow(), vec![Event::Next(5)]);
    }

    #[test]
    fn dispose_completes_observers_and_is_terminal() {
        let cell = plain("value", stream::just(1));
        let (events, _) = record(&cell.observable().unwrap());

        cell.dispose().unwrap();

        assert_eq!(*events.borrow(), vec![Event::Next(1), Event::Complete]);
        assert!(matches!(cell.value(), Err(Error::Disposed { .. })));
        assert!(matches!(cell.observable(), Err(Error::Disposed { .. })));
        assert!(matches!(cell.push(2), Err(Error::Disposed { .. })));
        assert!(matches!(
            cell.dispose(),
            Err(Error::AlreadyDisposed { .. })
        ));
    }

    #[test]
    fn late_observer_of_a_completed_cell_gets_the_last_value() {
        let cell = ValueCell::new("value".into(), stream::of([1, 2]), None, |live| {
            live.take(1).box_it_clone()
        });

        let (events, _) = record(&cell.observable().unwrap());

        assert_eq!(cell.value().unwrap(), 1);
        assert_eq!(*events.borrow(), vec![Event::Next(1), Event::Complete]);
    }

    #[test]
    fn stream_error_faults_the_cell() {
        let source = stream::subject::<i32>();
        let cell = plain("fragile", source.clone().box_it_clone());
        let (events, _) = record(&cell.observable().unwrap());

        source.clone().next(1);
        source.clone().error(Error::validation("sensor offline"));

        assert_eq!(
            *events.borrow(),
            vec![Event::Next(1), Event::Error("sensor offline".into())]
        );
        match cell.value() {
            Err(Error::Faulted { source, .. }) => {
                assert_eq!(source.to_string(), "sensor offline")
            }
            other => panic!("expected a fault, got {other:?}"),
        }
        let (late, _) = record(&cell.observable().unwrap());
        assert_eq!(*late.borrow(), vec![Event::Error("sensor offline".into())]);
    }
}
