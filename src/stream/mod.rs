//! Push-based streams: the substrate every reactive value is built on.
//!
//! Streams are rxrust observables running in a single-threaded context whose
//! scheduler is [`CellScheduler`]. A [`Stream`] is a cloneable, type-erased
//! observable failing with [`Error`]. Build one from any rxrust pipeline with
//! `.box_it_clone()`:
//!
//! ```ignore
//! let evens: Stream<i32> = source.filter(|v: &i32| v % 2 == 0).box_it_clone();
//! ```
//!
//! [`Subject`] and [`BehaviorSubject`] are hot and multicast to every
//! subscriber in subscription order; the latter emits its current value first.

use std::convert::Infallible;

use rxrust::context::LocalCtx;
use rxrust::observer::Emitter;
use rxrust::prelude::{BoxedCoreObservableClone, BoxedObserver, InnerSubject, Subscribers};
use rxrust::prelude::{Duration, Scheduler, Task, TaskHandle, TaskState};
use rxrust::rc::MutRc;
use tracing::trace;

pub use rxrust::prelude::{
    BoxedSubscription, Observable, ObservableFactory, Observer, Subscription,
};

use crate::Error;
use crate::dispatch;

/// Scheduler of every stream built by this crate.
///
/// rxrust only schedules work here when a subject is subscribed to or
/// unsubscribed from while it is emitting. Such changes run as soon as the
/// current broadcast is over, on the calling thread.
#[derive(Clone, Copy, Debug, Default)]
pub struct CellScheduler;

impl<S: 'static> Scheduler<Task<S>> for CellScheduler {
    fn schedule(&self, mut task: Task<S>, _delay: Option<Duration>) -> TaskHandle {
        dispatch::defer(move || {
            loop {
                match task.step() {
                    TaskState::Finished => break,
                    TaskState::Yield => continue,
                    TaskState::Sleeping(delay) => {
                        trace!(?delay, "dropped sleeping task");
                        break;
                    }
                }
            }
        });
        TaskHandle::finished()
    }
}

/// Factory for rxrust pipelines in the crate's context: `Rx::of(1)`,
/// `Rx::from_iter(..)` and so on.
pub type Rx<T> = LocalCtx<T, CellScheduler>;

/// A cloneable, type-erased stream of `T` failing with [`Error`].
pub type Stream<T> =
    LocalCtx<BoxedCoreObservableClone<'static, T, Error, CellScheduler>, CellScheduler>;

/// A hot stream pushing whatever is passed to `next`.
pub type Subject<T> = LocalCtx<InnerSubject<'static, T, Error>, CellScheduler>;

/// A [`Subject`] remembering its latest value, which every new subscriber gets
/// first.
pub type BehaviorSubject<T> = LocalCtx<
    rxrust::subject::BehaviorSubject<MutRc<T>, MutRc<Subscribers<BoxedObserver<'static, T, Error>>>>,
    CellScheduler,
>;

/// A subject without subscribers.
pub fn subject<T: Clone + 'static>() -> Subject<T> {
    Rx::subject::<T, Error>()
}

/// A behavior subject holding `value`.
pub fn behavior_subject<T: Clone + 'static>(value: T) -> BehaviorSubject<T> {
    Rx::behavior_subject::<T, Error>(value)
}

/// Emits `values` in order, then completes.
pub fn of<T: Clone + 'static>(values: impl IntoIterator<Item = T>) -> Stream<T> {
    let values: Vec<T> = values.into_iter().collect();
    Rx::from_iter(values)
        .map_err(|never: Infallible| -> Error { match never {} })
        .box_it_clone()
}

/// Emits one value, then completes.
pub fn just<T: Clone + 'static>(value: T) -> Stream<T> {
    Rx::of(value)
        .map_err(|never: Infallible| -> Error { match never {} })
        .box_it_clone()
}

/// Completes immediately.
pub fn empty<T: Clone + 'static>() -> Stream<T> {
    Rx::create(|emitter: &mut dyn Emitter<T, Error>| emitter.complete()).box_it_clone()
}

/// Never emits nor terminates.
pub fn never<T: Clone + 'static>() -> Stream<T> {
    Rx::create(|_: &mut dyn Emitter<T, Error>| {}).box_it_clone()
}

/// Fails immediately with `err`.
pub fn throw<T: Clone + 'static>(err: Error) -> Stream<T> {
    Rx::create(move |emitter: &mut dyn Emitter<T, Error>| emitter.error(err)).box_it_clone()
}

/// Emits the latest value of every source, in source order, each time one of
/// them emits once all have emitted.
///
/// Completes when every source has completed, or as soon as one completes
/// without ever emitting. Without sources, completes immediately.
pub fn combine_latest<T: Clone + 'static>(
    sources: impl IntoIterator<Item = Stream<T>>,
) -> Stream<Vec<T>> {
    let mut sources = sources.into_iter();
    let Some(first) = sources.next() else {
        return empty();
    };
    sources.fold(
        first.map(|value: T| vec![value]).box_it_clone(),
        |combined, source| {
            combined
                .combine_latest(source, |mut values: Vec<T>, value: T| {
                    values.push(value);
                    values
                })
                .box_it_clone()
        },
    )
}

/// Pairs up the n-th value of every source.
///
/// Completes once any source has completed and its buffered values are used up.
pub fn zip<T: Clone + 'static>(sources: impl IntoIterator<Item = Stream<T>>) -> Stream<Vec<T>> {
    let mut sources = sources.into_iter();
    let Some(first) = sources.next() else {
        return empty();
    };
    sources.fold(
        first.map(|value: T| vec![value]).box_it_clone(),
        |zipped, source| {
            zipped
                .zip(source)
                .map(|(mut values, value): (Vec<T>, T)| {
                    values.push(value);
                    values
                })
                .box_it_clone()
        },
    )
}

/// Every value of every source as it arrives. Completes once all sources have.
pub fn merge<T: Clone + 'static>(sources: impl IntoIterator<Item = Stream<T>>) -> Stream<T> {
    let mut sources = sources.into_iter();
    let Some(first) = sources.next() else {
        return empty();
    };
    sources.fold(first, |merged, source| merged.merge(source).box_it_clone())
}
