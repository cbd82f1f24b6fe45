//! Free functions declaring and combining reactive values.
//!
//! The composition functions take any number of [`Source`]s of the same owner
//! and value type, and return an unnamed, read-only [`View`] whose factory
//! observes every source for the owner and combines the resulting streams.

use std::rc::Rc;

use crate::object::ReactiveObject;
use crate::property::Property;
use crate::stream::{self, Observable, Stream};
use crate::value::{ReactiveValue, Source};
use crate::view::View;
use crate::{Error, Result};

/// A writable property initialized by its first write.
pub fn new_property<O: ReactiveObject, T: Clone + 'static>() -> Property<O, T> {
    Property::new()
}

/// A property starting out as `value`.
pub fn from_value<O: ReactiveObject, T: Clone + 'static>(
    value: T,
    read_only: bool,
) -> Property<O, T> {
    Property::with_value(value).read_only(read_only)
}

/// A read-only view with nothing upstream, to be given a stream by its owner.
pub fn new_view<O: ReactiveObject, T: Clone + 'static>() -> View<O, T> {
    View::from_stream(stream::empty())
}

/// A view following `stream` for every owner.
pub fn from_observable<O: ReactiveObject, T: Clone + 'static>(
    stream: Stream<T>,
    read_only: bool,
) -> View<O, T> {
    View::from_stream(stream).read_only(read_only)
}

/// A view over the stream `factory` builds for each owner.
pub fn from_instance<O: ReactiveObject, T: Clone + 'static>(
    factory: impl Fn(&O) -> Result<Stream<T>> + 'static,
    read_only: bool,
) -> View<O, T> {
    View::new(factory).read_only(read_only)
}

/// Overrides `base` for a derived owner. See [`Property::extend`].
pub fn extend<O: ReactiveObject, T: Clone + 'static>(
    base: &Property<O, T>,
    pre: impl Fn(&O, T) -> Result<T> + 'static,
    post: impl Fn(&O, Stream<T>) -> Stream<T> + 'static,
) -> Property<O, T> {
    base.extend(pre, post)
}

/// A view of `combinator` applied to the streams of `sources`.
///
/// The view follows [`ReactiveValue::changes`], so it is up to date as soon as
/// a write to any source returns.
pub fn combine<O, T, U>(
    sources: impl IntoIterator<Item = Source<O, T>>,
    combinator: impl Fn(Vec<Stream<T>>) -> Stream<U> + 'static,
) -> Result<View<O, U>>
where
    O: ReactiveObject,
    T: Clone + 'static,
    U: Clone + 'static,
{
    let sources: Rc<[Source<O, T>]> = sources.into_iter().collect();
    if sources.is_empty() {
        return Err(Error::EmptySourceList);
    }
    Ok(View::new(move |owner: &O| {
        let streams = sources
            .iter()
            .map(|source| source.changes(owner))
            .collect::<Result<Vec<_>>>()?;
        Ok(combinator(streams))
    }))
}

/// The latest value of every source, each time any of them changes.
pub fn combine_latest<O: ReactiveObject, T: Clone + 'static>(
    sources: impl IntoIterator<Item = Source<O, T>>,
) -> Result<View<O, Vec<T>>> {
    combine(sources, stream::combine_latest)
}

/// The n-th values of all sources, paired by arrival.
pub fn zip<O: ReactiveObject, T: Clone + 'static>(
    sources: impl IntoIterator<Item = Source<O, T>>,
) -> Result<View<O, Vec<T>>> {
    combine(sources, stream::zip)
}

/// Every value of every source, in emission order.
pub fn merge<O: ReactiveObject, T: Clone + 'static>(
    sources: impl IntoIterator<Item = Source<O, T>>,
) -> Result<View<O, T>> {
    combine(sources, stream::merge)
}

/// A view of `f` applied to every value of `source`.
pub fn map<O: ReactiveObject, T: Clone + 'static, U: Clone + 'static>(
    source: Source<O, T>,
    f: impl Fn(&T) -> U + 'static,
) -> View<O, U> {
    let f = Rc::new(f);
    View::new(move |owner: &O| {
        let f = Rc::clone(&f);
        Ok(source
            .changes(owner)?
            .map(move |value: T| f(&value))
            .box_it_clone())
    })
}

/// The stream of `value` for `owner`.
pub fn observe<O, T>(owner: &O, value: &(impl ReactiveValue<O, T> + ?Sized)) -> Result<Stream<T>> {
    value.observable(owner)
}

/// Disposes every reactive value of `owner`.
pub fn dispose<O: ReactiveObject>(owner: &O) -> Result<()> {
    owner.dispose()
}
