//! The interface shared by properties and views.

use std::rc::Rc;

use crate::cell::ValueCell;
use crate::object::ReactiveObject;
use crate::stream::Stream;
use crate::{Error, Result};

/// Key of a reactive value in its owner's [`InstanceState`](crate::InstanceState).
pub type Name = Rc<str>;

/// Owner-aware stream transform, applied once when a cell is realized.
pub type Modifier<O, T> = Rc<dyn Fn(&O, Stream<T>) -> Stream<T>>;

/// Wraps a closure as a [`Modifier`].
///
/// ```ignore
/// let total = view.pipe([modifier(|_, s: Stream<i32>| {
///     s.scan(0, |total, v: i32| total + v).box_it_clone()
/// })])?;
/// ```
pub fn modifier<O, T>(f: impl Fn(&O, Stream<T>) -> Stream<T> + 'static) -> Modifier<O, T> {
    Rc::new(f)
}

/// A shared, type-erased reactive value, as taken by the composition functions.
pub type Source<O, T> = Rc<dyn ReactiveValue<O, T>>;

/// Declaration-time description of an observable attribute of `O`.
///
/// A value holds no state of its own: everything it reads or writes lives in
/// the cell realized for it inside the owner.
pub trait ReactiveValue<O, T> {
    /// Key of the value in its owner's store, once named.
    fn name(&self) -> Option<&Name>;

    /// Whether writes are refused once the value is initialized.
    fn is_read_only(&self) -> bool;

    /// Current and future values for `owner`, realizing the cell if needed.
    fn observable(&self, owner: &O) -> Result<Stream<T>>;

    /// Like [`observable`](Self::observable), for values derived from this
    /// one. A change reaches this stream before any observer of `observable`
    /// runs, so derived values are up to date once a write returns.
    fn changes(&self, owner: &O) -> Result<Stream<T>>;

    /// The value currently cached for `owner`.
    fn get(&self, owner: &O) -> Result<T>;

    /// Whether the cell for `owner` has received a value.
    fn is_initialized(&self, owner: &O) -> Result<bool>;

    /// Disposes the cell of `owner`, completing its stream.
    fn dispose(&self, owner: &O) -> Result<()>;

    /// This value as a shared [`Source`].
    fn to_source(&self) -> Source<O, T>;
}

/// Values that can be realized ahead of first access.
///
/// See [`ReactiveObject::realize`].
pub trait Realize<O> {
    /// Realizes the cell of this value for `owner`.
    fn realize(&self, owner: &O) -> Result<()>;
}

/// Fetches the cell `name` of `owner`, building it with `build` on first use.
pub(crate) fn cell_of<O: ReactiveObject, T: Clone + 'static>(
    owner: &O,
    name: Option<&Name>,
    build: impl FnOnce(Name) -> Result<Rc<ValueCell<T>>>,
) -> Result<Rc<ValueCell<T>>> {
    let name = name.ok_or(Error::MissingName)?;
    owner
        .reactive_state()
        .get_or_realize(name, || build(name.clone()))
}

pub(crate) fn apply_modifiers<O, T>(
    owner: &O,
    modifiers: &[Modifier<O, T>],
    stream: Stream<T>,
) -> Stream<T> {
    modifiers
        .iter()
        .fold(stream, |stream, modify| modify(owner, stream))
}
