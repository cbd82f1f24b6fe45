#![deny(missing_docs)]

//! Struct fields backed by push-based observable streams.
//!
//! A reactive value reads like a plain field (the current value), writes like
//! one (publish a new value) and can be observed as the stream of its current
//! and future values. Values are declared once and shared by every instance of
//! the owning type; the state they read and write lives in a per-instance
//! [`InstanceState`].
//!
//! # Quick Start
//!
//! ```ignore
//! use reactive_object::stream::Observable;
//! use reactive_object::{InstanceState, Property, ReactiveObject, ReactiveValue, View};
//!
//! #[derive(Default)]
//! struct Counter {
//!     state: InstanceState,
//! }
//!
//! impl ReactiveObject for Counter {
//!     fn reactive_state(&self) -> &InstanceState {
//!         &self.state
//!     }
//! }
//!
//! let value = Property::<Counter, i32>::with_value(1).named("value");
//! let doubled = value.as_view().map(|v| v * 2).named("doubled");
//!
//! let counter = Counter::default();
//! let _ = counter
//!     .observe(&doubled)?
//!     .on_error(|_| {})
//!     .subscribe(|v: i32| println!("doubled: {v}"));
//!
//! value.set(&counter, 3)?;   // prints "doubled: 6"
//! assert_eq!(doubled.get(&counter)?, 6);
//!
//! counter.dispose()?;        // completes every stream of `counter`
//! ```
//!
//! # Core Types
//!
//! - [`Property`] - Writable value backed by a subject. Eager with an initial
//!   value, lazy without one.
//! - [`View`] - Value derived from a stream built per owner.
//! - [`ReactiveObject`] - Host type owning an [`InstanceState`].
//! - [`Stream`] - The rxrust observable everything is built on, see [`stream`].
//!
//! # Cells
//!
//! The first access to a value on an owner realizes its cell: the upstream is
//! built (a subject for a property, the factory's stream for a view), passed
//! through the value's modifiers and subscribed to once. The cell caches every
//! value it sees and republishes it to its observers, so upstream work runs once
//! per owner however many observers there are.
//!
//! ```ignore
//! let animal = Property::<Counter, String>::new().named("animal");
//! let crows = animal
//!     .as_view()
//!     .pipe([modifier(|_, s: Stream<String>| {
//!         s.filter(|a: &String| a.eq_ignore_ascii_case("crow")).box_it_clone()
//!     })])?
//!     .map(|_| 1)
//!     .pipe([modifier(|_, s: Stream<i32>| s.scan(0, |n, v: i32| n + v).box_it_clone())])?
//!     .named("crows");
//!
//! // Count from the start rather than from the first read.
//! counter.realize(&[&crows])?;
//! ```
//!
//! # Ordering
//!
//! Writes propagate synchronously: when [`Property::set`] returns, every
//! realized value depending on the property has cached the new value and every
//! observer has been notified. Observers of a value are always notified before
//! the observers of values derived from it. See [`is_dispatching`].
//!
//! # Composition
//!
//! ```ignore
//! let pairs = combine_latest([value.to_source(), doubled.to_source()])?.named("pairs");
//! value.set(&counter, 3)?; // pairs: [3, 2] then [3, 6]
//! ```

mod cell;
mod dispatch;
mod error;
mod functions;
mod hash;
mod object;
mod property;
mod store;
pub mod stream;
mod value;
mod view;

pub use dispatch::is_dispatching;
pub use error::{Error, Result};
pub use functions::{
    combine, combine_latest, dispose, extend, from_instance, from_observable, from_value, map,
    merge, new_property, new_view, observe, zip,
};
pub use object::ReactiveObject;
pub use property::Property;
pub use store::InstanceState;
pub use stream::Stream;
pub use value::{Modifier, Name, ReactiveValue, Realize, Source, modifier};
pub use view::View;
