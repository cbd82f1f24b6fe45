//! Writable reactive values.

use std::fmt;
use std::rc::Rc;

use crate::cell::{AnyCell, ValueCell};
use crate::object::ReactiveObject;
use crate::stream::{self, Observable, Stream};
use crate::value::{Modifier, Name, ReactiveValue, Realize, Source, apply_modifiers, cell_of};
use crate::view::View;
use crate::{Error, Result};

type Validator<O, T> = Rc<dyn Fn(&O, T) -> Result<T>>;

/// A reactive value backed by a subject holding its current value.
///
/// Writes pass through the validator chain before they reach the subject, and
/// the subject's stream passes through the modifier chain before it is cached
/// and published.
///
/// With an initial value the property is eager: its cell starts out initialized
/// with the validated value. Without one, the cell starts empty and the first
/// [`set`](Property::set) creates the subject.
///
/// A property is a declaration shared by every owner; cloning it is cheap.
pub struct Property<O, T> {
    decl: Rc<PropertyDecl<O, T>>,
}

struct PropertyDecl<O, T> {
    name: Option<Name>,
    read_only: bool,
    init_value: Option<T>,
    validator: Validator<O, T>,
    modifiers: Vec<Modifier<O, T>>,
}

impl<O, T> Clone for Property<O, T> {
    fn clone(&self) -> Self {
        Self {
            decl: Rc::clone(&self.decl),
        }
    }
}

impl<O, T: fmt::Debug> fmt::Debug for Property<O, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Property")
            .field("name", &self.decl.name)
            .field("read_only", &self.decl.read_only)
            .field("init_value", &self.decl.init_value)
            .field("modifiers", &self.decl.modifiers.len())
            .finish()
    }
}

impl<O: ReactiveObject, T: Clone + 'static> Default for Property<O, T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<O: ReactiveObject, T: Clone + 'static> Property<O, T> {
    /// A writable property initialized by its first write.
    pub fn new() -> Self {
        Self::from_decl(PropertyDecl {
            name: None,
            read_only: false,
            init_value: None,
            validator: Rc::new(|_, value| Ok(value)),
            modifiers: Vec::new(),
        })
    }

    /// A writable property starting out as `value`.
    pub fn with_value(value: T) -> Self {
        let mut decl = Self::new().into_decl();
        decl.init_value = Some(value);
        Self::from_decl(decl)
    }

    fn from_decl(decl: PropertyDecl<O, T>) -> Self {
        Self {
            decl: Rc::new(decl),
        }
    }

    fn into_decl(self) -> PropertyDecl<O, T> {
        Rc::try_unwrap(self.decl).unwrap_or_else(|decl| decl.duplicate())
    }

    /// The same property stored under `name`.
    pub fn named(&self, name: impl Into<Name>) -> Self {
        let mut decl = self.decl.duplicate();
        decl.name = Some(name.into());
        Self::from_decl(decl)
    }

    /// The same property, accepting a single write when `read_only`.
    pub fn read_only(&self, read_only: bool) -> Self {
        let mut decl = self.decl.duplicate();
        decl.read_only = read_only;
        Self::from_decl(decl)
    }

    /// Adds `validator` after the existing validators.
    ///
    /// A validator may adjust the value or reject it; a rejected write leaves
    /// the property unchanged and reports the error to the writer.
    pub fn validate(&self, validator: impl Fn(&O, T) -> Result<T> + 'static) -> Self {
        let mut decl = self.decl.duplicate();
        let existing = Rc::clone(&self.decl.validator);
        decl.validator = Rc::new(move |owner, value| validator(owner, existing(owner, value)?));
        Self::from_decl(decl)
    }

    /// An unnamed copy of this property transforming every value on its way
    /// to the cell.
    ///
    /// The result is a property of its own: once named, it keeps a separate
    /// cell and never replaces this one.
    pub fn map(&self, f: impl Fn(&T) -> T + 'static) -> Self {
        let f = Rc::new(f);
        self.with_modifiers([Rc::new(move |_: &O, stream: Stream<T>| {
            let f = Rc::clone(&f);
            stream.map(move |value: T| f(&value)).box_it_clone()
        }) as Modifier<O, T>])
            .unnamed()
    }

    /// An unnamed copy of this property with `modifiers` appended to the
    /// modifier chain.
    pub fn pipe(&self, modifiers: impl IntoIterator<Item = Modifier<O, T>>) -> Result<Self> {
        let modifiers: Vec<_> = modifiers.into_iter().collect();
        if modifiers.is_empty() {
            return Err(Error::MissingModifier);
        }
        Ok(self.with_modifiers(modifiers).unnamed())
    }

    fn with_modifiers(&self, modifiers: impl IntoIterator<Item = Modifier<O, T>>) -> Self {
        let mut decl = self.decl.duplicate();
        decl.modifiers.extend(modifiers);
        Self::from_decl(decl)
    }

    fn unnamed(self) -> Self {
        let mut decl = self.into_decl();
        decl.name = None;
        Self::from_decl(decl)
    }

    /// Overrides this property for a derived owner: `pre` runs after the
    /// existing validators, `post` after the existing modifiers. Name, initial
    /// value and read-only flag are shared, so the override replaces this
    /// property in the owner's store.
    pub fn extend(
        &self,
        pre: impl Fn(&O, T) -> Result<T> + 'static,
        post: impl Fn(&O, Stream<T>) -> Stream<T> + 'static,
    ) -> Self {
        self.validate(pre)
            .with_modifiers([Rc::new(post) as Modifier<O, T>])
    }

    /// A read-only, unnamed view following this property.
    pub fn as_view(&self) -> View<O, T> {
        let property = self.clone();
        View::new(move |owner: &O| property.changes(owner))
    }

    /// Validates `value` and publishes it.
    ///
    /// By the time this returns, the new value is cached by this property and
    /// by every realized view depending on it.
    pub fn set(&self, owner: &O, value: T) -> Result<()> {
        let cell = self.cell(owner)?;
        cell.check_disposed()?;
        if self.decl.read_only && cell.is_initialized() {
            return Err(Error::ReadOnly {
                name: cell.name().clone(),
            });
        }
        let value = (self.decl.validator)(owner, value)?;
        cell.push(value)
    }

    fn cell(&self, owner: &O) -> Result<Rc<ValueCell<T>>> {
        cell_of(owner, self.decl.name.as_ref(), |name| {
            let backing = match &self.decl.init_value {
                Some(init) => Some(stream::behavior_subject((self.decl.validator)(
                    owner,
                    init.clone(),
                )?)),
                None => None,
            };
            let raw = backing
                .as_ref()
                .map_or_else(stream::empty, |subject| subject.clone().box_it_clone());
            Ok(ValueCell::new(name, raw, backing, |stream| {
                apply_modifiers(owner, &self.decl.modifiers, stream)
            }))
        })
    }
}

impl<O, T: Clone> PropertyDecl<O, T> {
    fn duplicate(&self) -> Self {
        Self {
            name: self.name.clone(),
            read_only: self.read_only,
            init_value: self.init_value.clone(),
            validator: Rc::clone(&self.validator),
            modifiers: self.modifiers.clone(),
        }
    }
}

impl<O: ReactiveObject, T: Clone + 'static> ReactiveValue<O, T> for Property<O, T> {
    fn name(&self) -> Option<&Name> {
        self.decl.name.as_ref()
    }

    fn is_read_only(&self) -> bool {
        self.decl.read_only
    }

    fn observable(&self, owner: &O) -> Result<Stream<T>> {
        self.cell(owner)?.observable()
    }

    fn changes(&self, owner: &O) -> Result<Stream<T>> {
        self.cell(owner)?.changes()
    }

    fn get(&self, owner: &O) -> Result<T> {
        self.cell(owner)?.value()
    }

    fn is_initialized(&self, owner: &O) -> Result<bool> {
        let cell = self.cell(owner)?;
        cell.check_disposed()?;
        Ok(cell.is_initialized())
    }

    fn dispose(&self, owner: &O) -> Result<()> {
        self.cell(owner)?.dispose()
    }

    fn to_source(&self) -> Source<O, T> {
        Rc::new(self.clone())
    }
}

impl<O: ReactiveObject, T: Clone + 'static> Realize<O> for Property<O, T> {
    fn realize(&self, owner: &O) -> Result<()> {
        self.cell(owner).map(drop)
    }
}
