//! Reactive values derived from a stream.

use std::fmt;
use std::rc::Rc;

use crate::cell::{AnyCell, ValueCell};
use crate::object::ReactiveObject;
use crate::stream::{Observable, Stream};
use crate::value::{Modifier, Name, ReactiveValue, Realize, Source, apply_modifiers, cell_of};
use crate::{Error, Result};

type Factory<O, T> = Rc<dyn Fn(&O) -> Result<Stream<T>>>;

/// A reactive value whose upstream is produced per owner by a factory.
///
/// Views are read-only unless declared otherwise. A writable view (or a
/// read-only one that has not received a value yet) can have its whole upstream
/// replaced with [`set`](View::set).
pub struct View<O, T> {
    decl: Rc<ViewDecl<O, T>>,
}

struct ViewDecl<O, T> {
    name: Option<Name>,
    read_only: bool,
    factory: Factory<O, T>,
    modifiers: Vec<Modifier<O, T>>,
}

impl<O, T> Clone for View<O, T> {
    fn clone(&self) -> Self {
        Self {
            decl: Rc::clone(&self.decl),
        }
    }
}

impl<O, T> fmt::Debug for View<O, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("View")
            .field("name", &self.decl.name)
            .field("read_only", &self.decl.read_only)
            .field("modifiers", &self.decl.modifiers.len())
            .finish_non_exhaustive()
    }
}

impl<O, T> ViewDecl<O, T> {
    fn duplicate(&self) -> Self {
        Self {
            name: self.name.clone(),
            read_only: self.read_only,
            factory: Rc::clone(&self.factory),
            modifiers: self.modifiers.clone(),
        }
    }
}

impl<O: ReactiveObject, T: Clone + 'static> View<O, T> {
    /// A read-only view over the stream `factory` builds for each owner.
    ///
    /// The factory runs once per owner, when the view is first accessed.
    pub fn new(factory: impl Fn(&O) -> Result<Stream<T>> + 'static) -> Self {
        Self {
            decl: Rc::new(ViewDecl {
                name: None,
                read_only: true,
                factory: Rc::new(factory),
                modifiers: Vec::new(),
            }),
        }
    }

    /// A read-only view following `stream` for every owner.
    pub fn from_stream(stream: Stream<T>) -> Self {
        Self::new(move |_| Ok(stream.clone()))
    }

    fn derive(&self, change: impl FnOnce(&mut ViewDecl<O, T>)) -> Self {
        let mut decl = self.decl.duplicate();
        change(&mut decl);
        Self {
            decl: Rc::new(decl),
        }
    }

    /// The same view stored under `name`.
    pub fn named(&self, name: impl Into<Name>) -> Self {
        let name = name.into();
        self.derive(|decl| decl.name = Some(name))
    }

    /// The same view, writable unless `read_only`.
    pub fn read_only(&self, read_only: bool) -> Self {
        self.derive(|decl| decl.read_only = read_only)
    }

    /// An unnamed view of `f` applied to every value of this one.
    ///
    /// The read-only flag carries over. Once named, the result has a cell of
    /// its own running this view's factory and modifiers again.
    pub fn map<U: Clone + 'static>(&self, f: impl Fn(&T) -> U + 'static) -> View<O, U> {
        let source = Rc::clone(&self.decl);
        let f = Rc::new(f);
        View {
            decl: Rc::new(ViewDecl {
                name: None,
                read_only: self.decl.read_only,
                factory: Rc::new(move |owner: &O| {
                    let stream = (source.factory)(owner)?;
                    let f = Rc::clone(&f);
                    Ok(apply_modifiers(owner, &source.modifiers, stream)
                        .map(move |value: T| f(&value))
                        .box_it_clone())
                }),
                modifiers: Vec::new(),
            }),
        }
    }

    /// An unnamed copy of this view with `modifiers` appended to the modifier
    /// chain.
    pub fn pipe(&self, modifiers: impl IntoIterator<Item = Modifier<O, T>>) -> Result<Self> {
        let modifiers: Vec<_> = modifiers.into_iter().collect();
        if modifiers.is_empty() {
            return Err(Error::MissingModifier);
        }
        Ok(self.derive(|decl| {
            decl.name = None;
            decl.modifiers.extend(modifiers);
        }))
    }

    /// Replaces the upstream of this view for `owner`. The previous upstream is
    /// unsubscribed; the modifier chain still applies.
    pub fn set(&self, owner: &O, stream: Stream<T>) -> Result<()> {
        let cell = self.cell(owner)?;
        cell.check_disposed()?;
        if self.decl.read_only && cell.is_initialized() {
            return Err(Error::ReadOnly {
                name: cell.name().clone(),
            });
        }
        cell.replace_upstream(stream)
    }

    fn cell(&self, owner: &O) -> Result<Rc<ValueCell<T>>> {
        cell_of(owner, self.decl.name.as_ref(), |name| {
            let raw = (self.decl.factory)(owner)?;
            Ok(ValueCell::new(name, raw, None, |stream| {
                apply_modifiers(owner, &self.decl.modifiers, stream)
            }))
        })
    }
}

impl<O: ReactiveObject, T: Clone + 'static> ReactiveValue<O, T> for View<O, T> {
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

impl<O: ReactiveObject, T: Clone + 'static> Realize<O> for View<O, T> {
    fn realize(&self, owner: &O) -> Result<()> {
        self.cell(owner).map(drop)
    }
}
