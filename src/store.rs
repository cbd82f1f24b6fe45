use std::cell::{Cell, OnceCell, RefCell};
use std::collections::HashSet;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;
use tracing::{debug, warn};

use crate::cell::{AnyCell, ValueCell};
use crate::hash::FastHashBuilder;
use crate::dispatch;
use crate::stream::{self, Observable, Observer, Stream, Subject};
use crate::value::Name;
use crate::{Error, Result};

type CellMap = IndexMap<Name, Rc<dyn AnyCell>, FastHashBuilder>;

/// Per-instance storage of realized cells.
///
/// A host type embeds one `InstanceState` and hands it out through
/// [`ReactiveObject::reactive_state`](crate::ReactiveObject::reactive_state).
/// Cells are kept in realization order, which is also the order in which
/// [`dispose`](InstanceState::dispose) tears them down. The map itself is only
/// allocated when the first cell is realized.
pub struct InstanceState {
    cells: OnceCell<RefCell<CellMap>>,
    /// Names whose cell is being built right now.
    realizing: RefCell<HashSet<Name, FastHashBuilder>>,
    disposed: Cell<bool>,
    on_dispose: Subject<()>,
}

impl Default for InstanceState {
    fn default() -> Self {
        Self {
            cells: OnceCell::new(),
            realizing: RefCell::default(),
            disposed: Cell::new(false),
            on_dispose: stream::subject(),
        }
    }
}

impl fmt::Debug for InstanceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstanceState")
            .field("cells", &self.names())
            .field("disposed", &self.disposed.get())
            .finish()
    }
}

impl InstanceState {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn cells(&self) -> &RefCell<CellMap> {
        self.cells.get_or_init(RefCell::default)
    }

    fn lookup(&self, name: &str) -> Option<Rc<dyn AnyCell>> {
        let cells = self.cells.get()?;
        cells.borrow().get(name).cloned()
    }

    /// Returns the cell `name`, realizing it with `build` if this is the first
    /// request.
    ///
    /// No borrow of the store is held while `build` runs, so it may realize the
    /// cells it depends on. Those end up before this one in realization order.
    pub(crate) fn get_or_realize<T: Clone + 'static>(
        &self,
        name: &Name,
        build: impl FnOnce() -> Result<Rc<ValueCell<T>>>,
    ) -> Result<Rc<ValueCell<T>>> {
        if let Some(cell) = self.lookup(name) {
            cov_mark::hit!(cell_reused);
            return downcast(name, cell);
        }
        if self.disposed.get() {
            return Err(Error::Disposed { name: name.clone() });
        }
        if !self.realizing.borrow_mut().insert(name.clone()) {
            return Err(Error::InvalidState(format!(
                "reactive value '{name}' depends on itself"
            )));
        }

        let built = build();
        self.realizing.borrow_mut().remove(name);
        let cell = built?;

        self.cells()
            .borrow_mut()
            .insert(name.clone(), Rc::clone(&cell) as Rc<dyn AnyCell>);
        debug!(name = %name, cells = self.len(), "stored cell");
        Ok(cell)
    }

    /// The stream of the already realized value `name`.
    ///
    /// Only values that were accessed, observed or realized before can be
    /// looked up by name; the declaration is needed to build a cell.
    pub fn observe<T: Clone + 'static>(&self, name: &str) -> Result<Stream<T>> {
        let cell = self.lookup(name).ok_or_else(|| {
            Error::InvalidState(format!("no reactive value named '{name}' has been realized"))
        })?;
        downcast::<T>(&Name::from(name), cell)?.observable()
    }

    /// Whether a cell named `name` was realized.
    pub fn contains(&self, name: &str) -> bool {
        self.lookup(name).is_some()
    }

    /// Number of realized cells.
    pub fn len(&self) -> usize {
        self.cells.get().map_or(0, |cells| cells.borrow().len())
    }

    /// Whether no cell was realized yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Names of the realized cells, in realization order.
    pub fn names(&self) -> Vec<Name> {
        self.cells
            .get()
            .map(|cells| cells.borrow().keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Whether [`dispose`](InstanceState::dispose) has run.
    pub fn is_disposed(&self) -> bool {
        self.disposed.get()
    }

    /// Emits once, then completes, when the store is disposed.
    ///
    /// Once disposed, every new subscriber gets that signal right away.
    pub fn on_dispose(&self) -> Stream<()> {
        if self.disposed.get() {
            return stream::just(());
        }
        self.on_dispose.clone().box_it_clone()
    }

    /// Disposes every realized cell in realization order.
    ///
    /// A failing cell does not stop the others from being disposed; the first
    /// error is returned. No cell can be realized afterwards.
    pub fn dispose(&self) -> Result<()> {
        if self.disposed.replace(true) {
            return Err(Error::AlreadyDisposed {
                name: "instance state".into(),
            });
        }
        let cells: Vec<Rc<dyn AnyCell>> = match self.cells.get() {
            Some(cells) => cells.borrow().values().cloned().collect(),
            None => Vec::new(),
        };

        dispatch::batch(|| {
            self.on_dispose.clone().next(());
            self.on_dispose.clone().complete();

            let mut first_error = None;
            for cell in cells {
                if let Err(err) = cell.dispose() {
                    warn!(name = %cell.name(), error = %err, "failed to dispose cell");
                    first_error.get_or_insert(err);
                }
            }
            first_error.map_or(Ok(()), Err)
        })
    }
}

fn downcast<T: Clone + 'static>(name: &Name, cell: Rc<dyn AnyCell>) -> Result<Rc<ValueCell<T>>> {
    cell.into_any().downcast::<ValueCell<T>>().map_err(|_| {
        Error::InvalidState(format!(
            "reactive value '{name}' is bound to a different value type than `{}`",
            std::any::type_name::<T>()
        ))
    })
}
