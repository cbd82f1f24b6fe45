use crate::store::InstanceState;
use crate::stream::{Observable, Stream};
use crate::value::{ReactiveValue, Realize};
use crate::{Error, Result};

/// A host type whose attributes are reactive values.
///
/// Implementors only hand out the [`InstanceState`] they embed; everything else
/// has a default implementation.
///
/// ```ignore
/// #[derive(Default)]
/// struct Counter {
///     state: InstanceState,
/// }
///
/// impl ReactiveObject for Counter {
///     fn reactive_state(&self) -> &InstanceState {
///         &self.state
///     }
/// }
/// ```
pub trait ReactiveObject: Sized + 'static {
    /// The store holding this instance's cells.
    fn reactive_state(&self) -> &InstanceState;

    /// Whether [`dispose`](ReactiveObject::dispose) has run.
    fn is_disposed(&self) -> bool {
        self.reactive_state().is_disposed()
    }

    /// Signals [`on_dispose`](ReactiveObject::on_dispose), then disposes every
    /// realized value of this instance.
    fn dispose(&self) -> Result<()> {
        if self.is_disposed() {
            return Err(Error::AlreadyDisposed {
                name: std::any::type_name::<Self>().into(),
            });
        }
        self.reactive_state().dispose()
    }

    /// Emits once, then completes, when the instance is disposed.
    fn on_dispose(&self) -> Stream<()> {
        self.reactive_state().on_dispose()
    }

    /// Observes `value`, completing the stream as soon as the instance is
    /// disposed.
    fn observe<T: Clone + 'static>(
        &self,
        value: &(impl ReactiveValue<Self, T> + ?Sized),
    ) -> Result<Stream<T>> {
        if self.is_disposed() {
            return Err(Error::InvalidState(format!(
                "cannot observe a disposed `{}`",
                std::any::type_name::<Self>()
            )));
        }
        Ok(value
            .observable(self)?
            .take_until(self.on_dispose())
            .box_it_clone())
    }

    /// Realizes `values` right away, in order.
    ///
    /// Called from a constructor, this lets a derived value aggregate every
    /// change of its sources from the start instead of from its first access.
    fn realize(&self, values: &[&dyn Realize<Self>]) -> Result<()> {
        values.iter().try_for_each(|value| value.realize(self))
    }
}
