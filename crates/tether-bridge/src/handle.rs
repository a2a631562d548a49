//! Opaque handles and the adapter that carries the caller's context into
//! native callback slots.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use tether_core::{Logger, diag};

/// A native object paired with the caller's callback context.
///
/// Both halves are shared. Adapters registered with the native library hold
/// their own reference to the context, and a native connection can be shared
/// by the child handles built on it. The context is never inspected here; it
/// only receives callbacks.
pub struct Handle<N: ?Sized, C: ?Sized> {
    native: Arc<N>,
    context: Arc<C>,
}

impl<N: ?Sized, C: ?Sized> Handle<N, C> {
    pub fn new(native: Arc<N>, context: Arc<C>) -> Self {
        Self { native, context }
    }

    pub fn native(&self) -> &Arc<N> {
        &self.native
    }

    pub fn context(&self) -> &Arc<C> {
        &self.context
    }
}

/// One native event in its boundary shape.
pub(crate) trait Event<C: ?Sized> {
    /// Callback name, for diagnostics.
    fn name(&self) -> &'static str;

    fn deliver(self, callbacks: &C);
}

/// Routes translated events to the caller's callbacks on the current thread.
pub(crate) struct Adapter<C: ?Sized> {
    context: Arc<C>,
    logger: Logger,
}

impl<C: ?Sized> Clone for Adapter<C> {
    fn clone(&self) -> Self {
        Self {
            context: Arc::clone(&self.context),
            logger: self.logger.clone(),
        }
    }
}

impl<C: ?Sized> Adapter<C> {
    pub(crate) fn new(context: Arc<C>, logger: Logger) -> Self {
        Self { context, logger }
    }

    pub(crate) fn logger(&self) -> &Logger {
        &self.logger
    }

    /// Invoke the callback for `event`. A panic in the callback is logged and
    /// stops here; it never unwinds into the native library.
    pub(crate) fn dispatch<E: Event<C>>(&self, event: E) {
        let name = event.name();
        let callbacks = &*self.context;
        if let Err(panic) = panic::catch_unwind(AssertUnwindSafe(|| event.deliver(callbacks))) {
            diag!(
                self.logger,
                Error,
                "{name} callback panicked: {}",
                panic_message(panic.as_ref())
            );
        }
    }
}

impl<C: ?Sized + Send + Sync + 'static> Adapter<C> {
    /// One-shot completion slot that dispatches `event(code)`.
    pub(crate) fn completion<E, F>(&self, event: F) -> Box<dyn FnOnce(i32) + Send>
    where
        E: Event<C>,
        F: FnOnce(i32) -> E + Send + 'static,
    {
        let adapter = self.clone();
        Box::new(move |code: i32| adapter.dispatch(event(code)))
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string payload")
}
