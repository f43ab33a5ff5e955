//! Dialog actions and the continuation engine.
//!
//! An [`Action`] is one step of dialog logic. It runs against a shared
//! context, performs its side effects and tells the engine what to do next:
//!
//! ```text
//! Action ─► Next::Continue(Action₂) ─► Next::Continue(Action₃) ─► Next::Done
//! ```
//!
//! [`run`] turns such a chain into a single action. Only the first step sees
//! the caller's [`Props`]; every continuation receives empty ones.
//!
//! # Example
//!
//! ```rust,ignore
//! fn ask_name() -> Action<ConsoleContext> {
//!     Action::new(|ctx, _props| async move {
//!         ctx.say("What is your name?");
//!         Ok::<_, BoxError>(Action::new(await_name))
//!     })
//! }
//!
//! async fn await_name(ctx: Arc<ConsoleContext>, _props: Props) -> Result<(), BoxError> {
//!     ctx.with_session(|s| s.set("step", "name"));
//!     Ok(())
//! }
//! ```

use std::sync::Arc;

use futures::future::BoxFuture;
use parley_core::{BoxError, HandlerError};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::error::BotError;

// ============================================================================
// Props
// ============================================================================

/// One-shot properties handed to the first action of a chain.
///
/// The dispatcher calls the primary handler with empty props and the error
/// handler with the triggering failure attached.
#[derive(Debug, Clone, Default)]
pub struct Props {
    values: Map<String, Value>,
    error: Option<HandlerError>,
}

impl Props {
    /// Creates empty props.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates props carrying the failure that triggered an error handler.
    pub fn with_error(error: HandlerError) -> Self {
        Self {
            values: Map::new(),
            error: Some(error),
        }
    }

    /// Adds a value (builder pattern).
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    /// Inserts a value, returning the previous one.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.values.insert(key.into(), value.into())
    }

    /// Returns the raw value stored under `key`.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Deserializes the value stored under `key`.
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.values
            .get(key)
            .and_then(|value| T::deserialize(value).ok())
    }

    /// Returns the attached failure, if any.
    pub fn error(&self) -> Option<&HandlerError> {
        self.error.as_ref()
    }

    /// Returns `true` when neither values nor an error are present.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty() && self.error.is_none()
    }
}

// ============================================================================
// Action / Next
// ============================================================================

/// Future returned by an [`Action`].
pub type ActionFuture<C> = BoxFuture<'static, Result<Next<C>, BoxError>>;

type ActionFn<C> = dyn Fn(Arc<C>, Props) -> ActionFuture<C> + Send + Sync;

/// A type-erased, cheaply cloneable dialog step.
pub struct Action<C> {
    f: Arc<ActionFn<C>>,
}

impl<C> Clone for Action<C> {
    fn clone(&self) -> Self {
        Self {
            f: Arc::clone(&self.f),
        }
    }
}

impl<C: Send + Sync + 'static> Action<C> {
    /// Wraps an async function of `(context, props)`.
    ///
    /// The function may return anything implementing [`IntoNext`]: `()`,
    /// [`Next`], another [`Action`], `Option<Action>`, or a `Result` of those.
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn(Arc<C>, Props) -> Fut + Send + Sync + 'static,
        Fut: Future + Send + 'static,
        Fut::Output: IntoNext<C>,
    {
        Self {
            f: Arc::new(move |ctx, props| {
                let fut = f(ctx, props);
                Box::pin(async move { fut.await.into_next() })
            }),
        }
    }

    /// Invokes this single step. Continuations are not followed.
    pub fn call(&self, ctx: Arc<C>, props: Props) -> ActionFuture<C> {
        (self.f)(ctx, props)
    }
}

impl<C> std::fmt::Debug for Action<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Action").finish_non_exhaustive()
    }
}

/// What an action asks the engine to do after it completed.
pub enum Next<C> {
    /// Run this action next, with empty props.
    Continue(Action<C>),
    /// The chain is finished.
    Done,
}

impl<C> Next<C> {
    /// Returns `true` for [`Next::Done`].
    pub fn is_done(&self) -> bool {
        matches!(self, Self::Done)
    }
}

impl<C> std::fmt::Debug for Next<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Continue(_) => f.write_str("Continue(..)"),
            Self::Done => f.write_str("Done"),
        }
    }
}

// ============================================================================
// IntoNext - Handle action return values
// ============================================================================

/// Conversion of action return values into a [`Next`] step.
pub trait IntoNext<C>: Send {
    /// Converts this value.
    fn into_next(self) -> Result<Next<C>, BoxError>;
}

/// `()` ends the chain.
impl<C> IntoNext<C> for () {
    fn into_next(self) -> Result<Next<C>, BoxError> {
        Ok(Next::Done)
    }
}

impl<C: Send> IntoNext<C> for Next<C> {
    fn into_next(self) -> Result<Next<C>, BoxError> {
        Ok(self)
    }
}

/// An action continues the chain.
impl<C: Send> IntoNext<C> for Action<C> {
    fn into_next(self) -> Result<Next<C>, BoxError> {
        Ok(Next::Continue(self))
    }
}

/// `Some` continues the chain, `None` ends it.
impl<C: Send> IntoNext<C> for Option<Action<C>> {
    fn into_next(self) -> Result<Next<C>, BoxError> {
        Ok(self.map_or(Next::Done, Next::Continue))
    }
}

/// `Ok` is converted further, `Err` fails the chain.
impl<C, T, E> IntoNext<C> for Result<T, E>
where
    T: IntoNext<C>,
    E: Into<BoxError> + Send,
{
    fn into_next(self) -> Result<Next<C>, BoxError> {
        self.map_err(Into::into)?.into_next()
    }
}

// ============================================================================
// Continuation engine
// ============================================================================

/// Wraps `initial` into an action that follows every continuation.
///
/// # Errors
///
/// Returns [`BotError::MissingHandler`] when `initial` is `None`.
pub fn run<C: Send + Sync + 'static>(initial: Option<Action<C>>) -> Result<Action<C>, BotError> {
    initial.map(chain).ok_or(BotError::MissingHandler)
}

/// Wraps `initial` into an action that follows every continuation.
///
/// The returned action always resolves to [`Next::Done`] or to the error of
/// the step that failed.
pub fn chain<C: Send + Sync + 'static>(initial: Action<C>) -> Action<C> {
    Action::new(move |ctx: Arc<C>, props: Props| {
        let mut current = initial.clone();
        async move {
            let mut props = props;
            loop {
                match current.call(Arc::clone(&ctx), std::mem::take(&mut props)).await? {
                    Next::Continue(next) => current = next,
                    Next::Done => return Ok::<_, BoxError>(Next::Done),
                }
            }
        }
    })
}
