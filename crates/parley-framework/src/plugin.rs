//! Pre-processing plugins.
//!
//! A plugin runs against every context before the primary handler. It can
//! only produce side effects (enrich the session, attach data to the
//! context...). A failing plugin fails its context exactly like a failing
//! handler would.

use std::borrow::Cow;
use std::sync::Arc;

use futures::future::{BoxFuture, try_join_all};
use parley_core::{BoxError, HandlerError};
use tracing::trace;

/// Future returned by a [`Plugin`].
pub type PluginFuture = BoxFuture<'static, Result<(), BoxError>>;

type PluginFn<C> = dyn Fn(Arc<C>) -> PluginFuture + Send + Sync;

/// A named pre-processing hook.
///
/// # Example
///
/// ```rust,ignore
/// bot.use_plugin(Plugin::new("visits", |ctx: Arc<ConsoleContext>| async move {
///     ctx.with_session(|s| {
///         let visits = s.get::<u64>("visits").unwrap_or(0);
///         s.set("visits", visits + 1)
///     });
///     Ok::<_, BoxError>(())
/// }));
/// ```
pub struct Plugin<C> {
    name: Cow<'static, str>,
    f: Arc<PluginFn<C>>,
}

impl<C> Clone for Plugin<C> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            f: Arc::clone(&self.f),
        }
    }
}

impl<C: Send + Sync + 'static> Plugin<C> {
    /// Creates a plugin from an async function of the context.
    pub fn new<F, Fut, E>(name: impl Into<Cow<'static, str>>, f: F) -> Self
    where
        F: Fn(Arc<C>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
        E: Into<BoxError>,
    {
        Self {
            name: name.into(),
            f: Arc::new(move |ctx| {
                let fut = f(ctx);
                Box::pin(async move { fut.await.map_err(Into::into) })
            }),
        }
    }

    /// Returns the plugin name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Runs the plugin against `ctx`.
    pub fn call(&self, ctx: Arc<C>) -> PluginFuture {
        (self.f)(ctx)
    }
}

impl<C> std::fmt::Debug for Plugin<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Plugin").field("name", &self.name).finish()
    }
}

/// Runs every plugin against `ctx` concurrently.
///
/// Resolves with the first failure; the remaining plugins are dropped.
pub(crate) async fn run_plugins<C: Send + Sync + 'static>(
    plugins: &[Plugin<C>],
    ctx: &Arc<C>,
) -> Result<(), HandlerError> {
    if plugins.is_empty() {
        return Ok(());
    }

    try_join_all(plugins.iter().map(|plugin| {
        trace!(plugin = plugin.name(), "Running plugin");
        plugin.call(Arc::clone(ctx))
    }))
    .await
    .map_err(HandlerError::from)?;
    Ok(())
}
