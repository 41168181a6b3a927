//! Command handlers and the category → handler registry.

use async_trait::async_trait;
use echobridge_core::{Command, Result};
use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tracing::debug;

/// Consumer of backend commands of one category.
///
/// Every handler has the same suspend-capable signature; synchronous code
/// can be plugged in through [`FnHandler`].
#[async_trait]
pub trait CommandHandler: Send + Sync {
    async fn handle(&self, command: &Command) -> Result<()>;
}

#[async_trait]
impl<T: CommandHandler + ?Sized> CommandHandler for Arc<T> {
    async fn handle(&self, command: &Command) -> Result<()> {
        (**self).handle(command).await
    }
}

/// Adapts a plain closure.
pub struct FnHandler<F>(F);

pub fn handler_fn<F>(f: F) -> FnHandler<F>
where
    F: Fn(&Command) -> Result<()> + Send + Sync,
{
    FnHandler(f)
}

#[async_trait]
impl<F> CommandHandler for FnHandler<F>
where
    F: Fn(&Command) -> Result<()> + Send + Sync,
{
    async fn handle(&self, command: &Command) -> Result<()> {
        (self.0)(command)
    }
}

/// Adapts a closure returning a future. The closure receives its own copy
/// of the command so the future can outlive the borrow.
pub struct AsyncFnHandler<F>(F);

pub fn async_handler_fn<F, Fut>(f: F) -> AsyncFnHandler<F>
where
    F: Fn(Command) -> Fut + Send + Sync,
    Fut: Future<Output = Result<()>> + Send,
{
    AsyncFnHandler(f)
}

#[async_trait]
impl<F, Fut> CommandHandler for AsyncFnHandler<F>
where
    F: Fn(Command) -> Fut + Send + Sync,
    Fut: Future<Output = Result<()>> + Send,
{
    async fn handle(&self, command: &Command) -> Result<()> {
        (self.0)(command.clone()).await
    }
}

/// Result of routing one command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    Handled,
    /// Nothing registered for the command's type.
    NoHandler,
    /// The command carried no `type` field.
    Untyped,
    /// The handler returned an error or panicked; already logged.
    Failed(String),
}

#[derive(Default)]
pub struct CallbackRegistry {
    handlers: HashMap<String, Arc<dyn CommandHandler>>,
}

impl CallbackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a handler, returning the one it replaced.
    pub fn register(
        &mut self,
        category: &str,
        handler: Arc<dyn CommandHandler>,
    ) -> Option<Arc<dyn CommandHandler>> {
        let previous = self.handlers.insert(category.to_string(), handler);
        if previous.is_some() {
            debug!(category, "Replaced callback");
        } else {
            debug!(category, "Registered callback");
        }
        previous
    }

    pub fn remove(&mut self, category: &str) -> Option<Arc<dyn CommandHandler>> {
        self.handlers.remove(category)
    }

    pub fn get(&self, category: &str) -> Option<Arc<dyn CommandHandler>> {
        self.handlers.get(category).cloned()
    }

    pub fn contains(&self, category: &str) -> bool {
        self.handlers.contains_key(category)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    pub fn categories(&self) -> Vec<String> {
        let mut names: Vec<String> = self.handlers.keys().cloned().collect();
        names.sort();
        names
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "handler panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use echobridge_core::Error;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct Counting(Arc<AtomicUsize>);

    #[async_trait]
    impl CommandHandler for Counting {
        async fn handle(&self, _command: &Command) -> Result<()> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn test_register_overwrites() {
        let first = Arc::new(AtomicUsize::new(0));
        let mut registry = CallbackRegistry::new();
        assert!(registry.is_empty());

        assert!(registry
            .register("speech", Arc::new(Counting(first.clone())))
            .is_none());
        assert!(registry
            .register("speech", Arc::new(Counting(first)))
            .is_some());
        registry.register("aba", Arc::new(handler_fn(|_| Ok(()))));

        assert_eq!(registry.len(), 2);
        assert!(registry.contains("speech"));
        assert_eq!(registry.categories(), vec!["aba".to_string(), "speech".to_string()]);

        assert!(registry.remove("aba").is_some());
        assert!(!registry.contains("aba"));
    }

    #[test]
    fn test_any_category_string_is_accepted() {
        let mut registry = CallbackRegistry::new();
        registry.register("", Arc::new(handler_fn(|_| Ok(()))));
        registry.register("weird key/with spaces", Arc::new(handler_fn(|_| Ok(()))));
        assert_eq!(registry.len(), 2);
    }

    #[tokio::test]
    async fn test_sync_and_async_handlers_share_one_signature() {
        let seen = Arc::new(Mutex::new(Vec::new()));

        let sync_seen = seen.clone();
        let sync = handler_fn(move |cmd: &Command| {
            sync_seen.lock().unwrap().push(format!("sync:{}", cmd.kind().unwrap_or("")));
            Ok(())
        });

        let async_seen = seen.clone();
        let asynchronous = async_handler_fn(move |cmd: Command| {
            let seen = async_seen.clone();
            async move {
                tokio::task::yield_now().await;
                seen.lock().unwrap().push(format!("async:{}", cmd.kind().unwrap_or("")));
                Ok::<(), Error>(())
            }
        });

        let handlers: Vec<Arc<dyn CommandHandler>> = vec![Arc::new(sync), Arc::new(asynchronous)];
        for handler in handlers {
            handler.handle(&Command::new("hid")).await.unwrap();
        }

        assert_eq!(*seen.lock().unwrap(), vec!["sync:hid", "async:hid"]);
    }

    #[tokio::test]
    async fn test_handler_error_is_returned_to_caller() {
        let failing = handler_fn(|_| Err(Error::Handler("device busy".into())));
        let err = failing.handle(&Command::new("hid")).await.unwrap_err();
        assert!(err.to_string().contains("device busy"));
    }

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(payload.as_ref()), "boom");
        let payload: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(payload.as_ref()), "bang");
        let payload: Box<dyn Any + Send> = Box::new(42u8);
        assert_eq!(panic_message(payload.as_ref()), "handler panicked");
    }
}
