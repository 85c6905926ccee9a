//! Cleanup callbacks run once the whole invocation is over

use std::sync::Mutex;

use tracing::{debug, warn};

use crate::error::{catch, Result};

type ExitHook = Box<dyn FnOnce() -> Result<()> + Send>;

/// Registry of cleanup callbacks, run in reverse registration order
#[derive(Default)]
pub struct ExitHooks {
    hooks: Mutex<Vec<ExitHook>>,
}

impl ExitHooks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a cleanup callback
    pub fn on_exit<F>(&self, hook: F)
    where
        F: FnOnce() -> Result<()> + Send + 'static,
    {
        self.hooks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(Box::new(hook));
    }

    pub fn len(&self) -> usize {
        self.hooks.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Run and drain every hook, last registered first.
    ///
    /// Failures are logged and do not stop the remaining hooks.
    pub fn run(&self) {
        let hooks: Vec<ExitHook> =
            std::mem::take(&mut *self.hooks.lock().unwrap_or_else(|e| e.into_inner()));
        debug!(count = hooks.len(), "running exit hooks");

        for hook in hooks.into_iter().rev() {
            if let Err(err) = catch(hook) {
                warn!(error = %err, "exit hook failed");
            }
        }
    }
}

impl std::fmt::Debug for ExitHooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExitHooks")
            .field("len", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GantryError;
    use std::sync::Arc;

    #[test]
    fn test_hooks_run_in_reverse_order() {
        let hooks = ExitHooks::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        for i in 0..3 {
            let order = order.clone();
            hooks.on_exit(move || {
                order.lock().unwrap().push(i);
                Ok(())
            });
        }
        hooks.run();

        assert_eq!(*order.lock().unwrap(), vec![2, 1, 0]);
        assert!(hooks.is_empty());
    }

    #[test]
    fn test_failing_hook_does_not_stop_others() {
        let hooks = ExitHooks::new();
        let ran = Arc::new(Mutex::new(false));

        let flag = ran.clone();
        hooks.on_exit(move || {
            *flag.lock().unwrap() = true;
            Ok(())
        });
        hooks.on_exit(|| Err(GantryError::other("cleanup failed").into()));
        hooks.on_exit(|| panic!("cleanup panicked"));
        hooks.run();

        assert!(*ran.lock().unwrap());
    }
}
