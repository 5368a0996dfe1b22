use super::{UnitContext, UnitId};
use crate::backend::Backend;
use crate::errors::ThreadResult;
use crate::runtime::Runtime;

use alloc::string::String;

/// Configures a unit before spawning it.
///
/// Unset fields fall back to the runtime defaults: an auto-generated name,
/// the middle priority and [`crate::config::DEFAULT_STACK_SIZE`].
///
/// ```ignore
/// let id = UnitBuilder::new()
///     .name("railcom")
///     .priority(3)
///     .stack_size(1024)
///     .spawn(runtime, |ctx| run_railcom(ctx))?;
/// ```
#[derive(Debug, Default, Clone)]
pub struct UnitBuilder {
    stack_size: usize,
    priority: u8,
    name: Option<String>,
}

impl UnitBuilder {
    pub fn new() -> Self {
        Self {
            stack_size: 0,
            priority: 0,
            name: None,
        }
    }

    pub fn stack_size(mut self, size: usize) -> Self {
        self.stack_size = size;
        self
    }

    pub fn priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }

    pub fn name<T: Into<String>>(mut self, name: T) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn spawn<B, F>(self, runtime: &'static Runtime<B>, entry: F) -> ThreadResult<UnitId>
    where
        B: Backend,
        F: FnOnce(&mut UnitContext) + Send + 'static,
    {
        runtime.spawn(self.name.as_deref(), self.priority, self.stack_size, entry)
    }
}
