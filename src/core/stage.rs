//! A named unit of test work

use crate::core::CancellationQuery;
use crate::types::StageError;

type StageFn = dyn Fn(&CancellationQuery) -> Result<(), StageError> + Send + Sync;

/// One validation step
///
/// The callable closes over whatever driver handles it needs and receives
/// a read-only view of the run's cancellation flag. It must check it around
/// every blocking call or sleep and return `StageError::Cancelled` promptly.
pub struct Stage {
    name: String,
    /// Explicit operator code; defaults to the 1-based pipeline position
    code: Option<i32>,
    run: Box<StageFn>,
}

impl Stage {
    pub fn new<F>(name: impl Into<String>, run: F) -> Self
    where
        F: Fn(&CancellationQuery) -> Result<(), StageError> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            code: None,
            run: Box::new(run),
        }
    }

    /// Bind this stage to a fixed code instead of its position
    pub fn with_code(mut self, code: i32) -> Self {
        self.code = Some(code);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn code(&self) -> Option<i32> {
        self.code
    }

    pub fn run(&self, token: &CancellationQuery) -> Result<(), StageError> {
        (self.run)(token)
    }
}

impl std::fmt::Debug for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stage")
            .field("name", &self.name)
            .field("code", &self.code)
            .finish_non_exhaustive()
    }
}
