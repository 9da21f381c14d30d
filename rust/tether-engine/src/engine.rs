use std::sync::Arc;

use async_trait::async_trait;

use crate::{Declaration, Outputs, TetherEngineError};

/// An [Engine] turns declarations into real objects.
///
/// Implementations own everything about *how* an object comes to exist:
/// API calls, retries, diffing against existing state, timeouts. Callers only
/// see whether the object could be realized and, if so, its outputs.
///
/// Dependencies listed in [Declaration::depends_on] have always been realized
/// by the time `realize` is called for a declaration.
#[async_trait]
pub trait Engine: Send + Sync {
    /// Make the declared object exist and report its outputs.
    async fn realize(&self, declaration: &Declaration) -> Result<Outputs, TetherEngineError>;
}

#[async_trait]
impl<T> Engine for Arc<T>
where
    T: Engine + ?Sized,
{
    async fn realize(&self, declaration: &Declaration) -> Result<Outputs, TetherEngineError> {
        self.as_ref().realize(declaration).await
    }
}
