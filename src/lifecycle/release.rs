//! Scoped release of started subsystems.

use std::sync::Arc;

use crate::agent::{Subsystem, SubsystemError};

/// A subsystem that failed to shut down.
#[derive(Debug, thiserror::Error)]
#[error("error shutting down {subsystem}: {source}")]
pub struct ShutdownError {
    pub subsystem: String,
    #[source]
    pub source: SubsystemError,
}

/// Started subsystems, released in reverse acquisition order.
#[derive(Default)]
pub struct ReleaseStack {
    handles: Vec<Arc<dyn Subsystem>>,
}

impl ReleaseStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a subsystem as soon as it has started.
    pub fn push(&mut self, handle: Arc<dyn Subsystem>) {
        self.handles.push(handle);
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Shut down every subsystem, newest first. A failure never stops the
    /// remaining releases; all failures are returned.
    pub async fn release_all(&mut self) -> Vec<ShutdownError> {
        let mut errors = Vec::new();
        while let Some(handle) = self.handles.pop() {
            tracing::debug!(subsystem = handle.name(), "Shutting down");
            if let Err(source) = handle.shutdown().await {
                tracing::error!(subsystem = handle.name(), error = %source, "Shutdown failed");
                errors.push(ShutdownError {
                    subsystem: handle.name().to_string(),
                    source,
                });
            }
        }
        errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct Recorded {
        name: &'static str,
        fail: bool,
        log: Arc<Mutex<Vec<&'static str>>>,
    }

    #[async_trait]
    impl Subsystem for Recorded {
        fn name(&self) -> &str {
            self.name
        }

        async fn shutdown(&self) -> Result<(), SubsystemError> {
            self.log.lock().unwrap().push(self.name);
            if self.fail {
                Err(SubsystemError::Failed("boom".into()))
            } else {
                Ok(())
            }
        }
    }

    #[tokio::test]
    async fn test_reverse_order_and_collect() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut stack = ReleaseStack::new();
        for (name, fail) in [("agent", true), ("rpc", false), ("http", false)] {
            stack.push(Arc::new(Recorded {
                name,
                fail,
                log: log.clone(),
            }));
        }

        let errors = stack.release_all().await;
        assert_eq!(*log.lock().unwrap(), vec!["http", "rpc", "agent"]);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].subsystem, "agent");
        assert!(stack.is_empty());
    }
}
