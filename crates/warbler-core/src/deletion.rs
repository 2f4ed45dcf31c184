//! Deferred message deletion
//!
//! The only path by which a triggering message is removed. It runs once per
//! dispatch, after every action for the message has completed.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::context::MessageContext;
use crate::platform::Platform;

/// What happened to the originating message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum DeletionOutcome {
    /// No action voted for deletion
    NotRequested,
    Deleted,
    /// The platform refused or could not be reached
    Failed(String),
}

impl DeletionOutcome {
    pub fn is_deleted(&self) -> bool {
        matches!(self, DeletionOutcome::Deleted)
    }
}

impl fmt::Display for DeletionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeletionOutcome::NotRequested => write!(f, "not requested"),
            DeletionOutcome::Deleted => write!(f, "deleted"),
            DeletionOutcome::Failed(reason) => write!(f, "failed: {}", reason),
        }
    }
}

#[derive(Clone)]
pub struct DeletionCoordinator {
    platform: Arc<dyn Platform>,
}

impl DeletionCoordinator {
    pub fn new(platform: Arc<dyn Platform>) -> Self {
        Self { platform }
    }

    /// Issue at most one deletion request for the message
    pub async fn finalize(&self, context: &MessageContext, should_delete: bool) -> DeletionOutcome {
        if !should_delete {
            return DeletionOutcome::NotRequested;
        }

        match self.platform.delete_message(&context.message_ref()).await {
            Ok(()) => {
                tracing::debug!("Deleted message {} in {}", context.id, context.channel.id);
                DeletionOutcome::Deleted
            }
            Err(e) => {
                tracing::warn!("Failed to delete message {}: {}", context.id, e);
                DeletionOutcome::Failed(e.to_string())
            }
        }
    }
}

impl fmt::Debug for DeletionCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeletionCoordinator").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{Author, ChannelRef, MessageRef};
    use crate::error::PlatformError;
    use crate::platform::{OutgoingMessage, SendTarget};
    use async_trait::async_trait;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Recorder {
        deleted: Mutex<Vec<MessageRef>>,
        fail: bool,
    }

    #[async_trait]
    impl Platform for Recorder {
        async fn delete_message(&self, message: &MessageRef) -> Result<(), PlatformError> {
            if self.fail {
                return Err(PlatformError::Rejected("missing permissions".into()));
            }
            self.deleted.lock().push(message.clone());
            Ok(())
        }

        async fn send_message(
            &self,
            _target: &SendTarget,
            _message: &OutgoingMessage,
        ) -> Result<(), PlatformError> {
            Ok(())
        }

        async fn add_roles(
            &self,
            _guild: &str,
            _user: &str,
            _roles: &[String],
        ) -> Result<(), PlatformError> {
            Ok(())
        }

        async fn remove_roles(
            &self,
            _guild: &str,
            _user: &str,
            _roles: &[String],
        ) -> Result<(), PlatformError> {
            Ok(())
        }
    }

    fn context() -> MessageContext {
        MessageContext::new("m1", "!slap bob", Author::new("u1"), ChannelRef::new("c1", "general"))
    }

    #[tokio::test]
    async fn test_finalize_deletes_only_when_requested() {
        let platform = Arc::new(Recorder::default());
        let coordinator = DeletionCoordinator::new(platform.clone());

        assert_eq!(coordinator.finalize(&context(), false).await, DeletionOutcome::NotRequested);
        assert!(platform.deleted.lock().is_empty());

        assert_eq!(coordinator.finalize(&context(), true).await, DeletionOutcome::Deleted);
        assert_eq!(
            *platform.deleted.lock(),
            vec![MessageRef {
                id: "m1".into(),
                channel_id: "c1".into()
            }]
        );
    }

    #[tokio::test]
    async fn test_finalize_reports_platform_failure() {
        let coordinator = DeletionCoordinator::new(Arc::new(Recorder {
            fail: true,
            ..Recorder::default()
        }));

        let outcome = coordinator.finalize(&context(), true).await;
        assert!(matches!(outcome, DeletionOutcome::Failed(ref reason) if reason.contains("missing permissions")));
        assert!(!outcome.is_deleted());
    }
}
