//! Event system for gating operations
//!
//! Provides an event bus for notifying listeners about gating
//! operations. Useful for:
//! - Audit logging
//! - Notification fan-out (certificate emails, UI refresh)
//! - Cache invalidation

use tokio::sync::broadcast;
use tracing::{debug, trace};

use crate::db::{EnrollmentStatus, Scope};

/// Gating events emitted by services
#[derive(Debug, Clone)]
pub enum GatingEvent {
    // Catalog events
    CourseRegistered {
        id: String,
        title: String,
        lesson_count: u32,
    },

    // Graph events
    PrerequisiteAdded {
        dependent_id: String,
        prerequisite_id: String,
        scope: Scope,
        enforce: bool,
    },
    PrerequisiteRemoved {
        dependent_id: String,
        prerequisite_id: String,
        scope: Scope,
    },

    // Enrollment events
    EnrollmentCreated {
        user_id: String,
        course_id: String,
    },
    LessonCompleted {
        user_id: String,
        lesson_id: String,
        course_id: String,
    },
    ProgressUpdated {
        user_id: String,
        course_id: String,
        status: EnrollmentStatus,
        progress_percent: u8,
    },
    CourseCompleted {
        user_id: String,
        course_id: String,
    },

    // Certificate events
    CertificateIssued {
        user_id: String,
        course_id: String,
        certificate_number: String,
    },
}

/// Trait for event listeners
pub trait EventListener: Send + Sync {
    /// Handle an event
    fn on_event(&self, event: &GatingEvent);
}

/// Event bus for broadcasting gating events
pub struct EventBus {
    sender: broadcast::Sender<GatingEvent>,
}

impl EventBus {
    /// Create a new event bus with default capacity
    pub fn new() -> Self {
        Self::with_capacity(1024)
    }

    /// Create a new event bus with specified capacity
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Emit an event to all subscribers
    pub fn emit(&self, event: GatingEvent) {
        trace!(event = ?event, "Emitting gating event");
        // Ignore send errors (no subscribers)
        let _ = self.sender.send(event);
    }

    /// Subscribe to events
    pub fn subscribe(&self) -> broadcast::Receiver<GatingEvent> {
        self.sender.subscribe()
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Logging event listener for audit trails
pub struct LoggingEventListener;

impl EventListener for LoggingEventListener {
    fn on_event(&self, event: &GatingEvent) {
        match event {
            GatingEvent::CourseRegistered { id, title, .. } => {
                debug!(id = %id, title = %title, "Course registered");
            }
            GatingEvent::PrerequisiteAdded {
                dependent_id,
                prerequisite_id,
                scope,
                enforce,
            } => {
                debug!(
                    dependent = %dependent_id,
                    prerequisite = %prerequisite_id,
                    scope = %scope,
                    enforce = enforce,
                    "Prerequisite added"
                );
            }
            GatingEvent::CourseCompleted { user_id, course_id } => {
                debug!(user = %user_id, course = %course_id, "Course completed");
            }
            GatingEvent::CertificateIssued {
                user_id,
                course_id,
                certificate_number,
            } => {
                debug!(
                    user = %user_id,
                    course = %course_id,
                    number = %certificate_number,
                    "Certificate issued"
                );
            }
            _ => {
                trace!(event = ?event, "Gating event");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::{timeout, Duration};

    #[tokio::test]
    async fn test_event_bus_emit_receive() {
        let bus = EventBus::new();
        let mut receiver = bus.subscribe();

        bus.emit(GatingEvent::CourseCompleted {
            user_id: "u1".into(),
            course_id: "rust-intro".into(),
        });

        let event = timeout(Duration::from_millis(100), receiver.recv())
            .await
            .expect("timeout")
            .expect("receive error");

        match event {
            GatingEvent::CourseCompleted { user_id, course_id } => {
                assert_eq!(user_id, "u1");
                assert_eq!(course_id, "rust-intro");
            }
            _ => panic!("Wrong event type"),
        }
    }

    #[test]
    fn test_event_bus_no_subscribers() {
        let bus = EventBus::new();
        // Should not panic even with no subscribers
        bus.emit(GatingEvent::EnrollmentCreated {
            user_id: "u1".into(),
            course_id: "c1".into(),
        });
    }
}
