// Panic isolation for recovery tasks and callbacks
use crate::domain::ServiceError;
use crate::port::RecoveryTask;
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::error;

fn panic_message(panic_info: &(dyn Any + Send)) -> String {
    if let Some(s) = panic_info.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic_info.downcast_ref::<String>() {
        s.clone()
    } else {
        "Unknown panic".to_string()
    }
}

/// Run a user callback, logging instead of propagating a panic
///
/// Returns false if the callback panicked.
pub fn invoke_guarded<F: FnOnce()>(name: &str, f: F) -> bool {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(()) => true,
        Err(panic_info) => {
            let panic_msg = panic_message(panic_info.as_ref());
            error!(callback = name, panic_msg = %panic_msg, "Callback panicked");
            false
        }
    }
}

/// Execute a recovery task on its own tokio task
///
/// A panic inside the task surfaces as a failed attempt rather than taking
/// down the worker loop.
pub async fn execute_task_guarded(
    task: Arc<dyn RecoveryTask>,
) -> Result<serde_json::Value, ServiceError> {
    let handle = tokio::spawn(async move { task.execute().await });

    match handle.await {
        Ok(result) => result,
        Err(join_error) if join_error.is_panic() => {
            let panic_msg = panic_message(join_error.into_panic().as_ref());
            error!(panic_msg = %panic_msg, "Recovery task panicked");
            Err(ServiceError::operation(format!("task panicked: {}", panic_msg)))
        }
        Err(join_error) => Err(ServiceError::operation(format!(
            "task cancelled: {}",
            join_error
        ))),
    }
}
