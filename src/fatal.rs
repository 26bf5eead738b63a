//! Process-level fault supervision.
//!
//! A panic inside a request handler is that request's problem: the panic hook
//! logs it with the request id and `CatchPanicLayer` turns it into a 500. A
//! panic anywhere else (a background task, the accept loop, the middleware
//! around the handlers, startup) leaves
//! the process in an unknown state, so the hook logs it and exits with
//! status 1 without unwinding further.
//!
//! [`supervise`] wraps the service future itself and converts an error return
//! or an aborted task into the same logged failure exit.

use std::{any::Any, backtrace::Backtrace, future::Future, panic};

use tracing::error;

use crate::lifecycle::ShutdownOutcome;

/// Exit status for any unrecoverable fault.
pub const FAILURE_EXIT: i32 = 1;

tokio::task_local! {
    static REQUEST_SCOPE: String;
}

/// Run `fut` as request-local work for `request_id`.
///
/// Panics raised while polling `fut` are left to the request's own handling.
pub async fn within_request<F: Future>(request_id: String, fut: F) -> F::Output {
    REQUEST_SCOPE.scope(request_id, fut).await
}

/// Request id of the request currently being polled on this task, if any.
pub fn current_request() -> Option<String> {
    REQUEST_SCOPE.try_with(Clone::clone).ok()
}

/// Install the process-wide panic hook. Call once at startup.
pub fn install_panic_hook() {
    panic::set_hook(Box::new(|info| {
        let message = panic_message(info.payload());
        let location = info
            .location()
            .map(ToString::to_string)
            .unwrap_or_else(|| "<unknown>".to_string());

        if let Some(request_id) = current_request() {
            error!(%request_id, panic = %message, %location, "handler panicked");
            return;
        }

        error!(
            panic = %message,
            %location,
            backtrace = %Backtrace::force_capture(),
            "uncaught panic, terminating process"
        );
        std::process::exit(FAILURE_EXIT);
    }));
}

/// Run the service to completion and map the result to a process exit status.
pub async fn supervise<F>(service: F) -> i32
where
    F: Future<Output = anyhow::Result<ShutdownOutcome>> + Send + 'static,
{
    match tokio::spawn(service).await {
        Ok(Ok(outcome)) => outcome.exit_code(),
        Ok(Err(e)) => {
            error!(error = ?e, "service failed, terminating process");
            FAILURE_EXIT
        }
        Err(e) => {
            error!(error = %e, "service task aborted, terminating process");
            FAILURE_EXIT
        }
    }
}

/// Best-effort text of a panic payload.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn request_scope_is_visible_only_inside() {
        assert_eq!(current_request(), None);
        let seen = within_request("abc123".into(), async { current_request() }).await;
        assert_eq!(seen.as_deref(), Some("abc123"));
        assert_eq!(current_request(), None);
    }

    #[tokio::test]
    async fn spawned_work_leaves_the_request_scope() {
        let seen = within_request("abc123".into(), async {
            tokio::spawn(async { current_request() }).await.unwrap()
        })
        .await;
        assert_eq!(seen, None);
    }

    #[tokio::test]
    async fn clean_close_exits_zero() {
        assert_eq!(supervise(async { Ok(ShutdownOutcome::Closed) }).await, 0);
    }

    #[tokio::test]
    async fn forced_and_failed_closes_exit_non_zero() {
        assert_eq!(supervise(async { Ok(ShutdownOutcome::Forced) }).await, FAILURE_EXIT);
        assert_eq!(
            supervise(async { Ok(ShutdownOutcome::CloseFailed) }).await,
            FAILURE_EXIT
        );
    }

    #[tokio::test]
    async fn service_error_exits_non_zero() {
        let code = supervise(async { Err(anyhow::anyhow!("bind failed")) }).await;
        assert_eq!(code, FAILURE_EXIT);
    }

    #[tokio::test]
    async fn panicking_service_exits_non_zero() {
        let code = supervise(async {
            if true {
                panic!("corrupted");
            }
            Ok(ShutdownOutcome::Closed)
        })
        .await;
        assert_eq!(code, FAILURE_EXIT);
    }

    #[test]
    fn panic_message_handles_both_string_kinds() {
        let static_str: Box<dyn Any + Send> = Box::new("static");
        let owned: Box<dyn Any + Send> = Box::new(String::from("owned"));
        let other: Box<dyn Any + Send> = Box::new(42_u8);
        assert_eq!(panic_message(static_str.as_ref()), "static");
        assert_eq!(panic_message(owned.as_ref()), "owned");
        assert_eq!(panic_message(other.as_ref()), "non-string panic payload");
    }
}
