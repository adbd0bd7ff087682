//! Panic capture for running attempts.
//!
//! [`CatchFault`] polls a future inside `catch_unwind` and turns a panic
//! into a [`Fault`] carrying the panic message and a backtrace. The
//! backtrace is taken by a process-wide panic hook that is only active
//! while a [`CatchFault`] is being polled on the current thread; panics
//! elsewhere go to the previously installed hook.

use std::any::Any;
use std::backtrace::Backtrace;
use std::cell::{Cell, RefCell};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::Once;
use std::task::{Context, Poll};

use pin_project_lite::pin_project;

thread_local! {
    static ARMED: Cell<bool> = const { Cell::new(false) };
    static LAST_TRACE: RefCell<Option<String>> = const { RefCell::new(None) };
}

static HOOK: Once = Once::new();

fn install_hook() {
    HOOK.call_once(|| {
        let previous = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            if ARMED.with(Cell::get) {
                let trace = format!("{info}\n{}", Backtrace::force_capture());
                LAST_TRACE.with(|slot| *slot.borrow_mut() = Some(trace));
            } else {
                previous(info);
            }
        }));
    });
}

/// A panic caught while polling an attempt.
#[derive(Clone, Debug)]
pub struct Fault {
    /// Panic payload as text.
    pub message: String,
    /// Panic location and backtrace.
    pub trace: String,
}

pin_project! {
    /// Future adapter that converts panics of `inner` into [`Fault`]s.
    #[must_use = "futures do nothing unless polled"]
    pub struct CatchFault<F> {
        #[pin]
        inner: F,
    }
}

impl<F> CatchFault<F> {
    /// Wrap `inner`.
    pub fn new(inner: F) -> Self {
        install_hook();
        Self { inner }
    }
}

impl<F: Future> Future for CatchFault<F> {
    type Output = Result<F::Output, Fault>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut this = self.project();
        let was_armed = ARMED.with(|armed| armed.replace(true));
        let polled = std::panic::catch_unwind(AssertUnwindSafe(|| this.inner.as_mut().poll(cx)));
        ARMED.with(|armed| armed.set(was_armed));

        match polled {
            Ok(Poll::Pending) => Poll::Pending,
            Ok(Poll::Ready(output)) => Poll::Ready(Ok(output)),
            Err(payload) => {
                let message = panic_message(&payload);
                let trace = LAST_TRACE
                    .with(|slot| slot.borrow_mut().take())
                    .unwrap_or_else(|| format!("panic: {message}\n{}", Backtrace::force_capture()));
                Poll::Ready(Err(Fault { message, trace }))
            }
        }
    }
}

/// Text of a panic payload.
pub fn panic_message(panic: &Box<dyn Any + Send>) -> String {
    panic
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| panic.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn passes_output_through() {
        let out = CatchFault::new(async { 7 }).await.unwrap();
        assert_eq!(out, 7);
    }

    #[tokio::test]
    async fn panic_becomes_fault_with_trace() {
        let v: Vec<u32> = Vec::new();
        let fault = CatchFault::new(async move {
            tokio::task::yield_now().await;
            v[3]
        })
        .await
        .unwrap_err();

        assert!(fault.message.contains("index out of bounds"), "got: {}", fault.message);
        assert!(!fault.trace.is_empty());
        assert!(fault.trace.contains("index out of bounds"));
    }

    fn fail(step: &str) -> u8 {
        panic!("{step} failed")
    }

    #[tokio::test]
    async fn string_payload() {
        let fault = CatchFault::new(async { fail("charge") })
            .await
            .unwrap_err();
        assert_eq!(fault.message, "charge failed");
    }

    #[test]
    fn panic_message_variants() {
        let s: Box<dyn Any + Send> = Box::new("static");
        assert_eq!(panic_message(&s), "static");
        let owned: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(&owned), "owned");
        let other: Box<dyn Any + Send> = Box::new(5_u8);
        assert_eq!(panic_message(&other), "unknown panic");
    }
}
