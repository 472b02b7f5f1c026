use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};

use crate::error::{AppError, AppResult, NAVIGATION_PANIC};

pub(crate) fn panic_payload(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Runs `f`, turning a panic into an [`AppError`] instead of unwinding further.
pub fn dispatch_with_fence<T, F>(f: F) -> AppResult<T>
where
    F: FnOnce() -> T,
{
    catch_unwind(AssertUnwindSafe(f)).map_err(|payload| {
        let message = panic_payload(payload.as_ref());
        tracing::error!(
            target: "sitecatalog",
            event = "panic_caught",
            message = %message
        );
        AppError::new(NAVIGATION_PANIC, message)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::panic::panic_any;

    #[test]
    fn dispatch_with_fence_passes_through() {
        let value = dispatch_with_fence(|| 42).unwrap();
        assert_eq!(value, 42);
    }

    #[test]
    fn dispatch_with_fence_catches_str_panic() {
        let err = dispatch_with_fence(|| panic!("boom"))
            .err()
            .expect("should convert panic into error");
        assert_eq!(err.code(), NAVIGATION_PANIC);
        assert_eq!(err.message(), "boom");
    }

    #[test]
    fn dispatch_with_fence_catches_string_panic() {
        let err = dispatch_with_fence(|| panic_any(String::from("kaboom")))
            .err()
            .expect("should convert panic into error");
        assert_eq!(err.message(), "kaboom");
    }

    #[test]
    fn dispatch_with_fence_catches_non_string_panic() {
        let err = dispatch_with_fence(|| panic_any(123_i32))
            .err()
            .expect("should convert panic into error");
        assert_eq!(err.message(), "unknown panic payload");
    }
}
