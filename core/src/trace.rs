//! Process-wide trace flag
//!
//! Lifecycle instrumentation (device creation, swapchain transitions, scene
//! loads, frame aborts) is emitted through [`trace_point!`] on the
//! `vkscene::trace` target, and only while the flag is enabled.

use std::sync::atomic::{AtomicBool, Ordering};

static ENABLED: AtomicBool = AtomicBool::new(false);

/// Turn lifecycle tracing on or off.
pub fn set_enabled(enabled: bool) {
    ENABLED.store(enabled, Ordering::Relaxed);
}

/// Whether lifecycle tracing is on.
pub fn enabled() -> bool {
    ENABLED.load(Ordering::Relaxed)
}

/// Log a lifecycle event when tracing is enabled.
///
/// ```ignore
/// trace_point!("swapchain recreate");
/// trace_point!("scene load", objects = count);
/// ```
#[macro_export]
macro_rules! trace_point {
    ($event:expr $(, $key:ident = $value:expr)* $(,)?) => {
        if $crate::trace::enabled() {
            $crate::__private::tracing::info!(
                target: "vkscene::trace",
                $($key = ?$value,)*
                "{}",
                $event
            );
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_toggle() {
        set_enabled(true);
        assert!(enabled());
        trace_point!("test event", value = 3);
        set_enabled(false);
        assert!(!enabled());
    }
}
