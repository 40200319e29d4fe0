//! Safe teardown: close a handle without ever failing.
//!
//! Teardown always runs in cleanup position, often while another error is
//! already on its way to the caller. Anything raised here would mask that
//! error, so every failure is logged and dropped.

use std::panic::{self, AssertUnwindSafe};

use crate::connector::ConnectionHandle;

/// Close `handle`, absorbing every failure.
///
/// `None` is a no-op. A peer that already hung up (broken pipe, reset, OS
/// socket error) is logged at debug; anything else, including a panicking
/// `close`, is logged at warn.
pub fn safe_close<H: ConnectionHandle + ?Sized>(handle: Option<&mut H>) {
    let Some(handle) = handle else {
        return;
    };

    match panic::catch_unwind(AssertUnwindSafe(|| handle.close())) {
        Ok(Ok(())) => log::trace!("[teardown] handle closed"),
        Ok(Err(e)) if e.is_peer_gone() => {
            log::debug!("[teardown] peer already disconnected: {e}");
        }
        Ok(Err(e)) => log::warn!("[teardown] unexpected error while closing: {e}"),
        Err(_) => log::warn!("[teardown] close panicked; handle abandoned"),
    }
}
