//! Hardware watchdog port.
//!
//! The watchdog is the node's only cancellation mechanism: any step that
//! stalls longer than the configured timeout gets the whole device reset.
//! Everything in the duty cycle that can run longer than that timeout feeds
//! it from inside its loop.

use embassy_time::Duration;

pub trait Watchdog {
    /// Arm the watchdog. Called once while booting.
    fn configure(&mut self, timeout: Duration);

    /// Restart the reset countdown
    fn feed(&mut self);
}

impl<W: Watchdog + ?Sized> Watchdog for &mut W {
    fn configure(&mut self, timeout: Duration) {
        (**self).configure(timeout);
    }

    fn feed(&mut self) {
        (**self).feed();
    }
}
