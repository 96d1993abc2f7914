use std::sync::Arc;

use crate::{registry::Signal, Context};

pub mod cancel;
pub mod change;
pub mod start;
pub mod suspend;
pub mod view;

/// Sleeps on `signal`, then runs `step` until it reports there is nothing
/// left to do. A request that lands while `step` runs leaves the signal set,
/// so it is never missed.
fn serve(ctx: &Arc<Context>, signal: &Signal, name: &str, step: fn(&Arc<Context>) -> bool) {
    log::debug!("{name} worker waiting for requests");
    loop {
        signal.wait();
        let mut handled = 0usize;
        while step(ctx) {
            handled += 1;
        }
        log::trace!("{name} worker handled {handled} request(s)");
    }
}
