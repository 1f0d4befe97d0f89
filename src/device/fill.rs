use rand::RngCore;
use rand::rngs::OsRng;

use crate::config::FillPattern;

/// Fills one sector-sized buffer according to the configured policy:
/// zeroes, or cryptographically random bytes from the OS.
pub(super) fn init_sector(buf: &mut [u8], fill: FillPattern) {
    match fill {
        FillPattern::Zero => buf.fill(0),
        FillPattern::Random => OsRng.fill_bytes(buf),
    }
}
