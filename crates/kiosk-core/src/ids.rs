//! # Identifier Generation
//!
//! - Frame ids: `OF-<yyMMdd>-<3 uppercase alphanumerics>`, e.g. `OF-250101-AB2`
//! - Order ids: UUID v4, globally unique without coordination (offline-safe)

use chrono::{DateTime, Utc};
use rand::Rng;
use uuid::Uuid;

/// Prefix of every generated frame id.
pub const FRAME_ID_PREFIX: &str = "OF";

const SUFFIX_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
const SUFFIX_LEN: usize = 3;

/// Generates a frame id for a composite created at `now`.
pub fn generate_frame_id<R: Rng + ?Sized>(now: DateTime<Utc>, rng: &mut R) -> String {
    let suffix: String = (0..SUFFIX_LEN)
        .map(|_| SUFFIX_ALPHABET[rng.gen_range(0..SUFFIX_ALPHABET.len())] as char)
        .collect();

    format!("{}-{}-{}", FRAME_ID_PREFIX, now.format("%y%m%d"), suffix)
}

/// Generates a local order id for a sale recorded without a pending
/// transaction from the backend.
pub fn generate_order_id() -> String {
    Uuid::new_v4().to_string()
}

/// Checks the `OF-<6 digits>-<suffix>` shape of a frame id.
pub fn is_well_formed_frame_id(frame_id: &str) -> bool {
    let mut parts = frame_id.splitn(3, '-');
    let (Some(prefix), Some(date), Some(suffix)) = (parts.next(), parts.next(), parts.next())
    else {
        return false;
    };

    prefix == FRAME_ID_PREFIX
        && date.len() == 6
        && date.bytes().all(|b| b.is_ascii_digit())
        && !suffix.is_empty()
        && suffix.bytes().all(|b| b.is_ascii_alphanumeric())
}
