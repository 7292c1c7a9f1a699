//! Usage: Wall-clock helper shared by expiry checks and storage stamps.

use std::time::{SystemTime, UNIX_EPOCH};

pub fn now_unix_seconds() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn now_unix_seconds_is_after_2020() {
        assert!(now_unix_seconds() > 1_577_836_800);
    }
}
