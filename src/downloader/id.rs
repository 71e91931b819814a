// Job identifier generation

use uuid::Uuid;

/// Length of a job token in hex characters.
pub const JOB_ID_LEN: usize = 8;

/// Short opaque token namespacing a job's temporary files.
///
/// Taken from the first 32 bits of a random v4 UUID. Collision avoidance only;
/// it is not a secret. Stateless, so concurrent callers never contend.
pub fn new_id() -> String {
    let mut id = Uuid::new_v4().simple().to_string();
    id.truncate(JOB_ID_LEN);
    id
}

/// True when `s` looks like a token produced by [`new_id`].
pub fn is_job_id(s: &str) -> bool {
    s.len() == JOB_ID_LEN && s.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn ids_are_eight_lowercase_hex() {
        for _ in 0..100 {
            let id = new_id();
            assert!(is_job_id(&id), "bad id {}", id);
        }
    }

    #[test]
    fn ten_thousand_ids_do_not_collide() {
        let ids: HashSet<String> = (0..10_000).map(|_| new_id()).collect();
        // 32-bit tokens: a single birthday collision happens about 1% of runs
        assert!(ids.len() >= 9_998, "{} collisions", 10_000 - ids.len());
    }

    #[test]
    fn rejects_foreign_tokens() {
        assert!(!is_job_id("ABCDEF12"));
        assert!(!is_job_id("abc"));
        assert!(!is_job_id("abcdefgh"));
    }
}
