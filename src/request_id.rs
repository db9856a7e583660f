use rand::Rng;

/// Produces the opaque id of one collection cycle.
pub trait RequestIdGenerator: Send + Sync {
    fn generate(&self) -> String;
}

/// Millisecond timestamp plus 64 random bits, both hex.
///
/// Not cryptographically strong, only collision-improbable. Output uses
/// `[0-9a-f]` so it is safe in URLs, headers and file names.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomRequestIdGenerator;

impl RequestIdGenerator for RandomRequestIdGenerator {
    fn generate(&self) -> String {
        let millis = chrono::Utc::now().timestamp_millis().max(0) as u64;
        let noise: u64 = rand::thread_rng().gen();
        format!("{millis:x}{noise:016x}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn ids_are_header_safe() {
        let id = RandomRequestIdGenerator.generate();
        assert!(id.len() > 16);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn ids_do_not_collide() {
        let ids: HashSet<String> = (0..1_000).map(|_| RandomRequestIdGenerator.generate()).collect();
        assert_eq!(ids.len(), 1_000);
    }
}
