//! Environment abstraction for deterministic testing.
//!
//! Decouples broker logic from system resources (time, randomness) so tests
//! can run against a fixed clock and seeded RNG while production uses real
//! system time and OS entropy.

use std::time::Duration;

/// Abstract environment providing time, randomness, and async sleep.
///
/// Implementations MUST guarantee that `now()` never goes backwards and that
/// `random_bytes()` uses cryptographically secure entropy in production
/// (session ids double as unguessable connection handles).
pub trait Environment: Clone + Send + Sync + 'static {
    /// The specific instant type used by this environment.
    ///
    /// Production environments use `std::time::Instant`; test environments
    /// may substitute a virtual clock.
    type Instant: Copy + Ord + Send + Sync + std::ops::Sub<Output = Duration>;

    /// Current time (monotonic).
    fn now(&self) -> Self::Instant;

    /// Sleep for the specified duration.
    ///
    /// The only async method in the trait; used by runtime driver code, not
    /// by broker logic.
    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send;

    /// Fill the provided buffer with random bytes.
    fn random_bytes(&self, buffer: &mut [u8]);

    /// Generate a random `u64`, e.g. for session ids.
    fn random_u64(&self) -> u64 {
        let mut bytes = [0u8; 8];
        self.random_bytes(&mut bytes);
        u64::from_be_bytes(bytes)
    }
}
