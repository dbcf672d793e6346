//! Environment abstraction for deterministic testing.
//!
//! Decouples the session driver from system resources (time, entropy) so
//! tests run against a virtual clock and seeded randomness while
//! production uses the real thing.

use std::time::Duration;

use rand_core::{CryptoRng, RngCore};

/// Abstract environment providing time and entropy.
///
/// Implementations MUST guarantee:
///
/// - `now()` never goes backwards within one execution context
/// - `random_bytes()` draws from a cryptographically secure source in
///   production
pub trait Environment: Clone + Send + Sync + 'static {
    /// The instant type used by this environment.
    ///
    /// Production environments use `std::time::Instant`; simulation
    /// environments substitute virtual time.
    type Instant: Copy + Ord + Send + Sync + std::ops::Sub<Output = Duration>;

    /// Current time (monotonic).
    fn now(&self) -> Self::Instant;

    /// Sleep for the given duration.
    ///
    /// The only async method in the trait; driver code races it against
    /// transport reads, protocol logic never calls it.
    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send;

    /// Fill the buffer with random bytes.
    fn random_bytes(&self, buffer: &mut [u8]);

    /// Convenience for stable identifiers.
    fn random_u64(&self) -> u64 {
        let mut bytes = [0u8; 8];
        self.random_bytes(&mut bytes);
        u64::from_be_bytes(bytes)
    }
}

/// Production environment: OS entropy, tokio timers.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemEnv;

impl Environment for SystemEnv {
    type Instant = std::time::Instant;

    fn now(&self) -> Self::Instant {
        std::time::Instant::now()
    }

    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send {
        tokio::time::sleep(duration)
    }

    fn random_bytes(&self, buffer: &mut [u8]) {
        rand_core::OsRng.fill_bytes(buffer);
    }
}

/// [`RngCore`] adapter over an [`Environment`], so environment entropy
/// can drive the crypto layer's RNG-parameterized operations.
pub struct EnvRng<'a, E: Environment>(pub &'a E);

impl<E: Environment> RngCore for EnvRng<'_, E> {
    fn next_u32(&mut self) -> u32 {
        let mut bytes = [0u8; 4];
        self.0.random_bytes(&mut bytes);
        u32::from_be_bytes(bytes)
    }

    fn next_u64(&mut self) -> u64 {
        self.0.random_u64()
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        self.0.random_bytes(dest);
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand_core::Error> {
        self.0.random_bytes(dest);
        Ok(())
    }
}

// The Environment contract requires cryptographically secure entropy.
impl<E: Environment> CryptoRng for EnvRng<'_, E> {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_entropy_is_not_constant() {
        let env = SystemEnv;
        let mut a = [0u8; 16];
        let mut b = [0u8; 16];
        env.random_bytes(&mut a);
        env.random_bytes(&mut b);
        assert_ne!(a, b);
    }

    #[test]
    fn env_rng_delegates() {
        let env = SystemEnv;
        let mut rng = EnvRng(&env);
        let mut buffer = [0u8; 32];
        rng.fill_bytes(&mut buffer);
        assert_ne!(buffer, [0u8; 32]);
        assert_ne!(rng.next_u64(), rng.next_u64());
    }

    #[tokio::test(start_paused = true)]
    async fn sleep_respects_virtual_time() {
        let env = SystemEnv;
        let before = tokio::time::Instant::now();
        env.sleep(Duration::from_secs(5)).await;
        assert_eq!(tokio::time::Instant::now() - before, Duration::from_secs(5));
    }
}
