use parking_lot::Mutex;

use crate::config::ProviderConfig;

/// Ordered pool of execution providers with a shared round-robin cursor.
///
/// The cursor is not reset after a failure: once provider k has failed, the
/// next call anywhere in the system starts from k's successor, which spreads
/// load instead of hammering the same failing provider from every concurrent
/// request.
pub struct ProviderPool {
    providers: Vec<ProviderConfig>,
    cursor: Mutex<usize>,
}

impl ProviderPool {
    /// `providers` must be non-empty; the cursor starts at 0.
    pub fn new(providers: Vec<ProviderConfig>) -> Self {
        assert!(!providers.is_empty(), "provider pool must not be empty");
        Self {
            providers,
            cursor: Mutex::new(0),
        }
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// The provider the cursor currently points at.
    pub fn current(&self) -> ProviderConfig {
        let cursor = self.cursor.lock();
        self.providers[*cursor].clone()
    }

    /// Index of the current provider, for logging and tests.
    pub fn current_index(&self) -> usize {
        *self.cursor.lock()
    }

    /// Move the cursor to the next provider (wrapping) and return it.
    pub fn advance(&self) -> ProviderConfig {
        let mut cursor = self.cursor.lock();
        *cursor = (*cursor + 1) % self.providers.len();
        self.providers[*cursor].clone()
    }
}
