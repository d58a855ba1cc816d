use crate::error::SettingsError;
use std::time::Duration;
use typed_builder::TypedBuilder;

pub const DEFAULT_FLUSH_THRESHOLD: u64 = 10;
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(24 * 60 * 60);
pub const DEFAULT_GRACE: Duration = Duration::from_secs(10 * 60);
pub const DEFAULT_CACHE_TIMEOUT: Duration = Duration::from_millis(200);

/// Tuning for visit aggregation.
///
/// # Example
///
/// ```rust
/// use std::time::Duration;
/// use tally_core::VisitSettings;
///
/// // Defaults: flush every 10 visits, 24h window
/// let settings = VisitSettings::builder().build();
///
/// let settings = VisitSettings::builder()
///     .flush_threshold(100)
///     .window(Duration::from_secs(3600))
///     .build();
/// assert!(settings.validate().is_ok());
/// ```
#[derive(Debug, Clone, TypedBuilder)]
pub struct VisitSettings {
    /// Every `flush_threshold`-th visit in the cache is written through.
    #[builder(default = DEFAULT_FLUSH_THRESHOLD)]
    pub flush_threshold: u64,

    /// Lifetime of a window marker; at least one flush happens per window.
    #[builder(default = DEFAULT_WINDOW)]
    pub window: Duration,

    /// How long a counter outlives its window marker, leaving room for the
    /// catch-up flush to read it.
    #[builder(default = DEFAULT_GRACE)]
    pub grace: Duration,

    /// Upper bound for a single cache round trip.
    #[builder(default = DEFAULT_CACHE_TIMEOUT)]
    pub cache_timeout: Duration,
}

impl Default for VisitSettings {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl VisitSettings {
    /// TTL given to a counter entry when it is seeded or its window reopens.
    pub fn counter_ttl(&self) -> Duration {
        self.window + self.grace
    }

    /// Validates the settings.
    ///
    /// # Errors
    ///
    /// Returns an error if the threshold, the window or the cache timeout
    /// is zero.
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.flush_threshold == 0 {
            return Err(SettingsError::ZeroFlushThreshold);
        }

        if self.window.is_zero() {
            return Err(SettingsError::ZeroWindow);
        }

        if self.cache_timeout.is_zero() {
            return Err(SettingsError::ZeroCacheTimeout);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = VisitSettings::default();
        assert_eq!(settings.flush_threshold, 10);
        assert_eq!(settings.window, Duration::from_secs(86_400));
        assert_eq!(settings.cache_timeout, Duration::from_millis(200));
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_counter_ttl_covers_grace() {
        let settings = VisitSettings::builder()
            .window(Duration::from_secs(60))
            .grace(Duration::from_secs(5))
            .build();
        assert_eq!(settings.counter_ttl(), Duration::from_secs(65));
    }

    #[test]
    fn test_validate_zero_threshold() {
        let settings = VisitSettings::builder().flush_threshold(0).build();
        assert_eq!(settings.validate(), Err(SettingsError::ZeroFlushThreshold));
    }

    #[test]
    fn test_validate_zero_window() {
        let settings = VisitSettings::builder().window(Duration::ZERO).build();
        assert_eq!(settings.validate(), Err(SettingsError::ZeroWindow));
    }
}
