//! Persisted alert configuration
//!
//! The configuration lives in a small non-volatile blob (EEPROM emulation on
//! the device). It is loaded once at boot and written back synchronously
//! after every change.

use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use thiserror_no_std::Error;

/// Largest encoded configuration blob
pub const CONFIG_BLOB_LEN: usize = 16;

/// Lowest accepted alert limit, the bottom of the DS18B20 range
pub const MIN_LIMIT_CELSIUS: f32 = -55.0;
/// Highest accepted alert limit, the top of the DS18B20 range
pub const MAX_LIMIT_CELSIUS: f32 = 125.0;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct SystemConfig {
    /// Upper bound of the normal zone (°C, inclusive)
    pub green_limit: f32,
    /// Upper bound of the warning zone (°C, inclusive)
    pub yellow_limit: f32,
    /// Whether the danger alarm may sound
    pub sound_enabled: bool,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            green_limit: 25.0,
            yellow_limit: 30.0,
            sound_enabled: true,
        }
    }
}

#[derive(Error, Debug, Clone, Copy, PartialEq)]
pub enum ConfigError {
    #[error("limits must be finite numbers")]
    NonFiniteLimit,
    #[error("limit {value} is outside the sensor range of -55 to 125 °C")]
    LimitOutOfRange { value: f32 },
    #[error("yellow limit {yellow} must be above green limit {green}")]
    LimitsOutOfOrder { green: f32, yellow: f32 },
    #[error("failed to encode configuration")]
    Encode,
    #[error("failed to write configuration to storage")]
    Store,
}

/// Non-volatile storage for the configuration blob
pub trait ConfigStore {
    type Error: core::fmt::Debug;

    /// Copy the stored blob into `buf`, returning its length.
    fn load(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error>;

    /// Replace the stored blob and commit it.
    fn store(&mut self, bytes: &[u8]) -> Result<(), Self::Error>;
}

/// Error reported by [`RamConfigStore`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RamConfigError {
    Empty,
    TooLarge,
}

/// Configuration store kept in RAM
#[derive(Debug, Default, Clone)]
pub struct RamConfigStore {
    blob: Option<heapless::Vec<u8, CONFIG_BLOB_LEN>>,
}

impl RamConfigStore {
    pub const fn new() -> Self {
        Self { blob: None }
    }

    /// The committed blob, `None` if nothing was ever stored
    pub fn blob(&self) -> Option<&[u8]> {
        self.blob.as_deref()
    }
}

impl ConfigStore for RamConfigStore {
    type Error = RamConfigError;

    fn load(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        let blob = self.blob.as_ref().ok_or(RamConfigError::Empty)?;
        let target = buf.get_mut(..blob.len()).ok_or(RamConfigError::TooLarge)?;
        target.copy_from_slice(blob);
        Ok(blob.len())
    }

    fn store(&mut self, bytes: &[u8]) -> Result<(), Self::Error> {
        let blob = heapless::Vec::from_slice(bytes).map_err(|_| RamConfigError::TooLarge)?;
        self.blob = Some(blob);
        Ok(())
    }
}

impl SystemConfig {
    /// Load the configuration, falling back to defaults when the stored
    /// blob is missing, unreadable or holds a nonsensical green limit.
    pub fn load<C: ConfigStore>(store: &mut C) -> Self {
        let mut buf = [0u8; CONFIG_BLOB_LEN];

        let loaded = match store.load(&mut buf) {
            Ok(len) => postcard::from_bytes::<SystemConfig>(&buf[..len]).ok(),
            Err(e) => {
                warn!("Config store unreadable: {:?}", e);
                None
            }
        };

        match loaded {
            Some(config) if config.green_limit.is_finite() => {
                info!(
                    "Loaded config: green {} yellow {} sound {}",
                    config.green_limit, config.yellow_limit, config.sound_enabled
                );
                config
            }
            _ => {
                info!("No valid stored config, using defaults");
                Self::default()
            }
        }
    }

    /// Encode and commit the configuration.
    pub fn save<C: ConfigStore>(&self, store: &mut C) -> Result<(), ConfigError> {
        let mut buf = [0u8; CONFIG_BLOB_LEN];
        let encoded = postcard::to_slice(self, &mut buf).map_err(|_| ConfigError::Encode)?;

        store.store(encoded).map_err(|e| {
            error!("Failed to persist config: {:?}", e);
            ConfigError::Store
        })
    }

    /// Check a pair of limits before they are accepted.
    pub fn validate_limits(green: f32, yellow: f32) -> Result<(), ConfigError> {
        if !green.is_finite() || !yellow.is_finite() {
            return Err(ConfigError::NonFiniteLimit);
        }
        for value in [green, yellow] {
            if !(MIN_LIMIT_CELSIUS..=MAX_LIMIT_CELSIUS).contains(&value) {
                return Err(ConfigError::LimitOutOfRange { value });
            }
        }
        if yellow <= green {
            return Err(ConfigError::LimitsOutOfOrder { green, yellow });
        }
        Ok(())
    }
}
