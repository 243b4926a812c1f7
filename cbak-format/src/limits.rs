//! Size limits and configuration

use crate::error::{CbakError, Result};

/// Limits guarding memory use while streaming records
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Limits {
    /// Maximum bytes buffered for one top-level object (default: 16 MiB, hard: 128 MiB)
    pub max_record_bytes: usize,
    /// Maximum length of a single text field (default: 1 MiB, hard: 16 MiB)
    pub max_field_len: usize,
    /// Maximum decoded size of a single photo (default: 8 MiB, hard: 64 MiB)
    pub max_photo_bytes: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_record_bytes: 16 * 1024 * 1024,
            max_field_len: 1024 * 1024,
            max_photo_bytes: 8 * 1024 * 1024,
        }
    }
}

impl Limits {
    /// Hard maximum limits that cannot be exceeded
    pub fn hard_maximums() -> Self {
        Self {
            max_record_bytes: 128 * 1024 * 1024,
            max_field_len: 16 * 1024 * 1024,
            max_photo_bytes: 64 * 1024 * 1024,
        }
    }

    /// Validate limits against hard maximums
    pub fn validate(&self) -> Result<()> {
        let hard = Self::hard_maximums();

        let checks = [
            ("max_record_bytes", self.max_record_bytes, hard.max_record_bytes),
            ("max_field_len", self.max_field_len, hard.max_field_len),
            ("max_photo_bytes", self.max_photo_bytes, hard.max_photo_bytes),
        ];

        for (name, value, max) in checks {
            if value == 0 {
                return Err(CbakError::LimitExceeded(format!("{name} must be non-zero")));
            }
            if value > max {
                return Err(CbakError::LimitExceeded(format!(
                    "{name} {value} exceeds hard limit {max}"
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        Limits::default().validate().expect("defaults within hard limits");
        Limits::hard_maximums()
            .validate()
            .expect("hard maximums are themselves valid");
    }

    #[test]
    fn rejects_values_above_hard_maximum() {
        let limits = Limits {
            max_record_bytes: Limits::hard_maximums().max_record_bytes + 1,
            ..Limits::default()
        };
        let err = limits.validate().unwrap_err();
        assert!(err.to_string().contains("max_record_bytes"));
    }

    #[test]
    fn rejects_zero() {
        let limits = Limits {
            max_field_len: 0,
            ..Limits::default()
        };
        assert!(matches!(
            limits.validate(),
            Err(CbakError::LimitExceeded(msg)) if msg.contains("max_field_len")
        ));
    }
}
