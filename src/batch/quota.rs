use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::config::QuotaConfig;
use crate::util::write_atomically;

/// Lifetime count of batch invocations, kept as one decimal integer.
#[derive(Debug, Clone)]
pub struct InvocationCounter {
    path: PathBuf,
}

impl InvocationCounter {
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
        }
    }

    /// Missing or empty file counts as zero.
    pub fn read(&self) -> Result<u64> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(error) if error.kind() == ErrorKind::NotFound => return Ok(0),
            Err(error) => {
                return Err(error).with_context(|| {
                    format!("failed to read invocation counter {}", self.path.display())
                });
            }
        };

        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Ok(0);
        }

        trimmed.parse::<u64>().with_context(|| {
            format!(
                "invocation counter {} does not hold an integer: {:?}",
                self.path.display(),
                trimmed
            )
        })
    }

    pub fn write(&self, value: u64) -> Result<()> {
        write_atomically(&self.path, format!("{}\n", value).as_bytes())
            .with_context(|| format!("failed to persist invocation counter {}", self.path.display()))
    }

    pub fn increment(&self) -> Result<u64> {
        let next = self.read()?.saturating_add(1);
        self.write(next)?;
        Ok(next)
    }
}

/// Per-invocation row cap and lifetime invocation cap.
#[derive(Debug, Clone, Copy)]
pub struct QuotaGovernor {
    config: QuotaConfig,
}

impl QuotaGovernor {
    pub fn new(config: QuotaConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> QuotaConfig {
        self.config
    }

    pub fn lifetime_exhausted(&self, invocations: u64) -> bool {
        self.config
            .max_invocations
            .is_some_and(|max| invocations >= max)
    }

    /// End (exclusive) of the row window an invocation starting at
    /// `start` may work through.
    pub fn window_end(&self, start: usize, row_count: usize) -> usize {
        match self.config.rows_per_invocation {
            Some(cap) => start.saturating_add(cap).min(row_count),
            None => row_count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_counter_reads_as_zero_and_increments() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state/batch_counter.txt");
        let counter = InvocationCounter::new(&path);

        assert_eq!(counter.read().unwrap(), 0);
        assert_eq!(counter.increment().unwrap(), 1);
        assert_eq!(counter.increment().unwrap(), 2);
        assert_eq!(fs::read_to_string(&path).unwrap(), "2\n");
    }

    #[test]
    fn counter_tolerates_surrounding_whitespace() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("batch_counter.txt");
        fs::write(&path, " 7 \n").unwrap();

        assert_eq!(InvocationCounter::new(&path).read().unwrap(), 7);
    }

    #[test]
    fn garbage_counter_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("batch_counter.txt");
        fs::write(&path, "two").unwrap();

        assert!(InvocationCounter::new(&path).read().is_err());
    }

    #[test]
    fn governor_caps_are_inclusive_and_optional() {
        let governor = QuotaGovernor::new(QuotaConfig {
            rows_per_invocation: Some(50),
            max_invocations: Some(2),
        });
        assert!(!governor.lifetime_exhausted(1));
        assert!(governor.lifetime_exhausted(2));
        assert_eq!(governor.window_end(10, 200), 60);
        assert_eq!(governor.window_end(180, 200), 200);

        let unlimited = QuotaGovernor::new(QuotaConfig::default());
        assert!(!unlimited.lifetime_exhausted(u64::MAX));
        assert_eq!(unlimited.window_end(3, 40), 40);
    }
}
