use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::config::{StabilityConfig, TRANSIENT_FILE_PREFIX};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileSample {
    pub path: PathBuf,
    pub size: u64,
}

pub trait DirectorySampler {
    /// The completed-file candidate currently visible, if any.
    fn sample(&mut self) -> Option<FileSample>;
}

/// Samples a download directory, ignoring partial and transient files.
pub struct DirectoryProbe {
    dir: PathBuf,
    partial_suffixes: Vec<String>,
}

impl DirectoryProbe {
    pub fn new(dir: &Path, partial_suffixes: &[String]) -> Self {
        Self {
            dir: dir.to_path_buf(),
            partial_suffixes: partial_suffixes.to_vec(),
        }
    }
}

impl DirectorySampler for DirectoryProbe {
    fn sample(&mut self) -> Option<FileSample> {
        let path = completed_files(&self.dir, &self.partial_suffixes)
            .into_iter()
            .next()?;
        // The file may be renamed between listing and stat.
        let size = fs::metadata(&path).ok()?.len();
        Some(FileSample { path, size })
    }
}

/// Regular files directly inside `dir` that are neither partial downloads
/// nor browser scratch files, sorted by path.
pub fn completed_files(dir: &Path, partial_suffixes: &[String]) -> Vec<PathBuf> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(error) => {
            debug!(dir = %dir.display(), error = %error, "download directory not readable");
            return Vec::new();
        }
    };

    let mut files = entries
        .flatten()
        .filter(|entry| entry.file_type().map(|kind| kind.is_file()).unwrap_or(false))
        .filter(|entry| !is_in_progress(&entry.file_name().to_string_lossy(), partial_suffixes))
        .map(|entry| entry.path())
        .collect::<Vec<PathBuf>>();
    files.sort();
    files
}

fn is_in_progress(file_name: &str, partial_suffixes: &[String]) -> bool {
    let lowered = file_name.to_lowercase();
    file_name.starts_with(TRANSIENT_FILE_PREFIX)
        || partial_suffixes
            .iter()
            .any(|suffix| lowered.ends_with(&suffix.to_lowercase()))
}

/// Declares a download complete once the same file keeps the same size for
/// `stable_samples` consecutive samples.
pub struct StabilityDetector {
    config: StabilityConfig,
}

impl StabilityDetector {
    pub fn new(config: StabilityConfig) -> Self {
        Self { config }
    }

    pub fn wait_for_file(&self, dir: &Path) -> Option<PathBuf> {
        let mut probe = DirectoryProbe::new(dir, &self.config.partial_suffixes);
        let found = self.wait_with(&mut probe, thread::sleep);
        match &found {
            Some(path) => info!(path = %path.display(), "download complete"),
            None => warn!(
                dir = %dir.display(),
                timeout_secs = self.config.timeout.as_secs(),
                "timeout waiting for download to finish"
            ),
        }
        found
    }

    pub fn wait_with<S, F>(&self, sampler: &mut S, mut sleep: F) -> Option<PathBuf>
    where
        S: DirectorySampler,
        F: FnMut(Duration),
    {
        let max_samples = self.config.max_samples();
        let required = self.config.stable_samples.max(1);
        let mut tracked: Option<FileSample> = None;
        let mut stable_count = 0u32;

        for sample_index in 0..max_samples {
            match sampler.sample() {
                Some(sample) if tracked.as_ref() == Some(&sample) => {
                    stable_count += 1;
                    if stable_count >= required {
                        return Some(sample.path);
                    }
                }
                Some(sample) => {
                    debug!(path = %sample.path.display(), size = sample.size, "download still changing");
                    tracked = Some(sample);
                    stable_count = 0;
                }
                None => {
                    tracked = None;
                    stable_count = 0;
                }
            }

            if sample_index + 1 < max_samples {
                sleep(self.config.poll_interval);
            }
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use super::*;

    struct Scripted {
        samples: VecDeque<Option<FileSample>>,
        taken: usize,
    }

    impl Scripted {
        fn new(samples: Vec<Option<(&str, u64)>>) -> Self {
            Self {
                samples: samples
                    .into_iter()
                    .map(|sample| {
                        sample.map(|(name, size)| FileSample {
                            path: PathBuf::from(name),
                            size,
                        })
                    })
                    .collect(),
                taken: 0,
            }
        }
    }

    impl DirectorySampler for Scripted {
        fn sample(&mut self) -> Option<FileSample> {
            self.taken += 1;
            self.samples.pop_front().flatten()
        }
    }

    fn detector(timeout_secs: u64, stable_samples: u32) -> StabilityDetector {
        StabilityDetector::new(StabilityConfig {
            timeout: Duration::from_secs(timeout_secs),
            poll_interval: Duration::from_secs(1),
            stable_samples,
            ..StabilityConfig::default()
        })
    }

    #[test]
    fn reports_complete_on_third_unchanged_sample() {
        let mut sampler = Scripted::new(vec![
            Some(("dce.zip", 100)),
            Some(("dce.zip", 200)),
            Some(("dce.zip", 300)),
            Some(("dce.zip", 300)),
            Some(("dce.zip", 300)),
            Some(("dce.zip", 300)),
            Some(("dce.zip", 300)),
        ]);
        let mut slept = Vec::new();

        let found = detector(120, 3).wait_with(&mut sampler, |interval| slept.push(interval));

        assert_eq!(found, Some(PathBuf::from("dce.zip")));
        assert_eq!(sampler.taken, 6);
        assert_eq!(slept.len(), 5);
    }

    #[test]
    fn never_settling_file_times_out() {
        let samples = (0..20).map(|index| Some(("dce.zip", index * 10))).collect();
        let mut sampler = Scripted::new(samples);
        let mut sleeps = 0;

        let found = detector(10, 3).wait_with(&mut sampler, |_| sleeps += 1);

        assert_eq!(found, None);
        assert_eq!(sampler.taken, 10);
        assert_eq!(sleeps, 9);
    }

    #[test]
    fn empty_directory_times_out() {
        let mut sampler = Scripted::new(vec![None; 5]);
        let found = detector(5, 3).wait_with(&mut sampler, |_| {});
        assert_eq!(found, None);
    }

    #[test]
    fn renamed_or_vanished_file_resets_only_the_counter() {
        let mut sampler = Scripted::new(vec![
            Some(("tmp123", 50)),
            Some(("tmp123", 50)),
            None,
            Some(("dce.zip", 50)),
            Some(("dce.zip", 50)),
            Some(("dce.zip", 50)),
            Some(("dce.zip", 50)),
        ]);

        let found = detector(120, 3).wait_with(&mut sampler, |_| {});

        assert_eq!(found, Some(PathBuf::from("dce.zip")));
        assert_eq!(sampler.taken, 7);
    }

    #[test]
    fn single_sample_stability_accepts_first_repeat() {
        let mut sampler = Scripted::new(vec![Some(("avis.pdf", 10)), Some(("avis.pdf", 10))]);
        let found = detector(90, 1).wait_with(&mut sampler, |_| {});
        assert_eq!(found, Some(PathBuf::from("avis.pdf")));
    }

    #[test]
    fn probe_ignores_partial_and_transient_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("dce.zip.crdownload"), b"partial").unwrap();
        fs::write(dir.path().join(".com.google.Chrome.abc123"), b"temp").unwrap();
        fs::write(dir.path().join("upload.PART"), b"partial").unwrap();

        let suffixes = StabilityConfig::default().partial_suffixes;
        let mut probe = DirectoryProbe::new(dir.path(), &suffixes);
        assert_eq!(probe.sample(), None);

        fs::write(dir.path().join("dce.zip"), b"complete").unwrap();
        assert_eq!(
            probe.sample(),
            Some(FileSample {
                path: dir.path().join("dce.zip"),
                size: 8,
            })
        );
    }

    #[test]
    fn wait_for_file_finds_settled_download() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("avis.pdf"), b"%PDF-1.4").unwrap();

        let detector = StabilityDetector::new(StabilityConfig {
            timeout: Duration::from_millis(200),
            poll_interval: Duration::from_millis(5),
            stable_samples: 2,
            ..StabilityConfig::default()
        });

        assert_eq!(
            detector.wait_for_file(dir.path()),
            Some(dir.path().join("avis.pdf"))
        );
    }
}
