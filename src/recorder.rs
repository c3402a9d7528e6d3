use std::fs::{self, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use crate::types::Trial;

#[derive(Debug, Error)]
pub enum RecordError {
    #[error("trial {0} has no samples, statistics or plot to save")]
    Incomplete(String),
    #[error("failed to write {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Where a saved trial ended up.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SavedTrial {
    pub plot_path: PathBuf,
    pub data_file: PathBuf,
}

/// Persists finished trials: one PNG per trial plus an append-only text log.
pub struct TrialRecorder {
    data_file: PathBuf,
    graphs_dir: PathBuf,
}

impl TrialRecorder {
    pub fn new(data_file: impl Into<PathBuf>, graphs_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_file: data_file.into(),
            graphs_dir: graphs_dir.into(),
        }
    }

    pub fn plot_path(&self, trial: &Trial) -> PathBuf {
        self.graphs_dir.join(format!("{}.png", trial.id.header()))
    }

    /// Writes nothing unless the trial has samples, both statistics and a plot.
    pub fn save(&self, trial: &Trial) -> Result<SavedTrial, RecordError> {
        let (Some(rms), Some(am), Some(plot)) = (trial.rms, trial.am, trial.plot.as_ref()) else {
            return Err(RecordError::Incomplete(trial.id.header()));
        };
        if !trial.is_saveable() {
            return Err(RecordError::Incomplete(trial.id.header()));
        }

        fs::create_dir_all(&self.graphs_dir).map_err(|e| io_error(&self.graphs_dir, e))?;
        let plot_path = self.plot_path(trial);
        fs::write(&plot_path, plot).map_err(|e| io_error(&plot_path, e))?;

        let entry = format_entry(trial, rms, am);
        self.append(&entry)
            .map_err(|e| io_error(&self.data_file, e))?;
        log::debug!("Appended {} samples to the log", trial.samples.len());
        Ok(SavedTrial {
            plot_path,
            data_file: self.data_file.clone(),
        })
    }

    fn append(&self, entry: &str) -> io::Result<()> {
        if let Some(parent) = self.data_file.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.data_file)?;
        let mut w = BufWriter::new(file);
        w.write_all(entry.as_bytes())?;
        w.flush()
    }
}

fn io_error(path: &Path, source: io::Error) -> RecordError {
    RecordError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Blank-line separated block: header, data list, RMS, AM.
pub fn format_entry(trial: &Trial, rms: f64, am: f64) -> String {
    format!(
        "\n\n{}\nData: {:?}\nRMS: {:?}\nAM: {:?}\n",
        trial.id.header(),
        trial.samples.values(),
        rms,
        am
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TrialId;
    use tempfile::tempdir;

    fn finished_trial() -> Trial {
        let mut trial = Trial::new(TrialId::new("ana", "2", "grip"));
        trial.samples.push(0, 1.0);
        trial.samples.push(2, 2.5);
        trial.rms = Some(1.9);
        trial.am = Some(1.75);
        trial.plot = Some(b"\x89PNG fake".to_vec());
        trial
    }

    #[test]
    fn entry_layout() {
        let trial = finished_trial();
        assert_eq!(
            format_entry(&trial, 1.9, 1.75),
            "\n\n2-ana-grip\nData: [1.0, 2.5]\nRMS: 1.9\nAM: 1.75\n"
        );
    }

    #[test]
    fn whole_number_statistics_keep_their_decimal_point() {
        let mut trial = Trial::new(TrialId::new("a", "1", "b"));
        trial.samples.push(0, 5.0);
        assert_eq!(
            format_entry(&trial, 5.0, 5.0),
            "\n\n1-a-b\nData: [5.0]\nRMS: 5.0\nAM: 5.0\n"
        );
    }

    #[test]
    fn save_writes_plot_and_appends_log() {
        let dir = tempdir().unwrap();
        let recorder = TrialRecorder::new(dir.path().join("data.txt"), dir.path().join("graphs"));
        let trial = finished_trial();

        let saved = recorder.save(&trial).unwrap();
        assert_eq!(saved.plot_path, dir.path().join("graphs").join("2-ana-grip.png"));
        assert_eq!(fs::read(&saved.plot_path).unwrap(), b"\x89PNG fake");

        recorder.save(&trial).unwrap();
        let log = fs::read_to_string(dir.path().join("data.txt")).unwrap();
        assert_eq!(log.matches("2-ana-grip").count(), 2);
        assert!(log.starts_with("\n\n2-ana-grip\nData: [1.0, 2.5]\n"));
    }

    #[test]
    fn empty_trial_writes_nothing_even_with_statistics() {
        let dir = tempdir().unwrap();
        let recorder = TrialRecorder::new(dir.path().join("data.txt"), dir.path().join("graphs"));
        let mut trial = Trial::new(TrialId::new("ana", "3", "rest"));
        trial.rms = Some(1.0);
        trial.am = Some(1.0);
        trial.plot = Some(vec![0]);

        assert!(matches!(recorder.save(&trial), Err(RecordError::Incomplete(_))));
        assert!(!dir.path().join("data.txt").exists());
        assert!(!dir.path().join("graphs").exists());
    }

    #[test]
    fn missing_statistic_is_incomplete() {
        let dir = tempdir().unwrap();
        let recorder = TrialRecorder::new(dir.path().join("data.txt"), dir.path().join("graphs"));
        let mut trial = finished_trial();
        trial.am = None;
        assert!(matches!(recorder.save(&trial), Err(RecordError::Incomplete(_))));
        assert!(!dir.path().join("data.txt").exists());
    }
}
