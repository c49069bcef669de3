//! Plain-text run log and model checkpoints.

use std::fs::{File, OpenOptions};
use std::io::{BufReader, BufWriter, Write};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::prelude::*;

/// Appends lines to the bound file, opening and closing it on every call.
#[derive(Debug, Clone)]
pub struct RunLogger {
    path: PathBuf,
}

impl RunLogger {
    /// Binds a new logger to the file. The driver binds once per session.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Rebinds the logger, the following lines go to the new file.
    pub fn set_target_file(&mut self, path: impl Into<PathBuf>) {
        self.path = path.into();
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append_line(&self, text: &str) -> Result {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("failed to open `{}`", self.path.display()))?;
        writeln!(file, "{}", text)
            .and_then(|_| file.flush())
            .with_context(|| format!("failed to append to `{}`", self.path.display()))?;
        debug!(path = %self.path.display(), text, "appended");
        Ok(())
    }
}

/// Pickles the model, overwriting the file.
#[instrument(level = "debug", skip_all, fields(path = %path.display()))]
pub fn save_checkpoint<M: Serialize>(model: &M, path: &Path) -> Result {
    let mut writer = BufWriter::new(
        File::create(path).with_context(|| format!("failed to create `{}`", path.display()))?,
    );
    serde_pickle::to_writer(&mut writer, model, Default::default())
        .with_context(|| format!("failed to pickle the model into `{}`", path.display()))?;
    writer
        .flush()
        .with_context(|| format!("failed to flush `{}`", path.display()))?;
    Ok(())
}

#[instrument(level = "debug", skip_all, fields(path = %path.display()))]
pub fn load_checkpoint<M: DeserializeOwned>(path: &Path) -> Result<M> {
    let reader = BufReader::new(
        File::open(path).with_context(|| format!("failed to open `{}`", path.display()))?,
    );
    serde_pickle::from_reader(reader, Default::default())
        .with_context(|| format!("failed to unpickle `{}`", path.display()))
}

#[cfg(test)]
mod tests {
    use std::fs::read_to_string;

    use super::*;
    use crate::dataset::{Features, Interactions};
    use crate::model::{precision_at_k, FactorizationModel, ModelParams};

    #[test]
    fn append_line_ok() -> crate::Result {
        let directory = tempfile::tempdir()?;
        let path = directory.path().join("log.txt");
        std::fs::write(&path, "existing\n")?;

        let logger = RunLogger::new(&path);
        for i in 0..3 {
            logger.append_line(&format!("line {}", i))?;
        }
        assert_eq!(read_to_string(&path)?, "existing\nline 0\nline 1\nline 2\n");

        // Another handle to the same file keeps appending.
        RunLogger::new(&path).append_line("line 3")?;
        assert_eq!(read_to_string(&path)?.lines().count(), 5);
        Ok(())
    }

    #[test]
    fn set_target_file_ok() -> crate::Result {
        let directory = tempfile::tempdir()?;
        let mut logger = RunLogger::new(directory.path().join("first.txt"));
        logger.append_line("first")?;
        logger.set_target_file(directory.path().join("second.txt"));
        logger.append_line("second")?;
        assert_eq!(read_to_string(directory.path().join("first.txt"))?, "first\n");
        assert_eq!(read_to_string(directory.path().join("second.txt"))?, "second\n");
        Ok(())
    }

    #[test]
    fn append_line_missing_directory() {
        let logger = RunLogger::new("/nonexistent/directory/log.txt");
        assert!(logger.append_line("text").is_err());
    }

    #[test]
    fn checkpoint_resumes_identically() -> crate::Result {
        let directory = tempfile::tempdir()?;
        let path = directory.path().join("epoch_0");
        let interactions = Interactions::from_triplets(
            (4, 5),
            [(0, 0, 1.0), (0, 1, 1.0), (1, 1, 1.0), (2, 3, 1.0), (3, 4, 1.0), (3, 3, 1.0)],
        )?;
        let (user_features, item_features) = (Features::identity(4), Features::identity(5));

        let mut original = FactorizationModel::new(ModelParams::default(), 42);
        original.fit_partial(&interactions, &user_features, &item_features, 3)?;
        save_checkpoint(&original, &path)?;
        let mut restored: FactorizationModel = load_checkpoint(&path)?;
        assert_eq!(restored, original);

        original.fit_partial(&interactions, &user_features, &item_features, 2)?;
        restored.fit_partial(&interactions, &user_features, &item_features, 2)?;
        assert_eq!(restored, original);

        let precision = |model: &FactorizationModel| {
            precision_at_k(model, &interactions, None, 2, &user_features, &item_features, 2)
        };
        let (expected, actual) = (precision(&original)?, precision(&restored)?);
        assert_eq!(
            expected.iter().map(|value| value.to_bits()).collect_vec(),
            actual.iter().map(|value| value.to_bits()).collect_vec(),
        );
        Ok(())
    }

    #[test]
    fn save_checkpoint_overwrites() -> crate::Result {
        let directory = tempfile::tempdir()?;
        let path = directory.path().join("epoch_0");
        std::fs::write(&path, vec![0xFF; 4096])?;
        let model = FactorizationModel::new(ModelParams::default(), 1);
        save_checkpoint(&model, &path)?;
        assert_eq!(load_checkpoint::<FactorizationModel>(&path)?, model);
        Ok(())
    }
}
