//! Per-run directory layout: `<base>/<id>/log.txt` and `<base>/<id>/models/epoch_<i>`.

use std::fmt::{Display, Formatter};
use std::fs::create_dir_all;
use std::io::ErrorKind;

use chrono::Utc;

use crate::prelude::*;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirectoryOutcome {
    Created,
    AlreadyExists,
    Failed(String),
}

impl DirectoryOutcome {
    /// Creates the directory along with its parents and reports what happened.
    fn create(path: &Path) -> Self {
        if path.is_dir() {
            return Self::AlreadyExists;
        }
        match create_dir_all(path) {
            Ok(()) => Self::Created,
            Err(error) if error.kind() == ErrorKind::AlreadyExists && path.is_dir() => {
                Self::AlreadyExists
            }
            Err(error) => Self::Failed(error.to_string()),
        }
    }

    #[must_use]
    pub const fn is_usable(&self) -> bool {
        !matches!(self, Self::Failed(_))
    }
}

impl Display for DirectoryOutcome {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Created => formatter.write_str("created"),
            Self::AlreadyExists => formatter.write_str("already exists"),
            Self::Failed(reason) => write!(formatter, "failed: {}", reason),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Session {
    pub id: String,
    pub root: PathBuf,
    pub log_path: PathBuf,
    pub models_path: PathBuf,
}

/// Session paths together with the directory creation outcomes.
#[must_use]
#[derive(Debug)]
pub struct SessionCreation {
    pub session: Session,
    pub root: DirectoryOutcome,
    pub models: DirectoryOutcome,
}

impl Session {
    /// Formats the session ID: Unix seconds with microseconds.
    #[must_use]
    pub fn id_at(timestamp: DateTime) -> String {
        format!("{}.{:06}", timestamp.timestamp(), timestamp.timestamp_subsec_micros())
    }

    #[must_use]
    pub fn new(base_path: &Path, id: impl Into<String>) -> Self {
        let id = id.into();
        let root = base_path.join(&id);
        Self {
            log_path: root.join("log.txt"),
            models_path: root.join("models"),
            root,
            id,
        }
    }

    /// Creates the session directories. Failures are reported, not raised.
    #[instrument(level = "debug", skip_all, fields(base_path = %base_path.display(), id = id))]
    pub fn create(base_path: &Path, id: &str) -> SessionCreation {
        let session = Self::new(base_path, id);
        let root = DirectoryOutcome::create(&session.root);
        let models = DirectoryOutcome::create(&session.models_path);
        SessionCreation { session, root, models }
    }

    pub fn create_now(base_path: &Path) -> SessionCreation {
        Self::create(base_path, &Self::id_at(Utc::now()))
    }

    /// Checkpoint path of the zero-based step.
    #[must_use]
    pub fn checkpoint_path(&self, step: usize) -> PathBuf {
        self.models_path.join(format!("epoch_{}", step))
    }
}

impl SessionCreation {
    /// Logs the outcomes and hands out the session.
    pub fn report(self) -> Session {
        for (path, outcome) in [
            (&self.session.root, &self.root),
            (&self.session.models_path, &self.models),
        ] {
            match outcome {
                DirectoryOutcome::Created => info!(path = %path.display(), "directory created"),
                outcome if outcome.is_usable() => info!(path = %path.display(), %outcome),
                outcome => warn!(path = %path.display(), %outcome, "continuing anyway"),
            }
        }
        self.session
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn id_at_ok() {
        let timestamp = Utc.timestamp_opt(1565711234, 123_456_789).unwrap();
        assert_eq!(Session::id_at(timestamp), "1565711234.123456");
    }

    #[test]
    fn create_ok() -> crate::Result {
        let directory = tempfile::tempdir()?;
        let creation = Session::create(&directory.path().join("log"), "1");
        assert_eq!(creation.root, DirectoryOutcome::Created);
        assert_eq!(creation.models, DirectoryOutcome::Created);
        assert!(creation.session.root.is_dir());
        assert!(creation.session.models_path.is_dir());
        assert_eq!(creation.session.log_path, directory.path().join("log/1/log.txt"));
        assert_eq!(
            creation.session.checkpoint_path(3),
            directory.path().join("log/1/models/epoch_3"),
        );
        Ok(())
    }

    #[test]
    fn create_existing_ok() -> crate::Result {
        let directory = tempfile::tempdir()?;
        let _ = Session::create(directory.path(), "1");
        let creation = Session::create(directory.path(), "1");
        assert_eq!(creation.root, DirectoryOutcome::AlreadyExists);
        assert_eq!(creation.models, DirectoryOutcome::AlreadyExists);
        assert!(creation.root.is_usable());
        assert!(creation.session.models_path.is_dir());
        Ok(())
    }

    #[test]
    fn create_failed_ok() -> crate::Result {
        let directory = tempfile::tempdir()?;
        let file_path = directory.path().join("file");
        std::fs::write(&file_path, "")?;
        let creation = Session::create(&file_path, "1");
        assert!(matches!(creation.root, DirectoryOutcome::Failed(_)));
        assert!(!creation.models.is_usable());
        Ok(())
    }
}
