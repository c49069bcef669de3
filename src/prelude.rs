pub use std::path::{Path, PathBuf};
pub use std::result::Result as StdResult;
pub use std::time::{Duration as StdDuration, Instant};

pub use anyhow::{anyhow, bail, ensure, Context, Error};
pub use itertools::Itertools;
pub use tracing::{debug, info, instrument, warn};

pub type DateTime = chrono::DateTime<chrono::Utc>;
pub type Result<T = (), E = Error> = StdResult<T, E>;
