//! Sparse interaction and feature matrices.

use std::fs::File;
use std::io::BufReader;

use serde::{Deserialize, Serialize};

use crate::prelude::*;

/// Compressed sparse row matrix.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct CsrMatrix {
    /// `(n_rows, n_columns)`.
    pub shape: (usize, usize),

    /// Row `i` occupies `indices[indptr[i]..indptr[i + 1]]`.
    pub indptr: Vec<usize>,

    pub indices: Vec<usize>,
    pub data: Vec<f64>,
}

/// User-item interactions, users in rows.
pub type Interactions = CsrMatrix;

/// Feature matrix, entities in rows.
pub type Features = CsrMatrix;

impl CsrMatrix {
    /// Builds a matrix from `(row, column, value)` entries. Duplicate entries are summed.
    pub fn from_triplets(
        shape: (usize, usize),
        triplets: impl IntoIterator<Item = (usize, usize, f64)>,
    ) -> Result<Self> {
        let mut triplets = triplets.into_iter().collect_vec();
        for (row, column, _) in &triplets {
            ensure!(
                *row < shape.0 && *column < shape.1,
                "entry ({}, {}) is out of the {:?} shape",
                row,
                column,
                shape,
            );
        }
        triplets.sort_unstable_by_key(|(row, column, _)| (*row, *column));

        let mut indptr = vec![0; shape.0 + 1];
        let mut indices = Vec::with_capacity(triplets.len());
        let mut data = Vec::with_capacity(triplets.len());
        for ((row, column), group) in &triplets
            .into_iter()
            .group_by(|(row, column, _)| (*row, *column))
        {
            indptr[row + 1] += 1;
            indices.push(column);
            data.push(group.map(|(_, _, value)| value).sum());
        }
        for row in 0..shape.0 {
            indptr[row + 1] += indptr[row];
        }

        Ok(Self { shape, indptr, indices, data })
    }

    /// Square identity matrix: every row gets its own feature.
    #[must_use]
    pub fn identity(n: usize) -> Self {
        Self {
            shape: (n, n),
            indptr: (0..=n).collect(),
            indices: (0..n).collect(),
            data: vec![1.0; n],
        }
    }

    /// Reads a matrix: JSON for `.json` files, pickle otherwise.
    #[instrument(level = "info", skip_all, fields(path = %path.display()))]
    pub fn load(path: &Path) -> Result<Self> {
        let reader = BufReader::new(
            File::open(path).with_context(|| format!("failed to open `{}`", path.display()))?,
        );
        let matrix: Self = match path.extension().and_then(|extension| extension.to_str()) {
            Some("json") => serde_json::from_reader(reader)
                .with_context(|| format!("failed to parse `{}`", path.display()))?,
            _ => serde_pickle::from_reader(reader, Default::default())
                .with_context(|| format!("failed to unpickle `{}`", path.display()))?,
        };
        matrix
            .validate()
            .with_context(|| format!("`{}` is not a valid CSR matrix", path.display()))?;
        info!(
            n_rows = matrix.n_rows(),
            n_columns = matrix.n_columns(),
            nnz = matrix.nnz(),
            "loaded",
        );
        Ok(matrix)
    }

    pub fn validate(&self) -> Result {
        ensure!(
            self.indptr.len() == self.shape.0 + 1,
            "expected {} row pointers, got {}",
            self.shape.0 + 1,
            self.indptr.len(),
        );
        ensure!(self.indptr.first() == Some(&0), "the first row pointer must be zero");
        ensure!(
            self.indptr.iter().tuple_windows().all(|(start, end)| start <= end),
            "row pointers must be non-decreasing",
        );
        ensure!(
            self.indices.len() == self.data.len(),
            "{} indices and {} values",
            self.indices.len(),
            self.data.len(),
        );
        ensure!(
            self.indptr.last() == Some(&self.indices.len()),
            "the last row pointer must be equal to the number of stored entries",
        );
        if let Some(column) = self.indices.iter().find(|column| **column >= self.shape.1) {
            bail!("column {} is out of the {:?} shape", column, self.shape);
        }
        Ok(())
    }

    #[must_use]
    pub const fn n_rows(&self) -> usize {
        self.shape.0
    }

    #[must_use]
    pub const fn n_columns(&self) -> usize {
        self.shape.1
    }

    /// Number of stored entries.
    #[must_use]
    pub fn nnz(&self) -> usize {
        self.data.len()
    }

    /// Stored `(column, value)` pairs of the row.
    pub fn row(&self, row: usize) -> impl Iterator<Item = (usize, f64)> + '_ {
        let range = self.indptr[row]..self.indptr[row + 1];
        self.indices[range.clone()]
            .iter()
            .copied()
            .zip(self.data[range].iter().copied())
    }

    /// Columns of the row with a positive value.
    pub fn positives(&self, row: usize) -> impl Iterator<Item = usize> + '_ {
        self.row(row)
            .filter(|(_, value)| *value > 0.0)
            .map(|(column, _)| column)
    }

    /// All `(row, column, value)` entries in row order.
    pub fn triplets(&self) -> impl Iterator<Item = (usize, usize, f64)> + '_ {
        (0..self.n_rows()).flat_map(move |row| {
            self.row(row)
                .map(move |(column, value)| (row, column, value))
        })
    }

    /// Randomly moves `test_percentage` of the stored entries into the test partition.
    /// Both partitions keep the original shape.
    #[instrument(level = "info", skip(self, rng))]
    pub fn random_train_test_split(
        &self,
        test_percentage: f64,
        rng: &mut fastrand::Rng,
    ) -> Result<(Self, Self)> {
        ensure!(
            (0.0..1.0).contains(&test_percentage),
            "test percentage {} is not within [0, 1)",
            test_percentage,
        );
        let mut triplets = self.triplets().collect_vec();
        rng.shuffle(&mut triplets);
        let n_test = (test_percentage * triplets.len() as f64).round() as usize;
        let train = triplets.split_off(n_test);
        let (train, test) = (
            Self::from_triplets(self.shape, train)?,
            Self::from_triplets(self.shape, triplets)?,
        );
        info!(n_train = train.nnz(), n_test = test.nnz(), "split");
        Ok((train, test))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Result<CsrMatrix> {
        CsrMatrix::from_triplets(
            (3, 4),
            [(2, 1, 1.0), (0, 3, 5.0), (0, 0, 2.0), (2, 1, 1.0), (1, 2, -1.0)],
        )
    }

    #[test]
    fn from_triplets_ok() -> crate::Result {
        let matrix = sample()?;
        matrix.validate()?;
        assert_eq!(matrix.indptr, [0, 2, 3, 4]);
        assert_eq!(matrix.indices, [0, 3, 2, 1]);
        assert_eq!(matrix.data, [2.0, 5.0, -1.0, 2.0]);
        assert_eq!(matrix.positives(0).collect_vec(), [0, 3]);
        assert_eq!(matrix.positives(1).count(), 0);
        Ok(())
    }

    #[test]
    fn from_triplets_out_of_shape() {
        assert!(CsrMatrix::from_triplets((1, 1), [(0, 1, 1.0)]).is_err());
    }

    #[test]
    fn identity_ok() -> crate::Result {
        let identity = CsrMatrix::identity(3);
        identity.validate()?;
        assert_eq!(identity.row(1).collect_vec(), [(1, 1.0)]);
        Ok(())
    }

    #[test]
    fn validate_rejects_broken_pointers() {
        let matrix = CsrMatrix {
            shape: (2, 2),
            indptr: vec![0, 2, 1],
            indices: vec![0],
            data: vec![1.0],
        };
        assert!(matrix.validate().is_err());
    }

    #[test]
    fn random_train_test_split_ok() -> crate::Result {
        let matrix = CsrMatrix::from_triplets(
            (10, 10),
            (0..10).flat_map(|row| (0..10).map(move |column| (row, column, 1.0))),
        )?;
        let (train, test) = matrix.random_train_test_split(0.2, &mut fastrand::Rng::with_seed(42))?;
        assert_eq!(train.shape, matrix.shape);
        assert_eq!(test.shape, matrix.shape);
        assert_eq!(test.nnz(), 20);
        assert_eq!(train.nnz(), 80);

        let mut entries = train
            .triplets()
            .chain(test.triplets())
            .map(|(row, column, _)| (row, column))
            .collect_vec();
        entries.sort_unstable();
        assert_eq!(entries, matrix.triplets().map(|(row, column, _)| (row, column)).collect_vec());
        Ok(())
    }

    #[test]
    fn load_json_ok() -> crate::Result {
        let directory = tempfile::tempdir()?;
        let path = directory.path().join("ratings.json");
        let matrix = sample()?;
        std::fs::write(&path, serde_json::to_vec(&matrix)?)?;
        assert_eq!(CsrMatrix::load(&path)?, matrix);
        Ok(())
    }

    #[test]
    fn load_pickle_ok() -> crate::Result {
        let directory = tempfile::tempdir()?;
        let path = directory.path().join("ratings.csr");
        let matrix = sample()?;
        std::fs::write(&path, serde_pickle::to_vec(&matrix, Default::default())?)?;
        assert_eq!(CsrMatrix::load(&path)?, matrix);
        Ok(())
    }
}
