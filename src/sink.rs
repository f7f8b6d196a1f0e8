//! Audit artifact sinks
//!
//! The kernel assembler and the sparsification helper dump their intermediate
//! results (`K_MM`, `K_NM_E`, `K_NM_F`, `sparsepoints`) through an
//! [`ArtifactSink`] so that the numerical code has no dependency on the
//! process working directory.

use crate::core::{GapError, KernelConfig, Result, SparsePoints};
use log::debug;
use ndarray::Array2;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

/// Name of the sparse-sparse kernel artifact
pub const SPARSE_KERNEL: &str = "K_MM";
/// Name of the train-sparse energy kernel artifact
pub const ENERGY_KERNEL: &str = "K_NM_E";
/// Name of the train-sparse gradient kernel artifact
pub const GRADIENT_KERNEL: &str = "K_NM_F";
/// Name of the sparse point artifact
pub const SPARSE_POINTS: &str = "sparsepoints";
/// Name of the kernel configuration stored next to the kernels
pub const KERNEL_CONFIG: &str = "kernel";

/// Destination for audit artifacts
pub trait ArtifactSink {
    /// Persist a kernel matrix under `name`
    fn write_matrix(&mut self, name: &str, matrix: &Array2<f64>) -> Result<()>;

    /// Persist the selected sparse points
    fn write_sparse_points(&mut self, points: &SparsePoints) -> Result<()>;
}

/// Discards every artifact
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl ArtifactSink for NullSink {
    fn write_matrix(&mut self, _name: &str, _matrix: &Array2<f64>) -> Result<()> {
        Ok(())
    }

    fn write_sparse_points(&mut self, _points: &SparsePoints) -> Result<()> {
        Ok(())
    }
}

/// Keeps artifacts in memory
#[derive(Debug, Default, Clone)]
pub struct MemorySink {
    pub matrices: BTreeMap<String, Array2<f64>>,
    pub sparse_points: Option<SparsePoints>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn matrix(&self, name: &str) -> Option<&Array2<f64>> {
        self.matrices.get(name)
    }
}

impl ArtifactSink for MemorySink {
    fn write_matrix(&mut self, name: &str, matrix: &Array2<f64>) -> Result<()> {
        self.matrices.insert(name.to_string(), matrix.clone());
        Ok(())
    }

    fn write_sparse_points(&mut self, points: &SparsePoints) -> Result<()> {
        self.sparse_points = Some(points.clone());
        Ok(())
    }
}

/// Writes each artifact as `<root>/<name>.json`
#[derive(Debug, Clone)]
pub struct DirectorySink {
    root: PathBuf,
}

impl DirectorySink {
    /// Create a sink rooted at `root`, creating the directory if needed
    pub fn new<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the artifact called `name`
    pub fn artifact_path(&self, name: &str) -> PathBuf {
        artifact_path(&self.root, name)
    }

    /// Record the kernel the artifacts in this directory were computed with
    pub fn write_kernel_config(&self, config: &KernelConfig) -> Result<()> {
        write_json(self.artifact_path(KERNEL_CONFIG), config)
    }
}

impl ArtifactSink for DirectorySink {
    fn write_matrix(&mut self, name: &str, matrix: &Array2<f64>) -> Result<()> {
        let path = self.artifact_path(name);
        debug!(
            "Writing {} ({}x{}) to {:?}",
            name,
            matrix.nrows(),
            matrix.ncols(),
            path
        );
        write_json(&path, matrix)
    }

    fn write_sparse_points(&mut self, points: &SparsePoints) -> Result<()> {
        write_json(&self.artifact_path(SPARSE_POINTS), points)
    }
}

/// Path of the artifact `name` inside `dir`
pub fn artifact_path(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!("{name}.json"))
}

/// Read a matrix previously written by a [`DirectorySink`]
pub fn read_matrix<P: AsRef<Path>>(dir: P, name: &str) -> Result<Array2<f64>> {
    read_json(artifact_path(dir.as_ref(), name))
}

/// Read the kernel configuration of a kernel directory, if one was recorded
pub fn read_kernel_config<P: AsRef<Path>>(dir: P) -> Result<Option<KernelConfig>> {
    let path = artifact_path(dir.as_ref(), KERNEL_CONFIG);
    if !path.exists() {
        return Ok(None);
    }
    let config: KernelConfig = read_json(path)?;
    config.validate()?;
    Ok(Some(config))
}

/// Serialize `value` as pretty JSON to `path`
pub fn write_json<T: Serialize + ?Sized, P: AsRef<Path>>(path: P, value: &T) -> Result<()> {
    let file = File::create(path).map_err(GapError::IoError)?;
    let writer = BufWriter::new(file);
    serde_json::to_writer_pretty(writer, value)
        .map_err(|e| GapError::SerializationError(e.to_string()))
}

/// Deserialize a JSON file
pub fn read_json<T: DeserializeOwned, P: AsRef<Path>>(path: P) -> Result<T> {
    let file = File::open(path).map_err(GapError::IoError)?;
    let reader = BufReader::new(file);
    serde_json::from_reader(reader).map_err(|e| GapError::SerializationError(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use tempfile::TempDir;

    #[test]
    fn test_memory_sink_keeps_artifacts() {
        let mut sink = MemorySink::new();
        sink.write_matrix(SPARSE_KERNEL, &array![[1.0, 0.5], [0.5, 1.0]])
            .unwrap();
        assert_eq!(sink.matrix(SPARSE_KERNEL).unwrap()[[0, 1]], 0.5);
        assert!(sink.matrix(ENERGY_KERNEL).is_none());
    }

    #[test]
    fn test_directory_sink_round_trip() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let mut sink = DirectorySink::new(dir.path().join("kernels")).unwrap();

        let matrix = array![[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]];
        sink.write_matrix(ENERGY_KERNEL, &matrix).unwrap();
        assert!(sink.artifact_path(ENERGY_KERNEL).exists());
        assert!(sink.artifact_path(ENERGY_KERNEL).ends_with("K_NM_E.json"));

        let loaded = read_matrix(sink.root(), ENERGY_KERNEL).unwrap();
        assert_eq!(loaded, matrix);
    }

    #[test]
    fn test_directory_sink_sparse_points() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let mut sink = DirectorySink::new(dir.path()).unwrap();
        let points = SparsePoints::new(array![[0.1, 0.2]], vec![6]).unwrap();
        sink.write_sparse_points(&points).unwrap();

        let path = dir.path().join("sparsepoints.json");
        let loaded: SparsePoints = read_json(&path).unwrap();
        assert_eq!(loaded, points);
    }

    #[test]
    fn test_kernel_config_recorded_next_to_kernels() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        assert_eq!(read_kernel_config(dir.path()).unwrap(), None);

        let sink = DirectorySink::new(dir.path()).unwrap();
        let config = KernelConfig::with_exponent(3);
        sink.write_kernel_config(&config).unwrap();
        assert!(dir.path().join("kernel.json").exists());
        assert_eq!(read_kernel_config(dir.path()).unwrap(), Some(config));

        sink.write_kernel_config(&KernelConfig::with_exponent(0)).unwrap();
        assert!(read_kernel_config(dir.path()).is_err());
    }

    #[test]
    fn test_read_missing_matrix_is_io_error() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let result = read_matrix(dir.path(), GRADIENT_KERNEL);
        assert!(matches!(result, Err(GapError::IoError(_))));
    }
}
