//! JSON persistence of interpolation tables

use std::fs;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use ndarray::Array3;
use serde::{Deserialize, Serialize};

use super::interp::{Axis, InterpolationTable, TableMeta};
use crate::core::error::{NearfieldError, Result};
use crate::core::integration::SingularClass;
use crate::core::io::native::NearfieldConfig;
use crate::core::kernels::KernelKind;

/// Current on-disk format
pub const TABLE_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct TableFile {
    format_version: u32,
    kernel: KernelKind,
    class: SingularClass,
    meta: TableMeta,
    axes: Vec<Axis>,
    /// `data[node][entry] = [finite, log_coefficient]`
    data: Vec<Vec<[f64; 2]>>,
}

/// Conventional file name of a table
///
/// `{kernel}_{class}_{min angle}_{tolerance}_{steps}_{n1}x{n2}[x{n3}].json`
pub fn table_filename(
    kernel: KernelKind,
    class: SingularClass,
    min_angle_deg: f64,
    tolerance: f64,
    eps_steps: usize,
    sizes: &[usize],
) -> String {
    let sizes: Vec<String> = sizes.iter().map(|n| n.to_string()).collect();
    format!(
        "{}_{}_{}_{:e}_{}_{}.json",
        kernel.name(),
        class.name(),
        min_angle_deg,
        tolerance,
        eps_steps,
        sizes.join("x")
    )
}

/// Path of `table` inside `directory`
pub fn table_path(directory: &Path, table: &InterpolationTable) -> PathBuf {
    let meta = table.meta();
    directory.join(table_filename(
        table.kernel(),
        table.class(),
        meta.min_angle_deg,
        meta.tolerance,
        meta.eps_steps,
        &table.shape(),
    ))
}

/// Path of the table `config` would build for `kernel` and `class`
pub fn configured_table_path(
    directory: &Path,
    kernel: KernelKind,
    class: SingularClass,
    config: &NearfieldConfig,
) -> PathBuf {
    directory.join(table_filename(
        kernel,
        class,
        config.geometry.min_angle_deg,
        config.limit.tolerance,
        config.limit.eps_steps,
        &config.table.nodes(class),
    ))
}

/// Write a table as JSON
pub fn save_table<P: AsRef<Path>>(table: &InterpolationTable, path: P) -> Result<()> {
    let values = table.values();
    let data = values
        .outer_iter()
        .map(|node| node.outer_iter().map(|e| [e[0], e[1]]).collect())
        .collect();
    let file = TableFile {
        format_version: TABLE_FORMAT_VERSION,
        kernel: table.kernel(),
        class: table.class(),
        meta: table.meta().clone(),
        axes: table.axes().to_vec(),
        data,
    };

    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let writer = BufWriter::new(fs::File::create(path)?);
    serde_json::to_writer(writer, &file)?;
    log::info!("Saved {} {} table to {}", table.kernel(), table.class(), path.display());
    Ok(())
}

/// Read a table written by [`save_table`], validating its shape
pub fn load_table<P: AsRef<Path>>(path: P) -> Result<InterpolationTable> {
    let path = path.as_ref();
    let reader = BufReader::new(fs::File::open(path)?);
    let file: TableFile = serde_json::from_reader(reader)?;

    if file.format_version != TABLE_FORMAT_VERSION {
        return Err(NearfieldError::invalid(format!(
            "{}: table format {} is not supported (expected {})",
            path.display(),
            file.format_version,
            TABLE_FORMAT_VERSION
        )));
    }
    let grid: usize = file.axes.iter().map(Axis::len).product();
    if file.data.len() != grid {
        return Err(NearfieldError::invalid(format!(
            "{}: {} nodes stored, axes need {}",
            path.display(),
            file.data.len(),
            grid
        )));
    }
    if let Some(bad) = file.data.iter().position(|node| node.len() != 81) {
        return Err(NearfieldError::invalid(format!(
            "{}: node {} has {} entries, expected 81",
            path.display(),
            bad,
            file.data[bad].len()
        )));
    }

    let mut values = Array3::zeros((grid, 81, 2));
    for (node, entries) in file.data.iter().enumerate() {
        for (e, [finite, log_coefficient]) in entries.iter().enumerate() {
            values[[node, e, 0]] = *finite;
            values[[node, e, 1]] = *log_coefficient;
        }
    }
    log::debug!("Loaded {} {} table from {}", file.kernel, file.class, path.display());
    InterpolationTable::new(file.kernel, file.class, file.axes, file.meta, values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::integration::QuadratureSettings;

    fn meta() -> TableMeta {
        TableMeta {
            min_angle_deg: 20.0,
            split_angle_deg: 15.0,
            tolerance: 5e-3,
            eps_start: 0.01,
            eps_steps: 4,
            quadrature: QuadratureSettings::default(),
            diverged_nodes: 0,
            version: String::new(),
        }
    }

    #[test]
    fn test_filename() {
        assert_eq!(
            table_filename(KernelKind::H, SingularClass::Coincident, 20.0, 5e-3, 4, &[8, 8, 5]),
            "H_coincident_20_5e-3_4_8x8x5.json"
        );
        let config = NearfieldConfig::default();
        let path = configured_table_path(
            Path::new("tables"),
            KernelKind::T,
            SingularClass::EdgeAdjacent,
            &config,
        );
        assert_eq!(path, Path::new("tables/T_edge_20_5e-3_4_12x5.json"));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_table(dir.path().join("none.json")).unwrap_err();
        assert!(matches!(err, NearfieldError::Io(_)));
    }

    #[test]
    fn test_truncated_data_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let axes = vec![
            Axis::new("phi", 0.4, 3.0, 3).unwrap(),
            Axis::new("nu", 0.0, 0.5, 2).unwrap(),
        ];
        let file = TableFile {
            format_version: TABLE_FORMAT_VERSION,
            kernel: KernelKind::A,
            class: SingularClass::EdgeAdjacent,
            meta: meta(),
            axes,
            data: vec![vec![[0.0, 0.0]; 81]; 5],
        };
        let path = dir.path().join("bad.json");
        fs::write(&path, serde_json::to_string(&file).unwrap()).unwrap();
        let err = load_table(&path).unwrap_err();
        assert!(err.to_string().contains("5 nodes stored, axes need 6"));
    }
}
