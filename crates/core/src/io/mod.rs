//! I/O adapters: format readers/writers and pluggable raster stores
//!
//! The core never decodes formats itself; adapters exchange a
//! [`RawRaster`] (header + SRS + dense grid) at the boundary. File formats
//! are dispatched by extension; remote backends plug in through the
//! [`RasterStore`] trait.

mod asc;
mod geotiff;

pub use asc::{read_asc, write_asc};
pub use geotiff::{read_geotiff, write_geotiff};

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use ndarray::Array2;
use tracing::debug;

use crate::error::{Error, Result};
use crate::raster::{Raster, RasterElement, RasterHeader, RasterOptions};

/// Raw exchange form at the adapter boundary: one dense grid plus header.
#[derive(Debug, Clone, PartialEq)]
pub struct RawRaster<T: RasterElement> {
    /// Geometry metadata; `cells` is rows * cols at this stage
    pub header: RasterHeader,
    /// Opaque spatial reference string, may be empty
    pub srs: String,
    /// Full-extent cell values, row 0 at the top
    pub data: Array2<T>,
}

impl<T: RasterElement> RawRaster<T> {
    /// Pair a header with a dense grid; dimensions must agree.
    pub fn new(header: RasterHeader, data: Array2<T>) -> Result<Self> {
        if data.dim() != (header.rows, header.cols) {
            return Err(Error::DimensionMismatch {
                er: header.rows,
                ec: header.cols,
                ar: data.nrows(),
                ac: data.ncols(),
            });
        }
        Ok(Self {
            header,
            srs: String::new(),
            data,
        })
    }
}

/// Supported file formats, recognized by extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RasterFormat {
    /// ESRI ASCII grid (`.asc`)
    Asc,
    /// GeoTIFF (`.tif` / `.tiff`)
    GeoTiff,
}

impl RasterFormat {
    /// Recognize a format from a path's extension.
    pub fn from_path(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        match ext.as_str() {
            "asc" => Ok(RasterFormat::Asc),
            "tif" | "tiff" => Ok(RasterFormat::GeoTiff),
            _ => Err(Error::FormatError {
                path: path.display().to_string(),
                reason: format!("unrecognized raster extension '{ext}'"),
            }),
        }
    }
}

/// Read a raw grid from a file, dispatching on the extension.
pub fn read_raster<T: RasterElement, P: AsRef<Path>>(path: P) -> Result<RawRaster<T>> {
    let path = path.as_ref();
    match RasterFormat::from_path(path)? {
        RasterFormat::Asc => read_asc(path),
        RasterFormat::GeoTiff => read_geotiff(path),
    }
}

/// Write a raw grid to a file, dispatching on the extension. Overwrites an
/// existing target.
pub fn write_raster<T: RasterElement, P: AsRef<Path>>(path: P, raw: &RawRaster<T>) -> Result<()> {
    let path = path.as_ref();
    match RasterFormat::from_path(path)? {
        RasterFormat::Asc => write_asc(path, raw),
        RasterFormat::GeoTiff => write_geotiff(path, raw),
    }
}

/// Pluggable raster source/sink, the boundary for remote or non-file
/// backends. The core depends only on this trait; absence of a concrete
/// backend degrades the surface, not the model.
pub trait RasterStore<T: RasterElement> {
    /// Fetch the raw grid stored under `id`
    fn read(&self, id: &str) -> Result<RawRaster<T>>;

    /// Persist a raw grid under `id`, overwriting any previous entry
    fn write(&mut self, id: &str, raw: &RawRaster<T>) -> Result<()>;
}

/// In-memory [`RasterStore`], the default degraded backend; also the test
/// double for remote stores.
#[derive(Debug, Default)]
pub struct MemoryStore<T: RasterElement> {
    entries: HashMap<String, RawRaster<T>>,
}

impl<T: RasterElement> MemoryStore<T> {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Number of stored rasters
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the store holds nothing
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<T: RasterElement> RasterStore<T> for MemoryStore<T> {
    fn read(&self, id: &str) -> Result<RawRaster<T>> {
        self.entries
            .get(id)
            .cloned()
            .ok_or_else(|| Error::SourceUnavailable {
                path: id.to_string(),
            })
    }

    fn write(&mut self, id: &str, raw: &RawRaster<T>) -> Result<()> {
        self.entries.insert(id.to_string(), raw.clone());
        Ok(())
    }
}

fn core_name_of(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_string()
}

/// Per-layer output path: `<stem>_<lyr>.<ext>` next to the base path.
fn layer_path(path: &Path, lyr: usize) -> PathBuf {
    let stem = core_name_of(path);
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default();
    path.with_file_name(format!("{stem}_{lyr}.{ext}"))
}

impl<T: RasterElement, M: RasterElement> Raster<T, M> {
    /// Read a single-layer raster with default options (positions
    /// compacted, no mask).
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::from_file_with(path, RasterOptions::default())
    }

    /// Read a single-layer raster with explicit options.
    pub fn from_file_with<P: AsRef<Path>>(path: P, opts: RasterOptions) -> Result<Self> {
        let path = path.as_ref();
        let raw = read_raster(path)?;
        let mut raster = Self::from_raw(raw, opts)?;
        raster.core_name = core_name_of(path);
        raster.file_path = Some(path.to_path_buf());
        Ok(raster)
    }

    /// Read a single-layer raster governed by a mask.
    pub fn from_file_masked<P: AsRef<Path>>(
        path: P,
        mask: &Arc<Raster<M, M>>,
        opts: RasterOptions,
    ) -> Result<Self> {
        let path = path.as_ref();
        let raw = read_raster(path)?;
        let mut raster = Self::from_raw_masked(raw, mask, opts)?;
        raster.core_name = core_name_of(path);
        raster.file_path = Some(path.to_path_buf());
        Ok(raster)
    }

    /// Read a multi-layer raster, one source file per layer, sharing one
    /// header and position index.
    pub fn from_files<P: AsRef<Path>>(paths: &[P], opts: RasterOptions) -> Result<Self> {
        let raws = paths
            .iter()
            .map(|p| read_raster(p.as_ref()))
            .collect::<Result<Vec<_>>>()?;
        let mut raster = Self::from_raw_layers(raws, opts)?;
        if let Some(first) = paths.first() {
            raster.core_name = core_name_of(first.as_ref());
            raster.file_path = Some(first.as_ref().to_path_buf());
        }
        Ok(raster)
    }

    /// Read a multi-layer raster governed by a mask.
    pub fn from_files_masked<P: AsRef<Path>>(
        paths: &[P],
        mask: &Arc<Raster<M, M>>,
        opts: RasterOptions,
    ) -> Result<Self> {
        let raws = paths
            .iter()
            .map(|p| read_raster(p.as_ref()))
            .collect::<Result<Vec<_>>>()?;
        let mut raster = Self::from_raw_layers_masked(raws, mask, opts)?;
        if let Some(first) = paths.first() {
            raster.core_name = core_name_of(first.as_ref());
            raster.file_path = Some(first.as_ref().to_path_buf());
        }
        Ok(raster)
    }

    /// Read from a pluggable store.
    pub fn from_store<S: RasterStore<T>>(store: &S, id: &str, opts: RasterOptions) -> Result<Self> {
        let raw = store.read(id)?;
        let mut raster = Self::from_raw(raw, opts)?;
        raster.core_name = id.to_string();
        Ok(raster)
    }

    /// Read from a pluggable store, governed by a mask.
    pub fn from_store_masked<S: RasterStore<T>>(
        store: &S,
        id: &str,
        mask: &Arc<Raster<M, M>>,
        opts: RasterOptions,
    ) -> Result<Self> {
        let raw = store.read(id)?;
        let mut raster = Self::from_raw_masked(raw, mask, opts)?;
        raster.core_name = id.to_string();
        Ok(raster)
    }

    /// The raw, full-extent form of one 1-indexed layer. Compact storage is
    /// expanded back to the grid with no-data holes.
    pub fn to_raw(&self, lyr: usize) -> Result<RawRaster<T>> {
        let mut header = self.header.clone();
        header.layers = 1;
        header.cells = header.extent_cells();
        let mut raw = RawRaster::new(header, self.to_grid(lyr)?)?;
        raw.srs = self.srs.clone();
        Ok(raw)
    }

    /// Write to a file, format chosen by extension. A single layer goes to
    /// `path` itself; a multi-layer stack produces one artifact per layer,
    /// named `<stem>_<lyr>.<ext>`.
    pub fn write_to<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if self.layers() == 1 {
            return write_raster(path, &self.to_raw(1)?);
        }
        for lyr in 1..=self.layers() {
            write_raster(&layer_path(path, lyr), &self.to_raw(lyr)?)?;
        }
        debug!(layers = self.layers(), base = %path.display(), "wrote layer stack");
        Ok(())
    }

    /// Write to a pluggable store, one entry per layer for stacks
    /// (`<id>_<lyr>`).
    pub fn write_to_store<S: RasterStore<T>>(&self, store: &mut S, id: &str) -> Result<()> {
        if self.layers() == 1 {
            return store.write(id, &self.to_raw(1)?);
        }
        for lyr in 1..=self.layers() {
            store.write(&format!("{id}_{lyr}"), &self.to_raw(lyr)?)?;
        }
        Ok(())
    }
}
