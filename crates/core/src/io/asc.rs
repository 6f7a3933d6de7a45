//! ESRI ASCII grid reader/writer
//!
//! Header keys are case-insensitive; `XLLCORNER`/`YLLCORNER` variants are
//! accepted and converted to cell-center coordinates on read. Output always
//! uses the center-coordinate keys.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use ndarray::Array2;
use tracing::debug;

use crate::error::{Error, Result};
use crate::io::RawRaster;
use crate::raster::{RasterElement, RasterHeader, DEFAULT_NODATA};

fn format_err(path: &Path, reason: impl Into<String>) -> Error {
    Error::FormatError {
        path: path.display().to_string(),
        reason: reason.into(),
    }
}

/// Read an ESRI ASCII grid into a raw raster.
///
/// Fails with `SourceUnavailable` for a missing file and `FormatError` for
/// malformed headers or a short/overlong data section.
pub fn read_asc<T: RasterElement, P: AsRef<Path>>(path: P) -> Result<RawRaster<T>> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(Error::SourceUnavailable {
            path: path.display().to_string(),
        });
    }
    let text = std::fs::read_to_string(path)?;
    let mut tokens = text.split_whitespace().peekable();

    // Header lines are KEY VALUE pairs; the data section starts at the
    // first token that parses as a number.
    let mut ncols = None;
    let mut nrows = None;
    let mut xll = None;
    let mut yll = None;
    let mut xll_is_corner = false;
    let mut yll_is_corner = false;
    let mut cell_size = None;
    let mut nodata = DEFAULT_NODATA;

    while let Some(tok) = tokens.peek() {
        if tok.parse::<f64>().is_ok() {
            break;
        }
        let key = tokens.next().unwrap_or_default().to_ascii_uppercase();
        let value: f64 = tokens
            .next()
            .ok_or_else(|| format_err(path, format!("header key {key} has no value")))?
            .parse()
            .map_err(|_| format_err(path, format!("non-numeric value for {key}")))?;
        match key.as_str() {
            "NCOLS" => ncols = Some(value as usize),
            "NROWS" => nrows = Some(value as usize),
            "XLLCENTER" => xll = Some(value),
            "YLLCENTER" => yll = Some(value),
            "XLLCORNER" => {
                xll = Some(value);
                xll_is_corner = true;
            }
            "YLLCORNER" => {
                yll = Some(value);
                yll_is_corner = true;
            }
            "CELLSIZE" => cell_size = Some(value),
            "NODATA_VALUE" => nodata = value,
            _ => return Err(format_err(path, format!("unknown header key {key}"))),
        }
    }

    let rows = nrows.ok_or_else(|| format_err(path, "missing NROWS"))?;
    let cols = ncols.ok_or_else(|| format_err(path, "missing NCOLS"))?;
    let cs = cell_size.ok_or_else(|| format_err(path, "missing CELLSIZE"))?;
    if cs <= 0.0 {
        return Err(format_err(path, "CELLSIZE must be positive"));
    }
    let mut xll = xll.ok_or_else(|| format_err(path, "missing XLLCENTER/XLLCORNER"))?;
    let mut yll = yll.ok_or_else(|| format_err(path, "missing YLLCENTER/YLLCORNER"))?;
    if xll_is_corner {
        xll += cs / 2.0;
    }
    if yll_is_corner {
        yll += cs / 2.0;
    }

    let mut data = Vec::with_capacity(rows * cols);
    for tok in tokens {
        let v: f64 = tok
            .parse()
            .map_err(|_| format_err(path, format!("non-numeric cell value '{tok}'")))?;
        data.push(T::from_f64(v));
    }
    if data.len() != rows * cols {
        return Err(format_err(
            path,
            format!("expected {} cells, found {}", rows * cols, data.len()),
        ));
    }

    debug!(rows, cols, path = %path.display(), "read ASCII grid");
    let header = RasterHeader::new(rows, cols, xll, yll, cs, nodata);
    // ASC stores the top row first, matching the row-0-at-top convention.
    let data = Array2::from_shape_vec((rows, cols), data)
        .map_err(|e| format_err(path, e.to_string()))?;
    RawRaster::new(header, data)
}

/// Write a raw raster as an ESRI ASCII grid, overwriting any existing file.
pub fn write_asc<T: RasterElement, P: AsRef<Path>>(path: P, raw: &RawRaster<T>) -> Result<()> {
    let path = path.as_ref();
    let write_err = |e: std::io::Error| Error::WriteError {
        path: path.display().to_string(),
        reason: e.to_string(),
    };

    let file = File::create(path).map_err(write_err)?;
    let mut out = BufWriter::new(file);
    let h = &raw.header;
    writeln!(out, "NCOLS {}", h.cols).map_err(write_err)?;
    writeln!(out, "NROWS {}", h.rows).map_err(write_err)?;
    writeln!(out, "XLLCENTER {}", h.xll).map_err(write_err)?;
    writeln!(out, "YLLCENTER {}", h.yll).map_err(write_err)?;
    writeln!(out, "CELLSIZE {}", h.cell_size).map_err(write_err)?;
    writeln!(out, "NODATA_VALUE {}", h.nodata).map_err(write_err)?;
    for row in raw.data.rows() {
        let mut first = true;
        for v in row {
            if !first {
                write!(out, " ").map_err(write_err)?;
            }
            write!(out, "{}", RasterElement::to_f64(*v)).map_err(write_err)?;
            first = false;
        }
        writeln!(out).map_err(write_err)?;
    }
    out.flush().map_err(write_err)?;
    debug!(rows = h.rows, cols = h.cols, path = %path.display(), "wrote ASCII grid");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use tempfile::tempdir;

    fn sample() -> RawRaster<f64> {
        let header = RasterHeader::new(2, 3, 10.0, 20.0, 5.0, -9999.0);
        let data = Array2::from_shape_vec((2, 3), vec![1.0, -9999.0, 3.5, 4.0, 5.0, 6.25]).unwrap();
        RawRaster::new(header, data).unwrap()
    }

    #[test]
    fn test_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("grid.asc");
        let raw = sample();
        write_asc(&path, &raw).unwrap();
        let back: RawRaster<f64> = read_asc(&path).unwrap();
        assert_eq!(back.header, raw.header);
        assert_eq!(back.data, raw.data);
    }

    #[test]
    fn test_corner_keys_converted_to_center() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("corner.asc");
        std::fs::write(
            &path,
            "ncols 2\nnrows 2\nxllcorner 100\nyllcorner 200\ncellsize 10\nNODATA_value -1\n1 2\n3 4\n",
        )
        .unwrap();
        let raw: RawRaster<f64> = read_asc(&path).unwrap();
        assert_relative_eq!(raw.header.xll, 105.0);
        assert_relative_eq!(raw.header.yll, 205.0);
        assert_eq!(raw.header.nodata, -1.0);
        assert_eq!(raw.data[(0, 1)], 2.0);
    }

    #[test]
    fn test_missing_file() {
        let err = read_asc::<f64, _>("no/such/grid.asc").unwrap_err();
        assert!(matches!(err, Error::SourceUnavailable { .. }));
    }

    #[test]
    fn test_short_data_section() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("short.asc");
        std::fs::write(
            &path,
            "ncols 3\nnrows 2\nxllcenter 0\nyllcenter 0\ncellsize 1\n1 2 3 4\n",
        )
        .unwrap();
        let err = read_asc::<f64, _>(&path).unwrap_err();
        assert!(matches!(err, Error::FormatError { .. }));
    }

    #[test]
    fn test_unknown_header_key() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.asc");
        std::fs::write(&path, "ncols 1\nnrows 1\nwhatever 3\n1\n").unwrap();
        let err = read_asc::<f64, _>(&path).unwrap_err();
        assert!(matches!(err, Error::FormatError { .. }));
    }
}
