//! Native GeoTIFF reader/writer built on the `tiff` crate.
//!
//! Covers the single-band grids this model works with: georeferencing via
//! the ModelPixelScale/ModelTiepoint tags, the no-data sentinel via the
//! GDAL_NODATA ASCII tag, and an opaque SRS string via GeoAsciiParams.
//! Output is always 32-bit float, single band.

use std::fs::File;
use std::path::Path;

use ndarray::Array2;
use tiff::decoder::{Decoder, DecodingResult};
use tiff::encoder::colortype::Gray32Float;
use tiff::encoder::TiffEncoder;
use tiff::tags::Tag;
use tracing::debug;

use crate::error::{Error, Result};
use crate::io::RawRaster;
use crate::raster::{RasterElement, RasterHeader, DEFAULT_NODATA};

const TAG_MODEL_PIXEL_SCALE: u16 = 33550;
const TAG_MODEL_TIEPOINT: u16 = 33922;
const TAG_GEO_KEY_DIRECTORY: u16 = 34735;
const TAG_GEO_ASCII_PARAMS: u16 = 34737;
const TAG_GDAL_NODATA: u16 = 42113;

fn format_err(path: &Path, reason: impl Into<String>) -> Error {
    Error::FormatError {
        path: path.display().to_string(),
        reason: reason.into(),
    }
}

/// Read a GeoTIFF into a raw raster.
///
/// Any integer or float single-band pixel format is cast into `T`; pixels
/// that do not fit become the no-data sentinel. Files without geo tags get
/// a unit geometry anchored at the origin.
pub fn read_geotiff<T: RasterElement, P: AsRef<Path>>(path: P) -> Result<RawRaster<T>> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(Error::SourceUnavailable {
            path: path.display().to_string(),
        });
    }
    let file = File::open(path)?;
    let mut decoder =
        Decoder::new(file).map_err(|e| format_err(path, format!("TIFF decode error: {e}")))?;

    let (width, height) = decoder
        .dimensions()
        .map_err(|e| format_err(path, format!("cannot read dimensions: {e}")))?;
    let rows = height as usize;
    let cols = width as usize;

    let nodata = decoder
        .get_tag_ascii_string(Tag::GdalNodata)
        .ok()
        .and_then(|s| s.trim_end_matches('\0').trim().parse::<f64>().ok())
        .unwrap_or(DEFAULT_NODATA);
    let nodata_t = T::from_f64(nodata);

    let result = decoder
        .read_image()
        .map_err(|e| format_err(path, format!("cannot read image data: {e}")))?;

    macro_rules! cast_pixels {
        ($buf:expr) => {
            $buf.iter()
                .map(|&v| num_traits::cast(v).unwrap_or(nodata_t))
                .collect()
        };
    }
    let data: Vec<T> = match result {
        DecodingResult::U8(buf) => cast_pixels!(buf),
        DecodingResult::U16(buf) => cast_pixels!(buf),
        DecodingResult::U32(buf) => cast_pixels!(buf),
        DecodingResult::I8(buf) => cast_pixels!(buf),
        DecodingResult::I16(buf) => cast_pixels!(buf),
        DecodingResult::I32(buf) => cast_pixels!(buf),
        DecodingResult::F32(buf) => cast_pixels!(buf),
        DecodingResult::F64(buf) => cast_pixels!(buf),
        _ => return Err(format_err(path, "unsupported TIFF pixel format")),
    };
    if data.len() != rows * cols {
        return Err(format_err(
            path,
            format!("expected {} pixels, found {}", rows * cols, data.len()),
        ));
    }

    let (xll, yll, cell_size) = read_geometry(&mut decoder, rows).unwrap_or((0.0, 0.0, 1.0));
    let srs = decoder
        .get_tag_ascii_string(Tag::GeoAsciiParamsTag)
        .map(|s| s.trim_end_matches('\0').to_string())
        .unwrap_or_default();

    debug!(rows, cols, path = %path.display(), "read GeoTIFF");
    let header = RasterHeader::new(rows, cols, xll, yll, cell_size, nodata);
    let data = Array2::from_shape_vec((rows, cols), data)
        .map_err(|e| format_err(path, e.to_string()))?;
    let mut raw = RawRaster::new(header, data)?;
    raw.srs = srs;
    Ok(raw)
}

/// Derive lower-left cell-center geometry from the pixel-scale and tiepoint
/// tags. The tiepoint anchors the upper-left CORNER of pixel (0, 0).
fn read_geometry<R: std::io::Read + std::io::Seek>(
    decoder: &mut Decoder<R>,
    rows: usize,
) -> Option<(f64, f64, f64)> {
    let scale = decoder
        .get_tag_f64_vec(Tag::ModelPixelScaleTag)
        .ok()?;
    let tiepoint = decoder
        .get_tag_f64_vec(Tag::ModelTiepointTag)
        .ok()?;
    if scale.len() < 2 || tiepoint.len() < 6 {
        return None;
    }
    // tiepoint: [I, J, K, X, Y, Z]; scale: [sx, sy, sz]
    let cs = scale[0];
    let x_ul = tiepoint[3] - tiepoint[0] * cs;
    let y_ul = tiepoint[4] + tiepoint[1] * scale[1];
    let xll = x_ul + cs / 2.0;
    let yll = y_ul - rows as f64 * cs + cs / 2.0;
    Some((xll, yll, cs))
}

/// Write a raw raster as a single-band 32-bit float GeoTIFF, overwriting
/// any existing file.
pub fn write_geotiff<T: RasterElement, P: AsRef<Path>>(path: P, raw: &RawRaster<T>) -> Result<()> {
    let path = path.as_ref();
    let write_err = |reason: String| Error::WriteError {
        path: path.display().to_string(),
        reason,
    };

    let file = File::create(path).map_err(|e| write_err(e.to_string()))?;
    let mut encoder = TiffEncoder::new(file).map_err(|e| write_err(e.to_string()))?;

    let h = &raw.header;
    let mut image = encoder
        .new_image::<Gray32Float>(h.cols as u32, h.rows as u32)
        .map_err(|e| write_err(e.to_string()))?;

    // Geo tags anchor the upper-left pixel corner.
    let cs = h.cell_size;
    let x_ul = h.xll - cs / 2.0;
    let y_ul = h.yll + h.rows as f64 * cs - cs / 2.0;
    let scale = [cs, cs, 0.0];
    let tiepoint = [0.0, 0.0, 0.0, x_ul, y_ul, 0.0];
    image
        .encoder()
        .write_tag(Tag::Unknown(TAG_MODEL_PIXEL_SCALE), &scale[..])
        .map_err(|e| write_err(e.to_string()))?;
    image
        .encoder()
        .write_tag(Tag::Unknown(TAG_MODEL_TIEPOINT), &tiepoint[..])
        .map_err(|e| write_err(e.to_string()))?;

    // Minimal GeoKey directory: projected model, pixel-is-area.
    let geokeys: [u16; 12] = [
        1, 1, 0, 2, // version 1.1.0, 2 keys
        1024, 0, 1, 1, // GTModelTypeGeoKey = projected
        1025, 0, 1, 1, // GTRasterTypeGeoKey = pixel is area
    ];
    image
        .encoder()
        .write_tag(Tag::Unknown(TAG_GEO_KEY_DIRECTORY), &geokeys[..])
        .map_err(|e| write_err(e.to_string()))?;

    let nodata = format!("{}", h.nodata);
    image
        .encoder()
        .write_tag(Tag::Unknown(TAG_GDAL_NODATA), nodata.as_str())
        .map_err(|e| write_err(e.to_string()))?;
    if !raw.srs.is_empty() {
        image
            .encoder()
            .write_tag(Tag::Unknown(TAG_GEO_ASCII_PARAMS), raw.srs.as_str())
            .map_err(|e| write_err(e.to_string()))?;
    }

    let data: Vec<f32> = raw
        .data
        .iter()
        .map(|&v| num_traits::cast(v).unwrap_or(f32::NAN))
        .collect();
    image
        .write_data(&data)
        .map_err(|e| write_err(e.to_string()))?;
    debug!(rows = h.rows, cols = h.cols, path = %path.display(), "wrote GeoTIFF");
    Ok(())
}
