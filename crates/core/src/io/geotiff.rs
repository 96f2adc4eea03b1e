//! GeoTIFF reading and writing on top of the `tiff` crate.
//!
//! Handles the GeoTIFF georeferencing tags (pixel scale, tiepoint, geokey
//! directory) and the GDAL ascii nodata convention. Values are written as
//! 64-bit float samples; reads accept any integer or float sample format
//! and cast into the requested element type.

use crate::crs::CRS;
use crate::error::{Error, Result};
use crate::raster::{GeoTransform, Raster, RasterElement};
use std::fs::File;
use std::io::Cursor;
use std::path::Path;
use tiff::decoder::{Decoder, DecodingResult};
use tiff::encoder::colortype::Gray64Float;
use tiff::encoder::TiffEncoder;
use tiff::tags::Tag;

const MODEL_PIXEL_SCALE: u16 = 33550;
const MODEL_TIEPOINT: u16 = 33922;
const GEO_KEY_DIRECTORY: u16 = 34735;
const GDAL_NODATA: u16 = 42113;

// GeoKey IDs understood by the reader and writer.
const GT_MODEL_TYPE: u16 = 1024;
const GT_RASTER_TYPE: u16 = 1025;
const GEOGRAPHIC_TYPE: u16 = 2048;
const PROJECTED_CS_TYPE: u16 = 3072;

// Geokey value reserved for "user-defined"; carries no EPSG code.
const USER_DEFINED: u32 = 32767;

fn tiff_error(stage: &str, err: impl std::fmt::Display) -> Error {
    Error::Other(format!("GeoTIFF {}: {}", stage, err))
}

/// Read a GeoTIFF file into a raster of the requested element type.
pub fn read_geotiff<T, P>(path: P) -> Result<Raster<T>>
where
    T: RasterElement,
    P: AsRef<Path>,
{
    let file = File::open(path.as_ref())?;
    decode_geotiff(file)
}

/// Read a GeoTIFF held in memory.
pub fn read_geotiff_from_buffer<T>(data: &[u8]) -> Result<Raster<T>>
where
    T: RasterElement,
{
    decode_geotiff(Cursor::new(data))
}

fn decode_geotiff<T, R>(reader: R) -> Result<Raster<T>>
where
    T: RasterElement,
    R: std::io::Read + std::io::Seek,
{
    let mut decoder = Decoder::new(reader).map_err(|e| tiff_error("open", e))?;

    let (width, height) = decoder
        .dimensions()
        .map_err(|e| tiff_error("dimensions", e))?;
    let (rows, cols) = (height as usize, width as usize);

    let image = decoder
        .read_image()
        .map_err(|e| tiff_error("image data", e))?;

    let data: Vec<T> = match image {
        DecodingResult::U8(buf) => cast_buffer(&buf),
        DecodingResult::U16(buf) => cast_buffer(&buf),
        DecodingResult::U32(buf) => cast_buffer(&buf),
        DecodingResult::U64(buf) => cast_buffer(&buf),
        DecodingResult::I8(buf) => cast_buffer(&buf),
        DecodingResult::I16(buf) => cast_buffer(&buf),
        DecodingResult::I32(buf) => cast_buffer(&buf),
        DecodingResult::I64(buf) => cast_buffer(&buf),
        DecodingResult::F32(buf) => cast_buffer(&buf),
        DecodingResult::F64(buf) => cast_buffer(&buf),
        _ => {
            return Err(Error::UnsupportedDataType(
                "TIFF sample format is not a supported integer or float type".to_string(),
            ))
        }
    };

    if data.len() != rows * cols {
        return Err(Error::InvalidDimensions {
            width: cols,
            height: rows,
        });
    }

    let mut raster = Raster::from_vec(data, rows, cols)?;

    // Georeferencing is optional; a bare TIFF still loads with the
    // identity transform and no CRS.
    if let Some(transform) = read_geotransform(&mut decoder) {
        raster.set_transform(transform);
    }
    raster.set_crs(read_crs(&mut decoder));
    if let Ok(text) = decoder.get_tag_ascii_string(Tag::Unknown(GDAL_NODATA)) {
        if let Ok(value) = text.trim().trim_end_matches('\0').parse::<f64>() {
            raster.set_nodata(T::from_f64(value));
        }
    }

    Ok(raster)
}

fn cast_buffer<T, S>(buf: &[S]) -> Vec<T>
where
    T: RasterElement,
    S: Copy + num_traits::NumCast,
{
    buf.iter()
        .map(|&v| num_traits::cast(v).unwrap_or(T::default_nodata()))
        .collect()
}

fn read_geotransform<R: std::io::Read + std::io::Seek>(
    decoder: &mut Decoder<R>,
) -> Option<GeoTransform> {
    let scale = decoder
        .get_tag_f64_vec(Tag::Unknown(MODEL_PIXEL_SCALE))
        .ok()?;
    let tiepoint = decoder
        .get_tag_f64_vec(Tag::Unknown(MODEL_TIEPOINT))
        .ok()?;
    if scale.len() < 2 || tiepoint.len() < 6 {
        return None;
    }

    // Tiepoint is [I, J, K, X, Y, Z]: raster location (I, J) pinned to map
    // location (X, Y). Scale Y is stored positive; rows run southward.
    let origin_x = tiepoint[3] - tiepoint[0] * scale[0];
    let origin_y = tiepoint[4] + tiepoint[1] * scale[1];
    Some(GeoTransform::new(origin_x, origin_y, scale[0], -scale[1]))
}

/// Pull an EPSG code out of the geokey directory, if one is declared.
fn read_crs<R: std::io::Read + std::io::Seek>(decoder: &mut Decoder<R>) -> Option<CRS> {
    let directory = decoder
        .get_tag_u32_vec(Tag::Unknown(GEO_KEY_DIRECTORY))
        .ok()?;
    // Header is [version, revision, minor, key count], then one
    // [key id, tag location, count, value] entry per key. A zero tag
    // location means the value field holds the code inline.
    if directory.len() < 4 {
        return None;
    }
    let key_count = directory[3] as usize;

    let mut geographic = None;
    let mut projected = None;
    for entry in directory[4..].chunks_exact(4).take(key_count) {
        let (key_id, location, value) = (entry[0], entry[1], entry[3]);
        if location != 0 || value == 0 || value == USER_DEFINED {
            continue;
        }
        match key_id as u16 {
            GEOGRAPHIC_TYPE => geographic = Some(value),
            PROJECTED_CS_TYPE => projected = Some(value),
            _ => {}
        }
    }

    // A projected file also carries its base geographic key; the projected
    // code is the one naming the coordinates actually stored.
    projected.or(geographic).map(CRS::from_epsg)
}

/// Write a raster to a GeoTIFF file with 64-bit float samples.
pub fn write_geotiff<T, P>(raster: &Raster<T>, path: P) -> Result<()>
where
    T: RasterElement,
    P: AsRef<Path>,
{
    let file = File::create(path.as_ref())?;
    encode_geotiff(raster, file)
}

/// Write a raster to an in-memory GeoTIFF.
pub fn write_geotiff_to_buffer<T>(raster: &Raster<T>) -> Result<Vec<u8>>
where
    T: RasterElement,
{
    let mut buf = Vec::new();
    encode_geotiff(raster, Cursor::new(&mut buf))?;
    Ok(buf)
}

fn encode_geotiff<T, W>(raster: &Raster<T>, writer: W) -> Result<()>
where
    T: RasterElement,
    W: std::io::Write + std::io::Seek,
{
    let mut encoder = TiffEncoder::new(writer).map_err(|e| tiff_error("encoder", e))?;

    let (rows, cols) = raster.shape();
    let data: Vec<f64> = raster
        .data()
        .iter()
        .map(|&v| v.to_f64().unwrap_or(f64::NAN))
        .collect();

    let mut image = encoder
        .new_image::<Gray64Float>(cols as u32, rows as u32)
        .map_err(|e| tiff_error("image setup", e))?;

    let gt = raster.transform();
    let scale = [gt.pixel_width, gt.pixel_height.abs(), 0.0];
    image
        .encoder()
        .write_tag(Tag::Unknown(MODEL_PIXEL_SCALE), &scale[..])
        .map_err(|e| tiff_error("pixel scale tag", e))?;

    let tiepoint = [0.0, 0.0, 0.0, gt.origin_x, gt.origin_y, 0.0];
    image
        .encoder()
        .write_tag(Tag::Unknown(MODEL_TIEPOINT), &tiepoint[..])
        .map_err(|e| tiff_error("tiepoint tag", e))?;

    image
        .encoder()
        .write_tag(Tag::Unknown(GEO_KEY_DIRECTORY), geokey_directory(raster.crs()).as_slice())
        .map_err(|e| tiff_error("geokey tag", e))?;

    // GDAL convention: nodata as an ascii tag.
    if let Some(nodata) = raster.nodata().and_then(|v| v.to_f64()) {
        let text = if nodata.is_nan() {
            "nan".to_string()
        } else {
            format!("{}", nodata)
        };
        image
            .encoder()
            .write_tag(Tag::Unknown(GDAL_NODATA), text.as_str())
            .map_err(|e| tiff_error("nodata tag", e))?;
    }

    image
        .write_data(&data)
        .map_err(|e| tiff_error("image data", e))?;

    Ok(())
}

/// Assemble the geokey directory: model type, raster type (PixelIsArea),
/// and the EPSG code when the raster declares one that fits a short.
fn geokey_directory(crs: Option<&CRS>) -> Vec<u16> {
    let epsg = crs
        .and_then(|c| c.epsg())
        .filter(|&code| code > 0 && code <= u16::MAX as u32);
    let geographic = crs.is_some_and(|c| c.is_geographic());
    let model_type: u16 = if geographic { 2 } else { 1 };

    let mut keys = vec![GT_MODEL_TYPE, 0, 1, model_type, GT_RASTER_TYPE, 0, 1, 1];
    if let Some(code) = epsg {
        let key_id = if geographic {
            GEOGRAPHIC_TYPE
        } else {
            PROJECTED_CS_TYPE
        };
        keys.extend_from_slice(&[key_id, 0, 1, code as u16]);
    }

    let key_count = (keys.len() / 4) as u16;
    let mut directory = vec![1, 1, 0, key_count];
    directory.extend_from_slice(&keys);
    directory
}
