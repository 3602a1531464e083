//! Video datasets: schema builders and frame-at-a-time readers and writers.
//!
//! Gray videos are stored as `video(frame, ypx, xpx)` at 8 or 16 bits with a
//! `bit_depth` attribute. Boolean videos are stored bit packed as
//! `video(frame, ypx, xpx_packed)` with an `original_width` attribute. ROI
//! sidecars hold a single `roi(ypx, xpx)` mask.

use std::io::{Read, Write};

use artifacts::{AttrValue, Attrs, CoordValues, DType, DatasetReader, DatasetWriter, Schema, Variable};
use nalgebra::DMatrix;

use crate::{
    error::{check_dims, Result, VisionError},
    packing::{pack_frame, packed_width, unpack_frame},
    GrayFrame, Mask,
};

pub const FRAME: &str = "frame";
pub const YPX: &str = "ypx";
pub const XPX: &str = "xpx";
pub const XPX_PACKED: &str = "xpx_packed";
pub const TIME: &str = "time";
pub const UTC: &str = "utc";
pub const VIDEO: &str = "video";
pub const ROI: &str = "roi";
pub const BIT_DEPTH: &str = "bit_depth";
pub const ORIGINAL_WIDTH: &str = "original_width";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VideoShape {
    pub frames: usize,
    pub height: usize,
    pub width: usize,
}

impl VideoShape {
    pub fn new(frames: usize, height: usize, width: usize) -> Self {
        Self { frames, height, width }
    }

    pub fn frame_dims(&self) -> (usize, usize) {
        (self.height, self.width)
    }

    pub fn frame_len(&self) -> usize {
        self.height * self.width
    }
}

/// Schema of an ingested gray video. `utc_nanos` holds one timestamp per
/// frame; the elapsed `time` coordinate is derived from it.
pub fn gray_schema(shape: VideoShape, bit_depth: u8, utc_nanos: Vec<i64>, header: Attrs) -> Schema {
    let dtype = if bit_depth <= 8 { DType::U8 } else { DType::U16 };
    let elapsed = match utc_nanos.first() {
        Some(&first) => utc_nanos.iter().map(|&t| (t - first) as f64 / 1e9).collect(),
        None => Vec::new(),
    };

    Schema::new()
        .with_dim(FRAME, shape.frames)
        .with_dim(YPX, shape.height)
        .with_dim(XPX, shape.width)
        .with_coord(FRAME, FRAME, CoordValues::range(shape.frames))
        .with_coord(YPX, YPX, CoordValues::range(shape.height))
        .with_coord(XPX, XPX, CoordValues::range(shape.width))
        .with_coord(TIME, FRAME, CoordValues::Float(elapsed))
        .with_coord(UTC, FRAME, CoordValues::UtcNanos(utc_nanos))
        .with_variable(Variable::new(VIDEO, &[FRAME, YPX, XPX], dtype).with_attr(BIT_DEPTH, AttrValue::Int(bit_depth as i64)))
        .with_header(header)
}

/// Schema of a packed boolean video derived from `source`, keeping its frame
/// and row coordinates and its header.
pub fn mask_schema(source: &Schema, shape: VideoShape) -> Schema {
    let mut schema = Schema::new()
        .with_dim(FRAME, shape.frames)
        .with_dim(YPX, shape.height)
        .with_dim(XPX_PACKED, packed_width(shape.width))
        .with_variable(
            Variable::new(VIDEO, &[FRAME, YPX, XPX_PACKED], DType::Bits)
                .with_attr(ORIGINAL_WIDTH, AttrValue::Int(shape.width as i64)),
        )
        .with_header(source.header.clone());

    for (name, coord) in &source.coords {
        if coord.dim == FRAME || coord.dim == YPX {
            schema = schema.with_coord(name, &coord.dim, coord.values.clone());
        }
    }
    schema
}

pub fn roi_schema(source: &Schema, height: usize, width: usize) -> Schema {
    Schema::new()
        .with_dim(YPX, height)
        .with_dim(XPX, width)
        .with_coord(YPX, YPX, CoordValues::range(height))
        .with_coord(XPX, XPX, CoordValues::range(width))
        .with_variable(Variable::new(ROI, &[YPX, XPX], DType::U8))
        .with_header(source.header.clone())
}

fn leading_variable<'a>(schema: &'a Schema, name: &str, dims: &[&str]) -> Result<&'a Variable> {
    let variable = schema.require_variable(name)?;
    if schema.variables.first().map(|v| v.name.as_str()) != Some(name) {
        return Err(VisionError::ShapeMismatch(format!("'{name}' is not the first variable")));
    }
    if variable.dims.iter().map(String::as_str).ne(dims.iter().copied()) {
        return Err(VisionError::ShapeMismatch(format!("'{name}' has dims {:?}", variable.dims)));
    }
    Ok(variable)
}

/// Frame count and size of the video described by `schema`, gray or packed.
pub fn video_shape(schema: &Schema) -> Result<VideoShape> {
    let variable = schema.require_variable(VIDEO)?;
    let frames = schema.require_dim(FRAME)?;
    let height = schema.require_dim(YPX)?;
    let width = match variable.dtype {
        DType::Bits => {
            let width = variable
                .attr_int(ORIGINAL_WIDTH)
                .ok_or_else(|| VisionError::ShapeMismatch("packed video without original width".into()))?
                as usize;
            let stored = schema.require_dim(XPX_PACKED)?;
            if packed_width(width) != stored {
                return Err(VisionError::ShapeMismatch(format!(
                    "packed width {stored} does not hold original width {width}"
                )));
            }
            width
        }
        _ => schema.require_dim(XPX)?,
    };

    Ok(VideoShape { frames, height, width })
}

pub struct GrayVideoReader<R: Read> {
    inner: DatasetReader<R>,
    shape: VideoShape,
    dtype: DType,
    bit_depth: u8,
    next: usize,
}

impl<R: Read> GrayVideoReader<R> {
    pub fn new(input: R) -> Result<Self> {
        let inner = DatasetReader::new(input)?;
        let schema = inner.schema();
        let variable = leading_variable(schema, VIDEO, &[FRAME, YPX, XPX])?;
        let dtype = variable.dtype;
        let bit_depth = match (dtype, variable.attr_int(BIT_DEPTH)) {
            (DType::Bits, _) => return Err(VisionError::ShapeMismatch("expected a gray video".into())),
            (_, Some(depth)) => depth as u8,
            (DType::U8, None) => 8,
            (_, None) => 16,
        };
        let shape = video_shape(schema)?;

        Ok(Self { inner, shape, dtype, bit_depth, next: 0 })
    }

    pub fn schema(&self) -> &Schema {
        self.inner.schema()
    }

    pub fn shape(&self) -> VideoShape {
        self.shape
    }

    pub fn bit_depth(&self) -> u8 {
        self.bit_depth
    }

    pub fn read_frame(&mut self) -> Result<Option<GrayFrame>> {
        if self.next == self.shape.frames {
            return Ok(None);
        }
        let (h, w) = self.shape.frame_dims();
        let frame = match self.dtype {
            DType::U16 => {
                let mut buf = vec![0u16; h * w];
                self.inner.read_u16(&mut buf)?;
                DMatrix::from_row_slice(h, w, &buf)
            }
            _ => {
                let mut buf = vec![0u8; h * w];
                self.inner.read_u8(&mut buf)?;
                DMatrix::from_row_slice(h, w, &buf).map(u16::from)
            }
        };
        self.next += 1;
        Ok(Some(frame))
    }
}

impl<R: Read> Iterator for GrayVideoReader<R> {
    type Item = Result<GrayFrame>;

    fn next(&mut self) -> Option<Self::Item> {
        self.read_frame().transpose()
    }
}

pub struct GrayVideoWriter<W: Write> {
    inner: DatasetWriter<W>,
    shape: VideoShape,
    dtype: DType,
}

impl<W: Write> GrayVideoWriter<W> {
    pub fn new(out: W, schema: &Schema) -> Result<Self> {
        let dtype = leading_variable(schema, VIDEO, &[FRAME, YPX, XPX])?.dtype;
        let shape = video_shape(schema)?;
        Ok(Self { inner: DatasetWriter::new(out, schema)?, shape, dtype })
    }

    pub fn write_frame(&mut self, frame: &GrayFrame) -> Result<()> {
        check_dims("gray frame", self.shape.frame_dims(), frame.shape())?;
        let rows = frame.transpose();
        match self.dtype {
            DType::U16 => self.inner.write_u16(rows.as_slice())?,
            _ => {
                let bytes: Vec<u8> = rows.iter().map(|&v| v.min(u8::MAX as u16) as u8).collect();
                self.inner.write_u8(&bytes)?;
            }
        }
        Ok(())
    }

    pub fn finish(self) -> Result<W> {
        Ok(self.inner.finish()?)
    }
}

pub struct MaskVideoReader<R: Read> {
    inner: DatasetReader<R>,
    shape: VideoShape,
    next: usize,
}

impl<R: Read> MaskVideoReader<R> {
    pub fn new(input: R) -> Result<Self> {
        let inner = DatasetReader::new(input)?;
        let variable = leading_variable(inner.schema(), VIDEO, &[FRAME, YPX, XPX_PACKED])?;
        if variable.dtype != DType::Bits {
            return Err(VisionError::ShapeMismatch("expected a packed boolean video".into()));
        }
        let shape = video_shape(inner.schema())?;

        Ok(Self { inner, shape, next: 0 })
    }

    pub fn schema(&self) -> &Schema {
        self.inner.schema()
    }

    pub fn shape(&self) -> VideoShape {
        self.shape
    }

    pub fn read_frame(&mut self) -> Result<Option<Mask>> {
        if self.next == self.shape.frames {
            return Ok(None);
        }
        let mut packed = vec![0u8; self.shape.height * packed_width(self.shape.width)];
        self.inner.read_u8(&mut packed)?;
        self.next += 1;
        unpack_frame(&packed, self.shape.height, self.shape.width).map(Some)
    }
}

impl<R: Read> Iterator for MaskVideoReader<R> {
    type Item = Result<Mask>;

    fn next(&mut self) -> Option<Self::Item> {
        self.read_frame().transpose()
    }
}

pub struct MaskVideoWriter<W: Write> {
    inner: DatasetWriter<W>,
    shape: VideoShape,
}

impl<W: Write> MaskVideoWriter<W> {
    pub fn new(out: W, schema: &Schema) -> Result<Self> {
        leading_variable(schema, VIDEO, &[FRAME, YPX, XPX_PACKED])?;
        let shape = video_shape(schema)?;
        Ok(Self { inner: DatasetWriter::new(out, schema)?, shape })
    }

    pub fn write_frame(&mut self, mask: &Mask) -> Result<()> {
        check_dims("mask frame", self.shape.frame_dims(), mask.shape())?;
        self.inner.write_u8(&pack_frame(mask))?;
        Ok(())
    }

    pub fn finish(self) -> Result<W> {
        Ok(self.inner.finish()?)
    }
}

pub fn write_roi<W: Write>(out: W, schema: &Schema, roi: &Mask) -> Result<W> {
    leading_variable(schema, ROI, &[YPX, XPX])?;
    check_dims("ROI", (schema.require_dim(YPX)?, schema.require_dim(XPX)?), roi.shape())?;

    let mut writer = DatasetWriter::new(out, schema)?;
    let bytes: Vec<u8> = roi.transpose().iter().map(|&v| v as u8).collect();
    writer.write_u8(&bytes)?;
    Ok(writer.finish()?)
}

pub fn read_roi<R: Read>(input: R) -> Result<(Schema, Mask)> {
    let mut reader = DatasetReader::new(input)?;
    leading_variable(reader.schema(), ROI, &[YPX, XPX])?;
    let height = reader.schema().require_dim(YPX)?;
    let width = reader.schema().require_dim(XPX)?;

    let mut bytes = vec![0u8; height * width];
    reader.read_u8(&mut bytes)?;
    let roi = DMatrix::from_row_slice(height, width, &bytes).map(|v| v != 0);

    Ok((reader.into_schema(), roi))
}
