use std::collections::BTreeMap;

use crate::{error::CineError, time::Time64};

pub const CINE_MAGIC: [u8; 2] = *b"CI";
pub const FILE_HEADER_SIZE: usize = 44;
pub const BITMAP_HEADER_SIZE: usize = 40;

pub(crate) const SETUP_MARK: [u8; 2] = *b"ST";
// Offsets inside the SETUP structure
pub(crate) const SETUP_DESCRIPTION_OFFSET: usize = 19;
pub(crate) const SETUP_DESCRIPTION_LEN: usize = 121;
pub(crate) const SETUP_MARK_OFFSET: usize = 140;
pub(crate) const SETUP_FIRST_IMAGE_OFFSET: usize = 429;
pub(crate) const SETUP_FRAME_RATE_OFFSET: usize = 768;
pub(crate) const SETUP_REAL_BPP_OFFSET: usize = 1024;
pub(crate) const SETUP_LEGACY_LEN: usize = SETUP_MARK_OFFSET;

/// Little endian cursor over a header region.
pub(crate) struct Bytes<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Bytes<'a> {
    pub fn at(data: &'a [u8], pos: usize) -> Self {
        Self { data, pos }
    }

    pub fn take(&mut self, n: usize) -> Result<&'a [u8], CineError> {
        let end = self.pos.checked_add(n).filter(|&end| end <= self.data.len());
        let Some(end) = end else {
            return Err(CineError::invalid(format!(
                "unexpected end of data at byte {} (needed {n} more bytes at {})",
                self.data.len(),
                self.pos
            )));
        };
        let s = &self.data[self.pos..end];
        self.pos = end;
        Ok(s)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], CineError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    pub fn u8(&mut self) -> Result<u8, CineError> {
        Ok(self.take(1)?[0])
    }

    pub fn u16(&mut self) -> Result<u16, CineError> {
        Ok(u16::from_le_bytes(self.array()?))
    }

    pub fn u32(&mut self) -> Result<u32, CineError> {
        Ok(u32::from_le_bytes(self.array()?))
    }

    pub fn i32(&mut self) -> Result<i32, CineError> {
        Ok(i32::from_le_bytes(self.array()?))
    }

    pub fn u64(&mut self) -> Result<u64, CineError> {
        Ok(u64::from_le_bytes(self.array()?))
    }

    pub fn time64(&mut self) -> Result<Time64, CineError> {
        let fractions = self.u32()?;
        let seconds = self.u32()?;
        Ok(Time64 { fractions, seconds })
    }

    /// Zero terminated string stored in a fixed size field.
    pub fn text(&mut self, n: usize) -> Result<String, CineError> {
        let raw = self.take(n)?;
        let end = raw.iter().position(|b| *b == 0).unwrap_or(raw.len());
        Ok(String::from_utf8_lossy(&raw[..end]).into_owned())
    }
}

/// Flattened header value, as surfaced to the artifact header.
#[derive(Debug, Clone, PartialEq)]
pub enum MetaValue {
    Int(i64),
    Float(f64),
    Text(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct CineFileHeader {
    pub header_size: u16,
    pub compression: u16,
    pub version: u16,
    pub first_movie_image: i32,
    pub total_image_count: u32,
    pub first_image_no: i32,
    pub image_count: u32,
    pub off_image_header: u32,
    pub off_setup: u32,
    pub off_image_offsets: u32,
    pub trigger_time: Time64,
}

impl CineFileHeader {
    pub fn parse(data: &[u8]) -> Result<Self, CineError> {
        let mut b = Bytes::at(data, 0);
        if b.take(2)? != &CINE_MAGIC[..] {
            return Err(CineError::invalid("missing 'CI' signature"));
        }

        let header = CineFileHeader {
            header_size: b.u16()?,
            compression: b.u16()?,
            version: b.u16()?,
            first_movie_image: b.i32()?,
            total_image_count: b.u32()?,
            first_image_no: b.i32()?,
            image_count: b.u32()?,
            off_image_header: b.u32()?,
            off_setup: b.u32()?,
            off_image_offsets: b.u32()?,
            trigger_time: b.time64()?,
        };

        if header.header_size as usize != FILE_HEADER_SIZE {
            return Err(CineError::invalid(format!("file header size {}", header.header_size)));
        }
        if header.compression != 0 {
            return Err(CineError::invalid(format!(
                "compressed images are not supported (compression {})",
                header.compression
            )));
        }

        Ok(header)
    }

    /// Image pointers are 64 bit from version 1 on.
    pub fn pointer_size(&self) -> usize {
        if self.version >= 1 {
            8
        } else {
            4
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BitmapInfoHeader {
    pub size: u32,
    pub width: i32,
    pub height: i32,
    pub planes: u16,
    pub bit_count: u16,
    pub compression: u32,
    pub size_image: u32,
    pub x_pels_per_meter: i32,
    pub y_pels_per_meter: i32,
    pub clr_used: u32,
    pub clr_important: u32,
}

impl BitmapInfoHeader {
    pub fn parse(data: &[u8], offset: usize) -> Result<Self, CineError> {
        let mut b = Bytes::at(data, offset);
        let header = BitmapInfoHeader {
            size: b.u32()?,
            width: b.i32()?,
            height: b.i32()?,
            planes: b.u16()?,
            bit_count: b.u16()?,
            compression: b.u32()?,
            size_image: b.u32()?,
            x_pels_per_meter: b.i32()?,
            y_pels_per_meter: b.i32()?,
            clr_used: b.u32()?,
            clr_important: b.u32()?,
        };

        if header.width <= 0 || header.height == 0 {
            return Err(CineError::invalid(format!("image size {}x{}", header.width, header.height)));
        }
        if !matches!(header.bit_count, 8 | 16) {
            return Err(CineError::invalid(format!(
                "only 8 and 16 bit gray images are supported, got {} bits",
                header.bit_count
            )));
        }
        if header.compression != 0 {
            return Err(CineError::invalid(format!("packed bitmap compression {}", header.compression)));
        }

        Ok(header)
    }

    pub fn width(&self) -> usize {
        self.width as usize
    }

    pub fn height(&self) -> usize {
        self.height.unsigned_abs() as usize
    }

    /// Positive heights mean rows are stored bottom-up, as in BMP.
    pub fn bottom_up(&self) -> bool {
        self.height > 0
    }

    pub fn bytes_per_pixel(&self) -> usize {
        self.bit_count as usize / 8
    }

    pub fn frame_bytes(&self) -> usize {
        self.width() * self.height() * self.bytes_per_pixel()
    }
}

/// The leading, version independent part of the SETUP block.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Setup {
    pub frame_rate16: u16,
    pub shutter16: u16,
    pub post_trigger16: u16,
    pub frame_delay16: u16,
    pub aspect_ratio: u16,
    pub trig_frame: u8,
    pub description: String,
    /// Total size of the block, `None` for files written before the 'ST' mark existed.
    pub length: Option<u16>,
    pub first_image: Option<i32>,
    pub image_count: Option<u32>,
    /// Frame rate without the 16 bit limit of `frame_rate16`.
    pub frame_rate: Option<u32>,
    /// Significant bits per pixel. 12 bit sensors are stored in 16 bit pixels.
    pub real_bpp: Option<u32>,
}

impl Setup {
    pub fn parse(data: &[u8], offset: usize) -> Result<Self, CineError> {
        let mut b = Bytes::at(data, offset);
        let frame_rate16 = b.u16()?;
        let shutter16 = b.u16()?;
        let post_trigger16 = b.u16()?;
        let frame_delay16 = b.u16()?;
        let aspect_ratio = b.u16()?;

        let mut b = Bytes::at(data, offset + SETUP_DESCRIPTION_OFFSET - 2);
        let trig_frame = b.u8()?;
        b.u8()?;
        let description = b.text(SETUP_DESCRIPTION_LEN)?;

        let mut setup = Setup {
            frame_rate16,
            shutter16,
            post_trigger16,
            frame_delay16,
            aspect_ratio,
            trig_frame,
            description,
            ..Default::default()
        };

        let mut b = Bytes::at(data, offset + SETUP_MARK_OFFSET);
        if b.take(2).ok() != Some(&SETUP_MARK[..]) {
            log::debug!("Setup block without 'ST' mark, assuming legacy layout");
            return Ok(setup);
        }
        let length = b.u16()?;
        if (length as usize) < SETUP_MARK_OFFSET + 4 {
            return Err(CineError::invalid(format!("setup length {length}")));
        }
        setup.length = Some(length);

        if length as usize >= SETUP_FIRST_IMAGE_OFFSET + 8 {
            let mut b = Bytes::at(data, offset + SETUP_FIRST_IMAGE_OFFSET);
            setup.first_image = Some(b.i32()?);
            setup.image_count = Some(b.u32()?);
        }
        if length as usize >= SETUP_FRAME_RATE_OFFSET + 4 {
            setup.frame_rate = Some(Bytes::at(data, offset + SETUP_FRAME_RATE_OFFSET).u32()?);
        }
        if length as usize >= SETUP_REAL_BPP_OFFSET + 4 {
            setup.real_bpp = Some(Bytes::at(data, offset + SETUP_REAL_BPP_OFFSET).u32()?);
        }

        Ok(setup)
    }

    pub fn byte_len(&self) -> usize {
        self.length.map(|l| l as usize).unwrap_or(SETUP_LEGACY_LEN)
    }

    /// Frames per second, preferring the 32 bit field when it is set.
    pub fn frames_per_second(&self) -> u32 {
        self.frame_rate.filter(|&r| r > 0).unwrap_or(self.frame_rate16 as u32)
    }

    /// Significant bits of pixels stored in `bit_count` bit containers.
    pub fn bit_depth(&self, bit_count: u16) -> u8 {
        match self.real_bpp {
            Some(bpp) if (1..=bit_count as u32).contains(&bpp) => bpp as u8,
            _ => bit_count as u8,
        }
    }
}

pub(crate) fn flatten(
    file: &CineFileHeader,
    bitmap: &BitmapInfoHeader,
    setup: &Setup,
) -> BTreeMap<String, MetaValue> {
    let mut meta = BTreeMap::new();
    let mut int = |key: &str, v: i64| {
        meta.insert(key.to_string(), MetaValue::Int(v));
    };

    int("file.version", file.version as i64);
    int("file.compression", file.compression as i64);
    int("file.first_movie_image", file.first_movie_image as i64);
    int("file.total_image_count", file.total_image_count as i64);
    int("file.first_image_no", file.first_image_no as i64);
    int("file.image_count", file.image_count as i64);
    int("file.trigger_time.seconds", file.trigger_time.seconds as i64);
    int("file.trigger_time.fractions", file.trigger_time.fractions as i64);

    int("bitmap.width", bitmap.width as i64);
    int("bitmap.height", bitmap.height as i64);
    int("bitmap.planes", bitmap.planes as i64);
    int("bitmap.bit_count", bitmap.bit_count as i64);
    int("bitmap.compression", bitmap.compression as i64);
    int("bitmap.size_image", bitmap.size_image as i64);
    int("bitmap.x_pels_per_meter", bitmap.x_pels_per_meter as i64);
    int("bitmap.y_pels_per_meter", bitmap.y_pels_per_meter as i64);
    int("bitmap.clr_used", bitmap.clr_used as i64);
    int("bitmap.clr_important", bitmap.clr_important as i64);

    int("setup.frame_rate16", setup.frame_rate16 as i64);
    int("setup.shutter16", setup.shutter16 as i64);
    int("setup.post_trigger16", setup.post_trigger16 as i64);
    int("setup.frame_delay16", setup.frame_delay16 as i64);
    int("setup.aspect_ratio", setup.aspect_ratio as i64);
    int("setup.trig_frame", setup.trig_frame as i64);
    if let Some(length) = setup.length {
        int("setup.length", length as i64);
    }
    if let Some(first_image) = setup.first_image {
        int("setup.first_image", first_image as i64);
    }
    if let Some(image_count) = setup.image_count {
        int("setup.image_count", image_count as i64);
    }
    if let Some(frame_rate) = setup.frame_rate {
        int("setup.frame_rate", frame_rate as i64);
    }
    if let Some(real_bpp) = setup.real_bpp {
        int("setup.real_bpp", real_bpp as i64);
    }

    meta.insert("setup.description".into(), MetaValue::Text(setup.description.clone()));
    if let Ok(t) = file.trigger_time.to_datetime() {
        meta.insert("file.trigger_time".into(), MetaValue::Text(t.to_rfc3339()));
    }
    meta.insert("bit_depth".into(), MetaValue::Int(setup.bit_depth(bitmap.bit_count) as i64));
    meta.insert("frame_rate".into(), MetaValue::Float(setup.frames_per_second() as f64));

    meta
}
