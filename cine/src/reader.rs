use std::{collections::BTreeMap, fs::File, ops::Range, path::Path};

use chrono::{DateTime, Duration, Utc};
use memmap2::{Mmap, MmapOptions};

use crate::{
    error::CineError,
    header::{self, BitmapInfoHeader, Bytes, CineFileHeader, MetaValue, Setup, FILE_HEADER_SIZE},
    time::Time64,
};

/// Tagged information block holding one TIME64 per image.
pub(crate) const TIME_BLOCK: u16 = 1002;
pub(crate) const TAGGED_BLOCK_HEADER: usize = 8;

enum Data {
    Mapped(Mmap),
    Owned(Vec<u8>),
}

impl std::ops::Deref for Data {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        match self {
            Data::Mapped(m) => m,
            Data::Owned(v) => v,
        }
    }
}

/// An opened CINE recording. Frames are decoded on demand from the mapped file.
pub struct Cine {
    data: Data,
    pub file: CineFileHeader,
    pub bitmap: BitmapInfoHeader,
    pub setup: Setup,
    offsets: Vec<u64>,
    timestamps: Vec<DateTime<Utc>>,
}

impl Cine {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, CineError> {
        let path = path.as_ref();
        let file = File::open(path)?;
        // The mapping is read-only and the file is never written while a stage runs
        let mmap = unsafe { MmapOptions::new().map(&file)? };
        log::debug!("Mapped {} ({} bytes)", path.display(), mmap.len());

        Self::parse(Data::Mapped(mmap))
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, CineError> {
        Self::parse(Data::Owned(bytes))
    }

    fn parse(data: Data) -> Result<Self, CineError> {
        let file = CineFileHeader::parse(&data)?;
        let bitmap = BitmapInfoHeader::parse(&data, (file.off_image_header as usize).max(FILE_HEADER_SIZE))?;
        let setup = Setup::parse(&data, file.off_setup as usize)?;
        let offsets = read_image_offsets(&data, &file);

        let mut cine = Cine {
            data,
            file,
            bitmap,
            setup,
            offsets,
            timestamps: Vec::new(),
        };
        cine.timestamps = cine.read_timestamps()?;

        Ok(cine)
    }

    /// Number of images declared by the header.
    pub fn frame_count(&self) -> usize {
        self.file.image_count as usize
    }

    pub fn width(&self) -> usize {
        self.bitmap.width()
    }

    pub fn height(&self) -> usize {
        self.bitmap.height()
    }

    /// Significant bits per pixel, which may be fewer than the stored bits.
    pub fn bit_depth(&self) -> u8 {
        self.setup.bit_depth(self.bitmap.bit_count)
    }

    /// Checks that every frame in `[start, start + count)` is fully present in the file.
    /// Without `count` the window runs to the last declared image.
    pub fn window(&self, start: usize, count: Option<usize>) -> Result<Range<usize>, CineError> {
        let end = match count {
            Some(count) => start
                .checked_add(count)
                .ok_or_else(|| CineError::invalid(format!("frame window {start}+{count} overflows")))?,
            None => self.frame_count().max(start),
        };

        let mut available = end;
        for i in start..end {
            if self.image_span(i)?.is_none() {
                available = i;
                break;
            }
        }
        if available < end || end > self.frame_count() {
            return Err(CineError::Truncated {
                requested: end,
                available: available.min(self.frame_count()),
            });
        }

        Ok(start..end)
    }

    /// Byte range of the pixel payload of image `index`, `None` if the file
    /// ends before it. Pointers no file could hold are invalid.
    fn image_span(&self, index: usize) -> Result<Option<Range<usize>>, CineError> {
        let Some(&pointer) = self.offsets.get(index) else {
            return Ok(None);
        };
        let frame_bytes = self.bitmap.frame_bytes();
        let overflow = || CineError::invalid(format!("image {index} at offset {pointer} lies beyond any file"));
        let pointer = usize::try_from(pointer).map_err(|_| overflow())?;
        pointer
            .checked_add(frame_bytes)
            .and_then(|end| end.checked_add(8))
            .ok_or_else(overflow)?;

        let Ok(annotation_size) = Bytes::at(&self.data, pointer).u32() else {
            return Ok(None);
        };
        let annotation_size = annotation_size as usize;
        if annotation_size < 8 {
            return Err(CineError::invalid(format!("image {index} has annotation size {annotation_size}")));
        }
        let start = pointer.checked_add(annotation_size).ok_or_else(overflow)?;
        let end = start.checked_add(frame_bytes).ok_or_else(overflow)?;
        let Ok(image_size) = Bytes::at(&self.data, start - 4).u32() else {
            return Ok(None);
        };

        if (image_size as usize) < frame_bytes || end > self.data.len() {
            return Ok(None);
        }
        Ok(Some(start..end))
    }

    /// Decodes one frame into row-major, top-down pixels.
    pub fn read_frame(&self, index: usize) -> Result<Vec<u16>, CineError> {
        let span = self.image_span(index)?.ok_or(CineError::Truncated {
            requested: index + 1,
            available: index,
        })?;
        let raw = &self.data[span];
        let (width, height) = (self.width(), self.height());
        let row_bytes = width * self.bitmap.bytes_per_pixel();

        let mut pixels = Vec::with_capacity(width * height);
        for y in 0..height {
            let src_row = if self.bitmap.bottom_up() { height - 1 - y } else { y };
            let row = &raw[src_row * row_bytes..(src_row + 1) * row_bytes];
            match self.bitmap.bit_count {
                8 => pixels.extend(row.iter().map(|v| *v as u16)),
                _ => pixels.extend(row.chunks_exact(2).map(|c| u16::from_le_bytes([c[0], c[1]]))),
            }
        }

        Ok(pixels)
    }

    pub fn timestamps(&self) -> &[DateTime<Utc>] {
        &self.timestamps
    }

    pub fn metadata(&self) -> BTreeMap<String, MetaValue> {
        header::flatten(&self.file, &self.bitmap, &self.setup)
    }

    fn read_timestamps(&self) -> Result<Vec<DateTime<Utc>>, CineError> {
        if let Some(times) = self.find_time_block()? {
            return times.iter().map(Time64::to_datetime).collect();
        }

        log::debug!("No time block, deriving timestamps from the trigger time and frame rate");
        let trigger = self.file.trigger_time.to_datetime()?;
        let rate = self.setup.frames_per_second() as f64;
        if rate <= 0.0 {
            log::warn!("CINE has neither a time block nor a frame rate, all frames share the trigger time");
            return Ok(vec![trigger; self.frame_count()]);
        }

        Ok((0..self.frame_count())
            .map(|i| {
                let image_no = self.file.first_image_no as f64 + i as f64;
                trigger + Duration::nanoseconds((image_no / rate * 1e9).round() as i64)
            })
            .collect())
    }

    /// Walks the tagged blocks between the setup and the image offsets.
    fn find_time_block(&self) -> Result<Option<Vec<Time64>>, CineError> {
        if self.setup.length.is_none() {
            return Ok(None);
        }
        let mut pos = self.file.off_setup as usize + self.setup.byte_len();
        let end = (self.file.off_image_offsets as usize).min(self.data.len());

        while pos + TAGGED_BLOCK_HEADER <= end {
            let mut b = Bytes::at(&self.data, pos);
            let block_size = b.u32()? as usize;
            let block_type = b.u16()?;
            b.u16()?;
            if block_size < TAGGED_BLOCK_HEADER || pos + block_size > end {
                return Err(CineError::invalid(format!("tagged block at {pos} has size {block_size}")));
            }

            if block_type == TIME_BLOCK {
                let count = (block_size - TAGGED_BLOCK_HEADER) / 8;
                if count < self.frame_count() {
                    return Err(CineError::invalid(format!(
                        "time block holds {count} entries for {} images",
                        self.frame_count()
                    )));
                }
                let times = (0..self.frame_count())
                    .map(|_| b.time64())
                    .collect::<Result<Vec<_>, _>>()?;
                return Ok(Some(times));
            }

            pos += block_size;
        }

        Ok(None)
    }
}

/// Reads as many image pointers as the file actually holds.
fn read_image_offsets(data: &[u8], file: &CineFileHeader) -> Vec<u64> {
    let size = file.pointer_size();
    let mut b = Bytes::at(data, file.off_image_offsets as usize);

    (0..file.image_count)
        .map_while(|_| if size == 8 { b.u64().ok() } else { b.u32().ok().map(|v| v as u64) })
        .collect()
}
