use std::{
    fs::File,
    io::{BufWriter, Write},
    path::Path,
};

use chrono::{DateTime, Duration, Utc};

use crate::{
    error::CineError,
    header::{
        BITMAP_HEADER_SIZE, CINE_MAGIC, FILE_HEADER_SIZE, SETUP_DESCRIPTION_LEN, SETUP_DESCRIPTION_OFFSET,
        SETUP_FIRST_IMAGE_OFFSET, SETUP_FRAME_RATE_OFFSET, SETUP_MARK, SETUP_MARK_OFFSET, SETUP_REAL_BPP_OFFSET,
    },
    reader::{TAGGED_BLOCK_HEADER, TIME_BLOCK},
    time::Time64,
};

const SETUP_LENGTH: usize = 1040;
const ANNOTATION_SIZE: u32 = 8;

/// Writes uncompressed gray CINE files (version 1, bottom-up rows, one time block).
#[derive(Debug, Clone)]
pub struct CineWriter {
    width: usize,
    height: usize,
    bit_depth: u8,
    real_bpp: u8,
    frame_rate: u32,
    first_image_no: i32,
    trigger_time: DateTime<Utc>,
    description: String,
}

impl CineWriter {
    pub fn new(width: usize, height: usize, bit_depth: u8) -> Self {
        Self {
            width,
            height,
            bit_depth,
            real_bpp: bit_depth,
            frame_rate: 1000,
            first_image_no: 0,
            trigger_time: DateTime::<Utc>::default(),
            description: String::new(),
        }
    }

    pub fn frame_rate(mut self, frame_rate: u32) -> Self {
        self.frame_rate = frame_rate;
        self
    }

    /// Significant bits of each stored pixel, e.g. 12 for a 12 bit sensor stored in 16 bits.
    pub fn real_bpp(mut self, real_bpp: u8) -> Self {
        self.real_bpp = real_bpp;
        self
    }

    pub fn first_image_no(mut self, first_image_no: i32) -> Self {
        self.first_image_no = first_image_no;
        self
    }

    pub fn trigger_time(mut self, trigger_time: DateTime<Utc>) -> Self {
        self.trigger_time = trigger_time;
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn write_file(&self, path: impl AsRef<Path>, frames: &[Vec<u16>]) -> Result<(), CineError> {
        let mut out = BufWriter::new(File::create(path)?);
        self.write(&mut out, frames)?;
        out.flush()?;
        Ok(())
    }

    pub fn write(&self, out: &mut impl Write, frames: &[Vec<u16>]) -> Result<(), CineError> {
        if !matches!(self.bit_depth, 8 | 16) {
            return Err(CineError::invalid(format!("cannot write {} bit images", self.bit_depth)));
        }
        if self.real_bpp == 0 || self.real_bpp > self.bit_depth {
            return Err(CineError::invalid(format!(
                "{} significant bits do not fit {} bit images",
                self.real_bpp, self.bit_depth
            )));
        }
        let pixels = self.width * self.height;
        if let Some(i) = frames.iter().position(|f| f.len() != pixels) {
            return Err(CineError::invalid(format!(
                "frame {i} has {} pixels, expected {pixels}",
                frames[i].len()
            )));
        }

        let n = frames.len();
        let frame_bytes = pixels * self.bit_depth as usize / 8;
        let off_setup = FILE_HEADER_SIZE + BITMAP_HEADER_SIZE;
        let off_time_block = off_setup + SETUP_LENGTH;
        let time_block_size = TAGGED_BLOCK_HEADER + 8 * n;
        let off_image_offsets = off_time_block + time_block_size;
        let off_images = off_image_offsets + 8 * n;

        let trigger = Time64::from_datetime(&self.trigger_time)?;

        // File header
        out.write_all(&CINE_MAGIC)?;
        out.write_all(&(FILE_HEADER_SIZE as u16).to_le_bytes())?;
        out.write_all(&0u16.to_le_bytes())?; // compression: gray
        out.write_all(&1u16.to_le_bytes())?; // version
        out.write_all(&self.first_image_no.to_le_bytes())?;
        out.write_all(&(n as u32).to_le_bytes())?;
        out.write_all(&self.first_image_no.to_le_bytes())?;
        out.write_all(&(n as u32).to_le_bytes())?;
        out.write_all(&(FILE_HEADER_SIZE as u32).to_le_bytes())?;
        out.write_all(&(off_setup as u32).to_le_bytes())?;
        out.write_all(&(off_image_offsets as u32).to_le_bytes())?;
        write_time(out, &trigger)?;

        // Bitmap info header
        out.write_all(&(BITMAP_HEADER_SIZE as u32).to_le_bytes())?;
        out.write_all(&(self.width as i32).to_le_bytes())?;
        out.write_all(&(self.height as i32).to_le_bytes())?;
        out.write_all(&1u16.to_le_bytes())?;
        out.write_all(&(self.bit_depth as u16).to_le_bytes())?;
        out.write_all(&0u32.to_le_bytes())?;
        out.write_all(&(frame_bytes as u32).to_le_bytes())?;
        out.write_all(&[0u8; 16])?;

        out.write_all(&self.setup_block(n))?;

        // Time block
        out.write_all(&(time_block_size as u32).to_le_bytes())?;
        out.write_all(&TIME_BLOCK.to_le_bytes())?;
        out.write_all(&0u16.to_le_bytes())?;
        for i in 0..n {
            write_time(out, &Time64::from_datetime(&self.frame_time(i))?)?;
        }

        for i in 0..n {
            let pointer = off_images + i * (ANNOTATION_SIZE as usize + frame_bytes);
            out.write_all(&(pointer as u64).to_le_bytes())?;
        }

        let row_len = self.width;
        for frame in frames {
            out.write_all(&ANNOTATION_SIZE.to_le_bytes())?;
            out.write_all(&(frame_bytes as u32).to_le_bytes())?;
            for row in frame.chunks_exact(row_len).rev() {
                match self.bit_depth {
                    8 => out.write_all(&row.iter().map(|v| *v as u8).collect::<Vec<u8>>())?,
                    _ => out.write_all(&row.iter().flat_map(|v| v.to_le_bytes()).collect::<Vec<u8>>())?,
                }
            }
        }

        Ok(())
    }

    fn frame_time(&self, index: usize) -> DateTime<Utc> {
        let image_no = self.first_image_no as i64 + index as i64;
        let nanos = image_no * 1_000_000_000 / self.frame_rate.max(1) as i64;
        self.trigger_time + Duration::nanoseconds(nanos)
    }

    fn setup_block(&self, n: usize) -> Vec<u8> {
        let mut setup = vec![0u8; SETUP_LENGTH];
        let frame_rate16 = u16::try_from(self.frame_rate).unwrap_or(u16::MAX);
        setup[0..2].copy_from_slice(&frame_rate16.to_le_bytes());

        let desc = self.description.as_bytes();
        let len = desc.len().min(SETUP_DESCRIPTION_LEN - 1);
        setup[SETUP_DESCRIPTION_OFFSET..SETUP_DESCRIPTION_OFFSET + len].copy_from_slice(&desc[..len]);

        setup[SETUP_MARK_OFFSET..SETUP_MARK_OFFSET + 2].copy_from_slice(&SETUP_MARK);
        setup[SETUP_MARK_OFFSET + 2..SETUP_MARK_OFFSET + 4].copy_from_slice(&(SETUP_LENGTH as u16).to_le_bytes());
        setup[SETUP_FIRST_IMAGE_OFFSET..SETUP_FIRST_IMAGE_OFFSET + 4].copy_from_slice(&self.first_image_no.to_le_bytes());
        setup[SETUP_FIRST_IMAGE_OFFSET + 4..SETUP_FIRST_IMAGE_OFFSET + 8].copy_from_slice(&(n as u32).to_le_bytes());
        setup[SETUP_FRAME_RATE_OFFSET..SETUP_FRAME_RATE_OFFSET + 4].copy_from_slice(&self.frame_rate.to_le_bytes());
        setup[SETUP_REAL_BPP_OFFSET..SETUP_REAL_BPP_OFFSET + 4].copy_from_slice(&(self.real_bpp as u32).to_le_bytes());

        setup
    }
}

fn write_time(out: &mut impl Write, t: &Time64) -> Result<(), CineError> {
    out.write_all(&t.fractions.to_le_bytes())?;
    out.write_all(&t.seconds.to_le_bytes())?;
    Ok(())
}
