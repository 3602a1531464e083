use std::{
    collections::BTreeSet,
    io::{Read, Write},
};

use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::error::ArtifactError;

const TABLE_VERSION: u16 = 1;

/// Column store persisted as a magic tag followed by bincode.
pub trait Table: Serialize + DeserializeOwned {
    const MAGIC: [u8; 4];

    fn write_to(&self, mut out: impl Write) -> Result<(), ArtifactError> {
        out.write_all(&Self::MAGIC)?;
        out.write_all(&TABLE_VERSION.to_le_bytes())?;
        bincode::serialize_into(&mut out, self)?;
        Ok(())
    }

    fn read_from(input: impl Read) -> Result<Self, ArtifactError> {
        read_table(input)
    }
}

/// Long-form contour vertices keyed by `(frame, contour)`, one row per vertex.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContourTable {
    pub frame: Vec<i32>,
    pub contour: Vec<i32>,
    pub ypx: Vec<i32>,
    pub xpx: Vec<i32>,
}

impl Table for ContourTable {
    const MAGIC: [u8; 4] = *b"BCCT";

    fn read_from(input: impl Read) -> Result<Self, ArtifactError> {
        let table: ContourTable = read_table(input)?;
        table.check_columns()?;
        Ok(table)
    }
}

fn read_table<T: Table>(mut input: impl Read) -> Result<T, ArtifactError> {
    let mut head = [0u8; 6];
    input
        .read_exact(&mut head)
        .map_err(|e| ArtifactError::truncated(e, "table header"))?;
    if head[..4] != T::MAGIC || u16::from_le_bytes([head[4], head[5]]) != TABLE_VERSION {
        return Err(ArtifactError::InvalidFormat("unexpected table type or version".into()));
    }
    bincode::deserialize_from(&mut input).map_err(ArtifactError::decode)
}

/// Vertices of one contour, borrowed from the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContourRef<'a> {
    pub frame: i32,
    pub contour: i32,
    pub ypx: &'a [i32],
    pub xpx: &'a [i32],
}

impl ContourRef<'_> {
    pub fn len(&self) -> usize {
        self.ypx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ypx.is_empty()
    }

    pub fn points(&self) -> impl Iterator<Item = (i32, i32)> + '_ {
        self.ypx.iter().copied().zip(self.xpx.iter().copied())
    }
}

impl ContourTable {
    pub fn from_columns(frame: Vec<i32>, contour: Vec<i32>, ypx: Vec<i32>, xpx: Vec<i32>) -> Result<Self, ArtifactError> {
        let table = Self { frame, contour, ypx, xpx };
        table.check_columns()?;
        Ok(table)
    }

    fn check_columns(&self) -> Result<(), ArtifactError> {
        let n = self.frame.len();
        if self.contour.len() != n || self.ypx.len() != n || self.xpx.len() != n {
            return Err(ArtifactError::ShapeMismatch(format!(
                "contour columns have lengths {}, {}, {}, {}",
                n,
                self.contour.len(),
                self.ypx.len(),
                self.xpx.len()
            )));
        }
        Ok(())
    }

    /// Number of vertex rows.
    pub fn len(&self) -> usize {
        self.frame.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frame.is_empty()
    }

    /// Contours in table order, each a run of rows sharing `(frame, contour)`.
    pub fn contours(&self) -> impl Iterator<Item = ContourRef<'_>> + '_ {
        let mut start = 0;
        std::iter::from_fn(move || {
            if start >= self.len() {
                return None;
            }
            let key = (self.frame[start], self.contour[start]);
            let end = (start..self.len())
                .find(|&i| (self.frame[i], self.contour[i]) != key)
                .unwrap_or(self.len());
            let contour = ContourRef {
                frame: key.0,
                contour: key.1,
                ypx: &self.ypx[start..end],
                xpx: &self.xpx[start..end],
            };
            start = end;
            Some(contour)
        })
    }

    pub fn contour_count(&self) -> usize {
        self.contours().count()
    }

    /// Checks vertex bounds and that frame numbers lie in `[0, frames)` in
    /// non-decreasing order with contour numbers `0, 1, 2, ...` inside each frame.
    pub fn validate(&self, frames: usize, height: usize, width: usize) -> Result<(), ArtifactError> {
        self.check_columns()?;

        if let Some(i) = (0..self.len()).find(|&i| {
            let (y, x) = (self.ypx[i], self.xpx[i]);
            y < 0 || x < 0 || y as usize >= height || x as usize >= width
        }) {
            return Err(ArtifactError::ShapeMismatch(format!(
                "vertex ({}, {}) of frame {} lies outside {height}x{width}",
                self.ypx[i], self.xpx[i], self.frame[i]
            )));
        }

        let mut previous: Option<(i32, i32)> = None;
        for c in self.contours() {
            if c.frame < 0 || c.frame as usize >= frames {
                return Err(ArtifactError::ShapeMismatch(format!(
                    "frame {} outside [0, {frames})",
                    c.frame
                )));
            }
            let expected = match previous {
                Some((frame, contour)) if frame == c.frame => contour + 1,
                Some((frame, _)) if frame > c.frame => {
                    return Err(ArtifactError::ShapeMismatch(format!("frame {} after frame {frame}", c.frame)));
                }
                _ => 0,
            };
            if c.contour != expected {
                return Err(ArtifactError::ShapeMismatch(format!(
                    "frame {} has contour {} where {expected} was expected",
                    c.frame, c.contour
                )));
            }
            previous = Some((c.frame, c.contour));
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackRow {
    pub frame: i32,
    pub contour: i32,
    pub y: f64,
    pub x: f64,
    pub area_px: f64,
    pub diameter_px: f64,
    pub track_id: i64,
}

/// Per-frame object observations with their track identity.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrackTable {
    pub frame: Vec<i32>,
    pub contour: Vec<i32>,
    pub y: Vec<f64>,
    pub x: Vec<f64>,
    pub area_px: Vec<f64>,
    pub diameter_px: Vec<f64>,
    pub track_id: Vec<i64>,
}

impl Table for TrackTable {
    const MAGIC: [u8; 4] = *b"BCTR";

    fn read_from(input: impl Read) -> Result<Self, ArtifactError> {
        let table: TrackTable = read_table(input)?;
        table.check_columns()?;
        Ok(table)
    }
}

impl TrackTable {
    pub fn push(&mut self, row: TrackRow) {
        self.frame.push(row.frame);
        self.contour.push(row.contour);
        self.y.push(row.y);
        self.x.push(row.x);
        self.area_px.push(row.area_px);
        self.diameter_px.push(row.diameter_px);
        self.track_id.push(row.track_id);
    }

    fn check_columns(&self) -> Result<(), ArtifactError> {
        let n = self.frame.len();
        let lengths = [
            self.contour.len(),
            self.y.len(),
            self.x.len(),
            self.area_px.len(),
            self.diameter_px.len(),
            self.track_id.len(),
        ];
        if lengths.iter().any(|&len| len != n) {
            return Err(ArtifactError::ShapeMismatch(format!("track columns have lengths {n}, {lengths:?}")));
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.frame.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frame.is_empty()
    }

    pub fn row(&self, i: usize) -> TrackRow {
        TrackRow {
            frame: self.frame[i],
            contour: self.contour[i],
            y: self.y[i],
            x: self.x[i],
            area_px: self.area_px[i],
            diameter_px: self.diameter_px[i],
            track_id: self.track_id[i],
        }
    }

    pub fn rows(&self) -> impl Iterator<Item = TrackRow> + '_ {
        (0..self.len()).map(|i| self.row(i))
    }

    pub fn track_ids(&self) -> BTreeSet<i64> {
        self.track_id.iter().copied().collect()
    }

    /// Rows of one track in frame order.
    pub fn track(&self, id: i64) -> Vec<TrackRow> {
        let mut rows: Vec<TrackRow> = self.rows().filter(|r| r.track_id == id).collect();
        rows.sort_by_key(|r| r.frame);
        rows
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_frames() -> ContourTable {
        // frame 0: one contour of 4 vertices, frame 2: two contours
        ContourTable::from_columns(
            vec![0, 0, 0, 0, 2, 2, 2, 2, 2],
            vec![0, 0, 0, 0, 0, 0, 1, 1, 1],
            vec![6, 9, 9, 6, 1, 2, 5, 5, 6],
            vec![6, 6, 9, 9, 1, 1, 3, 4, 4],
        )
        .unwrap()
    }

    #[test]
    fn groups_rows_into_contours() {
        let table = two_frames();
        let contours: Vec<_> = table.contours().collect();

        assert_eq!(contours.len(), 3);
        assert_eq!((contours[0].frame, contours[0].contour, contours[0].len()), (0, 0, 4));
        assert_eq!((contours[2].frame, contours[2].contour), (2, 1));
        assert_eq!(contours[2].points().collect::<Vec<_>>(), vec![(5, 3), (5, 4), (6, 4)]);
    }

    #[test]
    fn validate_accepts_well_formed_tables() {
        two_frames().validate(3, 16, 16).unwrap();
        ContourTable::default().validate(0, 1, 1).unwrap();
    }

    #[test]
    fn validate_checks_bounds_and_numbering() {
        assert!(two_frames().validate(2, 16, 16).is_err());
        assert!(two_frames().validate(3, 9, 16).is_err());

        let mut gap = two_frames();
        gap.contour[6..].fill(2);
        assert!(matches!(gap.validate(3, 16, 16), Err(ArtifactError::ShapeMismatch(_))));
    }

    #[test]
    fn mismatched_columns_are_rejected() {
        let err = ContourTable::from_columns(vec![0], vec![0, 0], vec![1], vec![1]);
        assert!(matches!(err, Err(ArtifactError::ShapeMismatch(_))));
    }

    #[test]
    fn tables_persist() {
        let mut buf = Vec::new();
        two_frames().write_to(&mut buf).unwrap();
        assert_eq!(ContourTable::read_from(buf.as_slice()).unwrap(), two_frames());

        let mut tracks = TrackTable::default();
        tracks.push(TrackRow { frame: 0, contour: 0, y: 7.5, x: 7.5, area_px: 16.0, diameter_px: 4.51, track_id: 0 });
        let mut buf = Vec::new();
        tracks.write_to(&mut buf).unwrap();
        assert_eq!(TrackTable::read_from(buf.as_slice()).unwrap(), tracks);

        // A contour table is not a track table
        let mut buf = Vec::new();
        two_frames().write_to(&mut buf).unwrap();
        assert!(matches!(TrackTable::read_from(buf.as_slice()), Err(ArtifactError::InvalidFormat(_))));
    }

    #[test]
    fn stored_track_columns_must_line_up() {
        let mut tracks = TrackTable::default();
        tracks.push(TrackRow { frame: 0, contour: 0, y: 1.0, x: 1.0, area_px: 4.0, diameter_px: 2.26, track_id: 0 });
        tracks.push(TrackRow { frame: 1, contour: 0, y: 2.0, x: 1.0, area_px: 4.0, diameter_px: 2.26, track_id: 0 });
        tracks.track_id.pop();

        let mut buf = Vec::new();
        tracks.write_to(&mut buf).unwrap();
        assert!(matches!(TrackTable::read_from(buf.as_slice()), Err(ArtifactError::ShapeMismatch(_))));
    }
}
