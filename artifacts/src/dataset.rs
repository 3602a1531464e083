//! Self-describing n-dimensional container.
//!
//! A dataset file is a magic tag, a bincode encoded [`Schema`] and then the raw
//! little endian payload of every variable in declaration order. Payloads are
//! streamed, so a video never has to be resident in memory as a whole.

use std::{
    collections::BTreeMap,
    io::{Read, Write},
};

use serde::{Deserialize, Serialize};

use crate::error::ArtifactError;

const MAGIC: [u8; 4] = *b"BCDS";
const VERSION: u16 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AttrValue {
    Int(i64),
    Float(f64),
    Text(String),
    Bool(bool),
}

impl AttrValue {
    pub fn as_int(&self) -> Option<i64> {
        match self {
            AttrValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            AttrValue::Float(v) => Some(*v),
            AttrValue::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            AttrValue::Text(v) => Some(v),
            _ => None,
        }
    }
}

pub type Attrs = BTreeMap<String, AttrValue>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dim {
    pub name: String,
    pub size: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CoordValues {
    Int(Vec<i64>),
    Float(Vec<f64>),
    /// Nanoseconds since the unix epoch, UTC.
    UtcNanos(Vec<i64>),
}

impl CoordValues {
    pub fn len(&self) -> usize {
        match self {
            CoordValues::Int(v) | CoordValues::UtcNanos(v) => v.len(),
            CoordValues::Float(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn range(n: usize) -> Self {
        CoordValues::Int((0..n as i64).collect())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Coord {
    pub dim: String,
    pub values: CoordValues,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DType {
    U8,
    U16,
    /// Booleans packed eight to a byte along the last axis.
    Bits,
}

impl DType {
    pub fn size(self) -> usize {
        match self {
            DType::U16 => 2,
            DType::U8 | DType::Bits => 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variable {
    pub name: String,
    pub dims: Vec<String>,
    pub dtype: DType,
    pub attrs: Attrs,
}

impl Variable {
    pub fn new(name: &str, dims: &[&str], dtype: DType) -> Self {
        Self {
            name: name.to_string(),
            dims: dims.iter().map(|d| d.to_string()).collect(),
            dtype,
            attrs: Attrs::new(),
        }
    }

    pub fn with_attr(mut self, key: &str, value: AttrValue) -> Self {
        self.attrs.insert(key.to_string(), value);
        self
    }

    pub fn attr_int(&self, key: &str) -> Option<i64> {
        self.attrs.get(key).and_then(AttrValue::as_int)
    }
}

/// Axis names and sizes, coordinate arrays, variable layouts and the flattened
/// recording header. Passed explicitly from stage to stage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    pub dims: Vec<Dim>,
    pub coords: BTreeMap<String, Coord>,
    pub variables: Vec<Variable>,
    pub header: Attrs,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_dim(mut self, name: &str, size: usize) -> Self {
        self.dims.push(Dim { name: name.to_string(), size });
        self
    }

    pub fn with_coord(mut self, name: &str, dim: &str, values: CoordValues) -> Self {
        self.coords.insert(name.to_string(), Coord { dim: dim.to_string(), values });
        self
    }

    pub fn with_variable(mut self, variable: Variable) -> Self {
        self.variables.push(variable);
        self
    }

    pub fn with_header(mut self, header: Attrs) -> Self {
        self.header = header;
        self
    }

    pub fn dim(&self, name: &str) -> Option<usize> {
        self.dims.iter().find(|d| d.name == name).map(|d| d.size)
    }

    pub fn require_dim(&self, name: &str) -> Result<usize, ArtifactError> {
        self.dim(name)
            .ok_or_else(|| ArtifactError::InvalidFormat(format!("dataset has no '{name}' dimension")))
    }

    pub fn variable(&self, name: &str) -> Option<&Variable> {
        self.variables.iter().find(|v| v.name == name)
    }

    pub fn require_variable(&self, name: &str) -> Result<&Variable, ArtifactError> {
        self.variable(name)
            .ok_or_else(|| ArtifactError::InvalidFormat(format!("dataset has no '{name}' variable")))
    }

    pub fn coord(&self, name: &str) -> Option<&CoordValues> {
        self.coords.get(name).map(|c| &c.values)
    }

    pub fn shape(&self, variable: &Variable) -> Result<Vec<usize>, ArtifactError> {
        variable.dims.iter().map(|d| self.require_dim(d)).collect()
    }

    fn element_count(&self, variable: &Variable) -> Result<usize, ArtifactError> {
        self.shape(variable)?
            .iter()
            .try_fold(1usize, |n, &size| n.checked_mul(size))
            .ok_or_else(|| {
                ArtifactError::InvalidFormat(format!("variable '{}' has more elements than fit in memory", variable.name))
            })
    }

    pub fn validate(&self) -> Result<(), ArtifactError> {
        for (i, dim) in self.dims.iter().enumerate() {
            if self.dims[..i].iter().any(|d| d.name == dim.name) {
                return Err(ArtifactError::InvalidFormat(format!("duplicate dimension '{}'", dim.name)));
            }
        }
        for (name, coord) in &self.coords {
            let size = self.require_dim(&coord.dim)?;
            if coord.values.len() != size {
                return Err(ArtifactError::ShapeMismatch(format!(
                    "coordinate '{name}' has {} values but dimension '{}' has size {size}",
                    coord.values.len(),
                    coord.dim
                )));
            }
        }
        for variable in &self.variables {
            self.element_count(variable)?;
        }
        Ok(())
    }
}

fn sizes(schema: &Schema) -> Result<Vec<(usize, DType)>, ArtifactError> {
    schema
        .variables
        .iter()
        .map(|v| Ok((schema.element_count(v)?, v.dtype)))
        .collect()
}

/// Tracks which variable the next chunk of payload belongs to.
struct Cursor {
    sizes: Vec<(usize, DType)>,
    var: usize,
    done: usize,
}

impl Cursor {
    fn new(sizes: Vec<(usize, DType)>) -> Self {
        let mut cursor = Self { sizes, var: 0, done: 0 };
        cursor.skip_complete();
        cursor
    }

    fn skip_complete(&mut self) {
        while self.var < self.sizes.len() && self.done == self.sizes[self.var].0 {
            self.var += 1;
            self.done = 0;
        }
    }

    fn claim(&mut self, n: usize, wide: bool) -> Result<(), ArtifactError> {
        let Some(&(size, dtype)) = self.sizes.get(self.var) else {
            return Err(ArtifactError::ShapeMismatch(format!("{n} elements beyond the declared variables")));
        };
        if (dtype == DType::U16) != wide {
            return Err(ArtifactError::ShapeMismatch(format!("variable {} is stored as {dtype:?}", self.var)));
        }
        if self.done + n > size {
            return Err(ArtifactError::ShapeMismatch(format!(
                "variable {} holds {size} elements, {} requested",
                self.var,
                self.done + n
            )));
        }
        self.done += n;
        self.skip_complete();
        Ok(())
    }

    fn finished(&self) -> bool {
        self.var == self.sizes.len()
    }
}

pub struct DatasetWriter<W: Write> {
    out: W,
    cursor: Cursor,
}

impl<W: Write> DatasetWriter<W> {
    pub fn new(mut out: W, schema: &Schema) -> Result<Self, ArtifactError> {
        schema.validate()?;
        out.write_all(&MAGIC)?;
        out.write_all(&VERSION.to_le_bytes())?;
        bincode::serialize_into(&mut out, schema)?;

        Ok(Self { out, cursor: Cursor::new(sizes(schema)?) })
    }

    /// Appends bytes to the current `U8` or `Bits` variable.
    pub fn write_u8(&mut self, data: &[u8]) -> Result<(), ArtifactError> {
        self.cursor.claim(data.len(), false)?;
        self.out.write_all(data)?;
        Ok(())
    }

    pub fn write_u16(&mut self, data: &[u16]) -> Result<(), ArtifactError> {
        self.cursor.claim(data.len(), true)?;
        let bytes: Vec<u8> = data.iter().flat_map(|v| v.to_le_bytes()).collect();
        self.out.write_all(&bytes)?;
        Ok(())
    }

    /// Fails unless every declared variable has been written completely.
    pub fn finish(self) -> Result<W, ArtifactError> {
        if !self.cursor.finished() {
            return Err(ArtifactError::ShapeMismatch(format!(
                "payload incomplete: variable {} has {} elements written",
                self.cursor.var, self.cursor.done
            )));
        }
        Ok(self.out)
    }
}

pub struct DatasetReader<R: Read> {
    input: R,
    schema: Schema,
    cursor: Cursor,
}

impl<R: Read> DatasetReader<R> {
    pub fn new(mut input: R) -> Result<Self, ArtifactError> {
        let mut head = [0u8; 6];
        input
            .read_exact(&mut head)
            .map_err(|e| ArtifactError::truncated(e, "dataset header"))?;
        if head[..4] != MAGIC {
            return Err(ArtifactError::InvalidFormat("not a dataset file".into()));
        }
        let version = u16::from_le_bytes([head[4], head[5]]);
        if version != VERSION {
            return Err(ArtifactError::InvalidFormat(format!("unsupported dataset version {version}")));
        }

        let schema: Schema = bincode::deserialize_from(&mut input).map_err(ArtifactError::decode)?;
        schema.validate()?;
        let cursor = Cursor::new(sizes(&schema)?);

        Ok(Self { input, schema, cursor })
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn into_schema(self) -> Schema {
        self.schema
    }

    pub fn read_u8(&mut self, buf: &mut [u8]) -> Result<(), ArtifactError> {
        self.cursor.claim(buf.len(), false)?;
        self.input
            .read_exact(buf)
            .map_err(|e| ArtifactError::truncated(e, "dataset payload"))
    }

    pub fn read_u16(&mut self, buf: &mut [u16]) -> Result<(), ArtifactError> {
        self.cursor.claim(buf.len(), true)?;
        let mut bytes = vec![0u8; buf.len() * 2];
        self.input
            .read_exact(&mut bytes)
            .map_err(|e| ArtifactError::truncated(e, "dataset payload"))?;
        for (v, b) in buf.iter_mut().zip(bytes.chunks_exact(2)) {
            *v = u16::from_le_bytes([b[0], b[1]]);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> Schema {
        Schema::new()
            .with_dim("frame", 2)
            .with_dim("ypx", 2)
            .with_dim("xpx", 3)
            .with_coord("frame", "frame", CoordValues::range(2))
            .with_coord("time", "frame", CoordValues::Float(vec![0.0, 0.5]))
            .with_variable(Variable::new("video", &["frame", "ypx", "xpx"], DType::U16).with_attr("bit_depth", AttrValue::Int(12)))
            .with_header(Attrs::from([("camera".to_string(), AttrValue::Text("v2512".into()))]))
    }

    #[test]
    fn streams_frames_through() {
        let mut w = DatasetWriter::new(Vec::new(), &schema()).unwrap();
        w.write_u16(&[1, 2, 3, 4, 5, 6]).unwrap();
        w.write_u16(&[7, 8, 9, 10, 11, 4095]).unwrap();
        let bytes = w.finish().unwrap();

        let mut r = DatasetReader::new(bytes.as_slice()).unwrap();
        assert_eq!(r.schema(), &schema());
        assert_eq!(r.schema().variable("video").unwrap().attr_int("bit_depth"), Some(12));

        let mut frame = [0u16; 6];
        r.read_u16(&mut frame).unwrap();
        assert_eq!(frame, [1, 2, 3, 4, 5, 6]);
        r.read_u16(&mut frame).unwrap();
        assert_eq!(frame, [7, 8, 9, 10, 11, 4095]);
    }

    #[test]
    fn incomplete_payload_is_rejected() {
        let mut w = DatasetWriter::new(Vec::new(), &schema()).unwrap();
        w.write_u16(&[1, 2, 3, 4, 5, 6]).unwrap();
        assert!(matches!(w.finish(), Err(ArtifactError::ShapeMismatch(_))));
    }

    #[test]
    fn overlong_or_mistyped_writes_are_rejected() {
        let mut w = DatasetWriter::new(Vec::new(), &schema()).unwrap();
        assert!(matches!(w.write_u8(&[0; 6]), Err(ArtifactError::ShapeMismatch(_))));
        assert!(matches!(w.write_u16(&[0; 13]), Err(ArtifactError::ShapeMismatch(_))));
    }

    #[test]
    fn coordinate_length_must_match_dimension() {
        let bad = schema().with_coord("utc", "frame", CoordValues::UtcNanos(vec![1, 2, 3]));
        assert!(matches!(DatasetWriter::new(Vec::new(), &bad), Err(ArtifactError::ShapeMismatch(_))));
    }

    #[test]
    fn garbage_is_invalid_format() {
        assert!(matches!(
            DatasetReader::new(&b"not a dataset"[..]),
            Err(ArtifactError::InvalidFormat(_))
        ));
    }

    #[test]
    fn oversized_dimensions_are_invalid_format() {
        let huge = Schema::new()
            .with_dim("frame", usize::MAX)
            .with_dim("xpx", 2)
            .with_variable(Variable::new("video", &["frame", "xpx"], DType::U16));
        let mut bytes = MAGIC.to_vec();
        bytes.extend_from_slice(&VERSION.to_le_bytes());
        bincode::serialize_into(&mut bytes, &huge).unwrap();

        assert!(matches!(DatasetReader::new(bytes.as_slice()), Err(ArtifactError::InvalidFormat(_))));
        assert!(matches!(DatasetWriter::new(Vec::new(), &huge), Err(ArtifactError::InvalidFormat(_))));
    }

    #[test]
    fn truncated_payload_is_invalid_format() {
        let mut w = DatasetWriter::new(Vec::new(), &schema()).unwrap();
        w.write_u16(&[1; 12]).unwrap();
        let mut bytes = w.finish().unwrap();
        bytes.truncate(bytes.len() - 4);

        let mut r = DatasetReader::new(bytes.as_slice()).unwrap();
        let mut frame = [0u16; 6];
        r.read_u16(&mut frame).unwrap();
        assert!(matches!(r.read_u16(&mut frame), Err(ArtifactError::InvalidFormat(_))));
    }
}
