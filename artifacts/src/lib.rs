mod container;
pub mod dataset;
mod error;
pub mod naming;
pub mod store;
pub mod table;

pub use container::{open_artifact, AtomicWriter};
pub use dataset::{AttrValue, Attrs, Coord, CoordValues, DType, DatasetReader, DatasetWriter, Dim, Schema, Variable};
pub use error::{is_transient_io, ArtifactError};
pub use store::{ArtifactKind, ArtifactStore, StagePaths, StageWriter};
pub use table::{ContourRef, ContourTable, Table, TrackRow, TrackTable};
