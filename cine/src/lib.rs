mod error;
mod header;
mod reader;
mod time;
mod writer;

pub use error::CineError;
pub use header::{BitmapInfoHeader, CineFileHeader, MetaValue, Setup};
pub use reader::Cine;
pub use time::Time64;
pub use writer::CineWriter;
