pub mod cycle_reader;
pub mod layout;
pub mod markers;
pub mod ome_xml;
pub mod pyramid_writer;

pub use cycle_reader::CycleReader;
pub use layout::PyramidLayout;
pub use pyramid_writer::{PyramidTiffWriter, PyramidWriterOptions};
