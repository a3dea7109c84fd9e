pub mod model;

// Shared by the disassembler and assembler binaries.
pub use model::{invert, load_labels, load_raw_bin, parse_u16, Image, Segment};
