pub mod codec;
pub mod reader;
pub mod value;

pub use codec::{Arg, Decoder, Encoder};
pub use reader::RespReader;
pub use value::RespValue;
