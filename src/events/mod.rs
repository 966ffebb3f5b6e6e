pub mod decode;
pub mod segment;
pub mod validator;

pub use decode::*;
pub use segment::*;
pub use validator::*;
