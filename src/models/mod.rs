pub mod job;
pub mod protocol;
pub mod recording;
pub mod window;

pub use job::*;
pub use protocol::*;
pub use recording::*;
pub use window::*;
