pub mod annotate;
pub mod artifacts;
pub mod bad_channels;
pub mod describe;
pub mod filters;
pub mod interpolate;
pub mod pipeline;
pub mod reference;
pub mod segment;

pub use annotate::*;
pub use artifacts::*;
pub use bad_channels::*;
pub use describe::*;
pub use filters::*;
pub use interpolate::*;
pub use pipeline::*;
pub use reference::*;
pub use segment::*;
