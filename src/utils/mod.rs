pub mod clock;
pub mod dir;
pub mod logging;
pub mod normalize;
pub mod runtime;
