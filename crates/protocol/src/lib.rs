pub mod actions;
pub mod constants;
pub mod frame;

// Re-export primary types for convenience.
pub use actions::ClientAction;
pub use constants::is_normal_closure;
pub use frame::{Discriminator, Frame, FrameError};
