pub mod controller;
pub mod generic;
pub mod traits;

pub use controller::PlaybackController;
pub use generic::SilentOutput;
pub use traits::{AudioOutput, PlaybackEvent, PlaybackState, PlaybackStatus};
