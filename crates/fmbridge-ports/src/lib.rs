pub mod audio;
pub mod engine;
pub mod midi;
pub mod settings;
pub mod storage;
pub mod types;

pub use audio::*;
pub use engine::*;
pub use midi::*;
pub use settings::*;
pub use storage::*;
pub use types::*;
