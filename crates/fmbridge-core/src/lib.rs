pub mod client;
pub mod diagnostics;
pub mod host;
pub mod ipc;
pub mod playback;
pub mod registry;
pub mod render_buffer;
pub mod session;

pub use client::*;
pub use diagnostics::*;
pub use host::*;
pub use ipc::*;
pub use playback::*;
pub use registry::*;
pub use render_buffer::*;
pub use session::*;
