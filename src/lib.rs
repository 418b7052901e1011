#[macro_use]
extern crate tracing;

pub mod cli;
pub mod cvt;
pub mod framebuffer;
pub mod headless;
pub mod host;
pub mod outputs;
pub mod resize;
pub mod server;
pub mod session;
pub mod utils;
pub mod window;
