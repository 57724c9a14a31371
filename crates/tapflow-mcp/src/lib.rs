pub mod client;
pub mod device;
pub mod protocol;

pub use client::McpClient;
pub use device::McpDeviceController;
