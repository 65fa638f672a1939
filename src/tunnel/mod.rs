//! The virtual interface and the pump that drives it.

pub mod device;
pub mod pump;

pub use device::{Establish, PacketWriter, TunDevice, TunRsEstablisher};
pub use pump::{PumpState, TunnelPump};
