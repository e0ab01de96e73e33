//! Interactive Flows
//!
//! Sign-in flows that need a user in the loop.
//!
//! - **Device Code Flow**: user enters a code on a second device while the client polls

pub mod device;

// Device Code Flow
pub use device::{
    create_device_authorization_flow, max_poll_wait, DeviceAuthorizationFlow,
    DeviceAuthorizationFlowImpl,
};
