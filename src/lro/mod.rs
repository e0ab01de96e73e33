//! Long-Running Operations
//!
//! Polling of asynchronous operations and on-demand resource-provider
//! registration.

pub mod polling;
pub mod registration;

pub use polling::{
    poll_for_completion, response_has_started_operation, with_polling, PollingConfig,
    PollingMethod, PollingState, OPERATION_CANCELED, OPERATION_FAILED, OPERATION_IN_PROGRESS,
    OPERATION_SUCCEEDED,
};
pub use registration::{
    missing_registration, register, send_with_registration, subscription_id, with_registration,
    MISSING_SUBSCRIPTION_REGISTRATION, REGISTRATION_API_VERSION,
};
