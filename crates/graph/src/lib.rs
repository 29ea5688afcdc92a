//! Microsoft Graph binding for driveup.
//!
//! [`GraphClient`] implements [`driveup_upload::RemoteStore`] on top of the
//! drive endpoints of the Graph REST API.

pub mod client;
pub mod types;

pub use client::{Error, GraphClient};
