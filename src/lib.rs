//! Appointment availability, booking, and AI-assisted donor outreach over an
//! external personal-data platform.

pub mod availability;
pub mod booking;
pub mod config;
pub mod error;
pub mod generation;
pub mod invitations;
pub mod platform;
pub mod preferences;
pub mod ranking;
pub mod types;

#[cfg(test)]
mod test_support;
