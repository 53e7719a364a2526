//! Onboard Flow: orchestration engine for identity onboarding wizards.

pub mod config;
pub mod error;
pub mod flow;
pub mod providers;
