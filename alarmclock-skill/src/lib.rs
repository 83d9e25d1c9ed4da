//! Alarm clock skill for Hermes voice assistants.
//!
//! Alarms are set, listed and deleted by voice, ring on the site they
//! belong to, and can be snoozed. All traffic goes over MQTT.

pub mod api;
pub mod api_client;
pub mod bus;
pub mod clock;
pub mod config;
pub mod dialogue;
pub mod error;
pub mod intent;
pub mod ringing;
pub mod ringtone;
pub mod site;
pub mod skill;
pub mod store;
pub mod tracing;
pub mod types;
