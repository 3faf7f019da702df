//! Client core for the CondoconnectAI property management backend: API
//! access with a response cache, offline table sync and a realtime channel.

pub mod api;
pub mod auth;
pub mod cache;
pub mod config;
pub mod realtime;
pub mod sync;
