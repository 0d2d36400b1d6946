//! Kernel: the supervisory runtime hosting a self-modifying agent.
//! Three core subsystems — the LLM Proxy, the Supervisor,
//! and the Router/Discovery pipeline — wired together at [`boot::boot`].

pub mod boot;
pub mod budget;
pub mod chain;
pub mod concurrency;
pub mod config;
pub mod database;
pub mod error;
pub mod event_bus;
pub mod gateway;
pub mod health;
pub mod llm;
pub mod maintenance;
pub mod recovery;
pub mod security;
pub mod supervisor;
pub mod vram;
