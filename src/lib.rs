// src/lib.rs - Photobooth print queue: pairing, compositing and dispatch
pub mod compositor;
pub mod config;
pub mod dispatch;
pub mod job;
pub mod orphan;
pub mod printer;
pub mod rest;
pub mod scheduler;
pub mod settings;
pub mod store;
pub mod web;
