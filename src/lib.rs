//! Stable Diffusion batch generation service
//!
//! This library provides the core functionality for sd-batch: a persistent
//! queue of image-generation jobs, wildcard prompt resolution, and a batch
//! runner that drives jobs through an AUTOMATIC1111-compatible HTTP API.

pub mod app_state;
pub mod config;
pub mod models;
pub mod routes;
pub mod services;
