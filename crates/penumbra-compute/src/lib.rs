//! # Penumbra Compute
//!
//! Compute backend abstraction for the Penumbra workspace. This crate
//! provides a [`ComputeBackend`](backend::ComputeBackend) trait that isolates
//! the propagation code from device-specific execution details.
//!
//! ## Available backends
//!
//! | Backend | Feature flag | Status |
//! |---------|-------------|--------|
//! | CPU (rustfft + Rayon) | `cpu` (default) | Implemented |

pub mod backend;

#[cfg(feature = "cpu")]
pub mod cpu;

pub use backend::{ComputeBackend, ComputeError, DeviceInfo, FftDirection};

#[cfg(feature = "cpu")]
pub use cpu::CpuBackend;
