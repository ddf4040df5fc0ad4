// SPDX-License-Identifier: MIT

//! Executor failure modes (spec section "Executor: Failure modes").
//!
//! None of these ever reach the admission layer directly: the Executor
//! records the description on the job and transitions RUNNING -> FAILED
//! (see [`crate::run::Executor::run`]).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExecutorError {
    /// Observed cooperatively between tiles; never interrupts one in flight.
    #[error("canceled")]
    Canceled,
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),
    #[error("store error: {0}")]
    Store(#[from] wsi_core::ApiError),
}
