// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use crate::options::{EngineOptions, ProfileMode};
use std::{
    ffi::{c_char, CStr, CString},
    sync::Arc,
};

use thiserror::Error;

pub(crate) mod raw;

/// Errors reported by, or while reaching, async-profiler.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum AsProfError {
    /// async-profiler rejected a command.
    #[error("async-profiler error: {0}")]
    AsyncProfilerError(String),
    /// `libasyncProfiler.so` could not be loaded.
    #[error("error loading libasyncProfiler: {0}")]
    LibraryError(#[from] Arc<libloading::Error>),
    /// A command contained a NUL byte.
    #[error("invalid async-profiler command: {0}")]
    InvalidCommand(#[from] std::ffi::NulError),
}

/// The async-profiler engine. Writes a JFR recording to the artifact path
/// implied by its [`EngineOptions`].
#[derive(Debug, Default)]
pub struct AsProf {
    quiet: bool,
}

impl AsProf {
    /// Render the `asprof_execute` start command for `options`.
    fn start_command(options: &EngineOptions) -> String {
        let event = match options.mode() {
            ProfileMode::Cpu => "event=cpu",
            ProfileMode::Memory => "nativemem=0",
        };
        format!(
            "start,{event},jfr,file={}",
            options.artifact_path().display()
        )
    }
}

impl super::profiler::ProfilerEngine for AsProf {
    fn init() -> Result<(), AsProfError> {
        unsafe {
            (raw::async_profiler()?.asprof_init)();
        };
        Ok(())
    }

    fn start(&mut self, options: &EngineOptions) -> Result<(), AsProfError> {
        self.quiet = options.is_quiet();
        let args = Self::start_command(options);
        tracing::debug!("starting the async-profiler: {args}");

        self.asprof_execute(&args)?;
        tracing::debug!("async-profiler started successfully");
        Ok(())
    }

    fn stop(&mut self) -> Result<(), AsProfError> {
        self.asprof_execute("stop")?;
        tracing::debug!("async-profiler stopped successfully");
        Ok(())
    }
}

impl AsProf {
    /// convert an asprof_error_t to a Result
    ///
    /// SAFETY: response must be a valid asprof_error_t
    unsafe fn asprof_error(response: raw::asprof_error_t) -> Result<(), AsProfError> {
        if !response.is_null() {
            let response = (raw::async_profiler()?.asprof_error_str)(response);
            if response.is_null() {
                return Ok(());
            }
            let response = unsafe { CStr::from_ptr(response) };
            let response_str = response.to_string_lossy();
            tracing::error!("received error from async-profiler: {}", response_str);
            Err(AsProfError::AsyncProfilerError(response_str.to_string()))
        } else {
            Ok(())
        }
    }

    fn asprof_execute(&self, args: &str) -> Result<(), AsProfError> {
        unsafe extern "C" fn callback(buf: *const c_char, size: usize) {
            unsafe {
                if !buf.is_null() {
                    let parts = std::slice::from_raw_parts(buf as *const u8, size);
                    tracing::debug!(
                        "response from async-profiler: {}",
                        String::from_utf8_lossy(parts)
                    );
                } else {
                    tracing::debug!("invalid pointer or size");
                }
            }
        }

        // quiet sessions don't get the engine's informational output at all
        let output: raw::asprof_writer_t = if self.quiet { None } else { Some(callback) };
        let args_compatible = CString::new(args)?;
        unsafe {
            Self::asprof_error((raw::async_profiler()?.asprof_execute)(
                args_compatible.as_ptr(),
                output,
            ))
        }
    }
}
