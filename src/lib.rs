// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

#![deny(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! ## Lambda profiler agent
//! Profile a short-lived function (for example an AWS Lambda invocation) using
//! [async-profiler], and persist the resulting profile to S3 before the function's
//! local disk goes away.
//!
//! [async-profiler]: https://github.com/async-profiler/async-profiler
//!
//! ### OS/CPU Support
//!
//! This agent currently only supports Linux, on either x86-64 or aarch64.
//!
//! ### Usage
//!
//! A session is started with a list of [`ProfileOption`]s, and stopped with the
//! identity of the invocation being profiled:
//!
#![cfg_attr(feature = "s3-no-defaults", doc = "```no_run")]
#![cfg_attr(not(feature = "s3-no-defaults"), doc = "```compile_fail")]
//! # use lambda_profiler_agent::{metadata::InvocationIdentity, options::ProfileOption, profiler::Profile};
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let profile = Profile::start([
//!     ProfileOption::CpuProfile,
//!     ProfileOption::S3Bucket("<your bucket name>".into()),
//!     ProfileOption::AwsRegion("eu-west-1".into()),
//! ])?;
//!
//! // ... handle the request ...
//!
//! // with lambda_runtime, these come from the handler's `Context`
//! let invocation = InvocationIdentity::new("<invoked function arn>", "<request id>");
//! profile.stop(Some(&invocation)).await?;
//! # Ok(())
//! # }
//! ```
//!
//! When starting, the profiler [dlopen(3)]'s `libasyncProfiler.so` and returns an [`Err`] if it is not found,
//! so make sure there is a `libasyncProfiler.so` in the search path[^1].
//!
//! [^1]: the dlopen search path includes RPATH and LD_LIBRARY_PATH, but *not* the current directory to avoid current directory attacks.
//!
//! [dlopen(3)]: https://linux.die.net/man/3/dlopen
//!
//! Options are applied in order and later options win, so `[MemProfile, CpuProfile]`
//! profiles CPU. Without a mode option, the session profiles CPU; without
//! [`ProfileOption::AwsRegion`], the bucket is assumed to be in `us-east-1`.
//!
//! The engine writes a [JFR] recording under `/tmp`, as `cpu.jfr` or `mem.jfr`. On
//! stop, it is uploaded under the key `{function_arn}/{request_id}/cpu.jfr`, or
//! `unknown/cpu.jfr` when no invocation is given, e.g. when running locally.
//!
//! Stopping never terminates the process: a missing bucket, an unreadable profile,
//! or a failed upload are returned as a [`StopError`], and the local profile is left
//! in place. To persist somewhere else than S3, implement [`ObjectStore`] and use
//! [`Profile::stop_with_store`]; [`LocalStore`] writes into a directory.
//!
//! [`ProfileOption`]: options::ProfileOption
//! [`ProfileOption::AwsRegion`]: options::ProfileOption::AwsRegion
//! [`StopError`]: profiler::StopError
//! [`Profile::stop_with_store`]: profiler::Profile::stop_with_store
//! [`ObjectStore`]: store::ObjectStore
//! [`LocalStore`]: store::local::LocalStore
//! [JFR]: https://docs.oracle.com/javacomponents/jmc-5-4/jfr-runtime-guide/about.htm
mod asprof;

pub mod metadata;
pub mod options;
pub mod profiler;
pub mod store;
