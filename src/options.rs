// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Session configuration.
//!
//! A session is configured with an ordered list of [`ProfileOption`]s, either
//! passed directly to [`Profile::start`] or recorded through a [`ProfileBuilder`].
//! Options are applied in order and later options win: selecting
//! [`ProfileOption::MemProfile`] after [`ProfileOption::CpuProfile`] gives a memory
//! profile, and no combination of options is ever rejected.
//!
//! [`Profile::start`]: crate::profiler::Profile::start

use std::path::{Path, PathBuf};

/// Directory the engine writes artifacts into. Assumed to be wiped between
/// invocations.
pub const TRANSIENT_ROOT: &str = "/tmp";

/// Region used for the destination bucket when [`ProfileOption::AwsRegion`] is not given.
pub const DEFAULT_REGION: &str = "us-east-1";

/// What the engine samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileMode {
    /// CPU time sampling.
    Cpu,
    /// Native memory allocation sampling.
    Memory,
}

impl ProfileMode {
    /// File name of this mode's artifact under the transient root.
    pub fn artifact_name(self) -> &'static str {
        match self {
            ProfileMode::Cpu => "cpu.jfr",
            ProfileMode::Memory => "mem.jfr",
        }
    }
}

/// A single session option.
///
/// The set of options is closed, so callers can match on it exhaustively:
///
/// ```
/// # use lambda_profiler_agent::options::ProfileOption;
/// fn describe(option: &ProfileOption) -> &str {
///     match option {
///         ProfileOption::Quiet => "quiet",
///         ProfileOption::CpuProfile => "cpu",
///         ProfileOption::MemProfile => "memory",
///         ProfileOption::S3Bucket(bucket) => bucket,
///         ProfileOption::AwsRegion(region) => region,
///     }
/// }
/// assert_eq!(describe(&ProfileOption::S3Bucket("profiles".into())), "profiles");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProfileOption {
    /// Suppress the engine's own informational output.
    Quiet,
    /// Profile CPU time. Overrides any earlier mode.
    CpuProfile,
    /// Profile memory allocations. Overrides any earlier mode.
    MemProfile,
    /// Upload the artifact into this bucket. Without it, nothing is uploaded.
    S3Bucket(String),
    /// Region of the destination bucket.
    AwsRegion(String),
}

/// An option understood only by the engine. The session never inspects these
/// beyond handing them over.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum EngineOption {
    Quiet,
    Mode(ProfileMode),
    ProfilePath(PathBuf),
}

/// Ordered engine options, built alongside the [`SessionState`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct EngineOptions(Vec<EngineOption>);

impl EngineOptions {
    pub(crate) fn push(&mut self, option: EngineOption) {
        self.0.push(option);
    }

    pub(crate) fn is_quiet(&self) -> bool {
        self.0.iter().any(|o| matches!(o, EngineOption::Quiet))
    }

    /// The last mode selected, CPU if none was.
    pub(crate) fn mode(&self) -> ProfileMode {
        self.0
            .iter()
            .rev()
            .find_map(|o| match o {
                EngineOption::Mode(mode) => Some(*mode),
                _ => None,
            })
            .unwrap_or(ProfileMode::Cpu)
    }

    /// The last output directory given, the transient root if none was.
    pub(crate) fn profile_path(&self) -> &Path {
        self.0
            .iter()
            .rev()
            .find_map(|o| match o {
                EngineOption::ProfilePath(path) => Some(path.as_path()),
                _ => None,
            })
            .unwrap_or(Path::new(TRANSIENT_ROOT))
    }

    /// Where the engine writes its artifact.
    pub(crate) fn artifact_path(&self) -> PathBuf {
        self.profile_path().join(self.mode().artifact_name())
    }
}

/// Everything the session itself needs to know, finalized before the engine starts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionState {
    /// Selected mode, `None` if no mode option was given.
    pub mode: Option<ProfileMode>,
    /// Where the engine writes the artifact.
    pub local_path: PathBuf,
    /// Directory the artifact lives under, stripped when deriving the destination key.
    pub local_root: PathBuf,
    /// Destination bucket, empty means "do not upload".
    pub destination_bucket: String,
    /// Region of the destination bucket.
    pub destination_region: String,
    /// Passed through to the engine.
    pub quiet: bool,
}

impl SessionState {
    /// Apply one option, returning the engine option it translates to, if any.
    fn apply(&mut self, option: ProfileOption) -> Option<EngineOption> {
        match option {
            ProfileOption::Quiet => {
                self.quiet = true;
                Some(EngineOption::Quiet)
            }
            ProfileOption::CpuProfile => Some(self.select(ProfileMode::Cpu)),
            ProfileOption::MemProfile => Some(self.select(ProfileMode::Memory)),
            ProfileOption::S3Bucket(bucket) => {
                self.destination_bucket = bucket;
                None
            }
            ProfileOption::AwsRegion(region) => {
                self.destination_region = region;
                None
            }
        }
    }

    fn select(&mut self, mode: ProfileMode) -> EngineOption {
        self.mode = Some(mode);
        self.local_path = self.local_root.join(mode.artifact_name());
        EngineOption::Mode(mode)
    }
}

/// Fold `options` into the session state and the engine options, writing under
/// the transient root.
pub(crate) fn build(
    options: impl IntoIterator<Item = ProfileOption>,
) -> (SessionState, EngineOptions) {
    build_in(options, Path::new(TRANSIENT_ROOT))
}

pub(crate) fn build_in(
    options: impl IntoIterator<Item = ProfileOption>,
    root: &Path,
) -> (SessionState, EngineOptions) {
    let mut state = SessionState {
        local_root: root.to_owned(),
        ..Default::default()
    };
    let mut engine_options = EngineOptions::default();
    for option in options {
        if let Some(o) = state.apply(option) {
            engine_options.push(o);
        }
    }

    if state.destination_region.is_empty() {
        state.destination_region = DEFAULT_REGION.to_owned();
    }
    if state.local_path.as_os_str().is_empty() {
        state.local_path = root.join(ProfileMode::Cpu.artifact_name());
    }
    // last, so that no caller option can move the artifact out of the root
    engine_options.push(EngineOption::ProfilePath(root.to_owned()));

    (state, engine_options)
}

/// Records [`ProfileOption`]s through chained setters, in call order.
#[derive(Debug, Default, Clone)]
pub struct ProfileBuilder {
    options: Vec<ProfileOption>,
}

impl ProfileBuilder {
    /// Suppress the engine's informational output.
    pub fn quiet(mut self) -> ProfileBuilder {
        self.options.push(ProfileOption::Quiet);
        self
    }

    /// Profile CPU time.
    pub fn cpu_profile(mut self) -> ProfileBuilder {
        self.options.push(ProfileOption::CpuProfile);
        self
    }

    /// Profile memory allocations.
    pub fn mem_profile(mut self) -> ProfileBuilder {
        self.options.push(ProfileOption::MemProfile);
        self
    }

    /// Sets the destination bucket.
    pub fn s3_bucket(mut self, bucket: impl Into<String>) -> ProfileBuilder {
        self.options.push(ProfileOption::S3Bucket(bucket.into()));
        self
    }

    /// Sets the destination bucket's region.
    pub fn aws_region(mut self, region: impl Into<String>) -> ProfileBuilder {
        self.options.push(ProfileOption::AwsRegion(region.into()));
        self
    }

    /// The recorded options.
    pub fn into_options(self) -> Vec<ProfileOption> {
        self.options
    }
}

impl IntoIterator for ProfileBuilder {
    type Item = ProfileOption;
    type IntoIter = std::vec::IntoIter<ProfileOption>;

    fn into_iter(self) -> Self::IntoIter {
        self.options.into_iter()
    }
}
