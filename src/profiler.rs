// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Profiling sessions: start the engine, then hand its profile to a store.

pub use crate::asprof::AsProfError;

use crate::{
    asprof,
    metadata::{InvocationIdentity, UNKNOWN_INVOCATION_PREFIX},
    options::{self, EngineOptions, ProfileOption, SessionState},
    store::ObjectStore,
};
use std::{
    io,
    path::{Path, PathBuf},
    time::Instant,
};
use thiserror::Error;

pub(crate) trait ProfilerEngine: Send + Sync + 'static {
    fn init() -> Result<(), AsProfError>
    where
        Self: Sized;
    fn start(&mut self, options: &EngineOptions) -> Result<(), AsProfError>;
    /// Stops sampling and flushes the artifact.
    fn stop(&mut self) -> Result<(), AsProfError>;
}

/// Why a session could not be started.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StartError {
    /// async-profiler could not be loaded or refused to start.
    #[error(transparent)]
    AsProf(#[from] AsProfError),
}

/// Why a session's profile did not make it to the store.
///
/// In every case the local artifact, if the engine wrote one, is left in place.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StopError {
    /// The profiler failed to stop; the profile may be incomplete.
    #[error("stopping the profiler: {0}")]
    Engine(#[from] AsProfError),
    /// No [`ProfileOption::S3Bucket`] was given.
    #[error("no destination bucket configured, not uploading the profile")]
    NoDestination,
    /// The profile could not be opened for upload.
    #[error("unable to open profile {path:?}: {source}")]
    OpenArtifact {
        /// Where the profile was expected.
        path: PathBuf,
        /// The underlying error.
        source: io::Error,
    },
    /// The store rejected the profile.
    #[error("uploading profile: {0}")]
    Upload(Box<dyn std::error::Error + Send + Sync>),
}

enum Status {
    Running(Instant),
    Stopped,
}

/// A running profiling session.
///
/// Call [`Profile::stop`] (or [`Profile::stop_with_store`]) to end the session and
/// persist the profile. Dropping a running session stops the profiler without
/// uploading anything.
pub struct Profile {
    state: SessionState,
    engine: Box<dyn ProfilerEngine>,
    status: Status,
}

impl std::fmt::Debug for Profile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Profile")
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl Profile {
    /// Start a profiling session with async-profiler.
    ///
    /// Options are applied in order, later ones overriding earlier ones.
    pub fn start(options: impl IntoIterator<Item = ProfileOption>) -> Result<Profile, StartError> {
        Self::start_inner(asprof::AsProf::default(), options::build(options))
    }

    fn start_inner<E: ProfilerEngine>(
        mut engine: E,
        (state, engine_options): (SessionState, EngineOptions),
    ) -> Result<Profile, StartError> {
        E::init()?;
        engine.start(&engine_options)?;
        tracing::info!(
            message = "profiling session started",
            path = ?state.local_path,
            bucket = %state.destination_bucket,
        );
        Ok(Profile {
            state,
            engine: Box::new(engine),
            status: Status::Running(Instant::now()),
        })
    }

    /// The finalized configuration of this session.
    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Stop the session and upload the profile to the configured S3 bucket, under
    /// a key identifying `invocation`.
    ///
    /// Pass `None` when running outside of an invocation; the profile is then
    /// stored under `unknown/`.
    #[cfg(feature = "s3-no-defaults")]
    pub async fn stop(mut self, invocation: Option<&InvocationIdentity>) -> Result<(), StopError> {
        let artifact = self.finish().await?;
        let store = self.s3_store().await;
        self.upload(&store, artifact, invocation).await
    }

    /// Client for the session's destination region.
    #[cfg(feature = "s3-no-defaults")]
    async fn s3_store(&self) -> crate::store::s3::S3Store {
        crate::store::s3::S3Store::new(self.state.destination_region.clone()).await
    }

    /// Stop the session and hand the profile to `store`.
    pub async fn stop_with_store(
        mut self,
        store: &(dyn ObjectStore + Send + Sync),
        invocation: Option<&InvocationIdentity>,
    ) -> Result<(), StopError> {
        let artifact = self.finish().await?;
        self.upload(store, artifact, invocation).await
    }

    /// Stop the engine and open the artifact for upload.
    async fn finish(&mut self) -> Result<tokio::fs::File, StopError> {
        // never stop the engine twice, even if this stop fails
        if let Status::Running(since) = std::mem::replace(&mut self.status, Status::Stopped) {
            tracing::debug!(elapsed = ?since.elapsed(), "stopping profiler");
        }
        self.engine.stop()?;

        if self.state.destination_bucket.is_empty() {
            return Err(StopError::NoDestination);
        }

        let path = &self.state.local_path;
        tokio::fs::File::open(path)
            .await
            .map_err(|source| StopError::OpenArtifact {
                path: path.clone(),
                source,
            })
    }

    async fn upload(
        &self,
        store: &(dyn ObjectStore + Send + Sync),
        artifact: tokio::fs::File,
        invocation: Option<&InvocationIdentity>,
    ) -> Result<(), StopError> {
        let bucket = &self.state.destination_bucket;
        let key = destination_key(&self.state.local_root, &self.state.local_path, invocation);
        tracing::info!(message = "uploading profile", bucket = %bucket, key = %key);
        // the store owns the artifact from here on, and closes it when done
        store
            .put(bucket, &key, artifact)
            .await
            .map_err(StopError::Upload)?;
        tracing::info!(message = "uploaded profile", bucket = %bucket, key = %key);
        Ok(())
    }
}

impl Drop for Profile {
    fn drop(&mut self) {
        if let Status::Running(_) = self.status {
            self.status = Status::Stopped;
            if let Err(err) = self.engine.stop() {
                tracing::warn!(?err, "unable to stop profiler during drop glue");
            }
        }
    }
}

/// Destination key for the artifact at `local_path`: the path relative to
/// `local_root`, prefixed with `{function_arn}/{request_id}/`, or `unknown/`
/// without an invocation.
///
/// A path outside of `local_root` is used as is.
pub fn destination_key(
    local_root: &Path,
    local_path: &Path,
    invocation: Option<&InvocationIdentity>,
) -> String {
    let Ok(relative) = local_path.strip_prefix(local_root) else {
        return local_path.display().to_string();
    };
    let prefix = match invocation {
        Some(invocation) => invocation.key_prefix(),
        None => UNKNOWN_INVOCATION_PREFIX.to_owned(),
    };
    format!("{prefix}{}", relative.display())
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{self, AtomicU32};
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use test_case::test_case;
    use tokio::io::AsyncReadExt;

    use super::*;
    use crate::options::{build_in, ProfileMode, TRANSIENT_ROOT};
    use crate::store::local::LocalStore;

    #[derive(Default)]
    struct Calls {
        start: AtomicU32,
        stop: AtomicU32,
    }

    struct MockProfilerEngine {
        calls: Arc<Calls>,
        artifact: Option<PathBuf>,
        write_artifact: bool,
        start_error: bool,
        stop_error: bool,
    }

    impl MockProfilerEngine {
        fn new(calls: Arc<Calls>) -> Self {
            MockProfilerEngine {
                calls,
                artifact: None,
                write_artifact: true,
                start_error: false,
                stop_error: false,
            }
        }
    }

    impl ProfilerEngine for MockProfilerEngine {
        fn init() -> Result<(), AsProfError> {
            Ok(())
        }

        fn start(&mut self, options: &EngineOptions) -> Result<(), AsProfError> {
            self.calls.start.fetch_add(1, atomic::Ordering::Relaxed);
            if self.start_error {
                return Err(AsProfError::AsyncProfilerError("start".into()));
            }
            self.artifact = Some(options.artifact_path());
            Ok(())
        }

        fn stop(&mut self) -> Result<(), AsProfError> {
            let n = self.calls.stop.fetch_add(1, atomic::Ordering::Relaxed);
            if self.stop_error {
                return Err(AsProfError::AsyncProfilerError("stop".into()));
            }
            if let (true, Some(path)) = (self.write_artifact, &self.artifact) {
                std::fs::write(path, format!("JFR{n}")).unwrap();
            }
            Ok(())
        }
    }

    #[derive(Debug, Default)]
    struct MockStore {
        puts: Mutex<Vec<(String, String, String)>>,
        fail: bool,
    }

    #[async_trait]
    impl ObjectStore for MockStore {
        async fn put(
            &self,
            bucket: &str,
            key: &str,
            mut body: tokio::fs::File,
        ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
            let mut contents = String::new();
            body.read_to_string(&mut contents).await.unwrap();
            self.puts
                .lock()
                .unwrap()
                .push((bucket.to_owned(), key.to_owned(), contents));
            if self.fail {
                Err("access denied".into())
            } else {
                Ok(())
            }
        }
    }

    fn start_mock(
        engine: MockProfilerEngine,
        root: &Path,
        options: Vec<ProfileOption>,
    ) -> Profile {
        Profile::start_inner(engine, build_in(options, root)).unwrap()
    }

    fn identity() -> InvocationIdentity {
        InvocationIdentity::new("arn:aws:lambda:f", "abc-123")
    }

    #[test_case("/tmp/cpu.pprof", Some(identity()), "arn:aws:lambda:f/abc-123/cpu.pprof"; "with invocation")]
    #[test_case("/tmp/mem.pprof", None, "unknown/mem.pprof"; "without invocation")]
    #[test_case("/var/cpu.pprof", Some(identity()), "/var/cpu.pprof"; "outside of root")]
    fn test_destination_key(
        local_path: &str,
        invocation: Option<InvocationIdentity>,
        expected: &str,
    ) {
        assert_eq!(
            destination_key(
                Path::new(TRANSIENT_ROOT),
                Path::new(local_path),
                invocation.as_ref()
            ),
            expected
        );
    }

    #[tokio::test]
    async fn test_stop_uploads_under_invocation() {
        let root = tempfile::tempdir().unwrap();
        let calls = Arc::new(Calls::default());
        let profile = start_mock(
            MockProfilerEngine::new(calls.clone()),
            root.path(),
            vec![ProfileOption::CpuProfile, ProfileOption::S3Bucket("bucket".into())],
        );
        assert_eq!(calls.start.load(atomic::Ordering::Relaxed), 1);
        assert_eq!(profile.state().mode, Some(ProfileMode::Cpu));

        let store = MockStore::default();
        profile
            .stop_with_store(&store, Some(&identity()))
            .await
            .unwrap();
        assert_eq!(calls.stop.load(atomic::Ordering::Relaxed), 1);
        assert_eq!(
            *store.puts.lock().unwrap(),
            vec![(
                "bucket".to_owned(),
                "arn:aws:lambda:f/abc-123/cpu.jfr".to_owned(),
                "JFR0".to_owned()
            )]
        );
    }

    #[tokio::test]
    async fn test_stop_uploads_under_unknown() {
        let root = tempfile::tempdir().unwrap();
        let calls = Arc::new(Calls::default());
        let profile = start_mock(
            MockProfilerEngine::new(calls.clone()),
            root.path(),
            vec![
                ProfileOption::S3Bucket("first".into()),
                ProfileOption::MemProfile,
                ProfileOption::S3Bucket("bucket".into()),
            ],
        );

        let store = MockStore::default();
        profile.stop_with_store(&store, None).await.unwrap();
        let puts = store.puts.lock().unwrap();
        assert_eq!(puts.len(), 1);
        assert_eq!(puts[0].0, "bucket");
        assert_eq!(puts[0].1, "unknown/mem.jfr");
    }

    #[tokio::test]
    async fn test_stop_without_bucket() {
        let root = tempfile::tempdir().unwrap();
        let calls = Arc::new(Calls::default());
        let profile = start_mock(
            MockProfilerEngine::new(calls.clone()),
            root.path(),
            vec![ProfileOption::CpuProfile],
        );

        let store = MockStore::default();
        let err = profile
            .stop_with_store(&store, Some(&identity()))
            .await
            .unwrap_err();
        assert!(matches!(err, StopError::NoDestination), "{err:?}");
        assert_eq!(calls.stop.load(atomic::Ordering::Relaxed), 1);
        assert!(store.puts.lock().unwrap().is_empty());
        // the artifact stays where the engine left it
        assert!(root.path().join("cpu.jfr").exists());
    }

    #[tokio::test]
    async fn test_stop_missing_artifact() {
        let root = tempfile::tempdir().unwrap();
        let calls = Arc::new(Calls::default());
        let mut engine = MockProfilerEngine::new(calls.clone());
        engine.write_artifact = false;
        let profile = start_mock(
            engine,
            root.path(),
            vec![ProfileOption::S3Bucket("bucket".into())],
        );

        let store = MockStore::default();
        let err = profile.stop_with_store(&store, None).await.unwrap_err();
        match err {
            StopError::OpenArtifact { path, .. } => assert_eq!(path, root.path().join("cpu.jfr")),
            err => panic!("unexpected error {err:?}"),
        }
        assert_eq!(calls.stop.load(atomic::Ordering::Relaxed), 1);
        assert!(store.puts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_stop_upload_error() {
        let root = tempfile::tempdir().unwrap();
        let calls = Arc::new(Calls::default());
        let profile = start_mock(
            MockProfilerEngine::new(calls.clone()),
            root.path(),
            vec![ProfileOption::S3Bucket("bucket".into())],
        );

        let store = MockStore {
            fail: true,
            ..Default::default()
        };
        let err = profile
            .stop_with_store(&store, Some(&identity()))
            .await
            .unwrap_err();
        assert!(matches!(err, StopError::Upload(_)), "{err:?}");
        assert_eq!(calls.stop.load(atomic::Ordering::Relaxed), 1);
        assert_eq!(store.puts.lock().unwrap().len(), 1);
        // no cleanup of the local copy
        assert!(root.path().join("cpu.jfr").exists());
    }

    #[tokio::test]
    async fn test_stop_engine_error() {
        let root = tempfile::tempdir().unwrap();
        let calls = Arc::new(Calls::default());
        let mut engine = MockProfilerEngine::new(calls.clone());
        engine.stop_error = true;
        let profile = start_mock(
            engine,
            root.path(),
            vec![ProfileOption::S3Bucket("bucket".into())],
        );

        let store = MockStore::default();
        let err = profile.stop_with_store(&store, None).await.unwrap_err();
        match err {
            StopError::Engine(AsProfError::AsyncProfilerError(msg)) => assert_eq!(msg, "stop"),
            err => panic!("unexpected error {err:?}"),
        }
        // not retried by the drop glue either
        assert_eq!(calls.stop.load(atomic::Ordering::Relaxed), 1);
        assert!(store.puts.lock().unwrap().is_empty());
    }

    #[cfg(feature = "s3-no-defaults")]
    #[tokio::test]
    #[test_case(vec![], "us-east-1"; "default region")]
    #[test_case(vec![ProfileOption::AwsRegion("eu-west-1".into())], "eu-west-1"; "configured region")]
    async fn test_s3_store_region(options: Vec<ProfileOption>, expected: &str) {
        let root = tempfile::tempdir().unwrap();
        let calls = Arc::new(Calls::default());
        let profile = start_mock(MockProfilerEngine::new(calls.clone()), root.path(), options);
        assert_eq!(profile.s3_store().await.region(), Some(expected));
    }

    #[test]
    fn test_drop_stops_engine() {
        let root = tempfile::tempdir().unwrap();
        let calls = Arc::new(Calls::default());
        let profile = start_mock(MockProfilerEngine::new(calls.clone()), root.path(), vec![]);
        assert_eq!(calls.stop.load(atomic::Ordering::Relaxed), 0);
        drop(profile);
        assert_eq!(calls.stop.load(atomic::Ordering::Relaxed), 1);
    }

    #[test]
    fn test_start_error() {
        let root = tempfile::tempdir().unwrap();
        let calls = Arc::new(Calls::default());
        let mut engine = MockProfilerEngine::new(calls.clone());
        engine.start_error = true;
        let err = Profile::start_inner(engine, build_in(vec![], root.path())).unwrap_err();
        assert!(matches!(err, StartError::AsProf(_)), "{err:?}");
        assert_eq!(calls.stop.load(atomic::Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn test_stop_into_local_store() {
        let root = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let calls = Arc::new(Calls::default());
        let profile = start_mock(
            MockProfilerEngine::new(calls.clone()),
            root.path(),
            vec![
                ProfileOption::Quiet,
                ProfileOption::MemProfile,
                ProfileOption::S3Bucket("profiles".into()),
            ],
        );

        profile
            .stop_with_store(&LocalStore::new(out.path()), Some(&identity()))
            .await
            .unwrap();
        assert_eq!(
            std::fs::read_to_string(out.path().join("profiles/arn:aws:lambda:f/abc-123/mem.jfr"))
                .unwrap(),
            "JFR0"
        );
    }
}
