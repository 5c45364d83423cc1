//! Integration tests for fidx

mod cli_tests {
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use predicates::prelude::*;
    use std::fs;
    use tempfile::TempDir;

    /// fidx with config and state isolated under `home`
    fn fidx(home: &TempDir) -> Command {
        let mut cmd = cargo_bin_cmd!("fidx");
        cmd.env("FIDX_CONFIG", home.path().join("config.toml"))
            .env("XDG_STATE_HOME", home.path().join("state"))
            .env_remove("RUST_LOG");
        cmd
    }

    #[test]
    fn help_displays() {
        let home = TempDir::new().unwrap();
        fidx(&home)
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("Shared index cache"));
    }

    #[test]
    fn version_displays() {
        let home = TempDir::new().unwrap();
        fidx(&home)
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("fidx"));
    }

    #[test]
    fn index_help_lists_overrides() {
        let home = TempDir::new().unwrap();
        fidx(&home)
            .args(["index", "--help"])
            .assert()
            .success()
            .stdout(predicate::str::contains("--forward-only"))
            .stdout(predicate::str::contains("--max-wait-hours"));
    }

    #[test]
    fn infinite_max_wait_is_a_usage_error() {
        let home = TempDir::new().unwrap();
        fidx(&home)
            .args(["index", "--fasta", "yeast.fasta", "--max-wait-hours", "inf"])
            .assert()
            .code(2)
            .stderr(predicate::str::contains("finite"));
    }

    #[test]
    fn config_path() {
        let home = TempDir::new().unwrap();
        fidx(&home)
            .args(["config", "path"])
            .assert()
            .success()
            .stdout(predicate::str::contains("config.toml"));
    }

    #[test]
    fn config_show() {
        let home = TempDir::new().unwrap();
        fidx(&home)
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("[lock]"))
            .stdout(predicate::str::contains("stale_minutes = 60"));
    }

    #[test]
    fn config_set_persists() {
        let home = TempDir::new().unwrap();
        fidx(&home)
            .args(["config", "set", "lock.max_wait_hours", "1.5"])
            .assert()
            .success();

        let saved = fs::read_to_string(home.path().join("config.toml")).unwrap();
        assert!(saved.contains("max_wait_hours = 1.5"));
    }

    #[test]
    fn config_set_unknown_key_fails() {
        let home = TempDir::new().unwrap();
        fidx(&home)
            .args(["config", "set", "vm.name", "x"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Unknown config key"));
    }

    #[test]
    fn validate_missing_reference() {
        let home = TempDir::new().unwrap();
        fidx(&home)
            .args(["validate", "--fasta"])
            .arg(home.path().join("absent.fasta"))
            .assert()
            .code(1)
            .stderr(predicate::str::contains("Reference file not found"));
    }

    #[test]
    fn validate_reports_missing_artifacts() {
        let home = TempDir::new().unwrap();
        let fasta = home.path().join("yeast.fasta");
        fs::write(&fasta, ">p\nPEPTIDE\n").unwrap();

        fidx(&home)
            .args(["validate", "--forward-only", "--fasta"])
            .arg(&fasta)
            .assert()
            .failure()
            .stdout(predicate::str::contains("missing"))
            .stderr(predicate::str::contains("incomplete"));
    }

    #[test]
    fn search_with_missing_spectra_names_step() {
        let home = TempDir::new().unwrap();
        fidx(&home)
            .args(["search", "--spectra"])
            .arg(home.path().join("absent.mzML"))
            .args(["--fasta", "db.fasta", "--params", "p.conf", "-o", "out.mzid"])
            .assert()
            .code(1)
            .stderr(predicate::str::contains("search failed during inputs"));
    }

    #[test]
    fn purge_without_policy_does_nothing() {
        let home = TempDir::new().unwrap();
        let root = home.path().join("shared");
        fs::create_dir_all(&root).unwrap();

        fidx(&home)
            .args(["purge", "--force", "--root"])
            .arg(&root)
            .assert()
            .success()
            .stdout(predicate::str::contains("nothing to purge"));
        assert!(root.join("PurgeInfoFile.txt").exists());
    }

    #[test]
    fn purge_within_limit() {
        let home = TempDir::new().unwrap();
        let root = home.path().join("shared");
        fs::create_dir_all(&root).unwrap();
        fs::write(root.join("MaxDirSize.txt"), "MaxSizeGB=10\n").unwrap();

        fidx(&home)
            .args(["purge", "--force", "--root"])
            .arg(&root)
            .assert()
            .success()
            .stdout(predicate::str::contains("Within limit"));
    }
}

mod coordination_tests {
    use async_trait::async_trait;
    use fidx::artifact::{DecoyMode, ReferenceFile};
    use fidx::clock::{Clock, FakeClock};
    use fidx::config::Config;
    use fidx::context::JobContext;
    use fidx::error::FidxResult;
    use fidx::index::{IndexBuilder, IndexCoordinator, IndexSource};
    use fidx::lock::LockMarker;
    use fidx::remote::{last_used, RemoteCache};
    use fidx::system::FixedProbe;
    use std::fs;
    use std::path::{Path, PathBuf};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::{Duration, SystemTime};
    use tempfile::TempDir;

    const REFERENCE: &str = "ID_000042_FEED.fasta";

    /// Builder that takes ten simulated minutes and counts its runs
    struct SlowBuilder {
        clock: FakeClock,
        builds: AtomicUsize,
    }

    #[async_trait]
    impl IndexBuilder for SlowBuilder {
        async fn build(&self, reference: &ReferenceFile, mode: DecoyMode, _: u64) -> FidxResult<()> {
            self.builds.fetch_add(1, Ordering::SeqCst);
            self.clock.sleep(Duration::from_secs(600)).await;
            write_index(reference, mode);
            Ok(())
        }
    }

    fn write_index(reference: &ReferenceFile, mode: DecoyMode) {
        for suffix in mode.suffixes() {
            fs::write(reference.artifact_path(&reference.dir(), suffix), b"\x00suffix-array").unwrap();
        }
    }

    /// Clock that runs a callback the first time anyone reads it
    struct HookedClock {
        inner: FakeClock,
        on_first_read: Mutex<Option<Box<dyn FnOnce() + Send>>>,
    }

    #[async_trait]
    impl Clock for HookedClock {
        fn now(&self) -> chrono::DateTime<chrono::Utc> {
            let hook = self.on_first_read.lock().unwrap().take();
            if let Some(hook) = hook {
                hook();
            }
            self.inner.now()
        }

        async fn sleep(&self, duration: Duration) {
            self.inner.sleep(duration).await
        }
    }

    struct Cluster {
        dir: TempDir,
        clock: FakeClock,
        builder: Arc<SlowBuilder>,
        config: Config,
    }

    impl Cluster {
        fn new() -> Self {
            let dir = TempDir::new().unwrap();
            let clock = FakeClock::new();
            let mut config = Config::default();
            config.cache.generated_dir = Some(dir.path().join("shared"));
            config.cache.legacy_dir = Some(dir.path().join("shared-legacy"));
            Self {
                builder: Arc::new(SlowBuilder {
                    clock: clock.clone(),
                    builds: AtomicUsize::new(0),
                }),
                dir,
                clock,
                config,
            }
        }

        fn worker(&self, name: &str) -> (IndexCoordinator, ReferenceFile) {
            self.worker_with_clock(name, Arc::new(self.clock.clone()))
        }

        fn worker_with_clock(&self, name: &str, clock: Arc<dyn Clock>) -> (IndexCoordinator, ReferenceFile) {
            let local = self.dir.path().join(name);
            fs::create_dir_all(&local).unwrap();
            fs::write(local.join(REFERENCE), b">sp|P1\nPEPTIDEK\n").unwrap();

            let coordinator = IndexCoordinator::new(
                &self.config,
                clock,
                self.builder.clone(),
                Arc::new(FixedProbe::unlimited()),
                name,
            );
            (coordinator, ReferenceFile::new(local.join(REFERENCE)).unwrap())
        }

        fn builds(&self) -> usize {
            self.builder.builds.load(Ordering::SeqCst)
        }

        fn remote_dir(&self) -> PathBuf {
            let dir = self.dir.path().join("shared").join("0").join("ForwardReverse");
            fs::create_dir_all(&dir).unwrap();
            dir
        }

        fn remote_lock(&self) -> PathBuf {
            self.remote_dir().join(format!("{REFERENCE}.lock"))
        }

        fn remote_last_used(&self) -> Option<chrono::DateTime<chrono::Utc>> {
            last_used::read(&self.remote_dir().join(format!("{REFERENCE}.LastUsed")))
        }
    }

    async fn ensure(worker: &(IndexCoordinator, ReferenceFile)) -> (IndexSource, Vec<String>) {
        let mut ctx = JobContext::new("ensure_index");
        let source = worker
            .0
            .ensure_index(&worker.1, DecoyMode::ForwardReverse, &mut ctx)
            .await
            .unwrap();
        (source, ctx.warnings().to_vec())
    }

    fn backdate(path: &Path, by: Duration) {
        let file = fs::File::options().write(true).open(path).unwrap();
        file.set_modified(SystemTime::now() - by).unwrap();
    }

    #[tokio::test]
    async fn concurrent_workers_build_once() {
        let cluster = Cluster::new();
        let workers: Vec<_> = ["w1", "w2", "w3", "w4"]
            .into_iter()
            .map(|name| cluster.worker(name))
            .collect();

        let (a, b, c, d) = tokio::join!(
            ensure(&workers[0]),
            ensure(&workers[1]),
            ensure(&workers[2]),
            ensure(&workers[3]),
        );

        assert_eq!(cluster.builds(), 1);
        let sources = [a.0, b.0, c.0, d.0];
        assert_eq!(sources.iter().filter(|s| **s == IndexSource::Built).count(), 1);
        assert_eq!(sources.iter().filter(|s| **s == IndexSource::Fetched).count(), 3);
        assert!(!cluster.remote_lock().exists());
    }

    #[tokio::test]
    async fn ready_index_is_reused_without_work() {
        let cluster = Cluster::new();
        let worker = cluster.worker("w1");

        assert_eq!(ensure(&worker).await.0, IndexSource::Built);
        let before = cluster.clock.now();
        let (source, warnings) = ensure(&worker).await;

        assert_eq!(source, IndexSource::Reused);
        assert!(warnings.is_empty());
        assert_eq!(cluster.builds(), 1);
        assert_eq!(cluster.clock.now(), before);
    }

    #[tokio::test]
    async fn stale_remote_lock_is_removed_without_waiting() {
        let cluster = Cluster::new();
        let lock = cluster.remote_lock();
        let abandoned = LockMarker::new("crashed-worker", cluster.clock.now() - chrono::Duration::hours(2));
        fs::write(&lock, abandoned.render()).unwrap();
        backdate(&lock, Duration::from_secs(2 * 3600));
        let worker = cluster.worker("w1");
        let start = cluster.clock.now();

        let (source, warnings) = ensure(&worker).await;

        assert_eq!(source, IndexSource::Built);
        assert!(warnings.iter().any(|w| w.contains("stale")), "{warnings:?}");
        // Only the build itself consumed simulated time
        assert_eq!(
            (cluster.clock.now() - start).num_seconds(),
            600,
        );
    }

    #[tokio::test]
    async fn live_lock_is_taken_over_after_max_wait() {
        let mut cluster = Cluster::new();
        cluster.config.lock.max_wait_hours = 0.5;
        let lock = cluster.remote_lock();
        fs::write(&lock, LockMarker::new("hung-worker", cluster.clock.now()).render()).unwrap();
        let worker = cluster.worker("w1");
        let start = cluster.clock.now();

        let (source, warnings) = ensure(&worker).await;

        assert_eq!(source, IndexSource::Built);
        assert!(warnings.iter().any(|w| w.contains("maximum wait")), "{warnings:?}");
        let waited = (cluster.clock.now() - start).num_seconds() - 600;
        assert_eq!(waited, 30 * 60);
    }

    #[tokio::test]
    async fn index_finished_by_local_job_is_reused_after_its_lock_clears() {
        let mut cluster = Cluster::new();
        cluster.config.cache.offline = true;
        let worker = cluster.worker("w1");
        let local_lock = worker.1.dir().join(format!("{REFERENCE}.lock"));
        fs::write(&local_lock, LockMarker::new("sibling-job", cluster.clock.now()).render()).unwrap();

        let sibling = async {
            cluster.clock.sleep(Duration::from_secs(30)).await;
            write_index(&worker.1, DecoyMode::ForwardReverse);
            fs::remove_file(&local_lock).unwrap();
        };
        let ((source, warnings), ()) = tokio::join!(ensure(&worker), sibling);

        assert_eq!(source, IndexSource::Reused);
        assert!(warnings.is_empty(), "{warnings:?}");
        assert_eq!(cluster.builds(), 0);
        assert!(!local_lock.exists());
    }

    #[tokio::test]
    async fn set_published_before_remote_lock_is_fetched() {
        let cluster = Cluster::new();
        let (_, publisher_ref) = cluster.worker("publisher");
        write_index(&publisher_ref, DecoyMode::ForwardReverse);

        // Publication lands after the first pull missed it, as the lock is taken
        let remote = RemoteCache::from_config(&cluster.config, "publisher");
        let lock = cluster.remote_lock();
        let published = Arc::new(AtomicUsize::new(0));
        let hook: Box<dyn FnOnce() + Send> = {
            let published = published.clone();
            let lock = lock.clone();
            Box::new(move || {
                assert!(!lock.exists(), "hook should run before the lock is written");
                remote.publish(&publisher_ref, DecoyMode::ForwardReverse).unwrap();
                published.fetch_add(1, Ordering::SeqCst);
            })
        };
        let clock = Arc::new(HookedClock {
            inner: cluster.clock.clone(),
            on_first_read: Mutex::new(Some(hook)),
        });
        let worker = cluster.worker_with_clock("w2", clock);

        let (source, warnings) = ensure(&worker).await;

        assert_eq!(source, IndexSource::Fetched);
        assert!(warnings.is_empty(), "{warnings:?}");
        assert_eq!(published.load(Ordering::SeqCst), 1);
        assert_eq!(cluster.builds(), 0);
        assert!(!lock.exists());
    }

    #[tokio::test]
    async fn remote_last_used_follows_builds_and_fetches() {
        let cluster = Cluster::new();
        let builder = cluster.worker("w1");

        assert_eq!(ensure(&builder).await.0, IndexSource::Built);
        let after_build = cluster.remote_last_used().expect("marker after build");
        assert_eq!(after_build.timestamp(), cluster.clock.now().timestamp());

        cluster.clock.advance(Duration::from_secs(3 * 3600));
        let fetcher = cluster.worker("w2");
        assert_eq!(ensure(&fetcher).await.0, IndexSource::Fetched);
        let after_fetch = cluster.remote_last_used().expect("marker after fetch");

        assert_eq!(after_fetch.timestamp(), cluster.clock.now().timestamp());
        assert!(after_fetch > after_build);
    }

    #[tokio::test]
    async fn uncopyable_remote_entry_falls_back_to_building() {
        let cluster = Cluster::new();
        assert_eq!(ensure(&cluster.worker("w1")).await.0, IndexSource::Built);

        let entry = cluster.remote_dir().join("ID_000042_FEED.cseq");
        fs::remove_file(&entry).unwrap();
        fs::create_dir_all(entry.join("nested")).unwrap();

        let worker = cluster.worker("w2");
        let (source, _) = ensure(&worker).await;

        assert_eq!(source, IndexSource::Built);
        assert_eq!(cluster.builds(), 2);
        assert!(worker.1.dir().join("ID_000042_FEED.cseq").is_file());
    }
}
