//! End-to-end orchestration tests with mock git and provisioner
//!
//! The git driver and provisioner are mocked at their traits; the
//! documentation generator is a planted shell script, so the executor
//! exercises its real child-process path without any external tools.

#![cfg(unix)]

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use async_trait::async_trait;
use docharbor_build::{
    AutoBuildMonitor, BuildExecutor, BuildQueue, CancelFlag, CancelOutcome, ExecutorConfig,
    Layout, MonitorConfig, PublishLocks, QueueConfig, RefsIndex,
};
use docharbor_core::{
    BuildJob, BuildLog, BuildStatus, BuildTrigger, EnvManager, FailureKind, GitAuth,
    NewRepository, NewTarget, RefKind,
};
use docharbor_env::{ProvisionRequest, ProvisionedEnv, Provisioner};
use docharbor_git::{CheckoutRequest, CloneRequest, GitClient, RemoteHeadRequest};
use docharbor_store::Store;
use tempfile::TempDir;
use tokio::time::sleep;

/// Mock git driver: fabricates checkouts on disk and lets tests steer
/// the remote head and observe concurrency.
struct MockGit {
    /// Commit the remote reports for any ref
    remote_head: StdMutex<Option<String>>,
    /// Commit a checkout resolves to
    checkout_commit: StdMutex<String>,
    /// Time spent inside clone, to force build overlap
    clone_delay: Duration,
    active_clones: StdMutex<usize>,
    max_concurrent_clones: StdMutex<usize>,
    max_concurrent_per_slug: StdMutex<HashMap<String, usize>>,
    active_per_slug: StdMutex<HashMap<String, usize>>,
}

impl MockGit {
    fn new() -> Self {
        Self {
            remote_head: StdMutex::new(Some("commit-a".to_string())),
            checkout_commit: StdMutex::new("commit-a".to_string()),
            clone_delay: Duration::ZERO,
            active_clones: StdMutex::new(0),
            max_concurrent_clones: StdMutex::new(0),
            max_concurrent_per_slug: StdMutex::new(HashMap::new()),
            active_per_slug: StdMutex::new(HashMap::new()),
        }
    }

    fn with_clone_delay(mut self, delay: Duration) -> Self {
        self.clone_delay = delay;
        self
    }

    fn set_remote_head(&self, commit: Option<&str>) {
        *self.remote_head.lock().unwrap() = commit.map(String::from);
    }

    fn set_checkout_commit(&self, commit: &str) {
        *self.checkout_commit.lock().unwrap() = commit.to_string();
    }

    fn max_concurrent(&self) -> usize {
        *self.max_concurrent_clones.lock().unwrap()
    }

    fn max_concurrent_for(&self, slug: &str) -> usize {
        self.max_concurrent_per_slug.lock().unwrap().get(slug).copied().unwrap_or(0)
    }

    /// `<data>/repos/<repo>/<slug>/workspaces/<build>/src` → slug
    fn slug_of(dest: &Path) -> String {
        dest.ancestors()
            .nth(3)
            .and_then(|p| p.file_name())
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

#[async_trait]
impl GitClient for MockGit {
    async fn clone_repo(
        &self,
        req: &CloneRequest,
        log: &mut BuildLog,
    ) -> docharbor_git::Result<String> {
        let slug = Self::slug_of(&req.dest);
        {
            let mut active = self.active_clones.lock().unwrap();
            *active += 1;
            let mut max = self.max_concurrent_clones.lock().unwrap();
            *max = (*max).max(*active);
            let mut per = self.active_per_slug.lock().unwrap();
            let count = per.entry(slug.clone()).or_insert(0);
            *count += 1;
            let mut per_max = self.max_concurrent_per_slug.lock().unwrap();
            let entry = per_max.entry(slug.clone()).or_insert(0);
            *entry = (*entry).max(*count);
        }

        std::fs::create_dir_all(req.dest.join("docs")).unwrap();
        std::fs::write(
            req.dest.join("pyproject.toml"),
            "[project]\nname = \"widget\"\nversion = \"9.9.9\"\ndescription = \"demo\"\n",
        )
        .unwrap();
        log.append_line(&format!("mock clone of {}", req.url)).unwrap();

        if !self.clone_delay.is_zero() {
            sleep(self.clone_delay).await;
        }

        {
            *self.active_clones.lock().unwrap() -= 1;
            *self.active_per_slug.lock().unwrap().get_mut(&slug).unwrap() -= 1;
        }
        Ok("default-head".to_string())
    }

    async fn checkout(
        &self,
        req: &CheckoutRequest,
        log: &mut BuildLog,
    ) -> docharbor_git::Result<String> {
        let commit = self.checkout_commit.lock().unwrap().clone();
        log.append_line(&format!("mock checkout of {} {}", req.ref_kind, req.ref_name)).unwrap();
        Ok(commit)
    }

    async fn remote_head(
        &self,
        _req: &RemoteHeadRequest,
    ) -> docharbor_git::Result<Option<String>> {
        Ok(self.remote_head.lock().unwrap().clone())
    }

    async fn list_remote_refs(
        &self,
        _url: &str,
        _ref_kind: RefKind,
        _auth: &GitAuth,
        _verify_tls: bool,
    ) -> docharbor_git::Result<Vec<String>> {
        Ok(vec!["main".to_string()])
    }
}

const GENERATOR_OK: u8 = 0;
const GENERATOR_FAILS: u8 = 1;
const GENERATOR_SILENT: u8 = 2;

/// Mock provisioner: plants an executable `sphinx-build` shell script
/// so the executor's real generator invocation runs.
struct MockProvisioner {
    mode: AtomicU8,
}

impl MockProvisioner {
    fn new() -> Self {
        Self { mode: AtomicU8::new(GENERATOR_OK) }
    }

    fn set_mode(&self, mode: u8) {
        self.mode.store(mode, Ordering::SeqCst);
    }

    fn script(&self) -> &'static str {
        match self.mode.load(Ordering::SeqCst) {
            GENERATOR_FAILS => "#!/bin/sh\necho 'sphinx exploded' >&2\nexit 1\n",
            GENERATOR_SILENT => "#!/bin/sh\nexit 0\n",
            _ => concat!(
                "#!/bin/sh\n",
                "mkdir -p \"$4\"\n",
                "printf '<html><body>docs for %s</body></html>' \"$3\" > \"$4/index.html\"\n",
            ),
        }
    }
}

#[async_trait]
impl Provisioner for MockProvisioner {
    async fn provision(
        &self,
        req: &ProvisionRequest,
        log: &mut BuildLog,
    ) -> docharbor_env::Result<ProvisionedEnv> {
        use std::os::unix::fs::PermissionsExt;

        let bin = req.env_dir.join("bin");
        std::fs::create_dir_all(&bin)?;
        let script = bin.join("sphinx-build");
        std::fs::write(&script, self.script())?;
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755))?;
        log.append_line(&format!("mock provision ({})", req.backend))?;
        Ok(ProvisionedEnv { bin_dir: bin })
    }
}

struct Harness {
    _tmp: TempDir,
    layout: Layout,
    store: Arc<Store>,
    git: Arc<MockGit>,
    provisioner: Arc<MockProvisioner>,
    executor: Arc<BuildExecutor>,
    queue: Arc<BuildQueue>,
}

fn harness_with(git: MockGit, workers: usize) -> Harness {
    let tmp = TempDir::new().unwrap();
    let layout = Layout::new(tmp.path());
    let store = Arc::new(Store::open_in_memory().unwrap());
    let git = Arc::new(git);
    let provisioner = Arc::new(MockProvisioner::new());

    let executor = Arc::new(BuildExecutor::new(
        Arc::clone(&store),
        git.clone() as Arc<dyn GitClient>,
        provisioner.clone() as Arc<dyn Provisioner>,
        layout.clone(),
        PublishLocks::new(),
        ExecutorConfig {
            doc_build_timeout: Duration::from_secs(30),
            default_env_manager: EnvManager::Uv,
        },
    ));
    let queue = BuildQueue::new(
        Arc::clone(&store),
        Arc::clone(&executor),
        QueueConfig { workers, poll_interval: Duration::from_millis(200) },
    );

    Harness { _tmp: tmp, layout, store, git, provisioner, executor, queue }
}

fn harness() -> Harness {
    harness_with(MockGit::new(), 2)
}

impl Harness {
    fn add_repo(&self, name: &str) -> i64 {
        self.store
            .create_repository(&NewRepository::new(name, format!("https://x/{name}.git")))
            .unwrap()
            .id
    }

    fn add_target(&self, repo: i64, kind: RefKind, name: &str) -> i64 {
        self.store.create_target(&NewTarget::new(repo, kind, name)).unwrap().id
    }

    async fn wait_terminal(&self, build_id: i64) -> BuildJob {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
        loop {
            let job = self.store.build(build_id).unwrap();
            if job.status.is_terminal() {
                return job;
            }
            assert!(
                tokio::time::Instant::now() < deadline,
                "build {build_id} stuck in {:?}",
                job.status
            );
            sleep(Duration::from_millis(25)).await;
        }
    }
}

#[tokio::test]
async fn manual_build_succeeds_end_to_end() {
    let h = harness();
    let repo = h.add_repo("widget");
    let target = h.add_target(repo, RefKind::Branch, "main");

    h.queue.start();
    let job = h.queue.enqueue(target, BuildTrigger::Manual).unwrap();
    let done = h.wait_terminal(job.id).await;
    h.queue.shutdown().await;

    assert_eq!(done.status, BuildStatus::Succeeded);
    assert_eq!(done.commit_sha.as_deref(), Some("commit-a"));
    assert!(done.duration_secs.unwrap() >= 0.0);

    // the artifact is served from the stable path, snippet included
    let index = h.layout.artifact_dir(repo, "main").join("index.html");
    let html = std::fs::read_to_string(&index).unwrap();
    assert!(html.contains("docs for"));
    assert!(html.contains("window.DOCHARBOR_TARGET = \"main\""));
    assert!(html.contains("window.DOCHARBOR_VERSION = \"9.9.9\""));

    // the log captured every stage
    let log = std::fs::read_to_string(done.log_path.unwrap()).unwrap();
    assert!(log.contains("mock clone"));
    assert!(log.contains("mock provision"));
    assert!(log.contains("published main"));

    // bookkeeping: commit advanced, workspace gone, refs index updated
    let t = h.store.target(target).unwrap();
    assert_eq!(t.last_built_commit.as_deref(), Some("commit-a"));
    assert_eq!(t.latest_successful_build_id, Some(done.id));
    assert!(!done.workspace_path.unwrap().exists());

    let refs: RefsIndex =
        serde_json::from_str(&std::fs::read_to_string(h.layout.refs_index_path(repo)).unwrap())
            .unwrap();
    assert!(refs.targets.iter().any(|t| t.slug == "main" && t.has_artifact));
}

#[tokio::test]
async fn two_targets_of_one_repo_build_in_parallel() {
    let h = harness_with(MockGit::new().with_clone_delay(Duration::from_millis(150)), 2);
    let repo = h.add_repo("widget");
    let main = h.add_target(repo, RefKind::Branch, "main");
    let tag = h.add_target(repo, RefKind::Tag, "v1");

    h.queue.start();
    let a = h.queue.enqueue(main, BuildTrigger::Manual).unwrap();
    let b = h.queue.enqueue(tag, BuildTrigger::Manual).unwrap();
    let a = h.wait_terminal(a.id).await;
    let b = h.wait_terminal(b.id).await;
    h.queue.shutdown().await;

    assert_eq!(a.status, BuildStatus::Succeeded);
    assert_eq!(b.status, BuildStatus::Succeeded);
    assert!(h.git.max_concurrent() >= 2, "builds did not overlap");

    assert!(h.layout.artifact_dir(repo, "main").join("index.html").exists());
    assert!(h.layout.artifact_dir(repo, "v1").join("index.html").exists());

    // no log contamination between the two builds
    let log_a = std::fs::read_to_string(a.log_path.unwrap()).unwrap();
    let log_b = std::fs::read_to_string(b.log_path.unwrap()).unwrap();
    assert!(log_a.contains("branch main") && !log_a.contains("tag v1"));
    assert!(log_b.contains("tag v1") && !log_b.contains("branch main"));
}

#[tokio::test]
async fn same_target_builds_never_overlap() {
    let h = harness_with(MockGit::new().with_clone_delay(Duration::from_millis(120)), 2);
    let repo = h.add_repo("widget");
    let target = h.add_target(repo, RefKind::Branch, "main");

    h.queue.start();
    let first = h.queue.enqueue(target, BuildTrigger::Manual).unwrap();
    let second = h.queue.enqueue(target, BuildTrigger::Manual).unwrap();
    let first = h.wait_terminal(first.id).await;
    let second = h.wait_terminal(second.id).await;
    h.queue.shutdown().await;

    assert_eq!(first.status, BuildStatus::Succeeded);
    assert_eq!(second.status, BuildStatus::Succeeded);
    assert_eq!(h.git.max_concurrent_for("main"), 1, "per-target exclusion violated");
}

#[tokio::test]
async fn failed_generator_keeps_previous_artifact() {
    let h = harness();
    let repo = h.add_repo("widget");
    let target = h.add_target(repo, RefKind::Branch, "main");

    h.queue.start();
    let good = h.queue.enqueue(target, BuildTrigger::Manual).unwrap();
    let good = h.wait_terminal(good.id).await;
    assert_eq!(good.status, BuildStatus::Succeeded);

    // the remote advances but the generator now breaks
    h.git.set_checkout_commit("commit-b");
    h.provisioner.set_mode(GENERATOR_FAILS);
    let bad = h.queue.enqueue(target, BuildTrigger::Manual).unwrap();
    let bad = h.wait_terminal(bad.id).await;
    h.queue.shutdown().await;

    assert_eq!(bad.status, BuildStatus::Failed);
    assert_eq!(bad.error_kind, Some(FailureKind::DocBuildFailed));
    assert!(!bad.workspace_path.unwrap().exists());

    // generator stderr was captured into the log
    let log = std::fs::read_to_string(bad.log_path.unwrap()).unwrap();
    assert!(log.contains("sphinx exploded"));
    assert!(log.contains("doc_build_failed"));

    // the previous artifact is still served and the commit untouched
    let html = std::fs::read_to_string(h.layout.artifact_dir(repo, "main").join("index.html"))
        .unwrap();
    assert!(html.contains("docs for"));
    let t = h.store.target(target).unwrap();
    assert_eq!(t.last_built_commit.as_deref(), Some("commit-a"));
    assert_eq!(t.latest_successful_build_id, Some(good.id));
}

#[tokio::test]
async fn generator_without_output_fails_publication() {
    let h = harness();
    let repo = h.add_repo("widget");
    let target = h.add_target(repo, RefKind::Branch, "main");
    h.provisioner.set_mode(GENERATOR_SILENT);

    h.queue.start();
    let job = h.queue.enqueue(target, BuildTrigger::Manual).unwrap();
    let job = h.wait_terminal(job.id).await;
    h.queue.shutdown().await;

    assert_eq!(job.status, BuildStatus::Failed);
    assert_eq!(job.error_kind, Some(FailureKind::PublishFailed));
    assert!(!h.layout.artifact_dir(repo, "main").exists());
    assert_eq!(h.store.target(target).unwrap().last_built_commit, None);
}

#[tokio::test]
async fn main_target_build_updates_repository_metadata() {
    let h = harness();
    let repo = h.add_repo("widget");
    let target = h.add_target(repo, RefKind::Branch, "main");
    h.store.set_main_target(repo, Some(target)).unwrap();

    h.queue.start();
    let job = h.queue.enqueue(target, BuildTrigger::Manual).unwrap();
    h.wait_terminal(job.id).await;
    h.queue.shutdown().await;

    let repo = h.store.repository(repo).unwrap();
    assert_eq!(repo.project_name.as_deref(), Some("widget"));
    assert_eq!(repo.project_version.as_deref(), Some("9.9.9"));
    assert_eq!(repo.project_summary.as_deref(), Some("demo"));
}

#[tokio::test]
async fn non_main_target_leaves_repository_metadata_alone() {
    let h = harness();
    let repo = h.add_repo("widget");
    let target = h.add_target(repo, RefKind::Branch, "main");
    // main target designation points elsewhere
    let other = h.add_target(repo, RefKind::Tag, "v1");
    h.store.set_main_target(repo, Some(other)).unwrap();

    h.queue.start();
    let job = h.queue.enqueue(target, BuildTrigger::Manual).unwrap();
    h.wait_terminal(job.id).await;
    h.queue.shutdown().await;

    assert_eq!(h.store.repository(repo).unwrap().project_version, None);
}

#[tokio::test]
async fn queued_build_can_be_cancelled() {
    let h = harness();
    let repo = h.add_repo("widget");
    let target = h.add_target(repo, RefKind::Branch, "main");

    // workers are not started, so the job stays queued
    let job = h.queue.enqueue(target, BuildTrigger::Manual).unwrap();
    assert_eq!(h.queue.cancel(job.id).unwrap(), CancelOutcome::CancelledQueued);
    assert_eq!(h.store.build(job.id).unwrap().status, BuildStatus::Cancelled);
    assert_eq!(h.queue.cancel(job.id).unwrap(), CancelOutcome::AlreadyFinished);
}

#[tokio::test]
async fn cancellation_before_dispatch_stops_at_first_boundary() {
    let h = harness();
    let repo = h.add_repo("widget");
    let target = h.add_target(repo, RefKind::Branch, "main");

    h.queue.enqueue(target, BuildTrigger::Manual).unwrap();
    let claimed = h.store.claim_next_queued().unwrap().unwrap();

    let flag = CancelFlag::new();
    flag.cancel();
    h.executor.run(claimed.clone(), flag).await;

    let job = h.store.build(claimed.id).unwrap();
    assert_eq!(job.status, BuildStatus::Cancelled);
    assert_eq!(job.error_kind, None);
    assert!(!h.layout.artifact_dir(repo, "main").exists());
}

#[tokio::test]
async fn monitor_enqueues_once_and_deduplicates() {
    let h = harness();
    let repo = h.add_repo("widget");
    let target = h.add_target(repo, RefKind::Branch, "main");

    let monitor = AutoBuildMonitor::new(
        Arc::clone(&h.store),
        h.git.clone() as Arc<dyn GitClient>,
        Arc::clone(&h.queue),
        MonitorConfig { interval: Duration::from_secs(60) },
    );

    // no last built commit: the first sweep enqueues with trigger auto
    monitor.sweep().await;
    let builds = h.store.recent_builds(10).unwrap();
    assert_eq!(builds.len(), 1);
    assert_eq!(builds[0].triggered_by, BuildTrigger::Auto);

    // while that job is queued (and later running), sweeps are silent
    monitor.sweep().await;
    assert_eq!(h.store.recent_builds(10).unwrap().len(), 1);

    let running = h.store.claim_next_queued().unwrap().unwrap();
    monitor.sweep().await;
    assert_eq!(h.store.recent_builds(10).unwrap().len(), 1);

    // finished at commit-a and the remote unchanged: still silent
    h.store.finish_build(running.id, BuildStatus::Succeeded, None, None).unwrap();
    h.store.record_successful_build(target, running.id, "commit-a").unwrap();
    monitor.sweep().await;
    assert_eq!(h.store.recent_builds(10).unwrap().len(), 1);

    // the remote advances: exactly one new auto build
    h.git.set_remote_head(Some("commit-b"));
    monitor.sweep().await;
    let builds = h.store.recent_builds(10).unwrap();
    assert_eq!(builds.len(), 2);
    assert_eq!(builds[0].triggered_by, BuildTrigger::Auto);
    assert_eq!(builds[0].status, BuildStatus::Queued);
}

#[tokio::test]
async fn monitor_skips_targets_whose_ref_disappeared() {
    let h = harness();
    let repo = h.add_repo("widget");
    h.add_target(repo, RefKind::Branch, "main");

    h.git.set_remote_head(None);
    let monitor = AutoBuildMonitor::new(
        Arc::clone(&h.store),
        h.git.clone() as Arc<dyn GitClient>,
        Arc::clone(&h.queue),
        MonitorConfig::default(),
    );
    monitor.sweep().await;
    assert!(h.store.recent_builds(10).unwrap().is_empty());
}
