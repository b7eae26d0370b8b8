//! End-to-end runtime flow for a binary that links exactly one `#[app]`.

use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use appkit::runtime::{build, load_app, prepare_dev, Installer, RunOptions, RuntimeError};
use appkit::{AppType, Registry};
use appkit_bootstrap::cache::BUILD_MARKER;
use appkit_bootstrap::config::AppConfig;
use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;
use utoipa::ToSchema;

static WEIGHTS_DOWNLOADED: AtomicUsize = AtomicUsize::new(0);

#[derive(Deserialize, ToSchema)]
pub struct TwoNumbers {
    a: f64,
    b: f64,
}

#[derive(Serialize, ToSchema)]
pub struct Sum {
    result: f64,
}

#[derive(Default)]
pub struct Adder {
    ready: AtomicBool,
}

#[appkit::app(name = "adder", requirements = ["numpy>=1.26"])]
impl Adder {
    fn setup(&mut self) {
        self.ready.store(true, Ordering::SeqCst);
    }

    fn download_weights(&self) -> anyhow::Result<()> {
        WEIGHTS_DOWNLOADED.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    #[endpoint]
    fn add(&self, input: TwoNumbers) -> anyhow::Result<Sum> {
        anyhow::ensure!(self.ready.load(Ordering::SeqCst), "setup() has not run");
        Ok(Sum {
            result: input.a + input.b,
        })
    }
}

const SOURCE: &str = r#"
#[appkit::app(name = "adder", requirements = ["numpy>=1.26"])]
impl Adder {}
"#;

#[derive(Default)]
struct Recording {
    installs: Mutex<Vec<Vec<String>>>,
}

#[appkit::async_trait]
impl Installer for Recording {
    async fn install(&self, requirements: &[String], cache_dir: &Path) -> anyhow::Result<()> {
        assert!(cache_dir.is_dir());
        self.installs.lock().push(requirements.to_vec());
        Ok(())
    }
}

struct Workspace {
    _tmp: TempDir,
    source: std::path::PathBuf,
    cache: std::path::PathBuf,
}

impl Workspace {
    fn new() -> Self {
        let tmp = tempfile::tempdir().unwrap();
        let source = tmp.path().join("adder.rs");
        fs::write(&source, SOURCE).unwrap();
        let cache = tmp.path().join("cache");
        fs::create_dir(&cache).unwrap();
        Self {
            _tmp: tmp,
            source,
            cache,
        }
    }

    fn options(&self, installer: Arc<Recording>) -> RunOptions {
        let mut config = AppConfig::default();
        config.cache_dir = Some(self.cache.to_string_lossy().to_string());
        config.server.host = "127.0.0.1".to_string();
        config.server.port = 0;
        RunOptions::new(&self.source, config).with_installer(installer)
    }
}

#[test]
fn load_app_finds_the_linked_app() {
    let registry = Registry::new();
    let app = load_app(&registry).unwrap();
    assert_eq!(app, AppType::of::<Adder>());
    assert_eq!(registry.registered().unwrap().name, "adder");

    // A second load cycle starts from a clean slate.
    assert_eq!(load_app(&registry).unwrap(), app);
}

#[tokio::test]
async fn build_then_dev_serves_the_app() {
    let ws = Workspace::new();
    let installer = Arc::new(Recording::default());

    let err = prepare_dev(ws.options(installer.clone())).await.err().unwrap();
    assert!(matches!(err, RuntimeError::NotBuilt { .. }), "{err}");

    let before = WEIGHTS_DOWNLOADED.load(Ordering::SeqCst);
    let report = build(ws.options(installer.clone())).await.unwrap();
    assert_eq!(report.app_name, "adder");
    assert_eq!(report.requirements, vec!["numpy>=1.26"]);
    assert_eq!(report.marker, ws.cache.join(BUILD_MARKER));
    assert!(report.marker.is_file());
    assert!(WEIGHTS_DOWNLOADED.load(Ordering::SeqCst) > before);

    let server = prepare_dev(ws.options(installer.clone())).await.unwrap();
    assert!(server.service().is_ready());
    assert_eq!(server.endpoints(), vec!["POST /add"]);
    assert_eq!(installer.installs.lock().len(), 2);

    let req = Request::post("/add")
        .header("content-type", "application/json")
        .body(Body::from(json!({"a": 5, "b": 3}).to_string()))
        .unwrap();
    let res = server.router().oneshot(req).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body, json!({"result": 8.0}));
}
