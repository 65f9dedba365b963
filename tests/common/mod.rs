//! Shared test infrastructure for integration tests.
#![allow(dead_code)]

use inventory_enrich::config::{LocalStoreConfig, ServiceConfig, StoreConfig};
use inventory_enrich::lm::ModelQuery;
use inventory_enrich::service::AnalysisContext;
use inventory_enrich::store::LocalStore;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use std::sync::Arc;
use tempfile::TempDir;

pub const INVENTORY_CSV: &str = "\
Asset Name,Owner,Identified ICT Risks,Key Dependencies
Core Banking DB,IT Ops,,Oracle
Payments Hub,Payments,Fraud,n/a
";

/// A throwaway data directory acting as the local store root.
pub struct Workspace {
    dir: TempDir,
}

impl Workspace {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("create temp dir"),
        }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn write(&self, relative: &str, bytes: &[u8]) -> PathBuf {
        let path = self.root().join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create fixture dir");
        }
        fs::write(&path, bytes).expect("write fixture");
        path
    }

    pub fn read_string(&self, relative: &str) -> String {
        fs::read_to_string(self.root().join(relative)).expect("read output")
    }

    pub fn config(&self) -> ServiceConfig {
        ServiceConfig {
            store: StoreConfig::Local(LocalStoreConfig {
                root: self.root().to_path_buf(),
            }),
            ..ServiceConfig::default()
        }
    }

    /// Service context over this workspace with the given model.
    pub fn context(&self, model: Arc<dyn ModelQuery>) -> AnalysisContext {
        AnalysisContext::new(
            self.config(),
            Arc::new(LocalStore::new(self.root())),
            model,
        )
    }

    /// Run the compiled binary inside the workspace with a scrubbed environment.
    pub fn run_bin(&self, args: &[&str], envs: &[(&str, &str)]) -> Output {
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_inventory-enrich"));
        cmd.args(args)
            .current_dir(self.root())
            .env_clear()
            .env("PATH", std::env::var_os("PATH").unwrap_or_default())
            .env("HOME", self.root())
            .env("XDG_CONFIG_HOME", self.root().join(".config"))
            .env("RUST_LOG", "warn");
        for (key, value) in envs {
            cmd.env(key, value);
        }
        cmd.output().expect("run inventory-enrich")
    }
}

/// Model that answers every prompt with a fixed string.
pub fn fixed_model(answer: &'static str) -> Arc<dyn ModelQuery> {
    Arc::new(move |_prompt: &str| -> anyhow::Result<String> { Ok(answer.to_string()) })
}

/// Model that fails every call.
pub fn failing_model(reason: &'static str) -> Arc<dyn ModelQuery> {
    Arc::new(move |_prompt: &str| -> anyhow::Result<String> { Err(anyhow::anyhow!(reason)) })
}

/// Skip a test when a system tool is missing.
pub fn skip_if_missing(tool: &str) -> bool {
    let missing = which::which(tool).is_err();
    if missing {
        eprintln!("Skipping: {tool} not available");
    }
    missing
}
