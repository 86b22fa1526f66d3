//! The project aggregate: metadata, declared packages and at most one
//! virtual environment, persisted through the manifest and lock writers.
//!
//! Nothing is read back from disk. Every process starts from an empty state
//! and only `init`/`add` populate it.

mod error;

use std::path::PathBuf;

use pdpm_core::{LockManager, ManifestStore, PackageSet, PackageSpec, ProjectMetadata};
use pdpm_installer::{
    install_packages, CommandRunner, EnvError, EnvironmentOrchestrator, InstallEvent,
    InstallReport, Platform, ProjectLayout, SystemRunner, VirtualEnvironment,
};

pub use error::{Disposition, ProjectError};

pub type Result<T> = std::result::Result<T, ProjectError>;

#[derive(Debug)]
pub struct ProjectState<R = SystemRunner> {
    metadata: Option<ProjectMetadata>,
    packages: PackageSet,
    interpreter: String,
    environment: Option<VirtualEnvironment>,
    manifest: ManifestStore,
    lock: LockManager,
    orchestrator: EnvironmentOrchestrator<R>,
}

impl ProjectState<SystemRunner> {
    pub fn open(layout: ProjectLayout, interpreter: &str) -> Result<Self> {
        let platform = Platform::current()?;
        let orchestrator = EnvironmentOrchestrator::new(layout, platform, SystemRunner);
        Self::with_orchestrator(orchestrator, interpreter)
    }
}

impl<R: CommandRunner> ProjectState<R> {
    /// Builds an empty state and makes sure the package cache exists.
    pub fn with_orchestrator(
        orchestrator: EnvironmentOrchestrator<R>,
        interpreter: &str,
    ) -> Result<Self> {
        let layout = orchestrator.layout();
        layout.ensure_base_dirs()?;
        let manifest = ManifestStore::new(layout.manifest_path());
        let lock = LockManager::new(layout.lock_path());
        Ok(Self {
            metadata: None,
            packages: PackageSet::new(),
            interpreter: interpreter.to_string(),
            environment: None,
            manifest,
            lock,
            orchestrator,
        })
    }

    pub fn layout(&self) -> &ProjectLayout {
        self.orchestrator.layout()
    }

    pub fn metadata(&self) -> Option<&ProjectMetadata> {
        self.metadata.as_ref()
    }

    pub fn packages(&self) -> &PackageSet {
        &self.packages
    }

    pub fn interpreter(&self) -> &str {
        &self.interpreter
    }

    pub fn environment(&self) -> Option<&VirtualEnvironment> {
        self.environment.as_ref()
    }

    pub fn orchestrator_mut(&mut self) -> &mut EnvironmentOrchestrator<R> {
        &mut self.orchestrator
    }

    /// Replaces the metadata. State is only updated once the manifest is written.
    pub fn init(
        &mut self,
        name: &str,
        author: &str,
        description: &str,
        license: &str,
    ) -> Result<()> {
        let metadata = ProjectMetadata {
            name: name.to_string(),
            author: author.to_string(),
            description: description.to_string(),
            license: license.to_string(),
        };
        self.manifest.save(Some(&metadata), &self.packages)?;
        self.metadata = Some(metadata);
        Ok(())
    }

    pub fn set_interpreter(&mut self, interpreter: &str) {
        tracing::debug!(interpreter, "interpreter selected");
        self.interpreter = interpreter.to_string();
    }

    /// Replaces any previous environment handle.
    pub fn create_environment(&mut self, name: &str) -> Result<&VirtualEnvironment> {
        let env = self.orchestrator.create(&self.interpreter, name)?;
        Ok(&*self.environment.insert(env))
    }

    pub fn activate_environment(&mut self) -> Result<&VirtualEnvironment> {
        let env = self.environment.as_mut().ok_or(EnvError::NoEnvironment)?;
        self.orchestrator.activate(env)?;
        Ok(&*env)
    }

    pub fn deactivate_environment(&mut self) -> Result<&VirtualEnvironment> {
        let env = self.environment.as_mut().ok_or(EnvError::NoEnvironment)?;
        self.orchestrator.deactivate(env)?;
        Ok(&*env)
    }

    /// Accepts `name` (pinned to "latest") or `name==version`.
    pub fn add_package(&mut self, request: &str) -> Result<PackageSpec> {
        let spec = PackageSpec::parse(request)?;
        let mut packages = self.packages.clone();
        if let Some(previous) = packages.insert(spec.clone()) {
            tracing::debug!(package = %spec.name, %previous, "replaced declared version");
        }
        self.commit_packages(packages)?;
        Ok(spec)
    }

    /// Returns whether a package was removed. Absent names are a no-op.
    pub fn remove_package(&mut self, name: &str) -> Result<bool> {
        if !self.packages.contains(name) {
            tracing::debug!(package = name, "not declared; nothing to remove");
            return Ok(false);
        }
        let mut packages = self.packages.clone();
        packages.remove(name);
        self.commit_packages(packages)?;
        Ok(true)
    }

    pub fn update_packages(&mut self) -> Result<()> {
        let mut packages = self.packages.clone();
        packages.reset_to_latest();
        self.commit_packages(packages)
    }

    pub fn list_packages(&self) -> Vec<PackageSpec> {
        self.packages.specs()
    }

    pub fn lock(&self) -> Result<PathBuf> {
        Ok(self.lock.lock(&self.packages)?)
    }

    pub fn install<P>(&mut self, on_event: P) -> Result<InstallReport>
    where
        P: FnMut(InstallEvent<'_>),
    {
        Ok(install_packages(
            &mut self.orchestrator,
            &self.packages,
            self.environment.as_mut(),
            on_event,
        )?)
    }

    // The in-memory set only changes when the manifest write succeeded.
    fn commit_packages(&mut self, packages: PackageSet) -> Result<()> {
        self.manifest.save(self.metadata.as_ref(), &packages)?;
        self.packages = packages;
        Ok(())
    }
}
