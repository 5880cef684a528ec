//! Runtime engine that drives containers through their lifecycle.
//!
//! `running → stopped` on stop, `running | stopped → removed` on remove; a
//! running container is only removed with force, which stops it first.
//! Stopped containers are never restarted.

use std::path::{Path, PathBuf};

use minibox_common::config::RuntimeConfig;
use minibox_common::error::{MiniboxError, Result};
use minibox_common::types::{ContainerId, ContainerInfo, ContainerStatus, ResourceConfig};
use minibox_core::cgroup::CgroupManager;
use minibox_core::namespace::NamespaceConfig;
use minibox_image::layer::pack_directory;
use minibox_image::storage::LayeredStorage;
use minibox_network::attach;
use minibox_network::driver::NetworkRegistry;

use crate::logs;
use crate::process::{self, InitProcess, InitSpec};
use crate::state::StateStore;

/// Everything needed to create a container.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Run in the background with output sent to the log file.
    pub detach: bool,
    /// Container name; defaults to the id.
    pub name: String,
    /// Image the root filesystem is built from.
    pub image: String,
    /// User command and arguments.
    pub command: Vec<String>,
    /// Resource limits for the runtime cgroup.
    pub resources: ResourceConfig,
    /// `host:container` volume, or empty.
    pub volume: String,
    /// `hostPort:containerPort` pairs.
    pub port_mapping: Vec<String>,
    /// Network to attach to, if any.
    pub network: Option<String>,
}

/// How a run ended from the caller's point of view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// An interactive container exited and was cleaned up.
    Exited {
        /// Container id.
        id: ContainerId,
        /// Exit code of the init process.
        code: i32,
    },
    /// A detached container is running.
    Detached {
        /// Container id.
        id: ContainerId,
        /// Host pid of the init process.
        pid: i32,
    },
}

/// The runtime engine that coordinates all container operations.
#[derive(Debug, Clone)]
pub struct Engine {
    config: RuntimeConfig,
    state: StateStore,
    storage: LayeredStorage,
    networks: NetworkRegistry,
}

impl Engine {
    /// Creates an engine over the runtime root of `config`.
    #[must_use]
    pub fn new(config: RuntimeConfig) -> Self {
        Self {
            state: StateStore::from_config(&config),
            storage: LayeredStorage::from_config(&config),
            networks: NetworkRegistry::from_config(&config),
            config,
        }
    }

    /// Runtime configuration.
    #[must_use]
    pub const fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Network drivers and state.
    #[must_use]
    pub const fn networks(&self) -> &NetworkRegistry {
        &self.networks
    }

    /// Container metadata store.
    #[must_use]
    pub const fn state(&self) -> &StateStore {
        &self.state
    }

    /// Creates and starts a container.
    ///
    /// Interactive runs block until the container exits and then remove
    /// its storage, cgroup, address and record. Detached runs return once
    /// the command has been handed to the container.
    ///
    /// # Errors
    ///
    /// Returns an error if the command is empty, the volume is malformed,
    /// the image is missing, or the container cannot be started. Resource
    /// limit and network attach failures are logged, not returned.
    pub fn run(&self, options: &RunOptions) -> Result<RunOutcome> {
        if options.command.is_empty() {
            return Err(MiniboxError::Config {
                message: "no command given".into(),
            });
        }
        let id = ContainerId::generate();
        let layers = self
            .storage
            .prepare(id.as_str(), &options.image, &options.volume)?;

        let mut init = match self.start_init(&id, &layers.merged, options.detach) {
            Ok(init) => init,
            Err(e) => {
                self.discard(&id, &options.volume);
                return Err(e);
            }
        };
        let pid = init.pid();

        let mut info =
            ContainerInfo::running(id.clone(), pid.unsigned_abs(), &options.name, &options.command);
        info.volume.clone_from(&options.volume);
        info.port_mapping.clone_from(&options.port_mapping);
        info.image.clone_from(&options.image);
        if let Err(e) = self.state.save(&info) {
            let _ = process::terminate(pid);
            self.discard(&id, &options.volume);
            return Err(e);
        }

        let mut cgroup = CgroupManager::new(self.config.cgroup_name.as_str());
        let _ = cgroup.set(options.resources.clone());
        let _ = cgroup.apply(pid.unsigned_abs());

        if let Some(network) = &options.network {
            self.connect(&mut info, network);
        }

        if let Err(e) = init.send_command(&options.command) {
            let _ = process::terminate(pid);
            self.release_network(&info);
            let _ = cgroup.destroy();
            self.discard(&id, &options.volume);
            return Err(e);
        }
        tracing::info!(id = %id, pid, detach = options.detach, "container running");

        if options.detach {
            return Ok(RunOutcome::Detached { id, pid });
        }

        let code = exit_code(&id, init.wait());
        self.release_network(&info);
        let _ = self.storage.teardown(id.as_str(), &info.volume);
        let _ = cgroup.destroy();
        if let Err(e) = self.state.delete(id.as_str()) {
            tracing::error!(id = %id, error = %e, "container record not removed");
        }
        Ok(RunOutcome::Exited { id, code })
    }

    fn start_init(&self, id: &ContainerId, root: &Path, detach: bool) -> Result<InitProcess> {
        let log = if detach {
            let path = logs::log_path(&self.state.container_dir(id.as_str()), id.as_str());
            Some(logs::create_log(&path)?)
        } else {
            None
        };
        process::spawn(InitSpec {
            root,
            namespaces: NamespaceConfig::default(),
            log,
        })
    }

    /// Undoes a partially created container.
    fn discard(&self, id: &ContainerId, volume: &str) {
        let _ = self.storage.teardown(id.as_str(), volume);
        if let Err(e) = self.state.delete(id.as_str()) {
            tracing::error!(id = %id, error = %e, "container record not removed");
        }
    }

    fn connect(&self, info: &mut ContainerInfo, network: &str) {
        match attach::attach(&self.networks, network, info) {
            Ok(endpoint) => {
                info.network = network.to_string();
                info.ip_address = endpoint.ip_address.to_string();
                if let Err(e) = self.state.save(info) {
                    tracing::error!(id = %info.id, error = %e, "network not recorded");
                }
            }
            Err(e) => tracing::error!(id = %info.id, network, error = %e, "network attach failed"),
        }
    }

    fn release_network(&self, info: &ContainerInfo) {
        if let Err(e) = attach::release(&self.networks, info) {
            tracing::warn!(id = %info.id, error = %e, "address not released");
        }
    }

    /// Loads container `id`, reporting a running record whose process is
    /// gone as exited.
    ///
    /// # Errors
    ///
    /// Returns `MiniboxError::NotFound` if there is no such container.
    pub fn inspect(&self, id: &str) -> Result<ContainerInfo> {
        self.state.load(id).map(refresh_status)
    }

    /// Lists every container, with the same status refresh as [`Self::inspect`].
    ///
    /// # Errors
    ///
    /// Returns an error if the containers directory cannot be read.
    pub fn list(&self) -> Result<Vec<ContainerInfo>> {
        Ok(self.state.list()?.into_iter().map(refresh_status).collect())
    }

    /// Returns the log of detached container `id`.
    ///
    /// # Errors
    ///
    /// Returns an error if the container or its log does not exist.
    pub fn logs(&self, id: &str) -> Result<String> {
        let _ = self.state.load(id)?;
        logs::read_logs(&logs::log_path(&self.state.container_dir(id), id))
    }

    /// Runs `command` inside running container `id` and returns its exit code.
    ///
    /// # Errors
    ///
    /// Returns an error if the container is not running or the helper fails.
    pub fn exec(&self, id: &str, command: &[String]) -> Result<i32> {
        let info = self.inspect(id)?;
        let pid = running_pid(&info)?;
        crate::exec::exec_in_container(pid, command)
    }

    /// Sends SIGTERM to container `id` and marks it stopped.
    ///
    /// # Errors
    ///
    /// Returns an error if the container does not exist, is not running, or
    /// cannot be signalled.
    pub fn stop(&self, id: &str) -> Result<()> {
        let mut info = self.state.load(id)?;
        if info.status != ContainerStatus::Running {
            return Err(MiniboxError::InvalidState {
                id: id.to_string(),
                message: format!("is {}, not running", info.status),
            });
        }
        if let Some(pid) = info.pid() {
            process::terminate(pid)?;
        }
        info.status = ContainerStatus::Stopped;
        info.pid = String::new();
        self.state.save(&info)?;
        tracing::info!(id, "container stopped");
        Ok(())
    }

    /// Removes container `id`: its address, storage and record.
    ///
    /// # Errors
    ///
    /// Returns an error if the container does not exist, or is running and
    /// `force` is not set. Cleanup failures are logged.
    pub fn remove(&self, id: &str, force: bool) -> Result<()> {
        let info = self.inspect(id)?;
        if info.status == ContainerStatus::Running {
            if !force {
                return Err(MiniboxError::InvalidState {
                    id: id.to_string(),
                    message: "is running; stop it first or force removal".into(),
                });
            }
            self.stop(id)?;
        }

        self.release_network(&info);
        let failures = self.storage.teardown(id, &info.volume);
        if !failures.is_empty() {
            tracing::warn!(id, failures = failures.len(), "workspace not fully removed");
        }
        self.state.delete(id)?;
        tracing::info!(id, "container removed");
        Ok(())
    }

    /// Packs the root filesystem of container `id` into image `image`.
    ///
    /// # Errors
    ///
    /// Returns an error if the container or its root is missing, or the
    /// image archive already exists.
    pub fn commit(&self, id: &str, image: &str) -> Result<PathBuf> {
        let _ = self.state.load(id)?;
        let merged = self.storage.merged_dir(id);
        if !merged.is_dir() {
            return Err(MiniboxError::NotFound {
                kind: "container root",
                id: merged.display().to_string(),
            });
        }
        let archive = self.config.image_archive(image);
        pack_directory(&merged, &archive)?;
        tracing::info!(id, image, archive = %archive.display(), "container committed");
        Ok(archive)
    }
}

/// Exit code of an interactive container. A failed wait counts as exit
/// status 1 so cleanup still runs.
fn exit_code(id: &ContainerId, waited: Result<i32>) -> i32 {
    match waited {
        Ok(code) => {
            tracing::info!(id = %id, code, "container exited");
            code
        }
        Err(e) => {
            tracing::error!(id = %id, error = %e, "waiting for container failed");
            1
        }
    }
}

fn refresh_status(mut info: ContainerInfo) -> ContainerInfo {
    if info.status == ContainerStatus::Running && !info.pid().is_some_and(process::is_alive) {
        info.status = ContainerStatus::Exited;
    }
    info
}

fn running_pid(info: &ContainerInfo) -> Result<i32> {
    match (info.status, info.pid()) {
        (ContainerStatus::Running, Some(pid)) => Ok(pid),
        _ => Err(MiniboxError::InvalidState {
            id: info.id.to_string(),
            message: format!("is {}, not running", info.status),
        }),
    }
}
