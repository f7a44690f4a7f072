//! Top-level orchestration: wires configuration, the lookup-module
//! registry, the master map, the signal thread and the kernel-channel
//! poll loop together (spec §4.D, §4.F, §4.G).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};

use automount_core::adapters::{Clock, KernelChannel, NsswitchReader};
use automount_core::config::DaemonConfig;
use automount_core::master::MasterMap;
use automount_core::state_machine::KernelRequest;
use automount_core::time::Age;

use crate::adapters::{FileNsswitchReader, LinuxMountExecutor, NullKernelChannel, SunMapParser, SystemClock};
use crate::callbacks::DaemonWorkerCallbacks;
use crate::cli::Args;
use crate::direct_mount::LoggingDirectMountRegistrar;

/// Reads the master map at `path` via `automount-lookup`'s `file` backend,
/// the same entry point the NSS pipeline uses for a forced `file` source
/// (spec §4.B item 1 "takes an absolute pathname as its first argument").
fn read_master_map(
    registry: &automount_core::lookup::LookupModuleRegistry,
    master: &MasterMap,
    path: &str,
    age: Age,
) -> std::io::Result<()> {
    let argv = [path.to_string()];
    match registry.open("file", "sun", &argv) {
        Ok(Some(module)) => match module.read_master(master, age) {
            Ok(_) => Ok(()),
            Err(err) => Err(std::io::Error::other(err.to_string())),
        },
        Ok(None) => Err(std::io::Error::other("file lookup module unavailable")),
        Err(err) => Err(std::io::Error::other(err.to_string())),
    }
}

/// Finds the master entry whose path is the longest prefix of `name`
/// (the kernel hands us a path under some registered indirect or direct
/// mount root, not the entry path itself).
fn route_kernel_request(master: &MasterMap, name: &str) -> Option<Arc<automount_core::master::MasterEntry>> {
    master
        .entries_snapshot()
        .into_iter()
        .filter(|e| name == e.path || name.starts_with(&format!("{}/", e.path.trim_end_matches('/'))))
        .max_by_key(|e| e.path.len())
}

pub fn run(args: Args) -> std::io::Result<()> {
    let mut config = DaemonConfig::from_env();
    if let Some(path) = &args.nsswitch_path {
        config.nsswitch_path = path.into();
    }

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let now_fn: Arc<dyn Fn() -> Age + Send + Sync> = {
        let clock = clock.clone();
        Arc::new(move || clock.now())
    };

    let nsswitch_reader = FileNsswitchReader::new(
        config.nsswitch_path.to_string_lossy().into_owned(),
        config.nsswitch_database.clone(),
    );
    let nss_sources = Arc::new(nsswitch_reader.parse().unwrap_or_else(|err| {
        warn!(%err, "failed to read nsswitch configuration, falling back to no sources");
        Vec::new()
    }));

    let registry = Arc::new(automount_lookup::default_registry(config.default_timeout, config.browse_mode));
    let master = Arc::new(MasterMap::new());

    let callbacks: Arc<dyn automount_core::state_machine::WorkerCallbacks> = Arc::new(DaemonWorkerCallbacks {
        master: master.clone(),
        registry: registry.clone(),
        nss_sources: nss_sources.clone(),
        mount_executor: Arc::new(LinuxMountExecutor),
        parser: Arc::new(SunMapParser),
    });
    let registrar: Arc<dyn automount_core::automount_point::DirectMountRegistrar> =
        Arc::new(LoggingDirectMountRegistrar);

    let epoch = Arc::new(AtomicU64::new(1));
    let initial_age = epoch.load(Ordering::SeqCst);
    read_master_map(&registry, &master, &args.master, initial_age)?;
    master.mount_mounts(initial_age, true, callbacks.clone(), Some(registrar.clone()), now_fn.clone());

    let reload: Arc<dyn Fn() + Send + Sync> = {
        let registry = registry.clone();
        let master = master.clone();
        let callbacks = callbacks.clone();
        let registrar = registrar.clone();
        let now_fn = now_fn.clone();
        let epoch = epoch.clone();
        let master_path = args.master.clone();
        Arc::new(move || {
            let age = epoch.fetch_add(1, Ordering::SeqCst) + 1;
            if let Err(err) = read_master_map(&registry, &master, &master_path, age) {
                error!(%err, "failed to reload master map");
                return;
            }
            master.mount_mounts(age, true, callbacks.clone(), Some(registrar.clone()), now_fn.clone());
        })
    };

    crate::signals::spawn_signal_thread(master.clone(), reload)?;

    let kernel_channel: Arc<dyn KernelChannel> = Arc::new(NullKernelChannel);
    info!("automountd ready");
    poll_kernel_channel(&master, &*kernel_channel);
    Ok(())
}

/// The main-thread loop: routes `(token, path)` requests to the owning
/// `AutomountPoint`'s worker (spec §4.G). `NullKernelChannel::recv`
/// always returns `Ok(None)`, so in this build the loop idles, parking
/// the main thread while the signal thread and worker threads do the
/// actual work.
fn poll_kernel_channel(master: &MasterMap, channel: &dyn KernelChannel) {
    loop {
        match channel.recv() {
            Ok(Some((token, name))) => {
                let Some(entry) = route_kernel_request(master, &name) else {
                    warn!(%name, "no master entry matches kernel request");
                    let _ = channel.respond(token, libc::ENOENT);
                    continue;
                };
                let relative = name
                    .strip_prefix(&entry.path)
                    .map(|s| s.trim_start_matches('/').to_string())
                    .unwrap_or(name);
                let submitted = entry
                    .automount_point
                    .submit_kernel_request(KernelRequest { token, name: relative });
                if !submitted {
                    let _ = channel.respond(token, libc::ENOENT);
                }
            }
            Ok(None) => std::thread::sleep(Duration::from_millis(200)),
            Err(err) => {
                error!(%err, "kernel channel read failed, shutting down");
                break;
            }
        }
    }
}
