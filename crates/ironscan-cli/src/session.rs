use std::path::PathBuf;

use anyhow::Context as _;
use ironscan_app::twain::{
    DsState, Identity, IdentityId, Msg, PendingXfers, ReturnCode, SetupFileXfer, SupportedGroups, UserInterface, Version,
};
use ironscan_app::{Manager, NativeDsmLibrary, Source};

use crate::config::{AcquireConfig, Config, TransferMode};

/// Summary of one installed source.
#[derive(Debug, Clone)]
pub struct SourceInfo {
    pub id: IdentityId,
    pub product_name: String,
    pub manufacturer: String,
    pub product_family: String,
    pub version: String,
}

impl SourceInfo {
    fn from_identity(identity: &Identity) -> Self {
        let version = identity.version();

        Self {
            id: identity.id(),
            product_name: identity.product_name().to_string_lossy(),
            manufacturer: identity.manufacturer().to_string_lossy(),
            product_family: identity.product_family().to_string_lossy(),
            version: format!("{}.{} {}", version.major(), version.minor(), version.info()),
        }
    }
}

/// Outcome of an acquisition.
#[derive(Debug, Default)]
pub struct AcquireReport {
    pub images: usize,
    pub files: Vec<PathBuf>,
    /// The user closed the source before anything was transferred.
    pub cancelled: bool,
}

fn check(rc: ReturnCode, what: &str) -> anyhow::Result<()> {
    if rc.is_success() {
        Ok(())
    } else {
        anyhow::bail!("{what} failed: {rc}")
    }
}

pub fn app_identity() -> Identity {
    let major = env!("CARGO_PKG_VERSION_MAJOR").parse().unwrap_or(0);
    let minor = env!("CARGO_PKG_VERSION_MINOR").parse().unwrap_or(0);

    Identity::application(
        Version::new(major, minor, env!("CARGO_PKG_VERSION")),
        SupportedGroups::IMAGE,
        "Devolutions",
        "ironscan",
        "ironscan-cli",
    )
}

/// Loads and opens the data source manager described by `config`.
pub fn open_manager(config: &Config) -> anyhow::Result<Manager> {
    let library = match &config.dsm_path {
        Some(path) => NativeDsmLibrary::with_path(path),
        None => NativeDsmLibrary::new(),
    };

    let mut manager = Manager::with_library(app_identity(), Box::new(library));

    manager
        .load(config.prefer_legacy)
        .context("unable to load the data source manager")?;
    check(manager.open(None), "opening the data source manager")?;

    debug!(?manager, "Data source manager ready");

    Ok(manager)
}

pub fn list_sources(manager: &Manager) -> anyhow::Result<Vec<SourceInfo>> {
    let (sources, rc) = manager.sources();

    if rc != ReturnCode::END_OF_LIST {
        warn!(%rc, collected = sources.len(), "Source enumeration ended early");
    }

    if sources.is_empty() && rc != ReturnCode::END_OF_LIST {
        anyhow::bail!("source enumeration failed: {rc}");
    }

    Ok(sources.iter().map(|source| SourceInfo::from_identity(&source.identity())).collect())
}

pub fn default_source(manager: &Manager) -> anyhow::Result<SourceInfo> {
    let source = manager
        .default_source()
        .map_err(|rc| anyhow::anyhow!("no default source: {rc}"))?;

    Ok(SourceInfo::from_identity(&source.identity()))
}

/// Shows the selection dialog and makes the chosen source the default one.
///
/// Returns `None` when the user cancelled the dialog.
pub fn select_source(manager: &Manager) -> anyhow::Result<Option<SourceInfo>> {
    let source = match manager.show_source_dialog() {
        Ok(source) => source,
        Err(ReturnCode::CANCEL) => return Ok(None),
        Err(rc) => anyhow::bail!("source selection failed: {rc}"),
    };

    check(manager.set_default_source(&source), "setting the default source")?;

    Ok(Some(SourceInfo::from_identity(&source.identity())))
}

/// Opens the requested source, waits for the user and transfers every pending image.
pub fn acquire(manager: &Manager, config: &AcquireConfig) -> anyhow::Result<AcquireReport> {
    let mut source = match &config.source {
        Some(name) => manager.create_source(name, ""),
        None => manager
            .default_source()
            .map_err(|rc| anyhow::anyhow!("no default source: {rc}"))?,
    };

    check(source.open(), "opening the source")?;
    info!(source = %source.identity().product_name(), "Source opened");

    let ui = UserInterface::new(config.show_ui, false, manager.root_window());
    let rc = source.enable(ui, config.ui_only);
    if !(rc.is_success() || rc == ReturnCode::CHECK_STATUS) {
        anyhow::bail!("enabling the source failed: {rc}");
    }

    let mut report = AcquireReport::default();

    match source.wait_ready() {
        ReturnCode::SUCCESS if source.state() == DsState::XferReady => {
            transfer_all(&mut source, config, &mut report)?;
        }
        ReturnCode::SUCCESS => {
            info!("Source closed by the user without transferring");
        }
        ReturnCode::CANCEL => {
            info!("Source asked to be closed");
            report.cancelled = true;
        }
        rc => anyhow::bail!("waiting for the source failed: {rc}"),
    }

    if source.state() == DsState::Enabled {
        check(source.disable(), "disabling the source")?;
    }
    check(source.close(), "closing the source")?;

    Ok(report)
}

fn transfer_all(source: &mut Source<'_>, config: &AcquireConfig, report: &mut AcquireReport) -> anyhow::Result<()> {
    loop {
        let rc = match config.mode {
            TransferMode::Native => {
                let (rc, image) = source.image_native_xfer();

                if let Some(image) = image {
                    report.images += 1;
                    info!(handle = ?image.as_raw(), "Native image received");
                }

                rc
            }
            TransferMode::File => {
                let path = config
                    .output_dir
                    .join(format!("scan-{:03}.{}", report.images + 1, config.format.extension()));

                let mut setup = SetupFileXfer::new(&path.to_string_lossy(), config.format.file_format());
                check(source.setup_file_xfer(Msg::SET, &mut setup), "configuring the file transfer")?;

                let rc = source.image_file_xfer();
                if rc.is_success() {
                    report.images += 1;
                    info!(path = %path.display(), "Image written");
                    report.files.push(path);
                }

                rc
            }
        };

        if source.state() != DsState::Xferring {
            warn!(%rc, "Transfer did not start, discarding pending images");
            let mut pending = PendingXfers::new();
            check(source.pending_xfers(Msg::RESET, &mut pending), "discarding pending transfers")?;
            return Ok(());
        }

        let mut pending = PendingXfers::new();
        check(source.pending_xfers(Msg::END_XFER, &mut pending), "ending the transfer")?;
        debug!(remaining = pending.count(), "Transfer ended");

        if pending.count() == 0 {
            return Ok(());
        }
    }
}
