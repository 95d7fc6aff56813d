//! Backfill and version tracking.
//!
//! On first install every existing order that has no sequential number gets
//! its own record key as its number, so legacy orders keep the identifier
//! customers already know. The installed version is then recorded in the
//! store; later activations only run the upgrade hook when it changes.

use std::sync::Arc;

use ordseq_store::{RecordStore, StatusFilter, StoreError};
use ordseq_types::SequentialNumber;
use serde::Serialize;
use tracing::{debug, info};

use crate::config::NumberingConfig;
use crate::error::NumberingResult;

/// Extension point run when the installed version differs from the running
/// one.
pub trait UpgradeHook: Send + Sync {
    /// Called with the previously installed version (`None` on a fresh
    /// install) before the new version is recorded. An error leaves the old
    /// marker in place so the upgrade runs again on next activation.
    fn upgrade(&self, installed: Option<&str>, running: &str) -> NumberingResult<()>;
}

/// Upgrade hook that does nothing.
pub struct NoOpUpgrade;

impl UpgradeHook for NoOpUpgrade {
    fn upgrade(&self, _installed: Option<&str>, _running: &str) -> NumberingResult<()> {
        Ok(())
    }
}

/// What a migration run changed.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct MigrationReport {
    /// Orders that received their record key as number.
    pub backfilled: usize,
    /// Orders skipped by the backfill because they were already numbered.
    pub already_numbered: usize,
    /// The marker found before this run, if any.
    pub previous_version: Option<String>,
    /// Whether the version marker was (re)written.
    pub version_written: bool,
}

/// Runs the one-time backfill and records the installed version.
pub struct BackfillMigrator<S: ?Sized> {
    store: Arc<S>,
    property: String,
    version_option: String,
    version: String,
    hook: Box<dyn UpgradeHook>,
}

impl<S: RecordStore + ?Sized> BackfillMigrator<S> {
    pub fn new(store: Arc<S>, config: &NumberingConfig) -> Self {
        Self {
            store,
            property: config.property_name.clone(),
            version_option: config.version_option.clone(),
            version: config.version.clone(),
            hook: Box::new(NoOpUpgrade),
        }
    }

    pub fn with_hook(mut self, hook: impl UpgradeHook + 'static) -> Self {
        self.hook = Box::new(hook);
        self
    }

    /// Read the installed-version marker from the store and migrate from it.
    pub fn install(&self) -> NumberingResult<MigrationReport> {
        let installed = self.store.option(&self.version_option)?;
        self.migrate(installed.as_deref())
    }

    /// Migrate from `installed` (`None` or empty on a fresh install).
    pub fn migrate(&self, installed: Option<&str>) -> NumberingResult<MigrationReport> {
        let installed = installed.filter(|v| !v.trim().is_empty());
        let mut report = MigrationReport {
            previous_version: installed.map(str::to_string),
            ..Default::default()
        };

        if installed.is_none() {
            self.backfill(&mut report)?;
        }

        if installed != Some(self.version.as_str()) {
            self.hook.upgrade(installed, &self.version)?;
            self.store.set_option(&self.version_option, &self.version)?;
            report.version_written = true;
            info!(
                from = installed.unwrap_or("none"),
                to = %self.version,
                "recorded numbering version"
            );
        }

        Ok(report)
    }

    fn backfill(&self, report: &mut MigrationReport) -> NumberingResult<()> {
        for record in self.store.records(&StatusFilter::Any)? {
            let number = SequentialNumber::from_key(record.key);
            match self
                .store
                .add_property_if_absent(record.key, &self.property, number.as_str())
            {
                Ok(true) => report.backfilled += 1,
                Ok(false) => report.already_numbered += 1,
                Err(StoreError::RecordNotFound(key)) => {
                    debug!(record = %key, "order deleted during backfill");
                }
                Err(e) => return Err(e.into()),
            }
        }
        info!(
            backfilled = report.backfilled,
            already_numbered = report.already_numbered,
            "backfilled legacy orders"
        );
        Ok(())
    }
}
