//! Hosts file and client config synchronization for one bento.

use std::path::PathBuf;

use super::BentoInstance;
use crate::config::SyncOptions;
use crate::error::{BentoError, Result};
use crate::events::LifecycleEvent;
use crate::hosts::WriteOutcome;
use crate::runtime::ContainerDetails;

impl BentoInstance {
    /// Details of a bento that has a network address to publish.
    fn addressed_details(&self) -> Result<ContainerDetails> {
        let details = self.details()?;
        if details.ip_address.is_empty() {
            return Err(BentoError::runtime(format!(
                "Bento {} has no network address; is it running?",
                self.name
            )));
        }
        Ok(details)
    }

    /// Render the client config bundle into `dir` (default
    /// `<client_config_root>/<name>`). Returns the directory written.
    pub fn write_hadoop_config(&self, dir: Option<PathBuf>) -> Result<PathBuf> {
        let details = self.addressed_details()?;
        let dir = self.context.config_dir(&self.name, dir)?;
        let version = details
            .platform_version()
            .unwrap_or(self.context.settings.default_platform_version.as_str())
            .to_string();

        self.context.config_writer.write(
            &dir,
            &details.hostname,
            &details.ip_address,
            &version,
        )?;
        self.emit(LifecycleEvent::ConfigWritten { dir: dir.clone() });
        Ok(dir)
    }

    /// Point the managed hosts entry for this bento at its current address.
    pub fn update_hosts(&self, path: Option<PathBuf>) -> Result<WriteOutcome> {
        let details = self.addressed_details()?;

        let target = self.context.hosts_target(path);
        let outcome = self
            .context
            .hosts
            .sync(&target, &details.hostname, &details.ip_address)?;

        match &outcome {
            WriteOutcome::Skipped => self.emit(LifecycleEvent::HostsSkipped {
                hostname: details.hostname,
                address: details.ip_address,
            }),
            WriteOutcome::Written | WriteOutcome::Delegated(_) => {
                self.emit(LifecycleEvent::HostsUpdated {
                    path: target.path,
                    hostname: details.hostname,
                    address: details.ip_address,
                })
            }
            WriteOutcome::Unchanged => {}
        }
        Ok(outcome)
    }

    pub(crate) fn synchronize(&self, sync: &SyncOptions) -> Result<()> {
        if sync.sync_config {
            self.write_hadoop_config(sync.config_dir.clone())?;
        }
        if sync.sync_hosts {
            self.update_hosts(sync.hosts_path.clone())?;
        }
        Ok(())
    }
}
