//! Registry-level bento operations: create, delete, list and pull.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::config::{LaunchOptions, Settings};
use crate::error::{BentoError, Result};
use crate::events::{EventSink, LifecycleEvent};
use crate::instance::{BentoContext, BentoInstance};
use crate::poll::CancelToken;
use crate::runtime::{CreateOptions, InstanceRecord, ListFilter, MANAGED_LABEL, PLATFORM_VERSION_LABEL};
use crate::validation::{validate_bento_name, validate_platform_version};

pub struct BentoSystem {
    context: Arc<BentoContext>,
}

impl BentoSystem {
    pub fn new(context: BentoContext) -> Self {
        Self {
            context: Arc::new(context),
        }
    }

    /// Docker engine and supervisord backed system configured from `settings`.
    pub fn from_settings(settings: Settings, sink: Arc<dyn EventSink>) -> Result<Self> {
        Ok(Self::new(BentoContext::from_settings(settings, sink)?))
    }

    pub fn settings(&self) -> &Settings {
        &self.context.settings
    }

    fn emit(&self, event: LifecycleEvent) {
        self.context.sink.emit(&event);
    }

    fn resolve_version<'a>(&'a self, platform_version: Option<&'a str>) -> Result<&'a str> {
        let version =
            platform_version.unwrap_or(self.context.settings.default_platform_version.as_str());
        validate_platform_version(version)?;
        Ok(version)
    }

    /// Handle for `name`. The bento need not exist.
    pub fn instance(&self, name: &str) -> Result<BentoInstance> {
        validate_bento_name(name)?;
        Ok(BentoInstance::new(name, Arc::clone(&self.context)))
    }

    /// Create a bento from the image for `platform_version` (settings default
    /// when None), then start it when `launch.start` is set.
    pub fn create(
        &self,
        name: &str,
        platform_version: Option<&str>,
        launch: &LaunchOptions,
        cancel: &CancelToken,
    ) -> Result<InstanceRecord> {
        let instance = self.instance(name)?;
        let version = self.resolve_version(platform_version)?;

        // Any container holding the name blocks creation, managed or not. An
        // id-prefix match is some other container.
        match self.context.runtime.inspect(name) {
            Ok(existing) if existing.name == name => return Err(BentoError::already_exists(name)),
            Ok(_) => {}
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e),
        }

        let image = self.context.settings.image_ref(version);
        let options = CreateOptions {
            hostname: name.to_string(),
            labels: BTreeMap::from([
                (MANAGED_LABEL.to_string(), "true".to_string()),
                (PLATFORM_VERSION_LABEL.to_string(), version.to_string()),
            ]),
        };
        let id = self.context.runtime.create(&image, name, &options)?;
        log::debug!("Created container {} for bento {}", id, name);
        self.emit(LifecycleEvent::Created {
            name: name.to_string(),
            image,
        });

        if launch.start {
            instance.start(&launch.sync, &launch.poll, cancel)?;
        }
        instance.record()
    }

    /// Stop (when running) and remove the bento with its volumes.
    pub fn delete(&self, name: &str) -> Result<()> {
        let instance = self.instance(name)?;
        let details = instance.details()?;
        if details.running {
            let policy = self.context.settings.poll_policy()?;
            instance.stop(&policy, &CancelToken::new())?;
        }
        self.context.runtime.remove(&details.id)?;
        self.emit(LifecycleEvent::Removed {
            name: name.to_string(),
        });
        Ok(())
    }

    /// Managed bentos sorted by name.
    pub fn list(&self, only_running: bool) -> Result<Vec<InstanceRecord>> {
        let filter = ListFilter {
            label: format!("{}=true", MANAGED_LABEL),
            all: !only_running,
        };
        let summaries = self.context.runtime.list(&filter)?;

        let mut records = Vec::with_capacity(summaries.len());
        for summary in summaries {
            if !summary.image.starts_with(&self.context.settings.image) {
                continue;
            }
            if only_running && !summary.running {
                continue;
            }
            // Removed between list and inspect.
            let details = match self.context.runtime.inspect(&summary.id) {
                Ok(details) => details,
                Err(e) if e.is_not_found() => continue,
                Err(e) => return Err(e),
            };
            if only_running && !details.running {
                continue;
            }
            records.push(InstanceRecord::from(&details));
        }
        records.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(records)
    }

    /// Make sure the image for `platform_version` is present locally.
    pub fn pull(&self, platform_version: Option<&str>) -> Result<()> {
        let version = self.resolve_version(platform_version)?;
        let image = self.context.settings.image_ref(version);

        if self.context.runtime.image_exists(&image)? {
            self.emit(LifecycleEvent::ImagePresent { image });
            return Ok(());
        }

        let sink = Arc::clone(&self.context.sink);
        let mut forward = |message: &str| {
            sink.emit(&LifecycleEvent::PullProgress {
                image: image.clone(),
                message: message.to_string(),
            });
        };
        self.context.runtime.pull(&image, &mut forward)?;
        log::info!("Pulled {}", image);
        Ok(())
    }
}
