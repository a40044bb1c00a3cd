//! Hadoop/HBase client configuration rendered from bento identity.
//!
//! Templates are compiled into the library with `include_str!` and rendered
//! with Tera. Output depends only on (hostname, address, platform version);
//! nothing on disk is read to decide content.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tera::{Context, Tera};

use crate::error::Result;
use crate::fs_util::atomic_write;

static CORE_SITE: &str = include_str!("templates/hadoop/core-site.xml.j2");
static MAPRED_SITE: &str = include_str!("templates/hadoop/mapred-site.xml.j2");
static YARN_SITE: &str = include_str!("templates/hadoop/yarn-site.xml.j2");
static HBASE_SITE: &str = include_str!("templates/hbase/hbase-site.xml.j2");
static BENTO_ENV: &str = include_str!("templates/bento-env.sh.j2");

/// (template name, output path relative to the config dir, template body)
const ALL_TEMPLATES: &[(&str, &str, &str)] = &[
    ("hadoop/core-site.xml.j2", "hadoop/core-site.xml", CORE_SITE),
    ("hadoop/mapred-site.xml.j2", "hadoop/mapred-site.xml", MAPRED_SITE),
    ("hadoop/yarn-site.xml.j2", "hadoop/yarn-site.xml", YARN_SITE),
    ("hbase/hbase-site.xml.j2", "hbase/hbase-site.xml", HBASE_SITE),
    ("bento-env.sh.j2", "bento-env.sh", BENTO_ENV),
];

/// Rendered files keyed by path relative to the target directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigBundle {
    files: BTreeMap<PathBuf, String>,
}

impl ConfigBundle {
    pub fn files(&self) -> impl Iterator<Item = (&Path, &str)> {
        self.files.iter().map(|(p, c)| (p.as_path(), c.as_str()))
    }

    pub fn get(&self, relative: &str) -> Option<&str> {
        self.files.get(Path::new(relative)).map(String::as_str)
    }

    /// Write every file under `dir`, replacing prior versions.
    ///
    /// Each file is replaced atomically, so a failure part way leaves every
    /// file either at its old content or its new one.
    pub fn write_to(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        let mut written = Vec::with_capacity(self.files.len());
        for (relative, content) in &self.files {
            let path = dir.join(relative);
            atomic_write(&path, content.as_bytes())?;
            written.push(path);
        }
        Ok(written)
    }
}

pub struct ClientConfigWriter {
    tera: Tera,
}

impl ClientConfigWriter {
    pub fn new() -> Result<Self> {
        let mut tera = Tera::default();
        for (name, _, body) in ALL_TEMPLATES {
            tera.add_raw_template(name, body)?;
        }
        Ok(Self { tera })
    }

    pub fn render(
        &self,
        hostname: &str,
        address: &str,
        platform_version: &str,
    ) -> Result<ConfigBundle> {
        let mut context = Context::new();
        context.insert("bento_host", hostname);
        context.insert("bento_address", address);
        context.insert("platform_version", platform_version);

        let mut files = BTreeMap::new();
        for (name, output, _) in ALL_TEMPLATES {
            let rendered = self.tera.render(name, &context)?;
            files.insert(PathBuf::from(output), rendered);
        }
        Ok(ConfigBundle { files })
    }

    /// Render and write the full file set into `dir`.
    pub fn write(
        &self,
        dir: &Path,
        hostname: &str,
        address: &str,
        platform_version: &str,
    ) -> Result<Vec<PathBuf>> {
        let bundle = self.render(hostname, address, platform_version)?;
        let written = bundle.write_to(dir)?;
        log::debug!("Wrote {} client config files to {}", written.len(), dir.display());
        Ok(written)
    }
}
