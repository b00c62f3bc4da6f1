//! Immutable filesystem/reader configuration built from XML resource files.
//!
//! A [`Configuration`] is a flat string map with built-in defaults. It is
//! assembled once by [`ConfigurationBuilder`] and then shared read-only (usually
//! behind an `Arc`) by split computation and every record reader.
//!
//! Resource files use the familiar site-file layout:
//!
//! ```xml
//! <configuration>
//!   <property>
//!     <name>fs.defaultFS</name>
//!     <value>hdfs://namenode:8020</value>
//!     <final>true</final>
//!   </property>
//! </configuration>
//! ```
//!
//! Resources are applied in order; a later resource overrides an earlier one
//! unless the earlier property was marked `final`. Values set programmatically
//! through [`ConfigurationBuilder::set`] are applied last. `${name}` and
//! `${env.NAME}` references are expanded on read.

use crate::error::{Error, IoContext, Result};
use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Well-known configuration keys.
pub mod keys {
    pub const DEFAULT_FS: &str = "fs.defaultFS";
    pub const LOCAL_BLOCK_SIZE: &str = "fs.local.block.size";
    pub const IO_FILE_BUFFER_SIZE: &str = "io.file.buffer.size";
    pub const SPLIT_MINSIZE: &str = "mapreduce.input.fileinputformat.split.minsize";
    pub const SPLIT_MAXSIZE: &str = "mapreduce.input.fileinputformat.split.maxsize";
    pub const INPUT_DIR_RECURSIVE: &str = "mapreduce.input.fileinputformat.input.dir.recursive";
    pub const LIST_STATUS_NUM_THREADS: &str =
        "mapreduce.input.fileinputformat.list-status.num-threads";
    pub const LINE_MAX_LENGTH: &str = "mapreduce.input.linerecordreader.line.maxlength";
    pub const RECORD_DELIMITER: &str = "textinputformat.record.delimiter";
}

const MAX_SUBSTITUTIONS: usize = 20;

fn defaults() -> BTreeMap<String, String> {
    [
        (keys::DEFAULT_FS, "file:///"),
        (keys::LOCAL_BLOCK_SIZE, "33554432"),
        (keys::IO_FILE_BUFFER_SIZE, "65536"),
        (keys::SPLIT_MINSIZE, "1"),
        (keys::INPUT_DIR_RECURSIVE, "false"),
        (keys::LIST_STATUS_NUM_THREADS, "1"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

/// Read-only configuration value.
#[derive(Clone, Debug)]
pub struct Configuration {
    props: BTreeMap<String, String>,
    resources: Vec<PathBuf>,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            props: defaults(),
            resources: Vec::new(),
        }
    }
}

impl Configuration {
    /// Configuration holding only the built-in defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn builder() -> ConfigurationBuilder {
        ConfigurationBuilder::default()
    }

    /// The value of `name` with `${...}` references expanded.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<String> {
        self.props.get(name).map(|raw| self.substitute(raw))
    }

    /// The stored value of `name` without expansion.
    #[must_use]
    pub fn get_raw(&self, name: &str) -> Option<&str> {
        self.props.get(name).map(String::as_str)
    }

    /// Parse `name` as an unsigned integer, falling back to `default` when unset.
    ///
    /// # Errors
    /// Returns [`Error::Config`] if the value is present but not a number.
    pub fn get_u64(&self, name: &str, default: u64) -> Result<u64> {
        match self.get(name) {
            None => Ok(default),
            Some(v) => v
                .trim()
                .parse()
                .map_err(|_| Error::config(format!("{name} must be an unsigned integer, got {v:?}"))),
        }
    }

    /// Like [`get_u64`](Self::get_u64) for `usize` values.
    ///
    /// # Errors
    /// Returns [`Error::Config`] if the value is present but not a number.
    pub fn get_usize(&self, name: &str, default: usize) -> Result<usize> {
        match self.get(name) {
            None => Ok(default),
            Some(v) => v
                .trim()
                .parse()
                .map_err(|_| Error::config(format!("{name} must be an unsigned integer, got {v:?}"))),
        }
    }

    /// Parse `name` as `true`/`false` (case-insensitive).
    ///
    /// # Errors
    /// Returns [`Error::Config`] if the value is present but not a boolean.
    pub fn get_bool(&self, name: &str, default: bool) -> Result<bool> {
        match self.get(name) {
            None => Ok(default),
            Some(v) => match v.trim().to_ascii_lowercase().as_str() {
                "true" => Ok(true),
                "false" => Ok(false),
                _ => Err(Error::config(format!("{name} must be true or false, got {v:?}"))),
            },
        }
    }

    /// The default filesystem URI used for scheme-less paths.
    #[must_use]
    pub fn default_fs(&self) -> String {
        self.get(keys::DEFAULT_FS)
            .unwrap_or_else(|| "file:///".to_string())
    }

    /// Resolved resource files, in the order they were applied.
    #[must_use]
    pub fn resources(&self) -> &[PathBuf] {
        &self.resources
    }

    fn substitute(&self, raw: &str) -> String {
        let mut current = raw.to_string();
        for _ in 0..MAX_SUBSTITUTIONS {
            let Some(start) = current.find("${") else {
                return current;
            };
            let Some(len) = current[start + 2..].find('}') else {
                return current;
            };
            let var = &current[start + 2..start + 2 + len];
            let replacement = match var.strip_prefix("env.") {
                Some(env_name) => std::env::var(env_name).ok(),
                None => self.props.get(var).cloned(),
            };
            // Unresolvable references are left in place.
            let Some(replacement) = replacement else {
                return current;
            };
            current = format!(
                "{}{}{}",
                &current[..start],
                replacement,
                &current[start + 3 + len..]
            );
        }
        current
    }
}

#[derive(Debug, Deserialize)]
struct XmlConfiguration {
    #[serde(rename = "property", default)]
    properties: Vec<XmlProperty>,
}

#[derive(Debug, Deserialize)]
struct XmlProperty {
    name: String,
    #[serde(default)]
    value: Option<String>,
    #[serde(rename = "final", default)]
    is_final: Option<String>,
}

/// Parse one site-style XML resource into `(name, value, final)` triples.
///
/// # Errors
/// Returns [`Error::Config`] if the document is not a valid configuration.
pub fn parse_resource(xml: &str, origin: &str) -> Result<Vec<(String, String, bool)>> {
    let doc: XmlConfiguration = quick_xml::de::from_str(xml)
        .map_err(|e| Error::config(format!("malformed configuration resource {origin}: {e}")))?;
    Ok(doc
        .properties
        .into_iter()
        .filter_map(|p| {
            let value = p.value?;
            let is_final = p
                .is_final
                .is_some_and(|f| f.trim().eq_ignore_ascii_case("true"));
            Some((p.name.trim().to_string(), value.trim().to_string(), is_final))
        })
        .collect())
}

/// Resolve a configuration resource path: absolute paths are used as-is,
/// relative ones are joined onto `application_dir`.
#[must_use]
pub fn resolve_resource_path(resource: &str, application_dir: &Path) -> PathBuf {
    let p = Path::new(resource);
    if p.is_absolute() {
        p.to_path_buf()
    } else {
        application_dir.join(p)
    }
}

/// Assembles a [`Configuration`] from defaults, resource files, and overrides.
#[derive(Clone, Debug, Default)]
pub struct ConfigurationBuilder {
    application_dir: Option<PathBuf>,
    resources: Vec<String>,
    overrides: Vec<(String, String)>,
}

impl ConfigurationBuilder {
    /// Directory relative resource paths are resolved against. Defaults to the
    /// current working directory.
    #[must_use]
    pub fn application_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.application_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    /// Queue a resource file (absolute, or relative to the application dir).
    #[must_use]
    pub fn add_resource(mut self, resource: impl Into<String>) -> Self {
        self.resources.push(resource.into());
        self
    }

    #[must_use]
    pub fn add_resources<I, S>(mut self, resources: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.resources.extend(resources.into_iter().map(Into::into));
        self
    }

    /// Set a property; applied after all resources.
    #[must_use]
    pub fn set(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.overrides.push((name.into(), value.into()));
        self
    }

    /// Resolve, read, and merge every queued resource.
    ///
    /// # Errors
    /// Returns [`Error::Config`] if a resource does not exist at its resolved
    /// location or is not a valid configuration document, and [`Error::Io`]
    /// if it exists but cannot be read.
    pub fn build(self) -> Result<Configuration> {
        let app_dir = match self.application_dir {
            Some(dir) => dir,
            None => std::env::current_dir().io_context(|| "resolve current directory")?,
        };

        let mut props = defaults();
        let mut finals = HashSet::<String>::new();
        let mut applied = Vec::with_capacity(self.resources.len());

        for resource in &self.resources {
            let path = resolve_resource_path(resource, &app_dir);
            if !path.exists() {
                return Err(Error::config(format!(
                    "Specified configuration file {resource} not found at {}",
                    path.display()
                )));
            }
            info!(resource = %path.display(), "adding configuration resource");
            let text = std::fs::read_to_string(&path)
                .io_context(|| format!("read configuration resource {}", path.display()))?;
            for (name, value, is_final) in parse_resource(&text, &path.display().to_string())? {
                if finals.contains(&name) {
                    debug!(%name, "ignoring override of final property");
                    continue;
                }
                if is_final {
                    finals.insert(name.clone());
                }
                props.insert(name, value);
            }
            applied.push(path);
        }

        for (name, value) in self.overrides {
            props.insert(name, value);
        }

        Ok(Configuration {
            props,
            resources: applied,
        })
    }
}
