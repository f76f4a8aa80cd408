//! Error taxonomy for the plugin manager. Each kind carries the exact,
//! human-facing wording callers depend on rather than collapsing into a
//! generic failure; only genuinely unanticipated I/O and transport errors
//! fall through to [`Error::Other`].

use crate::identity::Target;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("no plugin discovery sources available. Run 'plugin source init'")]
    NoDiscoverySources,

    #[error("{0}")]
    NotFound(NotFoundError),

    #[error("unable to uniquely identify plugin {0}. Please specify the target using --target (kubernetes[k8s]|mission-control[tmc]|global)")]
    AmbiguousTarget(String),

    #[error("untrusted registry: image {image:?} does not match any trusted prefix in {allow_list:?}")]
    UntrustedRegistry {
        image: String,
        allow_list: Vec<String>,
    },

    #[error("untrusted artifact URI: {uri:?} does not match any trusted prefix in {allow_list:?}")]
    UntrustedUri {
        uri: String,
        allow_list: Vec<String>,
    },

    #[error("no download information for plugin {0}")]
    NoDownloadInformation(String),

    #[error("checksum did not match for plugin {name}, aborting installation")]
    DigestMismatch { name: String },

    #[error("{stage} for plugin {name}: {source:#}")]
    TransientFetch {
        name: String,
        stage: &'static str,
        #[source]
        source: anyhow::Error,
    },

    #[error("could not find group {0}")]
    GroupNotFound(String),

    #[error("plugin {name} is not part of group {group}")]
    PluginNotInGroup { name: String, group: String },

    #[error("group {0} has no mandatory plugins")]
    NoMandatoryPluginsInGroup(String),

    #[error("{failed} of {total} plugins in group {group} failed to install")]
    PartialGroupFailure {
        failed: usize,
        total: usize,
        group: String,
    },

    #[error("plugin {name} could not be {verb} in the catalog: {source:#}")]
    CatalogWrite {
        name: String,
        verb: &'static str,
        #[source]
        source: anyhow::Error,
    },

    #[error("unable to find any installed plugins")]
    NoInstalledPluginsMatch,

    #[error("deleting all installed plugins requires --force")]
    ForceRequired,

    #[error("plugin {0} could not be described by its own binary")]
    DescribeFailed(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Details of a plugin that could not be located, either in discovery
/// results or in the catalog.
#[derive(Debug)]
pub struct NotFoundError {
    name: String,
    version: Option<String>,
    target: Option<Target>,
}

impl NotFoundError {
    /// Build a not-found error for a failed resolution.
    pub fn new(name: impl Into<String>, version: Option<String>, target: Option<Target>) -> Error {
        Error::NotFound(Self {
            name: name.into(),
            version,
            target,
        })
    }
}

impl std::fmt::Display for NotFoundError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "unable to find plugin {}", self.name)?;
        if let Some(v) = &self.version {
            write!(f, " matching version {v}")?;
        }
        if let Some(t) = &self.target {
            write!(f, " for target {t}")?;
        }
        Ok(())
    }
}
