//! Plugin identity and version-matching rules.
//!
//! A plugin is identified by `(name, target)`; two identifiers name "the
//! same plugin" iff their names and normalized targets agree. Versions are
//! either full semver, a shortened `vMAJOR` / `vMAJOR.MINOR` prefix, or the
//! sentinel `latest` (which this implementation treats identically to an
//! empty version string — see the resolution open question in SPEC_FULL).

use semver::Version;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The kind of backend a plugin talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Target {
    Kubernetes,
    MissionControl,
    Global,
    /// Back-compat alias of [`Target::Kubernetes`] at equality time only.
    Unknown,
}

impl Target {
    /// `unknown` is folded into `kubernetes` for identity purposes, but the
    /// original value is retained for display and catalog back-compat.
    pub fn normalized(self) -> Target {
        match self {
            Target::Unknown => Target::Kubernetes,
            other => other,
        }
    }

    /// Parse the CLI-facing aliases (`k8s`, `tmc`, …) in addition to the
    /// canonical spellings.
    pub fn parse(s: &str) -> Option<Target> {
        match s.to_ascii_lowercase().as_str() {
            "kubernetes" | "k8s" => Some(Target::Kubernetes),
            "mission-control" | "tmc" => Some(Target::MissionControl),
            "global" => Some(Target::Global),
            "unknown" | "" => Some(Target::Unknown),
            _ => None,
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Target::Kubernetes => "kubernetes",
            Target::MissionControl => "mission-control",
            Target::Global => "global",
            Target::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// Immutable identity of a plugin: name, target, and the version under
/// which it was resolved or installed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginIdentifier {
    pub name: String,
    pub target: Target,
    pub version: String,
}

impl PluginIdentifier {
    pub fn new(name: impl Into<String>, target: Target, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            target,
            version: version.into(),
        }
    }

    /// `(name, normalized target)` key used for dedup and catalog lookups.
    pub fn key(&self) -> (String, Target) {
        (self.name.clone(), self.target.normalized())
    }

    /// Whether `self` and `other` name the same plugin, per the back-compat
    /// equality rule in the data model (`unknown` == `kubernetes`).
    pub fn same_plugin(&self, other: &PluginIdentifier) -> bool {
        self.name == other.name && self.target.normalized() == other.target.normalized()
    }
}

/// A parsed version request: a concrete version, a shortened prefix, or the
/// `latest`/empty sentinel meaning "use the recommended version".
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionRequest {
    Latest,
    Full(Version),
    MajorPrefix(u64),
    MajorMinorPrefix(u64, u64),
}

impl VersionRequest {
    /// Normalizes `""` and `"latest"` to [`VersionRequest::Latest`], per the
    /// open question decision recorded in SPEC_FULL.md.
    pub fn parse(raw: &str) -> anyhow::Result<VersionRequest> {
        if raw.is_empty() || raw.eq_ignore_ascii_case("latest") {
            return Ok(VersionRequest::Latest);
        }
        let trimmed = raw.strip_prefix('v').unwrap_or(raw);
        let parts: Vec<&str> = trimmed.splitn(3, '.').collect();
        match parts.as_slice() {
            [major] if !major.contains('-') => {
                let major: u64 = major.parse()?;
                Ok(VersionRequest::MajorPrefix(major))
            }
            [major, minor] => {
                let major: u64 = major.parse()?;
                let minor: u64 = minor.parse()?;
                Ok(VersionRequest::MajorMinorPrefix(major, minor))
            }
            _ => {
                let version = Version::parse(trimmed)?;
                Ok(VersionRequest::Full(version))
            }
        }
    }

    pub fn is_latest(&self) -> bool {
        matches!(self, VersionRequest::Latest)
    }

    /// True if `candidate` is compatible with this request.
    pub fn matches(&self, candidate: &Version) -> bool {
        match self {
            VersionRequest::Latest => true,
            VersionRequest::Full(v) => v == candidate,
            VersionRequest::MajorPrefix(major) => candidate.major == *major,
            VersionRequest::MajorMinorPrefix(major, minor) => {
                candidate.major == *major && candidate.minor == *minor
            }
        }
    }

    /// Picks the semver-maximum element of `candidates` matching this
    /// request. `Latest` picks the overall maximum.
    pub fn resolve<'a>(&self, candidates: impl IntoIterator<Item = &'a Version>) -> Option<&'a Version> {
        candidates
            .into_iter()
            .filter(|v| self.matches(v))
            .max()
    }
}

impl fmt::Display for VersionRequest {
    /// Renders back the version string a user would have typed, for use in
    /// not-found error messages (spec.md §7: "matching version V").
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VersionRequest::Latest => f.write_str("latest"),
            VersionRequest::Full(v) => write!(f, "v{v}"),
            VersionRequest::MajorPrefix(major) => write!(f, "v{major}"),
            VersionRequest::MajorMinorPrefix(major, minor) => write!(f, "v{major}.{minor}"),
        }
    }
}

/// Identity of a plugin group: `vendor-publisher/name[:version]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginGroupIdentifier {
    pub vendor: String,
    pub publisher: String,
    pub name: String,
    pub version: Option<String>,
}

impl PluginGroupIdentifier {
    /// Parses `vendor-publisher/name[:version]`. Fails with the exact
    /// wording the error design mandates on malformed input.
    pub fn from_id(s: &str) -> anyhow::Result<Self> {
        let (vendor_publisher, rest) = s
            .split_once('/')
            .ok_or_else(|| anyhow::anyhow!("could not find group {s}"))?;
        let (vendor, publisher) = vendor_publisher
            .split_once('-')
            .ok_or_else(|| anyhow::anyhow!("could not find group {s}"))?;
        if vendor.is_empty() || publisher.is_empty() {
            anyhow::bail!("could not find group {s}");
        }
        let (name, version) = match rest.split_once(':') {
            Some((name, version)) => (name, Some(version.to_owned())),
            None => (rest, None),
        };
        if name.is_empty() {
            anyhow::bail!("could not find group {s}");
        }
        Ok(Self {
            vendor: vendor.to_owned(),
            publisher: publisher.to_owned(),
            name: name.to_owned(),
            version,
        })
    }
}

impl fmt::Display for PluginGroupIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}/{}", self.vendor, self.publisher, self.name)?;
        if let Some(v) = &self.version {
            write!(f, ":{v}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_normalizes_to_kubernetes() {
        assert_eq!(Target::Unknown.normalized(), Target::Kubernetes);
        assert_eq!(Target::Kubernetes.normalized(), Target::Kubernetes);
    }

    #[test]
    fn same_plugin_honors_backcompat_alias() {
        let a = PluginIdentifier::new("login", Target::Unknown, "v1.0.0");
        let b = PluginIdentifier::new("login", Target::Kubernetes, "v1.0.0");
        assert!(a.same_plugin(&b));
    }

    #[test]
    fn version_request_parses_shortened_forms() {
        assert_eq!(VersionRequest::parse("v0").unwrap(), VersionRequest::MajorPrefix(0));
        assert_eq!(
            VersionRequest::parse("v0.2").unwrap(),
            VersionRequest::MajorMinorPrefix(0, 2)
        );
        assert_eq!(
            VersionRequest::parse("v0.2.0").unwrap(),
            VersionRequest::Full(Version::parse("0.2.0").unwrap())
        );
        assert_eq!(VersionRequest::parse("latest").unwrap(), VersionRequest::Latest);
        assert_eq!(VersionRequest::parse("").unwrap(), VersionRequest::Latest);
    }

    #[test]
    fn display_renders_the_requested_form_not_debug() {
        assert_eq!(VersionRequest::parse("v0").unwrap().to_string(), "v0");
        assert_eq!(VersionRequest::parse("v0.2").unwrap().to_string(), "v0.2");
        assert_eq!(VersionRequest::parse("v0.2.0").unwrap().to_string(), "v0.2.0");
        assert_eq!(VersionRequest::Latest.to_string(), "latest");
    }

    #[test]
    fn resolve_picks_semver_max_matching_prefix() {
        let versions = [
            Version::parse("0.2.0-beta.1").unwrap(),
            Version::parse("0.2.0").unwrap(),
            Version::parse("0.20.0").unwrap(),
        ];
        let req = VersionRequest::parse("v0").unwrap();
        assert_eq!(req.resolve(&versions), Some(&versions[2]));

        let req = VersionRequest::parse("v0.2").unwrap();
        assert_eq!(req.resolve(&versions), Some(&versions[1]));
    }

    #[test]
    fn group_id_round_trips() {
        let s = "vmware-test/default:v2.2.0";
        let id = PluginGroupIdentifier::from_id(s).unwrap();
        assert_eq!(id.to_string(), s);

        let s2 = "vmware-test/default";
        let id2 = PluginGroupIdentifier::from_id(s2).unwrap();
        assert_eq!(id2.to_string(), s2);
    }

    #[test]
    fn group_id_rejects_malformed() {
        assert!(PluginGroupIdentifier::from_id("no-slash-here").is_err());
        assert!(PluginGroupIdentifier::from_id("novendorpublisher/name").is_err());
    }
}
