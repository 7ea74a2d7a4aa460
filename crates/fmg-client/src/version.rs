//! Appliance version detection and version-aware endpoint selection

use std::fmt;
use std::str::FromStr;

use serde::Serialize;
use serde_json::Value;

use crate::error::{FmgError, Result};

/// Parsed appliance version
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct VersionTag {
    pub major: u32,
    pub minor: u32,
    pub patch: Option<u32>,
}

impl VersionTag {
    pub fn new(major: u32, minor: u32, patch: Option<u32>) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Parse strings such as `v7.6.2-build3401 241107 (GA)`, `7.0.1` or `7.4`.
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        let trimmed = trimmed
            .strip_prefix('v')
            .or_else(|| trimmed.strip_prefix('V'))
            .unwrap_or(trimmed);
        let core = trimmed
            .split(|c: char| c == '-' || c.is_whitespace())
            .next()?;

        let mut parts = core.split('.');
        let major = parts.next()?.parse().ok()?;
        let minor = parts.next()?.parse().ok()?;
        let patch = match parts.next() {
            Some(p) => Some(p.parse().ok()?),
            None => None,
        };
        if parts.next().is_some() {
            return None;
        }
        Some(Self::new(major, minor, patch))
    }

    /// Extract the version from a `/sys/status` payload.
    ///
    /// Numeric `Major`/`Minor` fields win over the `Version` string.
    pub fn from_status(status: &Value) -> Option<Self> {
        let number = |key: &str| -> Option<u32> {
            match status.get(key)? {
                Value::Number(n) => n.as_u64().and_then(|v| u32::try_from(v).ok()),
                Value::String(s) => s.trim().parse().ok(),
                _ => None,
            }
        };

        if let (Some(major), Some(minor)) = (number("Major"), number("Minor")) {
            return Some(Self::new(major, minor, number("Patch")));
        }

        status
            .get("Version")
            .and_then(Value::as_str)
            .and_then(Self::parse)
    }

    pub fn generation(&self) -> ApiGeneration {
        match (self.major, self.minor) {
            (major, _) if major < 7 => ApiGeneration::V6_4,
            (7, 0..=1) => ApiGeneration::V7_0,
            (7, 2..=3) => ApiGeneration::V7_2,
            _ => ApiGeneration::V7_4,
        }
    }
}

impl fmt::Display for VersionTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.patch {
            Some(patch) => write!(f, "{}.{}.{}", self.major, self.minor, patch),
            None => write!(f, "{}.{}", self.major, self.minor),
        }
    }
}

/// The four incompatible API surfaces. 7.4 and 7.6 share one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum ApiGeneration {
    #[serde(rename = "6.4")]
    V6_4,
    #[serde(rename = "7.0")]
    V7_0,
    #[serde(rename = "7.2")]
    V7_2,
    #[serde(rename = "7.4+")]
    V7_4,
}

impl ApiGeneration {
    pub const NEWEST: ApiGeneration = ApiGeneration::V7_4;
}

impl fmt::Display for ApiGeneration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ApiGeneration::V6_4 => "6.4",
            ApiGeneration::V7_0 => "7.0",
            ApiGeneration::V7_2 => "7.2",
            ApiGeneration::V7_4 => "7.4+",
        })
    }
}

/// Version detected for the current session
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ResolvedVersion {
    Known { version: VersionTag },
    /// The appliance reported something unparseable; the newest mapping is used
    Unrecognized { raw: String },
}

impl ResolvedVersion {
    pub fn generation(&self) -> ApiGeneration {
        match self {
            ResolvedVersion::Known { version } => version.generation(),
            ResolvedVersion::Unrecognized { .. } => ApiGeneration::NEWEST,
        }
    }

    pub fn tag(&self) -> Option<VersionTag> {
        match self {
            ResolvedVersion::Known { version } => Some(*version),
            ResolvedVersion::Unrecognized { .. } => None,
        }
    }
}

/// Named operation whose endpoint may differ between API generations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    SystemStatus,
    HaStatus,
    AdomList,
    DeviceList,
    PackageList,
    PackageInstall,
    TaskStatus,
    TaskLines,
    WorkspaceLock,
    WorkspaceUnlock,
    WorkspaceCommit,
    ScriptList,
    ScriptRun,
    DeviceProxy,
    FirewallAddress,
    FirewallPolicy,
}

impl Capability {
    pub const ALL: [Capability; 16] = [
        Capability::SystemStatus,
        Capability::HaStatus,
        Capability::AdomList,
        Capability::DeviceList,
        Capability::PackageList,
        Capability::PackageInstall,
        Capability::TaskStatus,
        Capability::TaskLines,
        Capability::WorkspaceLock,
        Capability::WorkspaceUnlock,
        Capability::WorkspaceCommit,
        Capability::ScriptList,
        Capability::ScriptRun,
        Capability::DeviceProxy,
        Capability::FirewallAddress,
        Capability::FirewallPolicy,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::SystemStatus => "system_status",
            Capability::HaStatus => "ha_status",
            Capability::AdomList => "adom_list",
            Capability::DeviceList => "device_list",
            Capability::PackageList => "package_list",
            Capability::PackageInstall => "package_install",
            Capability::TaskStatus => "task_status",
            Capability::TaskLines => "task_lines",
            Capability::WorkspaceLock => "workspace_lock",
            Capability::WorkspaceUnlock => "workspace_unlock",
            Capability::WorkspaceCommit => "workspace_commit",
            Capability::ScriptList => "script_list",
            Capability::ScriptRun => "script_run",
            Capability::DeviceProxy => "device_proxy",
            Capability::FirewallAddress => "firewall_address",
            Capability::FirewallPolicy => "firewall_policy",
        }
    }

    /// Path templates keyed by the oldest generation they apply to, oldest first.
    fn paths(&self) -> &'static [(ApiGeneration, &'static str)] {
        use ApiGeneration::*;
        match self {
            Capability::SystemStatus => &[(V6_4, "/sys/status")],
            Capability::HaStatus => &[(V6_4, "/sys/ha/status")],
            Capability::AdomList => &[(V6_4, "/dvmdb/adom")],
            Capability::DeviceList => &[(V6_4, "/dvmdb/adom/{adom}/device")],
            Capability::PackageList => &[(V6_4, "/pm/pkg/adom/{adom}")],
            Capability::PackageInstall => &[(V6_4, "/securityconsole/install/package")],
            Capability::TaskStatus => &[(V6_4, "/task/task/{task}")],
            Capability::TaskLines => &[(V6_4, "/task/task/{task}/line")],
            Capability::WorkspaceLock => &[(V6_4, "/dvmdb/adom/{adom}/workspace/lock")],
            Capability::WorkspaceUnlock => &[(V6_4, "/dvmdb/adom/{adom}/workspace/unlock")],
            Capability::WorkspaceCommit => &[(V6_4, "/dvmdb/adom/{adom}/workspace/commit")],
            Capability::ScriptList => &[(V6_4, "/dvmdb/adom/{adom}/script")],
            Capability::ScriptRun => &[
                (V6_4, "/dvmdb/script/execute"),
                (V7_4, "/dvmdb/adom/{adom}/script/execute"),
            ],
            Capability::DeviceProxy => &[(V6_4, "/sys/proxy"), (V7_0, "/sys/proxy/json")],
            Capability::FirewallAddress => &[(V6_4, "/pm/config/adom/{adom}/obj/firewall/address")],
            Capability::FirewallPolicy => &[(
                V6_4,
                "/pm/config/adom/{adom}/pkg/{package}/firewall/policy",
            )],
        }
    }

    /// True when the path differs between generations
    pub fn is_versioned(&self) -> bool {
        self.paths().len() > 1
    }

    /// Path template for `generation`
    pub fn path_for(&self, generation: ApiGeneration) -> &'static str {
        let paths = self.paths();
        paths
            .iter()
            .rev()
            .find(|(since, _)| *since <= generation)
            .or_else(|| paths.first())
            .map(|(_, path)| *path)
            .unwrap_or("")
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Capability {
    type Err = FmgError;

    fn from_str(s: &str) -> Result<Self> {
        Capability::ALL
            .iter()
            .find(|c| c.as_str() == s)
            .copied()
            .ok_or_else(|| FmgError::UnknownCapability(s.to_string()))
    }
}

/// Substitute `{name}` placeholders in a path template.
///
/// Placeholders without a value are left in place.
pub fn render(template: &str, params: &[(&str, &str)]) -> String {
    let mut path = template.to_string();
    for (name, value) in params {
        path = path.replace(&format!("{{{}}}", name), value);
    }
    path
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_version_strings() {
        assert_eq!(
            VersionTag::parse("v7.6.2-build3401 241107 (GA)"),
            Some(VersionTag::new(7, 6, Some(2)))
        );
        assert_eq!(VersionTag::parse("7.0.1"), Some(VersionTag::new(7, 0, Some(1))));
        assert_eq!(VersionTag::parse("7.4"), Some(VersionTag::new(7, 4, None)));
        assert_eq!(VersionTag::parse("garbage"), None);
        assert_eq!(VersionTag::parse(""), None);
        assert_eq!(VersionTag::parse("7.x"), None);
    }

    #[test]
    fn test_from_status_prefers_numeric_fields() {
        let status = json!({"Version": "v7.2.5-build1", "Major": 7, "Minor": 4, "Patch": 3});
        assert_eq!(
            VersionTag::from_status(&status),
            Some(VersionTag::new(7, 4, Some(3)))
        );

        let status = json!({"Version": "v6.4.14-build2 (GA)"});
        assert_eq!(
            VersionTag::from_status(&status),
            Some(VersionTag::new(6, 4, Some(14)))
        );

        assert_eq!(VersionTag::from_status(&json!({"Hostname": "fmg"})), None);
    }

    #[test]
    fn test_generations() {
        assert_eq!(VersionTag::new(6, 4, Some(9)).generation(), ApiGeneration::V6_4);
        assert_eq!(VersionTag::new(7, 0, Some(1)).generation(), ApiGeneration::V7_0);
        assert_eq!(VersionTag::new(7, 2, None).generation(), ApiGeneration::V7_2);
        assert_eq!(VersionTag::new(7, 4, None).generation(), ApiGeneration::V7_4);
        assert_eq!(VersionTag::new(7, 6, Some(2)).generation(), ApiGeneration::V7_4);
        assert_eq!(VersionTag::new(8, 0, None).generation(), ApiGeneration::V7_4);
    }

    #[test]
    fn test_script_run_paths() {
        assert_eq!(
            Capability::ScriptRun.path_for(ApiGeneration::V7_0),
            "/dvmdb/script/execute"
        );
        assert_eq!(
            Capability::ScriptRun.path_for(ApiGeneration::V7_4),
            "/dvmdb/adom/{adom}/script/execute"
        );
        assert_eq!(
            Capability::DeviceProxy.path_for(ApiGeneration::V6_4),
            "/sys/proxy"
        );
        assert!(Capability::ScriptRun.is_versioned());
        assert!(!Capability::WorkspaceLock.is_versioned());
    }

    #[test]
    fn test_unrecognized_uses_newest() {
        let resolved = ResolvedVersion::Unrecognized {
            raw: "banana".to_string(),
        };
        assert_eq!(resolved.generation(), ApiGeneration::NEWEST);
    }

    #[test]
    fn test_capability_names() {
        for cap in Capability::ALL {
            assert_eq!(cap.as_str().parse::<Capability>().unwrap(), cap);
        }
        assert!(matches!(
            "warp_drive".parse::<Capability>(),
            Err(FmgError::UnknownCapability(_))
        ));
    }

    #[test]
    fn test_render() {
        assert_eq!(
            render("/pm/config/adom/{adom}/pkg/{package}/firewall/policy", &[
                ("adom", "root"),
                ("package", "default")
            ]),
            "/pm/config/adom/root/pkg/default/firewall/policy"
        );
        assert_eq!(render("/task/task/{task}", &[]), "/task/task/{task}");
    }
}
