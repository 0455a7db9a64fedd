//! Locating and describing backend executables
//!
//! The writer engine never spawns a program by bare name. It asks a
//! [`BinaryLocator`] for an [`ExternalBin`], which carries the resolved path,
//! the version the program reported about itself, and the feature flags the
//! argument builder needs (for example whether `gracetime=` is understood).

use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::str::FromStr;

/// Feature: supports `driveropts=burnfree`
pub const FEATURE_BURNFREE: &str = "burnfree";

/// Feature: supports `-overburn`
pub const FEATURE_OVERBURN: &str = "overburn";

/// Feature: supports `gracetime=`
pub const FEATURE_GRACETIME: &str = "gracetime";

/// Feature: installed setuid root
pub const FEATURE_SUIDROOT: &str = "suidroot";

/// Version of an external program, e.g. `2.01.01a03`
///
/// Pre-release suffixes sort before the release they belong to, so
/// `1.11a02 < 1.11`.
#[derive(Debug, Clone, Eq, Default)]
pub struct BinVersion {
    /// Major number
    pub major: u32,
    /// Minor number
    pub minor: u32,
    /// Patch level, if present
    pub patch: Option<u32>,
    /// Suffix such as `a02`
    pub suffix: Option<String>,
    /// Text the version was parsed from, shown as-is
    text: Option<String>,
}

impl BinVersion {
    /// Build a version from its parts
    pub fn new(major: u32, minor: u32, patch: Option<u32>, suffix: Option<&str>) -> Self {
        Self {
            major,
            minor,
            patch,
            suffix: suffix.map(str::to_string),
            text: None,
        }
    }
}

impl FromStr for BinVersion {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let numeric_end = s
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(s.len());
        let (numbers, suffix) = s.split_at(numeric_end);

        let mut parts = numbers.split('.').filter(|p| !p.is_empty());
        let parse = |p: Option<&str>| -> Result<Option<u32>, String> {
            p.map(|p| p.parse::<u32>().map_err(|e| format!("{}: {}", p, e)))
                .transpose()
        };

        let major = parse(parts.next())?.ok_or_else(|| format!("Invalid version: {}", s))?;
        let minor = parse(parts.next())?.unwrap_or(0);
        let patch = parse(parts.next())?;

        Ok(Self {
            major,
            minor,
            patch,
            suffix: (!suffix.is_empty()).then(|| suffix.to_string()),
            text: Some(s.to_string()),
        })
    }
}

impl Ord for BinVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        self.major
            .cmp(&other.major)
            .then(self.minor.cmp(&other.minor))
            .then(self.patch.unwrap_or(0).cmp(&other.patch.unwrap_or(0)))
            .then_with(|| match (&self.suffix, &other.suffix) {
                (None, None) => Ordering::Equal,
                (None, Some(_)) => Ordering::Greater,
                (Some(_), None) => Ordering::Less,
                (Some(a), Some(b)) => a.cmp(b),
            })
    }
}

impl PartialEq for BinVersion {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl PartialOrd for BinVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for BinVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(ref text) = self.text {
            return f.write_str(text);
        }
        write!(f, "{}.{:02}", self.major, self.minor)?;
        if let Some(patch) = self.patch {
            write!(f, ".{:02}", patch)?;
        }
        if let Some(ref suffix) = self.suffix {
            write!(f, "{}", suffix)?;
        }
        Ok(())
    }
}

/// A resolved backend executable
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalBin {
    /// Program name (e.g. `cdrecord`)
    pub name: String,
    /// Absolute path of the executable
    pub path: PathBuf,
    /// Reported version
    pub version: BinVersion,
    /// Copyright line reported by the program
    pub copyright: Option<String>,
    /// Feature flags
    pub features: BTreeSet<String>,
    /// Parameters appended to every invocation
    pub user_parameters: Vec<String>,
}

impl ExternalBin {
    /// Create a description with no features
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>, version: BinVersion) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            version,
            copyright: None,
            features: BTreeSet::new(),
            user_parameters: Vec::new(),
        }
    }

    /// Whether the program has the given feature
    pub fn has_feature(&self, feature: &str) -> bool {
        self.features.contains(feature)
    }

    /// Add a feature flag
    pub fn with_feature(mut self, feature: &str) -> Self {
        self.features.insert(feature.to_string());
        self
    }

    /// Set the parameters appended to every invocation
    pub fn with_user_parameters(mut self, params: Vec<String>) -> Self {
        self.user_parameters = params;
        self
    }
}

/// Path-resolution service for backend executables
pub trait BinaryLocator: Send + Sync {
    /// Resolve `program`, returning `None` when it is not installed
    fn locate(&self, program: &str) -> Option<ExternalBin>;
}

/// Locator that always returns the same binary, regardless of the name asked for
#[derive(Debug, Clone)]
pub struct FixedLocator(pub ExternalBin);

impl BinaryLocator for FixedLocator {
    fn locate(&self, _program: &str) -> Option<ExternalBin> {
        Some(self.0.clone())
    }
}

/// Searches configured directories, then `$PATH`, and probes the version
#[derive(Debug, Clone)]
pub struct SearchPathLocator {
    search_paths: Vec<PathBuf>,
    user_parameters: Vec<(String, Vec<String>)>,
    probe_version: bool,
    use_path_env: bool,
}

impl Default for SearchPathLocator {
    fn default() -> Self {
        Self::new()
    }
}

impl SearchPathLocator {
    /// Create a locator that searches `$PATH` and probes versions
    pub fn new() -> Self {
        Self {
            search_paths: Vec::new(),
            user_parameters: Vec::new(),
            probe_version: true,
            use_path_env: true,
        }
    }

    /// Directories searched before `$PATH`
    pub fn search_paths(mut self, paths: Vec<PathBuf>) -> Self {
        self.search_paths = paths;
        self
    }

    /// Parameters appended to every invocation of `program`
    pub fn user_parameters(mut self, program: &str, params: Vec<String>) -> Self {
        self.user_parameters.push((program.to_string(), params));
        self
    }

    /// Whether to run `<program> -version` to learn version and copyright
    pub fn probe_version(mut self, probe: bool) -> Self {
        self.probe_version = probe;
        self
    }

    /// Only search the configured directories, ignoring `$PATH`
    pub fn without_path_env(mut self) -> Self {
        self.use_path_env = false;
        self
    }

    fn candidate_dirs(&self) -> Vec<PathBuf> {
        let mut dirs = self.search_paths.clone();
        if let Some(path) = std::env::var_os("PATH").filter(|_| self.use_path_env) {
            dirs.extend(std::env::split_paths(&path));
        }
        dirs
    }

    fn find(&self, program: &str) -> Option<PathBuf> {
        self.candidate_dirs()
            .into_iter()
            .map(|dir| dir.join(program))
            .find(|candidate| is_executable(candidate))
    }
}

impl BinaryLocator for SearchPathLocator {
    fn locate(&self, program: &str) -> Option<ExternalBin> {
        let path = self.find(program)?;
        tracing::debug!("Found {} at {:?}", program, path);

        let mut bin = if self.probe_version {
            probe(program, &path)
        } else {
            ExternalBin::new(program, path.clone(), BinVersion::default())
        };

        if is_suid_root(&path) {
            bin.features.insert(FEATURE_SUIDROOT.to_string());
        }

        if let Some((_, params)) = self.user_parameters.iter().find(|(p, _)| p == program) {
            bin.user_parameters = params.clone();
        }

        Some(bin)
    }
}

/// Run `<path> -version` and build the description from its output
fn probe(program: &str, path: &Path) -> ExternalBin {
    let output = Command::new(path).arg("-version").output();
    let text = match output {
        Ok(out) => {
            let mut text = String::from_utf8_lossy(&out.stdout).into_owned();
            text.push_str(&String::from_utf8_lossy(&out.stderr));
            text
        }
        Err(e) => {
            tracing::warn!("Could not run {:?} -version: {}", path, e);
            String::new()
        }
    };

    let mut bin = ExternalBin::new(program, path, BinVersion::default());
    if let Some((version, copyright)) = parse_version_banner(&text) {
        bin.version = version;
        bin.copyright = copyright;
    } else {
        tracing::debug!("Could not parse version banner of {}: {:?}", program, text);
    }
    bin.features = derive_features(program, &bin.version);
    bin
}

/// Parse a banner such as
/// `Cdrecord-Clone 2.01.01a03 (i686-pc-linux-gnu) Copyright (C) 1995-2004 Jörg Schilling`
/// or `wodim 1.1.11`
pub fn parse_version_banner(text: &str) -> Option<(BinVersion, Option<String>)> {
    for line in text.lines() {
        let lower = line.to_ascii_lowercase();
        if !(lower.starts_with("cdrecord") || lower.starts_with("wodim")) {
            continue;
        }

        let version = line
            .split_whitespace()
            .skip(1)
            .find_map(|word| word.parse::<BinVersion>().ok())?;

        let copyright = line
            .find("Copyright (C)")
            .map(|pos| line[pos + "Copyright (C)".len()..].trim().to_string())
            .filter(|c| !c.is_empty());

        return Some((version, copyright));
    }
    None
}

/// Feature flags implied by a program's version
pub fn derive_features(program: &str, version: &BinVersion) -> BTreeSet<String> {
    let mut features = BTreeSet::new();

    if program == "wodim" {
        for f in [FEATURE_BURNFREE, FEATURE_OVERBURN, FEATURE_GRACETIME] {
            features.insert(f.to_string());
        }
        return features;
    }

    if *version >= BinVersion::new(1, 11, None, Some("a02")) {
        features.insert(FEATURE_BURNFREE.to_string());
    }
    if *version >= BinVersion::new(1, 10, None, None) {
        features.insert(FEATURE_OVERBURN.to_string());
    }
    if *version >= BinVersion::new(2, 1, Some(1), Some("a20")) {
        features.insert(FEATURE_GRACETIME.to_string());
    }
    features
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path).is_ok_and(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

#[cfg(unix)]
fn is_suid_root(path: &Path) -> bool {
    use std::os::unix::fs::MetadataExt;
    std::fs::metadata(path).is_ok_and(|m| m.uid() == 0 && m.mode() & 0o4000 != 0)
}

#[cfg(not(unix))]
fn is_suid_root(_path: &Path) -> bool {
    false
}

// ============================================================================
// UNIT TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    // -------------------------------------------------------------------------
    // Version tests
    // -------------------------------------------------------------------------

    #[test]
    fn test_parse_version() {
        let v: BinVersion = "2.01.01a03".parse().unwrap();
        assert_eq!(v, BinVersion::new(2, 1, Some(1), Some("a03")));

        let v: BinVersion = "1.11".parse().unwrap();
        assert_eq!(v, BinVersion::new(1, 11, None, None));

        let v: BinVersion = "1.1.11".parse().unwrap();
        assert_eq!(v, BinVersion::new(1, 1, Some(11), None));

        assert!("abc".parse::<BinVersion>().is_err());
        assert!("".parse::<BinVersion>().is_err());
    }

    #[test]
    fn test_version_ordering() {
        let a02: BinVersion = "1.11a02".parse().unwrap();
        let release: BinVersion = "1.11".parse().unwrap();
        let newer: BinVersion = "2.01.01a20".parse().unwrap();
        let a03: BinVersion = "1.11a03".parse().unwrap();

        assert!(a02 < release);
        assert!(release < newer);
        assert!(a02 < a03);
        assert!("1.10".parse::<BinVersion>().unwrap() < a02);
    }

    #[test]
    fn test_version_display() {
        assert_eq!(
            BinVersion::new(2, 1, Some(1), Some("a03")).to_string(),
            "2.01.01a03"
        );
        assert_eq!(BinVersion::new(1, 11, None, None).to_string(), "1.11");
    }

    #[test]
    fn test_parsed_version_displays_reported_text() {
        let wodim: BinVersion = "1.1.11".parse().unwrap();
        assert_eq!(wodim.to_string(), "1.1.11");

        let cdrecord: BinVersion = "2.01.01a03".parse().unwrap();
        assert_eq!(cdrecord.to_string(), "2.01.01a03");

        let (version, _) = parse_version_banner("wodim 1.1.11\n").unwrap();
        assert_eq!(version.to_string(), "1.1.11");
    }

    // -------------------------------------------------------------------------
    // Banner tests
    // -------------------------------------------------------------------------

    #[test]
    fn test_parse_cdrecord_banner() {
        let text = "Cdrecord-Clone 2.01.01a03 (i686-pc-linux-gnu) Copyright (C) 1995-2004 Joerg Schilling\n";
        let (version, copyright) = parse_version_banner(text).unwrap();
        assert_eq!(version, BinVersion::new(2, 1, Some(1), Some("a03")));
        assert_eq!(copyright.as_deref(), Some("1995-2004 Joerg Schilling"));
    }

    #[test]
    fn test_parse_wodim_banner() {
        let (version, copyright) = parse_version_banner("wodim 1.1.11\n").unwrap();
        assert_eq!(version, BinVersion::new(1, 1, Some(11), None));
        assert!(copyright.is_none());
    }

    #[test]
    fn test_parse_unrelated_banner() {
        assert!(parse_version_banner("usage: something else").is_none());
    }

    // -------------------------------------------------------------------------
    // Feature tests
    // -------------------------------------------------------------------------

    #[test]
    fn test_derive_features_old_cdrecord() {
        let features = derive_features("cdrecord", &"1.10".parse().unwrap());
        assert!(features.contains(FEATURE_OVERBURN));
        assert!(!features.contains(FEATURE_BURNFREE));
        assert!(!features.contains(FEATURE_GRACETIME));
    }

    #[test]
    fn test_derive_features_new_cdrecord() {
        let features = derive_features("cdrecord", &"2.01.01a33".parse().unwrap());
        assert!(features.contains(FEATURE_OVERBURN));
        assert!(features.contains(FEATURE_BURNFREE));
        assert!(features.contains(FEATURE_GRACETIME));
    }

    #[test]
    fn test_derive_features_wodim() {
        let features = derive_features("wodim", &"1.1.11".parse().unwrap());
        assert!(features.contains(FEATURE_BURNFREE));
        assert!(features.contains(FEATURE_GRACETIME));
    }

    #[test]
    fn test_external_bin_builder() {
        let bin = ExternalBin::new("cdrecord", "/usr/bin/cdrecord", BinVersion::default())
            .with_feature(FEATURE_OVERBURN)
            .with_user_parameters(vec!["-immed".to_string()]);
        assert!(bin.has_feature(FEATURE_OVERBURN));
        assert!(!bin.has_feature(FEATURE_BURNFREE));
        assert_eq!(bin.user_parameters, vec!["-immed"]);
    }

    // -------------------------------------------------------------------------
    // Locator tests
    // -------------------------------------------------------------------------

    #[test]
    fn test_locator_missing_program() {
        let locator = SearchPathLocator::new()
            .search_paths(vec![PathBuf::from("/nonexistent/bin")])
            .probe_version(false);
        assert!(locator.locate("burnish-no-such-program").is_none());
    }

    #[cfg(unix)]
    #[test]
    fn test_locator_search_path() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("cdrecord");
        std::fs::write(&path, "#!/bin/sh\necho 'Cdrecord 2.01 (x) Copyright (C) 1995-2004 J'\n")
            .unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();

        let locator = SearchPathLocator::new()
            .search_paths(vec![dir.path().to_path_buf()])
            .user_parameters("cdrecord", vec!["-immed".to_string()]);

        let bin = locator.locate("cdrecord").unwrap();
        assert_eq!(bin.path, path);
        assert_eq!(bin.version, BinVersion::new(2, 1, None, None));
        assert_eq!(bin.copyright.as_deref(), Some("1995-2004 J"));
        assert!(bin.has_feature(FEATURE_BURNFREE));
        assert_eq!(bin.user_parameters, vec!["-immed"]);
    }

    #[cfg(unix)]
    #[test]
    fn test_locator_skips_non_executable() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(dir.path().join("cdrecord"), "not executable").unwrap();

        let locator = SearchPathLocator::new()
            .search_paths(vec![dir.path().to_path_buf()])
            .probe_version(false);
        // Only found if some other cdrecord happens to be on $PATH
        if let Some(bin) = locator.locate("cdrecord") {
            assert_ne!(bin.path, dir.path().join("cdrecord"));
        }
    }
}
