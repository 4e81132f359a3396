//! Endpoint naming.
//!
//! Every server instance is identified by an [`EndpointName`] derived
//! deterministically from the toolset installation directory, so that
//! independent toolset installations on the same machine never collide and
//! repeated invocations for the same toolset always agree on the name.
//!
//! The logical name maps to three OS resources, all sharing the same stem:
//! - Windows: `\\.\pipe\<name>` (named pipe)
//! - elsewhere: `<tmp>/<name>.sock` (Unix domain socket)
//! - both: `<tmp>/<name>.lock` (singleton lease lock file)
//!
//! # Example
//!
//! ```
//! use buildserver::EndpointName;
//! use std::path::Path;
//!
//! let a = EndpointName::from_toolset_dir(Path::new("/opt/toolset"));
//! let b = EndpointName::from_toolset_dir(Path::new("/opt/toolset/"));
//! assert_eq!(a, b);
//! ```

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

/// Prefix shared by every OS resource this crate creates.
const NAME_PREFIX: &str = "buildserver";

/// Logical name of a server endpoint.
///
/// Derivation: `buildserver-<hex of SHA-256(toolset path)[0..16]>`. The
/// 128-bit digest prefix keeps distinct installations collision-resistant
/// while the derivation itself is platform-independent; only the mapping to
/// a concrete OS resource differs per platform. Recomputed fresh on every
/// invocation, never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EndpointName(String);

impl EndpointName {
    /// Derive the endpoint name for a toolset installation directory.
    ///
    /// Trailing path separators are stripped before hashing so that
    /// `/opt/tools` and `/opt/tools/` name the same endpoint. The path is
    /// not canonicalized beyond that; callers that want symlink-insensitive
    /// naming should canonicalize before calling.
    pub fn from_toolset_dir(toolset_dir: &Path) -> Self {
        let normalized = toolset_dir.to_string_lossy();
        let normalized = normalized.trim_end_matches(['/', '\\']);

        let digest = Sha256::digest(normalized.as_bytes());
        Self(format!("{}-{}", NAME_PREFIX, hex::encode(&digest[0..16])))
    }

    /// The logical name as a string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Windows named-pipe name for this endpoint.
    pub fn pipe_name(&self) -> String {
        format!(r"\\.\pipe\{}", self.0)
    }

    /// Unix domain socket path for this endpoint.
    pub fn socket_path(&self) -> PathBuf {
        std::env::temp_dir().join(format!("{}.sock", self.0))
    }

    /// Lock-file path backing the singleton lease for this endpoint.
    pub fn lock_path(&self) -> PathBuf {
        std::env::temp_dir().join(format!("{}.lock", self.0))
    }
}

impl std::fmt::Display for EndpointName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
