//! Checksum files published next to release assets.
//!
//! Release pages commonly ship `<asset>.sha1` / `<asset>.sha256` files in one
//! of two layouts:
//!
//! ```text
//! 3f786850e387550fdab836ed7e6dc881de23001b  concourse-7.13.1-linux-amd64.tgz
//! SHA1(concourse-7.13.1-linux-amd64.tgz) = 3f786850e387550fdab836ed7e6dc881de23001b
//! ```
//!
//! [`extract`] finds the digest for one exact file name, [`resolve`] fetches
//! the companion file first.

use crate::backend::Fetcher;
use crate::error::{Error, Result};
use regex::Regex;
use sha1::Sha1;
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

/// Supported digest algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Algorithm {
    /// 160-bit SHA-1.
    Sha1,
    /// 256-bit SHA-2.
    Sha256,
}

impl Algorithm {
    /// Extension of the companion checksum file.
    #[must_use]
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Sha1 => "sha1",
            Self::Sha256 => "sha256",
        }
    }

    /// Tag used by the BSD layout.
    #[must_use]
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Sha1 => "SHA1",
            Self::Sha256 => "SHA256",
        }
    }

    /// Length of the hex-encoded digest.
    #[must_use]
    pub fn hex_len(&self) -> usize {
        match self {
            Self::Sha1 => 40,
            Self::Sha256 => 64,
        }
    }

    /// Command printing `<digest>  <path>` on a Linux host.
    #[must_use]
    pub fn sum_command(&self) -> &'static str {
        match self {
            Self::Sha1 => "sha1sum",
            Self::Sha256 => "sha256sum",
        }
    }

    /// Check that `digest` is well-formed lowercase hex for this algorithm.
    #[must_use]
    pub fn is_valid_digest(&self, digest: &str) -> bool {
        digest.len() == self.hex_len()
            && digest
                .bytes()
                .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for Algorithm {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sha1" => Ok(Self::Sha1),
            "sha256" => Ok(Self::Sha256),
            other => Err(format!("unsupported checksum algorithm: {other}")),
        }
    }
}

/// An expected digest.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Checksum {
    /// Algorithm the digest was computed with.
    pub algorithm: Algorithm,
    /// Lowercase hex digest.
    pub digest: String,
}

impl Checksum {
    /// Build a checksum, normalising case. Returns `None` for malformed digests.
    #[must_use]
    pub fn new(algorithm: Algorithm, digest: &str) -> Option<Self> {
        let digest = digest.trim().to_ascii_lowercase();
        algorithm
            .is_valid_digest(&digest)
            .then_some(Self { algorithm, digest })
    }

    /// Shorthand for a SHA-1 checksum.
    #[must_use]
    pub fn sha1(digest: &str) -> Option<Self> {
        Self::new(Algorithm::Sha1, digest)
    }

    /// Shorthand for a SHA-256 checksum.
    #[must_use]
    pub fn sha256(digest: &str) -> Option<Self> {
        Self::new(Algorithm::Sha256, digest)
    }

    /// Whether `bytes` hash to this digest.
    #[must_use]
    pub fn matches(&self, bytes: &[u8]) -> bool {
        digest(self.algorithm, bytes) == self.digest
    }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.algorithm, self.digest)
    }
}

/// Hex digest of `bytes`.
#[must_use]
pub fn digest(algorithm: Algorithm, bytes: &[u8]) -> String {
    match algorithm {
        Algorithm::Sha1 => format!("{:x}", Sha1::digest(bytes)),
        Algorithm::Sha256 => format!("{:x}", Sha256::digest(bytes)),
    }
}

/// File name of the asset a URL points at (query and fragment ignored).
#[must_use]
pub fn asset_filename(url: &str) -> Option<&str> {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    path.rsplit('/').next().filter(|name| !name.is_empty())
}

/// Extract the digest for exactly `filename` from checksum-file content.
///
/// Returns `None` when no line names the file or the digest is malformed.
#[must_use]
pub fn extract(content: &str, filename: &str, algorithm: Algorithm) -> Option<String> {
    let bsd = Regex::new(&format!(
        r"^{} ?\({}\) = ([0-9a-f]{{{}}})$",
        algorithm.tag(),
        regex::escape(filename),
        algorithm.hex_len()
    ))
    .ok()?;

    for line in content.lines().map(str::trim) {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if let [hash, name] = parts.as_slice() {
            let name = name.strip_prefix('*').unwrap_or(name);
            if name == filename && algorithm.is_valid_digest(hash) {
                return Some((*hash).to_string());
            }
        }

        if let Some(caps) = bsd.captures(line) {
            return Some(caps[1].to_string());
        }
    }

    None
}

/// Fetch `<asset_url>.<ext>` and extract the digest for the asset.
///
/// # Errors
///
/// Fails only when the checksum file cannot be fetched. A reachable file
/// without a matching line yields `Ok(None)`.
pub fn resolve(
    fetcher: &dyn Fetcher,
    asset_url: &str,
    algorithm: Algorithm,
) -> Result<Option<Checksum>> {
    let filename =
        asset_filename(asset_url).ok_or_else(|| Error::InvalidUrl(asset_url.to_string()))?;
    let checksum_url = format!("{asset_url}.{}", algorithm.extension());

    let content = fetcher.fetch_text(&checksum_url)?;
    let found = extract(content.trim(), filename, algorithm)
        .and_then(|digest| Checksum::new(algorithm, &digest));

    match &found {
        Some(checksum) => log::debug!("{filename}: {checksum}"),
        None => log::warn!("{checksum_url} has no entry for {filename}"),
    }

    Ok(found)
}
