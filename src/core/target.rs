//! Target descriptors.
//!
//! A `TargetDescriptor` identifies the platform being configured. It is
//! built once per invocation from a triple plus explicit overrides and is
//! immutable afterwards.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors building a target descriptor.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TargetError {
    #[error("invalid target triple `{0}`: expected <arch>-<vendor>-<os>[-<env>]")]
    InvalidTriple(String),

    #[error("cannot infer pointer width for architecture `{0}`\nhelp: pass --pointer-width")]
    UnknownPointerWidth(String),

    #[error("invalid pointer width {0}: expected 16, 32 or 64")]
    InvalidPointerWidth(u32),

    #[error("invalid endianness `{0}`: expected `little` or `big`")]
    InvalidEndianness(String),
}

/// Operating system family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OsFamily {
    Linux,
    Android,
    MacOs,
    Ios,
    TvOs,
    WatchOs,
    FreeBsd,
    NetBsd,
    OpenBsd,
    Windows,
    Wasi,
    Emscripten,
    Unknown,
}

impl OsFamily {
    pub fn as_str(&self) -> &'static str {
        match self {
            OsFamily::Linux => "linux",
            OsFamily::Android => "android",
            OsFamily::MacOs => "macos",
            OsFamily::Ios => "ios",
            OsFamily::TvOs => "tvos",
            OsFamily::WatchOs => "watchos",
            OsFamily::FreeBsd => "freebsd",
            OsFamily::NetBsd => "netbsd",
            OsFamily::OpenBsd => "openbsd",
            OsFamily::Windows => "windows",
            OsFamily::Wasi => "wasi",
            OsFamily::Emscripten => "emscripten",
            OsFamily::Unknown => "unknown",
        }
    }

    /// Map the OS component of a triple to a family.
    pub fn from_triple_component(os: &str) -> Self {
        match os {
            "linux" => OsFamily::Linux,
            "android" => OsFamily::Android,
            "ios" => OsFamily::Ios,
            "tvos" => OsFamily::TvOs,
            "watchos" => OsFamily::WatchOs,
            "freebsd" => OsFamily::FreeBsd,
            "netbsd" => OsFamily::NetBsd,
            "openbsd" => OsFamily::OpenBsd,
            "windows" | "mingw32" | "cygwin" => OsFamily::Windows,
            "wasi" => OsFamily::Wasi,
            "emscripten" => OsFamily::Emscripten,
            s if s == "darwin" || s.starts_with("macos") => OsFamily::MacOs,
            s if s.starts_with("ios") => OsFamily::Ios,
            s if s.starts_with("tvos") => OsFamily::TvOs,
            s if s.starts_with("watchos") => OsFamily::WatchOs,
            _ => OsFamily::Unknown,
        }
    }
}

impl fmt::Display for OsFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Byte order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Endianness {
    Little,
    Big,
}

impl Endianness {
    pub fn as_str(&self) -> &'static str {
        match self {
            Endianness::Little => "little",
            Endianness::Big => "big",
        }
    }
}

impl fmt::Display for Endianness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Endianness {
    type Err = TargetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "little" | "le" => Ok(Endianness::Little),
            "big" | "be" => Ok(Endianness::Big),
            _ => Err(TargetError::InvalidEndianness(s.to_string())),
        }
    }
}

/// Operating systems that may appear in the vendor slot of a
/// vendor-less triple such as `aarch64-linux-android`.
const VENDORLESS_OS: &[&str] = &["linux", "windows", "wasi", "emscripten", "none"];

/// The platform being configured.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct TargetDescriptor {
    /// Triple as given (e.g. `x86_64-apple-ios-simulator`)
    pub triple: String,
    pub arch: String,
    pub vendor: String,
    pub os: OsFamily,
    /// ABI/libc/environment component (gnu, musl, simulator, ...)
    pub env: Option<String>,
    /// Pointer width in bits
    pub pointer_width: u32,
    /// Declared byte order, if known
    pub endianness: Option<Endianness>,
}

impl TargetDescriptor {
    /// Parse a triple, inferring pointer width and byte order from the
    /// architecture.
    pub fn from_triple(triple: &str) -> Result<Self, TargetError> {
        let mut target = Self::parse_components(triple)?;
        target.pointer_width = infer_pointer_width(&target.arch)
            .ok_or_else(|| TargetError::UnknownPointerWidth(target.arch.clone()))?;
        Ok(target)
    }

    /// Parse a triple, letting explicit values override the inferred ones.
    ///
    /// An unknown architecture is accepted when a pointer width is given.
    pub fn with_overrides(
        triple: &str,
        pointer_width: Option<u32>,
        endianness: Option<Endianness>,
        env: Option<&str>,
    ) -> Result<Self, TargetError> {
        let mut target = match pointer_width {
            Some(width) => Self::parse_components(triple)?.with_pointer_width(width)?,
            None => Self::from_triple(triple)?,
        };

        if let Some(endian) = endianness {
            target.endianness = Some(endian);
        }
        if let Some(env) = env {
            target.env = Some(env.to_string());
        }
        Ok(target)
    }

    /// Split a triple into its components; pointer width is left at zero.
    fn parse_components(triple: &str) -> Result<Self, TargetError> {
        let parts: Vec<&str> = triple.split('-').collect();
        if parts.len() < 2 || parts.iter().any(|p| p.is_empty()) {
            return Err(TargetError::InvalidTriple(triple.to_string()));
        }

        let arch = parts[0].to_string();
        let (vendor, os, env) = if VENDORLESS_OS.contains(&parts[1]) {
            ("unknown", parts[1], parts.get(2).copied())
        } else if parts.len() >= 3 {
            (parts[1], parts[2], parts.get(3).copied())
        } else {
            return Err(TargetError::InvalidTriple(triple.to_string()));
        };

        let mut os_family = OsFamily::from_triple_component(os);
        if os_family == OsFamily::Linux && env.is_some_and(|e| e.starts_with("android")) {
            os_family = OsFamily::Android;
        }

        Ok(TargetDescriptor {
            triple: triple.to_string(),
            endianness: infer_endianness(&arch),
            arch,
            vendor: vendor.to_string(),
            os: os_family,
            env: env.map(|e| e.to_string()),
            pointer_width: 0,
        })
    }

    /// Replace the pointer width.
    pub fn with_pointer_width(mut self, width: u32) -> Result<Self, TargetError> {
        if !matches!(width, 16 | 32 | 64) {
            return Err(TargetError::InvalidPointerWidth(width));
        }
        self.pointer_width = width;
        Ok(self)
    }

    /// Replace the declared byte order.
    pub fn with_endianness(mut self, endianness: Endianness) -> Self {
        self.endianness = Some(endianness);
        self
    }

    /// Pointer size in bytes.
    pub fn pointer_bytes(&self) -> i64 {
        i64::from(self.pointer_width / 8)
    }

    /// One-line summary used in manifest banners.
    pub fn summary(&self) -> String {
        let endian = self
            .endianness
            .map(|e| format!("{}-endian", e))
            .unwrap_or_else(|| "unknown-endian".to_string());
        format!("{} ({}-bit, {})", self.triple, self.pointer_width, endian)
    }
}

impl fmt::Display for TargetDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.triple)
    }
}

fn infer_pointer_width(arch: &str) -> Option<u32> {
    match arch {
        "arm64_32" | "aarch64_ilp32" => Some(32),
        "avr" | "msp430" => Some(16),
        "x86_64" | "amd64" | "aarch64" | "aarch64_be" | "arm64" | "arm64e" | "s390x"
        | "sparc64" | "sparcv9" | "wasm64" => Some(64),
        "x86" | "i386" | "i486" | "i586" | "i686" | "wasm32" | "mips" | "mipsel" | "powerpc"
        | "sparc" | "m68k" | "hexagon" => Some(32),
        a if a.starts_with("powerpc64")
            || a.starts_with("ppc64")
            || a.starts_with("riscv64")
            || a.starts_with("mips64")
            || a.starts_with("loongarch64") =>
        {
            Some(64)
        }
        a if a.starts_with("arm") || a.starts_with("thumb") || a.starts_with("riscv32") => {
            Some(32)
        }
        _ => None,
    }
}

fn infer_endianness(arch: &str) -> Option<Endianness> {
    match arch {
        "aarch64_be" | "s390x" | "sparc" | "sparc64" | "sparcv9" | "m68k" | "mips" | "mips64"
        | "powerpc" | "powerpc64" | "ppc64" => Some(Endianness::Big),
        a if a.ends_with("le") || a.ends_with("el") => Some(Endianness::Little),
        a if a.ends_with("eb") || a.ends_with("_be") => Some(Endianness::Big),
        "x86_64" | "amd64" | "x86" | "i386" | "i486" | "i586" | "i686" | "aarch64" | "arm64"
        | "arm64e" | "arm64_32" | "wasm32" | "wasm64" | "avr" | "msp430" | "hexagon" => {
            Some(Endianness::Little)
        }
        a if a.starts_with("arm")
            || a.starts_with("thumb")
            || a.starts_with("riscv")
            || a.starts_with("loongarch") =>
        {
            Some(Endianness::Little)
        }
        _ => None,
    }
}

/// Target description as written in a TOML file (`[target]` table).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetSpec {
    pub triple: Option<String>,
    pub pointer_width: Option<u32>,
    pub endianness: Option<String>,
    pub env: Option<String>,
}

impl TargetSpec {
    /// Build a descriptor, returning `None` when no triple is present.
    pub fn to_descriptor(&self) -> Result<Option<TargetDescriptor>, TargetError> {
        let Some(triple) = self.triple.as_deref() else {
            return Ok(None);
        };
        let endianness = self
            .endianness
            .as_deref()
            .map(str::parse::<Endianness>)
            .transpose()?;
        TargetDescriptor::with_overrides(triple, self.pointer_width, endianness, self.env.as_deref())
            .map(Some)
    }
}

/// Restricts a rule or invariant to matching targets.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TargetCondition {
    pub os: Option<String>,
    pub arch: Option<String>,
    pub env: Option<String>,
}

impl TargetCondition {
    /// Check if this condition matches the given target.
    pub fn matches(&self, target: &TargetDescriptor) -> bool {
        if let Some(ref os) = self.os {
            if os != target.os.as_str() {
                return false;
            }
        }
        if let Some(ref arch) = self.arch {
            if arch != &target.arch {
                return false;
            }
        }
        if let Some(ref env) = self.env {
            if Some(env.as_str()) != target.env.as_deref() {
                return false;
            }
        }
        true
    }
}
