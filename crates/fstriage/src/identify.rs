//! Content-type identification
//!
//! Three tiers, tried in order until one gives a usable label:
//!
//! 1. content signature: full sniffing against the shared-mime-info database
//! 2. lightweight signature: a built-in magic-number table over the file header
//! 3. extension guess: conventional extension table, always answers
//!
//! Which of the first two tiers exist is decided once by [`Capabilities::detect`].
//! Per-file code only consults tiers that were found available; a tier that
//! cannot read the file simply reports nothing and the next tier runs.

use crate::config::IdentifyConfig;
use crate::types::{DetectionMethod, UNKNOWN_MIME};
use serde::Serialize;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::{debug, info};

/// Bytes read from the start of a file for the lightweight tier.
const HEADER_LEN: u64 = 512;

/// Identification tiers available in this process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Capabilities {
    content_sniff: bool,
    signatures: bool,
}

impl Capabilities {
    /// Probe what this build and host can do, restricted by `config`.
    pub fn detect(config: &IdentifyConfig) -> Self {
        let content_sniff = config.content_sniff && content_sniffer_available();
        let caps = Self {
            content_sniff,
            signatures: config.signatures,
        };
        info!(
            content_sniff = caps.content_sniff,
            signatures = caps.signatures,
            "Identification capabilities detected"
        );
        caps
    }

    /// Extension guessing only.
    pub fn extension_only() -> Self {
        Self {
            content_sniff: false,
            signatures: false,
        }
    }

    /// Extension guessing plus the built-in signature table.
    pub fn signatures_only() -> Self {
        Self {
            content_sniff: false,
            signatures: true,
        }
    }

    pub fn content_sniff(&self) -> bool {
        self.content_sniff
    }

    pub fn signatures(&self) -> bool {
        self.signatures
    }

    /// Tiers that will be attempted, in order.
    pub fn methods(&self) -> Vec<DetectionMethod> {
        let mut methods = Vec::with_capacity(3);
        if self.content_sniff {
            methods.push(DetectionMethod::ContentSignature);
        }
        if self.signatures {
            methods.push(DetectionMethod::LightweightSignature);
        }
        methods.push(DetectionMethod::ExtensionGuess);
        methods
    }
}

#[cfg(feature = "content-sniff")]
fn content_sniffer_available() -> bool {
    // Without a MIME database the sniffer can only answer octet-stream/text.
    let probe = tree_magic_mini::from_u8(b"%PDF-1.4\n%\xe2\xe3\xcf\xd3\n1 0 obj\n");
    let available = probe == "application/pdf";
    if !available {
        debug!(probe, "Content sniffer present but MIME database unavailable");
    }
    available
}

#[cfg(not(feature = "content-sniff"))]
fn content_sniffer_available() -> bool {
    false
}

/// Label and producing tier for one file
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Identification {
    pub mime: String,
    pub method: DetectionMethod,
}

/// Tiered content-type identifier
#[derive(Debug, Clone)]
pub struct Identifier {
    caps: Capabilities,
}

impl Identifier {
    pub fn new(caps: Capabilities) -> Self {
        Self { caps }
    }

    pub fn capabilities(&self) -> Capabilities {
        self.caps
    }

    /// Identify `path`. Never fails: the extension tier always produces a label.
    pub fn identify(&self, path: &Path) -> Identification {
        if self.caps.content_sniff {
            if let Some(mime) = sniff_content(path) {
                return Identification {
                    mime,
                    method: DetectionMethod::ContentSignature,
                };
            }
        }

        if self.caps.signatures {
            if let Some(mime) = sniff_signature(path) {
                return Identification {
                    mime: mime.to_string(),
                    method: DetectionMethod::LightweightSignature,
                };
            }
        }

        Identification {
            mime: guess_from_extension(path).to_string(),
            method: DetectionMethod::ExtensionGuess,
        }
    }
}

fn is_usable(mime: &str) -> bool {
    !mime.is_empty() && mime != UNKNOWN_MIME
}

#[cfg(feature = "content-sniff")]
fn sniff_content(path: &Path) -> Option<String> {
    match tree_magic_mini::from_filepath(path) {
        Some(mime) if is_usable(mime) => Some(mime.to_string()),
        Some(_) => None,
        None => {
            debug!(path = %path.display(), "Content sniffer could not read file");
            None
        }
    }
}

#[cfg(not(feature = "content-sniff"))]
fn sniff_content(_path: &Path) -> Option<String> {
    None
}

fn sniff_signature(path: &Path) -> Option<&'static str> {
    let header = match read_header(path) {
        Ok(header) => header,
        Err(err) => {
            debug!(path = %path.display(), error = %err, "Signature tier could not read header");
            return None;
        }
    };
    match_signature(&header).filter(|mime| is_usable(mime))
}

fn read_header(path: &Path) -> std::io::Result<Vec<u8>> {
    let mut header = Vec::with_capacity(HEADER_LEN as usize);
    File::open(path)?.take(HEADER_LEN).read_to_end(&mut header)?;
    Ok(header)
}

fn guess_from_extension(path: &Path) -> &'static str {
    mime_guess::from_path(path).first_raw().unwrap_or(UNKNOWN_MIME)
}

// ============================================================================
// Magic-number table
// ============================================================================

struct Signature {
    /// Every (offset, bytes) pair must match
    parts: &'static [(usize, &'static [u8])],
    mime: &'static str,
}

#[rustfmt::skip]
const SIGNATURES: &[Signature] = &[
    // Documents
    Signature { parts: &[(0, b"%PDF-")], mime: "application/pdf" },
    Signature { parts: &[(0, b"%!PS")], mime: "application/postscript" },
    Signature { parts: &[(0, b"{\\rtf")], mime: "application/rtf" },
    Signature {
        parts: &[(0, &[0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1])],
        mime: "application/x-ole-storage",
    },
    Signature { parts: &[(0, b"SQLite format 3\0")], mime: "application/vnd.sqlite3" },
    Signature { parts: &[(0, b"PAR1")], mime: "application/vnd.apache.parquet" },
    // Images
    Signature { parts: &[(0, &[0xFF, 0xD8, 0xFF])], mime: "image/jpeg" },
    Signature {
        parts: &[(0, &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A])],
        mime: "image/png",
    },
    Signature { parts: &[(0, b"GIF87a")], mime: "image/gif" },
    Signature { parts: &[(0, b"GIF89a")], mime: "image/gif" },
    Signature { parts: &[(0, b"RIFF"), (8, b"WEBP")], mime: "image/webp" },
    Signature { parts: &[(0, b"II*\0")], mime: "image/tiff" },
    Signature { parts: &[(0, b"MM\0*")], mime: "image/tiff" },
    Signature { parts: &[(0, &[0x00, 0x00, 0x01, 0x00])], mime: "image/x-icon" },
    Signature { parts: &[(0, b"BM")], mime: "image/bmp" },
    // Audio / video
    Signature { parts: &[(0, b"RIFF"), (8, b"WAVE")], mime: "audio/wav" },
    Signature { parts: &[(0, b"RIFF"), (8, b"AVI ")], mime: "video/x-msvideo" },
    Signature { parts: &[(0, b"ID3")], mime: "audio/mpeg" },
    Signature { parts: &[(0, b"fLaC")], mime: "audio/flac" },
    Signature { parts: &[(0, b"OggS")], mime: "audio/ogg" },
    Signature { parts: &[(4, b"ftyp")], mime: "video/mp4" },
    Signature { parts: &[(0, &[0x1A, 0x45, 0xDF, 0xA3])], mime: "video/x-matroska" },
    // Archives
    Signature { parts: &[(0, b"PK\x03\x04")], mime: "application/zip" },
    Signature { parts: &[(0, &[0x1F, 0x8B])], mime: "application/gzip" },
    Signature { parts: &[(0, b"BZh")], mime: "application/x-bzip2" },
    Signature {
        parts: &[(0, &[0xFD, b'7', b'z', b'X', b'Z', 0x00])],
        mime: "application/x-xz",
    },
    Signature {
        parts: &[(0, &[b'7', b'z', 0xBC, 0xAF, 0x27, 0x1C])],
        mime: "application/x-7z-compressed",
    },
    Signature { parts: &[(0, b"Rar!\x1A\x07")], mime: "application/vnd.rar" },
    Signature { parts: &[(0, &[0x28, 0xB5, 0x2F, 0xFD])], mime: "application/zstd" },
    Signature { parts: &[(257, b"ustar")], mime: "application/x-tar" },
    // Executables
    Signature { parts: &[(0, b"\x7FELF")], mime: "application/x-executable" },
    Signature { parts: &[(0, b"\0asm")], mime: "application/wasm" },
    Signature { parts: &[(0, &[0xCF, 0xFA, 0xED, 0xFE])], mime: "application/x-mach-binary" },
    Signature { parts: &[(0, &[0xCE, 0xFA, 0xED, 0xFE])], mime: "application/x-mach-binary" },
    Signature { parts: &[(0, &[0xFE, 0xED, 0xFA, 0xCF])], mime: "application/x-mach-binary" },
    Signature { parts: &[(0, &[0xFE, 0xED, 0xFA, 0xCE])], mime: "application/x-mach-binary" },
    Signature { parts: &[(0, &[0xCA, 0xFE, 0xBA, 0xBE])], mime: "application/java-vm" },
    Signature {
        parts: &[(0, b"MZ")],
        mime: "application/vnd.microsoft.portable-executable",
    },
];

/// Match a file header against the built-in signature table.
pub fn match_signature(header: &[u8]) -> Option<&'static str> {
    SIGNATURES
        .iter()
        .find(|sig| {
            sig.parts.iter().all(|(offset, magic)| {
                header
                    .get(*offset..offset + magic.len())
                    .map_or(false, |window| window == *magic)
            })
        })
        .map(|sig| sig.mime)
}
