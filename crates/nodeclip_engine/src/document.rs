// SPDX-License-Identifier: MIT OR Apache-2.0
//! Clipboard document and its text codec.
//!
//! Plain form is JSON. Compressed form is [`MAGIC_PREFIX`] followed by the
//! base64 encoding of the gzip-compressed JSON, which survives clipboards and
//! chat tools.

use crate::error::{Error, Result};
use crate::external::ExternalEntry;
use crate::value::SerializedObject;
use base64::Engine as _;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::{Read, Write};
use std::path::Path;

/// Version of the document format written by this engine
pub const FORMAT_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prefix marking the compressed text form
pub const MAGIC_PREFIX: &str = "NodeClip::";

/// An exported set of trees plus the ledger of things they point at
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Version of the host that produced the document
    pub host_version: String,
    /// Version of the engine that produced the document
    pub format_version: String,
    /// Name of the top-level container the last tree belongs to, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject_name: Option<String>,
    /// Trees in dependency order; the last one is the primary subject
    pub trees: Vec<SerializedObject>,
    /// External ledger, keyed by identity
    pub external: BTreeMap<u64, ExternalEntry>,
}

impl Document {
    /// The primary subject tree
    pub fn primary(&self) -> Option<&SerializedObject> {
        self.trees.last()
    }

    /// Number of serialized objects across all trees, nested ones included
    pub fn object_count(&self) -> usize {
        let mut count = 0;
        for tree in &self.trees {
            tree.walk(&mut |_| count += 1);
        }
        count
    }

    /// Encode as JSON, or as the compressed clipboard form.
    ///
    /// `indent` applies to plain JSON only; zero yields compact output.
    pub fn to_text(&self, compress: bool, indent: usize) -> Result<String> {
        if compress {
            let json = serde_json::to_vec(self)?;
            let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(&json)?;
            let zipped = encoder.finish()?;
            let encoded = base64::engine::general_purpose::STANDARD.encode(zipped);
            return Ok(format!("{MAGIC_PREFIX}{encoded}"));
        }
        if indent == 0 {
            return Ok(serde_json::to_string(self)?);
        }
        let spaces = " ".repeat(indent);
        let formatter = serde_json::ser::PrettyFormatter::with_indent(spaces.as_bytes());
        let mut out = Vec::new();
        let mut serializer = serde_json::Serializer::with_formatter(&mut out, formatter);
        self.serialize(&mut serializer)?;
        String::from_utf8(out).map_err(|e| Error::Codec(e.to_string()))
    }

    /// Decode either text form; the magic prefix selects the compressed one
    pub fn from_text(text: &str) -> Result<Self> {
        let text = text.trim();
        let mut document: Document = match text.strip_prefix(MAGIC_PREFIX) {
            Some(encoded) => serde_json::from_str(&decompress(encoded)?)?,
            None => serde_json::from_str(text)?,
        };
        for (id, entry) in document.external.iter_mut() {
            entry.external_id = *id;
        }
        Ok(document)
    }

    /// Write to a file
    pub fn to_file(&self, path: &Path, compress: bool, indent: usize) -> Result<()> {
        std::fs::write(path, self.to_text(compress, indent)?)?;
        tracing::debug!("Wrote document to {}", path.display());
        Ok(())
    }

    /// Read from a file
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_text(&text)
    }
}

/// Turn compressed clipboard text back into plain JSON
pub fn decompress(encoded: &str) -> Result<String> {
    let zipped = base64::engine::general_purpose::STANDARD
        .decode(encoded.trim())
        .map_err(|e| Error::Codec(format!("invalid base64: {e}")))?;
    let mut json = String::new();
    GzDecoder::new(zipped.as_slice())
        .read_to_string(&mut json)
        .map_err(|e| Error::Codec(format!("invalid gzip stream: {e}")))?;
    Ok(json)
}

/// Whether text carries the compressed form prefix
pub fn is_compressed(text: &str) -> bool {
    text.trim_start().starts_with(MAGIC_PREFIX)
}
