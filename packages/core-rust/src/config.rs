//! Domain startup configuration documents.

use crate::sxp::{self, ParseError, Sxp};

/// A parsed domain configuration, e.g. `(vm (name web1) (memory 256))`.
///
/// The root is always a list whose head atom names the configuration kind.
/// Everything else is opaque here and interpreted by the domain manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigDocument {
    root: Sxp,
}

impl ConfigDocument {
    /// Parses configuration text.
    ///
    /// # Errors
    ///
    /// Returns a [`ParseError`] when the text is not a single S-expression or
    /// its root is not a list headed by an atom.
    pub fn parse(text: &str) -> Result<Self, ParseError> {
        let root = sxp::parse(text)?;
        Self::from_sxp(root)
    }

    /// Wraps an already parsed value.
    ///
    /// # Errors
    ///
    /// Returns a [`ParseError`] positioned at the start of the document when
    /// `root` is not a list headed by an atom.
    pub fn from_sxp(root: Sxp) -> Result<Self, ParseError> {
        if root.head().is_none() {
            return Err(ParseError {
                line: 1,
                column: 1,
                message: "configuration must be a list headed by its kind, e.g. (vm ...)"
                    .to_string(),
            });
        }
        Ok(Self { root })
    }

    #[must_use]
    pub fn root(&self) -> &Sxp {
        &self.root
    }

    #[must_use]
    pub fn into_root(self) -> Sxp {
        self.root
    }

    /// The configuration kind (`vm` for domain configurations).
    #[must_use]
    pub fn kind(&self) -> &str {
        self.root.head().unwrap_or_default()
    }

    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.root.child_value("name")
    }

    /// Memory in MiB, `None` when absent or not a number.
    #[must_use]
    pub fn memory(&self) -> Option<u64> {
        self.root.child_value("memory")?.parse().ok()
    }

    #[must_use]
    pub fn ssidref(&self) -> Option<u32> {
        self.root.child_value("ssidref")?.parse().ok()
    }
}
