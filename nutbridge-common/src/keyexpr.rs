use crate::error::{Error, Result};

/// Default key expression prefix for bridge traffic.
pub const KEY_PREFIX: &str = "nut";

/// Suffix of the availability topic under the prefix.
pub const STATE_SUFFIX: &str = "state";

/// Builder for constructing bridge key expressions.
///
/// Key expressions follow the pattern:
/// `<prefix>/<suffix>`, where per-variable suffixes are
/// `hosts/<host>/<device>/<variable path>`.
#[derive(Debug, Clone)]
pub struct KeyExprBuilder {
    prefix: String,
}

impl Default for KeyExprBuilder {
    fn default() -> Self {
        Self::new(KEY_PREFIX)
    }
}

impl KeyExprBuilder {
    /// Create a builder with a custom prefix.
    ///
    /// Leading and trailing slashes are stripped so that `"nut/"` and `"nut"`
    /// build the same keys.
    pub fn new(prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        Self {
            prefix: prefix.trim_matches('/').to_string(),
        }
    }

    /// The normalized prefix.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Build a key expression from a suffix.
    ///
    /// # Example
    /// ```
    /// use nutbridge_common::keyexpr::KeyExprBuilder;
    ///
    /// let builder = KeyExprBuilder::new("nut");
    /// assert_eq!(builder.build("hosts/ups01/myups/battery/charge"), "nut/hosts/ups01/myups/battery/charge");
    /// ```
    pub fn build(&self, suffix: &str) -> String {
        let suffix = suffix.trim_start_matches('/');
        if suffix.is_empty() {
            self.prefix.clone()
        } else if self.prefix.is_empty() {
            suffix.to_string()
        } else {
            format!("{}/{}", self.prefix, suffix)
        }
    }

    /// Key expression of the availability topic.
    ///
    /// # Example
    /// ```
    /// use nutbridge_common::keyexpr::KeyExprBuilder;
    ///
    /// assert_eq!(KeyExprBuilder::new("nut").state_key(), "nut/state");
    /// ```
    pub fn state_key(&self) -> String {
        self.build(STATE_SUFFIX)
    }

    /// Wildcard matching everything the bridge publishes.
    pub fn wildcard(&self) -> String {
        self.build("**")
    }
}

/// Check that a prefix is usable as the start of a publication key.
///
/// Rejects empty prefixes, empty chunks and wildcard or reserved characters.
pub fn validate_prefix(prefix: &str) -> Result<()> {
    let trimmed = prefix.trim_matches('/');
    if trimmed.is_empty() {
        return Err(Error::KeyExpr("key prefix cannot be empty".to_string()));
    }
    for chunk in trimmed.split('/') {
        if chunk.is_empty() {
            return Err(Error::KeyExpr(format!(
                "key prefix '{}' contains an empty chunk",
                prefix
            )));
        }
        if chunk.contains(['*', '$', '?', '#']) {
            return Err(Error::KeyExpr(format!(
                "key prefix '{}' contains a reserved character",
                prefix
            )));
        }
    }
    Ok(())
}
