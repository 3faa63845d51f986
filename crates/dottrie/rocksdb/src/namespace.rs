// Dotlanth
// Copyright (C) 2025 Synerthink

// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.

// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Affero General Public License for more details.

// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.

//! Key-prefix namespacing
//!
//! Multiple logical trees can share one physical roots column family by
//! prefixing every key with a single namespace byte. The default
//! namespace adds no prefix, keeping the layout byte-compatible with
//! single-tree deployments.

/// Namespace configuration for a roots index.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NamespaceOptions {
    prefix: Option<u8>,
}

impl NamespaceOptions {
    /// No namespace prefix.
    pub fn defaults() -> Self {
        Self::default()
    }

    /// Namespace every key with one leading byte.
    pub fn with_prefix(prefix: u8) -> Self {
        Self { prefix: Some(prefix) }
    }

    pub fn prefix(&self) -> Option<u8> {
        self.prefix
    }
}

/// Applies and strips the optional namespace byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyPrefixer {
    prefix: Option<u8>,
}

impl KeyPrefixer {
    pub fn new(options: NamespaceOptions) -> Self {
        Self { prefix: options.prefix() }
    }

    /// Prepends the namespace byte, if any.
    pub fn apply(&self, key: &[u8]) -> Vec<u8> {
        match self.prefix {
            Some(prefix) => {
                let mut out = Vec::with_capacity(key.len() + 1);
                out.push(prefix);
                out.extend_from_slice(key);
                out
            }
            None => key.to_vec(),
        }
    }

    /// Removes the namespace byte; `None` if the key belongs to another
    /// namespace.
    pub fn strip<'a>(&self, key: &'a [u8]) -> Option<&'a [u8]> {
        match self.prefix {
            Some(prefix) => match key.split_first() {
                Some((first, rest)) if *first == prefix => Some(rest),
                _ => None,
            },
            None => Some(key),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_namespace_is_transparent() {
        let prefixer = KeyPrefixer::new(NamespaceOptions::defaults());
        assert_eq!(prefixer.apply(b"key"), b"key".to_vec());
        assert_eq!(prefixer.strip(b"key"), Some(&b"key"[..]));
    }

    #[test]
    fn test_prefixed_namespace_round_trip() {
        let prefixer = KeyPrefixer::new(NamespaceOptions::with_prefix(0x42));
        let applied = prefixer.apply(b"key");
        assert_eq!(applied[0], 0x42);
        assert_eq!(prefixer.strip(&applied), Some(&b"key"[..]));
        // Foreign namespace keys do not strip.
        assert_eq!(prefixer.strip(b"\x43key"), None);
    }
}
