//! Namespaced identifiers shared across the pipeline: `TwinId` and `PolicyId`.
//!
//! Lexical shape: `<namespace>:<name>`.
//! - `namespace`: starts with an ASCII letter; dot-separated segments, each
//!   segment itself starting with a letter and allowing digits/underscore.
//! - `name`: nonempty, no slashes, no control characters, may contain
//!   percent-encoded bytes, length <= 256.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

const MAX_NAME_LEN: usize = 256;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NamespacedIdError {
    #[error("missing ':' separator between namespace and name")]
    MissingSeparator,
    #[error("empty namespace")]
    EmptyNamespace,
    #[error("namespace segment must start with an ASCII letter: {0:?}")]
    InvalidNamespaceSegment(String),
    #[error("empty name")]
    EmptyName,
    #[error("name contains a control character")]
    ControlCharacterInName,
    #[error("name contains a slash")]
    SlashInName,
    #[error("name exceeds maximum length of {MAX_NAME_LEN}: got {0}")]
    NameTooLong(usize),
}

fn validate_namespace(namespace: &str) -> Result<(), NamespacedIdError> {
    if namespace.is_empty() {
        return Err(NamespacedIdError::EmptyNamespace);
    }
    for segment in namespace.split('.') {
        let mut chars = segment.chars();
        match chars.next() {
            Some(c) if c.is_ascii_alphabetic() => {}
            _ => {
                return Err(NamespacedIdError::InvalidNamespaceSegment(
                    segment.to_string(),
                ));
            }
        }
        for c in chars {
            if !(c.is_ascii_alphanumeric() || c == '_') {
                return Err(NamespacedIdError::InvalidNamespaceSegment(
                    segment.to_string(),
                ));
            }
        }
    }
    Ok(())
}

fn validate_name(name: &str) -> Result<(), NamespacedIdError> {
    if name.is_empty() {
        return Err(NamespacedIdError::EmptyName);
    }
    if name.len() > MAX_NAME_LEN {
        return Err(NamespacedIdError::NameTooLong(name.len()));
    }
    if name.contains('/') {
        return Err(NamespacedIdError::SlashInName);
    }
    if name.chars().any(|c| c.is_control()) {
        return Err(NamespacedIdError::ControlCharacterInName);
    }
    Ok(())
}

macro_rules! namespaced_id {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name {
            namespace: String,
            name: String,
        }

        impl $name {
            pub fn new(
                namespace: impl Into<String>,
                name: impl Into<String>,
            ) -> Result<Self, NamespacedIdError> {
                let namespace = namespace.into();
                let name = name.into();
                validate_namespace(&namespace)?;
                validate_name(&name)?;
                Ok(Self { namespace, name })
            }

            pub fn namespace(&self) -> &str {
                &self.namespace
            }

            pub fn name(&self) -> &str {
                &self.name
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}:{}", self.namespace, self.name)
            }
        }

        impl FromStr for $name {
            type Err = NamespacedIdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let (namespace, name) = s
                    .split_once(':')
                    .ok_or(NamespacedIdError::MissingSeparator)?;
                Self::new(namespace, name)
            }
        }
    };
}

namespaced_id!(TwinId);
namespaced_id!(PolicyId);
