//! Storage layout shared by the pipeline and the operator tooling
//!
//! Label state lives entirely in the key prefix of each object. There is no
//! separate status field anywhere.

use serde::{Deserialize, Serialize};

use crate::error::CommonError;

/// Logical folder (key prefix) inside the labels bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Folder {
    /// Newly uploaded, not yet reconciled
    Incoming,
    /// Matched to an open order, waiting to be printed
    Processed,
    /// Unmatched, or the pipeline failed for the batch
    Errors,
    /// Archive of printed labels, reachable only from `Processed`
    Printed,
}

impl Folder {
    pub const ALL: [Folder; 4] = [
        Folder::Incoming,
        Folder::Processed,
        Folder::Errors,
        Folder::Printed,
    ];

    /// Key prefix including the trailing slash
    pub fn prefix(self) -> &'static str {
        match self {
            Folder::Incoming => "incoming/",
            Folder::Processed => "processed/",
            Folder::Errors => "errors/",
            Folder::Printed => "printed/",
        }
    }

    /// Folder a key currently sits in, if any
    pub fn of_key(key: &str) -> Option<Folder> {
        Self::ALL
            .into_iter()
            .find(|folder| key.starts_with(folder.prefix()))
    }

    /// Destination key for `filename` inside this folder
    pub fn key_for(self, filename: &str) -> String {
        format!("{}{}", self.prefix(), filename)
    }
}

impl std::str::FromStr for Folder {
    type Err = CommonError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().trim_end_matches('/').to_lowercase().as_str() {
            "incoming" => Ok(Folder::Incoming),
            "processed" => Ok(Folder::Processed),
            "errors" | "error" => Ok(Folder::Errors),
            "printed" => Ok(Folder::Printed),
            _ => Err(CommonError::UnknownFolder(s.to_string())),
        }
    }
}

impl std::fmt::Display for Folder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.prefix().trim_end_matches('/'))
    }
}

/// Last path segment of an object key
pub fn base_name(key: &str) -> &str {
    key.rsplit('/').next().unwrap_or(key)
}
