//! Bridge configuration

use serde::{Deserialize, Serialize};

use crate::api::characteristic::CharacteristicWriteType;

/// Configuration shared by the router, the proxies and the stream transport
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Largest frame accepted or emitted by a framed transport
    pub max_frame_len: usize,
    /// Reported maximum payload for writes with response
    pub max_write_with_response: usize,
    /// Reported maximum payload for writes without response (ATT MTU minus header)
    pub max_write_without_response: usize,
    /// Default for `allowDuplicates` on scans started through the trait surface
    pub allow_duplicates: bool,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            max_frame_len: 1024 * 1024,
            max_write_with_response: 512,
            max_write_without_response: 182,
            allow_duplicates: false,
        }
    }
}

impl BridgeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse an embedding application's JSON settings; absent keys keep their defaults.
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    pub fn with_max_frame_len(mut self, len: usize) -> Self {
        self.max_frame_len = len;
        self
    }

    pub fn with_max_write_with_response(mut self, len: usize) -> Self {
        self.max_write_with_response = len;
        self
    }

    pub fn with_max_write_without_response(mut self, len: usize) -> Self {
        self.max_write_without_response = len;
        self
    }

    pub fn with_allow_duplicates(mut self, allow: bool) -> Self {
        self.allow_duplicates = allow;
        self
    }

    pub fn max_write_len(&self, write_type: CharacteristicWriteType) -> usize {
        match write_type {
            CharacteristicWriteType::WriteWithResponse => self.max_write_with_response,
            CharacteristicWriteType::WriteWithoutResponse => self.max_write_without_response,
        }
    }
}
