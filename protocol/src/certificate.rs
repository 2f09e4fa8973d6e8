//! # Certificates
//!
//! A [`Certificate`] is the payload of every non-genesis block: who
//! attended what, and when the credential was issued. Once a certificate
//! is embedded in a block it is never modified; the block hash covers
//! every field.
//!
//! The JSON field names (`memberID`, `name`, `eventName`, `dateIssued`)
//! are part of the snapshot format and must not change.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ---------------------------------------------------------------------------
// CertificateError
// ---------------------------------------------------------------------------

/// Reasons a certificate is refused before it ever reaches a block.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CertificateError {
    /// `holder_name` is empty or whitespace.
    #[error("certificate holder name must not be empty")]
    EmptyHolderName,

    /// `event_name` is empty or whitespace.
    #[error("certificate event name must not be empty")]
    EmptyEventName,
}

// ---------------------------------------------------------------------------
// Certificate
// ---------------------------------------------------------------------------

/// An issued attendance credential.
///
/// `member_id` is opaque to the chain: it may be empty, and whether it is
/// generated or supplied is decided by whoever issues the certificate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Certificate {
    /// Identifier of the member the certificate belongs to.
    #[serde(rename = "memberID")]
    pub member_id: String,
    /// Full name of the holder.
    #[serde(rename = "name")]
    pub holder_name: String,
    /// Event the holder attended.
    #[serde(rename = "eventName")]
    pub event_name: String,
    /// When the certificate was issued.
    #[serde(rename = "dateIssued")]
    pub issued_at: DateTime<Utc>,
}

impl Certificate {
    /// Build a certificate issued right now.
    pub fn new(
        member_id: impl Into<String>,
        holder_name: impl Into<String>,
        event_name: impl Into<String>,
    ) -> Self {
        Self {
            member_id: member_id.into(),
            holder_name: holder_name.into(),
            event_name: event_name.into(),
            issued_at: Utc::now(),
        }
    }

    /// Override the issue time. Mostly useful for fixtures and imports.
    pub fn issued_at(mut self, issued_at: DateTime<Utc>) -> Self {
        self.issued_at = issued_at;
        self
    }

    /// The empty payload carried by the genesis block.
    ///
    /// All strings are empty and the issue time is the Unix epoch, so the
    /// genesis hash is identical on every machine.
    pub fn sentinel() -> Self {
        Self {
            member_id: String::new(),
            holder_name: String::new(),
            event_name: String::new(),
            issued_at: DateTime::<Utc>::UNIX_EPOCH,
        }
    }

    /// Returns true if this is the genesis sentinel payload.
    pub fn is_sentinel(&self) -> bool {
        *self == Self::sentinel()
    }

    /// Check the fields the chain requires before issuing.
    pub fn validate(&self) -> Result<(), CertificateError> {
        if self.holder_name.trim().is_empty() {
            return Err(CertificateError::EmptyHolderName);
        }
        if self.event_name.trim().is_empty() {
            return Err(CertificateError::EmptyEventName);
        }
        Ok(())
    }
}
