//! Errors which end a renewal cycle

use thiserror::Error;

use crate::account::TermsError;
use crate::cert::CertificateError;
use crate::key::KeyError;
use crate::keystore::KeystoreError;
use crate::protocol::{AcmeError, Url};
use crate::session::Status;

/// Why a renewal cycle failed.
///
/// None of these escape the orchestrator: each one is logged and turned
/// into a retry at a later instant.
#[derive(Debug, Error)]
pub enum RenewError {
    /// Talking to the certificate authority failed, or it rejected a request.
    #[error("certificate authority: {0}")]
    Protocol(#[from] AcmeError),

    /// Creating an account needs the operator to accept the terms at `link`.
    #[error("the terms of service at {link} have not been accepted")]
    TermsNotAccepted {
        /// The terms document awaiting acceptance.
        link: Url,
    },

    /// A resource reached a failed terminal state.
    #[error("{resource} became {status}")]
    UpdateFailed {
        /// What failed: an order or an authorization.
        resource: &'static str,
        /// The terminal status.
        status: Status,
    },

    /// The keystore could not be built or read.
    #[error("keystore: {0}")]
    Keystore(#[from] KeystoreError),

    /// A key could not be loaded or stored.
    #[error("key: {0}")]
    Key(#[from] KeyError),

    /// The certificate request could not be created.
    #[error("certificate request: {0}")]
    Certificate(#[from] CertificateError),

    /// A step did not complete in time.
    #[error("{0} timed out")]
    Timeout(&'static str),

    /// The challenge was registered again, and this wait was superseded.
    #[error("challenge {token} was abandoned")]
    ChallengeAbandoned {
        /// The challenge token.
        token: String,
    },

    /// The terms of service record could not be read or written.
    #[error("terms of service: {0}")]
    Terms(#[from] TermsError),

    /// Reading or writing a file failed.
    #[error("I/O: {0}")]
    Io(#[from] std::io::Error),
}
