use crate::error::HookError;
use crate::webhook::PushEvent;
use crate::{Hook, HookConfig};
use std::str::FromStr;
use tracing::{self, debug, warn};

// For signature verification
use hex::decode as hex_decode;
use hmac::digest::KeyInit;
use hmac::{Hmac, Mac};
use sha1::Sha1;
use sha2::Sha256;
type HmacSha1 = Hmac<Sha1>;
type HmacSha256 = Hmac<Sha256>;

/// Keyed-hash algorithms accepted in the signature header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureAlgorithm {
    Sha1,
    Sha256,
}

impl SignatureAlgorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignatureAlgorithm::Sha1 => "sha1",
            SignatureAlgorithm::Sha256 => "sha256",
        }
    }
}

impl FromStr for SignatureAlgorithm {
    type Err = HookError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sha1" => Ok(SignatureAlgorithm::Sha1),
            "sha256" => Ok(SignatureAlgorithm::Sha256),
            other => Err(HookError::AuthenticationFailure(format!(
                "unsupported signature algorithm '{}'",
                other
            ))),
        }
    }
}

fn compute_mac<M: Mac + KeyInit>(secret: &[u8], payload: &[u8]) -> Result<M, HookError> {
    let mut mac = <M as Mac>::new_from_slice(secret)
        .map_err(|e| HookError::AuthenticationFailure(format!("invalid secret: {}", e)))?;
    mac.update(payload);
    Ok(mac)
}

/// Checks `received` against the MAC of `payload` in constant time.
/// On mismatch the computed digest is returned hex encoded, for diagnostics.
fn check_mac<M: Mac + KeyInit + Clone>(
    secret: &[u8],
    payload: &[u8],
    received: &[u8],
) -> Result<Result<(), String>, HookError> {
    let mac = compute_mac::<M>(secret, payload)?;
    let computed = mac.clone().finalize().into_bytes();
    Ok(mac
        .verify_slice(received)
        .map_err(|_| hex::encode(computed)))
}

/// Produce a signature header value (`algorithm=hexdigest`) for `payload`.
pub fn sign_payload(
    secret: &str,
    payload: &[u8],
    algorithm: SignatureAlgorithm,
) -> Result<String, HookError> {
    let digest = match algorithm {
        SignatureAlgorithm::Sha1 => {
            hex::encode(compute_mac::<HmacSha1>(secret.as_bytes(), payload)?.finalize().into_bytes())
        }
        SignatureAlgorithm::Sha256 => hex::encode(
            compute_mac::<HmacSha256>(secret.as_bytes(), payload)?
                .finalize()
                .into_bytes(),
        ),
    };
    Ok(format!("{}={}", algorithm.as_str(), digest))
}

/// Verify a GitHub webhook signature header against the raw payload.
///
/// Expected format: `sha1=<hex>` or `sha256=<hex>`. Any other algorithm is rejected.
pub fn verify_github_signature(
    secret: &str,
    payload: &[u8],
    signature_header: Option<&str>,
) -> Result<(), HookError> {
    let header = signature_header.ok_or_else(|| {
        HookError::AuthenticationFailure("no signature header".to_string())
    })?;

    let (algorithm, git_signature) = header.split_once('=').ok_or_else(|| {
        HookError::AuthenticationFailure("malformed signature header".to_string())
    })?;

    let algorithm: SignatureAlgorithm = algorithm.parse().inspect_err(|e| {
        warn!("Rejecting signature: {}", e);
    })?;

    // GitHub provides the signature as hex
    let git_signature_bytes = hex_decode(git_signature).map_err(|e| {
        HookError::AuthenticationFailure(format!("bad hex value in signature: {}", e))
    })?;

    let checked = match algorithm {
        SignatureAlgorithm::Sha1 => {
            check_mac::<HmacSha1>(secret.as_bytes(), payload, &git_signature_bytes)?
        }
        SignatureAlgorithm::Sha256 => {
            check_mac::<HmacSha256>(secret.as_bytes(), payload, &git_signature_bytes)?
        }
    };

    checked.map_err(|computed| {
        debug!(
            "Signature check failed {} != {}",
            hex::encode(&git_signature_bytes),
            computed
        );
        HookError::AuthenticationFailure(format!(
            "{} signature does not match payload",
            algorithm.as_str()
        ))
    })
}

/// Finds the first hook for the event's repository whose branch the event
/// pushed to. Tag pushes are not branch scoped and go to the repository's
/// first hook. Returns None if there's no suitable match.
pub fn find_matching_hook<'a>(config: &'a HookConfig, event: &PushEvent) -> Option<&'a Hook> {
    config.hooks.iter().find(|hook| {
        hook.repo == event.repository.full_name
            && (event.is_tag() || event.reference == hook.branch_ref())
    })
}

/// Project name of a repository: the text after the last `/`.
pub fn project_name(repo: &str) -> &str {
    repo.rsplit_once('/').map_or(repo, |(_, project)| project)
}
