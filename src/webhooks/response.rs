//! Mutation outcomes and their mapping onto admission responses.

use kube::core::DynamicObject;
use kube::core::admission::{AdmissionRequest, AdmissionResponse};

use super::error::MutationError;
use super::patch::{PatchOperation, to_json_patch};

/// Result of running a mutator on one object
#[derive(Clone, Debug, PartialEq)]
pub struct MutationOutcome {
    /// Whether the object may be admitted
    pub allowed: bool,
    /// Ordered patch, empty when nothing changes
    pub patch: Vec<PatchOperation>,
    /// Reason for denial (if not allowed)
    pub error_message: Option<String>,
}

impl MutationOutcome {
    /// Admit the object unchanged
    pub fn skipped() -> Self {
        Self {
            allowed: true,
            patch: Vec::new(),
            error_message: None,
        }
    }

    /// Admit the object with a patch
    pub fn patched(patch: Vec<PatchOperation>) -> Self {
        Self {
            allowed: true,
            patch,
            error_message: None,
        }
    }

    /// Deny the object
    pub fn denied(error: &MutationError) -> Self {
        Self {
            allowed: false,
            patch: Vec::new(),
            error_message: Some(error.to_string()),
        }
    }

    pub fn is_patched(&self) -> bool {
        self.allowed && !self.patch.is_empty()
    }

    /// Metric/log label for this outcome
    pub fn label(&self) -> &'static str {
        match (self.allowed, self.patch.is_empty()) {
            (false, _) => "denied",
            (true, true) => "skipped",
            (true, false) => "patched",
        }
    }
}

/// Build the admission response for `request` from a mutation outcome.
///
/// The patch is only attached when the object is allowed and the patch is
/// non-empty. A patch that fails to encode turns into a denial.
pub fn assemble(
    request: &AdmissionRequest<DynamicObject>,
    outcome: &MutationOutcome,
) -> AdmissionResponse {
    if !outcome.allowed {
        let message = outcome
            .error_message
            .clone()
            .unwrap_or_else(|| "mutation denied".to_string());
        return AdmissionResponse::from(request).deny(message);
    }

    if outcome.patch.is_empty() {
        return AdmissionResponse::from(request);
    }

    match encode_patch(request, &outcome.patch) {
        Ok(response) => response,
        Err(e) => AdmissionResponse::from(request).deny(e.to_string()),
    }
}

/// Deny `request` because its object could not be decoded
pub fn decode_failure(
    request: &AdmissionRequest<DynamicObject>,
    error: &MutationError,
) -> AdmissionResponse {
    AdmissionResponse::from(request).deny(error.to_string())
}

fn encode_patch(
    request: &AdmissionRequest<DynamicObject>,
    ops: &[PatchOperation],
) -> Result<AdmissionResponse, MutationError> {
    let patch = to_json_patch(ops)?;
    AdmissionResponse::from(request)
        .with_patch(patch)
        .map_err(|e| MutationError::Encode(e.to_string()))
}
