//! Host capability probe for the on-device model
//!
//! The local model only runs efficiently on Apple silicon. The probe is a
//! pure function of architecture and OS so callers can evaluate it once and
//! hand the result to [`SpeechOrchestrator::new`](crate::SpeechOrchestrator::new).

/// Whether the given architecture/OS pair can host the local model
#[must_use]
pub fn supports_local_model(arch: &str, os: &str) -> bool {
    arch == "aarch64" && os == "macos"
}

/// Apply [`supports_local_model`] to the current host
#[must_use]
pub fn host_supports_local_model() -> bool {
    supports_local_model(std::env::consts::ARCH, std::env::consts::OS)
}
