use std::env;

const FALLBACK_HOSTNAME: &str = "unknown";

/// Detect the host name reported to the ingestion service.
///
/// Checked in order: `LOGDNA_HOSTNAME`, `HOSTNAME`, the system host name.
pub(crate) fn detect() -> String {
    for var in ["LOGDNA_HOSTNAME", "HOSTNAME"] {
        if let Ok(hostname) = env::var(var) {
            if !hostname.is_empty() {
                return hostname;
            }
        }
    }

    if let Some(hostname) = system_hostname() {
        return hostname;
    }

    tracing::warn!("could not determine hostname, using '{FALLBACK_HOSTNAME}'");
    FALLBACK_HOSTNAME.to_string()
}

#[cfg(unix)]
fn system_hostname() -> Option<String> {
    match nix::unistd::gethostname() {
        Ok(hostname) => hostname
            .into_string()
            .ok()
            .filter(|hostname| !hostname.is_empty()),
        Err(e) => {
            tracing::warn!("failed to get system hostname: {e}");
            None
        }
    }
}

#[cfg(not(unix))]
fn system_hostname() -> Option<String> {
    env::var("COMPUTERNAME").ok().filter(|hostname| !hostname.is_empty())
}
