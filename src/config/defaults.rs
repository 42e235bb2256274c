//! Default values for configuration fields.
//!
//! These functions are used by serde for default deserialization.

// ============================================================================
// Common Defaults
// ============================================================================

pub fn r#true() -> bool {
    true
}

pub fn r#false() -> bool {
    false
}

// ============================================================================
// [build] Section Defaults
// ============================================================================

pub mod build {
    use std::path::PathBuf;

    pub fn output() -> PathBuf {
        "_site".into()
    }

    pub fn pages() -> Vec<PathBuf> {
        vec!["_pages".into()]
    }

    pub fn data() -> Vec<PathBuf> {
        Vec::new()
    }

    pub fn assets() -> Vec<PathBuf> {
        vec!["assets".into()]
    }

    pub fn redirect_template() -> Option<PathBuf> {
        None
    }
}

// ============================================================================
// [serve] Section Defaults
// ============================================================================

pub mod serve {
    use std::net::{IpAddr, Ipv4Addr};

    pub const fn interface() -> IpAddr {
        IpAddr::V4(Ipv4Addr::LOCALHOST)
    }

    pub const fn port() -> u16 {
        5277
    }

    pub const fn port_retries() -> u16 {
        10
    }
}
