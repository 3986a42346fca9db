/// Registry key layout for bookkeeping and auxiliary entries.
///
/// Bookkeeping: `<bookkeeping_prefix>/service-ids/<service>` holds the owning
/// container id. Auxiliary: `<services_prefix>/<service>/<suffix>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyLayout {
    pub bookkeeping_prefix: String,
    pub services_prefix: String,
}

const SERVICE_IDS: &str = "service-ids";

impl Default for KeyLayout {
    fn default() -> Self {
        Self {
            bookkeeping_prefix: "docker".to_string(),
            services_prefix: "services".to_string(),
        }
    }
}

impl KeyLayout {
    pub fn new(bookkeeping_prefix: impl Into<String>, services_prefix: impl Into<String>) -> Self {
        Self {
            bookkeeping_prefix: trim_slashes(bookkeeping_prefix.into()),
            services_prefix: trim_slashes(services_prefix.into()),
        }
    }

    /// Prefix listed at startup, with trailing separator.
    pub fn bookkeeping_root(&self) -> String {
        format!("{}/{SERVICE_IDS}/", self.bookkeeping_prefix)
    }

    pub fn bookkeeping_key(&self, service: &str) -> String {
        format!("{}{service}", self.bookkeeping_root())
    }

    /// Recovers the service name from a listed bookkeeping key.
    ///
    /// Keys outside the bookkeeping root are returned as-is.
    pub fn service_from_bookkeeping_key<'a>(&self, key: &'a str) -> &'a str {
        let root = self.bookkeeping_root();
        key.strip_prefix(root.as_str()).unwrap_or(key)
    }

    /// Namespace deleted recursively when a service is deregistered.
    ///
    /// Ends with `/` so a recursive delete of `web` leaves `web2` alone.
    pub fn service_namespace(&self, service: &str) -> String {
        format!("{}/{service}/", self.services_prefix)
    }

    pub fn auxiliary_key(&self, service: &str, suffix: &str) -> String {
        format!("{}{suffix}", self.service_namespace(service))
    }
}

fn trim_slashes(value: String) -> String {
    value.trim_matches('/').to_string()
}
