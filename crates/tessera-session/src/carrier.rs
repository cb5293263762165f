//! The client-side identifier carrier (normally a cookie).
//!
//! The transport layer implements [`IdentifierCarrier`] over its own
//! request/response types; the manager only reads one named value and
//! writes [`CarrierCookie`]s back.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

/// Access to the identifier on an inbound request and its outbound response.
pub trait IdentifierCarrier {
    /// Raw value of the named carrier on the inbound request.
    fn read(&self, name: &str) -> Option<String>;

    /// Queue a carrier value on the outbound response.
    fn write(&mut self, cookie: CarrierCookie);

    /// Whether the request arrived over an encrypted transport.
    fn is_encrypted(&self) -> bool;
}

/// Outbound carrier value and its attributes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CarrierCookie {
    pub name: String,
    pub value: String,
    pub path: String,
    pub http_only: bool,
    pub secure: bool,
    pub expires: DateTime<Utc>,
}

impl CarrierCookie {
    /// Whether this cookie tells the client to forget the identifier.
    pub fn is_removal(&self) -> bool {
        self.value.is_empty() && self.expires <= Utc::now()
    }

    /// Render as a `Set-Cookie` header value.
    pub fn to_header_value(&self) -> String {
        let mut header = format!(
            "{}={}; Path={}; Expires={}",
            self.name,
            urlencoding::encode(&self.value),
            self.path,
            self.expires.format("%a, %d %b %Y %H:%M:%S GMT"),
        );
        if self.http_only {
            header.push_str("; HttpOnly");
        }
        if self.secure {
            header.push_str("; Secure");
        }
        header
    }
}

/// Carrier backed by plain maps, for tests and non-HTTP embedders.
#[derive(Debug, Clone, Default)]
pub struct MemoryCarrier {
    inbound: HashMap<String, String>,
    outbound: Vec<CarrierCookie>,
    encrypted: bool,
}

impl MemoryCarrier {
    /// Create a carrier with no inbound values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an inbound value.
    pub fn with_value(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.inbound.insert(name.into(), value.into());
        self
    }

    /// Mark the request as encrypted.
    pub fn with_encryption(mut self, encrypted: bool) -> Self {
        self.encrypted = encrypted;
        self
    }

    /// Everything written so far, oldest first.
    pub fn written(&self) -> &[CarrierCookie] {
        &self.outbound
    }

    /// Most recent value written under `name`.
    pub fn last_written(&self, name: &str) -> Option<&CarrierCookie> {
        self.outbound.iter().rev().find(|c| c.name == name)
    }

    /// Build the carrier for a follow-up request, as a client honouring the
    /// cookies would: written values replace inbound ones, removals drop them.
    pub fn follow_up(&self) -> Self {
        let mut inbound = self.inbound.clone();
        for cookie in &self.outbound {
            if cookie.is_removal() {
                inbound.remove(&cookie.name);
            } else {
                inbound.insert(cookie.name.clone(), cookie.value.clone());
            }
        }
        Self {
            inbound,
            outbound: Vec::new(),
            encrypted: self.encrypted,
        }
    }
}

impl IdentifierCarrier for MemoryCarrier {
    fn read(&self, name: &str) -> Option<String> {
        self.inbound.get(name).cloned()
    }

    fn write(&mut self, cookie: CarrierCookie) {
        self.outbound.push(cookie);
    }

    fn is_encrypted(&self) -> bool {
        self.encrypted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn cookie(value: &str, secure: bool) -> CarrierCookie {
        CarrierCookie {
            name: "sid".to_string(),
            value: value.to_string(),
            path: "/".to_string(),
            http_only: true,
            secure,
            expires: Utc.with_ymd_and_hms(2030, 1, 2, 3, 4, 5).unwrap(),
        }
    }

    #[test]
    fn test_header_value() {
        assert_eq!(
            cookie("abc_-1", true).to_header_value(),
            "sid=abc_-1; Path=/; Expires=Wed, 02 Jan 2030 03:04:05 GMT; HttpOnly; Secure"
        );
        assert_eq!(
            cookie("a b", false).to_header_value(),
            "sid=a%20b; Path=/; Expires=Wed, 02 Jan 2030 03:04:05 GMT; HttpOnly"
        );
    }

    #[test]
    fn test_follow_up_applies_written_cookies() {
        let mut carrier = MemoryCarrier::new().with_value("other", "x");
        carrier.write(cookie("abc", false));
        let next = carrier.follow_up();
        assert_eq!(next.read("sid"), Some("abc".to_string()));
        assert_eq!(next.read("other"), Some("x".to_string()));

        let mut carrier = next;
        let mut removal = cookie("", false);
        removal.expires = Utc::now() - chrono::TimeDelta::minutes(1);
        assert!(removal.is_removal());
        carrier.write(removal);
        assert_eq!(carrier.follow_up().read("sid"), None);
    }
}
